//! Packages a stage plus independently authored sprites into one archive,
//! and unpacks an archive back into editable sources.

pub mod archive;
pub mod decompile;
mod error;
pub mod frontend;
pub mod manifest;
pub mod namespace;
pub mod pipeline;
pub mod project;
pub mod reconcile;
pub mod typefile;
pub mod variable;
mod version;

pub use archive::{archive_bytes, opaque_id, read_archive, read_archive_bytes, write_archive, ArchiveAssembler};
pub use decompile::{
    decompile_archive, decompile_archive_with, decompile_manifest, DecompileOptions,
    DecompileReport, DecompiledProject, DecompiledTarget,
};
pub use error::{FuseError, FuseResult, SchemaViolation, Warning};
pub use frontend::{Frontend, FuseFrontend};
pub use manifest::ArchiveManifest;
pub use namespace::{merge, NamespaceNode};
pub use pipeline::{build_project, build_project_with, compile_in_memory, BuildOptions, BuildReport, CompiledProject};
pub use project::{DescriptionFormat, LoadedProject, ProjectDescription};
pub use reconcile::{ReconciledProject, ScopeReconciler, TargetSource};
pub use typefile::load_namespace;
pub use variable::{GlobalScope, VarKind, VarScope, Variable};
pub use version::{
    DEFAULT_AGENT, DESCRIPTION_FILE_NAME, MANIFEST_ENTRY_NAME, MANIFEST_SEMVER, MANIFEST_VM,
    PROJECT_SCHEMA_VERSION, SCRIPT_EXTENSION,
};

/// The asset crate, re-exported so callers need one dependency.
pub use fusepack_assets as assets;
