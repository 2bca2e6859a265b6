//! Format constants for project descriptions and package containers.

/// Schema version written into generated project descriptions.
pub const PROJECT_SCHEMA_VERSION: &str = "1.0";

/// Name of the single manifest record inside a package container.
pub const MANIFEST_ENTRY_NAME: &str = "project.json";

/// Values for the manifest's `meta` block.
pub const MANIFEST_SEMVER: &str = "3.0.0";
pub const MANIFEST_VM: &str = "0.2.0";
pub const DEFAULT_AGENT: &str = concat!("fusepack/", env!("CARGO_PKG_VERSION"));

/// Extension of script files handled by the bundled frontend.
pub const SCRIPT_EXTENSION: &str = "fuse";

/// File name of the project description written by the decompiler.
pub const DESCRIPTION_FILE_NAME: &str = "project.toml";
