//! End-to-end build: description → namespace → ordered compilation →
//! assets → manifest → archive.

use std::fs;
use std::path::{Path, PathBuf};

use fusepack_assets::AssetStore;
use tracing::{info, instrument, warn};

use crate::archive::{write_archive, ArchiveAssembler};
use crate::error::{FuseError, FuseResult, Warning};
use crate::frontend::{Frontend, FuseFrontend, Script};
use crate::manifest::ArchiveManifest;
use crate::project::LoadedProject;
use crate::reconcile::{ScopeReconciler, TargetSource};
use crate::typefile::load_namespace;
use crate::version::DEFAULT_AGENT;

#[derive(Clone, Debug)]
pub struct BuildOptions {
    pub output: PathBuf,
    /// Recorded as `meta.agent` in the manifest.
    pub agent: String,
}

impl BuildOptions {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            agent: DEFAULT_AGENT.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BuildReport {
    pub manifest: ArchiveManifest,
    pub output: PathBuf,
    pub asset_count: usize,
    pub warnings: Vec<Warning>,
    pub fingerprint: String,
}

/// Everything a build produces before anything touches the disk.
#[derive(Debug)]
pub struct CompiledProject {
    pub manifest: ArchiveManifest,
    pub store: AssetStore,
    pub warnings: Vec<Warning>,
}

/// Builds the description at `description` with the bundled `.fuse` frontend.
pub fn build_project(description: &Path, options: &BuildOptions) -> FuseResult<BuildReport> {
    build_project_with(&FuseFrontend, description, options)
}

#[instrument(skip(frontend, options), fields(output = %options.output.display()))]
pub fn build_project_with<F>(
    frontend: &F,
    description: &Path,
    options: &BuildOptions,
) -> FuseResult<BuildReport>
where
    F: Frontend + ?Sized,
{
    let project = LoadedProject::load(description)?;
    let compiled = compile_in_memory(frontend, &project, &options.agent)?;
    write_archive(&options.output, &compiled.manifest, &compiled.store)?;
    let fingerprint = compiled.manifest.fingerprint()?;
    info!(
        targets = compiled.manifest.targets.len(),
        assets = compiled.store.len(),
        warnings = compiled.warnings.len(),
        %fingerprint,
        "build finished"
    );
    Ok(BuildReport {
        asset_count: compiled.manifest.storage_keys().len(),
        manifest: compiled.manifest,
        output: options.output.clone(),
        warnings: compiled.warnings,
        fingerprint,
    })
}

/// Runs the whole build except writing the archive.
pub fn compile_in_memory<F>(
    frontend: &F,
    project: &LoadedProject,
    agent: &str,
) -> FuseResult<CompiledProject>
where
    F: Frontend + ?Sized,
{
    let description = &project.description;
    let type_files: Vec<PathBuf> = description
        .type_files
        .iter()
        .map(|path| project.resolve(path))
        .collect();
    let namespace = load_namespace(&type_files)?;

    let stage = TargetSource::stage(
        description.stage.entry.clone(),
        parse_entry(frontend, project, description.stage.entry.as_deref())?,
    );
    let sprites = description
        .targets
        .iter()
        .map(|sprite| {
            let script = parse_entry(frontend, project, sprite.entry.as_deref())?;
            Ok(TargetSource::sprite(&sprite.name, sprite.entry.clone(), script))
        })
        .collect::<FuseResult<Vec<_>>>()?;

    let reconciled = ScopeReconciler::new(frontend, &namespace).reconcile(&stage, &sprites)?;
    let mut store = AssetStore::new();
    let manifest = ArchiveAssembler::new(frontend, agent).assemble(project, &reconciled, &mut store)?;
    for warning in &reconciled.warnings {
        warn!(%warning, "build warning");
    }
    Ok(CompiledProject {
        manifest,
        store,
        warnings: reconciled.warnings,
    })
}

/// A target without an entry script has no code.
fn parse_entry<F>(frontend: &F, project: &LoadedProject, entry: Option<&Path>) -> FuseResult<Script>
where
    F: Frontend + ?Sized,
{
    let Some(entry) = entry else {
        return Ok(Script::default());
    };
    let path = project.resolve(entry);
    let source = fs::read_to_string(&path).map_err(|err| FuseError::resolution(&path, err))?;
    frontend.parse(&path, &source)
}
