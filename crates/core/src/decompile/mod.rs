//! The inverse pipeline: archive → editable sources, assets and a project
//! description that builds back into an equivalent archive.
//!
//! The stage is always handled first so every global is known before any
//! sprite's blocks are decoded.

mod emit;
mod symbols;
mod synth;
mod unpack;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use crate::archive::read_archive;
use crate::error::{FuseError, FuseResult, Warning};
use crate::frontend::{Frontend, FuseFrontend, Script};
use crate::manifest::{ArchiveManifest, TargetRecord};
use crate::namespace::NamespaceNode;
use crate::project::{ProjectDescription, RotationStyle, SpriteBlock, StageBlock};
use crate::typefile::load_namespace;
use crate::version::{DESCRIPTION_FILE_NAME, PROJECT_SCHEMA_VERSION, SCRIPT_EXTENSION};

pub use emit::SourceEmitter;
pub use symbols::{ReconstructedSymbol, SymbolReconstructor, TargetSymbols};
pub use synth::NamespaceSynthesizer;
pub use unpack::{UnpackedAssets, Unpacker, ASSETS_DIR};

#[derive(Clone, Debug)]
pub struct DecompileOptions {
    pub output_dir: PathBuf,
    /// Type files describing modules the archive may call into. Members not
    /// found here or in the builtins are declared as placeholder externs.
    pub type_files: Vec<PathBuf>,
}

impl DecompileOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            type_files: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DecompileReport {
    pub description: PathBuf,
    /// Target name → written source file.
    pub sources: Vec<(String, PathBuf)>,
    pub assets: usize,
    /// Placeholder modules declared across all targets.
    pub synthesized: NamespaceNode,
    pub warnings: Vec<Warning>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecompiledTarget {
    pub name: String,
    pub is_stage: bool,
    pub script: Script,
    pub source: String,
}

#[derive(Clone, Debug)]
pub struct DecompiledProject {
    /// Same order as the manifest's targets.
    pub targets: Vec<DecompiledTarget>,
    pub synthesized: NamespaceNode,
    pub warnings: Vec<Warning>,
}

pub fn decompile_archive(archive: &Path, options: &DecompileOptions) -> FuseResult<DecompileReport> {
    decompile_archive_with(&FuseFrontend, archive, options)
}

#[instrument(skip(frontend, options), fields(output = %options.output_dir.display()))]
pub fn decompile_archive_with<F>(
    frontend: &F,
    archive: &Path,
    options: &DecompileOptions,
) -> FuseResult<DecompileReport>
where
    F: Frontend + ?Sized,
{
    let (manifest, store) = read_archive(archive)?;
    let known = load_namespace(&options.type_files)?;
    let project = decompile_manifest(frontend, &manifest, &known)?;

    let root = options.output_dir.as_path();
    fs::create_dir_all(root)?;
    let mut unpacker = Unpacker::new(&store, root);
    let mut stems = HashSet::new();
    let mut description = ProjectDescription {
        schema_version: Some(PROJECT_SCHEMA_VERSION.to_string()),
        type_files: options.type_files.iter().map(|path| absolute(path)).collect(),
        extensions: manifest.extensions.clone(),
        stage: StageBlock::default(),
        targets: Vec::with_capacity(manifest.targets.len().saturating_sub(1)),
    };
    let mut sources = Vec::with_capacity(project.targets.len());

    for (record, target) in manifest.targets.iter().zip(&project.targets) {
        let entry = PathBuf::from(format!(
            "{}.{SCRIPT_EXTENSION}",
            unique_name(&file_stem(&target.name), &mut stems)
        ));
        let written = root.join(&entry);
        fs::write(&written, &target.source)?;
        let assets = unpacker.unpack(record)?;
        if record.is_stage {
            description.stage = stage_block(record, entry, assets);
        } else {
            description.targets.push(sprite_block(record, entry, assets));
        }
        sources.push((target.name.clone(), written));
    }

    let description_path = root.join(DESCRIPTION_FILE_NAME);
    fs::write(&description_path, description.to_toml()?)?;
    info!(
        targets = sources.len(),
        assets = unpacker.written(),
        warnings = project.warnings.len(),
        "decompile finished"
    );
    Ok(DecompileReport {
        description: description_path,
        sources,
        assets: unpacker.written(),
        synthesized: project.synthesized,
        warnings: project.warnings,
    })
}

/// Reconstructs every target's source without touching the disk.
pub fn decompile_manifest<F>(
    frontend: &F,
    manifest: &ArchiveManifest,
    known: &NamespaceNode,
) -> FuseResult<DecompiledProject>
where
    F: Frontend + ?Sized,
{
    let stage = manifest
        .stage()
        .ok_or_else(|| FuseError::Archive("manifest has no stage".into()))?;
    let reconstructor = SymbolReconstructor::from_stage(stage);
    let mut synthesizer = NamespaceSynthesizer::new(known);
    let emitter = SourceEmitter::new(frontend);
    let mut warnings = Vec::new();
    let mut targets = Vec::with_capacity(manifest.targets.len());

    let ordered = std::iter::once(stage).chain(manifest.sprites());
    for record in ordered {
        let symbols = if record.is_stage {
            reconstructor.stage_symbols()
        } else {
            reconstructor.sprite(record, &mut warnings)
        };
        let decoded = frontend.from_storage_format(&record.blocks, &symbols, known);
        for failure in decoded.failures {
            warn!(target_name = %record.name, unit = %failure.unit, reason = %failure.reason, "skipping body");
            warnings.push(Warning::PartialDecompileFailure {
                target: record.name.clone(),
                unit: failure.unit,
                reason: failure.reason,
            });
        }
        let (bodies, namespaces) = synthesizer.synthesize(&record.name, decoded.items, &mut warnings);
        let script = emitter.assemble(namespaces, symbols.declarations(record.is_stage), bodies);
        let source = emitter.emit(&script);
        targets.push(DecompiledTarget {
            name: record.name.clone(),
            is_stage: record.is_stage,
            script,
            source,
        });
    }

    Ok(DecompiledProject {
        targets,
        synthesized: synthesizer.into_generated(),
        warnings,
    })
}

fn stage_block(record: &TargetRecord, entry: PathBuf, assets: UnpackedAssets) -> StageBlock {
    StageBlock {
        entry: Some(entry),
        tempo: record.tempo.unwrap_or(60.0),
        volume: record.volume,
        current_costume: clamp_costume(record.current_costume, assets.costumes.len()),
        backdrops: assets.costumes,
        sounds: assets.sounds,
    }
}

fn sprite_block(record: &TargetRecord, entry: PathBuf, assets: UnpackedAssets) -> SpriteBlock {
    let mut block = SpriteBlock::new(&record.name);
    block.entry = Some(entry);
    block.x = record.x.unwrap_or(block.x);
    block.y = record.y.unwrap_or(block.y);
    block.size = record.size.unwrap_or(block.size);
    block.direction = record.direction.unwrap_or(block.direction);
    block.visible = record.visible.unwrap_or(block.visible);
    block.draggable = record.draggable.unwrap_or(block.draggable);
    block.rotation_style = record
        .rotation_style
        .as_deref()
        .and_then(RotationStyle::parse)
        .unwrap_or_default();
    block.volume = record.volume;
    block.layer_order = (record.layer_order > 0).then_some(record.layer_order);
    block.current_costume = clamp_costume(record.current_costume, assets.costumes.len());
    block.costumes = assets.costumes;
    block.sounds = assets.sounds;
    block
}

/// A target without costumes gets one placeholder on rebuild.
fn clamp_costume(current: usize, costumes: usize) -> usize {
    current.min(costumes.max(1) - 1)
}

fn absolute(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// File-system safe stem for a target or asset name.
pub(crate) fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "unnamed".to_string()
    } else {
        stem
    }
}

/// `base`, or `base_2`, `base_3`… whichever is still free in `used`.
pub(crate) fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut counter = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{base}_{counter}");
        counter += 1;
    }
    candidate
}

#[cfg(test)]
#[path = "../tests/decompile_tests.rs"]
mod tests;
