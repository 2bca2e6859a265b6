//! Manifest assembly and the zip container.
//!
//! Every global, including those declared by sprites, lives in the stage's
//! tables; sprite records only carry their own locals. Opaque ids are
//! derived from the owning target and the symbol name, so rebuilding an
//! unchanged project yields a byte-identical manifest.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use fusepack_assets::{AssetError, AssetKind, AssetMetadata, AssetStore, StorageKey};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{FuseError, FuseResult};
use crate::frontend::{GraphSerializer, SymbolIds, VarRef, EXTERN_CALL_OPCODE};
use crate::manifest::{
    ArchiveManifest, CostumeRecord, ListEntry, ManifestMeta, SoundRecord, TargetRecord,
    VariableEntry,
};
use crate::project::{AssetRef, LoadedProject, SpriteBlock, STAGE_NAME};
use crate::reconcile::{CompiledTarget, ReconciledProject};
use crate::variable::{DefaultValue, VarKind, Variable};
use crate::version::MANIFEST_ENTRY_NAME;

/// Opcode prefixes served by the editor itself rather than an extension.
const CORE_PREFIXES: &[&str] = &[
    "motion",
    "looks",
    "sound",
    "event",
    "control",
    "sensing",
    "operator",
    "data",
    "procedures",
    "argument",
];

const DEFAULT_SOUND_RATE: u32 = 48_000;

/// Deterministic opaque id for a symbol owned by `owner`.
pub fn opaque_id(owner: &str, category: &str, name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(owner.as_bytes());
    hasher.update([0]);
    hasher.update(category.as_bytes());
    hasher.update([0]);
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

fn kind_category(kind: VarKind) -> &'static str {
    match kind {
        VarKind::Scalar => "variable",
        VarKind::List => "list",
    }
}

type IdMap = HashMap<(String, VarKind), (String, String)>;

/// Ids visible while serializing one target: its locals, then the globals.
struct TargetIds<'a> {
    locals: IdMap,
    globals: &'a IdMap,
    broadcasts: &'a HashMap<String, String>,
}

impl SymbolIds for TargetIds<'_> {
    fn variable(&self, var: &VarRef, kind: VarKind) -> Option<(String, String)> {
        let key = (var.name.clone(), kind);
        self.locals
            .get(&key)
            .or_else(|| self.globals.get(&key))
            .cloned()
    }

    fn broadcast(&self, message: &str) -> Option<String> {
        self.broadcasts.get(message).cloned()
    }
}

/// Turns a reconciled project into an [`ArchiveManifest`], loading and
/// storing every referenced asset on the way.
pub struct ArchiveAssembler<'a, S: ?Sized> {
    serializer: &'a S,
    agent: String,
}

impl<'a, S> ArchiveAssembler<'a, S>
where
    S: GraphSerializer + ?Sized,
{
    pub fn new(serializer: &'a S, agent: impl Into<String>) -> Self {
        Self {
            serializer,
            agent: agent.into(),
        }
    }

    #[instrument(skip_all, fields(targets = reconciled.targets.len()))]
    pub fn assemble(
        &self,
        project: &LoadedProject,
        reconciled: &ReconciledProject,
        store: &mut AssetStore,
    ) -> FuseResult<ArchiveManifest> {
        let description = &project.description;

        let mut globals = IdMap::new();
        let mut stage = TargetRecord::new(STAGE_NAME, true);
        for var in reconciled.globals.iter() {
            let id = opaque_id(STAGE_NAME, kind_category(var.kind), &var.name);
            insert_variable(&mut stage, &id, var);
            globals.insert(
                (var.name.clone(), var.kind),
                (var.display_name().to_string(), id),
            );
        }

        let mut broadcasts = HashMap::new();
        for message in reconciled
            .targets
            .iter()
            .flat_map(|target| target.graph.messages())
        {
            let id = opaque_id(STAGE_NAME, "broadcast", &message);
            stage.broadcasts.insert(id.clone(), message.clone());
            broadcasts.insert(message, id);
        }

        let mut records = Vec::with_capacity(reconciled.targets.len());
        let mut sprite_index = 0u32;
        for target in &reconciled.targets {
            let mut record = if target.is_stage {
                let mut record = std::mem::replace(&mut stage, TargetRecord::new(STAGE_NAME, true));
                record.tempo = Some(description.stage.tempo);
                record.volume = description.stage.volume;
                record.current_costume = description.stage.current_costume;
                record.costumes =
                    self.costumes(project, &description.stage.backdrops, "backdrop1", store)?;
                record.sounds = self.sounds(project, &description.stage.sounds, store)?;
                record
            } else {
                sprite_index += 1;
                let block = description
                    .targets
                    .iter()
                    .find(|sprite| sprite.name == target.name)
                    .ok_or_else(|| {
                        FuseError::Archive(format!("no description for target '{}'", target.name))
                    })?;
                self.sprite_record(project, block, sprite_index, store)?
            };

            let mut locals = IdMap::new();
            for var in target.locals.iter() {
                let id = opaque_id(&target.name, kind_category(var.kind), &var.name);
                insert_variable(&mut record, &id, var);
                locals.insert(
                    (var.name.clone(), var.kind),
                    (var.display_name().to_string(), id),
                );
            }
            let ids = TargetIds {
                locals,
                globals: &globals,
                broadcasts: &broadcasts,
            };
            record.blocks = self.serializer.to_storage_format(&target.graph, &ids)?;
            debug!(
                target_name = %target.name,
                ops = target.graph.op_count(),
                costumes = record.costumes.len(),
                "assembled target"
            );
            records.push(record);
        }

        Ok(ArchiveManifest {
            targets: records,
            monitors: Vec::new(),
            extensions: extensions(&description.extensions, &reconciled.targets),
            meta: ManifestMeta::with_agent(self.agent.clone()),
        })
    }

    fn sprite_record(
        &self,
        project: &LoadedProject,
        block: &SpriteBlock,
        position: u32,
        store: &mut AssetStore,
    ) -> FuseResult<TargetRecord> {
        let mut record = TargetRecord::new(&block.name, false);
        record.x = Some(block.x);
        record.y = Some(block.y);
        record.size = Some(block.size);
        record.direction = Some(block.direction);
        record.visible = Some(block.visible);
        record.draggable = Some(block.draggable);
        record.rotation_style = Some(block.rotation_style.as_str().to_string());
        record.volume = block.volume;
        record.layer_order = block.layer_order.unwrap_or(position);
        record.current_costume = block.current_costume;
        record.costumes = self.costumes(project, &block.costumes, "costume1", store)?;
        record.sounds = self.sounds(project, &block.sounds, store)?;
        Ok(record)
    }

    fn costumes(
        &self,
        project: &LoadedProject,
        declared: &[AssetRef],
        placeholder_name: &str,
        store: &mut AssetStore,
    ) -> FuseResult<Vec<CostumeRecord>> {
        if declared.is_empty() {
            let key = store.store_placeholder();
            return Ok(vec![CostumeRecord {
                asset_id: key.hash().to_string(),
                name: placeholder_name.to_string(),
                md5ext: key.as_str().to_string(),
                data_format: key.extension().to_string(),
                rotation_center_x: 1.0,
                rotation_center_y: 1.0,
                bitmap_resolution: None,
            }]);
        }

        let mut names = HashSet::new();
        let mut out = Vec::with_capacity(declared.len());
        for asset in declared {
            let meta = load_asset(store, &project.resolve(&asset.path), AssetKind::Costume)?;
            let [center_x, center_y] = asset.rotation_center.unwrap_or_else(|| {
                meta.dimensions
                    .map(|(w, h)| [f64::from(w) / 2.0, f64::from(h) / 2.0])
                    .unwrap_or([0.0, 0.0])
            });
            let bitmap_resolution = match meta.format.as_str() {
                "svg" => asset.bitmap_resolution,
                _ => Some(asset.bitmap_resolution.unwrap_or(1)),
            };
            out.push(CostumeRecord {
                asset_id: meta.key.hash().to_string(),
                name: unique_name(&asset.logical_name(), &mut names),
                md5ext: meta.key.as_str().to_string(),
                data_format: meta.format,
                rotation_center_x: center_x,
                rotation_center_y: center_y,
                bitmap_resolution,
            });
        }
        Ok(out)
    }

    fn sounds(
        &self,
        project: &LoadedProject,
        declared: &[AssetRef],
        store: &mut AssetStore,
    ) -> FuseResult<Vec<SoundRecord>> {
        let mut names = HashSet::new();
        declared
            .iter()
            .map(|asset| -> FuseResult<SoundRecord> {
                let meta = load_asset(store, &project.resolve(&asset.path), AssetKind::Sound)?;
                Ok(SoundRecord {
                    asset_id: meta.key.hash().to_string(),
                    name: unique_name(&asset.logical_name(), &mut names),
                    md5ext: meta.key.as_str().to_string(),
                    data_format: meta.format,
                    rate: asset.rate.unwrap_or(DEFAULT_SOUND_RATE),
                    sample_count: asset.sample_count.unwrap_or(0),
                })
            })
            .collect()
    }
}

fn load_asset(store: &mut AssetStore, path: &Path, kind: AssetKind) -> FuseResult<AssetMetadata> {
    store.load_file(path, kind).map_err(|err| match err {
        AssetError::Read { path, source } => FuseError::resolution(path, source),
        other => other.into(),
    })
}

fn insert_variable(record: &mut TargetRecord, id: &str, var: &Variable) {
    let display = var.display_name().to_string();
    match &var.default {
        DefaultValue::Scalar(literal) => {
            record
                .variables
                .insert(id.to_string(), VariableEntry(display, literal.to_json()));
        }
        DefaultValue::List(items) => {
            let values = items.iter().map(|item| item.to_json()).collect();
            record
                .lists
                .insert(id.to_string(), ListEntry(display, values));
        }
    }
}

fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = base.to_string();
    let mut counter = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{base}{counter}");
        counter += 1;
    }
    candidate
}

/// Declared extensions first, then any detected from opcode prefixes.
fn extensions(declared: &[String], targets: &[CompiledTarget]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for ext in declared {
        if !out.contains(ext) {
            out.push(ext.clone());
        }
    }
    let detected: BTreeSet<String> = targets
        .iter()
        .flat_map(|target| target.graph.opcodes())
        .filter(|opcode| opcode != EXTERN_CALL_OPCODE)
        .filter_map(|opcode| opcode.split('_').next().map(str::to_string))
        .filter(|prefix| !CORE_PREFIXES.contains(&prefix.as_str()))
        .collect();
    for ext in detected {
        if !out.contains(&ext) {
            out.push(ext);
        }
    }
    out
}

/// Serializes the manifest and every referenced blob into an in-memory zip.
pub fn archive_bytes(manifest: &ArchiveManifest, store: &AssetStore) -> FuseResult<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    write_zip(&mut buffer, manifest, store)?;
    Ok(buffer.into_inner())
}

/// Writes the archive through a temporary file next to `path`; the target
/// only appears once the whole container has been written.
#[instrument(skip(manifest, store), fields(path = %path.display()))]
pub fn write_archive(path: &Path, manifest: &ArchiveManifest, store: &AssetStore) -> FuseResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;
    let mut staging = tempfile::NamedTempFile::new_in(&dir)?;
    write_zip(staging.as_file_mut(), manifest, store)?;
    staging.as_file().sync_all()?;
    staging.persist(path).map_err(|err| FuseError::Io(err.error))?;
    debug!("archive written");
    Ok(())
}

fn write_zip<W: Write + Seek>(
    writer: W,
    manifest: &ArchiveManifest,
    store: &AssetStore,
) -> FuseResult<()> {
    let referenced = manifest.storage_keys();
    for name in &referenced {
        let key = StorageKey::parse(name)
            .ok_or_else(|| FuseError::Archive(format!("malformed asset reference '{name}'")))?;
        if !store.contains(&key) {
            return Err(AssetError::NotFound(key).into());
        }
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    let mut zip = ZipWriter::new(writer);
    zip.start_file(MANIFEST_ENTRY_NAME, options)?;
    zip.write_all(&manifest.to_vec()?)?;
    for (key, bytes) in store.iter() {
        if !referenced.contains(key.as_str()) {
            debug!(key = %key, "skipping unreferenced blob");
            continue;
        }
        zip.start_file(key.as_str(), options)?;
        zip.write_all(bytes)?;
    }
    zip.finish()?;
    Ok(())
}

/// Opens an archive and returns its manifest plus every stored blob.
pub fn read_archive(path: &Path) -> FuseResult<(ArchiveManifest, AssetStore)> {
    let file = fs::File::open(path).map_err(|err| FuseError::resolution(path, err))?;
    read_zip(file)
}

pub fn read_archive_bytes(bytes: &[u8]) -> FuseResult<(ArchiveManifest, AssetStore)> {
    read_zip(Cursor::new(bytes))
}

fn read_zip<R: Read + Seek>(reader: R) -> FuseResult<(ArchiveManifest, AssetStore)> {
    let mut archive = ZipArchive::new(reader)?;
    let mut manifest = None;
    let mut store = AssetStore::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        if name == MANIFEST_ENTRY_NAME {
            manifest = Some(ArchiveManifest::from_slice(&bytes)?);
        } else if StorageKey::parse(&name).is_some() {
            store.restore(&name, bytes)?;
        } else {
            warn!(entry = %name, "skipping unrecognised archive entry");
        }
    }
    let manifest = manifest.ok_or_else(|| {
        FuseError::Archive(format!("archive has no {MANIFEST_ENTRY_NAME}"))
    })?;
    Ok((manifest, store))
}

#[cfg(test)]
#[path = "tests/archive_tests.rs"]
mod tests;
