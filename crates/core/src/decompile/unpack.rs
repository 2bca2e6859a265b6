//! Writes a target's stored costumes and sounds back out as named files.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use fusepack_assets::{placeholder_key, sanitize_rel_path, AssetStore, StorageKey};
use tracing::debug;

use crate::error::{FuseError, FuseResult};
use crate::manifest::TargetRecord;
use crate::project::AssetRef;

use super::{file_stem, unique_name};

/// Directory, relative to the output root, holding extracted assets.
pub const ASSETS_DIR: &str = "assets";

/// What one target's assets turned into on disk. Paths are relative to the
/// output root so they can go straight into a project description.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UnpackedAssets {
    pub costumes: Vec<AssetRef>,
    pub sounds: Vec<AssetRef>,
    /// Logical name → extracted path.
    pub extracted: Vec<(String, PathBuf)>,
}

pub struct Unpacker<'a> {
    store: &'a AssetStore,
    root: &'a Path,
    directories: HashSet<String>,
    written: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(store: &'a AssetStore, root: &'a Path) -> Self {
        Self {
            store,
            root,
            directories: HashSet::new(),
            written: 0,
        }
    }

    /// Files written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Extracts every asset `record` references to
    /// `assets/<target>/<name>.<ext>`. A lone placeholder costume is not
    /// extracted; a rebuild adds it back.
    pub fn unpack(&mut self, record: &TargetRecord) -> FuseResult<UnpackedAssets> {
        let dir = PathBuf::from(ASSETS_DIR).join(unique_name(&file_stem(&record.name), &mut self.directories));
        let mut files = HashSet::new();
        let mut out = UnpackedAssets::default();

        let only_placeholder = record.costumes.len() == 1
            && record.costumes[0].md5ext == placeholder_key().as_str();
        if !only_placeholder {
            for costume in &record.costumes {
                let path = self.extract(&dir, &costume.name, &costume.md5ext, &costume.data_format, &mut files)?;
                out.extracted.push((costume.name.clone(), path.clone()));
                out.costumes.push(AssetRef {
                    path,
                    name: Some(costume.name.clone()),
                    rotation_center: Some([costume.rotation_center_x, costume.rotation_center_y]),
                    bitmap_resolution: costume.bitmap_resolution,
                    rate: None,
                    sample_count: None,
                });
            }
        }
        for sound in &record.sounds {
            let path = self.extract(&dir, &sound.name, &sound.md5ext, &sound.data_format, &mut files)?;
            out.extracted.push((sound.name.clone(), path.clone()));
            out.sounds.push(AssetRef {
                path,
                name: Some(sound.name.clone()),
                rotation_center: None,
                bitmap_resolution: None,
                rate: Some(sound.rate),
                sample_count: Some(sound.sample_count),
            });
        }
        Ok(out)
    }

    fn extract(
        &mut self,
        dir: &Path,
        name: &str,
        md5ext: &str,
        format: &str,
        files: &mut HashSet<String>,
    ) -> FuseResult<PathBuf> {
        let key = StorageKey::parse(md5ext)
            .ok_or_else(|| FuseError::Archive(format!("malformed asset reference '{md5ext}'")))?;
        let bytes = self.store.extract(&key)?;
        let extension = if format.is_empty() { key.extension() } else { format };
        let file = format!("{}.{extension}", unique_name(&file_stem(name), files));
        // data formats come from the archive and may carry separators
        let relative = sanitize_rel_path(&dir.join(file))?;
        let destination = self.root.join(&relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&destination, bytes)?;
        self.written += 1;
        debug!(asset = %name, key = %key, path = %relative.display(), "extracted asset");
        Ok(relative)
    }
}
