#![allow(dead_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use fusepack::manifest::ArchiveManifest;
use fusepack::{VarKind, VarScope};
use tempfile::TempDir;

pub const SVG: &[u8] =
    br#"<svg xmlns="http://www.w3.org/2000/svg" width="48" height="48"><circle r="4"/></svg>"#;
pub const WAV: &[u8] = b"RIFF\x24\x00\x00\x00WAVEfmt ";

/// A project directory laid out from `(relative path, contents)` pairs.
pub fn project_dir(files: &[(&str, &[u8])]) -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    for (rel, bytes) in files {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(&path, bytes).expect("write project file");
    }
    dir
}

pub fn description_path(dir: &Path) -> PathBuf {
    dir.join("project.toml")
}

/// Variables by (owner, display name, kind, scope): stage tables are global,
/// sprite tables local.
pub fn variable_shape(manifest: &ArchiveManifest) -> BTreeSet<(String, String, VarKind, VarScope)> {
    let mut shape = BTreeSet::new();
    for target in &manifest.targets {
        let scope = if target.is_stage {
            VarScope::Global
        } else {
            VarScope::Local
        };
        for entry in target.variables.values() {
            shape.insert((target.name.clone(), entry.0.clone(), VarKind::Scalar, scope));
        }
        for entry in target.lists.values() {
            shape.insert((target.name.clone(), entry.0.clone(), VarKind::List, scope));
        }
    }
    shape
}

pub fn asset_hashes(manifest: &ArchiveManifest) -> BTreeSet<String> {
    manifest.storage_keys()
}
