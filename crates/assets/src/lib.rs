//! Content-addressed storage for project assets.
//!
//! Every blob is keyed by the md5 digest of its bytes plus its original
//! extension (`<hash>.<ext>`), the naming the package container uses for its
//! entries. Identical bytes always land on the same key no matter how many
//! logical names point at them.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Empty transparent image used for targets that declare no costumes.
pub const PLACEHOLDER_SVG: &[u8] = br#"<svg version="1.1" width="2" height="2" viewBox="-1 -1 2 2" xmlns="http://www.w3.org/2000/svg"></svg>"#;

const COSTUME_EXTENSIONS: &[&str] = &["svg", "png", "jpg", "jpeg"];
const SOUND_EXTENSIONS: &[&str] = &["wav", "mp3"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Costume,
    Sound,
}

impl AssetKind {
    pub fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            AssetKind::Costume => COSTUME_EXTENSIONS,
            AssetKind::Sound => SOUND_EXTENSIONS,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Costume => "costume",
            AssetKind::Sound => "sound",
        }
    }
}

/// Name of a stored blob: content hash plus lowercase extension.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    fn new(hash: &str, extension: &str) -> Self {
        Self(format!("{hash}.{extension}"))
    }

    /// Parses an archive entry name of the form `<hash>.<ext>`.
    pub fn parse(name: &str) -> Option<Self> {
        let (hash, ext) = name.rsplit_once('.')?;
        if hash.len() != 32 || !hash.chars().all(|c| c.is_ascii_hexdigit()) || ext.is_empty() {
            return None;
        }
        Some(Self::new(&hash.to_ascii_lowercase(), &ext.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn hash(&self) -> &str {
        self.0.rsplit_once('.').map(|(hash, _)| hash).unwrap_or(self.0.as_str())
    }

    pub fn extension(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("")
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug)]
pub struct AssetLimits {
    pub max_bytes: u64,
}

impl Default for AssetLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// What the store learned about a blob while loading it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetMetadata {
    pub key: StorageKey,
    pub format: String,
    pub size: u64,
    /// Pixel size for bitmap costumes.
    pub dimensions: Option<(u32, u32)>,
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("cannot read asset '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("asset path traversal blocked")]
    Traversal,
    #[error("asset '{}' has no file extension", .0.display())]
    MissingExtension(PathBuf),
    #[error("unsupported {kind} format '.{extension}'")]
    UnsupportedExtension {
        kind: &'static str,
        extension: String,
    },
    #[error("asset too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("no stored asset with key '{0}'")]
    NotFound(StorageKey),
    #[error("archive entry '{name}' does not match its content hash '{actual}'")]
    HashMismatch { name: String, actual: StorageKey },
}

/// In-memory, hash-keyed blob store living for one build or decompile run.
#[derive(Debug, Default)]
pub struct AssetStore {
    blobs: BTreeMap<StorageKey, Vec<u8>>,
    limits: AssetLimits,
}

impl AssetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: AssetLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Hashes `bytes` and stores them under `<hash>.<extension>`.
    ///
    /// Storing content that is already present is a no-op returning the
    /// existing key.
    pub fn store(&mut self, bytes: Vec<u8>, extension: &str) -> Result<StorageKey, AssetError> {
        let size = bytes.len() as u64;
        if size > self.limits.max_bytes {
            return Err(AssetError::TooLarge {
                size,
                max: self.limits.max_bytes,
            });
        }
        let key = StorageKey::new(&content_hash(&bytes), &extension.to_ascii_lowercase());
        if self.blobs.contains_key(&key) {
            debug!(key = %key, "asset already stored");
        } else {
            self.blobs.insert(key.clone(), bytes);
        }
        Ok(key)
    }

    /// Stores the fixed placeholder costume and returns its key.
    pub fn store_placeholder(&mut self) -> StorageKey {
        let key = placeholder_key();
        self.blobs
            .entry(key.clone())
            .or_insert_with(|| PLACEHOLDER_SVG.to_vec());
        key
    }

    /// Reads a stored blob back out by key.
    pub fn extract(&self, key: &StorageKey) -> Result<&[u8], AssetError> {
        self.blobs
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| AssetError::NotFound(key.clone()))
    }

    /// Re-imports a blob read from a container, checking that its entry name
    /// agrees with its content.
    pub fn restore(&mut self, name: &str, bytes: Vec<u8>) -> Result<StorageKey, AssetError> {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("");
        let actual = StorageKey::new(&content_hash(&bytes), &extension.to_ascii_lowercase());
        if !actual.as_str().eq_ignore_ascii_case(name) {
            return Err(AssetError::HashMismatch {
                name: name.to_string(),
                actual,
            });
        }
        self.store(bytes, extension)
    }

    /// Reads a source file from disk and stores it.
    pub fn load_file(&mut self, path: &Path, kind: AssetKind) -> Result<AssetMetadata, AssetError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| AssetError::MissingExtension(path.to_path_buf()))?;
        if !kind.allowed_extensions().contains(&extension.as_str()) {
            return Err(AssetError::UnsupportedExtension {
                kind: kind.label(),
                extension,
            });
        }
        let format = if extension == "jpeg" {
            "jpg".to_string()
        } else {
            extension
        };
        let bytes = fs::read(path).map_err(|source| AssetError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let size = bytes.len() as u64;
        let dimensions = probe_dimensions(&bytes, &format);
        let key = self.store(bytes, &format)?;
        Ok(AssetMetadata {
            key,
            format,
            size,
            dimensions,
        })
    }

    pub fn contains(&self, key: &StorageKey) -> bool {
        self.blobs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Stored blobs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&StorageKey, &[u8])> {
        self.blobs.iter().map(|(key, bytes)| (key, bytes.as_slice()))
    }
}

/// Key of [`PLACEHOLDER_SVG`].
pub fn placeholder_key() -> StorageKey {
    StorageKey::new(&content_hash(PLACEHOLDER_SVG), "svg")
}

/// Lowercase hex md5 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", md5::compute(bytes))
}

/// Pixel dimensions of a bitmap, `None` for vector or undecodable data.
pub fn probe_dimensions(bytes: &[u8], extension: &str) -> Option<(u32, u32)> {
    let format = ImageFormat::from_extension(extension)?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return None;
    }
    ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .ok()
}

pub fn sanitize_rel_path(rel: &Path) -> Result<PathBuf, AssetError> {
    use std::path::Component::*;
    let mut out = PathBuf::new();
    for component in rel.components() {
        match component {
            CurDir => {}
            Normal(part) => out.push(part),
            ParentDir | RootDir | Prefix(_) => return Err(AssetError::Traversal),
        }
    }
    Ok(out)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
