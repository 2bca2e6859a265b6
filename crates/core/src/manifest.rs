use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{FuseError, FuseResult};
use crate::version::{DEFAULT_AGENT, MANIFEST_SEMVER, MANIFEST_VM};

/// `project.json`: the single manifest stored at the root of an archive.
///
/// Targets are listed stage first. Variables, lists and broadcasts are keyed
/// by opaque ids; the names people see are stored alongside.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub targets: Vec<TargetRecord>,
    #[serde(default)]
    pub monitors: Vec<Value>,
    #[serde(default)]
    pub extensions: Vec<String>,
    pub meta: ManifestMeta,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestMeta {
    pub semver: String,
    #[serde(default)]
    pub vm: String,
    #[serde(default)]
    pub agent: String,
}

impl ManifestMeta {
    pub fn with_agent(agent: impl Into<String>) -> Self {
        Self {
            semver: MANIFEST_SEMVER.to_string(),
            vm: MANIFEST_VM.to_string(),
            agent: agent.into(),
        }
    }
}

impl Default for ManifestMeta {
    fn default() -> Self {
        Self::with_agent(DEFAULT_AGENT)
    }
}

/// `[name, value]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariableEntry(pub String, pub Value);

/// `[name, [values]]`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ListEntry(pub String, pub Vec<Value>);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRecord {
    pub is_stage: bool,
    pub name: String,
    #[serde(default)]
    pub variables: BTreeMap<String, VariableEntry>,
    #[serde(default)]
    pub lists: BTreeMap<String, ListEntry>,
    #[serde(default)]
    pub broadcasts: BTreeMap<String, String>,
    #[serde(default = "empty_object")]
    pub blocks: Value,
    #[serde(default = "empty_object")]
    pub comments: Value,
    #[serde(default)]
    pub current_costume: usize,
    #[serde(default)]
    pub costumes: Vec<CostumeRecord>,
    #[serde(default)]
    pub sounds: Vec<SoundRecord>,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub layer_order: u32,

    // stage only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_transparency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_to_speech_language: Option<String>,

    // sprites only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draggable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_style: Option<String>,
}

impl TargetRecord {
    /// An empty record with the editor's defaults for its kind.
    pub fn new(name: impl Into<String>, is_stage: bool) -> Self {
        let mut record = Self {
            is_stage,
            name: name.into(),
            variables: BTreeMap::new(),
            lists: BTreeMap::new(),
            broadcasts: BTreeMap::new(),
            blocks: empty_object(),
            comments: empty_object(),
            current_costume: 0,
            costumes: Vec::new(),
            sounds: Vec::new(),
            volume: default_volume(),
            layer_order: 0,
            tempo: None,
            video_transparency: None,
            video_state: None,
            text_to_speech_language: None,
            visible: None,
            x: None,
            y: None,
            size: None,
            direction: None,
            draggable: None,
            rotation_style: None,
        };
        if is_stage {
            record.tempo = Some(60.0);
            record.video_transparency = Some(50.0);
            record.video_state = Some("on".to_string());
        } else {
            record.visible = Some(true);
            record.x = Some(0.0);
            record.y = Some(0.0);
            record.size = Some(100.0);
            record.direction = Some(90.0);
            record.draggable = Some(false);
            record.rotation_style = Some("all around".to_string());
        }
        record
    }

    /// Display name of the variable or list stored under `id`.
    pub fn symbol_name(&self, id: &str) -> Option<&str> {
        self.variables
            .get(id)
            .map(|entry| entry.0.as_str())
            .or_else(|| self.lists.get(id).map(|entry| entry.0.as_str()))
    }
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn default_volume() -> f64 {
    100.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostumeRecord {
    pub asset_id: String,
    pub name: String,
    pub md5ext: String,
    pub data_format: String,
    #[serde(default)]
    pub rotation_center_x: f64,
    #[serde(default)]
    pub rotation_center_y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitmap_resolution: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundRecord {
    pub asset_id: String,
    pub name: String,
    pub md5ext: String,
    pub data_format: String,
    #[serde(default)]
    pub rate: u32,
    #[serde(default)]
    pub sample_count: u64,
}

impl ArchiveManifest {
    /// Parses `project.json`. The stage must be present and listed first.
    pub fn from_slice(bytes: &[u8]) -> FuseResult<Self> {
        let manifest: ArchiveManifest = serde_json::from_slice(bytes)?;
        match manifest.targets.first() {
            Some(first) if first.is_stage => {}
            Some(_) => return Err(FuseError::Archive("the stage must be the first target".into())),
            None => return Err(FuseError::Archive("manifest has no targets".into())),
        }
        if manifest.targets.iter().filter(|t| t.is_stage).count() > 1 {
            return Err(FuseError::Archive("manifest has more than one stage".into()));
        }
        Ok(manifest)
    }

    pub fn to_vec(&self) -> FuseResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn stage(&self) -> Option<&TargetRecord> {
        self.targets.iter().find(|target| target.is_stage)
    }

    pub fn sprites(&self) -> impl Iterator<Item = &TargetRecord> {
        self.targets.iter().filter(|target| !target.is_stage)
    }

    pub fn target(&self, name: &str) -> Option<&TargetRecord> {
        self.targets.iter().find(|target| target.name == name)
    }

    /// Every `<hash>.<ext>` referenced by a costume or sound.
    pub fn storage_keys(&self) -> BTreeSet<String> {
        self.targets
            .iter()
            .flat_map(|target| {
                target
                    .costumes
                    .iter()
                    .map(|c| c.md5ext.clone())
                    .chain(target.sounds.iter().map(|s| s.md5ext.clone()))
            })
            .collect()
    }

    /// SHA-256 of the serialized manifest, hex encoded.
    pub fn fingerprint(&self) -> FuseResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(self.to_vec()?);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
#[path = "tests/manifest_tests.rs"]
mod tests;
