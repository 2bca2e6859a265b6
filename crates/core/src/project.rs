//! The project description: which targets exist, where their scripts and
//! assets live, and their presentation defaults.
//!
//! Descriptions are TOML or JSON. Loading checks the whole document first and
//! reports every structural problem at once; nothing is compiled from a
//! document with violations.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FuseError, FuseResult, SchemaViolation};
use crate::frontend::is_identifier;
use crate::version::PROJECT_SCHEMA_VERSION;

/// Name reserved for the stage target.
pub const STAGE_NAME: &str = "Stage";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProjectDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    /// Type-declaration files merged over the builtins, in order.
    #[serde(default)]
    pub type_files: Vec<PathBuf>,
    #[serde(default)]
    pub extensions: Vec<String>,
    #[serde(default)]
    pub stage: StageBlock,
    /// Sprites, compiled in this order.
    #[serde(default)]
    pub targets: Vec<SpriteBlock>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StageBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<PathBuf>,
    #[serde(default = "default_tempo")]
    pub tempo: f64,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default)]
    pub current_costume: usize,
    #[serde(default)]
    pub backdrops: Vec<AssetRef>,
    #[serde(default)]
    pub sounds: Vec<AssetRef>,
}

impl Default for StageBlock {
    fn default() -> Self {
        Self {
            entry: None,
            tempo: default_tempo(),
            volume: default_volume(),
            current_costume: 0,
            backdrops: Vec::new(),
            sounds: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SpriteBlock {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<PathBuf>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default = "default_size")]
    pub size: f64,
    #[serde(default = "default_direction")]
    pub direction: f64,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub draggable: bool,
    #[serde(default)]
    pub rotation_style: RotationStyle,
    #[serde(default = "default_volume")]
    pub volume: f64,
    /// Defaults to the sprite's position in `targets`, counting from 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer_order: Option<u32>,
    #[serde(default)]
    pub current_costume: usize,
    #[serde(default)]
    pub costumes: Vec<AssetRef>,
    #[serde(default)]
    pub sounds: Vec<AssetRef>,
}

impl SpriteBlock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry: None,
            x: 0.0,
            y: 0.0,
            size: default_size(),
            direction: default_direction(),
            visible: true,
            draggable: false,
            rotation_style: RotationStyle::default(),
            volume: default_volume(),
            layer_order: None,
            current_costume: 0,
            costumes: Vec::new(),
            sounds: Vec::new(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum RotationStyle {
    #[default]
    #[serde(rename = "all around")]
    AllAround,
    #[serde(rename = "left-right")]
    LeftRight,
    #[serde(rename = "don't rotate")]
    DontRotate,
}

impl RotationStyle {
    pub const NAMES: [&'static str; 3] = ["all around", "left-right", "don't rotate"];

    pub fn as_str(self) -> &'static str {
        match self {
            RotationStyle::AllAround => "all around",
            RotationStyle::LeftRight => "left-right",
            RotationStyle::DontRotate => "don't rotate",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "all around" => Some(RotationStyle::AllAround),
            "left-right" => Some(RotationStyle::LeftRight),
            "don't rotate" => Some(RotationStyle::DontRotate),
            _ => None,
        }
    }
}

/// One costume, backdrop or sound file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AssetRef {
    pub path: PathBuf,
    /// Defaults to the file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_center: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitmap_resolution: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_count: Option<u64>,
}

impl AssetRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
            rotation_center: None,
            bitmap_resolution: None,
            rate: None,
            sample_count: None,
        }
    }

    pub fn logical_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| {
            self.path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "asset".to_string())
        })
    }
}

fn default_tempo() -> f64 {
    60.0
}

fn default_volume() -> f64 {
    100.0
}

fn default_size() -> f64 {
    100.0
}

fn default_direction() -> f64 {
    90.0
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptionFormat {
    Toml,
    Json,
}

impl DescriptionFormat {
    /// `.json` is JSON, everything else TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DescriptionFormat::Json,
            _ => DescriptionFormat::Toml,
        }
    }
}

impl ProjectDescription {
    /// Parses and validates a description, collecting every violation.
    pub fn parse(source: &str, format: DescriptionFormat) -> FuseResult<Self> {
        let document: Value = match format {
            DescriptionFormat::Json => serde_json::from_str(source)
                .map_err(|err| single_violation("<document>", err.to_string()))?,
            DescriptionFormat::Toml => {
                let table: toml::Value = toml::from_str(source)
                    .map_err(|err| single_violation("<document>", err.message().to_string()))?;
                serde_json::to_value(table)
                    .map_err(|err| single_violation("<document>", err.to_string()))?
            }
        };

        let violations = check_document(&document);
        if !violations.is_empty() {
            return Err(FuseError::SchemaViolation { violations });
        }
        serde_json::from_value(document).map_err(|err| single_violation("<document>", err.to_string()))
    }

    pub fn to_toml(&self) -> FuseResult<String> {
        toml::to_string_pretty(self).map_err(|err| FuseError::Serialization(err.to_string()))
    }

    pub fn to_json(&self) -> FuseResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// JSON Schema of the description format.
    pub fn json_schema() -> Value {
        let schema = schemars::schema_for!(ProjectDescription);
        serde_json::to_value(schema).unwrap_or(Value::Null)
    }
}

fn single_violation(location: &str, message: String) -> FuseError {
    FuseError::SchemaViolation {
        violations: vec![SchemaViolation {
            location: location.to_string(),
            message,
        }],
    }
}

/// A validated description together with the directory its paths are
/// relative to.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedProject {
    pub description: ProjectDescription,
    pub root: PathBuf,
}

impl LoadedProject {
    pub fn load(path: &Path) -> FuseResult<Self> {
        let source = fs::read_to_string(path).map_err(|err| FuseError::resolution(path, err))?;
        let description = ProjectDescription::parse(&source, DescriptionFormat::from_path(path))?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(
            path = %path.display(),
            sprites = description.targets.len(),
            "loaded project description"
        );
        Ok(Self { description, root })
    }

    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

const ROOT_KEYS: &[&str] = &["schema_version", "type_files", "extensions", "stage", "targets"];
const STAGE_KEYS: &[&str] = &["entry", "tempo", "volume", "current_costume", "backdrops", "sounds"];
const SPRITE_KEYS: &[&str] = &[
    "name",
    "entry",
    "x",
    "y",
    "size",
    "direction",
    "visible",
    "draggable",
    "rotation_style",
    "volume",
    "layer_order",
    "current_costume",
    "costumes",
    "sounds",
];
const ASSET_KEYS: &[&str] = &[
    "path",
    "name",
    "rotation_center",
    "bitmap_resolution",
    "rate",
    "sample_count",
];

#[derive(Default)]
struct Checker {
    violations: Vec<SchemaViolation>,
}

fn check_document(document: &Value) -> Vec<SchemaViolation> {
    let mut checker = Checker::default();
    checker.root(document);
    checker.violations
}

impl Checker {
    fn push(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.violations.push(SchemaViolation {
            location: location.into(),
            message: message.into(),
        });
    }

    fn object<'v>(
        &mut self,
        value: &'v Value,
        location: &str,
        allowed: &[&str],
    ) -> Option<&'v Map<String, Value>> {
        let Some(map) = value.as_object() else {
            self.push(location, "expected a table");
            return None;
        };
        for key in map.keys() {
            if !allowed.contains(&key.as_str()) {
                self.push(join(location, key), "unknown key");
            }
        }
        Some(map)
    }

    fn string<'v>(&mut self, map: &'v Map<String, Value>, key: &str, location: &str) -> Option<&'v str> {
        let value = map.get(key)?;
        match value.as_str() {
            Some(text) => Some(text),
            None => {
                self.push(join(location, key), "expected a string");
                None
            }
        }
    }

    fn number(&mut self, map: &Map<String, Value>, key: &str, location: &str) -> Option<f64> {
        let value = map.get(key)?;
        match value.as_f64() {
            Some(num) => Some(num),
            None => {
                self.push(join(location, key), "expected a number");
                None
            }
        }
    }

    fn unsigned(&mut self, map: &Map<String, Value>, key: &str, location: &str) -> Option<u64> {
        let value = map.get(key)?;
        match value.as_u64() {
            Some(num) => Some(num),
            None => {
                self.push(join(location, key), "expected a non-negative integer");
                None
            }
        }
    }

    /// An unsigned integer that must fit the 32-bit field it lands in.
    fn unsigned_u32(&mut self, map: &Map<String, Value>, key: &str, location: &str) -> Option<u32> {
        let value = self.unsigned(map, key, location)?;
        match u32::try_from(value) {
            Ok(num) => Some(num),
            Err(_) => {
                self.push(join(location, key), format!("{value} exceeds {}", u32::MAX));
                None
            }
        }
    }

    fn boolean(&mut self, map: &Map<String, Value>, key: &str, location: &str) {
        if let Some(value) = map.get(key) {
            if !value.is_boolean() {
                self.push(join(location, key), "expected true or false");
            }
        }
    }

    fn array<'v>(&mut self, map: &'v Map<String, Value>, key: &str, location: &str) -> Option<&'v Vec<Value>> {
        let value = map.get(key)?;
        match value.as_array() {
            Some(items) => Some(items),
            None => {
                self.push(join(location, key), "expected an array");
                None
            }
        }
    }

    fn root(&mut self, document: &Value) {
        let Some(map) = self.object(document, "", ROOT_KEYS) else {
            return;
        };
        if let Some(version) = self.string(map, "schema_version", "") {
            if version != PROJECT_SCHEMA_VERSION {
                self.push(
                    "schema_version",
                    format!("unsupported version {version}, expected {PROJECT_SCHEMA_VERSION}"),
                );
            }
        }
        if let Some(files) = self.array(map, "type_files", "") {
            for (index, file) in files.iter().enumerate() {
                if !file.is_string() {
                    self.push(format!("type_files[{index}]"), "expected a path string");
                }
            }
        }
        if let Some(extensions) = self.array(map, "extensions", "") {
            for (index, ext) in extensions.iter().enumerate() {
                match ext.as_str() {
                    Some(id) if is_identifier(id) => {}
                    Some(id) => self.push(
                        format!("extensions[{index}]"),
                        format!("invalid extension identifier '{id}'"),
                    ),
                    None => self.push(format!("extensions[{index}]"), "expected a string"),
                }
            }
        }
        if let Some(stage) = map.get("stage") {
            self.stage(stage);
        }
        if let Some(targets) = self.array(map, "targets", "") {
            let mut seen = HashSet::new();
            for (index, sprite) in targets.iter().enumerate() {
                self.sprite(sprite, &format!("targets[{index}]"), &mut seen);
            }
        }
    }

    fn stage(&mut self, value: &Value) {
        let Some(map) = self.object(value, "stage", STAGE_KEYS) else {
            return;
        };
        self.string(map, "entry", "stage");
        self.number(map, "tempo", "stage");
        self.volume(map, "stage");
        let backdrops = self.assets(map, "backdrops", "stage");
        self.assets(map, "sounds", "stage");
        self.current_costume(map, "stage", backdrops);
    }

    fn sprite(&mut self, value: &Value, location: &str, seen: &mut HashSet<String>) {
        let Some(map) = self.object(value, location, SPRITE_KEYS) else {
            return;
        };
        match map.get("name") {
            None => self.push(join(location, "name"), "missing sprite name"),
            Some(_) => {
                if let Some(name) = self.string(map, "name", location) {
                    if name.trim().is_empty() {
                        self.push(join(location, "name"), "sprite name is empty");
                    } else if name == STAGE_NAME {
                        self.push(join(location, "name"), format!("'{STAGE_NAME}' is reserved"));
                    } else if !seen.insert(name.to_string()) {
                        self.push(join(location, "name"), format!("duplicate sprite name '{name}'"));
                    }
                }
            }
        }
        self.string(map, "entry", location);
        for key in ["x", "y", "size", "direction"] {
            self.number(map, key, location);
        }
        self.boolean(map, "visible", location);
        self.boolean(map, "draggable", location);
        if let Some(style) = self.string(map, "rotation_style", location) {
            if RotationStyle::parse(style).is_none() {
                self.push(
                    join(location, "rotation_style"),
                    format!(
                        "unknown rotation style '{style}', expected one of {}",
                        RotationStyle::NAMES.join(", ")
                    ),
                );
            }
        }
        self.volume(map, location);
        if let Some(order) = self.unsigned_u32(map, "layer_order", location) {
            if order == 0 {
                self.push(join(location, "layer_order"), "layer 0 belongs to the stage");
            }
        }
        let costumes = self.assets(map, "costumes", location);
        self.assets(map, "sounds", location);
        self.current_costume(map, location, costumes);
    }

    fn volume(&mut self, map: &Map<String, Value>, location: &str) {
        if let Some(volume) = self.number(map, "volume", location) {
            if !(0.0..=100.0).contains(&volume) {
                self.push(join(location, "volume"), "volume must be between 0 and 100");
            }
        }
    }

    fn current_costume(&mut self, map: &Map<String, Value>, location: &str, costumes: usize) {
        if let Some(index) = self.unsigned(map, "current_costume", location) {
            // a target without costumes gets exactly one placeholder
            let available = costumes.max(1) as u64;
            if index >= available {
                self.push(
                    join(location, "current_costume"),
                    format!("index {index} is out of range for {available} costume(s)"),
                );
            }
        }
    }

    /// Checks an asset list and returns how many entries it has.
    fn assets(&mut self, map: &Map<String, Value>, key: &str, location: &str) -> usize {
        let Some(items) = self.array(map, key, location) else {
            return 0;
        };
        let list_location = join(location, key);
        for (index, item) in items.iter().enumerate() {
            let item_location = format!("{list_location}[{index}]");
            let Some(asset) = self.object(item, &item_location, ASSET_KEYS) else {
                continue;
            };
            match asset.get("path") {
                None => self.push(join(&item_location, "path"), "missing asset path"),
                Some(_) => {
                    self.string(asset, "path", &item_location);
                }
            }
            self.string(asset, "name", &item_location);
            if let Some(center) = asset.get("rotation_center") {
                let valid = center
                    .as_array()
                    .map(|pair| pair.len() == 2 && pair.iter().all(Value::is_number))
                    .unwrap_or(false);
                if !valid {
                    self.push(
                        join(&item_location, "rotation_center"),
                        "expected a pair of numbers",
                    );
                }
            }
            for key in ["bitmap_resolution", "rate"] {
                self.unsigned_u32(asset, key, &item_location);
            }
            self.unsigned(asset, "sample_count", &item_location);
        }
        items.len()
    }
}

fn join(location: &str, key: &str) -> String {
    if location.is_empty() {
        key.to_string()
    } else {
        format!("{location}.{key}")
    }
}

#[cfg(test)]
#[path = "tests/project_tests.rs"]
mod tests;
