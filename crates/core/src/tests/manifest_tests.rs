use serde_json::json;

use super::*;

fn sample() -> ArchiveManifest {
    let mut stage = TargetRecord::new("Stage", true);
    stage.variables.insert(
        "id-score".to_string(),
        VariableEntry("score".to_string(), json!(0)),
    );
    stage.costumes.push(CostumeRecord {
        asset_id: "cd21514d0531fdffb22204e0ec5ed84a".to_string(),
        name: "backdrop1".to_string(),
        md5ext: "cd21514d0531fdffb22204e0ec5ed84a.svg".to_string(),
        data_format: "svg".to_string(),
        rotation_center_x: 240.0,
        rotation_center_y: 180.0,
        bitmap_resolution: None,
    });
    let mut sprite = TargetRecord::new("Sprite1", false);
    sprite.layer_order = 1;
    sprite.lists.insert(
        "id-items".to_string(),
        ListEntry("items".to_string(), vec![json!(1), json!("two")]),
    );
    sprite.sounds.push(SoundRecord {
        asset_id: "83a9787d4cb6f3b7632b4ddfebf74367".to_string(),
        name: "pop".to_string(),
        md5ext: "83a9787d4cb6f3b7632b4ddfebf74367.wav".to_string(),
        data_format: "wav".to_string(),
        rate: 48000,
        sample_count: 1123,
    });
    ArchiveManifest {
        targets: vec![stage, sprite],
        monitors: Vec::new(),
        extensions: vec!["pen".to_string()],
        meta: ManifestMeta::default(),
    }
}

#[test]
fn serializes_with_editor_field_names() {
    let value = serde_json::to_value(sample()).expect("serializes");
    let stage = &value["targets"][0];
    assert_eq!(stage["isStage"], json!(true));
    assert_eq!(stage["tempo"], json!(60.0));
    assert_eq!(stage["videoState"], json!("on"));
    assert_eq!(stage["variables"]["id-score"], json!(["score", 0]));
    assert!(stage.get("rotationStyle").is_none());

    let sprite = &value["targets"][1];
    assert_eq!(sprite["rotationStyle"], json!("all around"));
    assert_eq!(sprite["layerOrder"], json!(1));
    assert_eq!(sprite["lists"]["id-items"], json!(["items", [1, "two"]]));
    assert_eq!(sprite["sounds"][0]["sampleCount"], json!(1123));
    assert!(sprite.get("tempo").is_none());
    assert_eq!(value["meta"]["semver"], json!("3.0.0"));
}

#[test]
fn parses_back_what_it_writes() {
    let manifest = sample();
    let bytes = manifest.to_vec().expect("serializes");
    assert_eq!(ArchiveManifest::from_slice(&bytes).expect("parses"), manifest);
}

#[test]
fn rejects_manifests_without_a_leading_stage() {
    let mut manifest = sample();
    manifest.targets.reverse();
    let bytes = manifest.to_vec().expect("serializes");
    assert!(matches!(
        ArchiveManifest::from_slice(&bytes),
        Err(FuseError::Archive(_))
    ));

    let empty = br#"{ "targets": [], "meta": { "semver": "3.0.0" } }"#;
    assert!(ArchiveManifest::from_slice(empty).is_err());
}

#[test]
fn fingerprint_tracks_content() {
    let manifest = sample();
    let first = manifest.fingerprint().expect("fingerprint");
    assert_eq!(first.len(), 64);
    assert_eq!(first, sample().fingerprint().expect("fingerprint"));

    let mut changed = sample();
    changed.targets[1].x = Some(5.0);
    assert_ne!(first, changed.fingerprint().expect("fingerprint"));
}

#[test]
fn storage_keys_cover_costumes_and_sounds() {
    let keys: Vec<_> = sample().storage_keys().into_iter().collect();
    assert_eq!(
        keys,
        vec![
            "83a9787d4cb6f3b7632b4ddfebf74367.wav".to_string(),
            "cd21514d0531fdffb22204e0ec5ed84a.svg".to_string(),
        ]
    );
    assert_eq!(sample().targets[1].symbol_name("id-items"), Some("items"));
}

#[test]
fn missing_optional_fields_take_defaults() {
    let raw = json!({
        "targets": [
            { "isStage": true, "name": "Stage" },
            { "isStage": false, "name": "Cat", "x": 12 }
        ],
        "meta": { "semver": "3.0.0" }
    });
    let manifest =
        ArchiveManifest::from_slice(raw.to_string().as_bytes()).expect("minimal manifest");
    let cat = manifest.target("Cat").expect("sprite");
    assert_eq!(cat.x, Some(12.0));
    assert_eq!(cat.volume, 100.0);
    assert_eq!(cat.blocks, json!({}));
    assert_eq!(manifest.sprites().count(), 1);
}
