use super::*;

fn violations(source: &str) -> Vec<SchemaViolation> {
    match ProjectDescription::parse(source, DescriptionFormat::Toml) {
        Err(FuseError::SchemaViolation { violations }) => violations,
        other => panic!("expected schema violations, got {other:?}"),
    }
}

fn has(violations: &[SchemaViolation], location: &str) -> bool {
    violations.iter().any(|v| v.location == location)
}

#[test]
fn empty_stage_uses_defaults() {
    let description =
        ProjectDescription::parse("[stage]\n", DescriptionFormat::Toml).expect("valid");
    assert_eq!(description.stage, StageBlock::default());
    assert_eq!(description.stage.tempo, 60.0);
    assert!(description.targets.is_empty());
}

#[test]
fn sprite_fields_default_like_the_editor() {
    let source = r#"
[stage]
entry = "stage.fuse"

[[targets]]
name = "Sprite1"
entry = "sprite1.fuse"
x = 10
costumes = [{ path = "cat.svg", rotation_center = [48, 50] }]
"#;
    let description = ProjectDescription::parse(source, DescriptionFormat::Toml).expect("valid");
    let sprite = &description.targets[0];
    assert_eq!(sprite.x, 10.0);
    assert_eq!(sprite.size, 100.0);
    assert_eq!(sprite.direction, 90.0);
    assert!(sprite.visible);
    assert!(!sprite.draggable);
    assert_eq!(sprite.rotation_style, RotationStyle::AllAround);
    assert_eq!(sprite.costumes[0].logical_name(), "cat");
    assert_eq!(sprite.costumes[0].rotation_center, Some([48.0, 50.0]));
}

#[test]
fn every_violation_is_collected() {
    let source = r#"
extensions = ["pen", "bad-id"]
colour = "red"

[stage]
tempo = "fast"

[[targets]]
name = "A"
rotation_style = "spin"

[[targets]]
name = "A"
visible = "yes"

[[targets]]
entry = "nameless.fuse"

[[targets]]
name = "Stage"
costumes = [{ name = "no path" }]
"#;
    let found = violations(source);
    assert!(has(&found, "colour"), "{found:?}");
    assert!(has(&found, "extensions[1]"));
    assert!(has(&found, "stage.tempo"));
    assert!(has(&found, "targets[0].rotation_style"));
    assert!(has(&found, "targets[1].name"));
    assert!(has(&found, "targets[1].visible"));
    assert!(has(&found, "targets[2].name"));
    assert!(has(&found, "targets[3].name"));
    assert!(has(&found, "targets[3].costumes[0].path"));
    assert_eq!(found.len(), 9, "{found:?}");
}

#[test]
fn current_costume_must_exist() {
    let found = violations("[[targets]]\nname = \"S\"\ncurrent_costume = 1\n");
    assert!(has(&found, "targets[0].current_costume"));
}

#[test]
fn oversized_integers_are_located() {
    let found = violations(
        r#"
[[targets]]
name = "S"
layer_order = 4294967296
sounds = [{ path = "a.wav", rate = 4294967296, sample_count = 4294967296 }]
costumes = [{ path = "a.svg", bitmap_resolution = 5000000000 }]
"#,
    );
    let locations: Vec<_> = found.iter().map(|v| v.location.as_str()).collect();
    assert_eq!(
        locations,
        vec![
            "targets[0].layer_order",
            "targets[0].costumes[0].bitmap_resolution",
            "targets[0].sounds[0].rate",
        ]
    );
    assert!(found.iter().all(|v| v.message.contains("exceeds")));
}

#[test]
fn fractional_layer_order_is_located() {
    let found = violations(r#"[[targets]]
name = "S"
layer_order = 2.5
"#);
    assert!(has(&found, "targets[0].layer_order"));
}

#[test]
fn json_descriptions_are_accepted() {
    let source = r#"{ "stage": { "volume": 50 }, "targets": [ { "name": "Cat" } ] }"#;
    let description = ProjectDescription::parse(source, DescriptionFormat::Json).expect("valid");
    assert_eq!(description.stage.volume, 50.0);
    assert_eq!(description.targets[0].name, "Cat");
    assert_eq!(
        DescriptionFormat::from_path(Path::new("project.JSON")),
        DescriptionFormat::Json
    );
}

#[test]
fn syntax_errors_are_schema_violations() {
    let found = violations("[stage\n");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].location, "<document>");
}

#[test]
fn toml_output_parses_back() {
    let mut sprite = SpriteBlock::new("Sprite1");
    sprite.entry = Some(PathBuf::from("sprite1.fuse"));
    sprite.rotation_style = RotationStyle::DontRotate;
    let mut costume = AssetRef::new("assets/Sprite1/cat.png");
    costume.rotation_center = Some([10.0, 12.5]);
    sprite.costumes.push(costume);
    let description = ProjectDescription {
        schema_version: Some(PROJECT_SCHEMA_VERSION.to_string()),
        type_files: Vec::new(),
        extensions: vec!["pen".to_string()],
        stage: StageBlock::default(),
        targets: vec![sprite],
    };

    let text = description.to_toml().expect("serializes");
    let parsed = ProjectDescription::parse(&text, DescriptionFormat::Toml).expect("parses back");
    assert_eq!(parsed, description);
}

#[test]
fn schema_lists_top_level_sections() {
    let schema = ProjectDescription::json_schema();
    let properties = schema["properties"].as_object().expect("object schema");
    for key in ROOT_KEYS {
        assert!(properties.contains_key(*key), "missing {key}");
    }
}

#[test]
fn missing_description_is_a_resolution_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = LoadedProject::load(&dir.path().join("project.toml")).expect_err("missing");
    assert!(matches!(err, FuseError::Resolution { .. }));
}
