use std::path::Path;

use fusepack_assets::placeholder_key;

use super::*;
use crate::frontend::{FuseFrontend, ScriptParser};
use crate::namespace::NamespaceNode;
use crate::project::{ProjectDescription, StageBlock};
use crate::reconcile::{ScopeReconciler, TargetSource};

const SVG: &[u8] = br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"></svg>"#;

fn script(text: &str) -> crate::frontend::Script {
    FuseFrontend
        .parse(Path::new("inline.fuse"), text)
        .expect("inline source parses")
}

fn build(
    root: &Path,
    stage_src: &str,
    sprites: Vec<(SpriteBlock, &str)>,
) -> FuseResult<(ArchiveManifest, AssetStore)> {
    let description = ProjectDescription {
        schema_version: None,
        type_files: Vec::new(),
        extensions: Vec::new(),
        stage: StageBlock::default(),
        targets: sprites.iter().map(|(block, _)| block.clone()).collect(),
    };
    let project = LoadedProject {
        description,
        root: root.to_path_buf(),
    };
    let stage = TargetSource::stage(None, script(stage_src));
    let sources: Vec<_> = sprites
        .iter()
        .map(|(block, text)| TargetSource::sprite(&block.name, None, script(text)))
        .collect();
    let reconciled =
        ScopeReconciler::new(&FuseFrontend, NamespaceNode::builtins()).reconcile(&stage, &sources)?;
    let mut store = AssetStore::new();
    let manifest = ArchiveAssembler::new(&FuseFrontend, "test-agent")
        .assemble(&project, &reconciled, &mut store)?;
    Ok((manifest, store))
}

#[test]
fn targets_without_costumes_get_one_placeholder() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (manifest, store) =
        build(dir.path(), "", vec![(SpriteBlock::new("Sprite1"), "global score = 0\n")])
            .expect("builds");

    let stage = manifest.stage().expect("stage");
    assert_eq!(stage.costumes.len(), 1);
    assert_eq!(stage.costumes[0].name, "backdrop1");
    let sprite = manifest.target("Sprite1").expect("sprite");
    assert_eq!(sprite.costumes.len(), 1);
    assert_eq!(sprite.costumes[0].name, "costume1");
    assert_eq!(sprite.costumes[0].md5ext, placeholder_key().as_str());
    // one shared blob
    assert_eq!(store.len(), 1);

    assert_eq!(stage.variables.len(), 1);
    let entry = stage.variables.values().next().expect("score");
    assert_eq!(entry.0, "score");
    assert_eq!(entry.1, serde_json::json!(0));
    assert!(sprite.variables.is_empty());
    assert_eq!(sprite.layer_order, 1);
    assert_eq!(manifest.meta.agent, "test-agent");
}

#[test]
fn same_named_locals_get_distinct_ids() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (manifest, _) = build(
        dir.path(),
        "",
        vec![
            (SpriteBlock::new("Sprite1"), "var counter = 0\n"),
            (SpriteBlock::new("Sprite2"), "var counter = 0\n"),
        ],
    )
    .expect("builds");
    let first = manifest.target("Sprite1").expect("sprite1");
    let second = manifest.target("Sprite2").expect("sprite2");
    let first_id = first.variables.keys().next().expect("counter id");
    let second_id = second.variables.keys().next().expect("counter id");
    assert_ne!(first_id, second_id);
    assert!(manifest.stage().expect("stage").variables.is_empty());
}

#[test]
fn identical_asset_bytes_are_stored_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("a.svg"), SVG).expect("write a");
    fs::write(dir.path().join("b.svg"), SVG).expect("write b");
    let mut one = SpriteBlock::new("One");
    one.costumes.push(AssetRef::new("a.svg"));
    let mut two = SpriteBlock::new("Two");
    let mut costume = AssetRef::new("b.svg");
    costume.rotation_center = Some([5.0, 5.0]);
    two.costumes.push(costume);

    let (manifest, store) = build(dir.path(), "", vec![(one, ""), (two, "")]).expect("builds");
    let a = &manifest.target("One").expect("one").costumes[0];
    let b = &manifest.target("Two").expect("two").costumes[0];
    assert_eq!(a.md5ext, b.md5ext);
    assert_eq!(a.name, "a");
    assert_eq!((a.rotation_center_x, a.rotation_center_y), (0.0, 0.0));
    assert_eq!((b.rotation_center_x, b.rotation_center_y), (5.0, 5.0));
    // the stage placeholder plus one costume blob
    assert_eq!(store.len(), 2);

    let bytes = archive_bytes(&manifest, &store).expect("zip");
    let archive = ZipArchive::new(Cursor::new(bytes)).expect("readable zip");
    assert_eq!(archive.len(), 3);
}

#[test]
fn missing_asset_names_the_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut sprite = SpriteBlock::new("Sprite1");
    sprite.costumes.push(AssetRef::new("nope.svg"));
    let err = build(dir.path(), "", vec![(sprite, "")]).expect_err("missing asset");
    match err {
        FuseError::Resolution { path, .. } => assert!(path.ends_with("nope.svg")),
        other => panic!("expected a resolution failure, got {other:?}"),
    }
}

#[test]
fn extensions_are_detected_from_opcodes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (manifest, _) = build(
        dir.path(),
        "",
        vec![(SpriteBlock::new("Pen"), "on flag {\n    pen::clear()\n    looks::show()\n}\n")],
    )
    .expect("builds");
    assert_eq!(manifest.extensions, vec!["pen".to_string()]);
}

#[test]
fn archives_round_trip_through_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (manifest, store) = build(
        dir.path(),
        "var level = 1\n",
        vec![(
            SpriteBlock::new("Sprite1"),
            "on message \"start\" {\n    change level by 1\n}\n",
        )],
    )
    .expect("builds");
    assert_eq!(
        manifest.stage().expect("stage").broadcasts.values().collect::<Vec<_>>(),
        vec!["start"]
    );

    let path = dir.path().join("out").join("game.sb3");
    write_archive(&path, &manifest, &store).expect("written");
    let (read_back, restored) = read_archive(&path).expect("read back");
    assert_eq!(read_back, manifest);
    assert_eq!(restored.len(), store.len());
    // nothing left behind but the archive
    let leftovers = fs::read_dir(path.parent().expect("parent"))
        .expect("list")
        .count();
    assert_eq!(leftovers, 1);
}

#[test]
fn rebuilding_is_byte_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let sprites = || vec![(SpriteBlock::new("Sprite1"), "var counter = 0\nglobal list log = []\n")];
    let (first, first_store) = build(dir.path(), "", sprites()).expect("builds");
    let (second, second_store) = build(dir.path(), "", sprites()).expect("builds");
    assert_eq!(
        archive_bytes(&first, &first_store).expect("zip"),
        archive_bytes(&second, &second_store).expect("zip")
    );
    assert_eq!(
        opaque_id("Sprite1", "variable", "counter"),
        opaque_id("Sprite1", "variable", "counter")
    );
    assert_ne!(
        opaque_id("Sprite1", "variable", "counter"),
        opaque_id("Sprite2", "variable", "counter")
    );
}

#[test]
fn archives_without_a_manifest_are_rejected() {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut buffer);
        zip.start_file("readme.txt", SimpleFileOptions::default())
            .expect("entry");
        zip.write_all(b"hello").expect("write");
        zip.finish().expect("finish");
    }
    let err = read_archive_bytes(buffer.get_ref()).expect_err("no manifest");
    assert!(matches!(err, FuseError::Archive(_)));
}
