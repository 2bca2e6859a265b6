use std::path::Path;

use super::*;
use crate::error::FuseError;
use crate::frontend::{FuseFrontend, ScriptParser};
use crate::variable::VarKind;

fn source(name: &str, text: &str) -> TargetSource {
    let script = FuseFrontend
        .parse(Path::new("test.fuse"), text)
        .expect("test source parses");
    if name == STAGE_NAME {
        TargetSource::stage(None, script)
    } else {
        TargetSource::sprite(name, None, script)
    }
}

fn reconcile(stage: &str, sprites: &[(&str, &str)]) -> FuseResult<ReconciledProject> {
    let stage = source(STAGE_NAME, stage);
    let sprites: Vec<_> = sprites.iter().map(|(name, text)| source(name, text)).collect();
    ScopeReconciler::new(&FuseFrontend, NamespaceNode::builtins()).reconcile(&stage, &sprites)
}

#[test]
fn stage_variables_are_always_global() {
    let project = reconcile("var volume = 5\nlist names = []\n", &[]).expect("builds");
    assert_eq!(project.globals.len(), 2);
    assert_eq!(
        project.globals.get("names").map(|v| (v.kind, v.scope)),
        Some((VarKind::List, VarScope::Global))
    );
    assert!(project.stage().expect("stage").locals.is_empty());
}

#[test]
fn sprite_globals_are_visible_only_to_later_sprites() {
    let declares = "global score = 0\n";
    let uses = "on flag {\n    change score by 1\n}\n";

    let project = reconcile("", &[("A", declares), ("B", uses)]).expect("B sees A's global");
    assert_eq!(project.targets.len(), 3);
    assert_eq!(project.target("B").expect("B").visible_globals, 1);

    let err = reconcile("", &[("B", uses), ("A", declares)]).expect_err("B compiles first");
    assert!(matches!(err, FuseError::UnresolvedSymbol { ref target, .. } if target == "B"));
}

#[test]
fn global_scope_only_grows() {
    let project = reconcile(
        "var a = 0\n",
        &[
            ("S1", "global b = 0\n"),
            ("S2", "var local_only = 0\n"),
            ("S3", "global c = 0\nglobal a = 1\n"),
        ],
    )
    .expect("builds");
    let visible: Vec<_> = project.targets.iter().map(|t| t.visible_globals).collect();
    assert_eq!(visible, vec![0, 1, 2, 2]);
    assert_eq!(project.globals.len(), 3);
    // redeclaring with the same kind keeps the first default
    assert_eq!(
        project.globals.get("a").map(|v| v.default.clone()),
        Some(crate::variable::DefaultValue::Scalar(
            crate::variable::Literal::Number("0".into())
        ))
    );
    assert!(project.warnings.is_empty());
}

#[test]
fn local_shadowing_a_global_is_dropped_with_a_warning() {
    let project = reconcile("var score = 0\n", &[("Sprite1", "var score = 3\n")]).expect("builds");
    let sprite = project.target("Sprite1").expect("sprite");
    assert!(sprite.locals.is_empty());
    assert_eq!(project.warnings.len(), 1);
    assert!(matches!(
        &project.warnings[0],
        Warning::SymbolConflict { target, name, .. } if target == "Sprite1" && name == "score"
    ));
}

#[test]
fn global_redeclared_with_another_kind_keeps_the_first() {
    let project =
        reconcile("var items = 0\n", &[("Sprite1", "global list items = []\n")]).expect("builds");
    assert_eq!(
        project.globals.get("items").map(|v| v.kind),
        Some(VarKind::Scalar)
    );
    assert_eq!(project.warnings.len(), 1);
}

#[test]
fn sprites_keep_separate_locals_with_the_same_name() {
    let project = reconcile(
        "",
        &[("Sprite1", "var counter = 0\n"), ("Sprite2", "var counter = 0\n")],
    )
    .expect("builds");
    assert!(project.globals.is_empty());
    for name in ["Sprite1", "Sprite2"] {
        let target = project.target(name).expect("sprite");
        assert_eq!(
            target.locals.get("counter").map(|v| v.scope),
            Some(VarScope::Local)
        );
    }
}

fn changed_variables(target: &CompiledTarget) -> Vec<(String, VarScope)> {
    use crate::frontend::Op;
    target
        .graph
        .scripts
        .iter()
        .flat_map(|script| &script.ops)
        .filter_map(|op| match op {
            Op::ChangeVariable { var, .. } => Some((var.name.clone(), var.scope)),
            _ => None,
        })
        .collect()
}

#[test]
fn local_stored_under_a_global_name_follows_the_global() {
    let project = reconcile(
        "var score = 0\n",
        &[("A", "var s as \"score\" = 5\n\non flag {\n    change s by 1\n}\n")],
    )
    .expect("builds");
    let sprite = project.target("A").expect("A");
    assert!(sprite.locals.is_empty());
    assert!(matches!(
        project.warnings.as_slice(),
        [Warning::SymbolConflict { target, name, .. }] if target == "A" && name == "score"
    ));
    assert_eq!(
        changed_variables(sprite),
        vec![("score".to_string(), VarScope::Global)]
    );
}

#[test]
fn second_global_with_a_taken_manifest_name_is_dropped() {
    let project = reconcile(
        "var score = 0\n",
        &[("A", "global points as \"score\" = 1\n\non flag {\n    change points by 1\n}\n")],
    )
    .expect("builds");
    assert_eq!(project.globals.len(), 1);
    assert!(project.globals.get("points").is_none());
    assert_eq!(project.warnings.len(), 1);
    assert_eq!(
        changed_variables(project.target("A").expect("A")),
        vec![("score".to_string(), VarScope::Global)]
    );
}

#[test]
fn locals_sharing_a_manifest_name_keep_the_first() {
    let project = reconcile(
        "",
        &[(
            "A",
            "var a as \"x\" = 0\nvar b as \"x\" = 1\n\non flag {\n    change b by 1\n}\n",
        )],
    )
    .expect("builds");
    let sprite = project.target("A").expect("A");
    assert_eq!(sprite.locals.len(), 1);
    assert!(sprite.locals.get("a").is_some());
    assert_eq!(project.warnings.len(), 1);
    assert_eq!(changed_variables(sprite), vec![("a".to_string(), VarScope::Local)]);
}

#[test]
fn global_taking_an_earlier_sprites_local_name_is_reported() {
    let project = reconcile(
        "",
        &[
            ("A", "var g = 1\n\non flag {\n    change g by 1\n}\n"),
            ("B", "global g = 0\n"),
        ],
    )
    .expect("the visibility order allows it");
    assert!(project.target("A").expect("A").locals.get("g").is_some());
    assert!(project.globals.get("g").is_some());
    assert!(matches!(
        project.warnings.as_slice(),
        [Warning::SymbolConflict { target, name, reason }]
            if target == "B" && name == "g" && reason.contains("'A'")
    ));
}
