use super::*;

fn module_with_function(path: &[&str], name: &str, opcode: &str) -> NamespaceNode {
    let mut root = NamespaceNode::root();
    root.module_entry(path).functions.insert(
        name.to_string(),
        FunctionSig {
            params: vec!["a".to_string()],
            opcode: Some(opcode.to_string()),
        },
    );
    root
}

#[test]
fn merge_grafts_modules_only_in_upper() {
    let base = module_with_function(&["looks"], "say", "looks_say");
    let upper = module_with_function(&["pen", "extra"], "glow", "pen_glow");

    let merged = merge(&base, &upper);
    assert!(merged.resolve_member(&["looks"], "say").is_some());
    assert!(merged.resolve_member(&["pen", "extra"], "glow").is_some());
    // inputs are untouched
    assert!(base.lookup(&["pen"]).is_none());
    assert!(upper.lookup(&["looks"]).is_none());
}

#[test]
fn merge_is_right_biased_at_leaves() {
    let base = module_with_function(&["looks"], "say", "looks_say");
    let upper = module_with_function(&["looks"], "say", "looks_sayforsecs");

    let merged = merge(&base, &upper);
    let Some(Member::Function(sig)) = merged.resolve_member(&["looks"], "say") else {
        panic!("say should resolve to a function");
    };
    assert_eq!(sig.opcode.as_deref(), Some("looks_sayforsecs"));
}

#[test]
fn merge_recurses_into_shared_modules_and_keeps_base_entries() {
    let mut base = module_with_function(&["pen"], "clear", "pen_clear");
    base.module_entry(&["pen", "inner"])
        .externs
        .insert("x".to_string(), "number".to_string());
    let mut upper = NamespaceNode::root();
    upper
        .module_entry(&["pen", "inner"])
        .externs
        .insert("y".to_string(), "string".to_string());
    upper
        .module_entry(&["pen"])
        .variables
        .insert("size".to_string(), VarKind::Scalar);

    let merged = merge(&base, &upper);
    assert!(merged.resolve_member(&["pen"], "clear").is_some());
    assert_eq!(
        merged.resolve_member(&["pen"], "size"),
        Some(Member::Variable(VarKind::Scalar))
    );
    assert_eq!(
        merged.resolve_member(&["pen", "inner"], "x"),
        Some(Member::Extern("number"))
    );
    assert_eq!(
        merged.resolve_member(&["pen", "inner"], "y"),
        Some(Member::Extern("string"))
    );
}

#[test]
fn merge_with_empty_tree_is_identity() {
    let base = NamespaceNode::builtins().clone();
    assert_eq!(&merge(&base, &NamespaceNode::root()), NamespaceNode::builtins());
    assert_eq!(&merge(&NamespaceNode::root(), &base), NamespaceNode::builtins());
}

#[test]
fn builtins_reverse_lookup_by_opcode() {
    let (path, name, sig) = NamespaceNode::builtins()
        .find_opcode("looks_say")
        .expect("looks_say is built in");
    assert_eq!(path, vec!["looks".to_string()]);
    assert_eq!(name, "say");
    assert_eq!(sig.params, vec!["message".to_string()]);
    assert!(NamespaceNode::builtins().find_opcode("nope_nothing").is_none());
}

#[test]
fn with_extern_builds_single_branch() {
    let tree = NamespaceNode::with_extern(&split_path("a::b"), "thing", "any");
    let modules = tree.modules();
    assert_eq!(modules.len(), 2);
    assert_eq!(join_path(&modules[1].0), "a::b");
    assert_eq!(
        tree.resolve_member(&["a", "b"], "thing"),
        Some(Member::Extern("any"))
    );
}
