use std::collections::HashMap;
use std::path::Path;

use serde_json::json;

use super::*;
use crate::error::FuseError;
use crate::variable::{DefaultValue, GlobalScope, Literal, VarKind, VarScope, Variable, VariableTable};

const SAMPLE: &str = r#"
// player sprite
namespace pen::extra {
    extern glow: number
}

global score = 0
global high as "High Score" = 10
var counter = 0
list items = [1, "two"]

fn reset(amount) {
    set counter = 0
    change score by amount
    add "x" to items
    looks::say("hi")
    pen::extra::glow(counter)
}

on flag {
    call reset(5)
    broadcast "go"
}

on message "go" {
    change counter by 1
}

on key "space" {
}
"#;

fn parse(source: &str) -> Script {
    FuseFrontend
        .parse(Path::new("sprite.fuse"), source)
        .expect("sample parses")
}

fn compile(script: &Script, globals: &GlobalScope) -> FuseResult<CompileOutput> {
    let locals = VariableTable::new();
    FuseFrontend.compile(
        "Sprite1",
        script,
        CombinedScope::new(globals, &locals),
        NamespaceNode::builtins(),
    )
}

#[derive(Default)]
struct Ids {
    vars: HashMap<(String, VarKind), String>,
}

impl Ids {
    fn with(mut self, name: &str, kind: VarKind) -> Self {
        self.vars
            .insert((name.to_string(), kind), format!("id-{name}"));
        self
    }
}

impl SymbolIds for Ids {
    fn variable(&self, var: &VarRef, kind: VarKind) -> Option<(String, String)> {
        self.vars
            .get(&(var.name.clone(), kind))
            .map(|id| (var.name.clone(), id.clone()))
    }

    fn broadcast(&self, message: &str) -> Option<String> {
        Some(format!("msg-{message}"))
    }
}

impl SymbolNames for Ids {
    fn variable(&self, id: &str, kind: VarKind) -> Option<String> {
        self.vars
            .iter()
            .find(|((_, k), stored)| *k == kind && stored.as_str() == id)
            .map(|((name, _), _)| name.clone())
    }
}

fn sample_ids() -> Ids {
    Ids::default()
        .with("score", VarKind::Scalar)
        .with("high", VarKind::Scalar)
        .with("counter", VarKind::Scalar)
        .with("items", VarKind::List)
}

#[test]
fn parses_every_declaration_kind() {
    let script = parse(SAMPLE);
    assert_eq!(script.namespaces().count(), 1);
    assert_eq!(script.functions().count(), 1);
    assert_eq!(script.handlers().count(), 3);

    let vars: Vec<_> = script.variables().collect();
    assert_eq!(vars.len(), 4);
    assert!(vars[0].global);
    assert_eq!(vars[1].export_name.as_deref(), Some("High Score"));
    assert!(!vars[2].global);
    assert_eq!(
        vars[3].default,
        DefaultValue::List(vec![
            Literal::Number("1".into()),
            Literal::Text("two".into())
        ])
    );

    let function = script.functions().next().expect("one function");
    assert_eq!(function.params, vec!["amount".to_string()]);
    assert_eq!(
        function.body[3],
        Stmt::ModuleCall {
            path: vec!["looks".into()],
            member: "say".into(),
            args: vec![Expr::Literal(Literal::Text("hi".into()))],
        }
    );
}

#[test]
fn parse_errors_carry_a_span() {
    let err = FuseFrontend
        .parse(Path::new("bad.fuse"), "var ok = 1\nfn f() {\n    jump 3\n}\n")
        .expect_err("unknown statement");
    match err {
        FuseError::Parse { message, span, .. } => {
            assert!(message.contains("jump"), "{message}");
            // "var ok = 1\n" + "fn f() {\n" + 4 spaces
            assert_eq!(span.offset(), 11 + 9 + 4);
        }
        other => panic!("expected parse error, got {other:?}"),
    }

    let err = FuseFrontend
        .parse(Path::new("bad.fuse"), "on flag {\n    broadcast \"go\"\n")
        .expect_err("unclosed block");
    assert!(err.to_string().contains("unclosed"));
}

#[test]
fn printed_source_parses_back_to_the_same_tree() {
    let script = parse(SAMPLE);
    let printed = FuseFrontend.to_source(&script);
    assert!(printed.starts_with("namespace pen::extra {\n    extern glow: number\n}\n"));
    assert!(printed.contains("global high as \"High Score\" = 10\n"));
    assert_eq!(parse(&printed), script);
}

#[test]
fn printer_quotes_numbers_the_lexer_cannot_read() {
    let script = Script {
        items: vec![Item::Variable(VarDecl {
            name: "big".into(),
            global: false,
            export_name: None,
            default: DefaultValue::Scalar(Literal::Number("1e21".into())),
        })],
    };
    assert_eq!(FuseFrontend.to_source(&script), "var big = \"1e21\"\n");
}

#[test]
fn compile_reports_discovered_declarations_in_order() {
    let output = compile(&parse(SAMPLE), &GlobalScope::new()).expect("compiles");
    let names: Vec<_> = output
        .discovered
        .iter()
        .map(|v| (v.name.as_str(), v.declared_global))
        .collect();
    assert_eq!(
        names,
        vec![
            ("score", true),
            ("high", true),
            ("counter", false),
            ("items", false)
        ]
    );
    assert_eq!(output.graph.scripts.len(), 4);
    assert_eq!(
        output.graph.messages().into_iter().collect::<Vec<_>>(),
        vec!["go".to_string()]
    );
}

#[test]
fn compile_lowers_builtins_and_externs_differently() {
    let output = compile(&parse(SAMPLE), &GlobalScope::new()).expect("compiles");
    let ops = &output.graph.scripts[0].ops;
    assert_eq!(
        ops[3],
        Op::Block {
            opcode: "looks_say".into(),
            inputs: vec!["MESSAGE".into()],
            args: vec![Operand::Literal(Literal::Text("hi".into()))],
            origin: None,
        }
    );
    match &ops[4] {
        Op::Block { opcode, origin, .. } => {
            assert_eq!(opcode, EXTERN_CALL_OPCODE);
            assert_eq!(
                origin.as_ref(),
                Some(&(vec!["pen".to_string(), "extra".to_string()], "glow".to_string()))
            );
        }
        other => panic!("expected a block, got {other:?}"),
    }
    assert_eq!(
        ops[1],
        Op::ChangeVariable {
            var: VarRef {
                name: "score".into(),
                scope: VarScope::Global
            },
            by: Operand::Argument("amount".into()),
        }
    );
}

#[test]
fn compile_rejects_unknown_symbols() {
    let script = parse("on flag {\n    set missing = 1\n}\n");
    let err = compile(&script, &GlobalScope::new()).expect_err("missing variable");
    assert!(matches!(
        err,
        FuseError::UnresolvedSymbol { ref symbol, .. } if symbol == "missing"
    ));

    let script = parse("on flag {\n    nowhere::thing()\n}\n");
    let err = compile(&script, &GlobalScope::new()).expect_err("missing module");
    assert!(err.to_string().contains("nowhere::thing"));

    let script = parse("on flag {\n    looks::say()\n}\n");
    assert!(compile(&script, &GlobalScope::new()).is_err());
}

#[test]
fn compile_sees_globals_from_earlier_targets() {
    let mut globals = GlobalScope::new();
    globals
        .declare(Variable {
            name: "lives".into(),
            kind: VarKind::Scalar,
            scope: VarScope::Global,
            export_name: None,
            default: DefaultValue::empty(VarKind::Scalar),
        })
        .expect("fresh global");
    let script = parse("on click {\n    change lives by -1\n}\n");
    let output = compile(&script, &globals).expect("lives is visible");
    assert!(output.discovered.is_empty());
}

#[test]
fn storage_format_decodes_back_to_the_source_bodies() {
    let script = parse(SAMPLE);
    let output = compile(&script, &GlobalScope::new()).expect("compiles");
    let ids = sample_ids();
    let blocks = FuseFrontend
        .to_storage_format(&output.graph, &ids)
        .expect("all ids assigned");

    let flag = blocks
        .as_object()
        .and_then(|map| {
            map.values()
                .find(|b| b["opcode"] == json!("event_whenflagclicked"))
        })
        .expect("flag hat");
    assert_eq!(flag["topLevel"], json!(true));

    let decoded = FuseFrontend.from_storage_format(&blocks, &ids, NamespaceNode::builtins());
    assert!(decoded.failures.is_empty(), "{:?}", decoded.failures);
    let originals: Vec<Item> = script
        .items
        .iter()
        .filter(|item| matches!(item, Item::Function(_) | Item::Handler(_)))
        .cloned()
        .collect();
    assert_eq!(decoded.items, originals);
}

#[test]
fn encoding_is_deterministic() {
    let output = compile(&parse(SAMPLE), &GlobalScope::new()).expect("compiles");
    let ids = sample_ids();
    let first = FuseFrontend.to_storage_format(&output.graph, &ids).expect("encode");
    let second = FuseFrontend.to_storage_format(&output.graph, &ids).expect("encode");
    assert_eq!(first, second);
}

#[test]
fn undecodable_bodies_are_reported_individually() {
    let blocks = json!({
        "a": { "opcode": "event_whenflagclicked", "next": "b", "parent": null,
               "inputs": {}, "fields": {}, "topLevel": true },
        "b": { "opcode": "control_forever", "next": null, "parent": "a",
               "inputs": {}, "fields": {}, "topLevel": false },
        "c": { "opcode": "event_whenthisspriteclicked", "next": "d", "parent": null,
               "inputs": {}, "fields": {}, "topLevel": true },
        "d": { "opcode": "looks_show", "next": null, "parent": "c",
               "inputs": {}, "fields": {}, "topLevel": false }
    });
    let decoded = FuseFrontend.from_storage_format(&blocks, &Ids::default(), NamespaceNode::builtins());
    assert_eq!(decoded.failures.len(), 1);
    assert!(decoded.failures[0].reason.contains("control_forever"));
    assert_eq!(
        decoded.items,
        vec![Item::Handler(HandlerDecl {
            event: Event::Click,
            body: vec![Stmt::ModuleCall {
                path: vec!["looks".into()],
                member: "show".into(),
                args: vec![],
            }],
        })]
    );
}

#[test]
fn identifiers_exclude_keywords() {
    assert!(is_identifier("score"));
    assert!(is_identifier("_tmp1"));
    assert!(!is_identifier("1x"));
    assert!(!is_identifier("global"));
    assert!(!is_identifier("a-b"));
}
