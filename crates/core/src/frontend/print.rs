use std::fmt::Write as _;

use crate::namespace::join_path;
use crate::variable::{DefaultValue, Literal};

use super::ast::{Event, Expr, Item, Script, Stmt};

const INDENT: &str = "    ";

pub(super) fn print_script(script: &Script) -> String {
    let mut out = String::new();
    let mut previous: Option<&Item> = None;
    for item in &script.items {
        let grouped = matches!(
            (previous, item),
            (Some(Item::Variable(_)), Item::Variable(_))
        );
        if previous.is_some() && !grouped {
            out.push('\n');
        }
        print_item(&mut out, item);
        previous = Some(item);
    }
    out
}

fn print_item(out: &mut String, item: &Item) {
    match item {
        Item::Namespace(decl) => {
            let path = join_path(&decl.path);
            if decl.externs.is_empty() {
                let _ = writeln!(out, "namespace {path} {{}}");
                return;
            }
            let _ = writeln!(out, "namespace {path} {{");
            for ext in &decl.externs {
                match &ext.shape {
                    Some(shape) => {
                        let _ = writeln!(out, "{INDENT}extern {}: {shape}", ext.name);
                    }
                    None => {
                        let _ = writeln!(out, "{INDENT}extern {}", ext.name);
                    }
                }
            }
            out.push_str("}\n");
        }
        Item::Variable(decl) => {
            let keyword = match (decl.global, &decl.default) {
                (true, DefaultValue::List(_)) => "global list",
                (true, DefaultValue::Scalar(_)) => "global",
                (false, DefaultValue::List(_)) => "list",
                (false, DefaultValue::Scalar(_)) => "var",
            };
            let _ = write!(out, "{keyword} {}", decl.name);
            if let Some(export) = &decl.export_name {
                let _ = write!(out, " as {}", quote(export));
            }
            let default = match &decl.default {
                DefaultValue::Scalar(literal) => literal_text(literal),
                DefaultValue::List(items) => format!(
                    "[{}]",
                    items.iter().map(literal_text).collect::<Vec<_>>().join(", ")
                ),
            };
            let _ = writeln!(out, " = {default}");
        }
        Item::Function(function) => {
            let _ = writeln!(out, "fn {}({}) {{", function.name, function.params.join(", "));
            print_body(out, &function.body);
            out.push_str("}\n");
        }
        Item::Handler(handler) => {
            let event = match &handler.event {
                Event::Flag => "flag".to_string(),
                Event::Click => "click".to_string(),
                Event::Message(message) => format!("message {}", quote(message)),
                Event::Key(key) => format!("key {}", quote(key)),
            };
            let _ = writeln!(out, "on {event} {{");
            print_body(out, &handler.body);
            out.push_str("}\n");
        }
    }
}

fn print_body(out: &mut String, body: &[Stmt]) {
    for stmt in body {
        out.push_str(INDENT);
        match stmt {
            Stmt::Set { var, value } => {
                let _ = write!(out, "set {var} = {}", expr_text(value));
            }
            Stmt::Change { var, by } => {
                let _ = write!(out, "change {var} by {}", expr_text(by));
            }
            Stmt::Add { item, list } => {
                let _ = write!(out, "add {} to {list}", expr_text(item));
            }
            Stmt::Call { name, args } => {
                let _ = write!(out, "call {name}({})", args_text(args));
            }
            Stmt::Broadcast(message) => {
                let _ = write!(out, "broadcast {}", quote(message));
            }
            Stmt::ModuleCall { path, member, args } => {
                let _ = write!(out, "{}::{member}({})", join_path(path), args_text(args));
            }
        }
        out.push('\n');
    }
}

fn args_text(args: &[Expr]) -> String {
    args.iter().map(expr_text).collect::<Vec<_>>().join(", ")
}

fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::Literal(literal) => literal_text(literal),
        Expr::Var(name) => name.clone(),
    }
}

fn literal_text(literal: &Literal) -> String {
    match literal {
        Literal::Number(num) if is_plain_number(num) => num.clone(),
        Literal::Number(num) => quote(num),
        Literal::Text(text) => quote(text),
    }
}

/// Numbers the lexer can read back: optional sign, digits, at most one dot.
fn is_plain_number(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let mut parts = digits.splitn(2, '.');
    let whole = parts.next().unwrap_or("");
    let fraction = parts.next();
    !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.map_or(true, |f| !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()))
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}
