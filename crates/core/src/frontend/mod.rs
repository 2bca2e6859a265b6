//! Seams to the script-language collaborators, plus the bundled `.fuse`
//! reference frontend that implements them.
//!
//! The packaging pipeline only talks to these traits: it parses each entry
//! script, compiles it against a combined scope and the merged namespace,
//! serializes the resulting graph into the manifest's block format, and on
//! the way back decodes blocks and pretty-prints source.

mod ast;
mod compile;
mod graph;
mod parse;
mod print;

use std::path::Path;

use serde_json::Value;

use crate::error::FuseResult;
use crate::namespace::NamespaceNode;
use crate::variable::CombinedScope;

pub use ast::{
    Event, ExternDecl, Expr, FunctionDecl, HandlerDecl, Item, NamespaceDecl, Script, Stmt, VarDecl,
};
pub use compile::{CompileOutput, DiscoveredVariable};
pub use graph::{
    CompiledScript, DecodeFailure, DecodedGraph, InstructionGraph, Op, Operand, ScriptHead,
    SymbolIds, SymbolNames, VarRef, EXTERN_CALL_OPCODE,
};

const KEYWORDS: &[&str] = &[
    "namespace",
    "extern",
    "global",
    "var",
    "list",
    "fn",
    "on",
    "set",
    "change",
    "by",
    "add",
    "to",
    "call",
    "broadcast",
    "as",
];

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

pub fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_') && !is_keyword(word)
}

/// Turns source text into a syntax tree. `path` is only used for diagnostics.
pub trait ScriptParser {
    fn parse(&self, path: &Path, source: &str) -> FuseResult<Script>;
}

/// Lowers one target's script against the scope it can see, returning the
/// instruction graph and the variables the script declares.
pub trait ScriptCompiler {
    fn compile(
        &self,
        target: &str,
        script: &Script,
        scope: CombinedScope<'_>,
        namespace: &NamespaceNode,
    ) -> FuseResult<CompileOutput>;
}

/// Conversion between instruction graphs and the manifest's block records.
pub trait GraphSerializer {
    fn to_storage_format(&self, graph: &InstructionGraph, ids: &dyn SymbolIds)
        -> FuseResult<Value>;

    /// Decodes a target's blocks back into script items. Bodies that cannot
    /// be decoded are reported individually instead of failing the target.
    fn from_storage_format(
        &self,
        blocks: &Value,
        names: &dyn SymbolNames,
        known: &NamespaceNode,
    ) -> DecodedGraph;
}

pub trait SourcePrinter {
    fn to_source(&self, script: &Script) -> String;
}

/// Everything the build and decompile pipelines need from a language.
pub trait Frontend: ScriptParser + ScriptCompiler + GraphSerializer + SourcePrinter {}

impl<T> Frontend for T where T: ScriptParser + ScriptCompiler + GraphSerializer + SourcePrinter {}

/// The bundled `.fuse` language.
#[derive(Clone, Copy, Debug, Default)]
pub struct FuseFrontend;

impl ScriptParser for FuseFrontend {
    fn parse(&self, path: &Path, source: &str) -> FuseResult<Script> {
        parse::parse_script(path, source)
    }
}

impl ScriptCompiler for FuseFrontend {
    fn compile(
        &self,
        target: &str,
        script: &Script,
        scope: CombinedScope<'_>,
        namespace: &NamespaceNode,
    ) -> FuseResult<CompileOutput> {
        compile::compile_script(target, script, scope, namespace)
    }
}

impl GraphSerializer for FuseFrontend {
    fn to_storage_format(
        &self,
        graph: &InstructionGraph,
        ids: &dyn SymbolIds,
    ) -> FuseResult<Value> {
        graph::encode_graph(graph, ids)
    }

    fn from_storage_format(
        &self,
        blocks: &Value,
        names: &dyn SymbolNames,
        known: &NamespaceNode,
    ) -> DecodedGraph {
        graph::decode_graph(blocks, names, known)
    }
}

impl SourcePrinter for FuseFrontend {
    fn to_source(&self, script: &Script) -> String {
        print::print_script(script)
    }
}

#[cfg(test)]
#[path = "../tests/frontend_tests.rs"]
mod tests;
