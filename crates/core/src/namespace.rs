//! Hierarchical symbol namespaces.
//!
//! A [`NamespaceNode`] owns its children outright; there are no parent
//! pointers. Trees from different sources are combined with [`merge`], which
//! never mutates its inputs.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::variable::VarKind;

/// Separator between module names in a qualified path (`pen::extra`).
pub const PATH_SEPARATOR: &str = "::";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSig {
    #[serde(default)]
    pub params: Vec<String>,
    /// Block opcode this function lowers to. Functions without one are
    /// packaged as generic extern calls.
    #[serde(default)]
    pub opcode: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceNode {
    pub name: String,
    pub functions: BTreeMap<String, FunctionSig>,
    pub variables: BTreeMap<String, VarKind>,
    /// Extern name → declared shape (free-form, e.g. `number`).
    pub externs: BTreeMap<String, String>,
    pub children: BTreeMap<String, NamespaceNode>,
}

/// A resolved module member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Member<'a> {
    Function(&'a FunctionSig),
    Variable(VarKind),
    Extern(&'a str),
}

impl NamespaceNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The unnamed root every tree hangs from.
    pub fn root() -> Self {
        Self::default()
    }

    /// The built-in modules every target can call into.
    pub fn builtins() -> &'static NamespaceNode {
        static BUILTINS: OnceLock<NamespaceNode> = OnceLock::new();
        BUILTINS.get_or_init(build_builtins)
    }

    /// A single-branch tree declaring one extern at `path`.
    pub fn with_extern(path: &[String], name: &str, shape: &str) -> Self {
        let mut root = Self::root();
        root.module_entry(path)
            .externs
            .insert(name.to_string(), shape.to_string());
        root
    }

    /// Walks down to `path`, creating empty modules on the way.
    pub(crate) fn module_entry<S: AsRef<str>>(&mut self, path: &[S]) -> &mut NamespaceNode {
        let mut node = self;
        for segment in path {
            let segment = segment.as_ref();
            node = node
                .children
                .entry(segment.to_string())
                .or_insert_with(|| NamespaceNode::new(segment));
        }
        node
    }

    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<&NamespaceNode> {
        let mut node = self;
        for segment in path {
            node = node.children.get(segment.as_ref())?;
        }
        Some(node)
    }

    pub fn resolve_member<S: AsRef<str>>(&self, path: &[S], member: &str) -> Option<Member<'_>> {
        let module = self.lookup(path)?;
        if let Some(sig) = module.functions.get(member) {
            return Some(Member::Function(sig));
        }
        if let Some(kind) = module.variables.get(member) {
            return Some(Member::Variable(*kind));
        }
        module
            .externs
            .get(member)
            .map(|shape| Member::Extern(shape.as_str()))
    }

    /// Finds the function lowering to `opcode`, returning its module path and
    /// name.
    pub fn find_opcode(&self, opcode: &str) -> Option<(Vec<String>, String, &FunctionSig)> {
        for (name, sig) in &self.functions {
            if sig.opcode.as_deref() == Some(opcode) {
                return Some((Vec::new(), name.clone(), sig));
            }
        }
        for (child_name, child) in &self.children {
            if let Some((mut path, name, sig)) = child.find_opcode(opcode) {
                path.insert(0, child_name.clone());
                return Some((path, name, sig));
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
            && self.variables.is_empty()
            && self.externs.is_empty()
            && self.children.is_empty()
    }

    /// Every non-root module in pre-order with its full path.
    pub fn modules(&self) -> Vec<(Vec<String>, &NamespaceNode)> {
        let mut out = Vec::new();
        collect_modules(self, &mut Vec::new(), &mut out);
        out
    }
}

fn collect_modules<'a>(
    node: &'a NamespaceNode,
    prefix: &mut Vec<String>,
    out: &mut Vec<(Vec<String>, &'a NamespaceNode)>,
) {
    for (name, child) in &node.children {
        prefix.push(name.clone());
        out.push((prefix.clone(), child));
        collect_modules(child, prefix, out);
        prefix.pop();
    }
}

/// Combines two trees. Where both declare a module the children are merged
/// recursively and `upper`'s leaf entries win; everything else from either
/// side is kept.
pub fn merge(base: &NamespaceNode, upper: &NamespaceNode) -> NamespaceNode {
    let mut merged = base.clone();
    merge_into(&mut merged, upper);
    merged
}

fn merge_into(target: &mut NamespaceNode, upper: &NamespaceNode) {
    for (name, sig) in &upper.functions {
        target.functions.insert(name.clone(), sig.clone());
    }
    for (name, kind) in &upper.variables {
        target.variables.insert(name.clone(), *kind);
    }
    for (name, shape) in &upper.externs {
        target.externs.insert(name.clone(), shape.clone());
    }
    for (name, child) in &upper.children {
        match target.children.get_mut(name) {
            Some(existing) => merge_into(existing, child),
            None => {
                target.children.insert(name.clone(), child.clone());
            }
        }
    }
}

pub fn split_path(path: &str) -> Vec<String> {
    path.split(PATH_SEPARATOR)
        .map(|segment| segment.trim().to_string())
        .collect()
}

pub fn join_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|segment| segment.as_ref())
        .collect::<Vec<_>>()
        .join(PATH_SEPARATOR)
}

const BUILTIN_FUNCTIONS: &[(&str, &str, &str, &[&str])] = &[
    ("motion", "move", "motion_movesteps", &["steps"]),
    ("motion", "turn_right", "motion_turnright", &["degrees"]),
    ("motion", "turn_left", "motion_turnleft", &["degrees"]),
    ("motion", "goto_xy", "motion_gotoxy", &["x", "y"]),
    ("motion", "set_x", "motion_setx", &["x"]),
    ("motion", "set_y", "motion_sety", &["y"]),
    ("motion", "point_in_direction", "motion_pointindirection", &["direction"]),
    ("looks", "say", "looks_say", &["message"]),
    ("looks", "think", "looks_think", &["message"]),
    ("looks", "show", "looks_show", &[]),
    ("looks", "hide", "looks_hide", &[]),
    ("looks", "set_size", "looks_setsizeto", &["size"]),
    ("looks", "next_costume", "looks_nextcostume", &[]),
    ("sound", "play", "sound_play", &["sound_menu"]),
    ("sound", "stop_all", "sound_stopallsounds", &[]),
    ("sound", "set_volume", "sound_setvolumeto", &["volume"]),
    ("control", "wait", "control_wait", &["duration"]),
    ("control", "delete_this_clone", "control_delete_this_clone", &[]),
    ("sensing", "ask", "sensing_askandwait", &["question"]),
    ("sensing", "reset_timer", "sensing_resettimer", &[]),
    ("pen", "clear", "pen_clear", &[]),
    ("pen", "pen_down", "pen_penDown", &[]),
    ("pen", "pen_up", "pen_penUp", &[]),
    ("pen", "stamp", "pen_stamp", &[]),
];

fn build_builtins() -> NamespaceNode {
    let mut root = NamespaceNode::root();
    for (module, name, opcode, params) in BUILTIN_FUNCTIONS {
        root.module_entry(&[*module]).functions.insert(
            (*name).to_string(),
            FunctionSig {
                params: params.iter().map(|p| (*p).to_string()).collect(),
                opcode: Some((*opcode).to_string()),
            },
        );
    }
    root
}

#[cfg(test)]
#[path = "tests/namespace_tests.rs"]
mod tests;
