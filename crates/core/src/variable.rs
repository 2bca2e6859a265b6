//! Variables, per-target local tables and the project-wide global scope.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    Scalar,
    List,
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarKind::Scalar => f.write_str("scalar"),
            VarKind::List => f.write_str("list"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarScope {
    Global,
    Local,
}

/// A literal scalar as written in source. Numbers keep their source text so
/// that `0` stays `0` through a round trip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Number(String),
    Text(String),
}

impl Literal {
    pub fn to_json(&self) -> Value {
        match self {
            Literal::Number(text) => {
                if let Ok(int) = text.parse::<i64>() {
                    Value::from(int)
                } else if let Some(num) = text
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                {
                    Value::Number(num)
                } else {
                    Value::String(text.clone())
                }
            }
            Literal::Text(text) => Value::String(text.clone()),
        }
    }

    /// Inverse of [`Literal::to_json`]; anything that is not a number or a
    /// string is carried as its JSON text.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(num) => Literal::Number(num.to_string()),
            Value::String(text) => Literal::Text(text.clone()),
            Value::Bool(flag) => Literal::Text(flag.to_string()),
            Value::Null => Literal::Text(String::new()),
            other => Literal::Text(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefaultValue {
    Scalar(Literal),
    List(Vec<Literal>),
}

impl DefaultValue {
    pub fn empty(kind: VarKind) -> Self {
        match kind {
            VarKind::Scalar => DefaultValue::Scalar(Literal::Number("0".to_string())),
            VarKind::List => DefaultValue::List(Vec::new()),
        }
    }

    pub fn kind(&self) -> VarKind {
        match self {
            DefaultValue::Scalar(_) => VarKind::Scalar,
            DefaultValue::List(_) => VarKind::List,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub kind: VarKind,
    pub scope: VarScope,
    /// Name shown to other files and stored in the manifest.
    pub export_name: Option<String>,
    pub default: DefaultValue,
}

impl Variable {
    pub fn display_name(&self) -> &str {
        self.export_name.as_deref().unwrap_or(&self.name)
    }
}

/// Insertion-ordered name → variable table with no removal.
#[derive(Clone, Debug, Default)]
pub struct VariableTable {
    entries: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `variable` unless its name is taken, returning the existing
    /// entry in that case.
    pub fn insert(&mut self, variable: Variable) -> Result<(), &Variable> {
        if let Some(&existing) = self.index.get(&variable.name) {
            return Err(&self.entries[existing]);
        }
        self.index.insert(variable.name.clone(), self.entries.len());
        self.entries.push(variable);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|&idx| &self.entries[idx])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Globals accumulated across an ordered build.
///
/// Entries are only ever added; nothing is removed or renamed once present.
#[derive(Clone, Debug, Default)]
pub struct GlobalScope {
    table: VariableTable,
}

impl GlobalScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `variable` as a global. Fails with the existing entry when the
    /// name is already global.
    pub fn declare(&mut self, mut variable: Variable) -> Result<(), &Variable> {
        variable.scope = VarScope::Global;
        self.table.insert(variable)
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.table.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// What one target sees while it compiles: the globals established so far
/// plus its own locals.
#[derive(Clone, Copy, Debug)]
pub struct CombinedScope<'a> {
    globals: &'a GlobalScope,
    locals: &'a VariableTable,
}

impl<'a> CombinedScope<'a> {
    pub fn new(globals: &'a GlobalScope, locals: &'a VariableTable) -> Self {
        Self { globals, locals }
    }

    pub fn lookup(&self, name: &str) -> Option<&'a Variable> {
        self.locals.get(name).or_else(|| self.globals.get(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.globals.len() + self.locals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn globals(&self) -> &'a GlobalScope {
        self.globals
    }
}

/// Turns an arbitrary display name into a source identifier.
pub fn sanitize_identifier(display: &str) -> String {
    let mut out: String = display
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push_str("unnamed");
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if crate::frontend::is_keyword(&out) {
        out.push('_');
    }
    out
}
