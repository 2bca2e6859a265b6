//! Rebuilds variable declarations from a manifest's id-keyed tables.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::error::Warning;
use crate::frontend::{is_identifier, SymbolNames, VarDecl};
use crate::manifest::TargetRecord;
use crate::variable::{sanitize_identifier, DefaultValue, Literal, VarKind};

use super::unique_name;

/// One declaration recovered from a manifest table, with the opaque id the
/// blocks refer to it by.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconstructedSymbol {
    pub id: String,
    pub decl: VarDecl,
}

impl ReconstructedSymbol {
    fn display_name(&self) -> &str {
        self.decl.export_name.as_deref().unwrap_or(&self.decl.name)
    }
}

/// Stage tables become the global scope; each sprite's tables become its
/// locals, minus any name the globals already claim.
#[derive(Clone, Debug, Default)]
pub struct SymbolReconstructor {
    globals: Vec<ReconstructedSymbol>,
    identifiers: HashSet<String>,
    by_display: HashMap<String, usize>,
}

impl SymbolReconstructor {
    pub fn from_stage(stage: &TargetRecord) -> Self {
        let mut reconstructor = Self::default();
        for symbol in read_tables(stage, true, &mut reconstructor.identifiers) {
            reconstructor
                .by_display
                .entry(symbol.display_name().to_string())
                .or_insert(reconstructor.globals.len());
            reconstructor.globals.push(symbol);
        }
        reconstructor
    }

    pub fn globals(&self) -> &[ReconstructedSymbol] {
        &self.globals
    }

    /// Names visible while decoding the stage's own blocks.
    pub fn stage_symbols(&self) -> TargetSymbols<'_> {
        TargetSymbols {
            globals: self,
            locals: Vec::new(),
            aliases: HashMap::new(),
        }
    }

    /// Rebuilds a sprite's locals. A local whose display name is already
    /// global is dropped with a warning; blocks that used it resolve to the
    /// global of the same kind instead.
    pub fn sprite(&self, record: &TargetRecord, warnings: &mut Vec<Warning>) -> TargetSymbols<'_> {
        let mut identifiers = self.identifiers.clone();
        let mut locals = Vec::new();
        let mut aliases = HashMap::new();
        let mut candidates = table_entries(record);
        candidates.retain(|(shown, kind, id, _)| {
            let Some(&index) = self.by_display.get(shown.as_str()) else {
                return true;
            };
            let global = &self.globals[index];
            if global.decl.kind() == *kind {
                aliases.insert(id.clone(), (global.decl.name.clone(), *kind));
            }
            warn!(
                target_name = %record.name,
                name = %shown,
                "local declaration shadows a global; skipped"
            );
            warnings.push(Warning::SymbolConflict {
                target: record.name.clone(),
                name: shown.clone(),
                reason: "already declared as a global on the stage".to_string(),
            });
            false
        });
        for (display, _, id, default) in candidates {
            locals.push(symbol(id, &display, default, false, &mut identifiers));
        }
        TargetSymbols {
            globals: self,
            locals,
            aliases,
        }
    }

    fn global(&self, id: &str, kind: VarKind) -> Option<&ReconstructedSymbol> {
        self.globals
            .iter()
            .find(|symbol| symbol.id == id && symbol.decl.kind() == kind)
    }
}

/// The names one target's blocks can refer to.
#[derive(Clone, Debug)]
pub struct TargetSymbols<'a> {
    globals: &'a SymbolReconstructor,
    pub locals: Vec<ReconstructedSymbol>,
    aliases: HashMap<String, (String, VarKind)>,
}

impl TargetSymbols<'_> {
    /// Declarations this target's source must carry.
    pub fn declarations(&self, is_stage: bool) -> Vec<VarDecl> {
        if is_stage {
            self.globals.globals.iter().map(|s| s.decl.clone()).collect()
        } else {
            self.locals.iter().map(|s| s.decl.clone()).collect()
        }
    }
}

impl SymbolNames for TargetSymbols<'_> {
    fn variable(&self, id: &str, kind: VarKind) -> Option<String> {
        if let Some(local) = self
            .locals
            .iter()
            .find(|symbol| symbol.id == id && symbol.decl.kind() == kind)
        {
            return Some(local.decl.name.clone());
        }
        if let Some(global) = self.globals.global(id, kind) {
            return Some(global.decl.name.clone());
        }
        self.aliases
            .get(id)
            .filter(|(_, alias_kind)| *alias_kind == kind)
            .map(|(name, _)| name.clone())
    }
}

type TableEntry = (String, VarKind, String, DefaultValue);

/// Variables then lists, sorted by display name so output is stable.
fn table_entries(record: &TargetRecord) -> Vec<TableEntry> {
    let mut entries: Vec<TableEntry> = record
        .variables
        .iter()
        .map(|(id, entry)| {
            (
                entry.0.clone(),
                VarKind::Scalar,
                id.clone(),
                DefaultValue::Scalar(Literal::from_json(&entry.1)),
            )
        })
        .chain(record.lists.iter().map(|(id, entry)| {
            (
                entry.0.clone(),
                VarKind::List,
                id.clone(),
                DefaultValue::List(entry.1.iter().map(Literal::from_json).collect()),
            )
        }))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.2.cmp(&b.2)));
    entries
}

fn read_tables(
    record: &TargetRecord,
    global: bool,
    identifiers: &mut HashSet<String>,
) -> Vec<ReconstructedSymbol> {
    table_entries(record)
        .into_iter()
        .map(|(display, _, id, default)| symbol(id, &display, default, global, identifiers))
        .collect()
}

fn symbol(
    id: String,
    display: &str,
    default: DefaultValue,
    global: bool,
    identifiers: &mut HashSet<String>,
) -> ReconstructedSymbol {
    let base = if is_identifier(display) {
        display.to_string()
    } else {
        sanitize_identifier(display)
    };
    let name = unique_name(&base, identifiers);
    let export_name = (name != display).then(|| display.to_string());
    ReconstructedSymbol {
        id,
        decl: VarDecl {
            name,
            global,
            export_name,
            default,
        },
    }
}
