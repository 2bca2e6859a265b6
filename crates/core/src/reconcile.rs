//! Ordered compilation of the stage and sprites against a growing global
//! scope.
//!
//! The stage compiles first and every variable it declares is global. Each
//! sprite then sees the globals established so far plus its own locals; the
//! globals it declares only become visible to sprites compiled after it.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, instrument, warn};

use crate::error::{FuseResult, Warning};
use crate::frontend::{DiscoveredVariable, InstructionGraph, Script, ScriptCompiler};
use crate::namespace::NamespaceNode;
use crate::project::STAGE_NAME;
use crate::variable::{CombinedScope, GlobalScope, VarScope, VariableTable};

/// A parsed entry script waiting to be compiled.
#[derive(Clone, Debug)]
pub struct TargetSource {
    pub name: String,
    pub is_stage: bool,
    pub path: Option<PathBuf>,
    pub script: Script,
}

impl TargetSource {
    pub fn stage(path: Option<PathBuf>, script: Script) -> Self {
        Self {
            name: STAGE_NAME.to_string(),
            is_stage: true,
            path,
            script,
        }
    }

    pub fn sprite(name: impl Into<String>, path: Option<PathBuf>, script: Script) -> Self {
        Self {
            name: name.into(),
            is_stage: false,
            path,
            script,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompiledTarget {
    pub name: String,
    pub is_stage: bool,
    pub locals: VariableTable,
    pub graph: InstructionGraph,
    /// Globals this target added, in declaration order.
    pub declared_globals: Vec<String>,
    /// Number of globals visible when this target compiled.
    pub visible_globals: usize,
}

#[derive(Clone, Debug, Default)]
pub struct ReconciledProject {
    pub globals: GlobalScope,
    /// Stage first, then sprites in declared order.
    pub targets: Vec<CompiledTarget>,
    pub warnings: Vec<Warning>,
}

impl ReconciledProject {
    pub fn stage(&self) -> Option<&CompiledTarget> {
        self.targets.iter().find(|target| target.is_stage)
    }

    pub fn target(&self, name: &str) -> Option<&CompiledTarget> {
        self.targets.iter().find(|target| target.name == name)
    }
}

pub struct ScopeReconciler<'a, C: ?Sized> {
    compiler: &'a C,
    namespace: &'a NamespaceNode,
}

impl<'a, C> ScopeReconciler<'a, C>
where
    C: ScriptCompiler + ?Sized,
{
    pub fn new(compiler: &'a C, namespace: &'a NamespaceNode) -> Self {
        Self {
            compiler,
            namespace,
        }
    }

    /// Compiles the stage, then each sprite in order.
    #[instrument(skip_all, fields(sprites = sprites.len()))]
    pub fn reconcile(
        &self,
        stage: &TargetSource,
        sprites: &[TargetSource],
    ) -> FuseResult<ReconciledProject> {
        let mut project = ReconciledProject::default();
        for source in std::iter::once(stage).chain(sprites) {
            let target = self.compile_target(&mut project.globals, source, &mut project.warnings)?;
            let shadowed = shadowed_earlier_locals(&project, &target);
            project.warnings.extend(shadowed);
            info!(
                target_name = %target.name,
                locals = target.locals.len(),
                new_globals = target.declared_globals.len(),
                "compiled target"
            );
            project.targets.push(target);
        }
        Ok(project)
    }

    /// Compiles one target and folds its declarations into `globals` and its
    /// own local table. Conflicting declarations are dropped with a warning.
    pub fn compile_target(
        &self,
        globals: &mut GlobalScope,
        source: &TargetSource,
        warnings: &mut Vec<Warning>,
    ) -> FuseResult<CompiledTarget> {
        let mut locals = VariableTable::new();
        let visible_globals = globals.len();
        let output = {
            let scope = CombinedScope::new(globals, &locals);
            debug!(target_name = %source.name, visible = scope.len(), "combined scope");
            self.compiler
                .compile(&source.name, &source.script, scope, self.namespace)?
        };

        let mut declared_globals = Vec::new();
        // manifest name -> first source name declaring it, dropped or not
        let mut shown: HashMap<String, String> = HashMap::new();
        for var in output.discovered {
            let manifest_name = var.display_name().to_string();
            let first = shown
                .entry(manifest_name.clone())
                .or_insert_with(|| var.name.clone())
                .clone();
            let taken_by_global = globals
                .iter()
                .find(|global| global.name != var.name && global.display_name() == manifest_name)
                .map(|global| global.name.clone());
            let conflict = if first != var.name {
                Some((manifest_name, format!("'{first}' is already stored under this name")))
            } else if let Some(global) = taken_by_global {
                Some((manifest_name, format!("already the name of global '{global}'")))
            } else if source.is_stage || var.declared_global {
                declare_global(globals, &locals, var, &mut declared_globals)
            } else {
                declare_local(globals, &mut locals, var)
            };
            if let Some((name, reason)) = conflict {
                warn!(target_name = %source.name, %name, %reason, "dropped conflicting declaration");
                warnings.push(Warning::SymbolConflict {
                    target: source.name.clone(),
                    name,
                    reason,
                });
            }
        }

        Ok(CompiledTarget {
            name: source.name.clone(),
            is_stage: source.is_stage,
            locals,
            graph: output.graph,
            declared_globals,
            visible_globals,
        })
    }
}

/// Warnings for globals `target` just declared under a name an earlier
/// sprite keeps as a local. Both stay; the earlier sprite cannot see the
/// global, but a decompiled copy of the archive will treat the local as it.
fn shadowed_earlier_locals(project: &ReconciledProject, target: &CompiledTarget) -> Vec<Warning> {
    let mut warnings = Vec::new();
    for name in &target.declared_globals {
        let Some(global) = project.globals.get(name) else {
            continue;
        };
        let shown_as = global.display_name();
        for earlier in project.targets.iter().filter(|t| !t.is_stage) {
            if earlier.locals.iter().any(|local| local.display_name() == shown_as) {
                warn!(
                    target_name = %target.name,
                    name = %shown_as,
                    local_owner = %earlier.name,
                    "global shadows an earlier sprite's local"
                );
                warnings.push(Warning::SymbolConflict {
                    target: target.name.clone(),
                    name: shown_as.to_string(),
                    reason: format!(
                        "global declared after sprite '{}' made it a local",
                        earlier.name
                    ),
                });
            }
        }
    }
    warnings
}

/// Returns the conflicting name and a reason when the declaration is dropped.
fn declare_global(
    globals: &mut GlobalScope,
    locals: &VariableTable,
    var: DiscoveredVariable,
    declared: &mut Vec<String>,
) -> Option<(String, String)> {
    if let Some(local) = locals.get(&var.name) {
        return Some((
            var.name,
            format!("already a local {} in this target", local.kind),
        ));
    }
    let name = var.name.clone();
    let kind = var.kind;
    match globals.declare(var.into_variable(VarScope::Global)) {
        Ok(()) => {
            declared.push(name);
            None
        }
        Err(existing) if existing.kind != kind => Some((
            name,
            format!("already global as a {}, redeclared as a {kind}", existing.kind),
        )),
        Err(_) => {
            debug!(%name, "global redeclared with the same kind");
            None
        }
    }
}

fn declare_local(
    globals: &GlobalScope,
    locals: &mut VariableTable,
    var: DiscoveredVariable,
) -> Option<(String, String)> {
    if let Some(global) = globals.get(&var.name) {
        return Some((var.name, format!("already a global {}", global.kind)));
    }
    let name = var.name.clone();
    match locals.insert(var.into_variable(VarScope::Local)) {
        Ok(()) => None,
        Err(existing) => Some((
            name,
            format!("declared more than once (first as a {})", existing.kind),
        )),
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
