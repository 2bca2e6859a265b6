use std::borrow::Cow;
use std::collections::HashMap;

use tracing::trace;

use crate::error::{FuseError, FuseResult};
use crate::namespace::{join_path, merge, Member, NamespaceNode};
use crate::variable::{CombinedScope, DefaultValue, VarKind, VarScope, Variable};

use super::ast::{Expr, Script, Stmt};
use super::graph::{CompiledScript, InstructionGraph, Op, Operand, ScriptHead, VarRef, EXTERN_CALL_OPCODE};

const DEFAULT_EXTERN_SHAPE: &str = "any";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileOutput {
    pub graph: InstructionGraph,
    /// Variable declarations in source order, before any scope decisions.
    pub discovered: Vec<DiscoveredVariable>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveredVariable {
    pub name: String,
    pub kind: VarKind,
    pub declared_global: bool,
    pub export_name: Option<String>,
    pub default: DefaultValue,
}

impl DiscoveredVariable {
    pub fn into_variable(self, scope: VarScope) -> Variable {
        Variable {
            name: self.name,
            kind: self.kind,
            scope,
            export_name: self.export_name,
            default: self.default,
        }
    }

    /// Name stored in the manifest.
    pub fn display_name(&self) -> &str {
        self.export_name.as_deref().unwrap_or(&self.name)
    }
}

pub(super) fn compile_script(
    target: &str,
    script: &Script,
    scope: CombinedScope<'_>,
    namespace: &NamespaceNode,
) -> FuseResult<CompileOutput> {
    let mut visible = Cow::Borrowed(namespace);
    for decl in script.namespaces() {
        for ext in &decl.externs {
            let shape = ext.shape.as_deref().unwrap_or(DEFAULT_EXTERN_SHAPE);
            let declared = NamespaceNode::with_extern(&decl.path, &ext.name, shape);
            visible = Cow::Owned(merge(&visible, &declared));
        }
    }

    let discovered: Vec<DiscoveredVariable> = script
        .variables()
        .map(|decl| DiscoveredVariable {
            name: decl.name.clone(),
            kind: decl.kind(),
            declared_global: decl.global,
            export_name: decl.export_name.clone(),
            default: decl.default.clone(),
        })
        .collect();

    let mut own = HashMap::new();
    let mut own_by_display = HashMap::new();
    for var in &discovered {
        own.entry(var.name.as_str()).or_insert(var);
        own_by_display.entry(var.display_name()).or_insert(var);
    }
    let functions: HashMap<&str, usize> = script
        .functions()
        .map(|f| (f.name.as_str(), f.params.len()))
        .collect();

    let ctx = Context {
        target,
        scope,
        own,
        own_by_display,
        functions,
        namespace: &*visible,
    };

    let mut graph = InstructionGraph::default();
    for function in script.functions() {
        let ops = ctx.body(&function.body, &function.params)?;
        graph.scripts.push(CompiledScript {
            head: ScriptHead::Procedure {
                name: function.name.clone(),
                params: function.params.clone(),
            },
            ops,
        });
    }
    for handler in script.handlers() {
        let ops = ctx.body(&handler.body, &[])?;
        graph.scripts.push(CompiledScript {
            head: ScriptHead::Handler(handler.event.clone()),
            ops,
        });
    }
    trace!(target_name = target, scripts = graph.scripts.len(), "compiled");

    Ok(CompileOutput { graph, discovered })
}

struct Context<'a> {
    target: &'a str,
    scope: CombinedScope<'a>,
    own: HashMap<&'a str, &'a DiscoveredVariable>,
    own_by_display: HashMap<&'a str, &'a DiscoveredVariable>,
    functions: HashMap<&'a str, usize>,
    namespace: &'a NamespaceNode,
}

impl Context<'_> {
    fn unresolved(&self, symbol: impl Into<String>) -> FuseError {
        FuseError::UnresolvedSymbol {
            target: self.target.to_string(),
            symbol: symbol.into(),
        }
    }

    fn body(&self, stmts: &[Stmt], params: &[String]) -> FuseResult<Vec<Op>> {
        stmts.iter().map(|stmt| self.statement(stmt, params)).collect()
    }

    /// Globals win over same-named declarations in this file: those are
    /// dropped as conflicts by the reconciler. The same goes for a
    /// declaration whose manifest name is already taken, by a global or by
    /// an earlier declaration here; references follow the one that stays.
    fn resolve(&self, name: &str) -> Option<(VarKind, VarRef)> {
        if let Some(global) = self.scope.globals().get(name) {
            return Some((global.kind, var_ref(name, VarScope::Global)));
        }
        if let Some(own) = self.own.get(name) {
            let display = own.display_name();
            if let Some(global) = self
                .scope
                .globals()
                .iter()
                .find(|global| global.display_name() == display)
            {
                return Some((global.kind, var_ref(&global.name, VarScope::Global)));
            }
            if let Some(first) = self
                .own_by_display
                .get(display)
                .filter(|first| first.name != own.name)
            {
                return self.resolve(&first.name);
            }
            let scope = if own.declared_global {
                VarScope::Global
            } else {
                VarScope::Local
            };
            return Some((own.kind, var_ref(name, scope)));
        }
        self.scope
            .lookup(name)
            .map(|var| (var.kind, var_ref(name, var.scope)))
    }

    fn expect_kind(&self, name: &str, kind: VarKind) -> FuseResult<VarRef> {
        match self.resolve(name) {
            Some((found, var)) if found == kind => Ok(var),
            Some((found, _)) => Err(self.unresolved(format!("{kind} '{name}' (declared as {found})"))),
            None => Err(self.unresolved(name)),
        }
    }

    fn operand(&self, expr: &Expr, params: &[String]) -> FuseResult<Operand> {
        match expr {
            Expr::Literal(literal) => Ok(Operand::Literal(literal.clone())),
            Expr::Var(name) if params.contains(name) => Ok(Operand::Argument(name.clone())),
            Expr::Var(name) => match self.resolve(name) {
                Some((VarKind::Scalar, var)) => Ok(Operand::Variable(var)),
                Some((VarKind::List, var)) => Ok(Operand::List(var)),
                None => Err(self.unresolved(name.as_str())),
            },
        }
    }

    fn operands(&self, args: &[Expr], params: &[String]) -> FuseResult<Vec<Operand>> {
        args.iter().map(|arg| self.operand(arg, params)).collect()
    }

    fn statement(&self, stmt: &Stmt, params: &[String]) -> FuseResult<Op> {
        match stmt {
            Stmt::Set { var, value } => Ok(Op::SetVariable {
                var: self.expect_kind(var, VarKind::Scalar)?,
                value: self.operand(value, params)?,
            }),
            Stmt::Change { var, by } => Ok(Op::ChangeVariable {
                var: self.expect_kind(var, VarKind::Scalar)?,
                by: self.operand(by, params)?,
            }),
            Stmt::Add { item, list } => Ok(Op::AddToList {
                list: self.expect_kind(list, VarKind::List)?,
                item: self.operand(item, params)?,
            }),
            Stmt::Call { name, args } => match self.functions.get(name.as_str()) {
                Some(&arity) if arity == args.len() => Ok(Op::CallProcedure {
                    name: name.clone(),
                    args: self.operands(args, params)?,
                }),
                Some(&arity) => Err(self.unresolved(format!(
                    "{name} with {} argument(s), expected {arity}",
                    args.len()
                ))),
                None => Err(self.unresolved(name.as_str())),
            },
            Stmt::Broadcast(message) => Ok(Op::Broadcast {
                message: message.clone(),
            }),
            Stmt::ModuleCall { path, member, args } => self.module_call(path, member, args, params),
        }
    }

    fn module_call(
        &self,
        path: &[String],
        member: &str,
        args: &[Expr],
        params: &[String],
    ) -> FuseResult<Op> {
        let qualified = format!("{}::{member}", join_path(path));
        let operands = self.operands(args, params)?;
        match self.namespace.resolve_member(path, member) {
            Some(Member::Function(sig)) => {
                if sig.params.len() != args.len() {
                    return Err(self.unresolved(format!(
                        "{qualified} with {} argument(s), expected {}",
                        args.len(),
                        sig.params.len()
                    )));
                }
                let Some(opcode) = sig.opcode.clone() else {
                    return Ok(extern_call(path, member, operands));
                };
                let builtin = matches!(
                    NamespaceNode::builtins().resolve_member(path, member),
                    Some(Member::Function(b)) if b.opcode.as_deref() == Some(opcode.as_str())
                );
                Ok(Op::Block {
                    opcode,
                    inputs: sig.params.iter().map(|p| p.to_ascii_uppercase()).collect(),
                    args: operands,
                    origin: (!builtin).then(|| (path.to_vec(), member.to_string())),
                })
            }
            Some(Member::Extern(_)) => Ok(extern_call(path, member, operands)),
            Some(Member::Variable(_)) => Err(self.unresolved(format!("{qualified} is not callable"))),
            None => Err(self.unresolved(qualified)),
        }
    }
}

fn var_ref(name: &str, scope: VarScope) -> VarRef {
    VarRef {
        name: name.to_string(),
        scope,
    }
}

fn extern_call(path: &[String], member: &str, args: Vec<Operand>) -> Op {
    Op::Block {
        opcode: EXTERN_CALL_OPCODE.to_string(),
        inputs: (0..args.len()).map(|index| format!("ARG{index}")).collect(),
        args,
        origin: Some((path.to_vec(), member.to_string())),
    }
}
