//! Placeholder declarations for module members the known namespace lacks.

use tracing::{debug, warn};

use crate::error::Warning;
use crate::frontend::{is_identifier, Event, ExternDecl, Item, NamespaceDecl, Stmt};
use crate::namespace::{join_path, merge, NamespaceNode};

const SYNTHESIZED_SHAPE: &str = "any";

/// Collects every module reference that does not resolve against the known
/// tree, per target and across the whole run.
#[derive(Debug)]
pub struct NamespaceSynthesizer<'a> {
    known: &'a NamespaceNode,
    generated: NamespaceNode,
}

impl<'a> NamespaceSynthesizer<'a> {
    pub fn new(known: &'a NamespaceNode) -> Self {
        Self {
            known,
            generated: NamespaceNode::root(),
        }
    }

    /// Returns the items that can be emitted together with the namespace
    /// declarations they need. An item referring to a member that cannot be
    /// written as source is dropped with a warning.
    pub fn synthesize(
        &mut self,
        target: &str,
        items: Vec<Item>,
        warnings: &mut Vec<Warning>,
    ) -> (Vec<Item>, Vec<NamespaceDecl>) {
        let mut declared = NamespaceNode::root();
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            match self.missing_members(&item) {
                Ok(missing) => {
                    for (path, member) in missing {
                        let node = NamespaceNode::with_extern(&path, &member, SYNTHESIZED_SHAPE);
                        declared = merge(&declared, &node);
                    }
                    kept.push(item);
                }
                Err(reason) => {
                    let unit = unit_label(&item);
                    warn!(target_name = target, %unit, %reason, "skipping body");
                    warnings.push(Warning::PartialDecompileFailure {
                        target: target.to_string(),
                        unit,
                        reason,
                    });
                }
            }
        }

        let decls: Vec<NamespaceDecl> = declared
            .modules()
            .into_iter()
            .filter(|(_, node)| !node.externs.is_empty())
            .map(|(path, node)| NamespaceDecl {
                path,
                externs: node
                    .externs
                    .keys()
                    .map(|name| ExternDecl {
                        name: name.clone(),
                        shape: None,
                    })
                    .collect(),
            })
            .collect();
        if !decls.is_empty() {
            debug!(target_name = target, modules = decls.len(), "synthesized namespaces");
        }
        self.generated = merge(&self.generated, &declared);
        (kept, decls)
    }

    /// Everything synthesized so far in this run.
    pub fn generated(&self) -> &NamespaceNode {
        &self.generated
    }

    pub fn into_generated(self) -> NamespaceNode {
        self.generated
    }

    fn missing_members(&self, item: &Item) -> Result<Vec<(Vec<String>, String)>, String> {
        let body = match item {
            Item::Function(function) => &function.body,
            Item::Handler(handler) => &handler.body,
            Item::Namespace(_) | Item::Variable(_) => return Ok(Vec::new()),
        };
        let mut missing = Vec::new();
        for stmt in body {
            let Stmt::ModuleCall { path, member, .. } = stmt else {
                continue;
            };
            if self.known.resolve_member(path.as_slice(), member).is_some() {
                continue;
            }
            if path.is_empty() || !path.iter().all(|s| is_identifier(s)) || !is_identifier(member) {
                return Err(format!(
                    "module reference '{}::{member}' is not a valid name",
                    join_path(path.as_slice())
                ));
            }
            missing.push((path.clone(), member.clone()));
        }
        Ok(missing)
    }
}

fn unit_label(item: &Item) -> String {
    match item {
        Item::Function(function) => format!("function '{}'", function.name),
        Item::Handler(handler) => match &handler.event {
            Event::Flag => "flag handler".to_string(),
            Event::Click => "click handler".to_string(),
            Event::Message(message) => format!("handler for message '{message}'"),
            Event::Key(key) => format!("handler for key '{key}'"),
        },
        Item::Namespace(decl) => format!("namespace '{}'", join_path(decl.path.as_slice())),
        Item::Variable(decl) => format!("variable '{}'", decl.name),
    }
}
