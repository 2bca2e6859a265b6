use crate::frontend::{Item, NamespaceDecl, Script, SourcePrinter, VarDecl};

/// Assembles one target's regenerated script and prints it.
///
/// Items are ordered namespace declarations, variables, functions, then
/// event handlers, whatever order the blocks were stored in.
pub struct SourceEmitter<'a, P: ?Sized> {
    printer: &'a P,
}

impl<'a, P> SourceEmitter<'a, P>
where
    P: SourcePrinter + ?Sized,
{
    pub fn new(printer: &'a P) -> Self {
        Self { printer }
    }

    pub fn assemble(
        &self,
        namespaces: Vec<NamespaceDecl>,
        variables: Vec<VarDecl>,
        bodies: Vec<Item>,
    ) -> Script {
        let (functions, handlers): (Vec<Item>, Vec<Item>) = bodies
            .into_iter()
            .filter(|item| matches!(item, Item::Function(_) | Item::Handler(_)))
            .partition(|item| matches!(item, Item::Function(_)));

        let mut items = Vec::with_capacity(namespaces.len() + variables.len() + functions.len() + handlers.len());
        items.extend(namespaces.into_iter().map(Item::Namespace));
        items.extend(variables.into_iter().map(Item::Variable));
        items.extend(functions);
        items.extend(handlers);
        Script { items }
    }

    pub fn emit(&self, script: &Script) -> String {
        self.printer.to_source(script)
    }
}
