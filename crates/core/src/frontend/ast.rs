use crate::variable::{DefaultValue, Literal, VarKind};

/// One parsed `.fuse` file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Script {
    pub items: Vec<Item>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Item {
    Namespace(NamespaceDecl),
    Variable(VarDecl),
    Function(FunctionDecl),
    Handler(HandlerDecl),
}

impl Script {
    pub fn namespaces(&self) -> impl Iterator<Item = &NamespaceDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Namespace(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = &VarDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Variable(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Function(decl) => Some(decl),
            _ => None,
        })
    }

    pub fn handlers(&self) -> impl Iterator<Item = &HandlerDecl> {
        self.items.iter().filter_map(|item| match item {
            Item::Handler(decl) => Some(decl),
            _ => None,
        })
    }
}

/// `namespace a::b { extern name: shape }`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub path: Vec<String>,
    pub externs: Vec<ExternDecl>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternDecl {
    pub name: String,
    pub shape: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarDecl {
    pub name: String,
    pub global: bool,
    pub export_name: Option<String>,
    pub default: DefaultValue,
}

impl VarDecl {
    pub fn kind(&self) -> VarKind {
        self.default.kind()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerDecl {
    pub event: Event,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Event {
    Flag,
    Click,
    Message(String),
    Key(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    Set { var: String, value: Expr },
    Change { var: String, by: Expr },
    Add { item: Expr, list: String },
    Call { name: String, args: Vec<Expr> },
    Broadcast(String),
    ModuleCall {
        path: Vec<String>,
        member: String,
        args: Vec<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Literal(Literal),
    Var(String),
}
