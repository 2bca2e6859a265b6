//! Type-declaration files: TOML documents contributing modules to the
//! namespace every target compiles against.
//!
//! ```toml
//! [[module]]
//! path = "pen::extra"
//! functions.glow = { params = ["amount"], opcode = "pen_glow" }
//! variables.size = "scalar"
//! externs.color = "number"
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{FuseError, FuseResult};
use crate::frontend::is_identifier;
use crate::namespace::{merge, split_path, FunctionSig, NamespaceNode};
use crate::variable::VarKind;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TypeFile {
    #[serde(default, rename = "module")]
    modules: Vec<ModuleDecl>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleDecl {
    path: String,
    #[serde(default)]
    functions: BTreeMap<String, FunctionSig>,
    #[serde(default)]
    variables: BTreeMap<String, VarKind>,
    #[serde(default)]
    externs: BTreeMap<String, String>,
}

/// Parses one type file into a namespace tree rooted at the unnamed root.
pub fn parse_type_file(path: &Path, source: &str) -> FuseResult<NamespaceNode> {
    let file: TypeFile = toml::from_str(source).map_err(|err| {
        let span = err
            .span()
            .map(|range| (range.start, range.len().max(1)))
            .unwrap_or((0, 1));
        FuseError::TypeFile {
            path: path.to_path_buf(),
            message: err.message().to_string(),
            src: source.to_string(),
            span: span.into(),
        }
    })?;

    let mut root = NamespaceNode::root();
    for module in file.modules {
        let segments = split_path(&module.path);
        if let Some(bad) = segments.iter().find(|segment| !is_identifier(segment)) {
            let offset = source.find(&module.path).unwrap_or(0);
            return Err(FuseError::TypeFile {
                path: path.to_path_buf(),
                message: format!("invalid module path segment '{bad}' in '{}'", module.path),
                src: source.to_string(),
                span: (offset, module.path.len().max(1)).into(),
            });
        }
        let mut declared = NamespaceNode::root();
        let node = declared.module_entry(&segments);
        node.functions = module.functions;
        node.variables = module.variables;
        node.externs = module.externs;
        root = merge(&root, &declared);
    }
    Ok(root)
}

pub fn load_type_file(path: &Path) -> FuseResult<NamespaceNode> {
    let source = fs::read_to_string(path).map_err(|err| FuseError::resolution(path, err))?;
    parse_type_file(path, &source)
}

/// Builtins merged with every type file, later files overriding earlier ones.
#[instrument(skip_all, fields(files = type_files.len()))]
pub fn load_namespace(type_files: &[PathBuf]) -> FuseResult<NamespaceNode> {
    let mut namespace = NamespaceNode::builtins().clone();
    for path in type_files {
        let declared = load_type_file(path)?;
        debug!(path = %path.display(), modules = declared.modules().len(), "merging type file");
        namespace = merge(&namespace, &declared);
    }
    Ok(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace::Member;

    #[test]
    fn type_file_declares_nested_modules() {
        let source = r#"
[[module]]
path = "pen::extra"
functions.glow = { params = ["amount"], opcode = "pen_glow" }
externs.color = "number"

[[module]]
path = "looks"
functions.say = { params = ["message"], opcode = "looks_sayforsecs" }
"#;
        let tree = parse_type_file(Path::new("types.toml"), source).expect("valid type file");
        assert_eq!(
            tree.resolve_member(&["pen", "extra"], "color"),
            Some(Member::Extern("number"))
        );

        let merged = merge(NamespaceNode::builtins(), &tree);
        let Some(Member::Function(say)) = merged.resolve_member(&["looks"], "say") else {
            panic!("say should stay a function");
        };
        assert_eq!(say.opcode.as_deref(), Some("looks_sayforsecs"));
        assert!(merged.resolve_member(&["looks"], "hide").is_some());
    }

    #[test]
    fn malformed_type_file_is_fatal() {
        let err = parse_type_file(Path::new("bad.toml"), "[[module]]\npath = 3\n")
            .expect_err("path must be a string");
        assert!(matches!(err, FuseError::TypeFile { .. }));

        let err = parse_type_file(Path::new("bad.toml"), "[[module]]\npath = \"a::9x\"\n")
            .expect_err("segments must be identifiers");
        assert!(err.to_string().contains("9x"));
    }

    #[test]
    fn unreadable_type_file_names_the_path() {
        let err = load_namespace(&[PathBuf::from("/definitely/missing/types.toml")])
            .expect_err("missing file");
        match err {
            FuseError::Resolution { path, .. } => {
                assert_eq!(path, PathBuf::from("/definitely/missing/types.toml"))
            }
            other => panic!("expected resolution failure, got {other:?}"),
        }
    }
}
