use std::path::PathBuf;

use fusepack_assets::AssetError;
use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

pub type FuseResult<T> = Result<T, FuseError>;

/// One structural problem found in a project description.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Dotted location inside the document, e.g. `targets[1].name`.
    pub location: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum FuseError {
    #[error("project description is invalid ({} violation(s)): {}", .violations.len(), join_violations(.violations))]
    #[diagnostic(code("fuse.schema_violation"))]
    SchemaViolation { violations: Vec<SchemaViolation> },

    #[error("cannot read '{}': {message}", .path.display())]
    #[diagnostic(code("fuse.resolution"))]
    Resolution { path: PathBuf, message: String },

    #[error("unresolved symbol '{symbol}' in target '{target}'")]
    #[diagnostic(
        code("fuse.unresolved_symbol"),
        help("declare it in this target, in an earlier target as a global, or in a type file")
    )]
    UnresolvedSymbol { target: String, symbol: String },

    #[error("parse error in {}: {message}", .path.display())]
    #[diagnostic(code("fuse.parse"))]
    Parse {
        path: PathBuf,
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("malformed type file {}: {message}", .path.display())]
    #[diagnostic(code("fuse.type_file"))]
    TypeFile {
        path: PathBuf,
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("asset error: {0}")]
    #[diagnostic(code("fuse.asset"))]
    Asset(#[from] AssetError),

    #[error("archive error: {0}")]
    #[diagnostic(code("fuse.archive"))]
    Archive(String),

    #[error("serialization error: {0}")]
    #[diagnostic(code("fuse.serialization"))]
    Serialization(String),

    #[error("io error: {0}")]
    #[diagnostic(code("fuse.io"))]
    Io(#[from] std::io::Error),
}

impl FuseError {
    pub(crate) fn resolution(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        FuseError::Resolution {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

impl From<zip::result::ZipError> for FuseError {
    fn from(value: zip::result::ZipError) -> Self {
        FuseError::Archive(value.to_string())
    }
}

impl From<serde_json::Error> for FuseError {
    fn from(value: serde_json::Error) -> Self {
        FuseError::Serialization(value.to_string())
    }
}

fn join_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Non-fatal problems surfaced to the caller alongside a successful result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// A declaration collided with an existing one and was dropped.
    SymbolConflict {
        target: String,
        name: String,
        reason: String,
    },
    /// One function or script body could not be decompiled and was skipped.
    PartialDecompileFailure {
        target: String,
        unit: String,
        reason: String,
    },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::SymbolConflict {
                target,
                name,
                reason,
            } => write!(f, "{target}: dropped declaration '{name}': {reason}"),
            Warning::PartialDecompileFailure {
                target,
                unit,
                reason,
            } => write!(f, "{target}: skipped {unit}: {reason}"),
        }
    }
}

/// Byte span of the 1-based `line`/`column` position in `input`.
pub(crate) fn line_column_span(input: &str, line: usize, column: usize) -> SourceSpan {
    if line == 0 {
        return (0, 1).into();
    }
    let mut offset = 0usize;
    for (index, chunk) in input.split_inclusive('\n').enumerate() {
        if index + 1 == line {
            let column_index = column.saturating_sub(1);
            let byte_index = chunk
                .char_indices()
                .nth(column_index)
                .map(|(idx, _)| idx)
                .unwrap_or(chunk.len().saturating_sub(1));
            return (offset + byte_index, 1).into();
        }
        offset += chunk.len();
    }
    (input.len().saturating_sub(1), 1).into()
}
