//! Error types for the compiler core, one leaf enum per phase, following the
//! error handling design's "kinds, not type names" taxonomy.

use thiserror::Error;

/// DSL Loader failures: malformed YAML or duplicate mapping keys.
/// Fatal for the current file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{source_name}: invalid YAML: {message}")]
    InvalidYaml { source_name: String, message: String },

    #[error("{source_name}:{line}: duplicate key '{key}'")]
    DuplicateKey {
        source_name: String,
        line: u32,
        key: String,
    },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Schema validator failures. Collected across a whole document; the
/// validator never fails on the first error.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("rule '{rule}': missing required field '{field}'")]
    MissingField { rule: String, field: String },

    #[error("rule '{rule}': field '{field}' has invalid value '{value}'")]
    InvalidValue {
        rule: String,
        field: String,
        value: String,
    },

    #[error("rule '{rule}': invalid duration literal '{literal}'")]
    InvalidDuration { rule: String, literal: String },

    #[error("rule '{rule}': invalid identifier '{identifier}'")]
    InvalidIdentifier { rule: String, identifier: String },

    #[error("rule '{rule}': unknown field '{field}' (additional properties are forbidden)")]
    AdditionalProperty { rule: String, field: String },

    #[error("rule '{rule}': duplicate rule name")]
    DuplicateRuleName { rule: String },

    #[error("rule '{rule}': {message}")]
    Invariant { rule: String, message: String },
}

pub type SchemaResult<T> = Result<T, Vec<SchemaError>>;

/// Sensor catalog resolution failures. Fatal for compilation.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("rule '{rule}': references unknown sensor '{sensor}'")]
    UnknownSensor { rule: String, sensor: String },

    #[error("virtual sensor '{sensor}' is produced by multiple rules: {}", format_rules(.producers))]
    MultipleProducers { sensor: String, producers: Vec<String> },

    #[error("sensor '{sensor}' is written to by rule '{rule}' but is not declared virtual")]
    NotVirtual { sensor: String, rule: String },
}

pub type CatalogResult<T> = Result<T, Vec<CatalogError>>;

fn format_rules(rules: &[String]) -> String {
    rules.join(", ")
}

/// Dependency analyzer failures.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("cyclic dependency detected: {}", format_cycle(.0))]
    CycleDetected(Vec<String>),
}

fn format_cycle(cycle: &[String]) -> String {
    format!("{} -> {}", cycle.join(" -> "), cycle.first().cloned().unwrap_or_default())
}

pub type DependencyResult<T> = Result<T, DependencyError>;

/// Expression compilation failures surfaced during IR building.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("rule '{rule}': expression error: {source}")]
    Expression {
        rule: String,
        #[source]
        source: beacon_expr::ExprError,
    },
}

pub type IrResult<T> = Result<T, IrError>;

/// The top-level compile error: the first fatal phase failure encountered.
/// Non-fatal diagnostics (warnings, and schema errors collected across a
/// whole document) travel separately through a `DiagnosticSink`.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("schema validation failed with {} error(s)", .0.len())]
    Schema(Vec<SchemaError>),

    #[error("sensor catalog resolution failed with {} error(s)", .0.len())]
    Catalog(Vec<CatalogError>),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Ir(#[from] IrError),
}

impl From<Vec<SchemaError>> for CompileError {
    fn from(errors: Vec<SchemaError>) -> Self {
        CompileError::Schema(errors)
    }
}

impl From<Vec<CatalogError>> for CompileError {
    fn from(errors: Vec<CatalogError>) -> Self {
        CompileError::Catalog(errors)
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
