//! Beacon Compiler
//!
//! Turns a YAML rule file into the immutable `Program` the runtime evaluator
//! executes: load the raw document, validate it against the v3 schema,
//! resolve sensor references against a catalog, analyze rule-to-rule
//! dependencies into evaluation layers, and lower everything into IR.
//!
//! # Pipeline
//!
//! ```text
//! Loader -> Schema Validator -> Sensor Catalog -> Dependency Analyzer -> IR Builder -> Program
//! ```
//!
//! # Quick start
//!
//! ```ignore
//! use beacon_compiler::{compile, CompileOptions};
//!
//! let outcome = compile(yaml_text, "rules.yaml", &catalog, CompileOptions::default())?;
//! println!("{}", outcome.report().to_markdown());
//! ```

pub mod catalog;
pub mod config;
pub mod dag;
pub mod error;
pub mod ir_builder;
pub mod loader;
pub mod raw;
pub mod report;
pub mod schema;

pub use catalog::{Catalog, ResolvedRuleSet};
pub use config::{SystemConfig, TemporalMode};
pub use error::{CatalogError, CompileError, CompileResult, DependencyError, IrError, ParseError, SchemaError};
pub use report::CompileReport;
pub use schema::{ValidatedRuleSet, ValidationLevel};

use beacon_core::diagnostic::DiagnosticSink;
use beacon_core::ir::Program;

/// Options controlling a single compile invocation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub validation_level: ValidationLevel,
    pub allow_invalid_sensors: bool,
    pub max_dependency_depth: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            validation_level: ValidationLevel::default(),
            allow_invalid_sensors: false,
            max_dependency_depth: 10,
        }
    }
}

/// The result of a successful compile: the program plus every diagnostic
/// collected along the way (missing descriptions, deep dependency chains,
/// and the like — nothing fatal, since a fatal issue surfaces as `Err`).
#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub program: Program,
    pub diagnostics: DiagnosticSink,
}

impl CompileOutcome {
    pub fn report(&self) -> CompileReport<'_> {
        CompileReport::new(&self.program, &self.diagnostics)
    }
}

/// Run the full pipeline: load, validate, resolve against the catalog,
/// analyze dependencies, and lower into a `Program`.
pub fn compile(
    yaml_text: &str,
    source_name: &str,
    catalog: &Catalog,
    options: CompileOptions,
) -> Result<CompileOutcome, CompileError> {
    let mut diagnostics = DiagnosticSink::new();

    let document = loader::load(yaml_text, source_name)?;

    let validated = schema::validate(&document, options.validation_level, source_name, &mut diagnostics)?;

    let resolved = catalog::resolve(&validated, catalog, options.allow_invalid_sensors)?;

    let analysis = dag::analyze(&resolved, options.max_dependency_depth, &mut diagnostics)?;

    let program = ir_builder::lower(&resolved, analysis)?;

    Ok(CompileOutcome { program, diagnostics })
}
