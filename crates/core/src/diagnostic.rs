//! Structured diagnostics with rule-scoped context.
//!
//! Diagnostics are deliberately not an error enum: the compiler accumulates
//! every diagnostic produced during a phase and reports the complete list at
//! the phase boundary rather than failing on the first one.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The taxonomy of diagnostic kinds named in the error handling design.
/// Kinds, not type names: several map onto the same Rust error enum variant
/// depending on which phase raised them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ParseError,
    SchemaError,
    CatalogError,
    CycleDetected,
    DepthExceeded,
    ExpressionError,
    IoError,
    RuntimeIndeterminate,
}

impl DiagnosticKind {
    /// Warnings never prevent compilation; everything else does.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            DiagnosticKind::DepthExceeded | DiagnosticKind::RuntimeIndeterminate
        )
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::ParseError => "parse_error",
            DiagnosticKind::SchemaError => "schema_error",
            DiagnosticKind::CatalogError => "catalog_error",
            DiagnosticKind::CycleDetected => "cycle_detected",
            DiagnosticKind::DepthExceeded => "depth_exceeded",
            DiagnosticKind::ExpressionError => "expression_error",
            DiagnosticKind::IoError => "io_error",
            DiagnosticKind::RuntimeIndeterminate => "runtime_indeterminate",
        };
        write!(f, "{s}")
    }
}

/// A single diagnostic: kind, message, optional rule/source context, and a
/// structured context map for machine consumption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub rule_name: Option<String>,
    pub source_file: Option<String>,
    pub line: Option<u32>,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            rule_name: None,
            source_file: None,
            line: None,
            context: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, rule_name: impl Into<String>) -> Self {
        self.rule_name = Some(rule_name.into());
        self
    }

    pub fn with_source(mut self, source_file: impl Into<String>, line: u32) -> Self {
        self.source_file = Some(source_file.into());
        self.line = Some(line);
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn is_warning(&self) -> bool {
        self.kind.is_warning()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.source_file {
            write!(f, "{file}")?;
            if let Some(line) = self.line {
                write!(f, ":{line}")?;
            }
            write!(f, ": ")?;
        }
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(rule) = &self.rule_name {
            write!(f, " (rule '{rule}')")?;
        }
        if !self.context.is_empty() {
            write!(f, " {{")?;
            for (i, (k, v)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}={v}")?;
            }
            write!(f, "}}")?;
        }
        Ok(())
    }
}

/// Accumulates diagnostics across a compilation phase. A phase collects
/// every diagnostic before deciding whether to fail, rather than failing
/// fast on the first error.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(other);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| !d.is_warning())
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_warning())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_warning())
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn as_slice(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_exceeded_and_runtime_indeterminate_are_warnings() {
        assert!(DiagnosticKind::DepthExceeded.is_warning());
        assert!(DiagnosticKind::RuntimeIndeterminate.is_warning());
        assert!(!DiagnosticKind::CycleDetected.is_warning());
    }

    #[test]
    fn sink_has_errors_only_when_non_warning_present() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::new(DiagnosticKind::DepthExceeded, "deep chain"));
        assert!(!sink.has_errors());
        sink.push(Diagnostic::new(DiagnosticKind::CycleDetected, "cycle"));
        assert!(sink.has_errors());
        assert_eq!(sink.errors().count(), 1);
        assert_eq!(sink.warnings().count(), 1);
    }

    #[test]
    fn display_includes_source_rule_and_context() {
        let d = Diagnostic::new(DiagnosticKind::SchemaError, "missing field")
            .with_rule("HighTempRule")
            .with_source("rules.yaml", 12)
            .with_context("field", "description");
        let rendered = format!("{d}");
        assert!(rendered.contains("rules.yaml:12"));
        assert!(rendered.contains("HighTempRule"));
        assert!(rendered.contains("field=description"));
    }
}
