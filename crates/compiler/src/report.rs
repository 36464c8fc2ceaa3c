//! Compile report generation.
//!
//! Renders a human-readable markdown summary of a compilation: the
//! resulting program's rule/layer counts plus every diagnostic collected
//! along the way, grouped by severity.

use beacon_core::diagnostic::{Diagnostic, DiagnosticSink};
use beacon_core::ir::Program;

/// A full compile report: the program's shape plus every diagnostic raised
/// while building it.
#[derive(Debug, Clone)]
pub struct CompileReport<'a> {
    pub program: &'a Program,
    pub diagnostics: &'a DiagnosticSink,
}

impl<'a> CompileReport<'a> {
    pub fn new(program: &'a Program, diagnostics: &'a DiagnosticSink) -> Self {
        Self { program, diagnostics }
    }

    /// Render a markdown summary.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str("# Compile Report\n\n");

        md.push_str("## Summary\n\n");
        md.push_str(&format!("- **Rules**: {}\n", self.program.total_rules()));
        md.push_str(&format!("- **Layers**: {}\n", self.program.total_layers()));
        md.push_str(&format!("- **Sensors tracked**: {}\n", self.program.symbol_table.len()));
        md.push_str(&format!("- **Errors**: {}\n", self.diagnostics.errors().count()));
        md.push_str(&format!("- **Warnings**: {}\n", self.diagnostics.warnings().count()));
        md.push('\n');

        md.push_str("## Layers\n\n");
        for (layer_idx, rules) in self.program.layers().iter().enumerate() {
            md.push_str(&format!("### Layer {layer_idx}\n\n"));
            for layered in rules {
                md.push_str(&format!("- `{}`", layered.rule.name));
                if let Some(description) = &layered.rule.description {
                    md.push_str(&format!(" — {description}"));
                }
                md.push('\n');
            }
            md.push('\n');
        }

        md.push_str("## Execution Plan\n\n```\n");
        md.push_str(&self.program.to_ascii());
        md.push_str("```\n\n");

        let errors: Vec<&Diagnostic> = self.diagnostics.errors().collect();
        if !errors.is_empty() {
            md.push_str("## Errors\n\n");
            for d in &errors {
                md.push_str(&format!("- {d}\n"));
            }
            md.push('\n');
        }

        let warnings: Vec<&Diagnostic> = self.diagnostics.warnings().collect();
        if !warnings.is_empty() {
            md.push_str("## Warnings\n\n");
            for d in &warnings {
                md.push_str(&format!("- {d}\n"));
            }
            md.push('\n');
        }

        md
    }
}
