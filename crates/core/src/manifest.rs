//! Persisted IR manifest: the JSON artifact a compile emits alongside the
//! program, describing every rule's metadata for tooling that doesn't want
//! to re-link against the full IR types.

use serde::{Deserialize, Serialize};

use crate::ir::{LayeredRule, Program, TemporalDependency};

/// One rule entry in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRule {
    pub name: String,
    pub source_file: Option<String>,
    pub line: Option<u32>,
    pub description: Option<String>,
    pub input_sensors: Vec<String>,
    pub output_sensors: Vec<String>,
    pub layer: u32,
    pub temporal_dependencies: Vec<ManifestTemporalDependency>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestTemporalDependency {
    pub sensor: String,
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildMetrics {
    pub total_rules: usize,
}

/// The persisted IR manifest, `rules.manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: String,
    pub rules: Vec<ManifestRule>,
    pub build_metrics: BuildMetrics,
}

impl Program {
    /// Render this program's metadata into a manifest, stamping
    /// `generated_at` with the caller-supplied timestamp (an RFC 3339
    /// string; the program itself has no notion of wall-clock time).
    pub fn to_manifest(&self, generated_at: impl Into<String>) -> Manifest {
        let rules = self
            .rules
            .iter()
            .map(|layered| manifest_rule(layered, &self.temporal_dependencies))
            .collect();
        Manifest {
            generated_at: generated_at.into(),
            rules,
            build_metrics: BuildMetrics {
                total_rules: self.total_rules(),
            },
        }
    }
}

fn manifest_rule(layered: &LayeredRule, all_temporal: &[TemporalDependency]) -> ManifestRule {
    let temporal_dependencies = all_temporal
        .iter()
        .filter(|dep| dep.rule == layered.rule.name)
        .map(|dep| ManifestTemporalDependency {
            sensor: dep.sensor.to_string(),
            duration: dep.duration.to_literal(),
        })
        .collect();
    ManifestRule {
        name: layered.rule.name.to_string(),
        source_file: layered.rule.source_file.clone(),
        line: layered.rule.line,
        description: layered.rule.description.clone(),
        input_sensors: layered.rule.input_sensors().iter().map(|s| s.to_string()).collect(),
        output_sensors: layered.rule.output_sensors().iter().map(|s| s.to_string()).collect(),
        layer: layered.layer,
        temporal_dependencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::RuleBuilder;
    use crate::ids::{RuleName, SensorId};
    use crate::ir::{Action, CompareOp, Condition, EmitMode};
    use crate::value::Value;
    use std::collections::BTreeMap;

    fn sensor(s: &str) -> SensorId {
        SensorId::new(s).unwrap()
    }

    fn sample_program() -> Program {
        let rule = RuleBuilder::new(RuleName::new("HighTemperatureRule").unwrap())
            .description("flags hot readings")
            .condition(Condition::Comparison {
                sensor: sensor("temperature"),
                op: CompareOp::Gt,
                value: Value::Number(30.0),
            })
            .with_action(Action::Set {
                key: sensor("alert"),
                value_expression: "1".into(),
                emit: EmitMode::Always,
            })
            .source("rules.yaml", 3)
            .build()
            .unwrap();
        Program {
            rules: vec![LayeredRule { rule, layer: 0 }],
            catalog: vec![],
            temporal_dependencies: vec![],
            symbol_table: BTreeMap::new(),
        }
    }

    #[test]
    fn to_manifest_captures_rule_metadata() {
        let program = sample_program();
        let manifest = program.to_manifest("2026-07-26T00:00:00Z");
        assert_eq!(manifest.build_metrics.total_rules, 1);
        assert_eq!(manifest.rules[0].name, "HighTemperatureRule");
        assert_eq!(manifest.rules[0].source_file.as_deref(), Some("rules.yaml"));
        assert_eq!(manifest.rules[0].input_sensors, vec!["temperature".to_string()]);
        assert_eq!(manifest.rules[0].output_sensors, vec!["alert".to_string()]);
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let manifest = sample_program().to_manifest("2026-07-26T00:00:00Z");
        let json = serde_json::to_string(&manifest).unwrap();
        let reparsed: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(manifest, reparsed);
    }
}
