//! The rule data model shared between the compiler (which produces it) and
//! the runtime evaluator (which executes it). This is the immutable IR
//! described by the data model: once built, a `Program` is never mutated.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::duration::Duration;
use crate::ids::{RuleName, SensorId};
use crate::value::Value;

/// Comparison operator for `comparison` and `threshold_over_time` leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

/// Ordered comparison operator subset used by `threshold_over_time`
/// (equality/inequality make no sense against a running window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderedOp {
    Gt,
    Ge,
    Lt,
    Le,
}

impl OrderedOp {
    pub fn holds(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            OrderedOp::Gt => lhs > rhs,
            OrderedOp::Ge => lhs >= rhs,
            OrderedOp::Lt => lhs < rhs,
            OrderedOp::Le => lhs <= rhs,
        }
    }
}

/// The condition tree: a tagged variant over the six node kinds in the data
/// model. Deliberately a plain enum, not a trait object, so hot-path
/// evaluation never pays for virtual dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    Comparison {
        sensor: SensorId,
        op: CompareOp,
        value: Value,
    },
    Expression {
        text: String,
    },
    ThresholdOverTime {
        sensor: SensorId,
        op: OrderedOp,
        threshold: f64,
        duration: Duration,
    },
    All {
        children: Vec<Condition>,
    },
    Any {
        children: Vec<Condition>,
    },
    Not {
        child: Box<Condition>,
    },
}

/// How a rule's declared input is resolved when no fresh value is present
/// this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum FallbackStrategy {
    PropagateUnavailable,
    UseDefault { default_value: Value },
    UseLastKnown { max_age: Duration },
    SkipRule,
}

/// A rule's declared input sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    pub id: SensorId,
    pub required: bool,
    pub fallback: Option<FallbackStrategy>,
}

impl InputDescriptor {
    /// Enforces the invariant: `required=true` implies no fallback.
    pub fn validate(&self) -> Result<(), String> {
        if self.required && self.fallback.is_some() {
            return Err(format!(
                "input '{}' is required but also declares a fallback",
                self.id
            ));
        }
        match &self.fallback {
            Some(FallbackStrategy::UseDefault { .. }) => Ok(()),
            Some(FallbackStrategy::UseLastKnown { .. }) => Ok(()),
            _ => Ok(()),
        }
    }
}

/// When an action's would-write value is actually committed to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitMode {
    Always,
    OnChange,
    OnEnter,
}

/// A single side effect a rule can perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Set {
        key: SensorId,
        value_expression: String,
        emit: EmitMode,
    },
    Log {
        message: String,
        emit: EmitMode,
    },
    Buffer {
        key: SensorId,
        value_expression: String,
        max_items: usize,
        emit: EmitMode,
    },
}

impl Action {
    /// The output sensor this action targets, if any (`log` has none).
    pub fn output_key(&self) -> Option<&SensorId> {
        match self {
            Action::Set { key, .. } => Some(key),
            Action::Log { .. } => None,
            Action::Buffer { key, .. } => Some(key),
        }
    }

    pub fn emit_mode(&self) -> EmitMode {
        match self {
            Action::Set { emit, .. } => *emit,
            Action::Log { emit, .. } => *emit,
            Action::Buffer { emit, .. } => *emit,
        }
    }
}

/// A fully validated, immutable rule ready for layering and execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: RuleName,
    pub description: Option<String>,
    pub inputs: Vec<InputDescriptor>,
    pub condition: Condition,
    pub actions: Vec<Action>,
    pub else_actions: Vec<Action>,
    /// Source position, carried through for diagnostics; absent for
    /// programmatically constructed rules.
    pub source_file: Option<String>,
    pub line: Option<u32>,
}

impl Rule {
    /// All sensors this rule reads from, via declared inputs or referenced
    /// directly in its condition tree.
    pub fn input_sensors(&self) -> Vec<SensorId> {
        let mut ids: Vec<SensorId> = self.inputs.iter().map(|i| i.id.clone()).collect();
        collect_condition_sensors(&self.condition, &mut ids);
        ids.sort();
        ids.dedup();
        ids
    }

    /// All sensors this rule writes to, across both branches.
    pub fn output_sensors(&self) -> Vec<SensorId> {
        let mut ids: Vec<SensorId> = self
            .actions
            .iter()
            .chain(self.else_actions.iter())
            .filter_map(Action::output_key)
            .cloned()
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

fn collect_condition_sensors(cond: &Condition, out: &mut Vec<SensorId>) {
    match cond {
        Condition::Comparison { sensor, .. } => out.push(sensor.clone()),
        Condition::ThresholdOverTime { sensor, .. } => out.push(sensor.clone()),
        Condition::Expression { .. } => {
            // Identifier extraction for expression leaves happens in the
            // dependency analyzer, which has access to the tokenizer; the
            // shared IR only stores the source text here.
        }
        Condition::All { children } | Condition::Any { children } => {
            for c in children {
                collect_condition_sensors(c, out);
            }
        }
        Condition::Not { child } => collect_condition_sensors(child, out),
    }
}

/// Kind of a catalog-registered sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Physical,
    Virtual,
    Buffer,
}

/// A sensor catalog entry as described by the data model, plus the
/// analyzer-derived producing rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorCatalogEntry {
    pub id: SensorId,
    pub kind: SensorKind,
    #[serde(rename = "type")]
    pub value_type: String,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub units: Option<String>,
    pub retain_last: Option<Duration>,
    pub export: Option<bool>,
    pub widget: Option<String>,
    /// Populated by the sensor catalog / dependency analyzer, not part of
    /// the raw catalog file.
    #[serde(default)]
    pub produced_by: Option<RuleName>,
}

/// A temporal dependency extracted from a `threshold_over_time` leaf:
/// the rule that reads it, the sensor, and the window duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalDependency {
    pub rule: RuleName,
    pub sensor: SensorId,
    pub duration: Duration,
}

/// A rule annotated with its evaluation layer and a stable handle into the
/// per-cycle sensor value array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayeredRule {
    pub rule: Rule,
    pub layer: u32,
}

/// The compiled program the runtime evaluator executes cycle-by-cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub rules: Vec<LayeredRule>,
    pub catalog: Vec<SensorCatalogEntry>,
    pub temporal_dependencies: Vec<TemporalDependency>,
    /// Sensor identifier to stable numeric handle, for cache-friendly
    /// per-cycle array indexing.
    pub symbol_table: BTreeMap<SensorId, u32>,
}

impl Program {
    pub fn total_rules(&self) -> usize {
        self.rules.len()
    }

    pub fn total_layers(&self) -> u32 {
        self.rules.iter().map(|r| r.layer).max().map_or(0, |m| m + 1)
    }

    /// Rules grouped by layer, ascending, each layer's rules sorted by name
    /// for deterministic execution order.
    pub fn layers(&self) -> Vec<Vec<&LayeredRule>> {
        let total = self.total_layers() as usize;
        let mut out: Vec<Vec<&LayeredRule>> = (0..total).map(|_| Vec::new()).collect();
        for r in &self.rules {
            out[r.layer as usize].push(r);
        }
        for layer in &mut out {
            layer.sort_by(|a, b| a.rule.name.as_str().cmp(b.rule.name.as_str()));
        }
        out
    }

    /// Render the layered execution plan as a Mermaid flowchart: one node
    /// per rule, an edge from every rule that writes a sensor to every rule
    /// in a later layer that reads it.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");
        for layered in &self.rules {
            let label = format!(
                "{}\\n[{}] -&gt; [{}]",
                layered.rule.name,
                layered.rule.input_sensors().iter().map(SensorId::as_str).collect::<Vec<_>>().join(", "),
                layered.rule.output_sensors().iter().map(SensorId::as_str).collect::<Vec<_>>().join(", "),
            );
            out.push_str(&format!("  {}[\"{}\"]\n", layered.rule.name, label));
        }
        for consumer in &self.rules {
            let reads = consumer.rule.input_sensors();
            for producer in &self.rules {
                if producer.layer < consumer.layer
                    && producer.rule.output_sensors().iter().any(|s| reads.contains(s))
                {
                    out.push_str(&format!("  {} --> {}\n", producer.rule.name, consumer.rule.name));
                }
            }
        }
        out
    }

    /// Render the layered execution plan as ASCII stages, one per layer,
    /// naming every rule scheduled in it.
    pub fn to_ascii(&self) -> String {
        let mut out = String::from("Execution Plan\n==============\n\n");
        for (idx, layer) in self.layers().iter().enumerate() {
            let parallel = if layer.len() > 1 { " (parallel)" } else { "" };
            out.push_str(&format!("Stage {idx}{parallel}:\n"));
            for layered in layer {
                out.push_str(&format!(
                    "  {} [in: {}] [out: {}]\n",
                    layered.rule.name,
                    layered.rule.input_sensors().iter().map(SensorId::as_str).collect::<Vec<_>>().join(", "),
                    layered.rule.output_sensors().iter().map(SensorId::as_str).collect::<Vec<_>>().join(", "),
                ));
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sensor(s: &str) -> SensorId {
        SensorId::new(s).unwrap()
    }

    fn rule_name(s: &str) -> RuleName {
        RuleName::new(s).unwrap()
    }

    #[test]
    fn input_sensors_include_condition_references() {
        let rule = Rule {
            name: rule_name("R"),
            description: None,
            inputs: vec![],
            condition: Condition::Comparison {
                sensor: sensor("temperature"),
                op: CompareOp::Gt,
                value: Value::Number(30.0),
            },
            actions: vec![],
            else_actions: vec![],
            source_file: None,
            line: None,
        };
        assert_eq!(rule.input_sensors(), vec![sensor("temperature")]);
    }

    #[test]
    fn output_sensors_dedup_across_branches() {
        let rule = Rule {
            name: rule_name("R"),
            description: None,
            inputs: vec![],
            condition: Condition::Comparison {
                sensor: sensor("x"),
                op: CompareOp::Gt,
                value: Value::Number(1.0),
            },
            actions: vec![Action::Set {
                key: sensor("y"),
                value_expression: "1".into(),
                emit: EmitMode::Always,
            }],
            else_actions: vec![Action::Set {
                key: sensor("y"),
                value_expression: "0".into(),
                emit: EmitMode::Always,
            }],
            source_file: None,
            line: None,
        };
        assert_eq!(rule.output_sensors(), vec![sensor("y")]);
    }

    #[test]
    fn required_input_with_fallback_is_invalid() {
        let input = InputDescriptor {
            id: sensor("humidity"),
            required: true,
            fallback: Some(FallbackStrategy::SkipRule),
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn layers_group_and_sort_by_name() {
        let mk = |name: &str, layer: u32| LayeredRule {
            rule: Rule {
                name: rule_name(name),
                description: None,
                inputs: vec![],
                condition: Condition::All { children: vec![] },
                actions: vec![],
                else_actions: vec![],
                source_file: None,
                line: None,
            },
            layer,
        };
        let program = Program {
            rules: vec![mk("Zebra", 0), mk("Alpha", 0), mk("Beta", 1)],
            catalog: vec![],
            temporal_dependencies: vec![],
            symbol_table: BTreeMap::new(),
        };
        let layers = program.layers();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[0][0].rule.name.as_str(), "Alpha");
        assert_eq!(layers[0][1].rule.name.as_str(), "Zebra");
        assert_eq!(layers[1][0].rule.name.as_str(), "Beta");
    }

    #[test]
    fn ascii_plan_lists_every_rule_under_its_stage() {
        let producer = Rule {
            name: rule_name("derive"),
            description: None,
            inputs: vec![],
            condition: Condition::Comparison { sensor: sensor("raw"), op: CompareOp::Gt, value: Value::Number(0.0) },
            actions: vec![Action::Set { key: sensor("derived"), value_expression: "1".into(), emit: EmitMode::Always }],
            else_actions: vec![],
            source_file: None,
            line: None,
        };
        let consumer = Rule {
            name: rule_name("consume"),
            description: None,
            inputs: vec![],
            condition: Condition::Comparison { sensor: sensor("derived"), op: CompareOp::Eq, value: Value::Number(1.0) },
            actions: vec![],
            else_actions: vec![],
            source_file: None,
            line: None,
        };
        let program = Program {
            rules: vec![LayeredRule { rule: producer, layer: 0 }, LayeredRule { rule: consumer, layer: 1 }],
            catalog: vec![],
            temporal_dependencies: vec![],
            symbol_table: BTreeMap::new(),
        };

        let ascii = program.to_ascii();
        assert!(ascii.contains("Stage 0:"));
        assert!(ascii.contains("derive"));
        assert!(ascii.contains("Stage 1:"));
        assert!(ascii.contains("consume"));

        let mermaid = program.to_mermaid();
        assert!(mermaid.contains("derive --> consume"));
    }
}
