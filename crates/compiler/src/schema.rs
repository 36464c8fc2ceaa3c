//! Schema Validator: turns the untyped [`RawDocument`] into validated
//! [`beacon_core::ir::Rule`] values, canonicalizing durations and
//! identifiers and rejecting anything outside the v3 schema. Collects every
//! error across the whole document rather than failing on the first one.

use beacon_core::builders::RuleBuilder;
use beacon_core::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSink};
use beacon_core::duration::Duration;
use beacon_core::ids::{RuleName, SensorId};
use beacon_core::ir::{Action, CompareOp, Condition, EmitMode, FallbackStrategy, InputDescriptor, OrderedOp, Rule};
use beacon_core::value::Value;
use hashbrown::HashSet;

use crate::error::SchemaError;
use crate::raw::{RawAction, RawCondition, RawDocument, RawFallback, RawInputDescriptor, RawRule};

/// Validation strictness, selectable per compile invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    Strict,
    #[default]
    Normal,
    Relaxed,
}

const STRICT_MAX_ACTIONS: usize = 5;
const NORMAL_WARN_ACTIONS: usize = 10;
const RELAXED_WARN_ACTIONS: usize = 15;

/// A document whose rules have all passed schema validation, but have not
/// yet been resolved against the sensor catalog.
#[derive(Debug, Clone)]
pub struct ValidatedRuleSet {
    pub rules: Vec<Rule>,
}

/// Validate every rule in `document`, collecting all [`SchemaError`]s rather
/// than stopping at the first one. Non-fatal observations (missing
/// descriptions, action counts) are reported on `sink` according to `level`.
pub fn validate(
    document: &RawDocument,
    level: ValidationLevel,
    source_name: &str,
    sink: &mut DiagnosticSink,
) -> Result<ValidatedRuleSet, Vec<SchemaError>> {
    let mut errors = Vec::new();
    let mut rules = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for raw in &document.rules {
        match build_rule(raw, level, source_name, sink) {
            Ok(rule) => {
                if !seen_names.insert(rule.name.as_str().to_string()) {
                    errors.push(SchemaError::DuplicateRuleName {
                        rule: rule.name.to_string(),
                    });
                    continue;
                }
                rules.push(rule);
            }
            Err(mut rule_errors) => errors.append(&mut rule_errors),
        }
    }

    if errors.is_empty() {
        Ok(ValidatedRuleSet { rules })
    } else {
        Err(errors)
    }
}

fn build_rule(
    raw: &RawRule,
    level: ValidationLevel,
    source_name: &str,
    sink: &mut DiagnosticSink,
) -> Result<Rule, Vec<SchemaError>> {
    let mut errors = Vec::new();

    let name = match RuleName::new(raw.name.clone()) {
        Ok(name) => Some(name),
        Err(_) => {
            errors.push(SchemaError::InvalidIdentifier {
                rule: raw.name.clone(),
                identifier: raw.name.clone(),
            });
            None
        }
    };

    if level == ValidationLevel::Strict && raw.description.is_none() {
        errors.push(SchemaError::MissingField {
            rule: raw.name.clone(),
            field: "description".to_string(),
        });
    } else if raw.description.is_none() {
        sink.push(
            Diagnostic::new(DiagnosticKind::SchemaError, "rule has no description")
                .with_rule(&raw.name)
                .with_source(source_name, raw.line),
        );
    }

    let mut inputs = Vec::with_capacity(raw.inputs.len());
    for raw_input in &raw.inputs {
        match build_input(raw_input, &raw.name) {
            Ok(input) => inputs.push(input),
            Err(mut e) => errors.append(&mut e),
        }
    }

    let condition = match build_condition(&raw.condition, &raw.name) {
        Ok(c) => Some(c),
        Err(mut e) => {
            errors.append(&mut e);
            None
        }
    };

    let mut actions = Vec::with_capacity(raw.actions.len());
    for raw_action in &raw.actions {
        match build_action(raw_action, &raw.name) {
            Ok(a) => actions.push(a),
            Err(mut e) => errors.append(&mut e),
        }
    }
    let mut else_actions = Vec::with_capacity(raw.else_actions.len());
    for raw_action in &raw.else_actions {
        match build_action(raw_action, &raw.name) {
            Ok(a) => else_actions.push(a),
            Err(mut e) => errors.append(&mut e),
        }
    }

    let total_actions = actions.len() + else_actions.len();
    check_action_count(&raw.name, raw.line, total_actions, level, source_name, &mut errors, sink);

    let (Some(name), Some(condition)) = (name, condition) else {
        return Err(errors);
    };
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut builder = RuleBuilder::new(name)
        .with_inputs(inputs)
        .condition(condition)
        .with_actions(actions)
        .with_else_actions(else_actions)
        .source(source_name, raw.line);
    if let Some(description) = raw.description.clone() {
        builder = builder.description(description);
    }
    builder.build().map_err(|e| {
        vec![SchemaError::Invariant {
            rule: raw.name.clone(),
            message: e.to_string(),
        }]
    })
}

fn check_action_count(
    rule: &str,
    line: u32,
    total_actions: usize,
    level: ValidationLevel,
    source_name: &str,
    errors: &mut Vec<SchemaError>,
    sink: &mut DiagnosticSink,
) {
    match level {
        ValidationLevel::Strict => {
            if total_actions > STRICT_MAX_ACTIONS {
                errors.push(SchemaError::Invariant {
                    rule: rule.to_string(),
                    message: format!(
                        "rule declares {total_actions} actions, strict mode allows at most {STRICT_MAX_ACTIONS}"
                    ),
                });
            }
        }
        ValidationLevel::Normal => {
            if total_actions > NORMAL_WARN_ACTIONS {
                sink.push(
                    Diagnostic::new(
                        DiagnosticKind::SchemaError,
                        format!("rule declares {total_actions} actions, consider splitting it"),
                    )
                    .with_rule(rule)
                    .with_source(source_name, line),
                );
            }
        }
        ValidationLevel::Relaxed => {
            if total_actions > RELAXED_WARN_ACTIONS {
                sink.push(
                    Diagnostic::new(
                        DiagnosticKind::SchemaError,
                        format!("rule declares {total_actions} actions"),
                    )
                    .with_rule(rule)
                    .with_source(source_name, line),
                );
            }
        }
    }
}

fn build_input(raw: &RawInputDescriptor, rule: &str) -> Result<InputDescriptor, Vec<SchemaError>> {
    let id = SensorId::new(raw.id.clone()).map_err(|_| {
        vec![SchemaError::InvalidIdentifier {
            rule: rule.to_string(),
            identifier: raw.id.clone(),
        }]
    })?;
    let fallback = match &raw.fallback {
        None => None,
        Some(f) => Some(build_fallback(f, rule)?),
    };
    Ok(InputDescriptor {
        id,
        required: raw.required,
        fallback,
    })
}

fn build_fallback(raw: &RawFallback, rule: &str) -> Result<FallbackStrategy, Vec<SchemaError>> {
    match raw.strategy.as_str() {
        "propagate_unavailable" => Ok(FallbackStrategy::PropagateUnavailable),
        "use_default" => {
            let default_value = raw.default_value.clone().unwrap_or(Value::Null);
            Ok(FallbackStrategy::UseDefault { default_value })
        }
        "use_last_known" => {
            let literal = raw.max_age.clone().unwrap_or_else(|| "0ms".to_string());
            let max_age = Duration::parse(&literal).map_err(|_| {
                vec![SchemaError::InvalidDuration {
                    rule: rule.to_string(),
                    literal: literal.clone(),
                }]
            })?;
            Ok(FallbackStrategy::UseLastKnown { max_age })
        }
        "skip_rule" => Ok(FallbackStrategy::SkipRule),
        other => Err(vec![SchemaError::InvalidValue {
            rule: rule.to_string(),
            field: "fallback.strategy".to_string(),
            value: other.to_string(),
        }]),
    }
}

fn build_condition(raw: &RawCondition, rule: &str) -> Result<Condition, Vec<SchemaError>> {
    match raw {
        RawCondition::Comparison { sensor, op, value } => {
            let sensor = SensorId::new(sensor.clone()).map_err(|_| {
                vec![SchemaError::InvalidIdentifier {
                    rule: rule.to_string(),
                    identifier: sensor.clone(),
                }]
            })?;
            let op = compare_op_from_str(op, rule)?;
            Ok(Condition::Comparison {
                sensor,
                op,
                value: value.clone(),
            })
        }
        RawCondition::Expression { text } => Ok(Condition::Expression { text: text.clone() }),
        RawCondition::ThresholdOverTime {
            sensor,
            op,
            threshold,
            duration,
        } => {
            let sensor = SensorId::new(sensor.clone()).map_err(|_| {
                vec![SchemaError::InvalidIdentifier {
                    rule: rule.to_string(),
                    identifier: sensor.clone(),
                }]
            })?;
            let op = ordered_op_from_str(op, rule)?;
            let duration = Duration::parse(duration).map_err(|_| {
                vec![SchemaError::InvalidDuration {
                    rule: rule.to_string(),
                    literal: duration.clone(),
                }]
            })?;
            Ok(Condition::ThresholdOverTime {
                sensor,
                op,
                threshold: *threshold,
                duration,
            })
        }
        RawCondition::All { children } => Ok(Condition::All {
            children: build_condition_list(children, rule)?,
        }),
        RawCondition::Any { children } => Ok(Condition::Any {
            children: build_condition_list(children, rule)?,
        }),
        RawCondition::Not { child } => Ok(Condition::Not {
            child: Box::new(build_condition(child, rule)?),
        }),
    }
}

fn build_condition_list(raw: &[RawCondition], rule: &str) -> Result<Vec<Condition>, Vec<SchemaError>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();
    for child in raw {
        match build_condition(child, rule) {
            Ok(c) => out.push(c),
            Err(mut e) => errors.append(&mut e),
        }
    }
    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

fn compare_op_from_str(op: &str, rule: &str) -> Result<CompareOp, Vec<SchemaError>> {
    match op {
        "gt" => Ok(CompareOp::Gt),
        "ge" => Ok(CompareOp::Ge),
        "lt" => Ok(CompareOp::Lt),
        "le" => Ok(CompareOp::Le),
        "eq" => Ok(CompareOp::Eq),
        "ne" => Ok(CompareOp::Ne),
        other => Err(vec![SchemaError::InvalidValue {
            rule: rule.to_string(),
            field: "op".to_string(),
            value: other.to_string(),
        }]),
    }
}

fn ordered_op_from_str(op: &str, rule: &str) -> Result<OrderedOp, Vec<SchemaError>> {
    match op {
        "gt" => Ok(OrderedOp::Gt),
        "ge" => Ok(OrderedOp::Ge),
        "lt" => Ok(OrderedOp::Lt),
        "le" => Ok(OrderedOp::Le),
        other => Err(vec![SchemaError::InvalidValue {
            rule: rule.to_string(),
            field: "op".to_string(),
            value: other.to_string(),
        }]),
    }
}

fn build_action(raw: &RawAction, rule: &str) -> Result<Action, Vec<SchemaError>> {
    match raw {
        RawAction::Set { key, value_expression, emit } => {
            let key = SensorId::new(key.clone()).map_err(|_| {
                vec![SchemaError::InvalidIdentifier {
                    rule: rule.to_string(),
                    identifier: key.clone(),
                }]
            })?;
            Ok(Action::Set {
                key,
                value_expression: value_expression.clone(),
                emit: emit_mode_from_str(emit, rule)?,
            })
        }
        RawAction::Log { message, emit } => Ok(Action::Log {
            message: message.clone(),
            emit: emit_mode_from_str(emit, rule)?,
        }),
        RawAction::Buffer {
            key,
            value_expression,
            max_items,
            emit,
        } => {
            let key = SensorId::new(key.clone()).map_err(|_| {
                vec![SchemaError::InvalidIdentifier {
                    rule: rule.to_string(),
                    identifier: key.clone(),
                }]
            })?;
            Ok(Action::Buffer {
                key,
                value_expression: value_expression.clone(),
                max_items: *max_items,
                emit: emit_mode_from_str(emit, rule)?,
            })
        }
    }
}

fn emit_mode_from_str(emit: &str, rule: &str) -> Result<EmitMode, Vec<SchemaError>> {
    match emit {
        "always" => Ok(EmitMode::Always),
        "on_change" => Ok(EmitMode::OnChange),
        "on_enter" => Ok(EmitMode::OnEnter),
        other => Err(vec![SchemaError::InvalidValue {
            rule: rule.to_string(),
            field: "emit".to_string(),
            value: other.to_string(),
        }]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load;

    fn doc(yaml: &str) -> RawDocument {
        load(yaml, "rules.yaml").unwrap()
    }

    const MINIMAL: &str = r#"
version: 3
rules:
  - name: HighTemperatureRule
    description: Flags when the sensor reads hot.
    condition:
      type: comparison
      sensor: temperature
      op: gt
      value: 30
    actions:
      - type: set
        key: high_temperature_alert
        value_expression: "true"
        emit: always
"#;

    #[test]
    fn validates_a_well_formed_rule_under_strict() {
        let mut sink = DiagnosticSink::new();
        let result = validate(&doc(MINIMAL), ValidationLevel::Strict, "rules.yaml", &mut sink);
        let set = result.unwrap();
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rules[0].name.as_str(), "HighTemperatureRule");
    }

    #[test]
    fn strict_mode_requires_description() {
        let yaml = r#"
version: 3
rules:
  - name: R
    condition:
      type: all
      children: []
"#;
        let mut sink = DiagnosticSink::new();
        let result = validate(&doc(yaml), ValidationLevel::Strict, "rules.yaml", &mut sink);
        assert!(result.is_err());
    }

    #[test]
    fn normal_mode_warns_instead_of_failing_on_missing_description() {
        let yaml = r#"
version: 3
rules:
  - name: R
    condition:
      type: all
      children: []
"#;
        let mut sink = DiagnosticSink::new();
        let result = validate(&doc(yaml), ValidationLevel::Normal, "rules.yaml", &mut sink);
        assert!(result.is_ok());
        assert!(sink.warnings().count() >= 1);
    }

    #[test]
    fn rejects_invalid_comparison_operator() {
        let yaml = r#"
version: 3
rules:
  - name: R
    condition:
      type: comparison
      sensor: temperature
      op: nonsense
      value: 1
"#;
        let mut sink = DiagnosticSink::new();
        let result = validate(&doc(yaml), ValidationLevel::Normal, "rules.yaml", &mut sink);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_duplicate_rule_names() {
        let yaml = r#"
version: 3
rules:
  - name: R
    condition:
      type: all
      children: []
  - name: R
    condition:
      type: all
      children: []
"#;
        let mut sink = DiagnosticSink::new();
        let result = validate(&doc(yaml), ValidationLevel::Normal, "rules.yaml", &mut sink);
        match result {
            Err(errors) => assert!(errors.iter().any(|e| matches!(e, SchemaError::DuplicateRuleName { .. }))),
            Ok(_) => panic!("expected duplicate rule name error"),
        }
    }

    #[test]
    fn strict_mode_rejects_too_many_actions() {
        let mut yaml = String::from(
            r#"
version: 3
rules:
  - name: R
    description: many actions
    condition:
      type: all
      children: []
    actions:
"#,
        );
        for i in 0..6 {
            yaml.push_str(&format!(
                "      - type: set\n        key: out_{i}\n        value_expression: \"1\"\n        emit: always\n"
            ));
        }
        let mut sink = DiagnosticSink::new();
        let result = validate(&doc(&yaml), ValidationLevel::Strict, "rules.yaml", &mut sink);
        assert!(result.is_err());
    }
}
