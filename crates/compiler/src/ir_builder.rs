//! IR Builder: lowers a resolved, layered rule set into the immutable
//! `Program` the runtime evaluator executes, validating that every
//! expression text actually compiles and assigning each referenced sensor
//! a stable numeric handle.

use std::collections::BTreeMap;

use hashbrown::HashSet;

use beacon_core::ids::SensorId;
use beacon_core::ir::{Action, Condition, Program};

use crate::catalog::ResolvedRuleSet;
use crate::dag::AnalysisResult;
use crate::error::IrError;

/// Lower `resolved` (sensor-checked rules) plus `analysis` (layering and
/// temporal dependencies) into a `Program`. Fails fast on the first
/// expression that does not compile, or that references a sensor absent
/// from the catalog, since either means the IR itself cannot be built.
pub fn lower(resolved: &ResolvedRuleSet, analysis: AnalysisResult) -> Result<Program, IrError> {
    let known_sensors: HashSet<String> = resolved.catalog.iter().map(|e| e.id.to_string()).collect();
    for layered in &analysis.layered_rules {
        validate_rule_expressions(&layered.rule, &known_sensors)?;
    }

    let mut symbol_table: BTreeMap<SensorId, u32> = BTreeMap::new();
    let mut all_sensors: Vec<SensorId> = resolved.catalog.iter().map(|e| e.id.clone()).collect();
    for layered in &analysis.layered_rules {
        all_sensors.extend(layered.rule.input_sensors());
        all_sensors.extend(layered.rule.output_sensors());
    }
    all_sensors.sort();
    all_sensors.dedup();
    for (handle, sensor) in all_sensors.into_iter().enumerate() {
        symbol_table.insert(sensor, handle as u32);
    }

    Ok(Program {
        rules: analysis.layered_rules,
        catalog: resolved.catalog.clone(),
        temporal_dependencies: analysis.temporal_dependencies,
        symbol_table,
    })
}

fn validate_rule_expressions(rule: &beacon_core::ir::Rule, known_sensors: &HashSet<String>) -> Result<(), IrError> {
    validate_condition_expressions(rule, &rule.condition, known_sensors)?;
    for action in rule.actions.iter().chain(rule.else_actions.iter()) {
        validate_action_expression(rule, action, known_sensors)?;
    }
    Ok(())
}

fn validate_condition_expressions(
    rule: &beacon_core::ir::Rule,
    condition: &Condition,
    known_sensors: &HashSet<String>,
) -> Result<(), IrError> {
    match condition {
        Condition::Expression { text } => validate_expression_text(rule, text, known_sensors),
        Condition::All { children } | Condition::Any { children } => {
            for child in children {
                validate_condition_expressions(rule, child, known_sensors)?;
            }
            Ok(())
        }
        Condition::Not { child } => validate_condition_expressions(rule, child, known_sensors),
        Condition::Comparison { .. } | Condition::ThresholdOverTime { .. } => Ok(()),
    }
}

fn validate_action_expression(
    rule: &beacon_core::ir::Rule,
    action: &Action,
    known_sensors: &HashSet<String>,
) -> Result<(), IrError> {
    let expression = match action {
        Action::Set { value_expression, .. } => Some(value_expression),
        Action::Buffer { value_expression, .. } => Some(value_expression),
        Action::Log { .. } => None,
    };
    if let Some(text) = expression {
        validate_expression_text(rule, text, known_sensors)?;
    }
    Ok(())
}

/// Parse `text`, reject any free identifier not present in the sensor
/// catalog, then compile it. Parsing is done directly (rather than through
/// `compile_source`) so the identifiers the parser already extracted for
/// dependency analysis can be cross-checked before the expression is thrown
/// away in favor of its compiled bytecode.
fn validate_expression_text(
    rule: &beacon_core::ir::Rule,
    text: &str,
    known_sensors: &HashSet<String>,
) -> Result<(), IrError> {
    let expr = beacon_expr::Parser::parse(text).map_err(|source| IrError::Expression {
        rule: rule.name.to_string(),
        source,
    })?;
    for identifier in expr.identifiers() {
        if !known_sensors.contains(&identifier) {
            return Err(IrError::Expression {
                rule: rule.name.to_string(),
                source: beacon_expr::ExprError::UnknownIdentifier(identifier),
            });
        }
    }
    beacon_expr::compile(&expr).map_err(|source| IrError::Expression {
        rule: rule.name.to_string(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::builders::RuleBuilder;
    use beacon_core::ids::RuleName;
    use beacon_core::ir::{CompareOp, EmitMode, LayeredRule, SensorCatalogEntry, SensorKind};
    use beacon_core::value::Value;

    fn sensor(s: &str) -> SensorId {
        SensorId::new(s).unwrap()
    }

    fn entry(id: &str, kind: SensorKind) -> SensorCatalogEntry {
        SensorCatalogEntry {
            id: sensor(id),
            kind,
            value_type: "number".to_string(),
            min: None,
            max: None,
            units: None,
            retain_last: None,
            export: None,
            widget: None,
            produced_by: None,
        }
    }

    #[test]
    fn lowers_a_single_rule_and_assigns_handles() {
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
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
            .build()
            .unwrap();
        let resolved = ResolvedRuleSet {
            rules: vec![rule.clone()],
            catalog: vec![],
        };
        let analysis = AnalysisResult {
            layered_rules: vec![LayeredRule { rule, layer: 0 }],
            temporal_dependencies: vec![],
        };
        let program = lower(&resolved, analysis).unwrap();
        assert_eq!(program.total_rules(), 1);
        assert!(program.symbol_table.contains_key(&sensor("temperature")));
        assert!(program.symbol_table.contains_key(&sensor("alert")));
    }

    #[test]
    fn rejects_a_rule_whose_expression_does_not_compile() {
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::Expression {
                text: "temperature >".into(),
            })
            .build()
            .unwrap();
        let resolved = ResolvedRuleSet {
            rules: vec![rule.clone()],
            catalog: vec![],
        };
        let analysis = AnalysisResult {
            layered_rules: vec![LayeredRule { rule, layer: 0 }],
            temporal_dependencies: vec![],
        };
        assert!(lower(&resolved, analysis).is_err());
    }

    #[test]
    fn rejects_a_condition_expression_referencing_an_unknown_sensor() {
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::Expression {
                text: "temperature > humidity".into(),
            })
            .build()
            .unwrap();
        let resolved = ResolvedRuleSet {
            rules: vec![rule.clone()],
            catalog: vec![entry("temperature", SensorKind::Physical)],
        };
        let analysis = AnalysisResult {
            layered_rules: vec![LayeredRule { rule, layer: 0 }],
            temporal_dependencies: vec![],
        };
        let err = lower(&resolved, analysis).unwrap_err();
        let IrError::Expression { source, .. } = err;
        assert!(matches!(source, beacon_expr::ExprError::UnknownIdentifier(name) if name == "humidity"));
    }

    #[test]
    fn rejects_an_action_value_expression_referencing_an_unknown_sensor() {
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::Comparison {
                sensor: sensor("temperature"),
                op: CompareOp::Gt,
                value: Value::Number(30.0),
            })
            .with_action(Action::Set {
                key: sensor("alert"),
                value_expression: "humidity".into(),
                emit: EmitMode::Always,
            })
            .build()
            .unwrap();
        let resolved = ResolvedRuleSet {
            rules: vec![rule.clone()],
            catalog: vec![entry("temperature", SensorKind::Physical), entry("alert", SensorKind::Virtual)],
        };
        let analysis = AnalysisResult {
            layered_rules: vec![LayeredRule { rule, layer: 0 }],
            temporal_dependencies: vec![],
        };
        assert!(lower(&resolved, analysis).is_err());
    }

    #[test]
    fn accepts_an_expression_whose_identifiers_are_all_in_the_catalog() {
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::Expression {
                text: "temperature > humidity".into(),
            })
            .build()
            .unwrap();
        let resolved = ResolvedRuleSet {
            rules: vec![rule.clone()],
            catalog: vec![entry("temperature", SensorKind::Physical), entry("humidity", SensorKind::Physical)],
        };
        let analysis = AnalysisResult {
            layered_rules: vec![LayeredRule { rule, layer: 0 }],
            temporal_dependencies: vec![],
        };
        assert!(lower(&resolved, analysis).is_ok());
    }
}
