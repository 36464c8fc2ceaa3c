//! Fluent builders for the data model, mirroring the product catalog
//! builder idiom: construct step by step, validate once on `build()`.

use crate::error::{CoreError, CoreResult};
use crate::ids::{RuleName, SensorId};
use crate::ir::{Action, Condition, InputDescriptor, Rule};

/// Builds a [`Rule`], validating the `required`/`fallback` invariant on
/// each input and rejecting a rule with no condition.
#[derive(Debug, Default)]
pub struct RuleBuilder {
    name: Option<RuleName>,
    description: Option<String>,
    inputs: Vec<InputDescriptor>,
    condition: Option<Condition>,
    actions: Vec<Action>,
    else_actions: Vec<Action>,
    source_file: Option<String>,
    line: Option<u32>,
}

impl RuleBuilder {
    pub fn new(name: RuleName) -> Self {
        Self {
            name: Some(name),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_input(mut self, input: InputDescriptor) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = InputDescriptor>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn with_else_action(mut self, action: Action) -> Self {
        self.else_actions.push(action);
        self
    }

    pub fn with_else_actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.else_actions.extend(actions);
        self
    }

    pub fn source(mut self, source_file: impl Into<String>, line: u32) -> Self {
        self.source_file = Some(source_file.into());
        self.line = Some(line);
        self
    }

    pub fn build(self) -> CoreResult<Rule> {
        let name = self.name.ok_or_else(|| CoreError::ValidationFailed {
            field: "name".into(),
            message: "rule name is required".into(),
        })?;
        let condition = self.condition.ok_or_else(|| CoreError::ValidationFailed {
            field: "condition".into(),
            message: "rule must declare at least one condition".into(),
        })?;
        for input in &self.inputs {
            input.validate().map_err(|message| CoreError::ValidationFailed {
                field: format!("inputs.{}", input.id),
                message,
            })?;
        }
        for (branch, actions) in [("actions", &self.actions), ("else", &self.else_actions)] {
            let mut keys: Vec<&SensorId> = actions.iter().filter_map(Action::output_key).collect();
            keys.sort();
            for pair in keys.windows(2) {
                if pair[0] == pair[1] {
                    return Err(CoreError::ValidationFailed {
                        field: branch.into(),
                        message: format!(
                            "output key '{}' is targeted more than once within the same branch of rule '{name}'",
                            pair[0]
                        ),
                    });
                }
            }
        }
        Ok(Rule {
            name,
            description: self.description,
            inputs: self.inputs,
            condition,
            actions: self.actions,
            else_actions: self.else_actions,
            source_file: self.source_file,
            line: self.line,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CompareOp, EmitMode};
    use crate::value::Value;

    fn sensor(s: &str) -> SensorId {
        SensorId::new(s).unwrap()
    }

    #[test]
    fn builds_a_minimal_valid_rule() {
        let rule = RuleBuilder::new(RuleName::new("HighTemperatureRule").unwrap())
            .condition(Condition::Comparison {
                sensor: sensor("temperature"),
                op: CompareOp::Gt,
                value: Value::Number(30.0),
            })
            .with_action(Action::Set {
                key: sensor("high_temperature_alert"),
                value_expression: "true".into(),
                emit: EmitMode::Always,
            })
            .build()
            .unwrap();
        assert_eq!(rule.name.as_str(), "HighTemperatureRule");
        assert_eq!(rule.output_sensors(), vec![sensor("high_temperature_alert")]);
    }

    #[test]
    fn rejects_rule_with_no_condition() {
        let err = RuleBuilder::new(RuleName::new("R").unwrap()).build();
        assert!(err.is_err());
    }

    #[test]
    fn allows_then_and_else_to_target_the_same_key() {
        // Toggling one sensor true/false across branches is the common case
        // and must not be rejected.
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::All { children: vec![] })
            .with_action(Action::Set {
                key: sensor("y"),
                value_expression: "1".into(),
                emit: EmitMode::Always,
            })
            .with_else_action(Action::Set {
                key: sensor("y"),
                value_expression: "0".into(),
                emit: EmitMode::Always,
            })
            .build()
            .unwrap();
        assert_eq!(rule.output_sensors(), vec![sensor("y")]);
    }

    #[test]
    fn rejects_duplicate_output_key_within_the_same_branch() {
        let err = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::All { children: vec![] })
            .with_action(Action::Set {
                key: sensor("y"),
                value_expression: "1".into(),
                emit: EmitMode::Always,
            })
            .with_action(Action::Set {
                key: sensor("y"),
                value_expression: "2".into(),
                emit: EmitMode::Always,
            })
            .build();
        assert!(err.is_err());
    }
}
