//! Sensor Catalog: resolves the sensor identifiers a validated rule set
//! references against a declared catalog, attaching type/retention metadata
//! and enforcing single-producer ownership of virtual sensors.

use beacon_core::ids::SensorId;
use beacon_core::ir::{Action, Rule, SensorCatalogEntry, SensorKind};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::schema::ValidatedRuleSet;

/// The raw catalog document, as loaded from the catalog JSON file described
/// in the sensor catalog schema.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Catalog {
    pub entries: Vec<SensorCatalogEntry>,
}

impl Catalog {
    fn by_id(&self) -> HashMap<&SensorId, &SensorCatalogEntry> {
        self.entries.iter().map(|e| (&e.id, e)).collect()
    }
}

/// A rule set whose sensor references have all been checked against the
/// catalog, with each virtual sensor's sole producer recorded.
#[derive(Debug, Clone)]
pub struct ResolvedRuleSet {
    pub rules: Vec<Rule>,
    pub catalog: Vec<SensorCatalogEntry>,
}

/// Resolve `rules` against `catalog`. Unless `allow_invalid_sensors` is set,
/// any sensor referenced by a rule but absent from the catalog is rejected.
/// Every action writing to a virtual sensor must target a sensor declared
/// `virtual` in the catalog, and at most one rule may write to it.
pub fn resolve(
    rule_set: &ValidatedRuleSet,
    catalog: &Catalog,
    allow_invalid_sensors: bool,
) -> Result<ResolvedRuleSet, Vec<CatalogError>> {
    let mut errors = Vec::new();
    let entries_by_id = catalog.by_id();

    if !allow_invalid_sensors {
        for rule in &rule_set.rules {
            for sensor in rule.input_sensors() {
                if !entries_by_id.contains_key(&sensor) {
                    errors.push(CatalogError::UnknownSensor {
                        rule: rule.name.to_string(),
                        sensor: sensor.to_string(),
                    });
                }
            }
        }
    }

    let mut producers: HashMap<SensorId, Vec<String>> = HashMap::new();
    for rule in &rule_set.rules {
        for action in rule.actions.iter().chain(rule.else_actions.iter()) {
            if let Action::Set { key, .. } | Action::Buffer { key, .. } = action {
                producers.entry(key.clone()).or_default().push(rule.name.to_string());
            }
        }
    }

    for (sensor, producing_rules) in &producers {
        match entries_by_id.get(sensor) {
            Some(entry) if entry.kind != SensorKind::Virtual => {
                for rule in producing_rules {
                    errors.push(CatalogError::NotVirtual {
                        sensor: sensor.to_string(),
                        rule: rule.clone(),
                    });
                }
            }
            None if !allow_invalid_sensors => {
                for rule in producing_rules {
                    errors.push(CatalogError::UnknownSensor {
                        rule: rule.clone(),
                        sensor: sensor.to_string(),
                    });
                }
            }
            _ => {}
        }
        if producing_rules.len() > 1 {
            let mut producers = producing_rules.clone();
            producers.sort();
            producers.dedup();
            errors.push(CatalogError::MultipleProducers {
                sensor: sensor.to_string(),
                producers,
            });
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let mut catalog_with_producers: Vec<SensorCatalogEntry> = catalog.entries.clone();
    for entry in &mut catalog_with_producers {
        if let Some(rule_names) = producers.get(&entry.id) {
            if let Some(name) = rule_names.first() {
                entry.produced_by = beacon_core::ids::RuleName::new(name.clone()).ok();
            }
        }
    }

    Ok(ResolvedRuleSet {
        rules: rule_set.rules.clone(),
        catalog: catalog_with_producers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_core::builders::RuleBuilder;
    use beacon_core::ids::RuleName;
    use beacon_core::ir::{CompareOp, Condition, EmitMode};
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

    fn rule_set(rules: Vec<Rule>) -> ValidatedRuleSet {
        ValidatedRuleSet { rules }
    }

    #[test]
    fn rejects_rule_referencing_unknown_sensor() {
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::Comparison {
                sensor: sensor("temperature"),
                op: CompareOp::Gt,
                value: Value::Number(1.0),
            })
            .build()
            .unwrap();
        let catalog = Catalog { entries: vec![] };
        let result = resolve(&rule_set(vec![rule]), &catalog, false);
        assert!(matches!(
            result,
            Err(errors) if errors.iter().any(|e| matches!(e, CatalogError::UnknownSensor { .. }))
        ));
    }

    #[test]
    fn allows_unknown_sensor_when_flag_set() {
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::Comparison {
                sensor: sensor("temperature"),
                op: CompareOp::Gt,
                value: Value::Number(1.0),
            })
            .build()
            .unwrap();
        let catalog = Catalog { entries: vec![] };
        assert!(resolve(&rule_set(vec![rule]), &catalog, true).is_ok());
    }

    #[test]
    fn rejects_virtual_sensor_produced_by_two_rules() {
        let make = |name: &str| {
            RuleBuilder::new(RuleName::new(name).unwrap())
                .condition(Condition::Comparison {
                    sensor: sensor("temperature"),
                    op: CompareOp::Gt,
                    value: Value::Number(1.0),
                })
                .with_action(Action::Set {
                    key: sensor("alert"),
                    value_expression: "1".into(),
                    emit: EmitMode::Always,
                })
                .build()
                .unwrap()
        };
        let catalog = Catalog {
            entries: vec![entry("temperature", SensorKind::Physical), entry("alert", SensorKind::Virtual)],
        };
        let result = resolve(&rule_set(vec![make("A"), make("B")]), &catalog, false);
        assert!(matches!(
            result,
            Err(errors) if errors.iter().any(|e| matches!(e, CatalogError::MultipleProducers { .. }))
        ));
    }

    #[test]
    fn rejects_write_to_non_virtual_sensor() {
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::Comparison {
                sensor: sensor("temperature"),
                op: CompareOp::Gt,
                value: Value::Number(1.0),
            })
            .with_action(Action::Set {
                key: sensor("temperature"),
                value_expression: "1".into(),
                emit: EmitMode::Always,
            })
            .build()
            .unwrap();
        let catalog = Catalog {
            entries: vec![entry("temperature", SensorKind::Physical)],
        };
        let result = resolve(&rule_set(vec![rule]), &catalog, false);
        assert!(matches!(
            result,
            Err(errors) if errors.iter().any(|e| matches!(e, CatalogError::NotVirtual { .. }))
        ));
    }

    #[test]
    fn resolves_valid_rule_set_and_records_producer() {
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::Comparison {
                sensor: sensor("temperature"),
                op: CompareOp::Gt,
                value: Value::Number(1.0),
            })
            .with_action(Action::Set {
                key: sensor("alert"),
                value_expression: "1".into(),
                emit: EmitMode::Always,
            })
            .build()
            .unwrap();
        let catalog = Catalog {
            entries: vec![entry("temperature", SensorKind::Physical), entry("alert", SensorKind::Virtual)],
        };
        let resolved = resolve(&rule_set(vec![rule]), &catalog, false).unwrap();
        let alert = resolved.catalog.iter().find(|e| e.id == sensor("alert")).unwrap();
        assert_eq!(alert.produced_by.as_ref().unwrap().as_str(), "R");
    }
}
