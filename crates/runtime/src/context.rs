//! Per-cycle evaluation context: a handle-indexed sensor value array behind
//! [`beacon_expr::VarContext`], so expression evaluation is array indexing
//! rather than name hashing, per `Program::symbol_table`'s stated purpose.

use std::collections::BTreeMap;

use beacon_core::ids::SensorId;
use beacon_core::value::Value;
use beacon_expr::VarContext;

/// The live, shared sensor values for the cycle in progress. Updated in
/// place as each rule's actions execute, so later layers observe earlier
/// layers' outputs within the same cycle.
#[derive(Debug, Clone)]
pub struct CycleValues {
    index: BTreeMap<SensorId, u32>,
    values: Vec<Value>,
}

impl CycleValues {
    /// One slot per handle in `index`, all starting `Value::Null`.
    pub fn new(index: BTreeMap<SensorId, u32>) -> Self {
        let len = index.len();
        Self {
            index,
            values: vec![Value::Null; len],
        }
    }

    pub fn set(&mut self, sensor: &SensorId, value: Value) {
        if let Some(&handle) = self.index.get(sensor) {
            self.values[handle as usize] = value;
        }
    }

    pub fn get(&self, sensor: &SensorId) -> Value {
        match self.index.get(sensor) {
            Some(&handle) => self.values[handle as usize].clone(),
            None => Value::Null,
        }
    }

    /// A read-only view usable as a [`VarContext`], optionally layering a
    /// per-rule fallback overlay on top (declared inputs whose fresh value
    /// was replaced by a resolved fallback for this rule's evaluation only).
    pub fn view<'a>(&'a self, overrides: &'a BTreeMap<SensorId, Value>) -> CycleView<'a> {
        CycleView { base: self, overrides }
    }
}

/// A read view of [`CycleValues`] with a small per-rule override layer.
/// Overrides exist only for the declared inputs of the rule currently being
/// evaluated; they never leak into other rules' evaluation.
pub struct CycleView<'a> {
    base: &'a CycleValues,
    overrides: &'a BTreeMap<SensorId, Value>,
}

impl<'a> VarContext for CycleView<'a> {
    fn get(&self, name: &str) -> Value {
        if let Some(value) = self.overrides.get(name) {
            return value.clone();
        }
        match self.base.index.get(name) {
            Some(&handle) => self.base.values[handle as usize].clone(),
            None => Value::Null,
        }
    }
}
