//! Runtime Evaluator (§4.7): executes a compiled `Program` cycle-by-cycle —
//! batched store read, ring buffer push, layer-by-layer rule evaluation
//! under Kleene three-valued logic, emit-mode-gated action commits, and a
//! batched store write.

use std::collections::BTreeMap;
use std::sync::Arc;

use hashbrown::HashMap;
use rayon::prelude::*;
use tracing::{info, instrument, warn};

use beacon_compiler::SystemConfig;
use beacon_core::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSink};
use beacon_core::ids::{RuleName, SensorId};
use beacon_core::ir::{Action, Condition, FallbackStrategy, LayeredRule, Program, Rule};
use beacon_core::value::{EvalResult, Value};
use beacon_expr::{compile_source, CompiledExpr, ExprOutcome, VarContext, VmValue};
use beacon_store::Store;

use crate::context::CycleValues;
use crate::error::{RuntimeError, RuntimeResult};
use crate::ring_buffer::RingBufferManager;

/// Which side of a rule's condition an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Then,
    Else,
}

/// Key used to track the last value an action emitted, for `on_change`
/// gating. `Set`/`Buffer` actions key on their output sensor directly —
/// the catalog enforces single-producer ownership of every sensor, so the
/// key is stable across whichever branch (then/else) currently produces it,
/// which matters because the same sensor is commonly written by both
/// branches of a rule. `Log` actions have no output sensor, so they key on
/// rule name and action index instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ActionKey {
    Sensor(SensorId),
    Log { rule: RuleName, idx: usize },
}

/// Outcome of one action this cycle: the value it would write, and whether
/// the emit-mode gate let that value through to the store.
#[derive(Debug, Clone)]
pub struct ActionEmit {
    pub output: Option<SensorId>,
    pub value: Value,
    pub written: bool,
}

/// Outcome of one rule this cycle.
#[derive(Debug, Clone)]
pub struct RuleResult {
    pub rule: RuleName,
    pub eval_result: Option<EvalResult>,
    pub branch: Option<Branch>,
    pub skipped: bool,
    pub emits: Vec<ActionEmit>,
}

/// Full report for one `run_cycle` invocation (§4.7 step 6). `Indeterminate`
/// outcomes are non-fatal: they are surfaced here as `RuntimeIndeterminate`
/// diagnostics rather than failing the cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub now: u64,
    pub rule_results: Vec<RuleResult>,
    pub diagnostics: DiagnosticSink,
}

impl CycleReport {
    pub fn writes(&self) -> usize {
        self.rule_results
            .iter()
            .flat_map(|r| &r.emits)
            .filter(|e| e.written && e.output.is_some())
            .count()
    }
}

/// Per-rule effects computed against a read-only snapshot of the cycle's
/// values and ring buffers. Kept separate from the state mutation so a
/// layer whose rules write disjoint sensor sets can compute effects in
/// parallel (`group_parallel_rules`) and merge them sequentially afterward —
/// the barrier semantics required by §5.
struct RuleEffects {
    result: RuleResult,
    value_updates: Vec<(SensorId, Value)>,
    store_writes: Vec<(SensorId, Value)>,
    buffer_pushes: Vec<(SensorId, Value, usize)>,
    new_active: Option<bool>,
    emit_state_updates: Vec<(ActionKey, Value)>,
    log_messages: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

/// Single-threaded cooperative evaluator (§5): one `run_cycle` runs to
/// completion before the next begins; the only suspension points are the
/// batched store read/write.
pub struct RuntimeEvaluator {
    program: Program,
    ring_buffers: RingBufferManager,
    expr_cache: HashMap<String, Arc<CompiledExpr>>,
    emit_state: HashMap<ActionKey, Value>,
    rule_active: HashMap<RuleName, bool>,
    extended_last_known: bool,
    group_parallel_rules: bool,
}

impl RuntimeEvaluator {
    /// Build an evaluator for `program`, sizing ring buffers from `config`
    /// and pre-compiling every expression the program references.
    pub fn new(program: Program, config: &SystemConfig, group_parallel_rules: bool) -> RuntimeResult<Self> {
        let mut ring_buffers = RingBufferManager::for_program(&program, config.buffer_capacity, config.cycle_time);
        for layered in &program.rules {
            for action in layered.rule.actions.iter().chain(layered.rule.else_actions.iter()) {
                if let Action::Buffer { key, max_items, .. } = action {
                    ring_buffers.track_with_capacity(key.clone(), *max_items);
                }
            }
        }

        let mut expr_cache = HashMap::new();
        for layered in &program.rules {
            collect_condition_expressions(&layered.rule.condition, &mut expr_cache)?;
            for action in layered.rule.actions.iter().chain(layered.rule.else_actions.iter()) {
                if let Action::Set { value_expression, .. } | Action::Buffer { value_expression, .. } = action {
                    insert_compiled(value_expression, &mut expr_cache)?;
                }
            }
        }

        Ok(Self {
            program,
            ring_buffers,
            expr_cache,
            emit_state: HashMap::new(),
            rule_active: HashMap::new(),
            extended_last_known: config.temporal_mode.extended_last_known,
            group_parallel_rules,
        })
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    /// Run one evaluation cycle against `store` (§4.7).
    #[instrument(skip(self, store))]
    pub fn run_cycle(&mut self, now: u64, store: &dyn Store) -> RuntimeResult<CycleReport> {
        let keys: Vec<SensorId> = self.program.symbol_table.keys().cloned().collect();
        let fresh = store.read_all(Some(&keys))?;

        let mut cycle_values = CycleValues::new(self.program.symbol_table.clone());
        for (sensor, value) in &fresh {
            cycle_values.set(sensor, value.clone());
            self.ring_buffers.push(sensor, value.clone(), now);
        }

        let mut rule_results = Vec::with_capacity(self.program.total_rules());
        let mut to_write: HashMap<SensorId, Value> = HashMap::new();
        let mut diagnostics = DiagnosticSink::new();

        for layer in self.program.layers() {
            let effects = self.compute_layer_effects(&layer, &cycle_values, now);
            for mut effect in effects {
                diagnostics.extend(std::mem::take(&mut effect.diagnostics));
                rule_results.push(self.apply_effects(effect, &mut cycle_values, &mut to_write, now));
            }
        }

        store.write_batch(&to_write)?;

        Ok(CycleReport { now, rule_results, diagnostics })
    }

    fn compute_layer_effects(&self, layer: &[&LayeredRule], cycle_values: &CycleValues, now: u64) -> Vec<RuleEffects> {
        if self.group_parallel_rules && layer_writes_are_disjoint(layer) {
            layer
                .par_iter()
                .map(|lr| self.compute_rule_effects(&lr.rule, cycle_values, now))
                .collect()
        } else {
            layer
                .iter()
                .map(|lr| self.compute_rule_effects(&lr.rule, cycle_values, now))
                .collect()
        }
    }

    fn compute_rule_effects(&self, rule: &Rule, cycle_values: &CycleValues, now: u64) -> RuleEffects {
        let overrides = match self.resolve_inputs(rule, cycle_values, now) {
            InputResolution::Skip => {
                return RuleEffects {
                    result: RuleResult {
                        rule: rule.name.clone(),
                        eval_result: None,
                        branch: None,
                        skipped: true,
                        emits: vec![],
                    },
                    value_updates: vec![],
                    store_writes: vec![],
                    buffer_pushes: vec![],
                    new_active: None,
                    emit_state_updates: vec![],
                    log_messages: vec![],
                    diagnostics: vec![],
                };
            }
            InputResolution::Resolved(overrides) => overrides,
        };

        let view = cycle_values.view(&overrides);
        let eval_result = self.evaluate_condition(&rule.condition, &view, now);

        let mut diagnostics = Vec::new();
        if eval_result == EvalResult::Indeterminate {
            diagnostics.push(
                Diagnostic::new(DiagnosticKind::RuntimeIndeterminate, "rule condition evaluated indeterminate")
                    .with_rule(rule.name.as_str()),
            );
        }

        let new_active = match eval_result {
            EvalResult::True => Some(true),
            EvalResult::False => Some(false),
            EvalResult::Indeterminate => None,
        };
        let was_active = self.rule_active.get(&rule.name).copied().unwrap_or(false);
        let rising_edge = eval_result == EvalResult::True && !was_active;

        let (branch, actions): (Option<Branch>, &[Action]) = match eval_result {
            EvalResult::True => (Some(Branch::Then), &rule.actions),
            EvalResult::False if !rule.else_actions.is_empty() => (Some(Branch::Else), &rule.else_actions),
            _ => (None, &[]),
        };

        let mut value_updates = Vec::new();
        let mut store_writes = Vec::new();
        let mut buffer_pushes = Vec::new();
        let mut emit_state_updates = Vec::new();
        let mut log_messages = Vec::new();
        let mut emits = Vec::new();

        if branch.is_some() {
            for (idx, action) in actions.iter().enumerate() {
                match action {
                    Action::Log { message, emit } => {
                        let action_id = ActionKey::Log { rule: rule.name.clone(), idx };
                        let would_write = Value::String(message.clone());
                        let last = self.emit_state.get(&action_id);
                        let should_fire = should_emit(*emit, last, &would_write, rising_edge);
                        if should_fire {
                            log_messages.push(message.clone());
                        }
                        emit_state_updates.push((action_id, would_write.clone()));
                        emits.push(ActionEmit { output: None, value: would_write, written: should_fire });
                    }
                    Action::Set { key, value_expression, emit } => {
                        match self.eval_value_expression(value_expression, &view) {
                            Some(value) => {
                                let action_id = ActionKey::Sensor(key.clone());
                                value_updates.push((key.clone(), value.clone()));
                                let last = self.emit_state.get(&action_id);
                                let should_write = should_emit(*emit, last, &value, rising_edge);
                                if should_write {
                                    store_writes.push((key.clone(), value.clone()));
                                }
                                emit_state_updates.push((action_id, value.clone()));
                                emits.push(ActionEmit { output: Some(key.clone()), value, written: should_write });
                            }
                            None => {
                                warn!(rule = %rule.name, action = idx, "action value expression was indeterminate; skipped");
                                diagnostics.push(
                                    Diagnostic::new(DiagnosticKind::RuntimeIndeterminate, "action value expression evaluated indeterminate")
                                        .with_rule(rule.name.as_str())
                                        .with_context("action", idx.to_string()),
                                );
                            }
                        }
                    }
                    Action::Buffer { key, value_expression, max_items, emit } => {
                        match self.eval_value_expression(value_expression, &view) {
                            Some(value) => {
                                let action_id = ActionKey::Sensor(key.clone());
                                value_updates.push((key.clone(), value.clone()));
                                buffer_pushes.push((key.clone(), value.clone(), *max_items));
                                let last = self.emit_state.get(&action_id);
                                let should_write = should_emit(*emit, last, &value, rising_edge);
                                if should_write {
                                    store_writes.push((key.clone(), value.clone()));
                                }
                                emit_state_updates.push((action_id, value.clone()));
                                emits.push(ActionEmit { output: Some(key.clone()), value, written: should_write });
                            }
                            None => {
                                warn!(rule = %rule.name, action = idx, "buffer value expression was indeterminate; skipped");
                                diagnostics.push(
                                    Diagnostic::new(DiagnosticKind::RuntimeIndeterminate, "buffer value expression evaluated indeterminate")
                                        .with_rule(rule.name.as_str())
                                        .with_context("action", idx.to_string()),
                                );
                            }
                        }
                    }
                }
            }
        }

        RuleEffects {
            result: RuleResult {
                rule: rule.name.clone(),
                eval_result: Some(eval_result),
                branch,
                skipped: false,
                emits,
            },
            value_updates,
            store_writes,
            buffer_pushes,
            new_active,
            emit_state_updates,
            log_messages,
            diagnostics,
        }
    }

    fn apply_effects(
        &mut self,
        effects: RuleEffects,
        cycle_values: &mut CycleValues,
        to_write: &mut HashMap<SensorId, Value>,
        now: u64,
    ) -> RuleResult {
        for (sensor, value) in effects.value_updates {
            cycle_values.set(&sensor, value);
        }
        for (sensor, value, capacity) in effects.buffer_pushes {
            self.ring_buffers.track_with_capacity(sensor.clone(), capacity);
            self.ring_buffers.push(&sensor, value, now);
        }
        for (sensor, value) in effects.store_writes {
            to_write.insert(sensor, value);
        }
        if let Some(active) = effects.new_active {
            self.rule_active.insert(effects.result.rule.clone(), active);
        }
        for (id, value) in effects.emit_state_updates {
            self.emit_state.insert(id, value);
        }
        for message in effects.log_messages {
            info!(rule = %effects.result.rule, "{message}");
        }
        effects.result
    }

    fn resolve_inputs(&self, rule: &Rule, cycle_values: &CycleValues, now: u64) -> InputResolution {
        let mut overrides = BTreeMap::new();
        for input in &rule.inputs {
            let fresh = cycle_values.get(&input.id);
            if !fresh.is_null() {
                continue;
            }
            match &input.fallback {
                None | Some(FallbackStrategy::PropagateUnavailable) => {}
                Some(FallbackStrategy::UseDefault { default_value }) => {
                    overrides.insert(input.id.clone(), default_value.clone());
                }
                Some(FallbackStrategy::UseLastKnown { max_age }) => {
                    if let Some((value, ts)) = self.ring_buffers.latest(&input.id) {
                        let age_ms = max_age.as_millis();
                        // age_ms == 0 is the sentinel the compiler assigns
                        // when the YAML omitted `max_age`; it is accepted
                        // only under the extended-last-known config flag,
                        // never by literal age comparison.
                        let accepted = if age_ms == 0 {
                            self.extended_last_known
                        } else {
                            now.saturating_sub(*ts) <= age_ms
                        };
                        if accepted {
                            overrides.insert(input.id.clone(), value.clone());
                        }
                    }
                }
                Some(FallbackStrategy::SkipRule) => return InputResolution::Skip,
            }
        }
        InputResolution::Resolved(overrides)
    }

    fn evaluate_condition(&self, condition: &Condition, view: &crate::context::CycleView<'_>, now: u64) -> EvalResult {
        match condition {
            Condition::Comparison { sensor, op, value } => {
                let lhs = view.get(sensor.as_str());
                compare(&lhs, *op, value)
            }
            Condition::Expression { text } => match self.expr_cache.get(text) {
                Some(compiled) => match compiled.eval(view) {
                    ExprOutcome::Value(VmValue::Bool(b)) => EvalResult::from_bool(b),
                    _ => EvalResult::Indeterminate,
                },
                None => EvalResult::Indeterminate,
            },
            Condition::ThresholdOverTime { sensor, op, threshold, duration } => {
                match self.ring_buffers.values_in_window(sensor, now, *duration, true) {
                    Some(window) if !window.is_empty() => {
                        let all_hold = window.iter().all(|(v, _)| match v.as_number() {
                            Some(n) => op.holds(n, *threshold),
                            None => false,
                        });
                        EvalResult::from_bool(all_hold)
                    }
                    _ => EvalResult::Indeterminate,
                }
            }
            Condition::All { children } => {
                let results: Vec<EvalResult> = children.iter().map(|c| self.evaluate_condition(c, view, now)).collect();
                EvalResult::kleene_all(&results)
            }
            Condition::Any { children } => {
                let results: Vec<EvalResult> = children.iter().map(|c| self.evaluate_condition(c, view, now)).collect();
                EvalResult::kleene_any(&results)
            }
            Condition::Not { child } => self.evaluate_condition(child, view, now).kleene_not(),
        }
    }

    fn eval_value_expression(&self, text: &str, view: &crate::context::CycleView<'_>) -> Option<Value> {
        let compiled = self.expr_cache.get(text)?;
        match compiled.eval(view) {
            ExprOutcome::Value(VmValue::Number(n)) => Some(Value::Number(n)),
            ExprOutcome::Value(VmValue::Bool(b)) => Some(Value::Bool(b)),
            ExprOutcome::Indeterminate => None,
        }
    }
}

enum InputResolution {
    Resolved(BTreeMap<SensorId, Value>),
    Skip,
}

fn should_emit(
    mode: beacon_core::ir::EmitMode,
    last_emitted: Option<&Value>,
    candidate: &Value,
    rising_edge: bool,
) -> bool {
    use beacon_core::ir::EmitMode;
    match mode {
        EmitMode::Always => true,
        EmitMode::OnChange => last_emitted.map_or(true, |last| last != candidate),
        EmitMode::OnEnter => rising_edge,
    }
}

fn compare(lhs: &Value, op: beacon_core::ir::CompareOp, rhs: &Value) -> EvalResult {
    use beacon_core::ir::CompareOp;
    match op {
        CompareOp::Eq => lhs.type_compatible_eq(rhs).map_or(EvalResult::Indeterminate, EvalResult::from_bool),
        CompareOp::Ne => lhs
            .type_compatible_eq(rhs)
            .map_or(EvalResult::Indeterminate, |eq| EvalResult::from_bool(!eq)),
        CompareOp::Gt => lhs
            .partial_compare(rhs)
            .map_or(EvalResult::Indeterminate, |o| EvalResult::from_bool(o.is_gt())),
        CompareOp::Ge => lhs
            .partial_compare(rhs)
            .map_or(EvalResult::Indeterminate, |o| EvalResult::from_bool(o.is_ge())),
        CompareOp::Lt => lhs
            .partial_compare(rhs)
            .map_or(EvalResult::Indeterminate, |o| EvalResult::from_bool(o.is_lt())),
        CompareOp::Le => lhs
            .partial_compare(rhs)
            .map_or(EvalResult::Indeterminate, |o| EvalResult::from_bool(o.is_le())),
    }
}

fn layer_writes_are_disjoint(layer: &[&LayeredRule]) -> bool {
    let mut all: Vec<SensorId> = layer.iter().flat_map(|lr| lr.rule.output_sensors()).collect();
    let total = all.len();
    all.sort();
    all.dedup();
    all.len() == total
}

fn collect_condition_expressions(condition: &Condition, cache: &mut HashMap<String, Arc<CompiledExpr>>) -> RuntimeResult<()> {
    match condition {
        Condition::Expression { text } => insert_compiled(text, cache),
        Condition::All { children } | Condition::Any { children } => {
            for c in children {
                collect_condition_expressions(c, cache)?;
            }
            Ok(())
        }
        Condition::Not { child } => collect_condition_expressions(child, cache),
        _ => Ok(()),
    }
}

fn insert_compiled(text: &str, cache: &mut HashMap<String, Arc<CompiledExpr>>) -> RuntimeResult<()> {
    if cache.contains_key(text) {
        return Ok(());
    }
    let compiled = compile_source(text).map_err(|e| RuntimeError::InvalidProgram(format!("expression '{text}': {e}")))?;
    cache.insert(text.to_string(), Arc::new(compiled));
    Ok(())
}
