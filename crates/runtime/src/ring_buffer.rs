//! Ring Buffer Manager (§4.6): per-sensor, fixed-capacity, time-ordered
//! sample history with guard-value retention across eviction, so a
//! `threshold_over_time` window that begins before the oldest in-buffer
//! sample can still be answered correctly.

use std::collections::VecDeque;

use hashbrown::HashMap;

use beacon_core::duration::Duration;
use beacon_core::ids::SensorId;
use beacon_core::ir::Program;
use beacon_core::value::Value;

/// A single sensor's sample history.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    capacity: usize,
    samples: VecDeque<(Value, u64)>,
    /// The most recently evicted sample, retained so window queries whose
    /// start predates the oldest in-buffer sample still see the value that
    /// held throughout the gap.
    guard: Option<(Value, u64)>,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: VecDeque::new(),
            guard: None,
        }
    }

    /// Append a new sample, evicting the oldest into the guard slot once at
    /// capacity.
    pub fn push(&mut self, value: Value, now: u64) {
        if self.samples.len() >= self.capacity {
            if let Some(evicted) = self.samples.pop_front() {
                self.guard = Some(evicted);
            }
        }
        self.samples.push_back((value, now));
    }

    pub fn latest(&self) -> Option<&(Value, u64)> {
        self.samples.back()
    }

    /// Samples with `ts >= now - duration`, ordered by `ts`. When
    /// `include_guard` is set and the oldest in-buffer sample starts after
    /// the window's lower bound (or the buffer is empty), the guard sample
    /// is prepended so the caller observes the value held throughout the
    /// gap rather than treating it as unobserved.
    pub fn values_in_window(&self, now: u64, duration: Duration, include_guard: bool) -> Vec<(Value, u64)> {
        let window_start = now.saturating_sub(duration.as_millis());
        let mut out: Vec<(Value, u64)> = self
            .samples
            .iter()
            .filter(|(_, ts)| *ts >= window_start)
            .cloned()
            .collect();

        if include_guard {
            if let Some(guard) = &self.guard {
                let oldest_in_buffer = self.samples.front().map(|(_, ts)| *ts);
                let needs_guard = match oldest_in_buffer {
                    Some(ts) => ts > window_start,
                    None => true,
                };
                if needs_guard {
                    out.insert(0, guard.clone());
                }
            }
        }
        out.sort_by_key(|(_, ts)| *ts);
        out
    }
}

/// Owns one [`RingBuffer`] per tracked sensor. Mutated only between cycles,
/// on the read/push step (§5); readers elsewhere must treat it as read-only.
#[derive(Debug, Default)]
pub struct RingBufferManager {
    buffers: HashMap<SensorId, RingBuffer>,
}

impl RingBufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size every tracked sensor's buffer from the program: the default
    /// `buffer_capacity`, widened to `ceil(max_duration/cycle_time) + 1` for
    /// any sensor read by a `threshold_over_time` leaf, and further widened
    /// so `retain_last` sensors keep at least one sample across that span.
    pub fn for_program(program: &Program, default_capacity: usize, cycle_time_ms: u64) -> Self {
        let mut max_duration: HashMap<SensorId, Duration> = HashMap::new();
        for dep in &program.temporal_dependencies {
            max_duration
                .entry(dep.sensor.clone())
                .and_modify(|d| {
                    if dep.duration > *d {
                        *d = dep.duration;
                    }
                })
                .or_insert(dep.duration);
        }
        for entry in &program.catalog {
            if let Some(retain) = entry.retain_last {
                max_duration
                    .entry(entry.id.clone())
                    .and_modify(|d| {
                        if retain > *d {
                            *d = retain;
                        }
                    })
                    .or_insert(retain);
            }
        }

        let cycle_time_ms = cycle_time_ms.max(1);
        let mut buffers = HashMap::new();
        for sensor in tracked_sensors(program, &max_duration) {
            let capacity = match max_duration.get(&sensor) {
                Some(duration) => {
                    let ticks = duration.as_millis().div_ceil(cycle_time_ms) as usize;
                    default_capacity.max(ticks + 1)
                }
                None => default_capacity,
            };
            buffers.insert(sensor, RingBuffer::new(capacity));
        }
        Self { buffers }
    }

    /// Explicitly track a sensor with a given capacity, overriding whatever
    /// `for_program` computed. Used for `buffer` action outputs, whose
    /// capacity is the action's own `max_items` rather than a duration
    /// derived figure.
    pub fn track_with_capacity(&mut self, sensor: SensorId, capacity: usize) {
        self.buffers
            .entry(sensor)
            .or_insert_with(|| RingBuffer::new(capacity));
    }

    pub fn push(&mut self, sensor: &SensorId, value: Value, now: u64) {
        if let Some(buffer) = self.buffers.get_mut(sensor) {
            buffer.push(value, now);
        }
    }

    pub fn latest(&self, sensor: &SensorId) -> Option<&(Value, u64)> {
        self.buffers.get(sensor).and_then(RingBuffer::latest)
    }

    pub fn values_in_window(
        &self,
        sensor: &SensorId,
        now: u64,
        duration: Duration,
        include_guard: bool,
    ) -> Option<Vec<(Value, u64)>> {
        self.buffers
            .get(sensor)
            .map(|b| b.values_in_window(now, duration, include_guard))
    }

    pub fn is_tracked(&self, sensor: &SensorId) -> bool {
        self.buffers.contains_key(sensor)
    }
}

fn tracked_sensors(program: &Program, max_duration: &HashMap<SensorId, Duration>) -> Vec<SensorId> {
    let mut sensors: Vec<SensorId> = max_duration.keys().cloned().collect();
    for layered in &program.rules {
        sensors.extend(layered.rule.input_sensors());
    }
    sensors.sort();
    sensors.dedup();
    sensors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicted_sample_becomes_guard() {
        let mut buf = RingBuffer::new(2);
        buf.push(Value::Number(1.0), 1_000);
        buf.push(Value::Number(2.0), 2_000);
        buf.push(Value::Number(3.0), 3_000);

        let window = buf.values_in_window(3_000, Duration::from_millis(2_500), true);
        assert_eq!(window.first(), Some(&(Value::Number(1.0), 1_000)));
    }

    #[test]
    fn guard_omitted_when_window_fully_covered_in_buffer() {
        let mut buf = RingBuffer::new(2);
        buf.push(Value::Number(1.0), 1_000);
        buf.push(Value::Number(2.0), 2_000);
        buf.push(Value::Number(3.0), 3_000);

        let window = buf.values_in_window(3_000, Duration::from_millis(500), true);
        assert_eq!(window, vec![(Value::Number(3.0), 3_000)]);
    }

    #[test]
    fn empty_buffer_with_guard_still_answers_from_guard() {
        let mut buf = RingBuffer::new(1);
        buf.push(Value::Bool(true), 1_000);
        buf.push(Value::Bool(false), 2_000);

        let window = buf.values_in_window(2_000, Duration::from_millis(5_000), true);
        assert_eq!(window, vec![(Value::Bool(true), 1_000), (Value::Bool(false), 2_000)]);
    }

    #[test]
    fn out_of_order_push_is_still_returned_ts_sorted() {
        let mut buf = RingBuffer::new(4);
        buf.push(Value::Number(1.0), 1_000);
        buf.push(Value::Number(3.0), 3_000);
        buf.push(Value::Number(2.0), 2_000);

        let window = buf.values_in_window(3_000, Duration::from_millis(5_000), true);
        assert_eq!(
            window,
            vec![(Value::Number(1.0), 1_000), (Value::Number(2.0), 2_000), (Value::Number(3.0), 3_000)]
        );
    }

    #[test]
    fn capacity_derived_from_longest_temporal_window() {
        use beacon_core::builders::RuleBuilder;
        use beacon_core::ids::RuleName;
        use beacon_core::ir::{Condition, OrderedOp};
        use std::collections::BTreeMap;

        let sensor = SensorId::new("pressure").unwrap();
        let rule = RuleBuilder::new(RuleName::new("R").unwrap())
            .condition(Condition::ThresholdOverTime {
                sensor: sensor.clone(),
                op: OrderedOp::Gt,
                threshold: 100.0,
                duration: Duration::parse("10s").unwrap(),
            })
            .build()
            .unwrap();
        let program = Program {
            rules: vec![beacon_core::ir::LayeredRule { rule, layer: 0 }],
            catalog: vec![],
            temporal_dependencies: vec![beacon_core::ir::TemporalDependency {
                rule: RuleName::new("R").unwrap(),
                sensor: sensor.clone(),
                duration: Duration::parse("10s").unwrap(),
            }],
            symbol_table: BTreeMap::new(),
        };

        let manager = RingBufferManager::for_program(&program, 4, 1_000);
        assert!(manager.is_tracked(&sensor));
    }
}
