//! Dependency Analyzer: builds the rule-to-rule dependency graph from the
//! resolved rule set, detects cycles, assigns evaluation layers, and
//! extracts temporal dependencies for the Ring Buffer Manager.

use beacon_core::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSink};
use beacon_core::ir::{Action, Condition, LayeredRule, TemporalDependency};
use hashbrown::HashMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::catalog::ResolvedRuleSet;
use crate::error::DependencyError;

const DEFAULT_MAX_DEPENDENCY_DEPTH: u32 = 10;

/// Output of a successful dependency analysis pass.
pub struct AnalysisResult {
    pub layered_rules: Vec<LayeredRule>,
    pub temporal_dependencies: Vec<TemporalDependency>,
}

/// Build `producer_of[sensor] = rule`, link each rule to the rules that
/// produce the sensors it reads, detect cycles, and assign each rule its
/// longest-path layer. `max_dependency_depth` bounds the longest accepted
/// chain; rules exceeding it get a `DepthExceeded` warning on `sink`.
pub fn analyze(
    rule_set: &ResolvedRuleSet,
    max_dependency_depth: u32,
    sink: &mut DiagnosticSink,
) -> Result<AnalysisResult, DependencyError> {
    let max_dependency_depth = if max_dependency_depth == 0 {
        DEFAULT_MAX_DEPENDENCY_DEPTH
    } else {
        max_dependency_depth
    };

    let mut graph: DiGraph<String, ()> = DiGraph::new();
    let mut node_of: HashMap<String, NodeIndex> = HashMap::new();
    for rule in &rule_set.rules {
        let idx = graph.add_node(rule.name.to_string());
        node_of.insert(rule.name.to_string(), idx);
    }

    let mut producer_of: HashMap<String, String> = HashMap::new();
    for rule in &rule_set.rules {
        for action in rule.actions.iter().chain(rule.else_actions.iter()) {
            if let Some(key) = action.output_key() {
                producer_of.insert(key.to_string(), rule.name.to_string());
            }
        }
    }

    for rule in &rule_set.rules {
        let idx = node_of[rule.name.as_str()];
        for sensor in referenced_sensors(rule) {
            if let Some(producer) = producer_of.get(&sensor) {
                if producer != rule.name.as_str() {
                    graph.add_edge(node_of[producer.as_str()], idx, ());
                }
            }
        }
    }

    let order = match toposort(&graph, None) {
        Ok(order) => order,
        Err(cycle) => {
            let cycle_rule = graph[cycle.node_id()].clone();
            let cycle_path = find_cycle_through(&graph, cycle.node_id()).unwrap_or_else(|| vec![cycle_rule]);
            return Err(DependencyError::CycleDetected(cycle_path));
        }
    };
    let mut depth: HashMap<NodeIndex, u32> = HashMap::new();
    for idx in &order {
        let d = graph
            .neighbors_directed(*idx, Direction::Incoming)
            .map(|dep| depth.get(&dep).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);
        depth.insert(*idx, d);
    }

    for rule in &rule_set.rules {
        let idx = node_of[rule.name.as_str()];
        let d = depth[&idx];
        if d > max_dependency_depth {
            sink.push(
                Diagnostic::new(
                    DiagnosticKind::DepthExceeded,
                    format!("dependency chain depth {d} exceeds maxDependencyDepth ({max_dependency_depth})"),
                )
                .with_rule(rule.name.as_str()),
            );
        }
    }

    let mut layered_rules: Vec<LayeredRule> = rule_set
        .rules
        .iter()
        .map(|rule| {
            let idx = node_of[rule.name.as_str()];
            LayeredRule {
                rule: rule.clone(),
                layer: depth[&idx],
            }
        })
        .collect();
    layered_rules.sort_by(|a, b| {
        a.layer.cmp(&b.layer).then_with(|| a.rule.name.as_str().cmp(b.rule.name.as_str()))
    });

    let mut temporal_dependencies = Vec::new();
    for rule in &rule_set.rules {
        collect_temporal_dependencies(rule.name.clone(), &rule.condition, &mut temporal_dependencies);
    }

    Ok(AnalysisResult {
        layered_rules,
        temporal_dependencies,
    })
}

/// Sensors a rule's condition tree references: direct sensor leaves plus
/// identifiers tokenized out of `expression{}` text.
fn referenced_sensors(rule: &beacon_core::ir::Rule) -> Vec<String> {
    let mut out = Vec::new();
    collect_sensor_names(&rule.condition, &mut out);
    out
}

fn collect_sensor_names(condition: &Condition, out: &mut Vec<String>) {
    match condition {
        Condition::Comparison { sensor, .. } => out.push(sensor.to_string()),
        Condition::ThresholdOverTime { sensor, .. } => out.push(sensor.to_string()),
        Condition::Expression { text } => {
            if let Ok(expr) = beacon_expr::Parser::parse(text) {
                out.extend(expr.identifiers());
            }
        }
        Condition::All { children } | Condition::Any { children } => {
            for child in children {
                collect_sensor_names(child, out);
            }
        }
        Condition::Not { child } => collect_sensor_names(child, out),
    }
}

fn collect_temporal_dependencies(
    rule: beacon_core::ids::RuleName,
    condition: &Condition,
    out: &mut Vec<TemporalDependency>,
) {
    match condition {
        Condition::ThresholdOverTime { sensor, duration, .. } => {
            out.push(TemporalDependency {
                rule: rule.clone(),
                sensor: sensor.clone(),
                duration: *duration,
            });
        }
        Condition::All { children } | Condition::Any { children } => {
            for child in children {
                collect_temporal_dependencies(rule.clone(), child, out);
            }
        }
        Condition::Not { child } => collect_temporal_dependencies(rule, child, out),
        Condition::Comparison { .. } | Condition::Expression { .. } => {}
    }
}

/// Recover the smallest cycle passing through `start`, for a clearer
/// diagnostic than "a cycle exists somewhere".
fn find_cycle_through(graph: &DiGraph<String, ()>, start: NodeIndex) -> Option<Vec<String>> {
    let mut path: Vec<NodeIndex> = Vec::new();
    let mut on_path: HashMap<NodeIndex, usize> = HashMap::new();

    fn dfs(
        graph: &DiGraph<String, ()>,
        node: NodeIndex,
        path: &mut Vec<NodeIndex>,
        on_path: &mut HashMap<NodeIndex, usize>,
    ) -> Option<Vec<NodeIndex>> {
        if let Some(&pos) = on_path.get(&node) {
            return Some(path[pos..].to_vec());
        }
        on_path.insert(node, path.len());
        path.push(node);
        for next in graph.neighbors_directed(node, Direction::Outgoing) {
            if let Some(cycle) = dfs(graph, next, path, on_path) {
                return Some(cycle);
            }
        }
        path.pop();
        on_path.remove(&node);
        None
    }

    dfs(graph, start, &mut path, &mut on_path).map(|nodes| nodes.into_iter().map(|n| graph[n].clone()).collect())
}
