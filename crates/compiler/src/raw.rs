//! Untyped rule-file AST produced by the DSL Loader: close to the raw YAML
//! shape, fields still strings so the schema validator can canonicalize and
//! report errors, instead of failing on the first malformed value during
//! deserialization.

use beacon_core::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawDocument {
    pub version: u32,
    pub rules: Vec<RawRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawRule {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub inputs: Vec<RawInputDescriptor>,
    pub condition: RawCondition,
    #[serde(default)]
    pub actions: Vec<RawAction>,
    #[serde(rename = "else", default)]
    pub else_actions: Vec<RawAction>,
    /// Line number in the source file, attached by the loader, not part of
    /// the YAML shape itself.
    #[serde(skip)]
    pub line: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawInputDescriptor {
    pub id: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub fallback: Option<RawFallback>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RawFallback {
    pub strategy: String,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub max_age: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum RawCondition {
    Comparison {
        sensor: String,
        op: String,
        value: Value,
    },
    Expression {
        text: String,
    },
    ThresholdOverTime {
        sensor: String,
        op: String,
        threshold: f64,
        duration: String,
    },
    All {
        children: Vec<RawCondition>,
    },
    Any {
        children: Vec<RawCondition>,
    },
    Not {
        child: Box<RawCondition>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum RawAction {
    Set {
        key: String,
        value_expression: String,
        #[serde(default = "default_emit")]
        emit: String,
    },
    Log {
        message: String,
        #[serde(default = "default_emit")]
        emit: String,
    },
    Buffer {
        key: String,
        value_expression: String,
        max_items: usize,
        #[serde(default = "default_emit")]
        emit: String,
    },
}

fn default_emit() -> String {
    "always".to_string()
}
