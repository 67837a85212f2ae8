use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Run-time inputs of a single `execute` call.
///
/// The dynamic fields are conventionally JSON objects but any value is accepted,
/// `Value::Null` stands for "absent". Secrets are a flat string map.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// data of the event that triggered the workflow
    #[serde(default)]
    pub trigger_data: Value,
    /// outputs of previously executed nodes, keyed by node id
    #[serde(default)]
    pub node_outputs: Value,
    /// secrets available to the node
    #[serde(default)]
    pub secrets: HashMap<String, String>,
    /// item being processed when the node runs inside a loop
    #[serde(default)]
    pub current_item: Value,
    /// failure information when running an `on_failure` branch
    #[serde(default)]
    pub failure_data: Value,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trigger_data(
        mut self,
        data: Value,
    ) -> Self {
        self.trigger_data = data;
        self
    }

    pub fn with_node_outputs(
        mut self,
        outputs: Value,
    ) -> Self {
        self.node_outputs = outputs;
        self
    }

    pub fn with_current_item(
        mut self,
        item: Value,
    ) -> Self {
        self.current_item = item;
        self
    }

    pub fn with_failure_data(
        mut self,
        data: Value,
    ) -> Self {
        self.failure_data = data;
        self
    }

    pub fn with_secret(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }

    pub fn secret(
        &self,
        key: &str,
    ) -> Option<&str> {
        self.secrets.get(key).map(String::as_str)
    }

    /// Output of a previously executed node, when `node_outputs` is an object.
    pub fn node_output(
        &self,
        nid: &str,
    ) -> Option<&Value> {
        self.node_outputs.as_object().and_then(|outputs| outputs.get(nid))
    }
}

// secret values never show up in logs
impl fmt::Debug for ExecutionContext {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut secret_keys: Vec<&String> = self.secrets.keys().collect();
        secret_keys.sort();

        f.debug_struct("ExecutionContext")
            .field("trigger_data", &self.trigger_data)
            .field("node_outputs", &self.node_outputs)
            .field("secrets", &secret_keys)
            .field("current_item", &self.current_item)
            .field("failure_data", &self.failure_data)
            .finish()
    }
}
