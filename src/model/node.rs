use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{PluginError, Result};

/// Parameters passed to a node's action.
pub type Params = serde_json::Map<String, Value>;

/// A workflow step definition.
///
/// Children in `do_nodes` and `on_failure` are owned by their parent, so a
/// `Node` is always a strict tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// node id, unique among its siblings
    pub id: String,
    /// capability this node invokes
    pub uses: String,
    /// action parameters
    #[serde(default, skip_serializing_if = "Params::is_empty")]
    pub with: Params,
    /// ids of sibling nodes this node depends on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    /// sub-workflow run as part of this node
    #[serde(default, rename = "do", skip_serializing_if = "Vec::is_empty")]
    pub do_nodes: Vec<Node>,
    /// retry policy, `None` when the node has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<Retries>,
    /// fallback sub-workflow
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<Node>,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        uses: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            uses: uses.into(),
            ..Default::default()
        }
    }

    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str::<Node>(s).map_err(|e| PluginError::Node(format!("invalid node definition: {}", e)))
    }

    /// Depth of the `do` nesting, a node without children has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.do_nodes.iter().map(Node::depth).max().unwrap_or(0)
    }
}

/// Retry policy carried with a node. Interpreting it is up to the engine or the plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retries {
    /// retry times
    pub count: i64,
    /// delay between attempts, as a duration string (eg. "5s")
    #[serde(default)]
    pub delay: String,
}

/// Builds a [`Node`], refusing to add a child whose id is already taken among its siblings.
///
/// ```rust,ignore
/// let node = NodeBuilder::new("fetch", "http.get")
///     .with("url", "https://example.com")
///     .step(Node::new("log", "log"))
///     .retries(3, "5s")
///     .build()?;
/// ```
#[derive(Debug)]
pub struct NodeBuilder {
    node: Node,
    do_ids: HashSet<String>,
    on_failure_ids: HashSet<String>,
    error: Option<String>,
}

impl NodeBuilder {
    pub fn new(
        id: impl Into<String>,
        uses: impl Into<String>,
    ) -> Self {
        Self {
            node: Node::new(id, uses),
            do_ids: HashSet::new(),
            on_failure_ids: HashSet::new(),
            error: None,
        }
    }

    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.node.with.insert(key.into(), value.into());
        self
    }

    pub fn need(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.node.needs.push(id.into());
        self
    }

    /// Appends a child to the `do` sub-workflow.
    pub fn step(
        mut self,
        child: Node,
    ) -> Self {
        if self.do_ids.insert(child.id.clone()) {
            self.node.do_nodes.push(child);
        } else {
            self.fail(format!("duplicate node id '{}' in 'do' of '{}'", child.id, self.node.id));
        }
        self
    }

    /// Appends a child to the `on_failure` sub-workflow.
    pub fn on_failure(
        mut self,
        child: Node,
    ) -> Self {
        if self.on_failure_ids.insert(child.id.clone()) {
            self.node.on_failure.push(child);
        } else {
            self.fail(format!("duplicate node id '{}' in 'on_failure' of '{}'", child.id, self.node.id));
        }
        self
    }

    pub fn retries(
        mut self,
        count: i64,
        delay: impl Into<String>,
    ) -> Self {
        self.node.retries = Some(Retries {
            count,
            delay: delay.into(),
        });
        self
    }

    pub fn build(self) -> Result<Node> {
        if let Some(error) = self.error {
            return Err(PluginError::Node(error));
        }
        if self.node.id.is_empty() {
            return Err(PluginError::Node("node id must not be empty".to_string()));
        }
        for child in self.node.do_nodes.iter().chain(self.node.on_failure.iter()) {
            if child.id.is_empty() {
                return Err(PluginError::Node(format!("child of '{}' has an empty id", self.node.id)));
            }
        }
        Ok(self.node)
    }

    fn fail(
        &mut self,
        error: String,
    ) {
        // keep the first error, later ones are usually consequences of it
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}
