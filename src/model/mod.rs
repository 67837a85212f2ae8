mod context;
mod node;

pub use context::ExecutionContext;
pub use node::{Node, NodeBuilder, Params, Retries};
