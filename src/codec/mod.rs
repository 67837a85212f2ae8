//! Conversion between the data model and its gRPC envelope.
//!
//! Structural fields (ids, capability names, dependency lists, the tree shape)
//! are carried as native protobuf fields so tooling can inspect them without
//! decoding payloads. Dynamic payloads travel as opaque JSON blobs.

mod context;
mod node;
mod value;

use serde_json::Value;

use crate::{
    Result,
    model::{ExecutionContext, Node},
    pb,
};

pub use context::{decode_context, encode_context};
pub use node::{decode_node, encode_node};
pub use value::{decode_value, encode_value};

/// Builds the request envelope for one `execute` call.
pub fn encode_request(
    node: &Node,
    ctx: &ExecutionContext,
) -> Result<pb::ExecuteRequest> {
    Ok(pb::ExecuteRequest {
        node: Some(encode_node(node)?),
        context: Some(encode_context(ctx)?),
    })
}

/// Unpacks a request envelope. Missing messages decode as empty defaults.
pub fn decode_request(request: pb::ExecuteRequest) -> Result<(Node, ExecutionContext)> {
    let node = decode_node(request.node.unwrap_or_default())?;
    let ctx = decode_context(request.context.unwrap_or_default())?;
    Ok((node, ctx))
}

pub fn encode_response(result: &Value) -> Result<pb::ExecuteResponse> {
    Ok(pb::ExecuteResponse {
        result: encode_value(result)?,
    })
}

pub fn decode_response(response: pb::ExecuteResponse) -> Result<Value> {
    decode_value(&response.result)
}
