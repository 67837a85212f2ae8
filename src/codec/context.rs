use serde_json::Value;

use crate::{
    PluginError, Result,
    codec::value::{decode_dynamic, to_blob},
    model::ExecutionContext,
    pb,
};

/// Encodes the context. Each dynamic field becomes its own blob, secrets stay a native map.
pub fn encode_context(ctx: &ExecutionContext) -> Result<pb::ExecutionContext> {
    Ok(pb::ExecutionContext {
        trigger_data: encode_field(&ctx.trigger_data, "context.trigger_data")?,
        node_outputs: encode_field(&ctx.node_outputs, "context.node_outputs")?,
        secrets: ctx.secrets.clone(),
        current_item: encode_field(&ctx.current_item, "context.current_item")?,
        failure_data: encode_field(&ctx.failure_data, "context.failure_data")?,
    })
}

/// Decodes the context. An empty blob decodes to `Value::Null`.
pub fn decode_context(ctx: pb::ExecutionContext) -> Result<ExecutionContext> {
    Ok(ExecutionContext {
        trigger_data: decode_dynamic(&ctx.trigger_data, "context.trigger_data")?,
        node_outputs: decode_dynamic(&ctx.node_outputs, "context.node_outputs")?,
        secrets: ctx.secrets,
        current_item: decode_dynamic(&ctx.current_item, "context.current_item")?,
        failure_data: decode_dynamic(&ctx.failure_data, "context.failure_data")?,
    })
}

fn encode_field(
    value: &Value,
    field: &str,
) -> Result<Vec<u8>> {
    to_blob(value).map_err(|e| PluginError::encode(field, e))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_context_roundtrip() {
        let ctx = ExecutionContext::new()
            .with_trigger_data(json!({"event": "push", "ref": "refs/heads/main"}))
            .with_node_outputs(json!({"fetch": {"status": 200, "body": [1, 2, 3]}}))
            .with_current_item(json!("item-7"))
            .with_failure_data(json!({"error": "timeout", "node": "fetch"}))
            .with_secret("API_TOKEN", "abc")
            .with_secret("DB_PASSWORD", "xyz");

        let encoded = encode_context(&ctx).unwrap();
        assert_eq!(encoded.secrets.get("API_TOKEN").map(String::as_str), Some("abc"));

        assert_eq!(decode_context(encoded).unwrap(), ctx);
    }

    #[test]
    fn test_empty_context_roundtrip() {
        let ctx = ExecutionContext::default();
        assert_eq!(decode_context(encode_context(&ctx).unwrap()).unwrap(), ctx);
    }

    #[test]
    fn test_missing_blobs_decode_to_null() {
        let ctx = decode_context(pb::ExecutionContext::default()).unwrap();
        assert_eq!(ctx, ExecutionContext::default());
        assert_eq!(ctx.trigger_data, Value::Null);
        assert!(ctx.secrets.is_empty());
    }

    #[test]
    fn test_key_order_irrelevant() {
        let wire = pb::ExecutionContext {
            trigger_data: br#"{"b": 2, "a": 1}"#.to_vec(),
            ..Default::default()
        };
        let ctx = decode_context(wire).unwrap();
        assert_eq!(ctx.trigger_data, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_malformed_field_is_named() {
        let wire = pb::ExecutionContext {
            failure_data: b"{oops".to_vec(),
            ..Default::default()
        };
        let err = decode_context(wire).unwrap_err();
        assert!(matches!(err, PluginError::Decode { ref field, .. } if field == "context.failure_data"));
    }
}
