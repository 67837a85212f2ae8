use crate::{
    PluginError, Result,
    codec::value::{NULL_SENTINEL, from_blob, is_absent, to_blob},
    model::{Node, Params, Retries},
    pb,
};

/// Encodes a node tree, parent before children.
pub fn encode_node(node: &Node) -> Result<pb::Node> {
    encode_node_at(node, "node")
}

/// Decodes a node tree received from the wire.
pub fn decode_node(node: pb::Node) -> Result<Node> {
    decode_node_at(node, "node")
}

fn encode_node_at(
    node: &Node,
    path: &str,
) -> Result<pb::Node> {
    let with = to_blob(&node.with).map_err(|e| PluginError::encode(format!("{}.with", path), e))?;

    let (retries, has_retries) = match &node.retries {
        Some(retries) => (to_blob(retries).map_err(|e| PluginError::encode(format!("{}.retries", path), e))?, true),
        None => (NULL_SENTINEL.to_vec(), false),
    };

    let do_nodes = node
        .do_nodes
        .iter()
        .enumerate()
        .map(|(i, child)| encode_node_at(child, &format!("{}.do[{}]", path, i)))
        .collect::<Result<Vec<_>>>()?;
    let on_failure = node
        .on_failure
        .iter()
        .enumerate()
        .map(|(i, child)| encode_node_at(child, &format!("{}.on_failure[{}]", path, i)))
        .collect::<Result<Vec<_>>>()?;

    Ok(pb::Node {
        id: node.id.clone(),
        uses: node.uses.clone(),
        with,
        needs: node.needs.clone(),
        r#do: do_nodes,
        retries,
        on_failure,
        has_retries,
    })
}

fn decode_node_at(
    node: pb::Node,
    path: &str,
) -> Result<Node> {
    // peers marshal an empty parameter map as `null`
    let with = if is_absent(&node.with) {
        Params::new()
    } else {
        from_blob::<Params>(&node.with).map_err(|e| PluginError::decode(format!("{}.with", path), e))?
    };

    let retries = decode_retries(&node.retries, node.has_retries).map_err(|e| PluginError::decode(format!("{}.retries", path), e))?;

    let do_nodes = node
        .r#do
        .into_iter()
        .enumerate()
        .map(|(i, child)| decode_node_at(child, &format!("{}.do[{}]", path, i)))
        .collect::<Result<Vec<_>>>()?;
    let on_failure = node
        .on_failure
        .into_iter()
        .enumerate()
        .map(|(i, child)| decode_node_at(child, &format!("{}.on_failure[{}]", path, i)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Node {
        id: node.id,
        uses: node.uses,
        with,
        needs: node.needs,
        do_nodes,
        retries,
        on_failure,
    })
}

fn decode_retries(
    blob: &[u8],
    has_retries: bool,
) -> serde_json::Result<Option<Retries>> {
    if has_retries {
        return from_blob::<Retries>(blob).map(Some);
    }
    // without the presence flag only the legacy sentinel means "no policy"
    if is_absent(blob) {
        return Ok(None);
    }
    from_blob::<Retries>(blob).map(Some)
}
