//! Positive-prompt extraction from a ComfyUI workflow graph.
//!
//! A workflow is an object of `node_id -> {"class_type": ..., "inputs": {...}}`.
//! Links between nodes are encoded as `[source_node_id, output_slot]` arrays.
//! We locate the sampler, follow its `positive` link one hop upstream and read
//! the `text` input of the node found there (normally a `CLIPTextEncode`).
use serde_json::{Map, Value};
use thiserror::Error;

/// Node types treated as the sampling step.
pub const SAMPLER_CLASS_TYPES: &[&str] = &["KSampler", "KSamplerAdvanced"];

/// Text the host frontend leaves in the prompt box before the user types.
pub const PLACEHOLDER_PROMPT: &str = "...";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("No valid prompt found")]
    NoPrompt,
    #[error("Malformed workflow: {0}")]
    Malformed(String),
}

/// Return the trimmed positive prompt of the first sampler in `workflow`.
pub fn extract_positive_prompt(workflow: &Value) -> Result<String, ExtractError> {
    let nodes = workflow
        .as_object()
        .ok_or_else(|| ExtractError::Malformed("workflow must be an object of nodes".to_string()))?;

    let Some(source_id) = first_sampler_positive_source(nodes)? else {
        return Err(ExtractError::NoPrompt);
    };

    let source = nodes.get(&source_id).ok_or_else(|| {
        ExtractError::Malformed(format!("positive input references missing node '{}'", source_id))
    })?;
    let text = source
        .get("inputs")
        .and_then(|inputs| inputs.get("text"))
        .ok_or_else(|| ExtractError::Malformed(format!("node '{}' has no text input", source_id)))?
        .as_str()
        .ok_or_else(|| ExtractError::Malformed(format!("text input of node '{}' is not a string", source_id)))?
        .trim();

    if text.is_empty() || text == PLACEHOLDER_PROMPT {
        return Err(ExtractError::NoPrompt);
    }
    Ok(text.to_string())
}

/// Node ids in ComfyUI's own order: numeric ids ascending, then the rest.
fn ordered_node_ids(nodes: &Map<String, Value>) -> Vec<&String> {
    let mut ids: Vec<&String> = nodes.keys().collect();
    ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    });
    ids
}

fn first_sampler_positive_source(nodes: &Map<String, Value>) -> Result<Option<String>, ExtractError> {
    for id in ordered_node_ids(nodes) {
        let node = &nodes[id.as_str()];
        let is_sampler = node
            .get("class_type")
            .and_then(|ct| ct.as_str())
            .map(|ct| SAMPLER_CLASS_TYPES.contains(&ct))
            .unwrap_or(false);
        if !is_sampler {
            continue;
        }
        let Some(link) = node.get("inputs").and_then(|inputs| inputs.get("positive")) else {
            continue;
        };
        return link_source_id(link)
            .map(Some)
            .ok_or_else(|| ExtractError::Malformed(format!("positive input of node '{}' is not a node link", id)));
    }
    Ok(None)
}

fn link_source_id(link: &Value) -> Option<String> {
    let first = link.as_array()?.first()?;
    if let Some(s) = first.as_str() {
        return Some(s.to_string());
    }
    first.as_u64().map(|n| n.to_string())
}
