//! Helpers for building and editing workflow graphs on the client side.
use serde_json::{json, Value};

use crate::prompt::extractor::SAMPLER_CLASS_TYPES;

/// Smallest graph the proxy accepts: a sampler linked to one text node,
/// plus the save node the host frontend reads outputs from.
pub fn minimal_workflow(positive: &str, negative: Option<&str>) -> Value {
    json!({
        "3": {
            "class_type": "KSampler",
            "inputs": {"positive": ["6", 0], "negative": ["7", 0], "seed": 0, "steps": 20}
        },
        "6": {"class_type": "CLIPTextEncode", "inputs": {"text": positive}},
        "7": {"class_type": "CLIPTextEncode", "inputs": {"text": negative.unwrap_or("")}},
        "9": {"class_type": "SaveImage", "inputs": {"images": ["8", 0], "filename_prefix": "ComfyUI"}}
    })
}

/// Overwrite the text of the node feeding the first sampler's `positive`
/// input. Falls back to the first `CLIPTextEncode` by id. Returns whether a
/// node was updated.
pub fn set_positive_text(graph: &mut Value, text: &str) -> bool {
    let target = sampler_positive_source(graph).or_else(|| first_text_encoder(graph));
    let Some(id) = target else {
        return false;
    };
    match graph.get_mut(&id).and_then(|n| n.get_mut("inputs")).and_then(|i| i.as_object_mut()) {
        Some(inputs) => {
            inputs.insert("text".to_string(), Value::String(text.to_string()));
            true
        }
        None => false,
    }
}

fn sampler_positive_source(graph: &Value) -> Option<String> {
    graph.as_object()?.values().find_map(|node| {
        let class = node.get("class_type")?.as_str()?;
        if !SAMPLER_CLASS_TYPES.contains(&class) {
            return None;
        }
        let first = node.get("inputs")?.get("positive")?.as_array()?.first()?;
        first
            .as_str()
            .map(String::from)
            .or_else(|| first.as_u64().map(|n| n.to_string()))
    })
}

fn first_text_encoder(graph: &Value) -> Option<String> {
    let mut ids: Vec<&String> = graph
        .as_object()?
        .iter()
        .filter(|(_, node)| node.get("class_type").and_then(|c| c.as_str()) == Some("CLIPTextEncode"))
        .map(|(id, _)| id)
        .collect();
    ids.sort();
    ids.first().map(|id| id.to_string())
}
