//! JSON extraction from model responses

use serde::de::DeserializeOwned;

/// The JSON payload of a response: a fenced block, else the outermost object
pub fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find("```") {
        let after = &response[start + 3..];
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after[body_start..];
        let end = body.find("```").unwrap_or(body.len());
        return body[..end].trim();
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response.trim(),
    }
}

/// Deserialize a pass record, returning the parser message on failure
pub fn parse_pass<T: DeserializeOwned>(response: &str) -> Result<T, String> {
    serde_json::from_str(extract_json(response)).map_err(|e| e.to_string())
}
