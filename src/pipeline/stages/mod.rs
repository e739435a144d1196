//! Model-calling stages.
//!
//! Every stage follows the same shape: build a prompt, call the completion
//! service under the retry policy, parse the response leniently, and
//! normalize into a fully-populated result. On total failure each stage
//! falls back to a pure, model-free default — the orchestrator never sees a
//! raw model error.

pub mod checklist;
pub mod classification;
pub mod critic;
pub mod summary;

use crate::pipeline::llm::LlmError;

/// Extract the JSON object from a model response.
///
/// Models wrap JSON in markdown fences or prose more often than not; take
/// the fenced block when present, otherwise the span from the first `{` to
/// the last `}`.
pub fn extract_json_block(response: &str) -> Result<String, LlmError> {
    if let Some(fence_start) = response.find("```json") {
        let content_start = fence_start + 7;
        if let Some(fence_len) = response[content_start..].find("```") {
            return Ok(response[content_start..content_start + fence_len].trim().to_string());
        }
    }

    let start = response
        .find('{')
        .ok_or_else(|| LlmError::MalformedResponse("No JSON object in response".into()))?;
    let end = response
        .rfind('}')
        .ok_or_else(|| LlmError::MalformedResponse("Unclosed JSON object".into()))?;
    if end < start {
        return Err(LlmError::MalformedResponse("Unclosed JSON object".into()));
    }
    Ok(response[start..=end].trim().to_string())
}

/// Clamp a model-reported confidence into [0, 1], treating NaN as zero.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
