use std::collections::HashMap;
use std::fmt;

/// Structured tool invocation from the LLM.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct ToolCall {
    pub tool_id: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

/// Structured result from tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub tool_name: String,
    pub summary: String,
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary)
    }
}

pub const MAX_TOOL_OUTPUT_CHARS: usize = 30_000;

/// Truncate tool output that exceeds `MAX_TOOL_OUTPUT_CHARS` using head+tail split.
#[must_use]
pub fn truncate_tool_output(output: &str) -> String {
    if output.len() <= MAX_TOOL_OUTPUT_CHARS {
        return output.to_string();
    }

    let half = MAX_TOOL_OUTPUT_CHARS / 2;
    let head_end = output.floor_char_boundary(half);
    let tail_start = output.ceil_char_boundary(output.len() - half);
    let head = &output[..head_end];
    let tail = &output[tail_start..];
    let truncated = tail_start - head_end;

    format!(
        "{head}\n\n... [truncated {truncated} chars, showing first and last ~{half} chars] ...\n\n{tail}"
    )
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    #[error("embedding the query failed: {0}")]
    Embedding(#[from] lorebase_llm::LlmError),

    #[error("index lookup failed: {0}")]
    Index(#[from] lorebase_memory::IndexError),
}

/// Deserialize tool call params from a `HashMap<String, Value>` into a typed struct.
///
/// # Errors
///
/// Returns `ToolError::InvalidParams` when deserialization fails.
pub fn deserialize_params<T: serde::de::DeserializeOwned, S: std::hash::BuildHasher>(
    params: &HashMap<String, serde_json::Value, S>,
) -> Result<T, ToolError> {
    let obj =
        serde_json::Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    serde_json::from_value(obj).map_err(|e| ToolError::InvalidParams {
        message: e.to_string(),
    })
}

/// Backend the query agent hands structured tool calls to.
pub trait ToolExecutor: Send + Sync {
    /// Tool definitions this executor can handle.
    fn tool_definitions(&self) -> Vec<crate::registry::ToolDef>;

    /// Execute a structured tool call. Returns `None` if `tool_id` is not handled.
    fn execute_tool_call(
        &self,
        call: &ToolCall,
    ) -> impl Future<Output = Result<Option<ToolOutput>, ToolError>> + Send;
}

/// Bodies of all ```` ```{lang} ```` fenced blocks in `text`.
#[must_use]
pub fn extract_fenced_blocks<'a>(text: &'a str, lang: &str) -> Vec<&'a str> {
    let marker = format!("```{lang}");
    let marker_len = marker.len();
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(&marker) {
        let after = &rest[start + marker_len..];
        if let Some(end) = after.find("```") {
            blocks.push(after[..end].trim());
            rest = &after[end + 3..];
        } else {
            break;
        }
    }

    blocks
}
