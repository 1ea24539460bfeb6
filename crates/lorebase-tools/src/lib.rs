//! Tool execution seam for the query agent, and the index retrieval tool.

pub mod executor;
pub mod registry;
pub mod retrieval;

pub use executor::{
    MAX_TOOL_OUTPUT_CHARS, ToolCall, ToolError, ToolExecutor, ToolOutput, deserialize_params,
    extract_fenced_blocks, truncate_tool_output,
};
pub use registry::{ToolDef, ToolRegistry};
pub use retrieval::{RetrievalExecutor, RetrievalParams};
