mod error;
mod state;

pub use error::AgentError;
pub use state::IntermediateStep;

use lorebase_llm::{LlmProvider, RetryPolicy, retry_with_backoff};
use lorebase_tools::{
    ToolCall, ToolExecutor, ToolRegistry, extract_fenced_blocks, truncate_tool_output,
};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use state::{AgentAction, AgentState};

pub const DEFAULT_MAX_STEPS: usize = 10;

const FINAL_ANSWER_MARKER: &str = "Final Answer:";

/// Result of a successful query.
#[derive(Debug, Clone)]
pub struct AgentAnswer {
    pub output: String,
    pub intermediate_steps: Vec<IntermediateStep>,
}

/// Answers one question at a time by alternating model calls and tool calls,
/// for at most `max_steps` model calls.
pub struct QueryAgent<P: LlmProvider, T: ToolExecutor> {
    provider: P,
    tools: T,
    system_prompt: String,
    max_steps: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl<P: LlmProvider, T: ToolExecutor> QueryAgent<P, T> {
    pub fn new(provider: P, tools: T) -> Self {
        let system_prompt = build_system_prompt(&ToolRegistry::from_definitions(
            tools.tool_definitions(),
        ));
        Self {
            provider,
            tools,
            system_prompt,
            max_steps: DEFAULT_MAX_STEPS,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run the agent loop for one question.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::StepLimitExceeded`] when no final answer arrives
    /// within `max_steps`, [`AgentError::Provider`] when the model call fails
    /// after retries, and [`AgentError::Cancelled`] on cancellation.
    pub async fn run(&self, input: &str) -> Result<AgentAnswer, AgentError> {
        let mut state = AgentState::new(self.system_prompt.clone(), input);

        for step in 0..self.max_steps {
            if self.cancel.is_cancelled() {
                tracing::info!("query cancelled");
                return Err(AgentError::Cancelled);
            }

            let span = tracing::debug_span!("agent_step", step);
            let chat = retry_with_backoff("agent step", &self.retry, || {
                self.provider.chat(state.messages())
            })
            .instrument(span);
            let reply = tokio::select! {
                r = chat => r?,
                () = self.cancel.cancelled() => {
                    tracing::info!("LLM call cancelled");
                    return Err(AgentError::Cancelled);
                }
            };

            match parse_reply(&reply) {
                AgentAction::Final(output) => {
                    tracing::debug!(steps = step + 1, "final answer");
                    return Ok(AgentAnswer {
                        output,
                        intermediate_steps: state.into_steps(),
                    });
                }
                AgentAction::Call(call) => {
                    let observation = self.observe(&call).await;
                    state.record_call(reply, &call, observation);
                }
                AgentAction::Malformed(error) => {
                    tracing::warn!("malformed tool_call block: {error}");
                    state.record_malformed(reply, &error);
                }
            }
        }

        tracing::warn!(max_steps = self.max_steps, "step limit reached");
        Err(AgentError::StepLimitExceeded {
            max_steps: self.max_steps,
            steps: state.into_steps(),
        })
    }

    /// Execute a tool call; failures come back as text for the model to read.
    async fn observe(&self, call: &ToolCall) -> String {
        match self.tools.execute_tool_call(call).await {
            Ok(Some(output)) => truncate_tool_output(&output.summary),
            Ok(None) => {
                tracing::warn!(tool = %call.tool_id, "unknown tool requested");
                let available: Vec<String> = self
                    .tools
                    .tool_definitions()
                    .into_iter()
                    .map(|d| d.id)
                    .collect();
                format!(
                    "Unknown tool `{}`. Available tools: {}",
                    call.tool_id,
                    available.join(", ")
                )
            }
            Err(e) => {
                tracing::warn!(tool = %call.tool_id, "tool call failed: {e:#}");
                format!("Tool `{}` failed: {e}", call.tool_id)
            }
        }
    }
}

fn build_system_prompt(registry: &ToolRegistry) -> String {
    format!(
        "You answer questions using the tools below. Tool outputs are passages \
         from a document collection; base your answer on them.\n\n\
         {tools}\n\n\
         To call a tool, reply with exactly one fenced block:\n\
         ```tool_call\n{{\"tool_id\": \"<tool>\", \"params\": {{\"query\": \"<question>\"}}}}\n```\n\
         The tool output will be sent back to you. When you know the answer, \
         reply with `{FINAL_ANSWER_MARKER} <answer>` and no tool_call block.",
        tools = registry.format_for_prompt()
    )
}

pub(crate) fn parse_reply(reply: &str) -> AgentAction {
    if let Some(block) = extract_fenced_blocks(reply, "tool_call").first() {
        return match serde_json::from_str::<ToolCall>(block) {
            Ok(call) => AgentAction::Call(call),
            Err(e) => AgentAction::Malformed(e.to_string()),
        };
    }
    let answer = reply
        .rfind(FINAL_ANSWER_MARKER)
        .map_or(reply, |i| &reply[i + FINAL_ANSWER_MARKER.len()..]);
    AgentAction::Final(answer.trim().to_owned())
}

#[cfg(test)]
mod tests;
