use lorebase_llm::Message;
use lorebase_tools::ToolCall;
use serde::Serialize;

/// One tool invocation and what it returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntermediateStep {
    pub tool: String,
    pub tool_input: serde_json::Value,
    pub observation: String,
}

/// What the model asked for in one reply.
#[derive(Debug, PartialEq)]
pub(crate) enum AgentAction {
    Call(ToolCall),
    /// A `tool_call` block that could not be parsed.
    Malformed(String),
    Final(String),
}

/// Conversation so far plus the tool steps taken.
#[derive(Debug)]
pub(crate) struct AgentState {
    messages: Vec<Message>,
    steps: Vec<IntermediateStep>,
}

impl AgentState {
    pub(crate) fn new(system_prompt: String, input: &str) -> Self {
        Self {
            messages: vec![Message::system(system_prompt), Message::user(input)],
            steps: Vec::new(),
        }
    }

    pub(crate) fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub(crate) fn record_call(&mut self, reply: String, call: &ToolCall, observation: String) {
        self.messages.push(Message::assistant(reply));
        self.messages
            .push(Message::user(format_observation(&call.tool_id, &observation)));
        let tool_input = serde_json::Value::Object(
            call.params
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        self.steps.push(IntermediateStep {
            tool: call.tool_id.clone(),
            tool_input,
            observation,
        });
    }

    pub(crate) fn record_malformed(&mut self, reply: String, error: &str) {
        self.messages.push(Message::assistant(reply));
        self.messages.push(Message::user(format!(
            "Observation: the tool_call block was not valid JSON ({error}). \
             Reply with a corrected tool_call block or a final answer."
        )));
    }

    pub(crate) fn into_steps(self) -> Vec<IntermediateStep> {
        self.steps
    }
}

fn format_observation(tool_id: &str, body: &str) -> String {
    format!("[tool output: {tool_id}]\n```\n{body}\n```")
}
