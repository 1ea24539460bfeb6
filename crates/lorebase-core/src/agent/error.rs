use super::IntermediateStep;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent stopped after {max_steps} steps without a final answer")]
    StepLimitExceeded {
        max_steps: usize,
        steps: Vec<IntermediateStep>,
    },

    #[error("agent provider error: {0}")]
    Provider(#[from] lorebase_llm::LlmError),

    #[error("query cancelled")]
    Cancelled,
}

impl AgentError {
    /// Tool steps taken before the failure, when the loop got that far.
    #[must_use]
    pub fn steps(&self) -> &[IntermediateStep] {
        match self {
            Self::StepLimitExceeded { steps, .. } => steps,
            Self::Provider(_) | Self::Cancelled => &[],
        }
    }
}
