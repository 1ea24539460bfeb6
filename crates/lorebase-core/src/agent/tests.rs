use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lorebase_llm::mock::MockProvider;
use lorebase_tools::{ToolDef, ToolError, ToolOutput, deserialize_params};

use super::*;

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct LookupParams {
    query: String,
}

/// Answers `lookup` calls with a canned passage; `broken` always errors.
#[derive(Default)]
struct StubTools {
    calls: AtomicUsize,
}

impl ToolExecutor for StubTools {
    fn tool_definitions(&self) -> Vec<ToolDef> {
        vec![
            ToolDef {
                id: "lookup".into(),
                description: "Look things up".into(),
                schema: schemars::schema_for!(LookupParams),
            },
            ToolDef {
                id: "broken".into(),
                description: "Always fails".into(),
                schema: schemars::schema_for!(LookupParams),
            },
        ]
    }

    async fn execute_tool_call(&self, call: &ToolCall) -> Result<Option<ToolOutput>, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match call.tool_id.as_str() {
            "lookup" => {
                let params: LookupParams = deserialize_params(&call.params)?;
                Ok(Some(ToolOutput {
                    tool_name: "lookup".into(),
                    summary: format!("passage about {}", params.query),
                }))
            }
            "broken" => Err(ToolError::InvalidParams {
                message: "boom".into(),
            }),
            _ => Ok(None),
        }
    }
}

fn tool_call(tool: &str, query: &str) -> String {
    format!(
        "I should search.\n```tool_call\n{{\"tool_id\": \"{tool}\", \"params\": {{\"query\": \"{query}\"}}}}\n```"
    )
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        base_backoff: Duration::from_millis(1),
    }
}

fn agent(responses: Vec<String>) -> QueryAgent<MockProvider, StubTools> {
    QueryAgent::new(MockProvider::with_responses(responses), StubTools::default())
        .with_retry(fast_retry())
}

#[test]
fn parse_final_answer_strips_marker() {
    assert_eq!(
        parse_reply("Thought: done.\nFinal Answer:  Paris "),
        AgentAction::Final("Paris".into())
    );
}

#[test]
fn parse_plain_text_is_final() {
    assert_eq!(
        parse_reply("  just an answer \n"),
        AgentAction::Final("just an answer".into())
    );
}

#[test]
fn parse_tool_call_block() {
    match parse_reply(&tool_call("lookup", "cats")) {
        AgentAction::Call(call) => {
            assert_eq!(call.tool_id, "lookup");
            assert_eq!(call.params["query"], "cats");
        }
        other => panic!("expected a call, got {other:?}"),
    }
}

#[test]
fn parse_bad_json_is_malformed() {
    let reply = "```tool_call\n{not json}\n```";
    assert!(matches!(parse_reply(reply), AgentAction::Malformed(_)));
}

#[test]
fn system_prompt_lists_tools() {
    let agent = agent(vec![]);
    let prompt = agent.system_prompt();
    assert!(prompt.contains("## lookup"));
    assert!(prompt.contains("```tool_call"));
    assert!(prompt.contains(FINAL_ANSWER_MARKER));
}

#[tokio::test]
async fn direct_answer_without_tools() {
    let agent = agent(vec!["Final Answer: 42".into()]);
    let answer = agent.run("meaning of life?").await.unwrap();
    assert_eq!(answer.output, "42");
    assert!(answer.intermediate_steps.is_empty());
}

#[tokio::test]
async fn tool_then_answer_records_step() {
    let agent = agent(vec![
        tool_call("lookup", "cats"),
        "Final Answer: cats purr".into(),
    ]);
    let answer = agent.run("what do cats do?").await.unwrap();
    assert_eq!(answer.output, "cats purr");
    assert_eq!(answer.intermediate_steps.len(), 1);
    let step = &answer.intermediate_steps[0];
    assert_eq!(step.tool, "lookup");
    assert_eq!(step.tool_input["query"], "cats");
    assert_eq!(step.observation, "passage about cats");
}

#[tokio::test]
async fn unknown_tool_is_fed_back() {
    let agent = agent(vec![tool_call("teleport", "x"), "Final Answer: ok".into()]);
    let answer = agent.run("q").await.unwrap();
    let observation = &answer.intermediate_steps[0].observation;
    assert!(observation.contains("Unknown tool `teleport`"));
    assert!(observation.contains("lookup, broken"));
}

#[tokio::test]
async fn tool_error_is_fed_back() {
    let agent = agent(vec![tool_call("broken", "x"), "Final Answer: ok".into()]);
    let answer = agent.run("q").await.unwrap();
    assert!(
        answer.intermediate_steps[0]
            .observation
            .starts_with("Tool `broken` failed")
    );
}

#[tokio::test]
async fn malformed_call_uses_a_step() {
    let agent = agent(vec![
        "```tool_call\n{oops\n```".into(),
        "Final Answer: recovered".into(),
    ])
    .with_max_steps(2);
    let answer = agent.run("q").await.unwrap();
    assert_eq!(answer.output, "recovered");
    assert!(answer.intermediate_steps.is_empty());
}

#[tokio::test]
async fn step_limit_exceeded() {
    let responses = (0..5).map(|i| tool_call("lookup", &format!("q{i}"))).collect();
    let agent = agent(responses).with_max_steps(3);
    let err = agent.run("loop forever").await.unwrap_err();
    match &err {
        AgentError::StepLimitExceeded { max_steps, steps } => {
            assert_eq!(*max_steps, 3);
            assert_eq!(steps.len(), 3);
        }
        other => panic!("expected step limit, got {other:?}"),
    }
    assert_eq!(err.steps().len(), 3);
    assert_eq!(agent.tools.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn provider_failure_after_retries() {
    let provider = MockProvider::failing();
    let agent = QueryAgent::new(provider.clone(), StubTools::default()).with_retry(fast_retry());
    let err = agent.run("q").await.unwrap_err();
    assert!(matches!(err, AgentError::Provider(_)));
    assert_eq!(provider.chat_calls(), 2);
}

#[tokio::test]
async fn cancelled_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let provider = MockProvider::default();
    let agent = QueryAgent::new(provider.clone(), StubTools::default()).with_cancel_token(token);
    assert!(matches!(agent.run("q").await, Err(AgentError::Cancelled)));
    assert_eq!(provider.chat_calls(), 0);
}

#[tokio::test]
async fn long_tool_output_is_truncated() {
    struct Verbose;

    impl ToolExecutor for Verbose {
        fn tool_definitions(&self) -> Vec<ToolDef> {
            Vec::new()
        }

        async fn execute_tool_call(
            &self,
            call: &ToolCall,
        ) -> Result<Option<ToolOutput>, ToolError> {
            Ok(Some(ToolOutput {
                tool_name: call.tool_id.clone(),
                summary: "y".repeat(lorebase_tools::MAX_TOOL_OUTPUT_CHARS * 2),
            }))
        }
    }

    let agent = QueryAgent::new(
        MockProvider::with_responses(vec![tool_call("any", "x"), "Final Answer: done".into()]),
        Verbose,
    );
    let answer = agent.run("q").await.unwrap();
    let observation = &answer.intermediate_steps[0].observation;
    assert!(observation.len() < lorebase_tools::MAX_TOOL_OUTPUT_CHARS * 2);
    assert!(observation.contains("[truncated"));
}
