//! Newline-delimited JSON in, newline-delimited JSON out.
//!
//! Each non-blank input line is a JSON object whose `input` (or `query`)
//! string is sent to the agent. Every such line produces exactly one output
//! line carrying the original fields plus `status` and either `output` and
//! `intermediate_steps`, or `error`. Lines that are not valid JSON (or not
//! valid UTF-8) produce a failed record with their line number and `raw` text.

use lorebase_llm::LlmProvider;
use lorebase_tools::ToolExecutor;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::agent::{AgentError, QueryAgent};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

pub struct BatchQueryRunner<P: LlmProvider, T: ToolExecutor> {
    agent: QueryAgent<P, T>,
    cancel: CancellationToken,
}

impl<P: LlmProvider, T: ToolExecutor> BatchQueryRunner<P, T> {
    pub fn new(agent: QueryAgent<P, T>) -> Self {
        Self {
            agent,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Process records one at a time, flushing after every output line.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if reading input or writing output fails.
    /// Per-record failures are written as failed records instead.
    pub async fn run<R, W>(&self, mut reader: R, writer: &mut W) -> std::io::Result<BatchSummary>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut summary = BatchSummary::default();
        let mut buf = Vec::new();
        let mut line_no = 0usize;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            line_no += 1;
            // invalid UTF-8 becomes a malformed record rather than ending the batch
            let line = String::from_utf8_lossy(trim_newline(&buf)).into_owned();
            if line.trim().is_empty() {
                continue;
            }
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let span = tracing::info_span!("query", line = line_no);
            let Some(record) = self.process(&line, line_no).instrument(span).await else {
                summary.cancelled = true;
                break;
            };

            if record.get("status").and_then(Value::as_str) == Some("failed") {
                summary.failed += 1;
            }
            summary.total += 1;

            let mut out = serde_json::to_vec(&Value::Object(record))?;
            out.push(b'\n');
            writer.write_all(&out).await?;
            writer.flush().await?;
            tracing::info!(processed = summary.total, "query done");
        }

        Ok(summary)
    }

    /// Build the output record for one line, or `None` if the agent was cancelled.
    async fn process(&self, line: &str, line_no: usize) -> Option<Map<String, Value>> {
        let (input, mut record) = match parse_record(line) {
            Ok(parsed) => parsed,
            Err(reason) => {
                tracing::warn!(line = line_no, "skipping malformed record: {reason}");
                let mut record = Map::new();
                record.insert("line".into(), Value::from(line_no));
                record.insert("raw".into(), Value::from(line));
                record.insert("status".into(), Value::from("failed"));
                record.insert("error".into(), Value::from(reason));
                return Some(record);
            }
        };

        match self.agent.run(&input).await {
            Ok(answer) => {
                record.insert("status".into(), Value::from("ok"));
                record.insert("output".into(), Value::from(answer.output));
                record.insert(
                    "intermediate_steps".into(),
                    serde_json::to_value(&answer.intermediate_steps).unwrap_or(Value::Null),
                );
            }
            Err(AgentError::Cancelled) => return None,
            Err(e) => {
                tracing::warn!(input = %input, "query failed: {e:#}");
                record.insert("status".into(), Value::from("failed"));
                record.insert("error".into(), Value::from(e.to_string()));
                if !e.steps().is_empty() {
                    record.insert(
                        "intermediate_steps".into(),
                        serde_json::to_value(e.steps()).unwrap_or(Value::Null),
                    );
                }
            }
        }
        Some(record)
    }
}

fn trim_newline(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

/// Split a line into the question and the full field map.
fn parse_record(line: &str) -> Result<(String, Map<String, Value>), String> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    let Value::Object(record) = value else {
        return Err("record must be a JSON object".into());
    };
    let input = match record.get("input").or_else(|| record.get("query")) {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err("`input` must be a string".into()),
        None => return Err("record has no `input` field".into()),
    };
    Ok((input, record))
}
