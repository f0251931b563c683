//! The conversation loop: model turns alternating with tool execution.

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::adapter::{AdapterError, SchemaAdapter};
use crate::model::{ModelBackend, ModelReply, ModelRequest, ToolCall, Turn};
use crate::tools::ToolHost;
use crate::{Error, Result};

/// Default bound on tool round trips per user turn.
pub const DEFAULT_MAX_ROUND_TRIPS: usize = 8;

/// Default character budget for a single tool result in history.
pub const DEFAULT_MAX_RESULT_CHARS: usize = 8000;

#[derive(Debug, Clone)]
pub struct ConversationConfig {
    pub max_round_trips: usize,
    pub max_result_chars: usize,
    pub system_prompt: Option<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_round_trips: DEFAULT_MAX_ROUND_TRIPS,
            max_result_chars: DEFAULT_MAX_RESULT_CHARS,
            system_prompt: None,
        }
    }
}

/// Where the loop is within a user turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingUserInput,
    ModelTurn,
    ToolExecution,
    Done,
}

/// The end of one user turn.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub text: String,
    /// The round-trip bound was hit and `text` is an explanation, not an
    /// answer.
    pub degraded: bool,
    pub round_trips: usize,
}

/// Drives one conversation between a model and a tool host.
///
/// Construction encodes the host's tool definitions once through the
/// adapter; a schema the provider cannot express fails here, before any
/// model call. History is append-only except that a failed turn is rolled
/// back whole.
pub struct Conversation<B, A, T>
where
    B: ModelBackend,
    A: SchemaAdapter<Declaration = B::Declaration, Call = B::Call>,
    T: ToolHost,
{
    backend: B,
    adapter: A,
    tools: T,
    declarations: Vec<B::Declaration>,
    config: ConversationConfig,
    history: Vec<Turn>,
    phase: Phase,
}

impl<B, A, T> Conversation<B, A, T>
where
    B: ModelBackend,
    A: SchemaAdapter<Declaration = B::Declaration, Call = B::Call>,
    T: ToolHost,
{
    pub fn new(backend: B, adapter: A, tools: T, config: ConversationConfig) -> Result<Self> {
        let declarations = adapter.encode(tools.definitions())?;
        debug!(tools = declarations.len(), "tool declarations encoded");
        Ok(Self {
            backend,
            adapter,
            tools,
            declarations,
            config,
            history: Vec::new(),
            phase: Phase::AwaitingUserInput,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn tools(&self) -> &T {
        &self.tools
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Run one user turn to completion.
    ///
    /// Tool failures are fed back to the model and never end the turn.
    /// A model error or a lost tool session does; the turn is then removed
    /// from history.
    pub async fn send(&mut self, text: impl Into<String>) -> Result<Reply> {
        let mark = self.history.len();
        let outcome = self.run_turn(text.into()).await;
        match &outcome {
            Ok(_) => self.phase = Phase::Done,
            Err(e) => {
                warn!(error = %e, "turn failed, rolling back");
                self.history.truncate(mark);
                self.phase = Phase::AwaitingUserInput;
            }
        }
        outcome
    }

    async fn run_turn(&mut self, text: String) -> Result<Reply> {
        self.history.push(Turn::User { text });
        let mut round_trips = 0;

        loop {
            self.phase = Phase::ModelTurn;
            let reply = self.generate().await?;

            if !reply.wants_tools() {
                self.history.push(Turn::Model {
                    text: reply.text.clone(),
                    calls: Vec::new(),
                });
                info!(round_trips, "model answered");
                return Ok(Reply {
                    text: reply.text,
                    degraded: false,
                    round_trips,
                });
            }

            if round_trips >= self.config.max_round_trips {
                warn!(
                    max = self.config.max_round_trips,
                    requested = reply.calls.len(),
                    "tool round-trip bound reached"
                );
                self.history.push(Turn::Model {
                    text: reply.text.clone(),
                    calls: Vec::new(),
                });
                return Ok(Reply {
                    text: degraded_text(self.config.max_round_trips, &reply.text),
                    degraded: true,
                    round_trips,
                });
            }

            self.phase = Phase::ToolExecution;
            self.execute(round_trips, reply).await?;
            round_trips += 1;
        }
    }

    async fn generate(&self) -> Result<ModelReply<B::Call>> {
        let request = ModelRequest {
            system: self.config.system_prompt.as_deref(),
            history: &self.history,
            tools: &self.declarations,
        };
        Ok(self.backend.generate(request).await?)
    }

    /// Decode, dispatch concurrently, and append results in request order.
    async fn execute(&mut self, round: usize, reply: ModelReply<B::Call>) -> Result<()> {
        let decoded: Vec<(ToolCall, Option<AdapterError>)> = reply
            .calls
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let id = format!("call_{round}_{index}");
                match self.adapter.decode(raw) {
                    Ok(invocation) => (
                        ToolCall {
                            id,
                            name: invocation.name,
                            arguments: invocation.arguments,
                            signature: invocation.signature,
                        },
                        None,
                    ),
                    Err(e) => (
                        ToolCall {
                            id,
                            name: e.call_name().unwrap_or("unknown").to_string(),
                            arguments: Default::default(),
                            signature: None,
                        },
                        Some(e),
                    ),
                }
            })
            .collect();

        let calls: Vec<ToolCall> = decoded.iter().map(|(call, _)| call.clone()).collect();
        self.history.push(Turn::Model {
            text: reply.text,
            calls,
        });

        let tools = &self.tools;
        let outcomes = join_all(decoded.iter().map(|(call, failure)| async move {
            match failure {
                Some(e) => Ok((format!("Error: {e}"), true)),
                None => {
                    debug!(tool = %call.name, id = %call.id, "dispatching tool call");
                    match tools.call(&call.name, call.arguments.clone()).await {
                        Ok(result) => Ok((result.joined_text(), result.is_error)),
                        Err(e) if e.is_fatal() => Err(Error::ToolService(e)),
                        Err(e) => Ok((format!("Error: tool call failed: {e}"), true)),
                    }
                }
            }
        }))
        .await;

        for ((call, _), outcome) in decoded.into_iter().zip(outcomes) {
            let (content, is_error) = outcome?;
            self.history.push(Turn::ToolResult {
                call_id: call.id,
                name: call.name,
                content: truncate(&content, self.config.max_result_chars),
                is_error,
            });
        }
        Ok(())
    }
}

fn degraded_text(max: usize, partial: &str) -> String {
    let mut text = format!(
        "Stopped after {max} tool round trips without reaching a final answer."
    );
    if !partial.trim().is_empty() {
        text.push_str("\n\n");
        text.push_str(partial.trim());
    }
    text
}

fn truncate(text: &str, budget: usize) -> String {
    let total = text.chars().count();
    if total <= budget {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(budget).collect();
    cut.push_str(&format!("\n[truncated {} characters]", total - budget));
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("abc", 3), "abc");
    }

    #[test]
    fn truncate_reports_dropped_characters() {
        let cut = truncate("abcdef", 4);
        assert_eq!(cut, "abcd\n[truncated 2 characters]");
    }

    #[test]
    fn degraded_text_appends_partial_answer() {
        assert_eq!(
            degraded_text(2, "  partial  "),
            "Stopped after 2 tool round trips without reaching a final answer.\n\npartial"
        );
        assert!(!degraded_text(2, "").contains("\n"));
    }
}
