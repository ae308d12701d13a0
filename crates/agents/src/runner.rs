//! The agent loop: stream a model turn, execute recognized tool calls,
//! feed results back, repeat until a final answer, cancellation, or the
//! iteration budget.

use std::{fmt::Write, sync::Arc};

use {
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, trace, warn},
};

use crate::{
    model::{
        AgentMessage, AgentResponse, LlmOptions, LlmTransport, ToolCall, ToolResult,
        TransportError, to_transport_messages,
    },
    parser::{PlannerStep, StreamingToolParser},
    prompt::{DEFAULT_PERSONA, PageContext, build_system_prompt},
    tool_registry::{AgentTool, ToolRegistry},
};

/// Fallback loop limit when config is missing or invalid.
const DEFAULT_AGENT_MAX_ITERATIONS: usize = 10;

/// Default cap for a single tool result fed back to the model.
const DEFAULT_MAX_TOOL_RESULT_BYTES: usize = 65_536;

/// Response text for a run ended by user cancellation.
const STOPPED_MESSAGE: &str = "Operation stopped by user.";

fn resolve_max_iterations(configured: usize) -> usize {
    if configured == 0 {
        warn!(
            default = DEFAULT_AGENT_MAX_ITERATIONS,
            "agent.max_iterations was 0; falling back to default"
        );
        return DEFAULT_AGENT_MAX_ITERATIONS;
    }
    configured
}

/// Typed errors from the agent loop.
///
/// Cancellation is deliberately absent: a stopped run resolves normally with
/// a stopped [`AgentResponse`], never an error.
#[derive(Debug, thiserror::Error)]
pub enum AgentRunError {
    /// The transport failed with something other than a cancellation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Any other error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Snapshot handed to the progress callback: after every chunk (text-so-far
/// plus planner steps) and once per completed tool batch.
#[derive(Debug, Clone)]
pub struct AgentProgress {
    /// Full raw text of the current turn so far.
    pub message: String,
    pub iterations: usize,
    pub finished: bool,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    pub planner_steps: Vec<PlannerStep>,
}

/// Fire-and-forget progress callback; no return value is consumed.
pub type OnProgress = Box<dyn Fn(AgentProgress) + Send + Sync>;

/// Construction-time options for an [`Agent`].
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// Base persona text; `None` uses the built-in persona.
    pub persona: Option<String>,
    pub max_iterations: usize,
    pub max_tool_result_bytes: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            persona: None,
            max_iterations: DEFAULT_AGENT_MAX_ITERATIONS,
            max_tool_result_bytes: DEFAULT_MAX_TOOL_RESULT_BYTES,
        }
    }
}

impl AgentOptions {
    /// Derive options from loaded configuration.
    pub fn from_config(config: &sidekick_config::SidekickConfig) -> Self {
        Self {
            persona: config.agent.system_prompt.clone(),
            max_iterations: resolve_max_iterations(config.agent.max_iterations),
            max_tool_result_bytes: config.tools.max_tool_result_bytes,
        }
    }
}

/// Orchestrator for user-initiated exchanges.
///
/// Constructed once per assistant instance; `run` is invoked per user turn.
/// A run is cancelled through the [`CancellationToken`] passed to `run`:
/// cancel it from anywhere and the loop resolves with a stopped response at
/// its next suspension point, telling the transport stream to cancel exactly
/// once. A token cancelled before the run starts stops it immediately.
pub struct Agent {
    transport: Arc<dyn LlmTransport>,
    tools: ToolRegistry,
    persona: String,
    max_iterations: usize,
    max_tool_result_bytes: usize,
}

impl Agent {
    pub fn new(transport: Arc<dyn LlmTransport>, tools: ToolRegistry, options: AgentOptions) -> Self {
        Self {
            transport,
            tools,
            persona: options.persona.unwrap_or_else(|| DEFAULT_PERSONA.to_string()),
            max_iterations: resolve_max_iterations(options.max_iterations),
            max_tool_result_bytes: options.max_tool_result_bytes,
        }
    }

    /// Register a tool, replacing any previous registration with the same name.
    pub fn add_tool(&mut self, tool: Box<dyn AgentTool>) {
        self.tools.register(tool);
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one exchange to completion, possibly spanning several model turns
    /// when tools are invoked.
    ///
    /// `history` is never mutated; the loop works on a local copy. The
    /// effective system prompt is computed fresh from (persona, catalogue,
    /// `context`) on every call and does not accumulate across runs.
    pub async fn run(
        &self,
        history: &[AgentMessage],
        llm_options: &LlmOptions,
        on_progress: Option<&OnProgress>,
        context: Option<&PageContext>,
        cancel: CancellationToken,
    ) -> Result<AgentResponse, AgentRunError> {
        let system_prompt = build_system_prompt(&self.persona, &self.tools, context);
        let mut effective_options = llm_options.clone();
        effective_options.system_prompt = Some(system_prompt);

        let mut messages: Vec<AgentMessage> = history.to_vec();
        let mut parser = StreamingToolParser::new();

        let mut iterations = 0usize;
        let mut last_response = String::new();
        let mut all_tool_calls: Vec<ToolCall> = Vec::new();
        let mut all_tool_results: Vec<ToolResult> = Vec::new();

        info!(
            transport = self.transport.name(),
            model = %effective_options.model,
            tools_count = self.tools.len(),
            max_iterations = self.max_iterations,
            "starting agent run"
        );

        while iterations < self.max_iterations {
            if cancel.is_cancelled() {
                return Ok(stopped_response(iterations, all_tool_calls, all_tool_results));
            }
            iterations += 1;
            parser.reset();

            let transport_messages = to_transport_messages(&messages);
            info!(
                iteration = iterations,
                messages_count = transport_messages.len(),
                "calling LLM (streaming)"
            );
            trace!(iteration = iterations, messages = ?transport_messages, "LLM request messages");

            let mut stream = match self.transport.stream(transport_messages, &effective_options) {
                Ok(stream) => stream,
                Err(TransportError::Cancelled) => {
                    return Ok(stopped_response(iterations, all_tool_calls, all_tool_results));
                },
                Err(e) => return Err(e.into()),
            };

            // Read chunks until the stream ends, racing each read against
            // cancellation so `stop` resolves a pending read promptly.
            loop {
                let raced = {
                    let next = stream.next_chunk();
                    tokio::pin!(next);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        chunk = &mut next => Some(chunk),
                    }
                };
                match raced {
                    None => {
                        stream.cancel().await;
                        return Ok(stopped_response(iterations, all_tool_calls, all_tool_results));
                    },
                    Some(None) => break,
                    Some(Some(Ok(chunk))) => {
                        parser.parse(&chunk);
                        if let Some(cb) = on_progress {
                            cb(AgentProgress {
                                message: parser.buffer().to_string(),
                                iterations,
                                finished: false,
                                tool_calls: all_tool_calls.clone(),
                                tool_results: all_tool_results.clone(),
                                planner_steps: parser.planner_steps().to_vec(),
                            });
                        }
                    },
                    Some(Some(Err(TransportError::Cancelled))) => {
                        return Ok(stopped_response(iterations, all_tool_calls, all_tool_results));
                    },
                    Some(Some(Err(e))) => {
                        stream.cancel().await;
                        return Err(e.into());
                    },
                }
            }

            let outcome = parser.finalize();
            let raw_response = parser.buffer().to_string();
            last_response = raw_response.clone();

            info!(
                iteration = iterations,
                response_len = raw_response.len(),
                tool_calls_count = outcome.tool_calls.len(),
                "streaming LLM response complete"
            );

            // No tool calls: the turn is final.
            if outcome.tool_calls.is_empty() {
                info!(
                    iterations,
                    tool_calls = all_tool_calls.len(),
                    "agent run complete — returning text"
                );
                return Ok(AgentResponse {
                    message: outcome
                        .display_message
                        .unwrap_or_else(|| raw_response.clone()),
                    tool_calls: all_tool_calls,
                    tool_results: all_tool_results,
                    iterations,
                    finished: true,
                });
            }

            let turn_calls = outcome.tool_calls;
            all_tool_calls.extend(turn_calls.iter().cloned());

            // Execute sequentially, in the order the model emitted the calls:
            // a call may depend on the side effect of the one before it.
            let mut turn_results: Vec<ToolResult> = Vec::with_capacity(turn_calls.len());
            for call in &turn_calls {
                if cancel.is_cancelled() {
                    return Ok(stopped_response(iterations, all_tool_calls, all_tool_results));
                }
                let result = self.tools.execute_call(call).await;
                parser.add_tool_result(&result.name, result.result.clone(), result.error.as_deref());
                turn_results.push(result);
            }

            // Append the assistant turn (raw buffer, tool-call JSON included)
            // and one tool message per result to the local history.
            messages.push(AgentMessage::assistant_with_tools(
                raw_response.clone(),
                turn_calls.clone(),
            ));
            for result in &turn_results {
                let content = match &result.error {
                    Some(e) => format!("Tool \"{}\" failed: {}", result.name, e),
                    None => {
                        let value = result.result.clone().unwrap_or(serde_json::Value::Null);
                        let encoded =
                            serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string());
                        truncate_tool_result(&encoded, self.max_tool_result_bytes)
                    },
                };
                debug!(
                    tool = %result.name,
                    id = %result.id,
                    result_len = content.len(),
                    "appending tool result to messages"
                );
                messages.push(AgentMessage::tool(result.id.clone(), content));
            }
            all_tool_results.extend(turn_results);

            if let Some(cb) = on_progress {
                cb(AgentProgress {
                    message: raw_response,
                    iterations,
                    finished: false,
                    tool_calls: all_tool_calls.clone(),
                    tool_results: all_tool_results.clone(),
                    planner_steps: parser.planner_steps().to_vec(),
                });
            }
        }

        // Budget exhausted with tool calls still flowing; the caller decides
        // whether to continue or surface a limit warning.
        warn!(
            iterations,
            max_iterations = self.max_iterations,
            "agent run hit max iterations"
        );
        Ok(AgentResponse {
            message: last_response,
            tool_calls: all_tool_calls,
            tool_results: all_tool_results,
            iterations,
            finished: false,
        })
    }
}

fn stopped_response(
    iterations: usize,
    tool_calls: Vec<ToolCall>,
    tool_results: Vec<ToolResult>,
) -> AgentResponse {
    info!(iterations, "agent run stopped by user");
    AgentResponse {
        message: STOPPED_MESSAGE.to_string(),
        tool_calls,
        tool_results,
        iterations,
        finished: true,
    }
}

/// Truncate a tool result to `max_bytes` at a char boundary, appending a
/// truncation marker, before it is fed back to the model.
pub fn truncate_tool_result(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }
    let original_len = input.len();
    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    let mut result = input[..end].to_string();
    let _ = write!(result, "\n\n[truncated — {original_len} bytes total]");
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use {anyhow::Result, async_trait::async_trait};

    use {
        super::*,
        crate::model::{ChunkStream, Role, TransportMessage},
    };

    // ── Mock transports ──────────────────────────────────────────────

    /// Transport that plays back scripted chunk sequences, one per call,
    /// and records the messages it received for later assertions.
    struct ScriptedTransport {
        turns: Vec<Vec<&'static str>>,
        calls: AtomicUsize,
        received: Mutex<Vec<Vec<TransportMessage>>>,
    }

    impl ScriptedTransport {
        fn new(turns: Vec<Vec<&'static str>>) -> Self {
            Self {
                turns,
                calls: AtomicUsize::new(0),
                received: Mutex::new(Vec::new()),
            }
        }
    }

    impl LlmTransport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        fn stream(
            &self,
            messages: Vec<TransportMessage>,
            _options: &LlmOptions,
        ) -> Result<Box<dyn ChunkStream>, TransportError> {
            self.received.lock().unwrap().push(messages);
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            let chunks = self
                .turns
                .get(idx)
                .map(|turn| turn.iter().map(|s| s.to_string()).collect())
                .unwrap_or_default();
            Ok(Box::new(ScriptedStream { chunks }))
        }
    }

    struct ScriptedStream {
        chunks: VecDeque<String>,
    }

    #[async_trait]
    impl ChunkStream for ScriptedStream {
        async fn next_chunk(&mut self) -> Option<Result<String, TransportError>> {
            self.chunks.pop_front().map(Ok)
        }

        async fn cancel(&mut self) {}
    }

    /// Transport whose stream never produces a chunk; counts cancels.
    struct HangingTransport {
        cancel_count: Arc<AtomicUsize>,
    }

    impl LlmTransport for HangingTransport {
        fn name(&self) -> &str {
            "hanging"
        }

        fn stream(
            &self,
            _messages: Vec<TransportMessage>,
            _options: &LlmOptions,
        ) -> Result<Box<dyn ChunkStream>, TransportError> {
            Ok(Box::new(HangingStream {
                cancel_count: Arc::clone(&self.cancel_count),
            }))
        }
    }

    struct HangingStream {
        cancel_count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChunkStream for HangingStream {
        async fn next_chunk(&mut self) -> Option<Result<String, TransportError>> {
            std::future::pending().await
        }

        async fn cancel(&mut self) {
            self.cancel_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Transport whose stream fails partway through.
    struct FailingTransport;

    impl LlmTransport for FailingTransport {
        fn name(&self) -> &str {
            "failing"
        }

        fn stream(
            &self,
            _messages: Vec<TransportMessage>,
            _options: &LlmOptions,
        ) -> Result<Box<dyn ChunkStream>, TransportError> {
            Ok(Box::new(FailingStream { sent: false }))
        }
    }

    struct FailingStream {
        sent: bool,
    }

    #[async_trait]
    impl ChunkStream for FailingStream {
        async fn next_chunk(&mut self) -> Option<Result<String, TransportError>> {
            if self.sent {
                Some(Err(TransportError::Other(anyhow::anyhow!(
                    "connection reset"
                ))))
            } else {
                self.sent = true;
                Some(Ok("partial".to_string()))
            }
        }

        async fn cancel(&mut self) {}
    }

    // ── Mock tools ───────────────────────────────────────────────────

    struct EchoTool {
        reply: serde_json::Value,
    }

    #[async_trait]
    impl AgentTool for EchoTool {
        fn name(&self) -> &str {
            "searchGoogle"
        }

        fn description(&self) -> &str {
            "Search Google for a query"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" }
                },
                "required": ["query"]
            })
        }

        async fn execute(&self, _params: serde_json::Value) -> Result<serde_json::Value> {
            Ok(self.reply.clone())
        }
    }

    /// Records its execution in a shared log; used for ordering assertions.
    struct RecordingTool {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        /// When set, fail unless this entry is already in the log.
        requires: Option<&'static str>,
    }

    #[async_trait]
    impl AgentTool for RecordingTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "recording test tool"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }

        async fn execute(&self, _params: serde_json::Value) -> Result<serde_json::Value> {
            // Yield so an accidentally-concurrent sibling could overtake us.
            tokio::task::yield_now().await;
            if let Some(dep) = self.requires {
                let log = self.log.lock().unwrap();
                if !log.iter().any(|entry| entry == dep) {
                    anyhow::bail!("dependency {dep} has not run yet");
                }
            }
            self.log.lock().unwrap().push(self.name.to_string());
            Ok(serde_json::json!({ "ran": self.name }))
        }
    }

    fn agent_with(
        transport: Arc<dyn LlmTransport>,
        tools: Vec<Box<dyn AgentTool>>,
        max_iterations: usize,
    ) -> Agent {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        Agent::new(transport, registry, AgentOptions {
            max_iterations,
            ..Default::default()
        })
    }

    const SEARCH_BLOCK: &str = "```tool_code\n{\"tool_calls\": [{\"name\": \"searchGoogle\", \"arguments\": {\"query\": \"cats\"}}]}\n```";

    // ── Tests ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn plain_text_turn_resolves_in_one_iteration() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![
            "The ans", "wer is ", "4.",
        ]]));
        let agent = agent_with(transport, vec![], 10);
        let history = vec![AgentMessage::user("What's 2+2?")];
        let response = agent
            .run(
                &history,
                &LlmOptions::default(),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.message, "The answer is 4.");
        assert!(response.tool_calls.is_empty());
        assert!(response.tool_results.is_empty());
        assert_eq!(response.iterations, 1);
        assert!(response.finished);
    }

    #[tokio::test]
    async fn tool_call_feeds_result_back_into_history() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            vec![SEARCH_BLOCK],
            vec!["Cats are great."],
        ]));
        let agent = agent_with(
            Arc::clone(&transport) as Arc<dyn LlmTransport>,
            vec![Box::new(EchoTool {
                reply: serde_json::json!("ok"),
            })],
            10,
        );
        let history = vec![AgentMessage::user("search cats")];
        let response = agent
            .run(
                &history,
                &LlmOptions::default(),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.message, "Cats are great.");
        assert_eq!(response.iterations, 2);
        assert!(response.finished);
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].name, "searchGoogle");
        assert_eq!(response.tool_results.len(), 1);
        assert_eq!(response.tool_results[0].result, Some(serde_json::json!("ok")));

        // The second transport call sees: user, assistant (raw buffer with
        // the tool-call JSON), and the tool result message, in that order.
        let received = transport.received.lock().unwrap();
        assert_eq!(received.len(), 2);
        let second = &received[1];
        assert_eq!(second.len(), 3);
        assert_eq!(second[0].role, Role::User);
        assert_eq!(second[1].role, Role::Assistant);
        assert!(second[1].content.contains("```tool_code"));
        assert_eq!(second[1].tool_calls.len(), 1);
        assert_eq!(second[2].role, Role::Tool);
        assert_eq!(second[2].content, "\"ok\"");
        assert_eq!(
            second[2].tool_call_id.as_deref(),
            Some(second[1].tool_calls[0].id.as_str())
        );
    }

    #[tokio::test]
    async fn caller_history_is_not_mutated() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            vec![SEARCH_BLOCK],
            vec!["done"],
        ]));
        let agent = agent_with(
            transport,
            vec![Box::new(EchoTool {
                reply: serde_json::json!("ok"),
            })],
            10,
        );
        let history = vec![AgentMessage::user("search cats")];
        agent
            .run(
                &history,
                &LlmOptions::default(),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn same_block_calls_execute_sequentially_in_order() {
        let block = "```tool_code\n{\"tool_calls\": [{\"name\": \"prepare\"}, {\"name\": \"consume\"}]}\n```";
        let transport = Arc::new(ScriptedTransport::new(vec![vec![block], vec!["done"]]));
        let log = Arc::new(Mutex::new(Vec::new()));
        let agent = agent_with(
            transport,
            vec![
                Box::new(RecordingTool {
                    name: "prepare",
                    log: Arc::clone(&log),
                    requires: None,
                }),
                Box::new(RecordingTool {
                    name: "consume",
                    log: Arc::clone(&log),
                    requires: Some("prepare"),
                }),
            ],
            10,
        );
        let response = agent
            .run(
                &[AgentMessage::user("go")],
                &LlmOptions::default(),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(response.tool_results.iter().all(|r| r.error.is_none()));
        assert_eq!(*log.lock().unwrap(), vec!["prepare", "consume"]);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_error_result_and_feedback() {
        let block = "```tool_code\n{\"tool_calls\": [{\"name\": \"doesNotExist\"}]}\n```";
        let transport = Arc::new(ScriptedTransport::new(vec![
            vec![block],
            vec!["I don't have that tool."],
        ]));
        let agent = agent_with(
            Arc::clone(&transport) as Arc<dyn LlmTransport>,
            vec![],
            10,
        );
        let response = agent
            .run(
                &[AgentMessage::user("go")],
                &LlmOptions::default(),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(response.finished);
        assert_eq!(
            response.tool_results[0].error.as_deref(),
            Some("Tool \"doesNotExist\" not found")
        );

        let received = transport.received.lock().unwrap();
        let tool_msg = &received[1][2];
        assert_eq!(
            tool_msg.content,
            "Tool \"doesNotExist\" failed: Tool \"doesNotExist\" not found"
        );
    }

    #[tokio::test]
    async fn handler_error_does_not_abort_siblings_or_run() {
        struct BoomTool;

        #[async_trait]
        impl AgentTool for BoomTool {
            fn name(&self) -> &str {
                "boom"
            }

            fn description(&self) -> &str {
                "always fails"
            }

            fn parameters_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object", "properties": {}})
            }

            async fn execute(&self, _params: serde_json::Value) -> Result<serde_json::Value> {
                anyhow::bail!("element not found")
            }
        }

        let block =
            "```tool_code\n{\"tool_calls\": [{\"name\": \"boom\"}, {\"name\": \"searchGoogle\"}]}\n```";
        let transport = Arc::new(ScriptedTransport::new(vec![vec![block], vec!["done"]]));
        let agent = agent_with(
            transport,
            vec![
                Box::new(BoomTool),
                Box::new(EchoTool {
                    reply: serde_json::json!("ok"),
                }),
            ],
            10,
        );
        let response = agent
            .run(
                &[AgentMessage::user("go")],
                &LlmOptions::default(),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(response.finished);
        assert_eq!(response.tool_results.len(), 2);
        assert_eq!(response.tool_results[0].error.as_deref(), Some("element not found"));
        assert!(response.tool_results[1].error.is_none());
    }

    #[tokio::test]
    async fn max_iterations_exhaustion_returns_raw_message_unfinished() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![SEARCH_BLOCK]]));
        let agent = agent_with(
            Arc::clone(&transport) as Arc<dyn LlmTransport>,
            vec![Box::new(EchoTool {
                reply: serde_json::json!("ok"),
            })],
            1,
        );
        let response = agent
            .run(
                &[AgentMessage::user("go")],
                &LlmOptions::default(),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(!response.finished);
        assert_eq!(response.iterations, 1);
        // The last raw message, not the display-cleaned one.
        assert!(response.message.contains("```tool_code"));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_results.len(), 1);
        // The one allowed iteration ran its tool; no second LLM call happened.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_while_chunk_read_pending_resolves_with_one_cancel() {
        let cancel_count = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(HangingTransport {
            cancel_count: Arc::clone(&cancel_count),
        });
        let agent = Arc::new(agent_with(transport, vec![], 10));
        let cancel = CancellationToken::new();

        let run_agent = Arc::clone(&agent);
        let run_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run_agent
                .run(
                    &[AgentMessage::user("hang")],
                    &LlmOptions::default(),
                    None,
                    None,
                    run_cancel,
                )
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel.cancel();
        let response = handle.await.unwrap().unwrap();

        assert!(response.finished);
        assert_eq!(response.message, STOPPED_MESSAGE);
        assert_eq!(response.iterations, 1);
        assert_eq!(cancel_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pre_cancelled_token_stops_before_first_llm_call() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec!["never sent"]]));
        let agent = agent_with(Arc::clone(&transport) as Arc<dyn LlmTransport>, vec![], 10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let response = agent
            .run(
                &[AgentMessage::user("hi")],
                &LlmOptions::default(),
                None,
                None,
                cancel,
            )
            .await
            .unwrap();

        assert!(response.finished);
        assert_eq!(response.message, STOPPED_MESSAGE);
        assert_eq!(response.iterations, 0);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let agent = agent_with(Arc::new(FailingTransport), vec![], 10);
        let err = agent
            .run(
                &[AgentMessage::user("hi")],
                &LlmOptions::default(),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AgentRunError::Transport(_)));
    }

    #[tokio::test]
    async fn progress_receives_growing_buffer_per_chunk() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec![
            "The ans", "wer is ", "4.",
        ]]));
        let agent = agent_with(transport, vec![], 10);

        let snapshots: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);
        let on_progress: OnProgress = Box::new(move |progress| {
            sink.lock().unwrap().push(progress.message);
        });

        agent
            .run(
                &[AgentMessage::user("What's 2+2?")],
                &LlmOptions::default(),
                Some(&on_progress),
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let snapshots = snapshots.lock().unwrap();
        assert_eq!(
            *snapshots,
            vec![
                "The ans".to_string(),
                "The answer is ".to_string(),
                "The answer is 4.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn progress_reports_planner_steps_for_tool_turns() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            vec!["Searching.\n", SEARCH_BLOCK],
            vec!["done"],
        ]));
        let agent = agent_with(
            transport,
            vec![Box::new(EchoTool {
                reply: serde_json::json!("ok"),
            })],
            10,
        );

        let batches: Arc<Mutex<Vec<AgentProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        let on_progress: OnProgress = Box::new(move |progress| {
            sink.lock().unwrap().push(progress);
        });

        agent
            .run(
                &[AgentMessage::user("search cats")],
                &LlmOptions::default(),
                Some(&on_progress),
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let batches = batches.lock().unwrap();
        // The batch snapshot after tool execution carries calls and results.
        let batch = batches
            .iter()
            .find(|p| !p.tool_results.is_empty())
            .expect("expected a post-execution progress snapshot");
        assert_eq!(batch.tool_calls.len(), 1);
        assert_eq!(batch.tool_results.len(), 1);
        assert!(
            batch
                .planner_steps
                .iter()
                .any(|s| s.content == "Completed searchGoogle")
        );
    }

    #[tokio::test]
    async fn final_message_is_display_cleaned() {
        let transport = Arc::new(ScriptedTransport::new(vec![vec!["  Done!  \n"]]));
        let agent = agent_with(transport, vec![], 10);
        let response = agent
            .run(
                &[AgentMessage::user("hi")],
                &LlmOptions::default(),
                None,
                None,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.message, "Done!");
    }

    #[test]
    fn resolve_max_iterations_falls_back_for_zero() {
        assert_eq!(resolve_max_iterations(0), DEFAULT_AGENT_MAX_ITERATIONS);
        assert_eq!(resolve_max_iterations(3), 3);
    }

    #[test]
    fn options_derive_from_config() {
        let mut config = sidekick_config::SidekickConfig::default();
        config.agent.max_iterations = 25;
        config.agent.system_prompt = Some("You are a test persona.".into());
        config.tools.max_tool_result_bytes = 1024;

        let options = AgentOptions::from_config(&config);
        assert_eq!(options.max_iterations, 25);
        assert_eq!(options.persona.as_deref(), Some("You are a test persona."));
        assert_eq!(options.max_tool_result_bytes, 1024);

        config.agent.max_iterations = 0;
        let options = AgentOptions::from_config(&config);
        assert_eq!(options.max_iterations, DEFAULT_AGENT_MAX_ITERATIONS);
    }

    #[test]
    fn truncate_tool_result_is_noop_under_limit() {
        assert_eq!(truncate_tool_result("short", 100), "short");
    }

    #[test]
    fn truncate_tool_result_cuts_at_char_boundary() {
        let input = "héllo wörld, this is a long tool result";
        let truncated = truncate_tool_result(input, 8);
        assert!(truncated.starts_with("héllo w"));
        assert!(truncated.contains("[truncated"));
        assert!(truncated.contains(&format!("{} bytes total", input.len())));
    }
}
