//! Incremental recognition of tool-call blocks in streamed model output.
//!
//! The model invokes tools by emitting a fenced code block tagged
//! `tool_code` whose body is a JSON object with a `tool_calls` array. The
//! parser consumes arbitrarily-sized text chunks as they arrive and must
//! recognize a block even when a chunk boundary splits the fence marker or
//! the JSON, so detection only ever depends on the accumulated buffer, never
//! on where the chunks were cut.
//!
//! Alongside extraction, the parser keeps a chronological list of
//! [`PlannerStep`]s for live progress display: prose accumulates into
//! `thinking` steps, a recognized call opens a `tool_execution` step, and
//! [`StreamingToolParser::add_tool_result`] closes it once the orchestrator
//! has run the tool.

use {
    serde::Serialize,
    tracing::{debug, warn},
};

use crate::model::ToolCall;

/// Opening fence tag for a tool-call block.
const OPENING_TAG: &str = "```tool_code";
/// Closing fence, searched inside block content.
const CLOSING_MARKER: &str = "\n```";

/// Kind of a progress record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerStepKind {
    Thinking,
    ToolExecution,
    ToolResult,
}

/// One unit of agent progress, rendered by the UI as a live activity panel.
///
/// Steps live in an owned arena and are mutated by index, which keeps the
/// whole list serializable for auditing.
#[derive(Debug, Clone, Serialize)]
pub struct PlannerStep {
    pub id: String,
    pub kind: PlannerStepKind,
    pub content: String,
    pub timestamp_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_result: Option<serde_json::Value>,
    pub is_completed: bool,
}

/// Result of one `parse` or `finalize` call.
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    /// For `parse`: calls completed by this chunk. For `finalize`: every
    /// call completed across the whole turn.
    pub tool_calls: Vec<ToolCall>,
    /// True when a block was completed by this call (always true at finalize).
    pub is_complete: bool,
    /// True while inside a block or when one was just completed.
    pub has_tool_block: bool,
    /// Only set by `finalize`: the full buffer minus all tool-call blocks.
    pub display_message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum ParserState {
    /// Looking for the opening fence.
    Scanning,
    /// Collecting block content; `content_start` is the buffer index just
    /// past the opening fence's newline.
    InBlock { content_start: usize },
}

/// Streaming parser for tool-call blocks.
///
/// Reset at the start of every loop iteration and fed each chunk as it
/// arrives; `finalize` is called once the stream ends.
pub struct StreamingToolParser {
    buffer: String,
    state: ParserState,
    /// Buffer cursor: everything before it has been narrated or consumed by
    /// a completed block, so scanning never re-reads it.
    processed_len: usize,
    completed_tool_calls: Vec<ToolCall>,
    steps: Vec<PlannerStep>,
    /// Index of the thinking step currently accumulating text, if any.
    open_thinking: Option<usize>,
}

impl Default for StreamingToolParser {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingToolParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            state: ParserState::Scanning,
            processed_len: 0,
            completed_tool_calls: Vec::new(),
            steps: Vec::new(),
            open_thinking: None,
        }
    }

    /// Clear all state for reuse in the next loop iteration.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Feed the next chunk of streamed text.
    pub fn parse(&mut self, chunk: &str) -> ParseOutcome {
        self.buffer.push_str(chunk);
        let (tool_calls, completed_block) = self.advance();
        ParseOutcome {
            has_tool_block: completed_block || matches!(self.state, ParserState::InBlock { .. }),
            is_complete: completed_block,
            tool_calls,
            display_message: None,
        }
    }

    /// Finish the turn after the stream has ended.
    ///
    /// If the stream was cut off inside a block, the remaining content is
    /// parsed as if the closing fence had just arrived (best-effort
    /// recovery). Any trailing prose becomes a final thinking step.
    pub fn finalize(&mut self) -> ParseOutcome {
        let was_in_block = matches!(self.state, ParserState::InBlock { .. });
        if let ParserState::InBlock { content_start } = self.state {
            let block_json = self.buffer[content_start..].to_string();
            self.complete_block(&block_json);
            self.state = ParserState::Scanning;
            self.processed_len = self.buffer.len();
        } else {
            self.flush_trailing();
        }
        ParseOutcome {
            tool_calls: self.completed_tool_calls.clone(),
            is_complete: true,
            has_tool_block: was_in_block || !self.completed_tool_calls.is_empty(),
            display_message: Some(self.display_message()),
        }
    }

    /// Record the outcome of a tool execution: marks the most recent
    /// uncompleted `tool_execution` step with a matching name completed and
    /// appends an independent `tool_result` step.
    pub fn add_tool_result(
        &mut self,
        tool_name: &str,
        result: Option<serde_json::Value>,
        error: Option<&str>,
    ) {
        let content = match error {
            Some(e) => format!("Error: {e}"),
            None => format!("Completed {tool_name}"),
        };
        self.close_thinking();
        self.push_step(
            PlannerStepKind::ToolResult,
            content,
            Some(tool_name.to_string()),
            true,
        );

        if let Some(idx) = self.steps.iter().rposition(|s| {
            s.kind == PlannerStepKind::ToolExecution
                && s.tool_name.as_deref() == Some(tool_name)
                && !s.is_completed
        }) {
            let step = &mut self.steps[idx];
            step.is_completed = true;
            step.tool_result = result;
        } else {
            debug!(tool = tool_name, "no pending tool_execution step to complete");
        }
    }

    /// Full raw text accumulated this turn.
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Whether the parser is currently inside a tool block.
    pub fn in_tool_block(&self) -> bool {
        matches!(self.state, ParserState::InBlock { .. })
    }

    pub fn planner_steps(&self) -> &[PlannerStep] {
        &self.steps
    }

    pub fn completed_tool_calls(&self) -> &[ToolCall] {
        &self.completed_tool_calls
    }

    /// The user-visible assistant text: the buffer with every tool-call
    /// block removed (an unterminated trailing block is dropped too) and
    /// surrounding whitespace trimmed.
    pub fn display_message(&self) -> String {
        let mut out = String::with_capacity(self.buffer.len());
        let mut pos = 0;
        while let Some((start, content_start)) = find_opening_marker(&self.buffer, pos) {
            out.push_str(&self.buffer[pos..start]);
            match self.buffer[content_start..].find(CLOSING_MARKER) {
                Some(rel) => pos = content_start + rel + CLOSING_MARKER.len(),
                None => {
                    pos = self.buffer.len();
                    break;
                },
            }
        }
        out.push_str(&self.buffer[pos..]);
        out.trim().to_string()
    }

    // ── State machine ────────────────────────────────────────────────

    /// Drive the state machine over the unprocessed tail of the buffer until
    /// no further transition is possible. Returns the calls completed and
    /// whether any block closed.
    fn advance(&mut self) -> (Vec<ToolCall>, bool) {
        let mut newly = Vec::new();
        let mut completed_block = false;
        loop {
            match self.state {
                ParserState::Scanning => {
                    let Some((start, content_start)) = self.find_opening() else {
                        self.flush_narration();
                        break;
                    };
                    if start > self.processed_len {
                        let pending = self.buffer[self.processed_len..start].to_string();
                        self.append_thinking(&pending);
                    }
                    self.close_thinking();
                    self.state = ParserState::InBlock { content_start };
                    self.processed_len = content_start;
                },
                ParserState::InBlock { content_start } => {
                    let Some(rel) = self.buffer[content_start..].find(CLOSING_MARKER) else {
                        break;
                    };
                    let json_end = content_start + rel;
                    let block_json = self.buffer[content_start..json_end].to_string();
                    newly.extend(self.complete_block(&block_json));
                    completed_block = true;
                    self.state = ParserState::Scanning;
                    self.processed_len = json_end + CLOSING_MARKER.len();
                },
            }
        }
        (newly, completed_block)
    }

    /// Find a complete opening marker at or after the processed cursor. A
    /// marker whose newline has not arrived yet is not a match;
    /// `holdback_point` keeps it out of the narration until it resolves
    /// either way.
    fn find_opening(&self) -> Option<(usize, usize)> {
        find_opening_marker(&self.buffer, self.processed_len)
    }

    /// Close a block: parse its JSON body, record an uncompleted
    /// `tool_execution` step per recognized call, and accumulate the calls.
    fn complete_block(&mut self, block_json: &str) -> Vec<ToolCall> {
        let calls = parse_tool_calls(block_json);
        for call in &calls {
            self.push_step(
                PlannerStepKind::ToolExecution,
                format!("Executing {}", call.name),
                Some(call.name.clone()),
                false,
            );
        }
        self.completed_tool_calls.extend(calls.iter().cloned());
        calls
    }

    // ── Narration ────────────────────────────────────────────────────

    /// Append newly-arrived prose to the live thinking step, withholding any
    /// buffer suffix that could still turn out to be an opening fence.
    fn flush_narration(&mut self) {
        let hold = self.holdback_point();
        if hold > self.processed_len {
            let pending = self.buffer[self.processed_len..hold].to_string();
            self.append_thinking(&pending);
            self.processed_len = hold;
        }
    }

    /// Flush everything left in the buffer as narration; the stream is over,
    /// so a partial fence is just text.
    fn flush_trailing(&mut self) {
        if self.processed_len < self.buffer.len() {
            let pending = self.buffer[self.processed_len..].to_string();
            self.append_thinking(&pending);
            self.processed_len = self.buffer.len();
        }
        self.close_thinking();
    }

    /// Earliest unprocessed position whose suffix is a partial opening
    /// marker, or the buffer end when there is none.
    fn holdback_point(&self) -> usize {
        let bytes = self.buffer.as_bytes();
        for p in self.processed_len..self.buffer.len() {
            if bytes[p] == b'`' && is_partial_opening(&self.buffer[p..]) {
                return p;
            }
        }
        self.buffer.len()
    }

    fn append_thinking(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(idx) = self.open_thinking {
            self.steps[idx].content.push_str(text);
        } else if !text.trim().is_empty() {
            let idx = self.push_step(
                PlannerStepKind::Thinking,
                text.trim_start().to_string(),
                None,
                true,
            );
            self.open_thinking = Some(idx);
        }
    }

    /// Seal the accumulating thinking step: trim it, dropping it entirely if
    /// only whitespace remains. The open step is always the most recent one.
    fn close_thinking(&mut self) {
        if let Some(idx) = self.open_thinking.take() {
            let content = self.steps[idx].content.trim().to_string();
            if content.is_empty() {
                self.steps.pop();
            } else {
                self.steps[idx].content = content;
            }
        }
    }

    fn push_step(
        &mut self,
        kind: PlannerStepKind,
        content: String,
        tool_name: Option<String>,
        is_completed: bool,
    ) -> usize {
        self.steps.push(PlannerStep {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            content,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            tool_name,
            tool_result: None,
            is_completed,
        });
        self.steps.len() - 1
    }
}

/// Find a complete opening marker (fence tag, optional spaces, newline) in
/// `text` at or after `from`. Returns (marker start, content start). A fence
/// tag followed by anything other than whitespace-then-newline is plain text.
fn find_opening_marker(text: &str, from: usize) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut from = from;
    while let Some(rel) = text[from..].find(OPENING_TAG) {
        let start = from + rel;
        let mut cursor = start + OPENING_TAG.len();
        while cursor < bytes.len() && matches!(bytes[cursor], b' ' | b'\t' | b'\r') {
            cursor += 1;
        }
        if cursor >= bytes.len() {
            // Tag at the end of the text; the newline may still arrive in a
            // later chunk.
            return None;
        }
        if bytes[cursor] == b'\n' {
            return Some((start, cursor + 1));
        }
        from = start + 1;
    }
    None
}

/// True when `tail` could still grow into a complete opening marker.
fn is_partial_opening(tail: &str) -> bool {
    if tail.len() < OPENING_TAG.len() {
        OPENING_TAG.starts_with(tail)
    } else if let Some(rest) = tail.strip_prefix(OPENING_TAG) {
        rest.bytes().all(|b| matches!(b, b' ' | b'\t' | b'\r'))
    } else {
        false
    }
}

/// Parse the JSON body of a completed block into tool calls.
///
/// A malformed body or a missing `tool_calls` array yields zero calls; the
/// stream continues as if the block were plain text. A call with no `name`
/// gets an empty name (it will fail registry lookup later, which feeds the
/// error back to the model); absent or null `arguments` default to `{}`.
fn parse_tool_calls(block_json: &str) -> Vec<ToolCall> {
    let trimmed = block_json.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let parsed: serde_json::Value = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to parse tool call JSON, treating block as text");
            return Vec::new();
        },
    };
    let Some(entries) = parsed.get("tool_calls").and_then(|v| v.as_array()) else {
        debug!("tool block JSON has no tool_calls array");
        return Vec::new();
    };
    entries
        .iter()
        .map(|entry| ToolCall {
            id: uuid::Uuid::new_v4().to_string(),
            name: entry
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            arguments: match entry.get("arguments") {
                None | Some(serde_json::Value::Null) => serde_json::json!({}),
                Some(v) => v.clone(),
            },
        })
        .collect()
}
