//! Agent runtime for the sidekick browser assistant: streaming tool-call
//! parsing, the tool-use loop, the tool registry, and prompt assembly.

pub mod model;
pub mod parser;
pub mod prompt;
pub mod runner;
pub mod tool_registry;

pub use {
    model::{
        AgentMessage, AgentResponse, Attachment, ChunkStream, LlmOptions, LlmTransport, Role,
        ToolCall, ToolResult, TransportError, TransportMessage,
    },
    parser::{ParseOutcome, PlannerStep, PlannerStepKind, StreamingToolParser},
    prompt::PageContext,
    runner::{Agent, AgentOptions, AgentProgress, AgentRunError, OnProgress},
    tool_registry::{AgentTool, ToolRegistry},
};
