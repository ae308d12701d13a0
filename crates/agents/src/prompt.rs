//! System prompt assembly for an agent run.
//!
//! The effective prompt is a pure function of (base persona, tool catalogue,
//! optional page context) and is computed fresh on every run; nothing here
//! mutates agent state. The invocation convention embedded in
//! [`TOOL_CALL_GUIDANCE`] is a contract with the streaming parser: the fence
//! tag and JSON shape must stay in sync with what it recognizes.

use crate::tool_registry::ToolRegistry;

/// Built-in persona used when the config does not override it.
pub const DEFAULT_PERSONA: &str = concat!(
    "# SIDEKICK AGENT\n\n",
    "You are Sidekick, an AI assistant that helps the user browse the web. ",
    "You answer questions and perform actions on websites using the tools ",
    "available to you: navigating to URLs, clicking elements, filling forms, ",
    "reading page content, and managing tabs.\n\n",
    "## Guidelines\n\n",
    "- Answer directly when no browser interaction is needed.\n",
    "- To answer questions about the current page, fetch its content with ",
    "`getPageContent` first instead of guessing.\n",
    "- For multi-step tasks, chain the necessary tools in a single response ",
    "by listing several entries in the `tool_calls` array; they are executed ",
    "in order.\n",
    "- After your tools run, their results are returned to you as tool ",
    "messages. Use them to decide the next step or compose the final answer.\n",
    "- Be careful with destructive actions; ask the user before submitting ",
    "forms on their behalf.\n",
);

/// Invocation convention appended after the tool catalogue.
///
/// Must match the streaming parser exactly: a fenced block tagged
/// `tool_code` containing a JSON object with a `tool_calls` array.
const TOOL_CALL_GUIDANCE: &str = concat!(
    "To use a tool, respond with a JSON object inside a markdown code block ",
    "with the language set to \"tool_code\". The JSON object must contain a ",
    "\"tool_calls\" array with each tool call having a \"name\" and ",
    "\"arguments\".\n\n",
    "For example, to use a tool named \"search\" with a \"query\" argument, ",
    "you would respond with:\n",
    "```tool_code\n",
    "{\n",
    "  \"tool_calls\": [\n",
    "    {\n",
    "      \"name\": \"search\",\n",
    "      \"arguments\": {\n",
    "        \"query\": \"latest AI news\"\n",
    "      }\n",
    "    }\n",
    "  ]\n",
    "}\n",
    "```\n",
);

/// Metadata about the page the user is currently on, supplied per run.
#[derive(Debug, Clone)]
pub struct PageContext {
    pub tab_id: i64,
    pub title: String,
    pub url: String,
}

/// Build the effective system prompt for one run.
///
/// The catalogue section is omitted entirely when no tools are registered,
/// so a bare conversational agent gets a plain persona prompt.
pub fn build_system_prompt(
    persona: &str,
    tools: &ToolRegistry,
    context: Option<&PageContext>,
) -> String {
    let mut prompt = String::from(persona);

    if !tools.is_empty() {
        let catalogue = serde_json::to_string_pretty(&tools.list_schemas())
            .unwrap_or_else(|_| "[]".to_string());
        prompt.push_str(
            "\nYou have access to the following tools. Use them to answer the user's questions.\n\n",
        );
        prompt.push_str("<tools>\n");
        prompt.push_str(&catalogue);
        prompt.push_str("\n</tools>\n\n");
        prompt.push_str(TOOL_CALL_GUIDANCE);
    }

    if let Some(ctx) = context {
        prompt.push_str(&format!(
            "\n## CURRENT PAGE CONTEXT\n\nYou are currently on tab ID {}, titled \"{}\" ({})\n",
            ctx.tab_id, ctx.title, ctx.url
        ));
    }

    prompt
}
