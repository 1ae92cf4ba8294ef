//! System-prompt assembly.
//!
//! An agent's system prompt is rendered from its template by substituting
//! placeholder tokens with the live tool, sub-agent, and provider rosters.
//! Unknown placeholders are left verbatim. Whatever the template says, the
//! rendered prompt is guaranteed to carry the JSON return-format block so
//! every reply stays machine-parseable.

use crate::agent::Agent;
use crate::llm::list_providers;

/// Default template for interactively created agents. Placeholder tokens are
/// substituted by [`render_system_prompt`].
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"You are {name}, an autonomous assistant running on the user's computer.
You complete tasks with the tools available to you, and you delegate to
sub-agents where one was specifically created for the task at hand.

{tools}

{subagents}

{llms}

Only call tools listed in {available_tools}. Work step by step: call one
tool, inspect its result, then decide the next step or answer.

{return_format}"#;

/// The required output-format block. The literal `json` substring doubles as
/// the marker checked by [`render_system_prompt`].
pub const JSON_RETURN_FORMAT: &str = r#"Always reply with exactly one json object, in one of these shapes:
{"type": "function_call", "function": "<tool name>", "arguments": [<positional arguments>]}
{"type": "final_answer", "result": <your answer>}
No prose outside the object."#;

/// Render the live system prompt for `agent`. Substitutes the placeholder
/// tokens and appends [`JSON_RETURN_FORMAT`] when the rendered text carries
/// no JSON-format instructions of its own. Always produces a string.
pub async fn render_system_prompt(agent: &Agent) -> String {
    let mut subagents = String::from("Available Subagents:\n");
    for child in &agent.sub_agents {
        let child = child.lock().await;
        if let Some(task) = &child.task {
            subagents.push_str(&format!("-- {}: {}\n", child.name, task.description));
        }
    }
    subagents.push_str(
        "You should always use a subagent for a task if there is one specifically created for that task.",
    );

    let available = serde_json::to_string(&agent.available_tools()).unwrap_or_else(|_| "[]".into());

    render_template(
        &agent.prompt_template,
        &agent.name,
        &tools_block(agent),
        &subagents,
        &available,
        &providers_block(),
    )
}

fn tools_block(agent: &Agent) -> String {
    let mut block = String::from("Available Tools:\n");
    for tool in &agent.tools {
        block.push_str(&format!("{}: {}\n", tool.name(), tool.description()));
    }
    block
}

fn providers_block() -> String {
    format!(
        "Available LLM Platforms:\n{}\nChoose one for each subagent.",
        list_providers().join(", ")
    )
}

/// Pure substitution step, split out so rendering is testable without a live
/// agent. Appends the return-format block when `json` is absent from the
/// substituted text.
pub fn render_template(
    template: &str,
    name: &str,
    tools: &str,
    subagents: &str,
    available_tools: &str,
    llms: &str,
) -> String {
    let mut prompt = template
        .replace("{name}", name)
        .replace("{tools}", tools)
        .replace("{subagents}", subagents)
        .replace("{available_tools}", available_tools)
        .replace("{llms}", llms)
        .replace("{return_format}", JSON_RETURN_FORMAT);

    if !prompt.contains("json") {
        prompt.push('\n');
        prompt.push_str(JSON_RETURN_FORMAT);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_every_placeholder() {
        let rendered = render_template(
            DEFAULT_PROMPT_TEMPLATE,
            "Avatar",
            "Available Tools:\necho: echoes\n",
            "Available Subagents:\n",
            r#"["echo"]"#,
            "Available LLM Platforms:\nopenai",
        );
        assert!(rendered.contains("You are Avatar"));
        assert!(rendered.contains("echo: echoes"));
        assert!(rendered.contains(r#"["echo"]"#));
        assert!(!rendered.contains("{name}"));
        assert!(!rendered.contains("{return_format}"));
    }

    #[test]
    fn format_block_appended_when_template_never_mentions_json() {
        let rendered = render_template("Answer briefly.", "A", "", "", "[]", "");
        assert!(rendered.ends_with(JSON_RETURN_FORMAT));
    }

    #[test]
    fn format_block_not_duplicated() {
        let rendered = render_template(DEFAULT_PROMPT_TEMPLATE, "A", "", "", "[]", "");
        assert_eq!(rendered.matches(JSON_RETURN_FORMAT).count(), 1);
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let rendered = render_template("Hello {who}: {return_format}", "A", "", "", "[]", "");
        assert!(rendered.contains("{who}"));
    }

    #[test]
    fn rendering_is_idempotent_for_fixed_inputs() {
        let once = render_template(DEFAULT_PROMPT_TEMPLATE, "A", "t", "s", "[]", "l");
        let twice = render_template(DEFAULT_PROMPT_TEMPLATE, "A", "t", "s", "[]", "l");
        assert_eq!(once, twice);
    }
}
