//! Renders an [`AgentBrief`] into the prompt string handed to the
//! agent CLI.

use relay_proto::brief::AgentBrief;

/// Hard cap on the rendered prompt, roughly 2000 tokens.
const MAX_PROMPT_CHARS: usize = 8000;

/// Render a brief as a structured prompt for `codex exec`.
///
/// Pure function of its inputs. The result is capped at exactly
/// [`MAX_PROMPT_CHARS`] characters; longer renderings keep the first
/// 7997 characters and end with `...`.
pub fn render_prompt(brief: &AgentBrief, continuation: bool) -> String {
    let mut sections: Vec<String> = Vec::new();

    if continuation {
        sections.push(
            "Your previous assignment is complete. Here is your next assignment:\n".to_string(),
        );
    }

    sections.push(format!(
        "You are a {} working on the \"{}\" workstream.",
        brief.role, brief.workstream
    ));
    sections.push(brief.description.clone());

    let project = &brief.project_brief;
    sections.push(format!(
        "\n## Project\n{}: {}",
        project.title, project.description
    ));

    if !project.goals.is_empty() {
        let goals = project
            .goals
            .iter()
            .map(|g| format!("- {g}"))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("\n## Goals\n{goals}"));
    }

    let mut constraints: Vec<&str> = brief.constraints.iter().map(String::as_str).collect();
    if let Some(project_constraints) = &project.constraints {
        constraints.extend(project_constraints.iter().map(String::as_str));
    }
    if !constraints.is_empty() {
        let rendered = constraints
            .iter()
            .map(|c| format!("- {c}"))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("\n## Constraints\n{rendered}"));
    }

    let snapshot = &brief.knowledge_snapshot;
    if snapshot.estimated_tokens > 0 {
        let mut parts: Vec<String> = Vec::new();
        if !snapshot.workstreams.is_empty() {
            parts.push(format!("{} active workstream(s)", snapshot.workstreams.len()));
        }
        if !snapshot.pending_decisions.is_empty() {
            parts.push(format!(
                "{} pending decision(s)",
                snapshot.pending_decisions.len()
            ));
        }
        if !snapshot.artifact_index.is_empty() {
            parts.push(format!("{} artifact(s)", snapshot.artifact_index.len()));
        }
        if !parts.is_empty() {
            sections.push(format!("\n## Context\n{}.", parts.join(", ")));
        }
    }

    let result = sections.join("\n");
    if result.chars().count() > MAX_PROMPT_CHARS {
        let mut truncated: String = result.chars().take(MAX_PROMPT_CHARS - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        result
    }
}
