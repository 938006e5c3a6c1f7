//! Prompt templates for extraction, reformatting, and goal refinement.

/// Maximum characters of a rejected reply quoted back to the model.
const MAX_ECHOED_REPLY: usize = 2_000;

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a data extraction assistant. Extract the requested information from the provided file content. Respond ONLY with valid JSON. If the content contains no relevant data, respond with null. Do not include explanations.";

pub const ORCHESTRATOR_SYSTEM_PROMPT: &str = "You are an expert prompt engineer. Rewrite the user's goal into precise instructions for a data extraction model. The instructions must name every field to extract, describe the JSON structure to return, and tell the model to return null when the content has nothing relevant. Respond with the instructions only.";

/// A system + user message pair sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// Prompt asking the model to apply `instructions` to one file's text.
    pub fn extraction(instructions: &str, content: &str) -> Self {
        Self::new(
            EXTRACTION_SYSTEM_PROMPT,
            format!("{instructions}\n\nHere is the file content:\n\n---\n{content}\n---"),
        )
    }

    /// Prompt turning a short user goal into full extraction instructions.
    pub fn orchestration(goal: &str) -> Self {
        Self::new(
            ORCHESTRATOR_SYSTEM_PROMPT,
            format!("User goal:\n{goal}"),
        )
    }

    /// Same request, plus a stricter demand for bare JSON after an
    /// unparseable `previous_reply`.
    pub fn with_reformat_demand(&self, previous_reply: &str) -> Self {
        let echoed: String = previous_reply.chars().take(MAX_ECHOED_REPLY).collect();
        Self {
            system: self.system.clone(),
            user: format!(
                "{}\n\nYour previous reply could not be parsed as JSON:\n\n{}\n\nReply again with ONLY a single valid JSON value (or null if nothing is relevant). No prose, no markdown fences.",
                self.user, echoed
            ),
        }
    }
}
