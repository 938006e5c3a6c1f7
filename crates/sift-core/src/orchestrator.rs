use tokio_util::sync::CancellationToken;

use crate::caller::ExtractionCaller;
use crate::error::AppError;
use crate::prompt::Prompt;
use crate::response::parse_text;
use crate::traits::{Cleaner, Generator};

/// Turns a short user goal into full extraction instructions.
///
/// Runs once per batch, before any file is processed, through the same
/// credential pool and retry policy as the extractions themselves.
#[derive(Clone)]
pub struct PromptOrchestrator<G, C>
where
    G: Generator,
    C: Cleaner,
{
    caller: ExtractionCaller<G, C>,
}

impl<G, C> PromptOrchestrator<G, C>
where
    G: Generator,
    C: Cleaner,
{
    pub fn new(caller: ExtractionCaller<G, C>) -> Self {
        Self { caller }
    }

    pub async fn refine(&self, goal: &str) -> Result<String, AppError> {
        self.refine_with_cancel(goal, &CancellationToken::new()).await
    }

    pub async fn refine_with_cancel(
        &self,
        goal: &str,
        cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(AppError::InvalidInput("extraction goal is empty".into()));
        }

        tracing::info!(goal_chars = goal.len(), "Refining extraction goal");
        let instructions = self
            .caller
            .complete(&Prompt::orchestration(goal), parse_text, cancel)
            .await?;
        tracing::info!(
            instruction_chars = instructions.len(),
            "Generated extraction instructions"
        );
        Ok(instructions)
    }
}
