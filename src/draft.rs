//! Form state for the new-task screen.

use chrono::NaiveDate;

use crate::backend::{DocumentStore, SessionProvider};
use crate::controller::{CreateOutcome, TaskListController};
use crate::error::Result;
use crate::models::{today, MAX_TITLE_CHARS};

/// Caps title input at the form limit. Counted in chars so multi-byte input
/// is never split.
pub fn limit_title(input: &str) -> String {
    input.chars().take(MAX_TITLE_CHARS).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    title: String,
    due_date: NaiveDate,
}

impl Default for TaskDraft {
    fn default() -> Self {
        Self::new(today())
    }
}

impl TaskDraft {
    pub fn new(due_date: NaiveDate) -> Self {
        Self {
            title: String::new(),
            due_date,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn set_title(&mut self, input: &str) {
        self.title = limit_title(input);
    }

    pub fn set_due_date(&mut self, date: NaiveDate) {
        self.due_date = date;
    }

    /// Clears the form back to an empty title due today.
    pub fn cancel(&mut self) {
        *self = Self::default();
    }

    /// Submits the draft. The form is cleared only when a task was written.
    pub async fn submit<S, D>(
        &mut self,
        controller: &TaskListController<S, D>,
    ) -> Result<CreateOutcome>
    where
        S: SessionProvider,
        D: DocumentStore,
    {
        let outcome = controller.create(&self.title, self.due_date).await?;
        if let CreateOutcome::Created(_) = outcome {
            self.cancel();
        }
        Ok(outcome)
    }
}
