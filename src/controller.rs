use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::watch;

use crate::backend::{DocumentStore, FieldValue, Fields, OrderBy, Predicate, SessionProvider};
use crate::error::{Error, Operation, Result};
use crate::events::StatePayload;
use crate::models::{
    format_due_date, today, Scope, Task, TaskId, VisibilityFilter, FIELD_COMPLETE, FIELD_DATE,
    FIELD_TITLE, FIELD_USER_ID, TASKS_COLLECTION,
};
use crate::state::{EditSession, TaskListState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    Created(TaskId),
    /// Empty title: nothing was written.
    Rejected,
}

/// Keeps one screen's task list in step with the remote store.
///
/// `ToggleComplete` is applied locally before the remote write and undone if
/// the write fails. `Delete`, `Edit` and `Create` wait for the store and then
/// refresh from it.
pub struct TaskListController<S, D> {
    session: Arc<S>,
    store: Arc<D>,
    state: TaskListState,
}

impl<S, D> Clone for TaskListController<S, D> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            store: Arc::clone(&self.store),
            state: self.state.clone(),
        }
    }
}

impl<S: SessionProvider, D: DocumentStore> TaskListController<S, D> {
    pub fn new(session: Arc<S>, store: Arc<D>, scope: Scope) -> Self {
        Self {
            session,
            store,
            state: TaskListState::new(scope),
        }
    }

    /// The calendar screen: tasks due on one day.
    pub fn for_day(session: Arc<S>, store: Arc<D>, date: NaiveDate) -> Self {
        Self::new(session, store, Scope::Day(date))
    }

    /// The "view all" screen: every task the user owns.
    pub fn all_tasks(session: Arc<S>, store: Arc<D>) -> Self {
        Self::new(session, store, Scope::All)
    }

    pub fn state(&self) -> &TaskListState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<StatePayload> {
        self.state.subscribe()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.tasks()
    }

    pub fn visible_tasks(&self) -> Vec<Task> {
        self.state.visible_tasks()
    }

    pub fn scope(&self) -> Scope {
        self.state.scope()
    }

    pub fn visibility_filter(&self) -> VisibilityFilter {
        self.state.filter()
    }

    pub async fn load(&self) -> Result<()> {
        let scope = self.state.scope();
        let identity = self
            .session
            .current_identity()
            .ok_or(Error::NotAuthenticated)?;

        let mut predicates = vec![Predicate::equals(FIELD_USER_ID, identity.uid.as_str())];
        if let Some(date) = scope.date() {
            predicates.push(Predicate::equals(FIELD_DATE, format_due_date(date)));
        }

        let docs = self
            .store
            .query(
                TASKS_COLLECTION,
                &predicates,
                &OrderBy::ascending(FIELD_DATE),
            )
            .await
            .map_err(|err| {
                log::error!("load tasks failed scope={scope:?}: {err}");
                Error::remote(Operation::Load, err)
            })?;

        let tasks: Vec<Task> = docs
            .iter()
            .filter_map(|doc| match Task::from_document(doc) {
                Ok(task) => Some(task),
                Err(err) => {
                    log::warn!("skipping {err}");
                    None
                }
            })
            .collect();
        let count = tasks.len();
        if self.state.replace_tasks_for(scope, tasks) {
            log::info!("loaded {count} tasks scope={scope:?}");
        } else {
            log::debug!("discarded load for stale scope={scope:?}");
        }
        Ok(())
    }

    pub async fn toggle_complete(&self, task_id: &str, new_value: bool) -> Result<()> {
        let toggle = self
            .state
            .begin_toggle(task_id, new_value)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))?;

        let mut fields = Fields::new();
        fields.insert(FIELD_COMPLETE.to_string(), FieldValue::Bool(new_value));
        let result = self
            .store
            .update_fields(TASKS_COLLECTION, task_id, fields)
            .await;
        self.state.settle_toggle(&toggle, result.is_ok());
        match result {
            Ok(()) => {
                log::info!("task {task_id} complete={new_value}");
                Ok(())
            }
            Err(err) => {
                log::warn!(
                    "rolled back task {task_id} complete={}: {err}",
                    toggle.previous
                );
                Err(Error::remote(Operation::ToggleComplete, err))
            }
        }
    }

    pub async fn delete(&self, task_id: &str) -> Result<()> {
        self.store
            .delete(TASKS_COLLECTION, task_id)
            .await
            .map_err(|err| {
                log::error!("delete task {task_id} failed: {err}");
                Error::remote(Operation::Delete, err)
            })?;
        log::info!("task {task_id} deleted");
        self.load().await
    }

    pub fn begin_edit(&self, task_id: &str) -> Result<EditSession> {
        self.state
            .begin_edit(task_id)
            .ok_or_else(|| Error::TaskNotFound(task_id.to_string()))
    }

    pub fn set_edit_title(&self, title: &str) {
        self.state.set_edit_title(title);
    }

    pub fn cancel_edit(&self) {
        self.state.close_edit();
    }

    /// Saves the open edit session, if there is one.
    pub async fn save_edit(&self) -> Result<()> {
        match self.state.editing() {
            Some(session) => self.edit(&session.task_id, &session.title).await,
            None => Ok(()),
        }
    }

    pub async fn edit(&self, task_id: &str, new_title: &str) -> Result<()> {
        let mut fields = Fields::new();
        fields.insert(FIELD_TITLE.to_string(), FieldValue::from(new_title));
        self.store
            .update_fields(TASKS_COLLECTION, task_id, fields)
            .await
            .map_err(|err| {
                log::error!("edit task {task_id} failed: {err}");
                Error::remote(Operation::Edit, err)
            })?;
        log::info!("task {task_id} title updated");
        if self
            .state
            .editing()
            .is_some_and(|session| session.task_id == task_id)
        {
            self.state.close_edit();
        }
        self.load().await
    }

    /// Adds a task owned by the signed-in user. The list is not touched; the
    /// screen that shows it reloads when it regains focus.
    pub async fn create(&self, title: &str, due_date: NaiveDate) -> Result<CreateOutcome> {
        if title.is_empty() {
            return Ok(CreateOutcome::Rejected);
        }
        let identity = self
            .session
            .current_identity()
            .ok_or(Error::NotAuthenticated)?;
        let fields = Task::new_fields(&identity.uid, title, due_date);
        let id = self
            .store
            .insert(TASKS_COLLECTION, fields)
            .await
            .map_err(|err| {
                log::error!("add task failed: {err}");
                Error::remote(Operation::Create, err)
            })?;
        log::info!("task {id} added due={}", format_due_date(due_date));
        Ok(CreateOutcome::Created(id))
    }

    pub fn set_visibility_filter(&self, filter: VisibilityFilter) {
        self.state.set_filter(filter);
    }

    /// Switches scope; a new scope invalidates the loaded list and reloads.
    pub async fn set_scope(&self, scope: Scope) -> Result<()> {
        if !self.state.set_scope(scope) {
            return Ok(());
        }
        self.load().await
    }

    /// Moves a day view back to today, as the calendar does when the user
    /// leaves it. The all-tasks view keeps its scope.
    pub async fn reset_to_today(&self) -> Result<()> {
        match self.state.scope() {
            Scope::Day(_) => self.set_scope(Scope::Day(today())).await,
            Scope::All => Ok(()),
        }
    }

    pub async fn on_focus(&self) -> Result<()> {
        self.load().await
    }

    pub fn on_blur(&self) {
        self.state.set_filter(VisibilityFilter::HideComplete);
    }
}
