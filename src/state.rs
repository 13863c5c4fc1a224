use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::draft::limit_title;
use crate::events::StatePayload;
use crate::models::{Scope, Task, TaskId, VisibilityFilter};

/// The open edit affordance for one task.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EditSession {
    pub task_id: TaskId,
    pub title: String,
}

/// A completion write that has been applied locally but not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToggle {
    pub task_id: TaskId,
    pub value: bool,
    pub previous: bool,
    seq: u64,
}

/// The in-memory list shared between the controller and the screens that read it.
///
/// Cloning is cheap and every clone sees the same list. The lock is never held
/// across a remote call.
#[derive(Clone)]
pub struct TaskListState {
    inner: Arc<Mutex<ListData>>,
    events: Arc<watch::Sender<StatePayload>>,
}

impl TaskListState {
    pub fn new(scope: Scope) -> Self {
        let data = ListData {
            tasks: Vec::new(),
            scope,
            filter: VisibilityFilter::default(),
            editing: None,
            pending: HashMap::new(),
            next_seq: 0,
        };
        let (events, _) = watch::channel(data.payload());
        Self {
            inner: Arc::new(Mutex::new(data)),
            events: Arc::new(events),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatePayload> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> StatePayload {
        let guard = self.inner.lock().expect("state poisoned");
        guard.payload()
    }

    pub fn tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tasks.clone()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.tasks.iter().find(|t| t.id == task_id).cloned()
    }

    pub fn visible_tasks(&self) -> Vec<Task> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.visible_tasks()
    }

    pub fn scope(&self) -> Scope {
        let guard = self.inner.lock().expect("state poisoned");
        guard.scope
    }

    pub fn filter(&self) -> VisibilityFilter {
        let guard = self.inner.lock().expect("state poisoned");
        guard.filter
    }

    /// Replaces the list only if `scope` is still the active scope. Returns
    /// false when the result belongs to a scope the user already left.
    ///
    /// Toggles still in flight win over the fetched value: the store may not
    /// have seen them yet.
    pub fn replace_tasks_for(&self, scope: Scope, mut tasks: Vec<Task>) -> bool {
        self.mutate(|data| {
            if data.scope != scope {
                return false;
            }
            for task in &mut tasks {
                if let Some(pending) = data.pending.get(&task.id) {
                    task.complete = pending.value;
                }
            }
            data.tasks = tasks;
            true
        })
    }

    /// Applies `complete = value` locally and records the write as pending.
    /// Returns `None` if the task is not in the list.
    pub fn begin_toggle(&self, task_id: &str, value: bool) -> Option<PendingToggle> {
        self.mutate(|data| {
            let task = data.tasks.iter_mut().find(|t| t.id == task_id)?;
            let previous = task.complete;
            task.complete = value;
            let pending = PendingToggle {
                task_id: task.id.clone(),
                value,
                previous,
                seq: data.next_seq,
            };
            data.next_seq += 1;
            data.pending.insert(pending.task_id.clone(), pending.clone());
            Some(pending)
        })
    }

    /// Settles a pending write. A confirmed write re-asserts its value; a
    /// failed one restores the value seen when it began. A newer toggle on the
    /// same task supersedes this one and is left alone.
    pub fn settle_toggle(&self, toggle: &PendingToggle, confirmed: bool) {
        self.mutate(|data| {
            if data.pending.get(&toggle.task_id).map(|p| p.seq) != Some(toggle.seq) {
                return;
            }
            data.pending.remove(&toggle.task_id);
            let value = if confirmed {
                toggle.value
            } else {
                toggle.previous
            };
            if let Some(task) = data.tasks.iter_mut().find(|t| t.id == toggle.task_id) {
                task.complete = value;
            }
        });
    }

    pub fn has_pending(&self, task_id: &str) -> bool {
        let guard = self.inner.lock().expect("state poisoned");
        guard.pending.contains_key(task_id)
    }

    pub fn set_filter(&self, filter: VisibilityFilter) {
        self.mutate(|data| data.filter = filter);
    }

    /// Returns true if the scope actually changed.
    pub fn set_scope(&self, scope: Scope) -> bool {
        self.mutate(|data| {
            if data.scope == scope {
                return false;
            }
            data.scope = scope;
            true
        })
    }

    /// Opens the edit affordance pre-filled with the task's current title.
    pub fn begin_edit(&self, task_id: &str) -> Option<EditSession> {
        self.mutate(|data| {
            let task = data.tasks.iter().find(|t| t.id == task_id)?;
            let session = EditSession {
                task_id: task.id.clone(),
                title: task.title.clone(),
            };
            data.editing = Some(session.clone());
            Some(session)
        })
    }

    pub fn set_edit_title(&self, title: &str) {
        self.mutate(|data| {
            if let Some(editing) = data.editing.as_mut() {
                editing.title = limit_title(title);
            }
        });
    }

    pub fn editing(&self) -> Option<EditSession> {
        let guard = self.inner.lock().expect("state poisoned");
        guard.editing.clone()
    }

    pub fn close_edit(&self) {
        self.mutate(|data| data.editing = None);
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut ListData) -> T) -> T {
        let mut guard = self.inner.lock().expect("state poisoned");
        let out = f(&mut *guard);
        self.events.send_replace(guard.payload());
        out
    }
}

#[derive(Debug)]
struct ListData {
    tasks: Vec<Task>,
    scope: Scope,
    filter: VisibilityFilter,
    editing: Option<EditSession>,
    pending: HashMap<TaskId, PendingToggle>,
    next_seq: u64,
}

impl ListData {
    fn visible_tasks(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|task| self.filter.admits(task))
            .cloned()
            .collect()
    }

    fn payload(&self) -> StatePayload {
        StatePayload {
            visible_tasks: self.visible_tasks(),
            scope: self.scope,
            filter: self.filter,
            editing: self.editing.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn make_task(id: &str, complete: bool) -> Task {
        Task {
            id: id.to_string(),
            owner_id: "uid-1".to_string(),
            title: format!("task-{id}"),
            due_date: day(1),
            complete,
        }
    }

    fn make_state(tasks: Vec<Task>) -> TaskListState {
        let state = TaskListState::new(Scope::Day(day(1)));
        assert!(state.replace_tasks_for(Scope::Day(day(1)), tasks));
        state
    }

    #[test]
    fn hide_complete_never_shows_complete_tasks() {
        let state = make_state(vec![
            make_task("a", false),
            make_task("b", true),
            make_task("c", false),
        ]);
        let visible = state.visible_tasks();
        assert!(visible.iter().all(|t| !t.complete));
        let ids: Vec<_> = visible.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn show_all_keeps_every_task_once_in_order() {
        let state = make_state(vec![
            make_task("a", true),
            make_task("b", false),
            make_task("c", true),
        ]);
        state.set_filter(VisibilityFilter::ShowAllIncludingComplete);
        assert_eq!(state.visible_tasks(), state.tasks());
    }

    #[test]
    fn toggle_records_previous_value_and_settles() {
        let state = make_state(vec![make_task("a", false)]);
        assert!(state.begin_toggle("missing", true).is_none());

        let toggle = state.begin_toggle("a", true).unwrap();
        assert!(!toggle.previous);
        assert!(state.task("a").unwrap().complete);
        assert!(state.has_pending("a"));

        state.settle_toggle(&toggle, false);
        assert!(!state.task("a").unwrap().complete);
        assert!(!state.has_pending("a"));
    }

    #[test]
    fn reload_keeps_pending_toggle_values() {
        let state = make_state(vec![make_task("a", false), make_task("b", false)]);
        let toggle = state.begin_toggle("a", true).unwrap();

        // The store has not applied the write yet.
        assert!(state.replace_tasks_for(
            Scope::Day(day(1)),
            vec![make_task("a", false), make_task("b", true)]
        ));
        assert!(state.task("a").unwrap().complete);
        assert!(state.task("b").unwrap().complete);

        state.settle_toggle(&toggle, true);
        assert!(state.replace_tasks_for(Scope::Day(day(1)), vec![make_task("a", false)]));
        assert!(!state.task("a").unwrap().complete);
    }

    #[test]
    fn superseded_toggle_does_not_roll_back_the_newer_one() {
        let state = make_state(vec![make_task("a", false)]);
        let first = state.begin_toggle("a", true).unwrap();
        let second = state.begin_toggle("a", false).unwrap();
        assert!(second.previous);

        state.settle_toggle(&first, false);
        assert!(!state.task("a").unwrap().complete);
        assert!(state.has_pending("a"));

        state.settle_toggle(&second, true);
        assert!(!state.task("a").unwrap().complete);
        assert!(!state.has_pending("a"));
    }

    #[test]
    fn stale_scope_results_are_discarded() {
        let state = make_state(vec![make_task("a", false)]);
        assert!(state.set_scope(Scope::Day(day(2))));
        assert!(!state.set_scope(Scope::Day(day(2))));

        assert!(!state.replace_tasks_for(Scope::Day(day(1)), vec![make_task("old", false)]));
        assert_eq!(state.tasks()[0].id, "a");

        assert!(state.replace_tasks_for(Scope::Day(day(2)), Vec::new()));
        assert!(state.tasks().is_empty());
    }

    #[test]
    fn edit_session_prefills_and_limits_title() {
        let state = make_state(vec![make_task("a", false)]);
        assert!(state.begin_edit("missing").is_none());
        assert!(state.editing().is_none());

        let session = state.begin_edit("a").unwrap();
        assert_eq!(session.title, "task-a");

        state.set_edit_title(&"x".repeat(40));
        assert_eq!(state.editing().unwrap().title.chars().count(), 30);

        state.close_edit();
        assert!(state.editing().is_none());
        // Without an open session the title input goes nowhere.
        state.set_edit_title("ignored");
        assert!(state.editing().is_none());
    }

    #[test]
    fn subscribers_see_every_change() {
        let state = make_state(vec![make_task("a", false), make_task("b", true)]);
        let mut rx = state.subscribe();
        assert_eq!(rx.borrow_and_update().visible_tasks.len(), 1);

        state.set_filter(VisibilityFilter::ShowAllIncludingComplete);
        assert!(rx.has_changed().unwrap());
        let payload = rx.borrow_and_update().clone();
        assert_eq!(payload.visible_tasks.len(), 2);
        assert_eq!(payload.filter, VisibilityFilter::ShowAllIncludingComplete);
        assert_eq!(payload, state.snapshot());
    }
}
