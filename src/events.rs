use crate::models::{Scope, Task, VisibilityFilter};
use crate::state::EditSession;

/// What the presentation layer renders: the already-filtered list plus the
/// controls that produced it.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StatePayload {
    pub visible_tasks: Vec<Task>,
    pub scope: Scope,
    pub filter: VisibilityFilter,
    pub editing: Option<EditSession>,
}
