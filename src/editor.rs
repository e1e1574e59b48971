use thiserror::Error;

use crate::types::{Action, ActionKind, ActionType, MIN_SCROLL_AMOUNT, MIN_WAIT_DURATION};

/// Errors surfaced by the list editors. `Validation` blocks a commit and
/// names the offending field; `Index` means the UI sent a stale index.
/// Neither ever leaves a list partially modified.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditorError {
    #[error("{field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("index {index} out of bounds (len {len})")]
    Index { index: usize, len: usize },
    #[error("no edit session open")]
    NoSession,
}

impl EditorError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        EditorError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// Where a commit lands: appended to the end, or replacing an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    Append,
    Replace(usize),
}

/// Transient state of one create-or-edit form, from open to commit/cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    pub target: EditTarget,
    pub draft: Action,
}

impl EditSession {
    /// Switch which kind the form shows. The new kind's defaults are
    /// reapplied; the previous kind's in-progress values are dropped.
    pub fn change_kind(&mut self, kind: ActionType) {
        if self.draft.kind.action_type() != kind {
            self.draft = Action::default_for(kind);
        }
    }
}

/// Ordered list of pre-extraction actions plus the open edit session, if any.
/// All mutations are synchronous and all-or-nothing.
#[derive(Debug, Default)]
pub struct ActionListEditor {
    entries: Vec<Action>,
    session: Option<EditSession>,
}

impl ActionListEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the list from a previously saved job.
    pub fn with_entries(entries: Vec<Action>) -> Self {
        ActionListEditor {
            entries,
            session: None,
        }
    }

    pub fn entries(&self) -> &[Action] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut EditSession> {
        self.session.as_mut()
    }

    /// Open a create form pre-populated with `kind`'s defaults.
    pub fn begin_create(&mut self, kind: ActionType) -> &EditSession {
        self.session = Some(EditSession {
            target: EditTarget::Append,
            draft: Action::default_for(kind),
        });
        self.session.as_ref().unwrap()
    }

    /// Open an edit form pre-populated with the entry at `index`.
    pub fn begin_edit(&mut self, index: usize) -> Result<&EditSession, EditorError> {
        let entry = self
            .entries
            .get(index)
            .ok_or(EditorError::Index {
                index,
                len: self.entries.len(),
            })?
            .clone();
        self.session = Some(EditSession {
            target: EditTarget::Replace(index),
            draft: entry,
        });
        Ok(self.session.as_ref().unwrap())
    }

    /// Validate the candidate fields and commit them into the list: replace
    /// the entry being edited, or append for a create session. Closes the
    /// session on success; on any error the list and session are untouched.
    pub fn commit(&mut self, candidate: Action) -> Result<usize, EditorError> {
        let session = self.session.as_ref().ok_or(EditorError::NoSession)?;
        let target = session.target;
        let action = validate(candidate)?;

        let index = match target {
            EditTarget::Append => {
                self.entries.push(action);
                self.entries.len() - 1
            }
            EditTarget::Replace(i) => {
                // Stale target if the entry was deleted under the open form.
                let slot = self.entries.get_mut(i).ok_or(EditorError::Index {
                    index: i,
                    len: self.entries.len(),
                })?;
                *slot = action;
                i
            }
        };
        self.session = None;
        Ok(index)
    }

    /// Discard the open form without touching the list.
    pub fn cancel(&mut self) {
        self.session = None;
    }

    pub fn delete(&mut self, index: usize) -> Result<Action, EditorError> {
        if index >= self.entries.len() {
            return Err(EditorError::Index {
                index,
                len: self.entries.len(),
            });
        }
        Ok(self.entries.remove(index))
    }

    /// Swap with the previous entry. Already at the top is a no-op, not an
    /// error; returns whether anything moved.
    pub fn move_up(&mut self, index: usize) -> Result<bool, EditorError> {
        if index >= self.entries.len() {
            return Err(EditorError::Index {
                index,
                len: self.entries.len(),
            });
        }
        if index == 0 {
            return Ok(false);
        }
        self.entries.swap(index - 1, index);
        Ok(true)
    }

    /// Swap with the next entry. Already at the bottom is a no-op.
    pub fn move_down(&mut self, index: usize) -> Result<bool, EditorError> {
        if index >= self.entries.len() {
            return Err(EditorError::Index {
                index,
                len: self.entries.len(),
            });
        }
        if index + 1 == self.entries.len() {
            return Ok(false);
        }
        self.entries.swap(index, index + 1);
        Ok(true)
    }
}

/// Check the candidate's required fields and ranges. Returns the entry to
/// store, with `wait_after` forced to 0 for `wait` actions (the duration
/// itself is the delay).
fn validate(mut candidate: Action) -> Result<Action, EditorError> {
    if candidate.wait_after < 0.0 || !candidate.wait_after.is_finite() {
        return Err(EditorError::invalid(
            "wait_after",
            "must be a non-negative number of seconds",
        ));
    }

    match &candidate.kind {
        ActionKind::ClickCoordinates { .. } => {}
        ActionKind::ClickOcr {
            search_text,
            confidence_threshold,
        } => {
            if search_text.trim().is_empty() {
                return Err(EditorError::invalid("search_text", "search text is required"));
            }
            if !(0.0..=1.0).contains(confidence_threshold) {
                return Err(EditorError::invalid(
                    "confidence_threshold",
                    "must be between 0 and 1",
                ));
            }
        }
        ActionKind::Wait { duration } => {
            if !duration.is_finite() || *duration < MIN_WAIT_DURATION {
                return Err(EditorError::invalid(
                    "duration",
                    format!("must be at least {MIN_WAIT_DURATION}s"),
                ));
            }
            candidate.wait_after = 0.0;
        }
        ActionKind::Scroll { amount, .. } => {
            if *amount < MIN_SCROLL_AMOUNT {
                return Err(EditorError::invalid(
                    "amount",
                    format!("must be at least {MIN_SCROLL_AMOUNT}px"),
                ));
            }
        }
        ActionKind::PressKey { .. } => {}
    }

    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{KeyName, ScrollDirection};

    fn click(x: u32, y: u32) -> Action {
        Action {
            kind: ActionKind::ClickCoordinates { x, y },
            wait_after: 2.0,
        }
    }

    fn wait(duration: f64) -> Action {
        Action {
            kind: ActionKind::Wait { duration },
            wait_after: 2.0,
        }
    }

    #[test]
    fn create_wait_action_end_to_end() {
        let mut editor = ActionListEditor::new();
        editor.begin_create(ActionType::Wait);
        let index = editor.commit(wait(3.0)).unwrap();

        assert_eq!(index, 0);
        assert_eq!(editor.len(), 1);
        assert!(editor.session().is_none());
        assert_eq!(editor.entries()[0].describe(), "Wait 3s");
        // The wait duration itself is the delay.
        assert_eq!(editor.entries()[0].wait_after, 0.0);
    }

    #[test]
    fn begin_create_prefills_kind_defaults() {
        let mut editor = ActionListEditor::new();
        let session = editor.begin_create(ActionType::ClickOcr);
        assert_eq!(session.target, EditTarget::Append);
        assert_eq!(
            session.draft.kind,
            ActionKind::ClickOcr {
                search_text: String::new(),
                confidence_threshold: 0.7,
            }
        );
        // Nothing committed yet.
        assert!(editor.is_empty());
    }

    #[test]
    fn begin_edit_out_of_bounds() {
        let mut editor = ActionListEditor::with_entries(vec![click(1, 2)]);
        assert_eq!(
            editor.begin_edit(1),
            Err(EditorError::Index { index: 1, len: 1 })
        );
        assert!(editor.session().is_none());
    }

    #[test]
    fn commit_replaces_entry_under_edit() {
        let mut editor = ActionListEditor::with_entries(vec![click(1, 2), click(3, 4)]);
        editor.begin_edit(1).unwrap();
        let index = editor.commit(click(30, 40)).unwrap();

        assert_eq!(index, 1);
        assert_eq!(editor.len(), 2);
        assert_eq!(editor.entries()[1], click(30, 40));
        assert_eq!(editor.entries()[0], click(1, 2));
    }

    #[test]
    fn commit_without_session_is_rejected() {
        let mut editor = ActionListEditor::new();
        assert_eq!(editor.commit(click(1, 2)), Err(EditorError::NoSession));
        assert!(editor.is_empty());
    }

    #[test]
    fn commit_empty_search_text_leaves_list_unchanged() {
        let mut editor = ActionListEditor::with_entries(vec![click(1, 2)]);
        editor.begin_create(ActionType::ClickOcr);

        let err = editor
            .commit(Action {
                kind: ActionKind::ClickOcr {
                    search_text: "   ".into(),
                    confidence_threshold: 0.7,
                },
                wait_after: 2.0,
            })
            .unwrap_err();

        assert!(matches!(
            err,
            EditorError::Validation { field: "search_text", .. }
        ));
        assert_eq!(editor.len(), 1);
        // Failed commit keeps the session open so the user can fix the form.
        assert!(editor.session().is_some());
    }

    #[test]
    fn commit_rejects_out_of_range_values() {
        let mut editor = ActionListEditor::new();

        editor.begin_create(ActionType::Wait);
        let err = editor.commit(wait(0.25)).unwrap_err();
        assert!(matches!(err, EditorError::Validation { field: "duration", .. }));

        editor.begin_create(ActionType::Scroll);
        let err = editor
            .commit(Action {
                kind: ActionKind::Scroll {
                    direction: ScrollDirection::Down,
                    amount: 50,
                },
                wait_after: 2.0,
            })
            .unwrap_err();
        assert!(matches!(err, EditorError::Validation { field: "amount", .. }));

        editor.begin_create(ActionType::ClickOcr);
        let err = editor
            .commit(Action {
                kind: ActionKind::ClickOcr {
                    search_text: "Next".into(),
                    confidence_threshold: 1.5,
                },
                wait_after: 2.0,
            })
            .unwrap_err();
        assert!(matches!(
            err,
            EditorError::Validation { field: "confidence_threshold", .. }
        ));

        assert!(editor.is_empty());
    }

    #[test]
    fn commit_preserves_field_values_exactly() {
        let mut editor = ActionListEditor::new();
        editor.begin_create(ActionType::ClickOcr);
        let candidate = Action {
            kind: ActionKind::ClickOcr {
                search_text: "Load more".into(),
                confidence_threshold: 0.85,
            },
            wait_after: 4.5,
        };
        editor.commit(candidate.clone()).unwrap();
        assert_eq!(editor.entries()[0], candidate);
    }

    #[test]
    fn change_kind_reapplies_defaults() {
        let mut editor = ActionListEditor::new();
        editor.begin_create(ActionType::ClickOcr);
        if let Some(session) = editor.session_mut() {
            if let ActionKind::ClickOcr { search_text, .. } = &mut session.draft.kind {
                search_text.push_str("Next page");
            }
            session.change_kind(ActionType::Scroll);
        }
        let session = editor.session().unwrap();
        assert_eq!(session.draft, Action::default_for(ActionType::Scroll));

        // Switching back does not resurrect the typed text.
        editor.session_mut().unwrap().change_kind(ActionType::ClickOcr);
        assert_eq!(
            editor.session().unwrap().draft,
            Action::default_for(ActionType::ClickOcr)
        );
    }

    #[test]
    fn cancel_discards_draft() {
        let mut editor = ActionListEditor::with_entries(vec![click(1, 2)]);
        editor.begin_edit(0).unwrap();
        editor.cancel();
        assert!(editor.session().is_none());
        assert_eq!(editor.entries()[0], click(1, 2));
    }

    #[test]
    fn delete_shifts_later_entries_down() {
        let mut editor =
            ActionListEditor::with_entries(vec![click(0, 0), click(1, 1), click(2, 2)]);
        let removed = editor.delete(1).unwrap();
        assert_eq!(removed, click(1, 1));
        assert_eq!(editor.entries(), &[click(0, 0), click(2, 2)]);

        assert_eq!(
            editor.delete(2),
            Err(EditorError::Index { index: 2, len: 2 })
        );
        assert_eq!(editor.len(), 2);
    }

    #[test]
    fn move_at_boundaries_is_a_no_op() {
        let mut editor = ActionListEditor::with_entries(vec![click(0, 0), click(1, 1)]);

        assert!(!editor.move_up(0).unwrap());
        assert!(!editor.move_down(1).unwrap());
        // Idempotent under repeated boundary calls.
        assert!(!editor.move_up(0).unwrap());
        assert_eq!(editor.entries(), &[click(0, 0), click(1, 1)]);
    }

    #[test]
    fn move_down_swaps_adjacent_entries() {
        let mut editor = ActionListEditor::with_entries(vec![
            click(10, 20),
            Action {
                kind: ActionKind::Wait { duration: 1.0 },
                wait_after: 0.0,
            },
        ]);
        assert!(editor.move_down(0).unwrap());
        assert_eq!(
            editor.entries()[0].kind,
            ActionKind::Wait { duration: 1.0 }
        );
        assert_eq!(editor.entries()[1].kind, ActionKind::ClickCoordinates { x: 10, y: 20 });
    }

    #[test]
    fn move_out_of_bounds_is_an_error() {
        let mut editor = ActionListEditor::with_entries(vec![click(0, 0)]);
        assert_eq!(
            editor.move_up(3),
            Err(EditorError::Index { index: 3, len: 1 })
        );
        assert_eq!(
            editor.move_down(3),
            Err(EditorError::Index { index: 3, len: 1 })
        );
    }

    #[test]
    fn commit_after_entry_deleted_under_edit_does_not_corrupt() {
        let mut editor = ActionListEditor::with_entries(vec![click(1, 2)]);
        editor.begin_edit(0).unwrap();
        editor.delete(0).unwrap();

        let err = editor.commit(click(9, 9)).unwrap_err();
        assert_eq!(err, EditorError::Index { index: 0, len: 0 });
        assert!(editor.is_empty());
    }

    #[test]
    fn press_key_round_trip() {
        let mut editor = ActionListEditor::new();
        editor.begin_create(ActionType::PressKey);
        editor
            .commit(Action {
                kind: ActionKind::PressKey { key: KeyName::F5 },
                wait_after: 1.0,
            })
            .unwrap();
        let wire = serde_json::to_value(editor.entries()).unwrap();
        assert_eq!(
            wire,
            serde_json::json!([{"type": "press_key", "key": "f5", "wait_after": 1.0}])
        );
    }
}
