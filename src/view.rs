use serde::Serialize;

use crate::editor::{ActionListEditor, EditTarget};
use crate::regions::RegionListEditor;
use crate::selectors::SelectorRows;
use crate::types::{Action, ActionType};

/// Pure projections of editor state into the rows the UI renders. No list
/// mutation happens here; any frontend can consume these as JSON.

#[derive(Debug, Clone, Serialize)]
pub struct ActionRow {
    pub index: usize,
    pub label: String,
    pub kind: ActionType,
    pub wait_after: f64,
    pub can_move_up: bool,
    pub can_move_down: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionRow {
    pub index: usize,
    pub name: String,
    pub bounds: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectorRowView {
    pub index: usize,
    pub name: String,
    pub selector: String,
    pub complete: bool,
}

/// The open edit form: which entry it targets and the draft to prefill.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub draft: Action,
}

pub fn action_rows(editor: &ActionListEditor) -> Vec<ActionRow> {
    let len = editor.len();
    editor
        .entries()
        .iter()
        .enumerate()
        .map(|(index, entry)| ActionRow {
            index,
            label: entry.describe(),
            kind: entry.kind.action_type(),
            wait_after: entry.wait_after,
            can_move_up: index > 0,
            can_move_down: index + 1 < len,
        })
        .collect()
}

pub fn session_view(editor: &ActionListEditor) -> Option<SessionView> {
    editor.session().map(|session| match session.target {
        EditTarget::Append => SessionView {
            mode: "create",
            index: None,
            draft: session.draft.clone(),
        },
        EditTarget::Replace(index) => SessionView {
            mode: "edit",
            index: Some(index),
            draft: session.draft.clone(),
        },
    })
}

pub fn region_rows(editor: &RegionListEditor) -> Vec<RegionRow> {
    editor
        .regions()
        .iter()
        .enumerate()
        .map(|(index, r)| RegionRow {
            index,
            name: r.name.clone(),
            bounds: format!("({}, {}) {}x{}", r.x, r.y, r.width, r.height),
        })
        .collect()
}

pub fn selector_rows(rows: &SelectorRows) -> Vec<SelectorRowView> {
    rows.rows()
        .iter()
        .enumerate()
        .map(|(index, r)| SelectorRowView {
            index,
            name: r.name.clone(),
            selector: r.selector.clone(),
            complete: r.is_complete(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;

    #[test]
    fn rows_carry_labels_and_move_flags() {
        let editor = ActionListEditor::with_entries(vec![
            Action {
                kind: ActionKind::ClickCoordinates { x: 1, y: 2 },
                wait_after: 2.0,
            },
            Action {
                kind: ActionKind::Wait { duration: 2.0 },
                wait_after: 0.0,
            },
            Action {
                kind: ActionKind::PressKey {
                    key: crate::types::KeyName::Tab,
                },
                wait_after: 2.0,
            },
        ]);

        let rows = action_rows(&editor);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].label, "Click at (1, 2)");
        assert!(!rows[0].can_move_up);
        assert!(rows[0].can_move_down);
        assert!(rows[1].can_move_up);
        assert!(rows[1].can_move_down);
        assert!(rows[2].can_move_up);
        assert!(!rows[2].can_move_down);
    }

    #[test]
    fn session_view_distinguishes_create_and_edit() {
        let mut editor = ActionListEditor::new();
        assert!(session_view(&editor).is_none());

        editor.begin_create(ActionType::Wait);
        let view = session_view(&editor).unwrap();
        assert_eq!(view.mode, "create");
        assert!(view.index.is_none());

        let draft = editor.session().unwrap().draft.clone();
        editor.commit(draft).unwrap();
        editor.begin_edit(0).unwrap();
        let view = session_view(&editor).unwrap();
        assert_eq!(view.mode, "edit");
        assert_eq!(view.index, Some(0));
    }
}
