use jobforge::editor::ActionListEditor;
use jobforge::payload::{JobConfig, JobMeta};
use jobforge::regions::{CaptureScale, DisplayRect, RegionListEditor};
use jobforge::selectors::{SelectorField, SelectorRows};
use jobforge::template;
use jobforge::types::{Action, ActionKind, ActionType, KeyName, ScrollDirection};
use serde_json::json;

#[test]
fn build_and_serialize_a_full_job() {
    // Actions: scroll down, click a button found by OCR, wait for the page.
    let mut actions = ActionListEditor::new();

    actions.begin_create(ActionType::Scroll);
    actions
        .commit(Action {
            kind: ActionKind::Scroll {
                direction: ScrollDirection::Down,
                amount: 600,
            },
            wait_after: 1.0,
        })
        .unwrap();

    actions.begin_create(ActionType::ClickOcr);
    actions
        .commit(Action {
            kind: ActionKind::ClickOcr {
                search_text: "Load more".into(),
                confidence_threshold: 0.8,
            },
            wait_after: 2.0,
        })
        .unwrap();

    actions.begin_create(ActionType::Wait);
    actions
        .commit(Action {
            kind: ActionKind::Wait { duration: 3.0 },
            wait_after: 5.0,
        })
        .unwrap();

    // Selectors: one complete row, one half-finished row the user abandoned.
    let mut selectors = SelectorRows::new();
    selectors.update(0, SelectorField::Name, "title").unwrap();
    selectors.update(0, SelectorField::Selector, "h2 a").unwrap();
    selectors.add("price", "");

    let meta = JobMeta {
        name: "Deal watcher".into(),
        url: "https://example.com/deals".into(),
        container_selector: "div.deal-card".into(),
        format_template: "{title} now {price}".into(),
        ..JobMeta::default()
    };

    let payload = JobConfig::assemble(&meta, actions.entries(), &selectors);
    let wire = serde_json::to_value(&payload).unwrap();

    assert_eq!(
        wire["pre_extraction_actions"],
        json!([
            {"type": "scroll", "direction": "down", "amount": 600, "wait_after": 1.0},
            {"type": "click_ocr", "search_text": "Load more", "confidence_threshold": 0.8, "wait_after": 2.0},
            {"type": "wait", "duration": 3.0, "wait_after": 0.0},
        ])
    );
    assert_eq!(
        wire["dom_config"]["selectors"],
        json!({"container": "div.deal-card", "title": "h2 a"})
    );

    // The payload survives a wire round trip intact.
    let back: JobConfig = serde_json::from_value(wire).unwrap();
    assert_eq!(back, payload);
}

#[test]
fn wait_action_editing_scenario() {
    let mut editor = ActionListEditor::new();
    assert!(editor.is_empty());

    editor.begin_create(ActionType::Wait);
    editor
        .commit(Action {
            kind: ActionKind::Wait { duration: 3.0 },
            wait_after: 2.0,
        })
        .unwrap();

    assert_eq!(editor.len(), 1);
    assert_eq!(editor.entries()[0].describe(), "Wait 3s");
    assert_eq!(editor.entries()[0].wait_after, 0.0);
}

#[test]
fn reordering_matches_rendered_order() {
    let mut editor = ActionListEditor::with_entries(vec![
        Action {
            kind: ActionKind::ClickCoordinates { x: 10, y: 20 },
            wait_after: 2.0,
        },
        Action {
            kind: ActionKind::Wait { duration: 1.0 },
            wait_after: 0.0,
        },
    ]);

    editor.move_down(0).unwrap();

    let wire = serde_json::to_value(editor.entries()).unwrap();
    assert_eq!(
        wire,
        json!([
            {"type": "wait", "duration": 1.0, "wait_after": 0.0},
            {"type": "click_coordinates", "x": 10, "y": 20, "wait_after": 2.0},
        ])
    );
}

#[test]
fn open_edit_session_does_not_affect_serialization() {
    let mut editor = ActionListEditor::with_entries(vec![Action {
        kind: ActionKind::PressKey { key: KeyName::End },
        wait_after: 1.5,
    }]);
    editor.begin_edit(0).unwrap();

    // Entries are emitted in full while the form is still open.
    let wire = serde_json::to_value(editor.entries()).unwrap();
    assert_eq!(
        wire,
        json!([{"type": "press_key", "key": "end", "wait_after": 1.5}])
    );
}

#[test]
fn regions_scale_per_capture() {
    let mut regions = RegionListEditor::new();

    // First capture shown at half size.
    let scale = CaptureScale::new(1920, 1080, 960.0, 540.0);
    regions
        .create(
            DisplayRect { x: 100.0, y: 50.0, width: 30.0, height: 20.0 },
            "price",
            scale,
        )
        .unwrap();
    assert_eq!(regions.regions()[0].x, 200);

    // A later capture rendered full size scales differently.
    let scale = CaptureScale::new(1920, 1080, 1920.0, 1080.0);
    regions
        .create(
            DisplayRect { x: 100.0, y: 50.0, width: 30.0, height: 20.0 },
            "total",
            scale,
        )
        .unwrap();
    assert_eq!(regions.regions()[1].x, 100);
}

#[test]
fn extraction_preview_formats_like_the_notifier() {
    let mut data = std::collections::BTreeMap::new();
    data.insert("title".to_string(), "Widget".to_string());
    data.insert("price".to_string(), "9.99".to_string());
    data.insert("_hash".to_string(), "deadbeef".to_string());

    let preview = template::format_message(&data, "{title} now {price} ({stock})");
    assert_eq!(preview, "Widget now 9.99 ()");
}
