use serde::{Deserialize, Serialize};

/// One pre-extraction step the backend replays before scraping a page.
/// Serializes to the wire shape `{"type": "...", ...fields, "wait_after": n}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(flatten)]
    pub kind: ActionKind,
    pub wait_after: f64,
}

/// The kind-specific payload of an action. Exactly one variant per entry,
/// so a `click_ocr` record can never carry `scroll` fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    ClickCoordinates {
        x: u32,
        y: u32,
    },
    ClickOcr {
        search_text: String,
        confidence_threshold: f64,
    },
    Wait {
        duration: f64,
    },
    Scroll {
        direction: ScrollDirection,
        amount: u32,
    },
    PressKey {
        key: KeyName,
    },
}

/// Field-less kind selector, used when opening an edit form or switching
/// which field set it shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    ClickCoordinates,
    ClickOcr,
    Wait,
    Scroll,
    PressKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Keys the backend's input driver knows how to press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyName {
    Enter,
    Tab,
    Escape,
    Space,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    PageUp,
    PageDown,
    Home,
    End,
    F5,
}

/// A named rectangle on a captured screenshot, in native screenshot pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One row of the DOM field-selector table. Either side may still be empty
/// while the user is typing; incomplete rows are dropped at serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSelector {
    pub name: String,
    pub selector: String,
}

impl FieldSelector {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty() && !self.selector.trim().is_empty()
    }
}

impl ActionKind {
    /// A fresh field set with this kind's defaults, used to pre-populate the
    /// edit form when creating an entry or switching kinds mid-session.
    pub fn default_for(kind: ActionType) -> Self {
        match kind {
            ActionType::ClickCoordinates => ActionKind::ClickCoordinates { x: 0, y: 0 },
            ActionType::ClickOcr => ActionKind::ClickOcr {
                search_text: String::new(),
                confidence_threshold: DEFAULT_OCR_CONFIDENCE,
            },
            ActionType::Wait => ActionKind::Wait { duration: 2.0 },
            ActionType::Scroll => ActionKind::Scroll {
                direction: ScrollDirection::Down,
                amount: DEFAULT_SCROLL_AMOUNT,
            },
            ActionType::PressKey => ActionKind::PressKey {
                key: KeyName::Enter,
            },
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            ActionKind::ClickCoordinates { .. } => ActionType::ClickCoordinates,
            ActionKind::ClickOcr { .. } => ActionType::ClickOcr,
            ActionKind::Wait { .. } => ActionType::Wait,
            ActionKind::Scroll { .. } => ActionType::Scroll,
            ActionKind::PressKey { .. } => ActionType::PressKey,
        }
    }
}

impl Action {
    pub fn default_for(kind: ActionType) -> Self {
        Action {
            kind: ActionKind::default_for(kind),
            wait_after: DEFAULT_WAIT_AFTER,
        }
    }

    /// Human-readable one-line label for list rendering. Pure.
    pub fn describe(&self) -> String {
        match &self.kind {
            ActionKind::ClickCoordinates { x, y } => format!("Click at ({x}, {y})"),
            ActionKind::ClickOcr { search_text, .. } => {
                format!("Click text \"{search_text}\"")
            }
            ActionKind::Wait { duration } => format!("Wait {}s", fmt_secs(*duration)),
            ActionKind::Scroll { direction, amount } => {
                format!("Scroll {} {}px", direction.as_str(), amount)
            }
            ActionKind::PressKey { key } => {
                format!("Press {}", key.as_str().to_uppercase())
            }
        }
    }
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

impl KeyName {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyName::Enter => "enter",
            KeyName::Tab => "tab",
            KeyName::Escape => "escape",
            KeyName::Space => "space",
            KeyName::Backspace => "backspace",
            KeyName::Delete => "delete",
            KeyName::Up => "up",
            KeyName::Down => "down",
            KeyName::Left => "left",
            KeyName::Right => "right",
            KeyName::PageUp => "pageup",
            KeyName::PageDown => "pagedown",
            KeyName::Home => "home",
            KeyName::End => "end",
            KeyName::F5 => "f5",
        }
    }
}

/// Print whole seconds without the trailing ".0" ("Wait 3s", "Wait 1.5s").
fn fmt_secs(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

pub const DEFAULT_WAIT_AFTER: f64 = 2.0;
pub const DEFAULT_OCR_CONFIDENCE: f64 = 0.7;
pub const MIN_WAIT_DURATION: f64 = 0.5;
pub const MIN_SCROLL_AMOUNT: u32 = 100;
pub const DEFAULT_SCROLL_AMOUNT: u32 = 300;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_wire_shape_click_coordinates() {
        let action = Action {
            kind: ActionKind::ClickCoordinates { x: 120, y: 340 },
            wait_after: 2.0,
        };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"type": "click_coordinates", "x": 120, "y": 340, "wait_after": 2.0})
        );
    }

    #[test]
    fn action_wire_shape_click_ocr() {
        let action = Action {
            kind: ActionKind::ClickOcr {
                search_text: "Sign in".into(),
                confidence_threshold: 0.7,
            },
            wait_after: 1.0,
        };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({
                "type": "click_ocr",
                "search_text": "Sign in",
                "confidence_threshold": 0.7,
                "wait_after": 1.0
            })
        );
    }

    #[test]
    fn action_round_trips_through_wire_format() {
        let actions = vec![
            Action {
                kind: ActionKind::Scroll {
                    direction: ScrollDirection::Up,
                    amount: 500,
                },
                wait_after: 0.5,
            },
            Action {
                kind: ActionKind::PressKey { key: KeyName::PageDown },
                wait_after: 2.0,
            },
            Action {
                kind: ActionKind::Wait { duration: 3.5 },
                wait_after: 0.0,
            },
        ];
        let text = serde_json::to_string(&actions).unwrap();
        let back: Vec<Action> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, actions);
    }

    #[test]
    fn key_names_match_backend_driver() {
        assert_eq!(serde_json::to_value(KeyName::PageUp).unwrap(), json!("pageup"));
        assert_eq!(serde_json::to_value(KeyName::F5).unwrap(), json!("f5"));
        let key: KeyName = serde_json::from_value(json!("escape")).unwrap();
        assert_eq!(key, KeyName::Escape);
    }

    #[test]
    fn describe_labels() {
        let click = Action {
            kind: ActionKind::ClickCoordinates { x: 120, y: 340 },
            wait_after: 2.0,
        };
        assert_eq!(click.describe(), "Click at (120, 340)");

        let wait = Action {
            kind: ActionKind::Wait { duration: 3.0 },
            wait_after: 0.0,
        };
        assert_eq!(wait.describe(), "Wait 3s");

        let half = Action {
            kind: ActionKind::Wait { duration: 1.5 },
            wait_after: 0.0,
        };
        assert_eq!(half.describe(), "Wait 1.5s");

        let key = Action {
            kind: ActionKind::PressKey { key: KeyName::Enter },
            wait_after: 2.0,
        };
        assert_eq!(key.describe(), "Press ENTER");

        let scroll = Action {
            kind: ActionKind::Scroll {
                direction: ScrollDirection::Down,
                amount: 300,
            },
            wait_after: 2.0,
        };
        assert_eq!(scroll.describe(), "Scroll down 300px");
    }
}
