use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::selectors::SelectorRows;
use crate::types::Action;

/// DOM-extraction settings nested inside the job save payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomConfig {
    pub url: String,
    /// `container` plus one entry per complete field-selector row.
    pub selectors: BTreeMap<String, String>,
    pub wait_for_selector: Option<String>,
    pub wait_time: f64,
    pub pre_extraction_actions: Vec<Action>,
}

/// The full job record the server persists. `id` is absent on first save;
/// the server assigns one and later saves become updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    pub job_type: String,
    pub dom_config: DomConfig,
    pub format_template: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub enable_deduplication: bool,
    pub schedule_interval_hours: f64,
    pub active: bool,
    pub pre_extraction_actions: Vec<Action>,
}

/// Everything on the job form that is not one of the three lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobMeta {
    pub id: Option<i64>,
    pub name: String,
    pub url: String,
    pub container_selector: String,
    pub wait_for_selector: String,
    pub wait_time: f64,
    pub format_template: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    pub enable_deduplication: bool,
    pub schedule_interval_hours: f64,
    pub active: bool,
}

impl Default for JobMeta {
    fn default() -> Self {
        JobMeta {
            id: None,
            name: String::new(),
            url: String::new(),
            container_selector: String::new(),
            wait_for_selector: String::new(),
            wait_time: 2.0,
            format_template: String::new(),
            telegram_bot_token: String::new(),
            telegram_chat_id: String::new(),
            enable_deduplication: true,
            schedule_interval_hours: 1.0,
            active: true,
        }
    }
}

/// Map the server's extraction script expects: the `container` selector
/// plus each complete field row, incomplete rows dropped.
pub fn selector_map(container: &str, rows: &SelectorRows) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    map.insert("container".to_string(), container.to_string());
    for row in rows.complete() {
        map.insert(row.name.trim().to_string(), row.selector.trim().to_string());
    }
    map
}

impl JobConfig {
    /// Assemble the save payload from the current editing state. Entries are
    /// emitted in list order, in full, regardless of any open edit session.
    pub fn assemble(meta: &JobMeta, actions: &[Action], selectors: &SelectorRows) -> Self {
        let wait_for = meta.wait_for_selector.trim();
        JobConfig {
            id: meta.id,
            name: meta.name.clone(),
            url: meta.url.clone(),
            job_type: "dom_extraction".to_string(),
            dom_config: DomConfig {
                url: meta.url.clone(),
                selectors: selector_map(&meta.container_selector, selectors),
                wait_for_selector: (!wait_for.is_empty()).then(|| wait_for.to_string()),
                wait_time: meta.wait_time,
                pre_extraction_actions: actions.to_vec(),
            },
            format_template: meta.format_template.clone(),
            telegram_bot_token: meta.telegram_bot_token.clone(),
            telegram_chat_id: meta.telegram_chat_id.clone(),
            enable_deduplication: meta.enable_deduplication,
            schedule_interval_hours: meta.schedule_interval_hours,
            active: meta.active,
            pre_extraction_actions: actions.to_vec(),
        }
    }
}
