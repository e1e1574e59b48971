use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern"));

/// Separator between items in a batched notification.
pub const BATCH_SEPARATOR: &str = "\n\n---\n\n";

/// Telegram rejects messages past 4096 chars; warn a little early.
pub const TELEGRAM_SOFT_LIMIT: usize = 4000;

/// Fill `{key}` placeholders in `template` from one extracted-item record.
/// Keys starting with `_` are metadata and never substituted; placeholders
/// with no matching field come out as the empty string.
pub fn format_message(data: &BTreeMap<String, String>, template: &str) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let key = &caps[1];
            if key.starts_with('_') {
                return String::new();
            }
            data.get(key).cloned().unwrap_or_default()
        })
        .into_owned()
}

/// Format each item and join them into one message.
pub fn format_batch(items: &[BTreeMap<String, String>], template: &str, separator: &str) -> String {
    let combined = items
        .iter()
        .map(|item| format_message(item, template))
        .collect::<Vec<_>>()
        .join(separator);

    if combined.len() > TELEGRAM_SOFT_LIMIT {
        eprintln!(
            "[Template] Batched message is {} chars, Telegram may truncate it",
            combined.len()
        );
    }

    combined
}

/// Escape text destined for a Telegram HTML-mode message.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
