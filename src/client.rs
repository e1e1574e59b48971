use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::payload::{DomConfig, JobConfig};
use crate::types::{Action, Region};

/// HTTP client for the automation backend. Every call is one JSON POST;
/// non-2xx responses become errors carrying the server's message, and a
/// 200 with `success: false` is reported through the typed response so the
/// caller can show it without treating it as a transport failure.
pub struct Backend {
    client: Client,
    base: String,
}

/// `{success, error}` plus endpoint-specific fields, mirroring the server.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CaptureResponse {
    pub success: bool,
    #[serde(default)]
    pub screenshot: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub saved_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ActionTestResponse {
    pub success: bool,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ActionsTestResponse {
    pub success: bool,
    #[serde(default)]
    pub actions_executed: u32,
    #[serde(default)]
    pub results: Vec<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegionTestResponse {
    pub success: bool,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ExtractionTestResponse {
    pub success: bool,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub formatted_message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct TelegramTestResponse {
    pub success: bool,
    #[serde(default)]
    pub bot_username: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SelectorTestResponse {
    pub success: bool,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub samples: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct FieldTestResponse {
    pub success: bool,
    #[serde(default)]
    pub container_count: u32,
    #[serde(default)]
    pub found_count: u32,
    #[serde(default)]
    pub samples: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DomExtractionResponse {
    pub success: bool,
    #[serde(default)]
    pub data: Vec<BTreeMap<String, String>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PageInfoResponse {
    pub success: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SaveJobResponse {
    pub success: bool,
    #[serde(default)]
    pub job_id: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AiSelectorResponse {
    pub success: bool,
    #[serde(default)]
    pub container_selector: Option<String>,
    #[serde(default)]
    pub field_selectors: BTreeMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Backend {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Backend {
            client: Client::new(),
            base,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let value: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let msg = value["error"].as_str().unwrap_or("unknown server error");
            eprintln!("[Backend] {path} failed ({status}): {msg}");
            return Err(anyhow!("backend error ({status}): {msg}"));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Grab a fresh full-screen capture for the region selector.
    pub async fn capture_screen(&self) -> Result<CaptureResponse> {
        self.post("/api/capture-screen", &json!({})).await
    }

    /// Run one action immediately so the user can watch it happen.
    pub async fn test_action(&self, action: &Action) -> Result<ActionTestResponse> {
        self.post("/api/test-action", action).await
    }

    /// Replay the whole action sequence in order.
    pub async fn test_actions(&self, actions: &[Action]) -> Result<ActionsTestResponse> {
        self.post("/api/test-actions", &json!({ "actions": actions }))
            .await
    }

    /// OCR one region of an already-captured screenshot.
    pub async fn test_region(
        &self,
        screenshot_b64: &str,
        region: &Region,
    ) -> Result<RegionTestResponse> {
        self.post(
            "/api/test-region",
            &json!({ "screenshot": screenshot_b64, "region": region }),
        )
        .await
    }

    /// Capture, OCR every region, and preview the formatted message.
    pub async fn test_extraction(
        &self,
        regions: &[Region],
        format_template: &str,
    ) -> Result<ExtractionTestResponse> {
        self.post(
            "/api/test-extraction",
            &json!({ "ocr_regions": regions, "format_template": format_template }),
        )
        .await
    }

    /// Verify the bot token and send a test message to the chat.
    pub async fn test_telegram(
        &self,
        bot_token: &str,
        chat_id: &str,
    ) -> Result<TelegramTestResponse> {
        self.post(
            "/api/test-telegram",
            &json!({ "telegram_bot_token": bot_token, "telegram_chat_id": chat_id }),
        )
        .await
    }

    /// Count matches for a CSS selector on the page the backend is driving.
    pub async fn test_dom_selector(&self, selector: &str) -> Result<SelectorTestResponse> {
        self.post("/api/test-dom-selector", &json!({ "selector": selector }))
            .await
    }

    /// Check a field selector inside each container match.
    pub async fn test_dom_field(
        &self,
        container_selector: &str,
        field_selector: &str,
        field_name: &str,
    ) -> Result<FieldTestResponse> {
        self.post(
            "/api/test-dom-field",
            &json!({
                "container_selector": container_selector,
                "field_selector": field_selector,
                "field_name": field_name,
            }),
        )
        .await
    }

    /// Where the backend's browser currently is.
    pub async fn page_info(&self) -> Result<PageInfoResponse> {
        let response = self
            .client
            .get(format!("{}/api/dom-page-info", self.base))
            .send()
            .await?;

        let status = response.status();
        let value: serde_json::Value = response.json().await?;

        if !status.is_success() {
            let msg = value["error"].as_str().unwrap_or("unknown server error");
            return Err(anyhow!("backend error ({status}): {msg}"));
        }

        Ok(serde_json::from_value(value)?)
    }

    /// Dry-run the full DOM extraction with the current configuration.
    pub async fn test_dom_extraction(&self, config: &DomConfig) -> Result<DomExtractionResponse> {
        self.post("/api/test-dom-extraction", config).await
    }

    /// Persist the job; the server answers with its id.
    pub async fn save_job(&self, job: &JobConfig) -> Result<SaveJobResponse> {
        self.post("/api/dom-job", job).await
    }

    /// Ask the backend's LLM bridge to derive selectors from a sample
    /// HTML block and the values the user wants out of it.
    pub async fn generate_selectors_ai(
        &self,
        html_block: &str,
        example_data: &BTreeMap<String, String>,
        api_key: &str,
    ) -> Result<AiSelectorResponse> {
        self.post(
            "/api/generate-selectors-ai",
            &json!({
                "html_block": html_block,
                "example_data": example_data,
                "api_key": api_key,
            }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let backend = Backend::new("http://127.0.0.1:5000/");
        assert_eq!(backend.base_url(), "http://127.0.0.1:5000");
    }

    #[test]
    fn responses_tolerate_missing_optional_fields() {
        let r: RegionTestResponse =
            serde_json::from_value(json!({"success": false, "error": "no text"})).unwrap();
        assert!(!r.success);
        assert_eq!(r.text, "");
        assert_eq!(r.error.as_deref(), Some("no text"));

        let r: SelectorTestResponse =
            serde_json::from_value(json!({"success": true, "count": 12, "samples": ["a", "b"]}))
                .unwrap();
        assert_eq!(r.count, 12);
        assert_eq!(r.samples.len(), 2);
    }
}
