use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::Html;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::client::Backend;
use crate::editor::ActionListEditor;
use crate::payload::{DomConfig, JobConfig, JobMeta, selector_map};
use crate::regions::{CaptureScale, DisplayRect, RegionListEditor};
use crate::selectors::{SelectorField, SelectorRows};
use crate::template;
use crate::types::{Action, ActionType};
use crate::view;

/// All mutable state of one editing session. Created empty when the server
/// starts, discarded with it; the backend owns the durable copy after save.
pub struct Workbench {
    pub meta: JobMeta,
    pub actions: ActionListEditor,
    pub regions: RegionListEditor,
    pub selectors: SelectorRows,
    pub capture: Option<Capture>,
}

impl Workbench {
    pub fn new() -> Self {
        Workbench {
            meta: JobMeta::default(),
            actions: ActionListEditor::new(),
            regions: RegionListEditor::new(),
            selectors: SelectorRows::new(),
            capture: None,
        }
    }

    fn dom_config(&self) -> DomConfig {
        let wait_for = self.meta.wait_for_selector.trim();
        DomConfig {
            url: self.meta.url.clone(),
            selectors: selector_map(&self.meta.container_selector, &self.selectors),
            wait_for_selector: (!wait_for.is_empty()).then(|| wait_for.to_string()),
            wait_time: self.meta.wait_time,
            pre_extraction_actions: self.actions.entries().to_vec(),
        }
    }
}

impl Default for Workbench {
    fn default() -> Self {
        Self::new()
    }
}

/// The most recent screen capture, kept so regions can be drawn and tested
/// without re-capturing.
#[derive(Clone)]
pub struct Capture {
    pub screenshot: String,
    pub width: u32,
    pub height: u32,
}

/// Outcomes of backend test calls, streamed to the page via SSE.
#[derive(Clone, Debug)]
pub enum TestEvent {
    Started { source: String },
    Finished { source: String, success: bool, summary: String, detail: Value },
    Failed { source: String, message: String },
}

impl TestEvent {
    fn to_sse_event(&self) -> Event {
        match self {
            TestEvent::Started { source } => Event::default()
                .event("test_started")
                .data(json!({"source": source}).to_string()),
            TestEvent::Finished {
                source,
                success,
                summary,
                detail,
            } => Event::default().event("test_result").data(
                json!({
                    "source": source,
                    "success": success,
                    "summary": summary,
                    "detail": detail,
                })
                .to_string(),
            ),
            TestEvent::Failed { source, message } => Event::default()
                .event("test_error")
                .data(json!({"source": source, "message": message}).to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub bench: Arc<Mutex<Workbench>>,
    pub backend: Arc<Backend>,
    pub events: broadcast::Sender<TestEvent>,
}

/// Start the editor UI on `port` (falling back to the next few ports if it
/// is taken) and serve until the process exits.
pub async fn serve(port: u16, backend_url: String) -> Result<()> {
    let (events, _) = broadcast::channel::<TestEvent>(64);

    let state = AppState {
        bench: Arc::new(Mutex::new(Workbench::new())),
        backend: Arc::new(Backend::new(backend_url)),
        events,
    };

    eprintln!("[Face] Backend at {}", state.backend.base_url());

    let app = Router::new()
        .route("/", get(index_handler))
        .route("/state", get(state_handler))
        .route("/job", post(job_handler))
        .route("/capture", post(capture_handler))
        .route("/actions/begin", post(actions_begin))
        .route("/actions/kind", post(actions_kind))
        .route("/actions/commit", post(actions_commit))
        .route("/actions/cancel", post(actions_cancel))
        .route("/actions/delete", post(actions_delete))
        .route("/actions/move", post(actions_move))
        .route("/regions/create", post(regions_create))
        .route("/regions/delete", post(regions_delete))
        .route("/regions/move", post(regions_move))
        .route("/selectors/add", post(selectors_add))
        .route("/selectors/update", post(selectors_update))
        .route("/selectors/remove", post(selectors_remove))
        .route("/test/action", post(test_action))
        .route("/test/actions", post(test_actions))
        .route("/test/region", post(test_region))
        .route("/test/extraction", post(test_extraction))
        .route("/test/telegram", post(test_telegram))
        .route("/test/selector", post(test_selector))
        .route("/test/field", post(test_field))
        .route("/test/dom-extraction", post(test_dom_extraction))
        .route("/page-info", get(page_info))
        .route("/save", post(save_job))
        .route("/ai/selectors", post(ai_selectors))
        .route("/events", get(sse_handler))
        .route(
            "/favicon.ico",
            get(|| async { axum::http::StatusCode::NO_CONTENT }),
        )
        .with_state(state);

    // Try the requested port, fall back to the next nine if in use.
    let mut listener = None;
    let mut bound = port;
    for p in port..port + 10 {
        match tokio::net::TcpListener::bind(format!("127.0.0.1:{}", p)).await {
            Ok(l) => {
                listener = Some(l);
                bound = p;
                break;
            }
            Err(_) => continue,
        }
    }
    let listener = match listener {
        Some(l) => l,
        None => anyhow::bail!("could not bind any port in {port}-{}", port + 9),
    };

    eprintln!("[Face] Job editor running at http://localhost:{}", bound);
    axum::serve(listener, app).await?;
    Ok(())
}

fn ok() -> Json<Value> {
    Json(json!({"success": true}))
}

fn ok_with(extra: Value) -> Json<Value> {
    let mut body = json!({"success": true});
    if let (Some(map), Some(more)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in more {
            map.insert(k.clone(), v.clone());
        }
    }
    Json(body)
}

fn fail(message: impl std::fmt::Display) -> Json<Value> {
    Json(json!({"success": false, "error": message.to_string()}))
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn state_handler(State(state): State<AppState>) -> Json<Value> {
    let bench = state.bench.lock().unwrap();
    let capture = bench.capture.as_ref().map(|c| {
        json!({
            "screenshot": c.screenshot,
            "width": c.width,
            "height": c.height,
        })
    });
    Json(json!({
        "meta": bench.meta,
        "actions": view::action_rows(&bench.actions),
        "session": view::session_view(&bench.actions),
        "regions": view::region_rows(&bench.regions),
        "selectors": view::selector_rows(&bench.selectors),
        "capture": capture,
    }))
}

async fn job_handler(State(state): State<AppState>, Json(meta): Json<JobMeta>) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    // A form post never clears a server-assigned id.
    let id = meta.id.or(bench.meta.id);
    bench.meta = JobMeta { id, ..meta };
    ok()
}

async fn capture_handler(State(state): State<AppState>) -> Json<Value> {
    eprintln!("[Face] Capturing screen...");
    match state.backend.capture_screen().await {
        Ok(r) if r.success => {
            let capture = Capture {
                screenshot: r.screenshot,
                width: r.width,
                height: r.height,
            };
            let body = json!({
                "screenshot": capture.screenshot,
                "width": capture.width,
                "height": capture.height,
            });
            state.bench.lock().unwrap().capture = Some(capture);
            ok_with(body)
        }
        Ok(r) => fail(r.error.unwrap_or_else(|| "capture failed".into())),
        Err(e) => fail(format!("{e:#}")),
    }
}

#[derive(Deserialize)]
struct BeginPayload {
    kind: Option<ActionType>,
    index: Option<usize>,
}

async fn actions_begin(
    State(state): State<AppState>,
    Json(payload): Json<BeginPayload>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    match payload.index {
        Some(index) => match bench.actions.begin_edit(index) {
            Ok(_) => ok(),
            Err(e) => fail(e),
        },
        None => {
            let kind = payload.kind.unwrap_or(ActionType::ClickCoordinates);
            bench.actions.begin_create(kind);
            ok()
        }
    }
}

#[derive(Deserialize)]
struct KindPayload {
    kind: ActionType,
}

async fn actions_kind(
    State(state): State<AppState>,
    Json(payload): Json<KindPayload>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    match bench.actions.session_mut() {
        Some(session) => {
            session.change_kind(payload.kind);
            ok()
        }
        None => fail(crate::editor::EditorError::NoSession),
    }
}

async fn actions_commit(
    State(state): State<AppState>,
    Json(candidate): Json<Action>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    match bench.actions.commit(candidate) {
        Ok(index) => ok_with(json!({"index": index})),
        Err(e) => fail(e),
    }
}

async fn actions_cancel(State(state): State<AppState>) -> Json<Value> {
    state.bench.lock().unwrap().actions.cancel();
    ok()
}

#[derive(Deserialize)]
struct IndexPayload {
    index: usize,
}

async fn actions_delete(
    State(state): State<AppState>,
    Json(payload): Json<IndexPayload>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    match bench.actions.delete(payload.index) {
        Ok(removed) => {
            eprintln!("[Face] Deleted action: {}", removed.describe());
            ok()
        }
        Err(e) => fail(e),
    }
}

#[derive(Deserialize)]
struct MovePayload {
    index: usize,
    direction: MoveDirection,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum MoveDirection {
    Up,
    Down,
}

async fn actions_move(
    State(state): State<AppState>,
    Json(payload): Json<MovePayload>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    let result = match payload.direction {
        MoveDirection::Up => bench.actions.move_up(payload.index),
        MoveDirection::Down => bench.actions.move_down(payload.index),
    };
    match result {
        Ok(moved) => ok_with(json!({"moved": moved})),
        Err(e) => fail(e),
    }
}

#[derive(Deserialize)]
struct RegionCreatePayload {
    name: String,
    rect: RectPayload,
    display_width: f64,
    display_height: f64,
}

#[derive(Deserialize)]
struct RectPayload {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

async fn regions_create(
    State(state): State<AppState>,
    Json(payload): Json<RegionCreatePayload>,
) -> Json<Value> {
    let (region, screenshot) = {
        let mut bench = state.bench.lock().unwrap();
        let Some(capture) = bench.capture.clone() else {
            return fail("capture a screen before selecting regions");
        };
        // The preview is sized by CSS, so the scale is only valid for the
        // dimensions this very selection was made at.
        let scale = CaptureScale::new(
            capture.width,
            capture.height,
            payload.display_width,
            payload.display_height,
        );
        let rect = DisplayRect {
            x: payload.rect.x,
            y: payload.rect.y,
            width: payload.rect.width,
            height: payload.rect.height,
        };
        match bench.regions.create(rect, &payload.name, scale) {
            Ok(region) => (region.clone(), capture.screenshot),
            Err(e) => return fail(e),
        }
    };

    // Fire an OCR check for immediate feedback. Whatever it says, the
    // region is already in the list.
    let backend = state.backend.clone();
    let events = state.events.clone();
    let source = format!("region: {}", region.name);
    tokio::spawn(async move {
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend.test_region(&screenshot, &region).await {
            Ok(r) => {
                let summary = if r.success {
                    format!("\"{}\" ({:.1}%)", r.text, r.confidence * 100.0)
                } else {
                    r.error.clone().unwrap_or_else(|| "no text".into())
                };
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: r.success,
                    summary,
                    detail: json!({"text": r.text, "confidence": r.confidence}),
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok_with(json!({"region": region}))
}

async fn regions_move(
    State(state): State<AppState>,
    Json(payload): Json<MovePayload>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    let result = match payload.direction {
        MoveDirection::Up => bench.regions.move_up(payload.index),
        MoveDirection::Down => bench.regions.move_down(payload.index),
    };
    match result {
        Ok(moved) => ok_with(json!({"moved": moved})),
        Err(e) => fail(e),
    }
}

async fn regions_delete(
    State(state): State<AppState>,
    Json(payload): Json<IndexPayload>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    match bench.regions.delete(payload.index) {
        Ok(removed) => {
            eprintln!("[Face] Deleted region: {}", removed.name);
            // Overlays are baked into the preview; the page re-captures.
            bench.capture = None;
            ok()
        }
        Err(e) => fail(e),
    }
}

#[derive(Deserialize, Default)]
struct SelectorAddPayload {
    #[serde(default)]
    name: String,
    #[serde(default)]
    selector: String,
}

async fn selectors_add(
    State(state): State<AppState>,
    Json(payload): Json<SelectorAddPayload>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    if payload.name.is_empty() && payload.selector.is_empty() {
        bench.selectors.add_blank();
    } else {
        bench.selectors.add(&payload.name, &payload.selector);
    }
    ok()
}

#[derive(Deserialize)]
struct SelectorUpdatePayload {
    index: usize,
    field: SelectorField,
    value: String,
}

async fn selectors_update(
    State(state): State<AppState>,
    Json(payload): Json<SelectorUpdatePayload>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    match bench
        .selectors
        .update(payload.index, payload.field, &payload.value)
    {
        Ok(()) => ok(),
        Err(e) => fail(e),
    }
}

async fn selectors_remove(
    State(state): State<AppState>,
    Json(payload): Json<IndexPayload>,
) -> Json<Value> {
    let mut bench = state.bench.lock().unwrap();
    match bench.selectors.remove(payload.index) {
        Ok(()) => ok(),
        Err(e) => fail(e),
    }
}

async fn test_action(
    State(state): State<AppState>,
    Json(payload): Json<IndexPayload>,
) -> Json<Value> {
    let entry = {
        let bench = state.bench.lock().unwrap();
        match bench.actions.entries().get(payload.index) {
            Some(a) => a.clone(),
            None => return fail(format!("no action at index {}", payload.index)),
        }
    };

    let backend = state.backend.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let source = format!("action: {}", entry.describe());
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend.test_action(&entry).await {
            Ok(r) => {
                let summary = if r.success {
                    "executed".to_string()
                } else {
                    r.error.clone().unwrap_or_else(|| "failed".into())
                };
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: r.success,
                    summary,
                    detail: r.details.unwrap_or(Value::Null),
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

async fn test_actions(State(state): State<AppState>) -> Json<Value> {
    let entries = {
        let bench = state.bench.lock().unwrap();
        bench.actions.entries().to_vec()
    };
    if entries.is_empty() {
        return fail("no actions to test");
    }

    let backend = state.backend.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let source = format!("{} actions", entries.len());
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend.test_actions(&entries).await {
            Ok(r) => {
                let summary = if r.success {
                    format!("{} executed", r.actions_executed)
                } else {
                    format!(
                        "stopped after {} ({})",
                        r.actions_executed,
                        r.error.clone().unwrap_or_else(|| "failure".into())
                    )
                };
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: r.success,
                    summary,
                    detail: json!({"results": r.results}),
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

async fn test_region(
    State(state): State<AppState>,
    Json(payload): Json<IndexPayload>,
) -> Json<Value> {
    let (region, screenshot) = {
        let bench = state.bench.lock().unwrap();
        let Some(capture) = bench.capture.as_ref() else {
            return fail("capture a screen before testing regions");
        };
        match bench.regions.regions().get(payload.index) {
            Some(r) => (r.clone(), capture.screenshot.clone()),
            None => return fail(format!("no region at index {}", payload.index)),
        }
    };

    let backend = state.backend.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let source = format!("region: {}", region.name);
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend.test_region(&screenshot, &region).await {
            Ok(r) => {
                let summary = if r.success {
                    format!("\"{}\" ({:.1}%)", r.text, r.confidence * 100.0)
                } else {
                    r.error.clone().unwrap_or_else(|| "no text".into())
                };
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: r.success,
                    summary,
                    detail: json!({"text": r.text, "confidence": r.confidence}),
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

async fn test_extraction(State(state): State<AppState>) -> Json<Value> {
    let (regions, template) = {
        let bench = state.bench.lock().unwrap();
        (
            bench.regions.regions().to_vec(),
            bench.meta.format_template.clone(),
        )
    };
    if regions.is_empty() {
        return fail("no regions defined");
    }

    let backend = state.backend.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let source = format!("extraction ({} regions)", regions.len());
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend.test_extraction(&regions, &template).await {
            Ok(r) => {
                // Older backends skip the formatting step; preview locally.
                let summary = match (&r.formatted_message, r.success) {
                    (Some(msg), true) => msg.clone(),
                    (None, true) => template::format_message(&r.data, &template),
                    _ => r.error.clone().unwrap_or_else(|| "failed".into()),
                };
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: r.success,
                    summary,
                    detail: json!({"data": r.data, "formatted_message": r.formatted_message}),
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

async fn test_telegram(State(state): State<AppState>) -> Json<Value> {
    let (token, chat_id) = {
        let bench = state.bench.lock().unwrap();
        (
            bench.meta.telegram_bot_token.clone(),
            bench.meta.telegram_chat_id.clone(),
        )
    };
    if token.trim().is_empty() || chat_id.trim().is_empty() {
        return fail("bot token and chat id are required");
    }

    let backend = state.backend.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let source = "telegram".to_string();
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend.test_telegram(&token, &chat_id).await {
            Ok(r) => {
                let summary = if r.success {
                    format!(
                        "connected as @{}, test message sent",
                        r.bot_username.clone().unwrap_or_else(|| "?".into())
                    )
                } else {
                    r.error.clone().unwrap_or_else(|| "failed".into())
                };
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: r.success,
                    summary,
                    detail: json!({"message_id": r.message_id}),
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

#[derive(Deserialize)]
struct SelectorTestPayload {
    selector: String,
}

async fn test_selector(
    State(state): State<AppState>,
    Json(payload): Json<SelectorTestPayload>,
) -> Json<Value> {
    if payload.selector.trim().is_empty() {
        return fail("selector is empty");
    }

    let backend = state.backend.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let source = format!("selector: {}", payload.selector);
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend.test_dom_selector(&payload.selector).await {
            Ok(r) => {
                let summary = if r.success {
                    format!("{} matches", r.count)
                } else {
                    r.error.clone().unwrap_or_else(|| "failed".into())
                };
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: r.success,
                    summary,
                    detail: json!({"count": r.count, "samples": r.samples}),
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

async fn test_field(
    State(state): State<AppState>,
    Json(payload): Json<IndexPayload>,
) -> Json<Value> {
    let (container, row) = {
        let bench = state.bench.lock().unwrap();
        let container = bench.meta.container_selector.clone();
        match bench.selectors.rows().get(payload.index) {
            Some(r) => (container, r.clone()),
            None => return fail(format!("no selector row at index {}", payload.index)),
        }
    };
    if container.trim().is_empty() {
        return fail("set a container selector first");
    }
    if !row.is_complete() {
        return fail("fill in the row's name and selector first");
    }

    let backend = state.backend.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let source = format!("field: {}", row.name);
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend
            .test_dom_field(&container, &row.selector, &row.name)
            .await
        {
            Ok(r) => {
                let summary = if r.success {
                    format!("found in {}/{} containers", r.found_count, r.container_count)
                } else {
                    r.error.clone().unwrap_or_else(|| "failed".into())
                };
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: r.success,
                    summary,
                    detail: json!({"samples": r.samples}),
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

async fn test_dom_extraction(State(state): State<AppState>) -> Json<Value> {
    let (config, template) = {
        let bench = state.bench.lock().unwrap();
        (bench.dom_config(), bench.meta.format_template.clone())
    };

    let backend = state.backend.clone();
    let events = state.events.clone();
    tokio::spawn(async move {
        let source = "dom extraction".to_string();
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend.test_dom_extraction(&config).await {
            Ok(r) => {
                let summary = if r.success {
                    format!("{} items extracted", r.data.len())
                } else {
                    r.error.clone().unwrap_or_else(|| "failed".into())
                };
                // Show the notification these items would produce.
                let preview = (r.success && !template.trim().is_empty()).then(|| {
                    template::format_batch(&r.data, &template, template::BATCH_SEPARATOR)
                });
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: r.success,
                    summary,
                    detail: json!({"data": r.data, "preview": preview}),
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

async fn page_info(State(state): State<AppState>) -> Json<Value> {
    match state.backend.page_info().await {
        Ok(r) if r.success => ok_with(json!({"url": r.url, "title": r.title})),
        Ok(r) => fail(r.error.unwrap_or_else(|| "not connected".into())),
        Err(e) => fail(format!("{e:#}")),
    }
}

async fn save_job(State(state): State<AppState>) -> Json<Value> {
    let job = {
        let bench = state.bench.lock().unwrap();
        JobConfig::assemble(&bench.meta, bench.actions.entries(), &bench.selectors)
    };
    if job.name.trim().is_empty() {
        return fail("job name is required");
    }

    let backend = state.backend.clone();
    let events = state.events.clone();
    let bench = state.bench.clone();
    tokio::spawn(async move {
        let source = format!("save: {}", job.name);
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend.save_job(&job).await {
            Ok(r) if r.success => {
                if let Some(id) = r.job_id {
                    bench.lock().unwrap().meta.id = Some(id);
                }
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: true,
                    summary: match r.job_id {
                        Some(id) => format!("saved as job #{id}"),
                        None => "saved".to_string(),
                    },
                    detail: json!({"job_id": r.job_id}),
                });
            }
            Ok(r) => {
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: false,
                    summary: r.error.unwrap_or_else(|| "save failed".into()),
                    detail: Value::Null,
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

#[derive(Deserialize)]
struct AiSelectorPayload {
    html_block: String,
    example_data: BTreeMap<String, String>,
    #[serde(default)]
    api_key: Option<String>,
}

async fn ai_selectors(
    State(state): State<AppState>,
    Json(payload): Json<AiSelectorPayload>,
) -> Json<Value> {
    if payload.html_block.trim().is_empty() {
        return fail("paste an HTML block first");
    }
    if payload.example_data.is_empty() {
        return fail("provide at least one example field");
    }
    let api_key = payload
        .api_key
        .filter(|k| !k.trim().is_empty())
        .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok());
    let Some(api_key) = api_key else {
        return fail("no API key given and ANTHROPIC_API_KEY is not set");
    };

    let backend = state.backend.clone();
    let events = state.events.clone();
    let bench = state.bench.clone();
    tokio::spawn(async move {
        let source = "ai selectors".to_string();
        let _ = events.send(TestEvent::Started {
            source: source.clone(),
        });
        match backend
            .generate_selectors_ai(&payload.html_block, &payload.example_data, &api_key)
            .await
        {
            Ok(r) if r.success => {
                // Apply the generated selectors to the form.
                {
                    let mut bench = bench.lock().unwrap();
                    if let Some(container) = &r.container_selector {
                        bench.meta.container_selector = container.clone();
                    }
                    let rows = r
                        .field_selectors
                        .iter()
                        .map(|(name, selector)| crate::types::FieldSelector {
                            name: name.clone(),
                            selector: selector.clone(),
                        })
                        .collect();
                    bench.selectors = SelectorRows::with_rows(rows);
                }
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: true,
                    summary: format!("{} field selectors generated", r.field_selectors.len()),
                    detail: json!({
                        "container_selector": r.container_selector,
                        "field_selectors": r.field_selectors,
                    }),
                });
            }
            Ok(r) => {
                let _ = events.send(TestEvent::Finished {
                    source,
                    success: false,
                    summary: r.error.unwrap_or_else(|| "generation failed".into()),
                    detail: Value::Null,
                });
            }
            Err(e) => {
                let _ = events.send(TestEvent::Failed {
                    source,
                    message: format!("{e:#}"),
                });
            }
        }
    });

    ok()
}

async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result: Result<TestEvent, _>| match result {
        Ok(event) => Some(Ok::<_, Infallible>(event.to_sse_event())),
        Err(_) => None,
    });
    Sse::new(stream)
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Jobforge</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    padding: 24px 32px 60px;
  }
  h1 { font-size: 20px; font-weight: 600; color: #fff; margin-bottom: 16px; }
  h2 { font-size: 15px; font-weight: 600; color: #a5b4fc; margin-bottom: 10px; }
  .grid { display: grid; grid-template-columns: 1fr 1fr; gap: 20px; max-width: 1400px; }
  .panel {
    background: #111118;
    border: 1px solid #1a1a2e;
    border-radius: 10px;
    padding: 16px;
  }
  .panel.wide { grid-column: 1 / -1; }
  label { display: block; font-size: 12px; color: #888; margin: 8px 0 3px; }
  input[type=text], input[type=number], input[type=password], textarea, select {
    width: 100%;
    background: #0a0a0f;
    border: 1px solid #222;
    border-radius: 6px;
    padding: 7px 10px;
    color: #fff;
    font-size: 13px;
    outline: none;
  }
  input:focus, textarea:focus, select:focus { border-color: #6366f1; }
  textarea { resize: vertical; min-height: 60px; font-family: monospace; }
  button {
    background: #6366f1;
    color: #fff;
    border: none;
    border-radius: 6px;
    padding: 7px 14px;
    font-size: 13px;
    font-weight: 600;
    cursor: pointer;
    margin-top: 8px;
  }
  button:hover { background: #4f46e5; }
  button.ghost { background: #1a1a2e; }
  button.ghost:hover { background: #26264a; }
  button.tiny { padding: 3px 8px; font-size: 12px; margin: 0 2px; }
  button.danger { background: #7f1d1d; }
  .row { display: flex; gap: 8px; align-items: end; }
  .row > * { flex: 1; }
  .row > button { flex: 0 0 auto; }
  ul.entries { list-style: none; margin-top: 8px; }
  ul.entries li {
    display: flex;
    align-items: center;
    gap: 8px;
    background: #0a0a0f;
    border-left: 3px solid #3b82f6;
    border-radius: 6px;
    padding: 8px 10px;
    margin-bottom: 6px;
    font-size: 13px;
    font-family: monospace;
  }
  ul.entries li .label { flex: 1; }
  .selector-row { display: flex; gap: 6px; margin-bottom: 6px; }
  .selector-row input { flex: 1; }
  #capture-wrap { position: relative; margin-top: 10px; display: none; }
  #capture-img { width: 100%; display: block; border-radius: 6px; cursor: crosshair; user-select: none; }
  #selection-box {
    position: absolute;
    border: 2px dashed #f59e0b;
    background: rgba(245, 158, 11, 0.15);
    pointer-events: none;
    display: none;
  }
  #log {
    max-height: 260px;
    overflow-y: auto;
    display: flex;
    flex-direction: column;
    gap: 6px;
    margin-top: 8px;
  }
  .entry { padding: 8px 12px; border-radius: 6px; font-size: 13px; }
  .entry pre { margin-top: 6px; white-space: pre-wrap; font-size: 12px; font-family: monospace; }
  .entry.pending { background: #111118; border-left: 3px solid #f59e0b; color: #fcd34d; }
  .entry.ok { background: #0a1a0a; border-left: 3px solid #22c55e; color: #86efac; }
  .entry.err { background: #1a0a0a; border-left: 3px solid #ef4444; color: #fca5a5; }
  #modal-backdrop {
    position: fixed; inset: 0;
    background: rgba(0,0,0,0.6);
    display: none;
    align-items: center;
    justify-content: center;
  }
  #modal {
    background: #111118;
    border: 1px solid #26264a;
    border-radius: 10px;
    padding: 20px;
    width: 420px;
  }
</style>
</head>
<body>
  <h1>Jobforge &mdash; scraping job editor</h1>
  <div class="grid">

    <div class="panel">
      <h2>Job</h2>
      <label>Name</label><input type="text" id="job-name">
      <label>Page URL</label>
      <div class="row">
        <input type="text" id="job-url">
        <button class="ghost" onclick="pageInfo()">Page info</button>
      </div>
      <label>Container selector</label>
      <div class="row">
        <input type="text" id="job-container">
        <button class="ghost" onclick="testSelector()">Test</button>
      </div>
      <label>Wait for selector (optional)</label><input type="text" id="job-waitfor">
      <label>Wait time (s)</label><input type="number" id="job-waittime" step="0.5" value="2">
      <label>Message template</label>
      <textarea id="job-template" placeholder="New item: {title} for {price}"></textarea>
      <label>Telegram bot token</label><input type="password" id="job-token">
      <label>Telegram chat id</label>
      <div class="row">
        <input type="text" id="job-chat">
        <button class="ghost" onclick="post('/test/telegram', {})">Test</button>
      </div>
      <label><input type="checkbox" id="job-dedup" checked> Skip duplicates</label>
      <label>Run every (hours)</label><input type="number" id="job-interval" step="0.5" value="1">
      <label><input type="checkbox" id="job-active" checked> Active</label>
      <div class="row">
        <button onclick="saveJob()">Save job</button>
        <button class="ghost" onclick="post('/test/dom-extraction', {})">Test extraction</button>
        <button class="ghost" onclick="post('/test/extraction', {})">Test OCR regions</button>
      </div>
    </div>

    <div class="panel">
      <h2>Field selectors</h2>
      <div id="selector-rows"></div>
      <button class="ghost" onclick="post('/selectors/add', {})">Add row</button>
      <h2 style="margin-top:18px">AI selector generation</h2>
      <label>HTML block (one item)</label><textarea id="ai-html"></textarea>
      <label>Example data (JSON: {"field": "value"})</label><textarea id="ai-data"></textarea>
      <label>Anthropic API key (optional if set server-side)</label>
      <input type="password" id="ai-key">
      <button onclick="aiGenerate()">Generate selectors</button>
    </div>

    <div class="panel">
      <h2>Pre-extraction actions</h2>
      <ul class="entries" id="action-list"></ul>
      <div class="row">
        <button onclick="beginCreate()">Add action</button>
        <button class="ghost" onclick="post('/test/actions', {})">Test all</button>
      </div>
    </div>

    <div class="panel">
      <h2>OCR regions</h2>
      <button class="ghost" onclick="captureScreen()">Capture screen</button>
      <div id="capture-wrap">
        <img id="capture-img" draggable="false">
        <div id="selection-box"></div>
      </div>
      <ul class="entries" id="region-list"></ul>
    </div>

    <div class="panel wide">
      <h2>Test results</h2>
      <div id="log"></div>
    </div>
  </div>

  <div id="modal-backdrop">
    <div id="modal">
      <h2 id="modal-title">Action</h2>
      <label>Kind</label>
      <select id="action-kind" onchange="changeKind()">
        <option value="click_coordinates">Click at coordinates</option>
        <option value="click_ocr">Click text (OCR)</option>
        <option value="wait">Wait</option>
        <option value="scroll">Scroll</option>
        <option value="press_key">Press key</option>
      </select>
      <div id="action-fields"></div>
      <div class="row">
        <button onclick="commitAction()">Save</button>
        <button class="ghost" onclick="cancelAction()">Cancel</button>
      </div>
    </div>
  </div>

<script>
  const KEYS = ['enter','tab','escape','space','backspace','delete','up','down','left','right','pageup','pagedown','home','end','f5'];
  let state = null;

  function esc(s) { return String(s).replace(/&/g,'&amp;').replace(/</g,'&lt;').replace(/"/g,'&quot;'); }

  async function post(path, body) {
    const res = await fetch(path, {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify(body),
    });
    const data = await res.json();
    if (!data.success) addLog('err', esc(data.error || 'request failed'));
    await loadState();
    return data;
  }

  async function loadState() {
    state = await (await fetch('/state')).json();
    renderJob();
    renderActions();
    renderRegions();
    renderSelectors();
    renderModal();
  }

  function renderJob() {
    const m = state.meta;
    const set = (id, v) => { const el = document.getElementById(id); if (document.activeElement !== el) el.value = v; };
    set('job-name', m.name); set('job-url', m.url);
    set('job-container', m.container_selector); set('job-waitfor', m.wait_for_selector);
    set('job-waittime', m.wait_time); set('job-template', m.format_template);
    set('job-token', m.telegram_bot_token); set('job-chat', m.telegram_chat_id);
    set('job-interval', m.schedule_interval_hours);
    document.getElementById('job-dedup').checked = m.enable_deduplication;
    document.getElementById('job-active').checked = m.active;
  }

  function collectMeta() {
    return {
      id: state ? state.meta.id : null,
      name: document.getElementById('job-name').value,
      url: document.getElementById('job-url').value,
      container_selector: document.getElementById('job-container').value,
      wait_for_selector: document.getElementById('job-waitfor').value,
      wait_time: parseFloat(document.getElementById('job-waittime').value) || 2,
      format_template: document.getElementById('job-template').value,
      telegram_bot_token: document.getElementById('job-token').value,
      telegram_chat_id: document.getElementById('job-chat').value,
      enable_deduplication: document.getElementById('job-dedup').checked,
      schedule_interval_hours: parseFloat(document.getElementById('job-interval').value) || 1,
      active: document.getElementById('job-active').checked,
    };
  }

  async function pushMeta() { await post('/job', collectMeta()); }
  for (const id of ['job-name','job-url','job-container','job-waitfor','job-waittime',
                    'job-template','job-token','job-chat','job-dedup','job-interval','job-active']) {
    document.getElementById(id).addEventListener('change', pushMeta);
  }

  async function saveJob() { await pushMeta(); await post('/save', {}); }
  async function pageInfo() {
    const data = await (await fetch('/page-info')).json();
    if (data.success) addLog('ok', '<strong>page:</strong> ' + esc(data.title) + ' &mdash; ' + esc(data.url));
    else addLog('err', esc(data.error || 'failed'));
  }
  async function testSelector() {
    await pushMeta();
    await post('/test/selector', {selector: document.getElementById('job-container').value});
  }

  function renderActions() {
    const ul = document.getElementById('action-list');
    ul.innerHTML = '';
    for (const row of state.actions) {
      const li = document.createElement('li');
      li.innerHTML =
        '<span class="label">' + esc(row.label) + '</span>' +
        '<button class="tiny ghost" ' + (row.can_move_up ? '' : 'disabled ') +
          'onclick="post(\'/actions/move\', {index: ' + row.index + ', direction: \'up\'})">&#9650;</button>' +
        '<button class="tiny ghost" ' + (row.can_move_down ? '' : 'disabled ') +
          'onclick="post(\'/actions/move\', {index: ' + row.index + ', direction: \'down\'})">&#9660;</button>' +
        '<button class="tiny ghost" onclick="beginEdit(' + row.index + ')">Edit</button>' +
        '<button class="tiny ghost" onclick="post(\'/test/action\', {index: ' + row.index + '})">Test</button>' +
        '<button class="tiny danger" onclick="deleteAction(' + row.index + ')">&#10005;</button>';
      ul.appendChild(li);
    }
  }

  async function deleteAction(index) {
    if (!confirm('Delete this action?')) return;
    await post('/actions/delete', {index});
  }

  async function beginCreate() { await post('/actions/begin', {kind: 'click_coordinates'}); }
  async function beginEdit(index) { await post('/actions/begin', {index}); }
  async function changeKind() {
    await post('/actions/kind', {kind: document.getElementById('action-kind').value});
  }
  async function cancelAction() { await post('/actions/cancel', {}); }

  function renderModal() {
    const backdrop = document.getElementById('modal-backdrop');
    if (!state.session) { backdrop.style.display = 'none'; return; }
    backdrop.style.display = 'flex';
    document.getElementById('modal-title').textContent =
      state.session.mode === 'create' ? 'New action' : 'Edit action #' + (state.session.index + 1);
    const draft = state.session.draft;
    document.getElementById('action-kind').value = draft.type;
    const f = document.getElementById('action-fields');
    let html = '';
    if (draft.type === 'click_coordinates') {
      html += '<label>X</label><input type="number" id="f-x" min="0" value="' + draft.x + '">';
      html += '<label>Y</label><input type="number" id="f-y" min="0" value="' + draft.y + '">';
    } else if (draft.type === 'click_ocr') {
      html += '<label>Search text</label><input type="text" id="f-text" value="' + esc(draft.search_text) + '">';
      html += '<label>Confidence threshold (0-1)</label><input type="number" id="f-conf" step="0.05" min="0" max="1" value="' + draft.confidence_threshold + '">';
    } else if (draft.type === 'wait') {
      html += '<label>Duration (s, min 0.5)</label><input type="number" id="f-duration" step="0.5" min="0.5" value="' + draft.duration + '">';
    } else if (draft.type === 'scroll') {
      html += '<label>Direction</label><select id="f-direction">' +
        '<option value="down"' + (draft.direction === 'down' ? ' selected' : '') + '>down</option>' +
        '<option value="up"' + (draft.direction === 'up' ? ' selected' : '') + '>up</option></select>';
      html += '<label>Amount (px, min 100)</label><input type="number" id="f-amount" min="100" step="50" value="' + draft.amount + '">';
    } else if (draft.type === 'press_key') {
      html += '<label>Key</label><select id="f-key">' +
        KEYS.map(k => '<option value="' + k + '"' + (draft.key === k ? ' selected' : '') + '>' + k + '</option>').join('') +
        '</select>';
    }
    if (draft.type !== 'wait') {
      html += '<label>Wait after (s)</label><input type="number" id="f-waitafter" step="0.5" min="0" value="' + draft.wait_after + '">';
    }
    f.innerHTML = html;
  }

  async function commitAction() {
    const kind = document.getElementById('action-kind').value;
    const num = id => parseFloat(document.getElementById(id).value) || 0;
    const candidate = {type: kind};
    if (kind === 'click_coordinates') {
      candidate.x = Math.max(0, Math.round(num('f-x')));
      candidate.y = Math.max(0, Math.round(num('f-y')));
    } else if (kind === 'click_ocr') {
      candidate.search_text = document.getElementById('f-text').value;
      candidate.confidence_threshold = num('f-conf');
    } else if (kind === 'wait') {
      candidate.duration = num('f-duration');
    } else if (kind === 'scroll') {
      candidate.direction = document.getElementById('f-direction').value;
      candidate.amount = Math.round(num('f-amount'));
    } else if (kind === 'press_key') {
      candidate.key = document.getElementById('f-key').value;
    }
    candidate.wait_after = kind === 'wait' ? 0 : num('f-waitafter');
    await post('/actions/commit', candidate);
  }

  function renderRegions() {
    const ul = document.getElementById('region-list');
    ul.innerHTML = '';
    for (const row of state.regions) {
      const li = document.createElement('li');
      li.innerHTML =
        '<span class="label">' + esc(row.name) + ' ' + esc(row.bounds) + '</span>' +
        '<button class="tiny ghost" ' + (row.index > 0 ? '' : 'disabled ') +
          'onclick="post(\'/regions/move\', {index: ' + row.index + ', direction: \'up\'})">&#9650;</button>' +
        '<button class="tiny ghost" ' + (row.index + 1 < state.regions.length ? '' : 'disabled ') +
          'onclick="post(\'/regions/move\', {index: ' + row.index + ', direction: \'down\'})">&#9660;</button>' +
        '<button class="tiny ghost" onclick="post(\'/test/region\', {index: ' + row.index + '})">Test</button>' +
        '<button class="tiny danger" onclick="deleteRegion(' + row.index + ')">&#10005;</button>';
      ul.appendChild(li);
    }
    const wrap = document.getElementById('capture-wrap');
    if (state.capture) {
      wrap.style.display = 'block';
      const img = document.getElementById('capture-img');
      const src = 'data:image/png;base64,' + state.capture.screenshot;
      if (img.dataset.src !== src) { img.src = src; img.dataset.src = src; }
    } else {
      wrap.style.display = 'none';
    }
  }

  async function deleteRegion(index) {
    if (!confirm('Delete this region? The preview will need a fresh capture.')) return;
    await post('/regions/delete', {index});
    await captureScreen();
  }

  async function captureScreen() { await post('/capture', {}); }

  // Drag-select a region on the preview image.
  (function () {
    const img = document.getElementById('capture-img');
    const box = document.getElementById('selection-box');
    let start = null;

    function rel(e) {
      const r = img.getBoundingClientRect();
      return {x: e.clientX - r.left, y: e.clientY - r.top};
    }

    img.addEventListener('mousedown', e => { start = rel(e); e.preventDefault(); });

    img.addEventListener('mousemove', e => {
      if (!start) return;
      const p = rel(e);
      box.style.display = 'block';
      box.style.left = Math.min(start.x, p.x) + 'px';
      box.style.top = Math.min(start.y, p.y) + 'px';
      box.style.width = Math.abs(p.x - start.x) + 'px';
      box.style.height = Math.abs(p.y - start.y) + 'px';
    });

    window.addEventListener('mouseup', async e => {
      if (!start) return;
      const p = rel(e);
      const rect = {
        x: Math.min(start.x, p.x),
        y: Math.min(start.y, p.y),
        width: Math.abs(p.x - start.x),
        height: Math.abs(p.y - start.y),
      };
      start = null;
      box.style.display = 'none';
      if (rect.width < 10 || rect.height < 10) return;
      const name = prompt('Region name:');
      if (!name) return;
      await post('/regions/create', {
        name,
        rect,
        display_width: img.clientWidth,
        display_height: img.clientHeight,
      });
    });
  })();

  function renderSelectors() {
    const div = document.getElementById('selector-rows');
    div.innerHTML = '';
    for (const row of state.selectors) {
      const d = document.createElement('div');
      d.className = 'selector-row';
      d.innerHTML =
        '<input type="text" placeholder="field name" value="' + esc(row.name) + '"' +
          ' onchange="post(\'/selectors/update\', {index: ' + row.index + ', field: \'name\', value: this.value})">' +
        '<input type="text" placeholder="css selector" value="' + esc(row.selector) + '"' +
          ' onchange="post(\'/selectors/update\', {index: ' + row.index + ', field: \'selector\', value: this.value})">' +
        '<button class="tiny ghost" onclick="post(\'/test/field\', {index: ' + row.index + '})">Test</button>' +
        '<button class="tiny danger" onclick="post(\'/selectors/remove\', {index: ' + row.index + '})">&#10005;</button>';
      div.appendChild(d);
    }
  }

  async function aiGenerate() {
    let example;
    try {
      example = JSON.parse(document.getElementById('ai-data').value || '{}');
    } catch (e) {
      addLog('err', 'example data is not valid JSON');
      return;
    }
    await post('/ai/selectors', {
      html_block: document.getElementById('ai-html').value,
      example_data: example,
      api_key: document.getElementById('ai-key').value,
    });
  }

  // --- test result log ---
  const log = document.getElementById('log');
  function addLog(cls, html) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = html;
    log.prepend(div);
  }

  const es = new EventSource('/events');
  es.addEventListener('test_started', e => {
    const d = JSON.parse(e.data);
    addLog('pending', esc(d.source) + ' &mdash; running...');
  });
  es.addEventListener('test_result', e => {
    const d = JSON.parse(e.data);
    let html = '<strong>' + esc(d.source) + ':</strong> ' + esc(d.summary);
    if (d.detail && d.detail.preview) html += '<pre>' + esc(d.detail.preview) + '</pre>';
    addLog(d.success ? 'ok' : 'err', html);
    loadState();
  });
  es.addEventListener('test_error', e => {
    const d = JSON.parse(e.data);
    addLog('err', '<strong>' + esc(d.source) + ':</strong> ' + esc(d.message));
  });

  loadState();
</script>
</body>
</html>
"##;
