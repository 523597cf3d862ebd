//! In-process Bot API used by the handler and pipeline tests.
//!
//! Records every method call (with its `text` for JSON requests), answers
//! with minimal valid payloads, serves media under `/media/` and the
//! uploaded export under `/file/`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{Value, json};
use teloxide::prelude::*;
use teloxide::types::Message;

pub(crate) const TOKEN: &str = "123456:TEST-TOKEN";
pub(crate) const CHAT: ChatId = ChatId(4242);

/// Bytes served for every `/media/...` download.
pub(crate) const MEDIA: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub method: String,
    pub text: Option<String>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeApi {
    calls: Mutex<Vec<Call>>,
    next_message_id: AtomicI32,

    /// `sendPhoto` calls still to be answered with a flood wait.
    pub rate_limited_photos: AtomicUsize,

    /// Answer `sendVideo` with a Bad Request.
    pub reject_videos: AtomicBool,

    /// Content of the document served by `getFile` + download.
    pub export: Mutex<String>,
}

impl FakeApi {
    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.calls().into_iter().filter_map(|c| c.text).collect()
    }

    fn message(&self) -> Value {
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        json!({
            "message_id": id,
            "date": 1_700_000_000,
            "chat": { "id": CHAT.0, "type": "private", "first_name": "Tester" },
            "from": { "id": 1, "is_bot": true, "first_name": "Memories", "username": "memories_bot" },
            "text": "ok"
        })
    }
}

/// Starts the fake API and returns a bot pointed at it.
pub(crate) async fn spawn(api: Arc<FakeApi>) -> (Bot, SocketAddr) {
    let router = Router::new().fallback(handle).with_state(api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    let url = reqwest::Url::parse(&format!("http://{addr}")).unwrap();
    (Bot::new(TOKEN).set_api_url(url), addr)
}

/// An incoming user message in the test chat, extended with `fields`.
pub(crate) fn incoming(fields: Value) -> Message {
    let mut message = json!({
        "message_id": 1,
        "date": 1_700_000_000,
        "chat": { "id": CHAT.0, "type": "private", "first_name": "Tester" },
        "from": { "id": 7, "is_bot": false, "first_name": "Tester" }
    });
    if let (Some(base), Value::Object(extra)) = (message.as_object_mut(), fields) {
        base.extend(extra);
    }
    serde_json::from_value(message).unwrap()
}

async fn handle(State(api): State<Arc<FakeApi>>, uri: Uri, body: Bytes) -> Response {
    let path = uri.path();
    if path.starts_with("/media/") {
        return MEDIA.to_vec().into_response();
    }
    if path.starts_with("/file/") {
        return api.export.lock().unwrap().clone().into_response();
    }

    // teloxide requests `/SendMessage`; the Bot API itself is case-insensitive.
    let raw = path.rsplit('/').next().unwrap_or_default();
    let mut chars = raw.chars();
    let method: String = chars
        .next()
        .map(|c| c.to_ascii_lowercase().to_string() + chars.as_str())
        .unwrap_or_default();
    let text = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("text").and_then(Value::as_str).map(str::to_owned));
    api.calls.lock().unwrap().push(Call {
        method: method.clone(),
        text,
    });

    match method.as_str() {
        "deleteMessage" | "setMyCommands" => Json(json!({ "ok": true, "result": true })).into_response(),
        "getFile" => Json(json!({
            "ok": true,
            "result": {
                "file_id": "export",
                "file_unique_id": "export-unique",
                "file_size": 128,
                "file_path": "documents/memories_history.html"
            }
        }))
        .into_response(),
        "sendPhoto" if take_one(&api.rate_limited_photos) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "ok": false,
                "error_code": 429,
                "description": "Too Many Requests: retry after 1",
                "parameters": { "retry_after": 1 }
            })),
        )
            .into_response(),
        "sendVideo" if api.reject_videos.load(Ordering::SeqCst) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: video rejected"
            })),
        )
            .into_response(),
        _ => Json(json!({ "ok": true, "result": api.message() })).into_response(),
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
