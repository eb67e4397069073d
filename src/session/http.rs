//! HTTP transport over a captured session.
//!
//! Replays the two call templates recorded by the external capture
//! flow. Outgoing commands are framed as the channel's rich-text
//! element list (base64 text payloads, mention head token, per-send
//! nonce); the receive poll walks the channel's message sequence
//! window and yields base64-decoded, NFKC-normalized text.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::{json, Value};
use unicode_normalization::UnicodeNormalization;

use crate::models::{CallTemplate, MessageToken, SessionParams};
use crate::session::{FetchBatch, GameSession};
use crate::{AppError, Result};

/// How far past the last seen message the receive window reaches.
const WINDOW_SPAN: u64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Window {
    begin: u64,
    end: u64,
}

/// Captured-template HTTP session.
pub struct HttpGameSession {
    client: Client,
    params: SessionParams,
    mention: MessageToken,
    window: Mutex<Window>,
    send_count: AtomicU64,
}

impl HttpGameSession {
    /// Build a session over captured parameters.
    ///
    /// `mention` is the head token addressing the game bot; every
    /// outgoing message leads with it.
    #[must_use]
    pub fn new(params: SessionParams, mention: MessageToken) -> Self {
        Self {
            client: Client::new(),
            params,
            mention,
            window: Mutex::new(Window::default()),
            send_count: AtomicU64::new(0),
        }
    }

    fn window(&self) -> MutexGuard<'_, Window> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn execute(&self, template: &CallTemplate, body: String) -> Result<Value> {
        let method = template
            .method
            .parse::<reqwest::Method>()
            .map_err(|_| AppError::Transport(format!("bad method {}", template.method)))?;
        let mut request = self.client.request(method, &template.url).body(body);
        for (name, value) in &template.headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AppError::Transport(format!("HTTP {}", response.status())));
        }
        Ok(response.json::<Value>().await?)
    }

    fn frame_message(&self, tokens: &[MessageToken]) -> Result<String> {
        let mut body: Value = serde_json::from_str(
            self.params.send.body.as_deref().unwrap_or("{}"),
        )
        .map_err(|err| AppError::Session(format!("bad send template: {err}")))?;

        let nonce = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
            + self.send_count.fetch_add(1, Ordering::Relaxed);
        body["msg"]["head"]["content_head"]["random"] = json!(nonce.to_string());

        let elems: Vec<Value> = std::iter::once(&self.mention)
            .chain(tokens.iter())
            .enumerate()
            .map(|(index, token)| {
                let text = if index == 0 {
                    token.text.clone()
                } else {
                    format!(" {}", token.text)
                };
                json!({
                    "text": {
                        "str": BASE64.encode(text.as_bytes()),
                        "bytes_pb_reserve": token.entity_ref,
                    }
                })
            })
            .collect();
        body["msg"]["body"]["rich_text"]["elems"] = Value::Array(elems);
        serde_json::to_string(&body).map_err(Into::into)
    }

    fn frame_poll(&self, window: Window) -> Result<String> {
        let mut body: Value = serde_json::from_str(
            self.params.receive.body.as_deref().unwrap_or("{}"),
        )
        .map_err(|err| AppError::Session(format!("bad receive template: {err}")))?;
        let params = body
            .pointer_mut("/get_channel_msg_req/rpt_channel_params/0")
            .ok_or_else(|| AppError::Session("receive template missing channel params".into()))?;
        params["begin_seq"] = json!(window.begin.to_string());
        params["end_seq"] = json!(window.end.to_string());
        body["msg_box_get_req"]["cookie"] = json!("");
        serde_json::to_string(&body).map_err(Into::into)
    }
}

fn seq_field(value: &Value, field: &str) -> Result<u64> {
    value
        .get(field)
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| AppError::Response(format!("missing sequence field {field}")))
}

#[async_trait]
impl GameSession for HttpGameSession {
    async fn send(&self, tokens: &[MessageToken]) -> Result<()> {
        let body = self.frame_message(tokens)?;
        self.execute(&self.params.send, body).await?;
        Ok(())
    }

    async fn fetch(&self) -> Result<FetchBatch> {
        let window = *self.window();
        let body = self.frame_poll(window)?;
        let payload = self.execute(&self.params.receive, body).await?;

        let message_block = payload
            .pointer("/data/channel_msg_rsp/rpt_channel_msg/0")
            .ok_or_else(|| {
                AppError::Response(format!("invalid poll response: {payload}"))
            })?;
        let begin = seq_field(message_block, "rsp_begin_seq")?;
        let end = seq_field(message_block, "rsp_end_seq")?;
        if begin == 0 && end == 0 {
            return Ok(FetchBatch::default());
        }

        let raw_messages = message_block
            .get("rpt_msgs")
            .and_then(Value::as_array)
            .ok_or_else(|| AppError::Response("poll response missing rpt_msgs".into()))?;
        let mut messages = Vec::new();
        for seq in begin..=end {
            let index = usize::try_from(end - seq).unwrap_or(usize::MAX);
            let Some(encoded) = raw_messages.get(index).and_then(Value::as_str) else {
                continue;
            };
            let Ok(bytes) = BASE64.decode(encoded) else {
                continue;
            };
            let text: String = String::from_utf8_lossy(&bytes).nfkc().collect();
            messages.push((seq, text));
        }

        *self.window() = Window {
            begin: end,
            end: end + WINDOW_SPAN,
        };
        Ok(FetchBatch { messages })
    }

    fn rewind(&self) {
        *self.window() = Window::default();
    }

    fn primed(&self) -> bool {
        *self.window() != Window::default()
    }

    fn participant_id(&self) -> &str {
        &self.params.participant_id
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.params.expires_at
    }
}
