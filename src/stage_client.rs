use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::config::RetryConfig;
use crate::notify::{Notification, Notify, RunContext};
use crate::stage::{Stage, StageEndpoints};

/// One attempt's classified failure. Every variant is retryable up to the
/// attempt budget; the client makes no transient-vs-permanent distinction.
#[derive(Debug, Error)]
pub enum StageCallError {
    #[error("upstream returned {status}: {body}")]
    HttpStatus { status: StatusCode, body: String },
    #[error("connection error: {0}")]
    Transport(String),
    #[error("response decode error: {0}")]
    Decode(String),
}

/// A stage call that exhausted its attempt budget. Fatal to the run; the
/// coordinator records `detail` as the terminal error.
#[derive(Debug, Error)]
#[error("{stage} stage failed after {attempts} attempts: {detail}")]
pub struct StageError {
    pub stage: Stage,
    pub attempts: u32,
    pub detail: String,
}

pub struct TransportReply {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Wire seam under the retry loop. Production goes through reqwest; tests
/// substitute scripted doubles.
#[async_trait]
pub trait StageTransport: Send + Sync {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<TransportReply, StageCallError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }
}

#[async_trait]
impl StageTransport for HttpTransport {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<TransportReply, StageCallError> {
        let resp = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| StageCallError::Transport(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| StageCallError::Transport(e.to_string()))?;
        Ok(TransportReply { status, body })
    }
}

/// Linear backoff before the attempt after `attempt` (1-based), no jitter.
pub fn backoff_delay(retry: &RetryConfig, attempt: u32) -> Duration {
    retry.base_delay * attempt
}

/// Issues one call to one downstream stage, with bounded retries and
/// per-attempt progress notifications.
pub struct StageClient {
    transport: Arc<dyn StageTransport>,
    endpoints: StageEndpoints,
    retry: RetryConfig,
    notifier: Arc<dyn Notify>,
    verbose: bool,
}

impl StageClient {
    pub fn new(
        transport: Arc<dyn StageTransport>,
        endpoints: StageEndpoints,
        retry: RetryConfig,
        notifier: Arc<dyn Notify>,
        verbose: bool,
    ) -> Self {
        StageClient {
            transport,
            endpoints,
            retry,
            notifier,
            verbose,
        }
    }

    /// Call a stage that answers with structured data.
    pub async fn call_json<Resp: DeserializeOwned>(
        &self,
        ctx: &RunContext,
        stage: Stage,
        payload: &impl Serialize,
    ) -> Result<Resp, StageError> {
        self.call(ctx, stage, payload, |body| {
            serde_json::from_slice(body).map_err(|e| StageCallError::Decode(e.to_string()))
        })
        .await
    }

    /// Call a stage that answers with an opaque text blob (the renderer
    /// returns markup, not JSON).
    pub async fn call_text(
        &self,
        ctx: &RunContext,
        stage: Stage,
        payload: &impl Serialize,
    ) -> Result<String, StageError> {
        self.call(ctx, stage, payload, |body| {
            Ok(String::from_utf8_lossy(body).into_owned())
        })
        .await
    }

    async fn call<Resp>(
        &self,
        ctx: &RunContext,
        stage: Stage,
        payload: &impl Serialize,
        decode: impl Fn(&[u8]) -> Result<Resp, StageCallError>,
    ) -> Result<Resp, StageError> {
        let payload = serde_json::to_value(payload).map_err(|e| StageError {
            stage,
            attempts: 0,
            detail: format!("failed to encode request: {e}"),
        })?;
        let url = self.endpoints.url(stage);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            self.notify(
                ctx,
                Notification::info(format!("Calling {stage} stage (attempt {attempt})")),
            )
            .await;
            self.dump_value(stage, "REQUEST", &payload);

            match self.attempt_once(stage, url, &payload).await {
                Ok(body) => match decode(&body) {
                    Ok(resp) => {
                        self.notify(
                            ctx,
                            Notification::success(format!("{stage} stage completed successfully")),
                        )
                        .await;
                        return Ok(resp);
                    }
                    Err(err) => {
                        log::error!("[{}] {stage}: {err}", ctx.request_id);
                        last_error = Some(err);
                    }
                },
                Err(err) => {
                    log::error!("[{}] {stage}: {err}", ctx.request_id);
                    last_error = Some(err);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(backoff_delay(&self.retry, attempt)).await;
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        self.notify(
            ctx,
            Notification::error(format!(
                "Failed to call {stage} stage after {max_attempts} attempts"
            ))
            .with_details(serde_json::json!({ "error": detail })),
        )
        .await;
        Err(StageError {
            stage,
            attempts: max_attempts,
            detail,
        })
    }

    async fn attempt_once(
        &self,
        stage: Stage,
        url: &str,
        payload: &Value,
    ) -> Result<Bytes, StageCallError> {
        let reply = self.transport.post_json(url, payload).await?;
        if !reply.status.is_success() {
            return Err(StageCallError::HttpStatus {
                status: reply.status,
                body: String::from_utf8_lossy(&reply.body).into_owned(),
            });
        }
        self.dump_text(stage, "RESPONSE", &String::from_utf8_lossy(&reply.body));
        Ok(reply.body)
    }

    async fn notify(&self, ctx: &RunContext, notification: Notification) {
        self.notifier
            .notify(&ctx.request_id, &notification, ctx.callback_url.as_deref())
            .await;
    }

    fn dump_value(&self, stage: Stage, label: &str, payload: &Value) {
        if self.verbose {
            let pretty = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
            log::debug!("[{stage}] {label}:\n{pretty}");
        }
    }

    fn dump_text(&self, stage: Stage, label: &str, body: &str) {
        if self.verbose {
            log::debug!("[{stage}] {label}:\n{body}");
        }
    }
}
