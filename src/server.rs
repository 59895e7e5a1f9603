use std::path::{Path, PathBuf};
use std::sync::Arc;

use actix_web::{HttpResponse, HttpServer, get, post, web};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::io_struct::{TripAccepted, TripRequest};
use crate::notify::{Notification, Notify, RunContext, WebhookNotifier};
use crate::pipeline::Coordinator;
use crate::registry::RequestRegistry;
use crate::runner::BackgroundRunner;
use crate::stage_client::{HttpTransport, StageClient, StageTransport};

pub struct AppState {
    pub registry: Arc<RequestRegistry>,
    pub notifier: Arc<dyn Notify>,
    pub runner: BackgroundRunner,
    pub log_file: PathBuf,
}

impl AppState {
    pub fn new(config: &OrchestratorConfig) -> anyhow::Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.stage_timeout)?);
        let notifier: Arc<dyn Notify> = Arc::new(WebhookNotifier::new(config.notify_timeout)?);
        Ok(Self::with_parts(config, transport, notifier))
    }

    /// Assembles the state from explicit seams; tests inject doubles here.
    pub fn with_parts(
        config: &OrchestratorConfig,
        transport: Arc<dyn StageTransport>,
        notifier: Arc<dyn Notify>,
    ) -> Self {
        let registry = Arc::new(RequestRegistry::new());
        let stages = StageClient::new(
            transport,
            config.endpoints.clone(),
            config.retry.clone(),
            notifier.clone(),
            config.verbose_payloads,
        );
        let coordinator = Arc::new(Coordinator::new(stages, notifier.clone(), registry.clone()));
        AppState {
            registry,
            notifier,
            runner: BackgroundRunner::new(coordinator),
            log_file: config.log_file.clone(),
        }
    }
}

#[get("/health")]
pub async fn health(_: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().body("Ok")
}

/// Accepts a trip request and immediately acknowledges with a tracking id;
/// the pipeline itself runs detached and is observed via `/status`.
#[post("/plan-trip")]
pub async fn plan_trip(
    req: web::Json<TripRequest>,
    app_state: web::Data<AppState>,
) -> HttpResponse {
    let req = req.into_inner();
    let request_id = Uuid::new_v4().to_string();
    let session_id = req
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    log::info!(
        "[{request_id}] starting trip planning for user {} (session {session_id})",
        req.user_id
    );
    log::debug!("[{request_id}] user input: {}", req.user_input);

    app_state.registry.create(&request_id, &req.user_id);

    let started = Notification::info("Starting trip planning process")
        .with_details(json!({ "request_id": request_id }));
    app_state
        .notifier
        .notify(&request_id, &started, req.callback_url.as_deref())
        .await;

    app_state.runner.submit(
        RunContext::new(request_id.clone(), req.callback_url),
        req.user_input,
    );

    HttpResponse::Ok().json(TripAccepted {
        status: "processing".to_string(),
        request_id,
        notifications: vec![started],
    })
}

/// Poll the state of a previously accepted request.
#[get("/status/{request_id}")]
pub async fn status(
    path: web::Path<String>,
    app_state: web::Data<AppState>,
) -> HttpResponse {
    match app_state.registry.get(path.as_str()) {
        Some(state) => HttpResponse::Ok().json(state),
        None => HttpResponse::NotFound().json(json!({ "detail": "Request ID not found" })),
    }
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    lines: Option<usize>,
}

/// Serves the tail of the log file for debugging.
#[get("/debug/logs")]
pub async fn debug_logs(
    query: web::Query<LogQuery>,
    app_state: web::Data<AppState>,
) -> HttpResponse {
    let lines = query.lines.unwrap_or(100);
    match read_log_tail(&app_state.log_file, lines) {
        Ok(tail) => HttpResponse::Ok().json(json!({ "logs": tail })),
        Err(err) => HttpResponse::InternalServerError().json(json!({ "detail": err.to_string() })),
    }
}

fn read_log_tail(path: &Path, lines: usize) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);
    Ok(all[start..].iter().map(|line| line.to_string()).collect())
}

pub async fn startup(config: OrchestratorConfig, app_state: AppState) -> std::io::Result<()> {
    let app_state = web::Data::new(app_state);

    log::info!("starting orchestrator at {}:{}", config.host, config.port);

    HttpServer::new(move || {
        actix_web::App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(app_state.clone())
            .service(health)
            .service(plan_trip)
            .service(status)
            .service(debug_logs)
    })
    .bind((config.host, config.port))?
    .run()
    .await
}
