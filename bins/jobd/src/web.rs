#![cfg(feature = "web-api")]

use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info};

use jobs_core::JobError;

use crate::module::{Module, ModuleCtx};
use crate::scheduler::SchedulerEngine;

#[derive(Clone)]
struct AppState {
    engine: SchedulerEngine,
    started: Instant,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Status {
    active_timers: usize,
    uptime_ms: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleBody {
    cron_expression: Option<String>,
    script_name: Option<String>,
}

#[derive(Deserialize)]
struct IdQuery {
    id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsQuery {
    job_id: Option<String>,
}

/// `{code, message}` payload with the error's status.
struct ApiError(JobError);

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "code": self.0.code(), "message": self.0.to_string() }))).into_response()
    }
}

fn bad_request(code: &str, message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "code": code, "message": message }))).into_response()
}

pub struct WebServer {
    pub http_addr: Option<SocketAddr>,
    pub https_addr: Option<SocketAddr>,
    pub tls_cert_pem: Option<String>,
    pub tls_key_pem: Option<String>,
}

impl WebServer {
    pub fn new(http: Option<SocketAddr>, https: Option<SocketAddr>, cert: Option<String>, key: Option<String>) -> Self {
        Self { http_addr: http, https_addr: https, tls_cert_pem: cert, tls_key_pem: key }
    }
}

pub fn router(engine: SchedulerEngine) -> Router {
    let state = AppState { engine, started: Instant::now() };
    Router::new()
        .route("/status", get(status))
        .route("/jobs", get(jobs_get).post(jobs_schedule).delete(jobs_delete))
        .route("/jobs/logs", get(job_logs))
        .route("/jobs/run", post(jobs_run))
        .with_state(state)
}

impl Module for WebServer {
    fn name(&self) -> &'static str { "web" }

    fn spawn(self: Box<Self>, ctx: ModuleCtx) -> JoinHandle<anyhow::Result<()>> {
        tokio::spawn(async move {
            let app = router(ctx.engine.clone());
            let mut servers = Vec::<JoinHandle<anyhow::Result<()>>>::new();

            if let Some(addr) = self.http_addr {
                let listener = tokio::net::TcpListener::bind(addr).await?;
                info!("web http listening on http://{}", addr);
                let app_clone = app.clone();
                let mut sd = ctx.shutdown.clone();
                servers.push(tokio::spawn(async move {
                    axum::serve(listener, app_clone)
                        .with_graceful_shutdown(async move {
                            let _ = sd.changed().await;
                        })
                        .await?;
                    Ok(())
                }));
            }

            if let (Some(addr), Some(cert), Some(key)) = (self.https_addr, self.tls_cert_pem.clone(), self.tls_key_pem.clone()) {
                info!("web https listening on https://{}", addr);
                let app_clone = app.clone();
                let mut sd = ctx.shutdown.clone();
                servers.push(tokio::spawn(async move {
                    let config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
                    let handle = axum_server::Handle::new();
                    let stopper = handle.clone();
                    tokio::spawn(async move {
                        let _ = sd.changed().await;
                        stopper.graceful_shutdown(None);
                    });
                    axum_server::bind_rustls(addr, config)
                        .handle(handle)
                        .serve(app_clone.into_make_service())
                        .await?;
                    Ok(())
                }));
            }

            for s in servers { s.await??; }
            Ok(())
        })
    }
}

async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_ms = state.started.elapsed().as_millis() as u64;
    Json(json!(Status { active_timers: state.engine.active_timers(), uptime_ms }))
}

async fn jobs_get(State(state): State<AppState>, Query(q): Query<IdQuery>) -> Response {
    match q.id {
        Some(id) => match state.engine.get(&id) {
            Some(job) => Json(json!({ "job": job })).into_response(),
            None => ApiError(JobError::JobNotFound(id)).into_response(),
        },
        None => Json(json!({ "jobs": state.engine.list_active() })).into_response(),
    }
}

async fn jobs_schedule(State(state): State<AppState>, Json(body): Json<ScheduleBody>) -> Result<Response, ApiError> {
    let cron = body.cron_expression.unwrap_or_default();
    if cron.trim().is_empty() {
        return Ok(bad_request("INVALID_CRON_EXPRESSION", "Cron expression is required"));
    }
    let job = state.engine.schedule(&cron, body.script_name.as_deref())?;
    Ok(Json(json!({ "message": "Job scheduled successfully", "job": job })).into_response())
}

async fn jobs_delete(State(state): State<AppState>, Query(q): Query<IdQuery>) -> Result<Response, ApiError> {
    let Some(id) = q.id else {
        return Ok(bad_request("MISSING_JOB_ID", "Job ID is required"));
    };
    if state.engine.cancel(&id)? {
        Ok(Json(json!({ "message": "Job deleted successfully" })).into_response())
    } else {
        Err(JobError::JobNotFound(id).into())
    }
}

async fn jobs_run(State(state): State<AppState>, Query(q): Query<IdQuery>) -> Result<Response, ApiError> {
    let Some(id) = q.id else {
        return Ok(bad_request("MISSING_JOB_ID", "Job ID is required"));
    };
    match state.engine.get(&id) {
        Some(job) if !job.record.canceled => {}
        _ => return Err(JobError::JobNotFound(id).into()),
    }
    info!(job_id = %id, "ad-hoc run requested");
    let engine = state.engine.clone();
    let run_id = id.clone();
    tokio::spawn(async move {
        engine.trigger(&run_id).await;
    });
    Ok((StatusCode::ACCEPTED, Json(json!({ "message": "Job run started", "id": id }))).into_response())
}

async fn job_logs(State(state): State<AppState>, Query(q): Query<LogsQuery>) -> Response {
    match q.job_id {
        Some(id) => Json(json!({ "logs": state.engine.logs(&id) })).into_response(),
        None => bad_request("MISSING_JOB_ID", "Job ID is required"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::tests::harness;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use jobs_core::job::JobStatus;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn schedule_list_get_delete() {
        let h = harness();
        let app = router(h.engine.clone());

        let (st, body) = call(
            app.clone(),
            "POST",
            "/jobs",
            Some(json!({ "cronExpression": "*/5 * * * *", "scriptName": "ok.sh" })),
        )
        .await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(body["job"]["status"], "scheduled");
        assert_eq!(body["job"]["hasLogs"], true);
        let id = body["job"]["id"].as_str().unwrap().to_string();

        let (st, body) = call(app.clone(), "GET", "/jobs", None).await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(body["jobs"].as_array().unwrap().len(), 1);

        let (st, body) = call(app.clone(), "GET", &format!("/jobs?id={id}"), None).await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(body["job"]["cronExpression"], "*/5 * * * *");

        let (st, _) = call(app.clone(), "DELETE", &format!("/jobs?id={id}"), None).await;
        assert_eq!(st, StatusCode::OK);

        let (_, body) = call(app.clone(), "GET", "/jobs", None).await;
        assert!(body["jobs"].as_array().unwrap().is_empty());
        let (st, body) = call(app, "DELETE", "/jobs?id=missing", None).await;
        assert_eq!(st, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "JOB_NOT_FOUND");
    }

    #[tokio::test]
    async fn bad_schedule_requests_are_400() {
        let h = harness();
        let app = router(h.engine.clone());

        let (st, body) = call(app.clone(), "POST", "/jobs", Some(json!({ "scriptName": "ok.sh" }))).await;
        assert_eq!(st, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_CRON_EXPRESSION");

        let (st, body) = call(
            app.clone(),
            "POST",
            "/jobs",
            Some(json!({ "cronExpression": "whenever", "scriptName": "ok.sh" })),
        )
        .await;
        assert_eq!(st, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_CRON_EXPRESSION");

        let (st, body) = call(app, "POST", "/jobs", Some(json!({ "cronExpression": "* * * * *" }))).await;
        assert_eq!(st, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_SCRIPT_NAME");
        assert!(h.engine.store().list_all().is_empty());
    }

    #[tokio::test]
    async fn logs_endpoint() {
        let h = harness();
        let app = router(h.engine.clone());
        let id = h.engine.schedule("* * * * *", Some("ok.sh")).unwrap().record.id;
        h.engine.trigger(&id).await;

        let (st, body) = call(app.clone(), "GET", &format!("/jobs/logs?jobId={id}"), None).await;
        assert_eq!(st, StatusCode::OK);
        let logs = body["logs"].as_array().unwrap();
        assert_eq!(logs[0]["level"], "success");

        let (_, body) = call(app.clone(), "GET", "/jobs/logs?jobId=unknown", None).await;
        assert!(body["logs"].as_array().unwrap().is_empty());
        let (st, _) = call(app, "GET", "/jobs/logs", None).await;
        assert_eq!(st, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn run_now_fires_in_background() {
        let h = harness();
        let app = router(h.engine.clone());
        let id = h.engine.schedule("0 0 1 1 *", Some("ok.sh")).unwrap().record.id;

        let (st, body) = call(app.clone(), "POST", &format!("/jobs/run?id={id}"), None).await;
        assert_eq!(st, StatusCode::ACCEPTED);
        assert_eq!(body["id"], id.as_str());

        let mut status = JobStatus::Scheduled;
        for _ in 0..50 {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            status = h.engine.store().get(&id).unwrap().status;
            if status == JobStatus::Completed {
                break;
            }
        }
        assert_eq!(status, JobStatus::Completed);
        assert!(h.engine.has_timer(&id));
    }

    #[tokio::test]
    async fn run_now_rejects_unknown_and_canceled() {
        let h = harness();
        let app = router(h.engine.clone());
        let id = h.engine.schedule("* * * * *", Some("ok.sh")).unwrap().record.id;
        h.engine.cancel(&id).unwrap();

        let (st, body) = call(app.clone(), "POST", &format!("/jobs/run?id={id}"), None).await;
        assert_eq!(st, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "JOB_NOT_FOUND");
        let (st, _) = call(app.clone(), "POST", "/jobs/run?id=missing", None).await;
        assert_eq!(st, StatusCode::NOT_FOUND);
        let (st, _) = call(app, "POST", "/jobs/run", None).await;
        assert_eq!(st, StatusCode::BAD_REQUEST);
        assert!(!h.engine.logs(&id).iter().any(|e| e.message == "Job started execution"));
    }

    #[tokio::test]
    async fn status_reports_timers() {
        let h = harness();
        h.engine.schedule("* * * * *", Some("ok.sh")).unwrap();
        let (st, body) = call(router(h.engine.clone()), "GET", "/status", None).await;
        assert_eq!(st, StatusCode::OK);
        assert_eq!(body["activeTimers"], 1);
    }
}
