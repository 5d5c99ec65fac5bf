//! Axum JSON API over the task store: submit scrapes, poll status, read
//! stats, list scraper types, download export artifacts.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use leadmap_export::ExportFormat;
use leadmap_tasks::{ScrapeParams, TaskError, TaskStatus, TaskStore};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::info;
use uuid::Uuid;

pub const CRATE_NAME: &str = "leadmap-web";
pub const SERVICE_NAME: &str = "Map Directory Lead Scraper API";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AppState {
    pub store: TaskStore,
}

impl AppState {
    pub fn new(store: TaskStore) -> Self {
        Self { store }
    }
}

#[derive(Debug, Serialize)]
struct ScrapeAccepted {
    task_id: Uuid,
    message: String,
    status: TaskStatus,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/scrape/{source}", post(submit_handler))
        .route("/status", get(all_tasks_handler))
        .route("/status/{task_id}", get(task_status_handler))
        .route("/stats/daily", get(daily_stats_handler))
        .route("/stats/today", get(today_summary_handler))
        .route("/scrapers", get(scrapers_handler))
        .route("/download/{basename}/{format}", get(download_handler))
        .with_state(Arc::new(state))
}

pub async fn serve_from_env(store: TaskStore) -> anyhow::Result<()> {
    let port: u16 = std::env::var("LEADMAP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving {SERVICE_NAME}");
    axum::serve(listener, app(AppState::new(store))).await?;
    Ok(())
}

async fn root_handler() -> Response {
    Json(serde_json::json!({
        "message": SERVICE_NAME,
        "status": "running",
        "version": SERVICE_VERSION,
        "description": "High-quality verified business leads from the maps directory",
    }))
    .into_response()
}

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(source): AxumPath<String>,
    Json(params): Json<ScrapeParams>,
) -> Response {
    match state.store.start_scraping(&source, params) {
        Ok(task_id) => Json(ScrapeAccepted {
            task_id,
            message: format!("{source} scraping started"),
            status: TaskStatus::Running,
        })
        .into_response(),
        Err(TaskError::UnknownScraper(name)) => not_found(&format!("unknown scraper: {name}")),
    }
}

async fn task_status_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(task_id): AxumPath<Uuid>,
) -> Response {
    match state.store.get_task(task_id) {
        Some(task) => Json(serde_json::json!({ "task": task })).into_response(),
        None => not_found("Task not found"),
    }
}

async fn all_tasks_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(serde_json::json!({ "tasks": state.store.list_tasks() })).into_response()
}

async fn daily_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(serde_json::json!({ "stats": state.store.daily_stats() })).into_response()
}

async fn today_summary_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.store.summary()).into_response()
}

async fn scrapers_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(serde_json::json!({ "scrapers": state.store.list_sources() })).into_response()
}

async fn download_handler(
    State(state): State<Arc<AppState>>,
    AxumPath((basename, format)): AxumPath<(String, String)>,
) -> Response {
    let Some(format) = ExportFormat::parse(&format) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "format must be csv or excel" })),
        )
            .into_response();
    };
    let Some(path) = state.store.exports().resolve(&basename, format) else {
        return not_found("File not found");
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let filename = format!("{basename}.{}", format.extension());
            (
                [
                    (header::CONTENT_TYPE, format.content_type().to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename={filename}"),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(_) => not_found("File not found"),
    }
}

fn not_found(detail: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": detail })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use leadmap_export::ExportStore;
    use leadmap_extract::{FixtureListingSource, SourceRegistry};
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    // Three cafes on one page; the first two share a dedup key.
    const FIXTURE: &str = r#"
    <html><body>
      <section class="results-page">
        <article class="place-card">
          <h3 class="place-name">Al Noor Cafe</h3>
          <span class="place-category">Cafe</span>
          <span class="place-phone">050 123 4567</span>
        </article>
        <article class="place-card">
          <h3 class="place-name">AL NOOR CAFE</h3>
          <span class="place-category">Cafe</span>
          <span class="place-phone">+050-123-4567</span>
        </article>
        <article class="place-card">
          <h3 class="place-name">Marina Bakery Cafe</h3>
          <span class="place-category">Cafe</span>
        </article>
      </section>
    </body></html>
    "#;

    fn test_app() -> (Router, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(FixtureListingSource::from_html(FIXTURE)));
        let store = TaskStore::new(registry, ExportStore::new(dir.path()));
        (app(AppState::new(store)), dir)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    async fn wait_completed(app: &Router, task_id: &str) -> serde_json::Value {
        for _ in 0..500 {
            let (status, body) = get_json(app, &format!("/status/{task_id}")).await;
            assert_eq!(status, StatusCode::OK);
            let task = body["task"].clone();
            let state = task["status"].as_str().unwrap_or_default().to_string();
            if state == "completed" || state == "failed" {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} never finished");
    }

    #[tokio::test]
    async fn root_banner_reports_running() {
        let (app, _dir) = test_app();
        let (status, body) = get_json(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["message"], SERVICE_NAME);
    }

    #[tokio::test]
    async fn submit_poll_and_download_end_to_end() {
        let (app, _dir) = test_app();

        let (status, body) = post_json(
            &app,
            "/scrape/maps",
            r#"{"search_term":"cafe","location":"Dubai","max_pages":2}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        let task_id = body["task_id"].as_str().unwrap().to_string();

        let task = wait_completed(&app, &task_id).await;
        assert_eq!(task["status"], "completed");
        assert_eq!(task["total_records"], 2);
        let basename = task["filename"].as_str().expect("filename set").to_string();

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/download/{basename}/csv"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            "text/csv"
        );
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("business_name,"));
        assert_eq!(text.lines().count(), 3);

        let (status, summary) = get_json(&app, "/stats/today").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(summary["completed_tasks"], 1);
        assert_eq!(summary["total_records"], 2);
    }

    #[tokio::test]
    async fn unknown_scraper_returns_not_found_without_a_task() {
        let (app, _dir) = test_app();
        let (status, body) = post_json(&app, "/scrape/linkedin", "{}").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("linkedin"));

        let (_, tasks) = get_json(&app, "/status").await;
        assert_eq!(tasks["tasks"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn unknown_task_and_missing_artifact_are_not_found() {
        let (app, _dir) = test_app();
        let (status, _) = get_json(&app, &format!("/status/{}", Uuid::new_v4())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(&app, "/download/never_written/csv").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = get_json(&app, "/download/whatever/pdf").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("csv or excel"));
    }

    #[tokio::test]
    async fn scrapers_listing_describes_registered_sources() {
        let (app, _dir) = test_app();
        let (status, body) = get_json(&app, "/scrapers").await;
        assert_eq!(status, StatusCode::OK);
        let scrapers = body["scrapers"].as_array().unwrap();
        assert_eq!(scrapers.len(), 1);
        assert_eq!(scrapers[0]["name"], "maps");
        assert_eq!(scrapers[0]["display_name"], "Maps Directory UAE");
    }
}
