use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tower_http::trace::TraceLayer;

use crate::cache::NdcCache;
use crate::cli::ServeArgs;
use crate::common::expand_home;
use crate::error::IngestError;
use crate::ingest::ingest_with_rxnav;
use crate::reindex::Reindexer;
use crate::rxnorm::RetryPolicy;

const ADMIN_KEY_HEADER: &str = "x-admin-key";

#[derive(Clone)]
pub struct AppState {
    admin_key: Arc<str>,
    rules_path: PathBuf,
    rxnav_url: Arc<str>,
    policy: RetryPolicy,
    // Also serializes ingestion runs: one writer per cache file.
    cache: Arc<Mutex<NdcCache>>,
    reindexer: Reindexer,
}

impl AppState {
    pub fn from_args(opts: &ServeArgs) -> anyhow::Result<Self> {
        Ok(Self {
            admin_key: opts.admin_key.as_str().into(),
            rules_path: opts.rules_path.clone(),
            rxnav_url: opts.lookup.rxnav_url.as_str().into(),
            policy: opts.lookup.retry_policy(),
            cache: Arc::new(Mutex::new(NdcCache::open(&opts.lookup.cache_path))),
            reindexer: Reindexer::new(opts.reindex_url.clone())?,
        })
    }
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let state = AppState::from_args(&opts)?;
    tracing::info!(
        rules_path = %opts.rules_path.display(),
        reindex = opts.reindex_url.as_deref().unwrap_or("skipped"),
        "Admin ingestion endpoint ready"
    );

    let app = router(state);
    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/admin/ingest_local", post(ingest_local))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Unauthorized => Self::new(StatusCode::UNAUTHORIZED, "unauthorized"),
            IngestError::InputNotFound { .. } => Self::new(StatusCode::BAD_REQUEST, "file not found"),
            err @ IngestError::NoTableFound { .. } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            err => {
                tracing::error!(error = %err, "Ingestion failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct IngestLocalParams {
    file_path: Option<String>,
}

async fn ingest_local(
    State(st): State<AppState>,
    headers: HeaderMap,
    Query(p): Query<IngestLocalParams>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let key = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if key != Some(&*st.admin_key) {
        return Err(IngestError::Unauthorized.into());
    }

    let Some(raw_path) = p.file_path.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "file_path is required"));
    };
    let requested = expand_home(raw_path);
    let input = requested
        .canonicalize()
        .map_err(|_| IngestError::InputNotFound { path: requested })?;

    tracing::info!(input = %input.display(), "Admin ingestion requested");
    let cache = Arc::clone(&st.cache);
    let output = st.rules_path.clone();
    let rxnav_url = Arc::clone(&st.rxnav_url);
    let policy = st.policy;
    let stats = tokio::task::spawn_blocking(move || {
        let mut cache = cache.lock().unwrap_or_else(PoisonError::into_inner);
        ingest_with_rxnav(&input, &output, &mut cache, &rxnav_url, policy)
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    let mut body = st.reindexer.trigger().await.map_err(|e| {
        tracing::error!(error = %e, "Reindex failed after ingestion");
        ApiError::new(StatusCode::BAD_GATEWAY, e.to_string())
    })?;
    body.insert("ingested_rows".to_string(), stats.rows_read.into());
    body.insert("kept_rows".to_string(), stats.rows_written.into());
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::LookupArgs;
    use crate::table::tests::write_zip;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::path::Path;
    use tower::ServiceExt;

    fn serve_args(dir: &Path) -> ServeArgs {
        ServeArgs {
            host: "127.0.0.1".to_string(),
            port: 0,
            admin_key: "s3cret".to_string(),
            rules_path: dir.join("data").join("rules.csv"),
            reindex_url: None,
            lookup: LookupArgs {
                cache_path: dir.join("cache.json"),
                // Never contacted: every NDC in these tests is pre-cached.
                rxnav_url: "http://127.0.0.1:9/REST/rxcui.json".to_string(),
                lookup_attempts: 1,
                lookup_backoff_ms: 0,
                lookup_timeout_secs: 1,
            },
        }
    }

    fn ingest_request(file_path: &Path, key: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().method("POST").uri(format!(
            "/v1/admin/ingest_local?file_path={}",
            file_path.display()
        ));
        if let Some(key) = key {
            req = req.header("X-Admin-Key", key);
        }
        req.body(Body::empty()).unwrap()
    }

    async fn json_body(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(AppState::from_args(&serve_args(dir.path())).unwrap());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejects_bad_key_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let args = serve_args(dir.path());
        let input = dir.path().join("formulary.csv");
        std::fs::write(&input, "CONTRACT_ID,PLAN_ID,NDC,TIER\nH1,001,1,1\n").unwrap();

        for key in [None, Some("wrong")] {
            let app = router(AppState::from_args(&args).unwrap());
            let resp = app.oneshot(ingest_request(&input, key)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(json_body(resp).await, json!({ "detail": "unauthorized" }));
        }
        assert!(!args.rules_path.exists());
    }

    #[tokio::test]
    async fn test_missing_input_is_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(AppState::from_args(&serve_args(dir.path())).unwrap());
        let resp = app
            .oneshot(ingest_request(&dir.path().join("nope.zip"), Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(resp).await, json!({ "detail": "file not found" }));
    }

    #[tokio::test]
    async fn test_archive_without_table() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("puf.zip");
        write_zip(&input, &[("readme.txt", b"nothing")]);
        let args = serve_args(dir.path());
        let app = router(AppState::from_args(&args).unwrap());

        let resp = app
            .oneshot(ingest_request(&input, Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!args.rules_path.exists());
    }

    #[tokio::test]
    async fn test_successful_ingest_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        let args = serve_args(dir.path());
        std::fs::write(
            &args.lookup.cache_path,
            r#"{"00002751001": "861007", "99999999999": null}"#,
        )
        .unwrap();
        let input = dir.path().join("formulary.csv");
        std::fs::write(
            &input,
            "CONTRACT_ID,PLAN_ID,NDC,TIER\n\
             H1234,001,00002-7510-01,3\n\
             H1234,001,00002-7510-01,\n\
             H1234,002,99999-9999-99,1\n",
        )
        .unwrap();

        let app = router(AppState::from_args(&args).unwrap());
        let resp = app
            .oneshot(ingest_request(&input, Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json_body(resp).await,
            json!({ "reindex": "skipped", "ingested_rows": 3, "kept_rows": 1 })
        );

        let rules = std::fs::read_to_string(&args.rules_path).unwrap();
        assert_eq!(rules.lines().count(), 2);
        assert!(rules.contains("H1234-001,861007,"));
    }
}
