use anyhow::{Context, anyhow};
use serde_json::{Map, Value, json};

use crate::common::truncate_for_log;

/// Downstream search reindex trigger. Without a URL the call is reported as
/// skipped.
#[derive(Clone)]
pub struct Reindexer {
    url: Option<String>,
    client: reqwest::Client,
}

impl Reindexer {
    pub fn new(url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("formulary-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed creating reindex HTTP client")?;
        Ok(Self { url, client })
    }

    pub async fn trigger(&self) -> anyhow::Result<Map<String, Value>> {
        let Some(url) = self.url.as_deref() else {
            return Ok(object(json!({ "reindex": "skipped" })));
        };

        tracing::info!("Triggering reindex at {}", url);
        let resp = self
            .client
            .post(url)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Reindex failed ({}): {}",
                status,
                truncate_for_log(&body)
            ));
        }

        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("Invalid reindex JSON from {url}"))?;
        Ok(object(body))
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("reindex".to_string(), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::post;

    #[tokio::test]
    async fn test_skipped_without_url() {
        let reindexer = Reindexer::new(None).unwrap();
        let out = reindexer.trigger().await.unwrap();
        assert_eq!(out.get("reindex"), Some(&json!("skipped")));
    }

    #[tokio::test]
    async fn test_forwards_collaborator_response() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new()
            .route(
                "/reindex",
                post(|| async { axum::Json(json!({ "indexed": 42, "ok": true })) }),
            )
            .route(
                "/broken",
                post(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            )
            .route("/scalar", post(|| async { axum::Json(json!("done")) }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let ok = Reindexer::new(Some(format!("http://{addr}/reindex")))
            .unwrap()
            .trigger()
            .await
            .unwrap();
        assert_eq!(ok.get("indexed"), Some(&json!(42)));

        let scalar = Reindexer::new(Some(format!("http://{addr}/scalar")))
            .unwrap()
            .trigger()
            .await
            .unwrap();
        assert_eq!(scalar.get("reindex"), Some(&json!("done")));

        let err = Reindexer::new(Some(format!("http://{addr}/broken")))
            .unwrap()
            .trigger()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
