//! Internal HTTP API.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/api/inbox` | Priority inbox (`limit`, `project`) |
//! | `GET`  | `/api/opportunities` | Unified opportunities (`limit`, `project`) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! Feed endpoints always answer with a well-formed envelope. Degraded
//! sources are listed in `errors` with status 200; a failure of the whole
//! request returns 500 with empty items and an `error` message. A malformed
//! query string gets the same empty envelope with status 400.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::error::FeedError;
use crate::services::inbox::{get_priority_inbox, INBOX_SOURCES};
use crate::services::opportunities::{get_opportunities, OPPORTUNITY_SOURCES};
use crate::services::FeedQuery;
use crate::signals::{Feed, SourceType};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/inbox", get(handle_inbox))
        .route("/api/opportunities", get(handle_opportunities))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Bind to `server.bind` and serve until Ctrl-C.
pub async fn run_server(state: AppState) -> std::io::Result<()> {
    let bind_addr = state.config.server.bind.clone();
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    log::info!("opsdesk listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}

fn feed_response(sources: &[SourceType], result: Result<Feed, FeedError>) -> Response {
    match result {
        Ok(feed) => (StatusCode::OK, Json(feed)).into_response(),
        Err(e) => {
            log::error!("Feed aggregation failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Feed::failed(sources, e.to_string())),
            )
                .into_response()
        }
    }
}

fn rejected_query(sources: &[SourceType], rejection: QueryRejection) -> Response {
    let message = rejection.body_text();
    log::warn!("Rejected feed query: {message}");
    (rejection.status(), Json(Feed::failed(sources, message))).into_response()
}

async fn handle_inbox(
    State(state): State<AppState>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return rejected_query(&INBOX_SOURCES, rejection),
    };
    let result = get_priority_inbox(&state, &query, Utc::now()).await;
    feed_response(&INBOX_SOURCES, result)
}

async fn handle_opportunities(
    State(state): State<AppState>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return rejected_query(&OPPORTUNITY_SOURCES, rejection),
    };
    let result = get_opportunities(&state, &query, Utc::now()).await;
    feed_response(&OPPORTUNITY_SOURCES, result)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_db;
    use crate::db::DbServiceDeal;
    use crate::services::test_support::state_for;
    use crate::types::Config;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (_db, path) = test_db();
        let app = router(state_for(path, Config::default()));
        let (status, body) = get_json(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn empty_store_returns_zeroed_envelope() {
        let (_db, path) = test_db();
        let app = router(state_for(path, Config::default()));
        let (status, body) = get_json(app, "/api/inbox?limit=10").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"].as_array().map(Vec::len), Some(0));
        assert_eq!(body["counts"]["overdue_action"], 0);
        assert_eq!(body["counts"]["stale_relationship"], 0);
        assert_eq!(body["counts"]["total"], 0);
        assert_eq!(body["errors"].as_array().map(Vec::len), Some(0));
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn opportunities_endpoint_serializes_signals() {
        let (db, path) = test_db();
        db.upsert_service_deal(&DbServiceDeal {
            id: "s1".into(),
            name: Some("Workshop series".into()),
            contact_id: None,
            value: Some(4_000.0),
            stage: "lead".into(),
            expected_close: None,
            project_code: Some("ACT-JH".into()),
            fit_score: Some(5.0),
        })
        .unwrap();
        let app = router(state_for(path, Config::default()));

        let (status, body) = get_json(app, "/api/opportunities?project=ACT-JH").await;
        assert_eq!(status, StatusCode::OK);
        let item = &body["items"][0];
        assert_eq!(item["id"], "service-s1");
        assert_eq!(item["sourceType"], "service_opportunity");
        assert_eq!(item["urgencyTier"], "low");
        assert_eq!(item["opportunity"]["fitScore"], 5.0);
        assert_eq!(item["opportunity"]["amountMin"], 4_000.0);
        assert_eq!(body["counts"]["service_opportunity"], 1);
        assert_eq!(body["counts"]["grant_opportunity"], 0);
    }

    #[tokio::test]
    async fn malformed_limit_returns_400_with_envelope() {
        let (_db, path) = test_db();
        let state = state_for(path, Config::default());

        for uri in ["/api/inbox?limit=abc", "/api/opportunities?limit=-1"] {
            let (status, body) = get_json(router(state.clone()), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["items"].as_array().map(Vec::len), Some(0));
            assert_eq!(body["counts"]["total"], 0);
            assert!(body["error"]
                .as_str()
                .is_some_and(|m| m.contains("limit")), "{uri}: {body}");
        }
    }

    #[tokio::test]
    async fn total_failure_returns_500_with_envelope() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = router(state_for(dir.path().join("absent.db"), Config::default()));
        let (status, body) = get_json(app, "/api/opportunities").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["items"].as_array().map(Vec::len), Some(0));
        assert_eq!(body["counts"]["total"], 0);
        assert_eq!(body["counts"]["fundraising_opportunity"], 0);
        assert!(body["error"]
            .as_str()
            .is_some_and(|m| m.contains("absent.db")));
    }
}
