//! The HTTP control surface (spec.md §6): a GET request whose path contains
//! the literal `control/command/`; the substring after that marker is the
//! command line.
//!
//! A single axum route, no auth/session/database middleware — this surface
//! has none of those concerns (SPEC_FULL.md §6).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::control::CommandRouter;

const MARKER: &str = "control/command/";

async fn handle_command(
    State(router): State<Arc<CommandRouter>>,
    uri: Uri,
) -> (StatusCode, String) {
    let path = uri.path();
    let Some(idx) = path.find(MARKER) else {
        return (StatusCode::NOT_FOUND, format!("path does not contain {MARKER:?}"));
    };
    let command_line = urlencoding_decode(&path[idx + MARKER.len()..]);

    match router.dispatch(&command_line).await {
        Ok(result) => (StatusCode::OK, result),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Minimal percent-decoding for the command substring — no query-string or
/// form parsing is needed for this surface, only the literal path segment
/// after the marker.
fn urlencoding_decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            let hi = chars.next();
            let lo = chars.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let Ok(byte) = u8::from_str_radix(&format!("{hi}{lo}"), 16) {
                    out.push(byte as char);
                    continue;
                }
            }
            out.push('%');
        } else {
            out.push(c);
        }
    }
    out
}

/// Extracted from [`serve`] so a test can drive the router directly with
/// `tower::ServiceExt::oneshot` instead of binding a real socket.
fn build_router(router: Arc<CommandRouter>) -> Router {
    Router::new()
        .route("/*path", get(handle_command))
        .route("/", get(handle_command))
        .layer(TraceLayer::new_for_http())
        .with_state(router)
}

pub async fn serve(router: Arc<CommandRouter>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = build_router(router);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "http control surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use cameleer_engine::config::task_config::CameleerDefaults;
    use cameleer_engine::engine::{Cameleer, QueueSpec};
    use cameleer_engine::logging::TracingSink;
    use cameleer_engine::schedule::manual::ManualSchedule;
    use tower::ServiceExt;

    #[test]
    fn decodes_percent_escaped_spaces() {
        assert_eq!(urlencoding_decode("run"), "run");
        assert_eq!(urlencoding_decode("interruptjob%2042"), "interruptjob 42");
    }

    fn defaults() -> CameleerDefaults {
        CameleerDefaults {
            default_recovery_schedule: Arc::new(|_ctx| {
                Box::pin(async move { Ok(ManualSchedule::new().handle()) })
            }),
            default_max_num_fails: 0,
            default_skip: false,
            default_continue_on_final_fail: false,
            static_task_context_serialize_interval: std::time::Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn run_command_reaches_the_engine_through_the_marker_path() {
        let path = std::env::temp_dir().join(format!("cameleer-http-test-{}.json", std::process::id()));
        let engine = Cameleer::new(
            vec![QueueSpec::Parallel { name: "default".into(), parallelism: 1, default: true }],
            defaults(),
            &path,
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();
        let provider: Arc<dyn crate::config_file::ConfigProvider> =
            Arc::new(crate::config_file::TomlConfigProvider::from_str("").unwrap());
        let router = Arc::new(CommandRouter::new(
            engine,
            provider,
            crate::control::ShutdownSignal::new(),
        ));
        let app = build_router(router);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/control/command/run")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let _ = tokio::fs::remove_file(&path).await;
    }

    #[tokio::test]
    async fn unknown_command_through_http_is_a_500() {
        let path = std::env::temp_dir().join(format!("cameleer-http-test-404-{}.json", std::process::id()));
        let engine = Cameleer::new(
            vec![QueueSpec::Parallel { name: "default".into(), parallelism: 1, default: true }],
            defaults(),
            &path,
            Arc::new(TracingSink),
            None,
        )
        .await
        .unwrap();
        let provider: Arc<dyn crate::config_file::ConfigProvider> =
            Arc::new(crate::config_file::TomlConfigProvider::from_str("").unwrap());
        let router = Arc::new(CommandRouter::new(
            engine,
            provider,
            crate::control::ShutdownSignal::new(),
        ));
        let app = build_router(router);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/control/command/frobnicate")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let _ = tokio::fs::remove_file(&path).await;
    }
}
