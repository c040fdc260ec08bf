//! REST interface.
//!
//! The server (feature `http`) exposes the knowledge base under
//! `/knowledge-base`; [`client::KbClient`] talks to it.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET/POST | `/global` | list / create global entries |
//! | GET | `/global/context` | global block |
//! | GET | `/global/processing-jobs` | global upload jobs |
//! | GET/POST | `/threads/{thread_id}` | list / create thread entries |
//! | GET | `/threads/{thread_id}/context` | thread block |
//! | GET | `/threads/{thread_id}/processing-jobs` | thread upload jobs |
//! | GET/POST | `/agents/{agent_id}` | list / create agent entries |
//! | GET | `/agents/{agent_id}/context` | agent block |
//! | GET | `/agents/{agent_id}/processing-jobs` | agent upload jobs |
//! | GET/PUT/DELETE | `/entries/{entry_id}` | single entry |
//! | GET | `/context` | combined context |
//! | POST | `/upload` | multipart upload, `202` |
//! | GET | `/documents/status/{job_id}` | processing job |
//! | GET | `/documents/chunks` | chunks of uploaded documents |
//! | DELETE | `/documents/{filename}` | delete an uploaded document |
//! | GET | `/documents/supported-formats` | extractable formats |
//! | POST | `/query` | free-text query |
//! | GET | `/query/logs` | recent queries of an account |

pub mod client;

#[cfg(feature = "http")]
mod error;
#[cfg(feature = "http")]
pub mod handlers;

#[cfg(feature = "http")]
pub use error::{ApiError, ApiResult, status_for};

pub use client::KbClient;

/// Path prefix of every route.
pub const API_PREFIX: &str = "/knowledge-base";

#[cfg(feature = "http")]
use std::sync::Arc;

#[cfg(feature = "http")]
use crate::services::KnowledgeBase;
use crate::config::KbConfig;
#[cfg(not(feature = "http"))]
use crate::Error;
use crate::Result;

/// Extra bytes allowed on top of the upload limit for multipart framing and form fields.
#[cfg(feature = "http")]
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Builds the router over a knowledge base.
#[cfg(feature = "http")]
pub fn router(kb: Arc<KnowledgeBase>) -> axum::Router {
    use axum::extract::DefaultBodyLimit;
    use axum::http::header;
    use axum::routing::{delete, get, post};
    use tower_http::set_header::SetResponseHeaderLayer;
    use tower_http::trace::TraceLayer;

    let body_limit = usize::try_from(kb.config().extraction.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let api = axum::Router::new()
        .route(
            "/global",
            get(handlers::list_global).post(handlers::create_global),
        )
        .route("/global/context", get(handlers::global_context))
        .route("/global/processing-jobs", get(handlers::global_jobs))
        .route(
            "/threads/{thread_id}",
            get(handlers::list_thread).post(handlers::create_thread),
        )
        .route("/threads/{thread_id}/context", get(handlers::thread_context))
        .route(
            "/threads/{thread_id}/processing-jobs",
            get(handlers::thread_jobs),
        )
        .route(
            "/agents/{agent_id}",
            get(handlers::list_agent).post(handlers::create_agent),
        )
        .route("/agents/{agent_id}/context", get(handlers::agent_context))
        .route(
            "/agents/{agent_id}/processing-jobs",
            get(handlers::agent_jobs),
        )
        .route(
            "/entries/{entry_id}",
            get(handlers::get_entry)
                .put(handlers::update_entry)
                .delete(handlers::delete_entry),
        )
        .route("/context", get(handlers::combined_context))
        .route("/upload", post(handlers::upload))
        .route("/documents/status/{job_id}", get(handlers::job_status))
        .route("/documents/chunks", get(handlers::document_chunks))
        .route(
            "/documents/supported-formats",
            get(handlers::supported_formats),
        )
        .route("/documents/{filename}", delete(handlers::delete_document))
        .route("/query", post(handlers::query))
        .route("/query/logs", get(handlers::query_logs));

    axum::Router::new()
        .nest(API_PREFIX, api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            header::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(kb)
}

/// Opens the knowledge base and serves it until Ctrl-C.
///
/// Builds its own tokio runtime, so it must not be called from async code.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the address cannot
/// be bound.
#[cfg(feature = "http")]
pub fn serve(config: &KbConfig) -> Result<()> {
    let kb = Arc::new(KnowledgeBase::open(config)?);
    let app = router(kb);
    let addr = config.bind_address();

    let rt = tokio::runtime::Runtime::new().map_err(|e| crate::Error::failed("create_runtime", e))?;

    rt.block_on(async {
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::failed("bind", format!("{addr}: {e}")))?;
        tracing::info!(address = %addr, "Knowledge base server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Failed to listen for shutdown signal");
                    std::future::pending::<()>().await;
                }
                tracing::info!("Shutting down");
            })
            .await
            .map_err(|e| crate::Error::failed("serve", e))
    })
}

/// Serving requires the `http` feature.
///
/// # Errors
///
/// Always returns [`Error::FeatureNotEnabled`].
#[cfg(not(feature = "http"))]
pub fn serve(_config: &KbConfig) -> Result<()> {
    Err(Error::FeatureNotEnabled("http".to_string()))
}
