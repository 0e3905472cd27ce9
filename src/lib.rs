pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod heatmap;
pub mod models;
pub mod notebook;
pub mod reconcile;
pub mod routes;
pub mod store;

pub const STATIC_HASH: &str = env!("STATIC_HASH");

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::{routing::get, Router};
use sqlx::SqlitePool;
use time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tower_sessions::{cookie::SameSite, Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore as SessionStore;
use tracing::Level;

use crate::config::Config;
use crate::models::User;
use crate::notebook::Notebook;
use crate::reconcile::{TagEvent, TagEvents};
use crate::store::{OwnerSession, SqliteStore};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub store: Arc<SqliteStore>,
    pub events: TagEvents,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: SqlitePool, config: Config) -> Self {
        Self {
            store: Arc::new(SqliteStore::new(db.clone())),
            db,
            events: TagEvents::default(),
            config: Arc::new(config),
        }
    }

    /// Notes and tags as seen by the signed-in user.
    pub fn notebook(&self, user: &User) -> Notebook {
        Notebook::new(
            self.store.clone(),
            self.store.clone(),
            Arc::new(OwnerSession::authenticated(user.id.clone())),
            self.events.clone(),
        )
    }
}

async fn health() -> &'static str {
    "ok"
}

/// Logs tag changes published by reconciliations until the channel closes.
fn spawn_tag_event_log(events: &TagEvents) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(TagEvent::Changed {
                    note_id,
                    created,
                    associated,
                    disassociated,
                    complete,
                    ..
                }) => tracing::info!(
                    %note_id,
                    created = created.len(),
                    associated = associated.len(),
                    disassociated = disassociated.len(),
                    complete,
                    "tags changed"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "tag event log fell behind");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Build the full Axum application router.
///
/// Caller is responsible for running database migrations on `pool` beforehand.
/// This function sets up the session store (and migrates its table), then
/// assembles all route modules, middleware, and state.
pub async fn build_app(pool: SqlitePool, config: Config) -> Router {
    let session_store = SessionStore::new(pool.clone());
    session_store
        .migrate()
        .await
        .expect("Failed to migrate session store");

    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::days(30)))
        .with_secure(config.secure_cookies)
        .with_http_only(true)
        .with_same_site(SameSite::Lax);

    let state = AppState::new(pool, config);
    spawn_tag_event_log(&state.events);

    Router::new()
        .route("/health", get(health))
        .merge(routes::auth::router())
        .merge(routes::notes::router())
        .merge(routes::tags::router())
        .merge(routes::export::router())
        .nest_service(
            "/static",
            ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("public, max-age=86400"),
                ))
                .service(ServeDir::new("static")),
        )
        .layer(session_layer)
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}
