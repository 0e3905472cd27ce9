use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use crate::auth::RegisterError;
use crate::notebook::SaveError;
use crate::reconcile::ReconcileError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum AppError {
    Database(sqlx::Error),
    Template(askama::Error),
    Session(tower_sessions::session::Error),
    Store(StoreError),
    Reconcile(ReconcileError),
    Register(RegisterError),
    Export(String),
    NotFound,
}

fn store_response(e: StoreError) -> Response {
    match e {
        StoreError::Authentication => Redirect::to("/login").into_response(),
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "Not found").into_response(),
        StoreError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg).into_response(),
        StoreError::Network(msg) => {
            tracing::error!("Store error: {msg}");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found").into_response(),
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Template(e) => {
                tracing::error!("Template error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Session(e) => {
                tracing::error!("Session error: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Register(e) => {
                tracing::error!("Registration failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Export(msg) => {
                tracing::error!("Export failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            AppError::Store(e) => store_response(e),
            AppError::Reconcile(e) => {
                tracing::error!("Tag update failed: {e}");
                match e {
                    ReconcileError::Store(e) => store_response(e),
                    ReconcileError::Step { .. } => {
                        (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
                    }
                }
            }
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<askama::Error> for AppError {
    fn from(e: askama::Error) -> Self {
        AppError::Template(e)
    }
}

impl From<tower_sessions::session::Error> for AppError {
    fn from(e: tower_sessions::session::Error) -> Self {
        AppError::Session(e)
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Store(e)
    }
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> Self {
        AppError::Reconcile(e)
    }
}

impl From<SaveError> for AppError {
    fn from(e: SaveError) -> Self {
        match e {
            SaveError::Store(e) => AppError::Store(e),
            SaveError::Tags { source, .. } => AppError::Reconcile(source),
        }
    }
}
