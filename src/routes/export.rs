use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::notebook::NoteQuery;
use crate::AppState;

#[derive(Serialize)]
struct ExportNote {
    id: String,
    content: String,
    created_at: String,
    updated_at: String,
    tags: Vec<String>,
}

#[derive(Serialize)]
struct ExportData {
    exported_at: String,
    email: String,
    tags: Vec<String>,
    notes: Vec<ExportNote>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/export", get(export_data))
}

async fn export_data(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let notebook = state.notebook(&user);

    let mut notes = Vec::new();
    let mut page = 1;
    loop {
        let batch = notebook
            .list(&NoteQuery {
                page,
                page_size: 100,
                ..NoteQuery::default()
            })
            .await?;
        notes.extend(batch.notes.into_iter().map(|item| {
            let mut tags: Vec<String> = item.tags.into_iter().map(|t| t.name).collect();
            tags.sort();
            ExportNote {
                id: item.note.id,
                content: item.note.content,
                created_at: item.note.created_at,
                updated_at: item.note.updated_at,
                tags,
            }
        }));
        if !batch.has_next {
            break;
        }
        page += 1;
    }

    let mut tags: Vec<String> = notebook.tags().await?.into_iter().map(|t| t.name).collect();
    tags.dedup();

    let export = ExportData {
        exported_at: chrono::Utc::now().to_rfc3339(),
        email: user.email,
        tags,
        notes,
    };

    let filename = format!("hashnote-export-{}.json", chrono::Local::now().format("%Y-%m-%d"));
    let content_disposition = format!("attachment; filename=\"{}\"", filename);

    let body = serde_json::to_string_pretty(&export).map_err(|e| AppError::Export(e.to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(value) = HeaderValue::from_str(&content_disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    Ok((headers, body))
}
