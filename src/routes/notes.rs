use std::collections::BTreeSet;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::heatmap::{build_heatmap, HeatmapCell};
use crate::models::{NoteWithTags, User};
use crate::notebook::{NoteQuery, SaveError};
use crate::routes::encode_component;
use crate::store::StoreError;
use crate::AppState;

pub struct TagLink {
    pub name: String,
    pub href: String,
    pub active: bool,
}

impl TagLink {
    fn new(name: &str, active_tag: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            href: format!("/?tag={}", encode_component(name)),
            active: active_tag == Some(name),
        }
    }
}

pub struct NoteView {
    pub id: String,
    pub content: String,
    pub created_at: String,
    pub edited: bool,
    pub tags: Vec<TagLink>,
}

impl NoteView {
    fn new(item: NoteWithTags, active_tag: Option<&str>) -> Self {
        let names: BTreeSet<&str> = item.tags.iter().map(|t| t.name.as_str()).collect();
        Self {
            tags: names.into_iter().map(|name| TagLink::new(name, active_tag)).collect(),
            created_at: display_time(&item.note.created_at),
            edited: item.note.updated_at != item.note.created_at,
            id: item.note.id,
            content: item.note.content,
        }
    }
}

fn display_time(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|at| at.with_timezone(&Utc).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

#[derive(Template)]
#[template(path = "notes/list.html")]
struct DashboardTemplate {
    notes: Vec<NoteView>,
    sidebar: Vec<TagLink>,
    heatmap: Vec<Vec<HeatmapCell>>,
    search: String,
    active_tag: Option<String>,
    total: usize,
    prev_url: Option<String>,
    next_url: Option<String>,
    draft: String,
    error: Option<String>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Template)]
#[template(path = "notes/form.html")]
struct NoteFormTemplate {
    note_id: String,
    content: String,
    tags: Vec<String>,
    error: Option<String>,
    static_hash: &'static str,
    user: Option<User>,
}

pub struct TagOption {
    pub name: String,
    pub checked: bool,
}

#[derive(Template)]
#[template(path = "notes/tags.html")]
struct NoteTagsTemplate {
    note_id: String,
    content: String,
    options: Vec<TagOption>,
    error: Option<String>,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Deserialize, Default)]
pub struct DashboardQuery {
    q: Option<String>,
    tag: Option<String>,
    page: Option<u32>,
}

impl DashboardQuery {
    fn search(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    fn tag(&self) -> Option<&str> {
        self.tag.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Dashboard URL for another page of the same search and filter.
    fn page_url(&self, page: u32) -> String {
        let mut params = Vec::new();
        if let Some(q) = self.search() {
            params.push(format!("q={}", encode_component(q)));
        }
        if let Some(tag) = self.tag() {
            params.push(format!("tag={}", encode_component(tag)));
        }
        if page > 1 {
            params.push(format!("page={page}"));
        }
        if params.is_empty() {
            "/".to_string()
        } else {
            format!("/?{}", params.join("&"))
        }
    }
}

#[derive(Deserialize)]
pub struct NoteForm {
    content: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/notes", post(create_note))
        .route("/notes/{id}/edit", get(edit_note_form))
        .route("/notes/{id}", post(update_note).delete(delete_note))
        .route("/notes/{id}/tags", get(note_tags_form).post(update_note_tags))
}

async fn render_dashboard(
    state: &AppState,
    user: User,
    query: &DashboardQuery,
    draft: String,
    error: Option<String>,
) -> Result<Response, AppError> {
    let notebook = state.notebook(&user);
    let active_tag = query.tag();

    let page = notebook
        .list(&NoteQuery {
            search: query.search().map(str::to_string),
            tag: active_tag.map(str::to_string),
            page: query.page.unwrap_or(1),
            page_size: state.config.page_size,
        })
        .await?;

    let names: BTreeSet<String> = notebook.tags().await?.into_iter().map(|t| t.name).collect();
    let sidebar = names.iter().map(|name| TagLink::new(name, active_tag)).collect();

    let activity = notebook
        .activity(Utc::now().date_naive(), state.config.heatmap_days)
        .await?;

    let template = DashboardTemplate {
        notes: page
            .notes
            .into_iter()
            .map(|item| NoteView::new(item, active_tag))
            .collect(),
        sidebar,
        heatmap: build_heatmap(&activity),
        search: query.search().unwrap_or_default().to_string(),
        active_tag: active_tag.map(str::to_string),
        total: page.total,
        prev_url: (page.page > 1).then(|| query.page_url(page.page - 1)),
        next_url: page.has_next.then(|| query.page_url(page.page + 1)),
        draft,
        error,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?).into_response())
}

async fn dashboard(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<DashboardQuery>,
) -> Result<Response, AppError> {
    render_dashboard(&state, user, &query, String::new(), None).await
}

async fn create_note(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<NoteForm>,
) -> Result<Response, AppError> {
    let notebook = state.notebook(&user);
    let query = DashboardQuery::default();

    match notebook.save(None, &form.content).await {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(SaveError::Store(StoreError::Validation(msg))) => {
            render_dashboard(&state, user, &query, form.content, Some(msg)).await
        }
        Err(SaveError::Tags { note, source }) => {
            tracing::warn!(note_id = %note.id, "tags not updated: {source}");
            let msg = format!("Note saved, but its tags could not be updated: {source}");
            render_dashboard(&state, user, &query, String::new(), Some(msg)).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn edit_note_form(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let notebook = state.notebook(&user);

    let item = match notebook.get(&id).await {
        Ok(item) => item,
        Err(StoreError::NotFound(_)) => return Ok(Redirect::to("/").into_response()),
        Err(e) => return Err(e.into()),
    };

    let template = NoteFormTemplate {
        tags: item.tags.into_iter().map(|t| t.name).collect(),
        note_id: item.note.id,
        content: item.note.content,
        error: None,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?).into_response())
}

async fn update_note(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Form(form): Form<NoteForm>,
) -> Result<Response, AppError> {
    let notebook = state.notebook(&user);

    let current = match notebook.get(&id).await {
        Ok(item) => item,
        Err(StoreError::NotFound(_)) => return Ok(Redirect::to("/").into_response()),
        Err(e) => return Err(e.into()),
    };

    let current_tags: Vec<String> = current.tags.into_iter().map(|t| t.name).collect();

    let (error, tags) = match notebook.save(Some(&id), &form.content).await {
        Ok(_) => return Ok(Redirect::to("/").into_response()),
        Err(SaveError::Store(StoreError::Validation(msg))) => (msg, current_tags),
        Err(SaveError::Tags { source, .. }) => {
            tracing::warn!(note_id = %id, "tags not updated: {source}");
            // Steps before the failure stay applied
            let tags = match source.applied() {
                Some(applied) => applied.names().into_iter().collect(),
                None => current_tags,
            };
            (format!("Note saved, but its tags could not be updated: {source}"), tags)
        }
        Err(e) => return Err(e.into()),
    };

    let template = NoteFormTemplate {
        note_id: id,
        content: form.content,
        tags,
        error: Some(error),
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?).into_response())
}

async fn delete_note(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match state.notebook(&user).delete(&id).await {
        Ok(()) | Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    // htmx follows the header and reloads the list
    Ok(([("HX-Redirect", "/")], ""))
}

async fn render_note_tags(
    state: &AppState,
    user: User,
    note_id: &str,
    error: Option<String>,
) -> Result<Response, AppError> {
    let notebook = state.notebook(&user);

    let item = match notebook.get(note_id).await {
        Ok(item) => item,
        Err(StoreError::NotFound(_)) => return Ok(Redirect::to("/").into_response()),
        Err(e) => return Err(e.into()),
    };

    let attached: BTreeSet<String> = item.tags.into_iter().map(|t| t.name).collect();
    let mut names: BTreeSet<String> = notebook.tags().await?.into_iter().map(|t| t.name).collect();
    names.extend(attached.iter().cloned());

    let template = NoteTagsTemplate {
        options: names
            .into_iter()
            .map(|name| TagOption {
                checked: attached.contains(&name),
                name,
            })
            .collect(),
        note_id: item.note.id,
        content: item.note.content,
        error,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?).into_response())
}

async fn note_tags_form(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    render_note_tags(&state, user, &id, None).await
}

/// Checked boxes arrive as repeated `tag` fields; `new_tag` adds one more name.
fn selected_tags(fields: Vec<(String, String)>) -> BTreeSet<String> {
    fields
        .into_iter()
        .filter(|(key, _)| key == "tag" || key == "new_tag")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

async fn update_note_tags(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let notebook = state.notebook(&user);

    match notebook.set_tags(&id, selected_tags(fields)).await {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(SaveError::Store(StoreError::NotFound(_))) => Ok(Redirect::to("/").into_response()),
        Err(SaveError::Tags { source, .. }) => {
            tracing::warn!(note_id = %id, "manual tag update failed: {source}");
            let msg = format!("Tags could not be updated: {source}");
            render_note_tags(&state, user, &id, Some(msg)).await
        }
        Err(e) => Err(e.into()),
    }
}
