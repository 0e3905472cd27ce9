use std::collections::BTreeSet;

use askama::Template;
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Form, Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::User;
use crate::notebook::NoteQuery;
use crate::routes::encode_component;
use crate::store::StoreError;
use crate::AppState;

const MAX_SUGGESTIONS: usize = 10;

struct TagWithCount {
    name: String,
    count: i64,
}

pub struct TagCloudItem {
    pub name: String,
    pub href: String,
    pub count: i64,
    pub font_size: String,
    pub color: String,
}

#[derive(Template)]
#[template(path = "tags/list.html")]
struct TagListTemplate {
    tags: Vec<TagCloudItem>,
    error: Option<String>,
    static_hash: &'static str,
    user: Option<User>,
}

pub struct TaggedNote {
    pub id: String,
    pub content: String,
    pub tags: Vec<String>,
}

#[derive(Template)]
#[template(path = "tags/show.html")]
struct TagShowTemplate {
    name: String,
    notes: Vec<TaggedNote>,
    total: usize,
    prev_url: Option<String>,
    next_url: Option<String>,
    static_hash: &'static str,
    user: Option<User>,
}

fn build_tag_cloud(tags: Vec<TagWithCount>) -> Vec<TagCloudItem> {
    if tags.is_empty() {
        return vec![];
    }

    // ln(count + 1) keeps tags without notes on the scale
    let weight = |count: i64| ((count.max(0) + 1) as f64).ln();
    let max_weight = tags.iter().map(|t| weight(t.count)).fold(f64::MIN, f64::max);
    let min_weight = tags.iter().map(|t| weight(t.count)).fold(f64::MAX, f64::min);

    let min_size: f64 = 0.8;
    let max_size: f64 = 2.4;

    // Same blues as the activity heatmap, pale for rare tags
    let min_light: f64 = 38.0;
    let max_light: f64 = 72.0;

    tags.into_iter()
        .map(|tag| {
            let ratio = if max_weight > min_weight {
                (weight(tag.count) - min_weight) / (max_weight - min_weight)
            } else {
                0.5
            };

            let font_size = min_size + ratio * (max_size - min_size);
            let light = max_light - ratio * (max_light - min_light);

            TagCloudItem {
                href: format!("/tags/{}", encode_component(&tag.name)),
                name: tag.name,
                count: tag.count,
                font_size: format!("{:.2}rem", font_size),
                color: format!("hsl(210, 70%, {:.0}%)", light),
            }
        })
        .collect()
}

#[derive(Deserialize)]
pub struct NewTagForm {
    name: String,
}

#[derive(Deserialize, Default)]
pub struct PageQuery {
    page: Option<u32>,
}

#[derive(Deserialize, Default)]
pub struct SuggestQuery {
    #[serde(default)]
    q: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/{name}", get(show_tag))
        .route("/api/tags/suggest", get(suggest_tags))
}

async fn render_tag_list(state: &AppState, user: User, error: Option<String>) -> Result<Response, AppError> {
    let counts = state.store.tag_counts(&user.id).await?;

    let cloud_items = build_tag_cloud(
        counts
            .into_iter()
            .map(|(name, count)| TagWithCount { name, count })
            .collect(),
    );

    let template = TagListTemplate {
        tags: cloud_items,
        error,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?).into_response())
}

async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Response, AppError> {
    render_tag_list(&state, user, None).await
}

async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Form(form): Form<NewTagForm>,
) -> Result<Response, AppError> {
    match state.notebook(&user).ensure_tag(&form.name).await {
        Ok(_) => Ok(Redirect::to("/tags").into_response()),
        Err(StoreError::Validation(msg)) => render_tag_list(&state, user, Some(msg)).await,
        Err(e) => Err(e.into()),
    }
}

async fn show_tag(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, AppError> {
    let page = state
        .notebook(&user)
        .list(&NoteQuery {
            search: None,
            tag: Some(name.clone()),
            page: query.page.unwrap_or(1),
            page_size: state.config.page_size,
        })
        .await?;

    let base = format!("/tags/{}", encode_component(&name));
    let page_url = |n: u32| {
        if n > 1 {
            format!("{base}?page={n}")
        } else {
            base.clone()
        }
    };

    let template = TagShowTemplate {
        notes: page
            .notes
            .into_iter()
            .map(|item| TaggedNote {
                tags: item
                    .tags
                    .into_iter()
                    .map(|t| t.name)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
                id: item.note.id,
                content: item.note.content,
            })
            .collect(),
        total: page.total,
        prev_url: (page.page > 1).then(|| page_url(page.page - 1)),
        next_url: page.has_next.then(|| page_url(page.page + 1)),
        name,
        static_hash: crate::STATIC_HASH,
        user: Some(user),
    };
    Ok(Html(template.render()?).into_response())
}

/// Existing names starting with `query`, then the typed text itself when it
/// names no tag yet.
fn suggestions(names: &BTreeSet<String>, query: &str) -> Vec<String> {
    let query = query.trim();
    let needle = query.to_lowercase();

    let mut matches: Vec<String> = names
        .iter()
        .filter(|name| name.to_lowercase().starts_with(&needle))
        .take(MAX_SUGGESTIONS)
        .cloned()
        .collect();

    if !query.is_empty() && !names.contains(query) {
        matches.push(query.to_string());
    }
    matches
}

async fn suggest_tags(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<SuggestQuery>,
) -> Result<impl IntoResponse, AppError> {
    let names: BTreeSet<String> = state
        .notebook(&user)
        .tags()
        .await?
        .into_iter()
        .map(|t| t.name)
        .collect();

    Ok(Json(suggestions(&names, &query.q)))
}
