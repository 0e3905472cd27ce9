use askama::Template;
use axum::{
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower_sessions::Session;

use crate::auth::{create_user, find_user_by_email, login_user, logout_user, verify_password, RegisterError};
use crate::error::AppError;
use crate::models::User;
use crate::AppState;

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    error: Option<String>,
    email: String,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Template)]
#[template(path = "register.html")]
struct RegisterTemplate {
    error: Option<String>,
    email: String,
    static_hash: &'static str,
    user: Option<User>,
}

#[derive(Deserialize)]
pub struct CredentialsForm {
    email: String,
    password: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login_submit))
        .route("/register", get(register_page).post(register_submit))
        .route("/logout", post(logout))
}

fn login_form(error: Option<String>, email: String) -> Result<Response, AppError> {
    let template = LoginTemplate {
        error,
        email,
        static_hash: crate::STATIC_HASH,
        user: None,
    };
    Ok(Html(template.render()?).into_response())
}

fn register_form(error: Option<String>, email: String) -> Result<Response, AppError> {
    let template = RegisterTemplate {
        error,
        email,
        static_hash: crate::STATIC_HASH,
        user: None,
    };
    Ok(Html(template.render()?).into_response())
}

async fn login_page() -> Result<Response, AppError> {
    login_form(None, String::new())
}

async fn login_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    let user = find_user_by_email(&state.db, &form.email).await?;

    match user {
        Some(user) if verify_password(&form.password, &user.password_hash) => {
            tracing::info!(user_id = %user.id, "signed in");
            login_user(&session, user).await?;
            Ok(Redirect::to("/").into_response())
        }
        _ => login_form(Some("Invalid email or password".to_string()), form.email),
    }
}

async fn register_page() -> Result<Response, AppError> {
    register_form(None, String::new())
}

async fn register_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<CredentialsForm>,
) -> Result<Response, AppError> {
    match create_user(&state.db, &form.email, &form.password).await {
        Ok(user) => {
            login_user(&session, user).await?;
            Ok(Redirect::to("/").into_response())
        }
        Err(e) if e.is_user_error() => register_form(Some(e.to_string()), form.email),
        Err(RegisterError::Database(e)) => Err(e.into()),
        Err(e) => Err(AppError::Register(e)),
    }
}

async fn logout(session: Session) -> Result<impl IntoResponse, AppError> {
    logout_user(&session).await?;
    Ok(Redirect::to("/login"))
}
