//! Session login gate and flat-file user store.
//!
//! The user list lives in a single JSON file, read fully on every auth
//! operation and rewritten fully on every registration. Passwords are stored
//! as salted SHA-256 hashes. Sessions are opaque random tokens in an
//! in-memory table, carried in an HttpOnly cookie; they do not survive a
//! restart.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, get_service},
    Form, Router,
};
use tower_http::services::ServeFile;
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use dashboard_core::DashboardError;

use crate::{AppError, AppState};

#[cfg(test)]
#[path = "auth_tests.rs"]
mod auth_tests;

pub const SESSION_COOKIE: &str = "sid";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    username: String,
    salt: String,
    password_hash: String,
}

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Flat-file user store. The mutex serializes the read-modify-write cycle of
/// registration; reads outside it are fine since writes are whole-file.
pub struct UserStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

#[derive(Debug, PartialEq)]
pub enum RegisterOutcome {
    Created,
    AlreadyExists,
}

impl UserStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<UserRecord>, DashboardError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| DashboardError::UserStore(format!("read {:?}: {}", self.path, e)))?;

        serde_json::from_str(&raw)
            .map_err(|e| DashboardError::UserStore(format!("parse {:?}: {}", self.path, e)))
    }

    fn save(&self, users: &[UserRecord]) -> Result<(), DashboardError> {
        let raw = serde_json::to_string_pretty(users)
            .map_err(|e| DashboardError::UserStore(e.to_string()))?;

        std::fs::write(&self.path, raw)
            .map_err(|e| DashboardError::UserStore(format!("write {:?}: {}", self.path, e)))
    }

    pub fn register(&self, username: &str, password: &str) -> Result<RegisterOutcome, DashboardError> {
        let _guard = self.write_lock.lock().unwrap();

        let mut users = self.load()?;
        if users.iter().any(|u| u.username == username) {
            return Ok(RegisterOutcome::AlreadyExists);
        }

        let salt = random_hex(16);
        users.push(UserRecord {
            username: username.to_string(),
            password_hash: hash_password(&salt, password),
            salt,
        });
        self.save(&users)?;

        tracing::info!("Registered user {}", username);
        Ok(RegisterOutcome::Created)
    }

    pub fn verify(&self, username: &str, password: &str) -> Result<bool, DashboardError> {
        let users = self.load()?;
        Ok(users
            .iter()
            .find(|u| u.username == username)
            .is_some_and(|u| u.password_hash == hash_password(&u.salt, password)))
    }
}

/// In-memory session table: token -> username.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, String>,
}

impl SessionStore {
    pub fn create(&self, username: &str) -> String {
        let token = random_hex(32);
        self.sessions.insert(token.clone(), username.to_string());
        token
    }

    pub fn username(&self, token: &str) -> Option<String> {
        self.sessions.get(token).map(|u| u.clone())
    }

    pub fn destroy(&self, token: &str) {
        self.sessions.remove(token);
    }
}

/// Pull the session token out of the Cookie header.
pub(crate) fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;

    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| value.to_string())
    })
}

fn session_cookie(token: &str) -> String {
    format!("{}={}; HttpOnly; Path=/; SameSite=Lax", SESSION_COOKIE, token)
}

fn expired_cookie() -> String {
    format!("{}=; HttpOnly; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// Redirect unauthenticated requests for the protected dashboard page to the
/// login form. Never serves the page without a valid session.
pub async fn require_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let authenticated = session_token(&headers)
        .and_then(|token| state.sessions.username(&token))
        .is_some();

    if !authenticated {
        return Redirect::to("/login").into_response();
    }

    next.run(request).await
}

#[derive(Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Login/register pages plus the form handlers and logout.
pub fn auth_routes(public_dir: &Path) -> Router<AppState> {
    Router::new()
        .route(
            "/login",
            get_service(ServeFile::new(public_dir.join("login.html"))).post(login),
        )
        .route(
            "/register",
            get_service(ServeFile::new(public_dir.join("register.html"))).post(register),
        )
        .route("/logout", get(logout))
}

async fn register(
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> Result<Html<&'static str>, AppError> {
    match state
        .users
        .register(&credentials.username, &credentials.password)?
    {
        RegisterOutcome::AlreadyExists => Ok(Html(
            r#"User already exists. <a href="/register">Try again</a>"#,
        )),
        RegisterOutcome::Created => Ok(Html(
            r#"Registration successful! <a href="/login">Login here</a>"#,
        )),
    }
}

async fn login(
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> Result<Response, AppError> {
    if !state
        .users
        .verify(&credentials.username, &credentials.password)?
    {
        return Ok(Html(r#"Invalid username or password. <a href="/login">Try again</a>"#)
            .into_response());
    }

    let token = state.sessions.create(&credentials.username);
    tracing::debug!("Session opened for {}", credentials.username);

    Ok((
        [(header::SET_COOKIE, session_cookie(&token))],
        Redirect::to("/index.html"),
    )
        .into_response())
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.destroy(&token);
    }

    (
        [(header::SET_COOKIE, expired_cookie())],
        Redirect::to("/login"),
    )
        .into_response()
}
