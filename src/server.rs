//!
//! gracie HTTP server
//! ------------------
//! Axum router for the OpenID provider: the protocol endpoint, identity
//! pages, login/logout and the consent form.
//!
//! Responsibilities:
//! - Resolving the `gracie_session` cookie to a session and re-issuing it on every response.
//! - Turning form and query input into `Provider` calls.
//! - Rendering each [`Outcome`] (protocol answer, redirect or page).
//! - Converting errors and panics into error pages without dropping the connection.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::FutureExt; // for catch_unwind on async blocks
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::error::{AppError, IdentityError, IdentityResult};
use crate::identity::{token_prefix, IdentityUrls, LocalAuthService, PublicIdentity, Session};
use crate::protocol::{OpenIdServer, WebResponse};
use crate::provider::{ConsentDecision, Outcome, Provider};

pub mod pages;

use pages::{Page, PageContext};

pub const SESSION_COOKIE: &str = "gracie_session";

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<Provider>,
    /// Mark the session cookie `Secure`; set when the root URL is https.
    pub secure_cookie: bool,
}

impl AppState {
    pub fn new(provider: Arc<Provider>) -> Self {
        let secure_cookie = provider.urls().root_url().starts_with("https:");
        Self { provider, secure_cookie }
    }
}

/// What a handler produced: a provider outcome, or a page of the HTTP layer's own.
enum View {
    Outcome(Outcome),
    Page(StatusCode, Page),
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(about))
        .route("/openidserver", get(openid_get).post(openid_post))
        .route("/id/{name}", get(identity_view))
        .route("/login", get(login_view).post(login_submit))
        .route("/consent", post(consent_submit))
        .route("/logout", get(logout))
        .fallback(not_found)
        .with_state(state)
}

/// Build the provider from `config` and serve until the listener fails.
pub async fn run_with_config(config: ServerConfig) -> anyhow::Result<()> {
    let urls = IdentityUrls::new(&config.root_url)
        .with_context(|| format!("While parsing root URL {}", config.root_url))?;
    let protocol = match &config.secret {
        Some(secret) => OpenIdServer::new(secret.clone()),
        None => OpenIdServer::with_random_secret().context("While generating the signing secret")?,
    };
    info!(
        target: "startup",
        host = %config.host,
        port = config.port,
        root_url = %urls.root_url(),
        users_file = %config.users_file.display(),
        users_file_exists = config.users_file.exists(),
        fixed_secret = config.secret.is_some(),
        "gracie starting"
    );
    let provider = Provider::in_memory(
        Arc::new(LocalAuthService::new(config.users_file.clone())),
        Arc::new(protocol),
        urls,
    );
    let app = router(AppState::new(Arc::new(provider)));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("While binding {}", addr))?;
    let local: SocketAddr = listener.local_addr()?;
    info!(target: "startup", %local, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(header::COOKIE) {
        let Ok(s) = cookie.to_str() else { continue };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() { return Some(v.to_string()); }
            }
        }
    }
    None
}

fn session_cookie(sid: &str, secure: bool) -> Option<HeaderValue> {
    // SameSite=Lax: relying sites send the browser here with top-level navigations
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!("{}={}; HttpOnly; SameSite=Lax; Path=/{}", SESSION_COOKIE, sid, secure)).ok()
}

/// Resume the browser's session, run `handle` against it and render the result.
///
/// `handle` may replace the session (logout); the cookie names whichever
/// session is current afterwards.
async fn serve<F>(state: &AppState, headers: &HeaderMap, route: &'static str, handle: F) -> Response
where
    F: FnOnce(&Provider, &mut Session) -> IdentityResult<View> + Send,
{
    let provider = state.provider.as_ref();
    let work = async {
        let mut session = provider.resume_session(parse_cookie(headers, SESSION_COOKIE).as_deref())?;
        let view = handle(provider, &mut session)?;
        Ok::<_, IdentityError>((session.session_id, view))
    };
    match AssertUnwindSafe(work).catch_unwind().await {
        Ok(Ok((sid, view))) => {
            // Re-read so pages show the login that just happened
            let auth_entry = provider.sessions().get(&sid).ok().and_then(|s| s.auth_entry);
            let mut response = render(provider.urls(), auth_entry.as_ref(), view);
            if let Some(cookie) = session_cookie(&sid, state.secure_cookie) {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            response
        }
        Ok(Err(e)) => {
            let app: AppError = e.into();
            error!(target: "http", route, code = app.code_str(), "request failed: {}", app.message());
            let page = match &app {
                AppError::Protocol { message, .. } => pages::protocol_error(message),
                other => pages::internal_error(other.message()),
            };
            page_response(status_of(&app), &page, provider.urls(), None)
        }
        Err(panic_payload) => {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() { *s }
                      else if let Some(s) = panic_payload.downcast_ref::<String>() { s.as_str() }
                      else { "panic" };
            error!(target: "panic", route, "HTTP handler panic: {}", msg);
            page_response(StatusCode::INTERNAL_SERVER_ERROR, &pages::internal_error("internal server error"), provider.urls(), None)
        }
    }
}

fn status_of(app: &AppError) -> StatusCode {
    StatusCode::from_u16(app.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn page_response(status: StatusCode, page: &Page, urls: &IdentityUrls, auth_entry: Option<&PublicIdentity>) -> Response {
    let body = page.render(&PageContext { urls, auth_entry });
    (status, [(header::CONTENT_TYPE, "text/html; charset=utf-8")], body).into_response()
}

fn redirect(location: &str) -> Response {
    info!(target: "http", %location, "redirecting");
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

fn protocol_response(web: WebResponse) -> Response {
    let status = StatusCode::from_u16(web.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, web.body).into_response();
    for (name, value) in &web.headers {
        match (header::HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => { response.headers_mut().insert(name, value); }
            _ => warn!(target: "openid", header = %name, "dropping unencodable response header"),
        }
    }
    response
}

fn render(urls: &IdentityUrls, auth_entry: Option<&PublicIdentity>, view: View) -> Response {
    let (status, page) = match view {
        View::Page(status, page) => (status, page),
        View::Outcome(outcome) => match outcome {
            Outcome::Protocol(web) => return protocol_response(web),
            Outcome::Redirect(location) => return redirect(&location),
            Outcome::About => (StatusCode::OK, pages::about_site()),
            Outcome::ProtocolError(message) => {
                (status_of(&AppError::protocol("protocol_error", message.as_str())), pages::protocol_error(&message))
            }
            Outcome::LoginPrompt { required_identity, want_username }
            | Outcome::WrongIdentity { required_identity, want_username } => {
                (StatusCode::OK, pages::wrong_authentication(&required_identity, want_username.as_deref()))
            }
            Outcome::ConsentPrompt { identity, trust_root } => {
                (StatusCode::OK, pages::consent_prompt(&identity, &trust_root, &urls.consent_url()))
            }
            Outcome::LoginFailed { username } => (StatusCode::OK, pages::login_failed(&username)),
        },
    };
    page_response(status, &page, urls, auth_entry)
}

async fn about(State(state): State<AppState>, headers: HeaderMap) -> Response {
    serve(&state, &headers, "about", |_, _| Ok(View::Outcome(Outcome::About))).await
}

async fn openid_get(State(state): State<AppState>, headers: HeaderMap, Query(query): Query<BTreeMap<String, String>>) -> Response {
    serve(&state, &headers, "openidserver", move |provider, session| {
        provider.handle_protocol_request(&session.session_id, &query).map(View::Outcome)
    })
    .await
}

async fn openid_post(State(state): State<AppState>, headers: HeaderMap, Form(query): Form<BTreeMap<String, String>>) -> Response {
    serve(&state, &headers, "openidserver", move |provider, session| {
        provider.handle_protocol_request(&session.session_id, &query).map(View::Outcome)
    })
    .await
}

async fn identity_view(State(state): State<AppState>, headers: HeaderMap, Path(name): Path<String>) -> Response {
    serve(&state, &headers, "identity", move |provider, _| {
        match provider.auth_service().lookup(&name) {
            Ok(entry) => {
                let urls = provider.urls();
                Ok(View::Page(StatusCode::OK, pages::identity_view(&entry, &urls.identity_url_for(&entry.name), &urls.openid_endpoint())))
            }
            Err(IdentityError::NotFound { name }) => Ok(View::Page(StatusCode::NOT_FOUND, pages::user_not_found(&name))),
            Err(e) => Err(e),
        }
    })
    .await
}

async fn login_view(State(state): State<AppState>, headers: HeaderMap) -> Response {
    serve(&state, &headers, "login", |_, _| Ok(View::Page(StatusCode::OK, pages::login_view("")))).await
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LoginForm {
    username: String,
    password: String,
    submit: Option<String>,
    cancel: Option<String>,
}

async fn login_submit(State(state): State<AppState>, headers: HeaderMap, uri: Uri, Form(form): Form<LoginForm>) -> Response {
    serve(&state, &headers, "login", move |provider, session| {
        if form.cancel.is_some() {
            provider.login_cancel(&session.session_id).map(View::Outcome)
        } else if form.submit.is_some() {
            provider.login_submit(&session.session_id, &form.username, &form.password).map(View::Outcome)
        } else {
            Ok(View::Page(StatusCode::NOT_FOUND, pages::url_not_found(uri.path())))
        }
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConsentForm {
    identity: String,
    trust_root: String,
    approve: Option<String>,
    deny: Option<String>,
}

async fn consent_submit(State(state): State<AppState>, headers: HeaderMap, Form(form): Form<ConsentForm>) -> Response {
    serve(&state, &headers, "consent", move |provider, session| {
        let decision = match (form.approve.is_some(), form.deny.is_some()) {
            // Deny wins when a client sends both
            (_, true) => ConsentDecision::Deny,
            (true, false) => ConsentDecision::Approve,
            (false, false) => {
                return Ok(View::Page(
                    StatusCode::BAD_REQUEST,
                    pages::protocol_error("The consent form must be submitted with approve or deny."),
                ))
            }
        };
        provider.consent_submit(&session.session_id, &form.identity, &form.trust_root, decision).map(View::Outcome)
    })
    .await
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    serve(&state, &headers, "logout", |provider, session| {
        info!(target: "session", sid = token_prefix(&session.session_id), "logout");
        *session = provider.logout(&session.session_id)?;
        Ok(View::Outcome(Outcome::Redirect(provider.urls().root_url())))
    })
    .await
}

async fn not_found(State(state): State<AppState>, headers: HeaderMap, uri: Uri) -> Response {
    serve(&state, &headers, "not_found", move |_, _| {
        Ok(View::Page(StatusCode::NOT_FOUND, pages::url_not_found(uri.path())))
    })
    .await
}
