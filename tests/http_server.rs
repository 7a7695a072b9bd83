//! HTTP-level tests: requests go through the axum router with `oneshot`,
//! carrying the session cookie by hand between requests.

use std::sync::Arc;

use anyhow::Result;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt; // for `oneshot`
use url::form_urlencoded;

use gracie::identity::{IdentityUrls, LocalAuthService};
use gracie::protocol::OpenIdServer;
use gracie::provider::Provider;
use gracie::security;
use gracie::server::{router, AppState};

const ALICE: &str = "http://localhost:8000/id/alice";
const RP: &str = "http://rp.example/";
const RETURN_TO: &str = "http://rp.example/return";

fn app() -> Result<(TempDir, Router)> {
    let dir = tempdir()?;
    let users = dir.path().join("users.json");
    security::add_user(&users, "alice", "alice-pw", Some("Alice Example"), None)?;
    let provider = Provider::in_memory(
        Arc::new(LocalAuthService::new(users)),
        Arc::new(OpenIdServer::new(b"http-test-secret".to_vec())),
        IdentityUrls::new("http://localhost:8000/")?,
    );
    Ok((dir, router(AppState::new(Arc::new(provider)))))
}

fn encode(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish()
}

fn get(uri: &str, cookie: Option<&str>) -> Result<Request<Body>> {
    let mut b = Request::builder().method("GET").uri(uri);
    if let Some(c) = cookie { b = b.header(header::COOKIE, c); }
    Ok(b.body(Body::empty())?)
}

fn post_form(uri: &str, cookie: Option<&str>, pairs: &[(&str, &str)]) -> Result<Request<Body>> {
    let mut b = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(c) = cookie { b = b.header(header::COOKIE, c); }
    Ok(b.body(Body::from(encode(pairs)))?)
}

/// `gracie_session=<token>` as sent back by the browser.
fn session_cookie(resp: &Response) -> String {
    let set = resp.headers().get(header::SET_COOKIE).expect("session cookie").to_str().unwrap();
    set.split(';').next().unwrap().to_string()
}

async fn body_text(resp: Response) -> Result<String> {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn checkid_setup_uri() -> String {
    format!(
        "/openidserver?{}",
        encode(&[
            ("openid.mode", "checkid_setup"),
            ("openid.identity", ALICE),
            ("openid.trust_root", RP),
            ("openid.return_to", RETURN_TO),
        ])
    )
}

#[tokio::test]
async fn about_page_issues_session_cookie() -> Result<()> {
    let (_dir, app) = app()?;
    let resp = app.oneshot(get("/", None)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let set = resp.headers()[header::SET_COOKIE].to_str()?.to_string();
    assert!(set.starts_with("gracie_session="));
    assert!(set.contains("HttpOnly"));
    assert!(body_text(resp).await?.contains("About this site"));
    Ok(())
}

#[tokio::test]
async fn known_session_cookie_is_kept() -> Result<()> {
    let (_dir, app) = app()?;
    let first = app.clone().oneshot(get("/", None)?).await?;
    let cookie = session_cookie(&first);
    let second = app.oneshot(get("/login", Some(&cookie))?).await?;
    assert_eq!(session_cookie(&second), cookie);
    Ok(())
}

#[tokio::test]
async fn identity_pages() -> Result<()> {
    let (_dir, app) = app()?;
    let resp = app.clone().oneshot(get("/id/alice", None)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await?;
    assert!(html.contains("Identity page for Alice Example"));
    assert!(html.contains("rel=\"openid.server\" href=\"http://localhost:8000/openidserver\""));

    let resp = app.clone().oneshot(get("/id/nobody", None)?).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_text(resp).await?.contains("User Not Found"));

    let resp = app.oneshot(get("/no/such/page", None)?).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_text(resp).await?.contains("Resource Not Found"));
    Ok(())
}

#[tokio::test]
async fn browser_login_and_consent_flow() -> Result<()> {
    let (_dir, app) = app()?;

    let resp = app.clone().oneshot(get(&checkid_setup_uri(), None)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = session_cookie(&resp);
    let html = body_text(resp).await?;
    assert!(html.contains("Authentication Required"));
    assert!(html.contains("value=\"alice\""));

    let resp = app
        .clone()
        .oneshot(post_form("/login", Some(&cookie), &[("username", "alice"), ("password", "alice-pw"), ("submit", "Sign in")])?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await?;
    assert!(html.contains("Approve Site"));
    assert!(html.contains("You are logged in."));

    let resp = app
        .clone()
        .oneshot(post_form("/consent", Some(&cookie), &[("identity", ALICE), ("trust_root", RP), ("approve", "Approve")])?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let location = resp.headers()[header::LOCATION].to_str()?;
    assert!(location.starts_with(RETURN_TO));
    assert!(location.contains("openid.mode=id_res"));
    assert!(location.contains("openid.sig="));

    // Approved and logged in: the next setup request is answered without a page
    let resp = app.oneshot(get(&checkid_setup_uri(), Some(&cookie))?).await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    Ok(())
}

#[tokio::test]
async fn failed_login_shows_form_again() -> Result<()> {
    let (_dir, app) = app()?;
    let resp = app
        .oneshot(post_form("/login", None, &[("username", "alice"), ("password", "nope"), ("submit", "Sign in")])?)
        .await?;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await?;
    assert!(html.contains("Login Failed"));
    assert!(html.contains("The login details were incorrect."));
    assert!(!html.contains("nope"));
    Ok(())
}

#[tokio::test]
async fn cancelled_login_answers_relying_site() -> Result<()> {
    let (_dir, app) = app()?;
    let resp = app.clone().oneshot(get(&checkid_setup_uri(), None)?).await?;
    let cookie = session_cookie(&resp);

    let resp = app.oneshot(post_form("/login", Some(&cookie), &[("cancel", "Cancel")])?).await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let location = resp.headers()[header::LOCATION].to_str()?;
    assert!(location.starts_with(RETURN_TO));
    assert!(location.contains("openid.mode=cancel"));
    Ok(())
}

#[tokio::test]
async fn malformed_form_submissions() -> Result<()> {
    let (_dir, app) = app()?;
    let resp = app.clone().oneshot(post_form("/login", None, &[("username", "alice")])?).await?;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.oneshot(post_form("/consent", None, &[("identity", ALICE), ("trust_root", RP)])?).await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn logout_issues_a_new_session() -> Result<()> {
    let (_dir, app) = app()?;
    let resp = app
        .clone()
        .oneshot(post_form("/login", None, &[("username", "alice"), ("password", "alice-pw"), ("submit", "Sign in")])?)
        .await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let cookie = session_cookie(&resp);

    let resp = app.clone().oneshot(get("/logout", Some(&cookie))?).await?;
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "http://localhost:8000/");
    let fresh = session_cookie(&resp);
    assert_ne!(fresh, cookie);

    let html = body_text(app.oneshot(get("/", Some(&fresh))?).await?).await?;
    assert!(html.contains("You are not logged in."));
    Ok(())
}

#[tokio::test]
async fn direct_requests_get_key_value_answers() -> Result<()> {
    let (_dir, app) = app()?;
    let resp = app
        .clone()
        .oneshot(post_form("/openidserver", None, &[("openid.mode", "associate"), ("openid.assoc_type", "HMAC-SHA1")])?)
        .await?;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(resp.headers()[header::CONTENT_TYPE].to_str()?.starts_with("text/plain"));
    assert!(body_text(resp).await?.contains("error_code:unsupported-type\n"));

    // Missing return_to: a protocol error page, not a redirect
    let uri = format!("/openidserver?{}", encode(&[("openid.mode", "checkid_setup"), ("openid.identity", ALICE)]));
    let resp = app.oneshot(get(&uri, None)?).await?;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await?.contains("Protocol Error"));
    Ok(())
}

#[tokio::test]
async fn concurrent_requests_get_distinct_sessions() -> Result<()> {
    let (_dir, app) = app()?;
    let responses = futures::future::join_all((0..16).map(|_| {
        let app = app.clone();
        async move { app.oneshot(get("/", None).unwrap()).await }
    }))
    .await;
    let mut cookies = Vec::new();
    for resp in responses {
        cookies.push(session_cookie(&resp?));
    }
    cookies.sort();
    cookies.dedup();
    assert_eq!(cookies.len(), 16);
    Ok(())
}
