use axum::{Form, Json, Router, routing::post};
use mailtrack_core::types::Limits;
use mailtrack_server::config::{Config, TurnstileConfig};
use mailtrack_server::state::AppState;
use reqwest::{Client, Response, header, redirect::Policy};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const ADMIN_PASSWORD: &str = "operator-pass";
/// The only widget response the fake verification endpoint accepts.
pub const HUMAN: &str = "pass-token";

pub struct TestServer {
    pub url: String,
    #[allow(dead_code)]
    pub addr: SocketAddr,
    _data: TempDir,
}

async fn fake_siteverify(Form(form): Form<HashMap<String, String>>) -> Json<Value> {
    let ok = form.get("secret").map(String::as_str) == Some("turnstile-secret")
        && form.get("response").map(String::as_str) == Some(HUMAN);
    if ok {
        Json(json!({ "success": true, "error-codes": [] }))
    } else {
        Json(json!({ "success": false, "error-codes": ["invalid-input-response"] }))
    }
}

async fn start_fake_siteverify() -> SocketAddr {
    let app = Router::new().route("/siteverify", post(fake_siteverify));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A `siteverify` endpoint that answers success only after `delay`.
pub async fn start_slow_siteverify(delay: std::time::Duration) -> SocketAddr {
    let app = Router::new().route(
        "/siteverify",
        post(move || async move {
            tokio::time::sleep(delay).await;
            Json(json!({ "success": true }))
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Operator cookie without going through `/login`, for tests where verification fails.
pub fn admin_cookie() -> String {
    format!("X-Admin-Token={ADMIN_PASSWORD}")
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with_limits(Limits::default()).await
    }

    pub async fn start_with_limits(limits: Limits) -> Self {
        Self::start_with(limits, |_| {}, |state| state).await
    }

    /// `configure` runs on the config before the state is built, `customize` on the state
    /// before it is served.
    pub async fn start_with(
        limits: Limits,
        configure: impl FnOnce(&mut Config),
        customize: impl FnOnce(AppState) -> AppState,
    ) -> Self {
        let verify_addr = start_fake_siteverify().await;
        let data = TempDir::new().unwrap();

        let mut config = Config {
            host: "127.0.0.1".into(),
            port: 0, // OS assigns port
            data_dir: data.path().to_path_buf(),
            limits,
            admin_token: Some(ADMIN_PASSWORD.into()),
            token_secret: Some("http-test-secret".into()),
            turnstile: TurnstileConfig {
                secret: Some("turnstile-secret".into()),
                site_key: Some("site-key".into()),
                verify_url: format!("http://{verify_addr}/siteverify"),
                timeout_ms: 2000,
            },
            secure_cookies: false,
        };
        configure(&mut config);

        let state = customize(AppState::new(&config).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            mailtrack_server::serve(listener, state, std::future::pending())
                .await
                .unwrap();
        });

        // Give server a moment to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            url: format!("http://{addr}"),
            addr,
            _data: data,
        }
    }
}

/// Client that leaves redirects to the test.
pub fn client() -> Client {
    Client::builder().redirect(Policy::none()).build().unwrap()
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// `name=value` of a cookie set by the response, ready for a `Cookie` header.
pub fn set_cookie(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{name}=")))
        .map(str::to_string)
}

pub async fn login(server: &TestServer) -> String {
    let response = client()
        .post(format!("{}/login", server.url))
        .form(&[
            ("password", ADMIN_PASSWORD),
            ("cf-turnstile-response", HUMAN),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303);
    set_cookie(&response, "X-Admin-Token").unwrap()
}

pub async fn generate_keys(server: &TestServer, admin: &str, quantity: usize) -> Vec<String> {
    let response = client()
        .post(format!("{}/admin/keys/generate", server.url))
        .header(header::COOKIE, admin)
        .form(&[
            ("quantity", quantity.to_string()),
            ("length", "8".to_string()),
            ("comment", "http".to_string()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    body.as_array()
        .unwrap()
        .iter()
        .map(|record| record["key"].as_str().unwrap().to_string())
        .collect()
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([180, 40, 40]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    buf
}
