//! Human verification: upstream failures fail closed, and the verifier sees the real client.

use async_trait::async_trait;
use common::{
    TestServer, admin_cookie, client, closed_addr, generate_keys, location, set_cookie,
    start_slow_siteverify,
};
use mailtrack_core::types::Limits;
use mailtrack_server::verify::{HumanVerifier, VerifyError};
use reqwest::header;
use reqwest::multipart::Form;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mod common;

async fn create_entry(server: &TestServer, recipient: &str) -> String {
    let admin = admin_cookie();
    let key = generate_keys(server, &admin, 1).await.remove(0);
    let form = Form::new()
        .text("entryId", key.clone())
        .text("recipientName", recipient.to_string())
        .text("accessMethod", "recipient");
    let response = client()
        .post(format!("{}/entry", server.url))
        .header(header::COOKIE, &admin)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 303);
    key
}

async fn lookup(server: &TestServer, key: &str, widget: &str) -> reqwest::Response {
    client()
        .post(format!("{}/lookup", server.url))
        .header("X-Real-IP", "198.51.100.23")
        .form(&[
            ("keyID", key),
            ("formPassword", "Alice"),
            ("cf-turnstile-response", widget),
        ])
        .send()
        .await
        .unwrap()
}

async fn assert_fails_closed(response: reqwest::Response) {
    assert_eq!(response.status(), 400);
    assert!(set_cookie(&response, "qtk").is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Verification failed, please retry");
}

#[tokio::test]
async fn test_unreachable_verifier_fails_closed() {
    let dead = closed_addr().await;
    let server = TestServer::start_with(
        Limits::default(),
        |config| config.turnstile.verify_url = format!("http://{dead}/siteverify"),
        |state| state,
    )
    .await;
    let key = create_entry(&server, "Alice").await;

    assert_fails_closed(lookup(&server, &key, common::HUMAN).await).await;
}

#[tokio::test]
async fn test_verifier_timeout_fails_closed() {
    let slow = start_slow_siteverify(Duration::from_secs(3)).await;
    let server = TestServer::start_with(
        Limits::default(),
        |config| {
            config.turnstile.verify_url = format!("http://{slow}/siteverify");
            config.turnstile.timeout_ms = 200;
        },
        |state| state,
    )
    .await;
    let key = create_entry(&server, "Alice").await;

    assert_fails_closed(lookup(&server, &key, common::HUMAN).await).await;
}

/// Accepts everything and remembers what it was asked.
#[derive(Default)]
struct RecordingVerifier {
    calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl HumanVerifier for RecordingVerifier {
    async fn verify(&self, response: &str, client_ip: &str) -> Result<(), VerifyError> {
        self.calls
            .lock()
            .unwrap()
            .push((response.to_string(), client_ip.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn test_verifier_receives_widget_response_and_client_ip() {
    let verifier = Arc::new(RecordingVerifier::default());
    let installed = verifier.clone();
    let server = TestServer::start_with(
        Limits::default(),
        |_| {},
        move |state| state.with_verifier(installed),
    )
    .await;
    let key = create_entry(&server, "Alice").await;

    let granted = lookup(&server, &key, "widget-answer").await;
    assert_eq!(granted.status(), 303);
    assert_eq!(location(&granted), format!("/view/{key}"));

    let calls = verifier.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![("widget-answer".to_string(), "198.51.100.23".to_string())]
    );
}
