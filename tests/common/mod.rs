//! Shared helpers for integration tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use tower::ServiceExt;

use tether_gateway::api::{self, ApiState};
use tether_gateway::{db, Config};

/// A simulated device with a real Ed25519 keypair
pub struct TestDevice {
    pub id: String,
    pub public_key: String,
    signing_key: SigningKey,
}

impl TestDevice {
    pub fn generate(id: &str) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = base64::engine::general_purpose::STANDARD
            .encode(signing_key.verifying_key().as_bytes());
        Self {
            id: id.to_string(),
            public_key,
            signing_key,
        }
    }

    /// Sign a challenge nonce the way a real device would
    pub fn sign(&self, nonce: &str) -> String {
        let signature = self.signing_key.sign(nonce.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(signature.to_bytes())
    }

    /// Registration body for this device
    pub fn register_body(&self, user_id: &str) -> serde_json::Value {
        serde_json::json!({
            "deviceId": self.id,
            "deviceName": format!("{} device", self.id),
            "deviceType": "phone",
            "publicKey": self.public_key,
            "metadata": {"os": "test"},
            "userId": user_id,
        })
    }
}

/// Fresh state over an in-memory database
pub fn test_state() -> Arc<ApiState> {
    let pool = db::init_memory().unwrap();
    Arc::new(ApiState::new(pool, &Config::default()))
}

/// Full router over fresh state
pub fn test_app() -> (Router, Arc<ApiState>) {
    let state = test_state();
    (api::router(state.clone()), state)
}

/// POST a JSON body, optionally with a bearer token
pub async fn post(
    app: &Router,
    uri: &str,
    token: Option<&str>,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// GET a URI, optionally with a bearer token
pub async fn get(app: &Router, uri: &str, token: Option<&str>) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    let request = builder.body(Body::empty()).unwrap();

    send(app, request).await
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Run the register → challenge → verify flow, returning the session token
pub async fn pair_device(app: &Router, device: &TestDevice, user_id: &str) -> String {
    let (status, _) = post(app, "/register-initial", None, &device.register_body(user_id)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, challenge) = post(
        app,
        "/challenge",
        None,
        &serde_json::json!({"deviceId": device.id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let nonce = challenge["challenge"].as_str().unwrap();
    let (status, verified) = post(
        app,
        "/verify",
        None,
        &serde_json::json!({
            "challengeId": challenge["challengeId"],
            "signature": device.sign(nonce),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    verified["token"].as_str().unwrap().to_string()
}
