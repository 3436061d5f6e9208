//! Shared setup for router-level tests: in-memory database, fake media host
//! and fake completion API, plus small request helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use chatline_api::ai::{self, CompletionClient};
use chatline_api::app;
use chatline_api::config::Config;
use chatline_api::media::{MediaStore, Upload};
use chatline_api::state::{AppState, AppStateInner};
use chatline_api::tokens::TokenIssuer;
use chatline_db::Database;
use chatline_gateway::dispatcher::Dispatcher;
use chatline_types::api::ChatTurn;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "correct horse battery";

#[derive(Default)]
pub struct FakeMedia {
    pub uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl MediaStore for FakeMedia {
    async fn upload(&self, upload: Upload) -> anyhow::Result<String> {
        let mut uploads = self.uploads.lock().unwrap();
        let url = format!(
            "https://media.test/{}/{}.img",
            upload.folder.as_str(),
            uploads.len()
        );
        uploads.push(upload.content_type);
        Ok(url)
    }
}

/// Replies with "echo: <last user turn>", or fails when `fail` is set.
pub struct FakeCompletion {
    pub fail: bool,
    pub seen_models: Mutex<Vec<String>>,
}

#[async_trait]
impl CompletionClient for FakeCompletion {
    async fn complete(&self, model: &str, messages: &[ChatTurn]) -> anyhow::Result<String> {
        self.seen_models.lock().unwrap().push(model.to_string());
        if self.fail {
            anyhow::bail!("upstream exploded");
        }
        let last = messages.last().map(|t| t.content.as_str()).unwrap_or("");
        Ok(format!("echo: {}", last))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub media: Arc<FakeMedia>,
    pub completion: Option<Arc<FakeCompletion>>,
}

pub fn config() -> Config {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("ACCESS_TOKEN_SECRET", "test-access-secret"),
        ("REFRESH_TOKEN_SECRET", "test-refresh-secret"),
        ("ADMIN_EMAILS", ADMIN_EMAIL),
        ("CHATLINE_ENV", "production"),
    ]);
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

pub fn test_app() -> TestApp {
    build(Some(false))
}

pub fn test_app_without_assistant() -> TestApp {
    build(None)
}

pub fn test_app_with_failing_assistant() -> TestApp {
    build(Some(true))
}

fn build(assistant: Option<bool>) -> TestApp {
    let config = config();
    let db = Database::open_in_memory().unwrap();
    ai::seed_assistant(&db, config.assistant_id).unwrap();

    let media = Arc::new(FakeMedia::default());
    let completion = assistant.map(|fail| {
        Arc::new(FakeCompletion {
            fail,
            seen_models: Mutex::new(vec![]),
        })
    });

    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher: Dispatcher::new(),
        tokens: TokenIssuer::new(&config),
        media: media.clone(),
        assistant: completion
            .clone()
            .map(|c| c as Arc<dyn CompletionClient>),
        config,
    });

    TestApp {
        router: app::router(state.clone()),
        state,
        media,
        completion,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `name=value` of the refresh cookie, ready for a `Cookie` header.
    pub fn refresh_cookie(&self) -> Option<String> {
        self.set_cookie()
            .and_then(|c| c.split(';').next())
            .map(|c| c.trim().to_string())
            .filter(|c| c.starts_with("refreshToken=") && c.len() > "refreshToken=".len())
    }

    pub fn set_cookie(&self) -> Option<&str> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> TestResponse {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        let req = Request::builder()
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    pub async fn put(&self, uri: &str, token: &str) -> TestResponse {
        let req = Request::builder()
            .method(Method::PUT)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    pub async fn refresh(&self, cookie: Option<&str>) -> TestResponse {
        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/api/auth/refresh-token");
        if let Some(cookie) = cookie {
            req = req.header(header::COOKIE, cookie);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    pub async fn multipart(
        &self,
        method: Method,
        uri: &str,
        token: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
    ) -> TestResponse {
        let (content_type, body) = multipart_body(fields, file);
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }

    /// Sign up and return (access token, user id, refresh cookie).
    pub async fn signup(&self, name: &str, email: &str) -> (String, String, String) {
        let res = self
            .json(
                Method::POST,
                "/api/auth/signup",
                None,
                serde_json::json!({ "fullName": name, "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(res.status, StatusCode::CREATED, "signup failed: {}", res.body);
        let cookie = res.refresh_cookie().expect("signup sets refresh cookie");
        (
            res.body["token"].as_str().unwrap().to_string(),
            res.body["userData"]["id"].as_str().unwrap().to_string(),
            cookie,
        )
    }
}

const BOUNDARY: &str = "chatline-test-boundary";

pub fn multipart_body(
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}
