//! Test utilities and common setup.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::{
    Router,
    body::{Body, Bytes},
    extract::connect_info::MockConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode},
};
use tempfile::TempDir;
use tower::ServiceExt;
use waserver::{AppState, Config, routes};

/// Router plus the temp directories backing it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub app_dir: PathBuf,
    pub data_dir: PathBuf,
    _root: TempDir,
}

/// Response pieces the tests look at.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn content_type(&self) -> &str {
        self.headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

fn loopback() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40000))
}

/// Populate the application and data roots with a small fixture.
fn write_fixture(app_dir: &Path, data_dir: &Path) {
    std::fs::create_dir_all(app_dir.join("3_in_a_row")).unwrap();
    std::fs::write(
        app_dir.join("3_in_a_row/index.html"),
        "<html><head><title>3 in a row</title></head><body></body></html>",
    )
    .unwrap();
    std::fs::create_dir_all(app_dir.join("Golf_distance")).unwrap();
    std::fs::create_dir_all(app_dir.join("was")).unwrap();

    std::fs::create_dir_all(data_dir.join("adir")).unwrap();
    std::fs::write(data_dir.join("adir/myfile.json"), r#"{"akey": "avalue"}"#).unwrap();
    std::fs::write(data_dir.join("adir/myfile2.json"), r#"{"other": true}"#).unwrap();
    std::fs::write(data_dir.join("adir/myarray.json"), "[10, 11, 12]").unwrap();
}

pub fn test_app() -> TestApp {
    test_app_with(Config::default(), loopback())
}

pub fn test_app_with_config(config: Config) -> TestApp {
    test_app_with(config, loopback())
}

pub fn test_app_with(config: Config, peer: SocketAddr) -> TestApp {
    let root = TempDir::new().unwrap();
    let app_dir = root.path().join("app");
    let data_dir = root.path().join("data");
    write_fixture(&app_dir, &data_dir);

    let state = AppState::with_config(app_dir.clone(), data_dir.clone(), config);
    let router = routes::app_router(state.clone()).layer(MockConnectInfo(peer));

    TestApp {
        router,
        state,
        app_dir,
        data_dir,
        _root: root,
    }
}

impl TestApp {
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), 16 * 1024 * 1024)
            .await
            .unwrap();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn send(&self, method: Method, uri: &str, body: impl Into<Body>) -> TestResponse {
        self.request(
            Request::builder()
                .uri(uri)
                .method(method)
                .body(body.into())
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(Method::GET, uri, Body::empty()).await
    }

    pub async fn post(&self, uri: &str, body: &str) -> TestResponse {
        self.send(Method::POST, uri, body.to_string()).await
    }

    pub async fn delete(&self, uri: &str) -> TestResponse {
        self.send(Method::DELETE, uri, Body::empty()).await
    }
}
