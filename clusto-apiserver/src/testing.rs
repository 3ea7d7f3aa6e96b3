// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

//! Drives the router in-process.

use axum::{
    Router,
    body::{Body, Bytes, to_bytes},
    http::{HeaderMap, Method, Request, StatusCode, header, request},
};
use serde_json::Value;
use tower::ServiceExt as _;

use crate::{App, AppState, Mounts, router, util::CLUSTO_MODE_HEADER};

#[derive(Debug)]
pub(crate) struct TestResponse {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl TestResponse {
    pub(crate) fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub(crate) fn text(&self) -> &str {
        std::str::from_utf8(&self.body).unwrap()
    }
}

fn form_request(method: Method, uri: &str) -> request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
}

/// Router on a fresh in-memory database.
#[derive(Debug)]
pub(crate) struct TestServer {
    router: Router,
}

impl TestServer {
    /// Mounts all applications at their default prefixes.
    pub(crate) async fn new() -> Self {
        let mounts = [
            ("/entity".to_owned(), App::Entity),
            ("/attribute".to_owned(), App::Attribute),
        ]
        .into_iter()
        .collect();
        Self::with_mounts(mounts).await
    }

    pub(crate) async fn with_mounts(mounts: Mounts) -> Self {
        let clusto = clusto::open_in_memory().await.unwrap();
        let router = router(AppState::new(clusto, mounts), false);
        Self { router }
    }

    pub(crate) async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let body = to_bytes(body, usize::MAX).await.unwrap();
        TestResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    pub(crate) async fn send_empty(&self, method: Method, uri: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    pub(crate) async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let response = self.send_empty(Method::GET, uri).await;
        (response.status, response.json())
    }

    pub(crate) async fn send_with_mode(&self, method: Method, uri: &str, mode: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(CLUSTO_MODE_HEADER, mode)
            .body(Body::empty())
            .unwrap();
        let response = self.send(request).await;
        (response.status, response.json())
    }

    pub(crate) async fn send_form(&self, method: Method, uri: &str, form: &str) -> TestResponse {
        let request = form_request(method, uri)
            .body(Body::from(form.to_owned()))
            .unwrap();
        self.send(request).await
    }

    pub(crate) async fn send_form_with_mode(
        &self,
        method: Method,
        uri: &str,
        form: &str,
        mode: &str,
    ) -> TestResponse {
        let request = form_request(method, uri)
            .header(CLUSTO_MODE_HEADER, mode)
            .body(Body::from(form.to_owned()))
            .unwrap();
        self.send(request).await
    }

    pub(crate) async fn post_form(&self, uri: &str, form: &str) -> TestResponse {
        self.send_form(Method::POST, uri, form).await
    }
}
