// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use axum::{
    body::to_bytes,
    extract::{FromRequest, Request},
    http::header,
};
use itertools::Itertools as _;
use url::form_urlencoded;

use crate::ApiError;

/// Upper bound for form bodies.
const MAX_FORM_BODY_BYTES: usize = 1 << 20;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request parameters.
///
/// Collected from both the query string and a form-encoded body, in this
/// order. Each parameter may occur multiple times.
///
/// Consumes the request body, i.e. must be the last extractor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    #[must_use]
    pub fn parse(input: &[u8]) -> Self {
        Self(form_urlencoded::parse(input).into_owned().collect())
    }

    /// All values of a parameter.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .collect()
    }

    /// The first value of a parameter.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn require(&self, name: &str) -> Result<&str, ApiError> {
        self.get(name).ok_or_else(|| ApiError::missing_param(name))
    }

    /// Distinct parameter names in order of appearance.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str()).unique()
    }

    fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }
}

impl<S> FromRequest<S> for Params
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let mut params = request
            .uri()
            .query()
            .map(|query| Self::parse(query.as_bytes()))
            .unwrap_or_default();
        let is_form = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(FORM_CONTENT_TYPE));
        if is_form {
            let body = to_bytes(request.into_body(), MAX_FORM_BODY_BYTES)
                .await
                .map_err(|err| ApiError::BadRequest(format!("Invalid request body: {err}")))?;
            params.extend(Self::parse(&body));
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        extract::{FromRequest as _, Request},
        http::header,
    };

    use super::Params;

    #[test]
    fn repeated_params() {
        let params = Params::parse(b"name=a&driver=pool&name=b%20c&name=");
        assert_eq!(params.get_all("name"), ["a", "b c", ""]);
        assert_eq!(params.get("driver"), Some("pool"));
        assert_eq!(params.get("missing"), None);
        assert!(params.require("missing").is_err());
        assert_eq!(params.names().collect::<Vec<_>>(), ["name", "driver"]);
    }

    #[tokio::test]
    async fn query_and_form_body() {
        let request = Request::builder()
            .method("POST")
            .uri("/entity/pool?name=q1")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=f1&name=f2"))
            .unwrap();
        let params = Params::from_request(request, &()).await.unwrap();
        assert_eq!(params.get_all("name"), ["q1", "f1", "f2"]);
    }

    #[tokio::test]
    async fn ignore_other_bodies() {
        let request = Request::builder()
            .method("POST")
            .uri("/entity/pool")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"x"}"#))
            .unwrap();
        let params = Params::from_request(request, &()).await.unwrap();
        assert_eq!(params, Params::default());
    }
}
