// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::util::dumps;

/// Errors that are reported to HTTP clients.
///
/// Rendered as a JSON string with the message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Clusto(#[from] clusto::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Status { status: StatusCode, message: String },
}

impl ApiError {
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn missing_param(name: &str) -> Self {
        Self::BadRequest(format!("Requires HTTP parameter \"{name}\""))
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Clusto(err) => match err {
                clusto::Error::NotFound { .. } => StatusCode::NOT_FOUND,
                clusto::Error::DriverMismatch { .. }
                | clusto::Error::UnknownDriver(_)
                | clusto::Error::InvalidOperation(_) => StatusCode::CONFLICT,
                clusto::Error::InvalidAttribute(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Status { status, .. } => *status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            // Do not leak internals to clients.
            log::error!("Request failed: {self:#}");
            return dumps(&"Internal server error", status);
        }
        dumps(&self.to_string(), status)
    }
}
