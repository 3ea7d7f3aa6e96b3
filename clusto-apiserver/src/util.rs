// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use std::str::FromStr;

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse as _, Response},
};
use clusto::{Clusto, Entity};
use serde::Serialize;
use serde_json::{Serializer, Value, ser::PrettyFormatter};

use crate::ApiError;

/// Request header that selects how entities are presented.
pub const CLUSTO_MODE_HEADER: &str = "Clusto-Mode";

/// Presentation of entities in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Only the path, e.g. `/pool/webservers`.
    Compact,
    /// Name, driver, attributes, contents and parents.
    Expanded,
}

impl FromStr for Mode {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = s.trim();
        if mode.eq_ignore_ascii_case("compact") {
            Ok(Self::Compact)
        } else if mode.eq_ignore_ascii_case("expanded") {
            Ok(Self::Expanded)
        } else {
            Err(ApiError::BadRequest(format!(
                "Invalid {CLUSTO_MODE_HEADER} \"{s}\", expected \"compact\" or \"expanded\""
            )))
        }
    }
}

impl Mode {
    /// Reads the mode from the request headers.
    pub fn from_headers(headers: &HeaderMap, default: Self) -> Result<Self, ApiError> {
        let Some(value) = headers.get(CLUSTO_MODE_HEADER) else {
            return Ok(default);
        };
        let value = value.to_str().map_err(|_| {
            ApiError::BadRequest(format!("Invalid {CLUSTO_MODE_HEADER} header encoding"))
        })?;
        value.parse()
    }
}

/// Serializes a value as indented JSON with sorted keys.
pub fn to_json_string(value: &impl Serialize) -> serde_json::Result<String> {
    // Maps of a `Value` are ordered by key.
    let value = serde_json::to_value(value)?;
    let mut buf = Vec::with_capacity(128);
    let mut serializer = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Builds a JSON response.
pub fn dumps(value: &impl Serialize, status: StatusCode) -> Response {
    let body = match to_json_string(value) {
        Ok(body) => body,
        Err(err) => {
            log::error!("Failed to serialize response: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    (
        status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        )],
        body,
    )
        .into_response()
}

/// Renders a single entity.
pub async fn render_entity(clusto: &Clusto, entity: &Entity, mode: Mode) -> Result<Value, ApiError> {
    match mode {
        Mode::Compact => Ok(Value::String(entity.path())),
        Mode::Expanded => {
            let details = clusto.show(entity).await?;
            serde_json::to_value(details).map_err(|err| {
                ApiError::with_status(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            })
        }
    }
}

/// Renders a list of entities.
pub async fn render_entities<'a>(
    clusto: &Clusto,
    entities: impl IntoIterator<Item = &'a Entity>,
    mode: Mode,
) -> Result<Value, ApiError> {
    let mut rendered = Vec::new();
    for entity in entities {
        rendered.push(render_entity(clusto, entity, mode).await?);
    }
    Ok(Value::Array(rendered))
}
