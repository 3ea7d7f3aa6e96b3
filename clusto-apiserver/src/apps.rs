// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

//! Mountable applications.

use std::fmt;

use axum::{Router, http::HeaderMap, response::Response, routing::get};

use crate::{
    AppState,
    docs::{ModuleDoc, build_docs},
    server::{server_url, text_response},
};

pub mod attribute;
pub mod entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum App {
    Entity,
    Attribute,
}

impl App {
    pub const ALL: [Self; 2] = [Self::Entity, Self::Attribute];

    /// Name of the application in the configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Attribute => "attribute",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|app| app.name() == name)
    }

    #[must_use]
    pub const fn doc(self) -> &'static ModuleDoc {
        match self {
            Self::Entity => &entity::DOC,
            Self::Attribute => &attribute::DOC,
        }
    }

    /// All routes of the application below `prefix`.
    ///
    /// The prefix must start with a slash and must not end with one.
    pub fn routes(self, prefix: &str) -> Router<AppState> {
        let doc = self.doc();
        let router = Router::new().route(
            &format!("{prefix}/__doc__"),
            get(move |headers: HeaderMap| async move { app_docs(doc, &headers) }),
        );
        match self {
            Self::Entity => entity::routes(router, prefix),
            Self::Attribute => attribute::routes(router, prefix),
        }
    }
}

impl fmt::Display for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn app_docs(doc: &ModuleDoc, headers: &HeaderMap) -> Response {
    text_response(build_docs(doc, None, &server_url(headers)))
}
