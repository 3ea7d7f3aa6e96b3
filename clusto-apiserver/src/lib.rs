// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

//! HTTP API server for the clusto inventory database.
//!
//! The root application serves version, metadata, documentation and
//! lookups by name. Additional applications are mounted at configurable
//! path prefixes.

use std::collections::BTreeMap;

pub mod apps;
pub use self::apps::App;

pub mod config;
pub use self::config::Config;

pub mod docs;

mod error;
pub use self::error::ApiError;

mod params;
pub use self::params::Params;

pub mod server;
pub use self::server::{AppState, router, run};

pub mod util;
pub use self::util::Mode;

#[cfg(test)]
mod testing;

/// Version of the server, reported by `/__version__`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Mounted applications by path prefix.
pub type Mounts = BTreeMap<String, App>;
