// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

#![doc = include_str!("../README.md")]

mod attribute;
pub use self::attribute::{
    Attribute, AttributeFilter, AttributeId, AttributeValue, Datatype, HIDDEN_KEY_PREFIX,
    is_hidden_key, validate_key,
};

pub mod containment;

mod database;
pub use self::database::{
    SCHEMA_VERSION, SCHEMA_VERSION_KEY, init_clusto, open_database, open_in_memory,
    optimize_database,
};

mod db_id;

mod driver;
pub use self::driver::Driver;

mod entity;
pub use self::entity::{Entity, EntityFilter, EntityId, EntityRef};

mod error;
pub use self::error::{Error, Result};

mod store;
pub use self::store::{Clusto, EntityDetails};

// Re-exported for callers that need to handle database errors.
pub use sqlx;
