// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("Object \"{name}\" not found")]
    NotFound { name: String },

    #[error("The driver for object \"{name}\" is not \"{driver}\"")]
    DriverMismatch { name: String, driver: String },

    #[error("Requested driver \"{0}\" does not exist")]
    UnknownDriver(String),

    #[error("{0}")]
    InvalidAttribute(String),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("unsupported schema version \"{0}\"")]
    UnsupportedSchemaVersion(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub(crate) fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub(crate) fn driver_mismatch(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self::DriverMismatch {
            name: name.into(),
            driver: driver.into(),
        }
    }
}
