// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use std::fmt;

use futures_util::stream::BoxStream;
use serde::{Serialize, Serializer};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqliteExecutor};

use crate::Driver;

crate::db_id!(EntityId);

#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Entity {
    #[sqlx(rename = "entity_id")]
    pub id: EntityId,
    pub name: String,
    pub driver: String,
    #[sqlx(rename = "type")]
    pub clusto_type: String,
}

/// Reference to an [`Entity`] by name and driver.
///
/// Serialized as its path, e.g. `/pool/webservers`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub driver: String,
    pub name: String,
}

impl EntityRef {
    #[must_use]
    pub fn path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { driver, name } = self;
        write!(f, "/{driver}/{name}")
    }
}

impl Serialize for EntityRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Criteria for selecting entities.
///
/// Empty lists do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFilter {
    pub names: Vec<String>,
    pub drivers: Vec<String>,
    pub types: Vec<String>,
}

fn push_in_values<'a>(query: &mut QueryBuilder<'a, Sqlite>, column: &str, values: &'a [String]) {
    if values.is_empty() {
        return;
    }
    query.push(format!(r#" AND "{column}" IN ("#));
    let mut separated = query.separated(",");
    for value in values {
        separated.push_bind(value.as_str());
    }
    separated.push_unseparated(")");
}

impl Entity {
    /// Compact representation.
    #[must_use]
    pub fn path(&self) -> String {
        self.to_ref().path()
    }

    #[must_use]
    pub fn to_ref(&self) -> EntityRef {
        let Self { driver, name, .. } = self;
        EntityRef {
            driver: driver.clone(),
            name: name.clone(),
        }
    }

    /// Fetches all [`Entity`]s asynchronously.
    ///
    /// Ordered by name.
    #[must_use]
    pub fn fetch_all<'a>(
        executor: impl SqliteExecutor<'a> + 'a,
    ) -> BoxStream<'a, sqlx::Result<Self>> {
        sqlx::query_as(r#"SELECT * FROM "entities" ORDER BY "name""#).fetch(executor)
    }

    /// Loads a single [`Entity`] by ID.
    ///
    /// Returns `Ok(None)` if the requested [`Entity`] has not been found.
    pub async fn try_load(
        executor: impl SqliteExecutor<'_>,
        id: EntityId,
    ) -> sqlx::Result<Option<Self>> {
        sqlx::query_as(r#"SELECT * FROM "entities" WHERE "entity_id"=?1"#)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Loads a single [`Entity`] by its unique name.
    ///
    /// Returns `Ok(None)` if the requested [`Entity`] has not been found.
    pub async fn try_load_by_name(
        executor: impl SqliteExecutor<'_>,
        name: &str,
    ) -> sqlx::Result<Option<Self>> {
        sqlx::query_as(r#"SELECT * FROM "entities" WHERE "name"=?1"#)
            .bind(name)
            .fetch_optional(executor)
            .await
    }

    /// Loads all [`Entity`]s that match the filter.
    ///
    /// Ordered by name.
    pub async fn load_filtered(
        executor: impl SqliteExecutor<'_>,
        filter: &EntityFilter,
    ) -> sqlx::Result<Vec<Self>> {
        let EntityFilter {
            names,
            drivers,
            types,
        } = filter;
        let mut query = QueryBuilder::<Sqlite>::new(r#"SELECT * FROM "entities" WHERE 1"#);
        push_in_values(&mut query, "name", names);
        push_in_values(&mut query, "driver", drivers);
        push_in_values(&mut query, "type", types);
        query.push(r#" ORDER BY "name""#);
        query.build_query_as::<Self>().fetch_all(executor).await
    }

    /// Inserts a new [`Entity`].
    ///
    /// Fails if the name is already taken.
    pub async fn create(
        executor: impl SqliteExecutor<'_>,
        name: &str,
        driver: &Driver,
    ) -> sqlx::Result<Self> {
        sqlx::query_as(
            r#"INSERT INTO "entities" ("name","driver","type") VALUES (?1,?2,?3) RETURNING *"#,
        )
        .bind(name)
        .bind(driver.name())
        .bind(driver.clusto_type())
        .fetch_one(executor)
        .await
    }

    /// Deletes the entity together with its attributes.
    ///
    /// Attributes of other entities that refer to this entity are deleted
    /// as well, including its membership in any parent.
    ///
    /// Must run within a transaction.
    pub async fn delete(&self, connection: &mut SqliteConnection) -> sqlx::Result<bool> {
        sqlx::query(r#"DELETE FROM "entity_attrs" WHERE "entity_id"=?1 OR "relation_id"=?1"#)
            .bind(self.id)
            .execute(&mut *connection)
            .await?;
        let result = sqlx::query(r#"DELETE FROM "entities" WHERE "entity_id"=?1"#)
            .bind(self.id)
            .execute(&mut *connection)
            .await?;
        debug_assert!(result.rows_affected() <= 1);
        Ok(result.rows_affected() > 0)
    }
}
