// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use std::{fmt, str::FromStr};

use serde::{Serialize, Serializer, ser::SerializeStruct as _};
use sqlx::{FromRow, QueryBuilder, Row as _, Sqlite, SqliteExecutor, sqlite::SqliteRow};

use crate::{Entity, EntityId, EntityRef, Error, Result};

crate::db_id!(AttributeId);

/// Keys with this prefix are reserved for internal bookkeeping.
pub const HIDDEN_KEY_PREFIX: char = '_';

#[must_use]
pub fn is_hidden_key(key: &str) -> bool {
    key.starts_with(HIDDEN_KEY_PREFIX)
}

/// Rejects keys that are empty or reserved.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidAttribute(
            "Attribute key must not be empty".to_owned(),
        ));
    }
    if is_hidden_key(key) {
        return Err(Error::InvalidAttribute(format!(
            "Attribute key \"{key}\" is reserved"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Datatype {
    Int,
    String,
    Relation,
}

impl Datatype {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::String => "string",
            Self::Relation => "relation",
        }
    }

    /// Guesses the datatype of an untyped value.
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        if raw.parse::<i64>().is_ok() {
            Self::Int
        } else {
            Self::String
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Datatype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "int" => Ok(Self::Int),
            "string" => Ok(Self::String),
            "relation" => Ok(Self::Relation),
            _ => Err(Error::InvalidAttribute(format!("Unknown datatype \"{s}\""))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    String(String),
    Relation(EntityRef),
}

impl AttributeValue {
    #[must_use]
    pub const fn datatype(&self) -> Datatype {
        match self {
            Self::Int(_) => Datatype::Int,
            Self::String(_) => Datatype::String,
            Self::Relation(_) => Datatype::Relation,
        }
    }

    /// Resolves a textual value.
    ///
    /// Relations are given by entity name and must refer to an existing entity.
    pub async fn resolve(
        executor: impl SqliteExecutor<'_>,
        raw: &str,
        datatype: Option<Datatype>,
    ) -> Result<Self> {
        match datatype.unwrap_or_else(|| Datatype::infer(raw)) {
            Datatype::Int => raw.parse().map(Self::Int).map_err(|_| {
                Error::InvalidAttribute(format!("Value \"{raw}\" is not an integer"))
            }),
            Datatype::String => Ok(Self::String(raw.to_owned())),
            Datatype::Relation => {
                let Some(entity) = Entity::try_load_by_name(executor, raw).await? else {
                    return Err(Error::not_found(raw));
                };
                Ok(Self::Relation(entity.to_ref()))
            }
        }
    }
}

/// Selects attributes of an entity.
///
/// Fields that are `None` match any value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeFilter {
    pub key: Option<String>,
    pub subkey: Option<String>,
    pub number: Option<i64>,
}

impl AttributeFilter {
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            ..Default::default()
        }
    }

    fn push_conditions<'a>(&'a self, query: &mut QueryBuilder<'a, Sqlite>) {
        let Self {
            key,
            subkey,
            number,
        } = self;
        if let Some(key) = key {
            query.push(r#" AND a."key"="#).push_bind(key.as_str());
        }
        if let Some(subkey) = subkey {
            query.push(r#" AND a."subkey"="#).push_bind(subkey.as_str());
        }
        if let Some(number) = number {
            query.push(r#" AND a."number"="#).push_bind(*number);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub id: AttributeId,
    pub key: String,
    pub subkey: Option<String>,
    pub number: Option<i64>,
    pub value: AttributeValue,
}

impl FromRow<'_, SqliteRow> for Attribute {
    fn from_row(row: &SqliteRow) -> sqlx::Result<Self> {
        let datatype: String = row.try_get("datatype")?;
        let datatype = datatype
            .parse::<Datatype>()
            .map_err(|err| sqlx::Error::Decode(err.into()))?;
        let value = match datatype {
            Datatype::Int => AttributeValue::Int(row.try_get("int_value")?),
            Datatype::String => AttributeValue::String(row.try_get("string_value")?),
            Datatype::Relation => AttributeValue::Relation(EntityRef {
                driver: row.try_get("relation_driver")?,
                name: row.try_get("relation_name")?,
            }),
        };
        Ok(Self {
            id: row.try_get("attr_id")?,
            key: row.try_get("key")?,
            subkey: row.try_get("subkey")?,
            number: row.try_get("number")?,
            value,
        })
    }
}

impl Serialize for Attribute {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let Self {
            id: _,
            key,
            subkey,
            number,
            value,
        } = self;
        let mut state = serializer.serialize_struct("Attribute", 5)?;
        state.serialize_field("key", key)?;
        state.serialize_field("value", value)?;
        state.serialize_field("subkey", subkey)?;
        state.serialize_field("number", number)?;
        state.serialize_field("datatype", self.datatype().as_str())?;
        state.end()
    }
}

const SELECT_ATTRIBUTES: &str = r#"SELECT a."attr_id",a."key",a."subkey",a."number",a."datatype",
    a."int_value",a."string_value",r."name" AS "relation_name",r."driver" AS "relation_driver"
    FROM "entity_attrs" a LEFT JOIN "entities" r ON r."entity_id"=a."relation_id"
    WHERE a."entity_id"="#;

impl Attribute {
    #[must_use]
    pub const fn datatype(&self) -> Datatype {
        self.value.datatype()
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        is_hidden_key(&self.key)
    }

    /// Loads the attributes of an entity.
    ///
    /// Hidden attributes are excluded unless the filter explicitly selects
    /// a hidden key. Ordered by insertion.
    pub async fn load_filtered(
        executor: impl SqliteExecutor<'_>,
        entity_id: EntityId,
        filter: &AttributeFilter,
    ) -> sqlx::Result<Vec<Self>> {
        let mut query = QueryBuilder::<Sqlite>::new(SELECT_ATTRIBUTES);
        query.push_bind(entity_id);
        if filter.key.is_none() {
            query.push(r#" AND substr(a."key",1,1)<>'_'"#);
        }
        filter.push_conditions(&mut query);
        query.push(r#" ORDER BY a."attr_id""#);
        query.build_query_as::<Self>().fetch_all(executor).await
    }

    /// Appends a new attribute to an entity.
    pub async fn insert(
        executor: impl SqliteExecutor<'_>,
        entity_id: EntityId,
        key: &str,
        subkey: Option<&str>,
        number: Option<i64>,
        value: &AttributeValue,
    ) -> sqlx::Result<AttributeId> {
        let (int_value, string_value, relation_name) = match value {
            AttributeValue::Int(value) => (Some(*value), None, None),
            AttributeValue::String(value) => (None, Some(value.as_str()), None),
            AttributeValue::Relation(EntityRef { name, .. }) => (None, None, Some(name.as_str())),
        };
        let result = sqlx::query(
            r#"INSERT INTO "entity_attrs"
               ("entity_id","key","subkey","number","datatype","int_value","string_value","relation_id")
               VALUES (?1,?2,?3,?4,?5,?6,?7,(SELECT "entity_id" FROM "entities" WHERE "name"=?8))"#,
        )
        .bind(entity_id)
        .bind(key)
        .bind(subkey)
        .bind(number)
        .bind(value.datatype().as_str())
        .bind(int_value)
        .bind(string_value)
        .bind(relation_name)
        .execute(executor)
        .await?;
        debug_assert_eq!(result.rows_affected(), 1);
        Ok(AttributeId::new(result.last_insert_rowid()))
    }

    /// Deletes matching attributes of an entity.
    ///
    /// Hidden attributes are only affected if the filter selects a hidden key.
    pub async fn delete_filtered(
        executor: impl SqliteExecutor<'_>,
        entity_id: EntityId,
        filter: &AttributeFilter,
    ) -> sqlx::Result<u64> {
        let mut query =
            QueryBuilder::<Sqlite>::new(r#"DELETE FROM "entity_attrs" AS a WHERE a."entity_id"="#);
        query.push_bind(entity_id);
        if filter.key.is_none() {
            query.push(r#" AND substr(a."key",1,1)<>'_'"#);
        }
        filter.push_conditions(&mut query);
        let result = query.build().execute(executor).await?;
        Ok(result.rows_affected())
    }
}
