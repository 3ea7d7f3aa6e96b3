// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

//! Parent/child relations between entities.
//!
//! Stored as hidden relation attributes of the parent, numbered in
//! insertion order.

use sqlx::SqliteExecutor;

use crate::{Datatype, Entity, EntityId};

pub const CONTAINS_KEY: &str = "_contains";

/// Loads the children of an entity.
///
/// Ordered by insertion.
pub async fn load_contents(
    executor: impl SqliteExecutor<'_>,
    parent_id: EntityId,
) -> sqlx::Result<Vec<Entity>> {
    sqlx::query_as(
        r#"SELECT e.* FROM "entity_attrs" a JOIN "entities" e ON e."entity_id"=a."relation_id"
           WHERE a."entity_id"=?1 AND a."key"=?2
           ORDER BY a."number", a."attr_id""#,
    )
    .bind(parent_id)
    .bind(CONTAINS_KEY)
    .fetch_all(executor)
    .await
}

/// Loads all entities that contain the given entity.
///
/// Ordered by name.
pub async fn load_parents(
    executor: impl SqliteExecutor<'_>,
    child_id: EntityId,
) -> sqlx::Result<Vec<Entity>> {
    sqlx::query_as(
        r#"SELECT DISTINCT e.* FROM "entity_attrs" a JOIN "entities" e ON e."entity_id"=a."entity_id"
           WHERE a."relation_id"=?1 AND a."key"=?2
           ORDER BY e."name""#,
    )
    .bind(child_id)
    .bind(CONTAINS_KEY)
    .fetch_all(executor)
    .await
}

pub async fn contains(
    executor: impl SqliteExecutor<'_>,
    parent_id: EntityId,
    child_id: EntityId,
) -> sqlx::Result<bool> {
    sqlx::query_scalar(
        r#"SELECT EXISTS(SELECT 1 FROM "entity_attrs"
           WHERE "entity_id"=?1 AND "key"=?2 AND "relation_id"=?3)"#,
    )
    .bind(parent_id)
    .bind(CONTAINS_KEY)
    .bind(child_id)
    .fetch_one(executor)
    .await
}

/// Appends a child to the contents of a parent.
///
/// Does not check for duplicates. Must run within a transaction
/// together with [`contains()`].
pub async fn append_child(
    executor: impl SqliteExecutor<'_>,
    parent_id: EntityId,
    child_id: EntityId,
) -> sqlx::Result<()> {
    let result = sqlx::query(
        r#"INSERT INTO "entity_attrs" ("entity_id","key","number","datatype","relation_id")
           SELECT ?1,?2,COALESCE(MAX("number")+1,0),?3,?4 FROM "entity_attrs"
           WHERE "entity_id"=?1 AND "key"=?2"#,
    )
    .bind(parent_id)
    .bind(CONTAINS_KEY)
    .bind(Datatype::Relation.as_str())
    .bind(child_id)
    .execute(executor)
    .await?;
    debug_assert_eq!(result.rows_affected(), 1);
    Ok(())
}

/// Removes a child from the contents of a parent.
///
/// Returns `false` if the child was not contained.
pub async fn remove_child(
    executor: impl SqliteExecutor<'_>,
    parent_id: EntityId,
    child_id: EntityId,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        r#"DELETE FROM "entity_attrs" WHERE "entity_id"=?1 AND "key"=?2 AND "relation_id"=?3"#,
    )
    .bind(parent_id)
    .bind(CONTAINS_KEY)
    .bind(child_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use crate::{Driver, Entity, open_in_memory};

    #[tokio::test]
    async fn append_and_remove() {
        let clusto = open_in_memory().await.unwrap();
        let pool = clusto.pool();
        let driver = Driver::lookup("pool").unwrap();
        let parent = Entity::create(pool, "parent", driver).await.unwrap();
        let first = Entity::create(pool, "b-first", driver).await.unwrap();
        let second = Entity::create(pool, "a-second", driver).await.unwrap();

        assert!(!super::contains(pool, parent.id, first.id).await.unwrap());
        super::append_child(pool, parent.id, first.id).await.unwrap();
        super::append_child(pool, parent.id, second.id).await.unwrap();
        assert!(super::contains(pool, parent.id, first.id).await.unwrap());

        // Insertion order, not name order.
        let contents = super::load_contents(pool, parent.id).await.unwrap();
        assert_eq!(contents, [first.clone(), second.clone()]);

        let parents = super::load_parents(pool, second.id).await.unwrap();
        assert_eq!(parents, [parent.clone()]);

        assert!(super::remove_child(pool, parent.id, first.id).await.unwrap());
        assert!(!super::remove_child(pool, parent.id, first.id).await.unwrap());
        let contents = super::load_contents(pool, parent.id).await.unwrap();
        assert_eq!(contents, [second]);
        assert!(super::load_parents(pool, first.id).await.unwrap().is_empty());
    }
}
