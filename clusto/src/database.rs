// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use std::{path::Path, str::FromStr as _, time::Duration};

use sqlx::{
    Sqlite, SqlitePool, Transaction,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};

use crate::{Attribute, AttributeFilter, AttributeValue, Clusto, Driver, Entity, Error, Result};

/// Current schema version.
///
/// Recorded in the meta entity when the database is initialized.
pub const SCHEMA_VERSION: &str = "1";

/// Key of the schema version attribute of the meta entity.
pub const SCHEMA_VERSION_KEY: &str = "schemaversion";

const CREATE_SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS "entities" (
        "entity_id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "name" TEXT NOT NULL UNIQUE,
        "driver" TEXT NOT NULL,
        "type" TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS "entities_driver" ON "entities" ("driver")"#,
    r#"CREATE INDEX IF NOT EXISTS "entities_type" ON "entities" ("type")"#,
    r#"CREATE TABLE IF NOT EXISTS "entity_attrs" (
        "attr_id" INTEGER PRIMARY KEY AUTOINCREMENT,
        "entity_id" INTEGER NOT NULL REFERENCES "entities" ("entity_id") ON DELETE CASCADE,
        "key" TEXT NOT NULL,
        "subkey" TEXT,
        "number" INTEGER,
        "datatype" TEXT NOT NULL,
        "int_value" INTEGER,
        "string_value" TEXT,
        "relation_id" INTEGER REFERENCES "entities" ("entity_id") ON DELETE CASCADE
    )"#,
    r#"CREATE INDEX IF NOT EXISTS "entity_attrs_entity_key" ON "entity_attrs" ("entity_id","key")"#,
    r#"CREATE INDEX IF NOT EXISTS "entity_attrs_relation" ON "entity_attrs" ("relation_id")"#,
];

/// How long a connection waits for the write lock held by another one.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens (or creates) a database file.
///
/// Readers do not block the single writer.
pub async fn open_database(file_path: impl AsRef<Path>) -> Result<Clusto> {
    let options = SqliteConnectOptions::new()
        .filename(file_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    let pool = SqlitePool::connect_with(options).await?;
    init_clusto(&pool).await?;
    Ok(Clusto::new(pool))
}

/// Opens a private, empty in-memory database.
///
/// The database lives as long as the single pooled connection.
pub async fn open_in_memory() -> Result<Clusto> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    init_clusto(&pool).await?;
    Ok(Clusto::new(pool))
}

/// Starts a transaction that acquires the write lock immediately.
///
/// A deferred transaction that reads before writing fails with
/// `SQLITE_BUSY` instead of waiting if another connection wrote meanwhile.
pub(crate) async fn begin_write(pool: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// Creates the schema and the meta entity if missing.
///
/// Idempotent. Fails if the database has been initialized with an
/// unsupported schema version.
pub async fn init_clusto(pool: &SqlitePool) -> Result<()> {
    let mut tx = begin_write(pool).await?;
    for statement in CREATE_SCHEMA {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    let meta = if let Some(meta) = Entity::try_load_by_name(&mut *tx, Driver::CLUSTO_META).await? {
        meta
    } else {
        log::info!("Initializing new database with schema version {SCHEMA_VERSION}");
        let driver = Driver::lookup(Driver::CLUSTO_META)
            .ok_or_else(|| Error::UnknownDriver(Driver::CLUSTO_META.to_owned()))?;
        Entity::create(&mut *tx, Driver::CLUSTO_META, driver).await?
    };
    let versions =
        Attribute::load_filtered(&mut *tx, meta.id, &AttributeFilter::key(SCHEMA_VERSION_KEY))
            .await?;
    match versions.as_slice() {
        [] => {
            Attribute::insert(
                &mut *tx,
                meta.id,
                SCHEMA_VERSION_KEY,
                None,
                None,
                &AttributeValue::String(SCHEMA_VERSION.to_owned()),
            )
            .await?;
        }
        [Attribute {
            value: AttributeValue::String(version),
            ..
        }] if version == SCHEMA_VERSION => (),
        [Attribute { value, .. }, ..] => {
            log::error!("Found database with unsupported schema version {value:?}");
            let version = match value {
                AttributeValue::String(version) => version.clone(),
                AttributeValue::Int(version) => version.to_string(),
                AttributeValue::Relation(entity_ref) => entity_ref.path(),
            };
            return Err(Error::UnsupportedSchemaVersion(version));
        }
    }
    tx.commit().await?;
    Ok(())
}

pub async fn optimize_database(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(r"VACUUM").execute(pool).await?;
    sqlx::query(r"ANALYZE").execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use crate::{
        Attribute, AttributeFilter, AttributeValue, Entity, EntityFilter, Error, SCHEMA_VERSION,
        SCHEMA_VERSION_KEY, open_database, open_in_memory,
    };

    fn remove_database_files(file_path: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file_name = file_path.as_os_str().to_owned();
            file_name.push(suffix);
            fs::remove_file(file_name).ok();
        }
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let clusto = open_in_memory().await.unwrap();
        let pool = clusto.pool();
        super::init_clusto(pool).await.unwrap();
        super::init_clusto(pool).await.unwrap();

        let meta = Entity::try_load_by_name(pool, "clustometa")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.path(), "/clustometa/clustometa");
        let versions =
            Attribute::load_filtered(pool, meta.id, &AttributeFilter::key(SCHEMA_VERSION_KEY))
                .await
                .unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(
            versions[0].value,
            AttributeValue::String(SCHEMA_VERSION.to_owned())
        );
    }

    #[tokio::test]
    async fn reject_unsupported_schema_version() {
        let clusto = open_in_memory().await.unwrap();
        let pool = clusto.pool();
        sqlx::query(r#"UPDATE "entity_attrs" SET "string_value"='999' WHERE "key"=?1"#)
            .bind(SCHEMA_VERSION_KEY)
            .execute(pool)
            .await
            .unwrap();
        assert!(matches!(
            super::init_clusto(pool).await,
            Err(Error::UnsupportedSchemaVersion(version)) if version == "999"
        ));
    }

    #[tokio::test]
    async fn optimize() {
        let clusto = open_in_memory().await.unwrap();
        super::optimize_database(clusto.pool()).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_on_file() {
        let file_path = std::env::temp_dir().join(format!(
            "clusto-concurrent-creates-{pid}.db",
            pid = std::process::id()
        ));
        remove_database_files(&file_path);
        let clusto = open_database(&file_path).await.unwrap();

        let tasks = (0..32)
            .map(|i| {
                let clusto = clusto.clone();
                tokio::spawn(async move { clusto.create_all(&[format!("e{i}")], "pool").await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            let created = task.await.unwrap().unwrap();
            assert_eq!(created.len(), 1);
            assert!(created[0].1);
        }

        let filter = EntityFilter {
            drivers: vec!["pool".to_owned()],
            ..Default::default()
        };
        assert_eq!(clusto.get_entities(&filter).await.unwrap().len(), 32);

        clusto.pool().close().await;
        remove_database_files(&file_path);
    }
}
