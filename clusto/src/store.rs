// SPDX-FileCopyrightText: The clusto authors
// SPDX-License-Identifier: MPL-2.0

use std::collections::HashMap;

use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    Attribute, AttributeFilter, AttributeValue, Datatype, Driver, Entity, EntityFilter, EntityRef,
    Error, Result, SCHEMA_VERSION_KEY, attribute::validate_key, containment,
    database::begin_write,
};

/// Complete view of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDetails {
    pub name: String,
    pub driver: String,
    pub attrs: Vec<Attribute>,
    pub contents: Vec<EntityRef>,
    pub parents: Vec<EntityRef>,
}

/// Handle to an initialized database.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct Clusto {
    pool: SqlitePool,
}

fn lookup_driver(name: &str) -> Result<&'static Driver> {
    Driver::lookup(name).ok_or_else(|| Error::UnknownDriver(name.to_owned()))
}

/// Rejects keys that must not be modified through the API.
///
/// The schema version of the meta entity is checked on every startup.
fn validate_writable_key(entity: &Entity, key: &str) -> Result<()> {
    validate_key(key)?;
    if entity.driver == Driver::CLUSTO_META && key == SCHEMA_VERSION_KEY {
        return Err(Error::InvalidAttribute(format!(
            "Attribute key \"{key}\" of \"{name}\" is read-only",
            name = entity.name
        )));
    }
    Ok(())
}

async fn load_by_name(
    connection: &mut SqliteConnection,
    name: &str,
    driver: Option<&str>,
) -> Result<Entity> {
    let Some(entity) = Entity::try_load_by_name(&mut *connection, name).await? else {
        return Err(Error::not_found(name));
    };
    if let Some(driver) = driver
        && entity.driver != driver
    {
        return Err(Error::driver_mismatch(name, driver));
    }
    Ok(entity)
}

impl Clusto {
    pub(crate) const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Looks up an entity by name.
    ///
    /// Optionally asserts the driver of the entity.
    pub async fn get_by_name(&self, name: &str, driver: Option<&str>) -> Result<Entity> {
        let mut connection = self.pool.acquire().await?;
        load_by_name(&mut connection, name, driver).await
    }

    pub async fn try_get_by_name(&self, name: &str) -> Result<Option<Entity>> {
        Entity::try_load_by_name(&self.pool, name)
            .await
            .map_err(Into::into)
    }

    /// Looks up all named entities.
    ///
    /// Returns the found entities in request order and the names that
    /// could not be found.
    pub async fn get_by_names<'n>(
        &self,
        names: &'n [impl AsRef<str>],
    ) -> Result<(Vec<Entity>, Vec<&'n str>)> {
        let mut found = Vec::with_capacity(names.len());
        let mut missing = Vec::new();
        let mut connection = self.pool.acquire().await?;
        for name in names {
            let name = name.as_ref();
            match Entity::try_load_by_name(&mut *connection, name).await? {
                Some(entity) => found.push(entity),
                None => missing.push(name),
            }
        }
        Ok((found, missing))
    }

    /// Returns the named entity, creating it if needed.
    ///
    /// An existing entity is returned as is, even if its driver differs.
    /// The flag tells if the entity has been created.
    pub async fn get_or_create(&self, name: &str, driver: &str) -> Result<(Entity, bool)> {
        let mut created = self.create_all(&[name], driver).await?;
        debug_assert_eq!(created.len(), 1);
        created
            .pop()
            .ok_or_else(|| Error::not_found(name))
    }

    /// Batch version of [`Self::get_or_create()`].
    ///
    /// Runs in a single transaction. Whether an entity existed is decided
    /// before the first one is created, i.e. a name that is repeated in
    /// `names` is reported as created every time.
    pub async fn create_all(
        &self,
        names: &[impl AsRef<str>],
        driver: &str,
    ) -> Result<Vec<(Entity, bool)>> {
        let driver = lookup_driver(driver)?;
        let mut tx = begin_write(&self.pool).await?;
        let mut known = HashMap::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if known.contains_key(name) {
                continue;
            }
            if let Some(entity) = Entity::try_load_by_name(&mut *tx, name).await? {
                known.insert(name, (entity, false));
            }
        }
        let mut entities = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let entry = match known.get(name).cloned() {
                Some(entry) => entry,
                None => {
                    log::debug!("Creating entity \"{name}\" with driver \"{driver}\"");
                    let entity = Entity::create(&mut *tx, name, driver).await?;
                    known.insert(name, (entity.clone(), true));
                    (entity, true)
                }
            };
            entities.push(entry);
        }
        tx.commit().await?;
        Ok(entities)
    }

    /// Selects entities.
    ///
    /// Fails if the filter refers to an unknown driver.
    pub async fn get_entities(&self, filter: &EntityFilter) -> Result<Vec<Entity>> {
        for driver in &filter.drivers {
            lookup_driver(driver)?;
        }
        Entity::load_filtered(&self.pool, filter)
            .await
            .map_err(Into::into)
    }

    /// Deletes all named entities of the given driver.
    ///
    /// Either all or none of the entities are deleted.
    pub async fn delete_entities(&self, names: &[impl AsRef<str>], driver: &str) -> Result<u64> {
        lookup_driver(driver)?;
        let mut tx = begin_write(&self.pool).await?;
        let mut entities = Vec::with_capacity(names.len());
        for name in names {
            entities.push(load_by_name(&mut tx, name.as_ref(), Some(driver)).await?);
        }
        let mut deleted_count = 0;
        for entity in &entities {
            log::debug!("Deleting entity {path}", path = entity.path());
            if entity.delete(&mut tx).await? {
                deleted_count += 1;
            }
        }
        tx.commit().await?;
        Ok(deleted_count)
    }

    pub async fn contents(&self, entity: &Entity) -> Result<Vec<Entity>> {
        containment::load_contents(&self.pool, entity.id)
            .await
            .map_err(Into::into)
    }

    pub async fn parents(&self, entity: &Entity) -> Result<Vec<Entity>> {
        containment::load_parents(&self.pool, entity.id)
            .await
            .map_err(Into::into)
    }

    /// Inserts a child into the contents of a parent.
    ///
    /// Returns `false` if the child was already contained.
    pub async fn insert(&self, parent: &Entity, child: &Entity) -> Result<bool> {
        self.insert_all(parent, std::slice::from_ref(child))
            .await
            .map(|inserted_count| inserted_count > 0)
    }

    /// Inserts multiple children into the contents of a parent.
    ///
    /// Children that are already contained are skipped. Returns the
    /// number of children actually inserted.
    pub async fn insert_all(&self, parent: &Entity, children: &[Entity]) -> Result<u64> {
        if let Some(child) = children.iter().find(|child| child.id == parent.id) {
            return Err(Error::InvalidOperation(format!(
                "Object \"{name}\" cannot be inserted into itself",
                name = child.name
            )));
        }
        let mut tx = begin_write(&self.pool).await?;
        let mut inserted_count = 0;
        for child in children {
            if containment::contains(&mut *tx, parent.id, child.id).await? {
                continue;
            }
            containment::append_child(&mut *tx, parent.id, child.id).await?;
            inserted_count += 1;
        }
        tx.commit().await?;
        Ok(inserted_count)
    }

    /// Removes a child from the contents of a parent.
    ///
    /// Returns `false` if the child was not contained.
    pub async fn remove(&self, parent: &Entity, child: &Entity) -> Result<bool> {
        self.remove_all(parent, std::slice::from_ref(child))
            .await
            .map(|removed_count| removed_count > 0)
    }

    /// Removes multiple children from the contents of a parent.
    pub async fn remove_all(&self, parent: &Entity, children: &[Entity]) -> Result<u64> {
        let mut tx = begin_write(&self.pool).await?;
        let mut removed_count = 0;
        for child in children {
            if containment::remove_child(&mut *tx, parent.id, child.id).await? {
                removed_count += 1;
            }
        }
        tx.commit().await?;
        Ok(removed_count)
    }

    /// Loads the visible attributes of an entity.
    pub async fn attrs(&self, entity: &Entity, filter: &AttributeFilter) -> Result<Vec<Attribute>> {
        if let Some(key) = &filter.key {
            validate_key(key)?;
        }
        Attribute::load_filtered(&self.pool, entity.id, filter)
            .await
            .map_err(Into::into)
    }

    /// Parses a textual attribute value.
    ///
    /// See also [`AttributeValue::resolve()`].
    pub async fn resolve_value(
        &self,
        raw: &str,
        datatype: Option<Datatype>,
    ) -> Result<AttributeValue> {
        AttributeValue::resolve(&self.pool, raw, datatype).await
    }

    /// Appends an attribute to an entity.
    pub async fn add_attr(
        &self,
        entity: &Entity,
        key: &str,
        value: &AttributeValue,
        subkey: Option<&str>,
        number: Option<i64>,
    ) -> Result<()> {
        validate_writable_key(entity, key)?;
        Attribute::insert(&self.pool, entity.id, key, subkey, number, value).await?;
        Ok(())
    }

    /// Replaces all matching attributes of an entity with a single one.
    pub async fn set_attr(
        &self,
        entity: &Entity,
        key: &str,
        value: &AttributeValue,
        subkey: Option<&str>,
        number: Option<i64>,
    ) -> Result<()> {
        validate_writable_key(entity, key)?;
        let filter = AttributeFilter {
            key: Some(key.to_owned()),
            subkey: subkey.map(ToOwned::to_owned),
            number,
        };
        let mut tx = begin_write(&self.pool).await?;
        Attribute::delete_filtered(&mut *tx, entity.id, &filter).await?;
        Attribute::insert(&mut *tx, entity.id, key, subkey, number, value).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Deletes matching attributes of an entity.
    ///
    /// The filter must select a key.
    pub async fn del_attrs(&self, entity: &Entity, filter: &AttributeFilter) -> Result<u64> {
        let Some(key) = &filter.key else {
            return Err(Error::InvalidAttribute(
                "Attribute key is required".to_owned(),
            ));
        };
        validate_writable_key(entity, key)?;
        Attribute::delete_filtered(&self.pool, entity.id, filter)
            .await
            .map_err(Into::into)
    }

    /// Collects everything known about an entity.
    pub async fn show(&self, entity: &Entity) -> Result<EntityDetails> {
        let mut connection = self.pool.acquire().await?;
        let attrs =
            Attribute::load_filtered(&mut *connection, entity.id, &AttributeFilter::default())
                .await?;
        let contents = containment::load_contents(&mut *connection, entity.id).await?;
        let parents = containment::load_parents(&mut *connection, entity.id).await?;
        Ok(EntityDetails {
            name: entity.name.clone(),
            driver: entity.driver.clone(),
            attrs,
            contents: contents.iter().map(Entity::to_ref).collect(),
            parents: parents.iter().map(Entity::to_ref).collect(),
        })
    }
}
