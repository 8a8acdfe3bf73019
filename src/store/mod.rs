//! Entity Store: create / get / update / list / delete over the entities
//! table, with all invariants checked before anything is written.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, TransactionBehavior};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::db::Db;
use crate::error::{PraxisError, Result};
use crate::model::{self, Entity, EntityBody, EntityDraft, EntityKind};

/// Raw entity columns as read from SQLite, before parsing into the typed
/// model. Shared by every module that selects entity rows.
pub(crate) struct EntityRow {
    pub kind: String,
    pub name: String,
    pub attributes: String,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl EntityRow {
    /// Row mapper for `SELECT kind, name, attributes, version, created_at, updated_at`.
    pub fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            kind: row.get(0)?,
            name: row.get(1)?,
            attributes: row.get(2)?,
            version: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    pub fn into_entity(self) -> Result<Entity> {
        let kind = EntityKind::parse(&self.kind)
            .ok_or_else(|| PraxisError::Parse(format!("unknown entity kind: {}", self.kind)))?;
        let raw: Value = serde_json::from_str(&self.attributes)?;
        let body = EntityBody::from_json(kind, &raw)?;
        Ok(Entity {
            kind,
            name: self.name,
            version: self.version,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            body,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PraxisError::Parse(format!("bad timestamp \"{}\": {}", value, e)))
}

pub(crate) const ENTITY_COLUMNS: &str =
    "kind, name, attributes, version, created_at, updated_at";

/// Look up one entity inside an open connection.
pub(crate) fn get_in_conn(
    conn: &Connection,
    kind: EntityKind,
    name: &str,
) -> Result<Option<Entity>> {
    let sql = format!(
        "SELECT {} FROM entities WHERE kind = ?1 AND name = ?2",
        ENTITY_COLUMNS
    );
    match conn.query_row(&sql, params![kind.as_str(), name], EntityRow::read) {
        Ok(raw) => Ok(Some(raw.into_entity()?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(PraxisError::Database(e)),
    }
}

pub(crate) fn exists_in_conn(conn: &Connection, kind: EntityKind, name: &str) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM entities WHERE kind = ?1 AND name = ?2")?;
    Ok(stmt.exists(params![kind.as_str(), name])?)
}

/// Create an entity. Fails with `DuplicateName` if the (kind, name) pair is
/// taken, `InvalidAttribute` on any enum/range/length violation. Nothing is
/// written on failure.
pub async fn create(db: &Db, draft: EntityDraft) -> Result<Entity> {
    model::validate_name(&draft.name)?;
    draft.body.validate()?;

    let kind = draft.body.kind();
    let attributes = draft.body.to_json()?;
    let EntityDraft { name, body } = draft;

    db.with_connection(move |conn| {
        // An immediate transaction takes the write lock up front, so the
        // exists check and the insert see the same state even with a second
        // writer racing on the same name.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if exists_in_conn(&tx, kind, &name)? {
            return Err(PraxisError::DuplicateName { kind, name });
        }
        let now = Utc::now();
        tx.execute(
            "INSERT INTO entities (entity_id, kind, name, attributes, version, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                Uuid::new_v4().to_string(),
                kind.as_str(),
                name,
                attributes,
                1i64,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(f, _)
                if f.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                PraxisError::DuplicateName {
                    kind,
                    name: name.clone(),
                }
            }
            other => other.into(),
        })?;
        tx.commit()?;
        log::debug!("Created {} \"{}\"", kind, name);
        Ok(Entity {
            kind,
            name,
            version: 1,
            created_at: now,
            updated_at: now,
            body,
        })
    })
    .await
}

/// Fetch an entity by (kind, name). Reads never touch `updated_at`.
pub async fn get(db: &Db, kind: EntityKind, name: &str) -> Result<Option<Entity>> {
    let name = name.to_string();
    db.with_connection(move |conn| get_in_conn(conn, kind, &name)).await
}

/// Apply a partial patch of kind-specific fields to an existing entity.
///
/// The merged result is re-validated before the write; version and
/// `updated_at` bump on success. A patch key with a JSON null clears that
/// field. `name` is the store key and cannot be patched.
pub async fn update(db: &Db, kind: EntityKind, name: &str, patch: Value) -> Result<Entity> {
    let patch = match patch {
        Value::Object(map) => map,
        _ => return Err(PraxisError::invalid("patch", "must be a JSON object")),
    };
    if patch.contains_key("name") {
        return Err(PraxisError::invalid("name", "is immutable; delete and recreate instead"));
    }

    let name = name.to_string();
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;

        let current = match get_in_conn(&tx, kind, &name)? {
            Some(entity) => entity,
            None => return Err(PraxisError::not_found(kind, name)),
        };

        let mut merged: Map<String, Value> =
            match serde_json::from_str(&current.body.to_json()?)? {
                Value::Object(map) => map,
                _ => Map::new(),
            };
        for (key, value) in patch {
            if value.is_null() {
                merged.remove(&key);
            } else {
                merged.insert(key, value);
            }
        }

        let body = EntityBody::from_json(kind, &Value::Object(merged))?;
        body.validate()?;

        let now = Utc::now();
        let version = current.version + 1;
        tx.execute(
            "UPDATE entities SET attributes = ?1, version = ?2, updated_at = ?3 \
             WHERE kind = ?4 AND name = ?5",
            params![body.to_json()?, version, now.to_rfc3339(), kind.as_str(), name],
        )?;
        tx.commit()?;

        log::debug!("Updated {} \"{}\" to version {}", kind, name, version);
        Ok(Entity {
            kind,
            name,
            version,
            created_at: current.created_at,
            updated_at: now,
            body,
        })
    })
    .await
}

/// All entities of a kind, ordered by name ascending.
pub async fn list(db: &Db, kind: EntityKind) -> Result<Vec<Entity>> {
    db.with_connection(move |conn| {
        let sql = format!(
            "SELECT {} FROM entities WHERE kind = ?1 ORDER BY name ASC",
            ENTITY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![kind.as_str()], EntityRow::read)?;
        let mut entities = Vec::new();
        for row in rows {
            entities.push(row.map_err(PraxisError::Database)?.into_entity()?);
        }
        Ok(entities)
    })
    .await
}

/// Delete an entity together with its incident edges, both directions, in
/// one transaction. Returns false when the entity was absent. Neighboring
/// entities are left alone; any orphans this creates show up in `audit()`.
pub async fn delete(db: &Db, kind: EntityKind, name: &str) -> Result<bool> {
    let name = name.to_string();
    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM relationships \
             WHERE (from_kind = ?1 AND from_name = ?2) OR (to_kind = ?1 AND to_name = ?2)",
            params![kind.as_str(), name],
        )?;
        let removed = tx.execute(
            "DELETE FROM entities WHERE kind = ?1 AND name = ?2",
            params![kind.as_str(), name],
        )?;
        tx.commit()?;
        if removed > 0 {
            log::debug!("Deleted {} \"{}\" and its edges", kind, name);
        }
        Ok(removed > 0)
    })
    .await
}
