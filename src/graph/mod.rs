//! Relationship Fabric: directed, typed, weighted edges between entities,
//! plus the traversal algorithms built on top of them.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use uuid::Uuid;

use crate::db::Db;
use crate::error::{PraxisError, Result};
use crate::model::{EntityRef, RelKind};
use crate::store;

pub mod traversal;

pub use traversal::{shortest_path, traverse, Direction, Path, PathStep, Traversal};

/// A stored edge. `influence_score` is only ever set on
/// INFLUENCES_PRACTICE edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub from: EntityRef,
    pub rel: RelKind,
    pub to: EntityRef,
    pub weight: f64,
    pub influence_score: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Optional edge attributes for `link`. On a re-link, only the attributes
/// actually supplied overwrite the stored ones; the rest keep their values.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinkAttrs {
    pub weight: Option<f64>,
    pub influence_score: Option<f64>,
}

pub(crate) fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEdge> {
    Ok(RawEdge {
        from_kind: row.get(0)?,
        from_name: row.get(1)?,
        rel_type: row.get(2)?,
        to_kind: row.get(3)?,
        to_name: row.get(4)?,
        weight: row.get(5)?,
        influence_score: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Edge columns before parsing, mirroring the raw entity row in the store.
pub(crate) struct RawEdge {
    pub from_kind: String,
    pub from_name: String,
    pub rel_type: String,
    pub to_kind: String,
    pub to_name: String,
    pub weight: f64,
    pub influence_score: Option<f64>,
    pub created_at: String,
}

impl RawEdge {
    pub fn into_edge(self) -> Result<Edge> {
        let from_kind = crate::model::EntityKind::parse(&self.from_kind)
            .ok_or_else(|| PraxisError::Parse(format!("unknown entity kind: {}", self.from_kind)))?;
        let to_kind = crate::model::EntityKind::parse(&self.to_kind)
            .ok_or_else(|| PraxisError::Parse(format!("unknown entity kind: {}", self.to_kind)))?;
        let rel = RelKind::parse(&self.rel_type)
            .ok_or_else(|| PraxisError::Parse(format!("unknown relationship type: {}", self.rel_type)))?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| PraxisError::Parse(format!("bad timestamp \"{}\": {}", self.created_at, e)))?;
        Ok(Edge {
            from: EntityRef::new(from_kind, self.from_name),
            rel,
            to: EntityRef::new(to_kind, self.to_name),
            weight: self.weight,
            influence_score: self.influence_score,
            created_at,
        })
    }
}

pub(crate) const EDGE_COLUMNS: &str =
    "from_kind, from_name, rel_type, to_kind, to_name, weight, influence_score, created_at";

/// Load every edge, optionally restricted to the given relationship types.
/// The traversal and analytics code work over this in-memory snapshot.
pub(crate) fn load_edges(conn: &Connection, rel_types: Option<&[RelKind]>) -> Result<Vec<Edge>> {
    let mut edges = Vec::new();
    match rel_types {
        Some(types) => {
            let placeholders = types.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT {} FROM relationships WHERE rel_type IN ({})",
                EDGE_COLUMNS, placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(types.iter().map(|t| t.as_str())),
                edge_from_row,
            )?;
            for row in rows {
                edges.push(row.map_err(PraxisError::Database)?.into_edge()?);
            }
        }
        None => {
            let sql = format!("SELECT {} FROM relationships", EDGE_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], edge_from_row)?;
            for row in rows {
                edges.push(row.map_err(PraxisError::Database)?.into_edge()?);
            }
        }
    }
    Ok(edges)
}

fn check_endpoints(from: &EntityRef, rel: RelKind, to: &EntityRef) -> Result<()> {
    if let Some((from_kind, to_kind)) = rel.endpoints() {
        if from.kind != from_kind || to.kind != to_kind {
            return Err(PraxisError::invalid(
                "rel_type",
                format!(
                    "{} requires {} -> {}, got {} -> {}",
                    rel, from_kind, to_kind, from.kind, to.kind
                ),
            ));
        }
    }
    Ok(())
}

/// Create or update a directed edge. Idempotent on the (from, rel, to)
/// triple: a re-link never duplicates the edge, it merges the supplied
/// attributes into the stored ones.
pub async fn link(
    db: &Db,
    from: EntityRef,
    rel: RelKind,
    to: EntityRef,
    attrs: LinkAttrs,
) -> Result<Edge> {
    check_endpoints(&from, rel, &to)?;

    db.with_connection(move |conn| {
        let tx = conn.transaction()?;
        for endpoint in [&from, &to] {
            if !store::exists_in_conn(&tx, endpoint.kind, &endpoint.name)? {
                return Err(PraxisError::not_found(endpoint.kind, endpoint.name.clone()));
            }
        }

        // COALESCE keeps the stored attribute when the caller left it unset,
        // so weight/influence_score only change via an explicit re-link.
        tx.execute(
            "INSERT INTO relationships \
                 (edge_id, from_kind, from_name, rel_type, to_kind, to_name, \
                  weight, influence_score, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
             ON CONFLICT (from_kind, from_name, rel_type, to_kind, to_name) DO UPDATE SET \
                 weight = COALESCE(?10, weight), \
                 influence_score = COALESCE(?11, influence_score)",
            params![
                Uuid::new_v4().to_string(),
                from.kind.as_str(),
                from.name,
                rel.as_str(),
                to.kind.as_str(),
                to.name,
                attrs.weight.unwrap_or(1.0),
                attrs.influence_score,
                Utc::now().to_rfc3339(),
                attrs.weight,
                attrs.influence_score,
            ],
        )?;

        let sql = format!(
            "SELECT {} FROM relationships \
             WHERE from_kind = ?1 AND from_name = ?2 AND rel_type = ?3 \
               AND to_kind = ?4 AND to_name = ?5",
            EDGE_COLUMNS
        );
        let raw = tx.query_row(
            &sql,
            params![
                from.kind.as_str(),
                from.name,
                rel.as_str(),
                to.kind.as_str(),
                to.name
            ],
            edge_from_row,
        )?;
        tx.commit()?;
        raw.into_edge()
    })
    .await
}

/// Remove an edge. Returns false (no-op) when the triple is absent.
pub async fn unlink(db: &Db, from: EntityRef, rel: RelKind, to: EntityRef) -> Result<bool> {
    db.with_connection(move |conn| {
        let removed = conn.execute(
            "DELETE FROM relationships \
             WHERE from_kind = ?1 AND from_name = ?2 AND rel_type = ?3 \
               AND to_kind = ?4 AND to_name = ?5",
            params![
                from.kind.as_str(),
                from.name,
                rel.as_str(),
                to.kind.as_str(),
                to.name
            ],
        )?;
        Ok(removed > 0)
    })
    .await
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::db::migrate;
    use crate::model::EntityKind;
    use std::path::Path;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::new(&db_path);
        let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");
        db.with_connection(move |conn| migrate::run_migrations(conn, &migrations_dir))
            .await
            .unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_link_defaults_weight() {
        let (db, _temp) = setup_test_db().await;
        add_methodology(&db, "Scrum", Some(1995)).await;
        add_practice(&db, "Daily Scrum").await;

        let edge = link(
            &db,
            eref(EntityKind::Methodology, "Scrum"),
            RelKind::HasPractice,
            eref(EntityKind::Practice, "Daily Scrum"),
            LinkAttrs::default(),
        )
        .await
        .unwrap();
        assert_eq!(edge.weight, 1.0);
        assert_eq!(edge.influence_score, None);
    }

    #[tokio::test]
    async fn test_relink_is_idempotent_and_merges_attrs() {
        let (db, _temp) = setup_test_db().await;
        add_methodology(&db, "Scrum", Some(1995)).await;
        add_practice(&db, "Daily Scrum").await;
        let from = eref(EntityKind::Methodology, "Scrum");
        let to = eref(EntityKind::Practice, "Daily Scrum");

        link_default(&db, from.clone(), RelKind::HasPractice, to.clone()).await;
        link_default(&db, from.clone(), RelKind::HasPractice, to.clone()).await;

        let count: i64 = db
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);

        // Third link with attributes updates the stored edge in place
        let edge = link(
            &db,
            from,
            RelKind::HasPractice,
            to,
            LinkAttrs {
                weight: Some(0.4),
                influence_score: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(edge.weight, 0.4);
    }

    #[tokio::test]
    async fn test_relink_without_attrs_keeps_stored_weight() {
        let (db, _temp) = setup_test_db().await;
        add_methodology(&db, "Scrum", Some(1995)).await;
        add_practice(&db, "Daily Scrum").await;
        let from = eref(EntityKind::Methodology, "Scrum");
        let to = eref(EntityKind::Practice, "Daily Scrum");

        link(
            &db,
            from.clone(),
            RelKind::HasPractice,
            to.clone(),
            LinkAttrs {
                weight: Some(0.4),
                influence_score: None,
            },
        )
        .await
        .unwrap();

        // No implicit overwrite: a bare re-link leaves 0.4 in place
        let edge = link(&db, from, RelKind::HasPractice, to, LinkAttrs::default())
            .await
            .unwrap();
        assert_eq!(edge.weight, 0.4);
    }

    #[tokio::test]
    async fn test_link_rejects_wrong_endpoint_kinds() {
        let (db, _temp) = setup_test_db().await;
        add_methodology(&db, "Scrum", Some(1995)).await;
        add_rule(&db, "timebox").await;

        let err = link(
            &db,
            eref(EntityKind::Methodology, "Scrum"),
            RelKind::HasPractice,
            eref(EntityKind::Rule, "timebox"),
            LinkAttrs::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PraxisError::InvalidAttribute { .. }));
    }

    #[tokio::test]
    async fn test_related_to_accepts_any_pair() {
        let (db, _temp) = setup_test_db().await;
        add_methodology(&db, "Agile", Some(2001)).await;
        add_rule(&db, "timebox").await;

        link(
            &db,
            eref(EntityKind::Rule, "timebox"),
            RelKind::RelatedTo,
            eref(EntityKind::Methodology, "Agile"),
            LinkAttrs::default(),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_link_missing_endpoint_is_not_found() {
        let (db, _temp) = setup_test_db().await;
        add_methodology(&db, "Scrum", Some(1995)).await;

        let err = link(
            &db,
            eref(EntityKind::Methodology, "Scrum"),
            RelKind::HasPractice,
            eref(EntityKind::Practice, "Ghost Practice"),
            LinkAttrs::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PraxisError::NotFound { .. }));

        // Nothing was written
        let count: i64 = db
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_unlink() {
        let (db, _temp) = setup_test_db().await;
        add_methodology(&db, "Scrum", Some(1995)).await;
        add_practice(&db, "Daily Scrum").await;
        let from = eref(EntityKind::Methodology, "Scrum");
        let to = eref(EntityKind::Practice, "Daily Scrum");

        link_default(&db, from.clone(), RelKind::HasPractice, to.clone()).await;
        assert!(unlink(&db, from.clone(), RelKind::HasPractice, to.clone())
            .await
            .unwrap());
        // Absent edge: no-op
        assert!(!unlink(&db, from, RelKind::HasPractice, to).await.unwrap());
    }
}
