//! Batch integrity audit over the whole store.
//!
//! Findings are advisory. An orphaned Rule is a legitimate intermediate
//! state for the calling layer (entity created, link pending), so `audit`
//! reports it and moves on; it never blocks or repairs anything.

use rusqlite::params;
use serde::Serialize;

use crate::db::Db;
use crate::error::{PraxisError, Result};
use crate::model::{EntityBody, EntityKind, RelKind};
use crate::store::{EntityRow, ENTITY_COLUMNS};

/// One audit finding. `InvalidStoredAttributes` covers rows imported
/// outside the normal write path that no longer pass validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum Finding {
    OrphanRule { name: String },
    OrphanEvidence { name: String },
    MethodologyWithoutPractice { name: String },
    InvalidStoredAttributes {
        kind: EntityKind,
        name: String,
        message: String,
    },
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Finding::OrphanRule { name } => {
                write!(f, "Rule \"{}\" has no inbound HAS_RULE edge", name)
            }
            Finding::OrphanEvidence { name } => {
                write!(f, "Evidence \"{}\" has no inbound SUPPORTED_BY edge", name)
            }
            Finding::MethodologyWithoutPractice { name } => {
                write!(f, "Methodology \"{}\" has no HAS_PRACTICE edge", name)
            }
            Finding::InvalidStoredAttributes { kind, name, message } => {
                write!(f, "{} \"{}\" fails validation: {}", kind, name, message)
            }
        }
    }
}

/// Run every integrity check and collect the findings. Read-only; safe to
/// run concurrently with writers.
pub async fn audit(db: &Db) -> Result<Vec<Finding>> {
    db.with_connection(|conn| {
        let mut findings = Vec::new();

        // Entities missing an expected inbound edge
        findings.extend(missing_edge(
            conn,
            EntityKind::Rule,
            RelKind::HasRule,
            EdgeSide::Inbound,
            |name| Finding::OrphanRule { name },
        )?);
        findings.extend(missing_edge(
            conn,
            EntityKind::Evidence,
            RelKind::SupportedBy,
            EdgeSide::Inbound,
            |name| Finding::OrphanEvidence { name },
        )?);
        findings.extend(missing_edge(
            conn,
            EntityKind::Methodology,
            RelKind::HasPractice,
            EdgeSide::Outbound,
            |name| Finding::MethodologyWithoutPractice { name },
        )?);

        // Defensive re-validation of stored attributes
        let sql = format!("SELECT {} FROM entities ORDER BY kind, name", ENTITY_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], EntityRow::read)?;
        for row in rows {
            let raw = row.map_err(PraxisError::Database)?;
            let kind = match EntityKind::parse(&raw.kind) {
                Some(kind) => kind,
                None => {
                    log::warn!("Entity \"{}\" has unknown kind {}", raw.name, raw.kind);
                    continue;
                }
            };
            let name = raw.name.clone();
            let parsed = serde_json::from_str(&raw.attributes)
                .map_err(PraxisError::Json)
                .and_then(|value| EntityBody::from_json(kind, &value))
                .and_then(|body| body.validate().map(|_| ()));
            if let Err(e) = parsed {
                findings.push(Finding::InvalidStoredAttributes {
                    kind,
                    name,
                    message: e.to_string(),
                });
            }
        }

        log::debug!("Audit produced {} findings", findings.len());
        Ok(findings)
    })
    .await
}

enum EdgeSide {
    Inbound,
    Outbound,
}

fn missing_edge(
    conn: &rusqlite::Connection,
    kind: EntityKind,
    rel: RelKind,
    side: EdgeSide,
    make: impl Fn(String) -> Finding,
) -> Result<Vec<Finding>> {
    let sql = match side {
        EdgeSide::Inbound => {
            "SELECT name FROM entities e WHERE e.kind = ?1 AND NOT EXISTS ( \
                 SELECT 1 FROM relationships r \
                 WHERE r.rel_type = ?2 AND r.to_kind = e.kind AND r.to_name = e.name) \
             ORDER BY name"
        }
        EdgeSide::Outbound => {
            "SELECT name FROM entities e WHERE e.kind = ?1 AND NOT EXISTS ( \
                 SELECT 1 FROM relationships r \
                 WHERE r.rel_type = ?2 AND r.from_kind = e.kind AND r.from_name = e.name) \
             ORDER BY name"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![kind.as_str(), rel.as_str()], |row| {
        row.get::<_, String>(0)
    })?;
    let mut findings = Vec::new();
    for row in rows {
        findings.push(make(row.map_err(PraxisError::Database)?));
    }
    Ok(findings)
}
