//! Technology radar ingestion and reporting.
//!
//! The ingestion pipeline hands us normalized [`RadarRecord`]s; this module
//! upserts them as RadarTechnique entities and wires INFLUENCES_PRACTICE
//! edges whose score defaults from the ring at write time.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::db::Db;
use crate::error::{PraxisError, Result};
use crate::graph::{self, Edge, LinkAttrs};
use crate::model::{
    Entity, EntityBody, EntityDraft, EntityKind, EntityRef, Movement, Quadrant,
    RadarTechniqueAttrs, RelKind, Ring,
};
use crate::store;

/// A normalized radar entry as produced by the ingestion pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct RadarRecord {
    pub name: String,
    pub description: String,
    pub ring: Ring,
    pub quadrant: Quadrant,
    #[serde(default)]
    pub movement: Movement,
    pub volume: u32,
    pub edition_date: String,
}

/// One technique with the practices it influences.
#[derive(Debug, Clone, Serialize)]
pub struct TechniqueSummary {
    pub technique: Entity,
    pub influenced_practices: Vec<String>,
}

/// The full neighborhood of a technique: influenced practices, the
/// methodologies owning them, and their rule titles.
#[derive(Debug, Clone, Serialize)]
pub struct TechniqueConnections {
    pub technique: Entity,
    pub practices: Vec<String>,
    pub methodologies: Vec<String>,
    /// Rule titles, not store names.
    pub rules: Vec<String>,
}

/// Upsert a radar record. Creates the technique when absent; otherwise
/// rewrites the radar fields through the normal update path, preserving
/// `created_at` and bumping `version`.
pub async fn import(db: &Db, record: RadarRecord) -> Result<Entity> {
    let attrs = RadarTechniqueAttrs {
        description: record.description,
        ring: record.ring,
        quadrant: record.quadrant,
        movement: record.movement,
        volume: record.volume,
        edition_date: record.edition_date,
    };
    match store::get(db, EntityKind::RadarTechnique, &record.name).await? {
        None => {
            let draft = EntityDraft {
                name: record.name,
                body: EntityBody::RadarTechnique(attrs),
            };
            store::create(db, draft).await
        }
        Some(_) => {
            log::debug!("radar technique '{}' already present, updating", record.name);
            let patch = json!({
                "description": attrs.description,
                "ring": attrs.ring,
                "quadrant": attrs.quadrant,
                "movement": attrs.movement,
                "volume": attrs.volume,
                "edition_date": attrs.edition_date,
            });
            store::update(db, EntityKind::RadarTechnique, &record.name, patch).await
        }
    }
}

/// Connect a technique to a practice it informs. The influence score is the
/// override when given, else the ring default, fixed at write time.
pub async fn link_influence(
    db: &Db,
    technique: &str,
    practice: &str,
    score_override: Option<f64>,
) -> Result<Edge> {
    let score = match score_override {
        Some(score) => score,
        None => {
            let entity = store::get(db, EntityKind::RadarTechnique, technique)
                .await?
                .ok_or_else(|| {
                    PraxisError::not_found(EntityKind::RadarTechnique, technique.to_string())
                })?;
            match &entity.body {
                EntityBody::RadarTechnique(attrs) => attrs.ring.influence_score(),
                _ => Ring::Assess.influence_score(),
            }
        }
    };
    graph::link(
        db,
        EntityRef::new(EntityKind::RadarTechnique, technique),
        RelKind::InfluencesPractice,
        EntityRef::new(EntityKind::Practice, practice),
        LinkAttrs {
            weight: None,
            influence_score: Some(score),
        },
    )
    .await
}

/// Move a technique to a new ring through the normal update path.
pub async fn update_ring(db: &Db, technique: &str, ring: Ring) -> Result<Entity> {
    store::update(
        db,
        EntityKind::RadarTechnique,
        technique,
        json!({ "ring": ring }),
    )
    .await
}

fn technique_ring(entity: &Entity) -> Ring {
    match &entity.body {
        EntityBody::RadarTechnique(attrs) => attrs.ring,
        _ => Ring::Hold,
    }
}

/// All techniques ordered along the adoption funnel (Adopt, Trial, Assess,
/// Hold) then by name, each with the practices it influences.
pub async fn techniques_summary(db: &Db) -> Result<Vec<TechniqueSummary>> {
    let mut techniques = store::list(db, EntityKind::RadarTechnique).await?;
    techniques.sort_by(|a, b| {
        technique_ring(a)
            .adoption_order()
            .cmp(&technique_ring(b).adoption_order())
            .then_with(|| a.name.cmp(&b.name))
    });

    let edges = db
        .with_connection(|conn| graph::load_edges(conn, Some(&[RelKind::InfluencesPractice])))
        .await?;

    let summaries = techniques
        .into_iter()
        .map(|technique| {
            let mut influenced: Vec<String> = edges
                .iter()
                .filter(|e| e.from.name == technique.name)
                .map(|e| e.to.name.clone())
                .collect();
            influenced.sort();
            influenced.dedup();
            TechniqueSummary {
                technique,
                influenced_practices: influenced,
            }
        })
        .collect();
    Ok(summaries)
}

/// The distinct practices a technique influences, the methodologies owning
/// those practices, and the titles of those practices' rules.
pub async fn technique_connections(db: &Db, name: &str) -> Result<TechniqueConnections> {
    let name = name.to_string();
    db.with_connection(move |conn| {
        let technique = store::get_in_conn(conn, EntityKind::RadarTechnique, &name)?
            .ok_or_else(|| PraxisError::not_found(EntityKind::RadarTechnique, name.clone()))?;

        let edges = graph::load_edges(
            conn,
            Some(&[
                RelKind::InfluencesPractice,
                RelKind::HasPractice,
                RelKind::HasRule,
            ]),
        )?;

        let mut practices: Vec<String> = edges
            .iter()
            .filter(|e| e.rel == RelKind::InfluencesPractice && e.from.name == technique.name)
            .map(|e| e.to.name.clone())
            .collect();
        practices.sort();
        practices.dedup();

        let mut methodologies: Vec<String> = edges
            .iter()
            .filter(|e| e.rel == RelKind::HasPractice && practices.iter().any(|p| p == &e.to.name))
            .map(|e| e.from.name.clone())
            .collect();
        methodologies.sort();
        methodologies.dedup();

        let rule_names: Vec<&str> = edges
            .iter()
            .filter(|e| e.rel == RelKind::HasRule && practices.iter().any(|p| p == &e.from.name))
            .map(|e| e.to.name.as_str())
            .collect();

        // The report surface shows rule titles, so resolve names here
        let mut rules = Vec::new();
        if !rule_names.is_empty() {
            let placeholders = rule_names.iter().map(|_| "?").collect::<Vec<_>>().join(",");
            let sql = format!(
                "SELECT json_extract(attributes, '$.title') FROM entities \
                 WHERE kind = ? AND name IN ({})",
                placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let bound = std::iter::once(EntityKind::Rule.as_str()).chain(rule_names);
            let titles = stmt.query_map(rusqlite::params_from_iter(bound), |row| {
                row.get::<_, String>(0)
            })?;
            for title in titles {
                rules.push(title.map_err(PraxisError::Database)?);
            }
        }
        rules.sort();
        rules.dedup();

        Ok(TechniqueConnections {
            technique,
            practices,
            methodologies,
            rules,
        })
    })
    .await
}
