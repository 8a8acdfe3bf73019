//! Analytics Engine: stateless read algorithms over the fabric.
//!
//! Every function here is a pure read of current store state. Empty stores
//! produce empty collections, never errors.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::params;
use serde::Serialize;

use crate::db::Db;
use crate::error::{PraxisError, Result};
use crate::graph::load_edges;
use crate::model::{EntityBody, EntityKind, RelKind};
use crate::store;

pub mod queries;

/// Influence ranking entry for one practice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PracticeInfluence {
    pub practice: String,
    pub rule_count: usize,
    pub context_count: usize,
    /// rule_count + context_count, equal weighting.
    pub score: usize,
}

/// Evidence-strength entry for one rule. Rules with zero evidence never
/// appear here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleStrength {
    pub rule: String,
    pub evidence_count: usize,
    pub avg_credibility: f64,
    /// avg_credibility * evidence_count.
    pub strength: f64,
}

/// Context-similarity recommendation entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodologyRecommendation {
    pub methodology: String,
    /// Distinct practice -> rule -> context paths landing in contexts that
    /// share a constraint with the target.
    pub matching_paths: usize,
}

/// One year of the temporal trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearTrend {
    pub year: i32,
    pub count: usize,
    pub methodologies: Vec<String>,
}

/// Influence score per practice: reachable rules plus the distinct contexts
/// reachable through them. Ordered score descending, name ascending.
pub async fn influence_scores(db: &Db) -> Result<Vec<PracticeInfluence>> {
    let (practices, edges) = db
        .with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM entities WHERE kind = ?1 ORDER BY name")?;
            let practices: Vec<String> = stmt
                .query_map(params![EntityKind::Practice.as_str()], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()
                .map_err(PraxisError::Database)?;
            let edges = load_edges(conn, Some(&[RelKind::HasRule, RelKind::AppliesIn]))?;
            Ok((practices, edges))
        })
        .await?;

    let mut rules_of: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut contexts_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &edges {
        match edge.rel {
            RelKind::HasRule => rules_of
                .entry(edge.from.name.as_str())
                .or_default()
                .push(edge.to.name.as_str()),
            RelKind::AppliesIn => contexts_of
                .entry(edge.from.name.as_str())
                .or_default()
                .push(edge.to.name.as_str()),
            _ => {}
        }
    }

    let mut scores: Vec<PracticeInfluence> = practices
        .iter()
        .map(|practice| {
            let rules: HashSet<&str> = rules_of
                .get(practice.as_str())
                .map(|r| r.iter().copied().collect())
                .unwrap_or_default();
            let contexts: HashSet<&str> = rules
                .iter()
                .flat_map(|rule| contexts_of.get(rule).into_iter().flatten().copied())
                .collect();
            PracticeInfluence {
                practice: practice.clone(),
                rule_count: rules.len(),
                context_count: contexts.len(),
                score: rules.len() + contexts.len(),
            }
        })
        .collect();

    scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.practice.cmp(&b.practice)));
    Ok(scores)
}

/// Evidence strength per rule: mean credibility of its SUPPORTED_BY
/// evidence times the evidence count. Rules without evidence are excluded,
/// not scored zero. Ordered strength descending, name ascending.
pub async fn evidence_strength(db: &Db) -> Result<Vec<RuleStrength>> {
    let rows = db
        .with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.from_name, \
                        COUNT(*), \
                        AVG(json_extract(e.attributes, '$.credibility_score')) \
                 FROM relationships r \
                 JOIN entities e ON e.kind = r.to_kind AND e.name = r.to_name \
                 WHERE r.rel_type = ?1 AND r.to_kind = ?2 \
                 GROUP BY r.from_name",
            )?;
            let mut rows = stmt.query(params![
                RelKind::SupportedBy.as_str(),
                EntityKind::Evidence.as_str()
            ])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ));
            }
            Ok(out)
        })
        .await?;

    let mut strengths: Vec<RuleStrength> = rows
        .into_iter()
        .map(|(rule, count, avg)| {
            // AVG ignores rows lacking a credibility_score; evidence with no
            // score at all contributes count but zero strength
            let avg_credibility = avg.unwrap_or(0.0);
            RuleStrength {
                rule,
                evidence_count: count as usize,
                avg_credibility,
                strength: avg_credibility * count as f64,
            }
        })
        .collect();

    strengths.sort_by(|a, b| {
        b.strength
            .partial_cmp(&a.strength)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.rule.cmp(&b.rule))
    });
    Ok(strengths)
}

/// Recommend methodologies for a target context: score each by the number
/// of distinct practice -> rule -> context paths landing in contexts that
/// share at least one `constraints` entry with the target (target itself
/// excluded). Zero-path methodologies are omitted. Descending by score,
/// ties by name ascending, capped at `limit`.
pub async fn recommend_for_context(
    db: &Db,
    context_name: &str,
    limit: usize,
) -> Result<Vec<MethodologyRecommendation>> {
    let context_name = context_name.to_string();
    let (target_constraints, contexts, edges) = db
        .with_connection(move |conn| {
            let target = store::get_in_conn(conn, EntityKind::Context, &context_name)?
                .ok_or_else(|| PraxisError::not_found(EntityKind::Context, context_name.clone()))?;
            let target_constraints = match target.body {
                EntityBody::Context(c) => c.constraints,
                _ => Vec::new(),
            };

            let sql = format!(
                "SELECT {} FROM entities WHERE kind = ?1",
                store::ENTITY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![EntityKind::Context.as_str()], store::EntityRow::read)?;
            let mut contexts = Vec::new();
            for row in rows {
                let entity = row.map_err(PraxisError::Database)?.into_entity()?;
                if entity.name == context_name {
                    continue;
                }
                if let EntityBody::Context(c) = entity.body {
                    contexts.push((entity.name, c.constraints));
                }
            }

            let edges = load_edges(
                conn,
                Some(&[RelKind::HasPractice, RelKind::HasRule, RelKind::AppliesIn]),
            )?;
            Ok((target_constraints, contexts, edges))
        })
        .await?;

    let target_set: HashSet<&str> = target_constraints.iter().map(|c| c.as_str()).collect();
    let qualifying: HashSet<&str> = contexts
        .iter()
        .filter(|(_, constraints)| constraints.iter().any(|c| target_set.contains(c.as_str())))
        .map(|(name, _)| name.as_str())
        .collect();

    let mut practices_of: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut rules_of: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut contexts_of: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in &edges {
        let map = match edge.rel {
            RelKind::HasPractice => &mut practices_of,
            RelKind::HasRule => &mut rules_of,
            RelKind::AppliesIn => &mut contexts_of,
            _ => continue,
        };
        map.entry(edge.from.name.as_str())
            .or_default()
            .push(edge.to.name.as_str());
    }

    let mut scores: BTreeMap<&str, usize> = BTreeMap::new();
    for (&methodology, practices) in &practices_of {
        let mut paths = 0usize;
        for practice in practices {
            for rule in rules_of.get(practice).into_iter().flatten() {
                paths += contexts_of
                    .get(rule)
                    .into_iter()
                    .flatten()
                    .filter(|c| qualifying.contains(**c))
                    .count();
            }
        }
        if paths > 0 {
            scores.insert(methodology, paths);
        }
    }

    let mut ranked: Vec<MethodologyRecommendation> = scores
        .into_iter()
        .map(|(methodology, matching_paths)| MethodologyRecommendation {
            methodology: methodology.to_string(),
            matching_paths,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.matching_paths
            .cmp(&a.matching_paths)
            .then_with(|| a.methodology.cmp(&b.methodology))
    });
    ranked.truncate(limit);
    Ok(ranked)
}

/// Degree centrality of a methodology: distinct entities one undirected
/// hop away via HAS_PRACTICE or RELATED_TO.
pub async fn centrality(db: &Db, methodology: &str) -> Result<usize> {
    let methodology = methodology.to_string();
    db.with_connection(move |conn| {
        if !store::exists_in_conn(conn, EntityKind::Methodology, &methodology)? {
            return Err(PraxisError::not_found(EntityKind::Methodology, methodology));
        }
        let edges = load_edges(conn, Some(&[RelKind::HasPractice, RelKind::RelatedTo]))?;
        let me = (EntityKind::Methodology, methodology.as_str());
        let mut neighbors = HashSet::new();
        for edge in &edges {
            if (edge.from.kind, edge.from.name.as_str()) == me {
                neighbors.insert((edge.to.kind, edge.to.name.clone()));
            } else if (edge.to.kind, edge.to.name.as_str()) == me {
                neighbors.insert((edge.from.kind, edge.from.name.clone()));
            }
        }
        Ok(neighbors.len())
    })
    .await
}

/// Methodologies grouped by `year_created`, years ascending, names
/// ascending within a year. Methodologies without a year are omitted.
pub async fn temporal_trend(db: &Db) -> Result<Vec<YearTrend>> {
    let methodologies = store::list(db, EntityKind::Methodology).await?;

    let mut by_year: BTreeMap<i32, Vec<String>> = BTreeMap::new();
    for entity in methodologies {
        if let EntityBody::Methodology(m) = &entity.body {
            if let Some(year) = m.year_created {
                by_year.entry(year).or_default().push(entity.name.clone());
            }
        }
    }

    Ok(by_year
        .into_iter()
        .map(|(year, methodologies)| YearTrend {
            year,
            count: methodologies.len(),
            methodologies,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use crate::graph::test_support::*;
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

    /// The Scrum slice of the canonical sample graph.
    async fn seed_scrum(db: &Db) {
        add_methodology(db, "Scrum", Some(1995)).await;
        for practice in ["Daily Scrum", "Sprint Review", "Sprint Retrospective"] {
            add_practice(db, practice).await;
            link_default(
                db,
                eref(EntityKind::Methodology, "Scrum"),
                RelKind::HasPractice,
                eref(EntityKind::Practice, practice),
            )
            .await;
        }
        for rule in ["daily-scrum-timebox", "daily-scrum-three-questions"] {
            add_rule(db, rule).await;
            link_default(
                db,
                eref(EntityKind::Practice, "Daily Scrum"),
                RelKind::HasRule,
                eref(EntityKind::Rule, rule),
            )
            .await;
        }
        add_context(db, "Startup", &["Limited budget"]).await;
        add_context(db, "Distributed Team", &["Time zone differences"]).await;
        link_default(
            db,
            eref(EntityKind::Rule, "daily-scrum-timebox"),
            RelKind::AppliesIn,
            eref(EntityKind::Context, "Startup"),
        )
        .await;
        link_default(
            db,
            eref(EntityKind::Rule, "daily-scrum-three-questions"),
            RelKind::AppliesIn,
            eref(EntityKind::Context, "Distributed Team"),
        )
        .await;
        // Both rules into the same context: distinct contexts still count once
        link_default(
            db,
            eref(EntityKind::Rule, "daily-scrum-three-questions"),
            RelKind::AppliesIn,
            eref(EntityKind::Context, "Startup"),
        )
        .await;
    }

    #[tokio::test]
    async fn test_influence_scores() {
        let (db, _temp) = setup_test_db().await;
        seed_scrum(&db).await;

        let scores = influence_scores(&db).await.unwrap();
        // Daily Scrum: 2 rules + 2 distinct contexts = 4
        assert_eq!(scores[0].practice, "Daily Scrum");
        assert_eq!(scores[0].rule_count, 2);
        assert_eq!(scores[0].context_count, 2);
        assert_eq!(scores[0].score, 4);
        // Zero-score ties resolve by name ascending
        assert_eq!(scores[1].practice, "Sprint Retrospective");
        assert_eq!(scores[2].practice, "Sprint Review");
        assert_eq!(scores[1].score, 0);
    }

    #[tokio::test]
    async fn test_evidence_strength_single_source() {
        let (db, _temp) = setup_test_db().await;
        add_rule(&db, "kanban-wip-limits").await;
        add_rule(&db, "no-evidence-rule").await;
        add_evidence(&db, "kanban-toyota", 9.8).await;
        link_default(
            &db,
            eref(EntityKind::Rule, "kanban-wip-limits"),
            RelKind::SupportedBy,
            eref(EntityKind::Evidence, "kanban-toyota"),
        )
        .await;

        let strengths = evidence_strength(&db).await.unwrap();
        // Zero-evidence rule excluded, not scored zero
        assert_eq!(strengths.len(), 1);
        assert_eq!(strengths[0].rule, "kanban-wip-limits");
        assert_eq!(strengths[0].evidence_count, 1);
        assert!((strengths[0].strength - 9.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_evidence_strength_multiplies_by_count() {
        let (db, _temp) = setup_test_db().await;
        add_rule(&db, "tdd-red-green-refactor").await;
        add_evidence(&db, "tdd-study", 8.0).await;
        add_evidence(&db, "tdd-field-report", 6.0).await;
        for evidence in ["tdd-study", "tdd-field-report"] {
            link_default(
                &db,
                eref(EntityKind::Rule, "tdd-red-green-refactor"),
                RelKind::SupportedBy,
                eref(EntityKind::Evidence, evidence),
            )
            .await;
        }

        let strengths = evidence_strength(&db).await.unwrap();
        assert_eq!(strengths[0].evidence_count, 2);
        assert!((strengths[0].avg_credibility - 7.0).abs() < 1e-9);
        assert!((strengths[0].strength - 14.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_recommend_for_context() {
        let (db, _temp) = setup_test_db().await;
        seed_scrum(&db).await;
        // Target shares "Limited budget" with Startup only
        add_context(&db, "Bootstrapped SaaS", &["Limited budget", "Small team"]).await;
        // A methodology with no qualifying paths
        add_methodology(&db, "Waterfall", Some(1970)).await;

        let recs = recommend_for_context(&db, "Bootstrapped SaaS", 5).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].methodology, "Scrum");
        // Two distinct rule paths land in Startup
        assert_eq!(recs[0].matching_paths, 2);

        // The target context itself never qualifies
        let self_recs = recommend_for_context(&db, "Startup", 5).await.unwrap();
        assert!(self_recs.is_empty());
    }

    #[tokio::test]
    async fn test_recommend_unknown_context_is_not_found() {
        let (db, _temp) = setup_test_db().await;
        let err = recommend_for_context(&db, "Ghost Context", 5).await.unwrap_err();
        assert!(matches!(err, PraxisError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_centrality_counts_undirected_neighbors() {
        let (db, _temp) = setup_test_db().await;
        seed_scrum(&db).await;
        add_methodology(&db, "Agile", Some(2001)).await;
        // Stored toward Scrum; undirected degree still sees it
        link_default(
            &db,
            eref(EntityKind::Methodology, "Agile"),
            RelKind::RelatedTo,
            eref(EntityKind::Methodology, "Scrum"),
        )
        .await;

        assert_eq!(centrality(&db, "Scrum").await.unwrap(), 4);
        assert_eq!(centrality(&db, "Agile").await.unwrap(), 1);

        let err = centrality(&db, "Ghost").await.unwrap_err();
        assert!(matches!(err, PraxisError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_temporal_trend() {
        let (db, _temp) = setup_test_db().await;
        add_methodology(&db, "Scrum", Some(1995)).await;
        add_methodology(&db, "Extreme Programming", Some(1995)).await;
        add_methodology(&db, "Kanban", Some(1940)).await;
        add_methodology(&db, "Undated", None).await;

        let trend = temporal_trend(&db).await.unwrap();
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].year, 1940);
        assert_eq!(trend[0].count, 1);
        assert_eq!(trend[1].year, 1995);
        assert_eq!(
            trend[1].methodologies,
            vec!["Extreme Programming".to_string(), "Scrum".to_string()]
        );
    }

    #[tokio::test]
    async fn test_analytics_empty_store() {
        let (db, _temp) = setup_test_db().await;
        assert!(influence_scores(&db).await.unwrap().is_empty());
        assert!(evidence_strength(&db).await.unwrap().is_empty());
        assert!(temporal_trend(&db).await.unwrap().is_empty());
    }
}
