//! Typed read helpers over the fabric: the views the collaborating API
//! layer composes its responses from.

use std::collections::{HashMap, HashSet, VecDeque};

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::Db;
use crate::error::{PraxisError, Result};
use crate::graph::load_edges;
use crate::model::{Entity, EntityBody, EntityKind, Priority, RelKind};
use crate::store::{self, EntityRow, ENTITY_COLUMNS};

/// A methodology with its practices, each carrying its rules.
#[derive(Debug, Clone, Serialize)]
pub struct MethodologyDetail {
    pub methodology: Entity,
    pub practices: Vec<PracticeDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PracticeDetail {
    pub practice: Entity,
    pub rules: Vec<Entity>,
}

/// A related methodology with the number of short undirected paths
/// connecting it to the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelatedMethodology {
    pub methodology: String,
    pub path_count: usize,
}

fn rule_priority(entity: &Entity) -> Priority {
    match &entity.body {
        EntityBody::Rule(r) => r.priority,
        _ => Priority::Medium,
    }
}

/// Canonical rule ordering: priority descending (critical first), then
/// name ascending.
fn sort_rules(rules: &mut [Entity]) {
    rules.sort_by(|a, b| {
        rule_priority(b)
            .rank()
            .cmp(&rule_priority(a).rank())
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Entities on the `to` side of edges with the given type and `from` key.
fn targets_in_conn(
    conn: &Connection,
    from_kind: EntityKind,
    from_name: &str,
    rel: RelKind,
) -> Result<Vec<Entity>> {
    let sql = "SELECT e.kind, e.name, e.attributes, e.version, e.created_at, e.updated_at \
               FROM relationships r \
               JOIN entities e ON e.kind = r.to_kind AND e.name = r.to_name \
               WHERE r.rel_type = ?1 AND r.from_kind = ?2 AND r.from_name = ?3 \
               ORDER BY e.name";
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(
        params![rel.as_str(), from_kind.as_str(), from_name],
        EntityRow::read,
    )?;
    let mut entities = Vec::new();
    for row in rows {
        entities.push(row.map_err(PraxisError::Database)?.into_entity()?);
    }
    Ok(entities)
}

/// Practices of a methodology via HAS_PRACTICE, name ascending.
pub async fn practices_of(db: &Db, methodology: &str) -> Result<Vec<Entity>> {
    let methodology = methodology.to_string();
    db.with_connection(move |conn| {
        targets_in_conn(conn, EntityKind::Methodology, &methodology, RelKind::HasPractice)
    })
    .await
}

/// Rules of a practice via HAS_RULE, priority descending then name.
pub async fn rules_of(db: &Db, practice: &str) -> Result<Vec<Entity>> {
    let practice = practice.to_string();
    db.with_connection(move |conn| {
        let mut rules =
            targets_in_conn(conn, EntityKind::Practice, &practice, RelKind::HasRule)?;
        sort_rules(&mut rules);
        Ok(rules)
    })
    .await
}

/// Rules applying in a context (inbound APPLIES_IN), priority descending
/// then name.
pub async fn rules_in_context(db: &Db, context: &str) -> Result<Vec<Entity>> {
    let context = context.to_string();
    db.with_connection(move |conn| {
        let sql = "SELECT e.kind, e.name, e.attributes, e.version, e.created_at, e.updated_at \
                   FROM relationships r \
                   JOIN entities e ON e.kind = r.from_kind AND e.name = r.from_name \
                   WHERE r.rel_type = ?1 AND r.to_kind = ?2 AND r.to_name = ?3";
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(
            params![
                RelKind::AppliesIn.as_str(),
                EntityKind::Context.as_str(),
                context
            ],
            EntityRow::read,
        )?;
        let mut rules = Vec::new();
        for row in rows {
            rules.push(row.map_err(PraxisError::Database)?.into_entity()?);
        }
        sort_rules(&mut rules);
        Ok(rules)
    })
    .await
}

/// Rules of a practice, each paired with its supporting evidence.
pub async fn rules_with_evidence(db: &Db, practice: &str) -> Result<Vec<(Entity, Vec<Entity>)>> {
    let practice = practice.to_string();
    db.with_connection(move |conn| {
        let mut rules =
            targets_in_conn(conn, EntityKind::Practice, &practice, RelKind::HasRule)?;
        sort_rules(&mut rules);
        let mut out = Vec::with_capacity(rules.len());
        for rule in rules {
            let evidence =
                targets_in_conn(conn, EntityKind::Rule, &rule.name, RelKind::SupportedBy)?;
            out.push((rule, evidence));
        }
        Ok(out)
    })
    .await
}

/// Rules applying in at least one context that shares a constraint with the
/// given list (and matches `team_size` when supplied). Priority descending
/// then name.
pub async fn applicable_rules(
    db: &Db,
    constraints: Vec<String>,
    team_size: Option<String>,
) -> Result<Vec<Entity>> {
    db.with_connection(move |conn| {
        let wanted: HashSet<&str> = constraints.iter().map(|c| c.as_str()).collect();

        let sql = format!("SELECT {} FROM entities WHERE kind = ?1", ENTITY_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![EntityKind::Context.as_str()], EntityRow::read)?;
        let mut qualifying: HashSet<String> = HashSet::new();
        for row in rows {
            let entity = row.map_err(PraxisError::Database)?.into_entity()?;
            if let EntityBody::Context(c) = &entity.body {
                let overlaps = c
                    .constraints
                    .iter()
                    .any(|constraint| wanted.contains(constraint.as_str()));
                let size_ok = match (&team_size, &c.team_size) {
                    (Some(wanted_size), Some(size)) => wanted_size == size,
                    (Some(_), None) => false,
                    (None, _) => true,
                };
                if overlaps && size_ok {
                    qualifying.insert(entity.name);
                }
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut rules = Vec::new();
        for context in &qualifying {
            let sql =
                "SELECT e.kind, e.name, e.attributes, e.version, e.created_at, e.updated_at \
                 FROM relationships r \
                 JOIN entities e ON e.kind = r.from_kind AND e.name = r.from_name \
                 WHERE r.rel_type = ?1 AND r.to_kind = ?2 AND r.to_name = ?3";
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(
                params![
                    RelKind::AppliesIn.as_str(),
                    EntityKind::Context.as_str(),
                    context
                ],
                EntityRow::read,
            )?;
            for row in rows {
                let rule = row.map_err(PraxisError::Database)?.into_entity()?;
                if seen.insert(rule.name.clone()) {
                    rules.push(rule);
                }
            }
        }
        sort_rules(&mut rules);
        Ok(rules)
    })
    .await
}

/// Nested view: one methodology, its practices, their rules.
pub async fn methodology_detail(db: &Db, name: &str) -> Result<MethodologyDetail> {
    let name = name.to_string();
    db.with_connection(move |conn| {
        let methodology = store::get_in_conn(conn, EntityKind::Methodology, &name)?
            .ok_or_else(|| PraxisError::not_found(EntityKind::Methodology, name.clone()))?;
        let practices =
            targets_in_conn(conn, EntityKind::Methodology, &name, RelKind::HasPractice)?;
        let mut detailed = Vec::with_capacity(practices.len());
        for practice in practices {
            let mut rules =
                targets_in_conn(conn, EntityKind::Practice, &practice.name, RelKind::HasRule)?;
            sort_rules(&mut rules);
            detailed.push(PracticeDetail { practice, rules });
        }
        Ok(MethodologyDetail {
            methodology,
            practices: detailed,
        })
    })
    .await
}

/// Other methodologies ranked by the number of distinct undirected
/// RELATED_TO / HAS_PRACTICE paths of at most two hops connecting them to
/// the source. Count descending, name ascending, capped at `limit`.
pub async fn related_methodologies(
    db: &Db,
    name: &str,
    limit: usize,
) -> Result<Vec<RelatedMethodology>> {
    let name = name.to_string();
    let edges = db
        .with_connection(move |conn| {
            if !store::exists_in_conn(conn, EntityKind::Methodology, &name)? {
                return Err(PraxisError::not_found(EntityKind::Methodology, name.clone()));
            }
            let edges = load_edges(conn, Some(&[RelKind::RelatedTo, RelKind::HasPractice]))?;
            Ok((edges, name))
        })
        .await?;
    let (edges, name) = edges;

    // Undirected adjacency over (kind, name) nodes; parallel edges each
    // contribute a path
    let mut adjacency: HashMap<(EntityKind, &str), Vec<(EntityKind, &str)>> = HashMap::new();
    for edge in &edges {
        let from = (edge.from.kind, edge.from.name.as_str());
        let to = (edge.to.kind, edge.to.name.as_str());
        adjacency.entry(from).or_default().push(to);
        adjacency.entry(to).or_default().push(from);
    }

    let source = (EntityKind::Methodology, name.as_str());
    let mut counts: HashMap<&str, usize> = HashMap::new();
    // Enumerate simple paths of length 1..=2
    let mut queue: VecDeque<Vec<(EntityKind, &str)>> = VecDeque::new();
    queue.push_back(vec![source]);
    while let Some(path) = queue.pop_front() {
        let last = *path.last().unwrap_or(&source);
        if path.len() > 2 {
            continue;
        }
        for &next in adjacency.get(&last).into_iter().flatten() {
            if path.contains(&next) {
                continue;
            }
            if next.0 == EntityKind::Methodology {
                *counts.entry(next.1).or_insert(0) += 1;
            }
            let mut extended = path.clone();
            extended.push(next);
            queue.push_back(extended);
        }
    }

    let mut ranked: Vec<RelatedMethodology> = counts
        .into_iter()
        .map(|(methodology, path_count)| RelatedMethodology {
            methodology: methodology.to_string(),
            path_count,
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.path_count
            .cmp(&a.path_count)
            .then_with(|| a.methodology.cmp(&b.methodology))
    });
    ranked.truncate(limit);
    Ok(ranked)
}
