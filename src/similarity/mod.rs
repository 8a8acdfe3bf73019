//! Similarity Index: per-entity embedding vectors with cosine
//! nearest-neighbor lookup.
//!
//! Embeddings are derived data computed by an external collaborator; the
//! core only stores them (little-endian f32 BLOB on the entity row) and
//! scans them. Upserting an embedding is not a domain mutation, so it does
//! not bump the entity version.

use rusqlite::params;

use crate::db::Db;
use crate::error::{PraxisError, Result};
use crate::model::{Entity, EntityKind};
use crate::store::{EntityRow, ENTITY_COLUMNS};

/// Encode a vector as a little-endian f32 BLOB.
pub(crate) fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Parse embedding BLOB to Vec<f32>. None if the length is not a multiple
/// of four bytes.
pub(crate) fn parse_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }

    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}

/// Compute cosine similarity between two vectors of equal length.
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();

    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

fn check_dimension(vector: &[f32], dimensions: usize) -> Result<()> {
    if vector.len() != dimensions {
        return Err(PraxisError::DimensionMismatch {
            expected: dimensions,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Attach (or replace) the embedding of an existing entity.
pub async fn upsert_embedding(
    db: &Db,
    kind: EntityKind,
    name: &str,
    vector: Vec<f32>,
    dimensions: usize,
) -> Result<()> {
    check_dimension(&vector, dimensions)?;

    let name = name.to_string();
    db.with_connection(move |conn| {
        let updated = conn.execute(
            "UPDATE entities SET embedding = ?1 WHERE kind = ?2 AND name = ?3",
            params![encode_embedding(&vector), kind.as_str(), name],
        )?;
        if updated == 0 {
            return Err(PraxisError::not_found(kind, name));
        }
        Ok(())
    })
    .await
}

/// The k entities of a kind most similar to the query vector, ordered by
/// score descending, ties by name ascending. Entities without an embedding
/// are excluded entirely; `min_score` filters the rest.
pub async fn nearest(
    db: &Db,
    kind: EntityKind,
    query: Vec<f32>,
    k: usize,
    min_score: f32,
    dimensions: usize,
) -> Result<Vec<(Entity, f32)>> {
    check_dimension(&query, dimensions)?;

    let rows = db
        .with_connection(move |conn| {
            let sql = format!(
                "SELECT {}, embedding FROM entities \
                 WHERE kind = ?1 AND embedding IS NOT NULL",
                ENTITY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params![kind.as_str()])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let raw = EntityRow::read(row)?;
                let blob: Vec<u8> = row.get(6)?;
                out.push((raw.into_entity()?, blob));
            }
            Ok(out)
        })
        .await?;

    let mut scored: Vec<(Entity, f32)> = Vec::new();
    for (entity, blob) in rows {
        let embedding = match parse_embedding(&blob) {
            Some(e) => e,
            None => {
                log::warn!("{} \"{}\" has a malformed embedding BLOB", entity.kind, entity.name);
                continue;
            }
        };
        if embedding.len() != dimensions {
            // Stored under an older index configuration; skip rather than
            // compare across dimensions
            continue;
        }
        let score = cosine_similarity(&query, &embedding);
        if score < min_score {
            continue;
        }
        scored.push((entity, score));
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.name.cmp(&b.0.name))
    });
    scored.truncate(k);

    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrate;
    use crate::graph::test_support::*;
    use std::path::Path;
    use tempfile::TempDir;

    const DIMS: usize = 4;

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

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_magnitude() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_cosine_similarity_magnitude_independent() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![2.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_embedding_blob_round_trip() {
        let vector = vec![1.0f32, -2.5, 3.25, 0.0];
        let blob = encode_embedding(&vector);
        assert_eq!(blob.len(), 16);
        let parsed = parse_embedding(&blob).unwrap();
        assert_eq!(parsed, vector);
    }

    #[test]
    fn test_parse_embedding_invalid_length() {
        assert!(parse_embedding(&[0u8, 1, 2, 3, 4]).is_none());
        assert_eq!(parse_embedding(&[]).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_upsert_missing_entity_is_not_found() {
        let (db, _temp) = setup_test_db().await;
        let err = upsert_embedding(&db, EntityKind::Practice, "ghost", vec![0.0; DIMS], DIMS)
            .await
            .unwrap_err();
        assert!(matches!(err, PraxisError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_upsert_does_not_bump_version() {
        let (db, _temp) = setup_test_db().await;
        add_practice(&db, "Daily Scrum").await;

        upsert_embedding(&db, EntityKind::Practice, "Daily Scrum", vec![1.0; DIMS], DIMS)
            .await
            .unwrap();

        let entity = crate::store::get(&db, EntityKind::Practice, "Daily Scrum")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entity.version, 1);
    }

    #[tokio::test]
    async fn test_nearest_orders_and_breaks_ties_by_name() {
        let (db, _temp) = setup_test_db().await;
        add_practice(&db, "Pair Programming").await;
        add_practice(&db, "Daily Scrum").await;
        add_practice(&db, "Code Review").await;
        add_practice(&db, "No Embedding Yet").await;

        upsert_embedding(&db, EntityKind::Practice, "Daily Scrum", vec![1.0, 0.0, 0.0, 0.0], DIMS)
            .await
            .unwrap();
        // Same score as Daily Scrum: tie broken by name ascending
        upsert_embedding(&db, EntityKind::Practice, "Code Review", vec![2.0, 0.0, 0.0, 0.0], DIMS)
            .await
            .unwrap();
        upsert_embedding(
            &db,
            EntityKind::Practice,
            "Pair Programming",
            vec![0.0, 1.0, 0.0, 0.0],
            DIMS,
        )
        .await
        .unwrap();

        let results = nearest(&db, EntityKind::Practice, vec![1.0, 0.0, 0.0, 0.0], 10, -1.0, DIMS)
            .await
            .unwrap();
        let names: Vec<_> = results.iter().map(|(e, _)| e.name.as_str()).collect();
        // Unembedded practice excluded, not scored zero
        assert_eq!(names, vec!["Code Review", "Daily Scrum", "Pair Programming"]);
        assert!(results[0].1 > results[2].1);
    }

    #[tokio::test]
    async fn test_nearest_applies_min_score_and_k() {
        let (db, _temp) = setup_test_db().await;
        add_practice(&db, "A").await;
        add_practice(&db, "B").await;
        upsert_embedding(&db, EntityKind::Practice, "A", vec![1.0, 0.0, 0.0, 0.0], DIMS)
            .await
            .unwrap();
        upsert_embedding(&db, EntityKind::Practice, "B", vec![0.0, 1.0, 0.0, 0.0], DIMS)
            .await
            .unwrap();

        let results = nearest(&db, EntityKind::Practice, vec![1.0, 0.0, 0.0, 0.0], 10, 0.5, DIMS)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.name, "A");

        let capped = nearest(&db, EntityKind::Practice, vec![1.0, 0.0, 0.0, 0.0], 1, -1.0, DIMS)
            .await
            .unwrap();
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_any_work() {
        let (db, _temp) = setup_test_db().await;
        add_practice(&db, "Daily Scrum").await;

        let err = upsert_embedding(&db, EntityKind::Practice, "Daily Scrum", vec![1.0; 3], DIMS)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PraxisError::DimensionMismatch { expected: 4, actual: 3 }
        ));

        let err = nearest(&db, EntityKind::Practice, vec![1.0; 5], 10, 0.0, DIMS)
            .await
            .unwrap_err();
        assert!(matches!(err, PraxisError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_nearest_empty_store_is_empty() {
        let (db, _temp) = setup_test_db().await;
        let results = nearest(&db, EntityKind::Rule, vec![0.5; DIMS], 5, 0.0, DIMS)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
