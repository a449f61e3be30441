//! Vector store properties: search ordering, threshold filtering,
//! determinism, and persistence round trips.

use std::collections::HashMap;

use proptest::prelude::*;
use ragmark_core::document::StoreRecord;
use ragmark_core::error::RagError;
use ragmark_core::memory::InMemoryVectorStore;
use ragmark_core::persist::PersistentVectorStore;
use ragmark_core::vectorstore::VectorStore;

fn record(id: &str, vector: Vec<f32>) -> StoreRecord {
    StoreRecord {
        chunk_id: id.to_string(),
        vector,
        text: format!("text for {id}"),
        metadata: HashMap::from([("source".to_string(), format!("{id}.txt"))]),
    }
}

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-8 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

fn arb_record(dim: usize) -> impl Strategy<Value = StoreRecord> {
    ("[a-z]{3,8}", arb_normalized_embedding(dim)).prop_map(|(id, vector)| record(&id, vector))
}

mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any set of stored records, search returns results in
        /// descending score order, bounded by top_k, and every result
        /// clears the threshold when one is set.
        #[test]
        fn ordered_bounded_and_filtered(
            records in proptest::collection::vec(arb_record(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            top_k in 1usize..25,
            threshold in proptest::option::of(-1.0f32..1.0f32),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, unique_count) = rt.block_on(async {
                let store = InMemoryVectorStore::new();
                let mut seen = std::collections::HashSet::new();
                let unique: Vec<StoreRecord> =
                    records.into_iter().filter(|r| seen.insert(r.chunk_id.clone())).collect();
                let count = unique.len();
                store.upsert(unique).await.unwrap();
                (store.search(&query, top_k, threshold).await.unwrap(), count)
            });

            prop_assert!(results.len() <= top_k);
            prop_assert!(results.len() <= unique_count);

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }

            if let Some(threshold) = threshold {
                for result in &results {
                    prop_assert!(result.score >= threshold);
                }
            }
        }
    }
}

#[tokio::test]
async fn search_is_deterministic() {
    let store = InMemoryVectorStore::new();
    store
        .upsert(vec![
            record("a", vec![0.9, 0.1, 0.0]),
            record("b", vec![0.5, 0.5, 0.0]),
            record("c", vec![0.1, 0.9, 0.0]),
        ])
        .await
        .unwrap();

    let query = [0.7f32, 0.3, 0.0];
    let first = store.search(&query, 3, None).await.unwrap();
    let second = store.search(&query, 3, None).await.unwrap();

    let ids = |r: &[ragmark_core::ScoredChunk]| -> Vec<String> {
        r.iter().map(|s| s.chunk_id.clone()).collect()
    };
    let scores = |r: &[ragmark_core::ScoredChunk]| -> Vec<f32> {
        r.iter().map(|s| s.score).collect()
    };
    assert_eq!(ids(&first), ids(&second));
    assert_eq!(scores(&first), scores(&second));
}

#[tokio::test]
async fn threshold_never_admits_low_scores() {
    let store = InMemoryVectorStore::new();
    store
        .upsert(vec![
            record("exact", vec![1.0, 0.0]),
            record("close", vec![0.95, 0.31224989]),
            record("far", vec![0.0, 1.0]),
        ])
        .await
        .unwrap();

    let results = store.search(&[1.0, 0.0], 5, Some(0.9)).await.unwrap();
    assert!(results.len() < 5);
    for result in &results {
        assert!(result.score >= 0.9);
    }
    assert!(results.iter().all(|r| r.chunk_id != "far"));
}

#[tokio::test]
async fn persistent_round_trip_preserves_results() {
    let dir = tempfile::tempdir().unwrap();

    let records = vec![
        record("a", vec![1.0, 0.0, 0.0]),
        record("b", vec![0.8, 0.6, 0.0]),
        record("c", vec![0.0, 1.0, 0.0]),
    ];

    let store = PersistentVectorStore::new(dir.path());
    store.rebuild("mock-embedding", records).await.unwrap();
    let query = [0.9f32, 0.2, 0.1];
    let before = store.search(&query, 3, None).await.unwrap();

    // A fresh handle simulates a new process attaching to the same files.
    let reopened = PersistentVectorStore::new(dir.path());
    assert!(reopened.exists());
    reopened.load().await.unwrap();
    let after = reopened.search(&query, 3, None).await.unwrap();

    assert_eq!(before.len(), after.len());
    for (x, y) in before.iter().zip(after.iter()) {
        assert_eq!(x.chunk_id, y.chunk_id);
        assert_eq!(x.text, y.text);
        assert_eq!(x.source, y.source);
        assert_eq!(x.score, y.score);
    }

    let manifest = reopened.manifest().await.unwrap();
    assert_eq!(manifest.embedding_model, "mock-embedding");
    assert_eq!(manifest.dimensions, 3);
    assert_eq!(manifest.records, 3);
}

#[tokio::test]
async fn loading_a_missing_store_is_store_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = PersistentVectorStore::new(dir.path().join("empty"));
    assert!(!store.exists());
    let err = store.load().await.unwrap_err();
    assert!(matches!(err, RagError::StoreNotFound { .. }));
}

#[tokio::test]
async fn searching_before_load_is_store_not_ready() {
    let dir = tempfile::tempdir().unwrap();
    let store = PersistentVectorStore::new(dir.path());
    let err = store.search(&[1.0, 0.0], 1, None).await.unwrap_err();
    assert!(matches!(err, RagError::StoreNotReady));
}

#[tokio::test]
async fn concurrent_build_is_rejected_by_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(dir.path().join(".build.lock"), b"").unwrap();

    let store = PersistentVectorStore::new(dir.path());
    let err = store.rebuild("mock-embedding", vec![record("a", vec![1.0])]).await.unwrap_err();
    assert!(matches!(err, RagError::StoreError { .. }));
}

#[tokio::test]
async fn rebuild_rejects_mixed_dimensions() {
    let dir = tempfile::tempdir().unwrap();
    let store = PersistentVectorStore::new(dir.path());
    let err = store
        .rebuild(
            "mock-embedding",
            vec![record("a", vec![1.0, 0.0]), record("b", vec![1.0, 0.0, 0.0])],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::DimensionMismatch { expected: 2, got: 3 }));
}
