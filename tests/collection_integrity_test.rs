//! Collection fingerprint integrity at real model dimensionalities: a
//! collection fingerprinted for one model never accepts vectors from
//! another, and failed writes leave no partial state.

use lodestone::embedding::{EmbeddingProvider, HashEmbeddingProvider};
use lodestone::vector::{EmbeddedDocument, Similarity, VectorStore};
use serde_json::json;
use tempfile::TempDir;

fn doc(id: &str, vector: Vec<f32>) -> EmbeddedDocument {
    EmbeddedDocument {
        id: id.to_string(),
        digest: id.to_string(),
        metadata: json!({}),
        vector,
    }
}

#[tokio::test]
async fn gemma_vectors_never_enter_a_qwen_collection() {
    let dir = TempDir::new().unwrap();
    let store = VectorStore::open(dir.path()).unwrap();
    store
        .create_collection("primary", "qwen3", 2560, Similarity::Cosine)
        .unwrap();

    // Seed one legitimate document.
    let qwen = HashEmbeddingProvider::new(2560);
    let seed = qwen
        .embed(&["seed document".to_string()], "qwen3", false)
        .await
        .unwrap();
    store
        .insert("primary", "qwen3", vec![doc("seed", seed[0].clone())])
        .unwrap();
    assert_eq!(store.count("primary").unwrap(), 1);

    // Embed with the smaller model and try to store into the qwen
    // collection: the write must fail and the count must not move.
    let gemma = HashEmbeddingProvider::new(768);
    let wrong = gemma.embed(&["x".to_string()], "gemma3", false).await.unwrap();
    let err = store
        .insert("primary", "gemma3", vec![doc("wrong", wrong[0].clone())])
        .unwrap_err();
    assert_eq!(err.code(), "collection_incompatible");
    assert_eq!(store.count("primary").unwrap(), 1);

    // Same model id but truncated vectors are equally rejected.
    let err = store
        .insert("primary", "qwen3", vec![doc("short", vec![0.0; 768])])
        .unwrap_err();
    assert_eq!(err.code(), "dimension_mismatch");
    assert_eq!(store.count("primary").unwrap(), 1);
}

#[tokio::test]
async fn dimensional_integrity_survives_insert_delete_compact() {
    let dir = TempDir::new().unwrap();
    let store = VectorStore::open(dir.path()).unwrap();
    store
        .create_collection("work", "gemma3", 768, Similarity::Cosine)
        .unwrap();
    let embedder = HashEmbeddingProvider::new(768);

    let texts: Vec<String> = (0..6).map(|i| format!("document number {i}")).collect();
    let vectors = embedder.embed(&texts, "gemma3", false).await.unwrap();
    let documents: Vec<EmbeddedDocument> = vectors
        .into_iter()
        .enumerate()
        .map(|(i, v)| doc(&format!("d{i}"), v))
        .collect();
    // Duplicate of d0 for compact to find.
    let duplicate = doc("d0-copy", embedder.embed_one("document number 0"));

    store.insert("work", "gemma3", documents).unwrap();
    store.insert("work", "gemma3", vec![duplicate]).unwrap();
    assert_eq!(store.count("work").unwrap(), 7);

    store.remove("work", &["d3".to_string()]).unwrap();
    let compacted = store.compact("work").unwrap();
    assert!(compacted.contains(&"d0-copy".to_string()));
    assert_eq!(store.count("work").unwrap(), 5);

    // Every surviving document still searches at full dimensionality.
    let query = embedder.embed_one("document number 5");
    let hits = store.search("work", &query, 10, 0.0).unwrap();
    assert_eq!(hits.len(), 5);
    assert_eq!(hits[0].doc_id, "d5");

    // A fresh handle over the persisted state agrees.
    drop(store);
    let reopened = VectorStore::open(dir.path()).unwrap();
    assert_eq!(reopened.count("work").unwrap(), 5);
    let hits = reopened.search("work", &query, 10, 0.0).unwrap();
    assert_eq!(hits[0].doc_id, "d5");
}
