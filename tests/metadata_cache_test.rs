//! Tests for the GGUF metadata cache.

mod common;

use std::sync::Arc;

use common::{GgufWriter, llama_header};
use mimir::{MetadataCache, MimirError};

#[tokio::test]
async fn extracts_llama_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.gguf");
    llama_header(2048).write(&path);

    let cache = MetadataCache::new();
    let meta = cache.get_metadata(&path).await.unwrap();

    assert_eq!(meta.file_path, path);
    assert_eq!(meta.architecture.as_deref(), Some("llama"));
    assert_eq!(meta.n_ctx_train, Some(2048));
    assert_eq!(meta.n_layer, Some(22));
    assert_eq!(meta.n_head_kv, Some(4));
    assert_eq!(meta.head_k_size, Some(64));
    assert_eq!(meta.head_v_size, Some(64));
    assert_eq!(meta.bos_token, "<s>");
    assert_eq!(meta.eos_token, "</s>");
    assert!(meta.chat_template.as_deref().unwrap().contains("messages"));
    assert_eq!(
        meta.file_size_bytes,
        std::fs::metadata(&path).unwrap().len()
    );
}

#[tokio::test]
async fn second_lookup_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tiny.gguf");
    llama_header(2048).write(&path);

    let cache = MetadataCache::new();
    let first = cache.get_metadata(&path).await.unwrap();
    let second = cache.get_metadata(&path).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn missing_file_fails_every_time() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.gguf");
    let cache = MetadataCache::new();

    for _ in 0..3 {
        let err = cache.get_metadata(&path).await.unwrap_err();
        assert!(err.is_not_found(), "expected NotFound, got {err:?}");
    }
    assert_eq!(cache.stats().await.entry_count, 0);

    // Once the file appears the next call succeeds.
    llama_header(1024).write(&path);
    assert_eq!(
        cache.get_metadata(&path).await.unwrap().n_ctx_train,
        Some(1024)
    );
}

#[tokio::test]
async fn invalid_file_is_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.gguf");
    std::fs::write(&path, b"not a gguf file").unwrap();

    let cache = MetadataCache::new();
    let err = cache.get_metadata(&path).await.unwrap_err();
    assert!(matches!(err, MimirError::InvalidGguf(_)));
    assert_eq!(cache.stats().await.entry_count, 0);
}

#[tokio::test]
async fn stats_list_absolute_paths_and_clear_empties() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.gguf");
    let b = dir.path().join("b.gguf");
    llama_header(2048).write(&a);
    GgufWriter::new()
        .string("general.architecture", "qwen3")
        .write(&b);

    let cache = MetadataCache::new();
    cache.get_metadata(&b).await.unwrap();
    cache.get_metadata(&a).await.unwrap();

    let stats = cache.stats().await;
    assert_eq!(stats.entry_count, 2);
    assert_eq!(stats.cached_paths, vec![a.clone(), b.clone()]);
    assert!(stats.cached_paths.iter().all(|p| p.is_absolute()));

    cache.clear();
    let stats = cache.stats().await;
    assert_eq!(stats.entry_count, 0);
    assert!(stats.cached_paths.is_empty());
}

#[tokio::test]
async fn cached_metadata_is_kept_after_file_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.gguf");
    llama_header(2048).write(&path);

    let cache = MetadataCache::new();
    cache.get_metadata(&path).await.unwrap();

    llama_header(8192).write(&path);
    assert_eq!(
        cache.get_metadata(&path).await.unwrap().n_ctx_train,
        Some(2048)
    );

    cache.invalidate(&path).await.unwrap();
    assert_eq!(
        cache.get_metadata(&path).await.unwrap().n_ctx_train,
        Some(8192)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_the_result() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.gguf");
    llama_header(2048).write(&path);

    let cache = Arc::new(MetadataCache::new());
    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let path = path.clone();
            tokio::spawn(async move { cache.get_metadata(path).await })
        })
        .collect();

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap().unwrap());
    }
    assert!(results.iter().all(|m| Arc::ptr_eq(m, &results[0])));
    assert_eq!(cache.stats().await.entry_count, 1);
}
