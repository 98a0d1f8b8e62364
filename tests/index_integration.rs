mod common;

use common::{write_corpus, KeywordEmbedder, CORPUS_CSV};
use ragsql::config::Config;
use ragsql::embedding::EmbeddingProvider;
use ragsql::index::{DistanceMetric, IndexSnapshot};
use ragsql::worker::load_index;
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.corpus.path = write_corpus(dir.path(), CORPUS_CSV);
    config.index.snapshot_path = dir.path().join("index.sqlite");
    config.index.reuse_snapshot = true;
    config
}

#[test]
fn test_load_index_builds_and_saves_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let provider = Arc::new(KeywordEmbedder::new());

    let index = load_index(&config, provider.clone(), false).unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(index.model_name(), "keyword-test");
    assert_eq!(provider.batches(), 1);

    let snapshot = IndexSnapshot::open(&config.index.snapshot_path).unwrap();
    let info = snapshot.info().unwrap().expect("snapshot should exist");
    assert_eq!(info.count, 3);
    assert_eq!(info.dimension, provider.dimension());
    assert_eq!(info.metric, DistanceMetric::Cosine);
}

#[test]
fn test_snapshot_reused_for_unchanged_corpus() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let provider = Arc::new(KeywordEmbedder::new());

    let built = load_index(&config, provider.clone(), false).unwrap();
    let reused = load_index(&config, provider.clone(), false).unwrap();
    assert_eq!(provider.batches(), 1, "second load should not re-embed");

    let ids = |hits: Vec<ragsql::index::Neighbor>| -> Vec<String> {
        hits.into_iter().map(|n| n.example.id).collect()
    };
    assert_eq!(
        ids(built.query("sum col", "t(x int)", 3).unwrap()),
        ids(reused.query("sum col", "t(x int)", 3).unwrap())
    );
}

#[test]
fn test_changed_corpus_or_force_rebuilds() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let provider = Arc::new(KeywordEmbedder::new());

    load_index(&config, provider.clone(), false).unwrap();
    load_index(&config, provider.clone(), true).unwrap();
    assert_eq!(provider.batches(), 2);

    let grown = format!(
        "{}count people,people(name text),SELECT COUNT(*) FROM people;,counts people\n",
        CORPUS_CSV
    );
    write_corpus(dir.path(), &grown);
    let index = load_index(&config, provider.clone(), false).unwrap();
    assert_eq!(provider.batches(), 3);
    assert_eq!(index.len(), 4);
}

#[test]
fn test_reuse_disabled_always_rebuilds() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.index.reuse_snapshot = false;
    let provider = Arc::new(KeywordEmbedder::new());

    load_index(&config, provider.clone(), false).unwrap();
    load_index(&config, provider.clone(), false).unwrap();
    assert_eq!(provider.batches(), 2);
}

#[test]
fn test_missing_corpus_is_an_error() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.corpus.path = dir.path().join("absent.csv");

    assert!(load_index(&config, Arc::new(KeywordEmbedder::new()), false).is_err());
}

#[test]
fn test_unwritable_snapshot_path_does_not_block_loading() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file").unwrap();
    let provider = Arc::new(KeywordEmbedder::new());

    for reuse in [false, true] {
        let mut config = config(&dir);
        config.index.snapshot_path = blocker.join("index.sqlite");
        config.index.reuse_snapshot = reuse;

        let index = load_index(&config, provider.clone(), false).unwrap();
        assert_eq!(index.len(), 3);
    }
    assert_eq!(provider.batches(), 2);
}
