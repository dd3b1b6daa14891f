use std::sync::Arc;

use bytes::Bytes;
use ddc::Cache;
use ddc_backend::{Backend, InFlightCounter};
use ddc_config::{BackendGraph, build};
use ddc_core::{CacheKey, Deriver};

fn key(s: &str) -> CacheKey {
    CacheKey::new(s).unwrap()
}

struct Fixed(&'static [u8]);

impl Deriver for Fixed {
    fn name(&self) -> &str {
        "T"
    }
    fn version(&self) -> &str {
        "1"
    }
    fn key_suffix(&self) -> &str {
        "x"
    }
    fn build(&self, out: &mut Vec<u8>) -> bool {
        out.extend_from_slice(self.0);
        true
    }
}

#[tokio::test]
async fn scenario_a_sync_miss_then_hit() {
    let graph = BackendGraph::AsyncPut {
        inner: Box::new(BackendGraph::KeyLength {
            inner: Box::new(BackendGraph::Memory { filename: None }),
            length: 120,
        }),
    };
    let counter = InFlightCounter::new();
    let built = build(graph, counter.clone()).await.unwrap();
    let cache = Cache::new(built.root.unwrap(), counter);

    let deriver = Fixed(&[1, 2, 3]);
    assert_eq!(cache.get_sync(&deriver).await.as_deref(), Some(&[1, 2, 3][..]));
    assert_eq!(cache.get_sync(&deriver).await.as_deref(), Some(&[1, 2, 3][..]));
}

#[tokio::test]
async fn scenario_c_hierarchical_backfill_through_the_cache_facade() {
    let graph = BackendGraph::Hierarchical {
        inner: vec![BackendGraph::Memory { filename: None }, BackendGraph::Memory { filename: None }],
    };
    let counter = InFlightCounter::new();
    let built = build(graph, counter.clone()).await.unwrap();
    let cache = Cache::new(built.root.unwrap(), counter);

    assert_eq!(cache.get_sync_by_key(&key("K")).await, None);
    cache.put(&key("K"), Bytes::from_static(&[0x42; 16]), true).await.unwrap();
    cache.wait_for_quiescence(false).await;
    assert_eq!(cache.get_sync_by_key(&key("K")).await.as_deref(), Some(&[0x42; 16][..]));
}

#[tokio::test]
async fn scenario_e_pak_write_close_read_through_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let pak_path = dir.path().join("session.pak");

    let graph = BackendGraph::WritePak { filename: pak_path.to_string_lossy().into_owned(), compressed: false };
    let counter = InFlightCounter::new();
    let built = build(graph, counter.clone()).await.unwrap();
    let write_pak = built.write_pak.clone();
    let cache = Cache::new(built.root.unwrap(), counter).with_pak_lifecycle(write_pak, Vec::new());

    cache.put(&key("A"), Bytes::from_static(&[1]), true).await.unwrap();
    cache.put(&key("C"), Bytes::from_static(&[3, 3, 3]), true).await.unwrap();
    cache.put(&key("B"), Bytes::from_static(&[2, 2]), true).await.unwrap();

    cache.wait_for_quiescence(true).await;

    let reader = ddc_pak::ReadPak::open(&pak_path).unwrap();
    assert_eq!(reader.get(&key("A")).await.unwrap().as_deref(), Some(&[1][..]));
    assert_eq!(reader.get(&key("B")).await.unwrap().as_deref(), Some(&[2, 2][..]));
    assert_eq!(reader.get(&key("C")).await.unwrap().as_deref(), Some(&[3, 3, 3][..]));

    let keys: Vec<_> = reader.keys().map(|k| k.as_str().to_string()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[tokio::test]
async fn scenario_f_rollup_with_mixed_hits_and_misses() {
    let graph = BackendGraph::Memory { filename: None };
    let counter = InFlightCounter::new();
    let built = build(graph, counter.clone()).await.unwrap();
    let cache = Cache::new(built.root.unwrap(), counter);

    cache.put(&key("M1"), Bytes::from_static(&[1]), true).await.unwrap();
    cache.put(&key("M3"), Bytes::from_static(&[3]), true).await.unwrap();

    let rollup = cache.rollup();
    let h1 = rollup.add_member(key("M1"));
    let h2 = rollup.add_member(key("M2"));
    let h3 = rollup.add_member(key("M3"));
    rollup.close().await;

    cache.wait(h1).await;
    cache.wait(h2).await;
    cache.wait(h3).await;
    assert_eq!(cache.get_async_result(h1).await.as_deref(), Some(&[1][..]));
    assert_eq!(cache.get_async_result(h2).await, None);
    assert_eq!(cache.get_async_result(h3).await.as_deref(), Some(&[3][..]));

    assert!(!cache.exists(&key("ROLLUP_M1M2M3")).await);
}
