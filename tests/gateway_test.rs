//! Tests for [`Gateway`]: cache-then-rotate resolution, stats, and
//! snapshot persistence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mimir::{
    CompletionProvider, Gateway, JsonFileStore, Mimir, Origin, RateLimit, Result,
};

struct Counting {
    name: &'static str,
    calls: AtomicUsize,
}

impl Counting {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for Counting {
    fn name(&self) -> &str {
        self.name
    }

    async fn issue(&self, prompt: &str, _timeout: Duration) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}#{n}: {prompt}", self.name))
    }
}

/// Stalls on its first call only.
struct StallsOnce {
    stalled: AtomicBool,
}

#[async_trait]
impl CompletionProvider for StallsOnce {
    fn name(&self) -> &str {
        "stalls-once"
    }

    async fn issue(&self, prompt: &str, _timeout: Duration) -> Result<String> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(format!("answer: {prompt}"))
    }
}

fn gateway_with(provider: Arc<Counting>, limit: RateLimit) -> Gateway<String> {
    Mimir::builder::<String>()
        .provider(provider, limit)
        .build()
        .unwrap()
}

async fn resolve(gateway: &Gateway<String>, key: &str) -> mimir::Resolved<String> {
    gateway
        .resolve(key, &format!("prompt for {key}"), |c| c.text.clone())
        .await
}

#[tokio::test]
async fn miss_then_hit() {
    let p = Counting::new("p");
    let gateway = gateway_with(p.clone(), RateLimit::Unbounded);

    let first = resolve(&gateway, "Is water wet?").await;
    assert_eq!(
        first.origin,
        Origin::Remote {
            provider: "p".to_string()
        }
    );
    assert_eq!(first.value, "p#0: prompt for Is water wet?");

    let second = resolve(&gateway, "  is WATER wet?  ").await;
    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(second.value, first.value);

    assert_eq!(p.calls(), 1);
    assert_eq!(gateway.cache().size(), 1);
}

#[tokio::test]
async fn interpret_runs_only_on_miss() {
    let gateway = gateway_with(Counting::new("p"), RateLimit::Unbounded);
    let interpreted = AtomicUsize::new(0);

    for _ in 0..3 {
        gateway
            .resolve("same", "prompt", |c| {
                interpreted.fetch_add(1, Ordering::SeqCst);
                c.text.to_uppercase()
            })
            .await;
    }
    assert_eq!(interpreted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fallback_answers_are_not_cached_by_default() {
    let gateway = Mimir::builder::<String>().build().unwrap();

    let resolved = resolve(&gateway, "anything").await;
    assert_eq!(
        resolved.origin,
        Origin::LocalFallback {
            provider: "local".to_string()
        }
    );
    assert!(resolved.origin.is_fallback());
    assert!(resolved.value.starts_with("[Local Analysis]"));
    assert_eq!(gateway.cache().size(), 0);

    // Asking again still misses.
    let again = resolve(&gateway, "anything").await;
    assert!(again.origin.is_fallback());
}

#[tokio::test]
async fn fallback_answers_cached_when_enabled() {
    let gateway = Mimir::builder::<String>()
        .cache_fallback_responses(true)
        .build()
        .unwrap();

    resolve(&gateway, "anything").await;
    let again = resolve(&gateway, "anything").await;
    assert_eq!(again.origin, Origin::Cache);
}

#[tokio::test]
async fn cached_keys_do_not_spend_budget() {
    let p = Counting::new("p");
    let gateway = gateway_with(p.clone(), RateLimit::PerWindow(1));

    resolve(&gateway, "one").await;
    for _ in 0..5 {
        assert_eq!(resolve(&gateway, "one").await.origin, Origin::Cache);
    }
    // Budget is spent, a new key falls back.
    assert!(resolve(&gateway, "two").await.origin.is_fallback());
    assert_eq!(p.calls(), 1);
}

#[tokio::test]
async fn gateway_cache_evicts_least_recent() {
    let p = Counting::new("p");
    let gateway = Mimir::builder::<String>()
        .provider(p.clone(), RateLimit::Unbounded)
        .max_cache_size(2)
        .build()
        .unwrap();

    resolve(&gateway, "a").await;
    resolve(&gateway, "b").await;
    resolve(&gateway, "a").await;
    resolve(&gateway, "c").await;

    assert_eq!(gateway.cache().size(), 2);
    assert!(gateway.cache().contains("a"));
    assert!(!gateway.cache().contains("b"));

    assert!(!matches!(resolve(&gateway, "b").await.origin, Origin::Cache));
    assert_eq!(p.calls(), 4);
}

#[tokio::test]
async fn stats_report_cache_and_budgets() {
    let gateway = Mimir::builder::<String>()
        .provider(Counting::new("a"), RateLimit::PerWindow(3))
        .provider(Counting::new("b"), RateLimit::Unbounded)
        .max_cache_size(10)
        .build()
        .unwrap();

    resolve(&gateway, "x").await;
    let stats = gateway.stats();

    assert_eq!(stats.cache_size, 1);
    assert_eq!(stats.cache_capacity, 10);
    assert_eq!(stats.next_provider.as_deref(), Some("b"));
    assert_eq!(stats.local_provider, "local");
    assert_eq!(stats.budgets.len(), 2);
    assert_eq!(stats.budgets[0].requests_used, 1);
    assert_eq!(stats.budgets[1].requests_limit, RateLimit::Unbounded);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["budgets"][1]["requests_limit"], "unbounded");
    assert_eq!(json["budgets"][0]["requests_limit"], 3);
}

#[tokio::test]
async fn persist_and_warm_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("cache.json"));

    let first = gateway_with(Counting::new("p"), RateLimit::Unbounded);
    resolve(&first, "alpha").await;
    resolve(&first, "beta").await;
    assert_eq!(first.persist(&store).await.unwrap(), 2);
    assert!(!store.path().with_file_name("cache.json.tmp").exists());

    let p = Counting::new("p");
    let second = gateway_with(p.clone(), RateLimit::Unbounded);
    let entries = store.load_all::<String>().await.unwrap();
    assert_eq!(second.warm(entries), 2);

    let alpha = resolve(&second, "ALPHA").await;
    assert_eq!(alpha.origin, Origin::Cache);
    assert_eq!(alpha.value, "p#0: prompt for alpha");
    assert_eq!(p.calls(), 0);
}

#[tokio::test]
async fn warm_keeps_snapshot_recency_order() {
    let source = gateway_with(Counting::new("p"), RateLimit::Unbounded);
    resolve(&source, "old").await;
    resolve(&source, "new").await;

    let target = Mimir::builder::<String>()
        .max_cache_size(1)
        .build()
        .unwrap();
    target.warm(source.cache().snapshot());
    assert!(target.cache().contains("new"));
    assert!(!target.cache().contains("old"));
}

#[tokio::test]
async fn file_round_trip_keeps_recency_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("cache.json"));

    let source = gateway_with(Counting::new("p"), RateLimit::Unbounded);
    for key in ["alpha", "beta", "gamma", "delta"] {
        resolve(&source, key).await;
    }
    // Touch "alpha" so it is the most recent entry.
    assert_eq!(resolve(&source, "alpha").await.origin, Origin::Cache);
    source.persist(&store).await.unwrap();

    let entries = store.load_all::<String>().await.unwrap();
    assert_eq!(entries, source.cache().snapshot());

    let target = Mimir::builder::<String>()
        .max_cache_size(2)
        .build()
        .unwrap();
    assert_eq!(target.warm(entries), 2);
    assert!(target.cache().contains("alpha"));
    assert!(target.cache().contains("delta"));
    assert!(!target.cache().contains("gamma"));
    assert!(!target.cache().contains("beta"));
}

#[tokio::test]
async fn warm_reports_only_resident_entries() {
    let source = gateway_with(Counting::new("p"), RateLimit::Unbounded);
    for key in ["a", "b", "c"] {
        resolve(&source, key).await;
    }

    let target = Mimir::builder::<String>()
        .max_cache_size(2)
        .build()
        .unwrap();
    assert_eq!(target.warm(source.cache().snapshot()), 2);
    assert_eq!(target.cache().size(), 2);
    assert_eq!(target.warm(Vec::new()), 0);
}

#[tokio::test(start_paused = true)]
async fn dropped_resolve_charges_budget_once_and_caches_nothing() {
    let gateway = Mimir::builder::<String>()
        .provider(
            Arc::new(StallsOnce {
                stalled: AtomicBool::new(false),
            }),
            RateLimit::PerWindow(5),
        )
        .build()
        .unwrap();

    let abandoned = tokio::time::timeout(
        Duration::from_secs(1),
        gateway.resolve("question", "question", |c| c.text.clone()),
    )
    .await;
    assert!(abandoned.is_err());
    assert_eq!(gateway.cache().size(), 0);
    assert_eq!(gateway.rotator().budgets()[0].requests_used, 1);

    let resolved = gateway
        .resolve("question", "question", |c| c.text.clone())
        .await;
    assert_eq!(
        resolved.origin,
        Origin::Remote {
            provider: "stalls-once".to_string()
        }
    );
    assert_eq!(resolved.value, "answer: question");
    assert_eq!(gateway.cache().size(), 1);
    assert_eq!(gateway.rotator().budgets()[0].requests_used, 2);
}

#[tokio::test]
async fn missing_snapshot_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStore::new(dir.path().join("absent.json"));
    let entries = store.load_all::<String>().await.unwrap();
    assert!(entries.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolves_share_one_gateway() {
    let p = Counting::new("p");
    let gateway = Arc::new(gateway_with(p.clone(), RateLimit::Unbounded));

    let handles: Vec<_> = (0..32)
        .map(|i| {
            let gateway = Arc::clone(&gateway);
            tokio::spawn(async move {
                let key = format!("key-{}", i % 8);
                gateway.resolve(&key, &key, |c| c.text.clone()).await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(gateway.cache().size(), 8);
    // Concurrent misses on one key may each reach a provider.
    assert!(p.calls() >= 8);
    assert!(p.calls() <= 32);
}
