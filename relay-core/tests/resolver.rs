use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use proptest::prelude::*;

use relay_core::{
    MemoryTenantStore, ResolverOptions, TenantHint, TenantId, TenantRecord, TenantResolver,
    TenantStore,
};

fn seeded_store() -> MemoryTenantStore {
    MemoryTenantStore::with_records([
        TenantRecord::new("acme", "Acme")
            .with_domain("acme.test")
            .with_domain("*.acme.test")
            .with_features(["dashboard", "campaigns"]),
        TenantRecord::new("globex", "Globex").with_domain("globex.test"),
    ])
}

fn resolver(store: impl TenantStore + 'static) -> TenantResolver {
    TenantResolver::new(Arc::new(store), ResolverOptions::default())
}

/// Store that can be switched off and counts its lookups.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryTenantStore,
    down: AtomicBool,
    hang: AtomicBool,
    calls: AtomicUsize,
}

impl FlakyStore {
    async fn gate(&self) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait]
impl TenantStore for FlakyStore {
    async fn get(&self, id: &TenantId) -> anyhow::Result<Option<TenantRecord>> {
        self.gate().await?;
        self.inner.get(id).await
    }

    async fn find_by_domain(&self, host: &str) -> anyhow::Result<Option<TenantRecord>> {
        self.gate().await?;
        self.inner.find_by_domain(host).await
    }

    async fn wildcard_domains(&self) -> anyhow::Result<Vec<(String, TenantId)>> {
        self.gate().await?;
        self.inner.wildcard_domains().await
    }

    async fn list(&self) -> anyhow::Result<Vec<TenantRecord>> {
        self.gate().await?;
        self.inner.list().await
    }
}

#[tokio::test]
async fn known_domain_resolves_to_its_tenant() {
    let r = resolver(seeded_store());

    let ctx = r.resolve(TenantHint::host("ACME.test:443")).await;
    assert_eq!(ctx.tenant_id.as_str(), "acme");
    assert!(ctx.has_feature("campaigns"));
    assert!(!ctx.degraded);
}

#[tokio::test]
async fn wildcard_domain_resolves_subdomains() {
    let r = resolver(seeded_store());

    let ctx = r.resolve(TenantHint::host("shop.acme.test")).await;
    assert_eq!(ctx.tenant_id.as_str(), "acme");
}

#[tokio::test]
async fn unknown_domain_gets_default_tenant_with_default_features() {
    let r = resolver(seeded_store());

    let ctx = r.resolve(TenantHint::host("nobody.example")).await;
    assert_eq!(ctx.tenant_id.as_str(), "default");
    assert!(ctx.has_feature("dashboard"));
    assert!(!ctx.degraded);
}

#[tokio::test]
async fn explicit_tenant_wins_over_host() {
    let r = resolver(seeded_store());

    let ctx = r
        .resolve(TenantHint {
            tenant_id: Some("globex"),
            host: Some("acme.test"),
        })
        .await;
    assert_eq!(ctx.tenant_id.as_str(), "globex");
}

#[tokio::test]
async fn unknown_explicit_tenant_falls_back_to_host() {
    let r = resolver(seeded_store());

    let ctx = r
        .resolve(TenantHint {
            tenant_id: Some("initech"),
            host: Some("acme.test"),
        })
        .await;
    assert_eq!(ctx.tenant_id.as_str(), "acme");
}

#[tokio::test]
async fn unreachable_store_yields_degraded_default() {
    let store = FlakyStore {
        inner: seeded_store(),
        ..Default::default()
    };
    store.down.store(true, Ordering::SeqCst);
    let r = resolver(store);

    let ctx = r.resolve(TenantHint::host("acme.test")).await;
    assert_eq!(ctx.tenant_id.as_str(), "default");
    assert!(ctx.degraded);
    // degraded answers are not cached
    assert_eq!(r.cached_entries(), 0);
}

#[tokio::test]
async fn hanging_store_does_not_block_resolution() {
    let store = FlakyStore {
        inner: seeded_store(),
        ..Default::default()
    };
    store.hang.store(true, Ordering::SeqCst);
    let r = TenantResolver::new(
        Arc::new(store),
        ResolverOptions {
            store_timeout: Duration::from_millis(50),
            ..Default::default()
        },
    );

    let started = Instant::now();
    let ctx = r.resolve(TenantHint::host("acme.test")).await;
    assert!(ctx.degraded);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn cache_serves_repeat_lookups_until_invalidated() {
    let store = Arc::new(FlakyStore {
        inner: seeded_store(),
        ..Default::default()
    });
    let r = TenantResolver::new(store.clone(), ResolverOptions::default());

    r.resolve(TenantHint::host("globex.test")).await;
    let after_first = store.calls.load(Ordering::SeqCst);
    r.resolve(TenantHint::host("globex.test")).await;
    assert_eq!(store.calls.load(Ordering::SeqCst), after_first);

    r.invalidate_tenant(&TenantId::from("globex"));
    r.resolve(TenantHint::host("globex.test")).await;
    assert!(store.calls.load(Ordering::SeqCst) > after_first);
}

#[tokio::test]
async fn config_change_is_visible_after_invalidation() {
    let store = Arc::new(seeded_store());
    let r = TenantResolver::new(store.clone(), ResolverOptions::default());

    let before = r.resolve(TenantHint::host("globex.test")).await;
    assert!(!before.has_feature("reports"));

    store.upsert(
        TenantRecord::new("globex", "Globex")
            .with_domain("globex.test")
            .with_features(["reports"]),
    );
    // still cached
    assert!(!r.resolve(TenantHint::host("globex.test")).await.has_feature("reports"));

    r.invalidate_all();
    assert!(r.resolve(TenantHint::host("globex.test")).await.has_feature("reports"));
}

#[tokio::test]
async fn expired_entries_are_refreshed() {
    let store = Arc::new(seeded_store());
    let r = TenantResolver::new(
        store.clone(),
        ResolverOptions {
            cache_ttl: Duration::from_millis(20),
            ..Default::default()
        },
    );

    r.resolve(TenantHint::host("newco.test")).await;
    store.upsert(TenantRecord::new("newco", "NewCo").with_domain("newco.test"));
    tokio::time::sleep(Duration::from_millis(40)).await;

    let ctx = r.resolve(TenantHint::host("newco.test")).await;
    assert_eq!(ctx.tenant_id.as_str(), "newco");
}

#[tokio::test]
async fn cache_does_not_grow_with_unknown_or_stale_hosts() {
    let r = TenantResolver::new(
        Arc::new(seeded_store()),
        ResolverOptions {
            cache_ttl: Duration::from_millis(1),
            ..Default::default()
        },
    );

    for i in 0..500 {
        r.resolve(TenantHint::host(&format!("random-{i}.example"))).await;
    }
    assert_eq!(r.cached_entries(), 0);

    for i in 0..500 {
        r.resolve(TenantHint::host(&format!("shop-{i}.acme.test"))).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    r.resolve(TenantHint::host("acme.test")).await;
    assert_eq!(r.cached_entries(), 1);
}

proptest! {
    #[test]
    fn resolution_is_total(host in "\\PC{0,40}", explicit in proptest::option::of("[a-z]{0,8}")) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
        let r = resolver(seeded_store());
        let ctx = rt.block_on(r.resolve(TenantHint {
            tenant_id: explicit.as_deref(),
            host: Some(host.as_str()),
        }));
        prop_assert!(!ctx.tenant_id.as_str().is_empty());
        prop_assert!(!ctx.degraded);
    }
}
