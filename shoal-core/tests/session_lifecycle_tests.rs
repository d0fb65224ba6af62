//! Session lifecycle tests driving the registry, allocator and router
//! together through the public API.

use std::collections::HashSet;
use std::sync::Arc;

use shoal_core::config::{PortConfig, ShoalConfig};
use shoal_core::engine::test_mocks::{MetadataBehavior, MockEngineFactory};
use shoal_core::proxy::Route;
use shoal_core::settings::ProxySettings;
use shoal_core::{
    ContentLocator, GatewayError, IdleReaper, PortAllocator, ProxyRouter, SessionRegistry,
    Settings, SettingsStore,
};

struct Harness {
    registry: Arc<SessionRegistry>,
    factory: MockEngineFactory,
    settings: SettingsStore,
    router: Arc<ProxyRouter>,
    config: ShoalConfig,
}

fn harness(factory: MockEngineFactory) -> Harness {
    harness_with(factory, ShoalConfig::for_testing())
}

fn harness_with(factory: MockEngineFactory, config: ShoalConfig) -> Harness {
    let settings = SettingsStore::in_memory(Settings::default());
    let router = Arc::new(ProxyRouter::new(settings.clone(), config.network.clone()).unwrap());
    let registry = Arc::new(SessionRegistry::new(
        PortAllocator::new(config.ports.clone()),
        router.clone(),
        Arc::new(factory.clone()),
        std::env::temp_dir(),
        &config.sessions,
    ));

    Harness {
        registry,
        factory,
        settings,
        router,
        config,
    }
}

fn locator(n: usize) -> ContentLocator {
    ContentLocator::parse(&format!("magnet:?xt=urn:btih:{n:040x}&dn=item-{n}")).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_never_share_ports() {
    let h = harness(MockEngineFactory::new());

    let tasks: Vec<_> = (0..64)
        .map(|n| {
            let registry = h.registry.clone();
            tokio::spawn(async move { registry.create_session(&locator(n)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let ports: Vec<u16> = h.registry.summaries().iter().map(|s| s.port).collect();
    let unique: HashSet<u16> = ports.iter().copied().collect();
    assert_eq!(ports.len(), 64);
    assert_eq!(unique.len(), 64);
    assert_eq!(h.registry.allocator().in_use_count(), 64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_for_same_content_converge() {
    let h = harness(MockEngineFactory::new());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let registry = h.registry.clone();
            tokio::spawn(async move { registry.create_session(&locator(7)).await })
        })
        .collect();

    let mut ids = HashSet::new();
    for task in tasks {
        ids.insert(task.await.unwrap().unwrap());
    }

    assert_eq!(ids.len(), 1);
    assert_eq!(h.registry.len(), 1);
    assert_eq!(h.factory.live_count(), 1);
    assert_eq!(h.registry.allocator().in_use_count(), 1);
}

#[tokio::test]
async fn test_invalid_locator_leaves_ports_untouched() {
    let h = harness(MockEngineFactory::new());
    h.registry.create_session(&locator(1)).await.unwrap();
    let before = h.registry.allocator().in_use_count();

    let result = ContentLocator::parse("magnet:?dn=no-hash");

    assert!(matches!(result, Err(GatewayError::Validation { .. })));
    assert_eq!(h.registry.allocator().in_use_count(), before);
}

#[tokio::test]
async fn test_released_port_is_reusable() {
    let mut config = ShoalConfig::for_testing();
    config.ports = PortConfig {
        primary: 21_000..21_001,
        fallback: 60_000..65_000,
        max_attempts: 5,
    };
    let h = harness_with(MockEngineFactory::new(), config);

    let first = h.registry.create_session(&locator(1)).await.unwrap();
    assert_eq!(h.registry.lookup(&first).unwrap().port(), 21_000);
    assert!(h.registry.evict(&first).await);
    assert!(!h.registry.allocator().is_in_use(21_000));

    let second = h.registry.create_session(&locator(2)).await.unwrap();
    assert_eq!(h.registry.lookup(&second).unwrap().port(), 21_000);
    assert!(h.registry.allocator().is_in_use(21_000));
    assert_eq!(h.factory.ports(), [21_000, 21_000]);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_session_stays_lookupable_until_evicted() {
    let h = harness(MockEngineFactory::new().with_metadata(MetadataBehavior::Held));

    let err = h.registry.create_session(&locator(3)).await.unwrap_err();
    let GatewayError::Timeout { session_id, .. } = err else {
        panic!("expected timeout, got {err:?}");
    };
    let id = session_id.unwrap();

    let session = h.registry.lookup(&id).unwrap();
    let port = session.port();
    assert!(h.registry.allocator().is_in_use(port));

    h.factory.release_metadata();
    assert_eq!(h.registry.create_session(&locator(3)).await.unwrap(), id);

    assert!(h.registry.evict(&id).await);
    assert!(!h.registry.allocator().is_in_use(port));
    assert_eq!(h.factory.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reaper_keeps_recent_and_evicts_stale() {
    let h = harness(MockEngineFactory::new());
    let reaper = IdleReaper::new(h.registry.clone(), &h.config.sessions);
    let ttl = h.config.sessions.idle_ttl;

    let stale = h.registry.create_session(&locator(1)).await.unwrap();
    tokio::time::advance(ttl / 2).await;
    let fresh = h.registry.create_session(&locator(2)).await.unwrap();
    tokio::time::advance(ttl / 2).await;

    assert_eq!(reaper.sweep().await, 1);
    assert!(h.registry.lookup(&stale).is_err());
    assert!(h.registry.lookup(&fresh).is_ok());
    assert_eq!(h.registry.allocator().in_use_count(), 1);
}

#[tokio::test]
async fn test_engines_pick_up_proxy_settings_at_construction() {
    let h = harness(MockEngineFactory::new());
    h.registry.create_session(&locator(1)).await.unwrap();

    h.settings
        .update(|s| {
            s.with_proxy(ProxySettings {
                enable_proxy: true,
                proxy_url: "socks5://user:pw@10.1.1.1:1080".to_string(),
            })
        })
        .unwrap();
    h.registry.create_session(&locator(2)).await.unwrap();

    let routes = h.factory.routes();
    assert_eq!(routes[0], Route::Direct);
    assert!(routes[1].is_proxied());
    assert!(h.router.control_client().unwrap().route.is_proxied());
}

#[tokio::test]
async fn test_second_proxy_update_wins_for_control_traffic() {
    let h = harness(MockEngineFactory::new());

    for url in ["socks5://first:1080", "socks5://second:2080"] {
        h.settings
            .update(|s| {
                s.with_proxy(ProxySettings {
                    enable_proxy: true,
                    proxy_url: url.to_string(),
                })
            })
            .unwrap();
    }

    let control = h.router.control_client().unwrap();
    let Route::Socks5(endpoint) = control.route else {
        panic!("expected proxied control route");
    };
    assert_eq!(endpoint.host(), "second");
    assert_eq!(endpoint.port(), 2080);
}
