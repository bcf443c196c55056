//! End-to-end tests for the delivery process: coordinator deduplication,
//! retry policy, cache population, update handling, preloading and the
//! page gateway. Time is paused so backoff delays cost nothing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rw_core::types::RuleSetSource;
use rw_core::DeliveryConfig;
use rw_delivery::{
    Coordinator, DeliveryService, EngineError, EngineReply, EngineRequest, EngineTransport,
    FetchError, Gateway, GatewayError, GatewayReply, GatewayRequest, LocalChannel, PageChannel,
    Preloader, StaticEngine,
};

// =============================================================================
// Mock transport
// =============================================================================

type Behavior =
    Box<dyn Fn(usize, &EngineRequest) -> Result<EngineReply, EngineError> + Send + Sync>;

struct MockTransport {
    calls: AtomicUsize,
    delay: Duration,
    behavior: Behavior,
}

impl MockTransport {
    fn new(
        delay: Duration,
        behavior: impl Fn(usize, &EngineRequest) -> Result<EngineReply, EngineError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            behavior: Box::new(behavior),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineTransport for MockTransport {
    async fn round_trip(&self, request: EngineRequest) -> Result<EngineReply, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.behavior)(call, &request)
    }
}

fn test_config() -> DeliveryConfig {
    DeliveryConfig {
        max_jitter_ms: 0,
        pinned_hostnames: vec!["hot.test".to_string()],
        ..DeliveryConfig::default()
    }
}

fn css_payload(selector: &str) -> String {
    serde_json::json!({ "cssInject": [selector] }).to_string()
}

// =============================================================================
// Coordinator
// =============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_resolves_share_one_fetch() {
    let transport = Arc::new(MockTransport::new(Duration::from_millis(50), |_, _| {
        Ok(EngineReply::complete(css_payload("#ad")))
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let coordinator = Arc::clone(&coordinator);
        handles.push(tokio::spawn(async move {
            coordinator.resolve("https://a.test/").await
        }));
    }
    for handle in handles {
        let set = handle.await.unwrap().unwrap();
        assert_eq!(set.css_inject, vec!["#ad".to_string()]);
    }
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn settled_fetch_allows_fresh_attempts() {
    let transport = Arc::new(MockTransport::new(Duration::ZERO, |call, _| {
        if call == 1 {
            Err(EngineError::EngineReported("host not connected".into()))
        } else {
            Ok(EngineReply::complete(css_payload("#ad")))
        }
    }));
    let config = DeliveryConfig {
        cache_max_entries: 1, // keep the failure path honest
        ..test_config()
    };
    let coordinator = Coordinator::new(Arc::clone(&transport), &config);

    let err = coordinator.resolve("https://a.test/").await.unwrap_err();
    assert!(matches!(err, FetchError::NonRetryable(_)));

    // The pending slot was released: a second resolve fetches again
    let set = coordinator.resolve("https://a.test/").await.unwrap();
    assert_eq!(set.source, RuleSetSource::FreshFetch);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_retried_until_success() {
    // Fails MAX_ATTEMPTS-1 times, then succeeds
    let transport = Arc::new(MockTransport::new(Duration::ZERO, |call, _| {
        if call < 3 {
            Err(EngineError::Timeout)
        } else {
            Ok(EngineReply::complete(css_payload("#ad")))
        }
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    let set = coordinator.resolve("https://a.test/").await.unwrap();
    assert_eq!(set.css_inject, vec!["#ad".to_string()]);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn persistent_failure_exhausts_attempts() {
    let transport = Arc::new(MockTransport::new(Duration::ZERO, |_, _| {
        Err(EngineError::Timeout)
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    let err = coordinator.resolve("https://a.test/").await.unwrap_err();
    match err {
        FetchError::Exhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(transport.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_aborts_after_one_attempt() {
    let transport = Arc::new(MockTransport::new(Duration::ZERO, |_, _| {
        Err(EngineError::EngineReported("context invalidated".into()))
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    let err = coordinator.resolve("https://a.test/").await.unwrap_err();
    assert!(matches!(err, FetchError::NonRetryable(_)));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn ineligible_urls_skip_without_engine_calls() {
    let transport = Arc::new(MockTransport::new(Duration::ZERO, |_, _| {
        Ok(EngineReply::complete("{}"))
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    for url in ["about:blank", "chrome://x", "https://intranet/"] {
        let set = coordinator.resolve(url).await.unwrap();
        assert_eq!(set.source, RuleSetSource::Skipped);
        assert!(set.is_empty());
    }
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn pinned_and_bounded_caches_populated_by_hostname() {
    let transport = Arc::new(MockTransport::new(Duration::ZERO, |_, request| {
        Ok(EngineReply::complete(if request.url.contains("hot.test") {
            css_payload("#hot")
        } else {
            css_payload("#cold")
        }))
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    let fresh = coordinator.resolve("https://hot.test/").await.unwrap();
    assert_eq!(fresh.source, RuleSetSource::FreshFetch);
    coordinator.resolve("https://cold.test/").await.unwrap();
    assert_eq!(coordinator.cache_stats(), (1, 1));

    // Hits come from the right store, with the right tag, without refetching
    let hit = coordinator.resolve("https://hot.test/").await.unwrap();
    assert_eq!(hit.source, RuleSetSource::PinnedCache);
    let hit = coordinator.resolve("https://cold.test/").await.unwrap();
    assert_eq!(hit.source, RuleSetSource::Cache);
    assert_eq!(transport.calls(), 2);
}

/// Transport that records when each round trip starts.
struct TimingTransport {
    delay: Duration,
    starts: Mutex<Vec<tokio::time::Instant>>,
}

#[async_trait]
impl EngineTransport for TimingTransport {
    async fn round_trip(&self, _request: EngineRequest) -> Result<EngineReply, EngineError> {
        self.starts
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        tokio::time::sleep(self.delay).await;
        Ok(EngineReply::complete(css_payload("#ad")))
    }
}

#[tokio::test(start_paused = true)]
async fn parallel_fetches_bounded_by_semaphore() {
    let delay = Duration::from_millis(50);
    let transport = Arc::new(TimingTransport {
        delay,
        starts: Mutex::new(Vec::new()),
    });
    let config = DeliveryConfig {
        max_parallel_fetches: 1,
        ..test_config()
    };
    let coordinator = Coordinator::new(Arc::clone(&transport), &config);

    let a = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.resolve("https://a.test/").await })
    };
    let b = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.resolve("https://b.test/").await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    // With one fetch slot, the second engine call may start only after
    // the first has settled
    let starts = transport.starts.lock().unwrap();
    assert_eq!(starts.len(), 2);
    assert!(starts[1] - starts[0] >= delay);
}

#[tokio::test(start_paused = true)]
async fn abandoned_resolve_still_populates_cache() {
    let transport = Arc::new(MockTransport::new(Duration::from_millis(50), |_, _| {
        Ok(EngineReply::complete(css_payload("#ad")))
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    // Caller gives up long before the engine answers
    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        coordinator.resolve("https://a.test/"),
    )
    .await;
    assert!(abandoned.is_err());

    // The underlying fetch was not cancelled; it settles and stores
    tokio::time::sleep(Duration::from_millis(100)).await;
    let hit = coordinator.resolve("https://a.test/").await.unwrap();
    assert_eq!(hit.source, RuleSetSource::Cache);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn pinned_concurrent_first_fetches_share_by_hostname() {
    let transport = Arc::new(MockTransport::new(Duration::from_millis(50), |_, _| {
        Ok(EngineReply::complete(css_payload("#hot")))
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    // Different URLs on a pinned hostname dedup to one fetch: the cache
    // key for pinned hosts is the hostname, not the URL
    let a = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.resolve("https://hot.test/a").await })
    };
    let b = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.resolve("https://hot.test/b").await })
    };
    let set_a = a.await.unwrap().unwrap();
    let set_b = b.await.unwrap().unwrap();
    assert_eq!(set_a.css_inject, set_b.css_inject);
    assert_eq!(transport.calls(), 1);
    assert!(coordinator.has_pinned("hot.test"));
}

#[tokio::test(start_paused = true)]
async fn pinned_hit_ignores_path_differences() {
    let transport = Arc::new(MockTransport::new(Duration::ZERO, |_, _| {
        Ok(EngineReply::complete(css_payload("#hot")))
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    coordinator.resolve("https://hot.test/a").await.unwrap();
    let hit = coordinator.resolve("https://hot.test/b").await.unwrap();
    assert_eq!(hit.source, RuleSetSource::PinnedCache);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn rules_updated_clears_bounded_and_rewarms_pinned() {
    let transport = Arc::new(MockTransport::new(Duration::ZERO, |call, _| {
        Ok(EngineReply::complete(css_payload(&format!("#gen-{call}"))))
    }));
    let coordinator = Coordinator::new(Arc::clone(&transport), &test_config());

    coordinator.resolve("https://hot.test/").await.unwrap();
    coordinator.resolve("https://cold.test/").await.unwrap();
    assert_eq!(coordinator.cache_stats(), (1, 1));
    let calls_before = transport.calls();

    coordinator.handle_rules_updated();
    // Let the spawned re-warm task settle
    tokio::time::sleep(Duration::from_secs(1)).await;

    let (bounded, pinned) = coordinator.cache_stats();
    assert_eq!(bounded, 0);
    assert_eq!(pinned, 1);
    assert!(coordinator.has_pinned("hot.test"));
    // Exactly one refetch: the pinned hostname
    assert_eq!(transport.calls(), calls_before + 1);

    // The re-warmed entry serves hits without another fetch
    let hit = coordinator.resolve("https://hot.test/").await.unwrap();
    assert_eq!(hit.source, RuleSetSource::PinnedCache);
    assert_eq!(transport.calls(), calls_before + 1);
}

// =============================================================================
// Preloader
// =============================================================================

#[tokio::test(start_paused = true)]
async fn preload_failures_do_not_abort_batch() {
    let transport = Arc::new(MockTransport::new(Duration::ZERO, |_, request| {
        if request.url.contains("bad.test") {
            Err(EngineError::EngineReported("host not connected".into()))
        } else {
            Ok(EngineReply::complete(css_payload("#ok")))
        }
    }));
    let config = DeliveryConfig {
        pinned_hostnames: vec![
            "hot.test".to_string(),
            "bad.test".to_string(),
            "warm.test".to_string(),
        ],
        ..test_config()
    };
    let coordinator = Coordinator::new(Arc::clone(&transport), &config);
    let preloader = Preloader::new(Arc::clone(&coordinator));

    let warmed = preloader
        .warm(&[
            "hot.test".to_string(),
            "bad.test".to_string(),
            "warm.test".to_string(),
        ])
        .await;

    assert_eq!(warmed, 2);
    assert!(coordinator.has_pinned("hot.test"));
    assert!(coordinator.has_pinned("warm.test"));
    assert!(!coordinator.has_pinned("bad.test"));
}

// =============================================================================
// Gateway
// =============================================================================

fn local_stack(engine: StaticEngine) -> Gateway<LocalChannel<StaticEngine>> {
    let config = test_config();
    let coordinator = Coordinator::new(engine, &config);
    let service = Arc::new(DeliveryService::new(coordinator));
    Gateway::new(LocalChannel::new(service), &config)
}

#[tokio::test(start_paused = true)]
async fn gateway_round_trip_delivers_rules() {
    let mut engine = StaticEngine::new(64);
    let selectors: Vec<String> = (0..50).map(|i| format!("#ad-{i}")).collect();
    engine.insert(
        "a.test",
        serde_json::json!({ "cssInject": selectors }).to_string(),
    );

    let gateway = local_stack(engine);
    let set = gateway.request_rules("https://a.test/page").await.unwrap();
    assert_eq!(set.css_inject.len(), 50);
}

#[tokio::test(start_paused = true)]
async fn gateway_skipped_url_yields_empty_rules() {
    let gateway = local_stack(StaticEngine::new(64));
    let set = gateway.request_rules("about:blank").await.unwrap();
    assert!(set.is_empty());
}

struct SilentChannel;

#[async_trait]
impl PageChannel for SilentChannel {
    async fn send(&self, _request: GatewayRequest) -> Result<GatewayReply, GatewayError> {
        // Never answers
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn gateway_timeout_is_terminal() {
    let gateway = Gateway::new(SilentChannel, &test_config());
    let err = gateway.request_rules("https://a.test/").await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout));
}

struct FlakyChannel {
    calls: AtomicUsize,
}

#[async_trait]
impl PageChannel for FlakyChannel {
    async fn send(&self, _request: GatewayRequest) -> Result<GatewayReply, GatewayError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < 3 {
            Ok(GatewayReply::failure("temporarily unavailable"))
        } else {
            Ok(GatewayReply::rules(rw_core::RuleSet::default()))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn gateway_retries_retryable_remote_errors() {
    let gateway = Gateway::new(
        FlakyChannel {
            calls: AtomicUsize::new(0),
        },
        &test_config(),
    );
    assert!(gateway.request_rules("https://a.test/").await.is_ok());
}

struct RejectingChannel {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PageChannel for RejectingChannel {
    async fn send(&self, _request: GatewayRequest) -> Result<GatewayReply, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(GatewayReply::failure("Invalid URL"))
    }
}

#[tokio::test(start_paused = true)]
async fn gateway_non_retryable_remote_error_aborts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let gateway = Gateway::new(
        RejectingChannel {
            calls: Arc::clone(&calls),
        },
        &test_config(),
    );
    let err = gateway.request_rules("https://a.test/").await.unwrap_err();
    assert!(matches!(err, GatewayError::Remote(_)));
    // Terminal phrase: exactly one attempt, no retries
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Service dispatch
// =============================================================================

#[tokio::test(start_paused = true)]
async fn service_answers_raw_json_messages() {
    let mut engine = StaticEngine::new(1024);
    engine.insert("a.test", r#"{"scripts":["window.__x=1;"]}"#);
    let config = test_config();
    let coordinator = Coordinator::new(engine, &config);
    let service = DeliveryService::new(coordinator);

    let reply = service
        .handle_json(r#"{"action":"getAdvancedBlockingData","url":"https://a.test/"}"#)
        .await;
    assert_eq!(reply.data.unwrap().metadata_payload.scripts.len(), 1);

    let reply = service.handle_json("not json at all").await;
    assert!(reply.error.unwrap().contains("JSON parse error"));

    let reply = service
        .handle_json(r#"{"action":"rulesUpdated"}"#)
        .await;
    assert!(reply.error.is_none());

    let reply = service
        .handle_json(
            r#"{"action":"reportScriptletError","detail":{"scriptletName":"x","errorMessage":"boom","url":"https://a.test/"}}"#,
        )
        .await;
    assert!(reply.error.is_none());
}
