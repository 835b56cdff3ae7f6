//! End-to-end read path tests against a scripted network.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use geocat::{
    Backoff, Cache, CancellationToken, CatalogClient, CatalogRequest, CatalogVersionRequest,
    ClientSettings, DataRequest, Error, FetchOption, Hrn, HttpRequest, HttpResponse, MemoryCache,
    Network, PartitionsRequest, PrefetchRequest, RequestId, RetrySettings, SendFuture, TileKey,
};

const LOOKUP: &str = "https://lookup.example.com/lookup/v1";
const HRN: &str = "hrn:here:data:::hereos-internal-test-v2";
const CONFIG: &str = "https://config.example.com/config/v1";
const METADATA: &str = "https://metadata.example.com/metadata/v1/catalogs/hereos-internal-test-v2";
const QUERY: &str = "https://query.example.com/query/v1/catalogs/hereos-internal-test-v2";
const BLOB: &str = "https://blob.example.com/blobstore/v1/catalogs/hereos-internal-test-v2";
const VOLATILE_BLOB: &str =
    "https://volatile-blob.example.com/blobstore/v1/catalogs/hereos-internal-test-v2";
const STREAM: &str = "https://stream.example.com/stream/v2/catalogs/hereos-internal-test-v2";

const CATALOG: &str = r#"{
    "id": "hereos-internal-test-v2",
    "hrn": "hrn:here:data:::hereos-internal-test-v2",
    "name": "hereos-internal-test-v2",
    "version": 3,
    "layers": [
        {"id": "testlayer", "layerType": "versioned", "contentType": "application/x-protobuf",
         "partitioning": {"scheme": "heretile", "tileLevels": [12]}},
        {"id": "testlayer_volatile", "layerType": "volatile", "contentType": "text/plain"},
        {"id": "events", "layerType": "stream"},
        {"id": "lookups", "layerType": "index"}
    ]
}"#;

const VOLATILE_PARTITIONS: &str = r#"{"partitions": [
    {"partition": "269", "dataHandle": "4eed6ed1-0d32-43b9-ae79-043cb4256432"},
    {"partition": "270", "dataHandle": "30640762-b429-47b9-9ed6-7a4af6086e8e"},
    {"partition": "3", "dataHandle": "8daa637d-7fd9-49b4-9aa8-b3a2d28f7e5b"},
    {"partition": "here_van_wc2018_pool", "dataHandle": "bcde4cc0-2678-40e9-b791-c630faee14c3"}
]}"#;

fn url(base: &str, path: &str) -> String {
    format!("{base}{path}")
}

fn resource_lookup() -> String {
    format!("{LOOKUP}/resources/{HRN}/apis")
}

fn latest_version() -> String {
    url(METADATA, "/versions/latest?startVersion=-1")
}

enum Reply {
    Respond(HttpResponse),
    /// Respond after a delay, counted as in flight meanwhile.
    Delayed(HttpResponse, Duration),
    Fail,
    Hang,
}

type Hook = Box<dyn FnOnce() + Send>;

/// Network answering by exact URL. The last reply of a route repeats.
#[derive(Default)]
struct MockNetwork {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    hooks: Mutex<HashMap<String, Hook>>,
    requests: Mutex<Vec<String>>,
    cancelled: Mutex<Vec<RequestId>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockNetwork {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn route(&self, url: impl Into<String>, replies: impl IntoIterator<Item = Reply>) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.into(), replies.into_iter().collect());
    }

    fn ok(&self, url: impl Into<String>, body: &str) {
        self.status(url, 200, body);
    }

    fn status(&self, url: impl Into<String>, status: u16, body: &str) {
        self.route(url, [Reply::Respond(HttpResponse::new(status, body))]);
    }

    /// Run `hook` while the request for `url` is in flight.
    fn on_request(&self, url: impl Into<String>, hook: impl FnOnce() + Send + 'static) {
        self.hooks.lock().unwrap().insert(url.into(), Box::new(hook));
    }

    fn calls(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|requested| *requested == url)
            .count()
    }

    fn total(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        let Some(queue) = routes.get_mut(url) else {
            return Reply::Respond(HttpResponse::new(404, "no route"));
        };
        if queue.len() > 1 {
            return queue.pop_front().unwrap();
        }
        match queue.front() {
            Some(Reply::Respond(response)) => Reply::Respond(response.clone()),
            Some(Reply::Delayed(response, delay)) => Reply::Delayed(response.clone(), *delay),
            Some(Reply::Fail) => Reply::Fail,
            Some(Reply::Hang) => Reply::Hang,
            None => Reply::Respond(HttpResponse::new(404, "no route")),
        }
    }
}

impl Network for MockNetwork {
    fn send(&self, request: HttpRequest, _id: RequestId) -> SendFuture<'_> {
        self.requests.lock().unwrap().push(request.url.clone());
        let reply = self.next_reply(&request.url);
        let hook = self.hooks.lock().unwrap().remove(&request.url);
        if let Some(hook) = hook {
            hook();
        }

        match reply {
            Reply::Respond(response) => Box::pin(async move { Ok(response) }),
            Reply::Delayed(response, delay) => {
                let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(active, Ordering::SeqCst);
                Box::pin(async move {
                    tokio::time::sleep(delay).await;
                    self.active.fetch_sub(1, Ordering::SeqCst);
                    Ok(response)
                })
            }
            Reply::Fail => Box::pin(async move {
                Err(Error::Network {
                    url: request.url,
                    message: "connection reset".to_string(),
                })
            }),
            Reply::Hang => Box::pin(std::future::pending()),
        }
    }

    fn cancel(&self, id: RequestId) {
        self.cancelled.lock().unwrap().push(id);
    }
}

/// Lookups, catalog configuration and version metadata at version 4.
fn catalog_routes(network: &MockNetwork) {
    network.ok(
        format!("{LOOKUP}/platform/apis/config/v1"),
        &format!(r#"[{{"api":"config","version":"v1","baseURL":"{CONFIG}","parameters":{{}}}}]"#),
    );
    network.ok(
        resource_lookup(),
        &format!(
            r#"[
            {{"api":"metadata","version":"v1","baseURL":"{METADATA}"}},
            {{"api":"query","version":"v1","baseURL":"{QUERY}"}},
            {{"api":"blob","version":"v1","baseURL":"{BLOB}"}},
            {{"api":"volatile-blob","version":"v1","baseURL":"{VOLATILE_BLOB}"}},
            {{"api":"stream","version":"v2","baseURL":"{STREAM}"}}
        ]"#
        ),
    );
    network.ok(url(CONFIG, &format!("/catalogs/{HRN}")), CATALOG);
    network.ok(latest_version(), r#"{"version":4}"#);
    network.ok(
        url(METADATA, "/layerVersions?version=4"),
        r#"{"version":4,"layerVersions":[{"layer":"testlayer","version":4,"timestamp":1516397474657}]}"#,
    );
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn client(network: &Arc<MockNetwork>) -> (CatalogClient, MemoryCache) {
    client_with(network, |settings| settings)
}

fn client_with(
    network: &Arc<MockNetwork>,
    configure: impl FnOnce(ClientSettings) -> ClientSettings,
) -> (CatalogClient, MemoryCache) {
    init_tracing();
    let cache = MemoryCache::new();
    let settings = ClientSettings::new()
        .with_lookup_url(LOOKUP)
        .with_network(network.clone())
        .with_cache(Arc::new(cache.clone()))
        .with_retry(
            RetrySettings::default()
                .with_backoff(Backoff::Fixed(Duration::ZERO))
                .with_jitter(false),
        );
    let client = CatalogClient::new(Hrn::parse(HRN).unwrap(), configure(settings)).unwrap();
    (client, cache)
}

#[tokio::test]
async fn volatile_partitions_are_served_from_cache_on_repeat() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let partitions_url = url(METADATA, "/layers/testlayer_volatile/partitions");
    network.ok(partitions_url.clone(), VOLATILE_PARTITIONS);
    let (client, _) = client(&network);

    let first = client
        .fetch_partitions(PartitionsRequest::new("testlayer_volatile"))
        .await
        .unwrap();
    assert_eq!(first.partitions.len(), 4);
    let calls = network.total();

    let second = client
        .fetch_partitions(PartitionsRequest::new("testlayer_volatile"))
        .await
        .unwrap();
    assert_eq!(second, first);
    assert_eq!(network.total(), calls);
    assert_eq!(network.calls(&partitions_url), 1);
    assert_eq!(network.calls(&latest_version()), 0);
}

#[tokio::test]
async fn busy_service_is_retried_until_success() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    network.route(
        latest_version(),
        [
            Reply::Respond(HttpResponse::new(429, "Server busy at the moment.")),
            Reply::Respond(HttpResponse::new(429, "Server busy at the moment.")),
            Reply::Respond(HttpResponse::new(200, r#"{"version":7}"#)),
        ],
    );
    let (client, _) = client(&network);

    let version = client
        .fetch_latest_version(CatalogVersionRequest::new())
        .await
        .unwrap();
    assert_eq!(version, 7);
    assert_eq!(network.calls(&latest_version()), 3);
}

#[tokio::test]
async fn cache_only_miss_never_touches_the_network() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let (client, _) = client(&network);

    let result = client
        .fetch_partitions(
            PartitionsRequest::new("testlayer").with_fetch_option(FetchOption::CacheOnly),
        )
        .await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
    let data = client
        .fetch_data(
            DataRequest::new("testlayer")
                .with_partition_id("269")
                .with_fetch_option(FetchOption::CacheOnly),
        )
        .await;
    assert!(matches!(data, Err(Error::NotFound { .. })));
    assert_eq!(network.total(), 0);
}

#[tokio::test]
async fn online_only_refreshes_cache_and_surfaces_failures() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let blob_url = url(BLOB, "/layers/testlayer/data/handle-1");
    network.ok(blob_url.clone(), "payload");
    let (client, _) = client(&network);
    let online = DataRequest::new("testlayer")
        .with_data_handle("handle-1")
        .with_fetch_option(FetchOption::OnlineOnly);

    assert_eq!(client.fetch_data(online.clone()).await.unwrap(), b"payload");
    assert_eq!(network.calls(&blob_url), 1);

    let cached = client
        .fetch_data(online.clone().with_fetch_option(FetchOption::CacheOnly))
        .await
        .unwrap();
    assert_eq!(cached, b"payload");

    network.route(blob_url.clone(), [Reply::Fail]);
    let result = client.fetch_data(online).await;
    assert!(matches!(result, Err(Error::Network { .. })));
    assert_eq!(network.calls(&blob_url), 4);
}

#[tokio::test]
async fn access_denied_evicts_the_catalog() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    network.ok(
        url(METADATA, "/layers/testlayer/partitions?version=4"),
        r#"{"partitions":[{"partition":"269","dataHandle":"handle-269","version":4}]}"#,
    );
    let blob_url = url(BLOB, "/layers/testlayer/data/handle-269");
    network.status(blob_url.clone(), 403, "Forbidden");
    let (client, cache) = client(&network);

    client
        .fetch_partitions(PartitionsRequest::new("testlayer"))
        .await
        .unwrap();
    assert!(!cache.is_empty());

    let denied = client
        .fetch_data(DataRequest::new("testlayer").with_data_handle("handle-269"))
        .await;
    assert!(matches!(denied, Err(Error::AccessDenied { .. })));
    assert_eq!(network.calls(&blob_url), 1);
    assert!(cache.is_empty());

    let result = client
        .fetch_partitions(
            PartitionsRequest::new("testlayer").with_fetch_option(FetchOption::CacheOnly),
        )
        .await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn cancel_stops_the_chain_before_the_next_step() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let partitions_url = url(METADATA, "/layers/testlayer/partitions?version=4");
    network.ok(partitions_url.clone(), r#"{"partitions":[]}"#);
    let (client, _) = client(&network);

    let token_slot: Arc<Mutex<Option<CancellationToken>>> = Arc::default();
    let hook_slot = Arc::clone(&token_slot);
    network.on_request(latest_version(), move || {
        if let Some(token) = hook_slot.lock().unwrap().as_ref() {
            token.cancel();
        }
    });

    let (tx, rx) = tokio::sync::oneshot::channel();
    let token = client.get_partitions(PartitionsRequest::new("testlayer"), move |result| {
        let _ = tx.send(result);
    });
    *token_slot.lock().unwrap() = Some(token.clone());

    assert_eq!(rx.await.unwrap(), Err(Error::Cancelled));
    assert!(token.is_cancelled());
    assert_eq!(network.calls(&latest_version()), 1);
    assert_eq!(network.calls(&url(METADATA, "/layerVersions?version=4")), 0);
    assert_eq!(network.calls(&partitions_url), 0);
    assert_eq!(network.cancelled.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn callback_fires_once_on_success() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let (client, _) = client(&network);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let token = client.get_catalog(CatalogRequest::new(), move |result| {
        let _ = tx.send(result);
    });
    let catalog = rx.await.unwrap().unwrap();
    assert_eq!(catalog.layers.len(), 4);

    // Cancelling a completed chain changes nothing.
    token.cancel();
    assert!(network.cancelled.lock().unwrap().is_empty());
}

#[tokio::test]
async fn garbage_lookup_response_is_service_unavailable() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    network.ok(resource_lookup(), "kd3sdf\\");
    let (client, _) = client(&network);

    let result = client
        .fetch_latest_version(CatalogVersionRequest::new())
        .await;
    assert!(matches!(result, Err(Error::ServiceUnavailable { .. })));
}

#[tokio::test]
async fn unknown_and_unreadable_layers_are_invalid_arguments() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let (client, _) = client(&network);

    for layer in ["no-such-layer", "events", "lookups"] {
        let result = client.fetch_partitions(PartitionsRequest::new(layer)).await;
        assert!(
            matches!(result, Err(Error::InvalidArgument { .. })),
            "{layer}: {result:?}"
        );
    }
    let result = client.fetch_data(DataRequest::new("testlayer")).await;
    assert!(matches!(result, Err(Error::InvalidArgument { .. })));
}

#[tokio::test]
async fn invalid_version_is_rejected_without_retry() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let layer_versions = url(METADATA, "/layerVersions?version=-1");
    network.status(
        layer_versions.clone(),
        400,
        r#"{"title":"Bad request","status":400,"detail":[{"name":"version","error":"Invalid version: latest known version is 4"}]}"#,
    );
    let (client, _) = client(&network);

    let result = client
        .fetch_partitions(PartitionsRequest::new("testlayer").with_version(-1))
        .await;
    assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    assert_eq!(network.calls(&layer_versions), 1);
    assert_eq!(network.calls(&latest_version()), 0);
}

#[tokio::test]
async fn cache_with_update_answers_without_waiting_for_refresh() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let blob_url = url(VOLATILE_BLOB, "/layers/testlayer_volatile/data/handle-v");
    network.ok(blob_url.clone(), "v1");
    let (client, _) = client(&network);
    let request = DataRequest::new("testlayer_volatile").with_data_handle("handle-v");

    client.fetch_data(request.clone()).await.unwrap();

    network.route(blob_url.clone(), [Reply::Hang]);
    let stale = tokio::time::timeout(
        Duration::from_secs(5),
        client.fetch_data(request.clone().with_fetch_option(FetchOption::CacheWithUpdate)),
    )
    .await
    .expect("cache hit must not wait for the network")
    .unwrap();
    assert_eq!(stale, b"v1");
}

#[tokio::test]
async fn cache_with_update_refreshes_in_background() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let blob_url = url(VOLATILE_BLOB, "/layers/testlayer_volatile/data/handle-v");
    network.ok(blob_url.clone(), "v1");
    let (client, _) = client(&network);
    let request = DataRequest::new("testlayer_volatile").with_data_handle("handle-v");

    client.fetch_data(request.clone()).await.unwrap();
    network.ok(blob_url.clone(), "v2");

    let served = client
        .fetch_data(request.clone().with_fetch_option(FetchOption::CacheWithUpdate))
        .await
        .unwrap();
    assert_eq!(served, b"v1");

    let cache_only = request.with_fetch_option(FetchOption::CacheOnly);
    let mut refreshed = Vec::new();
    for _ in 0..100 {
        refreshed = client.fetch_data(cache_only.clone()).await.unwrap();
        if refreshed == b"v2" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(refreshed, b"v2");
    assert_eq!(network.calls(&blob_url), 2);
}

#[tokio::test]
async fn data_by_partition_id_resolves_the_handle() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let query_url = url(QUERY, "/layers/testlayer/partitions?partition=269&version=4");
    network.ok(
        query_url.clone(),
        r#"{"partitions":[{"partition":"269","dataHandle":"handle-269","version":4}]}"#,
    );
    network.ok(url(BLOB, "/layers/testlayer/data/handle-269"), "DT_2_0031");
    let (client, _) = client(&network);

    let data = client
        .fetch_data(DataRequest::new("testlayer").with_partition_id("269"))
        .await
        .unwrap();
    assert_eq!(data, b"DT_2_0031");

    // Second read is served entirely from cache.
    let calls = network.total();
    client
        .fetch_data(
            DataRequest::new("testlayer")
                .with_partition_id("269")
                .with_version(4),
        )
        .await
        .unwrap();
    assert_eq!(network.total(), calls);
    assert_eq!(network.calls(&query_url), 1);
}

#[tokio::test]
async fn prefetch_queries_a_shared_ancestor_once() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let quadtree_url = url(QUERY, "/layers/testlayer/versions/4/quadkeys/1476147/depths/4");
    network.ok(
        quadtree_url.clone(),
        r#"{
            "subQuads": [
                {"subQuadKey": "1", "version": 4, "dataHandle": "h-root"},
                {"subQuadKey": "28", "version": 4, "dataHandle": "h-28"},
                {"subQuadKey": "29", "version": 4, "dataHandle": "h-29"},
                {"subQuadKey": "30", "version": 4, "dataHandle": "h-30"}
            ],
            "parentQuads": []
        }"#,
    );
    network.ok(url(BLOB, "/layers/testlayer/data/h-28"), "tile 28");
    network.ok(url(BLOB, "/layers/testlayer/data/h-29"), "tile 29");
    network.status(url(BLOB, "/layers/testlayer/data/h-30"), 404, "gone");
    let (client, _) = client(&network);

    let keys: Vec<TileKey> = ["23618364", "23618365", "23618366"]
        .iter()
        .map(|key| TileKey::from_here_tile(key).unwrap())
        .collect();
    let results = client
        .prefetch(PrefetchRequest::new("testlayer", keys.clone()).with_levels(12, 12))
        .await
        .unwrap();

    assert_eq!(network.calls(&quadtree_url), 1);
    assert_eq!(network.calls(&url(BLOB, "/layers/testlayer/data/h-root")), 0);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].tile_key, keys[0]);
    assert_eq!(results[0].prefetched, vec![keys[0]]);
    assert!(results[0].is_success());
    assert_eq!(results[1].prefetched, vec![keys[1]]);
    assert!(results[2].prefetched.is_empty());
    assert!(matches!(results[2].error, Some(Error::NotFound { .. })));

    let cached = client
        .fetch_data(
            DataRequest::new("testlayer")
                .with_data_handle("h-28")
                .with_fetch_option(FetchOption::CacheOnly),
        )
        .await
        .unwrap();
    assert_eq!(cached, b"tile 28");
}

#[tokio::test]
async fn stream_layers_resolve_their_endpoint() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let (client, _) = client(&network);

    assert_eq!(client.stream_endpoint("events").await.unwrap(), STREAM);
    assert!(matches!(
        client.stream_endpoint("testlayer").await,
        Err(Error::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn remove_from_cache_drops_only_the_layer() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    network.ok(url(BLOB, "/layers/testlayer/data/handle-1"), "payload");
    let (client, _) = client(&network);
    let request = DataRequest::new("testlayer").with_data_handle("handle-1");

    client.fetch_data(request.clone()).await.unwrap();
    client.remove_from_cache("testlayer").unwrap();

    let result = client
        .fetch_data(request.with_fetch_option(FetchOption::CacheOnly))
        .await;
    assert!(matches!(result, Err(Error::NotFound { .. })));
    client
        .fetch_catalog(CatalogRequest::new().with_fetch_option(FetchOption::CacheOnly))
        .await
        .unwrap();
}

#[tokio::test]
async fn stale_endpoint_is_resolved_again_after_not_found() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let blob_url = url(BLOB, "/layers/testlayer/data/missing");
    network.status(blob_url, 404, "Not found");
    let (client, _) = client(&network);

    let request = DataRequest::new("testlayer").with_data_handle("missing");
    for _ in 0..2 {
        let result = client.fetch_data(request.clone()).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }
    assert_eq!(network.calls(&resource_lookup()), 2);
}

#[tokio::test]
async fn access_denied_on_stream_lookup_evicts_the_catalog() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    network.status(resource_lookup(), 403, "Forbidden");
    let (client, cache) = client(&network);

    client.fetch_catalog(CatalogRequest::new()).await.unwrap();
    assert!(!cache.is_empty());

    let denied = client.stream_endpoint("events").await;
    assert!(matches!(denied, Err(Error::AccessDenied { .. })));
    assert!(cache.is_empty());
}

#[tokio::test]
async fn reserved_characters_in_ids_are_escaped() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let query_url = url(
        QUERY,
        "/layers/testlayer/partitions?partition=a%26version%3D9&version=4",
    );
    network.ok(
        query_url.clone(),
        r#"{"partitions":[{"partition":"a&version=9","dataHandle":"h/1 2","version":4}]}"#,
    );
    let blob_url = url(BLOB, "/layers/testlayer/data/h%2F1%202");
    network.ok(blob_url.clone(), "escaped");
    let (client, _) = client(&network);

    let data = client
        .fetch_data(DataRequest::new("testlayer").with_partition_id("a&version=9"))
        .await
        .unwrap();
    assert_eq!(data, b"escaped");
    assert_eq!(network.calls(&query_url), 1);
    assert_eq!(network.calls(&blob_url), 1);
}

#[tokio::test]
async fn remove_from_cache_keeps_resolved_endpoints() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    network.ok(url(BLOB, "/layers/testlayer/data/handle-1"), "one");
    network.ok(url(BLOB, "/layers/testlayer/data/handle-2"), "two");
    let (client, _) = client(&network);

    client
        .fetch_data(DataRequest::new("testlayer").with_data_handle("handle-1"))
        .await
        .unwrap();
    assert_eq!(network.calls(&resource_lookup()), 1);

    // Layer ids shaped like api names must not reach the endpoint entries.
    for layer in ["blob", "v1"] {
        client.remove_from_cache(layer).unwrap();
    }
    assert!(matches!(
        client.remove_from_cache("blob:v1"),
        Err(Error::InvalidArgument { .. })
    ));

    client
        .fetch_data(DataRequest::new("testlayer").with_data_handle("handle-2"))
        .await
        .unwrap();
    assert_eq!(network.calls(&resource_lookup()), 1);
}

/// Quadtree index at version 4 under 1476147 listing level 12 sub quads
/// `subs`, each with data handle `h-{sub}`.
fn quadtree_routes(network: &MockNetwork, subs: impl IntoIterator<Item = u64>) {
    let sub_quads: Vec<String> = subs
        .into_iter()
        .map(|sub| format!(r#"{{"subQuadKey":"{sub}","version":4,"dataHandle":"h-{sub}"}}"#))
        .collect();
    network.ok(
        url(QUERY, "/layers/testlayer/versions/4/quadkeys/1476147/depths/4"),
        &format!(r#"{{"subQuads":[{}],"parentQuads":[]}}"#, sub_quads.join(",")),
    );
}

/// Level 12 tile below 1476147 at sub quad `sub`.
fn level_12_tile(sub: u64) -> TileKey {
    TileKey::from_here_tile(&(23_618_352 + sub - 16).to_string()).unwrap()
}

#[tokio::test]
async fn cancelled_prefetch_reports_what_finished() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    quadtree_routes(&network, [28, 29]);
    network.ok(url(BLOB, "/layers/testlayer/data/h-28"), "tile 28");
    let hanging = url(BLOB, "/layers/testlayer/data/h-29");
    network.route(hanging.clone(), [Reply::Hang]);
    let (client, cache) = client(&network);

    let keys = vec![level_12_tile(28), level_12_tile(29)];
    let (tx, rx) = tokio::sync::oneshot::channel();
    let token = client.prefetch_tiles(
        PrefetchRequest::new("testlayer", keys.clone()).with_levels(12, 12),
        move |result| {
            let _ = tx.send(result);
        },
    );

    let finished = geocat::keys::data(&Hrn::parse(HRN).unwrap(), "testlayer", "h-28");
    for _ in 0..100 {
        if network.calls(&hanging) == 1 && cache.contains(&finished).unwrap() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(network.calls(&hanging), 1);
    token.cancel();

    let results = rx.await.unwrap().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].prefetched, vec![keys[0]]);
    assert!(results[0].is_success());
    assert!(results[1].prefetched.is_empty());
    assert_eq!(results[1].error, Some(Error::Cancelled));
    assert_eq!(network.cancelled.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn prefetch_downloads_stay_within_the_concurrency_limit() {
    let network = MockNetwork::new();
    catalog_routes(&network);
    let subs: Vec<u64> = (16..28).collect();
    quadtree_routes(&network, subs.iter().copied());
    for sub in &subs {
        network.route(
            url(BLOB, &format!("/layers/testlayer/data/h-{sub}")),
            [Reply::Delayed(
                HttpResponse::new(200, format!("tile {sub}")),
                Duration::from_millis(20),
            )],
        );
    }
    let (client, _) = client_with(&network, |settings| settings.with_prefetch_concurrency(3));

    let keys: Vec<TileKey> = subs.iter().map(|&sub| level_12_tile(sub)).collect();
    let results = client
        .prefetch(PrefetchRequest::new("testlayer", keys).with_levels(12, 12))
        .await
        .unwrap();

    assert!(results.iter().all(|result| result.is_success()));
    let peak = network.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "{peak} downloads in flight");
    assert!(peak > 1, "downloads never overlapped");
}
