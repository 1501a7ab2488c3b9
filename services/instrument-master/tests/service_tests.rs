//! Refresh, cache and lookup behavior of the service against a mock feed server

mod common;

use chrono::{TimeZone, Utc};
use common::{
    BREEZE_FONSE_CSV, NOREN_NFO_CSV, NOREN_NSE_CSV, date, init_test_logging, option, zip_archive,
};
use instrument_master::config::breeze_feed;
use instrument_master::feeds::{FeedKind, FeedSpec};
use instrument_master::instruments::cache::write_snapshot;
use instrument_master::instruments::{
    ExpiryBucket, InstrumentMasterService, OptionRight, ResolveRequest, SecurityMaster,
    StaleReason, SymbolNormalizer, TokenKind, Venue,
};
use instrument_master::{FeedError, InstrumentMasterConfig, RefreshConfig};
use rust_decimal_macros::dec;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARCHIVE_PATH: &str = "/NFO_symbols.txt.zip";
const BREEZE_ARCHIVE_PATH: &str = "/SecurityMaster.zip";
const CACHE_FILE: &str = "combined_instruments.csv";

fn test_config(server: &MockServer, cache_dir: &Path) -> InstrumentMasterConfig {
    InstrumentMasterConfig {
        feeds: vec![FeedSpec::new(
            FeedKind::Noren,
            format!("{}{}", server.uri(), ARCHIVE_PATH),
        )],
        cache_path: Some(cache_dir.join(CACHE_FILE)),
        http_timeout_secs: 5,
        refresh: RefreshConfig {
            enable_auto_updates: false,
            max_retries: 1,
            retry_delay_secs: 0,
            stale_after_failures: 2,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn archive_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_bytes(zip_archive(&[
        ("NFO_symbols.txt", NOREN_NFO_CSV),
        ("NSE_symbols.txt", NOREN_NSE_CSV),
    ]))
}

fn breeze_config(server: &MockServer, cache_dir: &Path) -> InstrumentMasterConfig {
    let mut config = test_config(server, cache_dir);
    config.feeds = vec![FeedSpec::new(
        FeedKind::Breeze,
        format!("{}{}", server.uri(), BREEZE_ARCHIVE_PATH),
    )];
    config
}

fn breeze_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_bytes(zip_archive(&[("FONSEScripMaster.txt", BREEZE_FONSE_CSV)]))
}

fn weekly_call() -> ResolveRequest {
    call(ExpiryBucket::NearestWeekly)
}

fn call(expiry: ExpiryBucket) -> ResolveRequest {
    ResolveRequest::option(Venue::NFO, "BANKNIFTY", dec!(46000), OptionRight::Call, expiry)
}

/// Cache retrieved on 2020-01-01 holding one contract that expired the next day
fn write_old_cache(cache_dir: &Path) {
    let retrieved_at = Utc
        .with_ymd_and_hms(2020, 1, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp");
    let records = vec![option("1", "BANKNIFTY", 46000, OptionRight::Call, date((2020, 1, 2)))];
    let (snapshot, _) = SecurityMaster::build(records, retrieved_at);
    write_snapshot(
        &cache_dir.join(CACHE_FILE),
        &snapshot,
        &SymbolNormalizer::default(),
        FeedKind::Noren,
    )
    .expect("write cache");
}

#[tokio::test]
async fn test_refresh_publishes_and_caches() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(archive_response())
        .expect(1)
        .mount(&server)
        .await;
    let cache_dir = TempDir::new().expect("temp dir");
    let config = test_config(&server, cache_dir.path());
    let cache_path = config.cache_path.clone().expect("cache path");

    let service = InstrumentMasterService::new(config).expect("service");
    let summary = service.refresh_now().await.expect("refresh");

    assert_eq!(summary.instruments, 6);
    assert_eq!(summary.rejected, 2);
    assert_eq!(summary.attempts, 1);
    assert_eq!(summary.venues, vec![(Venue::NSE, 2), (Venue::NFO, 4)]);
    assert!(cache_path.exists());

    let lookup = service.resolve(&weekly_call());
    assert!(lookup.stale.is_none());
    assert_eq!(lookup.value.map(|r| r.token), Some("35002".to_string()));

    assert_eq!(service.classify_token(Venue::NFO, "35112"), TokenKind::Put);
    assert_eq!(
        service.normalized_symbol(Venue::NFO, "35012").as_deref(),
        Some("BANKNIFTY25APR46000CE")
    );
    assert_eq!(service.normalized_symbol(Venue::NFO, "0"), None);

    let hits = service.search(Venue::NSE, "reliance");
    assert_eq!(hits.value.len(), 1);
    assert_eq!(hits.value[0].trading_symbol, "RELIANCE-EQ");
}

#[tokio::test]
async fn test_failed_refresh_keeps_snapshot_and_turns_stale() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(archive_response())
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let cache_dir = TempDir::new().expect("temp dir");
    let service =
        InstrumentMasterService::new(test_config(&server, cache_dir.path())).expect("service");

    service.refresh_now().await.expect("first refresh");

    match service.refresh_now().await {
        Err(FeedError::RetriesExhausted { attempts, last }) => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, FeedError::Status { status: 500, .. }));
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }

    // One failure is below the threshold
    let lookup = service.resolve(&weekly_call());
    assert!(lookup.stale.is_none());
    assert_eq!(lookup.value.map(|r| r.token), Some("35002".to_string()));

    assert!(service.refresh_now().await.is_err());
    let lookup = service.resolve(&weekly_call());
    let stale = lookup.stale.expect("stale advisory");
    assert_eq!(stale.consecutive_failures, 2);
    assert!(stale.snapshot_retrieved_at.is_some());
    assert_eq!(lookup.value.map(|r| r.token), Some("35002".to_string()));
}

#[tokio::test]
async fn test_start_prefers_cache_over_network() {
    init_test_logging();
    let cache_dir = TempDir::new().expect("temp dir");

    let warm = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(archive_response())
        .mount(&warm)
        .await;
    InstrumentMasterService::new(test_config(&warm, cache_dir.path()))
        .expect("service")
        .refresh_now()
        .await
        .expect("warm refresh");

    let cold = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(0)
        .mount(&cold)
        .await;
    let service =
        InstrumentMasterService::new(test_config(&cold, cache_dir.path())).expect("service");

    let handle = service.start().await.expect("start from cache");
    assert!(handle.is_none());
    assert_eq!(service.store().current().len(), 6);
    assert_eq!(
        service.resolve(&weekly_call()).value.map(|r| r.trading_symbol),
        Some("BANKNIFTY24APR25C46000".to_string())
    );
}

#[tokio::test]
async fn test_start_fails_without_any_data() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let cache_dir = TempDir::new().expect("temp dir");
    let service =
        InstrumentMasterService::new(test_config(&server, cache_dir.path())).expect("service");

    assert!(service.start().await.is_err());
    assert!(service.store().current().is_empty());
}

#[tokio::test]
async fn test_all_feeds_or_nothing() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(archive_response())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/BSE_symbols.txt.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not a zip"))
        .mount(&server)
        .await;
    let cache_dir = TempDir::new().expect("temp dir");
    let mut config = test_config(&server, cache_dir.path());
    config.refresh.max_retries = 0;
    config.feeds.push(FeedSpec::new(
        FeedKind::Noren,
        format!("{}/BSE_symbols.txt.zip", server.uri()),
    ));

    let service = InstrumentMasterService::new(config).expect("service");
    let err = service.refresh_now().await.expect_err("second feed is corrupt");

    assert!(matches!(err, FeedError::RetriesExhausted { attempts: 1, .. }));
    assert!(service.store().current().is_empty());
    assert!(!cache_dir.path().join(CACHE_FILE).exists());
}

#[tokio::test]
async fn test_background_refresh_starts_when_enabled() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(archive_response())
        .mount(&server)
        .await;
    let cache_dir = TempDir::new().expect("temp dir");
    let mut config = test_config(&server, cache_dir.path());
    config.refresh.enable_auto_updates = true;
    config.refresh.interval_secs = 3600;

    let service = InstrumentMasterService::new(config).expect("service");
    let handle = service.start().await.expect("start").expect("refresh task");

    assert!(!handle.is_finished());
    handle.abort();
    assert_eq!(service.store().current().len(), 6);
}

#[tokio::test]
async fn test_old_cache_is_refreshed_on_start() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(archive_response())
        .expect(1)
        .mount(&server)
        .await;
    let cache_dir = TempDir::new().expect("temp dir");
    write_old_cache(cache_dir.path());
    let mut config = test_config(&server, cache_dir.path());
    config.refresh.enable_auto_updates = true;

    let service = InstrumentMasterService::new(config).expect("service");
    let handle = service.start().await.expect("start").expect("refresh task");
    handle.abort();

    let snapshot = service.store().current();
    assert_eq!(snapshot.len(), 6);
    assert!(snapshot.age().expect("retrieved") < Duration::from_secs(60));

    let lookup = service.resolve(&weekly_call());
    assert!(lookup.stale.is_none());
    assert_eq!(lookup.value.map(|r| r.token), Some("35002".to_string()));
}

#[tokio::test]
async fn test_old_cache_is_flagged_when_refresh_fails() {
    init_test_logging();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let cache_dir = TempDir::new().expect("temp dir");
    write_old_cache(cache_dir.path());
    let mut config = test_config(&server, cache_dir.path());
    config.refresh.max_retries = 0;

    let service = InstrumentMasterService::new(config).expect("service");
    service.start().await.expect("cache is enough to start");

    let lookup = service.resolve(&weekly_call());
    assert_eq!(lookup.value.map(|r| r.token), Some("1".to_string()));
    let stale = lookup.stale.expect("stale advisory");
    assert_eq!(stale.reason, StaleReason::SnapshotTooOld);
    assert_eq!(stale.consecutive_failures, 1);
    assert_eq!(
        stale.snapshot_retrieved_at.map(|at| at.date_naive()),
        Some(date((2020, 1, 1)))
    );
}

#[tokio::test]
async fn test_fresh_cache_defers_background_refresh() {
    init_test_logging();
    let cache_dir = TempDir::new().expect("temp dir");

    let warm = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(archive_response())
        .mount(&warm)
        .await;
    InstrumentMasterService::new(test_config(&warm, cache_dir.path()))
        .expect("service")
        .refresh_now()
        .await
        .expect("warm refresh");

    let quiet = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(archive_response())
        .expect(0)
        .mount(&quiet)
        .await;
    let mut config = test_config(&quiet, cache_dir.path());
    config.refresh.enable_auto_updates = true;
    config.refresh.interval_secs = 3600;

    let service = InstrumentMasterService::new(config).expect("service");
    let handle = service.start().await.expect("start").expect("refresh task");
    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.abort();

    assert_eq!(service.store().current().len(), 6);
}

#[tokio::test]
async fn test_mixed_vendor_feeds_are_rejected() {
    let server = MockServer::start().await;
    let cache_dir = TempDir::new().expect("temp dir");
    let mut config = test_config(&server, cache_dir.path());
    config.feeds.push(breeze_feed());

    assert!(InstrumentMasterService::new(config).is_err());
}

#[tokio::test]
async fn test_broker_snapshots_stay_separate() {
    init_test_logging();
    let cache_dir = TempDir::new().expect("temp dir");
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ARCHIVE_PATH))
        .respond_with(archive_response())
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(BREEZE_ARCHIVE_PATH))
        .respond_with(breeze_response())
        .expect(1)
        .mount(&server)
        .await;

    let noren =
        InstrumentMasterService::new(test_config(&server, cache_dir.path())).expect("service");
    noren.start().await.expect("noren start");
    let next = noren.resolve(&call(ExpiryBucket::NextWeekly)).value.expect("next weekly");
    assert_eq!(next.token, "35012");
    assert_eq!(next.trading_symbol, "BANKNIFTY30APR25C46000");

    // Same cache file, but written from the other broker's feeds
    let breeze =
        InstrumentMasterService::new(breeze_config(&server, cache_dir.path())).expect("service");
    breeze.start().await.expect("breeze start");

    let snapshot = breeze.store().current();
    assert!(snapshot.by_token(Venue::NFO, "35002").is_none());
    let next = breeze.resolve(&call(ExpiryBucket::NextWeekly)).value.expect("next weekly");
    assert_eq!(next.token, "47252");
    assert_eq!(next.trading_symbol, "CNXBAN");
    let nearest = breeze.resolve(&call(ExpiryBucket::NearestWeekly)).value.expect("weekly");
    assert_eq!(nearest.token, "47251");
}
