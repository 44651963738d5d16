//! End-to-end update runs against a local HTTP server with faked disk and tar

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{GIB, Harness};
use photon_updater::notify::NoOpNotifier;
use photon_updater::region::{BuiltinRegions, RegionInfo, archive_path};
use photon_updater::{
    DownloadError, EXIT_FAILURE, EXIT_INSUFFICIENT_SPACE, EXIT_SUCCESS, Entrypoint, Error,
    PostProcessError, SpaceArea, SpaceMode, UpdateStrategy,
};
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ARCHIVE_BODY: &[u8] = b"pretend this is a bzip2 compressed photon dump";

fn planet_path(harness: &Harness) -> String {
    archive_path(&RegionInfo::planet(), &harness.config.download.dataset_version)
}

/// Serve the planet archive and its checksum file
async fn serve_dataset(harness: &Harness, checksum: &str) -> MockServer {
    let server = MockServer::start().await;
    let archive = planet_path(harness);

    Mock::given(method("GET"))
        .and(path(archive.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ARCHIVE_BODY))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{archive}.md5")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("{checksum}  photon-db-latest.tar.bz2\n")),
        )
        .mount(&server)
        .await;

    server
}

fn archive_md5() -> String {
    format!("{:x}", md5::compute(ARCHIVE_BODY))
}

/// Harness pointed at a server started after it
async fn harness_with_server(checksum: Option<&str>) -> (Harness, MockServer) {
    let mut harness = Harness::new("http://placeholder.invalid");
    let checksum = checksum.map(String::from).unwrap_or_else(archive_md5);
    let server = serve_dataset(&harness, &checksum).await;
    harness.config.download.base_url = server.uri();
    (harness, server)
}

fn seed_existing_index(harness: &Harness) {
    let node = harness.config.paths.node_dir();
    std::fs::create_dir_all(&node).unwrap();
    std::fs::write(node.join("marker"), b"stale").unwrap();
}

fn marker(harness: &Harness) -> String {
    std::fs::read_to_string(harness.config.paths.node_dir().join("marker")).unwrap()
}

async fn archive_requests(server: &MockServer, harness: &Harness) -> usize {
    let archive = planet_path(harness);
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.method.as_str() == "GET" && r.url.path() == archive)
        .count()
}

#[tokio::test]
async fn forced_parallel_update_installs_verified_index() {
    let (mut harness, server) = harness_with_server(None).await;
    harness.config.force_update = true;
    harness.config.strategy = UpdateStrategy::Parallel;
    seed_existing_index(&harness);

    let orchestrator = harness.orchestrator(10 * GIB, 27 * GIB, 20 * GIB);
    let entrypoint = Entrypoint::new(
        harness.config.clone(),
        Arc::new(orchestrator),
        Arc::new(NoOpNotifier),
        Arc::new(BuiltinRegions),
    );

    assert_eq!(entrypoint.startup().await, EXIT_SUCCESS);

    assert_eq!(
        harness.log.calls(),
        vec!["extract", "verify", "publish", "clear_staging"]
    );
    assert_eq!(marker(&harness), "fresh");
    assert!(!harness.config.paths.temp_dir().exists());
    assert_eq!(archive_requests(&server, &harness).await, 1);
}

#[tokio::test]
async fn report_describes_the_installed_archive() {
    let (harness, server) = harness_with_server(None).await;

    let report = harness
        .orchestrator(10 * GIB, 27 * GIB, 20 * GIB)
        .run(SpaceMode::Sequential)
        .await
        .unwrap();

    assert_eq!(report.archive_url, format!("{}{}", server.uri(), planet_path(&harness)));
    assert_eq!(report.remote_size, 10 * GIB);
    assert!(report.checksum_verified);
    assert_eq!(report.published_to, harness.config.paths.photon_data_dir());
}

#[tokio::test]
async fn short_staging_space_exits_75_without_downloading() {
    let (mut harness, server) = harness_with_server(None).await;
    harness.config.force_update = true;
    harness.config.strategy = UpdateStrategy::Parallel;
    seed_existing_index(&harness);

    let orchestrator = harness.orchestrator(10 * GIB, 5 * GIB, 20 * GIB);
    let entrypoint = Entrypoint::new(
        harness.config.clone(),
        Arc::new(orchestrator),
        Arc::new(NoOpNotifier),
        Arc::new(BuiltinRegions),
    );

    assert_eq!(entrypoint.startup().await, EXIT_INSUFFICIENT_SPACE);
    assert_eq!(archive_requests(&server, &harness).await, 0);
    assert!(harness.log.calls().is_empty());
    assert_eq!(marker(&harness), "stale");
}

#[tokio::test]
async fn short_data_space_only_matters_in_parallel_mode() {
    let (harness, _server) = harness_with_server(None).await;

    let err = harness
        .orchestrator(10 * GIB, 27 * GIB, 10 * GIB)
        .run(SpaceMode::Parallel)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InsufficientSpace {
            area: SpaceArea::Data,
            ..
        }
    ));

    harness
        .orchestrator(10 * GIB, 27 * GIB, 10 * GIB)
        .run(SpaceMode::Sequential)
        .await
        .unwrap();
}

#[tokio::test]
async fn unknown_remote_size_skips_the_space_check() {
    let (harness, _server) = harness_with_server(None).await;

    harness
        .orchestrator(0, 0, 0)
        .run(SpaceMode::Parallel)
        .await
        .unwrap();

    assert_eq!(marker(&harness), "fresh");
}

#[tokio::test]
async fn checksum_mismatch_keeps_the_old_index() {
    let (mut harness, _server) =
        harness_with_server(Some("0123456789abcdef0123456789abcdef")).await;
    harness.config.force_update = true;
    seed_existing_index(&harness);

    let orchestrator = harness.orchestrator(10 * GIB, 27 * GIB, 20 * GIB);
    let err = orchestrator.run(SpaceMode::Sequential).await.unwrap_err();
    assert!(matches!(
        err,
        Error::PostProcess(PostProcessError::ChecksumMismatch { .. })
    ));

    assert_eq!(harness.log.calls(), vec!["extract", "verify"]);
    assert_eq!(marker(&harness), "stale");

    let entrypoint = Entrypoint::new(
        harness.config.clone(),
        Arc::new(harness.orchestrator(10 * GIB, 27 * GIB, 20 * GIB)),
        Arc::new(NoOpNotifier),
        Arc::new(BuiltinRegions),
    );
    assert_eq!(entrypoint.startup().await, EXIT_FAILURE);
}

#[tokio::test]
async fn skipping_checksums_never_fetches_the_md5() {
    let (mut harness, server) = harness_with_server(Some("not even hex")).await;
    harness.config.download.skip_checksum = true;

    let report = harness
        .orchestrator(10 * GIB, 27 * GIB, 20 * GIB)
        .run(SpaceMode::Sequential)
        .await
        .unwrap();

    assert!(!report.checksum_verified);
    assert_eq!(harness.log.calls(), vec!["extract", "publish", "clear_staging"]);

    let md5_requests = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().ends_with(".md5"))
        .count();
    assert_eq!(md5_requests, 0);
}

#[tokio::test]
async fn file_url_overrides_the_region() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/mirror/custom.tar.bz2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(ARCHIVE_BODY))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/mirror/custom.tar.bz2.md5"))
        .respond_with(ResponseTemplate::new(200).set_body_string(archive_md5()))
        .expect(1)
        .mount(&server)
        .await;

    let mut harness = Harness::new(&server.uri());
    harness.config.download.region = Some("atlantis".to_string());
    harness.config.download.file_url = Some(format!("{}/mirror/custom.tar.bz2", server.uri()));

    let report = harness
        .orchestrator(GIB, 27 * GIB, 20 * GIB)
        .run(SpaceMode::Sequential)
        .await
        .unwrap();
    assert!(report.archive_url.ends_with("/mirror/custom.tar.bz2"));
}

#[tokio::test]
async fn failing_transfer_is_reported_after_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let harness = Harness::new(&server.uri());
    let err = harness
        .orchestrator(GIB, 27 * GIB, 20 * GIB)
        .run(SpaceMode::Sequential)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Download(DownloadError::TransferFailed { .. })
    ));
    // Two attempts configured by the harness
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert!(harness.log.calls().is_empty());
}
