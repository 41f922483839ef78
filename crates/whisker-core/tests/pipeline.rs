//! End-to-end batch against a mock HTTP image service.

use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use whisker_core::{Config, HttpSource, ImageStore, OutputKind, Pipeline, Stage};

fn png_bytes(seed: u8) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_fn(16, 12, |x, y| {
        image::Rgb([seed.wrapping_add((x * 13) as u8), (y * 17) as u8, 128])
    }));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

async fn mock_service() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/v1/images/search"))
        .and(query_param("limit", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"id": "one", "url": format!("{base}/img/one.png")},
            {"id": "two", "url": format!("{base}/img/two.png")},
            {"id": "three", "url": format!("{base}/img/three.png")},
        ])))
        .mount(&server)
        .await;

    for (name, seed) in [("one", 10u8), ("three", 200u8)] {
        Mock::given(method("GET"))
            .and(path(format!("/img/{name}.png")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(seed)))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/img/two.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    server
}

fn test_config(server: &MockServer, out: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.source.base_url = format!("{}/v1/images/search", server.uri());
    config.source.api_key = String::new();
    config.source.retry_attempts = 0;
    config.processing.parallel_workers = 2;
    config.output.dir = out.to_path_buf();
    config
}

#[tokio::test]
async fn test_second_download_fails() {
    let server = mock_service().await;
    let out = tempfile::tempdir().unwrap();
    let config = test_config(&server, out.path());

    let pipeline = Pipeline::from_config(&config).unwrap();
    let report = pipeline.run(3).await.unwrap();

    assert_eq!(report.discovered, 3);
    assert_eq!(report.downloaded, 2);
    assert_eq!(report.processed, 2);
    assert_eq!(report.excluded(), 1);
    assert_eq!(report.exclusions[0].index, 2);
    assert_eq!(report.exclusions[0].stage, Stage::Download);

    let mut written: Vec<String> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    written.sort();
    assert_eq!(
        written,
        vec![
            "1_original.png",
            "1_processed.png",
            "3_original.png",
            "3_processed.png",
        ]
    );
}

#[tokio::test]
async fn test_originals_are_stored_losslessly() {
    let server = mock_service().await;
    let out = tempfile::tempdir().unwrap();
    let config = test_config(&server, out.path());

    Pipeline::from_config(&config).unwrap().run(3).await.unwrap();

    let store = ImageStore::new(out.path());
    let stored = store.read(3, OutputKind::Original).await.unwrap();
    let decoded = image::load_from_memory(&png_bytes(200)).unwrap();
    let expected = whisker_core::Frame::from_dynamic(&decoded).unwrap();
    assert_eq!(stored, expected);

    let processed = store.read(3, OutputKind::Processed).await.unwrap();
    assert_eq!(processed.dimensions(), (12, 16));
}

#[tokio::test]
async fn test_discovery_status_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let out = tempfile::tempdir().unwrap();
    let config = test_config(&server, out.path());
    let source = HttpSource::from_config(&config).unwrap();
    let pipeline = Pipeline::new(&config, std::sync::Arc::new(source));

    let err = pipeline.run(3).await.unwrap_err();
    assert!(matches!(err, whisker_core::WhiskerError::Discovery(_)));
}
