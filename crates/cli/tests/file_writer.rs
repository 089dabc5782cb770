//! [`FileWriterSink`] against a real directory and an in-process download
//! endpoint.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::header;
use axum::routing::get;
use axum::Router;

use kenburns_cli::sink::FileWriterSink;
use kenburns_client::ConversionApi;
use kenburns_core::effects::EffectCatalog;
use kenburns_core::job::{Job, SourceFile};
use kenburns_pipeline::{Artifact, CompletionSink, DeliveryError};

fn scratch_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    std::env::temp_dir().join(format!("kenburns-{name}-{}-{nanos}", std::process::id()))
}

fn job() -> Job {
    let catalog = EffectCatalog::default();
    Job::new(
        1,
        SourceFile::new("beach.png", "image/png", vec![1]),
        catalog.default_effect(),
        5.0,
        1,
    )
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server should run");
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn inline_artifacts_never_overwrite() {
    let dir = scratch_dir("inline");
    let sink = FileWriterSink::new(ConversionApi::new("http://127.0.0.1:1"), &dir);

    for bytes in [vec![1u8], vec![2u8], vec![3u8]] {
        sink.deliver(
            &job(),
            Artifact::Inline {
                filename: "motion_zoom_in_center.mp4".into(),
                bytes,
            },
        )
        .await
        .expect("delivery should succeed");
    }

    assert_eq!(std::fs::read(dir.join("motion_zoom_in_center.mp4")).unwrap(), vec![1]);
    assert_eq!(std::fs::read(dir.join("motion_zoom_in_center_2.mp4")).unwrap(), vec![2]);
    assert_eq!(std::fs::read(dir.join("motion_zoom_in_center_3.mp4")).unwrap(), vec![3]);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn remote_artifact_is_downloaded() {
    let app = Router::new().route(
        "/api/download/{job_id}",
        get(|| async { ([(header::CONTENT_TYPE, "video/mp4")], vec![7u8; 12]) }),
    );
    let dir = scratch_dir("remote");
    let sink = FileWriterSink::new(ConversionApi::new(spawn(app).await), &dir);

    sink.deliver(
        &job(),
        Artifact::Remote {
            handle: "abc".into(),
            filename: "motion_pan_left_to_right.mp4".into(),
        },
    )
    .await
    .expect("delivery should succeed");

    let saved = std::fs::read(dir.join("motion_pan_left_to_right.mp4")).unwrap();
    assert_eq!(saved, vec![7u8; 12]);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn failed_download_is_reported() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let dir = scratch_dir("unreachable");
    let sink = FileWriterSink::new(ConversionApi::new(format!("http://{addr}")), &dir);

    let result = sink
        .deliver(
            &job(),
            Artifact::Remote {
                handle: "abc".into(),
                filename: "motion_x.mp4".into(),
            },
        )
        .await;
    assert!(matches!(result, Err(DeliveryError::Download(_))));
    assert!(!dir.join("motion_x.mp4").exists());
}
