//! Router-level tests for the publish and status endpoints.

use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use vtube_api::auth::JwtVerifier;
use vtube_api::{create_router, ApiConfig, AppState};
use vtube_firestore::{MemoryVideoStore, VideoStore};
use vtube_models::{VideoId, VideoRecord, VideoStatus};
use vtube_queue::{JobQueue, MockJobPublisher, QueueConfig};

const SECRET: &str = "route-test-secret";
const BOUNDARY: &str = "vtube-test-boundary";

fn token_for(user_id: &str) -> String {
    let claims = json!({
        "_id": user_id,
        "username": "tester",
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

struct Harness {
    router: Router,
    store: Arc<MemoryVideoStore>,
    upload_dir: TempDir,
}

impl Harness {
    fn new(publisher: MockJobPublisher) -> Self {
        let upload_dir = TempDir::new().unwrap();
        let config = ApiConfig {
            upload_dir: upload_dir.path().to_path_buf(),
            ..ApiConfig::default()
        };

        let store = Arc::new(MemoryVideoStore::new());
        // Never connected to; readiness is not exercised here
        let queue = Arc::new(
            JobQueue::new(QueueConfig {
                redis_url: "redis://127.0.0.1:1".to_string(),
                ..QueueConfig::default()
            })
            .unwrap(),
        );

        let state = AppState::from_parts(
            config,
            store.clone(),
            Arc::new(publisher),
            queue,
            JwtVerifier::new(SECRET).unwrap(),
        );

        Self {
            router: create_router(state, None),
            store,
            upload_dir,
        }
    }

    fn staged_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path()).unwrap().count()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }
}

fn multipart_body(texts: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in texts {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, filename, content) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn publish_request(body: Vec<u8>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/videos")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(token) = token {
        builder = builder.header(header::COOKIE, format!("accessToken={token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

fn both_files() -> Vec<(&'static str, &'static str, &'static [u8])> {
    vec![
        ("videoFile", "clip.mp4", b"fake video bytes"),
        ("thumbnail", "thumb.jpg", b"fake image bytes"),
    ]
}

#[tokio::test]
async fn test_publish_accepts_and_queues_job() {
    let mut publisher = MockJobPublisher::new();
    publisher
        .expect_publish()
        .times(1)
        .withf(|job| {
            Path::new(&job.video_file_local_path).exists()
                && Path::new(&job.thumbnail_local_path).exists()
        })
        .returning(|_| Ok("1-0".to_string()));
    let harness = Harness::new(publisher);

    let body = multipart_body(&[("title", "My clip"), ("description", "Desc")], &both_files());
    let (status, json) = harness
        .send(publish_request(body, Some(&token_for("user-1"))))
        .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["success"], true);
    assert_eq!(json["statusCode"], 202);
    assert_eq!(json["data"]["status"], "processing");
    assert_eq!(json["data"]["owner"], "user-1");
    assert_eq!(json["data"]["isPublished"], false);

    // The staged files now belong to the job
    assert_eq!(harness.staged_files(), 2);

    let id = VideoId::from(json["data"]["id"].as_str().unwrap());
    let record = harness.store.get(&id).await.unwrap().unwrap();
    assert_eq!(record.status, VideoStatus::Processing);
    assert_eq!(record.title, "My clip");
}

#[tokio::test]
async fn test_publish_missing_title_is_rejected_and_files_removed() {
    let mut publisher = MockJobPublisher::new();
    publisher.expect_publish().never();
    let harness = Harness::new(publisher);

    let body = multipart_body(&[("description", "Desc")], &both_files());
    let (status, json) = harness
        .send(publish_request(body, Some(&token_for("user-1"))))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["success"], false);
    assert_eq!(json["message"], "title is required.");
    assert_eq!(harness.staged_files(), 0);
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_publish_without_token_is_unauthorized() {
    let mut publisher = MockJobPublisher::new();
    publisher.expect_publish().never();
    let harness = Harness::new(publisher);

    let body = multipart_body(&[("title", "T"), ("description", "D")], &both_files());
    let (status, json) = harness.send(publish_request(body, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["statusCode"], 401);
    assert_eq!(harness.staged_files(), 0);
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_anonymous_publish_is_rejected_before_staging() {
    let mut publisher = MockJobPublisher::new();
    publisher.expect_publish().never();
    let harness = Harness::new(publisher);

    // Missing title too; authentication is checked first
    let body = multipart_body(&[("description", "D")], &both_files());
    let (status, json) = harness.send(publish_request(body, None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert_eq!(harness.staged_files(), 0);
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_publish_with_invalid_token_is_unauthorized() {
    let mut publisher = MockJobPublisher::new();
    publisher.expect_publish().never();
    let harness = Harness::new(publisher);

    let body = multipart_body(&[("title", "T"), ("description", "D")], &both_files());
    let (status, _) = harness
        .send(publish_request(body, Some("not-a-jwt")))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn test_status_is_visible_to_owner_only() {
    let harness = Harness::new(MockJobPublisher::new());
    let record = VideoRecord::placeholder("T", "D", "owner-1");
    harness.store.insert(record.clone()).await;

    let status_request = |user: &str| {
        Request::builder()
            .uri(format!("/api/v1/videos/status/{}", record.id))
            .header(header::AUTHORIZATION, format!("Bearer {}", token_for(user)))
            .body(Body::empty())
            .unwrap()
    };

    let (status, json) = harness.send(status_request("owner-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "processing");
    assert_eq!(json["data"]["videoId"], record.id.as_str());

    let (status, _) = harness.send(status_request("someone-else")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_status_of_unknown_video_is_not_found() {
    let harness = Harness::new(MockJobPublisher::new());
    let request = Request::builder()
        .uri(format!("/api/v1/videos/status/{}", VideoId::new()))
        .header(header::AUTHORIZATION, format!("Bearer {}", token_for("u")))
        .body(Body::empty())
        .unwrap();

    let (status, json) = harness.send(request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn test_health_reports_ok() {
    let harness = Harness::new(MockJobPublisher::new());
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, json) = harness.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["message"], "Everything is OKAY");
}
