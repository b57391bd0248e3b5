use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;

use statuscast::channels::{OutgoingMessage, StatusClient};
use statuscast::gateway::{self, AppState};
use statuscast::upload::UploadLimits;
use statuscast::{AuthGate, ConfigStore, SessionEvent, SessionState, UploadPipeline};

const BOUNDARY: &str = "statuscast-test-boundary";

#[derive(Default)]
struct RecordingClient {
    sent: Mutex<Vec<OutgoingMessage>>,
    fail_with: Option<String>,
}

#[async_trait]
impl StatusClient for RecordingClient {
    fn name(&self) -> &str {
        "recording"
    }

    async fn listen(&self, _tx: mpsc::Sender<SessionEvent>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn send_message(&self, _target: &str, message: OutgoingMessage) -> anyhow::Result<()> {
        if let Some(cause) = &self.fail_with {
            anyhow::bail!("{cause}");
        }
        self.sent.lock().push(message);
        Ok(())
    }
}

struct Harness {
    router: Router,
    session: Arc<SessionState>,
    client: Arc<RecordingClient>,
    _tmp: TempDir,
}

impl Harness {
    fn build(password: Option<&str>, limits: UploadLimits, client: RecordingClient) -> Self {
        Self::build_limited(password, limits, client, 64 * 1024 * 1024)
    }

    fn build_limited(
        password: Option<&str>,
        limits: UploadLimits,
        client: RecordingClient,
        body_limit: usize,
    ) -> Self {
        let tmp = TempDir::new().unwrap();
        let session = Arc::new(SessionState::new());
        let client = Arc::new(client);
        let auth = Arc::new(AuthGate::new(
            Arc::clone(&session),
            ConfigStore::new(tmp.path()),
            password.map(str::to_string),
        ));
        let pipeline = Arc::new(UploadPipeline::new(client.clone(), limits));
        let state = AppState {
            session: Arc::clone(&session),
            auth,
            pipeline,
        };
        Self {
            router: gateway::router(state, body_limit),
            session,
            client,
            _tmp: tmp,
        }
    }

    fn new(password: Option<&str>) -> Self {
        Self::build(password, UploadLimits::default(), RecordingClient::default())
    }

    fn paired(self) -> Self {
        self.session.apply(SessionEvent::PairingCode("2@code".into()));
        self.session.apply(SessionEvent::Ready);
        self
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    async fn setup(&self, body: Value) -> (StatusCode, Value) {
        let request = Request::post("/api/setup")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = self.send(request).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    fn sent(&self) -> Vec<OutgoingMessage> {
        self.client.sent.lock().clone()
    }
}

#[derive(Default)]
struct Form {
    body: Vec<u8>,
}

impl Form {
    fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, filename: &str, mime: &str, size: usize) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"mediaFile\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend(std::iter::repeat(b'x').take(size));
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn request(mut self) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .header(header::CONTENT_LENGTH, self.body.len())
            .body(Body::from(self.body))
            .unwrap()
    }
}

fn caption_of(message: &OutgoingMessage) -> Option<&str> {
    match message {
        OutgoingMessage::Media { caption, .. } => caption.as_deref(),
        OutgoingMessage::Text { .. } => None,
    }
}

#[tokio::test]
async fn qr_endpoint_follows_the_session() {
    let harness = Harness::new(None);

    let (status, body) = harness.get_json("/api/qr").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ready": false, "qrDataUrl": ""}));

    harness
        .session
        .apply(SessionEvent::PairingCode("2@first".into()));
    let (_, body) = harness.get_json("/api/qr").await;
    assert_eq!(body["ready"], false);
    assert!(body["qrDataUrl"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    harness.session.apply(SessionEvent::Ready);
    let (_, body) = harness.get_json("/api/qr").await;
    assert_eq!(body, json!({"ready": true, "qrDataUrl": ""}));
}

#[tokio::test]
async fn health_reports_readiness_and_setup() {
    let harness = Harness::new(Some("abc123")).paired();
    let (status, body) = harness.get_json("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
    assert_eq!(body["passwordConfigured"], true);
}

#[tokio::test]
async fn setup_before_pairing_conflicts() {
    let harness = Harness::new(None);
    let (status, body) = harness.setup(json!({"password": "longenough"})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn setup_then_change_password() {
    let harness = Harness::new(None).paired();

    let (status, body) = harness.setup(json!({"password": "abc123"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"ok": true}));

    let (status, _) = harness
        .setup(json!({"password": "longenough", "currentPassword": "wrong"}))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = harness
        .setup(json!({"password": "short", "currentPassword": "abc123"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("6"));

    let (status, _) = harness
        .setup(json!({"password": "longenough", "currentPassword": "abc123"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = harness
        .send(Form::default().text("password", "abc123").text("textStatus", "hi").request())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = harness
        .send(Form::default().text("password", "longenough").text("textStatus", "hi").request())
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn malformed_setup_body_is_bad_request() {
    let harness = Harness::new(None).paired();
    let request = Request::post("/api/setup")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{nope"))
        .unwrap();
    let (status, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn upload_gates_run_in_order() {
    let unpaired = Harness::new(Some("abc123"));
    let (status, _) = unpaired
        .send(Form::default().text("password", "abc123").text("textStatus", "hi").request())
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let no_password = Harness::new(None).paired();
    let (status, body) = no_password
        .send(Form::default().text("password", "").text("textStatus", "hi").request())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body.contains("/setup"));

    let wrong = Harness::new(Some("abc123")).paired();
    let (status, _) = wrong
        .send(Form::default().text("password", "nope").text("textStatus", "hi").request())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(wrong.sent().is_empty());
}

#[tokio::test]
async fn upload_posts_files_then_text_in_order() {
    let harness = Harness::new(Some("abc123")).paired();
    let (status, body) = harness
        .send(
            Form::default()
                .text("password", "abc123")
                .file("A.png", "image/png", 1024)
                .file("B.mp4", "video/mp4", 2048)
                .text("captions", "hello")
                .text("textStatus", "  evening update ")
                .request(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let sent = harness.sent();
    assert_eq!(sent.len(), 3);
    match &sent[0] {
        OutgoingMessage::Media { media, caption } => {
            assert_eq!(media.filename, "A.png");
            assert_eq!(media.mimetype, "image/png");
            assert_eq!(caption.as_deref(), Some("hello"));
        }
        other => panic!("expected media, got {other:?}"),
    }
    match &sent[1] {
        OutgoingMessage::Media { media, caption } => {
            assert_eq!(media.filename, "B.mp4");
            assert_eq!(caption, &None);
        }
        other => panic!("expected media, got {other:?}"),
    }
    assert_eq!(
        sent[2],
        OutgoingMessage::Text {
            body: "evening update".into()
        }
    );
}

#[tokio::test]
async fn singular_caption_field_is_accepted() {
    let harness = Harness::new(Some("abc123")).paired();
    let (status, _) = harness
        .send(
            Form::default()
                .text("password", "abc123")
                .file("A.png", "image/png", 16)
                .text("caption", "only one")
                .request(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(caption_of(&harness.sent()[0]), Some("only one"));
}

#[tokio::test]
async fn unsupported_type_rejects_whole_batch() {
    let harness = Harness::new(Some("abc123")).paired();
    let (status, body) = harness
        .send(
            Form::default()
                .text("password", "abc123")
                .file("ok.png", "image/png", 16)
                .file("notes.pdf", "application/pdf", 16)
                .request(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("notes.pdf"));
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn empty_upload_is_bad_request() {
    let harness = Harness::new(Some("abc123")).paired();
    let (status, _) = harness
        .send(
            Form::default()
                .text("password", "abc123")
                .text("textStatus", "   ")
                .request(),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn count_and_size_limits_are_413() {
    let limits = UploadLimits {
        max_files: 2,
        max_file_bytes: 100,
        ..UploadLimits::default()
    };
    let harness =
        Harness::build(Some("abc123"), limits, RecordingClient::default()).paired();

    let (status, _) = harness
        .send(
            Form::default()
                .text("password", "abc123")
                .file("1.png", "image/png", 10)
                .file("2.png", "image/png", 10)
                .file("3.png", "image/png", 10)
                .request(),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, _) = harness
        .send(
            Form::default()
                .text("password", "abc123")
                .file("big.png", "image/png", 101)
                .request(),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn delivery_failure_is_500_with_cause() {
    let client = RecordingClient {
        fail_with: Some("session logged out".into()),
        ..RecordingClient::default()
    };
    let harness = Harness::build(Some("abc123"), UploadLimits::default(), client).paired();
    let (status, body) = harness
        .send(
            Form::default()
                .text("password", "abc123")
                .file("a.png", "image/png", 16)
                .request(),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("session logged out"));
}

#[tokio::test]
async fn oversized_body_is_rejected_by_limit() {
    let harness = Harness::build_limited(
        Some("abc123"),
        UploadLimits::default(),
        RecordingClient::default(),
        512,
    )
    .paired();

    let request = Form::default()
        .text("password", "abc123")
        .file("a.png", "image/png", 4096)
        .request();
    let (status, _) = harness.send(request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn oversized_body_still_reports_pairing_and_setup_first() {
    let oversized = || {
        Form::default()
            .text("password", "abc123")
            .file("a.png", "image/png", 4096)
            .request()
    };

    let unpaired = Harness::build_limited(
        Some("abc123"),
        UploadLimits::default(),
        RecordingClient::default(),
        512,
    );
    let (status, _) = unpaired.send(oversized()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let unconfigured =
        Harness::build_limited(None, UploadLimits::default(), RecordingClient::default(), 512)
            .paired();
    let (status, _) = unconfigured.send(oversized()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn oversized_part_stops_before_the_password_is_checked() {
    let limits = UploadLimits {
        max_file_bytes: 100,
        ..UploadLimits::default()
    };
    let harness =
        Harness::build(Some("abc123"), limits, RecordingClient::default()).paired();

    // The part runs far past the per-file limit and the password that
    // follows it is wrong; the size cutoff answers first.
    let (status, body) = harness
        .send(
            Form::default()
                .file("huge.mp4", "video/mp4", 8 * 1024 * 1024)
                .text("password", "wrong")
                .request(),
        )
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(body.contains("huge.mp4"));
    assert!(harness.sent().is_empty());
}

#[tokio::test]
async fn pages_are_served() {
    let harness = Harness::new(None);
    for uri in ["/", "/setup"] {
        let (status, body) = harness
            .send(Request::get(uri).body(Body::empty()).unwrap())
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<html"));
    }
}
