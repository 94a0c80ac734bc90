use docflow::transport::{
    HttpTransport, ProgressReporter, Transport, TransportError, TransportRequest, UploadControl,
};
use docflow::{DocumentType, SourceFile};
use httpmock::{Method::POST, MockServer};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn request(name: &str, body: &[u8]) -> TransportRequest {
    TransportRequest {
        file: SourceFile::from_bytes(name, "application/pdf", 0, body.to_vec()),
        document_type: DocumentType::Invoice,
        title: "March invoice".to_string(),
    }
}

fn control() -> (UploadControl, Arc<Mutex<Vec<f64>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let cancel = CancellationToken::new();
    let progress = {
        let seen = Arc::clone(&seen);
        ProgressReporter::new(cancel.clone(), move |percent| {
            seen.lock().unwrap().push(percent)
        })
    };
    (UploadControl { cancel, progress }, seen)
}

#[tokio::test]
async fn uploads_body_with_metadata_and_token() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/upload")
                .query_param("fileName", "march.pdf")
                .query_param("documentType", "invoice")
                .query_param("title", "March invoice")
                .header("authorization", "Bearer secret")
                .header("content-type", "application/pdf")
                .body("%PDF-1.7 march");
            then.status(200)
                .json_body(json!({ "url": "https://docs.example/march.pdf" }));
        })
        .await;

    let transport = HttpTransport::new(&server.url("/upload"), Some("secret".into()))
        .expect("transport");
    let (control, seen) = control();
    let receipt = transport
        .upload(request("march.pdf", b"%PDF-1.7 march"), control)
        .await
        .expect("upload succeeds");

    mock.assert_async().await;
    assert_eq!(receipt.url, "https://docs.example/march.pdf");
    let seen = seen.lock().unwrap();
    assert_eq!(seen.last().copied(), Some(100.0));
}

#[tokio::test]
async fn rejection_carries_server_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/upload");
            then.status(413)
                .json_body(json!({ "error": "Document exceeds plan limit" }));
        })
        .await;

    let transport = HttpTransport::new(&server.url("/upload"), None).expect("transport");
    let (control, _) = control();
    let error = transport
        .upload(request("big.pdf", b"%PDF-1.7"), control)
        .await
        .unwrap_err();

    match &error {
        TransportError::Rejected { status, message } => {
            assert_eq!(*status, Some(413));
            assert_eq!(message.as_deref(), Some("Document exceeds plan limit"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!error.is_cancelled());
    assert_eq!(
        error.user_message().as_deref(),
        Some("Document exceeds plan limit")
    );
}

#[tokio::test]
async fn silent_failure_has_no_user_message() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/upload");
            then.status(500).body("");
        })
        .await;

    let transport = HttpTransport::new(&server.url("/upload"), None).expect("transport");
    let (control, _) = control();
    let error = transport
        .upload(request("a.pdf", b"%PDF-1.7"), control)
        .await
        .unwrap_err();
    assert!(error.user_message().is_none());
}

#[tokio::test]
async fn missing_url_in_response_is_a_failure() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/upload");
            then.status(200).json_body(json!({ "url": "" }));
        })
        .await;

    let transport = HttpTransport::new(&server.url("/upload"), None).expect("transport");
    let (control, _) = control();
    let error = transport
        .upload(request("a.pdf", b"%PDF-1.7"), control)
        .await
        .unwrap_err();
    assert!(matches!(error, TransportError::Rejected { .. }));
}

#[tokio::test]
async fn cancellation_aborts_pending_request() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/upload");
            then.status(200)
                .delay(Duration::from_secs(10))
                .json_body(json!({ "url": "https://docs.example/late.pdf" }));
        })
        .await;

    let transport = HttpTransport::new(&server.url("/upload"), None).expect("transport");
    let (control, _) = control();
    let cancel = control.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let started = std::time::Instant::now();
    let error = transport
        .upload(request("late.pdf", b"%PDF-1.7"), control)
        .await
        .unwrap_err();

    assert!(error.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn endpoint_must_be_http() {
    let error = HttpTransport::new("file:///tmp/upload", None).unwrap_err();
    assert!(matches!(error, TransportError::InvalidEndpoint(_)));
}
