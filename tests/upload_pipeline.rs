use async_trait::async_trait;
use docflow::notify::{NotificationKind, RecordingNotifier};
use docflow::orchestrator::NewUpload;
use docflow::transport::{Transport, TransportError, TransportRequest, UploadControl};
use docflow::{ItemId, SourceFile, UploadManager, UploadPolicy, UploadReceipt, UploadStatus, Validator};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Copy)]
enum Step {
    Succeed,
    Fail(&'static str),
    FailSilently,
    Hang,
}

/// In-process transport following a per-file script, one step per attempt.
#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    attempts: AtomicUsize,
}

impl ScriptedTransport {
    fn with(scripts: Vec<(&str, Vec<Step>)>) -> Arc<Self> {
        let transport = Self::default();
        {
            let mut map = transport.scripts.lock().unwrap();
            for (name, steps) in scripts {
                map.insert(name.to_string(), steps);
            }
        }
        Arc::new(transport)
    }

    fn next_step(&self, name: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(name) {
            Some(steps) if steps.len() > 1 => steps.remove(0),
            Some(steps) => steps.first().copied().unwrap_or(Step::Succeed),
            None => Step::Succeed,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn upload(
        &self,
        request: TransportRequest,
        control: UploadControl,
    ) -> Result<UploadReceipt, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        let step = self.next_step(request.file.name());
        control.progress.report(50.0);
        let outcome = match step {
            Step::Hang => {
                control.cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
            other => {
                tokio::select! {
                    _ = control.cancel.cancelled() => Err(TransportError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(20)) => match other {
                        Step::Fail(message) => Err(TransportError::Rejected {
                            status: Some(500),
                            message: Some(message.to_string()),
                        }),
                        Step::FailSilently => Err(TransportError::Rejected {
                            status: Some(500),
                            message: None,
                        }),
                        _ => {
                            control.progress.report(100.0);
                            Ok(UploadReceipt {
                                url: format!("https://docs.example/{}", request.file.name()),
                            })
                        }
                    },
                }
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

fn pdf(name: &str) -> NewUpload {
    NewUpload::new(SourceFile::from_bytes(
        name,
        "application/pdf",
        1_700_000_000_000,
        format!("%PDF-1.7 {name}").into_bytes(),
    ))
}

fn policy(cap: usize) -> UploadPolicy {
    UploadPolicy {
        max_concurrent_uploads: cap,
        ..UploadPolicy::default()
    }
}

async fn wait_idle(manager: &UploadManager) {
    tokio::time::timeout(Duration::from_secs(5), manager.wait_idle())
        .await
        .expect("pipeline settles")
        .expect("manager alive");
}

fn find(manager: &UploadManager, id: ItemId) -> docflow::UploadItem {
    manager
        .items()
        .into_iter()
        .find(|item| item.id() == id)
        .expect("item tracked")
}

#[tokio::test]
async fn uploads_respect_the_concurrency_cap() {
    let transport = ScriptedTransport::with(Vec::new());
    let manager = UploadManager::builder(Validator::new(policy(2)), transport.clone()).spawn();

    let uploads = (0..6).map(|index| pdf(&format!("doc-{index}.pdf"))).collect();
    let admissions = manager.submit(uploads).await.unwrap();
    assert!(admissions.iter().all(|admission| admission.is_admitted()));

    wait_idle(&manager).await;
    let summary = manager.summary().await.unwrap();
    assert_eq!(summary.completed, 6);
    assert_eq!(summary.uploaded_bytes, summary.total_bytes);
    assert!(transport.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 6);

    let metrics = manager.metrics();
    assert_eq!(metrics.uploads_completed, 6);
    assert_eq!(metrics.bytes_uploaded, summary.total_bytes);
    manager.shutdown().await;
}

#[tokio::test]
async fn one_failure_does_not_stop_the_queue() {
    let transport = ScriptedTransport::with(vec![("broken.pdf", vec![Step::Fail("Storage offline")])]);
    let notifier = Arc::new(RecordingNotifier::new());
    let manager = UploadManager::builder(Validator::new(policy(1)), transport)
        .notifier(notifier.clone())
        .spawn();

    let admissions = manager
        .submit(vec![pdf("first.pdf"), pdf("broken.pdf"), pdf("last.pdf")])
        .await
        .unwrap();
    let broken = admissions[1].item.as_ref().unwrap().id();
    wait_idle(&manager).await;

    let failed = find(&manager, broken);
    assert_eq!(failed.status(), UploadStatus::Error);
    assert_eq!(failed.error_message(), Some("Storage offline"));
    assert_eq!(failed.retry_count(), 1);

    let summary = manager.summary().await.unwrap();
    assert_eq!((summary.completed, summary.failed), (2, 1));

    let errors: Vec<_> = notifier
        .entries()
        .into_iter()
        .filter(|(kind, _, _)| *kind == NotificationKind::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].2.contains("Storage offline"));
    manager.shutdown().await;
}

#[tokio::test]
async fn silent_failures_use_the_fallback_message() {
    let transport = ScriptedTransport::with(vec![("quiet.pdf", vec![Step::FailSilently])]);
    let manager = UploadManager::builder(Validator::new(policy(1)), transport).spawn();

    let admissions = manager.submit(vec![pdf("quiet.pdf")]).await.unwrap();
    let id = admissions[0].item.as_ref().unwrap().id();
    wait_idle(&manager).await;

    assert_eq!(
        find(&manager, id).error_message(),
        Some("Upload failed. Please try again.")
    );
    manager.shutdown().await;
}

#[tokio::test]
async fn retry_recovers_a_failed_upload() {
    let transport = ScriptedTransport::with(vec![(
        "flaky.pdf",
        vec![Step::Fail("Gateway timeout"), Step::Succeed],
    )]);
    let completed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&completed);
    let manager = UploadManager::builder(Validator::new(policy(2)), transport)
        .on_complete(move |item| sink.lock().unwrap().push(item.id()))
        .spawn();

    let admissions = manager.submit(vec![pdf("flaky.pdf")]).await.unwrap();
    let id = admissions[0].item.as_ref().unwrap().id();
    wait_idle(&manager).await;
    assert_eq!(find(&manager, id).status(), UploadStatus::Error);

    assert!(manager.retry(id).await.unwrap());
    wait_idle(&manager).await;

    let item = find(&manager, id);
    assert_eq!(item.status(), UploadStatus::Completed);
    assert_eq!(item.retry_count(), 1);
    assert_eq!(item.progress(), Some(100.0));
    assert_eq!(item.result_url(), Some("https://docs.example/flaky.pdf"));
    assert_eq!(*completed.lock().unwrap(), vec![id]);
    assert!(!manager.retry(id).await.unwrap());
    manager.shutdown().await;
}

#[tokio::test]
async fn pausing_frees_the_slot_for_the_next_item() {
    let transport = ScriptedTransport::with(vec![("slow.pdf", vec![Step::Hang, Step::Succeed])]);
    let manager = UploadManager::builder(Validator::new(policy(1)), transport).spawn();

    let admissions = manager
        .submit(vec![pdf("slow.pdf"), pdf("next.pdf")])
        .await
        .unwrap();
    let slow = admissions[0].item.as_ref().unwrap().id();
    let next = admissions[1].item.as_ref().unwrap().id();
    assert_eq!(admissions[0].item.as_ref().unwrap().status(), UploadStatus::Uploading);
    assert_eq!(admissions[1].item.as_ref().unwrap().status(), UploadStatus::Queued);

    assert!(manager.pause(slow).await.unwrap());
    wait_idle(&manager).await;

    let paused = find(&manager, slow);
    assert_eq!(paused.status(), UploadStatus::Paused);
    assert_eq!(paused.error_message(), Some("Upload cancelled"));
    assert_eq!(paused.retry_count(), 0);
    assert_eq!(find(&manager, next).status(), UploadStatus::Completed);

    assert!(manager.retry(slow).await.unwrap());
    wait_idle(&manager).await;
    assert_eq!(find(&manager, slow).status(), UploadStatus::Completed);
    assert_eq!(find(&manager, slow).retry_count(), 0);
    manager.shutdown().await;
}

#[tokio::test]
async fn rejected_files_do_not_block_their_batch() {
    let transport = ScriptedTransport::with(Vec::new());
    let manager = UploadManager::builder(Validator::new(policy(3)), transport)
        .auto_start(false)
        .spawn();

    let admissions = manager
        .submit(vec![
            NewUpload::new(SourceFile::from_bytes(
                "budget.exe",
                "application/pdf",
                0,
                b"%PDF-1.4".to_vec(),
            )),
            pdf("statement.pdf"),
            NewUpload::new(SourceFile::from_bytes(
                "fake.pdf",
                "application/pdf",
                0,
                b"MZ\x90\x00".to_vec(),
            )),
        ])
        .await
        .unwrap();

    assert!(!admissions[0].is_admitted());
    assert!(admissions[1].is_admitted());
    assert!(!admissions[2].is_admitted());
    assert_eq!(manager.items().len(), 1);
    assert_eq!(manager.items()[0].status(), UploadStatus::Idle);

    assert_eq!(manager.start_all_idle().await.unwrap(), 1);
    wait_idle(&manager).await;
    assert_eq!(manager.summary().await.unwrap().completed, 1);
    manager.shutdown().await;
}

#[tokio::test]
async fn reorder_and_remove_through_the_manager() {
    let transport = ScriptedTransport::with(Vec::new());
    let manager = UploadManager::builder(Validator::new(policy(1)), transport)
        .auto_start(false)
        .spawn();
    manager
        .submit(vec![pdf("a.pdf"), pdf("b.pdf"), pdf("c.pdf")])
        .await
        .unwrap();
    let names = |manager: &UploadManager| -> Vec<String> {
        manager
            .items()
            .iter()
            .map(|item| item.file().name().to_string())
            .collect()
    };

    assert!(manager.reorder(2, 0).await.unwrap());
    assert_eq!(names(&manager), vec!["c.pdf", "a.pdf", "b.pdf"]);
    assert!(!manager.reorder(5, 0).await.unwrap());

    let a = manager.items()[1].id();
    assert!(manager.remove(a).await.unwrap());
    assert_eq!(names(&manager), vec!["c.pdf", "b.pdf"]);
    let orders: Vec<usize> = manager.items().iter().map(|item| item.order).collect();
    assert_eq!(orders, vec![0, 1]);
    manager.shutdown().await;
}

#[tokio::test]
async fn shutdown_pauses_outstanding_uploads() {
    let transport = ScriptedTransport::with(vec![("stuck.pdf", vec![Step::Hang])]);
    let manager = UploadManager::builder(Validator::new(policy(1)), transport).spawn();
    manager.submit(vec![pdf("stuck.pdf")]).await.unwrap();

    let view = manager.subscribe();
    manager.shutdown().await;
    let items = view.borrow().clone();
    assert_eq!(items[0].status(), UploadStatus::Paused);
}

#[tokio::test]
async fn shutdown_does_not_launch_queued_uploads() {
    let transport = ScriptedTransport::with(vec![
        ("one.pdf", vec![Step::Hang]),
        ("two.pdf", vec![Step::Hang]),
        ("three.pdf", vec![Step::Hang]),
    ]);
    let manager = UploadManager::builder(Validator::new(policy(1)), transport.clone()).spawn();
    manager
        .submit(vec![pdf("one.pdf"), pdf("two.pdf"), pdf("three.pdf")])
        .await
        .unwrap();
    let view = manager.subscribe();
    let metrics = manager.metrics();
    assert_eq!(metrics.uploads_started, 1);

    manager.shutdown().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(transport.attempts.load(Ordering::SeqCst) <= 1);
    assert!(
        view.borrow()
            .iter()
            .all(|item| item.status() == UploadStatus::Paused)
    );
}
