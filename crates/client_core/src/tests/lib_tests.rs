use super::*;
use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use tokio::sync::Notify;

enum Scripted {
    Reply(TransportResponse),
    Status(u16, &'static str),
    /// Signals `entered`, then waits for `release` before replying.
    Gated(TransportResponse),
    Hang,
}

struct FakeTransport {
    script: std::sync::Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
    sent: std::sync::Mutex<Vec<JobPayload>>,
    entered: Notify,
    release: Notify,
}

impl FakeTransport {
    fn new(script: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            script: std::sync::Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
            sent: std::sync::Mutex::new(Vec::new()),
            entered: Notify::new(),
            release: Notify::new(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn sent(&self) -> Vec<JobPayload> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl JobTransport for FakeTransport {
    async fn send(&self, payload: JobPayload) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().expect("sent lock").push(payload);
        let next = self
            .script
            .lock()
            .expect("script lock")
            .pop_front()
            .expect("unscripted transport call");
        match next {
            Scripted::Reply(response) => Ok(response),
            Scripted::Status(status, message) => Err(TransportError::Status {
                status,
                message: message.to_string(),
            }),
            Scripted::Gated(response) => {
                self.entered.notify_one();
                self.release.notified().await;
                Ok(response)
            }
            Scripted::Hang => {
                self.entered.notify_one();
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

#[derive(Default)]
struct FakeDownloads {
    saved: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeDownloads {
    fn saved(&self) -> Vec<(String, Vec<u8>)> {
        self.saved.lock().expect("saved lock").clone()
    }
}

#[async_trait]
impl DownloadSink for FakeDownloads {
    async fn save(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        self.saved
            .lock()
            .expect("saved lock")
            .push((file_name.to_string(), bytes.to_vec()));
        Ok(PathBuf::from("/downloads").join(file_name))
    }
}

fn bytes_reply(body: &[u8]) -> TransportResponse {
    TransportResponse {
        content_type: Some("text/csv".to_string()),
        body: body.to_vec(),
    }
}

fn json_reply(body: &str) -> TransportResponse {
    TransportResponse {
        content_type: Some("application/json".to_string()),
        body: body.as_bytes().to_vec(),
    }
}

fn csv(name: &str) -> InputArtifact {
    InputArtifact::new(name, "text/csv", b"age,flag,income\n30,1,100\n".to_vec())
}

fn session(
    transport: Arc<FakeTransport>,
    downloads: Arc<FakeDownloads>,
) -> Arc<JobSession> {
    Arc::new(JobSession::new(
        transport,
        downloads,
        Duration::from_secs(5),
    ))
}

async fn fill_noise_example(session: &JobSession) {
    session.set_noise_field(NoiseField::Private, "age").await;
    session.set_noise_field(NoiseField::Binary, "flag").await;
    session.set_noise_field(NoiseField::Categorical, "").await;
    session.set_noise_field(NoiseField::Numerical, "income").await;
    session.set_noise_field(NoiseField::Epsilon, "0.5,0.01,1").await;
}

async fn fill_ml_example(session: &JobSession) {
    session
        .set_ml_field(MlField::InputColumns, "a,b")
        .await
        .expect("colinp");
    session
        .set_ml_field(MlField::OutputColumn, "y")
        .await
        .expect("colop");
    session
        .set_ml_field(MlField::Algorithm, "1")
        .await
        .expect("mlalgo");
    session
        .set_ml_field(MlField::TrainTest, "80,20")
        .await
        .expect("traintest");
    session
        .set_ml_field(MlField::MlParams, "1.0,1,0")
        .await
        .expect("mlpara");
}

#[tokio::test]
async fn submit_without_file_is_rejected_before_network() {
    let transport = FakeTransport::new(Vec::new());
    let session = session(transport.clone(), Arc::new(FakeDownloads::default()));
    fill_noise_example(&session).await;

    let err = session.submit().await.expect_err("must fail");
    assert!(matches!(err, SubmitError::MissingInput));
    assert_eq!(transport.calls(), 0);
    assert_eq!(session.state().await, SubmissionState::Idle);
    assert_eq!(
        session.last_error().await.as_deref(),
        Some(error::MISSING_INPUT_MESSAGE)
    );
}

#[tokio::test]
async fn noise_submission_downloads_prefixed_file() {
    let transport = FakeTransport::new(vec![Scripted::Reply(bytes_reply(b"X"))]);
    let downloads = Arc::new(FakeDownloads::default());
    let session = session(transport.clone(), downloads.clone());
    assert!(session.select_files(vec![csv("data.csv")]).await);
    fill_noise_example(&session).await;

    let outcome = session.submit().await.expect("submit");

    assert_eq!(
        outcome,
        SubmissionOutcome::Downloaded {
            file_name: "private_data.csv".to_string(),
            path: PathBuf::from("/downloads/private_data.csv"),
        }
    );
    assert_eq!(
        downloads.saved(),
        vec![("private_data.csv".to_string(), b"X".to_vec())]
    );
    assert_eq!(session.results().await, None);
    assert_eq!(session.state().await, SubmissionState::Succeeded);

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    let payload = &sent[0];
    assert_eq!(payload.mode, Mode::Noise);
    assert_eq!(payload.artifact.name, "data.csv");
    assert_eq!(
        payload.fields,
        vec![
            ("private", "age".to_string()),
            ("binary", "flag".to_string()),
            ("categorical", String::new()),
            ("numerical", "income".to_string()),
            ("epsilon", "0.5,0.01,1".to_string()),
        ]
    );
}

#[tokio::test]
async fn ml_submission_populates_result_set_without_download() {
    let transport = FakeTransport::new(vec![Scripted::Reply(json_reply(
        r#"{"accuracy1":0.91,"accuracy2":0.77}"#,
    ))]);
    let downloads = Arc::new(FakeDownloads::default());
    let session = session(transport.clone(), downloads.clone());
    session.select_files(vec![csv("data.csv")]).await;
    session.set_mode(Mode::Ml).await;
    fill_ml_example(&session).await;

    let outcome = session.submit().await.expect("submit");

    let expected = ResultSet {
        non_private_accuracy: 0.91,
        private_accuracy: 0.77,
    };
    assert_eq!(outcome, SubmissionOutcome::Scored(expected));
    assert_eq!(session.results().await, Some(expected));
    assert!(downloads.saved().is_empty());

    let payload = &transport.sent()[0];
    assert_eq!(payload.field("colinp"), Some("a,b"));
    assert_eq!(payload.field("colop"), Some("y"));
    assert_eq!(payload.field("mlalgo"), Some("1"));
    assert_eq!(payload.field("traintest"), Some("80,20"));
    assert_eq!(payload.field("mlpara"), Some("1.0,1,0"));
    for noise_key in ["private", "binary", "categorical", "numerical", "epsilon"] {
        assert_eq!(payload.field(noise_key), None, "unexpected key {noise_key}");
    }
}

#[tokio::test]
async fn response_is_interpreted_under_mode_at_submit_time() {
    let transport = FakeTransport::new(vec![Scripted::Gated(bytes_reply(b"X"))]);
    let downloads = Arc::new(FakeDownloads::default());
    let session = session(transport.clone(), downloads.clone());
    session.select_files(vec![csv("data.csv")]).await;
    fill_noise_example(&session).await;

    let in_flight = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.submit().await })
    };
    transport.entered.notified().await;
    assert!(session.is_busy().await);

    session.set_mode(Mode::Ml).await;
    transport.release.notify_one();

    let outcome = in_flight.await.expect("join").expect("submit");
    assert!(matches!(outcome, SubmissionOutcome::Downloaded { .. }));
    assert_eq!(downloads.saved().len(), 1);
    assert_eq!(session.results().await, None);
    assert_eq!(session.mode().await, Mode::Ml);
}

#[tokio::test]
async fn second_submit_while_in_flight_is_rejected() {
    let transport = FakeTransport::new(vec![Scripted::Gated(bytes_reply(b"X"))]);
    let session = session(transport.clone(), Arc::new(FakeDownloads::default()));
    session.select_files(vec![csv("data.csv")]).await;

    let in_flight = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.submit().await })
    };
    transport.entered.notified().await;

    let err = session.submit().await.expect_err("must be rejected");
    assert!(matches!(err, SubmitError::AlreadyInFlight));
    assert_eq!(transport.calls(), 1);

    transport.release.notify_one();
    in_flight.await.expect("join").expect("first submit");
    assert_eq!(transport.calls(), 1);
    assert_eq!(session.state().await, SubmissionState::Succeeded);
}

#[tokio::test]
async fn rapid_submits_issue_one_request() {
    let transport = FakeTransport::new(vec![Scripted::Gated(bytes_reply(b"X"))]);
    let session = session(transport.clone(), Arc::new(FakeDownloads::default()));
    session.select_files(vec![csv("data.csv")]).await;

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.submit().await })
        })
        .collect();
    transport.entered.notified().await;
    transport.release.notify_one();

    let mut succeeded = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => succeeded += 1,
            Err(SubmitError::AlreadyInFlight) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(rejected, 4);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn transport_failure_is_generic_and_rearms() {
    let transport = FakeTransport::new(vec![
        Scripted::Status(400, "Invalid epsilon parameters"),
        Scripted::Reply(bytes_reply(b"X")),
    ]);
    let session = session(transport.clone(), Arc::new(FakeDownloads::default()));
    session.select_files(vec![csv("data.csv")]).await;

    let err = session.submit().await.expect_err("must fail");
    assert!(matches!(
        err,
        SubmitError::Transport(TransportError::Status { status: 400, .. })
    ));
    assert_eq!(
        session.state().await,
        SubmissionState::Failed(error::GENERIC_FAILURE_MESSAGE.to_string())
    );
    let shown = session.last_error().await.expect("error shown");
    assert!(!shown.contains("epsilon"), "raw cause leaked: {shown}");

    session.submit().await.expect("second attempt");
    assert_eq!(session.state().await, SubmissionState::Succeeded);
    assert_eq!(session.last_error().await, None);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn timeout_fails_submission_and_rearms() {
    let transport = FakeTransport::new(vec![Scripted::Hang, Scripted::Reply(bytes_reply(b"X"))]);
    let downloads = Arc::new(FakeDownloads::default());
    let session = JobSession::new(transport.clone(), downloads, Duration::from_millis(50));
    session.select_files(vec![csv("data.csv")]).await;

    let err = session.submit().await.expect_err("must time out");
    assert!(matches!(err, SubmitError::Timeout(_)));
    assert!(matches!(session.state().await, SubmissionState::Failed(_)));

    session.submit().await.expect("retry");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn malformed_ml_response_fails_and_keeps_previous_results() {
    let transport = FakeTransport::new(vec![
        Scripted::Reply(json_reply(r#"{"accuracy1":0.8,"accuracy2":0.6}"#)),
        Scripted::Reply(json_reply(r#"{"accuracy1":0.9}"#)),
    ]);
    let session = session(transport, Arc::new(FakeDownloads::default()));
    session.select_files(vec![csv("data.csv")]).await;
    session.set_mode(Mode::Ml).await;

    session.submit().await.expect("first");
    let err = session.submit().await.expect_err("second must fail");
    assert!(matches!(err, SubmitError::MalformedResponse(_)));
    assert_eq!(
        session.results().await,
        Some(ResultSet {
            non_private_accuracy: 0.8,
            private_accuracy: 0.6,
        })
    );
    assert!(matches!(session.state().await, SubmissionState::Failed(_)));
}

#[tokio::test]
async fn switching_modes_preserves_builders_file_and_results() {
    let transport = FakeTransport::new(vec![Scripted::Reply(json_reply(
        r#"{"accuracy1":0.5,"accuracy2":0.4}"#,
    ))]);
    let session = session(transport, Arc::new(FakeDownloads::default()));
    session.select_files(vec![csv("data.csv")]).await;
    fill_noise_example(&session).await;
    let noise_before = session.noise_snapshot().await;

    session.set_mode(Mode::Ml).await;
    fill_ml_example(&session).await;
    session.submit().await.expect("ml submit");
    let ml_before = session.ml_snapshot().await;

    session.set_mode(Mode::Noise).await;
    assert_eq!(session.noise_snapshot().await, noise_before);
    session.set_mode(Mode::Ml).await;
    assert_eq!(session.ml_snapshot().await, ml_before);
    assert_eq!(session.current_file_name().await.as_deref(), Some("data.csv"));
    assert!(session.results().await.is_some());
}

#[tokio::test]
async fn payload_is_captured_at_submit_time() {
    let transport = FakeTransport::new(vec![Scripted::Gated(bytes_reply(b"X"))]);
    let session = session(transport.clone(), Arc::new(FakeDownloads::default()));
    session.select_files(vec![csv("data.csv")]).await;
    session.set_noise_field(NoiseField::Private, "age").await;

    let in_flight = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.submit().await })
    };
    transport.entered.notified().await;
    session.set_noise_field(NoiseField::Private, "income").await;
    session.select_files(vec![csv("other.csv")]).await;
    transport.release.notify_one();

    let outcome = in_flight.await.expect("join").expect("submit");
    let sent = transport.sent();
    assert_eq!(sent[0].field("private"), Some("age"));
    assert_eq!(sent[0].artifact.name, "data.csv");
    assert!(matches!(
        outcome,
        SubmissionOutcome::Downloaded { file_name, .. } if file_name == "private_data.csv"
    ));
}

#[tokio::test]
async fn set_field_targets_active_builder() {
    let session = session(FakeTransport::new(Vec::new()), Arc::new(FakeDownloads::default()));
    session.set_field("private", "age").await.expect("noise key");
    assert!(session.set_field("colinp", "a").await.is_err());

    session.set_mode(Mode::Ml).await;
    session.set_field("colinp", "a").await.expect("ml key");
    assert!(session.set_field("private", "age").await.is_err());

    assert_eq!(session.noise_snapshot().await.private_columns, "age");
    assert_eq!(session.ml_snapshot().await.input_columns, "a");
}

#[tokio::test]
async fn rejected_selection_keeps_held_file() {
    let session = session(FakeTransport::new(Vec::new()), Arc::new(FakeDownloads::default()));
    assert!(session.select_files(vec![csv("data.csv")]).await);
    assert!(!session
        .select_files(vec![csv("a.csv"), csv("b.csv")])
        .await);
    assert!(!session
        .select_files(vec![InputArtifact::new("notes.txt", "text/plain", Vec::new())])
        .await);
    assert!(!session.select_files(Vec::new()).await);
    assert_eq!(session.current_file_name().await.as_deref(), Some("data.csv"));
}

#[tokio::test]
async fn aborted_submit_does_not_lock_the_session() {
    let transport = FakeTransport::new(vec![Scripted::Hang, Scripted::Reply(bytes_reply(b"X"))]);
    let session = session(transport.clone(), Arc::new(FakeDownloads::default()));
    session.select_files(vec![csv("data.csv")]).await;

    let in_flight = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.submit().await })
    };
    transport.entered.notified().await;
    assert!(session.is_busy().await);

    in_flight.abort();
    let joined = in_flight.await;
    assert!(joined.expect_err("aborted").is_cancelled());

    assert_eq!(
        session.state().await,
        SubmissionState::Failed(error::GENERIC_FAILURE_MESSAGE.to_string())
    );
    session.submit().await.expect("session usable after abort");
    assert_eq!(session.state().await, SubmissionState::Succeeded);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn completed_submit_leaves_no_pending_reset() {
    let transport = FakeTransport::new(vec![Scripted::Reply(bytes_reply(b"X"))]);
    let session = session(transport, Arc::new(FakeDownloads::default()));
    session.select_files(vec![csv("data.csv")]).await;

    session.submit().await.expect("submit");
    tokio::task::yield_now().await;
    assert_eq!(session.state().await, SubmissionState::Succeeded);
    assert_eq!(session.last_error().await, None);
}

#[test]
fn only_guard_failures_are_preconditions() {
    assert!(SubmitError::MissingInput.is_precondition());
    assert!(SubmitError::AlreadyInFlight.is_precondition());
    assert!(!SubmitError::Timeout(Duration::from_secs(1)).is_precondition());
    assert!(!SubmitError::MalformedResponse("x".into()).is_precondition());
}
