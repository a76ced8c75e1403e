//! Integration tests for the conversion pipeline.
//!
//! The rendering service is replaced by a scripted [`RenderTransport`] that
//! decodes the diagram source from the request URL and answers according to
//! a per-test closure, so every scenario runs offline and deterministically.
//! One test goes through the real `HttpTransport` against a closed local port.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use futures::future::BoxFuture;
use mmd2svg::{
    convert, convert_with_interrupt, inspect, AttemptFailure, BatchStatus, ConversionConfig,
    ConversionProgressCallback, DiagramError, FailureClass, FailureClassifier, FailureKind,
    Interrupt, Mmd2SvgError, RenderTransport, TransportResponse,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Answer = Result<TransportResponse, AttemptFailure>;
type Responder = dyn Fn(&str, u32) -> Answer + Send + Sync;

/// Fake rendering service. The responder receives the decoded diagram source
/// and the 1-based number of requests seen so far for that source.
struct FakeService {
    responder: Box<Responder>,
    calls: Mutex<Vec<String>>,
}

impl FakeService {
    fn new(responder: impl Fn(&str, u32) -> Answer + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, source: &str) -> usize {
        self.calls().iter().filter(|s| s.as_str() == source).count()
    }
}

impl RenderTransport for FakeService {
    fn get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Answer> {
        let tail = url.rsplit('/').next().unwrap();
        let payload = tail.split('?').next().unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(payload).unwrap();
        let source = String::from_utf8(bytes).unwrap();
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(source.clone());
            calls.iter().filter(|s| **s == source).count() as u32
        };
        let answer = (self.responder)(&source, n);
        Box::pin(async move { answer })
    }
}

fn svg_for(source: &str) -> Answer {
    Ok(TransportResponse {
        status: 200,
        body: format!("<svg><!-- {source} --></svg>").into_bytes(),
    })
}

fn http(status: u16) -> Answer {
    Ok(TransportResponse {
        status,
        body: b"<html>Internal Server Error</html>".to_vec(),
    })
}

fn refused() -> Answer {
    Err(AttemptFailure::new(FailureKind::Connect, "refused"))
}

fn write_doc(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn config_with(service: Arc<FakeService>, attempts: u32) -> ConversionConfig {
    ConversionConfig::builder()
        .transport(service)
        .max_attempts(attempts)
        .retry_delay(Duration::ZERO)
        .build()
        .unwrap()
}

fn files_in(dir: &Path) -> Vec<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

const THREE_DIAGRAMS: &str = "# Deck\n\n\
```mermaid\ngraph TD\n  A-->B\n```\n\n\
Some prose.\n\n\
```mermaid\nsequenceDiagram\n  A->>B: hi\n```\n\n\
```mermaid\npie\n  \"a\": 1\n```\n";

// ── Extraction through the public API ───────────────────────────────────────

#[tokio::test]
async fn test_inspect_lists_blocks_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);

    let inspection = inspect(&doc, &ConversionConfig::default()).await.unwrap();
    let ordinals: Vec<_> = inspection.diagrams.iter().map(|d| d.ordinal).collect();
    assert_eq!(ordinals, vec![1, 2, 3]);
    let second = &inspection.diagrams[1];
    assert_eq!(second.source, "sequenceDiagram\n  A->>B: hi");
    assert_eq!(inspection.output_dir, tmp.path().join("deck"));
    assert!(!inspection.output_dir.exists(), "inspect writes nothing");
}

// ── Full success and idempotence ─────────────────────────────────────────────

#[tokio::test]
async fn test_all_succeed_and_rerun_is_idempotent() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    let service = FakeService::new(|source, _| svg_for(source));
    let config = config_with(service.clone(), 5);

    let first = convert(&doc, &config).await.unwrap();
    assert_eq!(first.status(), BatchStatus::AllSucceeded);
    assert_eq!(first.exit_code(), 0);
    assert_eq!(first.succeeded, 3);
    assert_eq!(first.output_dir, tmp.path().join("deck"));

    let out = tmp.path().join("deck");
    let before: Vec<_> = files_in(&out)
        .iter()
        .map(|f| std::fs::read(out.join(f)).unwrap())
        .collect();

    let second = convert(&doc, &config).await.unwrap();
    assert_eq!(second.status(), BatchStatus::AllSucceeded);
    assert_eq!(
        files_in(&out),
        vec!["diagram_001.svg", "diagram_002.svg", "diagram_003.svg"]
    );
    let after: Vec<_> = files_in(&out)
        .iter()
        .map(|f| std::fs::read(out.join(f)).unwrap())
        .collect();
    assert_eq!(before, after);
    let first_svg = std::fs::read(out.join("diagram_001.svg")).unwrap();
    assert_eq!(first_svg, b"<svg><!-- graph TD\n  A-->B --></svg>");
}

// ── Retry behaviour ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_transient_failures_then_success_uses_all_attempts() {
    let tmp = tempfile::tempdir().unwrap();
    let text = "```mermaid\ngraph LR\n  X-->Y\n```\n";
    let doc = write_doc(tmp.path(), "one.mmd", text);
    let max = 4;
    let delay = Duration::from_millis(20);
    let service = FakeService::new(move |source, n| {
        if n >= max {
            return svg_for(source);
        }
        http(503)
    });
    let config = ConversionConfig::builder()
        .transport(service.clone())
        .max_attempts(max)
        .retry_delay(delay)
        .build()
        .unwrap();

    let start = Instant::now();
    let report = convert(&doc, &config).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(report.status(), BatchStatus::AllSucceeded);
    assert_eq!(report.diagrams[0].attempts, max);
    assert_eq!(service.calls().len(), max as usize);
    assert!(
        elapsed >= delay * (max - 1),
        "expected at least {:?} of back-off, got {:?}",
        delay * (max - 1),
        elapsed
    );
}

#[tokio::test]
async fn test_persistent_500_exhausts_and_batch_continues() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    let service = FakeService::new(|_, _| http(500));
    let config = config_with(service.clone(), 5);

    let report = convert(&doc, &config).await.unwrap();
    assert_eq!(report.status(), BatchStatus::AllFailed);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.diagrams.len(), 3, "every diagram must be attempted");
    for d in &report.diagrams {
        assert_eq!(d.attempts, 5);
        assert!(matches!(d.error, Some(DiagramError::RenderFailed { .. })));
    }
    assert_eq!(service.calls().len(), 15);
    assert!(!tmp.path().join("deck").exists(), "nothing written");
}

#[tokio::test]
async fn test_html_error_page_with_200_is_retried() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "one.mmd", "```mermaid\npie\n```");
    let service = FakeService::new(|source, n| {
        if n == 1 {
            Ok(TransportResponse {
                status: 200,
                body: b"<!DOCTYPE html><title>Error</title>".to_vec(),
            })
        } else {
            svg_for(source)
        }
    });
    let report = convert(&doc, &config_with(service, 3)).await.unwrap();
    assert_eq!(report.status(), BatchStatus::AllSucceeded);
    assert_eq!(report.diagrams[0].attempts, 2);
}

// ── Partial success ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_partial_success_with_empty_block() {
    let tmp = tempfile::tempdir().unwrap();
    let text = "```mermaid\ngraph TD\n  ok\n```\n\
                ```mermaid\n```\n\
                ```mermaid\ngraph TD\n  broken\n```\n";
    let doc = write_doc(tmp.path(), "mixed.mmd", text);
    let service = FakeService::new(|source, _| {
        if source.contains("broken") {
            http(400)
        } else {
            svg_for(source)
        }
    });
    let config = config_with(service.clone(), 3);

    let report = convert(&doc, &config).await.unwrap();
    assert_eq!(report.total_diagrams, 2);
    assert_eq!(report.status(), BatchStatus::PartialSuccess);
    assert_eq!(report.exit_code(), 0);
    let out = tmp.path().join("mixed");
    assert_eq!(files_in(&out), vec!["diagram_001.svg"]);
    assert_eq!(service.calls_for("graph TD\n  broken"), 3);
    assert_eq!(
        report.diagrams[1].error,
        Some(DiagramError::RenderFailed {
            ordinal: 2,
            attempts: 3,
            detail: "HTTP 400".into(),
        })
    );
    assert!(report.clone().into_result().is_ok());
}

// ── No diagrams ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_no_diagrams_found() {
    let tmp = tempfile::tempdir().unwrap();
    let text = "# Title\n\n```rust\nfn main() {}\n```\n";
    let doc = write_doc(tmp.path(), "plain.mmd", text);
    let service = FakeService::new(|source, _| svg_for(source));
    let config = config_with(service.clone(), 5);

    let report = convert(&doc, &config).await.unwrap();
    assert_eq!(report.status(), BatchStatus::NoneFound);
    assert_eq!(report.exit_code(), 1);
    assert!(service.calls().is_empty());
    assert!(files_in(&tmp.path().join("plain")).is_empty());
    assert!(matches!(
        report.into_result(),
        Err(Mmd2SvgError::NoDiagramsFound { .. })
    ));
}

// ── Connectivity abort ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_unreachable_service_aborts_batch() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    let service = FakeService::new(|_, _| refused());
    let config = config_with(service.clone(), 5);

    let report = convert(&doc, &config).await.unwrap();
    assert_eq!(report.status(), BatchStatus::Aborted);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(service.calls().len(), 5, "only diagram 1 is tried");
    assert_eq!(report.diagrams.len(), 1);
    assert_eq!(report.not_attempted(), 2);
    assert!(matches!(
        report.aborted,
        Some(DiagramError::ServiceUnreachable {
            ordinal: 1,
            attempts: 5,
            ..
        })
    ));
}

#[tokio::test]
async fn test_abort_keeps_files_already_written() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    let service = FakeService::new(|source, _| {
        if source.starts_with("graph") {
            svg_for(source)
        } else {
            refused()
        }
    });

    let report = convert(&doc, &config_with(service, 2)).await.unwrap();
    assert_eq!(report.status(), BatchStatus::Aborted);
    assert_eq!(report.succeeded, 1);
    let out = tmp.path().join("deck");
    assert_eq!(files_in(&out), vec!["diagram_001.svg"]);
    assert!(matches!(
        report.into_result(),
        Err(Mmd2SvgError::ServiceUnreachable { ordinal: 2, .. })
    ));
}

#[tokio::test]
async fn test_closed_port_through_real_http_transport() {
    init_tracing();
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    let config = ConversionConfig::builder()
        .base_url(format!("http://127.0.0.1:{port}"))
        .max_attempts(2)
        .retry_delay(Duration::ZERO)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();

    let report = convert(&doc, &config).await.unwrap();
    assert_eq!(report.status(), BatchStatus::Aborted);
    assert_eq!(report.diagrams.len(), 1);
    assert_eq!(report.diagrams[0].attempts, 2);
}

// ── Fatal errors ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_document_is_fatal() {
    let service = FakeService::new(|source, _| svg_for(source));
    let err = convert("/no/such/deck.mmd", &config_with(service, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, Mmd2SvgError::FileNotFound { .. }));
}

#[tokio::test]
async fn test_unwritable_output_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    // A regular file where the output directory should go.
    let blocker = tmp.path().join("deck");
    std::fs::write(&blocker, "in the way").unwrap();
    let service = FakeService::new(|source, _| svg_for(source));
    let config = config_with(service.clone(), 5);

    let err = convert(&doc, &config).await.unwrap_err();
    assert!(matches!(err, Mmd2SvgError::OutputWriteFailed { .. }));
    assert_eq!(service.calls().len(), 1, "stops at the first write");
}

// ── Interrupt ────────────────────────────────────────────────────────────────

/// Triggers the interrupt as soon as the first diagram completes.
struct InterruptAfterFirst(Interrupt);

impl ConversionProgressCallback for InterruptAfterFirst {
    fn on_diagram_complete(&self, _ordinal: usize, _total: usize, _len: usize) {
        self.0.trigger();
    }
}

#[tokio::test]
async fn test_interrupt_between_diagrams_keeps_partial_results() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    let service = FakeService::new(|source, _| svg_for(source));
    let interrupt = Interrupt::new();
    let config = ConversionConfig::builder()
        .transport(service.clone())
        .retry_delay(Duration::ZERO)
        .progress_callback(Arc::new(InterruptAfterFirst(interrupt.clone())))
        .build()
        .unwrap();

    let report = convert_with_interrupt(&doc, &config, &interrupt)
        .await
        .unwrap();
    assert_eq!(report.status(), BatchStatus::Interrupted);
    assert_eq!(report.exit_code(), 130);
    assert_eq!(report.succeeded, 1);
    assert_eq!(service.calls().len(), 1);
    let out = tmp.path().join("deck");
    assert_eq!(files_in(&out), vec!["diagram_001.svg"]);
}

#[tokio::test]
async fn test_interrupt_during_retry_delay() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    let service = FakeService::new(|_, _| http(500));
    let config = ConversionConfig::builder()
        .transport(service.clone())
        .retry_delay(Duration::from_secs(60))
        .build()
        .unwrap();

    let interrupt = Interrupt::new();
    let trigger = interrupt.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();
    });

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        convert_with_interrupt(&doc, &config, &interrupt),
    )
    .await
    .expect("interrupt must stop the batch promptly")
    .unwrap();
    assert_eq!(report.status(), BatchStatus::Interrupted);
    assert_eq!(service.calls().len(), 1);
    assert!(report.diagrams.is_empty());
}

// ── Classifier and progress events ──────────────────────────────────────────

struct NotFoundIsFatal;

impl FailureClassifier for NotFoundIsFatal {
    fn classify(&self, failure: &AttemptFailure) -> FailureClass {
        match failure.kind {
            FailureKind::HttpStatus(404) => FailureClass::Fatal,
            FailureKind::Connect => FailureClass::BatchAborting,
            _ => FailureClass::Retryable,
        }
    }
}

#[tokio::test]
async fn test_custom_classifier_rejects_without_retry() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    let service = FakeService::new(|source, _| {
        if source.starts_with("pie") {
            http(404)
        } else {
            svg_for(source)
        }
    });
    let config = ConversionConfig::builder()
        .transport(service.clone())
        .retry_delay(Duration::ZERO)
        .classifier(Arc::new(NotFoundIsFatal))
        .build()
        .unwrap();

    let report = convert(&doc, &config).await.unwrap();
    assert_eq!(report.status(), BatchStatus::PartialSuccess);
    assert_eq!(service.calls_for("pie\n  \"a\": 1"), 1);
    assert!(matches!(
        report.diagrams[2].error,
        Some(DiagramError::Rejected {
            ordinal: 3,
            attempts: 1,
            ..
        })
    ));
}

#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl EventLog {
    fn push(&self, event: String) {
        self.0.lock().unwrap().push(event);
    }
}

impl ConversionProgressCallback for EventLog {
    fn on_conversion_start(&self, total: usize) {
        self.push(format!("start {total}"));
    }
    fn on_diagram_start(&self, ordinal: usize, _total: usize) {
        self.push(format!("diagram {ordinal}"));
    }
    fn on_attempt_failed(
        &self,
        ordinal: usize,
        attempt: u32,
        max: u32,
        _: &str,
        retry_in: Option<Duration>,
    ) {
        let next = if retry_in.is_some() { "retry" } else { "give up" };
        self.push(format!("attempt {ordinal}:{attempt}/{max} {next}"));
    }
    fn on_diagram_complete(&self, ordinal: usize, _total: usize, _len: usize) {
        self.push(format!("ok {ordinal}"));
    }
    fn on_diagram_error(&self, ordinal: usize, _total: usize, _error: &str) {
        self.push(format!("err {ordinal}"));
    }
    fn on_conversion_complete(&self, total: usize, success: usize) {
        self.push(format!("done {success}/{total}"));
    }
}

#[tokio::test]
async fn test_progress_events_follow_document_order() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", THREE_DIAGRAMS);
    let service = FakeService::new(|source, n| {
        if source.starts_with("sequence") || (source.starts_with("graph") && n == 1) {
            http(502)
        } else {
            svg_for(source)
        }
    });
    let log = Arc::new(EventLog::default());
    let config = ConversionConfig::builder()
        .transport(service)
        .max_attempts(2)
        .retry_delay(Duration::ZERO)
        .progress_callback(log.clone())
        .build()
        .unwrap();

    convert(&doc, &config).await.unwrap();
    let events = log.0.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start 3",
            "diagram 1",
            "attempt 1:1/2 retry",
            "ok 1",
            "diagram 2",
            "attempt 2:1/2 retry",
            "attempt 2:2/2 give up",
            "err 2",
            "diagram 3",
            "ok 3",
            "done 2/3",
        ]
    );
}

#[tokio::test]
async fn test_output_dir_override_and_png_format() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", "```mermaid\npie\n```");
    let service = FakeService::new(|_, _| {
        let mut body = b"\x89PNG\r\n\x1a\n".to_vec();
        body.extend_from_slice(b"pixels");
        Ok(TransportResponse { status: 200, body })
    });
    let out = tmp.path().join("build").join("img");
    let config = ConversionConfig::builder()
        .transport(service)
        .format(mmd2svg::OutputFormat::Png)
        .output_dir(&out)
        .build()
        .unwrap();

    let report = convert(&doc, &config).await.unwrap();
    assert_eq!(report.status(), BatchStatus::AllSucceeded);
    assert_eq!(files_in(&out), vec!["diagram_001.png"]);
    assert!(!tmp.path().join("deck").exists());
}

#[test]
fn test_convert_sync_wrapper() {
    let tmp = tempfile::tempdir().unwrap();
    let doc = write_doc(tmp.path(), "deck.mmd", "```mermaid\npie\n```");
    let service = FakeService::new(|source, _| svg_for(source));
    let config = config_with(service, 1);

    let report = mmd2svg::convert_sync(&doc, &config).unwrap();
    assert_eq!(report.status(), BatchStatus::AllSucceeded);
    let by_name: HashMap<_, _> = report
        .diagrams
        .iter()
        .map(|d| (d.ordinal, d.path.clone()))
        .collect();
    let expected = tmp.path().join("deck").join("diagram_001.svg");
    assert_eq!(by_name[&1], Some(expected));
}
