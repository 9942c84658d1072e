//! Execution bridge
//!
//! The bridge is the worker half of the sandbox: one spawned task per
//! isolated context. It announces readiness once its request loop is
//! listening, buffers captured records and flushes them at a fixed interval
//! (plus an immediate flush on the completion path), and closes every run
//! with exactly one `execution_complete` control message, no matter how the
//! run ended.

use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::classify::{CodeType, ExecutionStrategy};
use crate::error::Result;
use crate::sandbox::engine::{EngineLanguage, HarnessProgram, ScriptEngine};
use crate::sandbox::harness::HarnessBuilder;
use crate::sandbox::protocol::{ControlMessage, ExecuteRequest, LogRecord, WorkerMessage};

/// Informational record appended when a JS run succeeds without output
const DEFINITIONS_HINT: &str =
    "Definitions were processed. Call a function or log something to see output.";

/// Isolated-context flavor currently loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFlavor {
    Js,
    Python,
    Html,
}

impl HostFlavor {
    /// Flavor required for a classified type
    pub fn for_code_type(code_type: CodeType) -> Self {
        match code_type {
            CodeType::Python => HostFlavor::Python,
            CodeType::HtmlDocument | CodeType::HtmlFragment | CodeType::CssOnly => {
                HostFlavor::Html
            }
            _ => HostFlavor::Js,
        }
    }

    /// Readiness announcement for this flavor
    fn ready_message(&self) -> ControlMessage {
        match self {
            HostFlavor::Js => ControlMessage::JsReady,
            HostFlavor::Python => ControlMessage::PythonReady,
            HostFlavor::Html => ControlMessage::Ready,
        }
    }
}

/// Timing knobs for a bridge
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Cadence of batched record flushes
    pub flush_interval: Duration,
    /// Watchdog: a run exceeding this is force-failed and the worker retired
    pub watchdog: Duration,
}

/// HTML flavors bake the code into the document at worker creation;
/// there is no separate send step.
#[derive(Debug, Clone)]
pub struct BakedDocument {
    pub code: String,
    pub code_type: CodeType,
}

/// Host-side handle to a spawned worker
pub struct BridgeHandle {
    pub id: Uuid,
    pub flavor: HostFlavor,
    requests: mpsc::Sender<ExecuteRequest>,
    join: JoinHandle<()>,
}

impl BridgeHandle {
    /// Forward a run request to the worker
    pub fn send(&self, request: ExecuteRequest) -> Result<()> {
        self.requests
            .try_send(request)
            .map_err(|e| crate::Error::Sandbox(format!("worker unavailable: {}", e)))
    }

    /// Whether the worker has exited (watchdog retirement, panic)
    pub fn is_retired(&self) -> bool {
        self.requests.is_closed() || self.join.is_finished()
    }

    /// Tear the worker down
    pub fn shutdown(self) {
        self.join.abort();
    }
}

/// Spawn a worker for the given flavor.
///
/// `engine` is required for JS/Python flavors; HTML flavors take `baked`
/// instead and render immediately after announcing readiness. All worker
/// messages are tagged with the worker id so the host can ignore strays
/// from a torn-down context.
pub fn spawn_bridge(
    flavor: HostFlavor,
    engine: Option<Arc<dyn ScriptEngine>>,
    harness: Arc<HarnessBuilder>,
    config: BridgeConfig,
    events: mpsc::Sender<(Uuid, WorkerMessage)>,
    document: Arc<RwLock<Option<String>>>,
    baked: Option<BakedDocument>,
) -> BridgeHandle {
    let id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(4);

    let join = tokio::spawn(worker_loop(
        id, flavor, engine, harness, config, events, document, baked, rx,
    ));

    BridgeHandle {
        id,
        flavor,
        requests: tx,
        join,
    }
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    id: Uuid,
    flavor: HostFlavor,
    engine: Option<Arc<dyn ScriptEngine>>,
    harness: Arc<HarnessBuilder>,
    config: BridgeConfig,
    events: mpsc::Sender<(Uuid, WorkerMessage)>,
    document: Arc<RwLock<Option<String>>>,
    baked: Option<BakedDocument>,
    mut requests: mpsc::Receiver<ExecuteRequest>,
) {
    // Listeners are attached; announce readiness. Anything the host sent
    // earlier is buffered on its side and flushed on this signal.
    let _ = events
        .send((id, WorkerMessage::Control(flavor.ready_message())))
        .await;

    if flavor == HostFlavor::Html {
        render_document(id, &harness, &events, &document, baked).await;
        // Keep the context alive until the host tears it down.
        while requests.recv().await.is_some() {
            warn!("html worker {} received an unexpected execute request", id);
        }
        return;
    }

    let Some(engine) = engine else {
        warn!("worker {} spawned without an engine; exiting", id);
        return;
    };

    while let Some(request) = requests.recv().await {
        let retired =
            handle_execute(id, flavor, &engine, &harness, &config, &events, request).await;
        if retired {
            debug!("worker {} retired after watchdog timeout", id);
            break;
        }
    }
}

/// Render the baked document and conclude the implicit run.
async fn render_document(
    id: Uuid,
    harness: &HarnessBuilder,
    events: &mpsc::Sender<(Uuid, WorkerMessage)>,
    document: &RwLock<Option<String>>,
    baked: Option<BakedDocument>,
) {
    let mut success = true;
    let mut records = Vec::new();

    match baked {
        Some(baked) => match harness.document(&baked.code, baked.code_type) {
            Ok(doc) => {
                let bytes = doc.len();
                if let Ok(mut slot) = document.write() {
                    *slot = Some(doc);
                }
                records.push(LogRecord::success(format!(
                    "Document rendered ({} bytes)",
                    bytes
                )));
            }
            Err(e) => {
                success = false;
                records.push(LogRecord::error(format!("Failed to render document: {}", e)));
            }
        },
        None => {
            success = false;
            records.push(LogRecord::error("No document content provided"));
        }
    }

    let _ = events.send((id, WorkerMessage::Logs(records))).await;
    let _ = events
        .send((
            id,
            WorkerMessage::Control(ControlMessage::ExecutionComplete { success }),
        ))
        .await;
}

/// Run one request to completion. Returns true when the worker must retire
/// (the watchdog fired and the engine may still hold a wedged child).
async fn handle_execute(
    id: Uuid,
    flavor: HostFlavor,
    engine: &Arc<dyn ScriptEngine>,
    harness: &HarnessBuilder,
    config: &BridgeConfig,
    events: &mpsc::Sender<(Uuid, WorkerMessage)>,
    request: ExecuteRequest,
) -> bool {
    let mut buffer: Vec<LogRecord> = Vec::new();
    let mut emitted = 0usize;
    let mut retired = false;

    let program = match build_program(flavor, harness, &request) {
        Ok(program) => Some(program),
        Err(e) => {
            buffer.push(LogRecord::error(format!("Failed to prepare run: {}", e)));
            None
        }
    };

    let success = match program {
        None => false,
        Some(program) => {
            let (record_tx, mut record_rx) = mpsc::channel::<LogRecord>(64);
            let run = tokio::time::timeout(config.watchdog, engine.run(&program, record_tx));
            tokio::pin!(run);

            let mut ticker = tokio::time::interval(config.flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            let mut engine_done = false;
            let mut outcome: Option<Result<bool>> = None;
            let mut timed_out = false;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        flush(id, &mut buffer, events).await;
                    }
                    maybe = record_rx.recv() => match maybe {
                        Some(record) => {
                            // Server-side counterpart of "also invoke the
                            // real console method": mirror into the host log.
                            debug!("sandbox[{}] {}: {}", id, record.kind, record.message);
                            emitted += 1;
                            buffer.push(record);
                        }
                        None => break,
                    },
                    result = &mut run, if !engine_done => {
                        engine_done = true;
                        match result {
                            Ok(outcome_result) => outcome = Some(outcome_result),
                            Err(_) => {
                                timed_out = true;
                                break;
                            }
                        }
                    }
                }
            }

            // The record channel can close a poll before the run future
            // reports; collect the verdict it already produced.
            if !engine_done && !timed_out {
                match (&mut run).await {
                    Ok(outcome_result) => outcome = Some(outcome_result),
                    Err(_) => timed_out = true,
                }
            }

            if timed_out {
                retired = true;
                buffer.push(LogRecord::error(format!(
                    "Execution timed out after {:?}; the sandbox will be recreated",
                    config.watchdog
                )));
                false
            } else {
                match outcome {
                    Some(Ok(success)) => success,
                    Some(Err(e)) => {
                        buffer.push(LogRecord::error(format!("Execution failed: {}", e)));
                        false
                    }
                    None => false,
                }
            }
        }
    };

    if success && flavor == HostFlavor::Js && emitted == 0 {
        buffer.push(LogRecord::info(DEFINITIONS_HINT));
    }
    if success {
        buffer.push(LogRecord::success("Code executed successfully"));
    }

    // Completion path: flush pending records, then the one terminal signal.
    flush(id, &mut buffer, events).await;
    let _ = events
        .send((
            id,
            WorkerMessage::Control(ControlMessage::ExecutionComplete { success }),
        ))
        .await;

    retired
}

fn build_program(
    flavor: HostFlavor,
    harness: &HarnessBuilder,
    request: &ExecuteRequest,
) -> Result<HarnessProgram> {
    match flavor {
        HostFlavor::Js => Ok(HarnessProgram {
            language: EngineLanguage::Js,
            source: harness.js(
                &request.code,
                request.strategy.unwrap_or(ExecutionStrategy::Sync),
            )?,
        }),
        HostFlavor::Python => Ok(HarnessProgram {
            language: EngineLanguage::Python,
            source: harness.python(&request.code, &request.libraries)?,
        }),
        HostFlavor::Html => Err(crate::Error::Sandbox(
            "html flavor does not execute via request".to_string(),
        )),
    }
}

async fn flush(
    id: Uuid,
    buffer: &mut Vec<LogRecord>,
    events: &mpsc::Sender<(Uuid, WorkerMessage)>,
) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);
    let _ = events.send((id, WorkerMessage::Logs(batch))).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::engine::scripted::ScriptedEngine;
    use crate::sandbox::protocol::RecordKind;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            flush_interval: Duration::from_millis(10),
            watchdog: Duration::from_secs(5),
        }
    }

    fn harness() -> Arc<HarnessBuilder> {
        Arc::new(HarnessBuilder::new(Duration::from_millis(250)).unwrap())
    }

    async fn collect_run(
        flavor: HostFlavor,
        engine: Arc<dyn ScriptEngine>,
        request: ExecuteRequest,
    ) -> (Vec<LogRecord>, bool) {
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let document = Arc::new(RwLock::new(None));
        let handle = spawn_bridge(
            flavor,
            Some(engine),
            harness(),
            test_config(),
            events_tx,
            document,
            None,
        );

        // Readiness comes first.
        let (_, first) = events_rx.recv().await.unwrap();
        assert!(matches!(
            first,
            WorkerMessage::Control(ref c) if c.is_ready()
        ));

        handle.send(request).unwrap();

        let mut records = Vec::new();
        let success = loop {
            match events_rx.recv().await.unwrap() {
                (_, WorkerMessage::Logs(batch)) => records.extend(batch),
                (_, WorkerMessage::Control(ControlMessage::ExecutionComplete { success })) => {
                    break success
                }
                (_, WorkerMessage::Control(_)) => {}
            }
        };
        handle.shutdown();
        (records, success)
    }

    #[tokio::test]
    async fn test_ordering_and_single_completion() {
        let engine = Arc::new(ScriptedEngine::ok(vec![
            LogRecord::log("one"),
            LogRecord::log("two"),
            LogRecord::log("three"),
        ]));
        let (records, success) =
            collect_run(HostFlavor::Js, engine, ExecuteRequest::new("x")).await;

        assert!(success);
        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["one", "two", "three", "Code executed successfully"]
        );
    }

    #[tokio::test]
    async fn test_failed_run_completes_false() {
        let engine = Arc::new(ScriptedEngine::failing(vec![LogRecord::error_with_stack(
            "Error: boom",
            "at <sandbox>:1",
        )]));
        let (records, success) =
            collect_run(HostFlavor::Js, engine, ExecuteRequest::new("throw")).await;

        assert!(!success);
        assert!(records.iter().any(|r| r.is_error() && r.message.contains("boom")));
        // No success record on failure.
        assert!(!records.iter().any(|r| r.kind == RecordKind::Success));
    }

    #[tokio::test]
    async fn test_silent_success_gets_definitions_hint() {
        let engine = Arc::new(ScriptedEngine::ok(Vec::new()));
        let (records, success) =
            collect_run(HostFlavor::Js, engine, ExecuteRequest::new("function f() {}")).await;

        assert!(success);
        assert_eq!(records[0].kind, RecordKind::Info);
        assert!(records[0].message.contains("Definitions were processed"));
    }

    #[tokio::test]
    async fn test_python_flavor_has_no_hint() {
        let engine = Arc::new(ScriptedEngine::ok(Vec::new()));
        let (records, success) =
            collect_run(HostFlavor::Python, engine, ExecuteRequest::new("x = 1")).await;

        assert!(success);
        assert!(!records.iter().any(|r| r.kind == RecordKind::Info));
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_retires_worker() {
        let engine = Arc::new(ScriptedEngine::hanging(Duration::from_secs(60)));
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let document = Arc::new(RwLock::new(None));
        let handle = spawn_bridge(
            HostFlavor::Js,
            Some(engine),
            harness(),
            BridgeConfig {
                flush_interval: Duration::from_millis(10),
                watchdog: Duration::from_secs(1),
            },
            events_tx,
            document,
            None,
        );

        let (_, first) = events_rx.recv().await.unwrap();
        assert!(matches!(first, WorkerMessage::Control(ref c) if c.is_ready()));

        handle.send(ExecuteRequest::new("while(true){}")).unwrap();

        let mut saw_timeout_record = false;
        loop {
            match events_rx.recv().await.unwrap() {
                (_, WorkerMessage::Logs(batch)) => {
                    saw_timeout_record |= batch
                        .iter()
                        .any(|r| r.is_error() && r.message.contains("timed out"));
                }
                (_, WorkerMessage::Control(ControlMessage::ExecutionComplete { success })) => {
                    assert!(!success);
                    break;
                }
                (_, WorkerMessage::Control(_)) => {}
            }
        }
        assert!(saw_timeout_record);

        // The worker loop exits; the handle reports retirement.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_retired());
    }

    #[tokio::test]
    async fn test_html_flavor_renders_baked_document() {
        let (events_tx, mut events_rx) = mpsc::channel(64);
        let document = Arc::new(RwLock::new(None));
        let handle = spawn_bridge(
            HostFlavor::Html,
            None,
            harness(),
            test_config(),
            events_tx,
            document.clone(),
            Some(BakedDocument {
                code: "<div>hi</div>".to_string(),
                code_type: CodeType::HtmlFragment,
            }),
        );

        let (_, first) = events_rx.recv().await.unwrap();
        assert!(matches!(first, WorkerMessage::Control(ControlMessage::Ready)));

        let mut success = None;
        while success.is_none() {
            match events_rx.recv().await.unwrap() {
                (_, WorkerMessage::Control(ControlMessage::ExecutionComplete { success: s })) => {
                    success = Some(s)
                }
                _ => {}
            }
        }
        assert_eq!(success, Some(true));
        assert!(document.read().unwrap().as_ref().unwrap().contains("<div>hi</div>"));
        handle.shutdown();
    }

    #[test]
    fn test_flavor_for_code_type() {
        assert_eq!(HostFlavor::for_code_type(CodeType::Python), HostFlavor::Python);
        assert_eq!(HostFlavor::for_code_type(CodeType::CssOnly), HostFlavor::Html);
        assert_eq!(HostFlavor::for_code_type(CodeType::EsModule), HostFlavor::Js);
        assert_eq!(HostFlavor::for_code_type(CodeType::Javascript), HostFlavor::Js);
    }
}
