//! Execution host
//!
//! Owns at most one isolated worker at a time and exposes a pull-based
//! event stream to the orchestrating session. `run` never blocks: code is
//! forwarded to the worker (or buffered until its readiness signal), and
//! results surface exclusively through [`ExecutionHost::next_event`].

use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::classify::Classification;
use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::sandbox::bridge::{
    spawn_bridge, BakedDocument, BridgeConfig, BridgeHandle, HostFlavor,
};
use crate::sandbox::engine::ScriptEngine;
use crate::sandbox::harness::HarnessBuilder;
use crate::sandbox::protocol::{ControlMessage, ExecuteRequest, LogRecord, WorkerMessage};

/// Engines available to the host, one per interpreter family
#[derive(Clone)]
pub struct EngineSet {
    pub js: Arc<dyn ScriptEngine>,
    pub python: Arc<dyn ScriptEngine>,
}

impl EngineSet {
    fn for_flavor(&self, flavor: HostFlavor) -> Option<Arc<dyn ScriptEngine>> {
        match flavor {
            HostFlavor::Js => Some(self.js.clone()),
            HostFlavor::Python => Some(self.python.clone()),
            HostFlavor::Html => None,
        }
    }
}

/// Host-visible lifecycle of the current execution session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No worker, nothing in flight
    Idle,
    /// Worker spawned, readiness not yet seen
    Loading,
    /// Worker listening, no run in flight
    Ready,
    /// Code sent, awaiting the completion signal
    Running,
}

/// Event delivered to the session
#[derive(Debug, Clone)]
pub enum HostEvent {
    /// A batched flush of captured records, FIFO within the run
    Records(Vec<LogRecord>),
    /// Terminal signal of the run
    Completed { success: bool },
}

/// The execution host: isolated-context lifecycle plus message plumbing
pub struct ExecutionHost {
    config: HostConfig,
    engines: EngineSet,
    harness: Arc<HarnessBuilder>,
    events_tx: mpsc::Sender<(Uuid, WorkerMessage)>,
    events_rx: mpsc::Receiver<(Uuid, WorkerMessage)>,
    worker: Option<BridgeHandle>,
    state: SessionState,
    /// Code buffered before readiness, flushed exactly once
    pending: Option<ExecuteRequest>,
    /// Most recent synthesized document (HTML flavors)
    document: Arc<RwLock<Option<String>>>,
}

impl ExecutionHost {
    /// Create a host with the given engines
    pub fn new(config: HostConfig, engines: EngineSet) -> Result<Self> {
        let harness = Arc::new(HarnessBuilder::new(config.flush_interval)?);
        let (events_tx, events_rx) = mpsc::channel(256);

        Ok(ExecutionHost {
            config,
            engines,
            harness,
            events_tx,
            events_rx,
            worker: None,
            state: SessionState::Idle,
            pending: None,
            document: Arc::new(RwLock::new(None)),
        })
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a run is awaiting its completion signal
    pub fn is_pending(&self) -> bool {
        self.state == SessionState::Running || self.pending.is_some()
    }

    /// Most recent synthesized document, if an HTML flavor ran
    pub fn document(&self) -> Option<String> {
        self.document.read().ok().and_then(|slot| slot.clone())
    }

    /// Start one run. Non-blocking: results arrive via [`Self::next_event`].
    pub fn run(&mut self, code: &str, classification: &Classification) -> Result<()> {
        if self.is_pending() {
            return Err(Error::Sandbox("execution already in progress".to_string()));
        }

        let flavor = HostFlavor::for_code_type(classification.code_type);
        let fresh = classification.code_type.always_fresh();

        let reusable = match self.worker {
            Some(ref worker) => worker.flavor == flavor && !fresh && !worker.is_retired(),
            None => false,
        };

        if !reusable {
            self.teardown();
            let baked = (flavor == HostFlavor::Html).then(|| BakedDocument {
                code: code.to_string(),
                code_type: classification.code_type,
            });
            debug!("spawning {:?} worker (fresh={})", flavor, fresh);
            self.worker = Some(spawn_bridge(
                flavor,
                self.engines.for_flavor(flavor),
                self.harness.clone(),
                BridgeConfig {
                    flush_interval: self.config.flush_interval,
                    watchdog: self.config.watchdog,
                },
                self.events_tx.clone(),
                self.document.clone(),
                baked,
            ));
            self.state = SessionState::Loading;

            if flavor == HostFlavor::Html {
                // Code is baked into the document; no send step. The worker
                // completes the run on its own after readiness.
                self.state = SessionState::Running;
                return Ok(());
            }

            // Buffer until the readiness signal.
            self.pending = Some(build_request(code, classification));
            return Ok(());
        }

        // Same flavor and still listening: short-circuit loading.
        let request = build_request(code, classification);
        match self.worker.as_ref().map(|worker| worker.send(request)) {
            Some(Ok(())) => {
                self.state = SessionState::Running;
                Ok(())
            }
            Some(Err(e)) => {
                warn!("worker refused request, respawning: {}", e);
                self.teardown();
                self.run(code, classification)
            }
            None => {
                self.teardown();
                self.run(code, classification)
            }
        }
    }

    /// Receive the next host-visible event of the current run.
    ///
    /// Control messages are folded into host state here: readiness flushes
    /// the buffered request exactly once; completion clears the running
    /// flag. Messages from torn-down workers are ignored.
    pub async fn next_event(&mut self) -> Option<HostEvent> {
        loop {
            let (worker_id, message) = self.events_rx.recv().await?;

            let current = match self.worker {
                Some(ref worker) if worker.id == worker_id => worker,
                _ => {
                    debug!("ignoring message from stale worker {}", worker_id);
                    continue;
                }
            };

            match message {
                WorkerMessage::Logs(batch) => return Some(HostEvent::Records(batch)),
                WorkerMessage::Control(control) if control.is_ready() => {
                    // HTML flavors are already Running (code baked in); only
                    // a Loading worker transitions through Ready here.
                    if self.state == SessionState::Loading {
                        self.state = SessionState::Ready;
                    }
                    if let Some(request) = self.pending.take() {
                        match current.send(request) {
                            Ok(()) => self.state = SessionState::Running,
                            Err(e) => {
                                warn!("failed to flush buffered code: {}", e);
                                self.teardown();
                                return Some(HostEvent::Completed { success: false });
                            }
                        }
                    }
                }
                WorkerMessage::Control(ControlMessage::ExecutionComplete { success }) => {
                    self.state = if self.worker.as_ref().map_or(true, |w| w.is_retired()) {
                        self.teardown();
                        SessionState::Idle
                    } else {
                        SessionState::Ready
                    };
                    return Some(HostEvent::Completed { success });
                }
                WorkerMessage::Control(_) => {}
            }
        }
    }

    /// Tear down the isolated context, the only recovery for a wedged run
    pub fn clear(&mut self) {
        self.teardown();
        if let Ok(mut slot) = self.document.write() {
            *slot = None;
        }
    }

    fn teardown(&mut self) {
        if let Some(worker) = self.worker.take() {
            debug!("tearing down worker {}", worker.id);
            worker.shutdown();
        }
        self.pending = None;
        self.state = SessionState::Idle;
    }
}

fn build_request(code: &str, classification: &Classification) -> ExecuteRequest {
    let mut request = ExecuteRequest::new(code).with_strategy(classification.strategy);
    if classification.features.has_libraries {
        request = request.with_libraries(classification.features.libraries.clone());
    }
    request
}
