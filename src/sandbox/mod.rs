//! Sandbox module - Isolated execution of untrusted code
//!
//! The host page and the isolated context of the original design map to an
//! [`ExecutionHost`] and a spawned worker ("bridge") communicating only via
//! serializable messages: a readiness handshake before the first send,
//! batched record flushes during the run, and a single terminal
//! `execution_complete` signal.

pub mod bridge;
pub mod engine;
pub mod harness;
pub mod host;
pub mod input;
pub mod protocol;

pub use bridge::HostFlavor;
pub use engine::{EngineLanguage, HarnessProgram, ProcessEngine, ScriptEngine};
pub use harness::HarnessBuilder;
pub use host::{EngineSet, ExecutionHost, HostEvent, SessionState};
pub use input::{InputProvider, NoInput, PromptInput, QueuedInput};
pub use protocol::{ControlMessage, ExecuteRequest, LogRecord, RecordKind, WorkerMessage};

use std::sync::Arc;

use crate::config::HostConfig;
use crate::error::Result;

/// Build the default process-backed engine set, resolving interpreters from
/// the configuration or PATH.
pub fn create_engines(
    config: &HostConfig,
    input: Arc<dyn InputProvider>,
) -> Result<EngineSet> {
    let js = ProcessEngine::node(
        config.node_path.clone(),
        input.clone(),
        config.max_output_bytes,
    )?;
    let python = ProcessEngine::python(
        config.python_path.clone(),
        input,
        config.max_output_bytes,
    )?;

    Ok(EngineSet {
        js: Arc::new(js),
        python: Arc::new(python),
    })
}
