//! Sandbox session orchestration
//!
//! The session is the single owner of the source text, its classification
//! (recomputed on every change), the accumulated log, the execution host,
//! and the optional replay session. Run and replay are mutually exclusive;
//! only one run may be in flight at a time.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::classify::{classify, Classification};
use crate::collab::{BugReport, BugReportClient, FixClient, FixRequest, TitleClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::handoff::{
    HandoffStore, CREATE_POST_CODE, CREATE_POST_TAG_NAME, CREATE_POST_TITLE, SANDBOX_CODE,
    SANDBOX_CODE_LANGUAGE,
};
use crate::lint::lint;
use crate::replay::{drive_autoplay, LineDiff, ReplayController, ReplayStep};
use crate::sandbox::{EngineSet, ExecutionHost, HostEvent, LogRecord};

/// Title used when the title collaborator fails
const GENERIC_TITLE: &str = "Code snippet";

/// Everything the create-post flow needs, also stashed in the handoff store
#[derive(Debug, Clone)]
pub struct PostDraft {
    pub title: String,
    pub tag: String,
    pub code: String,
}

/// Snapshot of the active replay state for a rendering surface
#[derive(Debug, Clone)]
pub struct ReplayStatus {
    pub current_index: usize,
    pub step_count: usize,
    pub is_playing: bool,
    pub step: ReplayStep,
    pub diff: LineDiff,
}

/// One open sandbox instance
pub struct SandboxSession {
    config: Config,
    source: String,
    classification: Classification,
    log: Vec<LogRecord>,
    last_error: Option<LogRecord>,
    last_success: Option<bool>,
    host: ExecutionHost,
    replay: Option<Arc<Mutex<ReplayController>>>,
    fix: FixClient,
    title: TitleClient,
    bugs: BugReportClient,
    handoff: HandoffStore,
}

impl SandboxSession {
    /// Create a session with explicit engines and handoff store
    pub fn new(config: Config, engines: EngineSet, handoff: HandoffStore) -> Result<Self> {
        let host = ExecutionHost::new(config.host.clone(), engines)?;
        let fix = FixClient::new(config.collab.clone())?;
        let title = TitleClient::new(config.collab.clone())?;
        let bugs = BugReportClient::new(config.collab.clone())?;

        Ok(SandboxSession {
            config,
            source: String::new(),
            classification: classify(""),
            log: Vec::new(),
            last_error: None,
            last_success: None,
            host,
            replay: None,
            fix,
            title,
            bugs,
            handoff,
        })
    }

    /// Current source text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Replace the source; classification is recomputed immediately
    pub fn set_source(&mut self, text: impl Into<String>) {
        self.source = text.into();
        self.classification = classify(&self.source);
    }

    /// Classification of the current source
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Accumulated log of the current/most recent run
    pub fn log(&self) -> &[LogRecord] {
        &self.log
    }

    /// Error retained for the fix-request affordance
    pub fn last_error(&self) -> Option<&LogRecord> {
        self.last_error.as_ref()
    }

    /// Success flag of the most recently completed run
    pub fn last_success(&self) -> Option<bool> {
        self.last_success
    }

    /// Whether a run is awaiting completion
    pub fn is_pending(&self) -> bool {
        self.host.is_pending()
    }

    /// Whether a replay session is active
    pub fn replay_active(&self) -> bool {
        self.replay.is_some()
    }

    /// Most recent synthesized document (HTML flavors)
    pub fn document(&self) -> Option<String> {
        self.host.document()
    }

    /// Start a run of the current source.
    ///
    /// Clears the prior log, applies the lint gate (a lint error concludes
    /// the run failed without entering the host), then delegates to the
    /// execution host. Results arrive via [`Self::wait_for_completion`].
    pub fn run(&mut self) -> Result<()> {
        if self.replay.is_some() {
            return Err(Error::Replay(
                "replay in progress; accept or cancel it first".to_string(),
            ));
        }
        if self.host.is_pending() {
            return Err(Error::Sandbox("execution already in progress".to_string()));
        }

        self.log.clear();
        self.last_error = None;
        self.last_success = None;

        let lint_records = lint(&self.source, self.classification.code_type);
        if !lint_records.is_empty() {
            debug!("lint gate stopped the run ({} errors)", lint_records.len());
            self.last_error = Some(lint_records[0].clone());
            self.log.extend(lint_records);
            self.last_success = Some(false);
            return Ok(());
        }

        self.host.run(&self.source, &self.classification)
    }

    /// Drain host events until the run concludes, returning its success.
    /// A lint-gated run concludes immediately with failure.
    pub async fn wait_for_completion(&mut self) -> Result<bool> {
        if let Some(success) = self.last_success {
            if !self.host.is_pending() {
                return Ok(success);
            }
        }
        if !self.host.is_pending() {
            return Err(Error::Sandbox("no run in progress".to_string()));
        }

        loop {
            match self.host.next_event().await {
                Some(HostEvent::Records(batch)) => {
                    for record in batch {
                        if record.is_error() && self.last_error.is_none() {
                            self.last_error = Some(record.clone());
                        }
                        self.log.push(record);
                    }
                }
                Some(HostEvent::Completed { success }) => {
                    self.last_success = Some(success);
                    return Ok(success);
                }
                None => {
                    return Err(Error::Protocol(
                        "host event stream ended before completion".to_string(),
                    ))
                }
            }
        }
    }

    /// Run and wait in one call
    pub async fn run_to_completion(&mut self) -> Result<bool> {
        self.run()?;
        self.wait_for_completion().await
    }

    /// Clear the log and tear down the isolated context
    pub fn clear(&mut self) {
        self.log.clear();
        self.last_error = None;
        self.last_success = None;
        self.host.clear();
    }

    /// Ask the fix collaborator for steps addressing the retained error,
    /// opening a replay session positioned at step 0.
    pub async fn request_fix(&mut self) -> Result<()> {
        if self.replay.is_some() {
            return Err(Error::Replay("replay already in progress".to_string()));
        }
        let error = self
            .last_error
            .clone()
            .ok_or_else(|| Error::InvalidInput("no failing run to fix".to_string()))?;

        let request = FixRequest {
            original_code: self.source.clone(),
            error_message: error.message,
            stack: error.stack,
            language: self.classification.code_type.language_tag().to_string(),
        };

        let steps = self.fix.suggest_fix(&request).await?;
        // The controller snapshots the pre-fix source for cancel and diffs.
        let controller = ReplayController::new(self.source.clone(), steps)?;
        self.replay = Some(Arc::new(Mutex::new(controller)));
        Ok(())
    }

    /// Snapshot of the active replay state
    pub async fn replay_status(&self) -> Option<ReplayStatus> {
        let controller = self.replay.as_ref()?;
        let guard = controller.lock().await;
        Some(ReplayStatus {
            current_index: guard.current_index(),
            step_count: guard.len(),
            is_playing: guard.is_playing(),
            step: guard.current_step().clone(),
            diff: guard.current_diff(),
        })
    }

    /// Advance the replay one step
    pub async fn replay_next(&mut self) -> Result<()> {
        self.with_replay(|ctl| ctl.next()).await
    }

    /// Step the replay back
    pub async fn replay_prev(&mut self) -> Result<()> {
        self.with_replay(|ctl| ctl.prev()).await
    }

    /// Jump the replay to a step
    pub async fn replay_jump(&mut self, index: usize) -> Result<()> {
        let controller = self
            .replay
            .as_ref()
            .ok_or_else(|| Error::Replay("no replay in progress".to_string()))?;
        controller.lock().await.jump(index)
    }

    /// Toggle autoplay, spawning the driver when playback starts
    pub async fn replay_toggle_play(&mut self) -> Result<()> {
        let controller = self
            .replay
            .as_ref()
            .ok_or_else(|| Error::Replay("no replay in progress".to_string()))?;

        let playing = {
            let mut guard = controller.lock().await;
            guard.toggle_play();
            guard.is_playing()
        };

        if playing {
            tokio::spawn(drive_autoplay(
                controller.clone(),
                self.config.replay.autoplay_delay,
            ));
        }
        Ok(())
    }

    /// Discard the replay and restore the pre-fix snapshot
    pub async fn cancel_fix(&mut self) -> Result<()> {
        let controller = self
            .replay
            .take()
            .ok_or_else(|| Error::Replay("no replay in progress".to_string()))?;
        let original = controller.lock().await.cancel();
        self.set_source(original);
        Ok(())
    }

    /// Accept the replay: report the fix, adopt the final step's code, and
    /// immediately re-run it. Report failures never block acceptance.
    pub async fn accept_fix(&mut self) -> Result<()> {
        let controller = self
            .replay
            .take()
            .ok_or_else(|| Error::Replay("no replay in progress".to_string()))?;
        let accepted = controller.lock().await.accept();

        self.bugs.report_detached(BugReport {
            language: self.classification.code_type.language_tag().to_string(),
            error_message: self
                .last_error
                .as_ref()
                .map(|r| r.message.clone())
                .unwrap_or_default(),
            original_code: accepted.original,
            fix_step_count: accepted.step_count,
            fixed_code: accepted.fixed.clone(),
        });

        self.set_source(accepted.fixed);
        self.run()
    }

    /// Prepare a post from the current code: a collaborator-suggested title
    /// (generic fallback on any failure) plus the handoff values the
    /// create-post flow consumes.
    pub async fn create_post(&mut self) -> Result<PostDraft> {
        let title = match self.title.suggest_title(&self.source).await {
            Ok(title) => title,
            Err(e) => {
                warn!("title suggestion failed, using fallback: {}", e);
                GENERIC_TITLE.to_string()
            }
        };

        let tag = self.classification.code_type.language_tag().to_string();

        self.handoff.put(CREATE_POST_CODE, &self.source).await;
        self.handoff.put(CREATE_POST_TITLE, &title).await;
        self.handoff.put(CREATE_POST_TAG_NAME, &tag).await;

        Ok(PostDraft {
            title,
            tag,
            code: self.source.clone(),
        })
    }

    /// Adopt code handed off from another surface, if any. The values are
    /// consumed from the store either way.
    pub async fn import_handoff(&mut self) -> bool {
        let Some(code) = self.handoff.take(SANDBOX_CODE).await else {
            return false;
        };
        // The declared language is advisory; classification recomputes
        // from the text itself.
        let _declared = self.handoff.take(SANDBOX_CODE_LANGUAGE).await;
        self.set_source(code);
        true
    }

    async fn with_replay(&mut self, op: impl FnOnce(&mut ReplayController)) -> Result<()> {
        let controller = self
            .replay
            .as_ref()
            .ok_or_else(|| Error::Replay("no replay in progress".to_string()))?;
        let mut guard = controller.lock().await;
        op(&mut guard);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{CodeType, ExecutionStrategy};
    use crate::sandbox::engine::scripted::ScriptedEngine;
    use crate::sandbox::{RecordKind, ScriptEngine};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(collab_url: Option<String>) -> Config {
        let mut config = Config::default();
        config.host.flush_interval = Duration::from_millis(10);
        config.collab.max_retries = 0;
        if let Some(url) = collab_url {
            config.collab.base_url = url;
        }
        config
    }

    fn session_with(
        records: Vec<LogRecord>,
        success: bool,
        collab_url: Option<String>,
    ) -> SandboxSession {
        let engine: Arc<dyn ScriptEngine> = Arc::new(ScriptedEngine {
            records,
            success,
            delay: None,
        });
        let config = test_config(collab_url);
        let handoff = HandoffStore::new(Duration::from_secs(60));
        SandboxSession::new(
            config,
            EngineSet {
                js: engine.clone(),
                python: engine,
            },
            handoff,
        )
        .unwrap()
    }

    fn fix_steps_body() -> serde_json::Value {
        serde_json::json!({
            "steps": [
                { "title": "Remove the throw", "explanation": "e1", "code": "console.log('step0')" },
                { "title": "Log instead", "explanation": "e2", "code": "console.log('fixed')" }
            ]
        })
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let mut session = session_with(vec![LogRecord::log("hi")], true, None);
        session.set_source("console.log('hi')");
        assert_eq!(session.classification().code_type, CodeType::Javascript);
        assert_eq!(session.classification().strategy, ExecutionStrategy::Sync);

        let success = session.run_to_completion().await.unwrap();
        assert!(success);

        let kinds: Vec<RecordKind> = session.log().iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RecordKind::Log, RecordKind::Success]);
        assert_eq!(session.log()[0].message, "hi");
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_end_to_end_error_populates_last_error() {
        let mut session = session_with(
            vec![LogRecord::error_with_stack("Error: boom", "at <sandbox>:1")],
            false,
            None,
        );
        session.set_source("throw new Error('boom')");

        let success = session.run_to_completion().await.unwrap();
        assert!(!success);
        assert!(session.last_error().unwrap().message.contains("boom"));
    }

    #[tokio::test]
    async fn test_lint_gate_short_circuits() {
        let mut session = session_with(vec![LogRecord::log("never runs")], true, None);
        session.set_source("<div><span></div>");
        assert_eq!(session.classification().code_type, CodeType::HtmlFragment);

        let success = session.run_to_completion().await.unwrap();
        assert!(!success);
        assert!(session.last_error().is_some());
        // The execution host never ran: no captured "never runs" record.
        assert!(session.log().iter().all(|r| r.message != "never runs"));
        assert!(!session.is_pending());
    }

    #[tokio::test]
    async fn test_run_rejected_during_replay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/fix-suggestions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fix_steps_body()))
            .mount(&server)
            .await;

        let mut session = session_with(
            vec![LogRecord::error("Error: boom")],
            false,
            Some(server.uri()),
        );
        session.set_source("throw new Error('boom')");
        session.run_to_completion().await.unwrap();
        session.request_fix().await.unwrap();

        assert!(session.replay_active());
        assert!(matches!(session.run(), Err(Error::Replay(_))));
    }

    #[tokio::test]
    async fn test_request_fix_requires_error() {
        let mut session = session_with(vec![], true, None);
        session.set_source("console.log(1)");
        session.run_to_completion().await.unwrap();

        assert!(matches!(
            session.request_fix().await,
            Err(Error::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_restores_pre_fix_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/fix-suggestions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fix_steps_body()))
            .mount(&server)
            .await;

        let original = "throw new Error('boom')";
        let mut session = session_with(
            vec![LogRecord::error("Error: boom")],
            false,
            Some(server.uri()),
        );
        session.set_source(original);
        session.run_to_completion().await.unwrap();
        session.request_fix().await.unwrap();

        session.replay_next().await.unwrap();
        session.cancel_fix().await.unwrap();

        assert_eq!(session.source(), original);
        assert!(!session.replay_active());
    }

    #[tokio::test]
    async fn test_accept_adopts_final_code_and_reruns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/fix-suggestions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fix_steps_body()))
            .mount(&server)
            .await;
        // Accept fires a detached bug report; accept must succeed even
        // though this endpoint 500s.
        Mock::given(method("POST"))
            .and(path("/bug-fixes"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut session = session_with(
            vec![LogRecord::error("Error: boom")],
            false,
            Some(server.uri()),
        );
        session.set_source("throw new Error('boom')");
        session.run_to_completion().await.unwrap();
        session.request_fix().await.unwrap();

        session.accept_fix().await.unwrap();
        assert_eq!(session.source(), "console.log('fixed')");
        assert!(!session.replay_active());
        // Acceptance re-triggered a run.
        assert!(session.is_pending());
        session.wait_for_completion().await.unwrap();
    }

    #[tokio::test]
    async fn test_replay_status_and_diff() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/fix-suggestions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fix_steps_body()))
            .mount(&server)
            .await;

        let mut session = session_with(
            vec![LogRecord::error("Error: boom")],
            false,
            Some(server.uri()),
        );
        session.set_source("throw new Error('boom')");
        session.run_to_completion().await.unwrap();
        session.request_fix().await.unwrap();

        let status = session.replay_status().await.unwrap();
        assert_eq!(status.current_index, 0);
        assert_eq!(status.step_count, 2);
        assert!(!status.is_playing);
        assert_eq!(status.diff.removed, vec!["throw new Error('boom')"]);
        assert_eq!(status.diff.added, vec!["console.log('step0')"]);
    }

    #[tokio::test]
    async fn test_create_post_falls_back_to_generic_title() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai/title-suggestions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut session = session_with(vec![], true, Some(server.uri()));
        session.set_source("print('hello')");

        let draft = session.create_post().await.unwrap();
        assert_eq!(draft.title, GENERIC_TITLE);
        assert_eq!(draft.tag, "python");

        // Values are stashed for the next surface and consumed once.
        assert_eq!(
            session.handoff.take(CREATE_POST_CODE).await.as_deref(),
            Some("print('hello')")
        );
        assert_eq!(
            session.handoff.take(CREATE_POST_TITLE).await.as_deref(),
            Some(GENERIC_TITLE)
        );
        assert_eq!(
            session.handoff.take(CREATE_POST_TAG_NAME).await.as_deref(),
            Some("python")
        );
    }

    #[tokio::test]
    async fn test_import_handoff_consumes_values() {
        let mut session = session_with(vec![], true, None);
        session.handoff.put(SANDBOX_CODE, "print(42)").await;
        session.handoff.put(SANDBOX_CODE_LANGUAGE, "python").await;

        assert!(session.import_handoff().await);
        assert_eq!(session.source(), "print(42)");
        assert_eq!(session.classification().code_type, CodeType::Python);

        // Read-once: a second import finds nothing.
        assert!(!session.import_handoff().await);
    }
}
