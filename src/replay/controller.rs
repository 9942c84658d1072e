//! Replay controller
//!
//! State machine over a sequence of AI-suggested fix steps. The controller
//! itself is synchronous and owns all replay state; autoplay is a driver
//! task that advances it on a fixed delay, guarded by a generation counter
//! so a timer armed against a stale index can never fire into a new one.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::replay::diff::{line_diff, LineDiff};

/// One AI-suggested fix increment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayStep {
    pub title: String,
    pub explanation: String,
    /// Full resulting source after this step
    pub code: String,
}

/// Outcome of accepting a replay session
#[derive(Debug, Clone)]
pub struct AcceptedFix {
    /// Source as it was before the fix request
    pub original: String,
    /// Final step's code
    pub fixed: String,
    pub step_count: usize,
}

/// Active replay over a non-empty step list
pub struct ReplayController {
    steps: Vec<ReplayStep>,
    current: usize,
    playing: bool,
    /// Snapshot taken immediately before the fix request
    original: String,
    /// Bumped on every state change; stale autoplay timers check it
    generation: u64,
}

impl ReplayController {
    /// Create a session positioned at step 0, not playing.
    /// An empty step list is a collaborator failure, not a session.
    pub fn new(original: impl Into<String>, steps: Vec<ReplayStep>) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::Replay("no actionable steps".to_string()));
        }
        Ok(ReplayController {
            steps,
            current: 0,
            playing: false,
            original: original.into(),
            generation: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_last(&self) -> bool {
        self.current + 1 == self.steps.len()
    }

    pub fn current_step(&self) -> &ReplayStep {
        &self.steps[self.current]
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Diff of the current step against its predecessor (or the pre-fix
    /// original for step 0)
    pub fn current_diff(&self) -> LineDiff {
        let previous = if self.current == 0 {
            self.original.as_str()
        } else {
            &self.steps[self.current - 1].code
        };
        line_diff(previous, &self.steps[self.current].code)
    }

    /// Advance one step; no-op at the last step. Manual navigation always
    /// stops autoplay.
    pub fn next(&mut self) {
        self.playing = false;
        if !self.is_last() {
            self.current += 1;
        }
        self.touch();
    }

    /// Go back one step; no-op at step 0
    pub fn prev(&mut self) {
        self.playing = false;
        if self.current > 0 {
            self.current -= 1;
        }
        self.touch();
    }

    /// Select a step directly
    pub fn jump(&mut self, index: usize) -> Result<()> {
        if index >= self.steps.len() {
            return Err(Error::InvalidInput(format!(
                "step index {} out of range (0..{})",
                index,
                self.steps.len()
            )));
        }
        self.current = index;
        self.playing = false;
        self.touch();
        Ok(())
    }

    /// Flip autoplay; has no effect at the last step
    pub fn toggle_play(&mut self) {
        if self.is_last() {
            return;
        }
        self.playing = !self.playing;
        self.touch();
    }

    /// Autoplay advancement: keeps playing across steps, stops at the last
    fn advance_auto(&mut self) {
        if !self.is_last() {
            self.current += 1;
        }
        if self.is_last() {
            self.playing = false;
        }
        self.touch();
    }

    /// Discard the session, returning the pre-fix snapshot. The controller
    /// is spent afterwards and must be dropped by its owner.
    pub fn cancel(&mut self) -> String {
        self.playing = false;
        self.touch();
        std::mem::take(&mut self.original)
    }

    /// Commit the final step's code. The controller is spent afterwards
    /// and must be dropped by its owner.
    pub fn accept(&mut self) -> AcceptedFix {
        self.playing = false;
        self.touch();
        let step_count = self.steps.len();
        let fixed = self
            .steps
            .last()
            .map(|s| s.code.clone())
            .unwrap_or_default();
        AcceptedFix {
            original: std::mem::take(&mut self.original),
            fixed,
            step_count,
        }
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

/// Drive autoplay on a shared controller: while playing and not at the last
/// step, advance after `delay`. Any state change between arming and firing
/// bumps the generation and invalidates the armed tick.
pub async fn drive_autoplay(controller: Arc<Mutex<ReplayController>>, delay: Duration) {
    loop {
        let armed_generation = {
            let guard = controller.lock().await;
            if !guard.is_playing() || guard.is_last() {
                return;
            }
            guard.generation()
        };

        tokio::time::sleep(delay).await;

        let mut guard = controller.lock().await;
        if guard.generation() != armed_generation {
            // State moved under the timer; re-arm against the new state.
            debug!("autoplay tick dropped: stale generation");
            continue;
        }
        if guard.is_playing() && !guard.is_last() {
            guard.advance_auto();
        } else {
            return;
        }
    }
}
