//! Script engines
//!
//! A [`ScriptEngine`] turns a harness program into a stream of captured
//! records plus a success flag. The production engine spawns a child
//! interpreter process and parses the harness's JSONL stdout; `input_request`
//! lines are answered through the configured [`InputProvider`] by writing to
//! the child's stdin, which keeps blocking `input()` semantics without the
//! worker ever blocking the host.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sandbox::input::InputProvider;
use crate::sandbox::protocol::LogRecord;

/// Interpreter family a harness program targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineLanguage {
    Js,
    Python,
}

/// A fully wrapped program ready for an engine
#[derive(Debug, Clone)]
pub struct HarnessProgram {
    pub language: EngineLanguage,
    /// Harness prelude + embedded user code
    pub source: String,
}

/// Executes harness programs, streaming records as they are captured.
///
/// Implementations send every captured [`LogRecord`] through `records` in
/// emission order and return the run's success flag. They never treat a
/// user-code failure as an `Err`: execution failures are data.
#[async_trait]
pub trait ScriptEngine: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Run one program to completion
    async fn run(
        &self,
        program: &HarnessProgram,
        records: mpsc::Sender<LogRecord>,
    ) -> Result<bool>;
}

/// Child-process engine driving `node` / `python3`
pub struct ProcessEngine {
    command: PathBuf,
    eval_flag: &'static str,
    language: EngineLanguage,
    input: Arc<dyn InputProvider>,
    max_output_bytes: usize,
}

impl ProcessEngine {
    /// Engine for JS programs, resolving `node` on PATH unless overridden
    pub fn node(
        path_override: Option<PathBuf>,
        input: Arc<dyn InputProvider>,
        max_output_bytes: usize,
    ) -> Result<Self> {
        let command = match path_override {
            Some(path) => path,
            None => which::which("node")?,
        };
        Ok(ProcessEngine {
            command,
            eval_flag: "-e",
            language: EngineLanguage::Js,
            input,
            max_output_bytes,
        })
    }

    /// Engine for Python programs, resolving `python3` on PATH unless overridden
    pub fn python(
        path_override: Option<PathBuf>,
        input: Arc<dyn InputProvider>,
        max_output_bytes: usize,
    ) -> Result<Self> {
        let command = match path_override {
            Some(path) => path,
            None => which::which("python3")?,
        };
        Ok(ProcessEngine {
            command,
            eval_flag: "-c",
            language: EngineLanguage::Python,
            input,
            max_output_bytes,
        })
    }

    /// Map one stdout line to a record, answering input requests in place.
    /// Lines that are not harness JSON pass through as plain log records.
    async fn handle_line(
        &self,
        line: &str,
        stdin: &mut Option<tokio::process::ChildStdin>,
        records: &mpsc::Sender<LogRecord>,
    ) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }

        if let Ok(value) = serde_json::from_str::<serde_json::Value>(line) {
            if value.get("type").and_then(|t| t.as_str()) == Some("input_request") {
                let prompt = value
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default();
                let answer = self.input.read_line(prompt).await?;
                if let Some(ref mut stdin) = stdin {
                    stdin.write_all(answer.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await?;
                }
                return Ok(());
            }

            if let Ok(record) = serde_json::from_value::<LogRecord>(value) {
                let _ = records.send(record).await;
                return Ok(());
            }
        }

        let _ = records.send(LogRecord::log(line.to_string())).await;
        Ok(())
    }
}

#[async_trait]
impl ScriptEngine for ProcessEngine {
    fn name(&self) -> &str {
        match self.language {
            EngineLanguage::Js => "node",
            EngineLanguage::Python => "python",
        }
    }

    async fn run(
        &self,
        program: &HarnessProgram,
        records: mpsc::Sender<LogRecord>,
    ) -> Result<bool> {
        if program.language != self.language {
            return Err(Error::Engine(format!(
                "{} engine cannot run a {:?} program",
                self.name(),
                program.language
            )));
        }

        debug!(
            "Spawning {} ({} harness bytes)",
            self.command.display(),
            program.source.len()
        );

        let mut child = Command::new(&self.command)
            .arg(self.eval_flag)
            .arg(&program.source)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Engine(format!("Failed to spawn {}: {}", self.name(), e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Engine("child stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Engine("child stderr unavailable".to_string()))?;
        let mut stdin = child.stdin.take();

        let mut stdout_lines = BufReader::new(stdout).lines();
        let mut stderr_lines = BufReader::new(stderr).lines();
        let mut stderr_tail: Vec<String> = Vec::new();
        let mut seen_bytes = 0usize;
        let mut truncated = false;

        loop {
            tokio::select! {
                line = stdout_lines.next_line() => match line {
                    Ok(Some(line)) => {
                        seen_bytes += line.len();
                        if seen_bytes > self.max_output_bytes {
                            if !truncated {
                                truncated = true;
                                let _ = records
                                    .send(LogRecord::warning("Output truncated: limit reached"))
                                    .await;
                            }
                            continue;
                        }
                        self.handle_line(&line, &mut stdin, &records).await?;
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!("Error reading child stdout: {}", e);
                        break;
                    }
                },
                line = stderr_lines.next_line() => match line {
                    Ok(Some(line)) => {
                        if !line.trim().is_empty() {
                            stderr_tail.push(line);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Error reading child stderr: {}", e),
                },
            }
        }

        // Stdout closed first; drain whatever stderr still holds.
        while let Ok(Some(line)) = stderr_lines.next_line().await {
            if !line.trim().is_empty() {
                stderr_tail.push(line);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Engine(format!("Process error: {}", e)))?;

        // Interpreter-level stderr (harness syntax errors, interpreter
        // crashes) only matters when the run failed; the harness reports
        // user-code errors itself.
        if !status.success() && !stderr_tail.is_empty() {
            let _ = records
                .send(LogRecord::error_with_stack(
                    format!("{} exited with an error", self.name()),
                    stderr_tail.join("\n"),
                ))
                .await;
        }

        Ok(status.success())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::input::QueuedInput;

    fn js_program(source: &str) -> HarnessProgram {
        HarnessProgram {
            language: EngineLanguage::Js,
            source: source.to_string(),
        }
    }

    #[tokio::test]
    async fn test_language_mismatch_is_an_error() {
        let Ok(engine) = ProcessEngine::node(None, Arc::new(QueuedInput::new(Vec::<String>::new())), 1024) else {
            eprintln!("node not installed; skipping");
            return;
        };
        let program = HarnessProgram {
            language: EngineLanguage::Python,
            source: String::new(),
        };
        let (tx, _rx) = mpsc::channel(8);
        assert!(engine.run(&program, tx).await.is_err());
    }

    #[tokio::test]
    async fn test_node_round_trip() {
        // Real-process test; skipped when node is not on PATH.
        let Ok(engine) = ProcessEngine::node(None, Arc::new(QueuedInput::new(Vec::<String>::new())), 64 * 1024) else {
            eprintln!("node not installed; skipping");
            return;
        };

        let (tx, mut rx) = mpsc::channel(64);
        let program = js_program(
            r#"process.stdout.write(JSON.stringify({type:"log",message:"hi"}) + "\n");"#,
        );
        let success = engine.run(&program, tx).await.unwrap();
        assert!(success);

        let record = rx.recv().await.unwrap();
        assert_eq!(record.message, "hi");
    }

    #[tokio::test]
    async fn test_node_failure_reports_stderr() {
        let Ok(engine) = ProcessEngine::node(None, Arc::new(QueuedInput::new(Vec::<String>::new())), 64 * 1024) else {
            eprintln!("node not installed; skipping");
            return;
        };

        let (tx, mut rx) = mpsc::channel(64);
        let program = js_program("this is not ( valid js");
        let success = engine.run(&program, tx).await.unwrap();
        assert!(!success);

        let record = rx.recv().await.unwrap();
        assert!(record.is_error());
        assert!(record.stack.is_some());
    }
}
