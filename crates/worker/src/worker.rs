//! Interpreter worker client (spec.md §4.3).
//!
//! Owns a child interpreter process. Communication is line-delimited JSON,
//! one request per line on stdin, one response per line on stdout, in
//! **strict FIFO order** — a single in-flight queue, not an id-matched map,
//! because the child protocol has no id field (spec.md §9).

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rlm_domain::config::InterpreterConfig;
use rlm_domain::run::ReplExecutionResult;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use crate::protocol::{WorkerRequest, WorkerResponse};

/// Failure semantics for worker operations (spec.md §4.3, §7).
#[derive(Debug, Clone, thiserror::Error)]
pub enum WorkerError {
    #[error("worker process exited (code={code:?}, signal={signal:?})")]
    Exited {
        code: Option<i32>,
        signal: Option<i32>,
    },
    #[error("worker protocol error: {0}")]
    Protocol(String),
    #[error("worker error: {0}")]
    Worker(String),
    #[error("worker io error: {0}")]
    Io(String),
}

/// Contract implemented by the child-process worker and by in-memory test
/// doubles driving the orchestrator in tests.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn init(
        &self,
        context: Option<serde_json::Value>,
        context_file_path: Option<String>,
        bridge_url: String,
        question: Option<String>,
    ) -> Result<(), WorkerError>;

    async fn exec(&self, code: String) -> Result<ReplExecutionResult, WorkerError>;

    async fn final_var(&self, name: String) -> Result<String, WorkerError>;

    /// Best-effort graceful shutdown; unconditional on every exit path.
    async fn close(&self) -> Result<(), WorkerError>;
}

/// Child-process-backed worker, spawned with an operator-configured command.
pub struct WorkerClient {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    /// Serializes whole request/response cycles — this *is* the FIFO queue.
    request_lock: Mutex<()>,
    alive: AtomicBool,
}

impl WorkerClient {
    pub fn spawn(config: &InterpreterConfig) -> Result<Self, WorkerError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| WorkerError::Io(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Io("failed to capture worker stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Io("failed to capture worker stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| WorkerError::Io("failed to capture worker stderr".into()))?;

        // Standard error is forwarded to observability only; it never gates
        // requests (spec.md §4.3).
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::warn!(target: "worker.stderr", "{line}");
            }
        });

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            alive: AtomicBool::new(true),
        })
    }

    async fn write_line(&self, json: &str) -> Result<(), WorkerError> {
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| WorkerError::Io(e.to_string()))?;
        stdin
            .write_all(b"\n")
            .await
            .map_err(|e| WorkerError::Io(e.to_string()))?;
        stdin.flush().await.map_err(|e| WorkerError::Io(e.to_string()))
    }

    /// Read the next non-blank line from stdout. Empty lines are skipped;
    /// EOF marks the process as exited.
    async fn read_line(&self) -> Result<String, WorkerError> {
        let mut stdout = self.stdout.lock().await;
        loop {
            let mut line = String::new();
            let n = stdout
                .read_line(&mut line)
                .await
                .map_err(|e| WorkerError::Io(e.to_string()))?;
            if n == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(WorkerError::Exited {
                    code: None,
                    signal: None,
                });
            }
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }

    /// Send one request and await its response under the FIFO request lock.
    /// A parse error on the response fails only this call — the line is
    /// still consumed, preserving the queue head for the next caller.
    async fn send(&self, req: WorkerRequest) -> Result<WorkerResponse, WorkerError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(WorkerError::Exited {
                code: None,
                signal: None,
            });
        }

        let _guard = self.request_lock.lock().await;

        let json = serde_json::to_string(&req).map_err(|e| WorkerError::Io(e.to_string()))?;
        self.write_line(&json).await?;

        let line = self.read_line().await?;
        let resp: WorkerResponse =
            serde_json::from_str(&line).map_err(|e| WorkerError::Protocol(e.to_string()))?;

        if !resp.ok {
            return Err(WorkerError::Worker(
                resp.error.unwrap_or_else(|| "unknown worker error".into()),
            ));
        }
        Ok(resp)
    }
}

#[async_trait]
impl Worker for WorkerClient {
    async fn init(
        &self,
        context: Option<serde_json::Value>,
        context_file_path: Option<String>,
        bridge_url: String,
        question: Option<String>,
    ) -> Result<(), WorkerError> {
        self.send(WorkerRequest::Init {
            context,
            context_file_path,
            bridge_url,
            question,
        })
        .await?;
        Ok(())
    }

    async fn exec(&self, code: String) -> Result<ReplExecutionResult, WorkerError> {
        let resp = self.send(WorkerRequest::Exec { code }).await?;
        let locals = resp.locals.unwrap_or_default();
        let mut names: Vec<String> = locals.into_keys().collect();
        names.sort();
        Ok(ReplExecutionResult {
            stdout: resp.stdout.unwrap_or_default(),
            stderr: resp.stderr.unwrap_or_default(),
            locals: names,
            execution_time_ms: (resp.execution_time.unwrap_or(0.0) * 1000.0) as u64,
        })
    }

    async fn final_var(&self, name: String) -> Result<String, WorkerError> {
        let resp = self.send(WorkerRequest::FinalVar { name }).await?;
        Ok(resp.value.unwrap_or_default())
    }

    async fn close(&self) -> Result<(), WorkerError> {
        let _ = self.send(WorkerRequest::Close {}).await;
        self.alive.store(false, Ordering::SeqCst);

        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        match tokio::time::timeout(std::time::Duration::from_secs(5), child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(?status, "worker process exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "error waiting for worker process");
            }
            Err(_) => {
                tracing::warn!("worker process did not exit within timeout, killing");
                let _ = child.kill().await;
            }
        }
        Ok(())
    }
}
