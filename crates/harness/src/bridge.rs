//! LM Bridge Server (spec.md §4.4): a loopback-only Axum server exposing
//! `/llm_query` and `/llm_query_batched` to the interpreter process. Both
//! endpoints delegate to the Orchestrator's subcall path (§4.8) and never
//! return 5xx for subcall-business errors — those are serialized into an
//! `"Error: "`-prefixed `response` string instead, matching what the root
//! model's REPL helpers expect back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use rlm_domain::config::RedactionPolicy;
use rlm_domain::event::EventKind;
use rlm_domain::message::LmInput;
use rlm_domain::run::{SubcallKind, SubcallOutcome, SubcallRecord};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::redact::redact_prompt;
use crate::state::{RunState, SubcallAdmission};
use crate::trace::TraceBuilder;
use rlm_providers::LmClient;

/// State shared between the Orchestrator's main loop and re-entrant Bridge
/// handlers: the guarded counters/bindings, the sub LM client, and the
/// (optional) trace accumulator.
pub struct RunContext {
    pub state: Arc<RunState>,
    pub sub_client: Arc<dyn LmClient>,
    pub default_sub_model: String,
    pub request_timeout: Duration,
    pub subcall_limit: u32,
    pub redaction: RedactionPolicy,
    pub trace: Option<Arc<AsyncMutex<TraceBuilder>>>,
}

impl RunContext {
    async fn push_subcall_record(
        &self,
        id: String,
        iteration_index: Option<u32>,
        repl_execution_id: Option<String>,
        kind: SubcallKind,
        batch_index: Option<u32>,
        model: String,
        prompt: String,
        outcome: SubcallOutcome,
        latency_ms: u64,
    ) {
        let Some(trace) = &self.trace else { return };
        let redacted = redact_prompt(&prompt, &self.redaction);
        let mut builder = trace.lock().await;
        builder.push_subcall(SubcallRecord {
            id,
            iteration_index,
            repl_execution_id,
            kind,
            batch_index,
            model,
            prompt: redacted.text,
            outcome,
            latency_ms,
        });
    }

    /// Process one subcall prompt end-to-end: admission, the LM call
    /// itself, event emission, and trace bookkeeping. Shared by the single
    /// and batched endpoints (spec.md §4.8 "Subcall accounting").
    async fn process_one(
        &self,
        prompt: String,
        model: Option<String>,
        kind: SubcallKind,
        batch_index: Option<u32>,
    ) -> String {
        let model = model.unwrap_or_else(|| self.default_sub_model.clone());

        match self.state.admit_subcall(&model).await {
            SubcallAdmission::Rejected {
                id,
                iteration_index,
                repl_execution_id,
            } => {
                let message = format!("Error: sub-call limit reached ({})", self.subcall_limit);
                self.push_subcall_record(
                    id,
                    iteration_index,
                    repl_execution_id,
                    kind,
                    batch_index,
                    model,
                    prompt,
                    SubcallOutcome::Rejected {
                        error: message.clone(),
                    },
                    0,
                )
                .await;
                message
            }
            SubcallAdmission::Accepted {
                id,
                iteration_index,
                repl_execution_id,
            } => {
                let started = Instant::now();
                let result = self
                    .sub_client
                    .call(&model, LmInput::Prompt(prompt.clone()), self.request_timeout)
                    .await;
                let latency_ms = started.elapsed().as_millis() as u64;

                match result {
                    Ok(lm_result) => {
                        self.state
                            .subcall_completed(
                                &id,
                                iteration_index,
                                repl_execution_id.as_deref(),
                                &model,
                                latency_ms,
                            )
                            .await;
                        self.push_subcall_record(
                            id,
                            iteration_index,
                            repl_execution_id,
                            kind,
                            batch_index,
                            model,
                            prompt,
                            SubcallOutcome::Completed {
                                response: lm_result.text.clone(),
                            },
                            latency_ms,
                        )
                        .await;
                        lm_result.text
                    }
                    Err(e) => {
                        let message = format!("Error: LM query failed - {e}");
                        self.state
                            .subcall_failed(
                                &id,
                                iteration_index,
                                repl_execution_id.as_deref(),
                                &model,
                                &e.to_string(),
                            )
                            .await;
                        self.push_subcall_record(
                            id,
                            iteration_index,
                            repl_execution_id,
                            kind,
                            batch_index,
                            model,
                            prompt,
                            SubcallOutcome::Failed {
                                error: e.to_string(),
                            },
                            latency_ms,
                        )
                        .await;
                        message
                    }
                }
            }
        }
    }

    pub async fn query(&self, prompt: String, model: Option<String>) -> String {
        self.process_one(prompt, model, SubcallKind::Single, None).await
    }

    pub async fn query_batched(&self, prompts: Vec<String>, model: Option<String>) -> Vec<String> {
        let size = prompts.len();
        self.state
            .emit(
                EventKind::SubcallBatchStarted,
                format!("batch of {size} started"),
                Some(serde_json::json!({ "size": size, "model": model })),
            )
            .await;

        // Sequential and order-preserving by construction (spec.md §4.8,
        // §5): each prompt gets its own id and budget check in order.
        let mut responses = Vec::with_capacity(size);
        for (idx, prompt) in prompts.into_iter().enumerate() {
            let response = self
                .process_one(prompt, model.clone(), SubcallKind::Batched, Some(idx as u32))
                .await;
            responses.push(response);
        }

        self.state
            .emit(
                EventKind::SubcallBatchCompleted,
                format!("batch of {size} completed"),
                Some(serde_json::json!({ "size": size })),
            )
            .await;

        responses
    }
}

#[derive(Debug, Deserialize)]
struct LlmQueryRequest {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct LlmQueryResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct LlmQueryBatchedRequest {
    prompts: Vec<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Serialize)]
struct LlmQueryBatchedResponse {
    responses: Vec<String>,
}

async fn handle_llm_query(
    State(ctx): State<Arc<RunContext>>,
    Json(req): Json<LlmQueryRequest>,
) -> Json<LlmQueryResponse> {
    let response = ctx.query(req.prompt, req.model).await;
    Json(LlmQueryResponse { response })
}

async fn handle_llm_query_batched(
    State(ctx): State<Arc<RunContext>>,
    Json(req): Json<LlmQueryBatchedRequest>,
) -> Json<LlmQueryBatchedResponse> {
    let responses = ctx.query_batched(req.prompts, req.model).await;
    Json(LlmQueryBatchedResponse { responses })
}

fn app(ctx: Arc<RunContext>) -> Router {
    Router::new()
        .route("/llm_query", post(handle_llm_query))
        .route("/llm_query_batched", post(handle_llm_query_batched))
        .with_state(ctx)
}

/// A running Bridge instance: bound to an ephemeral loopback port, stopped
/// unconditionally as part of the Orchestrator's scoped release (§4.8
/// "Ending", §5 "Resource discipline").
pub struct Bridge {
    pub url: String,
    shutdown: Option<oneshot::Sender<()>>,
    join: JoinHandle<()>,
}

impl Bridge {
    pub async fn start(ctx: Arc<RunContext>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let router = app(ctx);

        let join = tokio::spawn(async move {
            let server = axum::serve(listener, router).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                tracing::warn!(error = %e, "bridge server exited with error");
            }
        });

        Ok(Self {
            url: format!("http://{addr}"),
            shutdown: Some(shutdown_tx),
            join,
        })
    }

    /// Best-effort graceful stop, unconditional on every run exit path.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.join.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecSink;
    use async_trait::async_trait;
    use rlm_providers::{LmCallError, LmCallResult};

    struct EchoClient;

    #[async_trait]
    impl LmClient for EchoClient {
        async fn call(
            &self,
            _model: &str,
            input: LmInput,
            _deadline: Duration,
        ) -> Result<LmCallResult, LmCallError> {
            let text = match input {
                LmInput::Prompt(p) => format!("echo: {p}"),
                LmInput::Messages(_) => "echo: messages".to_string(),
            };
            Ok(LmCallResult {
                text,
                usage: None,
                finish_reason: None,
                latency_ms: 1,
            })
        }
    }

    struct FailingClient;

    #[async_trait]
    impl LmClient for FailingClient {
        async fn call(
            &self,
            _model: &str,
            _input: LmInput,
            _deadline: Duration,
        ) -> Result<LmCallResult, LmCallError> {
            Err(LmCallError::Remote("boom".into()))
        }
    }

    fn context(sub_client: Arc<dyn LmClient>, subcall_limit: u32) -> Arc<RunContext> {
        let sink = Arc::new(VecSink::new());
        Arc::new(RunContext {
            state: Arc::new(RunState::new(sink, subcall_limit)),
            sub_client,
            default_sub_model: "gpt-4o-mini".into(),
            request_timeout: Duration::from_secs(5),
            subcall_limit,
            redaction: RedactionPolicy {
                max_prompt_chars: 4_000,
                max_context_preview_chars: 2_000,
                max_repl_output_chars: 4_000,
                head_chars: 1_000,
                tail_chars: 500,
            },
            trace: Some(Arc::new(AsyncMutex::new(TraceBuilder::new()))),
        })
    }

    #[tokio::test]
    async fn query_returns_lm_response() {
        let ctx = context(Arc::new(EchoClient), 10);
        let response = ctx.query("hi".into(), None).await;
        assert_eq!(response, "echo: hi");
    }

    #[tokio::test]
    async fn query_rejects_past_the_limit() {
        let ctx = context(Arc::new(EchoClient), 1);
        let first = ctx.query("one".into(), None).await;
        let second = ctx.query("two".into(), None).await;
        assert_eq!(first, "echo: one");
        assert_eq!(second, "Error: sub-call limit reached (1)");
    }

    #[tokio::test]
    async fn query_failure_is_surfaced_as_error_string() {
        let ctx = context(Arc::new(FailingClient), 10);
        let response = ctx.query("hi".into(), None).await;
        assert!(response.starts_with("Error: LM query failed - "));
    }

    #[tokio::test]
    async fn batched_preserves_prompt_order() {
        let ctx = context(Arc::new(EchoClient), 10);
        let responses = ctx
            .query_batched(vec!["a".into(), "b".into(), "c".into()], None)
            .await;
        assert_eq!(responses, vec!["echo: a", "echo: b", "echo: c"]);
    }

    #[tokio::test]
    async fn batched_each_prompt_gets_its_own_budget_check() {
        let ctx = context(Arc::new(EchoClient), 2);
        let responses = ctx
            .query_batched(vec!["a".into(), "b".into(), "c".into()], None)
            .await;
        assert_eq!(responses[0], "echo: a");
        assert_eq!(responses[1], "echo: b");
        assert_eq!(responses[2], "Error: sub-call limit reached (2)");
    }

    #[tokio::test]
    async fn bridge_starts_and_stops_on_ephemeral_port() {
        let ctx = context(Arc::new(EchoClient), 10);
        let bridge = Bridge::start(ctx).await.expect("bridge starts");
        assert!(bridge.url.starts_with("http://127.0.0.1:"));
        bridge.stop().await;
    }

    #[tokio::test]
    async fn bridge_serves_llm_query_over_http() {
        let ctx = context(Arc::new(EchoClient), 10);
        let bridge = Bridge::start(ctx).await.expect("bridge starts");
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("{}/llm_query", bridge.url))
            .json(&serde_json::json!({"prompt": "hi"}))
            .send()
            .await
            .expect("request succeeds");
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["response"], serde_json::json!("echo: hi"));
        bridge.stop().await;
    }

    #[tokio::test]
    async fn bridge_returns_404_for_unknown_path() {
        let ctx = context(Arc::new(EchoClient), 10);
        let bridge = Bridge::start(ctx).await.expect("bridge starts");
        let client = reqwest::Client::new();
        let resp = client.get(format!("{}/nope", bridge.url)).send().await.unwrap();
        assert_eq!(resp.status(), 404);
        bridge.stop().await;
    }

    #[tokio::test]
    async fn bridge_returns_405_for_wrong_method() {
        let ctx = context(Arc::new(EchoClient), 10);
        let bridge = Bridge::start(ctx).await.expect("bridge starts");
        let client = reqwest::Client::new();
        let resp = client.get(format!("{}/llm_query", bridge.url)).send().await.unwrap();
        assert_eq!(resp.status(), 405);
        bridge.stop().await;
    }
}
