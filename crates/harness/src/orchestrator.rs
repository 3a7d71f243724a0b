//! Harness Orchestrator (spec.md §4.8): drives the iteration loop between
//! the root LM and the interpreter worker, wiring the Bridge, Parser,
//! Redactor, Event Sink, and Trace Collector together. This is the "hard
//! core" of the crate — everything else exists to serve this loop.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rlm_domain::context::{Context, ContextMeta};
use rlm_domain::directive::FinalDirective;
use rlm_domain::event::EventKind;
use rlm_domain::message::{LmInput, Message};
use rlm_domain::run::{CodeBlockExecution, IterationRecord, RunConfig};
use rlm_domain::trace::{RunStatus, TraceRecord};
use rlm_providers::{LmCallError, LmClient};
use rlm_worker::{Worker, WorkerError};
use tokio::sync::Mutex as AsyncMutex;

use crate::bridge::{Bridge, RunContext};
use crate::cancel::CancelToken;
use crate::events::{root_iteration_payload, EventSink};
use crate::message;
use crate::parser::{self, ParsedDirective};
use crate::state::RunState;
use crate::trace::{TraceBuilder, TraceCollector};
use crate::worker_factory::WorkerFactory;

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn context_to_json(context: &Context) -> serde_json::Value {
    match context {
        Context::Text(s) => serde_json::json!(s),
        Context::Sequence(items) => serde_json::json!(items),
        Context::Mapping(map) => serde_json::Value::Object(map.clone()),
    }
}

/// One `completion` request (spec.md §6.1).
pub struct CompletionRequest {
    pub context: Context,
    pub question: Option<String>,
}

/// Result of a successful `completion` call.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub run_id: String,
    pub answer: String,
    pub directive: FinalDirective,
    pub iterations: u32,
    pub fallback_used: bool,
}

/// Failure taxonomy surfaced from `completion` (spec.md §7). Every variant
/// is recorded on the delivered trace before being returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Lm(#[from] LmCallError),
    #[error("run cancelled")]
    Cancelled,
    #[error("bridge failed to start: {0}")]
    Bridge(String),
    #[error("worker call timed out after {0:?}")]
    Timeout(Duration),
}

/// Race `fut` against cancellation firing, dropping `fut` in place if
/// `cancel` wins (spec.md §5: a cancellation received mid-call aborts the
/// in-flight I/O rather than waiting for it to return on its own).
async fn race_cancel<T>(
    cancel: &CancelToken,
    fut: impl std::future::Future<Output = Result<T, CompletionError>>,
) -> Result<T, CompletionError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CompletionError::Cancelled),
        result = fut => result,
    }
}

struct IterationOutcome {
    answer: String,
    directive: FinalDirective,
    fallback_used: bool,
    iterations: u32,
}

/// Wires together one root model, one sub model, a worker factory, and the
/// operator's sink/collector, and runs `completion` calls against them.
pub struct Harness {
    pub root_client: Arc<dyn LmClient>,
    pub root_model: String,
    pub sub_client: Arc<dyn LmClient>,
    pub sub_model: String,
    pub worker_factory: Arc<dyn WorkerFactory>,
    pub sink: Arc<dyn EventSink>,
    pub trace_collector: Option<Arc<dyn TraceCollector>>,
    pub config: RunConfig,
}

impl Harness {
    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.config.request_timeout_ms)
    }

    async fn with_worker_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, WorkerError>>,
    ) -> Result<T, CompletionError> {
        match tokio::time::timeout(self.request_timeout(), fut).await {
            Ok(inner) => Ok(inner?),
            Err(_) => Err(CompletionError::Timeout(self.request_timeout())),
        }
    }

    /// Run one full completion: Starting → Initializing → Iterating →
    /// CheckingDirective → Finalizing → Ending, with Failing reachable from
    /// any state (spec.md §4.8). Worker and Bridge are released
    /// unconditionally once acquired, regardless of how the run ends.
    pub async fn completion(
        &self,
        request: CompletionRequest,
        cancel: CancelToken,
    ) -> Result<CompletionResult, CompletionError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = now_ms();

        let state = Arc::new(RunState::new(self.sink.clone(), self.config.subcall_limit));
        state
            .emit(
                EventKind::RunStarted,
                "run started",
                Some(serde_json::json!({ "runId": run_id })),
            )
            .await;

        let context_meta = ContextMeta::compute(&request.context);
        let trace_builder = self
            .trace_collector
            .as_ref()
            .map(|_| Arc::new(AsyncMutex::new(TraceBuilder::new())));

        let run_ctx = Arc::new(RunContext {
            state: state.clone(),
            sub_client: self.sub_client.clone(),
            default_sub_model: self.sub_model.clone(),
            request_timeout: self.request_timeout(),
            subcall_limit: self.config.subcall_limit,
            redaction: self.config.redaction,
            trace: trace_builder.clone(),
        });

        let init = self.initialize(&run_ctx, &request).await;
        let (worker, bridge) = match init {
            Ok(pair) => pair,
            Err(e) => {
                return self
                    .end_failed(&state, &run_id, started_at, &context_meta, trace_builder, e)
                    .await;
            }
        };

        state
            .emit(
                EventKind::RunInitialized,
                "run initialized",
                Some(serde_json::json!({ "contextType": context_meta.ty })),
            )
            .await;

        let run_result = self
            .iterate(&worker, &state, &trace_builder, &context_meta, &request, &cancel)
            .await;

        // Unconditional scoped release, on every exit path from here on.
        if let Err(e) = worker.close().await {
            tracing::warn!(error = %e, "worker close failed during cleanup");
        }
        bridge.stop().await;
        // Drop the orchestrator's own handle so the trace builder Arc held
        // by `run_ctx` (now that the bridge task has exited) is the last
        // one standing, letting `deliver_trace` unwrap it without cloning.
        drop(run_ctx);

        match run_result {
            Ok(outcome) => {
                state
                    .emit(
                        EventKind::RunFinalized,
                        "run finalized",
                        Some(serde_json::json!({ "directive": outcome.directive.kind_str() })),
                    )
                    .await;

                self.deliver_trace(
                    &run_id,
                    started_at,
                    &context_meta,
                    trace_builder,
                    RunStatus::Completed,
                    None,
                    Some(outcome.directive.clone()),
                    outcome.fallback_used,
                )
                .await;

                state
                    .emit(EventKind::RunEndedCompleted, "run ended: completed", None)
                    .await;

                Ok(CompletionResult {
                    run_id,
                    answer: outcome.answer,
                    directive: outcome.directive,
                    iterations: outcome.iterations,
                    fallback_used: outcome.fallback_used,
                })
            }
            Err(e) => {
                self.end_failed(&state, &run_id, started_at, &context_meta, trace_builder, e)
                    .await
            }
        }
    }

    async fn end_failed(
        &self,
        state: &Arc<RunState>,
        run_id: &str,
        started_at: i64,
        context_meta: &ContextMeta,
        trace_builder: Option<Arc<AsyncMutex<TraceBuilder>>>,
        error: CompletionError,
    ) -> Result<CompletionResult, CompletionError> {
        let message = error.to_string();
        state
            .emit(
                EventKind::RunFailed,
                format!("run failed: {message}"),
                Some(serde_json::json!({ "error": message })),
            )
            .await;

        self.deliver_trace(
            run_id,
            started_at,
            context_meta,
            trace_builder,
            RunStatus::Failed,
            Some(message),
            None,
            false,
        )
        .await;

        state
            .emit(EventKind::RunEndedFailed, "run ended: failed", None)
            .await;

        Err(error)
    }

    #[allow(clippy::too_many_arguments)]
    async fn deliver_trace(
        &self,
        run_id: &str,
        started_at: i64,
        context_meta: &ContextMeta,
        trace_builder: Option<Arc<AsyncMutex<TraceBuilder>>>,
        status: RunStatus,
        error: Option<String>,
        finalization: Option<FinalDirective>,
        fallback_used: bool,
    ) {
        let Some(collector) = &self.trace_collector else { return };
        let Some(builder) = trace_builder else { return };
        let built = match Arc::try_unwrap(builder) {
            Ok(mutex) => mutex.into_inner(),
            Err(shared) => {
                // Another clone is still outstanding (shouldn't happen once
                // the bridge task has exited); fall back to a snapshot.
                tracing::warn!("trace builder had more than one owner at run end");
                shared
                    .try_lock()
                    .map(|guard| guard.clone_builder())
                    .unwrap_or_default()
            }
        };

        let trace = TraceRecord {
            run_id: run_id.to_string(),
            started_at,
            ended_at: now_ms(),
            status,
            error,
            config_snapshot: self.config.clone(),
            context_meta: context_meta.clone(),
            iterations: built.iterations,
            subcalls: built.subcalls,
            finalization,
            fallback_used,
        };

        collector.deliver(trace).await;
    }

    /// Spawn the worker, start the Bridge, and run the `init` handshake.
    /// Any failure unwinds whatever was already acquired before returning.
    async fn initialize(
        &self,
        run_ctx: &Arc<RunContext>,
        request: &CompletionRequest,
    ) -> Result<(Arc<dyn Worker>, Bridge), CompletionError> {
        let worker = self.worker_factory.spawn()?;

        let bridge = match Bridge::start(run_ctx.clone()).await {
            Ok(bridge) => bridge,
            Err(e) => {
                let _ = worker.close().await;
                return Err(CompletionError::Bridge(e.to_string()));
            }
        };

        let context_value = context_to_json(&request.context);
        let init = self
            .with_worker_timeout(worker.init(
                Some(context_value),
                None,
                bridge.url.clone(),
                request.question.clone(),
            ))
            .await;

        match init {
            Ok(()) => Ok((worker, bridge)),
            Err(e) => {
                let _ = worker.close().await;
                bridge.stop().await;
                Err(e)
            }
        }
    }

    /// The root/exec alternation (spec.md §4.8 "Iterating"/"CheckingDirective"),
    /// falling back to one nudged call once `iterationLimit` is exhausted.
    async fn iterate(
        &self,
        worker: &Arc<dyn Worker>,
        state: &Arc<RunState>,
        trace_builder: &Option<Arc<AsyncMutex<TraceBuilder>>>,
        context_meta: &ContextMeta,
        request: &CompletionRequest,
        cancel: &CancelToken,
    ) -> Result<IterationOutcome, CompletionError> {
        let timeout = self.request_timeout();
        let mut history = vec![
            Message::system(message::system_prompt()),
            Message::user(format!(
                "{}\n\n{}",
                message::context_preamble(context_meta, request.question.as_deref()),
                message::turn_instruction(1)
            )),
        ];

        for iteration in 1..=self.config.iteration_limit {
            if cancel.is_cancelled() {
                return Err(CompletionError::Cancelled);
            }

            state
                .emit(
                    EventKind::RootIterationStarted,
                    format!("iteration {iteration} started"),
                    Some(root_iteration_payload(iteration, None, None, None)),
                )
                .await;

            let call_result = race_cancel(cancel, async {
                self.root_client
                    .call(&self.root_model, LmInput::Messages(history.clone()), timeout)
                    .await
                    .map_err(CompletionError::from)
            })
            .await?;
            let response_text = call_result.text.clone();
            history.push(Message::assistant(response_text.clone()));

            let blocks = parser::extract_repl_blocks(&response_text);

            state
                .emit(
                    EventKind::RootIterationCompleted,
                    format!("iteration {iteration} completed"),
                    Some(root_iteration_payload(
                        iteration,
                        Some(blocks.len()),
                        Some(response_text.chars().count()),
                        Some(call_result.latency_ms),
                    )),
                )
                .await;

            if cancel.is_cancelled() {
                return Err(CompletionError::Cancelled);
            }

            let mut executions = Vec::with_capacity(blocks.len());
            let mut rendered_blocks = Vec::with_capacity(blocks.len());
            for block in &blocks {
                if cancel.is_cancelled() {
                    return Err(CompletionError::Cancelled);
                }
                let repl_id = state.begin_repl(iteration).await;
                let exec_result =
                    race_cancel(cancel, self.with_worker_timeout(worker.exec(block.code.clone())))
                        .await;
                let exec_result = match exec_result {
                    Ok(r) => r,
                    Err(e) => {
                        state
                            .end_repl(&repl_id, iteration, serde_json::json!({ "error": e.to_string() }))
                            .await;
                        return Err(e);
                    }
                };
                state
                    .end_repl(
                        &repl_id,
                        iteration,
                        serde_json::json!({ "executionTimeMs": exec_result.execution_time_ms }),
                    )
                    .await;

                rendered_blocks.push(message::render_execution_message(
                    &block.code,
                    &exec_result,
                    self.config.max_execution_output_chars,
                ));
                executions.push(CodeBlockExecution {
                    repl_execution_id: repl_id,
                    code: block.code.clone(),
                    result: exec_result,
                });
            }

            if let Some(tb) = trace_builder {
                tb.lock().await.push_iteration(IterationRecord {
                    index: iteration,
                    response_text: response_text.clone(),
                    executions,
                });
            }

            match parser::parse_directive(&response_text) {
                Some(ParsedDirective::Final(value)) => {
                    return Ok(IterationOutcome {
                        answer: value.clone(),
                        directive: FinalDirective::Final { value },
                        fallback_used: false,
                        iterations: iteration,
                    });
                }
                Some(ParsedDirective::FinalVar(name)) => {
                    let value = race_cancel(
                        cancel,
                        self.with_worker_timeout(worker.final_var(name.clone())),
                    )
                    .await?;
                    return Ok(IterationOutcome {
                        answer: value,
                        directive: FinalDirective::FinalVar { value: name },
                        fallback_used: false,
                        iterations: iteration,
                    });
                }
                None => {
                    let next_instruction = message::turn_instruction(iteration + 1);
                    let user_turn = if rendered_blocks.is_empty() {
                        next_instruction
                    } else {
                        format!("{}\n\n{next_instruction}", rendered_blocks.join("\n\n"))
                    };
                    history.push(Message::user(user_turn));
                }
            }
        }

        // Fallback path (spec.md §4.8 "Fallback path"): iterationLimit
        // iterations elapsed with no directive. One nudged call, not
        // counted against the limit.
        history.push(Message::user(message::fallback_nudge()));
        let call_result = race_cancel(cancel, async {
            self.root_client
                .call(&self.root_model, LmInput::Messages(history.clone()), timeout)
                .await
                .map_err(CompletionError::from)
        })
        .await?;
        let response_text = call_result.text.clone();

        let outcome = match parser::parse_directive(&response_text) {
            Some(ParsedDirective::Final(value)) => IterationOutcome {
                answer: value.clone(),
                directive: FinalDirective::Final { value },
                fallback_used: true,
                iterations: self.config.iteration_limit,
            },
            Some(ParsedDirective::FinalVar(name)) => {
                let value = race_cancel(
                    cancel,
                    self.with_worker_timeout(worker.final_var(name.clone())),
                )
                .await?;
                IterationOutcome {
                    answer: value,
                    directive: FinalDirective::FinalVar { value: name },
                    fallback_used: true,
                    iterations: self.config.iteration_limit,
                }
            }
            None => IterationOutcome {
                answer: response_text.clone(),
                directive: FinalDirective::FallbackText { value: response_text },
                fallback_used: true,
                iterations: self.config.iteration_limit,
            },
        };

        Ok(outcome)
    }
}

impl TraceBuilder {
    fn clone_builder(&self) -> TraceBuilder {
        TraceBuilder {
            iterations: self.iterations.clone(),
            subcalls: self.subcalls.clone(),
        }
    }
}
