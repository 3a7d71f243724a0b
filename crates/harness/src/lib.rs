pub mod bridge;
pub mod cancel;
pub mod events;
pub mod message;
pub mod orchestrator;
pub mod parser;
pub mod redact;
pub mod state;
pub mod trace;
pub mod worker_factory;

pub use bridge::{Bridge, RunContext};
pub use cancel::CancelToken;
pub use events::{EventSink, LoggingSink, NullSink, VecSink};
pub use orchestrator::{CompletionError, CompletionRequest, CompletionResult, Harness};
pub use state::RunState;
pub use trace::{NullCollector, TraceBuilder, TraceCollector, VecCollector};
pub use worker_factory::{ProcessWorkerFactory, WorkerFactory};
