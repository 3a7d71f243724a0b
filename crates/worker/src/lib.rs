pub mod protocol;
pub mod worker;

pub use worker::{Worker, WorkerClient, WorkerError};
