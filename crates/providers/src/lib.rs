pub mod client;
pub mod openai_compat;
pub mod registry;

pub use client::{LmCallError, LmCallResult, LmClient, Usage};
pub use openai_compat::OpenAiCompatClient;
pub use registry::{ProviderInitError, ProviderRegistry};
