//! LLM provider implementations.

mod offline;
#[cfg(feature = "openai")]
mod openai;

pub use offline::{OFFLINE_EMBEDDING_DIM, OfflineProvider};
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;
