//! Provider used when no model endpoint is configured.
//!
//! Chat calls fail with [`AgentError::ProviderUnavailable`], which every
//! agent treats as "use your heuristic". Embeddings are a hashed
//! bag-of-words so insight search still ranks by similarity.

use async_trait::async_trait;

use crate::agent::message::{ChatRequest, ChatResponse};
use crate::agent::provider::LlmProvider;
use crate::core::significant_words;
use crate::error::AgentError;

/// Dimension of offline embeddings.
pub const OFFLINE_EMBEDDING_DIM: usize = 64;

/// Model-less provider; see the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

/// FNV-1a, stable across builds and platforms.
fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl LlmProvider for OfflineProvider {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn chat(&self, _request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        Err(AgentError::ProviderUnavailable {
            name: self.name().to_string(),
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let mut vector = vec![0.0_f32; OFFLINE_EMBEDDING_DIM];
        for word in significant_words(text) {
            let slot = (fnv1a(&word) % OFFLINE_EMBEDDING_DIM as u64) as usize;
            vector[slot] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }
}
