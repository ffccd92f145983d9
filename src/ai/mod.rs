pub mod claude;

pub use claude::ClaudeClient;

use async_trait::async_trait;

/// Seam between the conversation pipeline and the model provider.
/// The dispatcher only ever sends one fully assembled prompt per turn.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<String, String>;
}
