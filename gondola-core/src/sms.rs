use async_trait::async_trait;

use crate::payment::ProviderResult;

#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send a plain-text message to an E.164 phone number
    async fn send(&self, to: &str, body: &str) -> ProviderResult<()>;
}
