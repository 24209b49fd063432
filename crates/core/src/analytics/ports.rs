//! Port for the text-analysis endpoint

use async_trait::async_trait;
use policydesk_domain::Result;

/// Free-form text model: prompt in, answer out.
#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(&self, prompt: &str) -> Result<String>;
}
