use super::BackendAdapter;
use crate::model::AttemptOutcome;
use crate::prompt::PreparedPrompt;
use crate::targets::MockSettings;
use async_trait::async_trait;
use std::time::Duration;

/// Offline backend. Answers with the configured response, or echoes the
/// task's first line.
#[derive(Debug, Clone)]
pub struct MockAdapter {
    settings: MockSettings,
}

impl MockAdapter {
    pub fn new(settings: MockSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl BackendAdapter for MockAdapter {
    async fn dispatch(&self, prompt: &PreparedPrompt, _deadline: Duration) -> AttemptOutcome {
        let answer = match &self.settings.response {
            Some(fixed) => fixed.clone(),
            None => format!(
                "mock answer for {}: {}",
                prompt.test_id,
                prompt.headline().unwrap_or("(empty task)")
            ),
        };
        AttemptOutcome::Success(answer)
    }

    fn provider_name(&self) -> &str {
        "mock"
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}
