pub mod agent;
pub mod hosted;
pub mod mock;
pub mod poll;

use crate::errors::TargetError;
use crate::model::AttemptOutcome;
use crate::prompt::PreparedPrompt;
use crate::targets::{ProviderSettings, TargetConfig};
use async_trait::async_trait;
use std::time::Duration;

pub use agent::AgentAdapter;
pub use hosted::HostedAdapter;
pub use mock::MockAdapter;

/// Produces one candidate answer per call.
///
/// Implementations must return within `deadline` (plus scheduling slack) and
/// must not let internal faults escape: anything that goes wrong becomes
/// [`AttemptOutcome::Error`]. Only a missing answer at the deadline is
/// [`AttemptOutcome::Timeout`].
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    async fn dispatch(&self, prompt: &PreparedPrompt, deadline: Duration) -> AttemptOutcome;

    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;
}

/// The closed set of backends a target can select.
pub enum Backend {
    Mock(MockAdapter),
    Hosted(HostedAdapter),
    Agent(AgentAdapter),
}

impl Backend {
    pub fn from_target(target: &TargetConfig) -> Result<Self, TargetError> {
        let backend = match &target.settings {
            ProviderSettings::Mock(s) => Backend::Mock(MockAdapter::new(s.clone())),
            ProviderSettings::Azure(s) => {
                Backend::Hosted(HostedAdapter::azure(&target.name, s.clone())?)
            }
            ProviderSettings::Anthropic(s) => {
                Backend::Hosted(HostedAdapter::anthropic(&target.name, s.clone())?)
            }
            ProviderSettings::Vscode(s) => Backend::Agent(AgentAdapter::new(s.clone())),
        };
        tracing::debug!(
            target_name = %target.name,
            provider = backend.provider_name(),
            model = backend.model_name(),
            "backend selected"
        );
        Ok(backend)
    }

    fn inner(&self) -> &dyn BackendAdapter {
        match self {
            Backend::Mock(a) => a,
            Backend::Hosted(a) => a,
            Backend::Agent(a) => a,
        }
    }
}

#[async_trait]
impl BackendAdapter for Backend {
    async fn dispatch(&self, prompt: &PreparedPrompt, deadline: Duration) -> AttemptOutcome {
        self.inner().dispatch(prompt, deadline).await
    }

    fn provider_name(&self) -> &str {
        self.inner().provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner().model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PromptFragment, TestCase};
    use crate::targets::{AnthropicSettings, ProviderKind};

    #[tokio::test]
    async fn mock_target_builds_mock_backend() {
        let backend = Backend::from_target(&TargetConfig::mock(Some("- fixed".into()))).unwrap();
        assert!(matches!(backend, Backend::Mock(_)));
        assert_eq!(backend.provider_name(), ProviderKind::Mock.as_str());

        let tc = TestCase::new(
            "t",
            vec![PromptFragment::Text { text: "q".into() }],
            "- a",
        );
        let outcome = backend
            .dispatch(&PreparedPrompt::from_test_case(&tc), Duration::from_secs(1))
            .await;
        assert_eq!(outcome, AttemptOutcome::Success("- fixed".into()));
    }

    #[test]
    fn anthropic_target_builds_hosted_backend() {
        let target = TargetConfig {
            name: "claude".into(),
            settings: ProviderSettings::Anthropic(AnthropicSettings {
                api_key: "k".into(),
                model: "claude-sonnet".into(),
                max_tokens: 16,
                temperature: None,
            }),
        };
        let backend = Backend::from_target(&target).unwrap();
        assert!(matches!(backend, Backend::Hosted(_)));
        assert_eq!(backend.provider_name(), "anthropic");
        assert_eq!(backend.model_name(), "claude-sonnet");
    }
}
