//! Pluggable health-transition notifications (SPEC_FULL §0 supplemented
//! feature 4). No concrete webhook backend ships in this crate — it only
//! defines where the pipeline calls out when a source's health changes;
//! wiring an actual Slack/email backend is an operator concern.

use async_trait::async_trait;

use crate::types::Health;

/// A source's health moving from `from` to `to`, as recorded by a
/// `SourceCheck` outcome.
#[derive(Debug, Clone)]
pub struct HealthTransition {
    pub source_identifier: String,
    pub from: Health,
    pub to: Health,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_health_transition(&self, transition: &HealthTransition) -> anyhow::Result<()>;
}

/// Default backend: does nothing. Every `Fetcher` gets one unless a real
/// backend is configured.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_health_transition(&self, _transition: &HealthTransition) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Logs the transition at `warn` for a drop out of healthy, `info` for a
/// recovery back to it. A zero-dependency default richer than
/// `NoopNotifier` when no external backend is configured.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn notify_health_transition(&self, transition: &HealthTransition) -> anyhow::Result<()> {
        match transition.to {
            Health::Healthy => {
                tracing::info!(source = %transition.source_identifier, from = ?transition.from, "source health recovered");
            }
            _ => {
                tracing::warn!(source = %transition.source_identifier, from = ?transition.from, to = ?transition.to, "source health degraded");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_notifier_always_succeeds() {
        let transition = HealthTransition {
            source_identifier: "acme-blog".to_string(),
            from: Health::Healthy,
            to: Health::Degraded,
        };
        assert!(NoopNotifier.notify_health_transition(&transition).await.is_ok());
    }

    #[tokio::test]
    async fn logging_notifier_always_succeeds() {
        let transition = HealthTransition {
            source_identifier: "acme-blog".to_string(),
            from: Health::Degraded,
            to: Health::DisabledAuto,
        };
        assert!(LoggingNotifier.notify_health_transition(&transition).await.is_ok());
    }
}
