use crate::session::{FlockSession, PresentOutcome};
use crate::url::QueryParams;
use crate::{BridgeCallbacks, WebBridge};

/// How a triggered checkpoint is shown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckpointOptions {
    /// Route the page already on screen instead of presenting a new one.
    pub navigate: bool,
    pub query_params: Option<QueryParams>,
}

/// Fluent front end for [`FlockSession::checkpoint`].
///
/// ```ignore
/// session
///     .checkpoint_builder("refer_button")
///     .query_param("source", "settings")
///     .on_close(|| println!("closed"))
///     .trigger();
/// ```
#[must_use = "a checkpoint does nothing until `trigger` is called"]
pub struct CheckpointBuilder<'a> {
    session: &'a FlockSession,
    name: String,
    options: CheckpointOptions,
    callbacks: BridgeCallbacks,
}

impl<'a> CheckpointBuilder<'a> {
    pub(crate) fn new(session: &'a FlockSession, name: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
            options: CheckpointOptions::default(),
            callbacks: BridgeCallbacks::default(),
        }
    }

    pub fn navigate(mut self, navigate: bool) -> Self {
        self.options.navigate = navigate;
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options
            .query_params
            .get_or_insert_with(QueryParams::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn query_params(mut self, params: QueryParams) -> Self {
        self.options.query_params = Some(params);
        self
    }

    pub fn on_close(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.callbacks = self.callbacks.on_close(handler);
        self
    }

    pub fn on_success(mut self, handler: impl Fn(&WebBridge) + Send + Sync + 'static) -> Self {
        self.callbacks = self.callbacks.on_success(handler);
        self
    }

    pub fn on_invalid(mut self, handler: impl Fn(&WebBridge) + Send + Sync + 'static) -> Self {
        self.callbacks = self.callbacks.on_invalid(handler);
        self
    }

    pub fn options(&self) -> &CheckpointOptions {
        &self.options
    }

    pub fn trigger(self) -> PresentOutcome {
        self.session
            .checkpoint(&self.name, self.options, self.callbacks)
    }
}

impl FlockSession {
    pub fn checkpoint_builder(&self, name: impl Into<String>) -> CheckpointBuilder<'_> {
        CheckpointBuilder::new(self, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SdkConfig;
    use crate::testing::RecordingSurfaceFactory;
    use flock_api::FlockEnvironment;
    use flock_api::testing::{MockCampaignApi, sample_campaign};
    use std::sync::Arc;

    #[test]
    fn builder_accumulates_query_params_in_key_order() {
        let session = FlockSession::with_api(
            SdkConfig::new("pk", FlockEnvironment::Test),
            Arc::new(MockCampaignApi::new(sample_campaign())),
            Arc::new(RecordingSurfaceFactory::default()),
        );
        let builder = session
            .checkpoint_builder("refer_button")
            .navigate(true)
            .query_param("b", "2")
            .query_param("a", "1");

        let options = builder.options().clone();
        assert!(options.navigate);
        let keys: Vec<&str> = options
            .query_params
            .as_ref()
            .map(|params| params.keys().map(String::as_str).collect())
            .unwrap_or_default();
        assert_eq!(keys, vec!["a", "b"]);

        // Not initialized yet, so the trigger is parked.
        assert!(matches!(builder.trigger(), PresentOutcome::Queued));
        assert_eq!(session.pending_len(), 1);
    }
}
