use crate::SdkError;
use flock_api::{DEFAULT_API_BASE_URL, DEFAULT_UI_BASE_URL, FlockEnvironment};

/// How a placement key is compared with page identifiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    Exact,
    /// The page identifier contains the key.
    #[default]
    Contains,
}

/// What to do with a network-dependent call made before the session is ready.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UninitializedPolicy {
    /// Park the call and replay it once initialization finishes.
    #[default]
    Queue,
    FailFast,
}

/// What a second `initialize` does once one has succeeded or is running.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReconfigurePolicy {
    #[default]
    Ignore,
    Fail,
}

/// Runtime configuration for a Flock session.
#[derive(Clone, Debug, PartialEq)]
pub struct SdkConfig {
    pub public_access_key: String,
    pub environment: FlockEnvironment,
    pub api_base_url: String,
    pub ui_base_url: String,
    pub override_api_url: Option<String>,
    pub match_policy: MatchPolicy,
    pub uninitialized_policy: UninitializedPolicy,
    pub reconfigure_policy: ReconfigurePolicy,
    pub load_checkpoints: bool,
    pub reject_stale_identify: bool,
}

impl SdkConfig {
    pub fn new(public_access_key: impl Into<String>, environment: FlockEnvironment) -> Self {
        Self {
            public_access_key: public_access_key.into(),
            environment,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            ui_base_url: DEFAULT_UI_BASE_URL.to_string(),
            override_api_url: None,
            match_policy: MatchPolicy::default(),
            uninitialized_policy: UninitializedPolicy::default(),
            reconfigure_policy: ReconfigurePolicy::default(),
            load_checkpoints: true,
            reject_stale_identify: false,
        }
    }

    pub fn from_env() -> Result<Self, SdkError> {
        let key = env_value("FLOCK_PUBLIC_ACCESS_KEY").ok_or_else(|| {
            SdkError::InvalidConfiguration("FLOCK_PUBLIC_ACCESS_KEY is not set".to_string())
        })?;
        let environment = match env_value("FLOCK_ENVIRONMENT") {
            Some(value) => value
                .parse::<FlockEnvironment>()
                .map_err(SdkError::InvalidConfiguration)?,
            None => FlockEnvironment::Production,
        };

        let mut config = Self::new(key, environment);
        if let Some(api) = env_value("FLOCK_API_BASE_URL") {
            config.api_base_url = api;
        }
        if let Some(ui) = env_value("FLOCK_UI_BASE_URL") {
            config.ui_base_url = ui;
        }
        Ok(config)
    }

    pub fn with_override_api_url(mut self, url: impl Into<String>) -> Self {
        self.override_api_url = Some(url.into());
        self
    }

    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    pub fn with_uninitialized_policy(mut self, policy: UninitializedPolicy) -> Self {
        self.uninitialized_policy = policy;
        self
    }

    pub fn with_reconfigure_policy(mut self, policy: ReconfigurePolicy) -> Self {
        self.reconfigure_policy = policy;
        self
    }

    pub fn with_checkpoints(mut self, load: bool) -> Self {
        self.load_checkpoints = load;
        self
    }

    pub fn with_stale_identify_rejection(mut self, reject: bool) -> Self {
        self.reject_stale_identify = reject;
        self
    }

    /// API origin used for backend calls; the override wins over the base URL.
    pub fn api_url(&self) -> &str {
        self.override_api_url
            .as_deref()
            .unwrap_or(self.api_base_url.as_str())
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        if self.public_access_key.trim().is_empty() {
            return Err(SdkError::InvalidConfiguration(
                "public access key must not be empty".to_string(),
            ));
        }
        for (name, value) in [("api", self.api_url()), ("ui", self.ui_base_url.as_str())] {
            url::Url::parse(value).map_err(|err| {
                SdkError::InvalidConfiguration(format!("{name} base url {value:?}: {err}"))
            })?;
        }
        Ok(())
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
