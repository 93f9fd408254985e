use crate::matching::{resolve_checkpoint, resolve_page};
use crate::url::{PlacementUrl, QueryParams, build_page_url, build_placement_url};
use crate::{
    BridgeCallbacks, BridgeEvent, CheckpointOptions, EventEmitter, EventKind, NoopEventEmitter,
    ReconfigurePolicy, Rgba, SdkConfig, SdkError, SdkResult, SessionEvent, SurfaceFactory,
    UninitializedPolicy, WebBridge,
};
use flock_api::{
    Campaign, CampaignApi, CampaignCheckpoint, CustomProperties, CustomPropertyValue, Customer,
    HttpCampaignClient, IdentifyRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Unconfigured,
    Initializing,
    Ready,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityState {
    Anonymous,
    Identifying,
    Identified,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IdentifyParams {
    pub external_user_id: String,
    pub email: String,
    pub name: Option<String>,
    pub custom_properties: Option<CustomProperties>,
}

impl IdentifyParams {
    pub fn new(external_user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            external_user_id: external_user_id.into(),
            email: email.into(),
            name: None,
            custom_properties: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<CustomPropertyValue>,
    ) -> Self {
        self.custom_properties
            .get_or_insert_with(CustomProperties::new)
            .insert(key.into(), value.into());
        self
    }
}

/// A call parked until initialization finishes.
#[derive(Clone, Debug)]
pub enum PendingOperation {
    Identify(IdentifyParams),
    AddPlacement {
        placement_id: String,
        callbacks: BridgeCallbacks,
        query_params: Option<QueryParams>,
    },
    Checkpoint {
        name: String,
        options: CheckpointOptions,
        callbacks: BridgeCallbacks,
    },
    OpenPage {
        page_type: String,
        callbacks: BridgeCallbacks,
    },
}

impl PendingOperation {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Identify(_) => "identify",
            Self::AddPlacement { .. } => "add_placement",
            Self::Checkpoint { .. } => "checkpoint",
            Self::OpenPage { .. } => "open_page",
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            Self::Identify(params) => &params.external_user_id,
            Self::AddPlacement { placement_id, .. } => placement_id,
            Self::Checkpoint { name, .. } => name,
            Self::OpenPage { page_type, .. } => page_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IdentifyOutcome {
    Queued,
    Identified(Customer),
}

#[derive(Debug)]
pub enum PresentOutcome {
    Presented { bridge_id: u64, url: Url },
    Navigated { placement_id: String },
    Queued,
    Skipped(SdkError),
}

impl PresentOutcome {
    pub fn is_presented(&self) -> bool {
        matches!(self, Self::Presented { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

enum Admission {
    Run,
    Queued,
}

struct SessionInner {
    config: SdkConfig,
    api: Option<Arc<dyn CampaignApi>>,
    api_injected: bool,
    lifecycle: SessionState,
    identity: IdentityState,
    campaign: Option<Campaign>,
    customer: Option<Customer>,
    checkpoints: Option<Vec<CampaignCheckpoint>>,
    pending: VecDeque<PendingOperation>,
    bridge: Option<WebBridge>,
    next_bridge_id: u64,
    identify_generation: u64,
}

/// Host-owned SDK session.
///
/// Share it behind an `Arc`. The internal lock is never held across a network
/// call or while a host callback runs, so callbacks may call back into the
/// session.
pub struct FlockSession {
    inner: Mutex<SessionInner>,
    surfaces: Arc<dyn SurfaceFactory>,
    events: Arc<dyn EventEmitter>,
}

impl FlockSession {
    /// The HTTP client is built from `config` when first needed.
    pub fn new(config: SdkConfig, surfaces: Arc<dyn SurfaceFactory>) -> Self {
        Self::build(config, None, surfaces)
    }

    pub fn with_api(
        config: SdkConfig,
        api: Arc<dyn CampaignApi>,
        surfaces: Arc<dyn SurfaceFactory>,
    ) -> Self {
        Self::build(config, Some(api), surfaces)
    }

    fn build(
        config: SdkConfig,
        api: Option<Arc<dyn CampaignApi>>,
        surfaces: Arc<dyn SurfaceFactory>,
    ) -> Self {
        Self {
            inner: Mutex::new(SessionInner {
                config,
                api_injected: api.is_some(),
                api,
                lifecycle: SessionState::Unconfigured,
                identity: IdentityState::Anonymous,
                campaign: None,
                customer: None,
                checkpoints: None,
                pending: VecDeque::new(),
                bridge: None,
                next_bridge_id: 1,
                identify_generation: 0,
            }),
            surfaces,
            events: Arc::new(NoopEventEmitter),
        }
    }

    pub fn with_event_emitter(mut self, events: Arc<dyn EventEmitter>) -> Self {
        self.events = events;
        self
    }

    /// Points page and API traffic at other origins (sample apps, staging).
    pub fn set_base_url_for_testing(&self, ui_url: impl Into<String>, api_url: impl Into<String>) {
        let mut inner = self.lock();
        inner.config.ui_base_url = ui_url.into();
        inner.config.api_base_url = api_url.into();
        if !inner.api_injected {
            inner.api = None;
        }
    }

    pub fn config(&self) -> SdkConfig {
        self.lock().config.clone()
    }

    pub fn state(&self) -> SessionState {
        self.lock().lifecycle
    }

    pub fn identity_state(&self) -> IdentityState {
        self.lock().identity
    }

    pub fn is_initialized(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn campaign(&self) -> Option<Campaign> {
        self.lock().campaign.clone()
    }

    pub fn customer(&self) -> Option<Customer> {
        self.lock().customer.clone()
    }

    pub fn checkpoints(&self) -> Option<Vec<CampaignCheckpoint>> {
        self.lock().checkpoints.clone()
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn active_bridge(&self) -> Option<WebBridge> {
        self.lock().bridge.clone()
    }

    pub fn has_visible_bridge(&self) -> bool {
        self.lock()
            .bridge
            .as_ref()
            .is_some_and(|bridge| !bridge.is_dismissed())
    }

    /// Fetches the live campaign, pings it, then replays parked calls in the
    /// order they were made.
    ///
    /// The session reports `Ready` only after the queue is empty, so calls made
    /// while the queue drains are appended behind it. On failure, including an
    /// invalid configuration, every parked call is dropped and the session
    /// returns to `Unconfigured`.
    ///
    /// A call made while another initialize is still in flight follows
    /// `ReconfigurePolicy`: under `Ignore` it returns `Ok(())` at once, before
    /// the session is `Ready`. Network calls made after it are queued and run
    /// when the first initialize finishes.
    pub async fn initialize(&self) -> SdkResult<()> {
        let prepared = {
            let mut inner = self.lock();
            if inner.lifecycle != SessionState::Unconfigured {
                return match inner.config.reconfigure_policy {
                    ReconfigurePolicy::Ignore => {
                        tracing::debug!(target: "flock_sdk", "initialize called again; ignoring");
                        Ok(())
                    }
                    ReconfigurePolicy::Fail => Err(SdkError::AlreadyInitialized),
                };
            }
            inner.config.validate().map(|()| {
                inner.lifecycle = SessionState::Initializing;
                (Self::api_locked(&mut inner), inner.config.environment)
            })
        };
        let (api, environment) = match prepared {
            Ok(prepared) => prepared,
            Err(error) => {
                tracing::error!(target: "flock_sdk", %error, "invalid session configuration");
                self.fail_initialization(&error);
                return Err(error);
            }
        };

        let campaign = match api.get_live_campaign(environment, None).await {
            Ok(campaign) => campaign,
            Err(error) => {
                tracing::error!(target: "flock_sdk", %error, "failed to fetch live campaign");
                let error = SdkError::from(error);
                self.fail_initialization(&error);
                return Err(error);
            }
        };

        let campaign_id = campaign.id.clone();
        self.lock().campaign = Some(campaign);
        self.emit(SessionEvent::new(EventKind::CampaignLoaded).with("campaign_id", campaign_id.as_str()));

        if let Err(error) = api.ping(&campaign_id).await {
            tracing::warn!(target: "flock_sdk", %error, %campaign_id, "campaign ping failed");
            self.emit(SessionEvent::new(EventKind::PingFailed).with("error", error.to_string()));
        }

        let replayed = self.drain_pending().await;
        tracing::info!(target: "flock_sdk", %campaign_id, replayed, "session initialized");
        self.emit(
            SessionEvent::new(EventKind::Initialized)
                .with("campaign_id", campaign_id.as_str())
                .with("replayed", replayed),
        );
        Ok(())
    }

    fn fail_initialization(&self, error: &SdkError) {
        let dropped = {
            let mut inner = self.lock();
            inner.lifecycle = SessionState::Unconfigured;
            std::mem::take(&mut inner.pending)
        };
        self.emit(SessionEvent::new(EventKind::InitializationFailed).with("error", error.to_string()));
        for operation in dropped {
            tracing::warn!(
                target: "flock_sdk",
                operation = operation.label(),
                subject = operation.subject(),
                "dropping queued call after failed initialization"
            );
            self.emit(
                SessionEvent::new(EventKind::OperationDropped)
                    .with("operation", operation.label())
                    .with("subject", operation.subject())
                    .with("success", false),
            );
        }
    }

    async fn drain_pending(&self) -> usize {
        let mut replayed = 0;
        loop {
            let operation = {
                let mut inner = self.lock();
                match inner.pending.pop_front() {
                    Some(operation) => operation,
                    None => {
                        inner.lifecycle = SessionState::Ready;
                        break;
                    }
                }
            };
            replayed += 1;
            self.emit(
                SessionEvent::new(EventKind::OperationReplayed)
                    .with("operation", operation.label())
                    .with("subject", operation.subject())
                    .with("success", true),
            );
            match operation {
                PendingOperation::Identify(params) => {
                    // Failures are logged inside the chain.
                    let _ = self.execute_identify(params).await;
                }
                PendingOperation::AddPlacement {
                    placement_id,
                    callbacks,
                    query_params,
                } => {
                    self.execute_add_placement(&placement_id, callbacks, query_params.as_ref());
                }
                PendingOperation::Checkpoint {
                    name,
                    options,
                    callbacks,
                } => {
                    self.execute_checkpoint(&name, options, callbacks);
                }
                PendingOperation::OpenPage {
                    page_type,
                    callbacks,
                } => {
                    self.execute_open_page(&page_type, callbacks);
                }
            }
        }
        replayed
    }

    /// Identifies the customer, then reloads the live campaign for them and
    /// its checkpoints. Each stage is published as soon as it succeeds; a
    /// later failure does not roll back earlier stages.
    pub async fn identify(&self, params: IdentifyParams) -> SdkResult<IdentifyOutcome> {
        match self.admit(|| PendingOperation::Identify(params.clone()))? {
            Admission::Queued => Ok(IdentifyOutcome::Queued),
            Admission::Run => self
                .execute_identify(params)
                .await
                .map(IdentifyOutcome::Identified),
        }
    }

    async fn execute_identify(&self, params: IdentifyParams) -> SdkResult<Customer> {
        let (api, environment, campaign_id, load_checkpoints, generation) = {
            let mut inner = self.lock();
            let Some(campaign_id) = inner.campaign.as_ref().map(|campaign| campaign.id.clone())
            else {
                return Err(SdkError::Uninitialized);
            };
            inner.identify_generation += 1;
            inner.identity = IdentityState::Identifying;
            (
                Self::api_locked(&mut inner),
                inner.config.environment,
                campaign_id,
                inner.config.load_checkpoints,
                inner.identify_generation,
            )
        };

        let request = IdentifyRequest {
            external_user_id: params.external_user_id,
            email: params.email,
            name: params.name,
            campaign_id,
            custom_properties: params.custom_properties,
        };

        let customer = api
            .identify(&request)
            .await
            .map_err(|error| self.identify_failed(generation, "identify", error.into()))?;
        self.publish(generation, |inner| inner.customer = Some(customer.clone()))
            .map_err(|error| self.identify_failed(generation, "identify", error))?;
        self.emit(
            SessionEvent::new(EventKind::CustomerIdentified).with("customer_id", customer.id.as_str()),
        );

        let campaign = api
            .get_live_campaign(environment, Some(&customer.id))
            .await
            .map_err(|error| self.identify_failed(generation, "live_campaign", error.into()))?;
        let campaign_id = campaign.id.clone();
        self.publish(generation, |inner| inner.campaign = Some(campaign))
            .map_err(|error| self.identify_failed(generation, "live_campaign", error))?;
        self.emit(SessionEvent::new(EventKind::CampaignLoaded).with("campaign_id", campaign_id.as_str()));

        if load_checkpoints {
            let checkpoints = api
                .get_campaign_checkpoints(&campaign_id)
                .await
                .map_err(|error| self.identify_failed(generation, "checkpoints", error.into()))?;
            let count = checkpoints.len();
            self.publish(generation, |inner| inner.checkpoints = Some(checkpoints))
                .map_err(|error| self.identify_failed(generation, "checkpoints", error))?;
            self.emit(SessionEvent::new(EventKind::CheckpointsLoaded).with("count", count));
        }

        self.settle_identity(generation);
        tracing::debug!(target: "flock_sdk", customer_id = %customer.id, "customer identified");
        Ok(customer)
    }

    /// Applies `update` unless staleness rejection is on and a newer identify started.
    fn publish(&self, generation: u64, update: impl FnOnce(&mut SessionInner)) -> SdkResult<()> {
        let mut inner = self.lock();
        if inner.config.reject_stale_identify && generation != inner.identify_generation {
            return Err(SdkError::StaleIdentify {
                generation,
                latest: inner.identify_generation,
            });
        }
        update(&mut *inner);
        Ok(())
    }

    fn settle_identity(&self, generation: u64) {
        let mut inner = self.lock();
        if generation == inner.identify_generation {
            inner.identity = if inner.customer.is_some() {
                IdentityState::Identified
            } else {
                IdentityState::Anonymous
            };
        }
    }

    fn identify_failed(&self, generation: u64, stage: &'static str, error: SdkError) -> SdkError {
        self.settle_identity(generation);
        tracing::error!(target: "flock_sdk", stage, %error, "identify chain stopped");
        self.emit(
            SessionEvent::new(EventKind::IdentifyFailed)
                .with("stage", stage)
                .with("error", error.to_string()),
        );
        error
    }

    /// Resolves `name` against the loaded checkpoints and presents (or
    /// navigates to) its placement.
    pub fn checkpoint(
        &self,
        name: &str,
        options: CheckpointOptions,
        callbacks: BridgeCallbacks,
    ) -> PresentOutcome {
        let admission = self.admit(|| PendingOperation::Checkpoint {
            name: name.to_string(),
            options: options.clone(),
            callbacks: callbacks.clone(),
        });
        match admission {
            Err(error) => self.skip("checkpoint", name, error),
            Ok(Admission::Queued) => PresentOutcome::Queued,
            Ok(Admission::Run) => self.execute_checkpoint(name, options, callbacks),
        }
    }

    fn execute_checkpoint(
        &self,
        name: &str,
        options: CheckpointOptions,
        callbacks: BridgeCallbacks,
    ) -> PresentOutcome {
        let resolved = {
            let inner = self.lock();
            match inner.checkpoints.as_deref() {
                None => Err(SdkError::not_found("checkpoints", name)),
                Some(checkpoints) => resolve_checkpoint(checkpoints, name)
                    .cloned()
                    .ok_or_else(|| SdkError::not_found("checkpoint", name)),
            }
        };
        let checkpoint = match resolved {
            Ok(checkpoint) => checkpoint,
            Err(error) => return self.skip("checkpoint", name, error),
        };
        let Some(placement_id) = checkpoint.placement_id else {
            return self.skip(
                "checkpoint",
                name,
                SdkError::CheckpointWithoutPlacement(name.to_string()),
            );
        };

        if options.navigate && self.has_visible_bridge() {
            self.navigate(&placement_id, options.query_params.as_ref())
        } else {
            self.execute_add_placement(&placement_id, callbacks, options.query_params.as_ref())
        }
    }

    /// Presents a placement, replacing any page currently shown.
    pub fn add_placement(
        &self,
        placement_id: &str,
        callbacks: BridgeCallbacks,
        query_params: Option<QueryParams>,
    ) -> PresentOutcome {
        let admission = self.admit(|| PendingOperation::AddPlacement {
            placement_id: placement_id.to_string(),
            callbacks: callbacks.clone(),
            query_params: query_params.clone(),
        });
        match admission {
            Err(error) => self.skip("add_placement", placement_id, error),
            Ok(Admission::Queued) => PresentOutcome::Queued,
            Ok(Admission::Run) => {
                self.execute_add_placement(placement_id, callbacks, query_params.as_ref())
            }
        }
    }

    fn execute_add_placement(
        &self,
        placement_id: &str,
        callbacks: BridgeCallbacks,
        query_params: Option<&QueryParams>,
    ) -> PresentOutcome {
        let prepared = {
            let inner = self.lock();
            let background = inner.campaign.as_ref().and_then(|campaign| {
                resolve_page(campaign, placement_id, inner.config.match_policy)
                    .and_then(|page| page.background_color())
                    .map(str::to_string)
            });
            let url = build_placement_url(
                &inner.config.ui_base_url,
                &PlacementUrl {
                    placement_id,
                    public_access_key: &inner.config.public_access_key,
                    campaign_id: inner.campaign.as_ref().map(|campaign| campaign.id.as_str()),
                    customer_id: inner.customer.as_ref().map(|customer| customer.id.as_str()),
                    background_color: background.as_deref(),
                    query_params,
                },
            );
            url.map(|url| (url, background))
        };
        match prepared {
            Ok((url, background)) => self.present(placement_id, url, background, callbacks),
            Err(error) => self.skip("add_placement", placement_id, error),
        }
    }

    /// Legacy page presentation by page type (`"invitee?variant=b"`).
    pub fn open_page(&self, page_type: &str, callbacks: BridgeCallbacks) -> PresentOutcome {
        let admission = self.admit(|| PendingOperation::OpenPage {
            page_type: page_type.to_string(),
            callbacks: callbacks.clone(),
        });
        match admission {
            Err(error) => self.skip("open_page", page_type, error),
            Ok(Admission::Queued) => PresentOutcome::Queued,
            Ok(Admission::Run) => self.execute_open_page(page_type, callbacks),
        }
    }

    fn execute_open_page(&self, page_type: &str, callbacks: BridgeCallbacks) -> PresentOutcome {
        let path = page_type.split('?').next().unwrap_or(page_type);
        let prepared = {
            let inner = self.lock();
            let background = inner.campaign.as_ref().and_then(|campaign| {
                resolve_page(campaign, path, inner.config.match_policy)
                    .and_then(|page| page.background_color())
                    .map(str::to_string)
            });
            let url = build_page_url(
                &inner.config.ui_base_url,
                page_type,
                &inner.config.public_access_key,
                inner.campaign.as_ref().map(|campaign| campaign.id.as_str()),
                inner.customer.as_ref().map(|customer| customer.id.as_str()),
                background.as_deref(),
            );
            url.map(|url| (url, background))
        };
        match prepared {
            Ok((url, background)) => self.present(path, url, background, callbacks),
            Err(error) => self.skip("open_page", page_type, error),
        }
    }

    fn present(
        &self,
        placement_id: &str,
        url: Url,
        background: Option<String>,
        callbacks: BridgeCallbacks,
    ) -> PresentOutcome {
        let (previous, bridge_id) = {
            let mut inner = self.lock();
            let bridge_id = inner.next_bridge_id;
            inner.next_bridge_id += 1;
            (inner.bridge.take(), bridge_id)
        };
        if let Some(previous) = previous {
            self.dismiss_bridge(&previous, "replaced");
        }

        let color = background.as_deref().and_then(|hex| {
            let color = Rgba::from_hex(hex);
            if color.is_none() {
                tracing::warn!(target: "flock_sdk", hex, "ignoring malformed background color");
            }
            color
        });
        let bridge = WebBridge::present(
            bridge_id,
            self.surfaces.create_surface(),
            url.clone(),
            color,
            callbacks,
        );

        let displaced = self.lock().bridge.replace(bridge);
        if let Some(displaced) = displaced {
            self.dismiss_bridge(&displaced, "replaced");
        }

        tracing::debug!(target: "flock_sdk", bridge_id, placement_id, url = %url, "placement presented");
        self.emit(
            SessionEvent::new(EventKind::BridgePresented)
                .with("bridge_id", bridge_id)
                .with("placement_id", placement_id)
                .with("url", url.as_str()),
        );
        PresentOutcome::Presented { bridge_id, url }
    }

    /// Routes the page already on screen to another placement without reloading it.
    pub fn navigate(&self, placement_id: &str, query_params: Option<&QueryParams>) -> PresentOutcome {
        let (bridge, background) = {
            let inner = self.lock();
            let background = inner.campaign.as_ref().and_then(|campaign| {
                resolve_page(campaign, placement_id, inner.config.match_policy)
                    .and_then(|page| page.background_color())
                    .and_then(Rgba::from_hex)
            });
            (inner.bridge.clone(), background)
        };
        let Some(bridge) = bridge else {
            return self.skip("navigate", placement_id, SdkError::NoActiveBridge);
        };

        if let Some(color) = background {
            bridge.set_background_color(color);
        }
        if let Err(error) = bridge.navigate(placement_id, query_params) {
            return self.skip("navigate", placement_id, error);
        }
        self.emit(
            SessionEvent::new(EventKind::BridgeNavigated)
                .with("bridge_id", bridge.id())
                .with("placement_id", placement_id),
        );
        PresentOutcome::Navigated {
            placement_id: placement_id.to_string(),
        }
    }

    /// Entry point for strings the page posts through the injected bridge.
    pub fn handle_bridge_message(&self, message: &str) -> Option<BridgeEvent> {
        let Some(bridge) = self.active_bridge() else {
            tracing::debug!(target: "flock_sdk", "bridge message with no page presented");
            return None;
        };
        let event = bridge.handle_message(message);
        if let Some(event) = event {
            self.emit(
                SessionEvent::new(EventKind::BridgeEvent)
                    .with("bridge_id", bridge.id())
                    .with("event", event.as_str()),
            );
        }
        if bridge.is_dismissed() {
            self.release_bridge(&bridge, "page_close");
        }
        event
    }

    /// User-initiated close: tears the page down and runs its `on_close`.
    pub fn close(&self) {
        if let Some(bridge) = self.active_bridge() {
            bridge.close();
            self.release_bridge(&bridge, "user_close");
        }
    }

    /// Tears the page down without notifying the host.
    pub fn dismiss(&self) {
        let bridge = self.lock().bridge.take();
        if let Some(bridge) = bridge {
            self.dismiss_bridge(&bridge, "dismissed");
        }
    }

    fn release_bridge(&self, bridge: &WebBridge, reason: &'static str) {
        let released = {
            let mut inner = self.lock();
            let current = inner
                .bridge
                .as_ref()
                .is_some_and(|active| active.id() == bridge.id());
            if current {
                inner.bridge = None;
            }
            current
        };
        if released {
            self.emit(
                SessionEvent::new(EventKind::BridgeDismissed)
                    .with("bridge_id", bridge.id())
                    .with("reason", reason),
            );
        }
    }

    fn dismiss_bridge(&self, bridge: &WebBridge, reason: &'static str) {
        if !bridge.dismiss() {
            return;
        }
        self.emit(
            SessionEvent::new(EventKind::BridgeDismissed)
                .with("bridge_id", bridge.id())
                .with("reason", reason),
        );
    }

    /// Decides whether a call runs now. When it cannot, `operation` builds the
    /// queued copy.
    fn admit(&self, operation: impl FnOnce() -> PendingOperation) -> SdkResult<Admission> {
        let queued = {
            let mut inner = self.lock();
            match (inner.lifecycle, inner.config.uninitialized_policy) {
                (SessionState::Ready, _) => return Ok(Admission::Run),
                (SessionState::Unconfigured, UninitializedPolicy::FailFast) => {
                    return Err(SdkError::Uninitialized);
                }
                _ => {
                    let operation = operation();
                    let label = operation.label();
                    let subject = operation.subject().to_string();
                    inner.pending.push_back(operation);
                    (label, subject, inner.pending.len())
                }
            }
        };
        let (label, subject, depth) = queued;
        tracing::debug!(target: "flock_sdk", operation = label, %subject, depth, "session not ready; queuing call");
        self.emit(
            SessionEvent::new(EventKind::OperationQueued)
                .with("operation", label)
                .with("subject", subject)
                .with("depth", depth),
        );
        Ok(Admission::Queued)
    }

    fn skip(&self, operation: &'static str, subject: &str, error: SdkError) -> PresentOutcome {
        tracing::warn!(target: "flock_sdk", operation, subject, %error, "skipping presentation");
        self.emit(
            SessionEvent::new(EventKind::Diagnostic)
                .with("operation", operation)
                .with("subject", subject)
                .with("error", error.to_string()),
        );
        PresentOutcome::Skipped(error)
    }

    fn api_locked(inner: &mut SessionInner) -> Arc<dyn CampaignApi> {
        if let Some(api) = &inner.api {
            return api.clone();
        }
        let api: Arc<dyn CampaignApi> = Arc::new(HttpCampaignClient::new(
            inner.config.api_url(),
            inner.config.public_access_key.clone(),
        ));
        inner.api = Some(api.clone());
        api
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        self.events.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSurfaceFactory;
    use flock_api::FlockEnvironment;

    fn unconfigured() -> FlockSession {
        FlockSession::new(
            SdkConfig::new("pk_test", FlockEnvironment::Test),
            Arc::new(RecordingSurfaceFactory::default()),
        )
    }

    #[test]
    fn identify_params_collect_custom_properties() {
        let params = IdentifyParams::new("user-1", "user@example.com")
            .with_name("User")
            .with_property("plan", "pro")
            .with_property("seats", 3_i64);
        let properties = params.custom_properties.expect("properties");
        assert_eq!(properties.len(), 2);
        assert_eq!(properties["seats"], CustomPropertyValue::Integer(3));
        assert_eq!(params.name.as_deref(), Some("User"));
    }

    #[test]
    fn new_session_starts_unconfigured_and_anonymous() {
        let session = unconfigured();
        assert_eq!(session.state(), SessionState::Unconfigured);
        assert_eq!(session.identity_state(), IdentityState::Anonymous);
        assert!(!session.is_initialized());
        assert!(!session.has_visible_bridge());
        assert!(session.campaign().is_none());
    }

    #[test]
    fn presentation_before_initialize_is_parked_in_order() {
        let session = unconfigured();
        assert!(matches!(
            session.add_placement("referrer-home", BridgeCallbacks::new(), None),
            PresentOutcome::Queued
        ));
        assert!(matches!(
            session.open_page("invitee?variant=b", BridgeCallbacks::new()),
            PresentOutcome::Queued
        ));
        assert_eq!(session.pending_len(), 2);

        let inner = session.lock();
        let labels: Vec<(&str, &str)> = inner
            .pending
            .iter()
            .map(|operation| (operation.label(), operation.subject()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("add_placement", "referrer-home"),
                ("open_page", "invitee?variant=b")
            ]
        );
    }

    #[test]
    fn navigate_without_bridge_is_skipped() {
        let session = unconfigured();
        assert!(matches!(
            session.navigate("invitee-welcome", None),
            PresentOutcome::Skipped(SdkError::NoActiveBridge)
        ));
    }

    #[test]
    fn base_url_override_resets_lazy_client() {
        let session = unconfigured();
        session.set_base_url_for_testing("https://ui.test", "https://api.test");
        let config = session.config();
        assert_eq!(config.ui_base_url, "https://ui.test");
        assert_eq!(config.api_url(), "https://api.test");
        assert!(session.lock().api.is_none());
    }
}
