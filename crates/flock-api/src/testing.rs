use crate::{
    ApiError, ApiResult, Campaign, CampaignApi, CampaignCheckpoint, CampaignPage, Customer,
    FlockEnvironment, IdentifyRequest, PingResponse, ScreenProps,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Endpoint {
    Ping,
    Identify,
    LiveCampaign,
    Checkpoints,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MockFailure {
    Network,
    Status(u16),
    Decode,
}

impl MockFailure {
    fn to_error(self, endpoint: Endpoint) -> ApiError {
        match self {
            Self::Network => ApiError::Network(format!("mock {endpoint:?} unreachable")),
            Self::Status(status) => ApiError::BadStatus {
                status,
                body: format!("mock {endpoint:?} rejected"),
            },
            Self::Decode => ApiError::Decode(format!("mock {endpoint:?} returned malformed body")),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ApiCall {
    Ping {
        campaign_id: String,
    },
    Identify(IdentifyRequest),
    GetLiveCampaign {
        environment: FlockEnvironment,
        customer_id: Option<String>,
    },
    GetCampaignCheckpoints {
        campaign_id: String,
    },
}

/// Scripted in-memory backend.
///
/// Customers are derived from the identify request (`id = "cust-<externalUserId>"`).
/// A gated endpoint parks each call until [`MockCampaignApi::release`] is invoked.
#[derive(Clone, Default)]
pub struct MockCampaignApi {
    inner: Arc<Mutex<MockState>>,
    gates: Arc<Mutex<BTreeMap<Endpoint, Arc<Semaphore>>>>,
}

#[derive(Default)]
struct MockState {
    campaign: Option<Campaign>,
    checkpoints: Vec<CampaignCheckpoint>,
    failures: BTreeMap<Endpoint, MockFailure>,
    calls: Vec<ApiCall>,
}

impl MockCampaignApi {
    pub fn new(campaign: Campaign) -> Self {
        let mock = Self::default();
        mock.state().campaign = Some(campaign);
        mock
    }

    pub fn with_checkpoints(self, checkpoints: Vec<CampaignCheckpoint>) -> Self {
        self.state().checkpoints = checkpoints;
        self
    }

    pub fn fail(&self, endpoint: Endpoint, failure: MockFailure) {
        self.state().failures.insert(endpoint, failure);
    }

    pub fn recover(&self, endpoint: Endpoint) {
        self.state().failures.remove(&endpoint);
    }

    /// Parks calls to `endpoint` until released.
    pub fn gate(&self, endpoint: Endpoint) {
        self.gates_state()
            .insert(endpoint, Arc::new(Semaphore::new(0)));
    }

    /// Lets `count` parked or future calls to `endpoint` proceed.
    pub fn release(&self, endpoint: Endpoint, count: usize) {
        if let Some(gate) = self.gates_state().get(&endpoint) {
            gate.add_permits(count);
        }
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.endpoint() == endpoint)
            .count()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gates_state(&self) -> MutexGuard<'_, BTreeMap<Endpoint, Arc<Semaphore>>> {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn enter(&self, endpoint: Endpoint, call: ApiCall) -> ApiResult<()> {
        self.state().calls.push(call);
        let gate = self.gates_state().get(&endpoint).cloned();
        if let Some(gate) = gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| ApiError::Network(format!("mock {endpoint:?} gate closed")))?;
            permit.forget();
        }
        match self.state().failures.get(&endpoint) {
            Some(failure) => Err(failure.to_error(endpoint)),
            None => Ok(()),
        }
    }
}

impl ApiCall {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Ping { .. } => Endpoint::Ping,
            Self::Identify(_) => Endpoint::Identify,
            Self::GetLiveCampaign { .. } => Endpoint::LiveCampaign,
            Self::GetCampaignCheckpoints { .. } => Endpoint::Checkpoints,
        }
    }
}

#[async_trait]
impl CampaignApi for MockCampaignApi {
    async fn ping(&self, campaign_id: &str) -> ApiResult<PingResponse> {
        self.enter(
            Endpoint::Ping,
            ApiCall::Ping {
                campaign_id: campaign_id.to_string(),
            },
        )
        .await?;
        Ok(PingResponse {
            success: Some(true),
            message: None,
        })
    }

    async fn identify(&self, request: &IdentifyRequest) -> ApiResult<Customer> {
        self.enter(Endpoint::Identify, ApiCall::Identify(request.clone()))
            .await?;
        Ok(Customer {
            id: format!("cust-{}", request.external_user_id),
            external_user_id: request.external_user_id.clone(),
            email: request.email.clone(),
            name: request.name.clone(),
            referral_code: format!("REF-{}", request.external_user_id.to_ascii_uppercase()),
            visited_referrals_count: 0,
            converted_referrals_count: 0,
            referred_by_id: None,
        })
    }

    async fn get_live_campaign(
        &self,
        environment: FlockEnvironment,
        customer_id: Option<&str>,
    ) -> ApiResult<Campaign> {
        self.enter(
            Endpoint::LiveCampaign,
            ApiCall::GetLiveCampaign {
                environment,
                customer_id: customer_id.map(str::to_string),
            },
        )
        .await?;
        self.state().campaign.clone().ok_or_else(|| ApiError::BadStatus {
            status: 404,
            body: "no live campaign".to_string(),
        })
    }

    async fn get_campaign_checkpoints(
        &self,
        campaign_id: &str,
    ) -> ApiResult<Vec<CampaignCheckpoint>> {
        self.enter(
            Endpoint::Checkpoints,
            ApiCall::GetCampaignCheckpoints {
                campaign_id: campaign_id.to_string(),
            },
        )
        .await?;
        Ok(self
            .state()
            .checkpoints
            .iter()
            .filter(|checkpoint| checkpoint.campaign_id == campaign_id)
            .cloned()
            .collect())
    }
}

/// A small live campaign with two placements, used across test suites.
pub fn sample_campaign() -> Campaign {
    Campaign {
        id: "camp-1".to_string(),
        name: "Referral launch".to_string(),
        created_at: "2025-06-01T00:00:00Z".to_string(),
        updated_at: "2025-06-02T00:00:00Z".to_string(),
        environment: FlockEnvironment::Test,
        is_live: true,
        campaign_pages: vec![
            CampaignPage {
                id: "page-referrer".to_string(),
                path: "/referrer".to_string(),
                placement_id: Some("referrer-home".to_string()),
                is_empty: false,
                url: "https://app.withflock.com/pages/referrer".to_string(),
                screen_props: Some(ScreenProps {
                    background_color: Some("#FFAA00".to_string()),
                    ..ScreenProps::default()
                }),
            },
            CampaignPage {
                id: "page-invitee".to_string(),
                path: "/invitee".to_string(),
                placement_id: Some("invitee-welcome".to_string()),
                is_empty: false,
                url: "https://app.withflock.com/pages/invitee".to_string(),
                screen_props: None,
            },
        ],
    }
}

/// Checkpoints for [`sample_campaign`]; `orphan` has no placement.
pub fn sample_checkpoints() -> Vec<CampaignCheckpoint> {
    let checkpoint = |id: &str, name: &str, placement: Option<&str>| CampaignCheckpoint {
        id: id.to_string(),
        campaign_id: "camp-1".to_string(),
        checkpoint_name: name.to_string(),
        trigger: crate::CheckpointTrigger::Placement,
        placement_id: placement.map(str::to_string),
        created_at: "2025-06-01T00:00:00Z".to_string(),
        updated_at: "2025-06-01T00:00:00Z".to_string(),
    };
    vec![
        checkpoint("cp-1", "refer_button", Some("referrer-home")),
        checkpoint("cp-2", "invitee_signup", Some("invitee-welcome")),
        checkpoint("cp-3", "orphan", None),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "current_thread")]
    async fn gated_endpoint_waits_for_release() {
        let mock = MockCampaignApi::new(sample_campaign());
        mock.gate(Endpoint::LiveCampaign);

        let fetch = mock.get_live_campaign(FlockEnvironment::Test, None);
        tokio::pin!(fetch);
        tokio::select! {
            biased;
            _ = &mut fetch => panic!("gated call should not complete"),
            _ = tokio::task::yield_now() => {}
        }

        mock.release(Endpoint::LiveCampaign, 1);
        let campaign = fetch.await.expect("released call should succeed");
        assert_eq!(campaign.id, "camp-1");
        assert_eq!(mock.call_count(Endpoint::LiveCampaign), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn injected_failures_map_to_typed_errors() {
        let mock = MockCampaignApi::new(sample_campaign());
        mock.fail(Endpoint::Ping, MockFailure::Status(503));
        let error = mock.ping("camp-1").await.expect_err("ping should fail");
        assert_eq!(error.status(), Some(503));

        mock.recover(Endpoint::Ping);
        assert!(mock.ping("camp-1").await.is_ok());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn checkpoints_are_scoped_to_campaign() {
        let mock =
            MockCampaignApi::new(sample_campaign()).with_checkpoints(sample_checkpoints());
        assert_eq!(
            mock.get_campaign_checkpoints("camp-1").await.expect("ok").len(),
            3
        );
        assert!(
            mock.get_campaign_checkpoints("other")
                .await
                .expect("ok")
                .is_empty()
        );
    }
}
