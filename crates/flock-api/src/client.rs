use crate::codec::RequestCodec;
use crate::{
    ApiResult, Campaign, CampaignCheckpoint, CampaignCheckpointsResponse, Customer,
    FlockEnvironment, IdentifyRequest, PingResponse,
};
use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;

pub const DEFAULT_API_BASE_URL: &str = "https://api.withflock.com";
pub const DEFAULT_UI_BASE_URL: &str = "https://app.withflock.com";

/// Typed operations against the campaign backend.
#[async_trait]
pub trait CampaignApi: Send + Sync {
    async fn ping(&self, campaign_id: &str) -> ApiResult<PingResponse>;

    async fn identify(&self, request: &IdentifyRequest) -> ApiResult<Customer>;

    async fn get_live_campaign(
        &self,
        environment: FlockEnvironment,
        customer_id: Option<&str>,
    ) -> ApiResult<Campaign>;

    async fn get_campaign_checkpoints(&self, campaign_id: &str)
    -> ApiResult<Vec<CampaignCheckpoint>>;
}

#[async_trait]
impl<T: CampaignApi + ?Sized> CampaignApi for Arc<T> {
    async fn ping(&self, campaign_id: &str) -> ApiResult<PingResponse> {
        (**self).ping(campaign_id).await
    }

    async fn identify(&self, request: &IdentifyRequest) -> ApiResult<Customer> {
        (**self).identify(request).await
    }

    async fn get_live_campaign(
        &self,
        environment: FlockEnvironment,
        customer_id: Option<&str>,
    ) -> ApiResult<Campaign> {
        (**self).get_live_campaign(environment, customer_id).await
    }

    async fn get_campaign_checkpoints(
        &self,
        campaign_id: &str,
    ) -> ApiResult<Vec<CampaignCheckpoint>> {
        (**self).get_campaign_checkpoints(campaign_id).await
    }
}

#[derive(Clone, Debug)]
pub struct HttpCampaignClient {
    codec: RequestCodec,
}

impl HttpCampaignClient {
    pub fn new(base_url: impl Into<String>, public_access_key: impl Into<String>) -> Self {
        Self {
            codec: RequestCodec::new(base_url, public_access_key),
        }
    }

}

#[async_trait]
impl CampaignApi for HttpCampaignClient {
    async fn ping(&self, campaign_id: &str) -> ApiResult<PingResponse> {
        let request = self.codec.build::<()>(
            Method::POST,
            &format!("/campaigns/{campaign_id}/ping"),
            &[],
            None,
        )?;
        self.codec.execute(request).await
    }

    async fn identify(&self, request: &IdentifyRequest) -> ApiResult<Customer> {
        let request = self
            .codec
            .build(Method::POST, "/customers/identify", &[], Some(request))?;
        self.codec.execute(request).await
    }

    async fn get_live_campaign(
        &self,
        environment: FlockEnvironment,
        customer_id: Option<&str>,
    ) -> ApiResult<Campaign> {
        let mut query = vec![("environment", environment.as_str())];
        if let Some(customer_id) = customer_id {
            query.push(("customerId", customer_id));
        }
        let request = self
            .codec
            .build::<()>(Method::GET, "/campaigns/live", &query, None)?;
        self.codec.execute(request).await
    }

    async fn get_campaign_checkpoints(
        &self,
        campaign_id: &str,
    ) -> ApiResult<Vec<CampaignCheckpoint>> {
        let request = self.codec.build::<()>(
            Method::GET,
            "/campaign-checkpoints",
            &[("campaignId", campaign_id)],
            None,
        )?;
        let response: CampaignCheckpointsResponse = self.codec.execute(request).await?;
        Ok(response.data)
    }
}
