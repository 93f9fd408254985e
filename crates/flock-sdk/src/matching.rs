use crate::MatchPolicy;
use flock_api::{Campaign, CampaignCheckpoint, CampaignPage};

impl MatchPolicy {
    pub fn matches(&self, candidate: &str, key: &str) -> bool {
        match self {
            Self::Exact => candidate == key,
            Self::Contains => candidate.contains(key),
        }
    }
}

/// First page whose placement id, id or path matches `key`.
pub fn resolve_page<'a>(
    campaign: &'a Campaign,
    key: &str,
    policy: MatchPolicy,
) -> Option<&'a CampaignPage> {
    if key.is_empty() {
        return None;
    }
    campaign.campaign_pages.iter().find(|page| {
        page.placement_id
            .as_deref()
            .is_some_and(|placement| policy.matches(placement, key))
            || policy.matches(&page.id, key)
            || policy.matches(&page.path, key)
    })
}

/// Checkpoint names are unique within a campaign and always compared exactly.
pub fn resolve_checkpoint<'a>(
    checkpoints: &'a [CampaignCheckpoint],
    name: &str,
) -> Option<&'a CampaignCheckpoint> {
    checkpoints
        .iter()
        .find(|checkpoint| checkpoint.checkpoint_name == name)
}
