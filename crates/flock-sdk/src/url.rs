use crate::{SdkError, SdkResult};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::BTreeMap;
use url::Url;

pub type QueryParams = BTreeMap<String, String>;

/// Everything that goes into a placement page URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlacementUrl<'a> {
    pub placement_id: &'a str,
    pub public_access_key: &'a str,
    pub campaign_id: Option<&'a str>,
    pub customer_id: Option<&'a str>,
    pub background_color: Option<&'a str>,
    pub query_params: Option<&'a QueryParams>,
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn push_context(
    url: &mut String,
    campaign_id: Option<&str>,
    customer_id: Option<&str>,
    background_color: Option<&str>,
) {
    if let Some(campaign_id) = campaign_id {
        url.push_str("&campaign_id=");
        url.push_str(campaign_id);
    }
    if let Some(customer_id) = customer_id {
        url.push_str("&customer_id=");
        url.push_str(customer_id);
    }
    if let Some(background_color) = background_color {
        url.push_str("&bg=");
        url.push_str(&encode(background_color));
    }
}

fn finish(url: String) -> SdkResult<Url> {
    Url::parse(&url).map_err(|err| SdkError::InvalidUrl(format!("{url}: {err}")))
}

/// `{ui}/placements/{id}?key=..[&campaign_id][&customer_id][&bg]` followed by
/// the caller's query parameters in key order.
pub fn build_placement_url(ui_base_url: &str, params: &PlacementUrl<'_>) -> SdkResult<Url> {
    let mut url = format!(
        "{}/placements/{}?key={}",
        ui_base_url.trim_end_matches('/'),
        params.placement_id,
        params.public_access_key
    );
    push_context(
        &mut url,
        params.campaign_id,
        params.customer_id,
        params.background_color,
    );
    for (key, value) in params.query_params.into_iter().flatten() {
        url.push('&');
        url.push_str(&encode(key));
        url.push('=');
        url.push_str(&encode(value));
    }
    finish(url)
}

/// Legacy page URL: `{ui}/pages/{path}?key=..` with the raw query part of
/// `page_type` (anything after the first `?`) appended last.
pub fn build_page_url(
    ui_base_url: &str,
    page_type: &str,
    public_access_key: &str,
    campaign_id: Option<&str>,
    customer_id: Option<&str>,
    background_color: Option<&str>,
) -> SdkResult<Url> {
    let (path, query) = page_type.split_once('?').unwrap_or((page_type, ""));
    let mut url = format!(
        "{}/pages/{}?key={}",
        ui_base_url.trim_end_matches('/'),
        path.trim_start_matches('/'),
        public_access_key
    );
    push_context(&mut url, campaign_id, customer_id, background_color);
    if !query.is_empty() {
        url.push('&');
        url.push_str(query);
    }
    finish(url)
}
