#![doc = r#"
Flock campaign backend: wire types, request codec and typed client.

Operation mapping:

| Client method | HTTP | Response |
| --- | --- | --- |
| `CampaignApi::ping` | `POST /campaigns/{campaignId}/ping` | `PingResponse` |
| `CampaignApi::identify` | `POST /customers/identify` | `Customer` |
| `CampaignApi::get_live_campaign` | `GET /campaigns/live?environment=&customerId=` | `Campaign` |
| `CampaignApi::get_campaign_checkpoints` | `GET /campaign-checkpoints?campaignId=` | `{ "data": [CampaignCheckpoint] }` |

Implementation notes:
- Every request carries `Authorization: <public access key>` and `Content-Type: application/json`.
- Any status outside `200..=299` is `ApiError::BadStatus`; a body that does not match the expected shape is `ApiError::Decode`.
- Calls are independent futures with no shared in-flight state; dropping one cancels only that call.
"#]

pub mod client;
pub mod codec;
pub mod errors;
pub mod testing;
pub mod types;

pub use client::{CampaignApi, DEFAULT_API_BASE_URL, DEFAULT_UI_BASE_URL, HttpCampaignClient};
pub use codec::{RequestCodec, decode_response};
pub use errors::{ApiError, ApiResult};
pub use testing::MockCampaignApi;
pub use types::*;
