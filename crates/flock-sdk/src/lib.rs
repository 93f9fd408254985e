#![doc = r#"
Host-side Flock session: initialization, identity, checkpoint resolution and
the bridge to the hosted referral pages.

Lifecycle:

| State | Network calls (`identify`, `checkpoint`, `add_placement`, `open_page`) |
| --- | --- |
| `Unconfigured` | queued, or `SdkError::Uninitialized` under `UninitializedPolicy::FailFast` |
| `Initializing` | queued |
| `Ready` | run immediately |

Queued calls replay in call order, each exactly once, after the live campaign
is fetched. If initialization fails they are dropped and reported through
`EventKind::OperationDropped`.

Page messages (`{"event":"close"|"success"|"invalid"}`) enter through
`FlockSession::handle_bridge_message`; `navigate` routes an open page with a
`flock_client_event` custom event instead of reloading it.
"#]

pub mod bridge;
pub mod checkpoint;
pub mod color;
pub mod config;
pub mod errors;
pub mod events;
pub mod matching;
pub mod session;
pub mod testing;
pub mod url;

pub use bridge::{
    BridgeCallback, BridgeCallbacks, BridgeEvent, CLIENT_EVENT_NAME, CloseCallback,
    MESSAGE_HANDLER_NAME, SurfaceFactory, WebBridge, WebSurface, bridge_shim_script,
    navigate_script, parse_bridge_message,
};
pub use checkpoint::{CheckpointBuilder, CheckpointOptions};
pub use color::Rgba;
pub use config::{MatchPolicy, ReconfigurePolicy, SdkConfig, UninitializedPolicy};
pub use errors::{SdkError, SdkResult};
pub use events::{
    BufferedEventEmitter, EventData, EventEmitter, EventKind, NoopEventEmitter, SessionEvent,
};
pub use session::{
    FlockSession, IdentifyOutcome, IdentifyParams, IdentityState, PendingOperation,
    PresentOutcome, SessionState,
};
pub use ::url::Url;
pub use crate::url::{PlacementUrl, QueryParams, build_page_url, build_placement_url};
