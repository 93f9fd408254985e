//! Native side of the page bridge.
//!
//! The hosted page talks to the app through a single string channel: it calls
//! `postMessage(JSON.stringify({ event }))` on the injected bridge object and
//! the host forwards that string to [`WebBridge::handle_message`]. The app
//! talks back by dispatching a `flock_client_event` DOM event on the page.

use crate::url::QueryParams;
use crate::{Rgba, SdkError, SdkResult};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

pub const MESSAGE_HANDLER_NAME: &str = "flock";
pub const CLIENT_EVENT_NAME: &str = "flock_client_event";

/// Platform web view hosting one presented page.
pub trait WebSurface: Send + Sync {
    fn load_url(&self, url: &Url);
    fn set_background_color(&self, color: Rgba);
    /// Script run at document start on every navigation.
    fn add_user_script(&self, script: &str);
    fn evaluate_script(&self, script: &str);
    fn register_message_handler(&self, name: &str);
    fn unregister_message_handler(&self, name: &str);
    fn teardown(&self);
}

pub trait SurfaceFactory: Send + Sync {
    fn create_surface(&self) -> Arc<dyn WebSurface>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeEvent {
    Close,
    Success,
    Invalid,
}

impl BridgeEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Success => "success",
            Self::Invalid => "invalid",
        }
    }
}

#[derive(Deserialize)]
struct MessageEnvelope {
    event: Value,
}

/// Parses a page message. Malformed JSON and unknown event names yield `None`.
pub fn parse_bridge_message(message: &str) -> Option<BridgeEvent> {
    let envelope: MessageEnvelope = serde_json::from_str(message).ok()?;
    match envelope.event.as_str()? {
        "close" => Some(BridgeEvent::Close),
        "success" => Some(BridgeEvent::Success),
        "invalid" => Some(BridgeEvent::Invalid),
        _ => None,
    }
}

/// Installs `window.ReactNativeWebView.postMessage` forwarding to the native handler.
pub fn bridge_shim_script(handler_name: &str) -> String {
    let handler = Value::String(handler_name.to_string());
    format!(
        "(function () {{\n\
         \x20 if (window.ReactNativeWebView) {{ return; }}\n\
         \x20 window.ReactNativeWebView = {{\n\
         \x20   postMessage: function (message) {{\n\
         \x20     window.webkit.messageHandlers[{handler}].postMessage(String(message));\n\
         \x20   }}\n\
         \x20 }};\n\
         }})();"
    )
}

/// Script that asks the hosted page to route to `placement_id` in place.
pub fn navigate_script(placement_id: &str, query_params: Option<&QueryParams>) -> String {
    let mut data = json!({ "placementId": placement_id });
    if let Some(query_params) = query_params.filter(|params| !params.is_empty()) {
        data["queryParams"] = json!(query_params);
    }
    let detail = json!({ "command": "navigate", "data": data });
    format!(
        "window.dispatchEvent(new CustomEvent({}, {{ detail: {detail} }}));",
        Value::String(CLIENT_EVENT_NAME.to_string())
    )
}

pub type CloseCallback = Arc<dyn Fn() + Send + Sync>;
pub type BridgeCallback = Arc<dyn Fn(&WebBridge) + Send + Sync>;

/// Host callbacks for one presentation.
#[derive(Clone, Default)]
pub struct BridgeCallbacks {
    pub on_close: Option<CloseCallback>,
    pub on_success: Option<BridgeCallback>,
    pub on_invalid: Option<BridgeCallback>,
}

impl BridgeCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_close(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Arc::new(handler));
        self
    }

    pub fn on_success(mut self, handler: impl Fn(&WebBridge) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(handler));
        self
    }

    pub fn on_invalid(mut self, handler: impl Fn(&WebBridge) + Send + Sync + 'static) -> Self {
        self.on_invalid = Some(Arc::new(handler));
        self
    }
}

impl fmt::Debug for BridgeCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeCallbacks")
            .field("on_close", &self.on_close.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_invalid", &self.on_invalid.is_some())
            .finish()
    }
}

/// A presented page plus its message channel.
#[derive(Clone)]
pub struct WebBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    id: u64,
    surface: Arc<dyn WebSurface>,
    callbacks: BridgeCallbacks,
    url: Url,
    dismissed: AtomicBool,
}

impl WebBridge {
    /// Registers the message handler, injects the shim and starts loading `url`.
    pub fn present(
        id: u64,
        surface: Arc<dyn WebSurface>,
        url: Url,
        background: Option<Rgba>,
        callbacks: BridgeCallbacks,
    ) -> Self {
        surface.register_message_handler(MESSAGE_HANDLER_NAME);
        surface.add_user_script(&bridge_shim_script(MESSAGE_HANDLER_NAME));
        if let Some(color) = background {
            surface.set_background_color(color);
        }
        surface.load_url(&url);

        Self {
            inner: Arc::new(BridgeInner {
                id,
                surface,
                callbacks,
                url,
                dismissed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn is_dismissed(&self) -> bool {
        self.inner.dismissed.load(Ordering::SeqCst)
    }

    /// Dispatches a page message to the matching callback.
    pub fn handle_message(&self, message: &str) -> Option<BridgeEvent> {
        if self.is_dismissed() {
            tracing::debug!(target: "flock_sdk", bridge = self.id(), "message after dismissal ignored");
            return None;
        }
        let Some(event) = parse_bridge_message(message) else {
            tracing::debug!(target: "flock_sdk", bridge = self.id(), raw = message, "unrecognized bridge message");
            return None;
        };

        match event {
            BridgeEvent::Close => self.close(),
            BridgeEvent::Success => {
                if let Some(handler) = &self.inner.callbacks.on_success {
                    handler(self);
                }
            }
            BridgeEvent::Invalid => {
                if let Some(handler) = &self.inner.callbacks.on_invalid {
                    handler(self);
                }
            }
        }
        Some(event)
    }

    /// Routes the page in place without reloading the surface.
    pub fn navigate(&self, placement_id: &str, query_params: Option<&QueryParams>) -> SdkResult<()> {
        if self.is_dismissed() {
            return Err(SdkError::NoActiveBridge);
        }
        self.inner
            .surface
            .evaluate_script(&navigate_script(placement_id, query_params));
        Ok(())
    }

    pub fn set_background_color(&self, color: Rgba) {
        if !self.is_dismissed() {
            self.inner.surface.set_background_color(color);
        }
    }

    /// Tears the surface down without notifying the host. Returns `false` if
    /// the bridge was already dismissed.
    pub fn dismiss(&self) -> bool {
        if self.inner.dismissed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner
            .surface
            .unregister_message_handler(MESSAGE_HANDLER_NAME);
        self.inner.surface.teardown();
        true
    }

    /// Dismisses and then runs `on_close`; used for page and user initiated closes.
    pub fn close(&self) {
        if self.dismiss() {
            if let Some(handler) = &self.inner.callbacks.on_close {
                handler();
            }
        }
    }
}

impl fmt::Debug for WebBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebBridge")
            .field("id", &self.id())
            .field("url", &self.url().as_str())
            .field("dismissed", &self.is_dismissed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingSurfaceFactory, SurfaceCall};
    use std::sync::atomic::AtomicUsize;

    fn present(factory: &RecordingSurfaceFactory, callbacks: BridgeCallbacks) -> WebBridge {
        WebBridge::present(
            1,
            factory.create_surface(),
            Url::parse("https://ui.test/placements/p?key=k").expect("url"),
            Rgba::from_hex("#000000"),
            callbacks,
        )
    }

    #[test]
    fn parse_accepts_known_events_only() {
        assert_eq!(parse_bridge_message(r#"{"event":"close"}"#), Some(BridgeEvent::Close));
        assert_eq!(
            parse_bridge_message(r#"{"event":"success","extra":1}"#),
            Some(BridgeEvent::Success)
        );
        assert_eq!(parse_bridge_message(r#"{"event":"invalid"}"#), Some(BridgeEvent::Invalid));
        assert_eq!(parse_bridge_message(r#"{"event":"resize"}"#), None);
        assert_eq!(parse_bridge_message(r#"{"event":3}"#), None);
        assert_eq!(parse_bridge_message("close"), None);
        assert_eq!(parse_bridge_message(r#"{"type":"close"}"#), None);
    }

    #[test]
    fn navigate_script_dispatches_client_event() {
        let script = navigate_script("invitee-\"welcome\"", None);
        assert_eq!(
            script,
            r#"window.dispatchEvent(new CustomEvent("flock_client_event", { detail: {"command":"navigate","data":{"placementId":"invitee-\"welcome\""}} }));"#
        );
    }

    #[test]
    fn navigate_script_carries_non_empty_query() {
        let query = QueryParams::from([("step".to_string(), "2".to_string())]);
        let script = navigate_script("p", Some(&query));
        assert!(script.contains(r#""queryParams":{"step":"2"}"#));
        assert!(!navigate_script("p", Some(&QueryParams::new())).contains("queryParams"));
    }

    #[test]
    fn shim_forwards_to_named_handler() {
        let script = bridge_shim_script(MESSAGE_HANDLER_NAME);
        assert!(script.contains("window.ReactNativeWebView"));
        assert!(script.contains(r#"window.webkit.messageHandlers["flock"].postMessage(String(message));"#));
    }

    #[test]
    fn present_sets_up_surface_in_order() {
        let factory = RecordingSurfaceFactory::default();
        present(&factory, BridgeCallbacks::new());

        let calls: Vec<SurfaceCall> = factory.calls().into_iter().map(|(_, call)| call).collect();
        assert_eq!(calls[0], SurfaceCall::RegisterHandler("flock".to_string()));
        assert!(matches!(calls[1], SurfaceCall::AddUserScript(_)));
        assert_eq!(calls[2], SurfaceCall::SetBackground(Rgba::from_hex("#000000").expect("color")));
        assert_eq!(
            calls[3],
            SurfaceCall::LoadUrl("https://ui.test/placements/p?key=k".to_string())
        );
    }

    #[test]
    fn success_and_invalid_reach_callbacks_with_bridge() {
        let factory = RecordingSurfaceFactory::default();
        let successes = Arc::new(AtomicUsize::new(0));
        let invalids = Arc::new(AtomicUsize::new(0));
        let callbacks = BridgeCallbacks::new()
            .on_success({
                let successes = successes.clone();
                move |bridge: &WebBridge| {
                    assert_eq!(bridge.id(), 1);
                    successes.fetch_add(1, Ordering::SeqCst);
                }
            })
            .on_invalid({
                let invalids = invalids.clone();
                move |_: &WebBridge| {
                    invalids.fetch_add(1, Ordering::SeqCst);
                }
            });
        let bridge = present(&factory, callbacks);

        assert_eq!(bridge.handle_message(r#"{"event":"success"}"#), Some(BridgeEvent::Success));
        assert_eq!(bridge.handle_message(r#"{"event":"invalid"}"#), Some(BridgeEvent::Invalid));
        assert_eq!(bridge.handle_message(r#"{"event":"unknown"}"#), None);
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(invalids.load(Ordering::SeqCst), 1);
        assert!(!bridge.is_dismissed());
    }

    #[test]
    fn close_event_unregisters_before_teardown_then_notifies() {
        let factory = RecordingSurfaceFactory::default();
        let closed = Arc::new(AtomicUsize::new(0));
        let bridge = present(
            &factory,
            BridgeCallbacks::new().on_close({
                let closed = closed.clone();
                move || {
                    closed.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        assert_eq!(bridge.handle_message(r#"{"event":"close"}"#), Some(BridgeEvent::Close));
        assert!(bridge.is_dismissed());
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let calls: Vec<SurfaceCall> = factory.calls().into_iter().map(|(_, call)| call).collect();
        let tail = &calls[calls.len() - 2..];
        assert_eq!(
            tail,
            &[
                SurfaceCall::UnregisterHandler("flock".to_string()),
                SurfaceCall::Teardown
            ]
        );

        assert_eq!(bridge.handle_message(r#"{"event":"close"}"#), None);
        bridge.close();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn navigate_evaluates_script_without_reloading() {
        let factory = RecordingSurfaceFactory::default();
        let bridge = present(&factory, BridgeCallbacks::new());
        let before = factory.calls().len();

        bridge.navigate("invitee-welcome", None).expect("navigate should succeed");
        let calls = factory.calls();
        assert_eq!(calls.len(), before + 1);
        assert!(matches!(&calls[before].1, SurfaceCall::EvaluateScript(script) if script.contains("invitee-welcome")));

        bridge.dismiss();
        assert!(matches!(
            bridge.navigate("x", None),
            Err(SdkError::NoActiveBridge)
        ));
    }
}
