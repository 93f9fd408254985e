use crate::{Rgba, SurfaceFactory, WebSurface};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SurfaceCall {
    LoadUrl(String),
    SetBackground(Rgba),
    AddUserScript(String),
    EvaluateScript(String),
    RegisterHandler(String),
    UnregisterHandler(String),
    Teardown,
}

type CallLog = Arc<Mutex<Vec<(u64, SurfaceCall)>>>;

/// Creates [`RecordingSurface`]s that share one ordered call log.
#[derive(Clone, Default)]
pub struct RecordingSurfaceFactory {
    log: CallLog,
    next_id: Arc<AtomicU64>,
}

impl RecordingSurfaceFactory {
    /// Every surface call so far, tagged with the surface id (starting at 1).
    pub fn calls(&self) -> Vec<(u64, SurfaceCall)> {
        lock(&self.log).clone()
    }

    pub fn calls_for(&self, surface_id: u64) -> Vec<SurfaceCall> {
        lock(&self.log)
            .iter()
            .filter(|(id, _)| *id == surface_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn surface_count(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// URLs loaded by full page loads, in order.
    pub fn loaded_urls(&self) -> Vec<String> {
        lock(&self.log)
            .iter()
            .filter_map(|(_, call)| match call {
                SurfaceCall::LoadUrl(url) => Some(url.clone()),
                _ => None,
            })
            .collect()
    }
}

impl SurfaceFactory for RecordingSurfaceFactory {
    fn create_surface(&self) -> Arc<dyn WebSurface> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(RecordingSurface {
            id,
            log: self.log.clone(),
        })
    }
}

pub struct RecordingSurface {
    id: u64,
    log: CallLog,
}

impl RecordingSurface {
    fn record(&self, call: SurfaceCall) {
        lock(&self.log).push((self.id, call));
    }
}

impl WebSurface for RecordingSurface {
    fn load_url(&self, url: &Url) {
        self.record(SurfaceCall::LoadUrl(url.to_string()));
    }

    fn set_background_color(&self, color: Rgba) {
        self.record(SurfaceCall::SetBackground(color));
    }

    fn add_user_script(&self, script: &str) {
        self.record(SurfaceCall::AddUserScript(script.to_string()));
    }

    fn evaluate_script(&self, script: &str) {
        self.record(SurfaceCall::EvaluateScript(script.to_string()));
    }

    fn register_message_handler(&self, name: &str) {
        self.record(SurfaceCall::RegisterHandler(name.to_string()));
    }

    fn unregister_message_handler(&self, name: &str) {
        self.record(SurfaceCall::UnregisterHandler(name.to_string()));
    }

    fn teardown(&self) {
        self.record(SurfaceCall::Teardown);
    }
}

fn lock(log: &CallLog) -> MutexGuard<'_, Vec<(u64, SurfaceCall)>> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}
