/// Test utilities and mock implementations for safe testing
use crate::{AutomountError, Media, MediaProvider, MountSession};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Session handed out by [`MockProvider`] - NEVER touches a real mount table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSession {
    pub provider: String,
    pub media_id: String,
    pub mount_path: PathBuf,
}

impl MountSession for MockSession {
    fn mount_path(&self) -> &Path {
        &self.mount_path
    }
}

#[derive(Default)]
struct MockState {
    mount_calls: HashMap<String, usize>,
    unmount_calls: HashMap<String, usize>,
    mounted: HashSet<String>,
    forgotten: HashSet<String>,
}

/// Mock provider with scripted behaviour and call counters
pub struct MockProvider {
    name: String,
    media: Vec<Media>,
    mount_failures: HashMap<String, String>,
    unmount_failures: HashMap<String, String>,
    mount_delay: Option<Duration>,
    init_failure: Option<String>,
    run_failure: Option<(Duration, String)>,
    init_calls: AtomicUsize,
    running: AtomicBool,
    run_cancelled: AtomicBool,
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            media: Vec::new(),
            mount_failures: HashMap::new(),
            unmount_failures: HashMap::new(),
            mount_delay: None,
            init_failure: None,
            run_failure: None,
            init_calls: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            run_cancelled: AtomicBool::new(false),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Claim `id` as owned by this provider; mounting it succeeds.
    pub fn with_media(mut self, id: &str, display_name: &str) -> Self {
        self.media.push(Media::new(id, display_name));
        self
    }

    /// Claim `id` but fail every mount of it with `reason`.
    pub fn with_mount_failure(mut self, id: &str, reason: &str) -> Self {
        self.media.push(Media::new(id, id));
        self.mount_failures.insert(id.to_string(), reason.to_string());
        self
    }

    pub fn with_unmount_failure(mut self, id: &str, reason: &str) -> Self {
        self.unmount_failures.insert(id.to_string(), reason.to_string());
        self
    }

    pub fn with_mount_delay(mut self, delay: Duration) -> Self {
        self.mount_delay = Some(delay);
        self
    }

    pub fn with_init_failure(mut self, reason: &str) -> Self {
        self.init_failure = Some(reason.to_string());
        self
    }

    /// Make `run` fail with `reason` after `after` has elapsed.
    pub fn with_run_failure(mut self, after: Duration, reason: &str) -> Self {
        self.run_failure = Some((after, reason.to_string()));
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Stop recognizing `id`, as if the media had been unplugged.
    pub fn forget(&self, id: &str) {
        let mut state = self.state();
        state.forgotten.insert(id.to_string());
        state.mounted.remove(id);
    }

    pub fn session_path(&self, id: &str) -> PathBuf {
        PathBuf::from("/mnt/mock").join(&self.name).join(id.trim_start_matches('/'))
    }

    pub fn mount_calls(&self, id: &str) -> usize {
        self.state().mount_calls.get(id).copied().unwrap_or(0)
    }

    pub fn total_mount_calls(&self) -> usize {
        self.state().mount_calls.values().sum()
    }

    pub fn unmount_calls(&self, id: &str) -> usize {
        self.state().unmount_calls.get(id).copied().unwrap_or(0)
    }

    pub fn is_mounted(&self, id: &str) -> bool {
        self.state().mounted.contains(id)
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn was_cancelled(&self) -> bool {
        self.run_cancelled.load(Ordering::SeqCst)
    }

    fn owns(&self, id: &str) -> bool {
        self.media.iter().any(|m| m.id == id) && !self.state().forgotten.contains(id)
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl MediaProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<(), AutomountError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        match &self.init_failure {
            Some(reason) => Err(AutomountError::InitializationFailed {
                provider: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn run(&self, cancel: CancellationToken) -> Result<(), AutomountError> {
        self.running.store(true, Ordering::SeqCst);
        let result = match &self.run_failure {
            Some((after, reason)) => tokio::select! {
                _ = cancel.cancelled() => {
                    self.run_cancelled.store(true, Ordering::SeqCst);
                    Ok(())
                }
                _ = tokio::time::sleep(*after) => Err(AutomountError::MonitoringFailed {
                    provider: self.name.clone(),
                    reason: reason.clone(),
                }),
            },
            None => {
                cancel.cancelled().await;
                self.run_cancelled.store(true, Ordering::SeqCst);
                Ok(())
            }
        };
        self.running.store(false, Ordering::SeqCst);
        result
    }

    fn list_media(&self) -> Vec<Media> {
        let state = self.state();
        self.media
            .iter()
            .filter(|m| !state.forgotten.contains(&m.id))
            .cloned()
            .collect()
    }

    async fn mount(&self, id: &str) -> Result<Arc<dyn MountSession>, AutomountError> {
        *self.state().mount_calls.entry(id.to_string()).or_insert(0) += 1;

        if !self.owns(id) {
            return Err(AutomountError::NotFound(id.to_string()));
        }
        if let Some(delay) = self.mount_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = self.mount_failures.get(id) {
            return Err(AutomountError::MountFailed {
                media_id: id.to_string(),
                reason: reason.clone(),
            });
        }

        self.state().mounted.insert(id.to_string());
        Ok(Arc::new(MockSession {
            provider: self.name.clone(),
            media_id: id.to_string(),
            mount_path: self.session_path(id),
        }))
    }

    async fn unmount(&self, id: &str) -> Result<(), AutomountError> {
        *self.state().unmount_calls.entry(id.to_string()).or_insert(0) += 1;

        if !self.owns(id) {
            return Err(AutomountError::NotFound(id.to_string()));
        }
        if let Some(reason) = self.unmount_failures.get(id) {
            return Err(AutomountError::UnmountFailed {
                media_id: id.to_string(),
                reason: reason.clone(),
            });
        }

        self.state().mounted.remove(id);
        Ok(())
    }
}

/// Erase mock types so they can be handed to a [`crate::Muxer`].
pub fn as_providers(mocks: &[Arc<MockProvider>]) -> Vec<Arc<dyn MediaProvider>> {
    mocks
        .iter()
        .map(|mock| Arc::clone(mock) as Arc<dyn MediaProvider>)
        .collect()
}
