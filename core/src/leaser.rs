use crate::{AutomountError, Lease, LeaseId, LeaseIdGenerator, LeaserConfig, MediaProvider, MountSession};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(100);

struct LeaseRecord {
    id: LeaseId,
    created_at: DateTime<Utc>,
}

/// One mounted media item and the leases held on it.
struct MediaEntry {
    media_id: String,
    session: Arc<dyn MountSession>,
    leases: Vec<LeaseRecord>,
    /// Set when the last lease is released, cleared by the next lease.
    idle_since: Option<Instant>,
}

impl MediaEntry {
    fn new(media_id: String, session: Arc<dyn MountSession>) -> Self {
        Self {
            media_id,
            session,
            leases: Vec::new(),
            idle_since: None,
        }
    }

    fn add_lease(&mut self, id: LeaseId) -> Lease {
        let record = LeaseRecord {
            id,
            created_at: Utc::now(),
        };
        let lease = self.to_lease(&record);
        self.leases.push(record);
        self.idle_since = None;
        lease
    }

    fn to_lease(&self, record: &LeaseRecord) -> Lease {
        Lease::new(
            record.id.clone(),
            self.media_id.clone(),
            Arc::clone(&self.session),
            record.created_at,
        )
    }
}

/// Reference-counted leases over mounted media.
///
/// The first lease on a media id mounts it through the provider; further
/// leases share that mount. Every operation serializes on one lock, and the
/// lock is held across the provider's `mount` call, so a slow mount delays all
/// other lease traffic until it settles.
pub struct Leaser {
    provider: Arc<dyn MediaProvider>,
    config: LeaserConfig,
    ids: LeaseIdGenerator,
    media: Mutex<Vec<MediaEntry>>,
    closed: AtomicBool,
}

impl Leaser {
    pub fn new(provider: Arc<dyn MediaProvider>) -> Self {
        Self::with_config(provider, LeaserConfig::default())
    }

    pub fn with_config(provider: Arc<dyn MediaProvider>, config: LeaserConfig) -> Self {
        Self {
            provider,
            config,
            ids: LeaseIdGenerator::new(),
            media: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn media_provider(&self) -> &Arc<dyn MediaProvider> {
        &self.provider
    }

    pub fn config(&self) -> &LeaserConfig {
        &self.config
    }

    /// Every active lease, grouped by media in the order the media was first
    /// leased.
    pub async fn leases(&self) -> Vec<Lease> {
        let media = self.media.lock().await;
        media
            .iter()
            .flat_map(|entry| entry.leases.iter().map(move |record| entry.to_lease(record)))
            .collect()
    }

    /// Ids of the media the leaser currently holds a mount for, including
    /// idle ones.
    pub async fn mounted_media(&self) -> Vec<String> {
        let media = self.media.lock().await;
        media.iter().map(|entry| entry.media_id.clone()).collect()
    }

    pub async fn lease(&self, media_id: &str) -> Result<Lease, AutomountError> {
        let mut media = self.media.lock().await;
        if self.is_closed() {
            return Err(AutomountError::ShuttingDown);
        }

        if let Some(entry) = media.iter_mut().find(|entry| entry.media_id == media_id) {
            let lease = entry.add_lease(self.ids.next_id());
            tracing::info!(lease_id = %lease.id(), media_id, "Leased mounted media");
            return Ok(lease);
        }

        let session = match self.provider.mount(media_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(media_id, error = %e, "Mount for new lease failed");
                return Err(e);
            }
        };

        let mut entry = MediaEntry::new(media_id.to_string(), session);
        let lease = entry.add_lease(self.ids.next_id());
        media.push(entry);

        tracing::info!(
            lease_id = %lease.id(),
            media_id,
            mount_path = %lease.mount_path().display(),
            "Mounted media for new lease"
        );
        Ok(lease)
    }

    pub async fn release(&self, lease_id: &str) -> Result<(), AutomountError> {
        let mut media = self.media.lock().await;

        for entry in media.iter_mut() {
            let Some(index) = entry.leases.iter().position(|record| record.id == *lease_id) else {
                continue;
            };

            entry.leases.remove(index);
            tracing::info!(lease_id, media_id = %entry.media_id, "Released lease");

            if entry.leases.is_empty() {
                entry.idle_since = Some(Instant::now());
                tracing::debug!(media_id = %entry.media_id, "Media has no leases left");
            }
            return Ok(());
        }

        Err(AutomountError::NoSuchLease(lease_id.to_string()))
    }

    /// Unmount and forget every entry that has had no leases for at least the
    /// configured grace period. Returns how many entries were evicted, which is
    /// always zero unless `unmount_idle` is set.
    ///
    /// An entry whose unmount fails stays mounted and is retried on the next
    /// sweep. An entry the provider no longer recognizes is dropped, since
    /// there is nothing left to unmount.
    pub async fn sweep_idle(&self) -> usize {
        if !self.config.unmount_idle {
            return 0;
        }

        let grace = self.config.idle_grace();
        let mut media = self.media.lock().await;
        let now = Instant::now();
        let mut evicted = 0;
        let mut index = 0;

        while index < media.len() {
            let expired = media[index]
                .idle_since
                .is_some_and(|since| now.duration_since(since) >= grace);
            if !expired {
                index += 1;
                continue;
            }

            let media_id = media[index].media_id.clone();
            match self.provider.unmount(&media_id).await {
                Ok(()) => {
                    tracing::info!(media_id = %media_id, "Unmounted idle media");
                    media.remove(index);
                    evicted += 1;
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(media_id = %media_id, "Idle media vanished from its provider, forgetting it");
                    media.remove(index);
                    evicted += 1;
                }
                Err(e) => {
                    tracing::warn!(media_id = %media_id, error = %e, "Failed to unmount idle media, will retry");
                    index += 1;
                }
            }
        }

        evicted
    }

    /// Lease maintenance. Sweeps idle media when `unmount_idle` is set and
    /// closes the leaser to new leases once `cancel` fires.
    pub async fn process(&self, cancel: CancellationToken) -> Result<(), AutomountError> {
        if self.config.unmount_idle {
            let mut ticker = tokio::time::interval(self.config.sweep_interval().max(MIN_SWEEP_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = self.sweep_idle().await;
                        if evicted > 0 {
                            tracing::debug!(evicted, "Idle sweep finished");
                        }
                    }
                }
            }
        } else {
            cancel.cancelled().await;
        }

        self.close();
        Ok(())
    }

    /// Refuse new leases from now on. Existing leases can still be listed and
    /// released.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!("Leaser closed to new leases");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
