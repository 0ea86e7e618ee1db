/// Lease lifecycle tests against scripted providers
/// Covers the single-mount rule, lease bookkeeping and idle unmounting

#[cfg(test)]
mod leaser_tests {
    use automount_core::test_utils::{as_providers, MockProvider};
    use automount_core::{AutomountError, Leaser, LeaserConfig, MediaProvider, Muxer};
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};
    use tokio_util::sync::CancellationToken;

    fn leaser_over(mocks: &[Arc<MockProvider>]) -> Leaser {
        Leaser::new(Arc::new(Muxer::new(as_providers(mocks))))
    }

    fn idle_unmounting() -> LeaserConfig {
        LeaserConfig {
            unmount_idle: true,
            idle_grace_secs: 0,
            sweep_interval_secs: 1,
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_repeat_leases_mount_once() {
        let disk = MockProvider::new("disk").with_media("sdb1", "USB Stick").into_arc();
        let leaser = leaser_over(&[disk.clone()]);

        let mut ids = HashSet::new();
        for _ in 0..5 {
            let lease = assert_ok!(leaser.lease("sdb1").await);
            assert_eq!(lease.media_id(), "sdb1");
            assert!(ids.insert(lease.id().clone()));
        }

        assert_eq!(disk.mount_calls("sdb1"), 1, "media must be mounted exactly once");
        assert_eq!(leaser.leases().await.len(), 5);
        assert_eq!(leaser.mounted_media().await, vec!["sdb1".to_string()]);
    }

    #[tokio::test]
    async fn test_lease_count_is_conserved() {
        let disk = MockProvider::new("disk")
            .with_media("sdb1", "USB Stick")
            .with_media("sdc1", "SD Card")
            .into_arc();
        let leaser = leaser_over(&[disk.clone()]);

        let a = leaser.lease("sdb1").await.unwrap();
        let b = leaser.lease("sdc1").await.unwrap();
        let c = leaser.lease("sdb1").await.unwrap();
        let _d = leaser.lease("sdc1").await.unwrap();
        assert_eq!(leaser.leases().await.len(), 4);

        assert_ok!(leaser.release(a.id().as_str()).await);
        assert_ok!(leaser.release(b.id().as_str()).await);
        assert_eq!(leaser.leases().await.len(), 2);

        assert_ok!(leaser.release(c.id().as_str()).await);
        assert_eq!(leaser.leases().await.len(), 1);
    }

    #[tokio::test]
    async fn test_leases_are_listed_by_media_then_lease_order() {
        let disk = MockProvider::new("disk")
            .with_media("sdb1", "USB Stick")
            .with_media("sdc1", "SD Card")
            .into_arc();
        let leaser = leaser_over(&[disk]);

        let first = leaser.lease("sdb1").await.unwrap();
        let second = leaser.lease("sdc1").await.unwrap();
        let third = leaser.lease("sdb1").await.unwrap();

        let listed: Vec<_> = leaser.leases().await.iter().map(|l| l.id().clone()).collect();
        assert_eq!(listed, vec![first.id().clone(), third.id().clone(), second.id().clone()]);
    }

    #[tokio::test]
    async fn test_double_release_fails_second_time() {
        let disk = MockProvider::new("disk").with_media("sdb1", "USB Stick").into_arc();
        let leaser = leaser_over(&[disk]);

        let lease = leaser.lease("sdb1").await.unwrap();
        assert_ok!(leaser.release(lease.id().as_str()).await);

        let err = assert_err!(leaser.release(lease.id().as_str()).await);
        assert!(matches!(err, AutomountError::NoSuchLease(ref id) if id == lease.id().as_str()));
    }

    #[tokio::test]
    async fn test_release_of_unknown_lease() {
        let leaser = leaser_over(&[MockProvider::new("disk").into_arc()]);
        let err = assert_err!(leaser.release("never-issued").await);
        assert!(matches!(err, AutomountError::NoSuchLease(_)));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_failed_mount_leaves_no_state() {
        let disk = MockProvider::new("disk")
            .with_media("sdb1", "USB Stick")
            .with_mount_failure("sdc1", "wrong fs type")
            .into_arc();
        let leaser = leaser_over(&[disk.clone()]);
        let kept = leaser.lease("sdb1").await.unwrap();

        let err = assert_err!(leaser.lease("sdc1").await);
        match err {
            AutomountError::MountFailed { media_id, reason } => {
                assert_eq!(media_id, "sdc1");
                assert_eq!(reason, "wrong fs type");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let leases = leaser.leases().await;
        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].id(), kept.id());
        assert_eq!(leaser.mounted_media().await, vec!["sdb1".to_string()]);

        // Nothing was recorded, so the next attempt mounts again.
        assert_err!(leaser.lease("sdc1").await);
        assert_eq!(disk.mount_calls("sdc1"), 2);
    }

    #[tokio::test]
    async fn test_unknown_media_surfaces_not_found() {
        let leaser = leaser_over(&[
            MockProvider::new("disk").into_arc(),
            MockProvider::new("network").into_arc(),
        ]);
        let err = assert_err!(leaser.lease("nope").await);
        assert!(matches!(err, AutomountError::NotFound(ref id) if id == "nope"));
        assert!(leaser.leases().await.is_empty());
    }

    #[tokio::test]
    async fn test_end_to_end_scenario() {
        let a = MockProvider::new("a").into_arc();
        let b = MockProvider::new("b").with_media("m1", "Media One").into_arc();
        let leaser = leaser_over(&[a.clone(), b.clone()]);

        let l1 = leaser.lease("m1").await.unwrap();
        assert_eq!(l1.mount_path(), Path::new("/mnt/mock/b/m1"));
        assert_eq!(a.mount_calls("m1"), 1);
        assert_eq!(b.mount_calls("m1"), 1);

        let l2 = leaser.lease("m1").await.unwrap();
        assert_ne!(l1.id(), l2.id());
        assert!(Arc::ptr_eq(l1.session(), l2.session()));
        assert_eq!(a.mount_calls("m1"), 1);
        assert_eq!(b.mount_calls("m1"), 1);

        assert_ok!(leaser.release(l1.id().as_str()).await);
        let remaining = leaser.leases().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id(), l2.id());

        let err = assert_err!(leaser.release(l1.id().as_str()).await);
        assert!(matches!(err, AutomountError::NoSuchLease(_)));
    }

    #[tokio::test]
    async fn test_concurrent_leases_share_one_mount() {
        let disk = MockProvider::new("disk")
            .with_media("sdb1", "USB Stick")
            .with_mount_delay(Duration::from_millis(25))
            .into_arc();
        let leaser = Arc::new(leaser_over(&[disk.clone()]));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let leaser = Arc::clone(&leaser);
                tokio::spawn(async move { leaser.lease("sdb1").await })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let lease = handle.await.unwrap().unwrap();
            assert!(ids.insert(lease.id().clone()), "duplicate lease id handed out");
        }

        assert_eq!(disk.mount_calls("sdb1"), 1);
        assert_eq!(leaser.leases().await.len(), 32);
        assert_eq!(leaser.mounted_media().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mounts_are_sticky_by_default() {
        let disk = MockProvider::new("disk").with_media("sdb1", "USB Stick").into_arc();
        let muxer = Arc::new(Muxer::new(as_providers(&[disk.clone()])));
        // No grace period, so only the policy keeps the mount alive.
        let leaser = Leaser::with_config(
            muxer,
            LeaserConfig {
                unmount_idle: false,
                idle_grace_secs: 0,
                ..LeaserConfig::default()
            },
        );
        assert!(!leaser.config().unmount_idle);

        let lease = leaser.lease("sdb1").await.unwrap();
        leaser.release(lease.id().as_str()).await.unwrap();

        assert_eq!(leaser.sweep_idle().await, 0);
        assert!(disk.is_mounted("sdb1"));
        assert_eq!(disk.unmount_calls("sdb1"), 0);
        assert_eq!(leaser.mounted_media().await, vec!["sdb1".to_string()]);

        // The empty entry is reused without another mount.
        leaser.lease("sdb1").await.unwrap();
        assert_eq!(disk.mount_calls("sdb1"), 1);
    }

    #[tokio::test]
    async fn test_idle_media_is_unmounted_and_evicted() {
        let disk = MockProvider::new("disk")
            .with_media("sdb1", "USB Stick")
            .with_media("sdc1", "SD Card")
            .into_arc();
        let muxer = Arc::new(Muxer::new(as_providers(&[disk.clone()])));
        let leaser = Leaser::with_config(muxer, idle_unmounting());

        let idle = leaser.lease("sdb1").await.unwrap();
        let _busy = leaser.lease("sdc1").await.unwrap();
        leaser.release(idle.id().as_str()).await.unwrap();

        assert_eq!(leaser.sweep_idle().await, 1);
        assert!(!disk.is_mounted("sdb1"));
        assert!(disk.is_mounted("sdc1"));
        assert_eq!(leaser.mounted_media().await, vec!["sdc1".to_string()]);

        // A fresh lease mounts again.
        leaser.lease("sdb1").await.unwrap();
        assert_eq!(disk.mount_calls("sdb1"), 2);
    }

    #[tokio::test]
    async fn test_failed_idle_unmount_is_retried() {
        let disk = MockProvider::new("disk")
            .with_media("sdb1", "USB Stick")
            .with_unmount_failure("sdb1", "target is busy")
            .into_arc();
        let muxer = Arc::new(Muxer::new(as_providers(&[disk.clone()])));
        let leaser = Leaser::with_config(muxer, idle_unmounting());

        let lease = leaser.lease("sdb1").await.unwrap();
        leaser.release(lease.id().as_str()).await.unwrap();

        assert_eq!(leaser.sweep_idle().await, 0);
        assert_eq!(leaser.sweep_idle().await, 0);
        assert_eq!(disk.unmount_calls("sdb1"), 2);
        assert_eq!(leaser.mounted_media().await, vec!["sdb1".to_string()]);
    }

    #[tokio::test]
    async fn test_vanished_idle_media_is_forgotten() {
        let disk = MockProvider::new("disk").with_media("sdb1", "USB Stick").into_arc();
        let muxer = Arc::new(Muxer::new(as_providers(&[disk.clone()])));
        let leaser = Leaser::with_config(muxer, idle_unmounting());

        let lease = leaser.lease("sdb1").await.unwrap();
        leaser.release(lease.id().as_str()).await.unwrap();
        disk.forget("sdb1");

        assert_eq!(leaser.sweep_idle().await, 1);
        assert_eq!(disk.unmount_calls("sdb1"), 1);
        assert!(leaser.mounted_media().await.is_empty());

        // Nothing is left to retry.
        assert_eq!(leaser.sweep_idle().await, 0);
        assert_eq!(disk.unmount_calls("sdb1"), 1);
        let err = leaser.lease("sdb1").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_relisted_media_is_not_swept() {
        let disk = MockProvider::new("disk").with_media("sdb1", "USB Stick").into_arc();
        let muxer = Arc::new(Muxer::new(as_providers(&[disk.clone()])));
        let leaser = Leaser::with_config(muxer, idle_unmounting());

        let first = leaser.lease("sdb1").await.unwrap();
        leaser.release(first.id().as_str()).await.unwrap();
        leaser.lease("sdb1").await.unwrap();

        assert_eq!(leaser.sweep_idle().await, 0);
        assert_eq!(disk.unmount_calls("sdb1"), 0);
        assert_eq!(disk.mount_calls("sdb1"), 1);
    }

    #[tokio::test]
    async fn test_process_sweeps_and_closes_on_cancel() {
        let disk = MockProvider::new("disk").with_media("sdb1", "USB Stick").into_arc();
        let muxer = Arc::new(Muxer::new(as_providers(&[disk.clone()])));
        let leaser = Arc::new(Leaser::with_config(muxer, idle_unmounting()));

        let lease = leaser.lease("sdb1").await.unwrap();
        leaser.release(lease.id().as_str()).await.unwrap();

        let cancel = CancellationToken::new();
        let task = {
            let leaser = Arc::clone(&leaser);
            let cancel = cancel.clone();
            tokio::spawn(async move { leaser.process(cancel).await })
        };

        wait_until(|| disk.unmount_calls("sdb1") == 1).await;
        cancel.cancel();
        assert_ok!(task.await.unwrap());

        assert!(leaser.is_closed());
        let err = assert_err!(leaser.lease("sdb1").await);
        assert!(matches!(err, AutomountError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_closed_leaser_still_releases() {
        let disk = MockProvider::new("disk").with_media("sdb1", "USB Stick").into_arc();
        let leaser = Arc::new(leaser_over(&[disk.clone()]));
        let lease = leaser.lease("sdb1").await.unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_ok!(leaser.process(cancel).await);

        assert_err!(leaser.lease("sdb1").await);
        assert_eq!(leaser.leases().await.len(), 1);
        assert_ok!(leaser.release(lease.id().as_str()).await);
        assert!(leaser.leases().await.is_empty());
        assert_eq!(disk.mount_calls("sdb1"), 1);
    }

    #[tokio::test]
    async fn test_media_provider_accessor() {
        let disk = MockProvider::new("disk").with_media("sdb1", "USB Stick").into_arc();
        let muxer: Arc<dyn MediaProvider> = Arc::new(Muxer::new(as_providers(&[disk])));
        let leaser = Leaser::new(Arc::clone(&muxer));

        assert!(Arc::ptr_eq(leaser.media_provider(), &muxer));
        assert_eq!(leaser.media_provider().name(), "muxer");
        assert_eq!(leaser.media_provider().list_media().len(), 1);
    }
}
