//! Output volume and volume fades.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use fmradio_core::error::{Error, Result};
use fmradio_core::tuning::MAX_VOLUME_LEVEL;
use fmradio_core::types::{Command, RadioState};
use tracing::{debug, warn};

use crate::radio::Inner;
use crate::worker::Worker;

fn check_level(level: u8) -> Result<()> {
    if level > MAX_VOLUME_LEVEL {
        return Err(Error::InvalidArgument(format!(
            "volume {level} above maximum {MAX_VOLUME_LEVEL}"
        )));
    }
    Ok(())
}

impl Inner {
    pub(crate) async fn set_volume(&self, level: u8) -> Result<()> {
        self.admit(Command::Volume).await?;
        check_level(level)?;
        if self.seeking.load(Ordering::SeqCst) || self.state().await == RadioState::Scanning {
            debug!(level, "volume change ignored while searching");
            return Ok(());
        }
        self.cancel_fade().await;
        self.write_volume(level).await
    }

    pub(crate) async fn get_volume(&self) -> u8 {
        self.volume.lock().await.level
    }

    /// Map `level` through the volume table and write it to the device.
    async fn write_volume(&self, level: u8) -> Result<()> {
        let mut volume = self.volume.lock().await;
        if !self.backend.is_open() {
            return Err(Error::DeviceNotOpened);
        }
        let raw = volume
            .table
            .raw(level)
            .ok_or_else(|| Error::InvalidArgument(format!("no volume table entry for {level}")))?;
        self.backend.set_volume(raw).await?;
        volume.level = level;
        debug!(level, raw, "volume set");
        Ok(())
    }

    /// Write the current level again, e.g. after an open or a seek.
    pub(crate) async fn reapply_volume(&self) {
        let volume = self.volume.lock().await;
        if !self.backend.is_open() {
            return;
        }
        let Some(raw) = volume.table.raw(volume.level) else {
            return;
        };
        if let Err(e) = self.backend.set_volume(raw).await {
            warn!(?e, level = volume.level, "restoring volume failed");
        }
    }

    pub(crate) async fn fade_volume(self: &Arc<Self>, target: u8) -> Result<()> {
        self.admit(Command::Volume).await?;
        check_level(target)?;
        if !self.backend.is_open() {
            return Err(Error::DeviceNotOpened);
        }

        let mut slot = self.fade.lock().await;
        if let Some(old) = slot.take() {
            old.stop(self.config.worker_join_timeout()).await;
        }
        let inner = self.clone();
        let step = self.config.fade_step();
        *slot = Some(Worker::spawn(move |cancel| async move {
            loop {
                let current = inner.get_volume().await;
                if current == target {
                    debug!(level = current, "fade complete");
                    break;
                }
                let next = if current < target {
                    current + 1
                } else {
                    current - 1
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(step) => {}
                }
                if let Err(e) = inner.write_volume(next).await {
                    warn!(?e, "fade step failed");
                    break;
                }
            }
        }));
        Ok(())
    }

    /// Stop a running fade, leaving the volume where it got to.
    pub(crate) async fn cancel_fade(&self) {
        let worker = self.fade.lock().await.take();
        if let Some(worker) = worker {
            worker.stop(self.config.worker_join_timeout()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fmradio_core::error::Error;
    use fmradio_core::tuning::keys;
    use fmradio_core::types::SeekDirection;
    use fmradio_test_harness::{DeviceCall, MemoryTuningStore, MockDevice, SeekOutcome};

    use crate::builder::RadioBuilder;
    use crate::radio::Radio;
    use crate::test_util::fast_config;

    async fn radio_with(device: Arc<MockDevice>) -> Radio {
        let table = (0..16).map(|level| 100 + level * 4).collect();
        RadioBuilder::with_backend(device)
            .config(fast_config())
            .tuning_store(Arc::new(
                MemoryTuningStore::new().with_list(keys::VOLUME_TABLE, table),
            ))
            .create()
            .await
            .unwrap()
    }

    async fn wait_volume(device: &MockDevice, raw: u32) {
        for _ in 0..400 {
            if device.volume() == raw {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn volume_needs_open_device() {
        let device = Arc::new(MockDevice::new());
        let radio = radio_with(device.clone()).await;
        radio.realize().await.unwrap();
        assert!(matches!(radio.set_volume(3).await, Err(Error::DeviceNotOpened)));
        assert!(matches!(radio.fade_volume(3).await, Err(Error::DeviceNotOpened)));
        assert_eq!(radio.get_volume().await, 15);
    }

    #[tokio::test]
    async fn volume_maps_through_table() {
        let device = Arc::new(MockDevice::new());
        let radio = radio_with(device.clone()).await;
        radio.realize().await.unwrap();
        radio.start().await.unwrap();
        assert_eq!(device.volume(), 160);

        radio.set_volume(5).await.unwrap();
        assert_eq!(radio.get_volume().await, 5);
        assert_eq!(device.volume(), 120);
    }

    #[tokio::test]
    async fn volume_above_maximum_rejected() {
        let device = Arc::new(MockDevice::new());
        let radio = radio_with(device.clone()).await;
        radio.realize().await.unwrap();
        radio.start().await.unwrap();
        assert!(matches!(
            radio.set_volume(16).await,
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            radio.fade_volume(200).await,
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(radio.get_volume().await, 15);
    }

    #[tokio::test]
    async fn level_survives_restart() {
        let device = Arc::new(MockDevice::new());
        let radio = radio_with(device.clone()).await;
        radio.realize().await.unwrap();
        radio.start().await.unwrap();
        radio.set_volume(2).await.unwrap();
        radio.stop().await.unwrap();
        radio.start().await.unwrap();
        assert_eq!(device.volume(), 108);
    }

    #[tokio::test]
    async fn fade_steps_one_level_at_a_time() {
        let device = Arc::new(MockDevice::new());
        let radio = radio_with(device.clone()).await;
        radio.realize().await.unwrap();
        radio.start().await.unwrap();
        device.clear_calls();

        radio.fade_volume(11).await.unwrap();
        wait_volume(&device, 144).await;
        assert_eq!(radio.get_volume().await, 11);
        assert_eq!(
            device.calls(),
            [156, 152, 148, 144].map(DeviceCall::SetVolume).to_vec()
        );
    }

    #[tokio::test]
    async fn set_volume_cancels_fade() {
        let device = Arc::new(MockDevice::new());
        let mut config = fast_config();
        config.fade_step_ms = 50;
        let radio = RadioBuilder::with_backend(device.clone())
            .config(config)
            .create()
            .await
            .unwrap();
        radio.realize().await.unwrap();
        radio.start().await.unwrap();

        radio.fade_volume(0).await.unwrap();
        radio.set_volume(9).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(radio.get_volume().await, 9);
        assert_eq!(device.volume(), 9);
    }

    #[tokio::test]
    async fn volume_ignored_while_seeking() {
        let device = Arc::new(MockDevice::new());
        let radio = radio_with(device.clone()).await;
        radio.realize().await.unwrap();
        radio.start().await.unwrap();
        device.queue_seek(SeekOutcome::BlockUntilAbort);
        radio.seek(SeekDirection::Up).await.unwrap();

        radio.set_volume(1).await.unwrap();
        assert_eq!(radio.get_volume().await, 15);
        radio.seek_cancel().await.unwrap();
    }
}
