//! Retrying upload that persists the service reply as the response asset.
//!
//! # Attempt flow
//!
//! ```text
//! attempt 1..=max_attempts
//!   ├─ exchange() fails            → failed attempt
//!   ├─ status != 200               → failed attempt
//!   ├─ store.create() fails        → failed attempt (reply discarded)
//!   ├─ body / write breaks off     → remove partial asset, failed attempt
//!   └─ body fully written          → Ok(TransferReceipt)
//! between attempts: sleep(backoff)
//! ```
//!
//! After the last failed attempt no asset is left behind.
//!
//! Store calls block on the filesystem, so each one runs on
//! `tokio::task::spawn_blocking`.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::service::{AttemptError, PcmFormat, PcmUpload, ServiceReply, VoiceService};
use crate::config::ServiceConfig;
use crate::storage::{AssetStore, AssetWriter, StorageError};

// ---------------------------------------------------------------------------
// TransferError / TransferReceipt
// ---------------------------------------------------------------------------

/// Every attempt failed; no asset was produced.
#[derive(Debug, Error)]
#[error("transfer failed after {attempts} attempt(s): {last}")]
pub struct TransferError {
    pub attempts: u32,
    /// Cause of the final failed attempt.
    pub last: AttemptError,
}

/// Outcome of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Attempt number (1-based) that succeeded.
    pub attempt: u32,
    /// Bytes written to the response asset.
    pub bytes_stored: u64,
}

// ---------------------------------------------------------------------------
// Transmitter
// ---------------------------------------------------------------------------

/// Sends a filled buffer and stores the reply under a fixed asset name.
pub struct Transmitter {
    service: Arc<dyn VoiceService>,
    store: Arc<dyn AssetStore>,
    asset_name: String,
    format: PcmFormat,
    max_attempts: u32,
    backoff: Duration,
}

impl Transmitter {
    /// # Arguments
    ///
    /// * `sample_rate`: the capture rate; declared verbatim in the upload
    ///   metadata.
    pub fn new(
        config: &ServiceConfig,
        sample_rate: u32,
        service: Arc<dyn VoiceService>,
        store: Arc<dyn AssetStore>,
        asset_name: impl Into<String>,
    ) -> Self {
        Self {
            service,
            store,
            asset_name: asset_name.into(),
            format: PcmFormat::mono16(sample_rate),
            max_attempts: config.max_attempts.max(1),
            backoff: config.backoff(),
        }
    }

    /// Upload `samples`, retrying up to the attempt budget.
    pub async fn send(&self, samples: &[i16]) -> Result<TransferReceipt, TransferError> {
        let upload = PcmUpload::new(samples, self.format);
        let mut attempt = 0;

        loop {
            attempt += 1;
            log::info!(
                "transfer attempt {attempt}/{} ({} bytes)",
                self.max_attempts,
                upload.body.len()
            );

            let last = match self.attempt(&upload).await {
                Ok(bytes_stored) => {
                    log::info!("reply stored as {} ({bytes_stored} bytes)", self.asset_name);
                    return Ok(TransferReceipt {
                        attempt,
                        bytes_stored,
                    });
                }
                Err(e) => {
                    log::warn!("transfer attempt {attempt} failed: {e}");
                    e
                }
            };

            if attempt >= self.max_attempts {
                log::error!("transfer abandoned after {attempt} attempt(s)");
                return Err(TransferError {
                    attempts: attempt,
                    last,
                });
            }

            tokio::time::sleep(self.backoff).await;
        }
    }

    async fn attempt(&self, upload: &PcmUpload) -> Result<u64, AttemptError> {
        let reply = self.service.exchange(upload).await?;
        if !reply.is_ok() {
            return Err(AttemptError::Status(reply.status));
        }

        let store = Arc::clone(&self.store);
        let name = self.asset_name.clone();
        let writer = self.blocking(move || store.create(&name)).await?;

        match self.persist(reply, writer).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                self.discard_partial().await;
                Err(e)
            }
        }
    }

    /// Stream the reply body into `writer`, closing it at the end.
    async fn persist(
        &self,
        mut reply: ServiceReply,
        mut writer: AssetWriter,
    ) -> Result<u64, AttemptError> {
        let mut written = 0u64;
        while let Some(chunk) = reply.body.next_chunk().await? {
            written += chunk.len() as u64;
            let name = self.asset_name.clone();
            writer = self
                .blocking(move || {
                    writer
                        .write_all(&chunk)
                        .map_err(|source| StorageError::Io { name, source })?;
                    Ok(writer)
                })
                .await?;
        }

        let name = self.asset_name.clone();
        self.blocking(move || {
            writer
                .flush()
                .map_err(|source| StorageError::Io { name, source })
        })
        .await?;
        Ok(written)
    }

    async fn discard_partial(&self) {
        let store = Arc::clone(&self.store);
        let name = self.asset_name.clone();
        match self.blocking(move || store.remove(&name)).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => log::warn!("could not remove partial {}: {e}", self.asset_name),
        }
    }

    /// Run one store call on the blocking pool.
    async fn blocking<T, F>(&self, work: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StorageError> + Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .unwrap_or_else(|e| {
                Err(StorageError::Io {
                    name: self.asset_name.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                })
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::transmit::service::{Scripted, ScriptedService};
    use std::sync::atomic::Ordering;

    const ASSET: &str = "response.mp3";

    fn transmitter(service: Arc<ScriptedService>, store: MemoryStore) -> Transmitter {
        Transmitter::new(
            &ServiceConfig::default(),
            4_000,
            service,
            Arc::new(store),
            ASSET,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn always_refused_makes_three_attempts_and_leaves_no_asset() {
        let service = Arc::new(ScriptedService::new([Scripted::Refused]));
        let store = MemoryStore::new();
        let tx = transmitter(Arc::clone(&service), store.clone());

        let start = tokio::time::Instant::now();
        let err = tx.send(&[0; 16]).await.expect_err("must fail");

        assert_eq!(err.attempts, 3);
        assert!(matches!(err.last, AttemptError::Connect(_)));
        assert_eq!(service.attempts(), 3);
        // Two waits between three attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert!(!store.exists(ASSET));
        assert_eq!(store.creates.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_success_stores_exact_body_without_retry() {
        let payload: Vec<u8> = (0..100u8).collect();
        let service = Arc::new(ScriptedService::new([Scripted::Reply(payload.clone())]));
        let store = MemoryStore::new();
        let tx = transmitter(Arc::clone(&service), store.clone());

        let start = tokio::time::Instant::now();
        let receipt = tx.send(&[0; 4_000]).await.expect("send");

        assert_eq!(
            receipt,
            TransferReceipt {
                attempt: 1,
                bytes_stored: 100
            }
        );
        assert_eq!(service.attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(store.get(ASSET), Some(payload));
        assert_eq!(store.names(), vec![ASSET.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn upload_declares_capture_rate_and_carries_all_samples() {
        let service = Arc::new(ScriptedService::new([Scripted::Reply(vec![1])]));
        let tx = transmitter(Arc::clone(&service), MemoryStore::new());

        tx.send(&[7; 4_000]).await.expect("send");

        let uploads = service.uploads.lock().unwrap();
        assert_eq!(uploads[0].body.len(), 8_000);
        assert_eq!(
            uploads[0].format.content_type(),
            "audio/raw; rate=4000; channels=1; bits=16"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_200_status_counts_as_failed_attempt() {
        let service = Arc::new(ScriptedService::new([
            Scripted::Status(503),
            Scripted::Reply(b"ok".to_vec()),
        ]));
        let store = MemoryStore::new();
        let tx = transmitter(Arc::clone(&service), store.clone());

        let receipt = tx.send(&[0; 8]).await.expect("send");

        assert_eq!(receipt.attempt, 2);
        assert_eq!(store.get(ASSET), Some(b"ok".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn storage_open_failure_is_retried_not_success() {
        let service = Arc::new(ScriptedService::new([Scripted::Reply(b"mp3".to_vec())]));
        let store = MemoryStore::new();
        store.failing_creates.store(1, Ordering::SeqCst);
        let tx = transmitter(Arc::clone(&service), store.clone());

        let receipt = tx.send(&[0; 8]).await.expect("send");

        assert_eq!(receipt.attempt, 2);
        assert_eq!(service.attempts(), 2);
        assert_eq!(store.get(ASSET), Some(b"mp3".to_vec()));
    }

    #[tokio::test(start_paused = true)]
    async fn storage_write_failure_exhausts_and_removes_partial_asset() {
        let service = Arc::new(ScriptedService::new([Scripted::Reply(vec![9; 64])]));
        let store = MemoryStore::new();
        store.failing_writes.store(true, Ordering::SeqCst);
        let tx = transmitter(Arc::clone(&service), store.clone());

        let err = tx.send(&[0; 8]).await.expect_err("must fail");

        assert_eq!(err.attempts, 3);
        assert!(matches!(err.last, AttemptError::Storage(_)));
        assert!(!store.exists(ASSET));
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_body_is_retried_and_partial_removed() {
        let service = Arc::new(ScriptedService::new([
            Scripted::Truncated(vec![1; 40]),
            Scripted::Reply(vec![2; 20]),
        ]));
        let store = MemoryStore::new();
        let tx = transmitter(Arc::clone(&service), store.clone());

        let receipt = tx.send(&[0; 8]).await.expect("send");

        assert_eq!(receipt.attempt, 2);
        assert_eq!(store.get(ASSET), Some(vec![2; 20]));
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_every_time_leaves_nothing() {
        let service = Arc::new(ScriptedService::new([Scripted::Truncated(vec![1; 40])]));
        let store = MemoryStore::new();
        let tx = transmitter(Arc::clone(&service), store.clone());

        let err = tx.send(&[0; 8]).await.expect_err("must fail");

        assert!(matches!(err.last, AttemptError::Body(_)));
        assert!(!store.exists(ASSET));
    }

    #[tokio::test]
    async fn reply_is_written_to_disk_through_fs_store() {
        use crate::storage::FsStore;

        let dir = tempfile::tempdir().expect("tempdir");
        let store: Arc<dyn AssetStore> = Arc::new(FsStore::mount(dir.path()).expect("mount"));
        let payload: Vec<u8> = (0..=255u8).cycle().take(1_000).collect();
        let service = Arc::new(ScriptedService::new([Scripted::Reply(payload.clone())]));
        let tx = Transmitter::new(&ServiceConfig::default(), 4_000, service, store, ASSET);

        let receipt = tx.send(&[0; 8]).await.expect("send");

        assert_eq!(receipt.bytes_stored, 1_000);
        let on_disk = std::fs::read(dir.path().join(ASSET)).expect("read");
        assert_eq!(on_disk, payload);
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_body_leaves_no_file_on_disk() {
        use crate::storage::FsStore;

        let dir = tempfile::tempdir().expect("tempdir");
        let store: Arc<dyn AssetStore> = Arc::new(FsStore::mount(dir.path()).expect("mount"));
        let service = Arc::new(ScriptedService::new([Scripted::Truncated(vec![3; 50])]));
        let tx = Transmitter::new(
            &ServiceConfig::default(),
            4_000,
            Arc::clone(&service) as Arc<dyn VoiceService>,
            store,
            ASSET,
        );

        let err = tx.send(&[0; 8]).await.expect_err("must fail");

        assert_eq!(err.attempts, 3);
        assert_eq!(service.attempts(), 3);
        assert!(!dir.path().join(ASSET).exists());
    }
}
