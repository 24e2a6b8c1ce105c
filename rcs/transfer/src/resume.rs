//! Automatic resume of interrupted transfers
//!
//! At startup [`TransferResumeManager::load`] collects every transfer that
//! was interrupted or paused by the system and queues it,
//! [`run`](TransferResumeManager::run) then replays the queue strictly one
//! transfer at a time.

use crate::store::{
    ResumableTransfer, StoreError, TransferDirection, TransferState, TransferStore,
};
use async_trait::async_trait;
use bytesstr::BytesStr;
use parking_lot::Mutex;
use session::PauseOrigin;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Debug, thiserror::Error)]
pub enum ResumeError {
    #[error("upload token of transfer {0} no longer exists")]
    MissingUploadToken(BytesStr),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("transfer client dropped the outcome")]
    LostOutcome,
}

/// Terminal outcome of one resumed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Completed,
    Aborted,
    TerminatedByRemote,
    Error(String),
}

/// One-shot latch through which the client reports the terminal outcome
///
/// Remote termination, abort, error and success may race in the client, only
/// the first report wins.
pub struct OutcomeReporter {
    tx: Mutex<Option<oneshot::Sender<TransferOutcome>>>,
}

impl OutcomeReporter {
    fn new() -> (Arc<Self>, oneshot::Receiver<TransferOutcome>) {
        let (tx, rx) = oneshot::channel();

        (
            Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }

    /// Report the terminal outcome, returns if this report won
    pub fn report(&self, outcome: TransferOutcome) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                let _ = tx.send(outcome);
                true
            }
            None => {
                log::debug!("dropping duplicate transfer outcome {outcome:?}");
                false
            }
        }
    }
}

/// HTTP content server client collaborator
///
/// Resumes run against the content server directly, no new INVITE dialog is
/// created for them.
#[async_trait]
pub trait TransferClient: Send + Sync {
    /// Continue an interrupted upload at the persisted byte offset
    async fn resume_upload(&self, transfer: &ResumableTransfer, outcome: Arc<OutcomeReporter>);

    /// Restart a download toward the persisted target location
    async fn resume_download(&self, transfer: &ResumableTransfer, outcome: Arc<OutcomeReporter>);
}

/// Replays system-paused transfers after a restart or failure
pub struct TransferResumeManager {
    store: Arc<dyn TransferStore>,
    client: Arc<dyn TransferClient>,
    queue: Mutex<VecDeque<BytesStr>>,
}

impl TransferResumeManager {
    pub fn new(store: Arc<dyn TransferStore>, client: Arc<dyn TransferClient>) -> Self {
        Self {
            store,
            client,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue every transfer interrupted or paused by the system, in
    /// insertion order
    ///
    /// `Started` records were interrupted by a crash and are flipped to
    /// `Paused(BySystem)` first. Records stay paused until they are deleted
    /// on a terminal outcome, so a process death while the queue drains
    /// leaves them claimable by the next scan. Transfers paused by the user
    /// are left alone, resuming those is the user's call. Returns how many
    /// transfers were queued.
    pub fn load(&self) -> Result<usize, StoreError> {
        let mut queue = self.queue.lock();
        let mut queued = 0;

        for mut transfer in self.store.list() {
            match transfer.state {
                TransferState::Started => {
                    transfer.state = TransferState::Paused(PauseOrigin::BySystem);
                    self.store.update(&transfer)?;
                }
                TransferState::Paused(PauseOrigin::BySystem) => {}
                TransferState::Paused(PauseOrigin::ByUser) => continue,
            }

            if queue.contains(&transfer.transfer_id) {
                continue;
            }

            queue.push_back(transfer.transfer_id);
            queued += 1;
        }

        Ok(queued)
    }

    /// Work the queue down, at most one transfer active at a time
    pub async fn run(&self) {
        loop {
            let Some(transfer_id) = self.queue.lock().pop_front() else {
                return;
            };

            match self.resume_one(&transfer_id).await {
                Ok(outcome) => {
                    log::debug!("resumed transfer {transfer_id} finished with {outcome:?}")
                }
                Err(e) => log::warn!("failed to resume transfer {transfer_id}, {e}"),
            }
        }
    }

    /// Persist a pause checkpoint for a running transfer
    pub fn checkpoint(
        &self,
        transfer_id: &str,
        origin: PauseOrigin,
        bytes_transferred: u64,
    ) -> Result<(), ResumeError> {
        let mut transfer = self
            .store
            .get(transfer_id)
            .ok_or_else(|| StoreError::NotFound(transfer_id.into()))?;

        transfer.state = TransferState::Paused(origin);
        transfer.bytes_transferred = bytes_transferred;

        self.store.update(&transfer)?;

        Ok(())
    }

    async fn resume_one(&self, transfer_id: &str) -> Result<TransferOutcome, ResumeError> {
        let transfer = self
            .store
            .get(transfer_id)
            .ok_or_else(|| StoreError::NotFound(transfer_id.into()))?;

        let (reporter, outcome_rx) = OutcomeReporter::new();

        match transfer.direction {
            TransferDirection::Upload => {
                // a vanished token makes the resume fail before any network
                // traffic happens
                let token_exists = transfer
                    .upload_token
                    .as_ref()
                    .is_some_and(|token| self.store.upload_token_exists(token));

                if !token_exists {
                    self.store.delete(transfer_id)?;
                    return Err(ResumeError::MissingUploadToken(transfer.transfer_id));
                }

                self.client.resume_upload(&transfer, reporter).await;
            }
            TransferDirection::Download => {
                self.client.resume_download(&transfer, reporter).await;
            }
        }

        let outcome = outcome_rx.await.map_err(|_| ResumeError::LostOutcome)?;

        // terminal either way, the checkpoint has served its purpose
        self.store.delete(transfer_id)?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::{ChatContext, FileMetadata, MemoryTransferStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingClient {
        resumed: Mutex<Vec<(BytesStr, TransferDirection)>>,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl RecordingClient {
        async fn record(&self, transfer: &ResumableTransfer, outcome: Arc<OutcomeReporter>) {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);

            tokio::time::sleep(std::time::Duration::from_millis(5)).await;

            self.resumed
                .lock()
                .push((transfer.transfer_id.clone(), transfer.direction));

            self.active.fetch_sub(1, Ordering::SeqCst);

            outcome.report(TransferOutcome::Completed);
        }
    }

    #[async_trait]
    impl TransferClient for RecordingClient {
        async fn resume_upload(&self, transfer: &ResumableTransfer, outcome: Arc<OutcomeReporter>) {
            self.record(transfer, outcome).await;
        }

        async fn resume_download(
            &self,
            transfer: &ResumableTransfer,
            outcome: Arc<OutcomeReporter>,
        ) {
            self.record(transfer, outcome).await;
        }
    }

    fn transfer(direction: TransferDirection, state: TransferState) -> ResumableTransfer {
        let mut transfer = ResumableTransfer::new(
            direction,
            FileMetadata {
                name: "photo.jpg".into(),
                mime_type: "image/jpeg".into(),
                size: 1024,
                target_location: Some("/downloads/photo.jpg".into()),
            },
            ChatContext {
                contact: "sip:bob@example.com".into(),
                chat_id: None,
            },
        );

        transfer.state = state;

        transfer
    }

    #[tokio::test]
    async fn resumes_system_paused_transfers_in_order() {
        let store = Arc::new(MemoryTransferStore::new());
        let client = Arc::new(RecordingClient::default());

        let mut queued_ids = Vec::new();

        for _ in 0..3 {
            let mut t = transfer(
                TransferDirection::Upload,
                TransferState::Paused(PauseOrigin::BySystem),
            );
            t.upload_token = Some("token".into());

            queued_ids.push(t.transfer_id.clone());
            store.insert(t).unwrap();
        }

        let by_user = transfer(
            TransferDirection::Download,
            TransferState::Paused(PauseOrigin::ByUser),
        );
        let by_user_id = by_user.transfer_id.clone();
        store.insert(by_user).unwrap();

        store.add_upload_token("token");

        let manager = TransferResumeManager::new(store.clone(), client.clone());

        assert_eq!(manager.load().unwrap(), 3);
        manager.run().await;

        let resumed: Vec<_> = client
            .resumed
            .lock()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();

        assert_eq!(resumed, queued_ids);
        assert_eq!(client.max_active.load(Ordering::SeqCst), 1);

        // the user paused transfer is untouched
        let remaining = store.get(&by_user_id).unwrap();
        assert_eq!(remaining.state, TransferState::Paused(PauseOrigin::ByUser));
        assert_eq!(store.list().len(), 1);
    }

    #[tokio::test]
    async fn crash_between_scan_and_drain_is_recovered() {
        let store = Arc::new(MemoryTransferStore::new());
        let client = Arc::new(RecordingClient::default());

        let mut interrupted = transfer(
            TransferDirection::Upload,
            TransferState::Paused(PauseOrigin::BySystem),
        );
        interrupted.upload_token = Some("token".into());
        let id = interrupted.transfer_id.clone();
        store.insert(interrupted).unwrap();
        store.add_upload_token("token");

        // the first scan claims the transfer, then the process dies before
        // the queue drained
        let crashed = TransferResumeManager::new(store.clone(), client.clone());
        assert_eq!(crashed.load().unwrap(), 1);
        drop(crashed);

        assert_eq!(
            store.get(&id).unwrap().state,
            TransferState::Paused(PauseOrigin::BySystem)
        );

        let manager = TransferResumeManager::new(store.clone(), client.clone());
        assert_eq!(manager.load().unwrap(), 1);
        manager.run().await;

        assert_eq!(client.resumed.lock().len(), 1);
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn interrupted_started_transfers_are_claimed() {
        let store = Arc::new(MemoryTransferStore::new());
        let client = Arc::new(RecordingClient::default());

        let mut interrupted = transfer(TransferDirection::Upload, TransferState::Started);
        interrupted.upload_token = Some("token".into());
        let id = interrupted.transfer_id.clone();
        store.insert(interrupted).unwrap();
        store.add_upload_token("token");

        let manager = TransferResumeManager::new(store.clone(), client.clone());

        assert_eq!(manager.load().unwrap(), 1);
        assert_eq!(
            store.get(&id).unwrap().state,
            TransferState::Paused(PauseOrigin::BySystem)
        );

        manager.run().await;

        assert_eq!(client.resumed.lock().len(), 1);
        assert!(store.list().is_empty());
    }

    #[tokio::test]
    async fn missing_upload_token_fails_without_a_client_call() {
        let store = Arc::new(MemoryTransferStore::new());
        let client = Arc::new(RecordingClient::default());

        let mut broken = transfer(
            TransferDirection::Upload,
            TransferState::Paused(PauseOrigin::BySystem),
        );
        broken.upload_token = Some("gone".into());
        let broken_id = broken.transfer_id.clone();
        store.insert(broken).unwrap();

        let mut next = transfer(
            TransferDirection::Download,
            TransferState::Paused(PauseOrigin::BySystem),
        );
        next.upload_token = None;
        let next_id = next.transfer_id.clone();
        store.insert(next).unwrap();

        let manager = TransferResumeManager::new(store.clone(), client.clone());

        assert_eq!(manager.load().unwrap(), 2);
        manager.run().await;

        // the broken upload never reached the client, the queue advanced
        let resumed: Vec<_> = client
            .resumed
            .lock()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();

        assert_eq!(resumed, vec![next_id]);
        assert!(store.get(&broken_id).is_none());
    }

    #[tokio::test]
    async fn download_resume_carries_the_persisted_metadata() {
        let store = Arc::new(MemoryTransferStore::new());

        struct AssertingClient;

        #[async_trait]
        impl TransferClient for AssertingClient {
            async fn resume_upload(
                &self,
                _transfer: &ResumableTransfer,
                outcome: Arc<OutcomeReporter>,
            ) {
                outcome.report(TransferOutcome::Completed);
            }

            async fn resume_download(
                &self,
                transfer: &ResumableTransfer,
                outcome: Arc<OutcomeReporter>,
            ) {
                assert_eq!(transfer.file.name, "photo.jpg");
                assert_eq!(transfer.file.size, 1024);
                assert_eq!(
                    transfer.file.target_location.clone().unwrap(),
                    "/downloads/photo.jpg"
                );

                outcome.report(TransferOutcome::Completed);
            }
        }

        let download = transfer(
            TransferDirection::Download,
            TransferState::Paused(PauseOrigin::BySystem),
        );
        store.insert(download).unwrap();

        let manager = TransferResumeManager::new(store.clone(), Arc::new(AssertingClient));

        assert_eq!(manager.load().unwrap(), 1);
        manager.run().await;

        assert!(store.list().is_empty());
    }

    #[test]
    fn outcome_latch_fires_once() {
        let (reporter, mut rx) = OutcomeReporter::new();

        assert!(reporter.report(TransferOutcome::Completed));
        assert!(!reporter.report(TransferOutcome::Aborted));

        assert_eq!(rx.try_recv().unwrap(), TransferOutcome::Completed);
    }
}
