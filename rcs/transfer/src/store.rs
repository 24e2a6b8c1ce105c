//! Persisted transfer checkpoints
//!
//! A [`ResumableTransfer`] is the only piece of transfer state surviving a
//! process restart. Records are created when a transfer starts, updated on
//! every pause and deleted on any terminal outcome.

use bytesstr::BytesStr;
use parking_lot::Mutex;
use session::PauseOrigin;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Upload,
    Download,
}

/// Content metadata persisted with a transfer
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub name: BytesStr,
    pub mime_type: BytesStr,
    /// Declared size in bytes
    pub size: u64,
    /// Where a download is written to
    pub target_location: Option<BytesStr>,
}

/// The conversation a transfer belongs to
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub contact: BytesStr,
    pub chat_id: Option<BytesStr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Started,
    Paused(PauseOrigin),
}

/// A persisted checkpoint of an interrupted HTTP file transfer
#[derive(Debug, Clone)]
pub struct ResumableTransfer {
    pub transfer_id: BytesStr,
    pub direction: TransferDirection,
    pub file: FileMetadata,
    pub chat: ChatContext,

    /// Content server token of an interrupted upload
    pub upload_token: Option<BytesStr>,

    pub bytes_transferred: u64,
    pub state: TransferState,
}

impl ResumableTransfer {
    pub fn new(direction: TransferDirection, file: FileMetadata, chat: ChatContext) -> Self {
        Self {
            transfer_id: Uuid::new_v4().to_string().into(),
            direction,
            file,
            chat,
            upload_token: None,
            bytes_transferred: 0,
            state: TransferState::Started,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("transfer {0} already exists")]
    Duplicate(BytesStr),
    #[error("transfer {0} not found")]
    NotFound(BytesStr),
    #[error("storage failure: {0}")]
    Backend(String),
}

/// Persistence collaborator for transfer checkpoints
///
/// Writes are serialized per transfer id by the implementation. [`list`]
/// returns records in insertion order, the resume queue is built from it.
///
/// [`list`]: TransferStore::list
pub trait TransferStore: Send + Sync {
    fn insert(&self, transfer: ResumableTransfer) -> Result<(), StoreError>;
    fn update(&self, transfer: &ResumableTransfer) -> Result<(), StoreError>;
    fn delete(&self, transfer_id: &str) -> Result<(), StoreError>;
    fn get(&self, transfer_id: &str) -> Option<ResumableTransfer>;
    fn list(&self) -> Vec<ResumableTransfer>;

    /// Returns if an upload token is still present in local storage
    fn upload_token_exists(&self, token: &str) -> bool;
}

#[derive(Default)]
struct MemoryStoreInner {
    transfers: Vec<ResumableTransfer>,
    tokens: HashSet<String>,
}

/// In-memory [`TransferStore`], keeps insertion order
#[derive(Default)]
pub struct MemoryTransferStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an upload token as present in storage
    pub fn add_upload_token(&self, token: &str) {
        self.inner.lock().tokens.insert(token.to_string());
    }

    pub fn remove_upload_token(&self, token: &str) {
        self.inner.lock().tokens.remove(token);
    }
}

impl TransferStore for MemoryTransferStore {
    fn insert(&self, transfer: ResumableTransfer) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        if inner
            .transfers
            .iter()
            .any(|t| t.transfer_id == transfer.transfer_id)
        {
            return Err(StoreError::Duplicate(transfer.transfer_id));
        }

        inner.transfers.push(transfer);

        Ok(())
    }

    fn update(&self, transfer: &ResumableTransfer) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        let slot = inner
            .transfers
            .iter_mut()
            .find(|t| t.transfer_id == transfer.transfer_id)
            .ok_or_else(|| StoreError::NotFound(transfer.transfer_id.clone()))?;

        *slot = transfer.clone();

        Ok(())
    }

    fn delete(&self, transfer_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        let len = inner.transfers.len();
        inner.transfers.retain(|t| t.transfer_id != transfer_id);

        if inner.transfers.len() == len {
            return Err(StoreError::NotFound(transfer_id.into()));
        }

        Ok(())
    }

    fn get(&self, transfer_id: &str) -> Option<ResumableTransfer> {
        self.inner
            .lock()
            .transfers
            .iter()
            .find(|t| t.transfer_id == transfer_id)
            .cloned()
    }

    fn list(&self) -> Vec<ResumableTransfer> {
        self.inner.lock().transfers.clone()
    }

    fn upload_token_exists(&self, token: &str) -> bool {
        self.inner.lock().tokens.contains(token)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn transfer() -> ResumableTransfer {
        ResumableTransfer::new(
            TransferDirection::Upload,
            FileMetadata {
                name: "photo.jpg".into(),
                mime_type: "image/jpeg".into(),
                size: 1024,
                target_location: None,
            },
            ChatContext {
                contact: "sip:bob@example.com".into(),
                chat_id: None,
            },
        )
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let store = MemoryTransferStore::new();
        let transfer = transfer();

        store.insert(transfer.clone()).unwrap();

        assert!(matches!(
            store.insert(transfer),
            Err(StoreError::Duplicate(_))
        ));
    }

    #[test]
    fn update_and_delete_round_trip() {
        let store = MemoryTransferStore::new();
        let mut transfer = transfer();

        store.insert(transfer.clone()).unwrap();

        transfer.bytes_transferred = 512;
        transfer.state = TransferState::Paused(PauseOrigin::BySystem);
        store.update(&transfer).unwrap();

        let stored = store.get(&transfer.transfer_id).unwrap();
        assert_eq!(stored.bytes_transferred, 512);
        assert_eq!(stored.state, TransferState::Paused(PauseOrigin::BySystem));

        store.delete(&transfer.transfer_id).unwrap();
        assert!(store.get(&transfer.transfer_id).is_none());
        assert!(matches!(
            store.delete(&transfer.transfer_id),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn list_keeps_insertion_order() {
        let store = MemoryTransferStore::new();

        let first = transfer();
        let second = transfer();

        store.insert(first.clone()).unwrap();
        store.insert(second.clone()).unwrap();

        let ids: Vec<_> = store.list().into_iter().map(|t| t.transfer_id).collect();
        assert_eq!(ids, vec![first.transfer_id, second.transfer_id]);
    }
}
