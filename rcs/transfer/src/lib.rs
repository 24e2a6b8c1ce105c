//! Persistence and automatic resume of interrupted HTTP file transfers
//!
//! Transfers checkpoint their progress through a [`TransferStore`]. After a
//! restart or failure the [`TransferResumeManager`] replays every transfer
//! the system paused, strictly one at a time, against the content server
//! client. Transfers the user paused are never resumed automatically.

mod resume;
mod store;

pub use resume::{
    OutcomeReporter, ResumeError, TransferClient, TransferOutcome, TransferResumeManager,
};
pub use store::{
    ChatContext, FileMetadata, MemoryTransferStore, ResumableTransfer, StoreError,
    TransferDirection, TransferState, TransferStore,
};
