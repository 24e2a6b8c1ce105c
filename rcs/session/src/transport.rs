//! Collaborator interfaces of the session engine
//!
//! The engine never touches raw sockets, signaling I/O and persistence are
//! provided by these traits.

use crate::dialog::DialogPath;
use crate::msg::{Request, Response};
use crate::session::SessionState;
use async_trait::async_trait;
use bytesstr::BytesStr;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("transport is closed")]
    Closed,
}

/// Signaling transport driving an already-correct SIP transaction layer
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    /// Send a request and block until its final response
    ///
    /// Returns `None` when no final response arrived within `timeout`.
    async fn send_and_wait(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Option<Response>, TransportError>;

    /// Send an INVITE and stream its responses
    ///
    /// Provisional responses are delivered as they arrive, the channel closes
    /// after the final response or once `timeout` elapsed without one.
    async fn send_invite(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<mpsc::Receiver<Response>, TransportError>;

    /// Send a request that expects no response (ACK, CANCEL)
    async fn send(&self, request: Request) -> Result<(), TransportError>;

    async fn send_response(&self, response: Response) -> Result<(), TransportError>;

    /// Register a dialog with the transport
    ///
    /// In-dialog requests (ACK, BYE, CANCEL, ...) matching the dialog's
    /// call-id and tags are delivered through the returned receiver. The
    /// channel is closed when the transport goes away.
    fn register_dialog(&self, dialog: &DialogPath) -> mpsc::Receiver<Request>;
}

/// Issues out-of-dialog capability requests toward a remote contact
///
/// Used to refresh a peer's capabilities when it drops a session, since the
/// decline may reflect a changed capability set.
#[async_trait]
pub trait CapabilityRequester: Send + Sync {
    async fn request_capabilities(&self, contact: &BytesStr);
}

/// Persists session/sharing state and reason code, keyed by the session id
pub trait SessionStateStore: Send + Sync {
    fn update_state(&self, id: &str, state: SessionState, reason_code: u16);
}
