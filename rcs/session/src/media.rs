//! Media transport abstraction
//!
//! Sessions only negotiate media, the actual transport (MSRP, RTP, ...) is
//! created by a [`MediaTransportFactory`] and driven through events.

use capability::sdp::SessionDescription;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no usable media description in the remote SDP")]
    NoUsableMedia,
    #[error("media transport failed: {0}")]
    Transport(String),
}

/// Who paused a transfer
///
/// Preserved across pause/resume so recovery policy can tell an intentional
/// pause from one forced by connectivity loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOrigin {
    ByUser,
    BySystem,
}

/// Event emitted by a media transport while a session is established
#[derive(Debug)]
pub enum MediaTransportEvent {
    Progress { current: u64, total: u64 },
    DataReceived(Bytes),
    TransferComplete,
    TransferAborted,
    Error(MediaError),
}

/// One media transport instance bound to a session
#[async_trait]
pub trait MediaTransport: Send {
    /// Open the transport, called once after the session is established
    async fn open(&mut self) -> Result<(), MediaError>;

    /// Send content over the transport
    async fn send_content(
        &mut self,
        content: Bytes,
        content_id: &str,
        mime_type: &str,
    ) -> Result<(), MediaError>;

    async fn close(&mut self);
}

/// Creates media transports from a negotiated remote media description
pub trait MediaTransportFactory: Send + Sync {
    fn create_transport(
        &self,
        remote: &SessionDescription,
        events: mpsc::Sender<MediaTransportEvent>,
    ) -> Result<Box<dyn MediaTransport>, MediaError>;
}

/// Binds a media transport to an established session
///
/// Owns the transport and its event stream, and tracks the pause state. The
/// session loop pulls events with [`MediaBinder::next_event`] and maps them to
/// listener events.
pub struct MediaBinder {
    transport: Box<dyn MediaTransport>,
    events: mpsc::Receiver<MediaTransportEvent>,
    pause: Option<PauseOrigin>,
}

impl MediaBinder {
    pub fn bind(
        factory: &dyn MediaTransportFactory,
        remote: &SessionDescription,
    ) -> Result<Self, MediaError> {
        let (tx, rx) = mpsc::channel(16);

        let transport = factory.create_transport(remote, tx)?;

        Ok(Self {
            transport,
            events: rx,
            pause: None,
        })
    }

    pub async fn start(&mut self) -> Result<(), MediaError> {
        self.transport.open().await
    }

    /// Receive the next transport event
    ///
    /// Returns `None` once the transport dropped its event sender.
    pub async fn next_event(&mut self) -> Option<MediaTransportEvent> {
        self.events.recv().await
    }

    pub async fn send_content(
        &mut self,
        content: Bytes,
        content_id: &str,
        mime_type: &str,
    ) -> Result<(), MediaError> {
        self.transport.send_content(content, content_id, mime_type).await
    }

    /// Mark the transfer paused, keeping the origin of the first pause
    pub fn pause(&mut self, origin: PauseOrigin) {
        if self.pause.is_none() {
            self.pause = Some(origin);
        }
    }

    /// Clear the pause mark, returning who had paused
    pub fn resume(&mut self) -> Option<PauseOrigin> {
        self.pause.take()
    }

    pub fn pause_origin(&self) -> Option<PauseOrigin> {
        self.pause
    }

    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct NullTransport;

    #[async_trait]
    impl MediaTransport for NullTransport {
        async fn open(&mut self) -> Result<(), MediaError> {
            Ok(())
        }

        async fn send_content(
            &mut self,
            _content: Bytes,
            _content_id: &str,
            _mime_type: &str,
        ) -> Result<(), MediaError> {
            Ok(())
        }

        async fn close(&mut self) {}
    }

    fn binder() -> MediaBinder {
        let (_tx, rx) = mpsc::channel(16);

        MediaBinder {
            transport: Box::new(NullTransport),
            events: rx,
            pause: None,
        }
    }

    #[test]
    fn pause_keeps_first_origin() {
        let mut binder = binder();

        binder.pause(PauseOrigin::ByUser);
        binder.pause(PauseOrigin::BySystem);

        assert_eq!(binder.pause_origin(), Some(PauseOrigin::ByUser));
        assert_eq!(binder.resume(), Some(PauseOrigin::ByUser));
        assert_eq!(binder.pause_origin(), None);
    }
}
