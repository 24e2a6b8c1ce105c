//! Session state machines
//!
//! A session is driven by a single future ([`OriginatingSession::run`] or
//! [`TerminatingSession::run`]) which owns the dialog and media exclusively.
//! Everything observable from outside goes through the cheaply clonable
//! [`SessionHandle`].

use crate::auth::AuthError;
use crate::dialog::DialogPath;
use crate::engine::SessionDeps;
use crate::media::{MediaBinder, MediaError, PauseOrigin};
use crate::msg::Method;
use crate::registry::SessionRegistry;
use crate::transport::{SessionStateStore, TransportError};
use bytes::Bytes;
use bytesstr::BytesStr;
use capability::sdp::ParseSdpError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

mod established;
mod originating;
mod terminating;

pub use originating::OriginatingSession;
pub use terminating::{IncomingSessionHandle, TerminatingSession};

pub(crate) use established::EstablishedSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Originating,
    Terminating,
}

/// What kind of content a session carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Chat,
    FileTransfer,
    ImageShare,
    VideoShare,
    IpCall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    InviteSent,
    AuthChallenged,
    Invited,
    RingingSent,
    Accepted,
    MediaNegotiating,
    Established,
    Terminating,
    // terminal states
    Rejected,
    RejectedByUser,
    Timeout,
    Canceled,
    Terminated,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Rejected
                | SessionState::RejectedByUser
                | SessionState::Timeout
                | SessionState::Canceled
                | SessionState::Terminated
                | SessionState::Failed
        )
    }
}

/// Why a session ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// terminate() was called locally
    ByLocalUser,
    /// BYE received from the peer
    ByRemote,
    /// The peer answered the INVITE with a failure
    RejectedByPeer,
    /// The local user declined the session
    RejectedByUser,
    /// No final response, or no local answer, before the timeout fired
    NoAnswer,
    /// CANCEL received before the session was answered
    CanceledByRemote,
    /// cancel() was called locally before the session was answered
    CanceledByLocal,
    /// The session expired without a refresh
    Expired,
}

impl TerminationReason {
    pub fn as_u16(self) -> u16 {
        match self {
            TerminationReason::ByLocalUser => 1,
            TerminationReason::ByRemote => 2,
            TerminationReason::RejectedByPeer => 3,
            TerminationReason::RejectedByUser => 4,
            TerminationReason::NoAnswer => 5,
            TerminationReason::CanceledByRemote => 6,
            TerminationReason::CanceledByLocal => 7,
            TerminationReason::Expired => 8,
        }
    }
}

/// Stable error codes surfaced to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    SessionInitiationFailed,
    MediaNegotiationFailed,
    MediaTransportFailed,
    SignalingFailed,
    ContentTooLarge,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::SessionInitiationFailed => 101,
            ErrorCode::MediaNegotiationFailed => 102,
            ErrorCode::MediaTransportFailed => 103,
            ErrorCode::SignalingFailed => 104,
            ErrorCode::ContentTooLarge => 105,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("authentication was challenged twice for the same session")]
    RepeatedChallenge,
    #[error("no ACK received for the accepted session")]
    MissingAck,
    #[error("peer sent no SDP to negotiate with")]
    MissingRemoteSdp,
    #[error("failed to parse the remote SDP")]
    InvalidRemoteSdp(#[source] ParseSdpError),
    #[error("remote offer has nothing in common with the local media stack")]
    EmptyCodecIntersection,
    #[error("content size {size} exceeds the configured limit of {limit}")]
    ContentTooLarge { size: u64, limit: u64 },
    #[error(transparent)]
    Media(#[from] MediaError),
}

impl SessionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Auth(_) | SessionError::RepeatedChallenge => {
                ErrorCode::SessionInitiationFailed
            }
            SessionError::MissingRemoteSdp
            | SessionError::InvalidRemoteSdp(_)
            | SessionError::EmptyCodecIntersection => ErrorCode::MediaNegotiationFailed,
            SessionError::Media(_) => ErrorCode::MediaTransportFailed,
            SessionError::Transport(_) | SessionError::MissingAck => ErrorCode::SignalingFailed,
            SessionError::ContentTooLarge { .. } => ErrorCode::ContentTooLarge,
        }
    }
}

/// Event delivered to session listeners
#[derive(Debug)]
pub enum SessionEvent {
    /// The peer signaled that it is alerting the user
    Ringing,
    Established,
    Progress { current: u64, total: u64 },
    DataReceived(Bytes),
    TransferComplete,
    TransferAborted,
    Paused(PauseOrigin),
    Resumed,
    Terminated(TerminationReason),
    Error { code: ErrorCode, message: String },
}

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

pub(crate) enum PauseCommand {
    Pause(PauseOrigin),
    Resume,
}

/// Shared session state
///
/// Referenced by the driving future, the registry (weakly) and any number of
/// handles.
pub(crate) struct Inner {
    pub(crate) id: BytesStr,
    pub(crate) remote_contact: BytesStr,
    pub(crate) direction: Direction,
    pub(crate) media_kind: MediaKind,

    state: Mutex<SessionState>,

    /// Latch ensuring the terminal transition happens exactly once
    terminated: AtomicBool,

    listeners: Mutex<HashMap<ListenerId, Listener>>,
    next_listener: AtomicU64,

    /// Signals a local cancel() before the session was answered
    pub(crate) cancel: Notify,

    /// Signals a local terminate() of the established session
    pub(crate) terminate: Notify,

    pause_tx: mpsc::UnboundedSender<PauseCommand>,

    registry: SessionRegistry,
    state_store: Option<Arc<dyn SessionStateStore>>,
}

impl Inner {
    pub(crate) fn new(
        id: BytesStr,
        remote_contact: BytesStr,
        direction: Direction,
        media_kind: MediaKind,
        initial_state: SessionState,
        registry: SessionRegistry,
        state_store: Option<Arc<dyn SessionStateStore>>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<PauseCommand>) {
        let (pause_tx, pause_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(Self {
            id,
            remote_contact,
            direction,
            media_kind,
            state: Mutex::new(initial_state),
            terminated: AtomicBool::new(false),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(0),
            cancel: Notify::new(),
            terminate: Notify::new(),
            pause_tx,
            registry: registry.clone(),
            state_store,
        });

        registry.insert(&inner);

        (inner, pause_rx)
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to a non-terminal state
    ///
    /// Ignored once a terminal state was reached, late transitions from a
    /// raced signaling path must not resurrect the session.
    pub(crate) fn set_state(&self, state: SessionState) {
        {
            let mut current = self.state.lock();

            if current.is_terminal() {
                return;
            }

            *current = state;
        }

        if let Some(store) = &self.state_store {
            store.update_state(&self.id, state, 0);
        }
    }

    pub(crate) fn emit(&self, event: &SessionEvent) {
        // listeners may add or remove listeners, the lock must not be held
        // while they run
        let listeners: Vec<Listener> = self.listeners.lock().values().cloned().collect();

        for listener in listeners {
            listener(event);
        }
    }

    /// Perform the terminal transition
    ///
    /// Removes the session from the registry, persists the final state and
    /// notifies listeners. Only the first caller wins, every later terminal
    /// path is dropped.
    pub(crate) fn finish(&self, state: SessionState, event: SessionEvent) -> bool {
        if self
            .terminated
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("session {} already terminated, dropping {event:?}", self.id);
            return false;
        }

        *self.state.lock() = state;

        self.registry.remove(&self.id);

        if let Some(store) = &self.state_store {
            let reason_code = match &event {
                SessionEvent::Terminated(reason) => reason.as_u16(),
                SessionEvent::Error { code, .. } => code.as_u16(),
                _ => 0,
            };

            store.update_state(&self.id, state, reason_code);
        }

        self.emit(&event);

        true
    }

    pub(crate) fn has_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

/// Terminal failure path shared by both session directions
pub(crate) async fn fail_session(
    inner: &Inner,
    binder: Option<&mut MediaBinder>,
    error: SessionError,
) {
    if let Some(binder) = binder {
        binder.close().await;
    }

    inner.finish(
        SessionState::Failed,
        SessionEvent::Error {
            code: error.code(),
            message: error.to_string(),
        },
    );
}

/// Close a dialog whose peer already considers the session answered
///
/// Sent when media setup fails after the ACK exchange, the peer would
/// otherwise keep its side of the dialog up.
pub(crate) async fn bye_on_setup_failure(dialog: &mut DialogPath, deps: &SessionDeps) {
    let bye = dialog.create_request(Method::Bye);

    if let Err(e) = deps
        .transport
        .send_and_wait(bye, deps.timers.bye_timeout)
        .await
    {
        log::warn!("failed to send BYE for the failed session, {e}");
    }
}

/// Cheaply clonable handle to observe and control a session
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Inner>,
}

impl SessionHandle {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> &BytesStr {
        &self.inner.id
    }

    pub fn remote_contact(&self) -> &BytesStr {
        &self.inner.remote_contact
    }

    pub fn direction(&self) -> Direction {
        self.inner.direction
    }

    pub fn media_kind(&self) -> MediaKind {
        self.inner.media_kind
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn has_terminated(&self) -> bool {
        self.inner.has_terminated()
    }

    /// Register a listener for session events
    ///
    /// Listeners are called inline by the session future and must not block
    /// or call back into the session.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);

        self.inner.listeners.lock().insert(id, Arc::new(listener));

        id
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner.listeners.lock().remove(&id);
    }

    /// Abort session setup
    ///
    /// Unblocks a pending INVITE exchange. No media transport will be
    /// created. Has no effect once the session is established.
    pub fn cancel(&self) {
        self.inner.cancel.notify_one();
    }

    /// Tear down the established session with a BYE
    pub fn terminate(&self) {
        self.inner.terminate.notify_one();
    }

    /// Pause the session's transfer
    pub fn pause(&self, origin: PauseOrigin) {
        let _ = self.inner.pause_tx.send(PauseCommand::Pause(origin));
    }

    /// Resume a paused transfer
    pub fn resume(&self) {
        let _ = self.inner.pause_tx.send(PauseCommand::Resume);
    }
}
