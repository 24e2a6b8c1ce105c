//! Client side session lifecycle engine for SIP/IMS based services
//!
//! Sessions are plain futures driving an INVITE dialog and its media
//! transport from creation to a terminal state. Signaling I/O, media
//! transports and persistence are collaborators provided through traits, the
//! engine itself owns only the lifecycle rules.

mod auth;
mod dialog;
mod engine;
mod media;
mod msg;
mod registry;
mod session;
mod timer;
mod transport;
mod util;

pub use auth::{
    AuthError, ClientAuthenticator, DigestAuthenticator, DigestCredentials, DigestUser,
    NoAuthentication,
};
pub use dialog::DialogPath;
pub use engine::{CapabilityOfferBuilder, OfferBuilder, SessionDeps, SessionEngine};
pub use media::{
    MediaBinder, MediaError, MediaTransport, MediaTransportEvent, MediaTransportFactory,
    PauseOrigin,
};
pub use msg::{CodeKind, Method, Request, Response, StatusCode, CONTENT_TYPE_SDP};
pub use registry::SessionRegistry;
pub use session::{
    Direction, ErrorCode, IncomingSessionHandle, ListenerId, MediaKind, OriginatingSession,
    SessionError, SessionEvent, SessionHandle, SessionState, TerminatingSession,
    TerminationReason,
};
pub use timer::TimerConfig;
pub use transport::{
    CapabilityRequester, SessionStateStore, SignalingTransport, TransportError,
};
