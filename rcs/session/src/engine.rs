use crate::auth::ClientAuthenticator;
use crate::dialog::DialogPath;
use crate::media::MediaTransportFactory;
use crate::msg::Request;
use crate::registry::SessionRegistry;
use crate::session::{
    Direction, IncomingSessionHandle, Inner, MediaKind, OriginatingSession, SessionError,
    SessionHandle, SessionState, TerminatingSession,
};
use crate::timer::TimerConfig;
use crate::transport::{CapabilityRequester, SessionStateStore, SignalingTransport};
use bytesstr::BytesStr;
use capability::sdp::{build_capability_sdp, Connection, Origin, SessionDescription};
use capability::{build_local_feature_tags, ServiceConfig};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Collaborators shared by every session of an engine
#[derive(Clone)]
pub struct SessionDeps {
    pub transport: Arc<dyn SignalingTransport>,
    pub media_factory: Arc<dyn MediaTransportFactory>,
    pub capability_requester: Option<Arc<dyn CapabilityRequester>>,
    pub state_store: Option<Arc<dyn SessionStateStore>>,
    pub registry: SessionRegistry,
    pub timers: TimerConfig,
}

/// Builds the SDP half of the offer/answer exchange for one session
///
/// Content-specific session kinds (file transfer, image share, ...) plug
/// their own builder in, [`CapabilityOfferBuilder`] covers the default case
/// derived from the service configuration.
pub trait OfferBuilder: Send {
    fn build_offer(&self) -> SessionDescription;

    /// Answer a received offer
    ///
    /// Fails with [`SessionError::EmptyCodecIntersection`] when the offer has
    /// nothing in common with the local media stack.
    fn build_answer(&self, offer: &SessionDescription) -> Result<SessionDescription, SessionError>;
}

/// Default offer builder derived from the service configuration
pub struct CapabilityOfferBuilder {
    pub config: ServiceConfig,
    pub local_ip: IpAddr,
}

impl OfferBuilder for CapabilityOfferBuilder {
    fn build_offer(&self) -> SessionDescription {
        build_capability_sdp(&self.config, self.local_ip).unwrap_or_else(|| SessionDescription {
            origin: Some(Origin {
                username: BytesStr::from_static("-"),
                session_id: BytesStr::from_static("0"),
                session_version: BytesStr::from_static("0"),
                address: self.local_ip,
            }),
            name: BytesStr::from_static("-"),
            connection: Some(Connection {
                address: self.local_ip,
            }),
            attributes: vec![],
            media_descriptions: vec![],
        })
    }

    fn build_answer(&self, offer: &SessionDescription) -> Result<SessionDescription, SessionError> {
        use capability::sdp::MediaType;

        let mut answer = offer.clone();

        answer.origin = Some(Origin {
            username: BytesStr::from_static("-"),
            session_id: BytesStr::from_static("0"),
            session_version: BytesStr::from_static("0"),
            address: self.local_ip,
        });

        answer.connection = Some(Connection {
            address: self.local_ip,
        });

        for desc in &mut answer.media_descriptions {
            match &desc.media.media_type {
                MediaType::Video => {
                    desc.rtpmap
                        .retain(|rtpmap| self.config.supports_video_codec(&rtpmap.encoding));

                    if desc.rtpmap.is_empty() {
                        return Err(SessionError::EmptyCodecIntersection);
                    }

                    desc.media.fmts = desc
                        .rtpmap
                        .iter()
                        .map(|rtpmap| rtpmap.payload.to_string().into())
                        .collect();
                }
                MediaType::Message => {
                    if let Some(selector) = &desc.file_selector
                        && let Some(size) = selector.size
                        && self.config.max_content_size > 0
                        && size > self.config.max_content_size
                    {
                        return Err(SessionError::ContentTooLarge {
                            size,
                            limit: self.config.max_content_size,
                        });
                    }

                    if let Some(accept_types) = &mut desc.accept_types {
                        accept_types.0.retain(|mime| {
                            &**mime == "*"
                                || self.config.image_mime_types.contains(mime)
                                || self.config.geoloc_mime_types.contains(mime)
                        });

                        if accept_types.0.is_empty() {
                            return Err(SessionError::EmptyCodecIntersection);
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(answer)
    }
}

/// Creates and tracks sessions
///
/// The engine hands out session futures, it does not spawn them. Callers
/// decide on which runtime and with which lifetime each session runs.
pub struct SessionEngine {
    local_uri: BytesStr,
    config: ServiceConfig,
    deps: SessionDeps,
}

impl SessionEngine {
    pub fn new(
        local_uri: BytesStr,
        config: ServiceConfig,
        transport: Arc<dyn SignalingTransport>,
        media_factory: Arc<dyn MediaTransportFactory>,
    ) -> Self {
        Self {
            local_uri,
            config,
            deps: SessionDeps {
                transport,
                media_factory,
                capability_requester: None,
                state_store: None,
                registry: SessionRegistry::new(),
                timers: TimerConfig::default(),
            },
        }
    }

    pub fn with_capability_requester(mut self, requester: Arc<dyn CapabilityRequester>) -> Self {
        self.deps.capability_requester = Some(requester);
        self
    }

    pub fn with_state_store(mut self, store: Arc<dyn SessionStateStore>) -> Self {
        self.deps.state_store = Some(store);
        self
    }

    pub fn with_timers(mut self, timers: TimerConfig) -> Self {
        self.deps.timers = timers;
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.deps.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Create an originating session toward `remote_contact`
    ///
    /// Returns the session future and a handle to it. The INVITE carries the
    /// locally advertised feature tags and the builder's offer.
    pub fn originate(
        &self,
        media_kind: MediaKind,
        remote_contact: BytesStr,
        offer: Box<dyn OfferBuilder>,
        authenticator: Box<dyn ClientAuthenticator>,
    ) -> (OriginatingSession, SessionHandle) {
        let mut dialog = DialogPath::originating(
            self.local_uri.clone(),
            remote_contact.clone(),
            remote_contact.clone(),
        );

        dialog.session_expires = self.deps.timers.session_expires;

        let dialog_requests = self.deps.transport.register_dialog(&dialog);

        let (inner, pause_rx) = Inner::new(
            dialog.call_id.clone(),
            remote_contact,
            Direction::Originating,
            media_kind,
            SessionState::Init,
            self.deps.registry.clone(),
            self.deps.state_store.clone(),
        );

        let handle = SessionHandle::new(inner.clone());

        let session = OriginatingSession {
            inner,
            dialog,
            deps: self.deps.clone(),
            feature_tags: self.feature_tags(),
            offer,
            authenticator,
            dialog_requests,
            pause_rx,
        };

        (session, handle)
    }

    /// Admit a received INVITE as a terminating session
    ///
    /// Returns the session future and the handle collecting the local user's
    /// accept/reject decision.
    pub fn on_invite(
        &self,
        invite: Request,
        media_kind: MediaKind,
        offer: Box<dyn OfferBuilder>,
    ) -> (TerminatingSession, IncomingSessionHandle) {
        let remote_contact = invite.from.clone();

        let mut dialog = DialogPath::terminating(invite.clone(), self.local_uri.clone());

        dialog.session_expires = self.deps.timers.session_expires;

        let dialog_requests = self.deps.transport.register_dialog(&dialog);

        let (inner, pause_rx) = Inner::new(
            dialog.call_id.clone(),
            remote_contact,
            Direction::Terminating,
            media_kind,
            SessionState::Invited,
            self.deps.registry.clone(),
            self.deps.state_store.clone(),
        );

        let (decision_tx, decision_rx) = oneshot::channel();

        let handle = TerminatingSession::new_handle(&inner, decision_tx);

        let session = TerminatingSession {
            inner,
            dialog,
            invite,
            deps: self.deps.clone(),
            feature_tags: self.feature_tags(),
            offer,
            decision_rx,
            dialog_requests,
            pause_rx,
        };

        (session, handle)
    }

    fn feature_tags(&self) -> Vec<BytesStr> {
        build_local_feature_tags(&self.config)
            .into_iter()
            .map(BytesStr::from)
            .collect()
    }
}
