use super::{
    bye_on_setup_failure, fail_session, EstablishedSession, Inner, PauseCommand, SessionError,
    SessionEvent, SessionState, TerminationReason,
};
use crate::auth::ClientAuthenticator;
use crate::dialog::DialogPath;
use crate::engine::{OfferBuilder, SessionDeps};
use crate::media::MediaBinder;
use crate::msg::{CodeKind, Method, Request, StatusCode};
use bytesstr::BytesStr;
use capability::sdp::SessionDescription;
use std::sync::Arc;
use tokio::select;
use tokio::sync::mpsc;

/// An outgoing session that has not been established yet
///
/// Created by [`SessionEngine::originate`](crate::SessionEngine::originate),
/// [`run`](OriginatingSession::run) drives it to completion.
pub struct OriginatingSession {
    pub(crate) inner: Arc<Inner>,
    pub(crate) dialog: DialogPath,
    pub(crate) deps: SessionDeps,
    pub(crate) feature_tags: Vec<BytesStr>,
    pub(crate) offer: Box<dyn OfferBuilder>,
    pub(crate) authenticator: Box<dyn ClientAuthenticator>,
    pub(crate) dialog_requests: mpsc::Receiver<Request>,
    pub(crate) pause_rx: mpsc::UnboundedReceiver<PauseCommand>,
}

impl OriginatingSession {
    /// Drive the session from INVITE to its terminal state
    ///
    /// Resolves once the session is over, one way or another.
    pub async fn run(mut self) {
        match self.invite().await {
            Ok(Some(binder)) => {
                EstablishedSession {
                    inner: self.inner,
                    dialog: self.dialog,
                    deps: self.deps,
                    binder,
                    dialog_requests: self.dialog_requests,
                    pause_rx: self.pause_rx,
                }
                .process()
                .await;
            }
            Ok(None) => {}
            Err(e) => fail_session(&self.inner, None, e).await,
        }
    }

    /// Run the INVITE exchange
    ///
    /// Returns the bound media on success, `None` when the session reached a
    /// non-error terminal state along the way.
    async fn invite(&mut self) -> Result<Option<MediaBinder>, SessionError> {
        let offer = self.offer.build_offer();
        self.dialog.local_sdp = Some(offer.to_string().into());

        let mut invite = self.create_invite(&offer);

        self.inner.set_state(SessionState::InviteSent);

        let mut responses = self
            .deps
            .transport
            .send_invite(invite.clone(), self.deps.timers.invite_timeout)
            .await?;

        // at most one transparent re-attempt after an auth challenge
        let mut challenged = false;

        loop {
            let response = select! {
                _ = self.inner.cancel.notified() => {
                    let cancel = self.dialog.create_request(Method::Cancel);

                    if let Err(e) = self.deps.transport.send(cancel).await {
                        log::warn!("failed to send CANCEL, {e}");
                    }

                    self.inner.finish(
                        SessionState::Canceled,
                        SessionEvent::Terminated(TerminationReason::CanceledByLocal),
                    );

                    return Ok(None);
                }
                response = responses.recv() => response,
            };

            let Some(response) = response else {
                self.inner.finish(
                    SessionState::Timeout,
                    SessionEvent::Terminated(TerminationReason::NoAnswer),
                );

                return Ok(None);
            };

            if response.code.is_auth_challenge() {
                if challenged {
                    return Err(SessionError::RepeatedChallenge);
                }

                challenged = true;

                self.inner.set_state(SessionState::AuthChallenged);
                self.authenticator.handle_rejection(&invite, &response)?;

                invite = self.create_invite(&offer);

                self.inner.set_state(SessionState::InviteSent);

                responses = self
                    .deps
                    .transport
                    .send_invite(invite.clone(), self.deps.timers.invite_timeout)
                    .await?;

                continue;
            }

            match response.code.kind() {
                CodeKind::Provisional => {
                    if response.code == StatusCode::RINGING {
                        self.inner.emit(&SessionEvent::Ringing);
                    }
                }
                CodeKind::Success => {
                    if let Some(to_tag) = &response.to_tag {
                        self.dialog.establish(to_tag.clone());
                    }

                    self.dialog.remote_sdp = response.sdp_body();

                    let ack = self.dialog.create_request(Method::Ack);
                    self.deps.transport.send(ack).await?;

                    self.inner.set_state(SessionState::Accepted);

                    let binder = match self.bind_media().await {
                        Ok(binder) => binder,
                        Err(e) => {
                            bye_on_setup_failure(&mut self.dialog, &self.deps).await;
                            return Err(e);
                        }
                    };

                    self.inner.set_state(SessionState::Established);
                    self.inner.emit(&SessionEvent::Established);

                    return Ok(Some(binder));
                }
                _ => {
                    self.inner.finish(
                        SessionState::Rejected,
                        SessionEvent::Terminated(TerminationReason::RejectedByPeer),
                    );

                    return Ok(None);
                }
            }
        }
    }

    fn create_invite(&mut self, offer: &SessionDescription) -> Request {
        let mut invite = self.dialog.create_request(Method::Invite);

        invite.feature_tags = self.feature_tags.clone();
        invite.set_sdp_body(offer);
        self.authenticator.authorize_request(&mut invite);

        invite
    }

    async fn bind_media(&mut self) -> Result<MediaBinder, SessionError> {
        self.inner.set_state(SessionState::MediaNegotiating);

        let raw = self
            .dialog
            .remote_sdp
            .clone()
            .ok_or(SessionError::MissingRemoteSdp)?;

        let remote = SessionDescription::parse(&raw).map_err(SessionError::InvalidRemoteSdp)?;

        let mut binder = MediaBinder::bind(&*self.deps.media_factory, &remote)?;

        if let Err(e) = binder.start().await {
            binder.close().await;
            return Err(e.into());
        }

        Ok(binder)
    }
}
