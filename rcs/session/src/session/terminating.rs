use super::{
    bye_on_setup_failure, fail_session, EstablishedSession, Inner, PauseCommand, SessionError,
    SessionEvent, SessionHandle, SessionState, TerminationReason,
};
use crate::dialog::DialogPath;
use crate::engine::{OfferBuilder, SessionDeps};
use crate::media::MediaBinder;
use crate::msg::{Method, Request, StatusCode};
use bytesstr::BytesStr;
use capability::sdp::SessionDescription;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

pub(crate) enum LocalDecision {
    Accept,
    Reject,
}

/// Handle to a received session awaiting the local user's decision
pub struct IncomingSessionHandle {
    session: SessionHandle,
    decision: Mutex<Option<oneshot::Sender<LocalDecision>>>,
}

impl IncomingSessionHandle {
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Accept the session, answering its offer
    pub fn accept(&self) {
        if let Some(tx) = self.decision.lock().take() {
            let _ = tx.send(LocalDecision::Accept);
        }
    }

    /// Decline the session
    pub fn reject(&self) {
        if let Some(tx) = self.decision.lock().take() {
            let _ = tx.send(LocalDecision::Reject);
        }
    }
}

/// A received session that has not been answered yet
///
/// Created by [`SessionEngine::on_invite`](crate::SessionEngine::on_invite),
/// [`run`](TerminatingSession::run) drives it to completion while the paired
/// [`IncomingSessionHandle`] collects the user's decision.
pub struct TerminatingSession {
    pub(crate) inner: Arc<Inner>,
    pub(crate) dialog: DialogPath,
    pub(crate) invite: Request,
    pub(crate) deps: SessionDeps,
    pub(crate) feature_tags: Vec<BytesStr>,
    pub(crate) offer: Box<dyn OfferBuilder>,
    pub(crate) decision_rx: oneshot::Receiver<LocalDecision>,
    pub(crate) dialog_requests: mpsc::Receiver<Request>,
    pub(crate) pause_rx: mpsc::UnboundedReceiver<PauseCommand>,
}

enum Outcome {
    Accepted,
    RejectedByUser,
    Timeout,
    Canceled(Request),
    TransportLost,
}

impl TerminatingSession {
    pub(crate) fn new_handle(
        inner: &Arc<Inner>,
        decision_tx: oneshot::Sender<LocalDecision>,
    ) -> IncomingSessionHandle {
        IncomingSessionHandle {
            session: SessionHandle::new(inner.clone()),
            decision: Mutex::new(Some(decision_tx)),
        }
    }

    /// Drive the session from the received INVITE to its terminal state
    pub async fn run(mut self) {
        if let Err(e) = self.ring().await {
            fail_session(&self.inner, None, e).await;
            return;
        }

        match self.await_decision().await {
            Outcome::Accepted => {
                let inner = self.inner.clone();

                match self.accept().await {
                    Ok(established) => established.process().await,
                    Err(e) => fail_session(&inner, None, e).await,
                }
            }
            Outcome::RejectedByUser => {
                self.answer_invite(StatusCode::DECLINE).await;

                self.inner.finish(
                    SessionState::RejectedByUser,
                    SessionEvent::Terminated(TerminationReason::RejectedByUser),
                );
            }
            Outcome::Timeout => {
                // busy-equivalent answer, the user never reacted
                self.answer_invite(StatusCode::BUSY_HERE).await;

                self.inner.finish(
                    SessionState::Timeout,
                    SessionEvent::Terminated(TerminationReason::NoAnswer),
                );
            }
            Outcome::Canceled(cancel) => {
                let response = self.dialog.create_response(&cancel, StatusCode::OK, None);

                if let Err(e) = self.deps.transport.send_response(response).await {
                    log::warn!("failed to respond to CANCEL, {e}");
                }

                self.answer_invite(StatusCode::REQUEST_TERMINATED).await;

                // a canceled invitation may reflect a changed capability set
                if let Some(requester) = &self.deps.capability_requester {
                    requester
                        .request_capabilities(&self.inner.remote_contact)
                        .await;
                }

                self.inner.finish(
                    SessionState::Canceled,
                    SessionEvent::Terminated(TerminationReason::CanceledByRemote),
                );
            }
            Outcome::TransportLost => {
                fail_session(
                    &self.inner,
                    None,
                    SessionError::Transport(crate::transport::TransportError::Closed),
                )
                .await;
            }
        }
    }

    /// Signal alerting to the peer
    async fn ring(&mut self) -> Result<(), SessionError> {
        let mut ringing = self
            .dialog
            .create_response(&self.invite, StatusCode::RINGING, None);

        ringing.feature_tags = self.feature_tags.clone();

        self.deps.transport.send_response(ringing).await?;

        self.inner.set_state(SessionState::RingingSent);

        Ok(())
    }

    /// Wait for whichever comes first: the user's decision, the ringing
    /// timeout or a CANCEL from the peer
    async fn await_decision(&mut self) -> Outcome {
        let timeout = sleep(self.deps.timers.ringing_timeout);
        tokio::pin!(timeout);

        loop {
            let outcome = select! {
                decision = &mut self.decision_rx => match decision {
                    Ok(LocalDecision::Accept) => Outcome::Accepted,
                    // a dropped handle counts as a rejection
                    Ok(LocalDecision::Reject) | Err(_) => Outcome::RejectedByUser,
                },
                _ = &mut timeout => Outcome::Timeout,
                request = self.dialog_requests.recv() => match request {
                    Some(request) if request.method == Method::Cancel => {
                        Outcome::Canceled(request)
                    }
                    Some(request) => {
                        log::debug!(
                            "ignoring in-dialog {} while ringing in session {}",
                            request.method,
                            self.inner.id
                        );
                        continue;
                    }
                    None => Outcome::TransportLost,
                },
            };

            return outcome;
        }
    }

    /// Answer the offer and establish the session
    async fn accept(mut self) -> Result<EstablishedSession, SessionError> {
        self.inner.set_state(SessionState::Accepted);
        self.inner.set_state(SessionState::MediaNegotiating);

        let (remote, answer) = match self.negotiate() {
            Ok(negotiated) => negotiated,
            Err(e) => {
                self.answer_invite(StatusCode::NOT_ACCEPTABLE_HERE).await;
                return Err(e);
            }
        };

        self.dialog.local_sdp = Some(answer.to_string().into());

        let mut ok = self
            .dialog
            .create_response(&self.invite, StatusCode::OK, None);

        ok.feature_tags = self.feature_tags.clone();
        ok.set_sdp_body(&answer);

        self.deps.transport.send_response(ok).await?;

        self.await_ack().await?;

        let mut binder = match MediaBinder::bind(&*self.deps.media_factory, &remote) {
            Ok(binder) => binder,
            Err(e) => {
                bye_on_setup_failure(&mut self.dialog, &self.deps).await;
                return Err(e.into());
            }
        };

        if let Err(e) = binder.start().await {
            binder.close().await;
            bye_on_setup_failure(&mut self.dialog, &self.deps).await;
            return Err(e.into());
        }

        self.inner.set_state(SessionState::Established);
        self.inner.emit(&SessionEvent::Established);

        Ok(EstablishedSession {
            inner: self.inner,
            dialog: self.dialog,
            deps: self.deps,
            binder,
            dialog_requests: self.dialog_requests,
            pause_rx: self.pause_rx,
        })
    }

    fn negotiate(&mut self) -> Result<(SessionDescription, SessionDescription), SessionError> {
        let raw = self
            .dialog
            .remote_sdp
            .clone()
            .ok_or(SessionError::MissingRemoteSdp)?;

        let remote = SessionDescription::parse(&raw).map_err(SessionError::InvalidRemoteSdp)?;

        let answer = self.offer.build_answer(&remote)?;

        Ok((remote, answer))
    }

    async fn await_ack(&mut self) -> Result<(), SessionError> {
        let deadline = sleep(self.deps.timers.ack_timeout);
        tokio::pin!(deadline);

        loop {
            select! {
                _ = &mut deadline => return Err(SessionError::MissingAck),
                request = self.dialog_requests.recv() => match request {
                    Some(request) if request.method == Method::Ack => return Ok(()),
                    Some(request) => log::debug!(
                        "ignoring in-dialog {} while waiting for ACK",
                        request.method
                    ),
                    None => return Err(crate::transport::TransportError::Closed.into()),
                },
            }
        }
    }

    /// Send the final answer to the stored INVITE
    async fn answer_invite(&mut self, code: StatusCode) {
        let response = self.dialog.create_response(&self.invite, code, None);

        if let Err(e) = self.deps.transport.send_response(response).await {
            log::warn!(
                "failed to answer INVITE in session {} with {}, {e}",
                self.inner.id,
                code.into_u16()
            );
        }
    }
}
