use super::{
    fail_session, Inner, PauseCommand, SessionError, SessionEvent, SessionState,
    TerminationReason,
};
use crate::dialog::DialogPath;
use crate::engine::SessionDeps;
use crate::media::{MediaBinder, MediaError, MediaTransportEvent};
use crate::msg::{Method, Request, StatusCode};
use crate::transport::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// The shared established phase of both session directions
pub(crate) struct EstablishedSession {
    pub(crate) inner: Arc<Inner>,
    pub(crate) dialog: DialogPath,
    pub(crate) deps: SessionDeps,
    pub(crate) binder: MediaBinder,
    pub(crate) dialog_requests: mpsc::Receiver<Request>,
    pub(crate) pause_rx: mpsc::UnboundedReceiver<PauseCommand>,
}

enum Wake {
    TerminateLocal,
    Expired,
    Dialog(Option<Request>),
    Media(Option<MediaTransportEvent>),
    Pause(PauseCommand),
}

impl EstablishedSession {
    /// Run the session until it terminates
    pub(crate) async fn process(mut self) {
        let expiry = expiry_timer(self.dialog.session_expires);
        tokio::pin!(expiry);

        // stop polling media once the transfer completed, the transport
        // closing its channel is not an error then
        let mut media_done = false;

        loop {
            let wake = select! {
                _ = self.inner.terminate.notified() => Wake::TerminateLocal,
                _ = &mut expiry => Wake::Expired,
                request = self.dialog_requests.recv() => Wake::Dialog(request),
                event = self.binder.next_event(), if !media_done => Wake::Media(event),
                command = self.pause_rx.recv() => match command {
                    Some(command) => Wake::Pause(command),
                    // every handle is gone, nobody can pause anymore
                    None => continue,
                },
            };

            match wake {
                Wake::TerminateLocal => {
                    self.send_bye(SessionState::Terminated, TerminationReason::ByLocalUser)
                        .await;
                    return;
                }
                Wake::Expired => {
                    self.send_bye(SessionState::Terminated, TerminationReason::Expired)
                        .await;
                    return;
                }
                Wake::Dialog(Some(request)) if request.method == Method::Bye => {
                    self.remote_bye(request).await;
                    return;
                }
                Wake::Dialog(Some(request)) => {
                    log::debug!(
                        "unexpected in-dialog {} in session {}, answering 200",
                        request.method,
                        self.inner.id
                    );

                    let response = self.dialog.create_response(&request, StatusCode::OK, None);

                    if let Err(e) = self.deps.transport.send_response(response).await {
                        log::warn!("failed to respond to in-dialog request, {e}");
                    }
                }
                Wake::Dialog(None) => {
                    fail_session(
                        &self.inner,
                        Some(&mut self.binder),
                        SessionError::Transport(TransportError::Closed),
                    )
                    .await;
                    return;
                }
                Wake::Media(Some(event)) => {
                    if self.media_event(event, &mut media_done).await {
                        return;
                    }
                }
                Wake::Media(None) => {
                    fail_session(
                        &self.inner,
                        Some(&mut self.binder),
                        SessionError::Media(MediaError::Transport(
                            "transport closed before the transfer completed".into(),
                        )),
                    )
                    .await;
                    return;
                }
                Wake::Pause(PauseCommand::Pause(origin)) => {
                    self.binder.pause(origin);
                    self.inner.emit(&SessionEvent::Paused(origin));
                }
                Wake::Pause(PauseCommand::Resume) => {
                    if self.binder.resume().is_some() {
                        self.inner.emit(&SessionEvent::Resumed);
                    }
                }
            }
        }
    }

    /// Map a media transport event to listener events
    ///
    /// Returns true when the session terminated.
    async fn media_event(&mut self, event: MediaTransportEvent, media_done: &mut bool) -> bool {
        match event {
            MediaTransportEvent::Progress { current, total } => {
                self.inner.emit(&SessionEvent::Progress { current, total });
            }
            MediaTransportEvent::DataReceived(data) => {
                self.inner.emit(&SessionEvent::DataReceived(data));
            }
            MediaTransportEvent::TransferComplete => {
                *media_done = true;
                self.inner.emit(&SessionEvent::TransferComplete);
            }
            MediaTransportEvent::TransferAborted => {
                self.inner.emit(&SessionEvent::TransferAborted);

                fail_session(
                    &self.inner,
                    Some(&mut self.binder),
                    SessionError::Media(MediaError::Transport(
                        "transport aborted the transfer".into(),
                    )),
                )
                .await;

                return true;
            }
            MediaTransportEvent::Error(e) => {
                fail_session(&self.inner, Some(&mut self.binder), e.into()).await;
                return true;
            }
        }

        false
    }

    async fn send_bye(&mut self, state: SessionState, reason: TerminationReason) {
        self.inner.set_state(SessionState::Terminating);

        self.binder.close().await;

        let bye = self.dialog.create_request(Method::Bye);

        match self
            .deps
            .transport
            .send_and_wait(bye, self.deps.timers.bye_timeout)
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => log::debug!("no response to BYE in session {}", self.inner.id),
            Err(e) => log::warn!("failed to send BYE in session {}, {e}", self.inner.id),
        }

        self.inner.finish(state, SessionEvent::Terminated(reason));
    }

    async fn remote_bye(&mut self, bye: Request) {
        // the peer dropping the session may reflect a changed capability set
        if let Some(requester) = &self.deps.capability_requester {
            requester
                .request_capabilities(&self.inner.remote_contact)
                .await;
        }

        let response = self.dialog.create_response(&bye, StatusCode::OK, None);

        if let Err(e) = self.deps.transport.send_response(response).await {
            log::warn!("failed to respond to BYE in session {}, {e}", self.inner.id);
        }

        self.binder.close().await;

        self.inner.finish(
            SessionState::Terminated,
            SessionEvent::Terminated(TerminationReason::ByRemote),
        );
    }
}

async fn expiry_timer(expires: Option<Duration>) {
    match expires {
        Some(duration) => sleep(duration).await,
        None => std::future::pending().await,
    }
}
