use crate::msg::{Method, Request, Response, StatusCode};
use crate::util::{random_sequence_number, random_string};
use bytes::Bytes;
use bytesstr::BytesStr;
use std::time::Duration;

/// The mutable signaling state of one session
///
/// Exclusively owned by the session driving it, never shared across sessions.
#[derive(Debug)]
pub struct DialogPath {
    pub call_id: BytesStr,
    pub local_tag: BytesStr,
    pub remote_tag: Option<BytesStr>,

    pub local_uri: BytesStr,
    pub remote_uri: BytesStr,

    /// The remote contact requests are routed to
    pub target: BytesStr,

    cseq: u32,

    /// SDP this side sent for the current offer/answer exchange
    pub local_sdp: Option<BytesStr>,

    /// SDP received from the peer
    pub remote_sdp: Option<BytesStr>,

    /// Negotiated session expiry, sessions without a refresh terminate after
    pub session_expires: Option<Duration>,

    /// The INVITE that created this dialog, kept for responses and
    /// authentication retries
    pub invite: Option<Request>,
}

impl DialogPath {
    /// Create the dialog of an originating session
    pub fn originating(local_uri: BytesStr, remote_uri: BytesStr, target: BytesStr) -> Self {
        Self {
            call_id: random_string(),
            local_tag: random_string(),
            remote_tag: None,
            local_uri,
            remote_uri,
            target,
            cseq: random_sequence_number(),
            local_sdp: None,
            remote_sdp: None,
            session_expires: None,
            invite: None,
        }
    }

    /// Create the dialog of a terminating session from the received INVITE
    pub fn terminating(invite: Request, local_uri: BytesStr) -> Self {
        Self {
            call_id: invite.call_id.clone(),
            local_tag: random_string(),
            remote_tag: invite.from_tag.clone(),
            local_uri,
            remote_uri: invite.from.clone(),
            target: invite.from.clone(),
            cseq: random_sequence_number(),
            local_sdp: None,
            remote_sdp: invite.sdp_body(),
            session_expires: None,
            invite: Some(invite),
        }
    }

    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    /// Create a new request within this dialog
    ///
    /// Increments the sequence counter, except for ACK and CANCEL which
    /// belong to the transaction of the request they acknowledge or cancel.
    pub fn create_request(&mut self, method: Method) -> Request {
        if !matches!(method, Method::Ack | Method::Cancel) {
            self.cseq += 1;
        }

        Request {
            method,
            uri: self.target.clone(),
            call_id: self.call_id.clone(),
            from: self.local_uri.clone(),
            from_tag: Some(self.local_tag.clone()),
            to: self.remote_uri.clone(),
            to_tag: self.remote_tag.clone(),
            cseq: self.cseq,
            feature_tags: vec![],
            authorization: None,
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// Create a response to a request received within this dialog
    pub fn create_response(
        &self,
        request: &Request,
        code: StatusCode,
        reason: Option<BytesStr>,
    ) -> Response {
        Response {
            code,
            reason,
            call_id: self.call_id.clone(),
            to_tag: Some(self.local_tag.clone()),
            cseq: request.cseq,
            feature_tags: vec![],
            challenge: None,
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// Learn the peer tag from the first dialog-building response
    ///
    /// The tag is only set once, later responses cannot re-target the dialog.
    pub fn establish(&mut self, remote_tag: BytesStr) {
        if self.remote_tag.is_none() {
            self.remote_tag = Some(remote_tag);
        }
    }

    /// Returns if the dialog has seen both tags
    pub fn is_established(&self) -> bool {
        self.remote_tag.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dialog() -> DialogPath {
        DialogPath::originating(
            "sip:alice@example.com".into(),
            "sip:bob@example.com".into(),
            "sip:bob@192.0.2.5".into(),
        )
    }

    #[test]
    fn cseq_increments_except_ack_and_cancel() {
        let mut dialog = dialog();
        let start = dialog.cseq();

        let invite = dialog.create_request(Method::Invite);
        assert_eq!(invite.cseq, start + 1);

        let ack = dialog.create_request(Method::Ack);
        assert_eq!(ack.cseq, start + 1);

        let cancel = dialog.create_request(Method::Cancel);
        assert_eq!(cancel.cseq, start + 1);

        let bye = dialog.create_request(Method::Bye);
        assert_eq!(bye.cseq, start + 2);
    }

    #[test]
    fn remote_tag_is_set_once() {
        let mut dialog = dialog();

        dialog.establish("tag-a".into());
        dialog.establish("tag-b".into());

        assert_eq!(dialog.remote_tag.clone().unwrap(), "tag-a");
        assert!(dialog.is_established());
    }
}
