//! Minimal signaling message model
//!
//! The engine hands these to an already-correct transport collaborator which
//! owns the wire format, so only the parts the session state machines consume
//! are modeled here.

use bytes::Bytes;
use bytesstr::BytesStr;
use std::fmt;

/// Content type of SDP bodies
pub const CONTENT_TYPE_SDP: &str = "application/sdp";

/// Represents a signaling method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Options,
    Update,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Invite => f.write_str("INVITE"),
            Method::Ack => f.write_str("ACK"),
            Method::Bye => f.write_str("BYE"),
            Method::Cancel => f.write_str("CANCEL"),
            Method::Options => f.write_str("OPTIONS"),
            Method::Update => f.write_str("UPDATE"),
        }
    }
}

/// Response status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const TRYING: Self = Self(100);
    pub const RINGING: Self = Self(180);
    pub const OK: Self = Self(200);
    pub const UNAUTHORIZED: Self = Self(401);
    pub const PROXY_AUTHENTICATION_REQUIRED: Self = Self(407);
    pub const REQUEST_TIMEOUT: Self = Self(408);
    pub const BUSY_HERE: Self = Self(486);
    pub const NOT_ACCEPTABLE_HERE: Self = Self(488);
    pub const REQUEST_TERMINATED: Self = Self(487);
    pub const SERVER_INTERNAL_ERROR: Self = Self(500);
    pub const DECLINE: Self = Self(603);

    pub fn into_u16(self) -> u16 {
        self.0
    }

    pub fn kind(self) -> CodeKind {
        match self.0 {
            100..=199 => CodeKind::Provisional,
            200..=299 => CodeKind::Success,
            300..=399 => CodeKind::Redirect,
            400..=499 => CodeKind::RequestFailure,
            500..=599 => CodeKind::ServerFailure,
            _ => CodeKind::GlobalFailure,
        }
    }

    /// Returns if this code challenges the request for authentication
    pub fn is_auth_challenge(self) -> bool {
        matches!(
            self,
            StatusCode::UNAUTHORIZED | StatusCode::PROXY_AUTHENTICATION_REQUIRED
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Provisional,
    Success,
    Redirect,
    RequestFailure,
    ServerFailure,
    GlobalFailure,
}

/// A request within (or creating) a dialog
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,

    /// Request target, the remote contact
    pub uri: BytesStr,

    pub call_id: BytesStr,
    pub from: BytesStr,
    pub from_tag: Option<BytesStr>,
    pub to: BytesStr,
    pub to_tag: Option<BytesStr>,
    pub cseq: u32,

    /// Feature tags advertised with this request, formatted into the Contact
    /// header by the transport
    pub feature_tags: Vec<BytesStr>,

    /// Authorization header value computed after a challenge
    pub authorization: Option<BytesStr>,

    pub content_type: Option<BytesStr>,
    pub body: Bytes,
}

impl Request {
    /// Returns the SDP body, if one is attached
    pub fn sdp_body(&self) -> Option<BytesStr> {
        sdp_body(self.content_type.as_ref(), &self.body)
    }

    pub fn set_sdp_body(&mut self, sdp: impl fmt::Display) {
        self.content_type = Some(BytesStr::from_static(CONTENT_TYPE_SDP));
        self.body = sdp.to_string().into();
    }
}

/// A response to a previously sent request
#[derive(Debug, Clone)]
pub struct Response {
    pub code: StatusCode,
    pub reason: Option<BytesStr>,

    pub call_id: BytesStr,
    pub to_tag: Option<BytesStr>,
    pub cseq: u32,

    pub feature_tags: Vec<BytesStr>,

    /// Authenticate challenge header value on 401/407 responses
    pub challenge: Option<BytesStr>,

    pub content_type: Option<BytesStr>,
    pub body: Bytes,
}

impl Response {
    pub fn sdp_body(&self) -> Option<BytesStr> {
        sdp_body(self.content_type.as_ref(), &self.body)
    }

    pub fn set_sdp_body(&mut self, sdp: impl fmt::Display) {
        self.content_type = Some(BytesStr::from_static(CONTENT_TYPE_SDP));
        self.body = sdp.to_string().into();
    }
}

fn sdp_body(content_type: Option<&BytesStr>, body: &Bytes) -> Option<BytesStr> {
    let content_type = content_type?;

    if &**content_type != CONTENT_TYPE_SDP {
        return None;
    }

    BytesStr::from_utf8_bytes(body.clone()).ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn code_kinds() {
        assert_eq!(StatusCode::RINGING.kind(), CodeKind::Provisional);
        assert_eq!(StatusCode::OK.kind(), CodeKind::Success);
        assert_eq!(StatusCode::BUSY_HERE.kind(), CodeKind::RequestFailure);
        assert_eq!(StatusCode::DECLINE.kind(), CodeKind::GlobalFailure);
        assert!(StatusCode::PROXY_AUTHENTICATION_REQUIRED.is_auth_challenge());
    }
}
