//! Digest authentication for challenged requests
//!
//! The engine owns the retry policy (one transparent retry per session), this
//! module only computes the authorization header for a challenge.

use crate::msg::{Request, Response};
use crate::util::random_string;
use bytesstr::BytesStr;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("response contained no digest challenge")]
    MissingChallenge,
    #[error("encountered unsupported algorithm {0}")]
    UnsupportedAlgorithm(BytesStr),
    #[error("missing credentials for realm {0}")]
    MissingCredentials(BytesStr),
    #[error("no credentials configured")]
    NoCredentials,
}

/// Request authenticator
pub trait ClientAuthenticator: Send {
    /// Modify a request to add the required authorization
    ///
    /// Does nothing before a rejection has been handled.
    fn authorize_request(&mut self, request: &mut Request);

    /// Handle a challenge response
    ///
    /// Must return an error when no more requests should be sent.
    fn handle_rejection(&mut self, request: &Request, response: &Response)
    -> Result<(), AuthError>;
}

/// Authenticator for deployments without credentials, fails on any challenge
#[derive(Debug, Default)]
pub struct NoAuthentication;

impl ClientAuthenticator for NoAuthentication {
    fn authorize_request(&mut self, _request: &mut Request) {}

    fn handle_rejection(
        &mut self,
        _request: &Request,
        _response: &Response,
    ) -> Result<(), AuthError> {
        Err(AuthError::NoCredentials)
    }
}

#[derive(Clone)]
pub struct DigestUser {
    user: String,
    password: Vec<u8>,
}

impl DigestUser {
    pub fn new<U, P>(user: U, password: P) -> Self
    where
        U: Into<String>,
        P: Into<Vec<u8>>,
    {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// Credentials mapped to their respective realm
///
/// Default credentials can be set to attempt authentication for unknown
/// realms.
#[derive(Default, Clone)]
pub struct DigestCredentials {
    default: Option<DigestUser>,
    map: HashMap<String, DigestUser>,
}

impl DigestCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set default `credentials` to authenticate on unknown realms
    pub fn set_default(&mut self, credentials: DigestUser) {
        self.default = Some(credentials)
    }

    /// Add `credentials` that will be used when authenticating for `realm`
    pub fn add_for_realm<R>(&mut self, realm: R, credentials: DigestUser)
    where
        R: Into<String>,
    {
        self.map.insert(realm.into(), credentials);
    }

    fn get_for_realm(&self, realm: &str) -> Option<&DigestUser> {
        self.map.get(realm).or(self.default.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Sha256,
}

/// A parsed `Digest` challenge
#[derive(Debug, Clone)]
struct DigestChallenge {
    realm: BytesStr,
    nonce: BytesStr,
    opaque: Option<BytesStr>,
    algorithm: Option<BytesStr>,
    qop_auth: bool,
}

impl DigestChallenge {
    fn parse(header: &str) -> Option<Self> {
        let header = header.trim();

        if header.len() < 6 || !header[..6].eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut challenge = DigestChallenge {
            realm: BytesStr::from_static(""),
            nonce: BytesStr::from_static(""),
            opaque: None,
            algorithm: None,
            qop_auth: false,
        };

        for param in header[6..].split(',') {
            let Some((key, value)) = param.split_once('=') else {
                continue;
            };

            let value = strip_quotes(value.trim());

            match key.trim().to_ascii_lowercase().as_str() {
                "realm" => challenge.realm = value.into(),
                "nonce" => challenge.nonce = value.into(),
                "opaque" => challenge.opaque = Some(value.into()),
                "algorithm" => challenge.algorithm = Some(value.into()),
                "qop" => {
                    challenge.qop_auth = value.split(',').any(|qop| qop.trim() == "auth");
                }
                _ => {}
            }
        }

        if challenge.nonce.is_empty() {
            return None;
        }

        Some(challenge)
    }
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Solves digest challenges in 401/407 responses
pub struct DigestAuthenticator {
    pub credentials: DigestCredentials,
    authorization: Option<BytesStr>,
}

impl DigestAuthenticator {
    pub fn new(credentials: DigestCredentials) -> Self {
        Self {
            credentials,
            authorization: None,
        }
    }

    fn compute(&self, challenge: &DigestChallenge, request: &Request) -> Result<BytesStr, AuthError> {
        let algorithm = match challenge.algorithm.as_deref() {
            None => Algorithm::Md5,
            Some(name) if name.eq_ignore_ascii_case("md5") => Algorithm::Md5,
            Some(name) if name.eq_ignore_ascii_case("sha-256") => Algorithm::Sha256,
            Some(name) => {
                return Err(AuthError::UnsupportedAlgorithm(BytesStr::from(name)));
            }
        };

        let user = self
            .credentials
            .get_for_realm(&challenge.realm)
            .ok_or_else(|| AuthError::MissingCredentials(challenge.realm.clone()))?;

        let ha1 = {
            let mut input = Vec::new();
            input.extend_from_slice(user.user.as_bytes());
            input.push(b':');
            input.extend_from_slice(challenge.realm.as_bytes());
            input.push(b':');
            input.extend_from_slice(&user.password);
            hash(algorithm, &input)
        };

        let ha2 = hash(
            algorithm,
            format!("{}:{}", request.method, request.uri).as_bytes(),
        );

        let mut cnonce = None;

        let response = if challenge.qop_auth {
            let cnonce = cnonce.insert(random_string());

            hash(
                algorithm,
                format!("{ha1}:{}:00000001:{cnonce}:auth:{ha2}", challenge.nonce).as_bytes(),
            )
        } else {
            hash(
                algorithm,
                format!("{ha1}:{}:{ha2}", challenge.nonce).as_bytes(),
            )
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{response}\"",
            user.user, challenge.realm, challenge.nonce, request.uri
        );

        match algorithm {
            Algorithm::Md5 => header.push_str(", algorithm=MD5"),
            Algorithm::Sha256 => header.push_str(", algorithm=SHA-256"),
        }

        if let Some(cnonce) = cnonce {
            header.push_str(&format!(", cnonce=\"{cnonce}\", qop=auth, nc=00000001"));
        }

        if let Some(opaque) = &challenge.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }

        Ok(header.into())
    }
}

impl ClientAuthenticator for DigestAuthenticator {
    fn authorize_request(&mut self, request: &mut Request) {
        if let Some(authorization) = &self.authorization {
            request.authorization = Some(authorization.clone());
        }
    }

    fn handle_rejection(
        &mut self,
        request: &Request,
        response: &Response,
    ) -> Result<(), AuthError> {
        let challenge = response
            .challenge
            .as_ref()
            .and_then(|header| DigestChallenge::parse(header))
            .ok_or(AuthError::MissingChallenge)?;

        self.authorization = Some(self.compute(&challenge, request)?);

        Ok(())
    }
}

fn hash(algorithm: Algorithm, input: &[u8]) -> String {
    match algorithm {
        Algorithm::Md5 => format!("{:x}", md5::compute(input)),
        Algorithm::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(input);
            hasher
                .finalize()
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect()
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::msg::{Method, StatusCode};
    use bytes::Bytes;

    fn request() -> Request {
        Request {
            method: Method::Invite,
            uri: "sip:bob@example.com".into(),
            call_id: "call-1".into(),
            from: "sip:alice@example.com".into(),
            from_tag: Some("ft".into()),
            to: "sip:bob@example.com".into(),
            to_tag: None,
            cseq: 1,
            feature_tags: vec![],
            authorization: None,
            content_type: None,
            body: Bytes::new(),
        }
    }

    fn challenge_response(challenge: &str) -> Response {
        Response {
            code: StatusCode::PROXY_AUTHENTICATION_REQUIRED,
            reason: None,
            call_id: "call-1".into(),
            to_tag: None,
            cseq: 1,
            feature_tags: vec![],
            challenge: Some(challenge.into()),
            content_type: None,
            body: Bytes::new(),
        }
    }

    #[test]
    fn challenge_parse() {
        let challenge = DigestChallenge::parse(
            "Digest realm=\"ims.example.com\", nonce=\"abc\", algorithm=MD5, qop=\"auth\"",
        )
        .unwrap();

        assert_eq!(challenge.realm, "ims.example.com");
        assert_eq!(challenge.nonce, "abc");
        assert!(challenge.qop_auth);
    }

    #[test]
    fn authorizes_after_rejection() {
        let mut credentials = DigestCredentials::new();
        credentials.set_default(DigestUser::new("alice", "secret"));

        let mut authenticator = DigestAuthenticator::new(credentials);

        let mut request = request();
        authenticator.authorize_request(&mut request);
        assert!(request.authorization.is_none());

        let response = challenge_response("Digest realm=\"ims.example.com\", nonce=\"abc\"");
        authenticator.handle_rejection(&request, &response).unwrap();

        authenticator.authorize_request(&mut request);
        let header = request.authorization.unwrap();
        assert!(header.starts_with("Digest username=\"alice\""));
        assert!(header.contains("nonce=\"abc\""));
        assert!(header.contains("response=\""));
    }

    #[test]
    fn missing_challenge_is_an_error() {
        let mut authenticator = DigestAuthenticator::new(DigestCredentials::new());

        let response = Response {
            challenge: None,
            ..challenge_response("")
        };

        assert!(matches!(
            authenticator.handle_rejection(&request(), &response),
            Err(AuthError::MissingChallenge)
        ));
    }
}
