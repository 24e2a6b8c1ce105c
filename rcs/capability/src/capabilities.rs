use crate::sdp::RtpMap;
use bytesstr::BytesStr;
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in milliseconds, the clock used for capability timestamps
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Advertised or inferred service capabilities of a local or remote party
///
/// Produced by [`extract_capabilities`](crate::extract_capabilities) for one
/// exchange and not modified afterwards, except for the two timestamps which
/// never decrease.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub chat: bool,
    pub file_transfer: bool,
    pub file_transfer_http: bool,
    pub file_transfer_thumbnail: bool,
    pub file_transfer_store_forward: bool,
    pub image_share: bool,
    pub video_share: bool,
    pub ip_voice_call: bool,
    pub ip_video_call: bool,
    pub presence_discovery: bool,
    pub social_presence: bool,
    pub geolocation_push: bool,

    /// Service ids of supported RCS extensions, ordered
    pub extensions: BTreeSet<BytesStr>,

    timestamp_of_last_refresh: u64,
    timestamp_of_last_request: u64,
}

impl Capabilities {
    /// When the capabilities of this party were last refreshed from the network
    pub fn timestamp_of_last_refresh(&self) -> u64 {
        self.timestamp_of_last_refresh
    }

    /// When a capability request for this party was last issued
    pub fn timestamp_of_last_request(&self) -> u64 {
        self.timestamp_of_last_request
    }

    /// Stamp the refresh timestamp, keeping it monotonically non-decreasing
    pub fn stamp_refresh(&mut self, now_ms: u64) {
        self.timestamp_of_last_refresh = self.timestamp_of_last_refresh.max(now_ms);
    }

    /// Stamp the request timestamp, keeping it monotonically non-decreasing
    pub fn stamp_request(&mut self, now_ms: u64) {
        self.timestamp_of_last_request = self.timestamp_of_last_request.max(now_ms);
    }
}

/// Read-only snapshot of the locally provisioned services and media support,
/// consulted once per negotiation
///
/// Passed explicitly to every builder/parser, there is no global settings
/// access.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub chat: bool,
    pub file_transfer: bool,
    pub file_transfer_http: bool,
    pub file_transfer_thumbnail: bool,
    pub file_transfer_store_forward: bool,
    pub image_share: bool,
    pub video_share: bool,
    pub ip_voice_call: bool,
    pub ip_video_call: bool,
    pub presence_discovery: bool,
    pub social_presence: bool,
    pub geolocation_push: bool,

    /// Master switch for offering rich media in capability SDP fragments
    pub rich_media: bool,

    /// Service ids of locally enabled RCS extensions
    pub extensions: BTreeSet<BytesStr>,

    /// Video codecs supported by the local media stack
    pub video_codecs: Vec<RtpMap>,

    /// Mime types accepted for image sharing
    pub image_mime_types: Vec<BytesStr>,

    /// Mime types accepted for geolocation push
    pub geoloc_mime_types: Vec<BytesStr>,

    /// Upper bound for shared content, in bytes. 0 means unlimited.
    pub max_content_size: u64,
}

impl ServiceConfig {
    /// Returns if the given video codec name is locally supported
    pub fn supports_video_codec(&self, encoding: &str) -> bool {
        self.video_codecs
            .iter()
            .any(|codec| codec.encoding.eq_ignore_ascii_case(encoding))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn timestamps_never_decrease() {
        let mut caps = Capabilities::default();

        caps.stamp_refresh(1000);
        caps.stamp_request(1000);
        caps.stamp_refresh(500);
        caps.stamp_request(999);

        assert_eq!(caps.timestamp_of_last_refresh(), 1000);
        assert_eq!(caps.timestamp_of_last_request(), 1000);

        caps.stamp_refresh(1001);
        assert_eq!(caps.timestamp_of_last_refresh(), 1001);
    }
}
