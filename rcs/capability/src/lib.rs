//! # RCS capability model
//!
//! Builds the local feature-tag set and SDP capability fragments that are
//! advertised during session setup, and parses the same out of inbound
//! messages into a [`Capabilities`] value.
//!
//! Notable types are
//!
//! - [`Capabilities`] the service flags advertised or inferred for one party
//! - [`ServiceConfig`] the read-only snapshot of locally enabled services
//! - [`sdp::SessionDescription`] the SDP subset consumed during negotiation

mod capabilities;
mod feature_tags;
pub mod sdp;

pub use capabilities::{Capabilities, ServiceConfig, now_ms};
pub use feature_tags::{
    EXTENSION_PREFIX, IARI_CHAT, IARI_FILE_TRANSFER, IARI_FILE_TRANSFER_HTTP,
    IARI_FILE_TRANSFER_STORE_FORWARD, IARI_FILE_TRANSFER_THUMBNAIL, IARI_GEOLOCATION_PUSH,
    IARI_IMAGE_SHARE, IARI_PRESENCE_DISCOVERY, IARI_SOCIAL_PRESENCE, ICSI_MMTEL, NAMESPACE_IARI,
    NAMESPACE_ICSI, TAG_IP_VIDEO_CALL_RCS, TAG_IP_VOICE_CALL_RCS, TAG_VIDEO_SHARE,
    build_local_feature_tags, extract_capabilities,
};
