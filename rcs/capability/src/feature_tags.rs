use crate::capabilities::{Capabilities, ServiceConfig};
use crate::sdp::{MediaType, SessionDescription};
use bytesstr::BytesStr;

/// Namespace grouping ICSI (service) feature tags
pub const NAMESPACE_ICSI: &str = "+g.3gpp.icsi-ref";

/// Namespace grouping IARI (application) feature tags
pub const NAMESPACE_IARI: &str = "+g.3gpp.iari-ref";

/// 3GPP MMTEL service tag, one of the two variants required for IP voice call
pub const ICSI_MMTEL: &str = "urn%3Aurn-7%3A3gpp-service.ims.icsi.mmtel";

/// RCS specific IP voice call tag, the other required variant
pub const TAG_IP_VOICE_CALL_RCS: &str = "+g.gsma.rcs.ipcall";

/// RCS specific IP video call tag
pub const TAG_IP_VIDEO_CALL_RCS: &str = "+g.gsma.rcs.ipvideocall";

/// Circuit-switched video share tag
pub const TAG_VIDEO_SHARE: &str = "+g.3gpp.cs-voice";

pub const IARI_CHAT: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.im";
pub const IARI_FILE_TRANSFER: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ft";
pub const IARI_FILE_TRANSFER_HTTP: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.fthttp";
pub const IARI_FILE_TRANSFER_THUMBNAIL: &str =
    "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ftthumb";
pub const IARI_FILE_TRANSFER_STORE_FORWARD: &str =
    "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.ftstandfw";
pub const IARI_IMAGE_SHARE: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.gsma-is";
pub const IARI_PRESENCE_DISCOVERY: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.dp";
pub const IARI_SOCIAL_PRESENCE: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcse.sp";
pub const IARI_GEOLOCATION_PUSH: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.geopush";

/// Prefix of extension tags, the service id is the part trailing it
pub const EXTENSION_PREFIX: &str = "urn%3Aurn-7%3A3gpp-application.ims.iari.rcs.ext.";

/// Build the feature tags advertising the locally enabled services
///
/// Tags of one namespace are grouped into a single `<namespace>="<tags>"`
/// parameter. ICSI tags come first, then standalone tags, then IARI tags.
/// The output is deterministic for a given config.
pub fn build_local_feature_tags(config: &ServiceConfig) -> Vec<String> {
    let mut tags = Vec::new();

    let mut icsi = Vec::new();
    if config.ip_voice_call || config.ip_video_call {
        icsi.push(ICSI_MMTEL);
    }
    if !icsi.is_empty() {
        tags.push(format!("{NAMESPACE_ICSI}=\"{}\"", icsi.join(",")));
    }

    if config.ip_voice_call {
        tags.push(TAG_IP_VOICE_CALL_RCS.into());
    }
    if config.ip_video_call {
        tags.push(TAG_IP_VIDEO_CALL_RCS.into());
    }
    if config.video_share {
        tags.push(TAG_VIDEO_SHARE.into());
    }

    let mut iari: Vec<String> = Vec::new();
    if config.chat {
        iari.push(IARI_CHAT.into());
    }
    if config.file_transfer {
        iari.push(IARI_FILE_TRANSFER.into());
    }
    if config.file_transfer_http {
        iari.push(IARI_FILE_TRANSFER_HTTP.into());
    }
    if config.file_transfer_thumbnail {
        iari.push(IARI_FILE_TRANSFER_THUMBNAIL.into());
    }
    if config.file_transfer_store_forward {
        iari.push(IARI_FILE_TRANSFER_STORE_FORWARD.into());
    }
    if config.image_share {
        iari.push(IARI_IMAGE_SHARE.into());
    }
    if config.presence_discovery {
        iari.push(IARI_PRESENCE_DISCOVERY.into());
    }
    if config.social_presence {
        iari.push(IARI_SOCIAL_PRESENCE.into());
    }
    if config.geolocation_push {
        iari.push(IARI_GEOLOCATION_PUSH.into());
    }

    // BTreeSet iteration keeps extension order deterministic
    for ext in &config.extensions {
        iari.push(format!("{EXTENSION_PREFIX}{ext}"));
    }

    if !iari.is_empty() {
        tags.push(format!("{NAMESPACE_IARI}=\"{}\"", iari.join(",")));
    }

    tags
}

/// Parse the feature tags (and optional SDP payload) of an inbound message
/// into a [`Capabilities`] value
///
/// The scan is order-independent: identical tag sets in any order yield
/// identical capabilities. The IP voice call flag requires both the RCS and
/// the 3GPP tag variant to be present anywhere in the full set. Malformed
/// tags are skipped, never an error.
pub fn extract_capabilities<'t, I>(
    config: &ServiceConfig,
    tags: I,
    sdp: Option<&SessionDescription>,
    now_ms: u64,
) -> Capabilities
where
    I: IntoIterator<Item = &'t str>,
{
    let mut caps = Capabilities::default();

    // The two IP voice call variants are tracked separately and conjoined
    // after the scan so that order of appearance cannot affect the result.
    let mut ip_call_rcs = false;
    let mut ip_call_3gpp = false;

    for raw in tags {
        for tag in split_grouped_tag(raw) {
            match tag {
                IARI_CHAT => caps.chat = true,
                IARI_FILE_TRANSFER => caps.file_transfer = true,
                IARI_FILE_TRANSFER_HTTP => caps.file_transfer_http = true,
                IARI_FILE_TRANSFER_THUMBNAIL => caps.file_transfer_thumbnail = true,
                IARI_FILE_TRANSFER_STORE_FORWARD => caps.file_transfer_store_forward = true,
                IARI_IMAGE_SHARE => caps.image_share = true,
                IARI_PRESENCE_DISCOVERY => caps.presence_discovery = true,
                IARI_SOCIAL_PRESENCE => caps.social_presence = true,
                IARI_GEOLOCATION_PUSH => caps.geolocation_push = true,
                TAG_VIDEO_SHARE => caps.video_share = true,
                TAG_IP_VOICE_CALL_RCS => ip_call_rcs = true,
                ICSI_MMTEL => ip_call_3gpp = true,
                TAG_IP_VIDEO_CALL_RCS => caps.ip_video_call = true,
                other => {
                    if let Some(id) = other.strip_prefix(EXTENSION_PREFIX) {
                        if id.is_empty() {
                            // malformed extension tag yields an absent id
                            log::debug!("ignoring extension tag without service id");
                        } else {
                            caps.extensions.insert(BytesStr::from(id));
                        }
                    } else {
                        log::debug!("ignoring unrecognized feature tag {other:?}");
                    }
                }
            }
        }
    }

    caps.ip_voice_call = ip_call_rcs && ip_call_3gpp;

    if let Some(sdp) = sdp {
        apply_sdp_intersection(config, sdp, &mut caps);
    }

    caps.stamp_refresh(now_ms);
    caps.stamp_request(now_ms);

    caps
}

/// Intersect the offered media of an attached SDP payload against the locally
/// supported codec/mime sets, clearing capability flags that cannot be served
fn apply_sdp_intersection(
    config: &ServiceConfig,
    sdp: &SessionDescription,
    caps: &mut Capabilities,
) {
    for desc in &sdp.media_descriptions {
        match desc.media.media_type {
            MediaType::Video => {
                let any_common = desc
                    .rtpmap
                    .iter()
                    .any(|offered| config.supports_video_codec(&offered.encoding));

                if !any_common {
                    caps.video_share = false;
                    caps.ip_video_call = false;
                }
            }
            MediaType::Message => {
                let Some(accept_types) = &desc.accept_types else {
                    // missing attribute, skip this media section
                    continue;
                };

                let any_common = accept_types.0.iter().any(|offered| {
                    config
                        .image_mime_types
                        .iter()
                        .any(|local| local.eq_ignore_ascii_case(offered))
                });

                if !any_common {
                    caps.image_share = false;
                }
            }
            _ => {}
        }
    }
}

/// Split a raw feature tag into individual tag values
///
/// Grouped tags use the wire format `<namespace>="<comma-joined tags>"`,
/// standalone tags are yielded as-is. Quotes around values are stripped.
fn split_grouped_tag(raw: &str) -> Vec<&str> {
    let raw = raw.trim();

    match raw.split_once('=') {
        Some((name, value)) if name.starts_with('+') => strip_quotes(value)
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .collect(),
        _ => vec![raw],
    }
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod test {
    use super::*;

    fn all_services() -> ServiceConfig {
        ServiceConfig {
            chat: true,
            file_transfer: true,
            file_transfer_http: true,
            file_transfer_thumbnail: true,
            file_transfer_store_forward: true,
            image_share: true,
            video_share: true,
            ip_voice_call: true,
            ip_video_call: true,
            presence_discovery: true,
            social_presence: true,
            geolocation_push: true,
            rich_media: true,
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn grouped_by_namespace() {
        let tags = build_local_feature_tags(&all_services());

        let icsi: Vec<_> = tags
            .iter()
            .filter(|t| t.starts_with(NAMESPACE_ICSI))
            .collect();
        let iari: Vec<_> = tags
            .iter()
            .filter(|t| t.starts_with(NAMESPACE_IARI))
            .collect();

        assert_eq!(icsi.len(), 1);
        assert_eq!(iari.len(), 1);
        assert!(iari[0].contains(IARI_CHAT));
        assert!(iari[0].contains(IARI_FILE_TRANSFER));
    }

    #[test]
    fn roundtrip_reproduces_flags() {
        let config = all_services();
        let tags = build_local_feature_tags(&config);

        let caps = extract_capabilities(&config, tags.iter().map(String::as_str), None, 0);

        assert!(caps.chat);
        assert!(caps.file_transfer);
        assert!(caps.file_transfer_http);
        assert!(caps.file_transfer_thumbnail);
        assert!(caps.file_transfer_store_forward);
        assert!(caps.image_share);
        assert!(caps.video_share);
        assert!(caps.ip_voice_call);
        assert!(caps.ip_video_call);
        assert!(caps.presence_discovery);
        assert!(caps.social_presence);
        assert!(caps.geolocation_push);
    }

    #[test]
    fn ip_voice_call_requires_both_variants() {
        let config = ServiceConfig::default();

        let both = [TAG_IP_VOICE_CALL_RCS, ICSI_MMTEL];
        let caps = extract_capabilities(&config, both, None, 0);
        assert!(caps.ip_voice_call);

        let rcs_only = [TAG_IP_VOICE_CALL_RCS];
        let caps = extract_capabilities(&config, rcs_only, None, 0);
        assert!(!caps.ip_voice_call);

        let mmtel_only = [ICSI_MMTEL];
        let caps = extract_capabilities(&config, mmtel_only, None, 0);
        assert!(!caps.ip_voice_call);
    }

    #[test]
    fn ip_voice_call_is_order_independent() {
        let config = ServiceConfig::default();

        let forward = [TAG_IP_VOICE_CALL_RCS, IARI_CHAT, ICSI_MMTEL];
        let backward = [ICSI_MMTEL, IARI_CHAT, TAG_IP_VOICE_CALL_RCS];

        let a = extract_capabilities(&config, forward, None, 0);
        let b = extract_capabilities(&config, backward, None, 0);

        assert!(a.ip_voice_call);
        assert_eq!(a, b);
    }

    #[test]
    fn extension_id_is_parsed_after_quote_strip() {
        let config = ServiceConfig::default();

        let raw = format!("{NAMESPACE_IARI}=\"{EXTENSION_PREFIX}mygame\"");
        let caps = extract_capabilities(&config, [raw.as_str()], None, 0);

        assert!(caps.extensions.iter().any(|ext| &**ext == "mygame"));
    }

    #[test]
    fn malformed_extension_tag_is_skipped() {
        let config = ServiceConfig::default();

        // prefix with no trailing service id
        let caps = extract_capabilities(&config, [EXTENSION_PREFIX], None, 0);

        assert!(caps.extensions.is_empty());
    }

    #[test]
    fn identical_sets_in_any_order_are_equal() {
        let config = all_services();
        let mut tags = build_local_feature_tags(&config);

        let a = extract_capabilities(&config, tags.iter().map(String::as_str), None, 42);
        tags.reverse();
        let b = extract_capabilities(&config, tags.iter().map(String::as_str), None, 42);

        assert_eq!(a, b);
    }
}
