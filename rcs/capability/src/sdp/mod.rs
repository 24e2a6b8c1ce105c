//! Minimal SDP subset used for capability advertisement and media
//! negotiation
//!
//! Only the fields and attributes this engine consumes are modeled, anything
//! else is carried through [`UnknownAttribute`].

use crate::ServiceConfig;
use bytes::Bytes;
use bytesstr::BytesStr;
use std::fmt;
use std::net::IpAddr;

mod attributes;
mod media;

pub use attributes::{AcceptTypes, FileSelector, RtpMap, UnknownAttribute};
pub use media::{Media, MediaDescription, MediaType};

/// Error returned by [`SessionDescription::parse`]
#[derive(Debug, thiserror::Error)]
pub enum ParseSdpError {
    #[error("missing v=0 version line")]
    MissingVersion,
    #[error("invalid media line {0:?}")]
    InvalidMediaLine(String),
}

/// Origin field (`o=`)
#[derive(Debug, Clone)]
pub struct Origin {
    pub username: BytesStr,
    pub session_id: BytesStr,
    pub session_version: BytesStr,
    pub address: IpAddr,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} {} IN {} {}",
            self.username,
            self.session_id,
            self.session_version,
            ip_version(&self.address),
            self.address
        )
    }
}

impl Origin {
    fn parse(src: &Bytes, line: &str) -> Option<Self> {
        let mut parts = line.split_ascii_whitespace();

        let username = BytesStr::from_parse(src, parts.next()?);
        let session_id = BytesStr::from_parse(src, parts.next()?);
        let session_version = BytesStr::from_parse(src, parts.next()?);

        // network type & address type tokens
        parts.next()?;
        parts.next()?;

        let address = parts.next()?.parse().ok()?;

        Some(Origin {
            username,
            session_id,
            session_version,
            address,
        })
    }
}

/// Connection field (`c=`)
#[derive(Debug, Clone)]
pub struct Connection {
    pub address: IpAddr,
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IN {} {}", ip_version(&self.address), self.address)
    }
}

impl Connection {
    fn parse(line: &str) -> Option<Self> {
        let address = line.split_ascii_whitespace().nth(2)?.parse().ok()?;

        Some(Connection { address })
    }
}

fn ip_version(addr: &IpAddr) -> &'static str {
    match addr {
        IpAddr::V4(_) => "IP4",
        IpAddr::V6(_) => "IP6",
    }
}

/// A complete session description
#[derive(Debug, Clone)]
pub struct SessionDescription {
    /// Origin (o field)
    pub origin: Option<Origin>,

    /// Session name (s field)
    pub name: BytesStr,

    /// Session level connection (c field)
    pub connection: Option<Connection>,

    /// Session level attributes this crate does not interpret
    pub attributes: Vec<UnknownAttribute>,

    /// All media descriptions of this session description
    pub media_descriptions: Vec<MediaDescription>,
}

impl SessionDescription {
    /// Parse a session description from its textual representation
    ///
    /// Unparsable or unknown attributes are skipped or carried through
    /// verbatim, only a structurally broken message is an error.
    pub fn parse(src: &BytesStr) -> Result<Self, ParseSdpError> {
        let bytes: &Bytes = src.as_ref();

        let mut session = SessionDescription {
            origin: None,
            name: BytesStr::from_static("-"),
            connection: None,
            attributes: vec![],
            media_descriptions: vec![],
        };

        let mut saw_version = false;

        for line in src.lines() {
            let line = line.trim_end_matches('\r');

            let Some((kind, value)) = line.split_once('=') else {
                continue;
            };

            match kind {
                "v" => saw_version = value.trim() == "0",
                "o" => session.origin = Origin::parse(bytes, value),
                "s" => session.name = BytesStr::from_parse(bytes, value),
                "c" => {
                    let connection = Connection::parse(value);

                    match session.media_descriptions.last_mut() {
                        Some(media) => media.connection = connection,
                        None => session.connection = connection,
                    }
                }
                "m" => {
                    let media = Media::parse(bytes, value)
                        .ok_or_else(|| ParseSdpError::InvalidMediaLine(value.to_string()))?;

                    session.media_descriptions.push(MediaDescription::new(media));
                }
                "a" => match session.media_descriptions.last_mut() {
                    Some(media) => media.parse_attribute(bytes, value),
                    None => session.attributes.push(UnknownAttribute::parse(bytes, value)),
                },
                // b=, t=, k=, ... are not consumed by this engine
                _ => {}
            }
        }

        if !saw_version {
            return Err(ParseSdpError::MissingVersion);
        }

        Ok(session)
    }
}

impl fmt::Display for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "v=0\r\n")?;

        if let Some(origin) = &self.origin {
            write!(f, "o={origin}\r\n")?;
        }

        write!(f, "s={}\r\n", self.name)?;

        if let Some(conn) = &self.connection {
            write!(f, "c={conn}\r\n")?;
        }

        write!(f, "t=0 0\r\n")?;

        for attr in &self.attributes {
            write!(f, "{attr}\r\n")?;
        }

        for media in &self.media_descriptions {
            write!(f, "{media}")?;
        }

        Ok(())
    }
}

/// Build the SDP fragment advertising the locally enabled rich media
///
/// Offers only currently enabled media: the video codec table for video
/// share / IP video call and the accept-types/max-size of image and
/// geolocation sharing. Returns `None` when rich media is disabled or no
/// media type is enabled.
pub fn build_capability_sdp(config: &ServiceConfig, local_ip: IpAddr) -> Option<SessionDescription> {
    if !config.rich_media {
        return None;
    }

    let mut media_descriptions = Vec::new();

    if (config.video_share || config.ip_video_call) && !config.video_codecs.is_empty() {
        let mut desc = MediaDescription::new(Media {
            media_type: MediaType::Video,
            port: 0,
            proto: BytesStr::from_static("RTP/AVP"),
            fmts: config
                .video_codecs
                .iter()
                .map(|codec| codec.payload.to_string().into())
                .collect(),
        });

        desc.rtpmap = config.video_codecs.clone();

        media_descriptions.push(desc);
    }

    let mut accept_types = Vec::new();
    if config.image_share {
        accept_types.extend(config.image_mime_types.iter().cloned());
    }
    if config.geolocation_push {
        accept_types.extend(config.geoloc_mime_types.iter().cloned());
    }

    if !accept_types.is_empty() {
        let mut desc = MediaDescription::new(Media {
            media_type: MediaType::Message,
            port: 0,
            proto: BytesStr::from_static("TCP/MSRP"),
            fmts: vec![BytesStr::from_static("*")],
        });

        desc.accept_types = Some(AcceptTypes(accept_types));

        if config.max_content_size > 0 {
            desc.max_size = Some(config.max_content_size);
        }

        media_descriptions.push(desc);
    }

    if media_descriptions.is_empty() {
        return None;
    }

    Some(SessionDescription {
        origin: Some(Origin {
            username: BytesStr::from_static("-"),
            session_id: BytesStr::from_static("0"),
            session_version: BytesStr::from_static("0"),
            address: local_ip,
        }),
        name: BytesStr::from_static("-"),
        connection: Some(Connection { address: local_ip }),
        attributes: vec![],
        media_descriptions,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn rich_media_config() -> ServiceConfig {
        ServiceConfig {
            rich_media: true,
            video_share: true,
            image_share: true,
            geolocation_push: true,
            video_codecs: vec![
                RtpMap {
                    payload: 96,
                    encoding: "H264".into(),
                    clock_rate: 90000,
                    params: None,
                },
                RtpMap {
                    payload: 97,
                    encoding: "H263-2000".into(),
                    clock_rate: 90000,
                    params: None,
                },
            ],
            image_mime_types: vec!["image/jpeg".into(), "image/png".into()],
            geoloc_mime_types: vec!["application/vnd.gsma.rcspushlocation+xml".into()],
            max_content_size: 1024 * 1024,
            ..ServiceConfig::default()
        }
    }

    #[test]
    fn parse_file_transfer_offer() {
        let input = BytesStr::from_static(
            "v=0\r\n\
             o=- 123 456 IN IP4 192.0.2.1\r\n\
             s=-\r\n\
             c=IN IP4 192.0.2.1\r\n\
             t=0 0\r\n\
             m=message 2855 TCP/MSRP *\r\n\
             a=accept-types:image/jpeg image/png\r\n\
             a=max-size:1048576\r\n\
             a=file-selector:name:\"photo.jpg\" type:image/jpeg size:123456\r\n\
             a=file-location:https://ft.example.com/f/abc\r\n\
             a=file-icon:cid:icon@example.com\r\n\
             a=path:msrp://192.0.2.1:2855/s1;tcp\r\n",
        );

        let sdp = SessionDescription::parse(&input).unwrap();

        assert_eq!(sdp.media_descriptions.len(), 1);
        let media = &sdp.media_descriptions[0];

        assert_eq!(media.media.media_type, MediaType::Message);
        assert_eq!(media.media.port, 2855);
        assert_eq!(media.accept_types.as_ref().unwrap().0.len(), 2);
        assert_eq!(media.max_size, Some(1048576));

        let selector = media.file_selector.clone().unwrap();
        assert_eq!(selector.name.unwrap(), "photo.jpg");
        assert_eq!(selector.size, Some(123456));

        assert_eq!(
            media.file_location.clone().unwrap(),
            "https://ft.example.com/f/abc"
        );

        // a=path is not interpreted but kept
        assert!(media.attributes.iter().any(|a| a.name == "path"));
    }

    #[test]
    fn malformed_attribute_is_skipped() {
        let input = BytesStr::from_static(
            "v=0\r\n\
             s=-\r\n\
             m=video 0 RTP/AVP 96\r\n\
             a=rtpmap:garbage\r\n\
             a=rtpmap:96 H264/90000\r\n",
        );

        let sdp = SessionDescription::parse(&input).unwrap();

        assert_eq!(sdp.media_descriptions[0].rtpmap.len(), 1);
        assert_eq!(sdp.media_descriptions[0].rtpmap[0].encoding, "H264");
    }

    #[test]
    fn missing_version_is_an_error() {
        let input = BytesStr::from_static("s=-\r\nm=video 0 RTP/AVP 96\r\n");

        assert!(matches!(
            SessionDescription::parse(&input),
            Err(ParseSdpError::MissingVersion)
        ));
    }

    #[test]
    fn capability_sdp_offers_enabled_media_only() {
        let config = rich_media_config();

        let sdp = build_capability_sdp(&config, "192.0.2.10".parse().unwrap()).unwrap();

        assert_eq!(sdp.media_descriptions.len(), 2);
        assert_eq!(sdp.media_descriptions[0].media.media_type, MediaType::Video);
        assert_eq!(sdp.media_descriptions[0].rtpmap.len(), 2);

        let message = &sdp.media_descriptions[1];
        assert_eq!(message.media.media_type, MediaType::Message);
        // image + geoloc types merged
        assert_eq!(message.accept_types.as_ref().unwrap().0.len(), 3);
        assert_eq!(message.max_size, Some(1024 * 1024));
    }

    #[test]
    fn capability_sdp_absent_without_rich_media() {
        let mut config = rich_media_config();
        config.rich_media = false;

        assert!(build_capability_sdp(&config, "192.0.2.10".parse().unwrap()).is_none());

        let mut config = rich_media_config();
        config.video_share = false;
        config.ip_video_call = false;
        config.image_share = false;
        config.geolocation_push = false;

        assert!(build_capability_sdp(&config, "192.0.2.10".parse().unwrap()).is_none());
    }

    #[test]
    fn print_parse_roundtrip() {
        let config = rich_media_config();
        let sdp = build_capability_sdp(&config, "192.0.2.10".parse().unwrap()).unwrap();

        let printed = BytesStr::from(sdp.to_string());
        let reparsed = SessionDescription::parse(&printed).unwrap();

        assert_eq!(reparsed.media_descriptions.len(), 2);
        assert_eq!(reparsed.media_descriptions[0].rtpmap, sdp.media_descriptions[0].rtpmap);
    }
}
