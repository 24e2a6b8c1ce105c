use super::Connection;
use super::attributes::{AcceptTypes, FileSelector, RtpMap, UnknownAttribute};
use bytes::Bytes;
use bytesstr::BytesStr;
use std::fmt;

/// Media type of the `m=` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Video,
    Message,
    Application,
    Other(BytesStr),
}

impl MediaType {
    pub(super) fn from_parse(src: &Bytes, slice: &str) -> Self {
        match slice {
            "audio" => MediaType::Audio,
            "video" => MediaType::Video,
            "message" => MediaType::Message,
            "application" => MediaType::Application,
            _ => MediaType::Other(BytesStr::from_parse(src, slice)),
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MediaType::Audio => f.write_str("audio"),
            MediaType::Video => f.write_str("video"),
            MediaType::Message => f.write_str("message"),
            MediaType::Application => f.write_str("application"),
            MediaType::Other(other) => f.write_str(other),
        }
    }
}

/// Media field (`m=`) of a media description
#[derive(Debug, Clone)]
pub struct Media {
    pub media_type: MediaType,
    pub port: u16,
    pub proto: BytesStr,
    pub fmts: Vec<BytesStr>,
}

impl Media {
    pub(super) fn parse(src: &Bytes, line: &str) -> Option<Self> {
        let mut parts = line.split_ascii_whitespace();

        let media_type = MediaType::from_parse(src, parts.next()?);
        let port = parts.next()?.parse().ok()?;
        let proto = BytesStr::from_parse(src, parts.next()?);
        let fmts = parts.map(|fmt| BytesStr::from_parse(src, fmt)).collect();

        Some(Media {
            media_type,
            port,
            proto,
            fmts,
        })
    }
}

impl fmt::Display for Media {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.media_type, self.port, self.proto)?;

        for fmt in &self.fmts {
            write!(f, " {fmt}")?;
        }

        Ok(())
    }
}

/// Describes a single media session, the part of a
/// [`SessionDescription`](super::SessionDescription) following one `m=` line
#[derive(Debug, Clone)]
pub struct MediaDescription {
    /// Media description's media field (m=)
    pub media: Media,

    /// Optional connection (c field)
    pub connection: Option<Connection>,

    /// RTP payload mappings
    pub rtpmap: Vec<RtpMap>,

    /// Accepted mime types (a=accept-types)
    pub accept_types: Option<AcceptTypes>,

    /// Maximum accepted content size in bytes (a=max-size)
    pub max_size: Option<u64>,

    /// Offered file (a=file-selector)
    pub file_selector: Option<FileSelector>,

    /// Location the file content can be fetched from (a=file-location)
    pub file_location: Option<BytesStr>,

    /// Location of the file's thumbnail (a=file-icon)
    pub file_icon: Option<BytesStr>,

    /// Additional attributes
    pub attributes: Vec<UnknownAttribute>,
}

impl MediaDescription {
    /// Create an empty media description for the given media line
    pub fn new(media: Media) -> Self {
        MediaDescription {
            media,
            connection: None,
            rtpmap: vec![],
            accept_types: None,
            max_size: None,
            file_selector: None,
            file_location: None,
            file_icon: None,
            attributes: vec![],
        }
    }

    /// Parse one attribute line into this media description
    ///
    /// Unparsable known attributes are skipped, unrecognized ones are kept
    /// verbatim in `attributes`.
    pub(super) fn parse_attribute(&mut self, src: &Bytes, line: &str) {
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name, value),
            None => (line, ""),
        };

        match name {
            "rtpmap" => match RtpMap::parse(src, value) {
                Some(rtpmap) => self.rtpmap.push(rtpmap),
                None => log::debug!("skipping malformed rtpmap attribute {value:?}"),
            },
            "accept-types" => self.accept_types = Some(AcceptTypes::parse(src, value)),
            "max-size" => match value.trim().parse() {
                Ok(size) => self.max_size = Some(size),
                Err(_) => log::debug!("skipping malformed max-size attribute {value:?}"),
            },
            "file-selector" => self.file_selector = Some(FileSelector::parse(src, value)),
            "file-location" => self.file_location = Some(BytesStr::from_parse(src, value.trim())),
            "file-icon" => self.file_icon = Some(BytesStr::from_parse(src, value.trim())),
            _ => self.attributes.push(UnknownAttribute::parse(src, line)),
        }
    }
}

impl fmt::Display for MediaDescription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "m={}\r\n", self.media)?;

        if let Some(conn) = &self.connection {
            write!(f, "c={conn}\r\n")?;
        }

        for rtpmap in &self.rtpmap {
            write!(f, "a=rtpmap:{rtpmap}\r\n")?;
        }

        if let Some(accept_types) = &self.accept_types {
            write!(f, "a=accept-types:{accept_types}\r\n")?;
        }

        if let Some(max_size) = self.max_size {
            write!(f, "a=max-size:{max_size}\r\n")?;
        }

        if let Some(file_selector) = &self.file_selector {
            write!(f, "a=file-selector:{file_selector}\r\n")?;
        }

        if let Some(file_location) = &self.file_location {
            write!(f, "a=file-location:{file_location}\r\n")?;
        }

        if let Some(file_icon) = &self.file_icon {
            write!(f, "a=file-icon:{file_icon}\r\n")?;
        }

        for attr in &self.attributes {
            write!(f, "{attr}\r\n")?;
        }

        Ok(())
    }
}
