//! SDP attributes consumed during capability & media negotiation
//!
//! Every `parse` here is tolerant: a malformed attribute yields `None` and is
//! skipped by the caller, it never fails the surrounding session description.

use bytes::Bytes;
use bytesstr::BytesStr;
use std::fmt;

/// Rtpmap attribute (`a=rtpmap`)
///
/// Maps an RTP payload number of the media description to an encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpMap {
    /// The payload number used in the media description
    pub payload: u8,

    /// Name of the encoding
    pub encoding: BytesStr,

    /// Clock rate of the encoding
    pub clock_rate: u32,

    /// Additional parameters as a string
    pub params: Option<BytesStr>,
}

impl RtpMap {
    pub fn parse(src: &Bytes, i: &str) -> Option<Self> {
        let (payload, rest) = i.trim().split_once(' ')?;
        let payload = payload.parse().ok()?;

        let mut parts = rest.trim().splitn(3, '/');

        let encoding = parts.next().filter(|e| !e.is_empty())?;
        let clock_rate = parts.next()?.parse().ok()?;
        let params = parts.next().map(|p| BytesStr::from_parse(src, p));

        Some(RtpMap {
            payload,
            encoding: BytesStr::from_parse(src, encoding),
            clock_rate,
            params,
        })
    }
}

impl fmt::Display for RtpMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}/{}", self.payload, self.encoding, self.clock_rate)?;

        if let Some(params) = &self.params {
            write!(f, "/{params}")?;
        }

        Ok(())
    }
}

/// File selector attribute (`a=file-selector`)
///
/// Describes the file offered in a file transfer or image share session.
/// All selector fields are optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSelector {
    /// File name, quoted on the wire
    pub name: Option<BytesStr>,

    /// Mime type of the file
    pub mime_type: Option<BytesStr>,

    /// Declared size in bytes
    pub size: Option<u64>,
}

impl FileSelector {
    pub fn parse(src: &Bytes, i: &str) -> Self {
        let mut selector = FileSelector::default();

        for token in i.split_ascii_whitespace() {
            let Some((key, value)) = token.split_once(':') else {
                continue;
            };

            match key {
                "name" => {
                    let value = value
                        .strip_prefix('"')
                        .and_then(|v| v.strip_suffix('"'))
                        .unwrap_or(value);

                    if !value.is_empty() {
                        selector.name = Some(BytesStr::from_parse(src, value));
                    }
                }
                "type" => {
                    if !value.is_empty() {
                        selector.mime_type = Some(BytesStr::from_parse(src, value));
                    }
                }
                "size" => selector.size = value.parse().ok(),
                _ => {}
            }
        }

        selector
    }
}

impl fmt::Display for FileSelector {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut space = "";

        if let Some(name) = &self.name {
            write!(f, "name:\"{name}\"")?;
            space = " ";
        }

        if let Some(mime_type) = &self.mime_type {
            write!(f, "{space}type:{mime_type}")?;
            space = " ";
        }

        if let Some(size) = self.size {
            write!(f, "{space}size:{size}")?;
        }

        Ok(())
    }
}

/// Accept types attribute (`a=accept-types`), a whitespace separated mime list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptTypes(pub Vec<BytesStr>);

impl AcceptTypes {
    pub fn parse(src: &Bytes, i: &str) -> Self {
        AcceptTypes(
            i.split_ascii_whitespace()
                .map(|ty| BytesStr::from_parse(src, ty))
                .collect(),
        )
    }
}

impl fmt::Display for AcceptTypes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, ty) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            f.write_str(ty)?;
        }

        Ok(())
    }
}

/// `name:[value]` pair holding an attribute this crate does not interpret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAttribute {
    /// Attribute name, the part before the optional `:`
    pub name: BytesStr,

    /// The part after the optional `:`
    pub value: Option<BytesStr>,
}

impl UnknownAttribute {
    pub fn parse(src: &Bytes, line: &str) -> Self {
        match line.split_once(':') {
            None => Self {
                name: BytesStr::from_parse(src, line),
                value: None,
            },
            Some((name, value)) => Self {
                name: BytesStr::from_parse(src, name),
                value: Some(BytesStr::from_parse(src, value)),
            },
        }
    }
}

impl fmt::Display for UnknownAttribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a={}", self.name)?;

        if let Some(value) = &self.value {
            write!(f, ":{value}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rtpmap() {
        let input = BytesStr::from_static("96 H264/90000");

        let rtpmap = RtpMap::parse(input.as_ref(), &input).unwrap();

        assert_eq!(rtpmap.payload, 96);
        assert_eq!(rtpmap.encoding, "H264");
        assert_eq!(rtpmap.clock_rate, 90000);
        assert_eq!(rtpmap.params, None);
    }

    #[test]
    fn rtpmap_params() {
        let input = BytesStr::from_static("97 AMR/8000/1");

        let rtpmap = RtpMap::parse(input.as_ref(), &input).unwrap();

        assert_eq!(rtpmap.payload, 97);
        assert_eq!(rtpmap.encoding, "AMR");
        assert_eq!(rtpmap.clock_rate, 8000);
        assert_eq!(rtpmap.params.unwrap(), "1");
    }

    #[test]
    fn rtpmap_malformed_is_none() {
        let input = BytesStr::from_static("not-a-payload H264/90000");
        assert_eq!(RtpMap::parse(input.as_ref(), &input), None);

        let input = BytesStr::from_static("96 H264");
        assert_eq!(RtpMap::parse(input.as_ref(), &input), None);
    }

    #[test]
    fn rtpmap_print() {
        let rtpmap = RtpMap {
            payload: 96,
            encoding: "H264".into(),
            clock_rate: 90000,
            params: None,
        };

        assert_eq!(rtpmap.to_string(), "96 H264/90000");
    }

    #[test]
    fn file_selector() {
        let input = BytesStr::from_static("name:\"photo.jpg\" type:image/jpeg size:123456");

        let selector = FileSelector::parse(input.as_ref(), &input);

        assert_eq!(selector.name.unwrap(), "photo.jpg");
        assert_eq!(selector.mime_type.unwrap(), "image/jpeg");
        assert_eq!(selector.size, Some(123456));
    }

    #[test]
    fn file_selector_partial() {
        let input = BytesStr::from_static("size:broken name:\"a.png\"");

        let selector = FileSelector::parse(input.as_ref(), &input);

        assert_eq!(selector.name.unwrap(), "a.png");
        assert_eq!(selector.mime_type, None);
        assert_eq!(selector.size, None);
    }

    #[test]
    fn file_selector_print() {
        let selector = FileSelector {
            name: Some("photo.jpg".into()),
            mime_type: Some("image/jpeg".into()),
            size: Some(99),
        };

        assert_eq!(selector.to_string(), "name:\"photo.jpg\" type:image/jpeg size:99");
    }

    #[test]
    fn accept_types() {
        let input = BytesStr::from_static("image/jpeg image/png");

        let accept = AcceptTypes::parse(input.as_ref(), &input);

        assert_eq!(accept.0.len(), 2);
        assert_eq!(accept.to_string(), "image/jpeg image/png");
    }
}
