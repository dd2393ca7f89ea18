//! XML codec for the multipart part-list bodies the proxy rewrites.
//!
//! Two shapes matter: the client's `CompleteMultipartUpload` request body
//! (parsed, validated, and re-serialized sorted) and the backend's
//! `InitiateMultipartUploadResult` response (only `<UploadId>` is needed).
//! Everything else on the multipart path streams through untouched.

use std::fmt::Write as _;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::multipart::{MultipartError, SubmittedPart};

/// Parse the part list from a `CompleteMultipartUpload` request body.
///
/// Accepts parts in any document order; only `<PartNumber>` and `<ETag>`
/// inside each `<Part>` are read.
///
/// # Errors
///
/// [`MultipartError::MalformedPartList`] for unparsable XML, a part missing
/// either field, or an empty part list.
pub fn parse_complete_request(xml: &str) -> Result<Vec<SubmittedPart>, MultipartError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut parts = Vec::new();
    let mut in_part = false;
    let mut current_tag: Option<Vec<u8>> = None;
    let mut part_number: Option<u32> = None;
    let mut etag: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.name().as_ref().to_vec();
                if name == b"Part" {
                    in_part = true;
                    part_number = None;
                    etag = None;
                } else if in_part {
                    current_tag = Some(name);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(tag) = &current_tag {
                    let text = t
                        .unescape()
                        .map_err(|e| MultipartError::MalformedPartList(e.to_string()))?;
                    match tag.as_slice() {
                        b"PartNumber" => {
                            part_number = Some(text.trim().parse().map_err(|_| {
                                MultipartError::MalformedPartList(format!(
                                    "invalid part number: {text}"
                                ))
                            })?);
                        }
                        b"ETag" => etag = Some(text.into_owned()),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"Part" {
                    let number = part_number.take().ok_or_else(|| {
                        MultipartError::MalformedPartList("part without PartNumber".to_owned())
                    })?;
                    let etag = etag.take().ok_or_else(|| {
                        MultipartError::MalformedPartList("part without ETag".to_owned())
                    })?;
                    parts.push(SubmittedPart {
                        part_number: number,
                        etag,
                    });
                    in_part = false;
                }
                current_tag = None;
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(MultipartError::MalformedPartList(e.to_string())),
        }
    }

    if parts.is_empty() {
        return Err(MultipartError::MalformedPartList(
            "no parts in completion request".to_owned(),
        ));
    }

    Ok(parts)
}

/// Serialize a (sorted) part list as the backend-facing
/// `CompleteMultipartUpload` request body.
#[must_use]
pub fn render_complete_request(parts: &[SubmittedPart]) -> String {
    let mut xml = String::from(
        r#"<CompleteMultipartUpload xmlns="http://s3.amazonaws.com/doc/2006-03-01/">"#,
    );
    for part in parts {
        let _ = write!(
            xml,
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            part.part_number,
            escape_text(&part.etag),
        );
    }
    xml.push_str("</CompleteMultipartUpload>");
    xml
}

/// Extract `<UploadId>` from an `InitiateMultipartUploadResult` body.
///
/// # Errors
///
/// [`MultipartError::MalformedPartList`] when the element is absent or the
/// XML cannot be parsed.
pub fn parse_upload_id(xml: &str) -> Result<String, MultipartError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut in_upload_id = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                in_upload_id = e.name().as_ref() == b"UploadId";
            }
            Ok(Event::Text(t)) if in_upload_id => {
                let text = t
                    .unescape()
                    .map_err(|e| MultipartError::MalformedPartList(e.to_string()))?;
                return Ok(text.into_owned());
            }
            Ok(Event::End(_)) => in_upload_id = false,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(MultipartError::MalformedPartList(e.to_string())),
        }
    }

    Err(MultipartError::MalformedPartList(
        "response carried no UploadId".to_owned(),
    ))
}

/// Escape the XML text special characters.
fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
