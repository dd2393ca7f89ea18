//! Canonical request construction for AWS Signature Version 4.
//!
//! The canonical request format:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! The URI pass works on the raw wire-level path. Percent-escapes already
//! present in the path are copied through verbatim; a decode-then-re-encode
//! pass would collapse `%2F` into `/` and merge object keys that are distinct
//! on the backend.

use std::collections::BTreeMap;

/// Bytes that pass through a canonical URI segment unencoded.
///
/// RFC 3986 unreserved characters: `A-Z`, `a-z`, `0-9`, `-`, `_`, `.`, `~`.
fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

/// Assemble the full canonical request string.
///
/// # Examples
///
/// ```
/// use s3gate_auth::canonical::canonical_request;
///
/// let canonical = canonical_request(
///     "GET",
///     "/test.txt",
///     "",
///     &[("host", "examplebucket.s3.amazonaws.com")],
///     &["host"],
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// );
/// assert!(canonical.starts_with("GET\n/test.txt\n"));
/// ```
#[must_use]
pub fn canonical_request(
    method: &str,
    raw_path: &str,
    raw_query: &str,
    headers: &[(&str, &str)],
    signed_headers: &[&str],
    payload_hash: &str,
) -> String {
    let uri = canonical_uri(raw_path);
    let query = canonical_query(raw_query);
    let header_block = canonical_headers(headers, signed_headers);
    let signed = signed_headers_string(signed_headers);

    format!("{method}\n{uri}\n{query}\n{header_block}\n\n{signed}\n{payload_hash}")
}

/// Canonicalize a raw request path, segment by segment.
///
/// Literal `/` separators are preserved and each segment is encoded with
/// [`encode_segment`]. Existing escapes stay exactly as the client sent them,
/// so two paths that differ only in `%2F` vs `/` stay distinct.
///
/// # Examples
///
/// ```
/// use s3gate_auth::canonical::canonical_uri;
///
/// assert_eq!(canonical_uri(""), "/");
/// assert_eq!(canonical_uri("/a=1/b=2"), "/a%3D1/b%3D2");
/// assert_eq!(canonical_uri("/a=1%2Fb=2"), "/a%3D1%2Fb%3D2");
/// ```
#[must_use]
pub fn canonical_uri(raw_path: &str) -> String {
    if raw_path.is_empty() || raw_path == "/" {
        return "/".to_owned();
    }

    raw_path
        .split('/')
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Encode one raw path segment without disturbing escapes already in it.
///
/// A `%` followed by two hex digits is treated as an escape the client
/// produced and is copied through byte-for-byte. Everything else is either
/// unreserved (copied) or percent-encoded with uppercase hex.
fn encode_segment(segment: &str) -> String {
    let bytes = segment.as_bytes();
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b == b'%'
            && i + 3 <= bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push_str(&segment[i..i + 3]);
            i += 3;
        } else if is_unreserved(b) {
            out.push(b as char);
            i += 1;
        } else {
            out.push_str(&format!("%{b:02X}"));
            i += 1;
        }
    }

    out
}

/// Canonicalize a raw query string.
///
/// Pairs are sorted byte-wise by key, then by value for duplicate keys.
/// Keys and values are kept exactly as they appear on the wire: different
/// clients encode query values differently when signing, and the server must
/// use whatever encoding the client actually used.
///
/// # Examples
///
/// ```
/// use s3gate_auth::canonical::canonical_query;
///
/// assert_eq!(canonical_query(""), "");
/// assert_eq!(canonical_query("b=2&a=1"), "a=1&b=2");
/// assert_eq!(canonical_query("k=2&k=1"), "k=1&k=2");
/// ```
#[must_use]
pub fn canonical_query(raw_query: &str) -> String {
    if raw_query.is_empty() {
        return String::new();
    }

    let mut pairs: Vec<(&str, &str)> = raw_query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| p.split_once('=').unwrap_or((p, "")))
        .collect();

    pairs.sort_unstable();

    pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers block for the signed header names.
///
/// Names are lowercased and sorted; values are trimmed with runs of interior
/// whitespace collapsed to one space. Multiple values for the same name are
/// joined with commas in request order, per the protocol's join rule.
#[must_use]
pub fn canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> String {
    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.to_lowercase();
        let value = collapse_whitespace(value.trim());
        merged
            .entry(name)
            .and_modify(|joined| {
                joined.push(',');
                joined.push_str(&value);
            })
            .or_insert(value);
    }

    let mut names: Vec<&str> = signed_headers.to_vec();
    names.sort_unstable();

    names
        .iter()
        .filter_map(|name| merged.get(*name).map(|value| format!("{name}:{value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Semicolon-joined, sorted list of lowercase signed header names.
#[must_use]
pub fn signed_headers_string(signed_headers: &[&str]) -> String {
    let mut names: Vec<&str> = signed_headers.to_vec();
    names.sort_unstable();
    names.join(";")
}

/// Collapse runs of whitespace to a single space.
fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_normalize_empty_path_to_slash() {
        assert_eq!(canonical_uri(""), "/");
        assert_eq!(canonical_uri("/"), "/");
    }

    #[test]
    fn test_should_pass_simple_path_through() {
        assert_eq!(canonical_uri("/test.txt"), "/test.txt");
    }

    #[test]
    fn test_should_encode_reserved_characters_in_path() {
        assert_eq!(canonical_uri("/hello world"), "/hello%20world");
        assert_eq!(canonical_uri("/a=1/b=2"), "/a%3D1/b%3D2");
    }

    #[test]
    fn test_should_preserve_existing_escapes_in_path() {
        assert_eq!(canonical_uri("/hello%20world"), "/hello%20world");
        assert_eq!(canonical_uri("/a=1%2Fb=2"), "/a%3D1%2Fb%3D2");
    }

    #[test]
    fn test_should_keep_encoded_and_literal_slash_distinct() {
        assert_ne!(canonical_uri("/a=1%2Fb=2"), canonical_uri("/a=1/b=2"));
    }

    #[test]
    fn test_should_encode_lone_percent_sign() {
        // A bare "%" that is not a valid escape gets encoded itself.
        assert_eq!(canonical_uri("/100%"), "/100%25");
        assert_eq!(canonical_uri("/a%zz"), "/a%25zz");
    }

    #[test]
    fn test_should_sort_query_parameters() {
        assert_eq!(canonical_query("b=2&a=1&c=3"), "a=1&b=2&c=3");
    }

    #[test]
    fn test_should_keep_duplicate_query_keys_sorted_by_value() {
        assert_eq!(
            canonical_query("events=s3:ObjectCreated:*&events=s3:ObjectAccessed:*&prefix=p"),
            "events=s3:ObjectAccessed:*&events=s3:ObjectCreated:*&prefix=p"
        );
    }

    #[test]
    fn test_should_preserve_raw_query_encoding() {
        assert_eq!(
            canonical_query("events=s3%3AObjectCreated%3A%2A&prefix=test"),
            "events=s3%3AObjectCreated%3A%2A&prefix=test"
        );
        assert_eq!(canonical_query("key=hello world"), "key=hello world");
    }

    #[test]
    fn test_should_handle_valueless_query_parameters() {
        assert_eq!(canonical_query("uploads"), "uploads=");
        assert_eq!(canonical_query("uploads&prefix=x"), "prefix=x&uploads=");
    }

    #[test]
    fn test_should_build_canonical_headers_sorted_and_lowercased() {
        let headers = [
            ("Host", "examplebucket.s3.amazonaws.com"),
            ("Range", "bytes=0-9"),
            ("x-amz-date", "20130524T000000Z"),
        ];
        let signed = ["host", "range", "x-amz-date"];
        let block = canonical_headers(&headers, &signed);
        assert_eq!(
            block,
            "host:examplebucket.s3.amazonaws.com\nrange:bytes=0-9\nx-amz-date:20130524T000000Z"
        );
    }

    #[test]
    fn test_should_join_duplicate_header_values_with_commas() {
        let headers = [("X-Multi", "one"), ("x-multi", "two")];
        let signed = ["x-multi"];
        assert_eq!(canonical_headers(&headers, &signed), "x-multi:one,two");
    }

    #[test]
    fn test_should_collapse_whitespace_in_header_values() {
        let headers = [("Host", "  example.com  "), ("X-Custom", "a   b   c")];
        let signed = ["host", "x-custom"];
        assert_eq!(
            canonical_headers(&headers, &signed),
            "host:example.com\nx-custom:a b c"
        );
    }

    #[test]
    fn test_should_sort_signed_headers_string() {
        assert_eq!(
            signed_headers_string(&["x-amz-date", "host", "range"]),
            "host;range;x-amz-date"
        );
    }

    #[test]
    fn test_should_match_aws_canonical_request_vector() {
        use sha2::{Digest, Sha256};

        let headers = [
            ("host", "examplebucket.s3.amazonaws.com"),
            ("range", "bytes=0-9"),
            (
                "x-amz-content-sha256",
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            ),
            ("x-amz-date", "20130524T000000Z"),
        ];
        let signed = ["host", "range", "x-amz-content-sha256", "x-amz-date"];

        let canonical = canonical_request(
            "GET",
            "/test.txt",
            "",
            &headers,
            &signed,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        );

        let hash = hex::encode(Sha256::digest(canonical.as_bytes()));
        assert_eq!(
            hash,
            "7344ae5b7ee6c3e7e6b0fe0640412a37625d1fbfff95c48bbb2dc43964946972"
        );
    }
}
