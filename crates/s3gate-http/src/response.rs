//! Error serialization to S3-style XML responses.

use s3gate_core::ProxyError;

use crate::body::ProxyBody;

/// Render a [`ProxyError`] as an S3-style XML error response.
///
/// Error messages never carry credential material: the variants only hold
/// access key IDs, upload IDs, and transport errors.
#[must_use]
pub fn error_to_response(err: &ProxyError, request_id: &str) -> http::Response<ProxyBody> {
    let body = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Error><Code>{}</Code><Message>{}</Message><RequestId>{}</RequestId></Error>",
        err.code(),
        escape_xml(&err.to_string()),
        escape_xml(request_id),
    );

    http::Response::builder()
        .status(err.status())
        .header(http::header::CONTENT_TYPE, "application/xml")
        .body(ProxyBody::from_string(body))
        .unwrap_or_else(|_| {
            let mut fallback = http::Response::new(ProxyBody::empty());
            *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use s3gate_auth::AuthError;
    use s3gate_core::MultipartError;

    use super::*;

    fn body_string(response: http::Response<ProxyBody>) -> String {
        use http_body_util::BodyExt;
        let collected =
            tokio_test::block_on(response.into_body().collect()).expect("buffered body");
        String::from_utf8(collected.to_bytes().to_vec()).expect("utf-8 body")
    }

    #[test]
    fn test_should_render_signature_mismatch_as_forbidden_xml() {
        let err = ProxyError::Authentication(AuthError::SignatureDoesNotMatch);
        let response = error_to_response(&err, "req-1");

        assert_eq!(response.status(), http::StatusCode::FORBIDDEN);
        assert_eq!(
            response
                .headers()
                .get(http::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/xml"),
        );
        let body = body_string(response);
        assert!(body.contains("<Code>SignatureDoesNotMatch</Code>"));
        assert!(body.contains("<RequestId>req-1</RequestId>"));
    }

    #[test]
    fn test_should_render_unknown_upload_as_not_found_xml() {
        let err = ProxyError::Multipart(MultipartError::NoSuchUpload("abc".to_owned()));
        let response = error_to_response(&err, "req-2");
        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
        assert!(body_string(response).contains("<Code>NoSuchUpload</Code>"));
    }

    #[test]
    fn test_should_escape_xml_specials_in_message() {
        let err = ProxyError::Routing("bad <segment> & more".to_owned());
        let body = body_string(error_to_response(&err, "req-3"));
        assert!(body.contains("bad &lt;segment&gt; &amp; more"));
        assert!(!body.contains("bad <segment>"));
    }
}
