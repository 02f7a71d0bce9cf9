// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    header,
    http::{self, HeaderMap},
    Response, StatusCode,
};
use serde_json::json;
use tracing::{debug, error};

use crate::error::IngestError;

pub type Body = Full<Bytes>;
pub type HttpResponse = Response<Body>;

/// Does two things:
/// 1. Logs the given message. A success status code (within 200-299) will cause a debug log to be
///    written, otherwise error will be written.
/// 2. Returns the given message in the body of JSON response with the given status code.
///
/// Response body format:
/// {
///     "message": message
/// }
pub fn log_and_create_http_response(
    message: &str,
    status: StatusCode,
) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
}

/// Same as [`log_and_create_http_response`] but derives status and message from an
/// [`IngestError`]. Batch failures additionally list every failed event:
/// {
///     "message": message,
///     "failures": [{"index": 3, "event_id": "id4", "error": "..."}]
/// }
pub fn log_and_create_error_response(err: &IngestError) -> http::Result<HttpResponse> {
    let IngestError::Batch(batch) = err else {
        return log_and_create_http_response(&err.to_string(), err.status_code());
    };

    let message = err.to_string();
    error!("{message}");
    let failures: Vec<_> = batch
        .failures()
        .iter()
        .map(|failure| {
            json!({
                "index": failure.index,
                "event_id": failure.event_id,
                "error": failure.error.to_string(),
            })
        })
        .collect();
    let body = json!({ "message": message, "failures": failures }).to_string();
    Response::builder()
        .status(err.status_code())
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
}

/// 200 with no body; the status code is the whole success contract.
pub fn create_success_response() -> http::Result<HttpResponse> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::new(Bytes::new()))
}

/// Takes a request's header map, and verifies that the "content-length" and/or "Transfer-Encoding" header
/// is present, valid, and less than the given max_content_length.
///
/// Will return None if no issues are found. Otherwise logs an error (with the given prefix) and
/// returns and HTTP Response with the appropriate error status code.
pub fn verify_request_content_length(
    header_map: &HeaderMap,
    max_content_length: usize,
    error_message_prefix: &str,
) -> Option<http::Result<HttpResponse>> {
    let content_length_header = match header_map.get(header::CONTENT_LENGTH) {
        Some(res) => res,
        None => {
            if let Some(transfer_encoding_header) = header_map.get(header::TRANSFER_ENCODING) {
                debug!(
                    "Transfer-Encoding header is present: {:?}",
                    transfer_encoding_header
                );
                return None;
            }
            return Some(log_and_create_http_response(
                &format!(
                    "{error_message_prefix}: Missing Content-Length and Transfer-Encoding header"
                ),
                StatusCode::LENGTH_REQUIRED,
            ));
        }
    };
    let content_length = match content_length_header
        .to_str()
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
    {
        Some(res) => res,
        None => {
            return Some(log_and_create_http_response(
                &format!("{error_message_prefix}: Invalid Content-Length header"),
                StatusCode::BAD_REQUEST,
            ));
        }
    };
    if content_length > max_content_length {
        return Some(log_and_create_http_response(
            &format!("{error_message_prefix}: Payload too large"),
            StatusCode::PAYLOAD_TOO_LARGE,
        ));
    }
    None
}
