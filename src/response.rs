//! Response state and the response processing pipeline.

use futures::StreamExt;
use http::{HeaderMap, Method, StatusCode, header};

use crate::body::{
    DecodeTarget, ErrorDecodeTarget, ResponseTarget, is_json_content_type, is_xml_content_type,
};
use crate::error::{BoxError, Error, Result};
use crate::request::Request;

/// Response state of a request, filled in during execution.
pub struct Response<'a> {
    status: Option<StatusCode>,
    headers: HeaderMap,
    pub(crate) body_bytes: Vec<u8>,
    pub(crate) body_limit: Option<u64>,
    pub(crate) trace_body: bool,
    pub(crate) do_unmarshal: bool,
    pub(crate) force_json: bool,
    pub(crate) force_xml: bool,
    pub(crate) success_statuses: Vec<u16>,
    pub(crate) target: Option<ResponseTarget<'a>>,
    pub(crate) error_target: Option<Box<dyn ErrorDecodeTarget + 'a>>,
    pub(crate) content_length_dest: Option<&'a mut Option<u64>>,
    pub(crate) error: Option<Error>,
}

impl<'a> Response<'a> {
    pub(crate) fn new(body_limit: Option<u64>, trace_body: bool) -> Self {
        Self {
            status: None,
            headers: HeaderMap::new(),
            body_bytes: Vec::new(),
            body_limit,
            trace_body,
            do_unmarshal: true,
            force_json: false,
            force_xml: false,
            success_statuses: Vec::new(),
            target: None,
            error_target: None,
            content_length_dest: None,
            error: None,
        }
    }

    /// HTTP status of the response, when one arrived.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// HTTP status as a bare code, `0` when no response arrived.
    pub fn status_code(&self) -> u16 {
        self.status.map_or(0, |status| status.as_u16())
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Response Content-Type header, empty when missing.
    pub fn content_type(&self) -> &str {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
    }

    /// Buffered response body. Empty when the body was handed over as a
    /// stream.
    pub fn body(&self) -> &[u8] {
        &self.body_bytes
    }

    /// Whether the response body is included in trace output.
    pub fn traces_body(&self) -> bool {
        self.trace_body
    }

    /// Explicit success-status set for this request.
    pub fn success_statuses(&self) -> &[u16] {
        &self.success_statuses
    }

    /// Error produced while processing, before it is returned to the
    /// caller. Trace hooks observe it here.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }
}

/// Process the transport result and store any failure on the response.
pub(crate) async fn process(
    req: &mut Request<'_>,
    result: std::result::Result<reqwest::Response, BoxError>,
) {
    if let Err(error) = process_inner(req, result).await {
        req.response.error = Some(error);
    }
}

async fn process_inner(
    req: &mut Request<'_>,
    result: std::result::Result<reqwest::Response, BoxError>,
) -> Result<()> {
    let method = req.method.clone();
    let url = req.url().unwrap_or_default().to_string();

    let raw = result.map_err(|source| Error::Transport {
        method: method.clone(),
        url: url.clone(),
        source,
    })?;

    req.response.status = Some(raw.status());
    req.response.headers = raw.headers().clone();
    if let Some(dest) = &mut req.response.content_length_dest {
        **dest = raw.content_length();
    }

    let is_success = {
        let check = req.overridables.is_success.clone();
        check(req)
    };

    read_body(req, raw, is_success, &method, &url).await?;

    if req.response.body_bytes.is_empty() {
        if is_success {
            return Ok(());
        }
        let status = req.response.status_code();
        return Err(Error::Status {
            status,
            message: format!("http request {method} {url} failed with status code {status}"),
            source: None,
        });
    }

    if !is_success
        && req.response.do_unmarshal
        && req.response.error_target.is_none()
        && let Some(factory) = req.client.error_shape()
    {
        req.response.error_target = Some(factory());
    }

    let did_unmarshal = match unmarshal_body(req, is_success) {
        Ok(did) => did,
        Err(source) => {
            if is_success {
                return Err(Error::Unmarshal {
                    method,
                    url,
                    source,
                });
            }
            // Error bodies decode best-effort; fall back to the raw body.
            false
        }
    };

    if is_success {
        return Ok(());
    }

    let status = req.response.status_code();
    let prefix = format!("http request {method} {url} failed: status {status}");
    let (detail, source) = match (&mut req.response.error_target, did_unmarshal) {
        (Some(target), true) => match target.error_message() {
            Some(message) => {
                let source = target.take_source();
                (message, source)
            }
            None => (target.debug_render(), None),
        },
        _ => (
            String::from_utf8_lossy(&req.response.body_bytes).into_owned(),
            None,
        ),
    };

    Err(Error::Status {
        status,
        message: format!("{prefix}: {detail}"),
        source,
    })
}

/// Read the response body, honoring the body limit, or hand the live
/// stream over when the request asked for one and the response succeeded.
async fn read_body(
    req: &mut Request<'_>,
    raw: reqwest::Response,
    is_success: bool,
    method: &Method,
    url: &str,
) -> Result<()> {
    if is_success && let Some(ResponseTarget::Stream(slot)) = &mut req.response.target {
        let stream = raw
            .bytes_stream()
            .map(|chunk| chunk.map_err(|error| Box::new(error) as BoxError));
        **slot = Some(Box::pin(stream));
        req.response.do_unmarshal = false;
        return Ok(());
    }

    let limit = req.response.body_limit;
    let mut raw = raw;
    let mut body: Vec<u8> = Vec::new();
    while limit.is_none_or(|limit| (body.len() as u64) < limit) {
        let chunk = raw.chunk().await.map_err(|source| Error::ReadBody {
            method: method.clone(),
            url: url.to_string(),
            source: Box::new(source),
        })?;
        let Some(chunk) = chunk else { break };
        let take = match limit {
            Some(limit) => {
                let remaining = limit - body.len() as u64;
                (chunk.len() as u64).min(remaining) as usize
            }
            None => chunk.len(),
        };
        body.extend_from_slice(&chunk[..take]);
    }
    req.response.body_bytes = body;

    if !req.response.body_bytes.is_empty()
        && let Some(ResponseTarget::Bytes(dest)) = &mut req.response.target
    {
        **dest = req.response.body_bytes.clone();
        req.response.do_unmarshal = false;
    }

    Ok(())
}

/// Decode the buffered body into the applicable destination. Returns
/// whether a codec ran.
fn unmarshal_body(req: &mut Request<'_>, is_success: bool) -> std::result::Result<bool, BoxError> {
    if !req.response.do_unmarshal {
        return Ok(false);
    }

    if is_success {
        match req.response.target.take() {
            Some(ResponseTarget::Structured(mut dest)) => {
                let result = decode_into(req, dest.as_mut());
                req.response.target = Some(ResponseTarget::Structured(dest));
                result
            }
            other => {
                req.response.target = other;
                Ok(false)
            }
        }
    } else {
        match req.response.error_target.take() {
            Some(mut dest) => {
                let result = decode_into(req, dest.as_mut());
                req.response.error_target = Some(dest);
                result
            }
            None => Ok(false),
        }
    }
}

fn decode_into(
    req: &Request<'_>,
    dest: &mut dyn DecodeTarget,
) -> std::result::Result<bool, BoxError> {
    let content_type = req.response.content_type().to_string();
    if req.response.force_json || is_json_content_type(&content_type) {
        (req.overridables.json_unmarshal)(req, &req.response.body_bytes, dest)?;
        return Ok(true);
    }
    if req.response.force_xml || is_xml_content_type(&content_type) {
        (req.overridables.xml_unmarshal)(req, &req.response.body_bytes, dest)?;
        return Ok(true);
    }
    if !req.response.body_bytes.is_empty() {
        return Err(Box::new(Error::NotUnmarshaled));
    }
    Ok(false)
}
