//! Per-call request builder and execution pipeline.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use http::{HeaderName, HeaderValue, Method, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::body::{
    Body, BodyStream, BorrowedErrorSlot, Encodable, ResponseTarget, TypedSlot,
    is_json_content_type, is_xml_content_type,
};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::overridable::Overridables;
use crate::path::{expand_path, resolve_url};
use crate::response::Response;

/// A single REST call in the making.
///
/// Created by [`Client::request`], configured through chainable setters and
/// run with one of the verb methods. The request stays usable after
/// execution, so its [`Response`] state can still be inspected.
pub struct Request<'a> {
    pub(crate) client: &'a Client,
    pub(crate) method: Method,
    pub(crate) path: String,
    base_url: Option<String>,
    headers: Vec<(String, String)>,
    query: Vec<(String, Vec<String>)>,
    path_params: Vec<String>,
    body: Option<Body<'a>>,
    body_bytes: Option<Vec<u8>>,
    content_length: Option<u64>,
    timeout: Option<Duration>,
    token_request: bool,
    trace_body: bool,
    final_url: Option<String>,
    envelope: Option<reqwest::Request>,
    pub(crate) overridables: Overridables,
    pub(crate) response: Response<'a>,
}

impl<'a> Request<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        let config = client.config();
        let mut req = Self {
            client,
            method: Method::GET,
            path: String::new(),
            base_url: None,
            headers: Vec::new(),
            query: Vec::new(),
            path_params: Vec::new(),
            body: None,
            body_bytes: None,
            content_length: None,
            timeout: None,
            token_request: false,
            trace_body: config.trace_bodies,
            final_url: None,
            envelope: None,
            overridables: client.overridables().clone(),
            response: Response::new(config.response_body_limit, config.trace_bodies),
        };
        if !config.content_type.is_empty() {
            req = req.content_type(config.content_type.clone());
        }
        if !config.authorization.is_empty() {
            req = req.authorization(config.authorization.clone());
        }
        req
    }

    /// Override the client base URL for this request.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set a header, replacing any previous value for the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        self.headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
        self.headers.push((name, value));
        self
    }

    /// Set a header only when `condition` holds.
    pub fn header_if(
        self,
        condition: bool,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        if condition { self.header(name, value) } else { self }
    }

    /// Set a query parameter, replacing any previous values for the key.
    pub fn query(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_values(key, [value])
    }

    /// Set a multi-valued query parameter, replacing any previous values
    /// for the key.
    pub fn query_values<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let key = key.into();
        let values = values.into_iter().map(Into::into).collect();
        self.query.retain(|(existing, _)| existing != &key);
        self.query.push((key, values));
        self
    }

    /// Set a query parameter only when `condition` holds.
    pub fn query_if(self, condition: bool, key: impl Into<String>, value: impl Into<String>) -> Self {
        if condition { self.query(key, value) } else { self }
    }

    /// Provide name/value pairs for `{name}` placeholders in the path.
    pub fn path_params<I, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path_params = pairs.into_iter().map(Into::into).collect();
        self
    }

    /// Send `body` as the payload, marshaled according to the request
    /// content type.
    pub fn body<T>(mut self, body: T) -> Self
    where
        T: Serialize + Send + 'a,
    {
        self.body = Some(Body::Structured(Box::new(body)));
        self
    }

    /// Send raw bytes as the payload.
    pub fn body_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body = Some(Body::Bytes(bytes.into()));
        self
    }

    /// Send text as the payload.
    pub fn body_text(mut self, text: impl Into<String>) -> Self {
        self.body = Some(Body::Text(text.into()));
        self
    }

    /// Send a streaming payload. The stream is handed to the transport
    /// untouched and is not captured for tracing.
    pub fn body_stream(mut self, stream: impl Into<reqwest::Body>) -> Self {
        self.body = Some(Body::Stream(stream.into()));
        self
    }

    /// Set the Content-Type header.
    pub fn content_type(self, content_type: impl Into<String>) -> Self {
        self.header("Content-Type", content_type)
    }

    /// Set the Content-Type header to `application/json`.
    pub fn content_type_json(self) -> Self {
        self.content_type("application/json")
    }

    /// Set the Content-Type header to `text/xml`.
    pub fn content_type_xml(self) -> Self {
        self.content_type("text/xml")
    }

    /// Set the Authorization header.
    pub fn authorization(self, value: impl Into<String>) -> Self {
        self.header("Authorization", value)
    }

    /// Use basic authentication for this request.
    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        self.authorization(format!("Basic {}", encode_basic_auth(username, password)))
    }

    /// Use bearer authentication for this request.
    ///
    /// The token must not carry the `Bearer ` prefix.
    pub fn bearer_auth(self, token: impl Into<String>) -> Self {
        self.authorization(format!("Bearer {}", token.into()))
    }

    /// Mark this request as a token request. Token requests never receive
    /// an injected bearer token, so token endpoints cannot recurse.
    pub fn token_request(mut self) -> Self {
        self.token_request = true;
        self
    }

    /// Override the Content-Length header.
    pub fn content_length(mut self, length: u64) -> Self {
        self.content_length = Some(length);
        self
    }

    /// Set a timeout for this single request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Treat exactly these status codes as success, replacing the 2xx rule.
    pub fn success_statuses<I: IntoIterator<Item = u16>>(mut self, statuses: I) -> Self {
        self.response.success_statuses = statuses.into_iter().collect();
        self
    }

    /// Force JSON unmarshaling regardless of the response content type.
    pub fn force_json(mut self) -> Self {
        self.response.force_json = true;
        self
    }

    /// Force XML unmarshaling regardless of the response content type.
    pub fn force_xml(mut self) -> Self {
        self.response.force_xml = true;
        self
    }

    /// Limit the response body to `limit` bytes for this request.
    pub fn response_body_limit(mut self, limit: Option<u64>) -> Self {
        self.response.body_limit = limit;
        self
    }

    /// Include or exclude the request body from trace output.
    pub fn trace_request_body(mut self, enabled: bool) -> Self {
        self.trace_body = enabled;
        self
    }

    /// Include or exclude the response body from trace output.
    pub fn trace_response_body(mut self, enabled: bool) -> Self {
        self.response.trace_body = enabled;
        self
    }

    /// Decode a successful response into `dest` according to the response
    /// content type.
    pub fn response_body<T>(mut self, dest: &'a mut T) -> Self
    where
        T: DeserializeOwned + Send,
    {
        self.response.target = Some(ResponseTarget::Structured(Box::new(TypedSlot(dest))));
        self
    }

    /// Copy the raw response body into `dest` without decoding it.
    pub fn response_bytes(mut self, dest: &'a mut Vec<u8>) -> Self {
        self.response.target = Some(ResponseTarget::Bytes(dest));
        self
    }

    /// Hand the response body over as a live stream on success. Failed
    /// responses are buffered and processed as usual.
    pub fn response_stream(mut self, dest: &'a mut Option<BodyStream>) -> Self {
        self.response.target = Some(ResponseTarget::Stream(dest));
        self
    }

    /// Store the response Content-Length in `dest`, when the transport
    /// reports one.
    pub fn response_content_length(mut self, dest: &'a mut Option<u64>) -> Self {
        self.response.content_length_dest = Some(dest);
        self
    }

    /// Decode the body of a failed response into `dest`.
    ///
    /// Takes precedence over an error type declared on the client.
    pub fn error_body<E>(mut self, dest: &'a mut E) -> Self
    where
        E: DeserializeOwned + Send + fmt::Debug,
    {
        self.response.error_target = Some(Box::new(BorrowedErrorSlot(dest)));
        self
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path after placeholder expansion.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Final URL, available once the request was built.
    pub fn url(&self) -> Option<&str> {
        self.final_url.as_deref()
    }

    /// Headers set on this request.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Look up a header value by name, case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Captured request body bytes, available once the request was built.
    /// `None` for streaming payloads.
    pub fn sent_body(&self) -> Option<&[u8]> {
        self.body_bytes.as_deref()
    }

    /// Whether this request is itself a token request.
    pub fn is_token_request(&self) -> bool {
        self.token_request
    }

    /// Whether the request body is included in trace output.
    pub fn traces_request_body(&self) -> bool {
        self.trace_body
    }

    /// Response state of this request.
    pub fn response(&self) -> &Response<'a> {
        &self.response
    }

    /// Execute as GET.
    pub async fn get(&mut self, path: impl Into<String>) -> Result<()> {
        self.execute(Method::GET, path).await
    }

    /// Execute as HEAD.
    pub async fn head(&mut self, path: impl Into<String>) -> Result<()> {
        self.execute(Method::HEAD, path).await
    }

    /// Execute as POST.
    pub async fn post(&mut self, path: impl Into<String>) -> Result<()> {
        self.execute(Method::POST, path).await
    }

    /// Execute as PUT.
    pub async fn put(&mut self, path: impl Into<String>) -> Result<()> {
        self.execute(Method::PUT, path).await
    }

    /// Execute as PATCH.
    pub async fn patch(&mut self, path: impl Into<String>) -> Result<()> {
        self.execute(Method::PATCH, path).await
    }

    /// Execute as DELETE.
    pub async fn delete(&mut self, path: impl Into<String>) -> Result<()> {
        self.execute(Method::DELETE, path).await
    }

    /// Execute as CONNECT.
    pub async fn connect(&mut self, path: impl Into<String>) -> Result<()> {
        self.execute(Method::CONNECT, path).await
    }

    /// Execute as OPTIONS.
    pub async fn options(&mut self, path: impl Into<String>) -> Result<()> {
        self.execute(Method::OPTIONS, path).await
    }

    /// Execute as TRACE.
    pub async fn trace(&mut self, path: impl Into<String>) -> Result<()> {
        self.execute(Method::TRACE, path).await
    }

    /// Execute with an explicit method, expanding path placeholders first.
    pub async fn execute(&mut self, method: Method, path: impl Into<String>) -> Result<()> {
        self.method = method;
        self.path = expand_path(&path.into(), &self.path_params);
        let execute = self.overridables.execute.clone();
        execute(self).await
    }

    pub(crate) fn put_mock_response(&mut self, data: &[u8]) -> Result<()> {
        match self.response.target.take() {
            Some(ResponseTarget::Structured(mut dest)) => {
                let result = dest.put_json(data).map_err(|source| Error::Unmarshal {
                    method: self.method.clone(),
                    url: self.path.clone(),
                    source,
                });
                self.response.target = Some(ResponseTarget::Structured(dest));
                result
            }
            other => {
                self.response.target = other;
                Err(Error::InvalidRequest(
                    "response destination is not set".to_string(),
                ))
            }
        }
    }
}

pub(crate) fn encode_basic_auth(username: &str, password: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"))
}

/// Build the request envelope handed to the transport.
///
/// Building happens at most once per request: a second call on an
/// already-built request is a no-op, and a request that is executed again
/// rebuilds the envelope from its stored parts.
pub(crate) async fn build_envelope(req: &mut Request<'_>) -> Result<()> {
    if req.envelope.is_some() {
        return Ok(());
    }

    let base_url = match &req.base_url {
        Some(base) => base.as_str(),
        None => req.client.config().base_url.as_str(),
    };
    let final_url = resolve_url(base_url, &req.path);

    let content_type = req
        .header_value("Content-Type")
        .unwrap_or_default()
        .to_string();

    let streaming = matches!(req.body, Some(Body::Stream(_)));
    let mut payload: Option<reqwest::Body> = None;
    if streaming {
        if let Some(Body::Stream(stream)) = req.body.take() {
            payload = Some(stream);
        }
    } else if let Some(body) = &req.body {
        let bytes = match body {
            Body::Bytes(bytes) => bytes.clone(),
            Body::Text(text) => text.clone().into_bytes(),
            Body::Structured(value) => marshal_struct(req, value.as_ref(), &content_type)?,
            Body::Stream(_) => Vec::new(),
        };
        req.body_bytes = Some(bytes.clone());
        // A body that materializes empty is sent as no body at all.
        if !bytes.is_empty() {
            payload = Some(bytes.into());
        }
    }

    let url = Url::parse(&final_url)
        .map_err(|e| Error::InvalidRequest(format!("invalid url {final_url:?}: {e}")))?;
    let mut envelope = reqwest::Request::new(req.method.clone(), url);
    *envelope.body_mut() = payload;

    for (name, value) in &req.headers {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|e| Error::InvalidRequest(format!("invalid header name {name:?}: {e}")))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|e| Error::InvalidRequest(format!("invalid header value for {name}: {e}")))?;
        envelope.headers_mut().insert(name, value);
    }

    if let Some(length) = req.content_length {
        envelope
            .headers_mut()
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    if envelope.body().is_none() {
        envelope.headers_mut().remove(header::CONTENT_TYPE);
    }

    if let Some(provider) = req.client.token_provider()
        && !req.token_request
    {
        let token = req
            .client
            .token_cache()
            .get_valid_token(provider.as_ref())
            .await
            .map_err(|source| Error::Token {
                method: req.method.clone(),
                url: final_url.clone(),
                source: Box::new(source),
            })?;
        let value = HeaderValue::try_from(format!("Bearer {}", token.value()))
            .map_err(|e| Error::InvalidRequest(format!("invalid bearer token: {e}")))?;
        envelope.headers_mut().insert(header::AUTHORIZATION, value);
    }

    if !req.query.is_empty() {
        let url = envelope.url_mut();
        url.query_pairs_mut().clear();
        for (key, values) in &req.query {
            for value in values {
                url.query_pairs_mut().append_pair(key, value);
            }
        }
        if let Some("") = url.query() {
            url.set_query(None);
        }
    }

    if let Some(timeout) = req.timeout {
        *envelope.timeout_mut() = Some(timeout);
    }

    req.final_url = Some(final_url);
    req.envelope = Some(envelope);
    Ok(())
}

fn marshal_struct(
    req: &Request<'_>,
    value: &dyn Encodable,
    content_type: &str,
) -> Result<Vec<u8>> {
    if content_type.is_empty() {
        return Err(Error::InvalidRequest(
            "content type must not be empty when the request carries a structured body"
                .to_string(),
        ));
    }
    let bytes = if is_json_content_type(content_type) {
        (req.overridables.json_marshal)(req, value)
    } else if is_xml_content_type(content_type) {
        (req.overridables.xml_marshal)(req, value)
    } else {
        return Err(Error::UnsupportedContentType(content_type.to_string()));
    };
    bytes.map_err(|source| Error::Marshal { source })
}

/// Default end-to-end execution: build the envelope, run the trace hook,
/// send through the transport and process the response.
pub(crate) async fn execute_parts(req: &mut Request<'_>) -> Result<()> {
    build_envelope(req).await?;
    let Some(envelope) = req.envelope.take() else {
        return Err(Error::InvalidRequest("request was not built".to_string()));
    };

    let span = req.client.trace_hook().map(|hook| hook.on_start(req));

    let url = req.final_url.clone().unwrap_or_default();
    match (req.trace_body, &req.body_bytes) {
        (true, Some(body)) => debug!(
            method = %req.method,
            url = %url,
            headers = req.headers.len(),
            body = %String::from_utf8_lossy(body),
            "executing http request"
        ),
        _ => debug!(
            method = %req.method,
            url = %url,
            headers = req.headers.len(),
            "executing http request"
        ),
    }

    let transport = req.overridables.transport.clone();
    let result = transport.send(envelope).await;
    crate::response::process(req, result).await;

    match &req.response.error {
        Some(error) => {
            debug!(method = %req.method, url = %url, error = %error, "executed http request");
        }
        None if req.response.trace_body && !req.response.body_bytes.is_empty() => debug!(
            method = %req.method,
            url = %url,
            status = req.response.status_code(),
            body = %String::from_utf8_lossy(&req.response.body_bytes),
            "executed http request"
        ),
        None => debug!(
            method = %req.method,
            url = %url,
            status = req.response.status_code(),
            "executed http request"
        ),
    }

    if let Some(mut span) = span {
        span.on_after_request(req);
        span.end();
    }

    match req.response.error.take() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}
