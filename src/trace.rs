//! Per-request trace hooks.

use tracing::Span;

use crate::request::Request;

/// Observer factory consulted once per executed request.
///
/// A hook only runs after the request was built successfully. It gets read
/// access to the full request state before the transport call and again
/// after the response was processed.
pub trait TraceHook: Send + Sync {
    /// Called just before the request is handed to the transport.
    fn on_start(&self, req: &Request<'_>) -> Box<dyn TraceSpan>;
}

/// Per-request trace created by a [`TraceHook`].
pub trait TraceSpan: Send {
    /// Called after the transport call was processed, on success and on
    /// failure.
    fn on_after_request(&mut self, req: &Request<'_>);

    /// Close the trace.
    fn end(self: Box<Self>);
}

/// Trace hook that records nothing.
pub struct NopTraceHook;

impl TraceHook for NopTraceHook {
    fn on_start(&self, _req: &Request<'_>) -> Box<dyn TraceSpan> {
        Box::new(NopTraceSpan)
    }
}

struct NopTraceSpan;

impl TraceSpan for NopTraceSpan {
    fn on_after_request(&mut self, _req: &Request<'_>) {}

    fn end(self: Box<Self>) {}
}

/// Trace hook recording each request on a `tracing` debug span.
///
/// Records method, URL and headers up front and fills in status and error
/// after the request ran. Bodies are recorded when body tracing is enabled.
/// The Authorization header value is redacted.
pub struct SpanTraceHook;

impl TraceHook for SpanTraceHook {
    fn on_start(&self, req: &Request<'_>) -> Box<dyn TraceSpan> {
        let span = tracing::debug_span!(
            "http_request",
            method = %req.method(),
            url = req.url().unwrap_or_default(),
            headers = %format_headers(req.headers()),
            body = tracing::field::Empty,
            status = tracing::field::Empty,
            response_body = tracing::field::Empty,
            error = tracing::field::Empty,
        );
        if req.traces_request_body()
            && let Some(body) = req.sent_body()
        {
            span.record("body", tracing::field::display(String::from_utf8_lossy(body)));
        }
        Box::new(SpanTrace { span })
    }
}

struct SpanTrace {
    span: Span,
}

impl TraceSpan for SpanTrace {
    fn on_after_request(&mut self, req: &Request<'_>) {
        let response = req.response();
        if let Some(status) = response.status() {
            self.span.record("status", status.as_u16());
        }
        if response.traces_body() && !response.body().is_empty() {
            self.span.record(
                "response_body",
                tracing::field::display(String::from_utf8_lossy(response.body())),
            );
        }
        if let Some(error) = response.error() {
            self.span.record("error", tracing::field::display(error));
        }
    }

    fn end(self: Box<Self>) {}
}

/// Render headers for trace output with the Authorization value redacted.
pub(crate) fn format_headers(headers: &[(String, String)]) -> String {
    let mut out = String::new();
    for (name, value) in headers {
        if !out.is_empty() {
            out.push_str(", ");
        }
        out.push_str(name);
        out.push_str(": ");
        if name.eq_ignore_ascii_case("authorization") {
            out.push_str("<redacted>");
        } else {
            out.push_str(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tracing::field::{Field, Visit};
    use tracing::span::{Attributes, Id, Record};
    use tracing::{Event, Metadata, Subscriber};

    use crate::client::Client;
    use crate::mock::{MockResponse, MockTransport};

    /// Collects every field recorded on a span, by name.
    #[derive(Clone, Default)]
    struct FieldSubscriber {
        fields: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl FieldSubscriber {
        fn value(&self, name: &str) -> Option<String> {
            self.fields
                .lock()
                .iter()
                .find(|(field, _)| field == name)
                .map(|(_, value)| value.clone())
        }
    }

    struct FieldVisitor<'a>(&'a Mutex<Vec<(String, String)>>);

    impl Visit for FieldVisitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.0
                .lock()
                .push((field.name().to_string(), format!("{value:?}")));
        }
    }

    impl Subscriber for FieldSubscriber {
        fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
            true
        }

        fn new_span(&self, attrs: &Attributes<'_>) -> Id {
            attrs.record(&mut FieldVisitor(&self.fields));
            Id::from_u64(1)
        }

        fn record(&self, _span: &Id, values: &Record<'_>) {
            values.record(&mut FieldVisitor(&self.fields));
        }

        fn record_follows_from(&self, _span: &Id, _follows: &Id) {}

        fn event(&self, _event: &Event<'_>) {}

        fn enter(&self, _span: &Id) {}

        fn exit(&self, _span: &Id) {}
    }

    #[tokio::test]
    async fn test_span_records_bodies_when_enabled() {
        let subscriber = FieldSubscriber::default();
        let _guard = tracing::subscriber::set_default(subscriber.clone());

        let transport = Arc::new(MockTransport::with_response(MockResponse::json(
            200,
            r#"{"pong": 1}"#,
        )));
        let client =
            Client::new_with_transport(transport).with_trace_hook(Arc::new(SpanTraceHook));
        let mut req = client.request().content_type("text/plain").body_text("ping");
        req.post("http://svc.local/ping").await.unwrap();

        assert_eq!(subscriber.value("body").as_deref(), Some("ping"));
        assert_eq!(
            subscriber.value("response_body").as_deref(),
            Some(r#"{"pong": 1}"#)
        );
    }

    #[tokio::test]
    async fn test_span_skips_bodies_when_disabled() {
        let subscriber = FieldSubscriber::default();
        let _guard = tracing::subscriber::set_default(subscriber.clone());

        let transport = Arc::new(MockTransport::with_response(MockResponse::json(
            200,
            r#"{"pong": 1}"#,
        )));
        let client = Client::new_with_transport(transport)
            .with_trace_bodies(false)
            .with_trace_hook(Arc::new(SpanTraceHook));
        let mut req = client.request().content_type("text/plain").body_text("ping");
        req.post("http://svc.local/ping").await.unwrap();

        assert_eq!(subscriber.value("body"), None);
        assert_eq!(subscriber.value("response_body"), None);
        assert!(subscriber.value("status").is_some());
    }

    #[test]
    fn test_format_headers_redacts_authorization() {
        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), "Bearer secret".to_string()),
        ];
        let rendered = format_headers(&headers);
        assert_eq!(
            rendered,
            "Content-Type: application/json, Authorization: <redacted>"
        );
    }

    #[test]
    fn test_format_headers_redacts_any_case() {
        let headers = vec![("authorization".to_string(), "Basic abc".to_string())];
        assert_eq!(format_headers(&headers), "authorization: <redacted>");
    }

    #[test]
    fn test_format_headers_empty() {
        assert_eq!(format_headers(&[]), "");
    }
}
