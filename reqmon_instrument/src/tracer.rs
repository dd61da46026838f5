use std::fmt::Debug;

use tracing::field::Empty;

use crate::RequestInfo;

/// Opens a span for each traced request
pub trait RequestTracer: Debug + Send + Sync + 'static {
    fn start_span(&self, request: &RequestInfo) -> Box<dyn ActiveSpan>;
}

/// An open request span
pub trait ActiveSpan: Debug + Send + Sync {
    fn set_tag(&mut self, key: &str, value: &str);

    /// Close the span, consuming it
    fn finish(self: Box<Self>);
}

/// [`RequestTracer`] that opens a [`tracing`] span per request
///
/// Tags are recorded into the span's fields, tags other than the standard request tags
/// are ignored. The handler tags `<component>.resource.module` and
/// `<component>.resource.func` are recorded as `resource.module` and `resource.func`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSpans;

impl TracingSpans {
    pub fn new() -> Self {
        Self
    }
}

impl RequestTracer for TracingSpans {
    fn start_span(&self, request: &RequestInfo) -> Box<dyn ActiveSpan> {
        let span = tracing::info_span!(
            "request",
            http.method = %request.method(),
            http.url = %request.url(),
            http.status_code = Empty,
            error = Empty,
            span.kind = Empty,
            component = Empty,
            resource.module = Empty,
            resource.func = Empty,
        );
        Box::new(TracingSpan { span })
    }
}

#[derive(Debug)]
struct TracingSpan {
    span: tracing::Span,
}

impl ActiveSpan for TracingSpan {
    fn set_tag(&mut self, key: &str, value: &str) {
        let field = if key.ends_with(".resource.module") {
            "resource.module"
        } else if key.ends_with(".resource.func") {
            "resource.func"
        } else {
            key
        };
        self.span.record(field, value);
    }

    fn finish(self: Box<Self>) {
        // the span closes once its last handle is dropped
        drop(self.span);
    }
}
