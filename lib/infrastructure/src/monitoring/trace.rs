use std::collections::HashMap;

use opentelemetry::{propagation::TextMapPropagator, trace::TraceContextExt};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Carries an OpenTelemetry context across task boundaries, e.g. from the caller that enqueued a write
/// to the background task that dispatches it.
#[derive(Debug, Clone)]
pub struct TraceContext {
    otel_ctx: opentelemetry::Context,
}

impl TraceContext {
    pub fn current() -> Option<Self> {
        let ctx: opentelemetry::Context = Span::current().context();
        let span = ctx.span();
        let span_context = span.span_context();

        if span_context.is_valid() {
            Some(Self { otel_ctx: ctx })
        } else {
            None
        }
    }

    pub fn from_correlation_id(correlation_id: &str) -> Self {
        let propagator = TraceContextPropagator::default();

        let mut ctx: HashMap<String, String> = HashMap::new();
        ctx.insert("traceparent".to_string(), correlation_id.to_string());

        Self {
            otel_ctx: propagator.extract(&ctx),
        }
    }

    pub fn continue_from(correlation_id: &Option<String>) {
        if let Some(id) = correlation_id {
            Self::from_correlation_id(id.as_str()).make_parent_of(&Span::current());
        }
    }

    pub fn make_parent_of(&self, span: &Span) {
        span.set_parent(self.otel_ctx.clone());
    }

    pub fn current_correlation_id() -> Option<String> {
        Self::current().map(|c| c.correlation_id())
    }

    pub fn correlation_id(&self) -> String {
        let propagator = TraceContextPropagator::default();

        let mut headers: HashMap<String, String> = HashMap::new();
        propagator.inject_context(&self.otel_ctx, &mut headers);

        headers.get("traceparent").cloned().unwrap_or_default()
    }

    pub fn trace_id(&self) -> String {
        self.otel_ctx.span().span_context().trace_id().to_string()
    }

    pub fn span_id(&self) -> String {
        self.otel_ctx.span().span_context().span_id().to_string()
    }

    pub fn record(field: &'static str, value: &dyn std::fmt::Display) {
        Span::current().record(field, tracing::field::display(value));
    }
}
