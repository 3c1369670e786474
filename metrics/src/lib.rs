//! Logging initialisation and the [`Recorder`] seam used by BlockUDP services to report what they do.
pub mod config;

use crate::config::{Config, LogFormat};
use tracing::{debug, metadata::LevelFilter};
use tracing_subscriber::{
    fmt::{
        self,
        format::{Compact, DefaultFields, Json, JsonFields, Pretty},
        time::SystemTime,
        FormatEvent, FormatFields,
    },
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Recorder that can record metrics about an event.
pub trait Recorder<Event> {
    /// Record the given event.
    fn record(&self, event: &Event);
}

impl<S, Event> Recorder<Event> for std::sync::Arc<S>
where
    S: Recorder<Event>,
{
    fn record(&self, event: &Event) {
        self.as_ref().record(event);
    }
}

/// A recorder that drops every event, for callers that do not export metrics.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl<Event> Recorder<Event> for NoopRecorder {
    fn record(&self, _event: &Event) {}
}

// Implement a FormatEvent type that can be configured to one of a set of log formats.
struct EventFormat {
    kind: LogFormat,
    single: tracing_subscriber::fmt::format::Format<Compact, SystemTime>,
    multi: tracing_subscriber::fmt::format::Format<Pretty, SystemTime>,
    json: tracing_subscriber::fmt::format::Format<Json, SystemTime>,
}

impl EventFormat {
    fn new(kind: LogFormat) -> Self {
        Self {
            kind,
            single: fmt::format().compact(),
            multi: fmt::format().pretty(),
            json: fmt::format().json(),
        }
    }
}

impl<S, N> FormatEvent<S, N> for EventFormat
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
    N: for<'a> fmt::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &fmt::FmtContext<'_, S, N>,
        writer: fmt::format::Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        match self.kind {
            LogFormat::SingleLine => self.single.format_event(ctx, writer, event),
            LogFormat::MultiLine => self.multi.format_event(ctx, writer, event),
            LogFormat::Json => self.json.format_event(ctx, writer, event),
        }
    }
}

// Implement a FormatFields type that can be configured to one of a set of log formats.
pub struct FieldsFormat {
    kind: LogFormat,
    default_fields: DefaultFields,
    json_fields: JsonFields,
}

impl FieldsFormat {
    pub fn new(kind: LogFormat) -> Self {
        Self {
            kind,
            default_fields: DefaultFields::new(),
            json_fields: JsonFields::new(),
        }
    }
}

impl<'writer> FormatFields<'writer> for FieldsFormat {
    fn format_fields<R: tracing_subscriber::prelude::__tracing_subscriber_field_RecordFields>(
        &self,
        writer: fmt::format::Writer<'writer>,
        fields: R,
    ) -> std::fmt::Result {
        match self.kind {
            LogFormat::SingleLine | LogFormat::MultiLine => {
                self.default_fields.format_fields(writer, fields)
            }
            LogFormat::Json => self.json_fields.format_fields(writer, fields),
        }
    }
}

/// Initialize the tracing subsystem.
///
/// The log level defaults to INFO and can be overridden with `RUST_LOG`.
pub fn init_tracing(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let filter_builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());

    let log_filter = filter_builder.from_env()?;

    // Configure both the fields and event formats.
    let fields_format = FieldsFormat::new(cfg.log_format.clone());
    let event_format = EventFormat::new(cfg.log_format.clone());

    let log_subscriber = fmt::layer()
        // The JSON format ignore the ansi setting and always format without colors.
        .with_ansi(cfg.ansi)
        .event_format(event_format)
        .fmt_fields(fields_format)
        .with_filter(log_filter);

    tracing_subscriber::registry()
        .with(log_subscriber)
        .try_init()?;

    debug!(
        service_name = %cfg.service_name,
        version = %cfg.version,
        log_format = ?cfg.log_format,
        "tracing initialized"
    );
    Ok(())
}
