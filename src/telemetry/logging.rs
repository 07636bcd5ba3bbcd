//! Configures tracing output for the batch submitter.

use eyre::Result;
use tracing::subscriber::set_global_default;
use tracing::{Level, Subscriber};
use tracing_log::LogTracer;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Layer, Registry};

use ansi_term::Colour::{Blue, Cyan, Purple, Red, Yellow};

/// Configure logging telemetry
pub fn init(verbose: bool) -> Result<()> {
    let default_filter = match verbose {
        true => "balthasar=debug",
        false => "balthasar=info",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = Registry::default().with(env_filter).with(TermLayer);
    init_subscriber(subscriber)
}

/// Globally registers a subscriber.
/// This will error if a subscriber has already been registered.
fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> Result<()> {
    LogTracer::init().map_err(|_| eyre::eyre!("Failed to set logger"))?;
    set_global_default(subscriber).map_err(|_| eyre::eyre!("Failed to set subscriber"))
}

/// A terminal layer for tracing, coloured with ansi_term.
#[derive(Debug)]
struct TermLayer;

impl<S> Layer<S> for TermLayer
where
    S: Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let timestamp = chrono::Utc::now().to_rfc2822();
        let level = match *event.metadata().level() {
            Level::ERROR => Red.paint("ERROR").to_string(),
            Level::WARN => Yellow.paint("WARN").to_string(),
            Level::INFO => Blue.paint("INFO").to_string(),
            Level::DEBUG => "DEBUG".to_string(),
            Level::TRACE => Purple.paint("TRACE").to_string(),
        };

        let mut fields = FieldVisitor::default();
        event.record(&mut fields);

        println!(
            "[{}] {}: {} {}",
            Cyan.paint(timestamp),
            level,
            Purple.paint(event.metadata().target()),
            fields.0.trim_end(),
        );
    }
}

/// Collects an event's fields into a single printable line.
#[derive(Debug, Default)]
struct FieldVisitor(String);

impl tracing::field::Visit for FieldVisitor {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(&format!("{value} "));
        } else {
            self.0.push_str(&format!("{}={value} ", field.name()));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{value:?} "));
        } else {
            self.0.push_str(&format!("{}={value:?} ", field.name()));
        }
    }
}
