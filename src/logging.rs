use colored::Colorize;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Colorizes each log line by severity for operator-facing output.
///
/// The harness shares the terminal with the interactive prompt, so lines are
/// kept free of timestamps and level prefixes; color alone carries severity.
pub struct OperatorFormatter;

impl<S, N> FormatEvent<S, N> for OperatorFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        // Fields are buffered first so color applies to the whole line.
        let mut buffer = String::new();
        let mut buf_writer = Writer::new(&mut buffer);
        ctx.format_fields(buf_writer.by_ref(), event)?;

        let colored_line = match *event.metadata().level() {
            Level::ERROR => buffer.red().bold(),
            Level::WARN => buffer.yellow(),
            Level::INFO => buffer.normal(),
            Level::DEBUG => buffer.cyan(),
            Level::TRACE => buffer.dimmed(),
        };

        writeln!(writer, "{}", colored_line)
    }
}
