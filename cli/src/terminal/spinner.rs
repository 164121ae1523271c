use colored::*;
use indicatif::ProgressStyle;
use tracing::Span;
use tracing_indicatif::span_ext::IndicatifSpanExt;

const TICKS: &[&str] = &[
    "▁▁▁▁▁",
    "▁▂▂▂▁",
    "▁▄▂▄▁",
    "▂▄▆▄▂",
    "▄▆█▆▄",
    "▂▄▆▄▂",
    "▁▄▂▄▁",
    "▁▂▂▂▁",
    "▁▁▁▁▁",
];

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS)
}

/// Renders `span` as a spinner for as long as it is entered.
pub fn attach(span: &Span, message: &str) {
    span.pb_set_style(&spinner_style());
    span.pb_set_message(message);
}

pub fn report_discovery_progress(span: &Span, count: usize) {
    span.pb_set_message(&format!(
        "Identified {} devices so far...",
        count.to_string().green().bold()
    ));
}
