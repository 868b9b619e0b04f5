//! Prometheus text exposition format.
//!
//! Renders a [`Snapshot`] into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use crate::store::Snapshot;

/// Content type of the rendered exposition.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render a snapshot into Prometheus text format.
///
/// Every registered family gets its `# HELP` and `# TYPE` lines, even
/// before any value has been published for it.
pub fn render_prometheus(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    for family in &snapshot.families {
        out.push_str(&format!(
            "# HELP {} {}\n",
            family.name,
            escape_help(&family.help)
        ));
        out.push_str(&format!("# TYPE {} gauge\n", family.name));

        for sample in snapshot
            .samples
            .iter()
            .filter(|s| s.key.metric == family.name)
        {
            out.push_str(&format!(
                "{}{{{}=\"{}\"}} {}\n",
                family.name,
                family.label,
                escape_label_value(&sample.key.label),
                format_value(sample.value)
            ));
        }
    }

    out
}

fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}
