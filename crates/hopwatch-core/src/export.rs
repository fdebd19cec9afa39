//! Plain text rendering of trace rows.

use crate::state::TraceRow;
use std::fmt::Write as _;
use std::io;

/// Write each row as a line of text.
pub fn write_rows<W: io::Write>(writer: &mut W, rows: &[TraceRow]) -> io::Result<()> {
    for row in rows {
        writeln!(writer, "{}", format_row(row))?;
    }
    Ok(())
}

/// Render rows as text, one line per row.
#[must_use]
pub fn to_text(rows: &[TraceRow]) -> String {
    rows.iter().fold(String::new(), |mut text, row| {
        let _ = writeln!(text, "{}", format_row(row));
        text
    })
}

/// Render a single row.
///
/// Round trip times are in milliseconds.
#[must_use]
pub fn format_row(row: &TraceRow) -> String {
    let stats = &row.stats;
    format!(
        "{:>3} {} {} sent={} recv={} loss={:.1}% min={} avg={:.1} max={} last={}",
        row.ttl.0,
        row.addr,
        row.hostname,
        stats.sent,
        stats.received,
        stats.loss_pct,
        stats.min,
        stats.avg,
        stats.max,
        stats.last,
    )
}
