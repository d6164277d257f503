use once_cell::sync::Lazy;
use std::fmt;
use std::time::Instant;
use tracing_subscriber::fmt::time::FormatTime;

static START: Lazy<Instant> = Lazy::new(Instant::now);

pub struct UptimeSeconds;

impl FormatTime for UptimeSeconds {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let elapsed = START.elapsed();
        write!(w, "{:.3}s", elapsed.as_secs_f64())
    }
}

/// Shortens long actor ids for log lines: first 8 and last 4 characters.
pub fn abbrev(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 14 {
        let head: String = chars[..8].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    } else {
        s.to_string()
    }
}
