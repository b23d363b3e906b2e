use std::time::{Duration, Instant};

pub const RENDER_INTERVAL: Duration = Duration::from_millis(100);

const MIB: f64 = 1024.0 * 1024.0;
const MB: f64 = 1_000_000.0;
const MIN_ELAPSED_SECS: f64 = 1e-6;

/// Byte counters for a single in-flight transfer.
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    bytes_read: u64,
    total_size: Option<u64>,
    start_time: Instant,
    last_render_time: Option<Instant>,
}

impl DownloadProgress {
    /// A zero content length is treated like a missing one.
    pub fn start(total_size: Option<u64>, now: Instant) -> Self {
        Self {
            bytes_read: 0,
            total_size: total_size.filter(|total| *total > 0),
            start_time: now,
            last_render_time: None,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn total_size(&self) -> Option<u64> {
        self.total_size
    }

    /// Count a chunk and return the status line when one is due.
    ///
    /// The first chunk always renders; later ones only once
    /// [`RENDER_INTERVAL`] has passed since the previous render.
    pub fn advance(&mut self, chunk_len: usize, now: Instant) -> Option<String> {
        self.bytes_read += chunk_len as u64;
        let due = self
            .last_render_time
            .map_or(true, |last| now.saturating_duration_since(last) >= RENDER_INTERVAL);
        if !due {
            return None;
        }
        self.last_render_time = Some(now);
        Some(self.status_line(now))
    }

    /// Average throughput since the transfer started, in bytes per second.
    pub fn average_speed(&self, now: Instant) -> f64 {
        let elapsed = now
            .saturating_duration_since(self.start_time)
            .as_secs_f64()
            .max(MIN_ELAPSED_SECS);
        self.bytes_read as f64 / elapsed
    }

    pub fn status_line(&self, now: Instant) -> String {
        let speed = grouped(self.average_speed(now) / MB, 2);
        let read = grouped(self.bytes_read as f64 / MIB, 1);
        match self.total_size {
            Some(total) => {
                let percent = self.bytes_read as f64 / total as f64 * 100.0;
                let total = grouped(total as f64 / MIB, 1);
                format!("  {percent:6.2}%  {read}/{total} MiB  {speed} MB/s")
            }
            None => format!("  {read} MiB  {speed} MB/s"),
        }
    }

    /// Trailing spaces blank out whatever the longer status line left behind.
    pub fn completion_line(&self) -> String {
        match self.total_size {
            Some(total) => {
                let total = grouped(total as f64 / MIB, 1);
                format!("  100.00%  {total}/{total} MiB  done       ")
            }
            None => {
                let read = grouped(self.bytes_read as f64 / MIB, 1);
                format!("  {read} MiB  done                      ")
            }
        }
    }
}

/// Fixed-point formatting with `,` between thousands, e.g. `12,345.6`.
pub fn grouped(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (formatted.as_str(), None),
    };

    let mut out = String::with_capacity(formatted.len() + integer.len() / 3 + 1);
    if value.is_sign_negative() && formatted.bytes().any(|b| matches!(b, b'1'..=b'9')) {
        out.push('-');
    }
    for (index, digit) in integer.chars().enumerate() {
        if index > 0 && (integer.len() - index) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}
