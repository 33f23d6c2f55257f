//! Text sensor feed used in place of the platform sensor manager.
//!
//! One event per line: `<kind>,<timestamp_ns>,<x>,<y>,<z>`. Blank lines and
//! lines starting with `#` are skipped. Lines with fewer than three values
//! still parse; the session rejects them on delivery.

use crate::types::{SensorEvent, SensorKind};
use crate::SensorProvider;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReplayError {
    #[error("Line {line}: missing timestamp")]
    MissingTimestamp { line: usize },
    #[error("Line {line}: invalid timestamp {value:?}")]
    InvalidTimestamp { line: usize, value: String },
    #[error("Line {line}: invalid sensor value {value:?}")]
    InvalidValue { line: usize, value: String },
}

/// Streaming parser for replay text.
///
/// Feed raw bytes via `push_data`, then drain parsed events via `next_event`.
/// Input may be split at any byte boundary.
pub struct ReplayParser {
    buffer: VecDeque<u8>,
    line: usize,
}

impl Default for ReplayParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplayParser {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(4096),
            line: 0,
        }
    }

    /// Append received bytes to the internal buffer.
    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend(data);
    }

    /// Terminate a trailing line that has no newline so it can be drained.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() && self.buffer.back() != Some(&b'\n') {
            self.buffer.push_back(b'\n');
        }
    }

    /// Try to extract the next event. Returns `None` if no complete line is buffered.
    pub fn next_event(&mut self) -> Option<Result<SensorEvent, ReplayError>> {
        loop {
            let newline = self.buffer.iter().position(|&b| b == b'\n')?;
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            self.line += 1;

            let text = String::from_utf8_lossy(&raw);
            let text = text.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            return Some(parse_line(text, self.line));
        }
    }
}

fn parse_line(text: &str, line: usize) -> Result<SensorEvent, ReplayError> {
    let mut fields = text.split(',').map(str::trim);

    let kind = SensorKind::from_tag(fields.next().unwrap_or_default());
    let timestamp = fields
        .next()
        .filter(|f| !f.is_empty())
        .ok_or(ReplayError::MissingTimestamp { line })?;
    let timestamp_ns = timestamp
        .parse::<u64>()
        .map_err(|_| ReplayError::InvalidTimestamp {
            line,
            value: timestamp.to_string(),
        })?;

    let values = fields
        .filter(|f| !f.is_empty())
        .map(|f| match f.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(ReplayError::InvalidValue {
                line,
                value: f.to_string(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SensorEvent::new(kind, timestamp_ns, values))
}

/// A fully loaded replay, usable as the session's sensor provider.
#[derive(Debug, Clone, Default)]
pub struct ReplayFeed {
    events: Vec<SensorEvent>,
}

impl ReplayFeed {
    /// Parse a whole replay. Unparseable lines are logged and skipped.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut parser = ReplayParser::new();
        parser.push_data(data);
        parser.finish();

        let mut events = Vec::new();
        while let Some(result) = parser.next_event() {
            match result {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(%e, "Skipping replay line"),
            }
        }
        tracing::debug!(events = events.len(), "Replay parsed");
        Self { events }
    }

    pub fn events(&self) -> &[SensorEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl SensorProvider for ReplayFeed {
    fn has_sensor(&self, kind: SensorKind) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }
}
