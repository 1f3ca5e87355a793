//! Operation transcript
//!
//! Keeps the human-readable log of everything the user did, plus one record
//! per HTTP exchange for summary statistics. The rendered text is what gets
//! exported or copied.

use crate::executor::Exchange;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Severity of a transcript line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    /// Marker shown in front of the message
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Info => "ℹ",
            Self::Success => "✅",
            Self::Warning => "⚠",
            Self::Error => "❌",
        }
    }
}

/// A single transcript line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl TranscriptEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.level.marker(),
            self.message
        )
    }
}

/// Outcome of one HTTP exchange, kept for statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub id: String,
    pub method: String,
    pub url: String,
    /// Response status, if a response arrived
    pub status_code: Option<u16>,
    pub latency_ms: f64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl ExchangeRecord {
    pub fn from_exchange(exchange: &Exchange) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            method: exchange.request.method.to_string(),
            url: exchange.request.url.clone(),
            status_code: exchange.outcome.status(),
            latency_ms: exchange.elapsed_ms,
            success: exchange.is_success(),
            timestamp: Utc::now(),
        }
    }
}

/// Aggregated exchange statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TranscriptSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub status_distribution: HashMap<u16, u64>,
}

/// Bounded transcript shared between the core and the front ends
#[derive(Debug)]
pub struct Transcript {
    entries: RwLock<Vec<TranscriptEntry>>,
    exchanges: RwLock<Vec<ExchangeRecord>>,
    max_entries: usize,
}

impl Transcript {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            exchanges: RwLock::new(Vec::new()),
            max_entries: max_entries.max(1),
        }
    }

    pub fn record(&self, level: LogLevel, message: impl Into<String>) {
        let mut entries = self.entries.write();
        if entries.len() >= self.max_entries {
            // Drop the oldest tenth when at capacity
            let excess = (self.max_entries / 10).max(1);
            let n = excess.min(entries.len());
            entries.drain(0..n);
        }
        entries.push(TranscriptEntry::new(level, message));
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(LogLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.record(LogLevel::Success, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.record(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.record(LogLevel::Error, message);
    }

    /// Log a finished exchange: request line, status, timing, response
    /// headers and the rendered body
    pub fn record_exchange(&self, exchange: &Exchange) {
        let request = &exchange.request;
        self.info(format!("{} {}", request.method, request.url));
        if !request.params.is_empty() {
            self.info(format!("Params: {}", json_text(&request.params)));
        }
        if let Some(body) = &request.body {
            self.info(format!("Body: {}", body));
        }

        match &exchange.response {
            Some(response) => {
                let level = if exchange.is_success() {
                    LogLevel::Success
                } else {
                    LogLevel::Error
                };
                self.record(level, format!("Status Code: {}", response.status));
                self.info(format!("Response Time: {:.3}s", response.elapsed_ms / 1000.0));
                if !response.headers.is_empty() {
                    let headers: Vec<String> = response
                        .headers
                        .iter()
                        .map(|(k, v)| format!("  {}: {}", k, v))
                        .collect();
                    self.info(format!("Response Headers:\n{}", headers.join("\n")));
                }
                self.info(format!("Response Body: {}", response.render_body()));
            }
            None => self.error(exchange.outcome.to_string()),
        }

        let mut exchanges = self.exchanges.write();
        if exchanges.len() >= self.max_entries {
            let excess = (self.max_entries / 10).max(1);
            let n = excess.min(exchanges.len());
            exchanges.drain(0..n);
        }
        exchanges.push(ExchangeRecord::from_exchange(exchange));
    }

    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.read().clone()
    }

    /// The last `count` entries, oldest first
    pub fn recent(&self, count: usize) -> Vec<TranscriptEntry> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(count);
        entries[start..].to_vec()
    }

    pub fn exchanges(&self) -> Vec<ExchangeRecord> {
        self.exchanges.read().clone()
    }

    pub fn summary(&self) -> TranscriptSummary {
        let exchanges = self.exchanges.read();

        if exchanges.is_empty() {
            return TranscriptSummary::default();
        }

        let mut summary = TranscriptSummary {
            total_requests: exchanges.len() as u64,
            min_latency_ms: f64::MAX,
            ..TranscriptSummary::default()
        };
        let mut total_latency = 0.0;

        for record in exchanges.iter() {
            total_latency += record.latency_ms;
            summary.min_latency_ms = summary.min_latency_ms.min(record.latency_ms);
            summary.max_latency_ms = summary.max_latency_ms.max(record.latency_ms);

            if record.success {
                summary.successful_requests += 1;
            } else {
                summary.failed_requests += 1;
            }
            if let Some(status) = record.status_code {
                *summary.status_distribution.entry(status).or_insert(0) += 1;
            }
        }

        summary.avg_latency_ms = total_latency / summary.total_requests as f64;
        summary
    }

    /// Plain-text transcript, one rendered entry per line
    pub fn render(&self) -> String {
        let entries = self.entries.read();
        let mut text = String::new();
        for entry in entries.iter() {
            text.push_str(&entry.render());
            text.push('\n');
        }
        text
    }

    pub fn export_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.render().as_bytes())?;
        writer.flush()
    }

    pub fn export_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path.as_ref())?;
        self.export_to(&mut file)?;
        tracing::info!(path = %path.as_ref().display(), "Transcript exported");
        Ok(())
    }

    pub fn clear(&self) {
        self.entries.write().clear();
        self.exchanges.write().clear();
    }

    pub fn count(&self) -> usize {
        self.entries.read().len()
    }
}

fn json_text<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Shared transcript for use across threads
pub type SharedTranscript = Arc<Transcript>;

pub fn create_shared_transcript(max_entries: usize) -> SharedTranscript {
    Arc::new(Transcript::new(max_entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{HttpMethod, StringMap};
    use crate::executor::{ExecutionOutcome, OutgoingRequest, ResponseSnapshot};
    use std::time::Duration;

    fn exchange(status: Option<u16>, latency: f64) -> Exchange {
        let outcome = match status {
            Some(s) if s < 400 => ExecutionOutcome::Success { status: s },
            Some(s) => ExecutionOutcome::HttpError { status: s },
            None => ExecutionOutcome::Timeout { timeout_ms: 30_000 },
        };
        Exchange {
            request: OutgoingRequest {
                method: HttpMethod::Get,
                url: "https://api.test.io/users".to_string(),
                headers: StringMap::new(),
                body: None,
                params: StringMap::new(),
            },
            outcome,
            response: status.map(|s| {
                ResponseSnapshot::new(
                    s,
                    Duration::from_millis(latency as u64),
                    vec![("content-type".to_string(), "application/json".to_string())],
                    "{\"ok\":true}".to_string(),
                )
            }),
            elapsed_ms: latency,
        }
    }

    #[test]
    fn test_record_and_render() {
        let transcript = Transcript::new(100);
        transcript.info("Importing collection");
        transcript.success("Imported 3 requests");

        let text = transcript.render();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("ℹ Importing collection"));
        assert!(text.contains("✅ Imported 3 requests"));
    }

    #[test]
    fn test_summary() {
        let transcript = Transcript::new(100);
        transcript.record_exchange(&exchange(Some(200), 10.0));
        transcript.record_exchange(&exchange(Some(404), 30.0));
        transcript.record_exchange(&exchange(None, 20.0));

        let summary = transcript.summary();
        assert_eq!(summary.total_requests, 3);
        assert_eq!(summary.successful_requests, 1);
        assert_eq!(summary.failed_requests, 2);
        assert_eq!(summary.min_latency_ms, 10.0);
        assert_eq!(summary.max_latency_ms, 30.0);
        assert_eq!(summary.avg_latency_ms, 20.0);
        assert_eq!(summary.status_distribution[&404], 1);
    }

    #[test]
    fn test_exchange_lines() {
        let transcript = Transcript::new(100);
        transcript.record_exchange(&exchange(Some(200), 5.0));
        let text = transcript.render();
        assert!(text.contains("GET https://api.test.io/users"));
        assert!(text.contains("Status Code: 200"));
        assert!(text.contains("\"ok\": true"));

        transcript.record_exchange(&exchange(None, 5.0));
        assert!(transcript.render().contains("timeout after 30000 ms"));
    }

    #[test]
    fn test_max_entries() {
        let transcript = Transcript::new(20);
        for i in 0..30 {
            transcript.info(format!("line {}", i));
        }
        assert!(transcript.count() <= 20);
        assert_eq!(transcript.recent(1)[0].message, "line 29");
    }

    #[test]
    fn test_export_and_clear() {
        let transcript = Transcript::new(10);
        transcript.info("hello");

        let mut sink = Vec::new();
        transcript.export_to(&mut sink).unwrap();
        assert!(String::from_utf8(sink).unwrap().ends_with("hello\n"));

        transcript.clear();
        assert_eq!(transcript.count(), 0);
        assert_eq!(transcript.summary().total_requests, 0);
    }
}
