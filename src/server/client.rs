//! Report submission to an already running stats server.
//!
//! Out-of-process collection works by POSTing a finished report to a
//! server that is already serving one; the server merges it per mode
//! key. The wire format matches what the server itself speaks: gzip
//! over JSON.

use crate::report::Report;
use crate::server::service::compress_data;
use crate::utils::config::DEFAULT_SUBMIT_TIMEOUT;
use crate::utils::error::SubmitError;
use log::{debug, info};

/// Blocking HTTP client for a stats server
pub struct StatsClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl StatsClient {
    /// Create a client for the server at `host:port`
    pub fn new(host: &str, port: u16) -> Result<Self, SubmitError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(DEFAULT_SUBMIT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("http://{}:{}", host, port),
        })
    }

    /// **Public** - Submits a report for merging into the server's
    /// held report.
    ///
    /// # Errors
    /// * `SubmitError::RequestFailed` when the server is unreachable
    /// * `SubmitError::Rejected` when it answers with a non-success
    ///   status
    pub fn submit_report(&self, report: &Report) -> Result<(), SubmitError> {
        let body = serde_json::to_vec(report)?;
        let compressed = compress_data(&body)?;
        debug!(
            "Submitting {} compressed byte(s) to {}/profile",
            compressed.len(),
            self.base_url
        );

        let response = self
            .client
            .post(format!("{}/profile", self.base_url))
            .header("Content-Type", "text/json")
            .header("Content-Encoding", "gzip")
            .body(compressed)
            .send()?;

        if !response.status().is_success() {
            return Err(SubmitError::Rejected(response.status().as_u16()));
        }

        info!("Report submitted to {}", self.base_url);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submit_to_unreachable_server() {
        // Port 9 (discard) is never a stats server.
        let client = StatsClient::new("127.0.0.1", 9).unwrap();
        let mut report = Report::new();
        report.insert('c', json!({}));

        let result = client.submit_report(&report);
        assert!(matches!(result, Err(SubmitError::RequestFailed(_))));
    }
}
