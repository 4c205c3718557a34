//! Synthetic response delivery with simulated latency or throughput.

use super::StubResponse;
use crate::error::TransportError;
use crate::http::HttpResponse;
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Chunk granularity for rate-limited delivery.
const RATE_CHUNK_SIZE: usize = 1024;

/// Delay before delivering a `size`-byte payload under `response_time`
/// semantics: non-negative values are a fixed latency in seconds, negative
/// values simulate `|response_time|` KB/s.
pub fn delay_for(response_time: f64, size: usize) -> Duration {
    if response_time >= 0.0 {
        Duration::from_secs_f64(response_time)
    } else {
        let rate_kbps = -response_time;
        Duration::from_secs_f64(size as f64 / 1024.0 / rate_kbps)
    }
}

/// A scheduled synthetic response: body chunks with per-chunk delays, or a
/// simulated transport failure.
#[derive(Debug)]
pub struct SyntheticDelivery {
    status: u16,
    headers: HashMap<String, String>,
    chunks: Vec<(Duration, Bytes)>,
    failure: Option<i64>,
}

impl SyntheticDelivery {
    /// Total wall-clock floor for the delivery.
    pub fn total_delay(&self) -> Duration {
        self.chunks.iter().map(|(d, _)| *d).sum()
    }

    /// Play out the schedule, sleeping between chunks, and assemble the final
    /// response. A failure delivery waits out its schedule and then surfaces
    /// the simulated transport error.
    pub async fn deliver(self) -> Result<HttpResponse, TransportError> {
        let mut body = Vec::new();
        for (delay, chunk) in self.chunks {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            body.extend_from_slice(&chunk);
        }

        if let Some(code) = self.failure {
            debug!(code, "delivering simulated transport failure");
            return Err(TransportError::Simulated(code));
        }

        Ok(HttpResponse {
            status: self.status,
            headers: self.headers,
            body,
        })
    }
}

/// Build the delivery schedule for a stub.
///
/// Fixed latency delivers the whole body as one chunk after the wait;
/// rate-limited delivery slices the body into fixed-size chunks with evenly
/// spread sleeps so total wall clock approximates `size / rate` and is never
/// instantaneous for a non-empty body.
pub fn synthesize(stub: &StubResponse) -> SyntheticDelivery {
    let mut headers = stub.headers.clone();
    if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
        headers.insert("Content-Type".to_string(), stub.content_type.clone());
    }

    let chunks = if stub.response_time >= 0.0 {
        vec![(
            delay_for(stub.response_time, 0),
            Bytes::from(stub.data.clone()),
        )]
    } else {
        let total = delay_for(stub.response_time, stub.data.len());
        let slices: Vec<Bytes> = stub
            .data
            .chunks(RATE_CHUNK_SIZE)
            .map(Bytes::copy_from_slice)
            .collect();
        if slices.is_empty() {
            vec![(Duration::ZERO, Bytes::new())]
        } else {
            let per_chunk = total / slices.len() as u32;
            slices.into_iter().map(|c| (per_chunk, c)).collect()
        }
    };

    SyntheticDelivery {
        status: stub.return_code,
        headers,
        chunks,
        failure: stub.failure_code,
    }
}
