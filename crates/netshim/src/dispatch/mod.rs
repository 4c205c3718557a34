//! Per-request interception pipeline.
//!
//! The host environment hands every outgoing request to [`Interceptor::intercept`]
//! before any real network I/O. Rules are evaluated in fixed priority order -
//! cookie-block, stub, rewrite, throttle, monitor - with the earliest
//! registered rule winning within each category. Rule-table mutation arrives
//! concurrently from the command channel; every decision here works on store
//! snapshots, and all waiting (stub latency, throttling) happens off the store
//! locks.

#[cfg(test)]
mod tests;

use crate::error::{RegistrationError, TransportError};
use crate::http::{HttpRequest, HttpResponse};
use crate::predicate::RequestMatch;
use crate::recording::{MonitorLog, MonitoredNetworkRequest};
use crate::response::{delay_for, synthesize, StubDefaults, StubResponse};
use crate::rewrite::{CompiledRewrite, Rewrite};
use crate::store::{Rule, RuleStore};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Throttle payload: `response_time` follows stub semantics (>= 0 fixed
/// seconds, < 0 simulated KB/s based on response size).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Throttle {
    pub response_time: f64,
}

/// Introspection view of a registered stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveStub {
    pub id: String,
    #[serde(rename = "match")]
    pub match_spec: RequestMatch,
    pub response: StubResponse,
}

/// What the host must do with an intercepted request.
#[derive(Debug)]
pub enum Disposition {
    /// Forward unmodified.
    Forward,
    /// Forward this request instead of the original.
    ForwardModified(HttpRequest),
    /// Short-circuit with a synthetic response; no network I/O.
    Respond(HttpResponse),
    /// Short-circuit with a transport-level failure; no network I/O.
    Fail(TransportError),
}

/// Per-request context carried from [`Interceptor::intercept`] to
/// [`Interceptor::complete`]. Holds only transient copies; the stores keep
/// exclusive ownership of the rules themselves.
#[derive(Debug)]
pub struct Flight {
    started: Instant,
    original_request: HttpRequest,
    request: HttpRequest,
    is_stubbed: bool,
    is_rewritten: bool,
    strip_response_cookies: bool,
    response_rewrite: Option<CompiledRewrite>,
    throttle: Option<f64>,
    monitors: Vec<Rule<()>>,
}

impl Flight {
    fn new(original: HttpRequest) -> Self {
        Self {
            started: Instant::now(),
            request: original.clone(),
            original_request: original,
            is_stubbed: false,
            is_rewritten: false,
            strip_response_cookies: false,
            response_rewrite: None,
            throttle: None,
            monitors: Vec::new(),
        }
    }

    /// The request as it should reach the network (after cookie stripping and
    /// request rewriting).
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn is_stubbed(&self) -> bool {
        self.is_stubbed
    }

    pub fn is_rewritten(&self) -> bool {
        self.is_rewritten
    }
}

/// The interception dispatcher and rule registry.
pub struct Interceptor {
    stubs: RuleStore<StubResponse>,
    rewrites: RuleStore<CompiledRewrite>,
    throttles: RuleStore<Throttle>,
    monitors: RuleStore<()>,
    cookie_blocks: RuleStore<()>,
    monitor_log: MonitorLog,
    defaults: RwLock<StubDefaults>,
}

impl Default for Interceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor {
    pub fn new() -> Self {
        Self {
            stubs: RuleStore::new("stub"),
            rewrites: RuleStore::new("rewrite"),
            throttles: RuleStore::new("throttle"),
            monitors: RuleStore::new("monitor"),
            cookie_blocks: RuleStore::new("cookie-block"),
            monitor_log: MonitorLog::new(),
            defaults: RwLock::new(StubDefaults::default()),
        }
    }

    // ===== Rule registration =====

    pub fn stub_requests(
        &self,
        match_spec: RequestMatch,
        response: StubResponse,
    ) -> Result<String, RegistrationError> {
        let iterations = response.active_iterations;
        self.stubs.add(match_spec, response, iterations)
    }

    pub fn stub_remove(&self, id: &str) -> bool {
        self.stubs.remove(id)
    }

    pub fn stub_remove_many(&self, ids: &[String]) -> bool {
        self.stubs.remove_many(ids)
    }

    pub fn stub_remove_matching(&self, match_spec: &RequestMatch) -> bool {
        self.stubs.remove_matching(match_spec)
    }

    pub fn stub_remove_all(&self) {
        self.stubs.remove_all();
    }

    pub fn active_stubs(&self) -> Vec<ActiveStub> {
        self.stubs
            .list()
            .into_iter()
            .map(|r| ActiveStub {
                id: r.id,
                match_spec: r.match_spec,
                response: r.payload,
            })
            .collect()
    }

    pub fn rewrite_requests(
        &self,
        match_spec: RequestMatch,
        rewrite: Rewrite,
    ) -> Result<String, RegistrationError> {
        let compiled = CompiledRewrite::compile(&rewrite)?;
        self.rewrites
            .add(match_spec, compiled, rewrite.active_iterations)
    }

    pub fn rewrite_remove(&self, id: &str) -> bool {
        self.rewrites.remove(id)
    }

    pub fn rewrite_remove_many(&self, ids: &[String]) -> bool {
        self.rewrites.remove_many(ids)
    }

    pub fn rewrite_remove_all(&self) {
        self.rewrites.remove_all();
    }

    pub fn throttle_requests(
        &self,
        match_spec: RequestMatch,
        response_time: f64,
    ) -> Result<String, RegistrationError> {
        self.throttles
            .add(match_spec, Throttle { response_time }, None)
    }

    pub fn throttle_remove(&self, id: &str) -> bool {
        self.throttles.remove(id)
    }

    pub fn throttle_remove_many(&self, ids: &[String]) -> bool {
        self.throttles.remove_many(ids)
    }

    pub fn throttle_remove_all(&self) {
        self.throttles.remove_all();
    }

    pub fn monitor_requests(&self, match_spec: RequestMatch) -> Result<String, RegistrationError> {
        self.monitors.add(match_spec, (), None)
    }

    pub fn monitor_remove(&self, id: &str) -> bool {
        self.monitors.remove(id)
    }

    pub fn monitor_remove_many(&self, ids: &[String]) -> bool {
        self.monitors.remove_many(ids)
    }

    pub fn monitor_remove_all(&self) {
        self.monitors.remove_all();
    }

    pub fn block_cookies(
        &self,
        match_spec: RequestMatch,
        iterations: Option<u64>,
    ) -> Result<String, RegistrationError> {
        self.cookie_blocks.add(match_spec, (), iterations)
    }

    pub fn cookie_block_remove(&self, id: &str) -> bool {
        self.cookie_blocks.remove(id)
    }

    pub fn cookie_block_remove_many(&self, ids: &[String]) -> bool {
        self.cookie_blocks.remove_many(ids)
    }

    pub fn cookie_block_remove_all(&self) {
        self.cookie_blocks.remove_all();
    }

    // ===== Monitor log access =====

    pub fn monitored_peek_all(&self) -> Vec<MonitoredNetworkRequest> {
        self.monitor_log.peek_all()
    }

    pub fn monitored_flush_all(&self) -> Vec<MonitoredNetworkRequest> {
        self.monitor_log.flush_all()
    }

    /// Block until `iterations` monitored exchanges match `match_spec`, or
    /// time out. The match is compiled here, so an invalid pattern is a
    /// registration error rather than a silent mismatch.
    pub async fn wait_for_monitored_requests(
        &self,
        match_spec: &RequestMatch,
        timeout: Duration,
        iterations: u64,
    ) -> Result<bool, RegistrationError> {
        let compiled = crate::predicate::CompiledRequestMatch::compile(match_spec)?;
        Ok(self
            .monitor_log
            .wait_for_match(&compiled, timeout, iterations)
            .await)
    }

    // ===== Defaults =====

    pub fn defaults(&self) -> StubDefaults {
        self.defaults.read().clone()
    }

    pub fn set_defaults(&self, defaults: StubDefaults) {
        *self.defaults.write() = defaults;
    }

    /// Clear every rule table, the monitor log, and the stub defaults.
    pub fn reset(&self) {
        self.stubs.remove_all();
        self.rewrites.remove_all();
        self.throttles.remove_all();
        self.monitors.remove_all();
        self.cookie_blocks.remove_all();
        self.monitor_log.flush_all();
        self.defaults.write().reset();
        info!("interceptor reset");
    }

    // ===== Interception pipeline =====

    /// Evaluate an intercepted request against the active rules and decide its
    /// disposition. Stub delivery timing (latency, throughput simulation)
    /// happens here, after all store access has finished.
    ///
    /// The returned [`Flight`] must be handed back to [`Self::complete`] with
    /// the real response when the disposition was a forward.
    pub async fn intercept(&self, request: HttpRequest) -> (Disposition, Flight) {
        let mut flight = Flight::new(request.clone());
        let mut request = request;
        let mut modified = false;

        // Stage 1: cookie-block. Not exclusive; evaluation continues.
        if let Some(rule) = self.cookie_blocks.first_match(&request) {
            debug!(rule = %rule.id, "blocking cookies");
            request.remove_header("cookie");
            flight.strip_response_cookies = true;
            self.cookie_blocks.consume_one(&rule.id);
            modified = true;
        }

        // Monitor candidates are matched against the original request now;
        // response-header conditions are re-checked once the exchange ends.
        flight.monitors = self
            .monitors
            .list()
            .into_iter()
            .filter(|r| r.compiled.matches_request(&flight.original_request))
            .collect();

        // Stage 4 lookup happens early so stubbed responses throttle too.
        flight.throttle = self
            .throttles
            .first_match(&request)
            .map(|r| r.payload.response_time);

        // Stage 2: stub. Short-circuits; the network is never contacted.
        if let Some(rule) = self.stubs.first_match(&request) {
            debug!(rule = %rule.id, url = %request.url, "stubbing request");
            self.stubs.consume_one(&rule.id);
            flight.is_stubbed = true;
            flight.request = request;

            return match synthesize(&rule.payload).deliver().await {
                Ok(mut response) => {
                    if flight.strip_response_cookies {
                        response.remove_header("set-cookie");
                    }
                    self.apply_throttle(&flight, response.body.len()).await;
                    self.record_exchange(&flight, Some(&response));
                    (Disposition::Respond(response), flight)
                }
                Err(failure) => {
                    self.apply_throttle(&flight, 0).await;
                    self.record_exchange(&flight, None);
                    (Disposition::Fail(failure), flight)
                }
            };
        }

        // Stage 3: rewrite (only when not stubbed). Request side applies now;
        // the response side is carried on the flight.
        if let Some(rule) = self.rewrites.first_match(&request) {
            debug!(rule = %rule.id, url = %request.url, "rewriting request");
            let rewrite = rule.payload;
            if rewrite.rewrites_request() {
                request.url = rewrite.rewrite_url(&request.url);
                request.body = rewrite.rewrite_request_body(&request.body);
                request.headers = rewrite.rewrite_request_headers(&request.headers);
                modified = true;
            }
            if rewrite.rewrites_response() {
                flight.response_rewrite = Some(rewrite);
            }
            flight.is_rewritten = true;
            self.rewrites.consume_one(&rule.id);
        }

        flight.request = request.clone();
        if modified {
            (Disposition::ForwardModified(request), flight)
        } else {
            (Disposition::Forward, flight)
        }
    }

    /// Finish a forwarded exchange: apply the pending response rewrite and
    /// cookie stripping, honor any throttle, and record the exchange for
    /// matching monitors. Transport failures are recorded without a response
    /// and passed through.
    pub async fn complete(
        &self,
        flight: Flight,
        result: Result<HttpResponse, TransportError>,
    ) -> Result<HttpResponse, TransportError> {
        match result {
            Ok(mut response) => {
                if let Some(rewrite) = &flight.response_rewrite {
                    response.body = rewrite.rewrite_response_body(&response.body);
                    response.headers = rewrite.rewrite_response_headers(&response.headers);
                    response.status = rewrite.rewrite_status_code(response.status);
                }
                if flight.strip_response_cookies {
                    response.remove_header("set-cookie");
                }
                self.apply_throttle(&flight, response.body.len()).await;
                self.record_exchange(&flight, Some(&response));
                Ok(response)
            }
            Err(failure) => {
                self.record_exchange(&flight, None);
                Err(failure)
            }
        }
    }

    /// Convenience driver composing intercept, forward, and complete.
    ///
    /// `forward` is only invoked when the disposition requires real network
    /// I/O; stubbed and failed requests never reach it.
    pub async fn process<F, Fut>(
        &self,
        request: HttpRequest,
        forward: F,
    ) -> Result<HttpResponse, TransportError>
    where
        F: FnOnce(HttpRequest) -> Fut,
        Fut: std::future::Future<Output = Result<HttpResponse, TransportError>>,
    {
        let (disposition, flight) = self.intercept(request).await;
        match disposition {
            Disposition::Respond(response) => Ok(response),
            Disposition::Fail(failure) => Err(failure),
            Disposition::Forward | Disposition::ForwardModified(_) => {
                let outgoing = flight.request().clone();
                let result = forward(outgoing).await;
                self.complete(flight, result).await
            }
        }
    }

    async fn apply_throttle(&self, flight: &Flight, response_size: usize) {
        if let Some(response_time) = flight.throttle {
            let delay = delay_for(response_time, response_size);
            if !delay.is_zero() {
                debug!(?delay, "throttling response delivery");
                tokio::time::sleep(delay).await;
            }
        }
    }

    fn record_exchange(&self, flight: &Flight, response: Option<&HttpResponse>) {
        let Some(rule) = flight
            .monitors
            .iter()
            .find(|r| r.compiled.matches_response_headers(response.map(|resp| &resp.headers)))
        else {
            return;
        };

        if rule.remaining_iterations.is_some() {
            self.monitors.consume_one(&rule.id);
        }

        self.monitor_log.append(MonitoredNetworkRequest {
            timestamp: chrono::Utc::now(),
            request_time_secs: flight.started.elapsed().as_secs_f64(),
            original_request: flight.original_request.clone(),
            request: flight.request.clone(),
            response: response.cloned(),
            is_stubbed: flight.is_stubbed,
            is_rewritten: flight.is_rewritten,
        });
    }
}
