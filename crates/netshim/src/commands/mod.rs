//! Decoded command surface for the remote control channel.
//!
//! The transport layer (out of scope here) decodes bytes into a [`Command`],
//! hands it to [`execute`], and serializes the returned [`CommandResult`].
//! Every operation reports a definite success or failure; an unknown id or an
//! invalid pattern is always observable by the caller.

use crate::dispatch::{ActiveStub, Interceptor};
use crate::predicate::RequestMatch;
use crate::recording::MonitoredNetworkRequest;
use crate::response::StubResponse;
use crate::rewrite::Rewrite;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Inbound commands, tagged with their legacy wire names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum Command {
    #[serde(rename = "stubRequestsMatching")]
    StubRequests {
        #[serde(rename = "match")]
        match_spec: RequestMatch,
        response: StubResponse,
    },
    #[serde(rename = "stubRequestsRemoveWithId")]
    StubRequestsRemove { id: String },
    #[serde(rename = "stubRequestsRemoveWithIds")]
    StubRequestsRemoveIds { ids: Vec<String> },
    #[serde(rename = "stubRequestsRemoveWithMatch")]
    StubRequestsRemoveMatching {
        #[serde(rename = "match")]
        match_spec: RequestMatch,
    },
    #[serde(rename = "stubRequestsRemoveAll")]
    StubRequestsRemoveAll,
    #[serde(rename = "stubRequestsAll")]
    StubRequestsAll,

    #[serde(rename = "rewriteRequestsMatching")]
    RewriteRequests {
        #[serde(rename = "match")]
        match_spec: RequestMatch,
        rewrite: Rewrite,
    },
    #[serde(rename = "rewriteRequestsRemoveWithId")]
    RewriteRequestsRemove { id: String },
    #[serde(rename = "rewriteRequestsRemoveWithIds")]
    RewriteRequestsRemoveIds { ids: Vec<String> },
    #[serde(rename = "rewriteRequestsRemoveAll")]
    RewriteRequestsRemoveAll,

    #[serde(rename = "throttleRequestsMatching")]
    ThrottleRequests {
        #[serde(rename = "match")]
        match_spec: RequestMatch,
        response_time: f64,
    },
    #[serde(rename = "throttleRequestsRemoveWithId")]
    ThrottleRequestsRemove { id: String },
    #[serde(rename = "throttleRequestsRemoveWithIds")]
    ThrottleRequestsRemoveIds { ids: Vec<String> },
    #[serde(rename = "throttleRequestsRemoveAll")]
    ThrottleRequestsRemoveAll,

    #[serde(rename = "monitorRequestsMatching")]
    MonitorRequests {
        #[serde(rename = "match")]
        match_spec: RequestMatch,
    },
    #[serde(rename = "monitorRequestsRemoveWithId")]
    MonitorRequestsRemove { id: String },
    #[serde(rename = "monitorRequestsRemoveWithIds")]
    MonitorRequestsRemoveIds { ids: Vec<String> },
    #[serde(rename = "monitorRequestsRemoveAll")]
    MonitorRequestsRemoveAll,
    #[serde(rename = "monitoredRequestsPeekAll")]
    MonitoredRequestsPeekAll,
    #[serde(rename = "monitoredRequestsFlushAll")]
    MonitoredRequestsFlushAll,
    #[serde(rename = "waitForMonitoredRequestsMatching")]
    WaitForMonitoredRequests {
        #[serde(rename = "match")]
        match_spec: RequestMatch,
        timeout_secs: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iterations: Option<u64>,
    },

    #[serde(rename = "blockCookiesInRequestsMatching")]
    BlockCookies {
        #[serde(rename = "match")]
        match_spec: RequestMatch,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iterations: Option<u64>,
    },
    #[serde(rename = "blockCookiesRequestsRemoveWithId")]
    BlockCookiesRemove { id: String },
    #[serde(rename = "blockCookiesRequestsRemoveWithIds")]
    BlockCookiesRemoveIds { ids: Vec<String> },
    #[serde(rename = "blockCookiesRequestsRemoveAll")]
    BlockCookiesRemoveAll,

    #[serde(rename = "reset")]
    Reset,
}

/// Outbound results, one variant per result shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum CommandResult {
    /// A freshly-registered rule id.
    Id { id: String },
    /// Boolean outcome of a removal or wait.
    Flag { value: bool },
    /// Active stub listing.
    Stubs { stubs: Vec<ActiveStub> },
    /// Monitored exchanges from peek or flush.
    Monitored { requests: Vec<MonitoredNetworkRequest> },
    /// Synchronous registration failure.
    Failure { reason: String },
}

impl CommandResult {
    fn from_registration(result: Result<String, crate::error::RegistrationError>) -> Self {
        match result {
            Ok(id) => CommandResult::Id { id },
            Err(e) => {
                warn!(error = %e, "rule registration rejected");
                CommandResult::Failure {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn flag(value: bool) -> Self {
        CommandResult::Flag { value }
    }
}

/// Execute one decoded command against the interceptor.
pub async fn execute(interceptor: &Interceptor, command: Command) -> CommandResult {
    match command {
        Command::StubRequests {
            match_spec,
            response,
        } => CommandResult::from_registration(interceptor.stub_requests(match_spec, response)),
        Command::StubRequestsRemove { id } => CommandResult::flag(interceptor.stub_remove(&id)),
        Command::StubRequestsRemoveIds { ids } => {
            CommandResult::flag(interceptor.stub_remove_many(&ids))
        }
        Command::StubRequestsRemoveMatching { match_spec } => {
            CommandResult::flag(interceptor.stub_remove_matching(&match_spec))
        }
        Command::StubRequestsRemoveAll => {
            interceptor.stub_remove_all();
            CommandResult::flag(true)
        }
        Command::StubRequestsAll => CommandResult::Stubs {
            stubs: interceptor.active_stubs(),
        },

        Command::RewriteRequests {
            match_spec,
            rewrite,
        } => CommandResult::from_registration(interceptor.rewrite_requests(match_spec, rewrite)),
        Command::RewriteRequestsRemove { id } => {
            CommandResult::flag(interceptor.rewrite_remove(&id))
        }
        Command::RewriteRequestsRemoveIds { ids } => {
            CommandResult::flag(interceptor.rewrite_remove_many(&ids))
        }
        Command::RewriteRequestsRemoveAll => {
            interceptor.rewrite_remove_all();
            CommandResult::flag(true)
        }

        Command::ThrottleRequests {
            match_spec,
            response_time,
        } => CommandResult::from_registration(
            interceptor.throttle_requests(match_spec, response_time),
        ),
        Command::ThrottleRequestsRemove { id } => {
            CommandResult::flag(interceptor.throttle_remove(&id))
        }
        Command::ThrottleRequestsRemoveIds { ids } => {
            CommandResult::flag(interceptor.throttle_remove_many(&ids))
        }
        Command::ThrottleRequestsRemoveAll => {
            interceptor.throttle_remove_all();
            CommandResult::flag(true)
        }

        Command::MonitorRequests { match_spec } => {
            CommandResult::from_registration(interceptor.monitor_requests(match_spec))
        }
        Command::MonitorRequestsRemove { id } => {
            CommandResult::flag(interceptor.monitor_remove(&id))
        }
        Command::MonitorRequestsRemoveIds { ids } => {
            CommandResult::flag(interceptor.monitor_remove_many(&ids))
        }
        Command::MonitorRequestsRemoveAll => {
            interceptor.monitor_remove_all();
            CommandResult::flag(true)
        }
        Command::MonitoredRequestsPeekAll => CommandResult::Monitored {
            requests: interceptor.monitored_peek_all(),
        },
        Command::MonitoredRequestsFlushAll => CommandResult::Monitored {
            requests: interceptor.monitored_flush_all(),
        },
        Command::WaitForMonitoredRequests {
            match_spec,
            timeout_secs,
            iterations,
        } => {
            let timeout = Duration::from_secs_f64(timeout_secs.max(0.0));
            match interceptor
                .wait_for_monitored_requests(&match_spec, timeout, iterations.unwrap_or(1))
                .await
            {
                Ok(satisfied) => CommandResult::flag(satisfied),
                Err(e) => CommandResult::Failure {
                    reason: e.to_string(),
                },
            }
        }

        Command::BlockCookies {
            match_spec,
            iterations,
        } => CommandResult::from_registration(interceptor.block_cookies(match_spec, iterations)),
        Command::BlockCookiesRemove { id } => {
            CommandResult::flag(interceptor.cookie_block_remove(&id))
        }
        Command::BlockCookiesRemoveIds { ids } => {
            CommandResult::flag(interceptor.cookie_block_remove_many(&ids))
        }
        Command::BlockCookiesRemoveAll => {
            interceptor.cookie_block_remove_all();
            CommandResult::flag(true)
        }

        Command::Reset => {
            interceptor.reset();
            CommandResult::flag(true)
        }
    }
}
