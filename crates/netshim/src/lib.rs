//! netshim - in-process HTTP interception for automated UI tests.
//!
//! The crate sits between an application's HTTP client and the network.
//! Tests register rules keyed on a [`RequestMatch`] predicate; each outgoing
//! request is checked against the active rules and either answered with a
//! synthetic [`StubResponse`], forwarded after a [`Rewrite`], delayed by a
//! throttle, recorded by a monitor, or stripped of cookies, in that priority
//! order.
//!
//! [`Interceptor`] is the engine; hosts embed it via [`Interceptor::process`]
//! (or the lower-level `intercept`/`complete` pair) and drive it remotely
//! through the [`commands`] surface.
//!
//! ```no_run
//! use netshim::{Interceptor, RequestMatch, ResponseBody, StubResponse};
//! use serde_json::json;
//!
//! let shim = Interceptor::new();
//! let stub = StubResponse::from_body(
//!     ResponseBody::Json(json!({"ok": true})),
//!     None,
//!     None,
//!     None,
//!     None,
//!     &shim.defaults(),
//! )
//! .unwrap();
//! shim.stub_requests(RequestMatch::url(".*/login$"), stub).unwrap();
//! ```

pub mod commands;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod predicate;
pub mod recording;
pub mod response;
pub mod rewrite;
pub mod store;

pub use commands::{execute, Command, CommandResult};
pub use dispatch::{ActiveStub, Disposition, Flight, Interceptor, Throttle};
pub use error::{RegistrationError, TransportError};
pub use http::{HttpRequest, HttpResponse};
pub use predicate::{CompiledRequestMatch, QueryTerm, RequestMatch};
pub use recording::{MonitorLog, MonitoredNetworkRequest};
pub use response::{ResponseBody, StubDefaults, StubResponse};
pub use rewrite::{CompiledRewrite, Rewrite, RewriteReplacement};
