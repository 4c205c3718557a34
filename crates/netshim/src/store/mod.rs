//! Concurrent registry of active rules, generic over the rule kind's payload.
//!
//! One store instance exists per rule category (stub, rewrite, throttle,
//! monitor, cookie-block). All mutation and snapshotting is serialized through
//! a single lock per store; match evaluation happens on copied snapshots so
//! interception threads never observe a partially-updated rule.

use crate::error::RegistrationError;
use crate::http::HttpRequest;
use crate::predicate::{CompiledRequestMatch, RequestMatch};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// An active rule: a compiled match, a kind-specific payload, and a
/// remaining-iterations budget (`None` = unlimited).
#[derive(Debug, Clone)]
pub struct Rule<P> {
    pub id: String,
    pub match_spec: RequestMatch,
    pub compiled: Arc<CompiledRequestMatch>,
    pub payload: P,
    pub remaining_iterations: Option<u64>,
    pub created_order: u64,
}

/// Ordered, lock-guarded collection of rules of one kind.
pub struct RuleStore<P> {
    kind: &'static str,
    rules: RwLock<Vec<Rule<P>>>,
    next_order: AtomicU64,
}

impl<P: Clone> RuleStore<P> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            rules: RwLock::new(Vec::new()),
            next_order: AtomicU64::new(0),
        }
    }

    /// Register a rule. The match specification is compiled here, so an
    /// invalid pattern is rejected before anything is stored.
    ///
    /// An iteration budget of zero is normalized to unlimited, preserving the
    /// legacy wire encoding where 0 meant "no limit".
    pub fn add(
        &self,
        match_spec: RequestMatch,
        payload: P,
        iterations: Option<u64>,
    ) -> Result<String, RegistrationError> {
        let compiled = Arc::new(CompiledRequestMatch::compile(&match_spec)?);
        let id = uuid::Uuid::new_v4().to_string();
        let rule = Rule {
            id: id.clone(),
            match_spec,
            compiled,
            payload,
            remaining_iterations: iterations.filter(|n| *n > 0),
            created_order: self.next_order.fetch_add(1, Ordering::Relaxed),
        };

        self.rules.write().push(rule);
        debug!(kind = self.kind, id = %id, "rule registered");
        Ok(id)
    }

    /// Remove by id; false when the id is unknown.
    pub fn remove(&self, id: &str) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.id != id);
        let removed = rules.len() < before;
        if removed {
            debug!(kind = self.kind, id, "rule removed");
        }
        removed
    }

    /// Remove several ids; true only when every id was present.
    pub fn remove_many(&self, ids: &[String]) -> bool {
        ids.iter().fold(true, |all, id| self.remove(id) && all)
    }

    /// Remove every rule whose stored match is structurally equal to `spec`;
    /// false when nothing matched.
    pub fn remove_matching(&self, spec: &RequestMatch) -> bool {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|r| r.match_spec != *spec);
        let removed = before - rules.len();
        if removed > 0 {
            debug!(kind = self.kind, removed, "rules removed by match");
        }
        removed > 0
    }

    pub fn remove_all(&self) {
        self.rules.write().clear();
        debug!(kind = self.kind, "all rules removed");
    }

    /// Snapshot copy in registration order, safe to iterate off-lock.
    pub fn list(&self) -> Vec<Rule<P>> {
        self.rules.read().clone()
    }

    /// Earliest-registered rule whose match fires on `request`.
    ///
    /// Evaluates a snapshot, so concurrent mutation cannot tear a rule.
    pub fn first_match(&self, request: &HttpRequest) -> Option<Rule<P>> {
        self.list()
            .into_iter()
            .find(|r| r.compiled.matches_request(request))
    }

    /// Decrement the rule's remaining iterations, removing it atomically when
    /// the budget reaches zero. Unlimited rules are untouched.
    pub fn consume_one(&self, id: &str) {
        let mut rules = self.rules.write();
        let Some(pos) = rules.iter().position(|r| r.id == id) else {
            return;
        };
        match rules[pos].remaining_iterations {
            Some(1) => {
                rules.remove(pos);
                debug!(kind = self.kind, id, "rule exhausted and removed");
            }
            Some(n) => rules[pos].remaining_iterations = Some(n - 1),
            None => {}
        }
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }
}
