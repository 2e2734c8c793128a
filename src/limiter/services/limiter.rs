//! Connection and rate limiter service.
//!
//! All bookkeeping lives behind a single mutex so that a check and the
//! matching record happen in one critical section.

use crate::background::BackgroundTask;
use crate::clock::{add_duration, elapsed_between, sub_duration};
use crate::limiter::domain::{
    Admission, CleanupReport, ConnectionId, ConnectionRecord, DenialReason, LimiterConfig,
    LimiterMetrics, LimiterResult, UserId,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct Violations {
    count: u64,
    penalty: u32,
    last: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct LimiterState {
    connections: HashMap<ConnectionId, ConnectionRecord>,
    users: HashMap<UserId, BTreeSet<ConnectionId>>,
    windows: HashMap<ConnectionId, VecDeque<DateTime<Utc>>>,
    violations: HashMap<ConnectionId, Violations>,
    rejected_connections: u64,
    messages_admitted: u64,
    total_violations: u64,
}

impl LimiterState {
    fn connection_admission(
        &self,
        config: &LimiterConfig,
        user_id: &UserId,
        connection_id: &ConnectionId,
    ) -> Admission {
        if self.connections.contains_key(connection_id) {
            return Admission::deny(DenialReason::DuplicateConnection);
        }
        let user_connections = self.users.get(user_id).map_or(0, BTreeSet::len);
        if user_connections >= config.max_connections_per_user {
            return Admission::deny(DenialReason::UserConnectionLimit {
                limit: config.max_connections_per_user,
            });
        }
        if self.connections.len() >= config.max_total_connections {
            return Admission::deny(DenialReason::GlobalConnectionLimit {
                limit: config.max_total_connections,
            });
        }
        Admission::allow()
    }

    fn message_admission(
        &mut self,
        config: &LimiterConfig,
        connection_id: &ConnectionId,
        now: DateTime<Utc>,
    ) -> Admission {
        if !self.connections.contains_key(connection_id) {
            return Admission::deny(DenialReason::ConnectionNotFound);
        }
        let window = self.windows.entry(connection_id.clone()).or_default();
        prune(window, sub_duration(now, MINUTE));

        let second_start = sub_duration(now, SECOND);
        let in_last_second: Vec<DateTime<Utc>> = window
            .iter()
            .copied()
            .filter(|stamp| *stamp > second_start)
            .collect();
        let budget_second = usize::try_from(config.messages_per_second).unwrap_or(usize::MAX);
        let budget_minute = usize::try_from(config.messages_per_minute).unwrap_or(usize::MAX);

        let denial = if in_last_second.len() >= budget_second {
            in_last_second.first().map(|oldest| {
                Admission::deny_for(
                    DenialReason::PerSecondLimit {
                        limit: config.messages_per_second,
                    },
                    elapsed_between(now, add_duration(*oldest, SECOND)),
                )
            })
        } else if window.len() >= budget_minute {
            window.front().map(|oldest| {
                Admission::deny_for(
                    DenialReason::PerMinuteLimit {
                        limit: config.messages_per_minute,
                    },
                    elapsed_between(now, add_duration(*oldest, MINUTE)),
                )
            })
        } else {
            None
        };

        match denial {
            Some(admission) => {
                self.record_violation(config, connection_id, now);
                admission
            }
            None if budget_second == 0 || budget_minute == 0 => {
                self.record_violation(config, connection_id, now);
                Admission::deny(DenialReason::PerSecondLimit {
                    limit: config.messages_per_second,
                })
            }
            None => Admission::allow(),
        }
    }

    fn record_violation(
        &mut self,
        config: &LimiterConfig,
        connection_id: &ConnectionId,
        now: DateTime<Utc>,
    ) {
        let violations = self.violations.entry(connection_id.clone()).or_default();
        let repeated = violations
            .last
            .is_some_and(|last| elapsed_between(last, now) <= config.violation_window());
        violations.count = violations.count.saturating_add(1);
        if repeated {
            violations.penalty = violations.penalty.saturating_add(1);
        }
        violations.last = Some(now);
        self.total_violations = self.total_violations.saturating_add(1);
        tracing::debug!(
            connection_id = %connection_id,
            violations = violations.count,
            penalty = violations.penalty,
            "message rate limit exceeded"
        );
    }

    fn record_message(&mut self, connection_id: &ConnectionId, now: DateTime<Utc>) -> bool {
        if !self.connections.contains_key(connection_id) {
            return false;
        }
        self.windows
            .entry(connection_id.clone())
            .or_default()
            .push_back(now);
        self.messages_admitted = self.messages_admitted.saturating_add(1);
        true
    }
}

fn prune(window: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) -> usize {
    let before = window.len();
    while window.front().is_some_and(|stamp| *stamp <= cutoff) {
        window.pop_front();
    }
    before.saturating_sub(window.len())
}

struct LimiterInner<C> {
    config: LimiterConfig,
    clock: Arc<C>,
    state: Mutex<LimiterState>,
}

/// Gatekeeper for subscriber connections and their message rates.
pub struct ConnectionLimiter<C: Clock + Send + Sync + 'static> {
    inner: Arc<LimiterInner<C>>,
}

impl<C: Clock + Send + Sync + 'static> Clone for ConnectionLimiter<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock + Send + Sync + 'static> ConnectionLimiter<C> {
    /// Creates a limiter with no connections.
    #[must_use]
    pub fn new(config: LimiterConfig, clock: Arc<C>) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                config,
                clock,
                state: Mutex::new(LimiterState::default()),
            }),
        }
    }

    /// Returns the limiter configuration.
    #[must_use]
    pub fn config(&self) -> &LimiterConfig {
        &self.inner.config
    }

    /// Checks whether `user_id` may open `connection_id`.
    #[must_use]
    pub fn can_connect(&self, user_id: &UserId, connection_id: &ConnectionId) -> Admission {
        self.lock()
            .connection_admission(&self.inner.config, user_id, connection_id)
    }

    /// Admits a connection.
    ///
    /// # Errors
    ///
    /// Returns [`crate::limiter::domain::LimiterError::ConnectionLimitExceeded`]
    /// when a cap or a duplicate identifier refuses the connection.
    pub fn add_connection(
        &self,
        user_id: &UserId,
        connection_id: &ConnectionId,
    ) -> LimiterResult<ConnectionRecord> {
        let now = self.inner.clock.utc();
        let mut state = self.lock();
        let admission = state.connection_admission(&self.inner.config, user_id, connection_id);
        if let Err(error) = admission.into_result() {
            state.rejected_connections = state.rejected_connections.saturating_add(1);
            tracing::info!(
                user_id = %user_id,
                connection_id = %connection_id,
                %error,
                "connection refused"
            );
            return Err(error);
        }

        let record = ConnectionRecord::new(connection_id.clone(), user_id.clone(), now);
        state
            .connections
            .insert(connection_id.clone(), record.clone());
        state
            .users
            .entry(user_id.clone())
            .or_default()
            .insert(connection_id.clone());
        state.windows.insert(connection_id.clone(), VecDeque::new());
        tracing::debug!(user_id = %user_id, connection_id = %connection_id, "connection admitted");
        Ok(record)
    }

    /// Removes a connection. Removing an unknown connection is a no-op.
    pub fn remove_connection(&self, connection_id: &ConnectionId) -> Option<ConnectionRecord> {
        let mut state = self.lock();
        let record = state.connections.remove(connection_id)?;
        if let Some(owned) = state.users.get_mut(record.user_id()) {
            owned.remove(connection_id);
            if owned.is_empty() {
                state.users.remove(record.user_id());
            }
        }
        state.windows.remove(connection_id);
        tracing::debug!(connection_id = %connection_id, "connection removed");
        Some(record)
    }

    /// Checks the sliding-window budgets without recording a message.
    ///
    /// Unknown connections are denied with
    /// [`DenialReason::ConnectionNotFound`]. A denial counts as a violation.
    #[must_use]
    pub fn can_send_message(&self, connection_id: &ConnectionId) -> Admission {
        let now = self.inner.clock.utc();
        self.lock()
            .message_admission(&self.inner.config, connection_id, now)
    }

    /// Appends a message timestamp to the connection's window.
    ///
    /// Returns `false` for unknown connections.
    pub fn record_message(&self, connection_id: &ConnectionId) -> bool {
        let now = self.inner.clock.utc();
        self.lock().record_message(connection_id, now)
    }

    /// Checks and, when allowed, records a message in one step.
    pub fn try_send(&self, connection_id: &ConnectionId) -> Admission {
        let now = self.inner.clock.utc();
        let mut state = self.lock();
        let admission = state.message_admission(&self.inner.config, connection_id, now);
        if admission.is_allowed() {
            state.record_message(connection_id, now);
        }
        admission
    }

    /// Returns the connections held by `user_id`.
    #[must_use]
    pub fn connections_for_user(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.lock()
            .users
            .get(user_id)
            .map(|owned| owned.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the record for `connection_id`.
    #[must_use]
    pub fn connection(&self, connection_id: &ConnectionId) -> Option<ConnectionRecord> {
        self.lock().connections.get(connection_id).cloned()
    }

    /// Returns a snapshot of the limiter counters.
    #[must_use]
    pub fn get_metrics(&self) -> LimiterMetrics {
        let state = self.lock();
        LimiterMetrics {
            active_connections: state.connections.len(),
            active_users: state.users.len(),
            rejected_connections: state.rejected_connections,
            messages_admitted: state.messages_admitted,
            total_violations: state.total_violations,
            penalties: state
                .violations
                .iter()
                .filter(|(_, violations)| violations.penalty > 0)
                .map(|(connection_id, violations)| (connection_id.clone(), violations.penalty))
                .collect(),
        }
    }

    /// Prunes expired timestamps and bookkeeping of departed connections.
    ///
    /// Safe to call repeatedly and concurrently with live traffic.
    pub fn cleanup(&self) -> CleanupReport {
        let now = self.inner.clock.utc();
        let cutoff = sub_duration(now, MINUTE);
        let violation_window = self.inner.config.violation_window();
        let mut state = self.lock();
        let LimiterState {
            connections,
            windows,
            violations,
            ..
        } = &mut *state;

        let pruned_timestamps = windows
            .values_mut()
            .map(|window| prune(window, cutoff))
            .sum();

        let windows_before = windows.len();
        windows.retain(|connection_id, _| connections.contains_key(connection_id));
        let violations_before = violations.len();
        violations.retain(|connection_id, entry| {
            connections.contains_key(connection_id)
                || entry
                    .last
                    .is_some_and(|last| elapsed_between(last, now) <= violation_window)
        });

        let report = CleanupReport {
            pruned_timestamps,
            stale_entries: windows_before
                .saturating_sub(windows.len())
                .saturating_add(violations_before.saturating_sub(violations.len())),
        };
        if report.pruned_timestamps > 0 || report.stale_entries > 0 {
            tracing::debug!(
                pruned_timestamps = report.pruned_timestamps,
                stale_entries = report.stale_entries,
                "limiter cleanup"
            );
        }
        report
    }

    /// Starts the periodic cleanup sweep.
    #[must_use]
    pub fn start_cleanup(&self) -> BackgroundTask {
        let limiter = self.clone();
        BackgroundTask::every(
            "limiter-cleanup",
            self.inner.config.cleanup_interval(),
            move || {
                limiter.cleanup();
                std::future::ready(())
            },
        )
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Clock + Send + Sync + 'static> fmt::Debug for ConnectionLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLimiter")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
