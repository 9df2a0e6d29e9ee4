//! Timeout policy: per-operation deadlines and deadline-bounded storage work.
//!
//! # Responsibility
//! - Derive each operation's deadline from its cost class and the caller's
//!   own deadline.
//! - Run blocking SQLite work so that it cannot outlive the deadline:
//!   bounded pool wait, a busy handler that stops waiting for the write lock,
//!   and a progress handler that interrupts running statements, both once
//!   the deadline passes or the caller cancels.
//! - Emit one start and one completion log event per operation with the
//!   caller's explicit fields.
//!
//! # Invariants
//! - Nested deadlines only ever shrink: `nested` takes the minimum.
//! - Expiry at any layer surfaces as `ServiceError::TimeoutExceeded`;
//!   a fired cancel signal surfaces as `ServiceError::Cancelled`.
//! - A transaction commits only if neither has fired by the time its work
//!   returns.

use super::context::CallContext;
use super::error::{ServiceError, ServiceResult};
use crate::db::Database;
use log::{debug, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::cell::RefCell;
use std::fmt::{Display, Write as _};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// SQLite VM instructions between deadline checks.
const PROGRESS_CHECK_OPS: i32 = 1_000;
/// Sleep between retries of a locked database while armed.
const BUSY_RETRY_INTERVAL: Duration = Duration::from_millis(5);
/// Busy timeout restored on a connection going back to the pool.
const IDLE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Cost class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    BulkRead,
    SingleEntity,
    Transactional,
}

/// Per-class operation budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub bulk_read: Duration,
    pub single_entity: Duration,
    pub transactional: Duration,
    /// Sub-budget of the breed directory call inside cat creation.
    pub breed_lookup: Duration,
    /// Sub-budget of the insert that follows breed validation.
    pub cat_insert: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            bulk_read: Duration::from_millis(500),
            single_entity: Duration::from_secs(3),
            transactional: Duration::from_secs(5),
            breed_lookup: Duration::from_secs(2),
            cat_insert: Duration::from_millis(500),
        }
    }
}

impl TimeoutPolicy {
    pub fn budget(&self, class: OperationClass) -> Duration {
        match class {
            OperationClass::BulkRead => self.bulk_read,
            OperationClass::SingleEntity => self.single_entity,
            OperationClass::Transactional => self.transactional,
        }
    }
}

/// Absolute point in time after which work must stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn instant(self) -> Instant {
        self.0
    }

    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(self) -> bool {
        Instant::now() >= self.0
    }

    /// Deadline for a nested step: `budget` from now, capped by `self`.
    pub fn nested(self, budget: Duration) -> Self {
        self.min(Self::after(budget))
    }
}

/// Deadline, cancel signal and log fields of one running operation.
pub(crate) struct OperationScope {
    op: &'static str,
    module: &'static str,
    request_id: String,
    fields: String,
    deadline: Deadline,
    cancel_flag: Option<Arc<AtomicBool>>,
    ctx: CallContext,
}

impl OperationScope {
    pub(crate) fn new(
        policy: &TimeoutPolicy,
        ctx: &CallContext,
        module: &'static str,
        op: &'static str,
        class: OperationClass,
    ) -> Self {
        let own = Deadline::after(policy.budget(class));
        let deadline = match ctx.deadline() {
            Some(caller) => own.min(Deadline::at(caller)),
            None => own,
        };
        Self {
            op,
            module,
            request_id: ctx.request_id().to_string(),
            fields: String::new(),
            deadline,
            cancel_flag: ctx.cancel_signal().map(|signal| signal.flag()),
            ctx: ctx.clone(),
        }
    }

    /// Appends a ` key=value` log field.
    pub(crate) fn field(mut self, key: &str, value: impl Display) -> Self {
        let _ = write!(self.fields, " {key}={value}");
        self
    }

    pub(crate) fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// Fails fast once the deadline passed or the caller cancelled.
    pub(crate) fn check(&self) -> ServiceResult<()> {
        if self.ctx.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        if self.deadline.is_expired() {
            return Err(ServiceError::TimeoutExceeded);
        }
        Ok(())
    }

    /// Runs the whole operation under the deadline and cancel signal and
    /// logs its outcome.
    pub(crate) async fn run<T, F>(&self, operation: F) -> ServiceResult<T>
    where
        F: Future<Output = ServiceResult<T>>,
    {
        let started_at = Instant::now();
        debug!(
            "event={} module={} status=start request_id={}{}",
            self.op, self.module, self.request_id, self.fields
        );

        let timed = tokio::time::timeout_at(
            tokio::time::Instant::from_std(self.deadline.instant()),
            operation,
        );
        let result = match self.ctx.cancel_signal() {
            Some(signal) => tokio::select! {
                outcome = timed => outcome.unwrap_or(Err(ServiceError::TimeoutExceeded)),
                _ = signal.cancelled() => Err(ServiceError::Cancelled),
            },
            None => timed.await.unwrap_or(Err(ServiceError::TimeoutExceeded)),
        };

        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => info!(
                "event={} module={} status=ok request_id={}{} duration_ms={}",
                self.op, self.module, self.request_id, self.fields, duration_ms
            ),
            Err(err) => warn!(
                "event={} module={} status=error request_id={}{} duration_ms={} error_kind={} error={}",
                self.op,
                self.module,
                self.request_id,
                self.fields,
                duration_ms,
                err.kind().as_str(),
                err
            ),
        }
        result
    }

    /// Runs blocking storage work bounded by the operation deadline.
    pub(crate) async fn storage<T, F>(
        &self,
        db: &Database,
        context: &'static str,
        work: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce(&mut Connection) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.storage_until(db, self.deadline, context, work).await
    }

    /// Runs blocking storage work under a nested budget.
    pub(crate) async fn storage_within<T, F>(
        &self,
        db: &Database,
        budget: Duration,
        context: &'static str,
        work: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce(&mut Connection) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.storage_until(db, self.deadline.nested(budget), context, work)
            .await
    }

    /// Runs `work` inside one `BEGIN IMMEDIATE` transaction bounded by the
    /// operation deadline.
    ///
    /// The commit is skipped, and the transaction rolled back, when the
    /// deadline or the cancel signal fired while `work` ran.
    pub(crate) async fn transaction<T, F>(
        &self,
        db: &Database,
        context: &'static str,
        work: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking_until(db, self.deadline, context, move |conn, interrupt| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| ServiceError::storage(context, err.into()))?;
            let value = work(&tx)?;
            interrupt.check()?;
            tx.commit()
                .map_err(|err| ServiceError::storage(context, err.into()))?;
            Ok(value)
        })
        .await
    }

    async fn storage_until<T, F>(
        &self,
        db: &Database,
        deadline: Deadline,
        context: &'static str,
        work: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce(&mut Connection) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.blocking_until(db, deadline, context, move |conn, _| work(conn))
            .await
    }

    async fn blocking_until<T, F>(
        &self,
        db: &Database,
        deadline: Deadline,
        context: &'static str,
        work: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce(&mut Connection, &Interrupt) -> ServiceResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.check()?;

        let db = db.clone();
        let interrupt = Interrupt {
            deadline,
            cancel_flag: self.cancel_flag.clone(),
        };
        let task = tokio::task::spawn_blocking(move || {
            let mut conn = db
                .acquire_until(deadline.instant())
                .ok_or(ServiceError::TimeoutExceeded)?;
            arm_connection(&conn, &interrupt)
                .map_err(|err| ServiceError::internal_with(context, err))?;
            let result = work(&mut *conn, &interrupt);
            disarm_connection(&conn);
            match (result, interrupt.fired()) {
                (Err(_), Some(fired)) => Err(fired),
                (result, _) => result,
            }
        });

        let result = match tokio::time::timeout_at(
            tokio::time::Instant::from_std(deadline.instant()),
            task,
        )
        .await
        {
            Err(_) => Err(ServiceError::TimeoutExceeded),
            Ok(Err(join_err)) => Err(ServiceError::internal_with(context, join_err)),
            Ok(Ok(result)) => result,
        };

        match result {
            Err(ServiceError::TimeoutExceeded) if self.ctx.is_cancelled() => {
                Err(ServiceError::Cancelled)
            }
            Err(ServiceError::Internal { .. }) if deadline.is_expired() => {
                Err(ServiceError::TimeoutExceeded)
            }
            other => other,
        }
    }
}

/// Deadline and cancel flag as seen from a blocking storage thread.
#[derive(Debug, Clone)]
struct Interrupt {
    deadline: Deadline,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl Interrupt {
    fn fired(&self) -> Option<ServiceError> {
        if self
            .cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Some(ServiceError::Cancelled);
        }
        if self.deadline.is_expired() {
            return Some(ServiceError::TimeoutExceeded);
        }
        None
    }

    fn check(&self) -> ServiceResult<()> {
        self.fired().map_or(Ok(()), Err)
    }
}

thread_local! {
    /// Interrupt of the storage work running on this blocking thread, read by
    /// the SQLite busy handler (which cannot capture state).
    static ARMED: RefCell<Option<Interrupt>> = const { RefCell::new(None) };
}

/// Busy handler: keep retrying the lock until the armed interrupt fires.
fn wait_while_armed(_attempts: i32) -> bool {
    let keep_waiting = ARMED.with(|armed| {
        armed
            .borrow()
            .as_ref()
            .is_some_and(|interrupt| interrupt.fired().is_none())
    });
    if keep_waiting {
        std::thread::sleep(BUSY_RETRY_INTERVAL);
    }
    keep_waiting
}

fn arm_connection(conn: &Connection, interrupt: &Interrupt) -> rusqlite::Result<()> {
    ARMED.with(|armed| *armed.borrow_mut() = Some(interrupt.clone()));
    conn.busy_handler(Some(wait_while_armed))?;
    let interrupt = interrupt.clone();
    conn.progress_handler(
        PROGRESS_CHECK_OPS,
        Some(move || interrupt.fired().is_some()),
    );
    Ok(())
}

fn disarm_connection(conn: &Connection) {
    ARMED.with(|armed| *armed.borrow_mut() = None);
    conn.progress_handler(0, None::<fn() -> bool>);
    let _ = conn.busy_timeout(IDLE_BUSY_TIMEOUT);
}

#[cfg(test)]
mod tests {
    use super::{Deadline, OperationClass, OperationScope, TimeoutPolicy};
    use crate::db::Database;
    use crate::service::context::{CallContext, CancelSignal};
    use crate::service::error::{ErrorKind, ServiceError};
    use std::time::{Duration, Instant};

    #[test]
    fn nested_deadline_never_extends_parent() {
        let parent = Deadline::after(Duration::from_millis(100));
        assert_eq!(parent.nested(Duration::from_secs(10)), parent);
        assert!(parent.nested(Duration::from_millis(1)) < parent);
    }

    #[test]
    fn caller_deadline_caps_policy_budget() {
        let policy = TimeoutPolicy::default();
        let caller = Instant::now() + Duration::from_millis(50);
        let ctx = CallContext::new("req").with_deadline(caller);
        let scope = OperationScope::new(
            &policy,
            &ctx,
            "test",
            "capped_op",
            OperationClass::Transactional,
        );
        assert_eq!(scope.deadline().instant(), caller);
    }

    #[tokio::test]
    async fn run_maps_elapsed_deadline_to_timeout() {
        let policy = TimeoutPolicy {
            single_entity: Duration::from_millis(20),
            ..TimeoutPolicy::default()
        };
        let ctx = CallContext::default();
        let scope =
            OperationScope::new(&policy, &ctx, "test", "sleep", OperationClass::SingleEntity);
        let result: Result<(), ServiceError> = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::TimeoutExceeded);
    }

    #[tokio::test]
    async fn long_running_statement_is_interrupted_at_deadline() {
        let db = Database::open_in_memory().unwrap();
        let policy = TimeoutPolicy {
            single_entity: Duration::from_millis(50),
            ..TimeoutPolicy::default()
        };
        let ctx = CallContext::default();
        let scope =
            OperationScope::new(&policy, &ctx, "test", "spin", OperationClass::SingleEntity);

        let started = Instant::now();
        let result = scope
            .storage(&db, "failed to spin", |conn| {
                conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c)
                     SELECT COUNT(*) FROM c;",
                    [],
                    |row| row.get::<_, i64>(0),
                )
                .map_err(|err| ServiceError::storage("failed to spin", err.into()))
            })
            .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::TimeoutExceeded);
        assert!(started.elapsed() < Duration::from_secs(2));

        // The interrupted connection must be reusable once disarmed.
        let fresh = OperationScope::new(
            &TimeoutPolicy::default(),
            &ctx,
            "test",
            "count",
            OperationClass::SingleEntity,
        );
        let count = fresh
            .storage(&db, "failed to count", |conn| {
                conn.query_row("SELECT COUNT(*) FROM cats;", [], |row| row.get::<_, i64>(0))
                    .map_err(|err| ServiceError::storage("failed to count", err.into()))
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn cancelled_context_short_circuits_storage() {
        let db = Database::open_in_memory().unwrap();
        let signal = CancelSignal::new();
        signal.cancel();
        let ctx = CallContext::new("req").with_cancel(signal);
        let scope = OperationScope::new(
            &TimeoutPolicy::default(),
            &ctx,
            "test",
            "cancelled",
            OperationClass::SingleEntity,
        );
        let result = scope.storage(&db, "noop", |_| Ok(())).await;
        assert!(matches!(result, Err(ServiceError::Cancelled)));
    }
}
