//! Priority-preemptive task scheduler with a cooperative tick loop.
//!
//! Tasks are awaitable units carrying a cancellation token. A 50 ms tick
//! expires overdue work, scores pending work by utility, and admits it
//! under the exclusivity rules. The watchdog gives a cancelled task a
//! short grace period to honor its token before aborting it outright.
//!
//! Exactly one of `task-completed` / `task-failed` is published per task
//! id; the completion wrapper and the watchdog race for a per-task claim
//! flag to keep that true.

use crate::blackboard::Blackboard;
use crate::bus::SignalBus;
use cortex_core::Signal;
use futures::future::BoxFuture;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Scheduler tick period.
pub const TICK: Duration = Duration::from_millis(50);
/// Forcible termination age for any task.
pub const MAX_TASK_AGE: Duration = Duration::from_secs(120);
/// Grace period between cancellation request and abort.
pub const CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Priority class of a task. Ordering is admission ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Best-effort work; never preempts anything.
    Background,
    /// Ordinary deliberative work.
    Normal,
    /// Time-sensitive work.
    High,
    /// Life-or-death work.
    Survival,
}

impl Priority {
    /// The numeric utility base of this class.
    #[must_use]
    pub fn base(&self) -> f64 {
        match self {
            Self::Survival => 100.0,
            Self::High => 75.0,
            Self::Normal => 50.0,
            Self::Background => 10.0,
        }
    }
}

type TaskFn =
    Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<serde_json::Value, String>> + Send>;

/// A unit of work submitted to the scheduler.
pub struct TaskSpec {
    name: String,
    priority: Priority,
    exclusive: bool,
    deadline: Option<Duration>,
    run: TaskFn,
}

impl TaskSpec {
    /// Build a task from a name, priority, and an async body. The body
    /// receives a cancellation token it is expected to honor.
    pub fn new<F, Fut>(name: impl Into<String>, priority: Priority, f: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value, String>> + Send + 'static,
    {
        Self {
            name: name.into(),
            priority,
            exclusive: false,
            deadline: None,
            run: Box::new(move |token| Box::pin(f(token))),
        }
    }

    /// Mark this task exclusive: it runs alone with respect to other
    /// exclusive tasks.
    #[must_use]
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Override the forcible-termination age for this task.
    #[must_use]
    pub fn deadline(mut self, d: Duration) -> Self {
        self.deadline = Some(d);
        self
    }
}

/// Identifies a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

struct Pending {
    id: u64,
    name: String,
    priority: Priority,
    exclusive: bool,
    deadline: Option<Duration>,
    submitted_at: Instant,
    run: TaskFn,
}

struct Running {
    id: u64,
    name: String,
    exclusive: bool,
    utility: f64,
    deadline: Option<Duration>,
    started_at: Instant,
    token: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
    finished: Arc<AtomicBool>,
    cancel_requested_at: Option<Instant>,
}

#[derive(Default)]
struct SchedState {
    next_id: u64,
    pending: Vec<Pending>,
    running: Vec<Running>,
}

/// The task scheduler. One instance per agent.
pub struct Scheduler {
    bus: SignalBus,
    blackboard: Arc<Blackboard>,
    critical_health: f64,
    state: Mutex<SchedState>,
}

impl Scheduler {
    /// Create a scheduler publishing to `bus` and reading threat context
    /// from `blackboard`. `critical_health` feeds the survival utility
    /// boost.
    #[must_use]
    pub fn new(bus: SignalBus, blackboard: Arc<Blackboard>, critical_health: f64) -> Self {
        Self {
            bus,
            blackboard,
            critical_health,
            state: Mutex::new(SchedState::default()),
        }
    }

    /// Queue a task for admission on a future tick.
    pub fn submit(&self, spec: TaskSpec) -> TaskHandle {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.pending.push(Pending {
            id,
            name: spec.name,
            priority: spec.priority,
            exclusive: spec.exclusive,
            deadline: spec.deadline,
            submitted_at: Instant::now(),
            run: spec.run,
        });
        TaskHandle(id)
    }

    /// Request cancellation of the currently running exclusive task, if
    /// any. Used by emergency-recall.
    pub fn cancel_exclusive(&self) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        for task in state.running.iter_mut().filter(|t| t.exclusive) {
            task.token.cancel();
            task.cancel_requested_at.get_or_insert(now);
            tracing::info!(task = %task.name, "exclusive task cancellation requested");
        }
    }

    /// Request cancellation of a specific task. Pending tasks are
    /// dropped with a `cancelled` failure; running tasks enter the
    /// watchdog's grace window.
    pub fn cancel(&self, handle: TaskHandle) {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.pending.iter().position(|p| p.id == handle.0) {
            let p = state.pending.remove(pos);
            self.emit_failed(p.id, &p.name, "cancelled");
            return;
        }
        let now = Instant::now();
        if let Some(task) = state.running.iter_mut().find(|t| t.id == handle.0) {
            task.token.cancel();
            task.cancel_requested_at.get_or_insert(now);
        }
    }

    /// Number of running tasks.
    #[must_use]
    pub fn active_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state
            .running
            .retain(|t| !t.finished.load(Ordering::Acquire));
        state.running.len()
    }

    /// Number of tasks waiting for admission.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// Drive ticks until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(TICK);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => self.tick(),
            }
        }
        tracing::debug!("scheduler loop stopped");
    }

    /// One scheduler tick: expire, score, admit, watchdog. Public so
    /// tests can drive the scheduler deterministically.
    pub fn tick(&self) {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap();

        // Drop completed tasks (their wrapper already published).
        state
            .running
            .retain(|t| !t.finished.load(Ordering::Acquire));

        // 1. Expire pending tasks past their age limit.
        let mut expired = Vec::new();
        state.pending.retain(|p| {
            let limit = p.deadline.unwrap_or(MAX_TASK_AGE);
            if now.duration_since(p.submitted_at) > limit {
                expired.push((p.id, p.name.clone()));
                false
            } else {
                true
            }
        });
        for (id, name) in expired {
            self.emit_failed(id, &name, "timeout");
        }

        // Watchdog over running tasks.
        let mut healed = Vec::new();
        for task in &mut state.running {
            let limit = task.deadline.unwrap_or(MAX_TASK_AGE);
            if now.duration_since(task.started_at) > limit && task.cancel_requested_at.is_none() {
                task.token.cancel();
                task.cancel_requested_at = Some(now);
                tracing::warn!(task = %task.name, "task exceeded max age, cancelling");
            }
            if let Some(at) = task.cancel_requested_at
                && now.duration_since(at) > CANCEL_GRACE
            {
                task.handle.abort();
                if task
                    .finished
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    healed.push((task.id, task.name.clone()));
                }
            }
        }
        state
            .running
            .retain(|t| !healed.iter().any(|(id, _)| *id == t.id));
        for (id, name) in &healed {
            tracing::warn!(task = %name, "watchdog terminated unresponsive task");
            self.emit_failed(*id, name, "TIMEOUT_AUTO_HEALED");
        }

        // 2–4. Score and admit.
        if state.pending.is_empty() {
            return;
        }
        let exclusive_floor = state
            .running
            .iter()
            .find(|t| t.exclusive)
            .map(|t| t.utility);

        match exclusive_floor {
            Some(floor) => {
                // Exclusive running: admit parallel work above the floor.
                let mut admitted = Vec::new();
                let mut i = 0;
                while i < state.pending.len() {
                    let p = &state.pending[i];
                    let utility = p.priority.base() * self.context_factor(p.priority);
                    if !p.exclusive && utility > floor {
                        admitted.push((state.pending.remove(i), utility));
                    } else {
                        i += 1;
                    }
                }
                for (p, utility) in admitted {
                    self.start(&mut state, p, utility);
                }
            }
            None => {
                // No exclusive running: admit the single best task.
                let best = state
                    .pending
                    .iter()
                    .enumerate()
                    .map(|(i, p)| (i, p.priority.base() * self.context_factor(p.priority)))
                    .max_by(|a, b| a.1.total_cmp(&b.1));
                if let Some((i, utility)) = best {
                    let p = state.pending.remove(i);
                    self.start(&mut state, p, utility);
                }
            }
        }
    }

    /// Utility multiplier from current threat context. Low health and
    /// threat level raise SURVIVAL; threat suppresses BACKGROUND.
    fn context_factor(&self, priority: Priority) -> f64 {
        let threat = self
            .blackboard
            .get_f64("threat.level")
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let health = self.blackboard.get_f64("status.health").unwrap_or(20.0);
        let low_health = if health < self.critical_health {
            (1.0 - health / self.critical_health).clamp(0.0, 1.0)
        } else {
            0.0
        };
        match priority {
            Priority::Survival => (1.0 + threat + low_health).min(2.0),
            Priority::High => 1.0 + 0.2 * threat,
            Priority::Normal => 1.0,
            Priority::Background => (1.0 - 0.5 * threat).max(0.25),
        }
    }

    fn start(&self, state: &mut SchedState, p: Pending, utility: f64) {
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let fut = (p.run)(token.clone());

        let bus = self.bus.clone();
        let flag = Arc::clone(&finished);
        let name = p.name.clone();
        let id = p.id;
        tracing::debug!(task = %name, utility, exclusive = p.exclusive, "task admitted");
        let handle = tokio::spawn(async move {
            let result = fut.await;
            if flag
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                match result {
                    Ok(data) => bus.publish(
                        Signal::TaskCompleted,
                        json!({"task_id": id, "task": {"name": name}, "result": data}),
                    ),
                    Err(error) => bus.publish(
                        Signal::TaskFailed,
                        json!({"task_id": id, "task": {"name": name}, "error": error}),
                    ),
                }
            }
        });

        state.running.push(Running {
            id: p.id,
            name: p.name,
            exclusive: p.exclusive,
            utility,
            deadline: p.deadline,
            started_at: Instant::now(),
            token,
            handle,
            finished,
            cancel_requested_at: None,
        });
    }

    fn emit_failed(&self, id: u64, name: &str, reason: &str) {
        self.bus.publish(
            Signal::TaskFailed,
            json!({"task_id": id, "task": {"name": name}, "reason": reason, "error": reason}),
        );
    }
}
