//! Shared helpers for in-memory integration tests.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use overseer::process::adapters::InMemoryAppState;
use overseer::process::adapters::memory::InMemoryProcessLauncher;
use overseer::process::domain::{NodePlan, ProcessCommand, ProcessId, ProcessSpec};
use overseer::process::services::{Scheduler, SchedulerSettings};
use overseer::queue::adapters::InMemoryQueueStore;
use overseer::queue::domain::{CeTaskSubmit, ComponentRecord, SubmitComponent, UserRecord};
use overseer::queue::services::CeQueue;
use rstest::fixture;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration as StdDuration;

/// Clock returning a fixed instant until a test advances it.
#[derive(Debug)]
pub struct SteppingClock {
    now: Mutex<DateTime<Utc>>,
}

impl SteppingClock {
    /// Creates a clock frozen at `start`.
    pub const fn at(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += step;
    }
}

impl Clock for SteppingClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Queue service type used by the integration tests.
pub type TestQueue = CeQueue<InMemoryQueueStore, SteppingClock>;

/// Queue service wired to an in-memory store and a stepping clock.
pub struct QueueHarness {
    pub store: Arc<InMemoryQueueStore>,
    pub clock: Arc<SteppingClock>,
    pub queue: TestQueue,
}

impl QueueHarness {
    /// Builds a fresh harness.
    pub fn new() -> Self {
        let start = Utc
            .with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
            .single()
            .expect("valid start time");
        let store = Arc::new(InMemoryQueueStore::new());
        let clock = Arc::new(SteppingClock::at(start));
        let queue =
            CeQueue::new(Arc::clone(&store), Arc::clone(&clock)).with_node_name("node-a");
        Self {
            store,
            clock,
            queue,
        }
    }

    /// Builds a submission of `task_type` targeting entity `entity`.
    pub fn submission(&self, task_type: &str, entity: &str) -> CeTaskSubmit {
        self.queue
            .prepare_submit()
            .set_type(task_type)
            .set_component(SubmitComponent::entity(entity).expect("valid entity uuid"))
            .build()
            .expect("valid submission")
    }

    /// Builds a submission of `task_type` targeting no component.
    pub fn global_submission(&self, task_type: &str) -> CeTaskSubmit {
        self.queue
            .prepare_submit()
            .set_type(task_type)
            .build()
            .expect("valid submission")
    }

    /// Registers the component and entity rows used by resolution tests.
    pub fn register_project(&self, uuid: &str, key: &str) {
        let record = ComponentRecord {
            uuid: uuid.to_owned(),
            key: key.to_owned(),
            name: format!("{key} project"),
        };
        self.store.insert_component(record.clone());
        self.store.insert_entity(record);
    }

    /// Registers a user row.
    pub fn register_user(&self, uuid: &str, login: &str) {
        self.store.insert_user(UserRecord {
            uuid: uuid.to_owned(),
            login: login.to_owned(),
        });
    }

    /// Advances the clock so the next submission sorts after the previous.
    pub fn tick(&self) {
        self.clock.advance(Duration::milliseconds(10));
    }
}

/// Fixture providing a fresh queue harness.
#[fixture]
pub fn harness() -> QueueHarness {
    QueueHarness::new()
}

/// Scheduler type driven by the in-memory launcher.
pub type TestScheduler = Scheduler<InMemoryProcessLauncher, InMemoryAppState>;

/// Scheduler settings fast enough for tests.
pub fn fast_settings() -> SchedulerSettings {
    SchedulerSettings {
        tick: StdDuration::from_millis(5),
        graceful_stop_timeout: StdDuration::from_millis(200),
        ..SchedulerSettings::default()
    }
}

/// Spawned spec for `id` depending on `dependencies`.
pub fn spec(id: ProcessId, dependencies: &[ProcessId]) -> ProcessSpec {
    ProcessSpec::spawned(
        id,
        ProcessCommand::new(format!("bin/{}", id.key())).expect("valid command"),
    )
    .with_dependencies(dependencies.iter().copied())
    .expect("valid dependencies")
}

/// Plan running search, then web, then the compute engine.
pub fn full_plan() -> NodePlan {
    NodePlan::new([
        spec(ProcessId::SearchNode, &[]),
        spec(ProcessId::WebServer, &[ProcessId::SearchNode]),
        spec(ProcessId::ComputeEngine, &[ProcessId::WebServer]),
    ])
    .expect("valid plan")
}

/// Scheduler wired to in-memory adapters.
pub struct SchedulerHarness {
    pub launcher: Arc<InMemoryProcessLauncher>,
    pub app_state: Arc<InMemoryAppState>,
    pub scheduler: Arc<TestScheduler>,
}

impl SchedulerHarness {
    /// Builds a scheduler for `plan` with `settings`.
    pub fn new(plan: NodePlan, settings: SchedulerSettings) -> Self {
        let launcher = Arc::new(InMemoryProcessLauncher::new());
        let app_state = Arc::new(InMemoryAppState::new());
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&launcher),
            Arc::clone(&app_state),
            plan,
            settings,
        ));
        Self {
            launcher,
            app_state,
            scheduler,
        }
    }

    /// Polls `condition` until it holds or a generous deadline passes.
    pub async fn eventually<F>(&self, mut condition: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        for _ in 0..400 {
            if condition(self) {
                return true;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        condition(self)
    }
}
