//! Cooperative task host.
//!
//! Tasks run on the single-threaded tokio runtime and only give up control at
//! `.await` points. Each task's wait between iterations is capped at the
//! configured maximum so no task can starve its siblings.

use std::{
    collections::BTreeMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{task::JoinSet, time::MissedTickBehavior};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Created,
    Setup,
    Looping,
}

pub trait Task: Send + 'static {
    fn name(&self) -> &'static str;

    fn period(&self) -> Duration;

    fn setup(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }

    fn run_once(&mut self) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    phases: Arc<Mutex<BTreeMap<&'static str, TaskPhase>>>,
}

impl TaskRegistry {
    fn set(&self, name: &'static str, phase: TaskPhase) {
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, phase);
    }

    #[cfg(test)]
    fn phase(&self, name: &str) -> Option<TaskPhase> {
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    fn snapshot(&self) -> Vec<(&'static str, TaskPhase)> {
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, phase)| (*name, *phase))
            .collect()
    }
}

pub struct Scheduler {
    max_wait: Duration,
    registry: TaskRegistry,
    tasks: JoinSet<()>,
}

impl Scheduler {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            registry: TaskRegistry::default(),
            tasks: JoinSet::new(),
        }
    }

    #[cfg(test)]
    fn registry(&self) -> TaskRegistry {
        self.registry.clone()
    }

    pub fn bounded_period(&self, name: &str, period: Duration) -> Duration {
        if period > self.max_wait {
            warn!(
                "task {name} period {period:?} exceeds the {:?} wait bound, clamping",
                self.max_wait
            );
            self.max_wait
        } else {
            period.max(Duration::from_millis(1))
        }
    }

    pub fn spawn<T: Task>(&mut self, mut task: T) {
        let name = task.name();
        let period = self.bounded_period(name, task.period());
        let registry = self.registry.clone();
        registry.set(name, TaskPhase::Created);

        self.tasks.spawn(async move {
            registry.set(name, TaskPhase::Setup);
            task.setup().await;

            registry.set(name, TaskPhase::Looping);
            info!("task {name} looping every {period:?}");

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                task.run_once().await;
            }
        });
    }

    /// Waits on the spawned tasks. They never finish on their own, so
    /// returning means one of them panicked or was aborted.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let outcome = self.tasks.join_next().await;
        warn!(phases = ?self.registry.snapshot(), "scheduler stopping");
        match outcome {
            Some(Ok(())) => anyhow::bail!("a scheduled task exited"),
            Some(Err(err)) => Err(anyhow::Error::new(err).context("task failed")),
            None => anyhow::bail!("no tasks were scheduled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        setups: Arc<AtomicUsize>,
        runs: Arc<AtomicUsize>,
        period: Duration,
    }

    impl Task for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn period(&self) -> Duration {
            self.period
        }

        async fn setup(&mut self) {
            self.setups.fetch_add(1, Ordering::SeqCst);
        }

        async fn run_once(&mut self) {
            self.runs.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn task_sets_up_once_then_loops() {
        let setups = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(Duration::from_secs(1));
        let registry = scheduler.registry();

        scheduler.spawn(Counter {
            setups: setups.clone(),
            runs: runs.clone(),
            period: Duration::from_millis(100),
        });
        assert_eq!(registry.phase("counter"), Some(TaskPhase::Created));

        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(setups.load(Ordering::SeqCst), 1);
        assert!(runs.load(Ordering::SeqCst) >= 3);
        assert_eq!(registry.phase("counter"), Some(TaskPhase::Looping));
        assert_eq!(registry.snapshot(), vec![("counter", TaskPhase::Looping)]);
    }

    #[tokio::test(start_paused = true)]
    async fn long_periods_are_clamped_to_the_wait_bound() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new(Duration::from_millis(50));

        assert_eq!(
            scheduler.bounded_period("slow", Duration::from_secs(30)),
            Duration::from_millis(50)
        );

        scheduler.spawn(Counter {
            setups: Arc::new(AtomicUsize::new(0)),
            runs: runs.clone(),
            period: Duration::from_secs(30),
        });

        tokio::time::sleep(Duration::from_millis(220)).await;
        assert!(runs.load(Ordering::SeqCst) >= 4);
    }

    struct Crashing;

    impl Task for Crashing {
        fn name(&self) -> &'static str {
            "crashing"
        }

        fn period(&self) -> Duration {
            Duration::from_millis(10)
        }

        async fn run_once(&mut self) {
            panic!("actuator bus lost");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_fails_when_a_task_dies() {
        let mut scheduler = Scheduler::new(Duration::from_secs(1));
        scheduler.spawn(Crashing);

        let err = scheduler.run().await.unwrap_err();
        assert_eq!(err.to_string(), "task failed");
    }

    #[tokio::test]
    async fn run_without_tasks_is_an_error() {
        let scheduler = Scheduler::new(Duration::from_secs(1));

        assert!(scheduler.run().await.is_err());
    }
}
