//! Deferred task lane
//!
//! One worker thread per pipe set runs the two kinds of deferred work the
//! interrupt side hands off: the coalesced replenish retry timer and the
//! per-pipe completion service tasks. Work is serialized on the lane and
//! against every other path by the pipe set lock.
//!
//! # Coalescing
//! - Retry: `armed` is set when the timer is armed; arming again while set
//!   is a no-op. The flag is cleared before the retry pass runs, so a pass
//!   that fails again re-arms.
//! - Service: one `scheduled` flag per pipe, cleared before the task runs.
//!
//! # Kill
//! `kill` disables the lane and waits until the worker has acknowledged,
//! which means no task is running and none will start until `enable`.
//! Called from a task, it queues the acknowledgement without waiting.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Instant;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;

use crate::{PipeError, Result};

/// Work the lane runs on behalf of a pipe set
pub(crate) trait DeferredWork: Send + Sync {
    /// Retry timer fired
    fn run_retry(&self);

    /// Completion service requested for `pipe`
    fn run_service(&self, pipe: usize);
}

enum Command {
    Bind(Weak<dyn DeferredWork>),
    ArmRetry(Duration),
    Service(usize),
    Quiesce(Sender<()>),
    Shutdown,
}

struct LaneFlags {
    enabled: AtomicBool,
    armed: AtomicBool,
    scheduled: Vec<AtomicBool>,
}

pub(crate) struct DeferredLane {
    tx: Sender<Command>,
    flags: Arc<LaneFlags>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl DeferredLane {
    /// Spawn a disabled lane able to service `npipes` pipes
    pub(crate) fn spawn(npipes: usize) -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let flags = Arc::new(LaneFlags {
            enabled: AtomicBool::new(false),
            armed: AtomicBool::new(false),
            scheduled: (0..npipes).map(|_| AtomicBool::new(false)).collect(),
        });

        let worker_flags = Arc::clone(&flags);
        let worker = thread::Builder::new()
            .name("ce-pipe-deferred".into())
            .spawn(move || run(rx, worker_flags))
            .map_err(|e| PipeError::TaskSpawn(e.to_string()))?;
        let worker_id = worker.thread().id();

        Ok(Self {
            tx,
            flags,
            worker: Some(worker),
            worker_id,
        })
    }

    /// Attach the work the lane runs
    pub(crate) fn bind(&self, work: Weak<dyn DeferredWork>) {
        self.command(Command::Bind(work));
    }

    /// Let tasks run
    pub(crate) fn enable(&self) {
        self.flags.enabled.store(true, Ordering::SeqCst);
    }

    /// Arm the retry timer unless already armed
    ///
    /// Returns true if this call armed it.
    pub(crate) fn arm_retry(&self, delay: Duration) -> bool {
        if !self.flags.enabled.load(Ordering::SeqCst) {
            return false;
        }
        if self.flags.armed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.command(Command::ArmRetry(delay));
        true
    }

    /// Check if a retry pass is pending
    pub(crate) fn retry_pending(&self) -> bool {
        self.flags.armed.load(Ordering::SeqCst)
    }

    /// Queue a service task for `pipe` unless one is already queued
    pub(crate) fn schedule(&self, pipe: usize) -> bool {
        if !self.flags.enabled.load(Ordering::SeqCst) {
            return false;
        }
        let Some(flag) = self.flags.scheduled.get(pipe) else {
            return false;
        };
        if flag.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.command(Command::Service(pipe));
        true
    }

    /// Disarm the timer, drop queued tasks and wait out the running one
    pub(crate) fn kill(&self) {
        self.flags.enabled.store(false, Ordering::SeqCst);
        self.flags.armed.store(false, Ordering::SeqCst);
        for flag in &self.flags.scheduled {
            flag.store(false, Ordering::SeqCst);
        }

        let (ack_tx, ack_rx) = channel::bounded(1);
        self.command(Command::Quiesce(ack_tx));
        if self.on_worker() {
            // called from a task, the only one running; the worker clears its
            // timer once the task returns
            return;
        }
        if ack_rx.recv().is_err() {
            log::warn!("deferred lane exited before acknowledging kill");
        }
    }

    fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    fn command(&self, command: Command) {
        if self.tx.send(command).is_err() {
            log::error!("deferred lane is gone, dropping command");
        }
    }
}

impl Drop for DeferredLane {
    fn drop(&mut self) {
        self.flags.enabled.store(false, Ordering::SeqCst);
        self.command(Command::Shutdown);

        let Some(worker) = self.worker.take() else {
            return;
        };
        if self.on_worker() {
            // last reference dropped by a task; the worker exits on Shutdown
            return;
        }
        if worker.join().is_err() {
            log::error!("deferred lane worker panicked");
        }
    }
}

fn run(rx: Receiver<Command>, flags: Arc<LaneFlags>) {
    let mut work: Option<Weak<dyn DeferredWork>> = None;
    let mut deadline: Option<Instant> = None;

    loop {
        let timer = match deadline {
            Some(at) => channel::at(at),
            None => channel::never(),
        };

        select! {
            recv(rx) -> command => match command {
                Ok(Command::Bind(w)) => work = Some(w),
                Ok(Command::ArmRetry(delay)) => {
                    if deadline.is_none() {
                        deadline = Some(Instant::now() + delay);
                    }
                }
                Ok(Command::Service(pipe)) => {
                    if let Some(flag) = flags.scheduled.get(pipe) {
                        flag.store(false, Ordering::SeqCst);
                    }
                    if flags.enabled.load(Ordering::SeqCst) {
                        if let Some(w) = work.as_ref().and_then(Weak::upgrade) {
                            w.run_service(pipe);
                        }
                    }
                }
                Ok(Command::Quiesce(ack)) => {
                    deadline = None;
                    let _ = ack.send(());
                }
                Ok(Command::Shutdown) | Err(_) => break,
            },
            recv(timer) -> _ => {
                deadline = None;
                flags.armed.store(false, Ordering::SeqCst);
                if flags.enabled.load(Ordering::SeqCst) {
                    if let Some(w) = work.as_ref().and_then(Weak::upgrade) {
                        w.run_retry();
                    }
                }
            }
        }
    }
    log::debug!("deferred lane stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        retries: AtomicUsize,
        services: AtomicUsize,
    }

    impl DeferredWork for Counter {
        fn run_retry(&self) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn run_service(&self, _pipe: usize) {
            self.services.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn lane_with(counter: &Arc<Counter>) -> DeferredLane {
        let lane = DeferredLane::spawn(4).expect("Failed to spawn lane");
        let weak: Weak<dyn DeferredWork> = Arc::downgrade(counter) as Weak<dyn DeferredWork>;
        lane.bind(weak);
        lane.enable();
        lane
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let until = Instant::now() + Duration::from_secs(2);
        while Instant::now() < until {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_retry_coalesces() {
        let counter = Arc::new(Counter::default());
        let lane = lane_with(&counter);

        assert!(lane.arm_retry(Duration::from_millis(200)));
        assert!(!lane.arm_retry(Duration::from_millis(200)));
        assert!(lane.retry_pending());

        assert!(wait_for(|| counter.retries.load(Ordering::SeqCst) == 1));
        assert!(wait_for(|| !lane.retry_pending()));
        thread::sleep(Duration::from_millis(250));
        assert_eq!(counter.retries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_service_runs_on_lane() {
        let counter = Arc::new(Counter::default());
        let lane = lane_with(&counter);

        assert!(lane.schedule(2));
        assert!(wait_for(|| counter.services.load(Ordering::SeqCst) == 1));
        assert!(!lane.schedule(9));
    }

    #[test]
    fn test_kill_disarms_timer() {
        let counter = Arc::new(Counter::default());
        let lane = lane_with(&counter);

        lane.arm_retry(Duration::from_millis(200));
        lane.kill();
        assert!(!lane.retry_pending());
        assert!(!lane.arm_retry(Duration::from_millis(1)));
        assert!(!lane.schedule(0));

        thread::sleep(Duration::from_millis(300));
        assert_eq!(counter.retries.load(Ordering::SeqCst), 0);
    }

    /// Work that kills its own lane from inside a service task
    #[derive(Default)]
    struct SelfKilling {
        lane: std::sync::OnceLock<Weak<DeferredLane>>,
        retries: AtomicUsize,
        services: AtomicUsize,
    }

    impl DeferredWork for SelfKilling {
        fn run_retry(&self) {
            self.retries.fetch_add(1, Ordering::SeqCst);
        }

        fn run_service(&self, _pipe: usize) {
            if let Some(lane) = self.lane.get().and_then(Weak::upgrade) {
                lane.kill();
            }
            self.services.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_kill_from_task_clears_timer() {
        let work = Arc::new(SelfKilling::default());
        let lane = Arc::new(DeferredLane::spawn(1).expect("Failed to spawn lane"));
        let _ = work.lane.set(Arc::downgrade(&lane));
        lane.bind(Arc::downgrade(&work) as Weak<dyn DeferredWork>);
        lane.enable();

        assert!(lane.arm_retry(Duration::from_millis(200)));
        assert!(lane.schedule(0));
        assert!(wait_for(|| work.services.load(Ordering::SeqCst) == 1));
        assert!(!lane.retry_pending());

        // re-enabled before the old deadline; it must not fire
        lane.enable();
        thread::sleep(Duration::from_millis(350));
        assert_eq!(work.retries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_enable_after_kill() {
        let counter = Arc::new(Counter::default());
        let lane = lane_with(&counter);
        lane.kill();
        lane.enable();

        assert!(lane.arm_retry(Duration::from_millis(1)));
        assert!(wait_for(|| counter.retries.load(Ordering::SeqCst) == 1));
    }
}
