//! Named one-shot alarms.
//!
//! An alarm is a callback due at a wall-clock instant, identified by name.
//! Scheduling a name that is already pending replaces the old alarm, so a
//! purpose never has two alarms in flight. Cancelling a name that is not
//! pending does nothing.
//!
//! Alarms are run by a worker thread that sleeps until the earliest deadline,
//! woken early over a channel whenever the alarm set changes. The sleep is
//! capped so a wall-clock jump (NTP sync on a device without an RTC, suspend)
//! delays an alarm by at most [`SCHEDULER_MAX_WAIT`]. Callbacks run without
//! the scheduler lock held and may schedule or cancel alarms themselves.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::constants::SCHEDULER_MAX_WAIT;
use crate::time_source::TimeSource;

pub type AlarmCallback = Box<dyn FnOnce() + Send>;

struct Alarm {
    due: DateTime<Local>,
    callback: AlarmCallback,
}

enum Wake {
    Changed,
    Shutdown,
}

pub struct Scheduler {
    alarms: Arc<Mutex<HashMap<String, Alarm>>>,
    time: Arc<dyn TimeSource>,
    wake: Mutex<Option<Sender<Wake>>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Scheduler {
    /// A scheduler without a worker; alarms only run through [`run_due`](Self::run_due).
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            alarms: Arc::new(Mutex::new(HashMap::new())),
            time,
            wake: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Start the worker thread.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        *lock(&self.wake) = Some(tx);

        let scheduler = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("scheduler".to_string())
            .spawn(move || scheduler.worker_loop(rx))
            .context("Failed to spawn scheduler thread")?;
        *lock(&self.worker) = Some(handle);
        Ok(())
    }

    /// Stop the worker. Pending alarms are discarded.
    pub fn shutdown(&self) {
        if let Some(tx) = lock(&self.wake).take() {
            let _ = tx.send(Wake::Shutdown);
        }
        if let Some(handle) = lock(&self.worker).take() {
            let _ = handle.join();
        }
        lock(&self.alarms).clear();
    }

    /// Schedule `callback` at `due`, replacing any pending alarm named `name`.
    pub fn schedule<F>(&self, name: &str, due: DateTime<Local>, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        lock(&self.alarms).insert(
            name.to_string(),
            Alarm {
                due,
                callback: Box::new(callback),
            },
        );
        self.notify();
    }

    /// Cancel a pending alarm. Returns whether one was pending.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = lock(&self.alarms).remove(name).is_some();
        if removed {
            self.notify();
        }
        removed
    }

    pub fn is_scheduled(&self, name: &str) -> bool {
        lock(&self.alarms).contains_key(name)
    }

    pub fn due_time(&self, name: &str) -> Option<DateTime<Local>> {
        lock(&self.alarms).get(name).map(|alarm| alarm.due)
    }

    /// Pending alarms, earliest first.
    pub fn pending(&self) -> Vec<(String, DateTime<Local>)> {
        let mut pending: Vec<_> = lock(&self.alarms)
            .iter()
            .map(|(name, alarm)| (name.clone(), alarm.due))
            .collect();
        pending.sort_by_key(|(_, due)| *due);
        pending
    }

    /// Run every alarm due at or before `now`, earliest first. Returns how
    /// many ran.
    pub fn run_due(&self, now: DateTime<Local>) -> usize {
        let mut due: Vec<(String, Alarm)> = {
            let mut alarms = lock(&self.alarms);
            let names: Vec<String> = alarms
                .iter()
                .filter(|(_, alarm)| alarm.due <= now)
                .map(|(name, _)| name.clone())
                .collect();
            names
                .into_iter()
                .filter_map(|name| alarms.remove(&name).map(|alarm| (name, alarm)))
                .collect()
        };
        due.sort_by_key(|(_, alarm)| alarm.due);

        let count = due.len();
        for (_, alarm) in due {
            (alarm.callback)();
        }
        count
    }

    fn notify(&self) {
        if let Some(tx) = lock(&self.wake).as_ref() {
            let _ = tx.send(Wake::Changed);
        }
    }

    fn next_wait(&self) -> Duration {
        let now = self.time.now();
        lock(&self.alarms)
            .values()
            .map(|alarm| alarm.due)
            .min()
            .map(|due| (due - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(SCHEDULER_MAX_WAIT)
            .min(SCHEDULER_MAX_WAIT)
    }

    fn worker_loop(&self, rx: Receiver<Wake>) {
        loop {
            self.run_due(self.time.now());

            match rx.recv_timeout(self.next_wait()) {
                Ok(Wake::Changed) | Err(RecvTimeoutError::Timeout) => {}
                Ok(Wake::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_source::{ManualTimeSource, RealTimeSource, parse_datetime};
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manual() -> (Arc<ManualTimeSource>, Scheduler) {
        let clock = ManualTimeSource::shared(parse_datetime("2026-03-01 08:00:00").unwrap());
        let scheduler = Scheduler::new(clock.clone());
        (clock, scheduler)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let shared = Arc::clone(&hits);
        let make = move || {
            let hits = Arc::clone(&shared);
            Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (hits, make)
    }

    #[test]
    fn test_alarm_runs_only_when_due() {
        let (clock, scheduler) = manual();
        let (hits, make) = counter();
        let due = clock.now() + ChronoDuration::seconds(60);
        scheduler.schedule("dim", due, make());

        assert_eq!(scheduler.run_due(clock.advance(ChronoDuration::seconds(59))), 0);
        assert!(scheduler.is_scheduled("dim"));
        assert_eq!(scheduler.run_due(clock.advance(ChronoDuration::seconds(1))), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("dim"));
    }

    #[test]
    fn test_same_name_replaces_pending_alarm() {
        let (clock, scheduler) = manual();
        let (hits, make) = counter();
        scheduler.schedule("dim", clock.now() + ChronoDuration::seconds(60), make());
        let later = clock.now() + ChronoDuration::seconds(90);
        scheduler.schedule("dim", later, make());

        assert_eq!(scheduler.pending(), vec![("dim".to_string(), later)]);
        assert_eq!(scheduler.run_due(later), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_missing_alarm_is_noop() {
        let (clock, scheduler) = manual();
        assert!(!scheduler.cancel("night"));
        scheduler.schedule("night", clock.now(), || {});
        assert!(scheduler.cancel("night"));
        assert!(!scheduler.cancel("night"));
        assert_eq!(scheduler.run_due(clock.now()), 0);
    }

    #[test]
    fn test_callback_may_reschedule_itself() {
        let (clock, scheduler) = manual();
        let scheduler = Arc::new(scheduler);
        let inner = Arc::clone(&scheduler);
        let next = clock.now() + ChronoDuration::hours(1);
        scheduler.schedule("night", clock.now(), move || {
            inner.schedule("night", next, || {});
        });

        assert_eq!(scheduler.run_due(clock.now()), 1);
        assert_eq!(scheduler.due_time("night"), Some(next));
    }

    #[test]
    fn test_worker_fires_alarm() {
        let scheduler = Arc::new(Scheduler::new(Arc::new(RealTimeSource)));
        scheduler.start().unwrap();

        let (tx, rx) = mpsc::channel();
        scheduler.schedule(
            "soon",
            Local::now() + ChronoDuration::milliseconds(50),
            move || {
                let _ = tx.send(());
            },
        );
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        scheduler.shutdown();
        assert!(scheduler.pending().is_empty());
    }
}
