//! Timed tasks run at turn boundaries.
//!
//! Time is simulation time in milliseconds, advanced only by `update`. Due
//! tasks run in (due time, id) order so every peer fires them identically.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};

use tracing::trace;

use crate::world::EntityStore;

/// Identifier returned by `schedule_*`, used to cancel.
pub type TaskId = u64;

/// Task body. Receives the entity store and the task's due time.
pub type TaskFn = Box<dyn FnMut(&mut EntityStore, u64)>;

struct ScheduledTask {
    interval_ms: Option<u64>,
    run: TaskFn,
}

#[derive(Default)]
pub struct TaskScheduler {
    now_ms: u64,
    next_id: TaskId,
    queue: BinaryHeap<Reverse<(u64, TaskId)>>,
    tasks: BTreeMap<TaskId, ScheduledTask>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current simulation time.
    pub fn now(&self) -> u64 {
        self.now_ms
    }

    /// Number of live (uncancelled, not yet finished) tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run `task` once, `delay_ms` from now.
    pub fn schedule_timeout(&mut self, delay_ms: u64, task: TaskFn) -> TaskId {
        self.insert(delay_ms, None, task)
    }

    /// Run `task` every `interval_ms`, first after `delay_ms`. An interval
    /// of zero is treated as 1 ms.
    pub fn schedule_interval(&mut self, delay_ms: u64, interval_ms: u64, task: TaskFn) -> TaskId {
        self.insert(delay_ms, Some(interval_ms.max(1)), task)
    }

    /// Returns false if the task had already finished or was unknown.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.tasks.remove(&id).is_some()
    }

    /// Advance time by one turn and run everything that fell due.
    /// Returns how many task invocations ran.
    pub fn update(&mut self, turn_length_ms: u32, entities: &mut EntityStore) -> usize {
        self.now_ms += u64::from(turn_length_ms);
        let mut ran = 0;
        while let Some(&Reverse((due, id))) = self.queue.peek() {
            if due > self.now_ms {
                break;
            }
            self.queue.pop();
            // Cancelled tasks leave a stale heap entry behind.
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            trace!(task = id, due, "running scheduled task");
            (task.run)(entities, due);
            ran += 1;
            let interval = task.interval_ms;
            match interval {
                Some(interval) => self.queue.push(Reverse((due + interval, id))),
                None => {
                    self.tasks.remove(&id);
                }
            }
        }
        ran
    }

    fn insert(&mut self, delay_ms: u64, interval_ms: Option<u64>, run: TaskFn) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.queue.push(Reverse((self.now_ms + delay_ms, id)));
        self.tasks.insert(id, ScheduledTask { interval_ms, run });
        id
    }
}
