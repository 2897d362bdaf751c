//! Task queue: a named persistent FIFO
//!
//! Each source owns two queues: the request queue serializes user-initiated
//! work, the sync queue serializes inbound transform application. Tasks are
//! processed strictly in order, at most one at a time. A failing task parks
//! at head-of-line with its error observable via `current_error`; the caller
//! decides with `skip`, `retry`, or `clear`.
//!
//! ## Persistence
//!
//! When a bucket is configured, the pending tasks are serialized under the
//! queue's name on every mutation - `push` persists before performing. On
//! construction the queue hydrates from that key; `reified` reports that
//! hydration has completed. Processing resumes once the owning source starts
//! the queue.
//!
//! ## Performing
//!
//! Freshly pushed requests are performed with a caller-supplied closure (the
//! pipelines thread their live hints through it). Tasks replayed from
//! persistence, drained behind a fresh push, or re-run via `retry` go to the
//! attached [`TaskPerformer`].

use crate::bucket::Bucket;
use crate::notifier::{ListenerKey, Notifier};
use crate::task::{Task, TaskOutcome, TaskPerformer};
use orrery_core::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Overrides for one queue's construction
#[derive(Default)]
pub struct TaskQueueSettings {
    /// Queue name override (defaults to `<source>-requests` / `<source>-sync`)
    pub name: Option<String>,
    /// Process tasks as they arrive (default true)
    pub auto_process: Option<bool>,
    /// Bucket override (defaults to the source's bucket)
    pub bucket: Option<Arc<dyn Bucket>>,
}

struct Entry {
    seq: u64,
    task: Task,
}

struct QueueState {
    entries: VecDeque<Entry>,
    current_error: Option<Error>,
    next_seq: u64,
    processing: bool,
}

type PerformFn<'a> = &'a mut dyn FnMut(&Task) -> Result<TaskOutcome>;

/// A named persistent FIFO of tasks
pub struct TaskQueue {
    name: String,
    bucket: Option<Arc<dyn Bucket>>,
    auto_process: bool,
    started: AtomicBool,
    reified: AtomicBool,
    state: Mutex<QueueState>,
    performer: RwLock<Option<Weak<dyn TaskPerformer>>>,
    fail_notifier: Notifier<(Task, Error)>,
}

impl TaskQueue {
    /// Create a queue, hydrating pending tasks from the bucket
    pub fn new(
        name: impl Into<String>,
        bucket: Option<Arc<dyn Bucket>>,
        auto_process: bool,
    ) -> Result<Self> {
        let name = name.into();
        let mut entries = VecDeque::new();
        let mut next_seq = 0;
        if let Some(bucket) = &bucket {
            if let Some(value) = bucket.get_item(&name)? {
                let tasks: Vec<Task> = serde_json::from_value(value)?;
                debug!(queue = %name, pending = tasks.len(), "hydrated task queue");
                for task in tasks {
                    entries.push_back(Entry {
                        seq: next_seq,
                        task,
                    });
                    next_seq += 1;
                }
            }
        }
        let queue = Self {
            name,
            bucket,
            auto_process,
            started: AtomicBool::new(false),
            reified: AtomicBool::new(true),
            state: Mutex::new(QueueState {
                entries,
                current_error: None,
                next_seq,
                processing: false,
            }),
            performer: RwLock::new(None),
            fail_notifier: Notifier::new(),
        };
        Ok(queue)
    }

    /// The queue's name (and bucket key)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether hydration from the bucket has completed
    pub fn reified(&self) -> bool {
        self.reified.load(Ordering::SeqCst)
    }

    /// Whether tasks are processed as they arrive
    pub fn auto_process(&self) -> bool {
        self.auto_process
    }

    /// Number of pending tasks
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Check whether no tasks are pending
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// The task parked at head-of-line, if any
    pub fn peek(&self) -> Option<Task> {
        self.state.lock().entries.front().map(|e| e.task.clone())
    }

    /// The error parking the queue, if any
    pub fn current_error(&self) -> Option<Error> {
        self.state.lock().current_error.clone()
    }

    /// Attach the performer used for drains, replays, and retries
    pub fn set_performer(&self, performer: Weak<dyn TaskPerformer>) {
        *self.performer.write() = Some(performer);
    }

    /// Observe task failures
    pub fn on_fail(&self, listener: impl FnMut(&(Task, Error)) + Send + 'static) -> ListenerKey {
        self.fail_notifier.on(listener)
    }

    /// Remove a failure listener
    pub fn off_fail(&self, key: ListenerKey) {
        self.fail_notifier.off(key);
    }

    /// Start the queue; pending tasks drain if auto-processing
    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        if self.auto_process {
            if let Err(error) = self.drain(None, None) {
                warn!(queue = %self.name, %error, "queue persistence failed while draining");
            } else if let Some(error) = self.current_error() {
                warn!(queue = %self.name, %error, "task failed while draining on start");
            }
        }
    }

    /// Stop the queue; pending tasks stay queued
    pub fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    /// Check whether the queue has been started
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Enqueue + process
    // ========================================================================

    /// Enqueue a task; drain with the attached performer if auto-processing
    ///
    /// Returns the task's outcome when it was performed in this call, or
    /// `None` when it stays queued (queue stopped, parked, no performer, or
    /// re-entrant push during a drain).
    pub fn push(&self, task: Task) -> Result<Option<TaskOutcome>> {
        let seq = self.enqueue(task)?;
        if !self.can_drain() {
            return Ok(None);
        }
        self.drain(Some(seq), None)
    }

    /// Enqueue a task and perform it with the given closure
    ///
    /// Predecessor tasks drain through the attached performer first; the
    /// fresh task itself is performed by `perform` so the caller's hints
    /// stay live. Remaining tasks continue to drain afterwards.
    pub fn push_and_process(
        &self,
        task: Task,
        perform: PerformFn<'_>,
    ) -> Result<Option<TaskOutcome>> {
        let seq = self.enqueue(task)?;
        if !self.can_drain() {
            return Ok(None);
        }
        self.drain(Some(seq), Some(perform))
    }

    /// Discard the head task and continue processing
    pub fn skip(&self, error: Option<Error>) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.entries.pop_front().is_none() {
                return Err(Error::queue_empty(&self.name));
            }
            state.current_error = None;
        }
        if let Some(error) = error {
            debug!(queue = %self.name, %error, "skipped head task");
        }
        self.persist()?;
        if self.can_drain() {
            self.drain(None, None)?;
        }
        Ok(())
    }

    /// Remove the head task silently, returning it
    pub fn shift(&self) -> Result<Task> {
        let task = {
            let mut state = self.state.lock();
            let entry = state
                .entries
                .pop_front()
                .ok_or_else(|| Error::queue_empty(&self.name))?;
            state.current_error = None;
            entry.task
        };
        self.persist()?;
        Ok(task)
    }

    /// Re-run the head task with the attached performer
    pub fn retry(&self) -> Result<TaskOutcome> {
        let seq = {
            let mut state = self.state.lock();
            state.current_error = None;
            state
                .entries
                .front()
                .map(|entry| entry.seq)
                .ok_or_else(|| Error::queue_empty(&self.name))?
        };
        match self.drain(Some(seq), None)? {
            Some(outcome) => Ok(outcome),
            None => Err(Error::queue_busy(
                &self.name,
                "no performer attached for retry",
            )),
        }
    }

    /// Discard every pending task
    pub fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.entries.clear();
            state.current_error = None;
        }
        self.persist()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn enqueue(&self, task: Task) -> Result<u64> {
        let seq = {
            let mut state = self.state.lock();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.entries.push_back(Entry { seq, task });
            seq
        };
        // Persist before performing: the pending set must survive a crash
        // between enqueue and completion.
        self.persist()?;
        Ok(seq)
    }

    fn can_drain(&self) -> bool {
        self.started() && self.auto_process
    }

    /// Drain tasks from the head until the queue is empty, parks, or stalls
    ///
    /// `target` selects the task whose outcome is captured and returned.
    /// `perform` handles the target; everything else goes to the attached
    /// performer.
    fn drain(
        &self,
        target: Option<u64>,
        mut perform: Option<PerformFn<'_>>,
    ) -> Result<Option<TaskOutcome>> {
        let mut captured: Option<TaskOutcome> = None;
        loop {
            let head = {
                let mut state = self.state.lock();
                if state.current_error.is_some() || state.processing {
                    return Ok(captured);
                }
                match state.entries.front().map(|entry| (entry.seq, entry.task.clone())) {
                    None => return Ok(captured),
                    Some(head) => {
                        state.processing = true;
                        head
                    }
                }
            };
            let (seq, task) = head;
            let is_target = Some(seq) == target;

            let result = match (&mut perform, is_target) {
                (Some(perform), true) => Some(perform(&task)),
                _ => self.perform_with_performer(&task),
            };

            let Some(result) = result else {
                // No performer attached; leave the head queued.
                self.state.lock().processing = false;
                return Ok(captured);
            };

            match result {
                Ok(outcome) => {
                    {
                        let mut state = self.state.lock();
                        state.entries.pop_front();
                        state.processing = false;
                    }
                    self.persist()?;
                    if is_target {
                        captured = Some(outcome);
                    }
                }
                Err(error) => {
                    {
                        let mut state = self.state.lock();
                        state.current_error = Some(error.clone());
                        state.processing = false;
                    }
                    self.fail_notifier.emit(&(task, error.clone()));
                    if is_target {
                        return Err(error);
                    }
                    return Ok(captured);
                }
            }
        }
    }

    fn perform_with_performer(&self, task: &Task) -> Option<Result<TaskOutcome>> {
        let performer = self.performer.read().as_ref()?.upgrade()?;
        Some(performer.perform(task))
    }

    fn persist(&self) -> Result<()> {
        let Some(bucket) = &self.bucket else {
            return Ok(());
        };
        let tasks: Vec<Task> = {
            let state = self.state.lock();
            state.entries.iter().map(|entry| entry.task.clone()).collect()
        };
        bucket.set_item(&self.name, serde_json::to_value(tasks)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::MemoryBucket;
    use parking_lot::Mutex as PMutex;
    use serde_json::json;

    struct RecordingPerformer {
        performed: PMutex<Vec<String>>,
        fail_on: Option<String>,
    }

    impl RecordingPerformer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                performed: PMutex::new(Vec::new()),
                fail_on: None,
            })
        }

        fn failing_on(kind: &str) -> Arc<Self> {
            Arc::new(Self {
                performed: PMutex::new(Vec::new()),
                fail_on: Some(kind.to_string()),
            })
        }
    }

    impl TaskPerformer for RecordingPerformer {
        fn perform(&self, task: &Task) -> Result<TaskOutcome> {
            if self.fail_on.as_deref() == Some(task.kind.as_str()) {
                return Err(Error::network("simulated failure"));
            }
            self.performed.lock().push(task.kind.clone());
            Ok(TaskOutcome::none())
        }
    }

    fn started_queue(performer: &Arc<RecordingPerformer>) -> TaskQueue {
        let queue = TaskQueue::new("q", None, true).unwrap();
        let performer_dyn: Arc<dyn TaskPerformer> = performer.clone();
        let weak: Weak<dyn TaskPerformer> = Arc::downgrade(&performer_dyn);
        queue.set_performer(weak);
        queue.start();
        queue
    }

    #[test]
    fn test_fifo_completion_order() {
        let performer = RecordingPerformer::new();
        let queue = TaskQueue::new("q", None, true).unwrap();
        let performer_dyn: Arc<dyn TaskPerformer> = performer.clone();
        let weak: Weak<dyn TaskPerformer> = Arc::downgrade(&performer_dyn);
        queue.set_performer(weak);

        // Stopped queue accumulates in order...
        queue.push(Task::new("a", json!(1))).unwrap();
        queue.push(Task::new("b", json!(2))).unwrap();
        queue.push(Task::new("c", json!(3))).unwrap();
        assert_eq!(queue.len(), 3);

        // ...and drains in the same order on start.
        queue.start();
        assert_eq!(&*performer.performed.lock(), &["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failure_parks_head() {
        let performer = RecordingPerformer::failing_on("bad");
        let queue = started_queue(&performer);

        let err = queue.push(Task::new("bad", json!(null))).unwrap_err();
        assert!(matches!(err, Error::Network { .. }));
        assert_eq!(queue.len(), 1);
        assert!(queue.current_error().is_some());

        // Later pushes stay behind the parked head.
        queue.push(Task::new("ok", json!(null))).unwrap();
        assert_eq!(queue.len(), 2);
        assert!(performer.performed.lock().is_empty());
    }

    #[test]
    fn test_skip_discards_and_continues() {
        let performer = RecordingPerformer::failing_on("bad");
        let queue = started_queue(&performer);

        let _ = queue.push(Task::new("bad", json!(null)));
        queue.push(Task::new("ok", json!(null))).unwrap();

        queue.skip(None).unwrap();
        assert!(queue.current_error().is_none());
        assert!(queue.is_empty());
        assert_eq!(&*performer.performed.lock(), &["ok"]);
    }

    #[test]
    fn test_shift_removes_silently() {
        let performer = RecordingPerformer::failing_on("bad");
        let queue = started_queue(&performer);
        let _ = queue.push(Task::new("bad", json!(null)));

        let task = queue.shift().unwrap();
        assert_eq!(task.kind, "bad");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_retry_reruns_head() {
        let performer = RecordingPerformer::new();
        let queue = TaskQueue::new("q", None, false).unwrap();
        let performer_dyn: Arc<dyn TaskPerformer> = performer.clone();
        let weak: Weak<dyn TaskPerformer> = Arc::downgrade(&performer_dyn);
        queue.set_performer(weak);
        queue.start();

        // auto_process off: the task stays queued.
        queue.push(Task::new("a", json!(null))).unwrap();
        assert_eq!(queue.len(), 1);

        queue.retry().unwrap();
        assert!(queue.is_empty());
        assert_eq!(&*performer.performed.lock(), &["a"]);
    }

    #[test]
    fn test_retry_on_empty_queue() {
        let performer = RecordingPerformer::new();
        let queue = started_queue(&performer);
        assert!(matches!(queue.retry().unwrap_err(), Error::QueueEmpty { .. }));
    }

    #[test]
    fn test_clear() {
        let performer = RecordingPerformer::failing_on("bad");
        let queue = started_queue(&performer);
        let _ = queue.push(Task::new("bad", json!(null)));
        queue.push(Task::new("x", json!(null))).unwrap();

        queue.clear().unwrap();
        assert!(queue.is_empty());
        assert!(queue.current_error().is_none());
    }

    #[test]
    fn test_persists_pending_tasks_to_bucket() {
        let bucket: Arc<dyn Bucket> = Arc::new(MemoryBucket::new());
        let queue = TaskQueue::new("pending", Some(bucket.clone()), true).unwrap();
        // Not started: tasks accumulate and persist.
        queue.push(Task::new("a", json!(1))).unwrap();
        queue.push(Task::new("b", json!(2))).unwrap();

        let stored = bucket.get_item("pending").unwrap().unwrap();
        let tasks: Vec<Task> = serde_json::from_value(stored).unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].kind, "a");
    }

    #[test]
    fn test_hydrates_from_bucket_and_drains_on_start() {
        let bucket: Arc<dyn Bucket> = Arc::new(MemoryBucket::new());
        bucket
            .set_item(
                "pending",
                json!([{"type": "a", "data": 1}, {"type": "b", "data": 2}]),
            )
            .unwrap();

        let performer = RecordingPerformer::new();
        let queue = TaskQueue::new("pending", Some(bucket.clone()), true).unwrap();
        assert!(queue.reified());
        assert_eq!(queue.len(), 2);

        let performer_dyn: Arc<dyn TaskPerformer> = performer.clone();
        let weak: Weak<dyn TaskPerformer> = Arc::downgrade(&performer_dyn);
        queue.set_performer(weak);
        queue.start();
        assert_eq!(&*performer.performed.lock(), &["a", "b"]);

        // Drained queue persists as empty.
        let stored = bucket.get_item("pending").unwrap().unwrap();
        let tasks: Vec<Task> = serde_json::from_value(stored).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_push_and_process_uses_closure_for_target() {
        let performer = RecordingPerformer::new();
        let queue = started_queue(&performer);

        let mut closure_ran = false;
        let outcome = queue
            .push_and_process(Task::new("special", json!(null)), &mut |task| {
                assert_eq!(task.kind, "special");
                closure_ran = true;
                Ok(TaskOutcome::none())
            })
            .unwrap();

        assert!(closure_ran);
        assert!(outcome.is_some());
        // The performer never saw the fresh task.
        assert!(performer.performed.lock().is_empty());
    }

    #[test]
    fn test_fail_listener_observes_error() {
        let performer = RecordingPerformer::failing_on("bad");
        let queue = started_queue(&performer);

        let seen: Arc<PMutex<Vec<String>>> = Arc::new(PMutex::new(Vec::new()));
        let sink = seen.clone();
        queue.on_fail(move |(task, error)| {
            sink.lock().push(format!("{}:{}", task.kind, error.description()));
        });

        let _ = queue.push(Task::new("bad", json!(null)));
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].starts_with("bad:"));
    }
}
