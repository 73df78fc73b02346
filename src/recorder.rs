//! Append-only, time-ordered recording of scheduling events.
//!
//! Every scheduling decision (dispatch, preemption, eviction, completion,
//! deadline miss, admission rejection) is recorded as a `SchedEvent` with a
//! virtual timestamp. The append path is the sole serialization point
//! across producers: both scheduling classes share one recorder and no
//! event is ever dropped or reordered.

use std::io;
use std::sync::Mutex;

use serde::Serialize;

use crate::fmt::FmtTick;
use crate::types::{CpuId, MemUnits, TaskId, Tick};

/// The kind of scheduling event recorded, with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A task started (or resumed) running on a CPU unit. `wait` is the
    /// submission-to-dispatch delay, present only on the first dispatch.
    Dispatch { cpu: CpuId, wait: Option<Tick> },
    /// A task was suspended. `by` names the preemptor for priority
    /// preemption; quantum expiry and backgrounding carry `None`.
    Preempt { by: Option<TaskId> },
    /// A task's memory was reclaimed (or the task was withdrawn).
    Evict { freed: MemUnits },
    /// A task retired all of its CPU cost.
    Complete { turnaround: Tick },
    /// A deadline elapsed before completion.
    DeadlineMiss { deadline: Tick },
    /// A submission was refused at admission.
    AdmissionRejected { needed: u64, available: u64 },
}

/// Payload-free discriminant of `EventKind`, for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Dispatch,
    Preempt,
    Evict,
    Complete,
    DeadlineMiss,
    AdmissionRejected,
}

impl EventKind {
    pub fn class(&self) -> EventClass {
        match self {
            EventKind::Dispatch { .. } => EventClass::Dispatch,
            EventKind::Preempt { .. } => EventClass::Preempt,
            EventKind::Evict { .. } => EventClass::Evict,
            EventKind::Complete { .. } => EventClass::Complete,
            EventKind::DeadlineMiss { .. } => EventClass::DeadlineMiss,
            EventKind::AdmissionRejected { .. } => EventClass::AdmissionRejected,
        }
    }
}

/// A single recorded scheduling event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedEvent {
    /// Position in the log; dense and strictly increasing.
    pub seq: u64,
    /// Virtual tick at which the event occurred.
    pub at: Tick,
    pub task: TaskId,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The append-only event log.
pub struct EventRecorder {
    inner: Mutex<Vec<SchedEvent>>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    pub fn new() -> Self {
        EventRecorder {
            inner: Mutex::new(Vec::new()),
        }
    }

    /// Append one event and return its sequence number.
    pub fn record(&self, at: Tick, task: TaskId, kind: EventKind) -> u64 {
        let mut log = self.inner.lock().unwrap();
        let seq = log.len() as u64;
        log.push(SchedEvent {
            seq,
            at,
            task,
            kind,
        });
        seq
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The event at log position `idx`, if already recorded. Cheap enough
    /// for cursor-style consumption one event at a time.
    pub fn get(&self, idx: usize) -> Option<SchedEvent> {
        self.inner.lock().unwrap().get(idx).copied()
    }

    /// Snapshot of all events in append order.
    pub fn events(&self) -> Vec<SchedEvent> {
        self.inner.lock().unwrap().clone()
    }

    /// Start a lazy query over the log. The cursor snapshots the current
    /// log length, so it is finite and re-running the same query over a
    /// closed range always yields the same sequence.
    pub fn query(&self) -> EventQuery<'_> {
        EventQuery {
            recorder: self,
            filter: EventFilter::default(),
        }
    }

    /// Count events of one class across the whole log.
    pub fn class_count(&self, class: EventClass) -> usize {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind.class() == class)
            .count()
    }

    /// Count events of one class for one task.
    pub fn task_class_count(&self, task: TaskId, class: EventClass) -> usize {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.task == task && e.kind.class() == class)
            .count()
    }

    /// First event of one class for one task, if any.
    pub fn first_for(&self, task: TaskId, class: EventClass) -> Option<SchedEvent> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.task == task && e.kind.class() == class)
            .copied()
    }

    /// Serialize the log as a JSON array of structured records, for the
    /// external monitoring layer.
    pub fn write_json(&self, writer: &mut impl io::Write) -> io::Result<()> {
        let log = self.inner.lock().unwrap();
        serde_json::to_writer_pretty(writer, &*log)?;
        Ok(())
    }

    /// Pretty-print the log to stderr for debugging.
    pub fn dump(&self) {
        for event in self.inner.lock().unwrap().iter() {
            let desc = match event.kind {
                EventKind::Dispatch { cpu, wait } => match wait {
                    Some(w) => format!("DISPATCH task={} cpu={} wait={w}", event.task.0, cpu.0),
                    None => format!("DISPATCH task={} cpu={} (resume)", event.task.0, cpu.0),
                },
                EventKind::Preempt { by } => match by {
                    Some(p) => format!("PREEMPT  task={} by={}", event.task.0, p.0),
                    None => format!("PREEMPT  task={} (quantum)", event.task.0),
                },
                EventKind::Evict { freed } => {
                    format!("EVICT    task={} freed={freed}", event.task.0)
                }
                EventKind::Complete { turnaround } => {
                    format!("COMPLETE task={} turnaround={turnaround}", event.task.0)
                }
                EventKind::DeadlineMiss { deadline } => {
                    format!("MISS     task={} deadline={deadline}", event.task.0)
                }
                EventKind::AdmissionRejected { needed, available } => {
                    format!(
                        "REJECT   task={} needed={needed} available={available}",
                        event.task.0
                    )
                }
            };
            eprintln!("[{}] {}", FmtTick(event.at), desc);
        }
    }
}

/// Time-range and kind constraints on a query.
#[derive(Debug, Clone, Copy, Default)]
struct EventFilter {
    from: Option<Tick>,
    to: Option<Tick>,
    class: Option<EventClass>,
    task: Option<TaskId>,
}

impl EventFilter {
    fn matches(&self, event: &SchedEvent) -> bool {
        if let Some(from) = self.from {
            if event.at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.at > to {
                return false;
            }
        }
        if let Some(class) = self.class {
            if event.kind.class() != class {
                return false;
            }
        }
        if let Some(task) = self.task {
            if event.task != task {
                return false;
            }
        }
        true
    }
}

/// Builder for a filtered cursor over the log.
pub struct EventQuery<'a> {
    recorder: &'a EventRecorder,
    filter: EventFilter,
}

impl<'a> EventQuery<'a> {
    /// Keep events with `from <= at <= to` (a closed time range).
    pub fn between(mut self, from: Tick, to: Tick) -> Self {
        self.filter.from = Some(from);
        self.filter.to = Some(to);
        self
    }

    pub fn since(mut self, from: Tick) -> Self {
        self.filter.from = Some(from);
        self
    }

    pub fn until(mut self, to: Tick) -> Self {
        self.filter.to = Some(to);
        self
    }

    pub fn of_class(mut self, class: EventClass) -> Self {
        self.filter.class = Some(class);
        self
    }

    pub fn for_task(mut self, task: TaskId) -> Self {
        self.filter.task = Some(task);
        self
    }

    /// Materialize the cursor. The log length is snapshotted here: events
    /// appended afterwards are not visible to this cursor.
    pub fn iter(self) -> EventCursor<'a> {
        EventCursor {
            recorder: self.recorder,
            filter: self.filter,
            idx: 0,
            end: self.recorder.len(),
        }
    }
}

impl<'a> IntoIterator for EventQuery<'a> {
    type Item = SchedEvent;
    type IntoIter = EventCursor<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Lazy, finite, restartable iterator over the log. Each `next` re-reads
/// from the recorder under its lock, so memory use stays bounded no matter
/// how long the run.
pub struct EventCursor<'a> {
    recorder: &'a EventRecorder,
    filter: EventFilter,
    idx: usize,
    end: usize,
}

impl EventCursor<'_> {
    /// Rewind to the start of the log, keeping the original snapshot bound.
    pub fn restart(&mut self) {
        self.idx = 0;
    }
}

impl Iterator for EventCursor<'_> {
    type Item = SchedEvent;

    fn next(&mut self) -> Option<SchedEvent> {
        while self.idx < self.end {
            let event = self.recorder.get(self.idx)?;
            self.idx += 1;
            if self.filter.matches(&event) {
                return Some(event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> EventRecorder {
        let rec = EventRecorder::new();
        rec.record(
            0,
            TaskId(1),
            EventKind::Dispatch {
                cpu: CpuId(0),
                wait: Some(0),
            },
        );
        rec.record(1, TaskId(1), EventKind::Preempt { by: Some(TaskId(2)) });
        rec.record(
            1,
            TaskId(2),
            EventKind::Dispatch {
                cpu: CpuId(0),
                wait: Some(1),
            },
        );
        rec.record(3, TaskId(2), EventKind::Complete { turnaround: 3 });
        rec
    }

    #[test]
    fn test_append_assigns_dense_seq() {
        let rec = sample_log();
        let seqs: Vec<u64> = rec.events().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_query_closed_range() {
        let rec = sample_log();
        let hits: Vec<SchedEvent> = rec.query().between(1, 1).iter().collect();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|e| e.at == 1));
    }

    #[test]
    fn test_query_by_class_and_task() {
        let rec = sample_log();
        let hits: Vec<SchedEvent> = rec
            .query()
            .of_class(EventClass::Dispatch)
            .for_task(TaskId(2))
            .iter()
            .collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].at, 1);
    }

    #[test]
    fn test_cursor_snapshot_excludes_later_appends() {
        let rec = sample_log();
        let mut cursor = rec.query().iter();
        rec.record(9, TaskId(3), EventKind::Complete { turnaround: 1 });
        assert_eq!(cursor.by_ref().count(), 4);
        // A fresh query reflects the new log state.
        assert_eq!(rec.query().iter().count(), 5);
    }

    #[test]
    fn test_cursor_restart_is_idempotent() {
        let rec = sample_log();
        let mut cursor = rec.query().of_class(EventClass::Dispatch).iter();
        let first: Vec<SchedEvent> = cursor.by_ref().collect();
        cursor.restart();
        let second: Vec<SchedEvent> = cursor.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_json_export() {
        let rec = sample_log();
        let mut out = Vec::new();
        rec.write_json(&mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 4);
        assert_eq!(parsed[0]["kind"], "dispatch");
    }
}
