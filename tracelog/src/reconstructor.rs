// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Rebuilds the stack of active phases from one event stream.
//!
//! The reconstructor keeps a two-slot lookahead buffer: `current` is the last
//! event applied to the stack and `next` is the event that ends its interval.
//! The interval length is what the scheduler uses to advance all streams in
//! lock-step.

use crate::error::{Result, TraceError};
use crate::event::{Engine, Event, EventKind, Task};
use crate::stats::StatKey;
use crate::stream::EventStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// What happens when a stop event would pop the idle frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnbalancedPolicy {
    /// Treat the stream as truncated at the offending event: it reports the
    /// idle frame for the rest of the timeline.
    #[default]
    Degrade,
    /// Fail the whole run.
    Abort,
}

/// A stack frame. `id` is unique within its stream and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub id: u64,
    pub task: Task,
    pub engine: Option<Engine>,
    pub event: Arc<Event>,
}

impl Phase {
    fn new(id: u64, event: Arc<Event>) -> Self {
        let task = event.task().unwrap_or(Task::Idle);
        Self {
            id,
            task,
            engine: None,
            event,
        }
    }

    pub fn idle() -> Self {
        Self::new(0, Arc::new(Event::idle()))
    }

    /// Code used by the display tables: the task code, plus the engine
    /// letter when one is attached (`"s b"`).
    pub fn class_code(&self) -> String {
        StatKey::of(self).code()
    }
}

/// A change applied to the stack at an event boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Pushed(Phase),
    EngineChanged { id: u64, engine: Engine },
    Popped(Phase),
}

pub struct StackReconstructor {
    name: String,
    stream: Option<EventStream>,
    stack: Vec<Phase>,
    current: Option<Arc<Event>>,
    next: Option<Event>,
    remaining: u64,
    end: u64,
    done: bool,
    policy: UnbalancedPolicy,
    next_id: u64,
    transitions: Vec<Transition>,
    degraded_at: Option<u64>,
}

impl StackReconstructor {
    /// Primes the lookahead buffer with the first event. `end` is the global
    /// timeline length.
    pub fn new(mut stream: EventStream, end: u64, policy: UnbalancedPolicy) -> Result<Self> {
        let name = stream.name().to_string();
        let next = stream.next_event()?;
        let (remaining, done) = match &next {
            Some(event) => (event.timestamp, false),
            None => {
                debug!(stream = %name, "trace log holds no events");
                (end, true)
            }
        };

        Ok(Self {
            name,
            stream: if done { None } else { Some(stream) },
            stack: vec![Phase::idle()],
            current: None,
            next,
            remaining,
            end,
            done,
            policy,
            next_id: 1,
            transitions: Vec::new(),
            degraded_at: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live stack, innermost phase last.
    pub fn current_stack(&self) -> &[Phase] {
        &self.stack
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Ticks left until the next event boundary, or until the timeline end
    /// once the stream is exhausted.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Event applied most recently.
    pub fn current(&self) -> Option<&Event> {
        self.current.as_deref()
    }

    /// Transitions applied by the last call to [`advance_by`](Self::advance_by).
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Timestamp at which the stream was cut short by an unbalanced stop.
    pub fn degraded_at(&self) -> Option<u64> {
        self.degraded_at
    }

    /// Consumes `ticks`, applying every event boundary reached on the way.
    /// Returns whether any transition happened.
    pub fn advance_by(&mut self, ticks: u64) -> Result<bool> {
        self.transitions.clear();
        let mut ticks = ticks;
        while !self.done && ticks >= self.remaining {
            ticks -= self.remaining;
            self.remaining = 0;
            self.step()?;
        }
        self.remaining = self.remaining.saturating_sub(ticks);
        Ok(!self.transitions.is_empty())
    }

    fn step(&mut self) -> Result<()> {
        let Some(current) = self.next.take() else {
            self.finish();
            return Ok(());
        };

        let next = match self.stream.as_mut().map(EventStream::next_event) {
            Some(Ok(next)) => next,
            Some(Err(err)) => return self.fail(current.timestamp, err),
            None => None,
        };
        self.next = next;
        self.remaining = match &self.next {
            Some(next) => next.timestamp.saturating_sub(current.timestamp),
            None => self.end.saturating_sub(current.timestamp),
        };

        let current = Arc::new(current);
        self.current = Some(Arc::clone(&current));
        self.apply(current)?;

        if self.next.is_none() {
            self.finish();
        }
        Ok(())
    }

    fn apply(&mut self, event: Arc<Event>) -> Result<()> {
        match event.kind {
            EventKind::Start => {
                let mut phase = Phase::new(self.next_id, Arc::clone(&event));
                self.next_id += 1;
                // Logs report "script started" and "engine selected" as two
                // records at the same instant.
                if phase.task == Task::Script {
                    if let Some(next) = &self.next {
                        if next.kind == EventKind::EngineChange
                            && next.timestamp == event.timestamp
                        {
                            phase.engine = next.engine();
                        }
                    }
                }
                self.transitions.push(Transition::Pushed(phase.clone()));
                self.stack.push(phase);
            }
            EventKind::EngineChange => {
                if let Some(engine) = event.engine() {
                    let last = self.stack.len() - 1;
                    let top = &mut self.stack[last];
                    top.engine = Some(engine);
                    self.transitions.push(Transition::EngineChanged {
                        id: top.id,
                        engine,
                    });
                }
            }
            EventKind::Stop => {
                if self.stack.len() > 1 {
                    if let Some(phase) = self.stack.pop() {
                        self.transitions.push(Transition::Popped(phase));
                    }
                } else {
                    let err = TraceError::UnbalancedStack {
                        stream: self.name.clone(),
                        timestamp: event.timestamp,
                    };
                    return self.fail(event.timestamp, err);
                }
            }
        }
        Ok(())
    }

    fn fail(&mut self, timestamp: u64, err: TraceError) -> Result<()> {
        match self.policy {
            UnbalancedPolicy::Abort => Err(err),
            UnbalancedPolicy::Degrade => {
                warn!(stream = %self.name, timestamp, error = %err, "treating trace log as truncated");
                while self.stack.len() > 1 {
                    if let Some(phase) = self.stack.pop() {
                        self.transitions.push(Transition::Popped(phase));
                    }
                }
                self.degraded_at = Some(timestamp);
                self.next = None;
                self.remaining = self.end.saturating_sub(timestamp);
                self.finish();
                Ok(())
            }
        }
    }

    fn finish(&mut self) {
        if !self.done {
            let skipped = self.stream.as_ref().map_or(0, EventStream::skipped);
            debug!(stream = %self.name, depth = self.stack.len(), skipped, "trace log exhausted");
        }
        self.done = true;
        self.stream = None;
    }
}
