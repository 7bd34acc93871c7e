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

use crate::error::{Result, TraceError};
use crate::reconstructor::{Phase, StackReconstructor, Transition, UnbalancedPolicy};
use crate::stream::{timeline_length, EventStream};
use std::path::Path;
use tracing::debug;

/// One stream's view of a tick.
#[derive(Debug, Clone, Copy)]
pub struct StreamSnapshot<'a> {
    /// Stack held during the tick. Exhausted streams report the idle frame.
    pub stack: &'a [Phase],
    /// Transitions applied at the tick's start boundary.
    pub transitions: &'a [Transition],
    pub done: bool,
}

impl<'a> StreamSnapshot<'a> {
    pub fn top(&self) -> Option<&'a Phase> {
        self.stack.last()
    }
}

/// Interval `[start, start + duration)` during which no stream changes state.
#[derive(Debug, Clone)]
pub struct Tick<'a> {
    pub start: u64,
    pub duration: u64,
    pub streams: Vec<StreamSnapshot<'a>>,
}

/// Advances every stream in lock-step by the shortest pending interval.
pub struct MultiStreamScheduler {
    readers: Vec<StackReconstructor>,
    length: u64,
    clock: u64,
    primed: bool,
    pending: Option<u64>,
    idle: Vec<Phase>,
}

impl MultiStreamScheduler {
    pub fn new(readers: Vec<StackReconstructor>, length: u64) -> Self {
        Self {
            readers,
            length,
            clock: 0,
            primed: false,
            pending: None,
            idle: vec![Phase::idle()],
        }
    }

    /// Reads the final timestamp of every log, then opens them all.
    pub fn open<P: AsRef<Path>>(paths: &[P], policy: UnbalancedPolicy) -> Result<Self> {
        let length = timeline_length(paths)?;
        let readers = paths
            .iter()
            .map(|path| StackReconstructor::new(EventStream::open(path)?, length, policy))
            .collect::<Result<Vec<_>>>()?;
        debug!(streams = readers.len(), length, "opened trace logs");
        Ok(Self::new(readers, length))
    }

    /// Global timeline length.
    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn readers(&self) -> &[StackReconstructor] {
        &self.readers
    }

    /// Produces the next tick, or `None` once the clock reaches the timeline
    /// length.
    pub fn next_tick(&mut self) -> Result<Option<Tick<'_>>> {
        if !self.primed {
            self.primed = true;
            self.advance(0)?;
        } else if let Some(duration) = self.pending.take() {
            self.advance(duration)?;
        }

        if self.clock >= self.length {
            return Ok(None);
        }

        let left = self.length - self.clock;
        let duration = self
            .readers
            .iter()
            .filter(|reader| !reader.is_done())
            .map(StackReconstructor::remaining)
            .min()
            .unwrap_or(left)
            .min(left);

        let start = self.clock;
        self.clock += duration;
        self.pending = Some(duration);

        let streams = self
            .readers
            .iter()
            .map(|reader| StreamSnapshot {
                stack: if reader.is_done() {
                    &self.idle
                } else {
                    reader.current_stack()
                },
                transitions: reader.transitions(),
                done: reader.is_done(),
            })
            .collect();

        Ok(Some(Tick {
            start,
            duration,
            streams,
        }))
    }

    /// Drives the scheduler to the end of the timeline.
    pub fn run<E, F>(&mut self, mut on_tick: F) -> std::result::Result<(), E>
    where
        E: From<TraceError>,
        F: FnMut(&Tick<'_>) -> std::result::Result<(), E>,
    {
        while let Some(tick) = self.next_tick()? {
            on_tick(&tick)?;
        }
        Ok(())
    }

    fn advance(&mut self, ticks: u64) -> Result<()> {
        for reader in &mut self.readers {
            reader.advance_by(ticks)?;
        }
        Ok(())
    }
}
