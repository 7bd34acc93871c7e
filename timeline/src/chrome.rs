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

//! Chrome trace-event export of reconstructed phases.
//!
//! Each stream becomes a thread of one process. A phase becomes a complete
//! (`X`) event spanning the time it stayed on the stack with the same engine;
//! an engine change splits it. Timestamps are log ticks written as
//! microseconds.

use bon::Builder;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tracelog::{StatKey, Tick, Transition};

const PID: u32 = 1;

/// JSON object form of a Chrome trace.
#[derive(Debug, Clone, Serialize, Builder)]
pub struct ChromeTrace {
    #[serde(rename = "traceEvents")]
    pub trace_events: Vec<TraceEvent>,

    #[serde(rename = "displayTimeUnit", skip_serializing_if = "Option::is_none")]
    pub display_time_unit: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TraceEvent {
    Complete(CompleteEvent),
    Metadata(MetadataEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventPhase {
    #[serde(rename = "X")]
    Complete,
    #[serde(rename = "M")]
    Metadata,
}

#[derive(Debug, Clone, Serialize, Builder)]
pub struct CompleteEvent {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cat: Option<String>,
    pub ph: EventPhase,
    pub ts: u64,
    pub dur: u64,
    pub pid: u32,
    pub tid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetadataName {
    #[serde(rename = "thread_name")]
    ThreadName,
    #[serde(rename = "process_name")]
    ProcessName,
}

#[derive(Debug, Clone, Serialize, Builder)]
pub struct MetadataEvent {
    pub ph: EventPhase,
    pub pid: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<u32>,
    pub name: MetadataName,
    pub args: Value,
}

struct OpenSlice {
    start: u64,
    phase: tracelog::Phase,
}

pub struct ChromeConverter {
    events: Vec<TraceEvent>,
    open: Vec<HashMap<u64, OpenSlice>>,
}

impl ChromeConverter {
    pub fn new<S: AsRef<str>>(stream_names: &[S]) -> Self {
        let mut events = vec![TraceEvent::Metadata(
            MetadataEvent::builder()
                .ph(EventPhase::Metadata)
                .pid(PID)
                .name(MetadataName::ProcessName)
                .args(serde_json::json!({"name": "timeline"}))
                .build(),
        )];
        for (tid, name) in stream_names.iter().enumerate() {
            events.push(TraceEvent::Metadata(
                MetadataEvent::builder()
                    .ph(EventPhase::Metadata)
                    .pid(PID)
                    .tid(tid as u32)
                    .name(MetadataName::ThreadName)
                    .args(serde_json::json!({
                        "name": format!("log {}: {}", tid, name.as_ref())
                    }))
                    .build(),
            ));
        }

        Self {
            events,
            open: stream_names.iter().map(|_| HashMap::new()).collect(),
        }
    }

    pub fn convert_tick(&mut self, tick: &Tick<'_>) {
        for (tid, stream) in tick.streams.iter().enumerate() {
            for transition in stream.transitions {
                self.convert_transition(tid, tick.start, transition);
            }
            // An exhausted stream shows idle from its last event on.
            if stream.done {
                self.close_open(tid, tick.start);
            }
        }
    }

    fn close_open(&mut self, tid: usize, end: u64) {
        let Some(open) = self.open.get_mut(tid) else {
            return;
        };
        let mut slices: Vec<OpenSlice> = open.drain().map(|(_, slice)| slice).collect();
        slices.sort_by_key(|slice| (slice.start, slice.phase.id));
        for slice in slices {
            self.add_complete(tid, slice, end);
        }
    }

    fn convert_transition(&mut self, tid: usize, at: u64, transition: &Transition) {
        let Some(open) = self.open.get_mut(tid) else {
            return;
        };
        match transition {
            Transition::Pushed(phase) => {
                open.insert(
                    phase.id,
                    OpenSlice {
                        start: at,
                        phase: phase.clone(),
                    },
                );
            }
            Transition::EngineChanged { id, engine } => {
                if let Some(slice) = open.remove(id) {
                    let mut phase = slice.phase.clone();
                    self.add_complete(tid, slice, at);
                    phase.engine = Some(*engine);
                    self.open[tid].insert(*id, OpenSlice { start: at, phase });
                }
            }
            Transition::Popped(phase) => {
                if let Some(slice) = open.remove(&phase.id) {
                    self.add_complete(tid, slice, at);
                }
            }
        }
    }

    fn add_complete(&mut self, tid: usize, slice: OpenSlice, end: u64) {
        if end <= slice.start {
            return;
        }
        let phase = &slice.phase;
        let engine = phase.engine.map(|engine| engine.name().into_owned());
        self.events.push(TraceEvent::Complete(
            CompleteEvent::builder()
                .name(StatKey::of(phase).display_name().into_owned())
                .cat("phase".to_string())
                .ph(EventPhase::Complete)
                .ts(slice.start)
                .dur(end - slice.start)
                .pid(PID)
                .tid(tid as u32)
                .args(serde_json::json!({
                    "engine": engine,
                    "fields": phase.event.joined_fields(),
                }))
                .build(),
        ));
    }

    /// Closes every phase still open at `end`, the timeline length, and
    /// assembles the trace.
    pub fn finish(mut self, end: u64) -> ChromeTrace {
        for tid in 0..self.open.len() {
            self.close_open(tid, end);
        }

        ChromeTrace::builder()
            .trace_events(self.events)
            .display_time_unit("ns".to_string())
            .metadata(serde_json::json!({
                "generator": "timeline",
                "version": env!("CARGO_PKG_VERSION"),
            }))
            .build()
    }
}
