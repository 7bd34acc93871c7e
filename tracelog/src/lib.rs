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

//! Decoding and synchronization of runtime phase trace logs.
//!
//! A trace log is a CSV-like file of `timestamp,kind[,field]*` lines emitted
//! by a JavaScript engine: start/stop records for execution phases (script
//! runs, compiles, GCs, parsing) and engine-change records that tell which
//! tier a running script moved to. [`EventStream`] decodes one log,
//! [`StackReconstructor`] rebuilds the stack of active phases from it, and
//! [`MultiStreamScheduler`] advances several logs in lock-step so their
//! phases line up on one timeline. [`StatsAggregator`] turns the ticks of one
//! stream into per-engine and per-script totals.

pub mod error;
pub mod event;
pub mod names;
pub mod reconstructor;
pub mod scheduler;
pub mod stats;
pub mod stream;

pub use error::{Result, TraceError};
pub use event::{Engine, Event, EventKind, Task};
pub use reconstructor::{Phase, StackReconstructor, Transition, UnbalancedPolicy};
pub use scheduler::{MultiStreamScheduler, StreamSnapshot, Tick};
pub use stats::{percent, ScriptKey, ScriptStat, StatKey, StatsAggregator, TextTable};
pub use stream::{last_timestamp, timeline_length, EventStream};
