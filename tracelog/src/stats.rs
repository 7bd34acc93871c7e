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

//! Time and call accounting for the primary stream.

use crate::event::{Engine, Task};
use crate::names;
use crate::reconstructor::{Phase, Transition};
use crate::scheduler::StreamSnapshot;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Text shown for a numeric text reference that was never defined.
pub const UNRESOLVED_TEXT: &str = "Unrecoverable text";

/// Line shown when a start event carries no line number.
const UNKNOWN_LINE: &str = "?";

/// Task code plus engine, the key of the engine overview.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatKey {
    pub task: Task,
    pub engine: Option<Engine>,
}

impl StatKey {
    pub fn of(phase: &Phase) -> Self {
        Self {
            task: phase.task.clone(),
            engine: phase.engine,
        }
    }

    pub fn code(&self) -> String {
        match self.engine {
            Some(engine) => format!("{} {}", self.task.code(), engine.letter()),
            None => self.task.code().to_string(),
        }
    }

    pub fn display_name(&self) -> Cow<'static, str> {
        let code = self.code();
        match names::task_name(&code) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(code),
        }
    }

    /// Script runs, compiles and parsing make up the executed total.
    pub fn is_executed(&self) -> bool {
        self.task.is_scripted()
    }

    fn counts_toward_engines(&self) -> bool {
        self.engine.is_some() || self.task != Task::Script
    }

    fn counts_toward_scripts(&self) -> bool {
        match self.task {
            Task::Script => self.engine.is_some(),
            Task::Compile | Task::Parser(_) => true,
            _ => false,
        }
    }
}

/// `"<source text>:<line>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptKey(String);

impl ScriptKey {
    pub fn new(text: &str, line: &str) -> Self {
        Self(format!("{}:{}", text, line))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScriptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric id → source text, filled in as literal texts appear.
///
/// A log spells out a source text the first time it uses it and refers to it
/// by number afterwards; numbers are handed out in order starting at 1.
#[derive(Debug)]
pub struct TextTable {
    texts: HashMap<u64, String>,
    next_id: u64,
}

impl TextTable {
    pub fn new() -> Self {
        Self {
            texts: HashMap::new(),
            next_id: 1,
        }
    }

    pub fn resolve(&mut self, reference: &str) -> String {
        let numeric = !reference.is_empty() && reference.bytes().all(|b| b.is_ascii_digit());
        if numeric {
            return reference
                .parse::<u64>()
                .ok()
                .and_then(|id| self.texts.get(&id))
                .cloned()
                .unwrap_or_else(|| UNRESOLVED_TEXT.to_string());
        }

        let id = self.next_id;
        self.next_id += 1;
        self.texts.insert(id, reference.to_string());
        reference.to_string()
    }

    pub fn get(&self, id: u64) -> Option<&str> {
        self.texts.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

impl Default for TextTable {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptStat {
    pub time: BTreeMap<StatKey, u64>,
    pub calls: BTreeMap<Task, u64>,
}

impl ScriptStat {
    pub fn total(&self) -> u64 {
        self.time.values().sum()
    }

    pub fn calls(&self, task: &Task) -> u64 {
        self.calls.get(task).copied().unwrap_or(0)
    }

    pub fn called(&self) -> u64 {
        self.calls(&Task::Script)
    }

    pub fn compiled(&self) -> u64 {
        self.calls(&Task::Compile)
    }
}

/// Share of `part` in `total`, in percent. Zero when `total` is zero.
pub fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[derive(Debug, Default)]
pub struct StatsAggregator {
    engines: BTreeMap<StatKey, u64>,
    scripts: BTreeMap<ScriptKey, ScriptStat>,
    texts: TextTable,
    keys: HashMap<u64, ScriptKey>,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one tick of the primary stream.
    pub fn record(&mut self, snapshot: &StreamSnapshot<'_>, duration: u64) {
        for transition in snapshot.transitions {
            self.on_transition(transition);
        }
        if snapshot.done {
            return;
        }
        if let Some(top) = snapshot.top() {
            self.accumulate(top, duration);
        }
    }

    fn on_transition(&mut self, transition: &Transition) {
        match transition {
            Transition::Pushed(phase) if phase.task.is_scripted() => {
                let key = self.script_key(phase);
                *self
                    .script_entry(key.clone())
                    .calls
                    .entry(phase.task.clone())
                    .or_insert(0) += 1;
                self.keys.insert(phase.id, key);
            }
            Transition::Popped(phase) => {
                self.keys.remove(&phase.id);
            }
            _ => {}
        }
    }

    fn script_key(&mut self, phase: &Phase) -> ScriptKey {
        let text = match phase.event.text_ref() {
            Some(reference) => self.texts.resolve(reference),
            None => UNRESOLVED_TEXT.to_string(),
        };
        let line = phase.event.line_number().unwrap_or(UNKNOWN_LINE);
        ScriptKey::new(&text, line)
    }

    fn accumulate(&mut self, top: &Phase, duration: u64) {
        let key = StatKey::of(top);
        if key.counts_toward_engines() {
            *self.engine_entry(key.clone()) += duration;
        }
        if key.counts_toward_scripts() {
            if let Some(script) = self.keys.get(&top.id).cloned() {
                *self.script_entry(script).time.entry(key).or_insert(0) += duration;
            }
        }
    }

    fn engine_entry(&mut self, key: StatKey) -> &mut u64 {
        self.engines.entry(key).or_insert(0)
    }

    fn script_entry(&mut self, key: ScriptKey) -> &mut ScriptStat {
        self.scripts.entry(key).or_default()
    }

    pub fn engines(&self) -> &BTreeMap<StatKey, u64> {
        &self.engines
    }

    pub fn scripts(&self) -> &BTreeMap<ScriptKey, ScriptStat> {
        &self.scripts
    }

    /// Sum of the engine overview.
    pub fn total(&self) -> u64 {
        self.engines.values().sum()
    }

    /// Time spent running, compiling or parsing scripts.
    pub fn total_executed(&self) -> u64 {
        self.engines
            .iter()
            .filter(|(key, _)| key.is_executed())
            .map(|(_, ticks)| ticks)
            .sum()
    }

    /// Scripts ordered by descending time, ties broken by key.
    pub fn scripts_by_time(&self) -> Vec<(&ScriptKey, &ScriptStat)> {
        let mut scripts: Vec<_> = self.scripts.iter().collect();
        scripts.sort_by(|a, b| b.1.total().cmp(&a.1.total()).then_with(|| a.0.cmp(b.0)));
        scripts
    }
}
