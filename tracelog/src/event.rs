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

use crate::names;
use std::borrow::Cow;
use std::fmt;

/// Second column of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Start,
    Stop,
    EngineChange,
}

impl EventKind {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(EventKind::Start),
            "0" => Some(EventKind::Stop),
            "e" => Some(EventKind::EngineChange),
            _ => None,
        }
    }
}

/// Execution tier a script phase runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Engine {
    Interpreter,
    Baseline,
    IonMonkey,
    Other(char),
}

impl Engine {
    pub fn from_letter(letter: char) -> Self {
        match letter {
            'i' => Engine::Interpreter,
            'b' => Engine::Baseline,
            'o' => Engine::IonMonkey,
            other => Engine::Other(other),
        }
    }

    pub fn letter(&self) -> char {
        match self {
            Engine::Interpreter => 'i',
            Engine::Baseline => 'b',
            Engine::IonMonkey => 'o',
            Engine::Other(letter) => *letter,
        }
    }

    pub fn name(&self) -> Cow<'static, str> {
        let letter = self.letter().to_string();
        match names::engine_name(&letter) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(letter),
        }
    }
}

/// Task code carried in the first field of a start event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {
    Idle,
    Script,
    Compile,
    Yarr,
    MinorGc,
    Gc,
    /// Any `p*` code: `pf`, `ps`, `pl` and parser variants added later.
    Parser(String),
    Other(String),
}

impl Task {
    pub fn from_code(code: &str) -> Self {
        match code {
            "n" => Task::Idle,
            "s" => Task::Script,
            "c" => Task::Compile,
            "r" => Task::Yarr,
            "g" => Task::MinorGc,
            "G" => Task::Gc,
            parser if parser.starts_with('p') => Task::Parser(parser.to_string()),
            other => Task::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Task::Idle => "n",
            Task::Script => "s",
            Task::Compile => "c",
            Task::Yarr => "r",
            Task::MinorGc => "g",
            Task::Gc => "G",
            Task::Parser(code) | Task::Other(code) => code,
        }
    }

    /// Tasks attributed to a source location: script runs, compiles and parsing.
    pub fn is_scripted(&self) -> bool {
        matches!(self, Task::Script | Task::Compile | Task::Parser(_))
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One decoded log line. `fields` holds every column after the event kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
    pub fields: Vec<String>,
}

impl Event {
    /// Decodes `timestamp,kind[,field]*`. Returns `None` for lines the decoder
    /// skips: fewer than two columns, an unknown kind, a non-numeric
    /// timestamp, or an engine change without an engine letter.
    pub fn parse(line: &str) -> Option<Event> {
        let line = line.trim_end_matches(|c| c == '\r' || c == '\n');
        let mut columns = line.split(',');
        let timestamp = columns.next()?;
        let kind = EventKind::from_code(columns.next()?)?;
        let timestamp = timestamp.trim().parse::<u64>().ok()?;
        let fields: Vec<String> = columns.map(str::to_string).collect();

        // A start without a task code still opens a frame; an engine change
        // without a letter has nothing to apply.
        if kind == EventKind::EngineChange && fields.first().is_none_or(|f| f.is_empty()) {
            return None;
        }

        Some(Event {
            timestamp,
            kind,
            fields,
        })
    }

    /// The frame every stack starts with.
    pub fn idle() -> Event {
        Event {
            timestamp: 0,
            kind: EventKind::Start,
            fields: vec!["n".to_string()],
        }
    }

    pub fn task(&self) -> Option<Task> {
        match self.kind {
            EventKind::Start => Some(Task::from_code(
                self.fields.first().map_or("", String::as_str),
            )),
            _ => None,
        }
    }

    pub fn engine(&self) -> Option<Engine> {
        match self.kind {
            EventKind::EngineChange => self
                .fields
                .first()
                .and_then(|field| field.chars().next())
                .map(Engine::from_letter),
            _ => None,
        }
    }

    pub fn text_ref(&self) -> Option<&str> {
        self.fields.get(1).map(String::as_str)
    }

    pub fn line_number(&self) -> Option<&str> {
        self.fields.get(2).map(String::as_str)
    }

    pub fn joined_fields(&self) -> String {
        self.fields.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_parse_start() {
        let event = Event::parse("100,1,s,foo.js,10\n").unwrap();
        assert_eq!(event.timestamp, 100);
        assert_eq!(event.kind, EventKind::Start);
        assert_eq!(event.task(), Some(Task::Script));
        assert_eq!(event.text_ref(), Some("foo.js"));
        assert_eq!(event.line_number(), Some("10"));
    }

    #[rstest]
    fn test_parse_engine_change_uses_first_letter() {
        let event = Event::parse("5,e,opt").unwrap();
        assert_eq!(event.engine(), Some(Engine::IonMonkey));
        assert_eq!(event.task(), None);
    }

    #[rstest]
    #[case("10,1")]
    #[case("10,1,,x")]
    fn test_parse_start_without_task(#[case] line: &str) {
        let event = Event::parse(line).unwrap();
        assert_eq!(event.kind, EventKind::Start);
        assert_eq!(event.task(), Some(Task::Other(String::new())));
    }

    #[rstest]
    fn test_parse_stop_without_fields() {
        let event = Event::parse("7,0").unwrap();
        assert_eq!(event.kind, EventKind::Stop);
        assert!(event.fields.is_empty());
    }

    #[rstest]
    #[case("")]
    #[case("100")]
    #[case("100,x,s")]
    #[case("abc,1,s")]
    #[case("100,e")]
    #[case("100,e,")]
    fn test_parse_skips_malformed(#[case] line: &str) {
        assert!(Event::parse(line).is_none());
    }

    #[rstest]
    #[case("pf", Task::Parser("pf".to_string()))]
    #[case("px", Task::Parser("px".to_string()))]
    #[case("G", Task::Gc)]
    #[case("q", Task::Other("q".to_string()))]
    fn test_task_codes(#[case] code: &str, #[case] expected: Task) {
        let task = Task::from_code(code);
        assert_eq!(task.code(), code);
        assert_eq!(task, expected);
    }

    #[rstest]
    fn test_engine_names() {
        assert_eq!(Engine::from_letter('i').name(), "Interpreter");
        assert_eq!(Engine::from_letter('z').name(), "z");
    }
}
