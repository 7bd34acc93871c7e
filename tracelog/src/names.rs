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

//! Display names shared by every report that shows phases.
//!
//! Keys are the codes that appear in the logs: a task code optionally followed
//! by a space and the engine letter (`"s i"` is a script running in the
//! interpreter).

pub const TASK_NAMES: &[(&str, &str)] = &[
    ("n", "nothing run"),
    ("s", "script run"),
    ("s i", "interpreter run"),
    ("s b", "baseline run"),
    ("s o", "ion run"),
    ("c", "ion compile"),
    ("r", "yarr"),
    ("g", "minor_gc"),
    ("G", "gc"),
    ("pf", "parser_function"),
    ("ps", "parser_script"),
    ("pl", "parser_lazy"),
];

pub const ENGINE_NAMES: &[(&str, &str)] = &[
    ("i", "Interpreter"),
    ("b", "Baseline"),
    ("o", "IonMonkey"),
    ("", ""),
];

pub fn task_name(code: &str) -> Option<&'static str> {
    lookup(TASK_NAMES, code)
}

pub fn engine_name(letter: &str) -> Option<&'static str> {
    lookup(ENGINE_NAMES, letter)
}

fn lookup(table: &'static [(&'static str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(code, _)| *code == key)
        .map(|(_, name)| *name)
}
