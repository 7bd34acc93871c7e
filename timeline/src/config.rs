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

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracelog::UnbalancedPolicy;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub render: RenderConfig,

    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_block_width")]
    pub block_width: u32,
    #[serde(default = "default_revision_url")]
    pub revision_url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Index of the log whose phases feed the summary tables.
    #[serde(default)]
    pub primary: usize,
    #[serde(default)]
    pub on_unbalanced: UnbalancedPolicy,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            block_width: default_block_width(),
            revision_url: default_revision_url(),
        }
    }
}

fn default_width() -> u32 {
    40000
}

fn default_block_width() -> u32 {
    10
}

fn default_revision_url() -> String {
    "https://hg.mozilla.org/mozilla-central/rev/".to_string()
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
