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

use crate::chrome::ChromeConverter;
use crate::html::{HtmlOptions, HtmlRenderer};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tracelog::{MultiStreamScheduler, StatsAggregator, UnbalancedPolicy};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Html,
    Chrome,
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub format: OutputFormat,
    /// Index of the log whose phases feed the summary tables.
    pub primary: usize,
    pub policy: UnbalancedPolicy,
    pub html: HtmlOptions,
}

#[derive(Debug)]
pub struct RunSummary {
    pub length: u64,
    pub ticks: u64,
    /// Logs cut short by an unbalanced stop event.
    pub degraded: Vec<String>,
}

/// Synchronizes `paths` and writes the report to `out`.
pub fn generate<P: AsRef<Path>, W: Write>(
    paths: &[P],
    options: &ReportOptions,
    out: W,
) -> Result<RunSummary> {
    eyre::ensure!(!paths.is_empty(), "no trace logs given");
    eyre::ensure!(
        options.primary < paths.len(),
        "primary log index {} out of range for {} logs",
        options.primary,
        paths.len()
    );

    let mut scheduler =
        MultiStreamScheduler::open(paths, options.policy).wrap_err("failed to open trace logs")?;
    let length = scheduler.length();
    info!(streams = paths.len(), length, "synchronizing trace logs");

    let ticks = match options.format {
        OutputFormat::Html => write_html(&mut scheduler, options, out)?,
        OutputFormat::Chrome => write_chrome(&mut scheduler, paths, out)?,
    };

    let degraded = scheduler
        .readers()
        .iter()
        .filter(|reader| reader.degraded_at().is_some())
        .map(|reader| reader.name().to_string())
        .collect();

    Ok(RunSummary {
        length,
        ticks,
        degraded,
    })
}

fn write_html<W: Write>(
    scheduler: &mut MultiStreamScheduler,
    options: &ReportOptions,
    out: W,
) -> Result<u64> {
    let mut renderer = HtmlRenderer::new(out, options.html.clone(), scheduler.length());
    let mut stats = StatsAggregator::new();
    let mut ticks = 0;

    renderer.write_header()?;
    scheduler.run(|tick| {
        renderer.write_tick(tick)?;
        stats.record(&tick.streams[options.primary], tick.duration);
        ticks += 1;
        Ok::<_, eyre::Report>(())
    })?;
    debug!(ticks, blocks = renderer.blocks(), "timeline drawn");

    renderer.write_summary(&stats)?;
    renderer.finish()?;
    Ok(ticks)
}

fn write_chrome<P: AsRef<Path>, W: Write>(
    scheduler: &mut MultiStreamScheduler,
    paths: &[P],
    mut out: W,
) -> Result<u64> {
    let names: Vec<String> = paths
        .iter()
        .map(|path| {
            let path = path.as_ref();
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        })
        .collect();
    let mut converter = ChromeConverter::new(&names);
    let mut ticks = 0;

    scheduler.run(|tick| {
        converter.convert_tick(tick);
        ticks += 1;
        Ok::<_, eyre::Report>(())
    })?;

    let trace = converter.finish(scheduler.length());
    serde_json::to_writer(&mut out, &trace).wrap_err("failed to serialize chrome trace")?;
    out.flush()?;
    Ok(ticks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Logs {
        _dir: TempDir,
        paths: Vec<PathBuf>,
    }

    #[fixture]
    fn logs() -> Logs {
        let dir = TempDir::new().expect("failed to create temp dir");
        let main = dir.path().join("main.log");
        let helper = dir.path().join("helper.log");
        std::fs::write(&main, "0,1,s,run.js,1\n0,e,b\n50,1,g\n60,0,g\n200,0,s\n").unwrap();
        std::fs::write(&helper, "0,1,G\n150,0,G\n").unwrap();
        Logs {
            _dir: dir,
            paths: vec![main, helper],
        }
    }

    fn options(format: OutputFormat, primary: usize) -> ReportOptions {
        ReportOptions {
            format,
            primary,
            policy: UnbalancedPolicy::Degrade,
            html: HtmlOptions {
                name: None,
                revision: None,
                revision_url: String::new(),
                width: 400,
                block_width: 10,
            },
        }
    }

    #[rstest]
    fn test_html_report(logs: Logs) {
        let mut out = Vec::new();
        let summary = generate(&logs.paths, &options(OutputFormat::Html, 0), &mut out).unwrap();
        assert_eq!(summary.length, 200);
        assert_eq!(summary.ticks, 4);
        assert!(summary.degraded.is_empty());

        let html = String::from_utf8(out).unwrap();
        assert!(html.contains("Thread: 1;"));
        assert!(html.contains("<tr><td>run.js:1</td>"));
        assert!(html.contains("<tr><td>baseline run</td><td>95.00%</td></tr>"));
    }

    #[rstest]
    fn test_primary_selects_stats_stream(logs: Logs) {
        let mut out = Vec::new();
        generate(&logs.paths, &options(OutputFormat::Html, 1), &mut out).unwrap();
        let html = String::from_utf8(out).unwrap();
        assert!(html.contains("<tr><td>gc</td><td>100.00%</td></tr>"));
        assert!(!html.contains("<tr><td>run.js:1</td>"));
    }

    #[rstest]
    fn test_primary_out_of_range(logs: Logs) {
        let result = generate(&logs.paths, &options(OutputFormat::Html, 2), Vec::new());
        assert!(result.is_err());
    }

    #[rstest]
    fn test_chrome_report(logs: Logs) {
        let mut out = Vec::new();
        generate(&logs.paths, &options(OutputFormat::Chrome, 0), &mut out).unwrap();
        let trace: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let names: Vec<&str> = trace["traceEvents"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|event| event["ph"] == "X")
            .map(|event| event["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"baseline run"));
        assert!(names.contains(&"minor_gc"));
        assert!(names.contains(&"gc"));
    }
}
