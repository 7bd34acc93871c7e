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

use clap::Parser;
use eyre::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::OnceLock;
use timeline::config::Config;
use timeline::html::HtmlOptions;
use timeline::report::{self, OutputFormat, ReportOptions};
use tracelog::UnbalancedPolicy;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;

static LONG_VERSION: OnceLock<String> = OnceLock::new();

fn get_long_version() -> &'static str {
    LONG_VERSION.get_or_init(|| {
        format!(
            "{} (commit: {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_REVISION")
        )
    })
}

#[derive(Parser)]
#[command(name = "timeline")]
#[command(about = "render spidermonkey trace logs as a timeline")]
#[command(version = None, long_version = get_long_version())]
struct Args {
    #[arg(required = true, help = "trace log files, plain or gzip compressed")]
    logfiles: Vec<PathBuf>,

    #[arg(
        short,
        long,
        default_value = "stdout",
        help = "output target: stdout, stderr or a file path"
    )]
    output: String,

    #[arg(short, long, help = "width of the timeline in pixels")]
    width: Option<u32>,

    #[arg(short = 'n', long, help = "benchmark name shown as the page title")]
    name: Option<String>,

    #[arg(short, long, help = "source revision the logs were recorded against")]
    revision: Option<String>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Html)]
    format: OutputFormat,

    #[arg(long, help = "index of the log used for the summary tables")]
    primary: Option<usize>,

    #[arg(
        long,
        help = "what to do on a stop event with nothing to pop (degrade, abort)"
    )]
    on_unbalanced: Option<String>,

    #[arg(short, long, help = "configuration file path (toml format)")]
    config: Option<PathBuf>,

    #[arg(
        long,
        default_value = "info",
        help = "log level (error, warn, info, debug, trace)"
    )]
    log_level: String,
}

fn parse_policy(policy: &str) -> Result<UnbalancedPolicy> {
    match policy.to_lowercase().as_str() {
        "degrade" => Ok(UnbalancedPolicy::Degrade),
        "abort" => Ok(UnbalancedPolicy::Abort),
        _ => Err(eyre::eyre!("Invalid unbalanced policy: {}", policy)),
    }
}

fn parse_log_level(level: &str) -> Result<LevelFilter> {
    level
        .parse()
        .map_err(|_| eyre::eyre!("Invalid log level: {}", level))
}

fn open_output(target: &str) -> Result<Box<dyn Write>> {
    Ok(match target {
        "stdout" => Box::new(std::io::stdout().lock()),
        "stderr" => Box::new(std::io::stderr().lock()),
        path => Box::new(
            File::create(path).with_context(|| format!("failed to create output path={path}"))?,
        ),
    })
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = parse_log_level(&args.log_level)?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config path={}", path.display()))?,
        None => Config::default(),
    };
    let policy = match &args.on_unbalanced {
        Some(policy) => parse_policy(policy)?,
        None => config.trace.on_unbalanced,
    };

    let options = ReportOptions {
        format: args.format,
        primary: args.primary.unwrap_or(config.trace.primary),
        policy,
        html: HtmlOptions {
            name: args.name,
            revision: args.revision,
            revision_url: config.render.revision_url,
            width: args.width.unwrap_or(config.render.width),
            block_width: config.render.block_width,
        },
    };

    let out = BufWriter::new(open_output(&args.output)?);
    let summary = report::generate(&args.logfiles, &options, out)?;
    for stream in &summary.degraded {
        warn!(stream = %stream, "log ended with an unbalanced stack, output truncated");
    }
    info!(
        length = summary.length,
        ticks = summary.ticks,
        output = %args.output,
        "timeline written"
    );
    Ok(())
}
