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

//! Proportional HTML timeline.
//!
//! Every tick becomes a run of fixed-width containers, one `block` span per
//! stream inside each container. Ticks narrower than a pixel are not drawn;
//! their width is carried into the next tick instead.

use std::borrow::Cow;
use std::io::Write;
use tracelog::{percent, Phase, StatKey, StatsAggregator, Tick};

const LEGEND: &[(&str, &str)] = &[
    ("interpreter run", "interpreter"),
    ("ion compile", "ionmonkey compilation"),
    ("ion run", "ionmonkey running"),
    ("jm run", "baseline running"),
    ("yarr jit", "yarr jit"),
    ("gc", "GC"),
    ("minor_gc", "Minor GC"),
    ("parser_script", "Script parsing"),
    ("parser_lazy", "Lazy parsing"),
    ("parser_function", "Function parsing"),
];

#[derive(Debug, Clone)]
pub struct HtmlOptions {
    pub name: Option<String>,
    pub revision: Option<String>,
    pub revision_url: String,
    /// Width of the whole timeline in pixels.
    pub width: u32,
    pub block_width: u32,
}

pub(crate) fn html_escape(s: impl AsRef<str>) -> String {
    s.as_ref()
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// `; -<fields>[ <engine>]` for every frame, outermost first.
fn backtrace(stack: &[Phase]) -> String {
    let mut info = String::new();
    for phase in stack {
        info.push_str("; -");
        info.push_str(&phase.event.joined_fields());
        if let Some(engine) = phase.engine {
            info.push(' ');
            info.push_str(&engine.name());
        }
    }
    info
}

pub struct HtmlRenderer<W: Write> {
    out: W,
    options: HtmlOptions,
    scale: f64,
    block_width: f64,
    carry: f64,
    blocks: u64,
}

impl<W: Write> HtmlRenderer<W> {
    /// `length` is the global timeline length; it maps onto `options.width`.
    pub fn new(out: W, options: HtmlOptions, length: u64) -> Self {
        let scale = if length == 0 {
            0.0
        } else {
            f64::from(options.width) / length as f64
        };
        let block_width = f64::from(options.block_width.max(1));
        Self {
            out,
            options,
            scale,
            block_width,
            carry: 0.0,
            blocks: 0,
        }
    }

    /// Number of ticks drawn so far.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    pub fn write_header(&mut self) -> eyre::Result<()> {
        let out = &mut self.out;
        writeln!(out, "<html>")?;
        writeln!(out, "<head>")?;
        writeln!(out, "<script src='basic.js'></script>")?;
        writeln!(
            out,
            "<link rel='stylesheet' type='text/css' href='style.css'>"
        )?;
        writeln!(out, "</head>")?;
        writeln!(out, "<body>")?;
        if let Some(name) = &self.options.name {
            writeln!(out, "<h1>{}</h1>", html_escape(name))?;
        }
        if let Some(revision) = &self.options.revision {
            let revision = html_escape(revision);
            writeln!(
                out,
                "<p>Revision: <a href='{}{}'>{}</a></p>",
                html_escape(&self.options.revision_url),
                revision,
                revision
            )?;
        }

        writeln!(out, "<div id=legend>")?;
        for (class, label) in LEGEND {
            writeln!(out, "<p><span class='block {}'></span> {}</p>", class, label)?;
        }
        if self.scale > 0.0 {
            writeln!(
                out,
                "<!--<div><p>1px = {} kernel ticks</p></div>-->",
                (1.0 / self.scale) as u64
            )?;
        }
        writeln!(out, "</div>")?;
        writeln!(out, "<div class='graph'>")?;
        Ok(())
    }

    pub fn write_tick(&mut self, tick: &Tick<'_>) -> eyre::Result<()> {
        let width = tick.duration as f64 * self.scale + self.carry;
        if width < 1.0 {
            self.carry = width;
            return Ok(());
        }
        self.carry = 0.0;

        let block = self.block_markup(tick);
        write!(
            self.out,
            "<span style='width:{}px;' class='container'>{}</span>",
            width % self.block_width,
            block
        )?;
        for _ in 0..(width / self.block_width) as u64 {
            write!(
                self.out,
                "<span style='width:{}px' class='container'>{}</span>",
                self.block_width, block
            )?;
        }
        self.blocks += 1;
        Ok(())
    }

    fn block_markup(&self, tick: &Tick<'_>) -> String {
        let mut block = String::new();
        for (thread, stream) in tick.streams.iter().enumerate() {
            let Some(top) = stream.top() else {
                continue;
            };
            let engine = match top.engine {
                Some(engine) => engine.name(),
                None => Cow::Borrowed(""),
            };
            block.push_str(&format!(
                "<span class='block {}' info='Thread: {};Block: {};Engine: {};<b>Call stack:</b>{}'>\n</span>\n",
                html_escape(StatKey::of(top).display_name()),
                thread,
                self.blocks,
                html_escape(engine),
                html_escape(backtrace(stream.stack)),
            ));
        }
        block
    }

    /// Closes the graph and writes the engine and script tables.
    pub fn write_summary(&mut self, stats: &StatsAggregator) -> eyre::Result<()> {
        let out = &mut self.out;
        writeln!(out, "</div>")?;

        let total = stats.total();
        writeln!(out, "<h2>Engine overview</h2>")?;
        writeln!(out, "<table>")?;
        writeln!(out, "<thead><td>Engine</td><td>Percent</td></thead>")?;
        for (key, ticks) in stats.engines() {
            writeln!(
                out,
                "<tr><td>{}</td><td>{:.2}%</td></tr>",
                html_escape(key.display_name()),
                percent(*ticks, total)
            )?;
        }
        writeln!(out, "</table>")?;

        let executed = stats.total_executed();
        writeln!(out, "<h2>Script overview</h2>")?;
        writeln!(out, "<table>")?;
        writeln!(
            out,
            "<thead><td>Script</td><td>Times called</td><td>Times compiled</td><td>Total time</td><td>Time spent</td></thead>"
        )?;
        for (script, stat) in stats.scripts_by_time() {
            let script_total = stat.total();
            writeln!(out, "<tr><td>{}</td>", html_escape(script.as_str()))?;
            writeln!(out, "<td>{}</td>", stat.called())?;
            writeln!(out, "<td>{}</td>", stat.compiled())?;
            writeln!(out, "<td>{:.2}%</td><td>", percent(script_total, executed))?;
            for (key, ticks) in &stat.time {
                writeln!(
                    out,
                    "{}: {:.2}%, ",
                    html_escape(key.display_name()),
                    percent(*ticks, script_total)
                )?;
            }
            writeln!(out, "</td></tr>")?;
        }
        writeln!(out, "</table>")?;
        writeln!(out, "</body>")?;
        writeln!(out, "</html>")?;
        Ok(())
    }

    pub fn finish(mut self) -> eyre::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use std::io::Cursor;
    use tracelog::{EventStream, MultiStreamScheduler, StackReconstructor, UnbalancedPolicy};

    #[fixture]
    fn options() -> HtmlOptions {
        HtmlOptions {
            name: Some("richards".to_string()),
            revision: Some("abc123".to_string()),
            revision_url: "https://example.org/rev/".to_string(),
            width: 100,
            block_width: 10,
        }
    }

    fn render(logs: &[&str], length: u64, options: HtmlOptions) -> String {
        let readers = logs
            .iter()
            .map(|text| {
                let stream = EventStream::from_reader("log", Cursor::new(text.as_bytes().to_vec()));
                StackReconstructor::new(stream, length, UnbalancedPolicy::Degrade).unwrap()
            })
            .collect();
        let mut scheduler = MultiStreamScheduler::new(readers, length);
        let mut renderer = HtmlRenderer::new(Vec::new(), options, length);
        let mut stats = StatsAggregator::new();
        renderer.write_header().unwrap();
        scheduler
            .run(|tick| {
                renderer.write_tick(tick)?;
                stats.record(&tick.streams[0], tick.duration);
                Ok::<_, eyre::Report>(())
            })
            .unwrap();
        renderer.write_summary(&stats).unwrap();
        String::from_utf8(renderer.finish().unwrap()).unwrap()
    }

    #[rstest]
    fn test_header(options: HtmlOptions) {
        let html = render(&[""], 0, options);
        assert!(html.starts_with("<html>\n<head>\n"));
        assert!(html.contains("<h1>richards</h1>"));
        assert!(html.contains("<a href='https://example.org/rev/abc123'>abc123</a>"));
        assert!(html.contains("<p><span class='block gc'></span> GC</p>"));
        assert!(!html.contains("class='container'"));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[rstest]
    fn test_blocks_scale_with_duration(options: HtmlOptions) {
        let html = render(
            &["0,1,n\n100,1,s,5,10\n100,e,i\n200,0,n\n200,0,n\n"],
            200,
            options,
        );
        // 100 ticks map onto 50px: one 0px remainder then five full containers.
        assert_eq!(html.matches("class='container'").count(), 12);
        assert!(html.contains("<span style='width:0px;' class='container'>"));
        assert!(html.contains("class='block interpreter run'"));
        assert!(html.contains("Engine: Interpreter;"));
        assert!(html.contains("<b>Call stack:</b>; -n; -n; -s,5,10 Interpreter'"));
        assert!(html.contains("<tr><td>interpreter run</td><td>50.00%</td></tr>"));
        assert!(html.contains("<tr><td>Unrecoverable text:10</td>"));
        assert!(html.contains("interpreter run: 100.00%, "));
    }

    #[rstest]
    fn test_narrow_ticks_are_carried(options: HtmlOptions) {
        let mut log = String::new();
        for i in 0..10 {
            log.push_str(&format!("{},1,g\n{},0,g\n", i * 100, i * 100 + 1));
        }
        log.push_str("1000,1,G\n1000,0,G\n");
        let html = render(&[log.as_str()], 1000, options);
        // Each 1-tick GC is 0.1px wide and never gets a block of its own.
        assert!(!html.contains("class='block minor_gc' info="));
        assert!(html.contains("class='block nothing run' info="));
    }

    #[rstest]
    fn test_escapes_script_text(options: HtmlOptions) {
        let html = render(&["0,1,s,<a'b>.js,3\n0,e,b\n10,0,s\n"], 10, options);
        assert!(html.contains("&lt;a&#39;b&gt;.js:3"));
        assert!(!html.contains("<a'b>"));
    }

    #[rstest]
    fn test_html_escape() {
        assert_eq!(html_escape("a&b\"c"), "a&amp;b&quot;c");
    }
}
