use eyre::Result;
use flate2::write::GzEncoder;
use flate2::Compression;
use rstest::{fixture, rstest};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const SCENARIO: &str = "0,1,s,run.js,1\n0,e,i\n100,0,s\n";

struct TestSetup {
    temp_dir: TempDir,
    output_path: PathBuf,
}

impl TestSetup {
    fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let output_path = temp_dir.path().join("timeline.out");
        Ok(TestSetup {
            temp_dir,
            output_path,
        })
    }

    fn write_log(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join(name);
        fs::write(&path, content)?;
        Ok(path)
    }

    fn write_gz_log(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.temp_dir.path().join(name);
        let mut encoder = GzEncoder::new(fs::File::create(&path)?, Compression::default());
        encoder.write_all(content.as_bytes())?;
        encoder.finish()?;
        Ok(path)
    }

    fn run(&self, logs: &[&Path], extra: &[&str]) -> Result<Output> {
        let output = Command::new(env!("CARGO_BIN_EXE_timeline"))
            .args(logs)
            .arg("--output")
            .arg(&self.output_path)
            .args(extra)
            .output()?;
        Ok(output)
    }

    fn read_output(&self) -> Result<String> {
        Ok(fs::read_to_string(&self.output_path)?)
    }
}

#[fixture]
fn setup() -> TestSetup {
    TestSetup::new().expect("failed to create test setup")
}

#[rstest]
fn test_html_timeline(setup: TestSetup) -> Result<()> {
    let log = setup.write_log("main.log", SCENARIO)?;
    let output = setup.run(&[&log], &["--name", "richards", "--revision", "f00d"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let html = setup.read_output()?;
    assert!(html.contains("<h1>richards</h1>"));
    assert!(html.contains(">f00d</a>"));
    assert!(html.contains("class='block interpreter run'"));
    assert!(html.contains("<tr><td>interpreter run</td><td>100.00%</td></tr>"));
    assert!(html.contains("<tr><td>run.js:1</td>"));
    Ok(())
}

#[rstest]
fn test_gzip_log_is_synchronized(setup: TestSetup) -> Result<()> {
    let main = setup.write_log("main.log", SCENARIO)?;
    let helper = setup.write_gz_log("helper.log.gz", "0,1,G\n50,0,G\n")?;
    let output = setup.run(&[&main, &helper], &[])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let html = setup.read_output()?;
    assert!(html.contains("class='block gc' info='Thread: 1;"));
    Ok(())
}

#[rstest]
fn test_chrome_export(setup: TestSetup) -> Result<()> {
    let log = setup.write_log("main.log", SCENARIO)?;
    let output = setup.run(&[&log], &["--format", "chrome"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let trace: serde_json::Value = serde_json::from_str(&setup.read_output()?)?;
    let events = trace["traceEvents"].as_array().expect("traceEvents array");
    let run = events
        .iter()
        .find(|event| event["ph"] == "X" && event["name"] == "interpreter run")
        .expect("interpreter slice");
    assert_eq!(run["ts"], 0);
    assert_eq!(run["dur"], 100);
    assert!(events
        .iter()
        .any(|event| event["name"] == "thread_name" && event["args"]["name"] == "log 0: main.log"));
    Ok(())
}

#[rstest]
#[case("abort", false)]
#[case("degrade", true)]
fn test_unbalanced_policy(
    setup: TestSetup,
    #[case] policy: &str,
    #[case] succeeds: bool,
) -> Result<()> {
    let log = setup.write_log("broken.log", "0,1,g\n10,0,g\n20,0,s\n40,1,G\n60,0,G\n")?;
    let output = setup.run(&[&log], &["--on-unbalanced", policy])?;
    assert_eq!(output.status.success(), succeeds);
    if !succeeds {
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("unbalanced"), "{stderr}");
    }
    Ok(())
}

#[rstest]
fn test_empty_log(setup: TestSetup) -> Result<()> {
    let log = setup.write_log("empty.log", "")?;
    let output = setup.run(&[&log], &[])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let html = setup.read_output()?;
    assert!(!html.contains("class='container'"));
    assert!(html.contains("<h2>Engine overview</h2>"));
    Ok(())
}

#[rstest]
fn test_config_file(setup: TestSetup) -> Result<()> {
    let log = setup.write_log("main.log", SCENARIO)?;
    let config = setup.temp_dir.path().join("timeline.toml");
    fs::write(
        &config,
        "[render]\nwidth = 20\nblock_width = 10\n\n[trace]\non_unbalanced = \"abort\"\n",
    )?;
    let output = setup.run(&[&log], &["--config", config.to_str().expect("utf-8 path")])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    // 100 ticks over 20px: one 0px remainder and two full containers.
    let html = setup.read_output()?;
    assert_eq!(html.matches("class='container'").count(), 3);
    Ok(())
}

#[rstest]
fn test_missing_log_fails(setup: TestSetup) -> Result<()> {
    let missing = setup.temp_dir.path().join("missing.log");
    let output = setup.run(&[&missing], &[])?;
    assert!(!output.status.success());
    Ok(())
}
