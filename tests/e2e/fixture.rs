//! E2E test fixture with step logging.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// Step result for report generation.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    pub duration: Duration,
}

/// Captured output of one bundlekit invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.stdout)
            .unwrap_or_else(|err| panic!("stdout is not JSON ({err}): {}", self.stdout))
    }
}

/// Isolated project directory with its own bundle store. Global config is
/// redirected into the temp dir so only the project config applies.
pub struct E2EFixture {
    pub scenario_name: String,
    pub temp_dir: TempDir,
    /// Project root; commands run here.
    pub root: PathBuf,
    pub bundles_root: PathBuf,
    start_time: Instant,
    step_count: usize,
    step_results: Vec<StepResult>,
}

impl E2EFixture {
    pub fn new(scenario_name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path().to_path_buf();
        let bundles_root = root.join("store");

        println!();
        println!("{}", "=".repeat(70));
        println!("E2E SCENARIO: {scenario_name}");
        println!("{}", "=".repeat(70));
        println!("[E2E] Root: {}", root.display());

        Self {
            scenario_name: scenario_name.to_string(),
            temp_dir,
            root,
            bundles_root,
            start_time: Instant::now(),
            step_count: 0,
            step_results: Vec::new(),
        }
    }

    pub fn log_step(&mut self, description: &str) {
        self.step_count += 1;
        println!();
        println!(
            "STEP {}: {description} ({:?})",
            self.step_count,
            self.start_time.elapsed()
        );
    }

    /// Run bundlekit against this fixture's store and config.
    pub fn run(&mut self, args: &[&str]) -> CommandOutput {
        let bundles_root = self.bundles_root.clone();
        self.run_with_store(&bundles_root, args)
    }

    pub fn run_with_store(&mut self, bundles_root: &Path, args: &[&str]) -> CommandOutput {
        let step_name = format!("bundlekit {}", args.join(" "));
        let start = Instant::now();
        println!("[CMD] {step_name}");

        let output = Command::new(env!("CARGO_BIN_EXE_bundlekit"))
            .args(args)
            .env("HOME", &self.root)
            .env("XDG_CONFIG_HOME", self.root.join(".config"))
            .env("BUNDLEKIT_BUNDLES_ROOT", bundles_root)
            .env_remove("BUNDLEKIT_CONFIG")
            .env_remove("RUST_LOG")
            .current_dir(&self.root)
            .output()
            .expect("Failed to execute bundlekit");

        let result = CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        println!("[CMD] Exit: {}", result.exit_code);
        if !result.stdout.is_empty() {
            println!("[STDOUT] {}", result.stdout);
        }
        if !result.stderr.is_empty() {
            println!("[STDERR] {}", result.stderr);
        }

        self.step_results.push(StepResult {
            name: step_name,
            success: result.success,
            duration: start.elapsed(),
        });
        result
    }

    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }

    /// Descriptor, graph and one data file for `example/bundle` version 1.
    pub fn write_example_source(&self) {
        self.write_file(
            "src/bundle.yaml",
            r"id: example/bundle
version: 1
includes:
  - http://example.org/ctx/a
files:
  includes: [README.md]
",
        );
        self.write_file(
            "src/graph.nq",
            r#"<http://example.org/s> <http://example.org/p> "a" <http://example.org/ctx/a> .
<http://example.org/s> <http://example.org/p> "b" <http://example.org/ctx/b> .
"#,
        );
        self.write_file("src/README.md", "example bundle\n");
    }

    pub fn assert_success(&self, output: &CommandOutput, operation: &str) {
        assert!(
            output.success,
            "[E2E] {operation} failed with exit code {}: {}",
            output.exit_code, output.stderr
        );
    }

    pub fn assert_output_contains(&self, output: &CommandOutput, expected: &str) {
        assert!(
            output.stdout.contains(expected) || output.stderr.contains(expected),
            "[E2E] Output does not contain '{expected}'\nStdout: {}\nStderr: {}",
            output.stdout,
            output.stderr
        );
    }

    pub fn generate_report(&self) {
        println!();
        println!("E2E REPORT: {}", self.scenario_name);
        for (i, step) in self.step_results.iter().enumerate() {
            let status = if step.success { "ok" } else { "FAIL" };
            println!("{:2}. {status} {} ({:?})", i + 1, step.name, step.duration);
        }
        println!("Total Time: {:?}", self.start_time.elapsed());
    }
}
