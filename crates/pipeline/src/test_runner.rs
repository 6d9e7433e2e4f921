//! External test runner (§6, SPEC_FULL Target-language-adaptation): invokes
//! `cargo test` in the repository's output directory and parses its textual
//! summary, the Rust analogue of the original's `pytest`
//! "collected N items"/passed/failed parsing.

use std::time::Duration;

use engine::{TestRunResult, TestRunner};
use regex::Regex;
use tokio::process::Command;

/// Wall-clock bound for one `cargo test` invocation. The child's own timeout
/// is authoritative (§5); this is a backstop so a hung child doesn't block
/// the controller forever. On expiry the sentinel text mirrors the
/// original's "check_tests function has timed out".
const TEST_TIMEOUT: Duration = Duration::from_secs(600);

pub struct CargoTestRunner {
    /// Extra arguments appended after `cargo test`, e.g. `["--quiet"]`.
    extra_args: Vec<String>,
    handle: tokio::runtime::Handle,
}

impl CargoTestRunner {
    pub fn new() -> Self {
        Self {
            extra_args: Vec::new(),
            handle: tokio::runtime::Handle::current(),
        }
    }

    pub fn with_args(extra_args: Vec<String>) -> Self {
        Self {
            extra_args,
            handle: tokio::runtime::Handle::current(),
        }
    }
}

impl Default for CargoTestRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum `passed`/`failed` across every `test result: ok|FAILED. P passed; F
/// failed; ...` line `cargo test` prints (one per test binary).
fn parse_summary(raw: &str) -> (u32, u32) {
    let re = Regex::new(r"test result: (?:ok|FAILED)\.\s*(\d+) passed;\s*(\d+) failed")
        .expect("static regex is valid");
    re.captures_iter(raw).fold((0, 0), |(passed, failed), caps| {
        let p: u32 = caps[1].parse().unwrap_or(0);
        let f: u32 = caps[2].parse().unwrap_or(0);
        (passed + p, failed + f)
    })
}

impl TestRunner for CargoTestRunner {
    fn run(&self, repo_dir: &str) -> TestRunResult {
        let mut cmd = Command::new("cargo");
        cmd.arg("test").args(&self.extra_args).current_dir(repo_dir);

        let output = self
            .handle
            .block_on(async move { tokio::time::timeout(TEST_TIMEOUT, cmd.output()).await });

        match output {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let raw_text = format!("{stdout}\n{stderr}");
                let (passed, failed) = parse_summary(&raw_text);
                TestRunResult {
                    raw_text,
                    passed,
                    total: passed + failed,
                }
            }
            Ok(Err(e)) => TestRunResult {
                raw_text: format!("failed to spawn cargo test: {e}"),
                passed: 0,
                total: 0,
            },
            Err(_elapsed) => TestRunResult {
                raw_text: "check_tests function has timed out".to_string(),
                passed: 0,
                total: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_passing_summary_line() {
        let (passed, failed) = parse_summary("test result: ok. 3 passed; 0 failed; 0 ignored");
        assert_eq!((passed, failed), (3, 0));
    }

    #[test]
    fn sums_multiple_test_binaries() {
        let raw = "\
running 2 tests
test result: ok. 2 passed; 0 failed; 0 ignored; 0 measured; 0 filtered out

running 1 test
test result: FAILED. 0 passed; 1 failed; 0 ignored; 0 measured; 0 filtered out
";
        let (passed, failed) = parse_summary(raw);
        assert_eq!((passed, failed), (2, 1));
    }

    #[test]
    fn unparseable_output_yields_zero_zero() {
        assert_eq!(parse_summary("no cargo output recognized here"), (0, 0));
    }
}
