//! In-memory fakes for the harness seams (testing only)
//!
//! Provides `ScriptedCommandRunner`, `FakeBuilder`, `CountingDeployer`,
//! `FakeHostControl` and `FakeHostSession` so stages can be exercised without
//! CMake, a Windows session or a running Maya.

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::builder::{BuildResult, BuildStep, PluginBuilder};
use crate::command::{CommandOutput, CommandRunner};
use crate::deployer::{ArtifactDeployer, DeployReport};
use crate::error::{HarnessError, Result};
use crate::host::HostSession;
use crate::process::{HostControl, LaunchReport, StopReport};

// ---------------------------------------------------------------------------
// ScriptedCommandRunner
// ---------------------------------------------------------------------------

/// One scripted answer to a command line.
#[derive(Debug, Clone)]
pub enum Reply {
    Output(CommandOutput),
    /// The program cannot be started.
    SpawnError,
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    replies: Vec<Reply>,
}

/// Command runner answering from scripted rules.
///
/// A rule matches when the space-joined command line contains its pattern;
/// the first matching rule wins. Each rule replays its replies in order and
/// repeats the last one. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedCommandRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `pattern` with `output`.
    pub fn on(self, pattern: &str, output: CommandOutput) -> Self {
        self.on_sequence(pattern, vec![output])
    }

    /// Answer `pattern` with `outputs` in order, repeating the last.
    pub fn on_sequence(self, pattern: &str, outputs: Vec<CommandOutput>) -> Self {
        self.on_replies(pattern, outputs.into_iter().map(Reply::Output).collect())
    }

    /// Fail to start any command matching `pattern`.
    pub fn spawn_error(self, pattern: &str) -> Self {
        self.on_replies(pattern, vec![Reply::SpawnError])
    }

    /// Answer `pattern` with `replies` in order, repeating the last.
    pub fn on_replies(self, pattern: &str, replies: Vec<Reply>) -> Self {
        self.rules.lock().unwrap().push(Rule {
            pattern: pattern.to_string(),
            replies,
        });
        self
    }

    /// Every command line run so far.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of command lines containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|argv| argv.join(" ").contains(pattern))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(argv.to_vec());
        let line = argv.join(" ");

        let mut rules = self.rules.lock().unwrap();
        let Some(rule) = rules.iter_mut().find(|r| line.contains(&r.pattern)) else {
            return Ok(CommandOutput::ok(""));
        };
        let reply = if rule.replies.len() > 1 {
            rule.replies.remove(0)
        } else {
            rule.replies.first().cloned().unwrap_or(Reply::SpawnError)
        };

        match reply {
            Reply::Output(out) => Ok(out),
            Reply::SpawnError => Err(HarnessError::Spawn {
                program: argv.first().cloned().unwrap_or_default(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted spawn failure"),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeBuilder
// ---------------------------------------------------------------------------

/// Builder that returns a fixed outcome and counts calls.
#[derive(Debug)]
pub struct FakeBuilder {
    succeed: bool,
    calls: AtomicUsize,
}

impl FakeBuilder {
    pub fn succeeding() -> Self {
        Self {
            succeed: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            succeed: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginBuilder for FakeBuilder {
    async fn build(&self) -> BuildResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        BuildResult {
            success: self.succeed,
            failed_step: (!self.succeed).then_some(BuildStep::Build),
            stdout: String::new(),
            stderr: if self.succeed {
                String::new()
            } else {
                "fake build failure".to_string()
            },
            duration_ms: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// CountingDeployer
// ---------------------------------------------------------------------------

/// Deployer returning a canned report and counting calls.
#[derive(Debug)]
pub struct CountingDeployer {
    report: DeployReport,
    calls: AtomicUsize,
}

impl CountingDeployer {
    pub fn new(report: DeployReport) -> Self {
        Self {
            report,
            calls: AtomicUsize::new(0),
        }
    }

    /// A deployer whose artifact is never found.
    pub fn missing_artifact() -> Self {
        Self::new(DeployReport {
            artifact: PathBuf::from("CharacterFactory.mll"),
            artifact_found: false,
            attempts: Vec::new(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactDeployer for CountingDeployer {
    async fn deploy(&self) -> DeployReport {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.report.clone()
    }
}

// ---------------------------------------------------------------------------
// FakeHostControl
// ---------------------------------------------------------------------------

/// Host control with switchable failures and call counters.
#[derive(Debug, Default)]
pub struct FakeHostControl {
    fail_stop: bool,
    fail_start: bool,
    stop_calls: AtomicUsize,
    start_calls: AtomicUsize,
}

impl FakeHostControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostControl for FakeHostControl {
    async fn stop(&self) -> Result<StopReport> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(HarnessError::ProcessControl("fake stop failure".to_string()));
        }
        Ok(StopReport {
            stopped_pid: None,
            deployment: CountingDeployer::missing_artifact().report,
        })
    }

    async fn start(&self) -> Result<LaunchReport> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(HarnessError::ProcessControl("fake start failure".to_string()));
        }
        Ok(LaunchReport {
            strategy: "fake",
            script: PathBuf::from("start_maya.sh"),
        })
    }
}

// ---------------------------------------------------------------------------
// FakeHostSession
// ---------------------------------------------------------------------------

/// Recorded host command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCall {
    pub command: String,
    pub args: Vec<Option<String>>,
}

/// Host scripting session held in memory.
#[derive(Debug, Default)]
pub struct FakeHostSession {
    loaded: bool,
    load_fails: bool,
    call_fails: bool,
    pub calls: Vec<HostCall>,
    errors: RefCell<Vec<String>>,
}

impl FakeHostSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session where loading the plugin raises.
    pub fn with_broken_plugin() -> Self {
        Self {
            load_fails: true,
            ..Self::default()
        }
    }

    /// Session where the command itself raises.
    pub fn with_failing_command() -> Self {
        Self {
            call_fails: true,
            ..Self::default()
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Messages reported on the diagnostic channel.
    pub fn errors(&self) -> Vec<String> {
        self.errors.borrow().clone()
    }
}

impl HostSession for FakeHostSession {
    fn is_plugin_loaded(&self, _plugin: &str) -> Result<bool> {
        Ok(self.loaded)
    }

    fn load_plugin(&mut self, plugin: &str) -> Result<()> {
        if self.load_fails {
            return Err(HarnessError::HostCommand(format!(
                "cannot load {}: the specified module could not be found",
                plugin
            )));
        }
        self.loaded = true;
        Ok(())
    }

    fn call(&mut self, command: &str, args: &[Option<&str>]) -> Result<Value> {
        self.calls.push(HostCall {
            command: command.to_string(),
            args: args.iter().map(|a| a.map(str::to_string)).collect(),
        });
        if self.call_fails {
            return Err(HarnessError::HostCommand(format!("{} raised", command)));
        }
        Ok(json!("FBX files processed successfully"))
    }

    fn display_error(&self, message: &str) {
        self.errors.borrow_mut().push(message.to_string());
    }
}
