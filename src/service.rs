use crate::error::XspotError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceAction {
    Stop,
    Start,
    Restart,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Stop => "stop",
            ServiceAction::Start => "start",
            ServiceAction::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceStep {
    pub service: String,
    pub action: ServiceAction,
}

impl ServiceStep {
    pub fn new(service: &str, action: ServiceAction) -> Self {
        Self {
            service: service.to_string(),
            action,
        }
    }
}

impl fmt::Display for ServiceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.service)
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    /// stdout followed by stderr, lossily decoded. The streams are captured
    /// separately, so lines are not interleaved in the order they were written.
    pub fn combined(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).to_string();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text.trim().to_string()
    }
}

pub trait CommandRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput, io::Error>;
}

pub struct RealCommandRunner;

impl CommandRunner for RealCommandRunner {
    fn run(&self, program: &Path, args: &[String]) -> Result<CommandOutput, io::Error> {
        let output = Command::new(program).args(args).output()?;
        let status_code = output
            .status
            .code()
            .unwrap_or(if output.status.success() { 0 } else { 1 });
        Ok(CommandOutput {
            status_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// How a service-manager command reaches into the node: `<chroot> <node_root>
/// [escalation...] <manager> <action> <service>`.
#[derive(Debug, Clone)]
pub struct ChrootBoundary {
    pub chroot: PathBuf,
    pub node_root: PathBuf,
    pub escalation: Vec<String>,
    pub manager: String,
}

impl ChrootBoundary {
    pub fn args_for(&self, step: &ServiceStep) -> Vec<String> {
        let mut args = vec![self.node_root.to_string_lossy().to_string()];
        args.extend(self.escalation.iter().cloned());
        args.push(self.manager.clone());
        args.push(step.action.as_str().to_string());
        args.push(step.service.clone());
        args
    }
}

fn render_command(program: &Path, args: &[String]) -> String {
    let mut parts = vec![program.display().to_string()];
    parts.extend(args.iter().cloned());
    parts.join(" ")
}

pub struct ServiceController<R: CommandRunner> {
    boundary: ChrootBoundary,
    runner: R,
}

impl<R: CommandRunner> ServiceController<R> {
    pub fn new(boundary: ChrootBoundary, runner: R) -> Self {
        Self { boundary, runner }
    }

    #[cfg(test)]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Runs every step in order and stops at the first failure.
    pub fn execute(&self, plan: &[ServiceStep]) -> Result<(), XspotError> {
        for step in plan {
            let args = self.boundary.args_for(step);
            let command = render_command(&self.boundary.chroot, &args);
            info!(service = %step.service, action = %step.action, "running service step");
            let output = self
                .runner
                .run(&self.boundary.chroot, &args)
                .map_err(|err| XspotError::Service {
                    step: step.to_string(),
                    output: String::new(),
                    message: format!("failed to run `{command}`: {err}"),
                })?;
            if !output.success() {
                let combined = output.combined();
                error!(
                    service = %step.service,
                    action = %step.action,
                    status = output.status_code,
                    output = %combined,
                    "service step failed"
                );
                return Err(XspotError::Service {
                    step: step.to_string(),
                    output: combined,
                    message: format!(
                        "command failed with status {} while running `{}`",
                        output.status_code, command
                    ),
                });
            }
        }
        info!(steps = plan.len(), "service plan complete");
        Ok(())
    }
}
