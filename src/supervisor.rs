use crate::assets::AssetResolver;
use crate::config::Config;
use crate::error::XspotError;
use crate::fetch::{BinaryArtifact, BinaryFetcher};
use crate::provision::FilesystemProvisioner;
use crate::service::{CommandRunner, ServiceController, ServiceStep};
use crate::shutdown::ShutdownSignal;
use crate::swap::ConfigSwapper;
use std::fmt;
use std::io;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Enabling,
    Running,
    Disabling,
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Enabling => "enabling",
            Phase::Running => "running",
            Phase::Disabling => "disabling",
            Phase::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Outcome of a disable: both steps are always attempted.
#[derive(Debug)]
pub struct Termination {
    pub restore: Result<(), XspotError>,
    pub restart: Result<(), XspotError>,
}

impl Termination {
    pub fn succeeded(&self) -> bool {
        self.restore.is_ok() && self.restart.is_ok()
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }

    /// The first failure in execution order.
    pub fn into_result(self) -> Result<(), XspotError> {
        self.restore?;
        self.restart
    }
}

pub struct Supervisor<A: AssetResolver, R: CommandRunner> {
    provisioner: FilesystemProvisioner,
    fetcher: BinaryFetcher,
    artifacts: Vec<BinaryArtifact>,
    swapper: ConfigSwapper<A>,
    asset_target: String,
    services: ServiceController<R>,
    enable_plan: Vec<ServiceStep>,
    disable_plan: Vec<ServiceStep>,
    phase: Phase,
}

impl<A: AssetResolver, R: CommandRunner> Supervisor<A, R> {
    pub fn from_config(cfg: &Config, assets: A, runner: R) -> Result<Self, XspotError> {
        let root = cfg.node_root();
        Ok(Self {
            provisioner: FilesystemProvisioner::new(root.clone(), cfg.directories.clone()),
            fetcher: BinaryFetcher::new(root, &cfg.http.user_agent)?,
            artifacts: cfg.binary_artifacts()?,
            swapper: ConfigSwapper::new(
                &cfg.addon.name,
                cfg.active_config_path(),
                cfg.backup_config_path(),
                assets,
            ),
            asset_target: cfg.runtime_config.asset_target.clone(),
            services: ServiceController::new(cfg.chroot_boundary(), runner),
            enable_plan: cfg.service.enable_plan.clone(),
            disable_plan: cfg.service.disable_plan.clone(),
            phase: Phase::Idle,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[cfg(test)]
    pub fn services(&self) -> &ServiceController<R> {
        &self.services
    }

    fn transition(&mut self, next: Phase) {
        info!(from = %self.phase, to = %next, "phase change");
        self.phase = next;
    }

    /// Provision, fetch, install, restart. Nothing on the node changes before
    /// every artifact has been downloaded.
    pub fn enable(&mut self) -> Result<(), XspotError> {
        if self.phase != Phase::Idle {
            return Err(XspotError::Lifecycle(format!(
                "cannot enable while {}",
                self.phase
            )));
        }
        self.transition(Phase::Enabling);
        match self.enable_steps() {
            Ok(()) => {
                self.transition(Phase::Running);
                Ok(())
            }
            Err(err) => {
                error!(error = %err, "enable failed");
                self.transition(Phase::Idle);
                Err(err)
            }
        }
    }

    fn enable_steps(&self) -> Result<(), XspotError> {
        self.provisioner.provision()?;
        self.fetcher.fetch_all(&self.artifacts)?;
        self.swapper.install(&self.asset_target)?;
        self.services.execute(&self.enable_plan)
    }

    /// Explicit disable. Returns the first error, after attempting both steps.
    pub fn disable(&mut self) -> Result<(), XspotError> {
        self.terminate().into_result()
    }

    /// Restores the config and runs the disable plan. The plan runs even when
    /// the restore failed.
    pub fn terminate(&mut self) -> Termination {
        self.transition(Phase::Disabling);
        let restore = self.swapper.restore();
        if let Err(err) = &restore {
            error!(error = %err, "restoring runtime config failed");
        }
        let restart = self.services.execute(&self.disable_plan);
        if let Err(err) = &restart {
            error!(error = %err, "disable service plan failed");
        }
        self.transition(Phase::Terminated);
        if restore.is_ok() && restart.is_ok() {
            info!("successfully disabled");
        }
        Termination { restore, restart }
    }

    /// Enables, arms the shutdown source, then blocks until shutdown is
    /// triggered and disables. `arm` runs only once the node is switched, so a
    /// signal during enable keeps its default disposition.
    pub fn run<F>(&mut self, shutdown: &ShutdownSignal, arm: F) -> Result<Termination, XspotError>
    where
        F: FnOnce(&ShutdownSignal) -> io::Result<()>,
    {
        self.enable()?;
        if let Err(err) = arm(shutdown) {
            error!(error = %err, "installing signal watcher failed; reverting");
            return Err(match self.terminate().into_result() {
                Ok(()) => XspotError::Io(err),
                Err(revert) => XspotError::Lifecycle(format!(
                    "installing signal watcher failed: {err}; reverting failed: {revert}"
                )),
            });
        }
        info!("xspot successfully enabled; waiting for termination signal");
        shutdown.wait();
        Ok(self.terminate())
    }
}
