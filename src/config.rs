use crate::assets::DirectoryAssets;
use crate::error::XspotError;
use crate::fetch::BinaryArtifact;
use crate::paths::NodeRoot;
use crate::service::{ChrootBoundary, ServiceAction, ServiceStep};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const DEFAULT_CONFIG_YAML: &str = include_str!("../config/default.yaml");
pub const DEFAULT_CONFIG_PATH: &str = "/etc/xspot/controller.yaml";
pub const CONFIG_ENV: &str = "XSPOT_CONFIG";

const RUNXC_URL: &str = "https://venkat-xspot-bucket.s3.us-east-2.amazonaws.com/xspot/kata-runtime";
const SHIM_URL: &str = "https://github.com/google/gvisor-containerd-shim/releases/download/v0.0.3/containerd-shim-runsc-v1.linux-amd64";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub version: u32,
    pub node_root: String,
    pub addon: AddonConfig,
    pub directories: Vec<String>,
    pub artifacts: Vec<ArtifactConfig>,
    pub runtime_config: RuntimeConfigPaths,
    pub http: HttpConfig,
    pub service: ServiceConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AddonConfig {
    pub name: String,
    pub enabled_by_default: bool,
    pub maintainer: String,
    pub assets_dir: String,
    pub targets: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactConfig {
    pub name: String,
    pub url: String,
    pub destination: String,
    #[serde(default = "default_artifact_mode")]
    pub mode: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfigPaths {
    pub active_path: String,
    pub backup_path: String,
    pub asset_target: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub chroot: String,
    pub escalation: Vec<String>,
    pub manager: String,
    pub enable_plan: Vec<ServiceStep>,
    pub disable_plan: Vec<ServiceStep>,
}

fn default_artifact_mode() -> String {
    "0777".to_string()
}

fn containerd_restart_plan() -> Vec<ServiceStep> {
    vec![
        ServiceStep::new("rpc-statd.service", ServiceAction::Stop),
        ServiceStep::new("containerd", ServiceAction::Restart),
        ServiceStep::new("rpc-statd.service", ServiceAction::Start),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            node_root: "/node".to_string(),
            addon: AddonConfig::default(),
            directories: vec!["run/containerd/runxc".to_string(), "tmp/runxc".to_string()],
            artifacts: vec![
                ArtifactConfig {
                    name: "runxc".to_string(),
                    url: RUNXC_URL.to_string(),
                    destination: "usr/bin/runxc".to_string(),
                    mode: default_artifact_mode(),
                },
                ArtifactConfig {
                    name: "containerd-shim-runsc-v1".to_string(),
                    url: SHIM_URL.to_string(),
                    destination: "usr/bin/containerd-shim-runsc-v1".to_string(),
                    mode: default_artifact_mode(),
                },
            ],
            runtime_config: RuntimeConfigPaths::default(),
            http: HttpConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            name: "xspot".to_string(),
            enabled_by_default: false,
            maintainer: "Exotanium".to_string(),
            assets_dir: "/etc/xspot".to_string(),
            targets: vec![
                "xspot-pod.yaml".to_string(),
                "xspot-runtimeclass.yaml".to_string(),
                "xspot-config.toml".to_string(),
            ],
        }
    }
}

impl Default for RuntimeConfigPaths {
    fn default() -> Self {
        Self {
            active_path: "/etc/containerd/config.toml".to_string(),
            backup_path: "/tmp/config.toml".to_string(),
            asset_target: "xspot-config.toml".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "minikube".to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            chroot: "/usr/sbin/chroot".to_string(),
            escalation: vec!["sudo".to_string()],
            manager: "systemctl".to_string(),
            enable_plan: containerd_restart_plan(),
            disable_plan: containerd_restart_plan(),
        }
    }
}

impl Config {
    pub fn node_root(&self) -> NodeRoot {
        NodeRoot::new(&self.node_root)
    }

    pub fn active_config_path(&self) -> PathBuf {
        self.node_root().resolve(&self.runtime_config.active_path)
    }

    pub fn backup_config_path(&self) -> PathBuf {
        self.node_root().resolve(&self.runtime_config.backup_path)
    }

    pub fn binary_artifacts(&self) -> Result<Vec<BinaryArtifact>, XspotError> {
        self.artifacts
            .iter()
            .map(|a| {
                Ok(BinaryArtifact {
                    name: a.name.clone(),
                    url: a.url.clone(),
                    destination: a.destination.clone(),
                    mode: parse_mode(&a.mode, &format!("artifacts.{}.mode", a.name))?,
                })
            })
            .collect()
    }

    pub fn chroot_boundary(&self) -> ChrootBoundary {
        ChrootBoundary {
            chroot: PathBuf::from(&self.service.chroot),
            node_root: PathBuf::from(&self.node_root),
            escalation: self.service.escalation.clone(),
            manager: self.service.manager.clone(),
        }
    }

    pub fn directory_assets(&self) -> DirectoryAssets {
        DirectoryAssets {
            addon: self.addon.name.clone(),
            enabled_by_default: self.addon.enabled_by_default,
            maintainer: self.addon.maintainer.clone(),
            dir: PathBuf::from(&self.addon.assets_dir),
            targets: self.addon.targets.clone(),
        }
    }
}

/// Parses an octal permission string such as `"0777"` or `"755"`.
pub fn parse_mode(raw: &str, field: &str) -> Result<u32, XspotError> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0o")
        .unwrap_or(trimmed);
    let mode = u32::from_str_radix(digits, 8).map_err(|_| {
        XspotError::Config(format!("{field} must be an octal mode like \"0755\", got {raw:?}"))
    })?;
    if mode > 0o7777 {
        return Err(XspotError::Config(format!(
            "{field} is out of range: {raw:?}"
        )));
    }
    Ok(mode)
}

fn node_relative_path_ok(raw: &str) -> bool {
    !raw.trim().is_empty()
        && !Path::new(raw)
            .components()
            .any(|c| matches!(c, Component::ParentDir))
}

pub fn read_config_from_str(content: &str) -> Result<Config, XspotError> {
    let cfg: Config = serde_yaml::from_str(content)?;
    if cfg.version != 1 {
        return Err(XspotError::Config(format!(
            "unsupported config version {}",
            cfg.version
        )));
    }
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn read_config(path: &Path) -> Result<Config, XspotError> {
    let content = fs::read_to_string(path)?;
    read_config_from_str(&content)
}

/// Reads `path` when it exists; otherwise falls back to the built-in defaults.
pub fn load_config(path: &Path) -> Result<Config, XspotError> {
    if path.exists() {
        read_config(path)
    } else {
        Ok(Config::default())
    }
}

pub fn validate_config(cfg: &Config) -> Result<(), XspotError> {
    if !Path::new(&cfg.node_root).is_absolute() {
        return Err(XspotError::Config(format!(
            "node_root must be an absolute path, got {:?}",
            cfg.node_root
        )));
    }
    if cfg.addon.name.trim().is_empty() {
        return Err(XspotError::Config("addon.name must be non-empty".to_string()));
    }
    if !cfg
        .addon
        .targets
        .iter()
        .any(|t| t == &cfg.runtime_config.asset_target)
    {
        return Err(XspotError::Config(format!(
            "runtime_config.asset_target {:?} is not one of addon.targets",
            cfg.runtime_config.asset_target
        )));
    }
    for dir in &cfg.directories {
        if !node_relative_path_ok(dir) {
            return Err(XspotError::Config(format!(
                "directories entry {dir:?} must be non-empty and stay under node_root"
            )));
        }
    }
    for (field, value) in [
        ("runtime_config.active_path", &cfg.runtime_config.active_path),
        ("runtime_config.backup_path", &cfg.runtime_config.backup_path),
    ] {
        if !node_relative_path_ok(value) {
            return Err(XspotError::Config(format!(
                "{field} must be non-empty and stay under node_root"
            )));
        }
    }
    if cfg.runtime_config.active_path.trim_start_matches('/')
        == cfg.runtime_config.backup_path.trim_start_matches('/')
    {
        return Err(XspotError::Config(
            "runtime_config.backup_path must differ from runtime_config.active_path".to_string(),
        ));
    }
    let mut names = BTreeSet::new();
    for artifact in &cfg.artifacts {
        if artifact.name.trim().is_empty() {
            return Err(XspotError::Config("artifacts.name must be non-empty".to_string()));
        }
        if !names.insert(artifact.name.as_str()) {
            return Err(XspotError::Config(format!(
                "artifacts.{} is declared more than once",
                artifact.name
            )));
        }
        if !(artifact.url.starts_with("http://") || artifact.url.starts_with("https://")) {
            return Err(XspotError::Config(format!(
                "artifacts.{}.url must be an http(s) URL",
                artifact.name
            )));
        }
        if !node_relative_path_ok(&artifact.destination) {
            return Err(XspotError::Config(format!(
                "artifacts.{}.destination must be non-empty and stay under node_root",
                artifact.name
            )));
        }
        parse_mode(&artifact.mode, &format!("artifacts.{}.mode", artifact.name))?;
    }
    if cfg.service.chroot.trim().is_empty() || cfg.service.manager.trim().is_empty() {
        return Err(XspotError::Config(
            "service.chroot and service.manager must be non-empty".to_string(),
        ));
    }
    for (field, plan) in [
        ("service.enable_plan", &cfg.service.enable_plan),
        ("service.disable_plan", &cfg.service.disable_plan),
    ] {
        if plan.is_empty() {
            return Err(XspotError::Config(format!(
                "{field} must contain at least one step"
            )));
        }
        if plan.iter().any(|step| step.service.trim().is_empty()) {
            return Err(XspotError::Config(format!(
                "{field} has a step with an empty service name"
            )));
        }
    }
    Ok(())
}
