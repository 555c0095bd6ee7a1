mod assets;
mod config;
mod error;
mod fetch;
mod paths;
mod provision;
mod service;
mod shutdown;
mod supervisor;
mod swap;
#[cfg(test)]
mod testing;

use assets::{AssetResolver, DirectoryAssets};
use clap::{Parser, Subcommand};
use config::{load_config, read_config, Config, CONFIG_ENV, DEFAULT_CONFIG_PATH, DEFAULT_CONFIG_YAML};
use error::XspotError;
use serde::Serialize;
use serde_json::json;
use service::RealCommandRunner;
use shutdown::{watch_termination_signals, ShutdownSignal};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use supervisor::Supervisor;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xspot", version, about = "Switch a node's containerd onto the xspot sandbox runtime")]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    json: bool,
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Switch the node, then revert on SIGINT/SIGTERM.
    Enable,
    /// Revert a previous switch.
    Disable,
    Status,
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    Init,
    Validate,
    Show,
}

#[derive(Debug, Serialize)]
struct JsonResult<T: Serialize> {
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command_output: Option<String>,
}

#[derive(Debug)]
struct Context {
    config_path: PathBuf,
    json: bool,
}

fn main() -> Result<(), XspotError> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    let ctx = Context {
        config_path: resolve_config_path(cli.config.as_ref()),
        json: cli.json,
    };

    let result = match cli.command {
        Commands::Enable => handle_enable(&ctx),
        Commands::Disable => handle_disable(&ctx),
        Commands::Status => handle_status(&ctx),
        Commands::Config { command } => handle_config(&ctx, command),
    };

    if let Err(err) = result {
        if ctx.json {
            let payload = JsonResult::<serde_json::Value> {
                ok: false,
                result: None,
                error: Some(err.to_string()),
                command_output: err.command_output().map(str::to_string),
            };
            print_json(&payload)?;
        } else {
            eprintln!("{err}");
        }
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config_path(override_path: Option<&PathBuf>) -> PathBuf {
    if let Some(path) = override_path {
        return path.clone();
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn ensure_parent(path: &Path) -> Result<(), XspotError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn build_supervisor(
    cfg: &Config,
) -> Result<Supervisor<DirectoryAssets, RealCommandRunner>, XspotError> {
    Supervisor::from_config(cfg, cfg.directory_assets(), RealCommandRunner)
}

fn handle_enable(ctx: &Context) -> Result<(), XspotError> {
    let cfg = load_config(&ctx.config_path)?;
    let mut supervisor = build_supervisor(&cfg)?;
    let shutdown = ShutdownSignal::new();
    let termination = supervisor.run(&shutdown, |signal| {
        watch_termination_signals(signal.clone())
    })?;
    let code = termination.exit_code();
    info!(code, phase = %supervisor.phase(), "exiting");
    std::process::exit(code);
}

fn handle_disable(ctx: &Context) -> Result<(), XspotError> {
    let cfg = load_config(&ctx.config_path)?;
    let mut supervisor = build_supervisor(&cfg)?;
    supervisor.disable()?;
    output(
        ctx,
        json!({
            "disabled": true,
            "active_path": cfg.active_config_path(),
        }),
    )
}

fn handle_status(ctx: &Context) -> Result<(), XspotError> {
    let cfg = load_config(&ctx.config_path)?;
    let root = cfg.node_root();
    let active = cfg.active_config_path();
    let backup = cfg.backup_config_path();
    let assets = cfg.directory_assets();

    let active_content = fs::read(&active).ok();
    let expected = assets
        .resolve(&cfg.addon.name, &cfg.runtime_config.asset_target)
        .ok();
    let sandbox_config_active = match (&active_content, &expected) {
        (Some(active), Some(expected)) => active == expected,
        _ => false,
    };

    let mut artifacts = serde_json::Map::new();
    for artifact in &cfg.artifacts {
        artifacts.insert(
            artifact.name.clone(),
            json!(root.resolve(&artifact.destination).is_file()),
        );
    }

    let chroot_available = which::which(&cfg.service.chroot).is_ok();
    output(
        ctx,
        json!({
            "addon": assets.addon,
            "maintainer": assets.maintainer,
            "enabled_by_default": assets.enabled_by_default,
            "node_root": root.path(),
            "active_path": active,
            "active_present": active_content.is_some(),
            "backup_path": backup,
            "backup_present": backup.exists(),
            "sandbox_config_active": sandbox_config_active,
            "artifacts": artifacts,
            "chroot_available": chroot_available,
        }),
    )
}

fn handle_config(ctx: &Context, command: ConfigCommand) -> Result<(), XspotError> {
    match command {
        ConfigCommand::Init => {
            if ctx.config_path.exists() {
                return output(ctx, json!({"path": ctx.config_path, "created": false}));
            }
            ensure_parent(&ctx.config_path)?;
            fs::write(&ctx.config_path, DEFAULT_CONFIG_YAML)?;
            output(ctx, json!({"path": ctx.config_path, "created": true}))
        }
        ConfigCommand::Validate => {
            let _cfg = read_config(&ctx.config_path)?;
            output(ctx, json!({"path": ctx.config_path, "valid": true}))
        }
        ConfigCommand::Show => {
            let cfg = load_config(&ctx.config_path)?;
            if ctx.json {
                return output(ctx, serde_json::to_value(&cfg)?);
            }
            print!("{}", serde_yaml::to_string(&cfg)?);
            Ok(())
        }
    }
}

fn output(ctx: &Context, payload: serde_json::Value) -> Result<(), XspotError> {
    if ctx.json {
        let wrapper = JsonResult {
            ok: true,
            result: Some(payload),
            error: None,
            command_output: None,
        };
        print_json(&wrapper)?;
    } else {
        println!("{}", payload);
    }
    Ok(())
}

fn print_json<T: Serialize>(payload: &T) -> Result<(), XspotError> {
    let text = serde_json::to_string_pretty(payload)?;
    println!("{}", text);
    Ok(())
}
