use crate::assets::{AssetError, AssetResolver};
use crate::error::{SwapStage, XspotError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

/// Swaps the node's containerd config for the addon's version and back.
///
/// `install` always leaves a recoverable copy at `backup_path` before the
/// active file is rewritten; `restore` only deletes the backup after the active
/// file has been put back.
pub struct ConfigSwapper<A: AssetResolver> {
    addon: String,
    active_path: PathBuf,
    backup_path: PathBuf,
    assets: A,
}

impl<A: AssetResolver> ConfigSwapper<A> {
    pub fn new(addon: &str, active_path: PathBuf, backup_path: PathBuf, assets: A) -> Self {
        Self {
            addon: addon.to_string(),
            active_path,
            backup_path,
            assets,
        }
    }

    #[cfg(test)]
    pub fn active_path(&self) -> &Path {
        &self.active_path
    }

    #[cfg(test)]
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    pub fn backup_present(&self) -> bool {
        self.backup_path.exists()
    }

    pub fn resolve(&self, target: &str) -> Result<Vec<u8>, XspotError> {
        self.assets
            .resolve(&self.addon, target)
            .map_err(|err| match err {
                AssetError::NotFound { .. } => XspotError::swap(SwapStage::Resolve, err.to_string()),
                AssetError::Read { .. } => XspotError::swap(SwapStage::Install, err.to_string()),
            })
    }

    pub fn install(&self, target: &str) -> Result<(), XspotError> {
        if self.backup_present() {
            // Restoring it later would not give back the config that is active now.
            return Err(XspotError::swap(
                SwapStage::Install,
                format!(
                    "backup already present at {}; run disable first",
                    self.backup_path.display()
                ),
            ));
        }
        info!(
            from = %self.active_path.display(),
            to = %self.backup_path.display(),
            "storing default runtime config"
        );
        copy_file(&self.active_path, &self.backup_path).map_err(|err| {
            XspotError::swap(
                SwapStage::Install,
                format!(
                    "copying {} to {}: {err}",
                    self.active_path.display(),
                    self.backup_path.display()
                ),
            )
        })?;

        let content = self.resolve(target)?;
        remove_if_exists(&self.active_path)
            .and_then(|_| fs::write(&self.active_path, &content))
            .map_err(|err| {
                XspotError::swap(
                    SwapStage::Install,
                    format!("writing {}: {err}", self.active_path.display()),
                )
            })?;
        info!(asset = target, path = %self.active_path.display(), "installed runtime config");
        Ok(())
    }

    pub fn restore(&self) -> Result<(), XspotError> {
        if !self.backup_present() {
            return Err(XspotError::swap(
                SwapStage::Restore,
                format!("no backup at {}", self.backup_path.display()),
            ));
        }
        let restore_err = |err: io::Error| {
            XspotError::swap(
                SwapStage::Restore,
                format!(
                    "restoring {} from {}: {err}",
                    self.active_path.display(),
                    self.backup_path.display()
                ),
            )
        };
        remove_if_exists(&self.active_path).map_err(restore_err)?;
        copy_file(&self.backup_path, &self.active_path).map_err(restore_err)?;
        fs::remove_file(&self.backup_path).map_err(restore_err)?;
        info!(path = %self.active_path.display(), "restored default runtime config");
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn copy_file(src: &Path, dest: &Path) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dest).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticAssets;
    use tempfile::{tempdir, TempDir};

    const ORIGINAL: &[u8] = b"version = 2\n[plugins]\n  default_runtime = \"runc\"\n";
    const SANDBOX: &[u8] = b"version = 2\n[plugins]\n  default_runtime = \"runsc\"\n";

    fn swapper(dir: &TempDir) -> ConfigSwapper<StaticAssets> {
        let active = dir.path().join("etc/containerd/config.toml");
        fs::create_dir_all(active.parent().unwrap()).unwrap();
        fs::write(&active, ORIGINAL).unwrap();
        ConfigSwapper::new(
            "xspot",
            active,
            dir.path().join("tmp/config.toml"),
            StaticAssets::default().with("xspot", "xspot-config.toml", SANDBOX),
        )
    }

    #[test]
    fn install_backs_up_then_writes_asset() {
        let dir = tempdir().unwrap();
        let swapper = swapper(&dir);
        swapper.install("xspot-config.toml").unwrap();
        assert_eq!(fs::read(swapper.backup_path()).unwrap(), ORIGINAL);
        assert_eq!(fs::read(swapper.active_path()).unwrap(), SANDBOX);
    }

    #[test]
    fn restore_after_install_is_byte_identical() {
        let dir = tempdir().unwrap();
        let swapper = swapper(&dir);
        swapper.install("xspot-config.toml").unwrap();
        swapper.restore().unwrap();
        assert_eq!(fs::read(swapper.active_path()).unwrap(), ORIGINAL);
        assert!(!swapper.backup_present());
    }

    #[test]
    fn restore_without_backup_leaves_active_untouched() {
        let dir = tempdir().unwrap();
        let swapper = swapper(&dir);
        let err = swapper.restore().unwrap_err();
        assert_eq!(err.swap_stage(), Some(SwapStage::Restore));
        assert_eq!(fs::read(swapper.active_path()).unwrap(), ORIGINAL);
    }

    #[test]
    fn unknown_target_fails_at_resolve() {
        let dir = tempdir().unwrap();
        let swapper = swapper(&dir);
        let err = swapper.install("nope.toml").unwrap_err();
        assert_eq!(err.swap_stage(), Some(SwapStage::Resolve));
        // The backup is taken first, so the original is still recoverable.
        assert_eq!(fs::read(swapper.active_path()).unwrap(), ORIGINAL);
        assert_eq!(fs::read(swapper.backup_path()).unwrap(), ORIGINAL);
    }

    #[test]
    fn missing_active_config_fails_before_anything_is_written() {
        let dir = tempdir().unwrap();
        let swapper = swapper(&dir);
        fs::remove_file(swapper.active_path()).unwrap();
        let err = swapper.install("xspot-config.toml").unwrap_err();
        assert_eq!(err.swap_stage(), Some(SwapStage::Install));
        assert!(!swapper.active_path().exists());
        assert!(!swapper.backup_present());
    }

    #[test]
    fn install_refuses_to_overwrite_an_existing_backup() {
        let dir = tempdir().unwrap();
        let swapper = swapper(&dir);
        fs::create_dir_all(swapper.backup_path().parent().unwrap()).unwrap();
        fs::write(swapper.backup_path(), b"stale config v1").unwrap();

        let err = swapper.install("xspot-config.toml").unwrap_err();

        assert_eq!(err.swap_stage(), Some(SwapStage::Install));
        assert_eq!(fs::read(swapper.active_path()).unwrap(), ORIGINAL);
        assert_eq!(fs::read(swapper.backup_path()).unwrap(), b"stale config v1");
    }

    #[test]
    fn second_install_is_refused_until_restore() {
        let dir = tempdir().unwrap();
        let swapper = swapper(&dir);
        swapper.install("xspot-config.toml").unwrap();

        let err = swapper.install("xspot-config.toml").unwrap_err();
        assert_eq!(err.swap_stage(), Some(SwapStage::Install));
        assert_eq!(fs::read(swapper.active_path()).unwrap(), SANDBOX);
        assert_eq!(fs::read(swapper.backup_path()).unwrap(), ORIGINAL);

        swapper.restore().unwrap();
        assert_eq!(fs::read(swapper.active_path()).unwrap(), ORIGINAL);
        swapper.install("xspot-config.toml").unwrap();
    }
}
