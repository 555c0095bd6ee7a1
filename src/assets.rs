use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("no asset matching target {target} in addon {addon}")]
    NotFound { addon: String, target: String },
    #[error("reading asset {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Resolves the content of an addon asset by its target name.
pub trait AssetResolver {
    fn resolve(&self, addon: &str, target: &str) -> Result<Vec<u8>, AssetError>;
}

/// An addon declaration whose assets have already been rendered into a
/// directory on the controller's filesystem.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
    pub addon: String,
    pub enabled_by_default: bool,
    pub maintainer: String,
    pub dir: PathBuf,
    pub targets: Vec<String>,
}

impl DirectoryAssets {
    pub fn declares(&self, target: &str) -> bool {
        self.targets.iter().any(|t| t == target)
    }
}

impl AssetResolver for DirectoryAssets {
    fn resolve(&self, addon: &str, target: &str) -> Result<Vec<u8>, AssetError> {
        let not_found = || AssetError::NotFound {
            addon: addon.to_string(),
            target: target.to_string(),
        };
        if addon != self.addon || !self.declares(target) {
            return Err(not_found());
        }
        let path = self.dir.join(target);
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(not_found()),
            Err(source) => Err(AssetError::Read { path, source }),
        }
    }
}
