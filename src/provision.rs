use crate::error::XspotError;
use crate::paths::NodeRoot;
use std::fs;
use std::path::PathBuf;
use tracing::info;

const DIR_MODE: u32 = 0o755;

pub struct FilesystemProvisioner {
    root: NodeRoot,
    directories: Vec<String>,
}

impl FilesystemProvisioner {
    pub fn new(root: NodeRoot, directories: Vec<String>) -> Self {
        Self { root, directories }
    }

    /// Creates the runtime's log and staging directories on the node.
    pub fn provision(&self) -> Result<Vec<PathBuf>, XspotError> {
        let mut created = Vec::with_capacity(self.directories.len());
        for dir in &self.directories {
            let path = self.root.resolve(dir);
            create_dir(&path).map_err(|source| XspotError::Provision {
                path: path.clone(),
                source,
            })?;
            info!(path = %path.display(), "directory ready");
            created.push(path);
        }
        Ok(created)
    }
}

#[cfg(unix)]
fn create_dir(path: &std::path::Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(path)
}

#[cfg(not(unix))]
fn create_dir(path: &std::path::Path) -> std::io::Result<()> {
    let _ = DIR_MODE;
    fs::create_dir_all(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn provisioner(root: &std::path::Path) -> FilesystemProvisioner {
        FilesystemProvisioner::new(
            NodeRoot::new(root),
            vec!["run/containerd/runxc".to_string(), "tmp/runxc".to_string()],
        )
    }

    #[test]
    fn creates_nested_directories_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let provisioner = provisioner(dir.path());
        let created = provisioner.provision().unwrap();
        assert_eq!(created.len(), 2);
        assert!(dir.path().join("run/containerd/runxc").is_dir());
        assert!(dir.path().join("tmp/runxc").is_dir());

        provisioner.provision().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn directories_use_standard_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        provisioner(dir.path()).provision().unwrap();
        let mode = fs::metadata(dir.path().join("tmp/runxc"))
            .unwrap()
            .permissions()
            .mode();
        // umask may clear group/other write bits but never adds any.
        assert_eq!(mode & 0o777 & !DIR_MODE, 0);
        assert_eq!(mode & 0o700, 0o700);
    }

    #[test]
    fn file_in_the_way_is_a_provision_error() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("tmp")).unwrap();
        fs::write(dir.path().join("tmp/runxc"), "not a dir").unwrap();
        let err = provisioner(dir.path()).provision().unwrap_err();
        match err {
            XspotError::Provision { path, .. } => assert_eq!(path, dir.path().join("tmp/runxc")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
