use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// The node's filesystem as seen from inside the controller's mount namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRoot(PathBuf);

impl NodeRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Joins `rel` under the root. Absolute node paths such as
    /// `/etc/containerd/config.toml` are treated as root-relative, and `..`
    /// never climbs above the root.
    pub fn resolve(&self, rel: impl AsRef<Path>) -> PathBuf {
        let mut parts: Vec<&OsStr> = Vec::new();
        for component in rel.as_ref().components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::ParentDir => {
                    parts.pop();
                }
                Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
            }
        }
        let mut out = self.0.clone();
        out.extend(parts);
        out
    }
}
