use crate::error::{FetchCause, XspotError};
use crate::paths::NodeRoot;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryArtifact {
    pub name: String,
    pub url: String,
    /// Relative to the node root.
    pub destination: String,
    pub mode: u32,
}

pub struct BinaryFetcher {
    client: reqwest::blocking::Client,
    root: NodeRoot,
    user_agent: String,
}

impl BinaryFetcher {
    /// Downloads never time out: a slow mirror delays enable instead of failing it.
    pub fn new(root: NodeRoot, user_agent: &str) -> Result<Self, XspotError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(None)
            .build()
            .map_err(XspotError::HttpClient)?;
        Ok(Self {
            client,
            root,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn destination(&self, artifact: &BinaryArtifact) -> PathBuf {
        self.root.resolve(&artifact.destination)
    }

    /// Downloads every artifact before installing any of them, so a failed
    /// download leaves the node untouched.
    pub fn fetch_all(&self, artifacts: &[BinaryArtifact]) -> Result<(), XspotError> {
        let mut bodies = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            bodies.push(self.download(artifact)?);
        }
        for (artifact, body) in artifacts.iter().zip(bodies) {
            self.install(artifact, &body)?;
        }
        Ok(())
    }

    fn download(&self, artifact: &BinaryArtifact) -> Result<Vec<u8>, XspotError> {
        let fail = |cause: FetchCause| XspotError::Fetch {
            artifact: artifact.name.clone(),
            cause,
        };
        info!(artifact = %artifact.name, url = %artifact.url, "downloading");
        let response = self
            .client
            .get(&artifact.url)
            .header("User-Agent", &self.user_agent)
            .send()
            .map_err(|err| fail(FetchCause::Transport(err)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(FetchCause::Status(status.as_u16())));
        }
        let bytes = response
            .bytes()
            .map_err(|err| fail(FetchCause::Transport(err)))?;
        Ok(bytes.to_vec())
    }

    fn install(&self, artifact: &BinaryArtifact, body: &[u8]) -> Result<(), XspotError> {
        let dest = self.destination(artifact);
        install_file(&dest, body, artifact.mode).map_err(|source| XspotError::Fetch {
            artifact: artifact.name.clone(),
            cause: FetchCause::Write {
                path: dest.clone(),
                source,
            },
        })?;
        info!(
            artifact = %artifact.name,
            path = %dest.display(),
            bytes = body.len(),
            "installed binary"
        );
        Ok(())
    }
}

/// Replaces whatever sits at `path` rather than writing through it, so a
/// running binary is never truncated in place.
fn install_file(path: &Path, body: &[u8], mode: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("refusing to replace directory {}", path.display()),
            ));
        }
        Ok(_) => fs::remove_file(path)?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    fs::write(path, body)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}
