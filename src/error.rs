use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XspotError {
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
    #[error("building http client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("creating directory {}: {source}", path.display())]
    Provision {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("downloading {artifact}: {cause}")]
    Fetch {
        artifact: String,
        #[source]
        cause: FetchCause,
    },
    #[error("config swap failed during {stage}: {message}")]
    Swap { stage: SwapStage, message: String },
    #[error("service step `{step}` failed: {message}")]
    Service {
        step: String,
        output: String,
        message: String,
    },
}

#[derive(Debug, Error)]
pub enum FetchCause {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("writing {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStage {
    Resolve,
    Install,
    Restore,
}

impl fmt::Display for SwapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwapStage::Resolve => "resolve",
            SwapStage::Install => "install",
            SwapStage::Restore => "restore",
        };
        f.write_str(name)
    }
}

impl XspotError {
    pub fn swap(stage: SwapStage, message: impl Into<String>) -> Self {
        XspotError::Swap {
            stage,
            message: message.into(),
        }
    }

    #[cfg(test)]
    pub fn swap_stage(&self) -> Option<SwapStage> {
        match self {
            XspotError::Swap { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Captured command output for service failures, surfaced in `--json` errors.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            XspotError::Service { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}
