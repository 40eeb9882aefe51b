//! Error types for reading, writing and discovering config files

use std::io;
use std::path::PathBuf;

/// Failure to load a config file into a [`crate::GenericValue`].
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The structured-data file is not valid JSON
    #[error("could not parse JSON in \"{path}\": {cause}")]
    MalformedData { path: PathBuf, cause: String },

    /// The source module is outside the supported literal subset or exports nothing
    #[error("could not load JS module \"{path}\": {cause}")]
    ModuleLoadFailure { path: PathBuf, cause: String },

    #[error("could not read \"{path}\": {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failure to persist a serialized config file.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("could not write \"{path}\": {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not serialize value for \"{path}\": {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl WriteError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Fatal errors that stop discovery before any file is processed.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("root \"{0}\" is not a directory")]
    InvalidRoot(PathBuf),

    #[error("path \"{0}\" does not exist")]
    PathNotFound(PathBuf),

    #[error("path \"{0}\" is outside of the root directory")]
    OutsideRoot(PathBuf),

    #[error("invalid file name pattern \"{pattern}\": {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Run-level error returned by [`crate::convert::run_conversion`].
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
}

/// Failure to set up or run the JS runtime used for source modules.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("node was not found on PATH")]
    NodeNotFound,

    #[error("node binary \"{0}\" does not exist")]
    MissingBinary(PathBuf),

    #[error("could not start \"{binary}\": {source}")]
    Spawn {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The module threw, or node exited with a failure status
    #[error("{0}")]
    Script(String),

    #[error("node printed output that is not JSON: {0}")]
    Output(String),
}
