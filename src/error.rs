use crate::config::ConfigError;
use std::io;
use thiserror::Error;

/// Errors returned by the server.
#[derive(Debug, Error)]
pub enum Error {
    /// The listening socket could not be created.
    #[error("failed to bind {address}: {source}")]
    Bind {
        /// The address that was requested.
        address: String,
        /// The underlying socket error.
        #[source]
        source: io::Error,
    },
    /// [`Server::start`](crate::Server::start) was called more than once.
    #[error("server already started")]
    AlreadyStarted,
    /// The server has already been told to stop.
    #[error("server is stopped")]
    Stopped,
    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
