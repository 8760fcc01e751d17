use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;

/// Run-level failures. Any of these means no record was persisted.
#[derive(Error, Debug)]
pub enum CollectorError {
    #[error("no command given for the target process")]
    EmptyCommand,

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("target did not exit within {0:?}")]
    TimeoutExceeded(Duration),

    #[error("failed to prepare sandbox root: {0}")]
    Sandbox(#[from] std::io::Error),

    #[error("failed to watch sandbox root: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}
