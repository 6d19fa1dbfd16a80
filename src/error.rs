use std::{io, path::PathBuf};

use crate::barrier::Phase;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cannot open {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("input ended after {found} of {expected} cells")]
    MalformedInput { expected: usize, found: usize },

    #[error("failed to spawn worker {worker}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },

    #[error("worker {0} panicked")]
    WorkerPanicked(usize),

    #[error("cannot {op} while barrier is {phase:?}")]
    BarrierState { op: &'static str, phase: Phase },

    #[error("generation {got} published out of order, expected {expected}")]
    OutOfOrder { got: u64, expected: u64 },
}
