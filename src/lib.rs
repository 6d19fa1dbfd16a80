//! Conway's Game of Life on a bounded grid, computed in lock step by a
//! pool of worker threads.

pub mod barrier;
pub mod config;
pub mod draw;
pub mod driver;
pub mod error;
pub mod partition;
pub mod pool;
pub mod proc;

pub use barrier::{GenerationBarrier, Phase, Work};
pub use config::SimConfig;
pub use draw::{Console, ConsoleMode, GenerationSink, History, TextWriter};
pub use driver::{Driver, RunSummary};
pub use error::{Error, Result};
pub use partition::{PartitionPlan, Strategy, WorkUnit};
pub use proc::{Cell, Grid, GridState, Rect};
