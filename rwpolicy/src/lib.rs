#![doc = include_str!("../README.md")]

use std::fmt::{Display, Formatter};

use biometrics::Counter;

pub mod cell;
mod gate;
pub mod lock;
pub mod sorted_list;
pub mod starvation;
pub mod workload;

pub use cell::RwPolicyCell;
pub use lock::{LockState, Policy, RwPolicyLock};
pub use sorted_list::SortedList;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static SPAWN_ERROR: Counter = Counter::new("rwpolicy.error.spawn");
static WORKER_PANICKED: Counter = Counter::new("rwpolicy.error.worker_panicked");

/// Register the biometrics of every module in this crate.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&SPAWN_ERROR);
    collector.register_counter(&WORKER_PANICKED);
    lock::register_biometrics(collector);
    sorted_list::register_biometrics(collector);
    workload::register_biometrics(collector);
    starvation::register_biometrics(collector);
}

////////////////////////////////////////////// indicio /////////////////////////////////////////////

/// Clues from the workload and starvation experiments.  Nothing is emitted until an emitter is
/// registered.
pub static COLLECTOR: indicio::Collector = indicio::Collector::new();

/////////////////////////////////////////////// Error //////////////////////////////////////////////

/// Errors surfaced before or while running an experiment.  Misuse of the lock protocol is not an
/// error; it panics.
#[derive(Debug)]
pub enum Error {
    /// The experiment needs at least one thread.
    InvalidThreadCount,
    /// The experiment needs at least one operation (or iteration) per run.
    InvalidOperationCount,
    /// The key space must be non-empty.
    InvalidKeySpace,
    /// A fraction fell outside [0, 1].
    InvalidFraction { what: &'static str, value: f64 },
    /// The search and insert fractions leave a negative delete fraction.
    FractionsExceedOne { search: f64, insert: f64 },
    /// The policy was neither "reader" nor "writer".
    UnknownPolicy(String),
    /// A worker thread could not be created.
    Spawn(std::io::Error),
    /// A worker thread panicked before finishing.
    WorkerPanicked,
}

impl Error {
    pub(crate) fn worker_panicked() -> Self {
        WORKER_PANICKED.click();
        Self::WorkerPanicked
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::InvalidThreadCount => write!(f, "thread count must be positive"),
            Error::InvalidOperationCount => write!(f, "operation count must be positive"),
            Error::InvalidKeySpace => write!(f, "key space must be positive"),
            Error::InvalidFraction { what, value } => {
                write!(f, "{} must be in [0, 1], got {}", what, value)
            }
            Error::FractionsExceedOne { search, insert } => write!(
                f,
                "search fraction {} plus insert fraction {} exceeds 1",
                search, insert
            ),
            Error::UnknownPolicy(policy) => {
                write!(f, "unknown policy {:?}; use \"reader\" or \"writer\"", policy)
            }
            Error::Spawn(err) => write!(f, "could not spawn worker: {}", err),
            Error::WorkerPanicked => write!(f, "a worker thread panicked"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        SPAWN_ERROR.click();
        Self::Spawn(err)
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
