//! The sorted-list workload.  A fixed pool of worker threads share one [SortedList] through an
//! [RwPolicyCell].  Each worker draws an operation kind by the configured fractions and a uniform
//! key, takes the lock in the mode the operation needs, and counts what it did.  Counts merge into
//! the shared totals once per worker, under a mutex separate from the lock being measured.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use biometrics::Counter;
use guacamole::combinators::{any, range_to};
use guacamole::Guacamole;
use indicio::{clue, INFO};

use crate::gate::StartGate;
use crate::{Error, Policy, RwPolicyCell, SortedList, COLLECTOR};

///////////////////////////////////////////// Constants ////////////////////////////////////////////

/// Keys are drawn from [0, MAX_KEY) unless the options say otherwise.
pub const MAX_KEY: u64 = 65_536;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static RUN: Counter = Counter::new("rwpolicy.workload.run");
static POPULATE: Counter = Counter::new("rwpolicy.workload.populate");
static POPULATE_SHORTFALL: Counter = Counter::new("rwpolicy.workload.populate_shortfall");
static WORKER_FINISHED: Counter = Counter::new("rwpolicy.workload.worker_finished");
static MEMBER_OPS: Counter = Counter::new("rwpolicy.workload.member_ops");
static INSERT_OPS: Counter = Counter::new("rwpolicy.workload.insert_ops");
static DELETE_OPS: Counter = Counter::new("rwpolicy.workload.delete_ops");

/// Register biometrics for the workload.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&RUN);
    collector.register_counter(&POPULATE);
    collector.register_counter(&POPULATE_SHORTFALL);
    collector.register_counter(&WORKER_FINISHED);
    collector.register_counter(&MEMBER_OPS);
    collector.register_counter(&INSERT_OPS);
    collector.register_counter(&DELETE_OPS);
}

////////////////////////////////////////// WorkloadOptions /////////////////////////////////////////

/// Options for the sorted-list workload.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct WorkloadOptions {
    /// The number of worker threads.
    #[cfg_attr(feature = "command_line", arrrg(optional, "Number of worker threads."))]
    pub threads: u64,
    /// The admission policy of the lock.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Lock policy: \"reader\" or \"writer\".")
    )]
    pub policy: Policy,
    /// Keys inserted single-threaded before the workers start.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Keys to insert before the workers start.")
    )]
    pub initial_keys: u64,
    /// Operations across all threads.  Each thread runs operations / threads of them.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Total operations across all threads.")
    )]
    pub operations: u64,
    /// Fraction of operations that are searches.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Fraction of operations that call member.")
    )]
    pub search_fraction: f64,
    /// Fraction of operations that are inserts.  Deletes take what remains.
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Fraction of operations that call insert.")
    )]
    pub insert_fraction: f64,
    /// Keys are drawn from [0, key_space).
    #[cfg_attr(feature = "command_line", arrrg(optional, "Size of the key space."))]
    pub key_space: u64,
    /// Seed for the guacamole streams.
    #[cfg_attr(feature = "command_line", arrrg(optional, "Guacamole seed."))]
    pub seed: u64,
}

impl WorkloadOptions {
    /// The fraction of operations that are deletes.
    pub fn delete_fraction(&self) -> f64 {
        1.0 - self.search_fraction - self.insert_fraction
    }

    /// The number of operations each worker runs.  The remainder of the division is dropped.
    pub fn operations_per_thread(&self) -> u64 {
        self.operations / self.threads.max(1)
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), Error> {
        if self.threads == 0 {
            return Err(Error::InvalidThreadCount);
        }
        if self.operations == 0 {
            return Err(Error::InvalidOperationCount);
        }
        if self.key_space == 0 {
            return Err(Error::InvalidKeySpace);
        }
        check_fraction("search fraction", self.search_fraction)?;
        check_fraction("insert fraction", self.insert_fraction)?;
        if self.search_fraction + self.insert_fraction > 1.0 {
            return Err(Error::FractionsExceedOne {
                search: self.search_fraction,
                insert: self.insert_fraction,
            });
        }
        Ok(())
    }
}

fn check_fraction(what: &'static str, value: f64) -> Result<(), Error> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidFraction { what, value })
    }
}

impl Default for WorkloadOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            policy: Policy::WriterPreference,
            initial_keys: 1_000,
            operations: 500_000,
            search_fraction: 0.999,
            insert_fraction: 0.0005,
            key_space: MAX_KEY,
            seed: 0,
        }
    }
}

impl PartialEq for WorkloadOptions {
    fn eq(&self, other: &WorkloadOptions) -> bool {
        fn approx_eq(lhs: f64, rhs: f64) -> bool {
            lhs == rhs || (lhs * 0.999 < rhs && lhs * 1.001 > rhs)
        }
        self.threads == other.threads
            && self.policy == other.policy
            && self.initial_keys == other.initial_keys
            && self.operations == other.operations
            && approx_eq(self.search_fraction, other.search_fraction)
            && approx_eq(self.insert_fraction, other.insert_fraction)
            && self.key_space == other.key_space
            && self.seed == other.seed
    }
}

impl Eq for WorkloadOptions {}

///////////////////////////////////////// OperationCounters ////////////////////////////////////////

/// Per-kind operation counts.  `member`, `insert` and `delete` count attempts; `inserted` and
/// `deleted` count the attempts that changed the list.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OperationCounters {
    pub member: u64,
    pub insert: u64,
    pub delete: u64,
    pub inserted: u64,
    pub deleted: u64,
}

impl OperationCounters {
    /// Operations of every kind.
    pub fn total(&self) -> u64 {
        self.member + self.insert + self.delete
    }

    /// Fold `other` into `self`.
    pub fn merge(&mut self, other: &OperationCounters) {
        self.member += other.member;
        self.insert += other.insert;
        self.delete += other.delete;
        self.inserted += other.inserted;
        self.deleted += other.deleted;
    }
}

////////////////////////////////////////////// Report //////////////////////////////////////////////

/// The outcome of [Workload::run].
#[derive(Clone, Debug)]
pub struct Report {
    /// The policy the lock followed.
    pub policy: Policy,
    /// The number of worker threads.
    pub threads: u64,
    /// Wall-clock seconds for the parallel phase.
    pub elapsed: f64,
    /// Operations summed over every worker.
    pub counters: OperationCounters,
    /// Keys in the list when the workers started.
    pub initial_len: usize,
    /// Keys in the list after every worker joined.
    pub final_len: usize,
}

impl Report {
    /// Operations of every kind.
    pub fn total(&self) -> u64 {
        self.counters.total()
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Elapsed time = {:e} seconds", self.elapsed)?;
        writeln!(f, "Policy = {}", self.policy)?;
        writeln!(f, "Threads = {}", self.threads)?;
        writeln!(f, "Total ops = {}", self.total())?;
        writeln!(f, "member ops = {}", self.counters.member)?;
        writeln!(f, "insert ops = {}", self.counters.insert)?;
        writeln!(f, "delete ops = {}", self.counters.delete)?;
        writeln!(f, "initial size = {}", self.initial_len)?;
        write!(f, "final size = {}", self.final_len)
    }
}

/////////////////////////////////////////////// State //////////////////////////////////////////////

struct State {
    options: WorkloadOptions,
    list: Arc<RwPolicyCell<SortedList>>,
    totals: Mutex<OperationCounters>,
}

impl State {
    fn run(&self, index: u64) {
        let stride = u64::MAX / self.options.threads.saturating_add(1);
        let mut guac = Guacamole::new(self.options.seed.wrapping_add(stride.wrapping_mul(index + 1)));
        let mut key = range_to(self.options.key_space);
        let search_thresh = self.options.search_fraction;
        let insert_thresh = search_thresh + self.options.insert_fraction;
        let mut local = OperationCounters::default();
        for _ in 0..self.options.operations_per_thread() {
            let weight: f64 = any(&mut guac);
            let k = key(&mut guac);
            if weight < search_thresh {
                self.list.read().member(k);
                local.member += 1;
            } else if weight < insert_thresh {
                if self.list.write().insert(k) {
                    local.inserted += 1;
                }
                local.insert += 1;
            } else {
                if self.list.write().delete(k) {
                    local.deleted += 1;
                }
                local.delete += 1;
            }
        }
        MEMBER_OPS.count(local.member);
        INSERT_OPS.count(local.insert);
        DELETE_OPS.count(local.delete);
        self.totals.lock().unwrap().merge(&local);
        WORKER_FINISHED.click();
    }
}

// Insert up to `requested` keys drawn from `next_key`, giving up after twice that many draws.
// Returns the keys inserted and the draws made.
fn seed_list(
    list: &mut SortedList,
    requested: u64,
    mut next_key: impl FnMut() -> u64,
) -> (u64, u64) {
    let mut inserted = 0;
    let mut attempts = 0;
    while inserted < requested && attempts < requested.saturating_mul(2) {
        if list.insert(next_key()) {
            inserted += 1;
        }
        attempts += 1;
    }
    (inserted, attempts)
}

///////////////////////////////////////////// Workload /////////////////////////////////////////////

/// The sorted-list workload: seed the list, then run the workers against it.
pub struct Workload {
    options: WorkloadOptions,
    list: Arc<RwPolicyCell<SortedList>>,
}

impl Workload {
    /// Create a workload with an empty list.  Fails if the options are invalid.
    pub fn new(options: WorkloadOptions) -> Result<Self, Error> {
        options.validate()?;
        let list = Arc::new(RwPolicyCell::new(options.policy, SortedList::new()));
        Ok(Self { options, list })
    }

    pub fn options(&self) -> &WorkloadOptions {
        &self.options
    }

    /// The list the workers operate on.
    pub fn list(&self) -> &RwPolicyCell<SortedList> {
        &self.list
    }

    /// Insert `initial_keys` random keys from a single thread, giving up after twice that many
    /// attempts.  Duplicate draws count as attempts, so a small key space can leave the list
    /// short.  Returns the number of keys inserted.
    pub fn populate(&self) -> u64 {
        POPULATE.click();
        let requested = self.options.initial_keys;
        let mut guac = Guacamole::new(self.options.seed);
        let mut key = range_to(self.options.key_space);
        let mut list = self.list.write();
        let (inserted, attempts) = seed_list(&mut list, requested, || key(&mut guac));
        if inserted < requested {
            POPULATE_SHORTFALL.click();
            clue!(COLLECTOR, INFO, {
                populate_shortfall: {
                    requested: requested,
                    inserted: inserted,
                    attempts: attempts,
                },
            });
        }
        inserted
    }

    /// Run every worker to completion and report the totals.
    pub fn run(&self) -> Result<Report, Error> {
        RUN.click();
        let initial_len = self.list.read().len();
        clue!(COLLECTOR, INFO, {
            workload_start: {
                policy: self.options.policy.to_string(),
                threads: self.options.threads,
                operations: self.options.operations,
                search_fraction: self.options.search_fraction,
                insert_fraction: self.options.insert_fraction,
                initial_len: initial_len as u64,
            },
        });
        let state = Arc::new(State {
            options: self.options.clone(),
            list: Arc::clone(&self.list),
            totals: Mutex::new(OperationCounters::default()),
        });
        let gate = Arc::new(StartGate::default());
        let mut threads: Vec<std::thread::JoinHandle<()>> = Vec::new();
        let capacity = usize::try_from(self.options.threads)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::OutOfMemory, err))?;
        threads
            .try_reserve_exact(capacity)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::OutOfMemory, err))?;
        for index in 0..self.options.threads {
            let s = Arc::clone(&state);
            let g = Arc::clone(&gate);
            let spawned = std::thread::Builder::new()
                .name(format!("rwpolicy-worker-{}", index))
                .spawn(move || {
                    if g.wait() {
                        s.run(index);
                    }
                });
            match spawned {
                Ok(thread) => threads.push(thread),
                Err(err) => {
                    gate.abort();
                    for thread in threads.into_iter() {
                        let _ = thread.join();
                    }
                    return Err(err.into());
                }
            }
        }
        let start = Instant::now();
        gate.open();
        let mut panicked = false;
        for thread in threads.into_iter() {
            panicked |= thread.join().is_err();
        }
        let elapsed = start.elapsed().as_secs_f64();
        if panicked {
            return Err(Error::worker_panicked());
        }
        let counters = *state.totals.lock().unwrap();
        let final_len = self.list.read().len();
        clue!(COLLECTOR, INFO, {
            workload_finish: {
                elapsed: elapsed,
                member: counters.member,
                insert: counters.insert,
                delete: counters.delete,
                final_len: final_len as u64,
            },
        });
        Ok(Report {
            policy: self.options.policy,
            threads: self.options.threads,
            elapsed,
            counters,
            initial_len,
            final_len,
        })
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> WorkloadOptions {
        WorkloadOptions {
            threads: 2,
            policy: Policy::ReaderPreference,
            initial_keys: 10,
            operations: 100,
            search_fraction: 0.5,
            insert_fraction: 0.25,
            key_space: 1_000,
            seed: 7,
        }
    }

    #[test]
    fn defaults_validate() {
        assert!(WorkloadOptions::default().validate().is_ok());
        assert_eq!(WorkloadOptions::default(), WorkloadOptions::default());
    }

    #[test]
    fn zero_threads() {
        let opts = WorkloadOptions {
            threads: 0,
            ..options()
        };
        assert!(matches!(opts.validate(), Err(Error::InvalidThreadCount)));
        assert!(matches!(Workload::new(opts), Err(Error::InvalidThreadCount)));
    }

    #[test]
    fn zero_operations() {
        let opts = WorkloadOptions {
            operations: 0,
            ..options()
        };
        assert!(matches!(opts.validate(), Err(Error::InvalidOperationCount)));
    }

    #[test]
    fn zero_key_space() {
        let opts = WorkloadOptions {
            key_space: 0,
            ..options()
        };
        assert!(matches!(opts.validate(), Err(Error::InvalidKeySpace)));
    }

    #[test]
    fn fraction_out_of_range() {
        let opts = WorkloadOptions {
            search_fraction: -0.1,
            ..options()
        };
        assert!(matches!(
            opts.validate(),
            Err(Error::InvalidFraction {
                what: "search fraction",
                ..
            })
        ));
        let opts = WorkloadOptions {
            insert_fraction: 1.1,
            ..options()
        };
        assert!(matches!(
            opts.validate(),
            Err(Error::InvalidFraction {
                what: "insert fraction",
                ..
            })
        ));
        let opts = WorkloadOptions {
            insert_fraction: f64::NAN,
            ..options()
        };
        assert!(matches!(opts.validate(), Err(Error::InvalidFraction { .. })));
    }

    #[test]
    fn fractions_sum_past_one() {
        let opts = WorkloadOptions {
            search_fraction: 0.7,
            insert_fraction: 0.4,
            ..options()
        };
        assert!(matches!(
            opts.validate(),
            Err(Error::FractionsExceedOne { .. })
        ));
        let opts = WorkloadOptions {
            search_fraction: 0.5,
            insert_fraction: 0.5,
            ..options()
        };
        assert!(opts.validate().is_ok());
        assert_eq!(0.0, opts.delete_fraction());
    }

    #[test]
    fn operations_per_thread_drops_remainder() {
        let opts = WorkloadOptions {
            threads: 3,
            operations: 1_000,
            ..options()
        };
        assert_eq!(333, opts.operations_per_thread());
    }

    #[test]
    fn merge_counters() {
        let mut lhs = OperationCounters {
            member: 1,
            insert: 2,
            delete: 3,
            inserted: 1,
            deleted: 0,
        };
        lhs.merge(&OperationCounters {
            member: 10,
            insert: 20,
            delete: 30,
            inserted: 5,
            deleted: 6,
        });
        assert_eq!(
            OperationCounters {
                member: 11,
                insert: 22,
                delete: 33,
                inserted: 6,
                deleted: 6,
            },
            lhs
        );
        assert_eq!(66, lhs.total());
    }

    #[test]
    fn populate_is_deterministic() {
        let lhs = Workload::new(options()).unwrap();
        let rhs = Workload::new(options()).unwrap();
        assert_eq!(10, lhs.populate());
        assert_eq!(10, rhs.populate());
        let lhs: Vec<u64> = lhs.list().read().iter().collect();
        let rhs: Vec<u64> = rhs.list().read().iter().collect();
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn seeding_stops_once_full() {
        let mut list = SortedList::new();
        let mut next = 0;
        let seeded = seed_list(&mut list, 5, || {
            next += 1;
            next
        });
        assert_eq!((5, 5), seeded);
        assert_eq!(vec![1, 2, 3, 4, 5], list.iter().collect::<Vec<_>>());
    }

    #[test]
    fn seeding_gives_up_after_twice_the_request() {
        let mut list = SortedList::new();
        let mut draws = 0;
        let seeded = seed_list(&mut list, 5, || {
            draws += 1;
            0
        });
        assert_eq!((1, 10), seeded);
        assert_eq!(10, draws);
    }

    #[test]
    fn seeding_counts_duplicate_draws() {
        // Each key is drawn three times, so six draws yield two keys and a seventh would be needed
        // for the third.
        let mut list = SortedList::new();
        let mut draws = 0u64;
        let seeded = seed_list(&mut list, 3, || {
            draws += 1;
            (draws - 1) / 3
        });
        assert_eq!((2, 6), seeded);
        assert_eq!(vec![0, 1], list.iter().collect::<Vec<_>>());
    }

    #[test]
    fn too_many_threads_is_a_spawn_error() {
        let workload = Workload::new(WorkloadOptions {
            threads: u64::MAX,
            operations: 1,
            initial_keys: 0,
            ..options()
        })
        .unwrap();
        assert!(matches!(workload.run(), Err(Error::Spawn(_))));
        assert!(workload.list().lock().snapshot().is_idle());
    }

    #[test]
    fn populate_gives_up() {
        let workload = Workload::new(WorkloadOptions {
            initial_keys: 20,
            key_space: 10,
            ..options()
        })
        .unwrap();
        let inserted = workload.populate();
        assert!(inserted <= 10);
        assert_eq!(inserted as usize, workload.list().read().len());
    }

    #[test]
    fn report_display() {
        let report = Report {
            policy: Policy::WriterPreference,
            threads: 4,
            elapsed: 1.5,
            counters: OperationCounters {
                member: 500,
                insert: 300,
                delete: 200,
                inserted: 0,
                deleted: 0,
            },
            initial_len: 100,
            final_len: 100,
        };
        let display = report.to_string();
        assert!(display.starts_with("Elapsed time = 1.5e0 seconds\n"));
        assert!(display.contains("Total ops = 1000\n"));
        assert!(display.contains("member ops = 500\n"));
    }
}
