//! The starvation experiment.  Dedicated reader threads and dedicated writer threads take turns at
//! one [RwPolicyCell] guarding a counter.  Each thread runs a fixed number of iterations, holding
//! the lock for a simulated amount of work and then pausing for the same amount before trying
//! again.  The report splits time spent holding the lock and time spent waiting for admission by
//! class, which is where either policy's starvation shows up.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use biometrics::Counter;
use indicio::{clue, INFO};

use crate::gate::StartGate;
use crate::{Error, Policy, RwPolicyCell, COLLECTOR};

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static RUN: Counter = Counter::new("rwpolicy.starvation.run");
static READS: Counter = Counter::new("rwpolicy.starvation.reads");
static WRITES: Counter = Counter::new("rwpolicy.starvation.writes");

/// Register biometrics for the starvation experiment.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&RUN);
    collector.register_counter(&READS);
    collector.register_counter(&WRITES);
}

///////////////////////////////////////// StarvationOptions ////////////////////////////////////////

/// Options for the starvation experiment.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "command_line", derive(arrrg_derive::CommandLine))]
pub struct StarvationOptions {
    #[cfg_attr(feature = "command_line", arrrg(optional, "Number of reader threads."))]
    pub readers: u64,
    #[cfg_attr(feature = "command_line", arrrg(optional, "Number of writer threads."))]
    pub writers: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Lock acquisitions per thread.")
    )]
    pub iterations: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Microseconds a reader holds the lock, and then pauses.")
    )]
    pub read_hold_micros: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Microseconds a writer holds the lock, and then pauses.")
    )]
    pub write_hold_micros: u64,
    #[cfg_attr(
        feature = "command_line",
        arrrg(optional, "Lock policy: \"reader\" or \"writer\".")
    )]
    pub policy: Policy,
}

impl StarvationOptions {
    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<(), Error> {
        if self.readers == 0 && self.writers == 0 {
            return Err(Error::InvalidThreadCount);
        }
        if self.iterations == 0 {
            return Err(Error::InvalidOperationCount);
        }
        Ok(())
    }
}

impl Default for StarvationOptions {
    fn default() -> Self {
        Self {
            readers: 4,
            writers: 2,
            iterations: 5,
            read_hold_micros: 10_000,
            write_hold_micros: 15_000,
            policy: Policy::ReaderPreference,
        }
    }
}

///////////////////////////////////////// StarvationReport /////////////////////////////////////////

/// The outcome of [Starvation::run].
#[derive(Clone, Debug, Default)]
pub struct StarvationReport {
    pub policy: Policy,
    /// Read acquisitions across all readers.
    pub reads: u64,
    /// Write acquisitions across all writers.
    pub writes: u64,
    /// The counter after every writer incremented it once per acquisition.
    pub final_value: u64,
    /// Seconds readers spent inside the critical section.
    pub reader_hold_secs: f64,
    /// Seconds writers spent inside the critical section.
    pub writer_hold_secs: f64,
    /// Seconds readers spent waiting for admission.
    pub reader_wait_secs: f64,
    /// Seconds writers spent waiting for admission.
    pub writer_wait_secs: f64,
    /// Wall-clock seconds for the whole run.
    pub elapsed: f64,
}

impl StarvationReport {
    /// Share of lock-holding time that went to readers, in [0, 1].
    pub fn reader_share(&self) -> f64 {
        share(self.reader_hold_secs, self.writer_hold_secs)
    }

    /// Share of lock-holding time that went to writers, in [0, 1].
    pub fn writer_share(&self) -> f64 {
        share(self.writer_hold_secs, self.reader_hold_secs)
    }

    /// Mean seconds a reader waited per acquisition.
    pub fn average_reader_wait(&self) -> f64 {
        average(self.reader_wait_secs, self.reads)
    }

    /// Mean seconds a writer waited per acquisition.
    pub fn average_writer_wait(&self) -> f64 {
        average(self.writer_wait_secs, self.writes)
    }

    fn merge(&mut self, other: &StarvationReport) {
        self.reads += other.reads;
        self.writes += other.writes;
        self.reader_hold_secs += other.reader_hold_secs;
        self.writer_hold_secs += other.writer_hold_secs;
        self.reader_wait_secs += other.reader_wait_secs;
        self.writer_wait_secs += other.writer_wait_secs;
    }
}

fn share(part: f64, rest: f64) -> f64 {
    if part + rest > 0.0 {
        part / (part + rest)
    } else {
        0.0
    }
}

fn average(total: f64, count: u64) -> f64 {
    if count > 0 {
        total / count as f64
    } else {
        0.0
    }
}

impl Display for StarvationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        writeln!(f, "Policy: {}", self.policy)?;
        writeln!(
            f,
            "Total reader time: {:.2} seconds ({:.2}%)",
            self.reader_hold_secs,
            self.reader_share() * 100.0
        )?;
        writeln!(
            f,
            "Total writer time: {:.2} seconds ({:.2}%)",
            self.writer_hold_secs,
            self.writer_share() * 100.0
        )?;
        writeln!(
            f,
            "Average reader wait time: {:.5} seconds",
            self.average_reader_wait()
        )?;
        write!(
            f,
            "Average writer wait time: {:.5} seconds",
            self.average_writer_wait()
        )
    }
}

//////////////////////////////////////////// Starvation ////////////////////////////////////////////

enum Role {
    Reader,
    Writer,
}

struct State {
    options: StarvationOptions,
    data: RwPolicyCell<u64>,
    totals: Mutex<StarvationReport>,
}

impl State {
    fn run(&self, role: Role) {
        let mut local = StarvationReport::default();
        match role {
            Role::Reader => {
                let hold = Duration::from_micros(self.options.read_hold_micros);
                for _ in 0..self.options.iterations {
                    let wait_start = Instant::now();
                    let data = self.data.read();
                    local.reader_wait_secs += wait_start.elapsed().as_secs_f64();
                    let hold_start = Instant::now();
                    std::hint::black_box(*data);
                    std::thread::sleep(hold);
                    local.reader_hold_secs += hold_start.elapsed().as_secs_f64();
                    drop(data);
                    local.reads += 1;
                    std::thread::sleep(hold);
                }
                READS.count(local.reads);
            }
            Role::Writer => {
                let hold = Duration::from_micros(self.options.write_hold_micros);
                for _ in 0..self.options.iterations {
                    let wait_start = Instant::now();
                    let mut data = self.data.write();
                    local.writer_wait_secs += wait_start.elapsed().as_secs_f64();
                    let hold_start = Instant::now();
                    *data += 1;
                    std::thread::sleep(hold);
                    local.writer_hold_secs += hold_start.elapsed().as_secs_f64();
                    drop(data);
                    local.writes += 1;
                    std::thread::sleep(hold);
                }
                WRITES.count(local.writes);
            }
        }
        self.totals.lock().unwrap().merge(&local);
    }
}

/// Readers and writers contending for one lock.
pub struct Starvation {
    options: StarvationOptions,
}

impl Starvation {
    /// Create the experiment.  Fails if the options are invalid.
    pub fn new(options: StarvationOptions) -> Result<Self, Error> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Run every reader and writer to completion.
    pub fn run(&self) -> Result<StarvationReport, Error> {
        RUN.click();
        clue!(COLLECTOR, INFO, {
            starvation_start: {
                policy: self.options.policy.to_string(),
                readers: self.options.readers,
                writers: self.options.writers,
                iterations: self.options.iterations,
            },
        });
        let state = Arc::new(State {
            options: self.options.clone(),
            data: RwPolicyCell::new(self.options.policy, 0),
            totals: Mutex::new(StarvationReport::default()),
        });
        let gate = Arc::new(StartGate::default());
        let roles = (0..self.options.readers)
            .map(|idx| (format!("rwpolicy-reader-{}", idx), Role::Reader))
            .chain(
                (0..self.options.writers)
                    .map(|idx| (format!("rwpolicy-writer-{}", idx), Role::Writer)),
            );
        let mut threads = Vec::new();
        for (name, role) in roles {
            let s = Arc::clone(&state);
            let g = Arc::clone(&gate);
            let spawned = std::thread::Builder::new().name(name).spawn(move || {
                if g.wait() {
                    s.run(role);
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
        let mut report = state.totals.lock().unwrap().clone();
        report.policy = self.options.policy;
        report.final_value = *state.data.read();
        report.elapsed = elapsed;
        clue!(COLLECTOR, INFO, {
            starvation_finish: {
                elapsed: elapsed,
                reads: report.reads,
                writes: report.writes,
                average_reader_wait: report.average_reader_wait(),
                average_writer_wait: report.average_writer_wait(),
            },
        });
        Ok(report)
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
