//! [RwPolicyLock] is a reader-writer lock built as a monitor over a [Mutex] and two [Condvar]s.
//! The lock does not guard any data of its own; it admits threads to a critical section in one of
//! two modes according to a [Policy] fixed at construction:
//!
//! - [Policy::ReaderPreference] admits a reader whenever no writer is active.  Writers wait for
//!   the section to drain and may starve if readers keep arriving.
//! - [Policy::WriterPreference] admits a reader only when no writer is active or waiting.  A
//!   writer that registers as waiting is admitted before any reader that arrives after it.
//!
//! Threads of the same class are woken in whatever order the condition variable chooses.  There is
//! no FIFO guarantee among waiting writers (or readers), only the class-level preference above.
//!
//! See [crate::RwPolicyCell] for the variant that owns the data it protects.

use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Condvar, Mutex, MutexGuard};

use biometrics::Counter;

use crate::Error;

//////////////////////////////////////////// biometrics ////////////////////////////////////////////

static NEW_LOCK: Counter = Counter::new("rwpolicy.lock.new");
static ACQUIRE_READ: Counter = Counter::new("rwpolicy.lock.acquire_read");
static ACQUIRE_READ_WAITED: Counter = Counter::new("rwpolicy.lock.acquire_read_waited");
static ACQUIRE_WRITE: Counter = Counter::new("rwpolicy.lock.acquire_write");
static ACQUIRE_WRITE_WAITED: Counter = Counter::new("rwpolicy.lock.acquire_write_waited");
static RELEASE_READ: Counter = Counter::new("rwpolicy.lock.release_read");
static RELEASE_WRITE: Counter = Counter::new("rwpolicy.lock.release_write");
static WAKE_READERS: Counter = Counter::new("rwpolicy.lock.wake_readers");
static WAKE_WRITER: Counter = Counter::new("rwpolicy.lock.wake_writer");

/// Register biometrics for the lock.
pub fn register_biometrics(collector: &biometrics::Collector) {
    collector.register_counter(&NEW_LOCK);
    collector.register_counter(&ACQUIRE_READ);
    collector.register_counter(&ACQUIRE_READ_WAITED);
    collector.register_counter(&ACQUIRE_WRITE);
    collector.register_counter(&ACQUIRE_WRITE_WAITED);
    collector.register_counter(&RELEASE_READ);
    collector.register_counter(&RELEASE_WRITE);
    collector.register_counter(&WAKE_READERS);
    collector.register_counter(&WAKE_WRITER);
}

////////////////////////////////////////////// Policy //////////////////////////////////////////////

/// The admission policy of a lock.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Policy {
    /// Waiting readers are never blocked just because a writer is waiting.
    ReaderPreference,
    /// A waiting writer blocks every reader that arrives after it.
    #[default]
    WriterPreference,
}

impl Display for Policy {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Policy::ReaderPreference => write!(f, "reader"),
            Policy::WriterPreference => write!(f, "writer"),
        }
    }
}

impl FromStr for Policy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reader" | "read" => Ok(Policy::ReaderPreference),
            "writer" | "write" => Ok(Policy::WriterPreference),
            _ => Err(Error::UnknownPolicy(s.to_string())),
        }
    }
}

///////////////////////////////////////////// LockState ////////////////////////////////////////////

/// The bookkeeping of a lock.  Every field is only ever changed with the lock's internal mutex
/// held; [RwPolicyLock::snapshot] returns a consistent copy.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LockState {
    /// Readers inside the critical section.
    pub active_readers: u64,
    /// Readers blocked on admission.
    pub waiting_readers: u64,
    /// Writers inside the critical section.  Zero or one.
    pub active_writers: u64,
    /// Writers blocked on admission.
    pub waiting_writers: u64,
}

impl LockState {
    /// True iff no thread holds the lock in either mode.
    pub fn is_idle(&self) -> bool {
        self.active_readers == 0 && self.active_writers == 0
    }

    /// Panics unless the mutual exclusion invariants hold.
    pub fn check(&self) {
        assert!(
            self.active_writers <= 1,
            "more than one writer admitted: {:?}",
            self
        );
        assert!(
            self.active_writers == 0 || self.active_readers == 0,
            "readers and a writer admitted together: {:?}",
            self
        );
    }
}

/////////////////////////////////////////// RwPolicyLock ///////////////////////////////////////////

/// A reader-writer lock with a configurable admission [Policy].
///
/// The raw protocol is [RwPolicyLock::acquire_read], [RwPolicyLock::acquire_write] and
/// [RwPolicyLock::release].  Prefer [RwPolicyLock::read] and [RwPolicyLock::write], which pair the
/// release with the guard's drop.
#[derive(Debug)]
pub struct RwPolicyLock {
    policy: Policy,
    state: Mutex<LockState>,
    readers_ok: Condvar,
    writers_ok: Condvar,
}

impl RwPolicyLock {
    /// Create a new, idle lock.
    pub fn new(policy: Policy) -> Self {
        NEW_LOCK.click();
        Self {
            policy,
            state: Mutex::new(LockState::default()),
            readers_ok: Condvar::new(),
            writers_ok: Condvar::new(),
        }
    }

    /// The policy this lock was constructed with.
    pub fn policy(&self) -> Policy {
        self.policy
    }

    /// Block until the policy admits a reader, then enter the critical section in shared mode.
    pub fn acquire_read(&self) {
        let mut state = self.state.lock().unwrap();
        state = self.assert_invariants(state);
        state.waiting_readers += 1;
        if self.reader_must_wait(&state) {
            ACQUIRE_READ_WAITED.click();
        }
        while self.reader_must_wait(&state) {
            state = self.readers_ok.wait(state).unwrap();
        }
        state.waiting_readers -= 1;
        state.active_readers += 1;
        let _state = self.assert_invariants(state);
        ACQUIRE_READ.click();
    }

    /// Block until the critical section is empty, then enter it in exclusive mode.
    pub fn acquire_write(&self) {
        let mut state = self.state.lock().unwrap();
        state = self.assert_invariants(state);
        state.waiting_writers += 1;
        if Self::writer_must_wait(&state) {
            ACQUIRE_WRITE_WAITED.click();
        }
        while Self::writer_must_wait(&state) {
            state = self.writers_ok.wait(state).unwrap();
        }
        state.waiting_writers -= 1;
        state.active_writers += 1;
        let _state = self.assert_invariants(state);
        ACQUIRE_WRITE.click();
    }

    /// Leave the critical section.  The mode is the one the calling thread acquired: if a writer
    /// is active it must be the caller, otherwise the caller is one of the active readers.  When
    /// the section becomes empty, wake whichever class the policy says goes next.
    ///
    /// # Panics
    ///
    /// If the lock is not held.
    pub fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state = self.assert_invariants(state);
        if state.active_writers > 0 {
            state.active_writers -= 1;
            RELEASE_WRITE.click();
        } else if state.active_readers > 0 {
            state.active_readers -= 1;
            RELEASE_READ.click();
        } else {
            panic!("release called on a lock that is not held");
        }
        if state.is_idle() {
            self.wake_next(&state);
        }
        let _state = self.assert_invariants(state);
    }

    /// Acquire the lock in shared mode for the lifetime of the returned guard.
    pub fn read(&self) -> ReadGuard<'_> {
        self.acquire_read();
        ReadGuard { lock: self }
    }

    /// Acquire the lock in exclusive mode for the lifetime of the returned guard.
    pub fn write(&self) -> WriteGuard<'_> {
        self.acquire_write();
        WriteGuard { lock: self }
    }

    /// A consistent copy of the lock's counters.
    pub fn snapshot(&self) -> LockState {
        let state = self.state.lock().unwrap();
        *state
    }

    fn reader_must_wait(&self, state: &LockState) -> bool {
        match self.policy {
            Policy::ReaderPreference => state.active_writers > 0,
            Policy::WriterPreference => state.active_writers > 0 || state.waiting_writers > 0,
        }
    }

    fn writer_must_wait(state: &LockState) -> bool {
        state.active_readers > 0 || state.active_writers > 0
    }

    // Call with the lock held and the critical section empty.
    fn wake_next(&self, state: &LockState) {
        match self.policy {
            Policy::ReaderPreference => {
                if state.waiting_readers > 0 {
                    WAKE_READERS.click();
                    self.readers_ok.notify_all();
                } else if state.waiting_writers > 0 {
                    WAKE_WRITER.click();
                    self.writers_ok.notify_one();
                }
            }
            Policy::WriterPreference => {
                if state.waiting_writers > 0 {
                    WAKE_WRITER.click();
                    self.writers_ok.notify_one();
                } else if state.waiting_readers > 0 {
                    WAKE_READERS.click();
                    self.readers_ok.notify_all();
                }
            }
        }
    }

    // Call with the lock held.
    fn assert_invariants<'a>(&self, state: MutexGuard<'a, LockState>) -> MutexGuard<'a, LockState> {
        state.check();
        state
    }
}

////////////////////////////////////////////// guards //////////////////////////////////////////////

/// Shared access to an [RwPolicyLock].  Releases on drop.
#[derive(Debug)]
pub struct ReadGuard<'a> {
    lock: &'a RwPolicyLock,
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Exclusive access to an [RwPolicyLock].  Releases on drop.
#[derive(Debug)]
pub struct WriteGuard<'a> {
    lock: &'a RwPolicyLock,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
