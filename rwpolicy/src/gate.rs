use std::sync::{Condvar, Mutex};

///////////////////////////////////////////// StartGate ////////////////////////////////////////////

#[derive(Debug, Default)]
struct GateState {
    open: bool,
    aborted: bool,
}

/// Holds worker threads until every one of them exists, so that timing covers only the parallel
/// phase.  If spawning fails part way, the gate opens as aborted and the workers that did start
/// return without doing any work.
#[derive(Debug, Default)]
pub(crate) struct StartGate {
    state: Mutex<GateState>,
    cnd: Condvar,
}

impl StartGate {
    /// Block until the gate opens.  Returns true iff the run should proceed.
    pub(crate) fn wait(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        while !state.open {
            state = self.cnd.wait(state).unwrap();
        }
        !state.aborted
    }

    pub(crate) fn open(&self) {
        self.release(false);
    }

    pub(crate) fn abort(&self) {
        self.release(true);
    }

    fn release(&self, aborted: bool) {
        let mut state = self.state.lock().unwrap();
        state.open = true;
        state.aborted = aborted;
        self.cnd.notify_all();
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////
