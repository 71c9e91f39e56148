//! Doubles for process-level collaborators: signal delivery and exit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::lifecycle::{ProcessExit, ShutdownError, ShutdownSignal};

#[derive(Default)]
struct SignalQueue {
    pending: usize,
    closed: bool,
}

/// Signal source driven by the test.
///
/// Every [`deliver`](Self::deliver) queues one signal; [`close`](Self::close)
/// releases waiters with [`ShutdownError::Closed`] once the queue drains.
#[derive(Clone, Default)]
pub struct TestShutdownSignal {
    inner: Arc<(Mutex<SignalQueue>, Condvar)>,
}

impl TestShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deliver(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().expect("signal mutex poisoned").pending += 1;
        cvar.notify_all();
    }

    pub fn close(&self) {
        let (lock, cvar) = &*self.inner;
        lock.lock().expect("signal mutex poisoned").closed = true;
        cvar.notify_all();
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let (lock, cvar) = &*self.inner;
        let mut queue = lock.lock().expect("signal mutex poisoned");
        while queue.pending == 0 && !queue.closed {
            queue = cvar.wait(queue).expect("signal mutex poisoned during wait");
        }
        if queue.pending > 0 {
            queue.pending -= 1;
            return Ok(());
        }
        Err(ShutdownError::Closed)
    }
}

/// Exit hook that counts invocations instead of ending the test process.
#[derive(Clone, Default)]
pub struct TestExit {
    calls: Arc<AtomicUsize>,
}

impl TestExit {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ProcessExit for TestExit {
    fn exit_success(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}
