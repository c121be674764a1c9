//! Common test utilities for integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use taskhal_core::{Deadline, Result};
use taskhal_executor::prelude::*;

/// Upper bound for anything a test waits on.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Create a device with the test configuration.
pub fn test_device() -> TaskDevice {
    TaskDevice::new(DeviceConfig::for_testing()).expect("device")
}

/// Deadline [`TEST_TIMEOUT`] from now.
pub fn test_deadline() -> Deadline {
    Deadline::from_timeout(TEST_TIMEOUT)
}

/// Block until every `(semaphore, value)` pair is reached.
pub fn wait_all(device: &TaskDevice, pairs: &[(&Arc<TimelineSemaphore>, u64)]) -> Result<()> {
    let mut list = SemaphoreList::new();
    for &(semaphore, value) in pairs {
        list.push(semaphore, value);
    }
    device.wait_semaphores(WaitMode::All, &list, test_deadline())
}

/// Shared, ordered record of kernel invocations.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<u32>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: u32) {
        self.entries.lock().push(value);
    }

    pub fn entries(&self) -> Vec<u32> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Position of the first entry equal to `value`.
    pub fn position(&self, value: u32) -> Option<usize> {
        self.entries.lock().iter().position(|&v| v == value)
    }
}

/// Kernel library used across tests.
///
/// - 0 `mark`: appends push constant 0 to the journal once per workgroup
/// - 1 `fail`: returns an error
/// - 2 `panic`: panics
pub fn journal_kernels(journal: &Journal) -> Arc<dyn LocalExecutable> {
    let journal = journal.clone();
    Arc::new(
        KernelLibrary::new("journal")
            .with_entry_point("mark", [1, 1, 1], move |call| {
                journal.push(call.push_constant(0).unwrap_or(0));
                Ok(())
            })
            .with_entry_point("fail", [1, 1, 1], |_| {
                anyhow::bail!("out-of-bounds access detected")
            })
            .with_entry_point("panic", [1, 1, 1], |_| panic!("kernel panicked")),
    )
}

pub const MARK: usize = 0;
pub const FAIL: usize = 1;
pub const PANIC: usize = 2;

/// Record a single-workgroup `mark` dispatch writing `value`.
pub fn mark(cb: &CommandBuffer, kernels: &Arc<dyn LocalExecutable>, value: u32) {
    cb.dispatch(Arc::clone(kernels), MARK, [1, 1, 1], &[value], &[])
        .expect("record dispatch");
}

/// Record a full execution barrier.
pub fn barrier(cb: &CommandBuffer) {
    cb.execution_barrier(ExecutionStage::Dispatch, ExecutionStage::Dispatch)
        .expect("record barrier");
}

/// Kernel that blocks until `parties` workgroups are running at once.
///
/// Fails instead of hanging if they never overlap.
pub fn rendezvous_kernel(parties: usize) -> Arc<dyn LocalExecutable> {
    let arrived = Arc::new(AtomicUsize::new(0));
    Arc::new(
        KernelLibrary::new("rendezvous").with_entry_point("meet", [1, 1, 1], move |_| {
            arrived.fetch_add(1, Ordering::SeqCst);
            let started = Instant::now();
            while arrived.load(Ordering::SeqCst) < parties {
                if started.elapsed() > TEST_TIMEOUT {
                    anyhow::bail!("workgroups never ran concurrently");
                }
                std::thread::yield_now();
            }
            Ok(())
        }),
    )
}
