//! Queue bookkeeping, pool reuse and device observability.

mod common;

use common::*;
use std::sync::Arc;
use taskhal_core::logging::{LogCategory, LogCollector, LogLevel};
use taskhal_core::{Arena, BlockPool, Deadline, EventPool, HalError, PoolConfig};
use taskhal_executor::prelude::*;

#[test]
fn wait_idle_tracks_in_flight_fragments() {
    let device = test_device();
    let gate = device.create_semaphore(0);
    let queue = device.queue(1).unwrap();

    queue
        .submit(SubmissionBatch::new().wait(&gate, 1))
        .unwrap();
    assert_eq!(queue.in_flight(), 1);
    let err = device.wait_idle(Deadline::Immediate).unwrap_err();
    assert!(matches!(err, HalError::QueueBusy { in_flight: 1, .. }));

    gate.signal(1).unwrap();
    device.wait_idle(test_deadline()).unwrap();
    assert_eq!(queue.in_flight(), 0);
}

#[test]
fn retired_signals_elide_later_waits() {
    let device = test_device();
    let journal = Journal::new();
    let kernels = journal_kernels(&journal);
    let semaphore = device.create_semaphore(0);
    let queue = device.queue(0).unwrap();

    let first = device.create_command_buffer(CommandBufferMode::OneShot);
    mark(&first, &kernels, 1);
    first.end().unwrap();
    queue
        .submit(
            SubmissionBatch::new()
                .command_buffer(&first)
                .signal(&semaphore, 1),
        )
        .unwrap()
        .wait(test_deadline())
        .unwrap();
    assert!(queue.state().has_reached(semaphore.id(), 1));

    // Same queue: the wait is known reached, so no wait root is issued.
    let second = device.create_command_buffer(CommandBufferMode::OneShot);
    mark(&second, &kernels, 2);
    second.end().unwrap();
    let handle = queue
        .submit(
            SubmissionBatch::new()
                .wait(&semaphore, 1)
                .command_buffer(&second),
        )
        .unwrap();
    assert_eq!(handle.task_count(), 2);

    // Another queue never saw the signal retire and registers a wait that
    // is satisfied at once.
    let third = device.create_command_buffer(CommandBufferMode::OneShot);
    mark(&third, &kernels, 3);
    third.end().unwrap();
    let other = device
        .queue_submit(
            1,
            SubmissionBatch::new()
                .wait(&semaphore, 1)
                .command_buffer(&third),
        )
        .unwrap();
    assert_eq!(other.task_count(), 3);

    handle.wait(test_deadline()).unwrap();
    other.wait(test_deadline()).unwrap();
    let mut entries = journal.entries();
    entries.sort_unstable();
    assert_eq!(entries, vec![1, 2, 3]);
}

#[test]
fn arenas_are_recycled_between_fragments() {
    // A pool too small to hold every submission at once.
    let config = DeviceConfig::for_testing().with_pools(
        PoolConfig::for_testing()
            .with_block_size(256)
            .with_max_blocks(2),
    );
    let device = TaskDevice::new(config).unwrap();
    let journal = Journal::new();
    let kernels = journal_kernels(&journal);

    for value in 0..16 {
        let cb = device.create_command_buffer(CommandBufferMode::OneShot);
        mark(&cb, &kernels, value);
        cb.end().unwrap();
        device
            .queue_submit(0, SubmissionBatch::new().command_buffer(&cb))
            .unwrap()
            .wait(test_deadline())
            .unwrap();
        device.wait_idle(test_deadline()).unwrap();
        assert_eq!(device.block_pool().in_use(), 0);
    }
    assert_eq!(journal.len(), 16);
}

#[test]
fn block_exhaustion_is_retriable() {
    let config = DeviceConfig::for_testing().with_pools(
        PoolConfig::for_testing()
            .with_block_size(256)
            .with_max_blocks(1),
    );
    let device = TaskDevice::new(config).unwrap();
    let journal = Journal::new();
    let kernels = journal_kernels(&journal);
    let gate = device.create_semaphore(0);

    let parked = device.create_command_buffer(CommandBufferMode::OneShot);
    mark(&parked, &kernels, 1);
    parked.end().unwrap();
    device
        .queue_submit(
            0,
            SubmissionBatch::new().wait(&gate, 1).command_buffer(&parked),
        )
        .unwrap();

    let next = device.create_command_buffer(CommandBufferMode::OneShot);
    mark(&next, &kernels, 2);
    next.end().unwrap();
    let batch = SubmissionBatch::new().command_buffer(&next);
    let err = device.queue_submit(0, batch.clone()).unwrap_err();
    assert!(err.is_retriable(), "unexpected error: {}", err);
    // Nothing was issued, so the buffer can still be submitted.
    assert!(!next.is_issued());

    gate.signal(1).unwrap();
    device.wait_idle(test_deadline()).unwrap();
    device
        .queue_submit(0, batch)
        .unwrap()
        .wait(test_deadline())
        .unwrap();
    assert_eq!(journal.len(), 2);
}

#[test]
fn wait_records_that_do_not_fit_are_retriable() {
    let config = DeviceConfig::for_testing().with_pools(
        PoolConfig::for_testing()
            .with_block_size(64)
            .with_max_blocks(1),
    );
    let device = TaskDevice::new(config).unwrap();
    let gates: Vec<_> = (0..5).map(|_| device.create_semaphore(0)).collect();
    let out = device.create_semaphore(0);

    let batch = gates
        .iter()
        .fold(SubmissionBatch::new(), |batch, gate| batch.wait(gate, 1))
        .signal(&out, 1);
    let err = device.queue_submit(0, batch).unwrap_err();
    assert!(err.is_retriable(), "unexpected error: {}", err);
    assert_eq!(device.block_pool().in_use(), 0);
    assert_eq!(out.query().unwrap(), 0);

    // Four records fit in one block.
    let batch = gates[..4]
        .iter()
        .fold(SubmissionBatch::new(), |batch, gate| batch.wait(gate, 1))
        .signal(&out, 1);
    let handle = device.queue_submit(0, batch).unwrap();
    for gate in &gates[..4] {
        gate.signal(1).unwrap();
    }
    handle.wait(test_deadline()).unwrap();
    assert_eq!(out.query().unwrap(), 1);
}

#[test]
fn release_succeeds_on_saturated_pools() {
    let events = EventPool::new(2);
    let first = events.acquire().unwrap();
    let second = events.acquire().unwrap();
    assert!(events.acquire().unwrap_err().is_retriable());
    events.release(first);
    second.release();
    assert_eq!(events.available(), 2);

    let pool = Arc::new(BlockPool::new(64, 1));
    let mut busy = Arena::new(Arc::clone(&pool));
    busy.allocate(8).unwrap();
    let mut idle = Arena::new(Arc::clone(&pool));
    idle.reset();
    idle.reset();
    assert_eq!(pool.in_use(), 1);
    busy.reset();
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn stale_arena_pointers_are_rejected() {
    let pool = Arc::new(BlockPool::new(64, 2));
    let mut arena = Arena::new(Arc::clone(&pool));
    let ptr = arena.write_u32s(&[1, 2]).unwrap();
    arena.reset();
    let _reused = arena.write_u32s(&[3, 4]).unwrap();
    let err = arena.read_u32s(ptr).unwrap_err();
    assert_eq!(err.code(), "E004");
}

#[test]
fn device_records_logs_and_metrics() {
    let device = test_device();
    let journal = Journal::new();
    let kernels = journal_kernels(&journal);

    let cb = device.create_command_buffer(CommandBufferMode::OneShot);
    cb.dispatch(Arc::clone(&kernels), FAIL, [1, 1, 1], &[], &[])
        .unwrap();
    cb.end().unwrap();
    let handle = device
        .queue_submit(0, SubmissionBatch::new().command_buffer(&cb))
        .unwrap();
    assert!(handle.wait(test_deadline()).is_err());
    device.wait_idle(test_deadline()).unwrap();

    let events = device.logs().by_fragment(handle.fragment_id());
    assert_eq!(events.len(), 3);
    let dispatch = events
        .iter()
        .find(|e| e.category == LogCategory::Dispatch)
        .unwrap();
    assert!(dispatch.format_line().contains("out-of-bounds access detected"));
    let errors = device.logs().by_level(LogLevel::Error);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].format_line().contains("E201"));
    assert!(!device.logs().is_empty());

    let exported = device.metrics().encode().unwrap();
    assert!(exported.contains("taskhal_fragments_retired_total"));
    assert!(exported.contains("outcome=\"failed\""));
    assert_eq!(device.metrics().fragments_in_flight.get(), 0);
}
