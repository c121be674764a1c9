//! Command-buffer issuance: ordering, concurrency, batching and transfers.

mod common;

use common::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use taskhal_executor::prelude::*;

#[test]
fn barriers_order_dispatches() {
    let device = test_device();
    let journal = Journal::new();
    let kernels = journal_kernels(&journal);
    let done = device.create_semaphore(0);

    let cb = device.create_command_buffer(CommandBufferMode::OneShot);
    for round in 0..3 {
        mark(&cb, &kernels, round * 10);
        mark(&cb, &kernels, round * 10 + 1);
        barrier(&cb);
    }
    cb.end().unwrap();
    device
        .queue_submit(0, SubmissionBatch::new().command_buffer(&cb).signal(&done, 1))
        .unwrap();
    wait_all(&device, &[(&done, 1)]).unwrap();

    let entries = journal.entries();
    assert_eq!(entries.len(), 6);
    for (index, value) in entries.iter().enumerate() {
        // Each round finishes before the next starts; order inside a round
        // is free.
        assert_eq!(*value / 10, (index / 2) as u32, "entries: {:?}", entries);
    }
}

#[test]
fn dispatches_without_barrier_run_concurrently() {
    let device = test_device();
    let kernels = rendezvous_kernel(2);
    let done = device.create_semaphore(0);

    let cb = device.create_command_buffer(CommandBufferMode::OneShot);
    cb.dispatch(Arc::clone(&kernels), 0, [1, 1, 1], &[], &[])
        .unwrap();
    cb.dispatch(Arc::clone(&kernels), 0, [1, 1, 1], &[], &[])
        .unwrap();
    cb.end().unwrap();
    device
        .queue_submit(0, SubmissionBatch::new().command_buffer(&cb).signal(&done, 1))
        .unwrap();

    wait_all(&device, &[(&done, 1)]).unwrap();
}

#[test]
fn every_workgroup_runs_once() {
    let device = test_device();
    let output = Buffer::new(4 * 3 * 5 * 2);
    let kernels: Arc<dyn LocalExecutable> = Arc::new(
        KernelLibrary::new("ids").with_entry_point("store", [8, 1, 1], |call| {
            let index = call.linear_workgroup_id() as usize;
            let binding = call
                .binding(0)
                .ok_or_else(|| anyhow::anyhow!("missing binding"))?;
            let previous = binding
                .load_u32(index)
                .ok_or_else(|| anyhow::anyhow!("workgroup {} out of range", index))?;
            anyhow::ensure!(call.workgroup_size == [8, 1, 1]);
            binding.store_u32(index, previous + call.push_constant(0).unwrap_or(0));
            Ok(())
        }),
    );
    let done = device.create_semaphore(0);

    // 30 workgroups with 4 per task: 8 range tasks.
    let cb = device.create_command_buffer(CommandBufferMode::OneShot);
    cb.dispatch(kernels, 0, [3, 5, 2], &[1], &[output.bind()])
        .unwrap();
    cb.end().unwrap();
    let handle = device
        .queue_submit(0, SubmissionBatch::new().command_buffer(&cb).signal(&done, 1))
        .unwrap();
    assert_eq!(handle.task_count(), 8 + 1);

    wait_all(&device, &[(&done, 1)]).unwrap();
    assert_eq!(output.to_u32s(), vec![1; 30]);
}

#[test]
fn zero_sized_dispatch_issues_nothing() {
    let device = test_device();
    let journal = Journal::new();
    let kernels = journal_kernels(&journal);

    let cb = device.create_command_buffer(CommandBufferMode::OneShot);
    cb.dispatch(Arc::clone(&kernels), MARK, [0, 4, 1], &[1], &[])
        .unwrap();
    cb.end().unwrap();
    let handle = device
        .queue_submit(0, SubmissionBatch::new().command_buffer(&cb))
        .unwrap();
    assert_eq!(handle.task_count(), 1);
    handle.wait(test_deadline()).unwrap();
    assert_eq!(journal.len(), 0);
}

#[test]
fn fill_then_copy_through_barrier() {
    let device = test_device();
    let source = Buffer::new(16);
    let target = Buffer::new(16);
    let done = device.create_semaphore(0);

    let cb = device.create_command_buffer(CommandBufferMode::OneShot);
    cb.fill_buffer(source.bind_range(0, 8).unwrap(), &[0xAB, 0xCD])
        .unwrap();
    cb.fill_buffer(source.bind_range(8, 8).unwrap(), &[0x11, 0x22, 0x33, 0x44])
        .unwrap();
    cb.memory_barrier(ExecutionStage::Transfer, ExecutionStage::Transfer)
        .unwrap();
    cb.copy_buffer(source.bind(), target.bind()).unwrap();
    cb.end().unwrap();
    device
        .queue_submit(0, SubmissionBatch::new().command_buffer(&cb).signal(&done, 1))
        .unwrap();
    wait_all(&device, &[(&done, 1)]).unwrap();

    let expected = [
        0xAB, 0xCD, 0xAB, 0xCD, 0xAB, 0xCD, 0xAB, 0xCD, 0x11, 0x22, 0x33, 0x44, 0x11, 0x22, 0x33,
        0x44,
    ];
    assert_eq!(target.to_vec(), expected);
}

#[test]
fn push_constants_outlive_the_recording() {
    let device = test_device();
    let journal = Journal::new();
    let kernels = journal_kernels(&journal);
    let gate = device.create_semaphore(0);
    let done = device.create_semaphore(0);

    let cb = device.create_command_buffer(CommandBufferMode::OneShot);
    mark(&cb, &kernels, 77);
    cb.end().unwrap();
    device
        .queue_submit(
            0,
            SubmissionBatch::new()
                .wait(&gate, 1)
                .command_buffer(&cb)
                .signal(&done, 1),
        )
        .unwrap();
    drop(cb);

    gate.signal(1).unwrap();
    wait_all(&device, &[(&done, 1)]).unwrap();
    assert_eq!(journal.entries(), vec![77]);
}

#[test]
fn reusable_buffers_issue_repeatedly() {
    let device = test_device();
    let counter = Arc::new(AtomicU64::new(0));
    let kernels: Arc<dyn LocalExecutable> = Arc::new({
        let counter = Arc::clone(&counter);
        KernelLibrary::new("count").with_entry_point("inc", [1, 1, 1], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    });
    let done = device.create_semaphore(0);

    let reusable = device.create_command_buffer(CommandBufferMode::Reusable);
    reusable
        .dispatch(Arc::clone(&kernels), 0, [2, 1, 1], &[], &[])
        .unwrap();
    reusable.end().unwrap();
    // Chain the submissions so the signals arrive in order.
    for value in 1..=3 {
        device
            .queue_submit(
                0,
                SubmissionBatch::new()
                    .wait(&done, value - 1)
                    .command_buffer(&reusable)
                    .signal(&done, value),
            )
            .unwrap();
    }
    wait_all(&device, &[(&done, 3)]).unwrap();
    device.wait_idle(test_deadline()).unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 6);

    let one_shot = device.create_command_buffer(CommandBufferMode::OneShot);
    one_shot.end().unwrap();
    let batch = SubmissionBatch::new().command_buffer(&one_shot);
    device.queue_submit(0, batch.clone()).unwrap();
    let err = device.queue_submit(0, batch).unwrap_err();
    assert_eq!(err.code(), "E305");
}

#[test]
fn malformed_recordings_are_rejected() {
    let device = test_device();
    let journal = Journal::new();
    let kernels = journal_kernels(&journal);
    let buffer = Buffer::new(6);

    let cb = device.create_command_buffer(CommandBufferMode::OneShot);
    assert!(cb.dispatch(Arc::clone(&kernels), 9, [1, 1, 1], &[], &[]).is_err());
    assert!(cb.fill_buffer(buffer.bind(), &[1, 2, 3]).is_err());
    assert!(cb.fill_buffer(buffer.bind(), &[1, 2, 3, 4]).is_err());
    assert!(buffer.bind_range(4, 4).is_err());
    assert!(
        cb.copy_buffer(buffer.bind(), Buffer::new(4).bind())
            .unwrap_err()
            .is_invalid_argument()
    );
    // The workgroup total must fit in 64 bits.
    assert!(
        cb.dispatch(Arc::clone(&kernels), MARK, [u32::MAX; 3], &[], &[])
            .unwrap_err()
            .is_invalid_argument()
    );
    assert!(cb.is_empty());

    // Not ended.
    let err = device
        .queue_submit(0, SubmissionBatch::new().command_buffer(&cb))
        .unwrap_err();
    assert!(err.is_invalid_argument());
}
