//! End-to-end scenarios exercising the full `JobProcessor` against a small
//! ring, mirroring the concrete worked examples this crate's design was
//! checked against.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use trace_pipeline::job_processor::JobProcessor;
use trace_pipeline::types::{BindingType, GlobalContextId, JobKind, JobPayload, SharedMemLocation};
use trace_pipeline::PipelineError;

type FourSlotProcessor = JobProcessor<4, 4, 4, 4>;
type TwoSlotProcessor = JobProcessor<2, 4, 4, 4>;

#[test]
fn single_producer_single_consumer_happy_path() {
    let processor = FourSlotProcessor::new();
    let calls: Arc<Mutex<Vec<(SharedMemLocation, JobKind)>>> = Arc::new(Mutex::new(Vec::new()));
    let calls_clone = Arc::clone(&calls);
    processor.set_deallocator(Box::new(move |job| {
        calls_clone.lock().unwrap().push((job.location, job.kind));
        Ok(())
    }));

    let finished = Arc::new(AtomicU32::new(99));
    processor
        .submit(JobPayload {
            finished_context_id: finished,
            original: GlobalContextId::new(1, 42),
            kind: JobKind::Local,
            location: SharedMemLocation { handle: 1, offset: 0 },
        })
        .unwrap();

    let reclaimed = processor.process_jobs().unwrap();

    assert_eq!(reclaimed, 1);
    assert_eq!(*calls.lock().unwrap(), vec![(SharedMemLocation { handle: 1, offset: 0 }, JobKind::Local)]);
}

#[test]
fn correlation_stop_leaves_the_element_in_the_ring() {
    let processor = FourSlotProcessor::new();
    let call_count = Arc::new(AtomicUsize::new(0));
    let call_count_clone = Arc::clone(&call_count);
    processor.set_deallocator(Box::new(move |_| {
        call_count_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    // finished_context_id equals the job's own context: the producer has
    // not yet moved past it, so it must not be reclaimed.
    let finished = Arc::new(AtomicU32::new(42));
    processor
        .submit(JobPayload {
            finished_context_id: finished,
            original: GlobalContextId::new(1, 42),
            kind: JobKind::Local,
            location: SharedMemLocation::default(),
        })
        .unwrap();

    let reclaimed = processor.process_jobs().unwrap();

    assert_eq!(reclaimed, 0);
    assert_eq!(call_count.load(Ordering::SeqCst), 0);
}

#[test]
fn callback_fires_only_for_shared_memory_jobs() {
    let processor = FourSlotProcessor::new();
    processor.set_deallocator(Box::new(|_| Ok(())));

    let local = processor.register_client([0; 8], BindingType::LoLa).unwrap();
    processor.reconcile_remote_client(local, 101).unwrap();

    let log: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
    let log_clone = Arc::clone(&log);
    processor.save_callback(local, Some(Box::new(move |ctx| log_clone.lock().unwrap().push(ctx)))).unwrap();

    let finished = Arc::new(AtomicU32::new(8));
    processor
        .submit(JobPayload {
            finished_context_id: Arc::clone(&finished),
            original: GlobalContextId::new(101, 7),
            kind: JobKind::Shared,
            location: SharedMemLocation { handle: 5, offset: 64 },
        })
        .unwrap();
    processor.process_jobs().unwrap();
    assert_eq!(*log.lock().unwrap(), vec![7]);

    let finished_local = Arc::new(AtomicU32::new(8));
    processor
        .submit(JobPayload {
            finished_context_id: finished_local,
            original: GlobalContextId::new(101, 7),
            kind: JobKind::Local,
            location: SharedMemLocation::default(),
        })
        .unwrap();
    processor.process_jobs().unwrap();
    assert_eq!(*log.lock().unwrap(), vec![7], "a Local job must not trigger the callback");
}

#[test]
fn ring_full_reports_full_recoverable_without_mutating_state() {
    let processor = TwoSlotProcessor::new();
    processor.set_deallocator(Box::new(|_| Ok(())));

    for ctx in 0..2 {
        processor
            .submit(JobPayload {
                finished_context_id: Arc::new(AtomicU32::new(0)),
                original: GlobalContextId::new(1, ctx),
                kind: JobKind::Local,
                location: SharedMemLocation::default(),
            })
            .unwrap();
    }

    let err = processor
        .submit(JobPayload {
            finished_context_id: Arc::new(AtomicU32::new(0)),
            original: GlobalContextId::new(1, 99),
            kind: JobKind::Local,
            location: SharedMemLocation::default(),
        })
        .unwrap_err();

    assert_eq!(err, PipelineError::RingFull);
    assert!(err.is_recoverable());
}

#[test]
fn peek_ready_on_a_fresh_ring_reports_empty_recoverable() {
    let processor = FourSlotProcessor::new();
    processor.set_deallocator(Box::new(|_| Ok(())));
    assert_eq!(processor.process_jobs().unwrap(), 0);
}

#[test]
fn cancellation_stops_the_run_loop_within_bounded_attempts() {
    let processor = Arc::new(FourSlotProcessor::new());
    let deallocations = Arc::new(AtomicUsize::new(0));
    let deallocations_clone = Arc::clone(&deallocations);
    processor.set_deallocator(Box::new(move |_| {
        deallocations_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    let token = processor.cancellation_token();
    let worker = {
        let processor = Arc::clone(&processor);
        std::thread::spawn(move || {
            processor.run_until_cancelled(|| std::thread::yield_now());
        })
    };

    std::thread::sleep(std::time::Duration::from_millis(10));
    token.cancel();
    worker.join().expect("run_until_cancelled must return once cancelled");
}
