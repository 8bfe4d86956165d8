//! Worker-pool properties: equivalence across worker counts, bulk
//! throughput, shutdown behavior.

mod common;

use common::{bibliographic_stream, standard_spec};
use marcmap::queue::CollectingSink;
use marcmap::IngestPipeline;
use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

fn completed_ids(workers: usize, input: &[u8]) -> BTreeSet<String> {
    let sink = Arc::new(CollectingSink::default());
    let mut pipeline = IngestPipeline::builder(standard_spec())
        .workers(workers)
        .sink(sink.clone())
        .build();
    pipeline.run(Cursor::new(input.to_vec())).unwrap();
    pipeline.close(Duration::from_secs(30)).unwrap();
    sink.resources()
        .iter()
        .map(|r| r.id().expect("completed resource has id").to_string())
        .collect()
}

#[test]
fn one_worker_and_many_workers_complete_the_same_set() {
    let input = bibliographic_stream(200);
    let single = completed_ids(1, &input);
    let many = completed_ids(4, &input);
    assert_eq!(single.len(), 200);
    assert_eq!(single, many);
}

#[test]
fn bulk_run_completes_without_deadlock() {
    let input = bibliographic_stream(5000);
    let sink = Arc::new(CollectingSink::default());
    let mut pipeline = IngestPipeline::builder(standard_spec())
        .workers(4)
        .depth(16)
        .sink(sink.clone())
        .build();
    let decoded = pipeline.run(Cursor::new(input)).unwrap();
    assert_eq!(decoded, 5000);
    let counters = pipeline.close(Duration::from_secs(60)).unwrap();
    assert_eq!(counters.completed, 5000);
    assert_eq!(counters.completed + counters.failed + counters.dropped, 5000);
}

#[test]
fn no_partially_built_resource_reaches_the_sink() {
    // every observed resource must carry the full field complement
    let sink = Arc::new(CollectingSink::default());
    let mut pipeline = IngestPipeline::builder(standard_spec())
        .workers(4)
        .sink(sink.clone())
        .build();
    pipeline.run(Cursor::new(bibliographic_stream(100))).unwrap();
    pipeline.close(Duration::from_secs(30)).unwrap();
    for resource in sink.resources() {
        assert!(resource.id().is_some());
        // 100, 245, and 650 each map through Direct
        assert_eq!(resource.resources("Direct").count(), 3);
        assert_eq!(resource.literal("uid"), resource.id());
    }
}

#[test]
fn record_numbers_are_unique_and_monotonic_per_pool() {
    use marcmap::{EntityBuilderState, Result, Sink};
    use std::sync::Mutex;

    #[derive(Default)]
    struct NumberSink(Mutex<Vec<u64>>);
    impl Sink for NumberSink {
        fn after_completion(&self, state: &mut EntityBuilderState) -> Result<()> {
            self.0.lock().unwrap().push(state.record_number());
            Ok(())
        }
    }

    let sink = Arc::new(NumberSink::default());
    let mut pipeline = IngestPipeline::builder(standard_spec())
        .workers(3)
        .sink(sink.clone())
        .build();
    pipeline.run(Cursor::new(bibliographic_stream(50))).unwrap();
    pipeline.close(Duration::from_secs(30)).unwrap();

    let mut numbers = sink.0.lock().unwrap().clone();
    numbers.sort_unstable();
    let expected: Vec<u64> = (1..=50).collect();
    assert_eq!(numbers, expected);
}
