//! End-to-end pipeline tests over in-memory stores.

mod common;

use common::{variant_id, MemCatalog, MemJobStore, MemSummarySink};
use serde_json::json;
use spincost::spincost::db::{JobStore, StepSource, SummarySink, VariantSource};
use spincost::spincost::domain::{BatchJob, JobStatus, JobType, RoutingStep, VariantRef};
use spincost::spincost::engine::{CancelToken, RecalcPipeline};
use spincost::spincost::params::ParamBag;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Harness {
    sink: Arc<MemSummarySink>,
    jobs: Arc<MemJobStore>,
    pipeline: RecalcPipeline,
}

fn harness(catalog: MemCatalog, sink: MemSummarySink, workers: usize, batch: usize) -> Harness {
    let catalog = Arc::new(catalog);
    let sink = Arc::new(sink);
    let jobs = Arc::new(MemJobStore::new());
    let pipeline = RecalcPipeline::new(
        catalog.clone() as Arc<dyn VariantSource>,
        catalog as Arc<dyn StepSource>,
        sink.clone() as Arc<dyn SummarySink>,
        jobs.clone() as Arc<dyn JobStore>,
        workers,
        batch,
    );
    Harness {
        sink,
        jobs,
        pipeline,
    }
}

async fn run_job(h: &Harness, params: serde_json::Value) -> BatchJob {
    let job = BatchJob::new(JobType::RecalculateAll, params.clone());
    h.jobs.create(&job).await.unwrap();
    let bag = ParamBag::from_json(&params).unwrap();
    h.pipeline
        .run(job.id, bag, CancelToken::new())
        .await
        .unwrap();
    h.jobs.get(job.id).await.unwrap()
}

#[tokio::test]
async fn test_single_step_arithmetic_end_to_end() {
    let routing = Uuid::new_v4();
    let h = harness(
        MemCatalog::single_routing(1, routing, &["a + b"]),
        MemSummarySink::new(),
        4,
        100,
    );

    let job = run_job(&h, json!({"a": 10.0, "b": 5.0})).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_records, 1);
    assert_eq!(job.processed_records, 1);
    assert_eq!(job.failed_records, 0);
    assert_eq!(job.progress(), 100.0);

    let rows = h.sink.rows();
    assert_eq!(rows.len(), 1);
    let summary = rows.values().next().unwrap();
    assert_eq!(summary.total_process_cost, 15.0);
    assert_eq!(summary.total_overhead, 1.5);
    assert_eq!(summary.total_material_cost, 0.0);
    assert_eq!(summary.grand_total, 16.5);
}

#[tokio::test]
async fn test_multi_step_routing_sums_to_four_hundred() {
    let routing = Uuid::new_v4();
    let h = harness(
        MemCatalog::single_routing(
            10,
            routing,
            &[
                "electricity_kwh * rate_per_kwh",
                "labor_hours * labor_rate",
                "overhead",
            ],
        ),
        MemSummarySink::new(),
        4,
        100,
    );

    let job = run_job(
        &h,
        json!({
            "electricity_kwh": 100,
            "rate_per_kwh": 1.5,
            "labor_hours": 8,
            "labor_rate": 25,
            "overhead": 50,
        }),
    )
    .await;

    assert_eq!(job.status, JobStatus::Completed);
    for summary in h.sink.rows().values() {
        assert_eq!(summary.total_process_cost, 400.0);
    }
}

#[tokio::test]
async fn test_empty_catalog_completes_with_zero_totals() {
    let h = harness(
        MemCatalog::new(Vec::new(), HashMap::new()),
        MemSummarySink::new(),
        4,
        100,
    );

    let job = run_job(&h, json!({})).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_records, 0);
    assert_eq!(job.processed_records, 0);
    assert_eq!(job.failed_records, 0);
    assert_eq!(job.progress(), 0.0);
    assert!(h.sink.rows().is_empty());
}

#[tokio::test]
async fn test_missing_routing_counts_every_variant_failed() {
    // 1000 variants reference a routing the cache has no entry for
    let routing = Uuid::new_v4();
    let variants = (0..1000)
        .map(|n| VariantRef {
            id: variant_id(n),
            routing_id: routing,
        })
        .collect();
    let h = harness(
        MemCatalog::new(variants, HashMap::new()),
        MemSummarySink::new(),
        8,
        100,
    );

    let job = run_job(&h, json!({"a": 1.0})).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.failed_records, 1000);
    assert_eq!(job.processed_records, 0);
    assert!(h.sink.rows().is_empty());
}

#[tokio::test]
async fn test_routing_with_zero_steps_counts_failed() {
    let routing = Uuid::new_v4();
    let variants = (0..10)
        .map(|n| VariantRef {
            id: variant_id(n),
            routing_id: routing,
        })
        .collect();
    // step list exists but is empty, which the cache treats as absent
    let h = harness(
        MemCatalog::new(variants, HashMap::from([(routing, Vec::new())])),
        MemSummarySink::new(),
        4,
        100,
    );

    let job = run_job(&h, json!({})).await;
    assert_eq!(job.failed_records, 10);
    assert_eq!(job.processed_records, 0);
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_division_by_zero_does_not_fail_the_variant() {
    let routing = Uuid::new_v4();
    let h = harness(
        MemCatalog::single_routing(1, routing, &["1 / 0"]),
        MemSummarySink::new(),
        1,
        10,
    );

    let job = run_job(&h, json!({})).await;

    assert_eq!(job.processed_records, 1);
    assert_eq!(job.failed_records, 0);
    let rows = h.sink.rows();
    let summary = rows.values().next().unwrap();
    assert_eq!(summary.total_process_cost, f64::INFINITY);
    assert_eq!(summary.grand_total, f64::INFINITY);
}

#[tokio::test]
async fn test_missing_identifier_contributes_zero_but_summary_written() {
    let routing = Uuid::new_v4();
    let h = harness(
        MemCatalog::single_routing(1, routing, &["a + b"]),
        MemSummarySink::new(),
        1,
        10,
    );

    // bag only carries 'a'; the step errors and contributes 0.0
    let job = run_job(&h, json!({"a": 10.0})).await;

    assert_eq!(job.processed_records, 1);
    assert_eq!(job.failed_records, 0);
    let rows = h.sink.rows();
    let summary = rows.values().next().unwrap();
    assert_eq!(summary.total_process_cost, 0.0);
}

#[tokio::test]
async fn test_identical_step_lists_produce_identical_costs() {
    let routing_a = Uuid::new_v4();
    let routing_b = Uuid::new_v4();
    let formulas = ["raw_kg * price", "labor_hours * labor_rate"];

    let step = |routing_id, order: i32, formula: &str| RoutingStep {
        routing_id,
        sequence_order: order,
        formula_expression: formula.to_string(),
    };
    let steps = HashMap::from([
        (
            routing_a,
            vec![step(routing_a, 1, formulas[0]), step(routing_a, 2, formulas[1])],
        ),
        (
            routing_b,
            vec![step(routing_b, 1, formulas[0]), step(routing_b, 2, formulas[1])],
        ),
    ]);
    let variants = (0..100)
        .map(|n| VariantRef {
            id: variant_id(n),
            routing_id: if n % 2 == 0 { routing_a } else { routing_b },
        })
        .collect();

    let h = harness(
        MemCatalog::new(variants, steps),
        MemSummarySink::new(),
        4,
        25,
    );
    run_job(
        &h,
        json!({"raw_kg": 10, "price": 3.5, "labor_hours": 2, "labor_rate": 20}),
    )
    .await;

    let rows = h.sink.rows();
    assert_eq!(rows.len(), 100);
    let expected = 10.0 * 3.5 + 2.0 * 20.0;
    for summary in rows.values() {
        assert_eq!(summary.total_process_cost, expected);
    }
}

#[tokio::test]
async fn test_rerun_is_idempotent_except_timestamps() {
    let routing = Uuid::new_v4();
    let h = harness(
        MemCatalog::single_routing(50, routing, &["a * b", "a + b"]),
        MemSummarySink::new(),
        4,
        10,
    );
    let params = json!({"a": 3.0, "b": 4.0, "material_cost": 7.0});

    let first_job = run_job(&h, params.clone()).await;
    let first = h.sink.rows();
    let second_job = run_job(&h, params).await;
    let second = h.sink.rows();

    assert_eq!(first_job.status, JobStatus::Completed);
    assert_eq!(second_job.status, JobStatus::Completed);
    assert_eq!(first.len(), second.len());
    for (id, before) in &first {
        let after = &second[id];
        assert_eq!(before.total_material_cost, after.total_material_cost);
        assert_eq!(before.total_process_cost, after.total_process_cost);
        assert_eq!(before.total_overhead, after.total_overhead);
        assert_eq!(before.grand_total, after.grand_total);
        assert_eq!(before.version_hash, after.version_hash);
    }
}

#[tokio::test]
async fn test_every_summary_shares_the_job_version_hash() {
    let routing = Uuid::new_v4();
    let h = harness(
        MemCatalog::single_routing(20, routing, &["a"]),
        MemSummarySink::new(),
        4,
        5,
    );
    let params = json!({"a": 1.5, "b": 2.0});
    run_job(&h, params.clone()).await;

    let expected = ParamBag::from_json(&params).unwrap().version_hash();
    for summary in h.sink.rows().values() {
        assert_eq!(summary.version_hash, expected);
    }
}

#[tokio::test]
async fn test_progress_counters_never_regress_and_stay_bounded() {
    let routing = Uuid::new_v4();
    let total: i64 = 10_000;
    let h = harness(
        MemCatalog::single_routing(total as u64, routing, &["a + 1"]),
        MemSummarySink::with_flush_delay(Duration::from_millis(2)),
        8,
        250,
    );

    let job = BatchJob::new(JobType::RecalculateAll, json!({"a": 1.0}));
    let job_id = job.id;
    h.jobs.create(&job).await.unwrap();

    let jobs = h.jobs.clone();
    let sampler = tokio::spawn(async move {
        let mut samples = Vec::new();
        loop {
            let job = jobs.get(job_id).await.unwrap();
            samples.push((job.processed_records, job.failed_records));
            if job.status.is_terminal() {
                return samples;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });

    let bag = ParamBag::from_json(&json!({"a": 1.0})).unwrap();
    h.pipeline
        .run(job_id, bag, CancelToken::new())
        .await
        .unwrap();
    let samples = sampler.await.unwrap();

    let mut last_processed = 0;
    for (processed, failed) in samples {
        assert!(processed >= last_processed, "processed counter regressed");
        assert!(processed + failed <= total, "counters exceeded total");
        last_processed = processed;
    }

    let job = h.jobs.get(job_id).await.unwrap();
    assert_eq!(job.processed_records, total);
    assert_eq!(job.failed_records, 0);
}

#[tokio::test]
async fn test_exhausted_flush_retries_attribute_failures() {
    let routing = Uuid::new_v4();
    // every flush attempt fails; after the bounded retries the
    // buffers are dropped and attributed to the failed counter
    let h = harness(
        MemCatalog::single_routing(100, routing, &["a"]),
        MemSummarySink::failing_first(u64::MAX),
        4,
        50,
    );

    let job = run_job(&h, json!({"a": 2.0})).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_records, 0);
    assert_eq!(job.failed_records, 100);
    assert!(h.sink.rows().is_empty());
}

#[tokio::test]
async fn test_flush_retry_recovers_after_transient_failure() {
    let routing = Uuid::new_v4();
    let h = harness(
        MemCatalog::single_routing(100, routing, &["a"]),
        MemSummarySink::failing_first(1),
        4,
        100,
    );

    let job = run_job(&h, json!({"a": 2.0})).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.processed_records, 100);
    assert_eq!(job.failed_records, 0);
    assert_eq!(h.sink.rows().len(), 100);
}

#[tokio::test]
async fn test_cancellation_marks_job_cancelled() {
    let routing = Uuid::new_v4();
    let h = harness(
        MemCatalog::single_routing(20_000, routing, &["a * 2"]),
        MemSummarySink::with_flush_delay(Duration::from_millis(5)),
        4,
        100,
    );

    let job = BatchJob::new(JobType::RecalculateAll, json!({"a": 1.0}));
    let job_id = job.id;
    h.jobs.create(&job).await.unwrap();

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let bag = ParamBag::from_json(&json!({"a": 1.0})).unwrap();
    let outcome = h.pipeline.run(job_id, bag, cancel).await.unwrap();

    assert_eq!(outcome.status, JobStatus::Cancelled);
    let job = h.jobs.get(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    // the collector flushed what it held, but the run stopped early
    assert!(job.processed_records < job.total_records);
    assert!(job.processed_records + job.failed_records <= job.total_records);
}
