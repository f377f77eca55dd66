//! Bulk upsert path for variant cost summaries.
//!
//! A flush is a single transaction: create a transaction-scoped
//! staging table shaped like the target, stream the whole buffer
//! through the binary COPY protocol in one round-trip, then upsert
//! from staging keyed on `variant_id`. Temp tables are per-session,
//! so concurrent flushes on different pool connections never see each
//! other's staging data.

use crate::spincost::db::pool::PgPool;
use crate::spincost::db::SummarySink;
use crate::spincost::domain::CostSummary;
use crate::spincost::error::EngineResult;
use async_trait::async_trait;
use futures::pin_mut;
use std::sync::Arc;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::Type;

const CREATE_STAGE: &str = "\
    CREATE TEMP TABLE summaries_stage (
        variant_id            UUID,
        total_material_cost   DOUBLE PRECISION,
        total_process_cost    DOUBLE PRECISION,
        total_overhead        DOUBLE PRECISION,
        grand_total           DOUBLE PRECISION,
        last_recalculated_at  TIMESTAMPTZ,
        version_hash          VARCHAR(64)
    ) ON COMMIT DROP";

const COPY_STAGE: &str = "\
    COPY summaries_stage (variant_id, total_material_cost, total_process_cost, \
    total_overhead, grand_total, last_recalculated_at, version_hash) \
    FROM STDIN BINARY";

const UPSERT_FROM_STAGE: &str = "\
    INSERT INTO variant_cost_summaries (variant_id, total_material_cost, \
    total_process_cost, total_overhead, grand_total, last_recalculated_at, version_hash) \
    SELECT variant_id, total_material_cost, total_process_cost, total_overhead, \
    grand_total, last_recalculated_at, version_hash FROM summaries_stage \
    ON CONFLICT (variant_id) DO UPDATE SET \
        total_material_cost = EXCLUDED.total_material_cost, \
        total_process_cost = EXCLUDED.total_process_cost, \
        total_overhead = EXCLUDED.total_overhead, \
        grand_total = EXCLUDED.grand_total, \
        last_recalculated_at = EXCLUDED.last_recalculated_at, \
        version_hash = EXCLUDED.version_hash";

pub struct PgSummaryStore {
    pool: Arc<PgPool>,
}

impl PgSummaryStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SummarySink for PgSummaryStore {
    async fn upsert_batch(&self, summaries: &[CostSummary]) -> EngineResult<u64> {
        if summaries.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.acquire(None).await?;
        let tx = conn.client_mut().transaction().await?;

        tx.execute(CREATE_STAGE, &[]).await?;

        let sink = tx.copy_in(COPY_STAGE).await?;
        let writer = BinaryCopyInWriter::new(
            sink,
            &[
                Type::UUID,
                Type::FLOAT8,
                Type::FLOAT8,
                Type::FLOAT8,
                Type::FLOAT8,
                Type::TIMESTAMPTZ,
                Type::VARCHAR,
            ],
        );
        pin_mut!(writer);

        for summary in summaries {
            writer
                .as_mut()
                .write(&[
                    &summary.variant_id,
                    &summary.total_material_cost,
                    &summary.total_process_cost,
                    &summary.total_overhead,
                    &summary.grand_total,
                    &summary.last_recalculated_at,
                    &summary.version_hash,
                ])
                .await?;
        }
        let copied = writer.finish().await?;

        tx.execute(UPSERT_FROM_STAGE, &[]).await?;
        tx.commit().await?;

        Ok(copied)
    }
}
