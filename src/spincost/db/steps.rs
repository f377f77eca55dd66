//! Postgres-backed routing step reads.

use crate::spincost::db::pool::PgPool;
use crate::spincost::db::StepSource;
use crate::spincost::domain::RoutingStep;
use crate::spincost::error::EngineResult;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub struct PgStepStore {
    pool: Arc<PgPool>,
}

impl PgStepStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StepSource for PgStepStore {
    async fn steps_for_routing(&self, routing_id: Uuid) -> EngineResult<Vec<RoutingStep>> {
        let conn = self.pool.acquire(None).await?;
        let rows = conn
            .client()
            .query(
                "SELECT routing_template_id, sequence_order, formula_expression \
                 FROM process_steps WHERE routing_template_id = $1 \
                 ORDER BY sequence_order",
                &[&routing_id],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| RoutingStep {
                routing_id: row.get(0),
                sequence_order: row.get(1),
                formula_expression: row.get(2),
            })
            .collect())
    }
}
