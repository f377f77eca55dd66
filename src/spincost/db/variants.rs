//! Postgres-backed variant catalog reads.

use crate::spincost::db::pool::PgPool;
use crate::spincost::db::VariantSource;
use crate::spincost::domain::VariantRef;
use crate::spincost::error::EngineResult;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub struct PgVariantStore {
    pool: Arc<PgPool>,
}

impl PgVariantStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VariantSource for PgVariantStore {
    async fn count_active(&self) -> EngineResult<i64> {
        let conn = self.pool.acquire(None).await?;
        let row = conn
            .client()
            .query_one(
                "SELECT COUNT(*) FROM yarn_variants WHERE is_active = TRUE",
                &[],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn distinct_routing_ids(&self) -> EngineResult<Vec<Uuid>> {
        let conn = self.pool.acquire(None).await?;
        let rows = conn
            .client()
            .query(
                "SELECT DISTINCT routing_template_id FROM yarn_variants \
                 WHERE is_active = TRUE AND routing_template_id IS NOT NULL",
                &[],
            )
            .await?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn page_active(&self, after: Option<Uuid>, limit: i64) -> EngineResult<Vec<VariantRef>> {
        let conn = self.pool.acquire(None).await?;
        // keyset pagination: half-open pages, ascending id, no overlap
        let rows = conn
            .client()
            .query(
                "SELECT id, routing_template_id FROM yarn_variants \
                 WHERE is_active = TRUE AND ($1::uuid IS NULL OR id > $1) \
                 ORDER BY id LIMIT $2",
                &[&after, &limit],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| VariantRef {
                id: row.get(0),
                routing_id: row.get(1),
            })
            .collect())
    }
}
