//! Single-variant cost calculation.
//!
//! Pure CPU work: given a variant's cached step list and the job's
//! parameter bag, produce one [`CostSummary`]. Evaluation errors make
//! a step contribute `0.0`; they never fail the variant.

use crate::spincost::engine::routing_cache::CompiledStep;
use crate::spincost::domain::CostSummary;
use crate::spincost::params::{
    DEFAULT_OVERHEAD_PERCENTAGE, MATERIAL_COST_KEY, OVERHEAD_PERCENTAGE_KEY, ParamBag,
};
use chrono::Utc;
use log::debug;
use std::sync::Arc;
use uuid::Uuid;

/// Computes summaries for one job.
///
/// The bag-derived values that are identical for every variant - the
/// material cost, the overhead fraction, and the version hash - are
/// resolved once at construction.
pub struct VariantCalculator {
    params: Arc<ParamBag>,
    material_cost: f64,
    overhead_percentage: f64,
    version_hash: String,
}

impl VariantCalculator {
    pub fn new(params: Arc<ParamBag>) -> Self {
        let material_cost = params.get_or(MATERIAL_COST_KEY, 0.0);
        let overhead_percentage =
            params.get_or(OVERHEAD_PERCENTAGE_KEY, DEFAULT_OVERHEAD_PERCENTAGE);
        let version_hash = params.version_hash();
        Self {
            params,
            material_cost,
            overhead_percentage,
            version_hash,
        }
    }

    /// The job-wide version hash (identical on every summary).
    pub fn version_hash(&self) -> &str {
        &self.version_hash
    }

    /// Calculate the summary for one variant.
    ///
    /// Steps are evaluated in their cached order; the timestamp is
    /// captured once per variant. `grand_total` is the exact float sum
    /// of the three components, with no rounding.
    pub fn calculate(&self, variant_id: Uuid, steps: &[CompiledStep]) -> CostSummary {
        let mut total_process_cost = 0.0;

        for step in steps {
            let cost = match &step.program {
                Some(program) => match program.evaluate(&self.params) {
                    Ok(value) => value,
                    Err(err) => {
                        debug!(
                            "variant {variant_id} step {}: evaluation failed ({err}); using 0.0",
                            step.sequence_order
                        );
                        0.0
                    }
                },
                // formula failed to compile at cache load
                None => 0.0,
            };
            total_process_cost += cost;
        }

        let total_overhead = total_process_cost * self.overhead_percentage;
        let grand_total = self.material_cost + total_process_cost + total_overhead;

        CostSummary {
            variant_id,
            total_material_cost: self.material_cost,
            total_process_cost,
            total_overhead,
            grand_total,
            last_recalculated_at: Utc::now(),
            version_hash: self.version_hash.clone(),
        }
    }
}
