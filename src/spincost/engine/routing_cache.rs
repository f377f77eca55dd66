//! Per-job cache of routing step lists with compiled formulas.
//!
//! Populated once at the start of a job and read-only afterwards, so
//! it is shared across workers as a plain `Arc` without locking.
//! Lookups hand out references into the cached lists; nothing is
//! copied per variant.

use crate::spincost::db::{StepSource, VariantSource};
use crate::spincost::error::EngineResult;
use crate::spincost::formula::Formula;
use log::warn;
use std::collections::HashMap;
use uuid::Uuid;

/// One routing step with its compiled program.
///
/// `program` is `None` when the stored expression failed to compile;
/// such steps contribute `0.0` to every variant on this routing.
#[derive(Debug)]
pub struct CompiledStep {
    pub sequence_order: i32,
    pub program: Option<Formula>,
}

/// Read-only mapping from routing id to its ordered step list.
pub struct RoutingStepCache {
    routings: HashMap<Uuid, Vec<CompiledStep>>,
}

impl RoutingStepCache {
    /// Load every routing referenced by an active variant and compile
    /// its formulas.
    ///
    /// A routing whose step list comes back empty is not inserted:
    /// variants referencing it count as failed. Steps with
    /// uncompilable formulas are kept (with no program) and logged
    /// once here rather than per variant.
    pub async fn load(
        variants: &dyn VariantSource,
        steps: &dyn StepSource,
    ) -> EngineResult<Self> {
        let routing_ids = variants.distinct_routing_ids().await?;
        let mut routings = HashMap::with_capacity(routing_ids.len());

        for routing_id in routing_ids {
            let rows = steps.steps_for_routing(routing_id).await?;
            if rows.is_empty() {
                warn!("routing {routing_id} has no steps; its variants will be counted failed");
                continue;
            }

            let compiled = rows
                .into_iter()
                .map(|step| {
                    let program = match Formula::compile(&step.formula_expression) {
                        Ok(program) => Some(program),
                        Err(err) => {
                            warn!(
                                "routing {routing_id} step {}: formula '{}' failed to compile: {err}",
                                step.sequence_order, step.formula_expression
                            );
                            None
                        }
                    };
                    CompiledStep {
                        sequence_order: step.sequence_order,
                        program,
                    }
                })
                .collect();

            routings.insert(routing_id, compiled);
        }

        Ok(Self { routings })
    }

    /// Ordered steps for a routing, or `None` when the routing is
    /// absent (unknown id or empty step list at load time).
    pub fn get(&self, routing_id: &Uuid) -> Option<&[CompiledStep]> {
        self.routings.get(routing_id).map(|steps| steps.as_slice())
    }

    /// Number of cached routings.
    pub fn len(&self) -> usize {
        self.routings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spincost::domain::{RoutingStep, VariantRef};
    use crate::spincost::error::EngineResult;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeCatalog {
        routing_ids: Vec<Uuid>,
        steps: Mutex<HashMap<Uuid, Vec<RoutingStep>>>,
    }

    #[async_trait]
    impl VariantSource for FakeCatalog {
        async fn count_active(&self) -> EngineResult<i64> {
            Ok(0)
        }

        async fn distinct_routing_ids(&self) -> EngineResult<Vec<Uuid>> {
            Ok(self.routing_ids.clone())
        }

        async fn page_active(
            &self,
            _after: Option<Uuid>,
            _limit: i64,
        ) -> EngineResult<Vec<VariantRef>> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl StepSource for FakeCatalog {
        async fn steps_for_routing(&self, routing_id: Uuid) -> EngineResult<Vec<RoutingStep>> {
            Ok(self
                .steps
                .lock()
                .unwrap()
                .get(&routing_id)
                .cloned()
                .unwrap_or_default())
        }
    }

    fn step(routing_id: Uuid, order: i32, formula: &str) -> RoutingStep {
        RoutingStep {
            routing_id,
            sequence_order: order,
            formula_expression: formula.to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_compiles_ordered_steps() {
        let routing = Uuid::new_v4();
        let catalog = FakeCatalog {
            routing_ids: vec![routing],
            steps: Mutex::new(HashMap::from([(
                routing,
                vec![step(routing, 1, "a + b"), step(routing, 2, "a * 2")],
            )])),
        };

        let cache = RoutingStepCache::load(&catalog, &catalog).await.unwrap();
        assert_eq!(cache.len(), 1);

        let steps = cache.get(&routing).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].sequence_order, 1);
        assert!(steps[0].program.is_some());
    }

    #[tokio::test]
    async fn test_empty_step_list_treated_as_absent() {
        let routing = Uuid::new_v4();
        let catalog = FakeCatalog {
            routing_ids: vec![routing],
            steps: Mutex::new(HashMap::new()),
        };

        let cache = RoutingStepCache::load(&catalog, &catalog).await.unwrap();
        assert!(cache.is_empty());
        assert!(cache.get(&routing).is_none());
    }

    #[tokio::test]
    async fn test_uncompilable_formula_kept_without_program() {
        let routing = Uuid::new_v4();
        let catalog = FakeCatalog {
            routing_ids: vec![routing],
            steps: Mutex::new(HashMap::from([(
                routing,
                vec![step(routing, 1, "sqrt(a)"), step(routing, 2, "a + 1")],
            )])),
        };

        let cache = RoutingStepCache::load(&catalog, &catalog).await.unwrap();
        let steps = cache.get(&routing).unwrap();
        assert!(steps[0].program.is_none());
        assert!(steps[1].program.is_some());
    }
}
