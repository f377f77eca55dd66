//! The recalculation engine: routing cache, per-variant calculator,
//! progress tracking, cancellation, and the streaming pipeline that
//! ties them together.

pub mod calculator;
pub mod cancel;
pub mod pipeline;
pub mod progress;
pub mod routing_cache;

pub use calculator::VariantCalculator;
pub use cancel::CancelToken;
pub use pipeline::{JobOutcome, RecalcPipeline};
pub use progress::{JobCounters, ProgressSample, REPORT_INTERVAL};
pub use routing_cache::{CompiledStep, RoutingStepCache};
