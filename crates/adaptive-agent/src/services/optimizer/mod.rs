#[allow(clippy::module_inception)]
pub mod optimizer;
pub mod types;

pub use optimizer::RequestOptimizer;
pub use types::{
    cache_key, FetchOptions, OptimizerConfig, OptimizerError, OptimizerStats, PreloadReport,
    PreloadRequest,
};
