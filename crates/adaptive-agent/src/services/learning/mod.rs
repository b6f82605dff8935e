pub mod engine;
pub mod types;

pub use engine::{compute_metrics, LearningEngine};
pub use types::{
    AdaptationContext, AdaptiveResponse, FeedbackInput, FeedbackRecord, FeedbackSnapshot,
    FeedbackType, LearningError, LearningExport, LearningMetrics, PersonalizedInsights,
};
