use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{
    AdaptationContext, AdaptiveResponse, ExportInsights, FeedbackInput, FeedbackRecord,
    FeedbackSummary, FeedbackType, LearningError, LearningExport, LearningMetrics,
    PersonalizedInsights,
};
use crate::utils::Clock;

const TOP_N: usize = 3;
const TREND_LEN: usize = 10;
const BASE_CONFIDENCE: f64 = 0.7;

const DETAIL_ADDENDUM: &str = "\n\nAdditional context: Based on user feedback, I've provided more comprehensive details to ensure completeness.";
const ACCURACY_ADDENDUM: &str = "\n\nNote: This response has been enhanced with additional accuracy verification based on learning from previous interactions.";
const EXPANSION_ADDENDUM: &str = "\n\nFurther detail: Detailed explanations have been the most helpful in previous interactions, so this answer includes the reasoning behind it.";

const NO_ADAPTATION: &str = "no adaptation needed";

/// Coarse classification of one feedback record (first match wins).
fn classify(record: &FeedbackRecord) -> &'static str {
    let len = record.response_len();
    if len > 500 && record.rating >= 4 {
        "detailed_helpful"
    } else if len < 100 && record.rating <= 2 {
        "too_brief"
    } else if record.snapshot.conversation_length == 1 && record.rating >= 4 {
        "first_response_success"
    } else if record.feedback_type == FeedbackType::Incorrect {
        "accuracy_issue"
    } else if record.feedback_type == FeedbackType::Incomplete {
        "completeness_issue"
    } else {
        "general"
    }
}

/// Counts in first-appearance order.
#[derive(Default)]
struct Tally(Vec<(&'static str, usize)>);

impl Tally {
    fn bump(&mut self, key: &'static str) {
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => self.0.push((key, 1)),
        }
    }

    /// Top `n` by count; the stable sort keeps first appearance on ties.
    fn top(&self, n: usize) -> Vec<String> {
        let mut ranked = self.0.clone();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.into_iter().take(n).map(|(k, _)| k.to_string()).collect()
    }

    fn weights(&self) -> BTreeMap<String, usize> {
        self.0.iter().map(|(k, n)| (k.to_string(), *n)).collect()
    }
}

/// Aggregate metrics as a pure function of the feedback set.
pub fn compute_metrics(records: &[FeedbackRecord]) -> LearningMetrics {
    if records.is_empty() {
        return LearningMetrics::default();
    }

    let mut patterns: BTreeMap<String, usize> = BTreeMap::new();
    let mut improvements = Tally::default();
    let mut successes = Tally::default();

    for record in records {
        *patterns.entry(classify(record).to_string()).or_default() += 1;
        let len = record.response_len();

        if record.rating <= 2 {
            if record.feedback_type == FeedbackType::Incomplete {
                improvements.bump("provide_more_detail");
            }
            if record.feedback_type == FeedbackType::Incorrect {
                improvements.bump("improve_accuracy");
            }
            if len < 100 {
                improvements.bump("increase_response_length");
            }
        }

        if record.rating >= 4 {
            if len > 300 {
                successes.bump("detailed_responses");
            }
            if record.feedback_type == FeedbackType::Excellent {
                successes.bump("comprehensive_answers");
            }
            if record.snapshot.conversation_length == 1 && record.rating == 5 {
                successes.bump("first_response_excellence");
            }
        }
    }

    let total: u64 = records.iter().map(|r| r.rating as u64).sum();
    let skip = records.len().saturating_sub(TREND_LEN);

    LearningMetrics {
        average_rating: total as f64 / records.len() as f64,
        total_feedback: records.len(),
        response_patterns: patterns,
        improvement_areas: improvements.top(TOP_N),
        successful_patterns: successes.top(TOP_N),
        improvement_weights: improvements.weights(),
        success_weights: successes.weights(),
        satisfaction_trend: records[skip..].iter().map(|r| r.rating).collect(),
    }
}

struct State {
    records: Vec<FeedbackRecord>,
    metrics: LearningMetrics,
}

/// Feedback ingestion and response adaptation. Records are append-only.
pub struct LearningEngine {
    state: RwLock<State>,
    clock: Arc<dyn Clock>,
}

impl LearningEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(State {
                records: Vec::new(),
                metrics: LearningMetrics::default(),
            }),
            clock,
        }
    }

    fn validate(input: &FeedbackInput) -> Result<(), LearningError> {
        if !(1..=5).contains(&input.rating) {
            return Err(LearningError::InvalidRating(input.rating));
        }
        if input.message_id.trim().is_empty() {
            return Err(LearningError::MissingField("message_id"));
        }
        if input.session_id.trim().is_empty() {
            return Err(LearningError::MissingField("session_id"));
        }
        Ok(())
    }

    pub fn add_feedback(&self, input: FeedbackInput) -> Result<Uuid, LearningError> {
        Self::validate(&input)?;

        let record = FeedbackRecord {
            id: Uuid::new_v4(),
            message_id: input.message_id,
            session_id: input.session_id,
            rating: input.rating,
            feedback_type: input.feedback_type,
            comment: input.comment,
            timestamp: self.clock.now(),
            snapshot: input.snapshot,
        };
        let id = record.id;

        if record.rating <= 2 {
            info!(
                event = "negative_feedback",
                session_id = %record.session_id,
                feedback_type = record.feedback_type.as_str(),
                adaptation_needed = true,
                "Learning event recorded"
            );
        } else if record.rating >= 4 {
            info!(
                event = "positive_feedback",
                session_id = %record.session_id,
                feedback_type = record.feedback_type.as_str(),
                adaptation_needed = false,
                "Learning event recorded"
            );
        }

        let mut state = self.state.write();
        state.records.push(record);
        state.metrics = compute_metrics(&state.records);
        debug!(
            total = state.metrics.total_feedback,
            average = state.metrics.average_rating,
            "Learning metrics recomputed"
        );

        Ok(id)
    }

    pub fn metrics(&self) -> LearningMetrics {
        self.state.read().metrics.clone()
    }

    /// Most recent feedback first.
    pub fn history(&self, limit: usize) -> Vec<FeedbackRecord> {
        let state = self.state.read();
        state.records.iter().rev().take(limit).cloned().collect()
    }

    pub fn personalized_insights(&self, session_id: &str) -> PersonalizedInsights {
        let state = self.state.read();
        let records: Vec<&FeedbackRecord> = state
            .records
            .iter()
            .filter(|r| r.session_id == session_id)
            .collect();

        let mut preferences = Map::new();
        let mut recommended_improvements: Vec<String> = Vec::new();

        if records.is_empty() {
            return PersonalizedInsights {
                session_id: session_id.to_string(),
                preferences,
                recommended_improvements,
                satisfaction_score: 0.0,
                feedback_count: 0,
            };
        }

        let high_rated: Vec<&&FeedbackRecord> = records.iter().filter(|r| r.rating >= 4).collect();
        if !high_rated.is_empty() && high_rated.iter().all(|r| r.response_len() > 300) {
            preferences.insert("response_style".to_string(), Value::from("detailed"));
        }

        for record in records.iter().filter(|r| r.rating <= 2) {
            let recommendation = match record.feedback_type {
                FeedbackType::Incomplete => "Provide more comprehensive answers",
                FeedbackType::Incorrect => "Improve factual accuracy",
                _ => continue,
            };
            if !recommended_improvements.iter().any(|r| r == recommendation) {
                recommended_improvements.push(recommendation.to_string());
            }
        }

        let total: u64 = records.iter().map(|r| r.rating as u64).sum();

        PersonalizedInsights {
            session_id: session_id.to_string(),
            preferences,
            recommended_improvements,
            satisfaction_score: total as f64 / records.len() as f64,
            feedback_count: records.len(),
        }
    }

    /// Apply learned adjustments to a candidate response. Deterministic for
    /// a fixed feedback set.
    pub fn adapt_response(&self, candidate: &str, context: &AdaptationContext) -> AdaptiveResponse {
        let metrics = self.metrics();
        let len = candidate.chars().count();
        let mut confidence = BASE_CONFIDENCE;
        let mut adaptations: Vec<String> = Vec::new();
        let mut adapted = candidate.to_string();

        let improves = |area: &str| metrics.improvement_areas.iter().any(|a| a == area);
        let succeeds = |pattern: &str| metrics.successful_patterns.iter().any(|p| p == pattern);

        if improves("provide_more_detail") && len < 200 {
            adaptations.push("Added more detailed explanation".to_string());
            adapted.push_str(DETAIL_ADDENDUM);
            confidence += 0.1;
        }
        if improves("improve_accuracy") {
            adaptations.push("Enhanced accuracy verification".to_string());
            adapted.push_str(ACCURACY_ADDENDUM);
            confidence += 0.1;
        }
        if succeeds("detailed_responses") && len < 300 {
            adaptations.push("Expanded response based on successful patterns".to_string());
            adapted.push_str(EXPANSION_ADDENDUM);
            confidence += 0.15;
        }

        let reason = if adaptations.is_empty() {
            NO_ADAPTATION.to_string()
        } else {
            adaptations.join(", ")
        };

        debug!(
            session_id = context.session_id.as_deref().unwrap_or("-"),
            adaptations = adaptations.len(),
            "Adapted response"
        );

        AdaptiveResponse {
            original: candidate.to_string(),
            adapted,
            reason,
            confidence: confidence.min(1.0),
            adaptations,
        }
    }

    pub fn export_all(&self) -> LearningExport {
        let state = self.state.read();
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_rating: BTreeMap<u8, usize> = BTreeMap::new();

        for record in &state.records {
            *by_type.entry(record.feedback_type.as_str().to_string()).or_default() += 1;
            *by_rating.entry(record.rating).or_default() += 1;
        }

        let metrics = state.metrics.clone();
        LearningExport {
            summary: FeedbackSummary {
                by_type,
                by_rating,
                total: state.records.len(),
            },
            insights: ExportInsights {
                top_improvement_areas: metrics.improvement_areas.clone(),
                top_success_patterns: metrics.successful_patterns.clone(),
                satisfaction_trend: metrics.satisfaction_trend.clone(),
            },
            metrics,
        }
    }
}
