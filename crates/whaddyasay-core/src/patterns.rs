//! Advice history used for learning and for pattern reports

use crate::advice::{AdviceResult, AdviceSource, SituationType};
use crate::error::Result;
use crate::storage::{ConversationRecord, Settings};
use serde::{Deserialize, Serialize};

pub const PATTERNS_KEY: &str = "advice_patterns";
pub const MAX_PATTERNS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvicePattern {
    pub situation_type: SituationType,
    pub generated_at: String,
    pub used_llm: bool,
    pub source: AdviceSource,
    pub model: String,
    #[serde(default)]
    pub success_rating: Option<u8>,
}

impl AdvicePattern {
    pub fn from_result(result: &AdviceResult) -> Self {
        Self {
            situation_type: result.analysis().situation_type,
            generated_at: result.generated_at.clone(),
            used_llm: result.used_llm(),
            source: result.source,
            model: result.model.clone(),
            success_rating: None,
        }
    }
}

/// Append a pattern, keeping only the most recent entries.
/// Returns the number of stored patterns.
pub fn record_pattern(settings: &Settings, pattern: AdvicePattern) -> Result<usize> {
    let patterns = settings.update(PATTERNS_KEY, |existing: Option<Vec<AdvicePattern>>| {
        let mut patterns = existing.unwrap_or_default();
        patterns.push(pattern);
        if patterns.len() > MAX_PATTERNS {
            let excess = patterns.len() - MAX_PATTERNS;
            patterns.drain(..excess);
        }
        patterns
    })?;
    Ok(patterns.len())
}

pub fn load_patterns(settings: &Settings) -> Result<Vec<AdvicePattern>> {
    Ok(settings.get(PATTERNS_KEY)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeSummary {
    pub situation_type: SituationType,
    pub advice_count: usize,
    pub conversations: usize,
    pub average_rating: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternReport {
    pub total_advice: usize,
    pub llm_generated: usize,
    pub template_generated: usize,
    pub conversations: usize,
    pub rated_conversations: usize,
    pub average_rating: Option<f32>,
    pub by_type: Vec<TypeSummary>,
    pub most_successful: Option<SituationType>,
    pub insights: Vec<String>,
}

fn average(ratings: &[u8]) -> Option<f32> {
    if ratings.is_empty() {
        None
    } else {
        Some(ratings.iter().map(|r| *r as f32).sum::<f32>() / ratings.len() as f32)
    }
}

/// Summarize advice history and rated outcomes, optionally for one type
pub fn analyze_patterns(
    patterns: &[AdvicePattern],
    conversations: &[ConversationRecord],
    filter: Option<SituationType>,
) -> PatternReport {
    let wanted = |t: SituationType| filter.map_or(true, |f| f == t);
    let patterns: Vec<&AdvicePattern> = patterns.iter().filter(|p| wanted(p.situation_type)).collect();
    let conversations: Vec<&ConversationRecord> = conversations
        .iter()
        .filter(|c| wanted(c.situation_type))
        .collect();

    let all_ratings: Vec<u8> = conversations.iter().filter_map(|c| c.success_rating).collect();

    let by_type: Vec<TypeSummary> = SituationType::all()
        .into_iter()
        .filter_map(|situation_type| {
            let advice_count = patterns
                .iter()
                .filter(|p| p.situation_type == situation_type)
                .count();
            let of_type: Vec<&&ConversationRecord> = conversations
                .iter()
                .filter(|c| c.situation_type == situation_type)
                .collect();
            if advice_count == 0 && of_type.is_empty() {
                return None;
            }
            let ratings: Vec<u8> = of_type.iter().filter_map(|c| c.success_rating).collect();
            Some(TypeSummary {
                situation_type,
                advice_count,
                conversations: of_type.len(),
                average_rating: average(&ratings),
            })
        })
        .collect();

    let most_successful = by_type
        .iter()
        .filter_map(|t| t.average_rating.map(|r| (t.situation_type, r)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(t, _)| t);

    let llm_generated = patterns.iter().filter(|p| p.used_llm).count();
    let average_rating = average(&all_ratings);

    let mut insights = Vec::new();
    if let Some(most) = by_type.iter().max_by_key(|t| t.advice_count + t.conversations) {
        insights.push(format!(
            "You most often prepare for {} conversations",
            most.situation_type.as_str().replace('_', " ")
        ));
    }
    if let Some(best) = most_successful {
        insights.push(format!(
            "Your {} conversations tend to go best",
            best.as_str().replace('_', " ")
        ));
    }
    match average_rating {
        Some(avg) if avg >= 4.0 => {
            insights.push("Most of your prepared conversations went well".to_string())
        }
        Some(avg) if avg < 3.0 => insights.push(
            "Recent conversations were tough; shorter, more focused openings may help".to_string(),
        ),
        Some(_) => {}
        None if !conversations.is_empty() => insights
            .push("Record how conversations went to get more personal advice".to_string()),
        None => {}
    }

    PatternReport {
        total_advice: patterns.len(),
        llm_generated,
        template_generated: patterns.len() - llm_generated,
        conversations: conversations.len(),
        rated_conversations: all_ratings.len(),
        average_rating,
        by_type,
        most_successful,
        insights,
    }
}
