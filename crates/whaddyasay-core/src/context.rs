//! Personal context gathered for a request: related memories, past
//! successes, and the stored communication profile.

use crate::advice::SituationType;
use crate::heuristics::{self, Sentiment};
use crate::storage::{ConversationRecord, MemoryRecord};
use serde::{Deserialize, Serialize};

/// Only the first few candidates are scored
const MEMORY_SCAN_LIMIT: usize = 5;
const RELEVANT_MEMORY_LIMIT: usize = 3;
const SUCCESS_RATING_THRESHOLD: u8 = 4;

/// A stored memory that shares vocabulary with the current situation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevantMemory {
    pub relevance: usize,
    pub summary: String,
    pub topics: Vec<String>,
    pub sentiment: Sentiment,
}

/// Communication profile kept under the `user_profile` setting
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub challenges: Vec<String>,
}

/// Everything a generator may use besides the request itself
#[derive(Debug, Clone, Default)]
pub struct AdviceContext {
    pub memories: Vec<RelevantMemory>,
    pub successful_strategies: Vec<String>,
    pub profile: Option<UserProfile>,
}

impl AdviceContext {
    pub fn has_positive_memories(&self) -> bool {
        self.memories.iter().any(|m| m.sentiment == Sentiment::Positive)
    }
}

/// Score memories against the situation and keep the best three
pub fn relevant_memories(situation: &str, memories: &[MemoryRecord]) -> Vec<RelevantMemory> {
    let mut relevant: Vec<RelevantMemory> = memories
        .iter()
        .filter(|m| m.is_readable())
        .take(MEMORY_SCAN_LIMIT)
        .filter_map(|memory| {
            let text = memory.searchable_text();
            let relevance = heuristics::keyword_relevance(situation, &text);
            if relevance == 0 {
                return None;
            }
            let processed = memory.processed.clone().unwrap_or_default();
            let summary = if processed.summary.is_empty() {
                heuristics::truncate_chars(&memory.content, 100)
            } else {
                processed.summary
            };
            Some(RelevantMemory {
                relevance,
                summary,
                topics: processed.topics.into_iter().map(|t| t.topic).collect(),
                sentiment: processed.sentiment,
            })
        })
        .collect();

    relevant.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    relevant.truncate(RELEVANT_MEMORY_LIMIT);
    relevant
}

/// Strategies from past conversations of the same type that went well
pub fn successful_strategies(
    situation_type: SituationType,
    conversations: &[ConversationRecord],
) -> Vec<String> {
    conversations
        .iter()
        .filter(|c| c.situation_type == situation_type)
        .filter(|c| c.success_rating.unwrap_or(0) >= SUCCESS_RATING_THRESHOLD)
        .filter_map(|c| c.advice.as_ref().map(|a| a.strategy().to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryRecord;

    fn memory(content: &str) -> MemoryRecord {
        MemoryRecord::new("", content)
    }

    #[test]
    fn test_relevant_memories_ranked_and_capped() {
        let memories = vec![
            memory("Asked my boss for a raise last spring and prepared numbers"),
            memory("Went hiking with friends"),
            memory("My boss liked the raise proposal"),
            memory("Boss meeting went fine"),
            memory("Raise conversation with boss, salary review, boss agreed"),
        ];
        let relevant = relevant_memories("asking my boss for a raise", &memories);
        assert!(!relevant.is_empty());
        assert!(relevant.len() <= 3);
        assert!(relevant.windows(2).all(|w| w[0].relevance >= w[1].relevance));
        assert!(relevant.iter().all(|m| !m.summary.contains("hiking")));
    }

    #[test]
    fn test_relevant_memories_skips_unreadable() {
        let mut broken = memory("boss raise boss raise");
        broken.decryption_error = true;
        let relevant = relevant_memories("boss raise", &[broken]);
        assert!(relevant.is_empty());
    }
}
