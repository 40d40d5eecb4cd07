//! Prompt construction and reply parsing for model backends

use crate::advice::{
    AdviceContent, AdviceRequest, Complexity, EmotionalTone, SituationAnalysis, SituationType,
};
use crate::context::AdviceContext;
use crate::heuristics;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use std::sync::OnceLock;

const RESPONSE_FORMAT: &str = r#"{
  "situation_analysis": {
    "type": "professional|romantic|family|friendship|apology|conflict_resolution",
    "complexity": "low|medium|high",
    "emotional_tone": "positive|neutral|negative|anxious",
    "key_challenges": ["challenge1", "challenge2"],
    "success_factors": ["factor1", "factor2"]
  },
  "strategy": "Main approach and mindset for this conversation (2-3 sentences)",
  "key_points": [
    "First key point to remember",
    "Second key point to remember",
    "Third key point to remember"
  ],
  "helpful_phrases": [
    "Exact phrase they could use",
    "Another helpful phrase",
    "Third option for key moments"
  ],
  "pitfalls": [
    "What to avoid saying or doing",
    "Common mistake to watch out for",
    "Timing or approach pitfall"
  ],
  "preparation_steps": [
    "What to do before the conversation",
    "How to prepare mentally/emotionally",
    "What information to gather"
  ],
  "follow_up_considerations": [
    "What to do after the conversation",
    "How to maintain the relationship",
    "Next steps if things go well/poorly"
  ]
}"#;

/// Build the instruction prompt sent to every model backend
pub fn build_advice_prompt(request: &AdviceRequest, context: &AdviceContext) -> String {
    let relationship = if request.relationship.trim().is_empty() {
        "unspecified"
    } else {
        request.relationship.trim()
    };

    let background = match &context.profile {
        Some(profile) => format!(
            "Communication style: {}\nPast successes: {}\nAreas for growth: {}",
            profile.style,
            profile.strengths.join(", "),
            profile.challenges.join(", ")
        ),
        None => "No previous conversation history available".to_string(),
    };

    let experiences = if context.memories.is_empty() {
        "No relevant past experiences to reference".to_string()
    } else {
        context
            .memories
            .iter()
            .map(|m| format!("- {}", m.summary))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut prompt = format!(
        "You are an expert conversation coach helping someone prepare for an important conversation.\n\n\
         SITUATION:\n\"{}\"\n\n\
         CONTEXT:\n- Setting: {}\n- Relationship: {}\n- Urgency: {}\n\n\
         USER BACKGROUND:\n{}\n\n\
         RELEVANT PAST EXPERIENCES:\n{}\n",
        request.situation,
        request.context.as_str(),
        relationship,
        request.urgency.as_str(),
        background,
        experiences,
    );

    if !context.successful_strategies.is_empty() {
        prompt.push_str("\nAPPROACHES THAT WORKED BEFORE:\n");
        for strategy in context.successful_strategies.iter().take(3) {
            prompt.push_str(&format!("- {}\n", strategy));
        }
    }

    prompt.push_str(
        "\nPlease provide specific, actionable conversation advice in this exact JSON format:\n",
    );
    prompt.push_str(RESPONSE_FORMAT);
    prompt.push_str(
        "\n\nMake the advice specific to their situation, personalized based on their background, \
         and actionable. Avoid generic platitudes.",
    );
    prompt
}

/// Accepts a list of strings, a single string, or a list of arbitrary values
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAnalysis {
    #[serde(rename = "type", alias = "situationType", alias = "situation_type")]
    situation_type: Option<String>,
    #[serde(alias = "emotionalTone")]
    emotional_tone: Option<String>,
    complexity: Option<String>,
    #[serde(alias = "keyChallenges", deserialize_with = "lenient_list")]
    key_challenges: Vec<String>,
    #[serde(alias = "successFactors", deserialize_with = "lenient_list")]
    success_factors: Vec<String>,
}

/// Backend reply as models actually write it: either snake_case or camelCase
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAdvice {
    strategy: Option<String>,
    #[serde(alias = "keyPoints", deserialize_with = "lenient_list")]
    key_points: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    pitfalls: Vec<String>,
    #[serde(alias = "helpfulPhrases", deserialize_with = "lenient_list")]
    helpful_phrases: Vec<String>,
    #[serde(alias = "situationAnalysis")]
    situation_analysis: Option<RawAnalysis>,
    #[serde(alias = "preparationSteps", deserialize_with = "lenient_list")]
    preparation_steps: Vec<String>,
    #[serde(alias = "followUpConsiderations", deserialize_with = "lenient_list")]
    follow_up_considerations: Vec<String>,
}

impl RawAdvice {
    fn has_required_fields(&self) -> bool {
        self.strategy.as_deref().is_some_and(|s| !s.trim().is_empty())
            && !self.key_points.is_empty()
            && !self.helpful_phrases.is_empty()
    }
}

fn json_object_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid json object regex"))
}

fn list_item_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(.+)$").expect("valid list regex"))
}

fn quote_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"\n]{3,})"|“([^”\n]{3,})”"#).expect("valid quote regex"))
}

/// Analysis from the reply where present, heuristics for anything missing
fn analysis_for(situation: &str, raw: Option<RawAnalysis>) -> SituationAnalysis {
    let classification = heuristics::classify_situation(situation);
    let raw = raw.unwrap_or_default();

    let situation_type = raw
        .situation_type
        .as_deref()
        .and_then(SituationType::from_str)
        .unwrap_or(classification.situation_type);
    let emotional_tone = raw
        .emotional_tone
        .as_deref()
        .and_then(EmotionalTone::from_str)
        .unwrap_or_else(|| heuristics::emotional_tone(situation));
    let complexity = raw
        .complexity
        .as_deref()
        .and_then(Complexity::from_str)
        .unwrap_or_else(|| heuristics::complexity(situation));

    SituationAnalysis {
        situation_type,
        confidence: classification.confidence,
        emotional_tone,
        complexity,
        keywords: classification.keywords,
        key_challenges: if raw.key_challenges.is_empty() {
            heuristics::key_challenges(situation)
        } else {
            raw.key_challenges
        },
        success_factors: raw.success_factors,
    }
}

/// Parse a backend reply into advice content
///
/// The result is not validated here; callers check it with
/// `AdviceContent::validate` and fall back when it is unusable.
pub fn parse_advice_response(response: &str, situation: &str) -> AdviceContent {
    if let Some(found) = json_object_pattern().find(response) {
        if let Ok(raw) = serde_json::from_str::<RawAdvice>(found.as_str()) {
            if raw.has_required_fields() {
                return AdviceContent {
                    strategy: raw.strategy.unwrap_or_default().trim().to_string(),
                    key_points: raw.key_points,
                    pitfalls: raw.pitfalls,
                    helpful_phrases: raw.helpful_phrases,
                    situation_analysis: analysis_for(situation, raw.situation_analysis),
                    preparation_steps: raw.preparation_steps,
                    follow_up_considerations: raw.follow_up_considerations,
                    ..Default::default()
                };
            }
        }
    }

    extract_from_text(response, situation)
}

fn list_items(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| list_item_pattern().captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn items_with(items: &[String], keywords: &[&str]) -> Vec<String> {
    items
        .iter()
        .filter(|item| {
            let lower = item.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
        .cloned()
        .collect()
}

fn quoted_phrases(text: &str) -> Vec<String> {
    quote_pattern()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Best-effort extraction from prose; empty sections stay empty
fn extract_from_text(response: &str, situation: &str) -> AdviceContent {
    const PITFALL_WORDS: &[&str] = &["avoid", "don't", "do not", "never"];

    let items = list_items(response);
    let pitfalls = items_with(&items, PITFALL_WORDS);

    let mut key_points = items_with(&items, &["key", "important", "remember"]);
    if key_points.is_empty() {
        key_points = items
            .iter()
            .filter(|item| !pitfalls.contains(item))
            .cloned()
            .collect();
    }

    let strategy = response
        .split("\n\n")
        .map(str::trim)
        .find(|paragraph| {
            !paragraph.is_empty()
                && !paragraph.starts_with('{')
                && !list_item_pattern().is_match(paragraph.lines().next().unwrap_or_default())
        })
        .map(|paragraph| heuristics::truncate_chars(paragraph, 400))
        .unwrap_or_default();

    AdviceContent {
        strategy,
        key_points,
        helpful_phrases: quoted_phrases(response),
        preparation_steps: items_with(&items, &["prepare", "before", "ready"]),
        follow_up_considerations: items_with(&items, &["after", "follow", "next"]),
        pitfalls,
        situation_analysis: analysis_for(situation, None),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::Urgency;
    use crate::context::{RelevantMemory, UserProfile};
    use crate::heuristics::Sentiment;

    #[test]
    fn test_prompt_includes_request_and_context() {
        let request = AdviceRequest::new("Asking for a raise")
            .with_relationship("manager")
            .with_urgency(Urgency::High);
        let context = AdviceContext {
            memories: vec![RelevantMemory {
                relevance: 1,
                summary: "Negotiated salary at my last job".to_string(),
                topics: vec![],
                sentiment: Sentiment::Positive,
            }],
            successful_strategies: vec!["Lead with data".to_string()],
            profile: Some(UserProfile {
                style: "direct".to_string(),
                strengths: vec!["preparation".to_string()],
                challenges: vec!["patience".to_string()],
            }),
        };

        let prompt = build_advice_prompt(&request, &context);
        assert!(prompt.contains("\"Asking for a raise\""));
        assert!(prompt.contains("Relationship: manager"));
        assert!(prompt.contains("Urgency: high"));
        assert!(prompt.contains("Communication style: direct"));
        assert!(prompt.contains("- Negotiated salary at my last job"));
        assert!(prompt.contains("- Lead with data"));
        assert!(prompt.contains("\"helpful_phrases\""));
    }

    #[test]
    fn test_prompt_without_history() {
        let prompt = build_advice_prompt(&AdviceRequest::new("hi"), &AdviceContext::default());
        assert!(prompt.contains("No previous conversation history available"));
        assert!(prompt.contains("No relevant past experiences to reference"));
        assert!(prompt.contains("Relationship: unspecified"));
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let reply = r#"Sure! Here is my advice:
{
  "situation_analysis": {"type": "apology", "complexity": "low", "emotional_tone": "anxious"},
  "strategy": "Own the mistake plainly.",
  "key_points": ["Name what you did"],
  "helpful_phrases": ["I was wrong"],
  "pitfalls": ["Don't explain it away"]
}
Good luck!"#;
        let advice = parse_advice_response(reply, "I forgot her birthday");
        assert_eq!(advice.strategy, "Own the mistake plainly.");
        assert_eq!(advice.key_points, vec!["Name what you did"]);
        assert_eq!(advice.situation_analysis.situation_type, SituationType::Apology);
        assert_eq!(advice.situation_analysis.emotional_tone, EmotionalTone::Anxious);
        assert!(advice.is_valid());
    }

    #[test]
    fn test_parse_accepts_camel_case() {
        let reply = r#"{
            "strategy": "Be direct",
            "keyPoints": ["Know your ask"],
            "helpfulPhrases": ["I'd like to talk about my role"],
            "situationAnalysis": {"type": "professional", "emotionalTone": "neutral"},
            "followUpConsiderations": ["Send a recap"]
        }"#;
        let advice = parse_advice_response(reply, "raise");
        assert!(advice.is_valid());
        assert_eq!(advice.helpful_phrases, vec!["I'd like to talk about my role"]);
        assert_eq!(advice.follow_up_considerations, vec!["Send a recap"]);
        assert_eq!(
            advice.situation_analysis.situation_type,
            SituationType::Professional
        );
    }

    #[test]
    fn test_parse_natural_language() {
        let reply = "Start by acknowledging how long it has been since your last review.\n\n\
                     - Remember to bring your metrics\n\
                     - Avoid comparing yourself to coworkers\n\
                     - Prepare a specific number before the meeting\n\n\
                     You could open with \"I'd like to discuss my compensation\".";
        let advice = parse_advice_response(reply, "My boss hasn't given me a raise");
        assert!(advice.strategy.starts_with("Start by acknowledging"));
        assert_eq!(advice.key_points, vec!["Remember to bring your metrics"]);
        assert_eq!(advice.pitfalls, vec!["Avoid comparing yourself to coworkers"]);
        assert_eq!(advice.helpful_phrases, vec!["I'd like to discuss my compensation"]);
        assert_eq!(advice.preparation_steps.len(), 1);
        assert!(advice.is_valid());
    }

    #[test]
    fn test_parse_injects_no_defaults() {
        let advice = parse_advice_response("I don't know.", "anything");
        assert!(advice.key_points.is_empty());
        assert!(advice.helpful_phrases.is_empty());
        assert!(!advice.is_valid());

        let advice = parse_advice_response("", "anything");
        assert!(!advice.is_valid());
    }

    #[test]
    fn test_parse_incomplete_json_falls_through() {
        let advice = parse_advice_response(r#"{"strategy": "only this"}"#, "x");
        assert!(!advice.is_valid());
    }
}
