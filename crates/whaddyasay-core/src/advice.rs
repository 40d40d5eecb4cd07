//! Advice request and result types
//!
//! `AdviceResult` is the single canonical shape every backend reply is
//! normalized into. Field names are snake_case; camelCase replies from models
//! are accepted by the parser in `prompt.rs`, never produced.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Setting in which the conversation takes place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationContext {
    Work,
    Family,
    Friends,
    Romantic,
    #[default]
    General,
}

impl ConversationContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationContext::Work => "work",
            ConversationContext::Family => "family",
            ConversationContext::Friends => "friends",
            ConversationContext::Romantic => "romantic",
            ConversationContext::General => "general",
        }
    }

    /// Unknown values fall back to `General`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "work" | "professional" => ConversationContext::Work,
            "family" => ConversationContext::Family,
            "friends" | "friend" | "friendship" => ConversationContext::Friends,
            "romantic" | "partner" => ConversationContext::Romantic,
            _ => ConversationContext::General,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }

    /// Unknown values fall back to `Medium`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Urgency::Low,
            "high" => Urgency::High,
            _ => Urgency::Medium,
        }
    }
}

/// A single request for conversation advice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceRequest {
    pub situation: String,
    #[serde(default)]
    pub context: ConversationContext,
    #[serde(default)]
    pub relationship: String,
    #[serde(default)]
    pub urgency: Urgency,
}

impl AdviceRequest {
    pub fn new(situation: impl Into<String>) -> Self {
        Self {
            situation: situation.into(),
            context: ConversationContext::General,
            relationship: String::new(),
            urgency: Urgency::Medium,
        }
    }

    pub fn with_context(mut self, context: ConversationContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_relationship(mut self, relationship: impl Into<String>) -> Self {
        self.relationship = relationship.into();
        self
    }

    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = urgency;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SituationType {
    Professional,
    Romantic,
    Family,
    Friendship,
    Apology,
    ConflictResolution,
    #[default]
    General,
}

impl SituationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SituationType::Professional => "professional",
            SituationType::Romantic => "romantic",
            SituationType::Family => "family",
            SituationType::Friendship => "friendship",
            SituationType::Apology => "apology",
            SituationType::ConflictResolution => "conflict_resolution",
            SituationType::General => "general",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "professional" => Some(SituationType::Professional),
            "romantic" => Some(SituationType::Romantic),
            "family" => Some(SituationType::Family),
            "friendship" => Some(SituationType::Friendship),
            "apology" => Some(SituationType::Apology),
            "conflict_resolution" | "conflict" => Some(SituationType::ConflictResolution),
            "general" => Some(SituationType::General),
            _ => None,
        }
    }

    pub fn all() -> Vec<SituationType> {
        vec![
            SituationType::Professional,
            SituationType::Romantic,
            SituationType::Family,
            SituationType::Friendship,
            SituationType::Apology,
            SituationType::ConflictResolution,
            SituationType::General,
        ]
    }
}

impl fmt::Display for SituationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalTone {
    Positive,
    #[default]
    Neutral,
    Negative,
    Anxious,
}

impl EmotionalTone {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionalTone::Positive => "positive",
            EmotionalTone::Neutral => "neutral",
            EmotionalTone::Negative => "negative",
            EmotionalTone::Anxious => "anxious",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Some(EmotionalTone::Positive),
            "neutral" => Some(EmotionalTone::Neutral),
            "negative" => Some(EmotionalTone::Negative),
            "anxious" => Some(EmotionalTone::Anxious),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    #[default]
    Medium,
    High,
}

impl Complexity {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Complexity::Low),
            "medium" => Some(Complexity::Medium),
            "high" => Some(Complexity::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SituationAnalysis {
    #[serde(rename = "type")]
    pub situation_type: SituationType,
    pub confidence: f32,
    pub emotional_tone: EmotionalTone,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub key_challenges: Vec<String>,
    #[serde(default)]
    pub success_factors: Vec<String>,
}

/// Where a result was computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceSource {
    LocalModel,
    ServerModel,
    CloudModel,
    Template,
}

impl AdviceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdviceSource::LocalModel => "local_model",
            AdviceSource::ServerModel => "server_model",
            AdviceSource::CloudModel => "cloud_model",
            AdviceSource::Template => "template",
        }
    }

    pub fn privacy_level(&self) -> PrivacyLevel {
        match self {
            AdviceSource::LocalModel | AdviceSource::ServerModel => PrivacyLevel::Complete,
            AdviceSource::CloudModel => PrivacyLevel::CloudProcessed,
            AdviceSource::Template => PrivacyLevel::TemplateBased,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    Complete,
    CloudProcessed,
    TemplateBased,
}

impl PrivacyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Complete => "complete",
            PrivacyLevel::CloudProcessed => "cloud_processed",
            PrivacyLevel::TemplateBased => "template_based",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PrivacyLevel::Complete => "Processed entirely on this device",
            PrivacyLevel::CloudProcessed => "Processed by a cloud provider with your consent",
            PrivacyLevel::TemplateBased => "Generated from built-in templates on this device",
        }
    }
}

/// The advice content itself, before source metadata is attached
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AdviceContent {
    pub strategy: String,
    pub key_points: Vec<String>,
    pub pitfalls: Vec<String>,
    pub helpful_phrases: Vec<String>,
    pub situation_analysis: SituationAnalysis,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preparation_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_considerations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub personal_insights: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confidence_boosters: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urgency_considerations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_questions: Vec<String>,
}

impl AdviceContent {
    /// A reply is usable only with a strategy, a key point, and a phrase
    pub fn validate(&self) -> Result<(), String> {
        if self.strategy.trim().is_empty() {
            return Err("missing strategy".to_string());
        }
        if !self.key_points.iter().any(|p| !p.trim().is_empty()) {
            return Err("no key points".to_string());
        }
        if !self.helpful_phrases.iter().any(|p| !p.trim().is_empty()) {
            return Err("no helpful phrases".to_string());
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Finished advice handed back to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceResult {
    #[serde(flatten)]
    pub content: AdviceContent,
    pub source: AdviceSource,
    pub privacy_level: PrivacyLevel,
    pub model: String,
    pub generated_at: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub emergency: bool,
}

impl AdviceResult {
    pub fn new(content: AdviceContent, source: AdviceSource, model: impl Into<String>) -> Self {
        Self {
            content,
            source,
            privacy_level: source.privacy_level(),
            model: model.into(),
            generated_at: chrono::Utc::now().to_rfc3339(),
            emergency: false,
        }
    }

    pub fn strategy(&self) -> &str {
        &self.content.strategy
    }

    pub fn key_points(&self) -> &[String] {
        &self.content.key_points
    }

    pub fn pitfalls(&self) -> &[String] {
        &self.content.pitfalls
    }

    pub fn helpful_phrases(&self) -> &[String] {
        &self.content.helpful_phrases
    }

    pub fn analysis(&self) -> &SituationAnalysis {
        &self.content.situation_analysis
    }

    pub fn used_llm(&self) -> bool {
        self.source != AdviceSource::Template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content() -> AdviceContent {
        AdviceContent {
            strategy: "Be direct".to_string(),
            key_points: vec!["Know your ask".to_string()],
            helpful_phrases: vec!["I'd like to talk about this".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_accepts_minimal_advice() {
        assert!(content().is_valid());
    }

    #[test]
    fn test_validate_rejects_blank_strategy() {
        let mut c = content();
        c.strategy = "   ".to_string();
        assert_eq!(c.validate(), Err("missing strategy".to_string()));
    }

    #[test]
    fn test_validate_rejects_blank_lists() {
        let mut c = content();
        c.key_points = vec![String::new()];
        assert!(!c.is_valid());

        let mut c = content();
        c.helpful_phrases.clear();
        assert!(!c.is_valid());
    }

    #[test]
    fn test_source_privacy_levels() {
        assert_eq!(AdviceSource::ServerModel.privacy_level(), PrivacyLevel::Complete);
        assert_eq!(AdviceSource::LocalModel.privacy_level(), PrivacyLevel::Complete);
        assert_eq!(AdviceSource::CloudModel.privacy_level(), PrivacyLevel::CloudProcessed);
        assert_eq!(AdviceSource::Template.privacy_level(), PrivacyLevel::TemplateBased);
    }

    #[test]
    fn test_result_serializes_canonical_field_names() {
        let result = AdviceResult::new(content(), AdviceSource::Template, "enhanced-templates");
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("key_points").is_some());
        assert!(json.get("helpful_phrases").is_some());
        assert_eq!(json["situation_analysis"]["type"], "general");
        assert_eq!(json["privacy_level"], "template_based");
        assert!(json.get("emergency").is_none());
    }

    #[test]
    fn test_unknown_context_and_urgency_fall_back() {
        assert_eq!(ConversationContext::parse("spaceship"), ConversationContext::General);
        assert_eq!(ConversationContext::parse("Work"), ConversationContext::Work);
        assert_eq!(Urgency::parse("whenever"), Urgency::Medium);
        assert_eq!(Urgency::parse("HIGH"), Urgency::High);
    }
}
