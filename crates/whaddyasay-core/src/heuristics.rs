//! Keyword heuristics for situations and stored memories
//!
//! Every function here is total: any input text, including an empty string,
//! yields one of the documented labels.

use crate::advice::{Complexity, EmotionalTone, SituationType};
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

const PROFESSIONAL: &[&str] = &[
    "boss", "manager", "raise", "promotion", "work", "job", "colleague", "meeting", "performance",
    "feedback",
];
const ROMANTIC: &[&str] = &[
    "partner", "spouse", "boyfriend", "girlfriend", "relationship", "dating", "love", "romantic",
];
const FAMILY: &[&str] = &[
    "family", "parent", "mother", "father", "sibling", "brother", "sister", "child", "teenager",
];
const FRIENDSHIP: &[&str] = &["friend", "buddy", "pal", "friendship", "social", "group"];
const APOLOGY: &[&str] = &["apolog", "sorry", "mistake", "wrong", "forgive", "fault", "error"];
const CONFLICT: &[&str] = &[
    "conflict", "argument", "fight", "disagree", "dispute", "tension", "angry", "upset",
];

/// Classification rules in priority order: the first matching rule wins
const SITUATION_RULES: &[(SituationType, &[&str], f32)] = &[
    (SituationType::Professional, PROFESSIONAL, 0.8),
    (SituationType::Romantic, ROMANTIC, 0.8),
    (SituationType::Family, FAMILY, 0.8),
    (SituationType::Friendship, FRIENDSHIP, 0.7),
    (SituationType::Apology, APOLOGY, 0.9),
    (SituationType::ConflictResolution, CONFLICT, 0.8),
];

const GENERAL_CONFIDENCE: f32 = 0.5;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub situation_type: SituationType,
    pub confidence: f32,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionScore {
    pub emotion: String,
    pub score: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicScore {
    pub topic: String,
    pub relevance: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub frequency: usize,
}

/// Text analysis attached to a stored memory
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessedContent {
    pub summary: String,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub emotions: Vec<EmotionScore>,
    #[serde(default)]
    pub emotion_confidence: f32,
    #[serde(default)]
    pub topics: Vec<TopicScore>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub searchable_content: String,
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

fn matching<'a>(text: &str, keywords: &[&'a str]) -> Vec<&'a str> {
    keywords.iter().copied().filter(|k| text.contains(k)).collect()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Truncate on a character boundary
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

pub fn classify_situation(situation: &str) -> Classification {
    let lower = situation.to_lowercase();

    for (situation_type, keywords, confidence) in SITUATION_RULES {
        let hits = matching(&lower, keywords);
        if !hits.is_empty() {
            return Classification {
                situation_type: *situation_type,
                confidence: *confidence,
                keywords: hits.into_iter().map(String::from).collect(),
            };
        }
    }

    Classification {
        situation_type: SituationType::General,
        confidence: GENERAL_CONFIDENCE,
        keywords: Vec::new(),
    }
}

pub fn emotional_tone(text: &str) -> EmotionalTone {
    let lower = text.to_lowercase();
    if contains_any(&lower, &["angry", "mad", "furious", "frustrated", "upset", "annoyed"]) {
        EmotionalTone::Negative
    } else if contains_any(&lower, &["happy", "excited", "positive", "good", "great", "wonderful"]) {
        EmotionalTone::Positive
    } else if contains_any(&lower, &["nervous", "anxious", "worried", "scared", "afraid", "stress"]) {
        EmotionalTone::Anxious
    } else {
        EmotionalTone::Neutral
    }
}

pub fn complexity(text: &str) -> Complexity {
    let lower = text.to_lowercase();
    let words = word_count(&lower);
    if words > 50 || contains_any(&lower, &["complex", "complicated", "multiple", "several", "many"]) {
        Complexity::High
    } else if words < 20 {
        Complexity::Low
    } else {
        Complexity::Medium
    }
}

pub fn sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();
    let positive = [
        "good", "great", "excellent", "happy", "love", "wonderful", "amazing", "fantastic", "perfect",
    ];
    let negative = [
        "bad", "terrible", "hate", "angry", "frustrated", "disappointed", "awful", "horrible",
        "frustrating",
    ];
    let pos = positive.iter().filter(|w| lower.contains(*w)).count();
    let neg = negative.iter().filter(|w| lower.contains(*w)).count();

    match pos.cmp(&neg) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

/// Emotion indicators found in the text, with an overall confidence
pub fn emotions(text: &str) -> (Vec<EmotionScore>, f32) {
    const EMOTIONS: &[(&str, &[&str])] = &[
        ("joy", &["happy", "joyful", "excited", "pleased", "delighted", "cheerful"]),
        ("sadness", &["sad", "depressed", "down", "melancholy", "grief", "sorrow"]),
        ("anger", &["angry", "mad", "furious", "irritated", "annoyed", "rage"]),
        ("fear", &["afraid", "scared", "worried", "anxious", "nervous", "fearful"]),
        ("surprise", &["surprised", "amazed", "shocked", "astonished", "startled"]),
        ("love", &["love", "adore", "cherish", "affection", "care", "fond"]),
    ];

    let lower = text.to_lowercase();
    let mut total = 0;
    let scores: Vec<EmotionScore> = EMOTIONS
        .iter()
        .filter_map(|(emotion, keywords)| {
            let score = matching(&lower, keywords).len();
            total += score;
            (score > 0).then(|| EmotionScore {
                emotion: emotion.to_string(),
                score,
            })
        })
        .collect();

    let confidence = if total > 0 {
        (total as f32 / 3.0).min(1.0)
    } else {
        0.5
    };
    (scores, confidence)
}

/// Up to three topics, most relevant first
pub fn topics(text: &str) -> Vec<TopicScore> {
    const TOPICS: &[(&str, &[&str])] = &[
        ("work", &["work", "job", "career", "office", "business", "professional", "meeting", "project"]),
        ("family", &["family", "mother", "father", "parent", "child", "sibling", "home", "kids"]),
        (
            "relationships",
            &["relationship", "partner", "boyfriend", "girlfriend", "spouse", "love", "dating"],
        ),
        ("health", &["health", "medical", "doctor", "hospital", "medicine", "illness", "treatment"]),
        ("travel", &["travel", "trip", "vacation", "journey", "flight", "hotel", "destination"]),
        ("education", &["school", "university", "learning", "study", "education", "class", "teacher"]),
    ];

    let lower = text.to_lowercase();
    let mut scored: Vec<TopicScore> = TOPICS
        .iter()
        .map(|(topic, keywords)| TopicScore {
            topic: topic.to_string(),
            relevance: matching(&lower, keywords).len(),
        })
        .filter(|t| t.relevance > 0)
        .collect();

    // Stable sort keeps table order between ties
    scored.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    scored.truncate(3);
    scored
}

fn name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z]+\b").expect("valid name regex"))
}

fn date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b\d{1,2}/\d{1,2}/\d{2,4}\b|\b\d{4}-\d{2}-\d{2}\b").expect("valid date regex")
    })
}

/// Capitalized words as people, plus numeric dates
pub fn entities(text: &str) -> Vec<Entity> {
    let mut seen = HashSet::new();
    let mut result: Vec<Entity> = name_pattern()
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|name| seen.insert(*name))
        .take(5)
        .map(|name| Entity {
            entity: name.to_string(),
            kind: "person".to_string(),
            confidence: 0.7,
        })
        .collect();

    result.extend(date_pattern().find_iter(text).map(|m| Entity {
        entity: m.as_str().to_string(),
        kind: "date".to_string(),
        confidence: 0.9,
    }));

    result
}

pub fn summary(text: &str) -> String {
    if text.chars().count() <= 100 {
        return text.to_string();
    }

    let sentences: Vec<&str> = text
        .split(|c| matches!(c, '.' | '!' | '?'))
        .map(str::trim)
        .filter(|s| s.chars().count() > 10)
        .collect();

    if sentences.len() <= 2 {
        return format!("{}...", truncate_chars(text, 100));
    }

    let first = sentences[0];
    let middle = sentences[sentences.len() / 2];
    truncate_chars(&format!("{}. {}.", first, middle), 200)
}

/// Most frequent meaningful words
pub fn semantic_tokens(text: &str) -> Vec<Token> {
    let lower = text.to_lowercase();
    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();

    for word in lower.split_whitespace() {
        if word.chars().count() <= 3 || STOP_WORDS.contains(&word) {
            continue;
        }
        let entry = counts.entry(word).or_insert(0);
        if *entry == 0 {
            order.push(word);
        }
        *entry += 1;
    }

    let mut tokens: Vec<Token> = order
        .into_iter()
        .map(|w| Token {
            token: w.to_string(),
            frequency: counts[w],
        })
        .collect();
    tokens.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    tokens.truncate(10);
    tokens
}

pub fn key_challenges(situation: &str) -> Vec<String> {
    let lower = situation.to_lowercase();
    let mut challenges = Vec::new();

    if contains_any(&lower, &["difficult", "hard"]) {
        challenges.push("Managing emotional difficulty".to_string());
    }
    if contains_any(&lower, &["first time", "never"]) {
        challenges.push("Lack of experience with this situation".to_string());
    }
    if contains_any(&lower, &["important", "critical"]) {
        challenges.push("High stakes conversation".to_string());
    }
    if contains_any(&lower, &["upset", "angry"]) {
        challenges.push("Managing emotions".to_string());
    }

    if challenges.is_empty() {
        vec!["Communicating clearly".to_string(), "Managing expectations".to_string()]
    } else {
        challenges
    }
}

pub fn success_factors(has_positive_memories: bool) -> Vec<String> {
    let mut factors = vec![
        "Clear communication".to_string(),
        "Active listening".to_string(),
        "Empathy and understanding".to_string(),
    ];
    if has_positive_memories {
        factors.push("Building on past successful conversations".to_string());
    }
    factors
}

fn stemmer() -> &'static Stemmer {
    static STEMMER: OnceLock<Stemmer> = OnceLock::new();
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

/// Stemmed content words, used to relate memories to a situation
pub fn stems(text: &str) -> HashSet<String> {
    let stemmer = stemmer();
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .map(|w| stemmer.stem(w).into_owned())
        .collect()
}

/// Number of situation stems that also occur in the memory text
pub fn keyword_relevance(situation: &str, memory_text: &str) -> usize {
    let wanted = stems(situation);
    let found = stems(memory_text);
    wanted.intersection(&found).count()
}

/// Analysis stored alongside a memory when it is saved
pub fn process_memory(title: &str, content: &str, tags: &[String]) -> ProcessedContent {
    let full_text = [title, content]
        .iter()
        .filter(|s| !s.trim().is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    if full_text.trim().is_empty() {
        return ProcessedContent {
            emotion_confidence: 0.5,
            searchable_content: tags.join(" "),
            ..Default::default()
        };
    }

    let (emotions, emotion_confidence) = emotions(&full_text);
    let mut processed = ProcessedContent {
        summary: summary(&full_text),
        sentiment: sentiment(&full_text),
        emotions,
        emotion_confidence,
        topics: topics(&full_text),
        entities: entities(&full_text),
        tokens: semantic_tokens(&full_text),
        searchable_content: String::new(),
    };

    let mut parts: Vec<String> = vec![full_text.clone(), processed.summary.clone()];
    parts.extend(processed.topics.iter().map(|t| t.topic.clone()));
    parts.extend(processed.entities.iter().map(|e| e.entity.clone()));
    parts.extend(processed.tokens.iter().map(|t| t.token.clone()));
    parts.extend(tags.iter().cloned());
    processed.searchable_content = parts.join(" ");

    processed
}
