//! Template advice generator
//!
//! The lowest tier of the fallback chain. `generate` is pure and total: for
//! any request it returns advice that passes `AdviceContent::validate`.

use crate::advice::{
    AdviceContent, AdviceRequest, AdviceResult, AdviceSource, EmotionalTone, SituationAnalysis,
    SituationType, Urgency,
};
use crate::context::AdviceContext;
use crate::heuristics;

pub const TEMPLATE_MODEL: &str = "enhanced-templates";
pub const EMERGENCY_MODEL: &str = "basic-templates";

struct Template {
    strategy: &'static str,
    key_points: &'static [&'static str],
    helpful_phrases: &'static [&'static str],
    pitfalls: &'static [&'static str],
    preparation_steps: &'static [&'static str],
    follow_up: &'static [&'static str],
}

const PROFESSIONAL: Template = Template {
    strategy: "Approach this professionally with clear objectives and supporting evidence. \
               Prepare your case in advance and focus on business value and mutual benefit.",
    key_points: &[
        "Prepare specific examples of your contributions and achievements",
        "Research industry standards and company policies",
        "Choose the right time and setting for maximum impact",
        "Be confident but respectful in your communication",
        "Have a clear ask and be prepared to discuss next steps",
    ],
    helpful_phrases: &[
        "I'd like to discuss my role and contributions to the team",
        "Based on my research and performance metrics",
        "I'm hoping we can find a path forward that benefits both of us",
        "I value this opportunity and want to continue growing here",
        "What would need to happen for us to move forward on this?",
    ],
    pitfalls: &[
        "Don't make it personal or emotional",
        "Avoid ultimatums unless you're prepared to follow through",
        "Don't compare yourself negatively to others",
    ],
    preparation_steps: &[
        "Document your achievements",
        "Research company policies",
        "Practice your key points",
    ],
    follow_up: &[
        "Send a follow-up email summarizing what was agreed",
        "Implement feedback received",
        "Schedule regular check-ins",
    ],
};

const ROMANTIC: Template = Template {
    strategy: "Focus on understanding each other's perspectives and finding common ground. \
               Use empathy and active listening.",
    key_points: &[
        "Use 'I' statements to express your feelings without blame",
        "Listen actively to understand their concerns and needs",
        "Find a calm, private moment when you're both relaxed",
        "Focus on solutions and compromise rather than being right",
        "Show appreciation for their willingness to discuss difficult topics",
    ],
    helpful_phrases: &[
        "I've been thinking about us and wanted to share my feelings",
        "Help me understand your perspective on this situation",
        "I love you and want us to work through this together",
        "What would make you feel more comfortable about this?",
        "How can we find a solution that works for both of us?",
    ],
    pitfalls: &[
        "Don't bring up past grievances",
        "Avoid accusatory language",
        "Don't have this conversation when emotions are running high",
    ],
    preparation_steps: &[
        "Name the feeling you want to share",
        "Think about what you need from them",
        "Pick a time without distractions",
    ],
    follow_up: &[
        "Check in on how they're feeling a few days later",
        "Follow through on anything you agreed to change",
        "Keep the conversation open rather than treating it as closed",
    ],
};

const FAMILY: Template = Template {
    strategy: "Lead with care for the relationship and patience for shared history. \
               Focus on understanding rather than winning old arguments.",
    key_points: &[
        "Acknowledge the history without relitigating it",
        "Speak about your own experience rather than their motives",
        "Pick a private setting away from other relatives",
        "Be clear about the one thing you want to change",
        "Accept that family patterns shift slowly",
    ],
    helpful_phrases: &[
        "I care about our family and want us to be closer",
        "I know we see this differently, and I want to understand your side",
        "It would mean a lot to me if we could try something new here",
        "What would help this feel fair to you?",
    ],
    pitfalls: &[
        "Don't bring other family members' opinions into it",
        "Avoid 'you always' and 'you never'",
        "Don't expect one conversation to resolve years of history",
    ],
    preparation_steps: &[
        "Decide what outcome would feel like progress",
        "Recall moments when this relationship worked well",
        "Plan how you'll respond if old arguments resurface",
    ],
    follow_up: &[
        "Acknowledge any effort they make afterwards",
        "Revisit the topic gently if nothing changes",
        "Keep up small positive contact between hard conversations",
    ],
};

const FRIENDSHIP: Template = Template {
    strategy: "Be honest and warm, treating the friendship as something you both want to protect. \
               Speak to the specific behavior, not their character.",
    key_points: &[
        "Start by saying why the friendship matters to you",
        "Describe one specific situation rather than a pattern of complaints",
        "Give them room to share their side",
        "Suggest a concrete change you'd both be comfortable with",
    ],
    helpful_phrases: &[
        "I value our friendship, which is why I want to be honest with you",
        "I felt a bit hurt when this happened, and I wanted to talk about it",
        "Is there something going on that I don't know about?",
        "How can we make this work better for both of us?",
    ],
    pitfalls: &[
        "Don't involve mutual friends before talking to them directly",
        "Avoid raising it over text if it's a serious issue",
        "Don't keep score of past favors",
    ],
    preparation_steps: &[
        "Pick one example to talk about",
        "Think about how they might see the same events",
        "Choose a relaxed, private moment",
    ],
    follow_up: &[
        "Make a point of spending good time together afterwards",
        "Let small slips go while the new habit forms",
        "Thank them for hearing you out",
    ],
};

const APOLOGY: Template = Template {
    strategy: "Take full responsibility without making excuses. \
               Focus on understanding the impact and making amends.",
    key_points: &[
        "Acknowledge specifically what you did wrong",
        "Express genuine remorse for the impact of your actions",
        "Take full responsibility without making excuses",
        "Explain how you'll prevent this from happening again",
        "Ask what you can do to make things right",
    ],
    helpful_phrases: &[
        "I take full responsibility for what happened",
        "I understand how my actions affected you and I'm truly sorry",
        "I was wrong and there's no excuse for what I did",
        "I'm committed to doing better by changing my approach",
        "What can I do to rebuild your trust and make this right?",
    ],
    pitfalls: &[
        "Don't make excuses or justify your actions",
        "Avoid saying 'I'm sorry you feel that way'",
        "Don't expect immediate forgiveness",
    ],
    preparation_steps: &[
        "Write down exactly what you're apologizing for",
        "Think about how it affected them",
        "Decide what you'll do differently",
    ],
    follow_up: &[
        "Show the change through actions over time",
        "Give them space if they need it",
        "Don't bring the apology back up to ask for credit",
    ],
};

const CONFLICT_RESOLUTION: Template = Template {
    strategy: "Stay calm and focus on finding mutually acceptable solutions. \
               Address the issue, not the person.",
    key_points: &[
        "Stay calm and speak in a measured tone",
        "Focus on the specific issue, not personal attacks",
        "Look for common ground and shared goals",
        "Be willing to compromise and find middle ground",
        "Set clear boundaries and expectations going forward",
    ],
    helpful_phrases: &[
        "I can see we have different perspectives on this",
        "Let's focus on finding a solution that works for everyone",
        "I understand you're frustrated, and I want to resolve this",
        "What would it take for us to move forward positively?",
        "Can we agree on some ground rules for handling this?",
    ],
    pitfalls: &[
        "Don't raise your voice or match their intensity",
        "Avoid dragging in unrelated past disagreements",
        "Don't walk away without agreeing on a next step",
    ],
    preparation_steps: &[
        "Separate the facts from your interpretation of them",
        "Identify what you can compromise on",
        "Wait until you're calm enough to listen",
    ],
    follow_up: &[
        "Confirm the agreement in writing if it matters",
        "Check that the agreed changes are holding",
        "Acknowledge progress when you see it",
    ],
};

const GENERAL: Template = Template {
    strategy: "Be clear about what you want from the conversation and stay curious about \
               their point of view. Keep the focus on the issue you came to discuss.",
    key_points: &[
        "Know the one outcome you're hoping for",
        "Listen actively to understand their viewpoint",
        "Express your thoughts clearly and respectfully",
        "Ask questions to clarify understanding",
    ],
    helpful_phrases: &[
        "I'd like to share my thoughts on something",
        "Can you help me understand your perspective?",
        "How can we work together on this?",
        "What would help make this work for both of us?",
    ],
    pitfalls: &[
        "Don't make assumptions about their intentions",
        "Avoid emotional reactions",
        "Don't rush the conversation",
    ],
    preparation_steps: &[
        "Think about your goals",
        "Consider their perspective",
        "Choose the right time and place",
    ],
    follow_up: &[
        "Follow through on commitments",
        "Check in later",
        "Be open to ongoing dialogue",
    ],
};

fn template_for(situation_type: SituationType) -> &'static Template {
    match situation_type {
        SituationType::Professional => &PROFESSIONAL,
        SituationType::Romantic => &ROMANTIC,
        SituationType::Family => &FAMILY,
        SituationType::Friendship => &FRIENDSHIP,
        SituationType::Apology => &APOLOGY,
        SituationType::ConflictResolution => &CONFLICT_RESOLUTION,
        SituationType::General => &GENERAL,
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn personalize_strategy(base: &str, context: &AdviceContext) -> String {
    if !context.successful_strategies.is_empty() {
        format!(
            "{} Based on your past successes, consider building on strategies that have worked well for you before.",
            base
        )
    } else if !context.memories.is_empty() {
        format!(
            "{} Based on your past experiences, consider building on approaches that have worked well for you before.",
            base
        )
    } else {
        base.to_string()
    }
}

fn tone_key_point(tone: EmotionalTone) -> Option<&'static str> {
    match tone {
        EmotionalTone::Anxious => Some("Take time to center yourself before the conversation"),
        EmotionalTone::Negative => Some("Give yourself time to cool down before addressing this"),
        _ => None,
    }
}

fn tone_pitfall(tone: EmotionalTone) -> Option<&'static str> {
    match tone {
        EmotionalTone::Negative => Some("Don't let your anger control the conversation"),
        EmotionalTone::Anxious => Some("Don't let nervousness make you rush through important points"),
        _ => None,
    }
}

fn relationship_phrase(relationship: &str) -> Option<&'static str> {
    match relationship.trim().to_lowercase().as_str() {
        "manager" | "boss" | "supervisor" => {
            Some("I appreciate your leadership and wanted to discuss something with you")
        }
        "partner" | "spouse" | "husband" | "wife" | "boyfriend" | "girlfriend" => {
            Some("Our relationship means everything to me, so I wanted to talk about this")
        }
        "friend" => Some("Our friendship matters to me, so I want to be honest about this"),
        "parent" | "mother" | "father" | "mom" | "dad" => {
            Some("I love you and I want us to be able to talk openly")
        }
        _ => None,
    }
}

fn urgency_considerations(urgency: Urgency) -> Vec<String> {
    let items: &[&str] = match urgency {
        Urgency::High => &[
            "Don't let urgency cause you to skip important preparation",
            "Focus on the most critical points first",
            "Be ready to follow up if needed",
        ],
        Urgency::Medium => &[
            "Balance preparation time with timely action",
            "Consider the other person's schedule and availability",
            "Plan for a follow-up conversation if needed",
        ],
        Urgency::Low => &[
            "Use the extra time to prepare thoroughly",
            "Consider multiple approaches and choose the best one",
            "Wait for the optimal moment when conditions are right",
        ],
    };
    owned(items)
}

fn personal_insights(context: &AdviceContext, analysis: &SituationAnalysis) -> Vec<String> {
    let mut insights = Vec::new();
    if !context.successful_strategies.is_empty() {
        insights.push("You've successfully handled similar situations before - trust your experience".to_string());
    }
    if !context.memories.is_empty() {
        insights.push("Your past experiences show you're thoughtful about communication".to_string());
    }
    if analysis.complexity == crate::advice::Complexity::High {
        insights.push("This seems like a complex situation - consider breaking it into smaller parts".to_string());
    }
    if insights.is_empty() {
        insights.push("This is a new type of situation for you - trust your instincts and stay authentic".to_string());
    }
    insights
}

fn confidence_boosters(context: &AdviceContext, tone: EmotionalTone) -> Vec<String> {
    let mut boosters = vec![
        "You're taking the right step by preparing for this conversation".to_string(),
        "Most people appreciate honest, respectful communication".to_string(),
    ];
    if !context.successful_strategies.is_empty() {
        boosters.push("You've handled difficult conversations successfully before".to_string());
    }
    if tone == EmotionalTone::Anxious {
        boosters.push("It's normal to feel nervous - this shows the conversation matters to you".to_string());
    }
    boosters.push("The fact that you're thinking about this shows you care about the outcome".to_string());
    boosters.truncate(3);
    boosters
}

fn follow_up_questions(situation_type: SituationType) -> Vec<String> {
    let mut questions = vec![
        "How do you think they might respond to this conversation?".to_string(),
        "What outcome would you consider a success?".to_string(),
    ];
    questions.push(
        match situation_type {
            SituationType::Professional => "Have you considered the timing and setting for this conversation?",
            SituationType::Romantic => "How has communication about this topic gone in the past?",
            _ => "Are there any concerns you haven't addressed yet?",
        }
        .to_string(),
    );
    questions
}

/// Analyze the situation and fill a complete template for it
pub fn generate(request: &AdviceRequest, context: &AdviceContext) -> AdviceContent {
    let classification = heuristics::classify_situation(&request.situation);
    let tone = heuristics::emotional_tone(&request.situation);
    let analysis = SituationAnalysis {
        situation_type: classification.situation_type,
        confidence: classification.confidence,
        emotional_tone: tone,
        complexity: heuristics::complexity(&request.situation),
        keywords: classification.keywords,
        key_challenges: heuristics::key_challenges(&request.situation),
        success_factors: heuristics::success_factors(context.has_positive_memories()),
    };

    let template = template_for(analysis.situation_type);

    let mut strategy = personalize_strategy(template.strategy, context);
    let mut key_points = owned(template.key_points);
    if let Some(point) = tone_key_point(tone) {
        key_points.push(point.to_string());
    }

    let mut helpful_phrases = owned(template.helpful_phrases);
    if let Some(phrase) = relationship_phrase(&request.relationship) {
        helpful_phrases.push(phrase.to_string());
    }

    match request.urgency {
        Urgency::High => {
            strategy.push_str(
                " Given the urgency, focus on the most critical points and be prepared to address this promptly.",
            );
            key_points.insert(0, "Address this as soon as appropriately possible".to_string());
        }
        Urgency::Low => {
            strategy.push_str(
                " Since this isn't urgent, take time to prepare thoroughly and choose the optimal moment.",
            );
            key_points.push("Take time to prepare and choose the right moment".to_string());
        }
        Urgency::Medium => {}
    }

    let mut pitfalls = owned(template.pitfalls);
    if let Some(pitfall) = tone_pitfall(tone) {
        pitfalls.push(pitfall.to_string());
    }

    AdviceContent {
        strategy,
        key_points,
        pitfalls,
        helpful_phrases,
        preparation_steps: owned(template.preparation_steps),
        follow_up_considerations: owned(template.follow_up),
        personal_insights: personal_insights(context, &analysis),
        confidence_boosters: confidence_boosters(context, tone),
        urgency_considerations: urgency_considerations(request.urgency),
        follow_up_questions: follow_up_questions(analysis.situation_type),
        situation_analysis: analysis,
    }
}

/// Hardcoded minimal advice used when nothing else produced a valid result
pub fn emergency_advice(request: &AdviceRequest) -> AdviceResult {
    let classification = heuristics::classify_situation(&request.situation);
    let content = AdviceContent {
        strategy: "Take time to listen carefully and express your thoughts clearly. Focus on \
                   understanding their perspective while being honest about your own needs."
            .to_string(),
        key_points: owned(&[
            "Listen actively to understand their viewpoint",
            "Express your thoughts clearly and respectfully",
            "Focus on finding common ground",
            "Be patient and stay calm",
            "Ask questions to clarify understanding",
        ]),
        pitfalls: owned(&[
            "Don't interrupt or dismiss their concerns",
            "Avoid making assumptions about their intentions",
            "Don't let emotions override rational discussion",
            "Avoid bringing up unrelated past issues",
        ]),
        helpful_phrases: owned(&[
            "I understand what you're saying...",
            "Can you help me understand your perspective?",
            "I'd like to share my thoughts on this...",
            "How can we work together on this?",
            "What would help make this work for both of us?",
        ]),
        situation_analysis: SituationAnalysis {
            situation_type: classification.situation_type,
            confidence: 0.3,
            ..Default::default()
        },
        ..Default::default()
    };

    let mut result = AdviceResult::new(content, AdviceSource::Template, EMERGENCY_MODEL);
    result.emergency = true;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RelevantMemory;
    use crate::heuristics::Sentiment;

    const SITUATIONS: &[&str] = &[
        "",
        " ",
        "My boss hasn't given me a raise in two years",
        "I need to tell my girlfriend I'm moving abroad",
        "My father keeps criticizing my career choices",
        "My friend borrowed money and never paid it back",
        "I'm sorry I missed your wedding",
        "We had a huge argument at the team offsite",
        "Ich weiß nicht, was ich sagen soll",
        "😬😬😬",
        "a complicated situation involving several people and many moving parts",
    ];

    #[test]
    fn test_generate_is_total() {
        for situation in SITUATIONS {
            for urgency in [Urgency::Low, Urgency::Medium, Urgency::High] {
                let request = AdviceRequest::new(*situation).with_urgency(urgency);
                let advice = generate(&request, &AdviceContext::default());
                assert!(advice.validate().is_ok(), "invalid advice for {:?}", situation);
                assert!(!advice.pitfalls.is_empty());
            }
        }
    }

    #[test]
    fn test_raise_request_scenario() {
        let request = AdviceRequest::new("My boss hasn't given me a raise in two years");
        let advice = generate(&request, &AdviceContext::default());

        assert_eq!(advice.situation_analysis.situation_type, SituationType::Professional);
        let strategy = advice.strategy.to_lowercase();
        assert!(strategy.contains("prepar") || strategy.contains("evidence"));
        assert!(advice
            .helpful_phrases
            .iter()
            .any(|p| p.starts_with("I ") || p.starts_with("I'")));
    }

    #[test]
    fn test_high_urgency_leads_with_promptness() {
        let request = AdviceRequest::new("We need to talk about the project deadline")
            .with_urgency(Urgency::High);
        let advice = generate(&request, &AdviceContext::default());
        assert_eq!(advice.key_points[0], "Address this as soon as appropriately possible");
        assert!(advice.strategy.contains("Given the urgency"));
    }

    #[test]
    fn test_relationship_phrase_added() {
        let request = AdviceRequest::new("Asking for time off").with_relationship("Manager");
        let advice = generate(&request, &AdviceContext::default());
        assert!(advice
            .helpful_phrases
            .iter()
            .any(|p| p.contains("appreciate your leadership")));
    }

    #[test]
    fn test_anxious_tone_adds_centering_point() {
        let request = AdviceRequest::new("I'm nervous about telling my roommate");
        let advice = generate(&request, &AdviceContext::default());
        assert_eq!(advice.situation_analysis.emotional_tone, EmotionalTone::Anxious);
        assert!(advice.key_points.iter().any(|p| p.contains("center yourself")));
        assert!(advice.confidence_boosters.len() <= 3);
    }

    #[test]
    fn test_personalization_from_context() {
        let context = AdviceContext {
            memories: vec![RelevantMemory {
                relevance: 2,
                summary: "Negotiated a raise".to_string(),
                topics: vec!["work".to_string()],
                sentiment: Sentiment::Positive,
            }],
            successful_strategies: vec!["Lead with numbers".to_string()],
            profile: None,
        };
        let request = AdviceRequest::new("Raise talk with my boss");
        let advice = generate(&request, &context);
        assert!(advice.strategy.contains("past successes"));
        assert!(advice
            .situation_analysis
            .success_factors
            .iter()
            .any(|f| f.contains("past successful")));
        assert_eq!(advice.personal_insights.len(), 2);
    }

    #[test]
    fn test_emergency_advice_is_valid_and_flagged() {
        let advice = emergency_advice(&AdviceRequest::new("anything"));
        assert!(advice.content.is_valid());
        assert!(advice.emergency);
        assert_eq!(advice.model, EMERGENCY_MODEL);
    }
}
