//! Prompt assembly for the coaching analysis.
//!
//! Deterministic: the same conversation snapshot and context always
//! produce the same prompt text.

use std::fmt::Write;

use crate::context::{CoachingContext, Persona, Playbook};
use crate::transcript::TranscriptEntry;

/// Fixed system instruction constraining the model to the suggestion
/// schema.
pub const SYSTEM_INSTRUCTION: &str = "\
You are a real-time sales coaching assistant listening to a live meeting. \
Based on the conversation and the strategy context, produce short, actionable \
coaching suggestions for the seller. Respond ONLY with JSON in exactly this shape: \
{\"suggestions\": [{\"type\": \"objection|opportunity|engagement|next_step\", \
\"text\": \"suggestion of at most 60 characters\", \
\"priority\": \"high|medium|low\", \
\"context\": \"one short sentence explaining why\"}]} \
with 1 to 3 suggestions and no other text.";

const COACHING_INSTRUCTIONS: &str = "\
Focus on what the seller should do in the next 30 seconds. Prefer handling a \
live objection over generic advice, surface buying signals as opportunities, \
and propose a concrete next step when the conversation stalls.";

/// Assemble the user prompt from the conversation snapshot plus the
/// active coaching context.
pub fn build_user_prompt(entries: &[TranscriptEntry], context: &CoachingContext) -> String {
    let mut prompt = String::new();

    prompt.push_str("## CURRENT CONVERSATION:\n");
    for entry in entries {
        let _ = writeln!(prompt, "[{}]: {}", entry.source.label(), entry.text);
    }

    if let Some(persona) = &context.persona {
        push_persona(&mut prompt, persona);
    }
    if let Some(playbook) = &context.playbook {
        push_playbook(&mut prompt, playbook);
    }

    if !context.knowledge.is_empty() {
        prompt.push_str("\n## RELEVANT KNOWLEDGE:\n");
        for snippet in &context.knowledge {
            let _ = writeln!(prompt, "- ({}) {}", snippet.category, snippet.content);
        }
    }

    prompt.push('\n');
    prompt.push_str(COACHING_INSTRUCTIONS);
    prompt
}

fn push_persona(prompt: &mut String, persona: &Persona) {
    prompt.push_str("\n## PERSONA CONTEXT:\n");
    let _ = writeln!(prompt, "Name: {}", persona.name);
    let _ = writeln!(prompt, "Company: {}", persona.company);
    let _ = writeln!(prompt, "Role: {}", persona.role);
    let _ = writeln!(prompt, "Classification: {}", persona.classification);
    let _ = writeln!(prompt, "Revenue potential: {:.0}", persona.revenue_potential);

    if !persona.business_context.is_empty() {
        let _ = writeln!(prompt, "Business context: {}", persona.business_context);
    }
    if !persona.primary_needs.is_empty() {
        let _ = writeln!(prompt, "Primary needs: {}", persona.primary_needs.join(", "));
    }
    if !persona.common_objections.is_empty() {
        prompt.push_str("Common objections:\n");
        for (topic, objection) in &persona.common_objections {
            let _ = writeln!(prompt, "- {topic}: {objection}");
        }
    }
    if !persona.communication_preferences.is_empty() {
        let _ = writeln!(
            prompt,
            "Communication preferences: {}",
            persona.communication_preferences
        );
    }
}

fn push_playbook(prompt: &mut String, playbook: &Playbook) {
    prompt.push_str("\n## SALES STRATEGY (PLAYBOOK):\n");
    let _ = writeln!(prompt, "Name: {}", playbook.name);
    let _ = writeln!(prompt, "Meeting type: {}", playbook.meeting_type);
    let _ = writeln!(prompt, "Objective: {}", playbook.primary_objective);

    if !playbook.opening_rapport.is_empty() {
        let _ = writeln!(prompt, "Opening rapport: {}", playbook.opening_rapport.join("; "));
    }
    if !playbook.qualification_questions.is_empty() {
        prompt.push_str("Qualification questions:\n");
        for question in &playbook.qualification_questions {
            let _ = writeln!(prompt, "- {question}");
        }
    }
    if !playbook.objection_responses.is_empty() {
        prompt.push_str("Objection handling:\n");
        for (topic, responses) in &playbook.objection_responses {
            let _ = writeln!(prompt, "- {topic}: {}", responses.join("; "));
        }
    }
    if !playbook.positive_trigger_words.is_empty() {
        let _ = writeln!(
            prompt,
            "Positive triggers: {}",
            playbook.positive_trigger_words.join(", ")
        );
    }
    if !playbook.negative_trigger_words.is_empty() {
        let _ = writeln!(
            prompt,
            "Negative triggers: {}",
            playbook.negative_trigger_words.join(", ")
        );
    }
    if !playbook.sales_techniques.is_empty() {
        let _ = writeln!(prompt, "Techniques: {}", playbook.sales_techniques.join(", "));
    }
    if !playbook.tone_guidance.is_empty() {
        let _ = writeln!(prompt, "Tone: {}", playbook.tone_guidance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SourceTag;
    use crate::context::KnowledgeSnippet;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn entries() -> Vec<TranscriptEntry> {
        vec![
            TranscriptEntry {
                source: SourceTag::SystemAudio,
                text: "Precisamos de ROI em seis meses".to_owned(),
                timestamp: Utc::now(),
                latency_ms: Some(120),
            },
            TranscriptEntry {
                source: SourceTag::Microphone,
                text: "Posso mostrar os numeros do ultimo caso".to_owned(),
                timestamp: Utc::now(),
                latency_ms: Some(90),
            },
        ]
    }

    fn context() -> CoachingContext {
        let mut objections = BTreeMap::new();
        objections.insert("price".to_owned(), "budget is tight this quarter".to_owned());

        CoachingContext {
            persona: Some(Persona {
                name: "Carlos Silva".to_owned(),
                company: "Acme Corp".to_owned(),
                role: "CTO".to_owned(),
                classification: "qualified_lead".to_owned(),
                revenue_potential: 250_000.0,
                business_context: "evaluating automation vendors".to_owned(),
                primary_needs: vec!["process automation".to_owned()],
                common_objections: objections,
                communication_preferences: "technical and direct".to_owned(),
            }),
            playbook: Some(Playbook {
                name: "Enterprise B2B".to_owned(),
                meeting_type: "discovery_call".to_owned(),
                primary_objective: "qualify the opportunity".to_owned(),
                opening_rapport: vec!["mention similar cases".to_owned()],
                qualification_questions: vec!["what are the main bottlenecks?".to_owned()],
                objection_responses: BTreeMap::from([(
                    "price".to_owned(),
                    vec!["focus on six-month ROI".to_owned()],
                )]),
                positive_trigger_words: vec!["ROI".to_owned(), "efficiency".to_owned()],
                negative_trigger_words: vec!["expensive".to_owned()],
                sales_techniques: vec!["BANT".to_owned()],
                tone_guidance: "consultative".to_owned(),
            }),
            knowledge: vec![KnowledgeSnippet {
                content: "payback under six months in the Acme case".to_owned(),
                category: "cases".to_owned(),
                score: 0.7,
            }],
        }
    }

    #[test]
    fn prompt_assembly_is_deterministic() {
        let entries = entries();
        let context = context();

        let first = build_user_prompt(&entries, &context);
        let second = build_user_prompt(&entries, &context);
        assert_eq!(first, second);
    }

    #[test]
    fn prompt_contains_all_blocks_in_order() {
        let prompt = build_user_prompt(&entries(), &context());

        let conversation = prompt.find("## CURRENT CONVERSATION:").unwrap();
        let persona = prompt.find("## PERSONA CONTEXT:").unwrap();
        let playbook = prompt.find("## SALES STRATEGY (PLAYBOOK):").unwrap();
        let knowledge = prompt.find("## RELEVANT KNOWLEDGE:").unwrap();

        assert!(conversation < persona && persona < playbook && playbook < knowledge);
        assert!(prompt.contains("[SYSTEM_AUDIO]: Precisamos de ROI em seis meses"));
        assert!(prompt.contains("[MICROPHONE]: Posso mostrar os numeros do ultimo caso"));
        assert!(prompt.contains("Positive triggers: ROI, efficiency"));
        assert!(prompt.contains("payback under six months"));
    }

    #[test]
    fn missing_context_blocks_are_omitted() {
        let prompt = build_user_prompt(&entries(), &CoachingContext::default());

        assert!(prompt.contains("## CURRENT CONVERSATION:"));
        assert!(!prompt.contains("## PERSONA CONTEXT:"));
        assert!(!prompt.contains("## SALES STRATEGY (PLAYBOOK):"));
        assert!(!prompt.contains("## RELEVANT KNOWLEDGE:"));
    }
}
