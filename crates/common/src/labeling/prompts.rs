//! System prompts shared by the chat labeling backends

use crate::models::{AttackType, Focus};

pub const SUMMARIZE_PROMPT: &str = "You will be provided with an abstract of a scientific paper. \
Compress this abstract in 1-2 sentences. Use very concise language usable as bullet points on a \
slide deck. Respond ONLY with your summary.";

const FOCUS_PROMPT_HEAD: &str = "You will be provided with an abstract of a scientific paper. \
Assess the most applicable focus label based on the target audience, research focus, produced \
materials, and key outcomes.";

const ATTACK_TYPE_PROMPT_HEAD: &str = "You will be provided with an abstract of a scientific paper. \
Assess the most applicable attack type label based on the research focus, produced materials, \
and key outcomes.";

const SINGLE_LABEL_TAIL: &str =
    "Respond with ONLY ONE of the labels above. Do not include anything else in your response.";

fn attack_type_description(attack_type: AttackType) -> &'static str {
    match attack_type {
        AttackType::Evasion => {
            "Model evasion manipulates inputs so a deployed model produces incorrect or \
             attacker-favoring outputs, for example bypassing a detector, without stealing \
             the model or its data."
        }
        AttackType::Extraction => {
            "Model extraction replicates the functionality of a model by querying it and \
             training a surrogate on its outputs."
        }
        AttackType::Inversion => {
            "Model inversion interacts with a trained model to infer confidential details of \
             its training data, up to reconstructing private records."
        }
        AttackType::Poisoning => {
            "Model poisoning tampers with training data so the resulting model behaves the \
             way the attacker wants, often without detection."
        }
        AttackType::PromptInjection => {
            "Prompt injection crafts inputs to a large language model that override, bypass, \
             or exploit how it follows instructions."
        }
        AttackType::Other => "None of the above",
    }
}

/// System prompt asking for one focus label
pub fn focus_prompt() -> String {
    let labels: Vec<String> = Focus::ALL.iter().map(|f| format!("- {}", f)).collect();
    format!("{}\n\n{}\n\n{}", FOCUS_PROMPT_HEAD, labels.join("\n"), SINGLE_LABEL_TAIL)
}

/// System prompt asking for one attack type
pub fn attack_type_prompt() -> String {
    let types: Vec<String> = AttackType::ALL
        .iter()
        .map(|t| format!("- `{}`: {}", t, attack_type_description(*t)))
        .collect();
    format!(
        "{}\n\n{}\n\nIf none of the types apply, respond with \"Other\".\n\n{}",
        ATTACK_TYPE_PROMPT_HEAD,
        types.join("\n"),
        SINGLE_LABEL_TAIL
    )
}
