use std::collections::{
    BTreeMap,
    BTreeSet,
};

use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    config::UserConfig,
    core::WortbotError,
    translator::{
        Grammar,
        Translation,
    },
};

pub const FRONT_FIELD: &str = "Front";
pub const BACK_FIELD: &str = "Back";
pub const NOTE_TAG: &str = "wortbot";

pub fn note_type_fields() -> Vec<String> {
    vec![FRONT_FIELD.to_string(), BACK_FIELD.to_string()]
}

/// One note ready for insertion. Ordered maps keep repeated builds
/// byte-identical, which is what makes re-insertion idempotent to reason
/// about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePayload {
    pub deck_name: String,
    pub note_type_name: String,
    pub fields: BTreeMap<String, String>,
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directions {
    pub forward: bool,
    pub reverse: bool,
}

impl Directions {
    pub fn both() -> Self {
        Self { forward: true, reverse: true }
    }

    pub fn per_sense(&self) -> usize {
        usize::from(self.forward) + usize::from(self.reverse)
    }
}

impl From<&UserConfig> for Directions {
    fn from(user: &UserConfig) -> Self {
        Self { forward: user.forward_cards, reverse: user.reverse_cards }
    }
}

/// Pure mapping from a validated translation to note payloads: senses in
/// original order, forward before reverse per sense.
pub fn build_notes(
    translation: &Translation,
    deck_name: &str,
    note_type_name: &str,
    directions: Directions,
) -> Result<Vec<NotePayload>, WortbotError> {
    if translation.senses.is_empty() {
        // Unreachable through the contract, which rejects empty senses.
        return Err(WortbotError::InvariantViolation(
            "translation with no senses reached the assembler".to_string(),
        ));
    }

    let decorated = decorated_headword(translation);
    let mut notes = Vec::with_capacity(translation.senses.len() * directions.per_sense());

    for sense in &translation.senses {
        let label = format!("<i>[{}, {}]</i>", sense.word_class, sense.hint);
        let source_side = format!("{}<br><br><i>{}</i>", decorated, sense.example_source);
        let target_side =
            format!("{}<br><br><i>{}</i>", sense.target_translation(), sense.example_target);

        if directions.forward {
            notes.push(note(
                deck_name,
                note_type_name,
                format!("{}<br><br>{}<br><i>{}</i>", decorated, label, sense.example_source),
                target_side.clone(),
            ));
        }

        if directions.reverse {
            notes.push(note(
                deck_name,
                note_type_name,
                format!(
                    "{}<br><br>{}<br><i>{}</i>",
                    sense.target_translation(),
                    label,
                    sense.example_target
                ),
                source_side.clone(),
            ));
        }
    }

    Ok(notes)
}

fn note(deck_name: &str, note_type_name: &str, front: String, back: String) -> NotePayload {
    let mut fields = BTreeMap::new();
    fields.insert(FRONT_FIELD.to_string(), front);
    fields.insert(BACK_FIELD.to_string(), back);

    NotePayload {
        deck_name: deck_name.to_string(),
        note_type_name: note_type_name.to_string(),
        fields,
        tags: BTreeSet::from([NOTE_TAG.to_string()]),
    }
}

fn decorated_headword(translation: &Translation) -> String {
    match &translation.grammar {
        Some(Grammar::Noun { article, plural }) => {
            let article = article.as_deref().map(|a| format!("{a} ")).unwrap_or_default();
            let plural = plural.as_deref().map(|p| format!(" (pl. {p})")).unwrap_or_default();
            format!("{article}{}{plural}", translation.headword)
        }
        Some(Grammar::Verb { praeteritum, perfekt }) => {
            format!("{} ({praeteritum}, {perfekt})", translation.headword)
        }
        None => translation.headword.clone(),
    }
}
