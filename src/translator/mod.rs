use std::time::Duration;

use serde::{
    Deserialize,
    Serialize,
};
use tracing::info;

use crate::{
    config::Config,
    core::WortbotError,
};

pub mod provider;

use provider::Provider;

/// Grammar tag attached to a headword, one variant per word class so each
/// class only carries the fields that exist for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Grammar {
    Noun {
        #[serde(default)]
        article: Option<String>,
        #[serde(default)]
        plural: Option<String>,
    },
    Verb {
        praeteritum: String,
        perfekt: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sense {
    pub word_class: String,
    pub hint: String,
    pub translations: Vec<String>,
    pub example_source: String,
    pub example_target: String,
}

impl Sense {
    pub fn target_translation(&self) -> String {
        self.translations.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct OracleTranslation {
    headword: String,
    #[serde(default)]
    grammar: Option<Grammar>,
    senses: Vec<Sense>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    /// The text the user originally sent, kept for display and retry.
    pub request: String,
    pub headword: String,
    pub grammar: Option<Grammar>,
    pub senses: Vec<Sense>,
}

pub struct Translator {
    provider: Provider,
    source_language: String,
    target_language: String,
}

impl Translator {
    pub fn new(config: &Config) -> Result<Self, WortbotError> {
        let provider = Provider::new(
            &config.openai_base_url,
            &config.openai_api_key,
            &config.openai_model,
            Duration::from_secs(config.request_timeout_secs),
        )?;

        Ok(Self {
            provider,
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
        })
    }

    /// Translate one word or short phrase. Validates locally before any
    /// remote call, then holds the oracle to the structured schema.
    pub async fn translate(&self, request: &str) -> Result<Translation, WortbotError> {
        let request = validate_request(request)?;
        info!(request, "translating");

        let prompt = build_prompt(request, &self.source_language, &self.target_language);
        let content = self.provider.complete(SYSTEM_PROMPT, &prompt).await?;
        let translation = parse_translation(request, &content)?;

        info!(request, senses = translation.senses.len(), "translation complete");
        Ok(translation)
    }
}

pub fn validate_request(request: &str) -> Result<&str, WortbotError> {
    let trimmed = request.trim();
    if trimmed.is_empty() {
        return Err(WortbotError::InvalidInput("empty request".to_string()));
    }
    Ok(trimmed)
}

/// Strict parse of the oracle's message content. Anything missing, empty or
/// extra-shaped is rejected rather than patched up.
pub fn parse_translation(request: &str, content: &str) -> Result<Translation, WortbotError> {
    let parsed: OracleTranslation = serde_json::from_str(content)
        .map_err(|e| WortbotError::MalformedResponse(format!("oracle payload: {e}")))?;

    let headword = sanitize(&parsed.headword);
    if headword.trim().is_empty() {
        return Err(WortbotError::MalformedResponse("empty headword".to_string()));
    }

    if parsed.senses.is_empty() {
        return Err(WortbotError::MalformedResponse("no senses returned".to_string()));
    }

    let grammar = match parsed.grammar {
        Some(Grammar::Noun { article, plural }) => Some(Grammar::Noun {
            article: article.map(|a| sanitize(&a)),
            plural: plural.map(|p| sanitize(&p)),
        }),
        Some(Grammar::Verb { praeteritum, perfekt }) => {
            let praeteritum = sanitize(&praeteritum);
            let perfekt = sanitize(&perfekt);
            if praeteritum.trim().is_empty() || perfekt.trim().is_empty() {
                return Err(WortbotError::MalformedResponse("empty verb forms".to_string()));
            }
            Some(Grammar::Verb { praeteritum, perfekt })
        }
        None => None,
    };

    let mut senses = Vec::with_capacity(parsed.senses.len());
    for sense in parsed.senses {
        senses.push(validate_sense(sense)?);
    }

    Ok(Translation { request: request.to_string(), headword, grammar, senses })
}

fn validate_sense(sense: Sense) -> Result<Sense, WortbotError> {
    let word_class = sanitize(&sense.word_class);
    let hint = sanitize(&sense.hint);
    let example_source = sanitize(&sense.example_source);
    let example_target = sanitize(&sense.example_target);

    for (name, value) in [
        ("word_class", &word_class),
        ("hint", &hint),
        ("example_source", &example_source),
        ("example_target", &example_target),
    ] {
        if value.trim().is_empty() {
            return Err(WortbotError::MalformedResponse(format!("empty sense field {name}")));
        }
    }

    if sense.translations.is_empty() {
        return Err(WortbotError::MalformedResponse("sense has no translations".to_string()));
    }

    let mut translations = Vec::with_capacity(sense.translations.len());
    for translation in &sense.translations {
        let translation = sanitize(translation);
        if translation.trim().is_empty() {
            return Err(WortbotError::MalformedResponse("empty translation entry".to_string()));
        }
        translations.push(translation);
    }

    Ok(Sense { word_class, hint, translations, example_source, example_target })
}

/// Characters that break Telegram Markdown or the card HTML are stripped
/// from everything the oracle returns.
fn sanitize(text: &str) -> String {
    text.chars().filter(|c| !matches!(c, '*' | '_' | '`' | '[' | ']' | '<' | '>' | '&')).collect()
}

const SYSTEM_PROMPT: &str =
    "You are a language learning assistant helping create flashcards. \
     Return valid JSON only, no additional text, no Markdown formatting.";

fn build_prompt(request: &str, source: &str, target: &str) -> String {
    format!(
        r#"Analyze the following {source} word or short phrase and translate it to {target}, identifying its DISTINCT meanings.

Word/Phrase: "{request}"

Many words have multiple distinct meanings used in different situations (German "Schloss" can mean "castle" or "lock"). Your task:
1. Correct spelling mistakes; if it is a verb, convert it to the infinitive. Use only that form from now on.
2. Identify up to 3 DISTINCT common meanings, sorted by frequency of use. Skip obscure, niche or near-duplicate meanings.
3. If the word truly has only one common meaning, provide just one sense.

Respond with JSON of this exact structure:
{{
  "headword": "the word with correct spelling, infinitive for verbs, no article for nouns",
  "grammar": {{"kind": "noun", "article": "der/die/das for {source} nouns or null", "plural": "plural form or null"}}
             OR {{"kind": "verb", "praeteritum": "past form, e.g. machte", "perfekt": "perfect form, e.g. hat gemacht"}}
             OR null for other word classes,
  "senses": [
    {{
      "word_class": "noun/verb/adjective/adverb/etc.",
      "hint": "vague category hint ('financial', 'social', 'building') that does not spoil the answer",
      "translations": ["translation 1 in {target}", "translation N in {target}"],
      "example_source": "one {source} sentence demonstrating THIS SPECIFIC meaning",
      "example_target": "the same sentence in {target}"
    }}
  ]
}}

Provide at least one translation per sense, more only when genuinely useful. Every example must demonstrate its own sense, not another one."#
    )
}
