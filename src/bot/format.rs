use crate::{
    anki::{
        SyncFailure,
        SyncReport,
    },
    core::WortbotError,
    pipeline::ConfirmError,
    translator::{
        Grammar,
        Translation,
    },
};

fn language_flag(language: &str) -> Option<&'static str> {
    match language.to_uppercase().as_str() {
        "GERMAN" => Some("🇩🇪"),
        "ENGLISH" => Some("🇬🇧"),
        "UKRAINIAN" => Some("🇺🇦"),
        "FRENCH" => Some("🇫🇷"),
        "SPANISH" => Some("🇪🇸"),
        _ => None,
    }
}

fn decorated_headword(translation: &Translation) -> String {
    match &translation.grammar {
        Some(Grammar::Noun { article, plural }) => {
            let article = article.as_deref().map(|a| format!("{a} ")).unwrap_or_default();
            let plural = plural.as_deref().map(|p| format!(" (pl. {p})")).unwrap_or_default();
            format!("*{article}{}*{plural}", translation.headword)
        }
        Some(Grammar::Verb { praeteritum, perfekt }) => {
            format!("*{}* ({praeteritum}, {perfekt})", translation.headword)
        }
        None => format!("*{}*", translation.headword),
    }
}

/// Telegram Markdown rendering of a translation result.
pub fn translation_to_md(translation: &Translation, source_language: &str) -> String {
    let flag = language_flag(source_language).map(|f| format!("{f} ")).unwrap_or_default();

    let mut lines = vec![
        format!("{flag}Translation for *{}*\n", translation.request),
        format!("{}\n", decorated_headword(translation)),
    ];

    for sense in &translation.senses {
        lines.push(format!("\\[{}, {}]", sense.word_class, sense.hint));
        lines.push(sense.target_translation());
        lines.push(format!("💬 _{}_", sense.example_source));
        lines.push(format!("💬 _{}_\n", sense.example_target));
    }

    lines.join("\n").trim_end_matches('\n').to_string()
}

pub fn confirm_success_text(headword: &str, report: &SyncReport) -> String {
    let duplicates = if report.duplicates > 0 {
        format!("\n⚠️ {} skipped as duplicates", report.duplicates)
    } else {
        String::new()
    };

    format!(
        "Added {} Anki cards for *{headword}* 😎\n\n\
         ✅ Connected to your sync server\n\
         ✅ Cards added\n\
         ✅ Collection synced{duplicates}\n\n\
         Don't forget to sync your other devices!",
        report.inserted
    )
}

/// One user-facing line per failure class. Whether anything was inserted
/// before the failure decides between "nothing happened, try again" and
/// "some cards were added, but sync failed". Retrying after a partial
/// insert would create duplicates.
pub fn confirm_error_text(error: &ConfirmError) -> String {
    match error {
        ConfirmError::Expired => {
            "Translation is stale, try another one or retry this one 🙈".to_string()
        }
        ConfirmError::Busy => {
            "Still working on your previous cards, try again in a moment 🐢".to_string()
        }
        ConfirmError::Sync(failure) if failure.inserted > 0 => format!(
            "{} cards were added, but the sync then failed 😮\n\
             They are in your collection on the server, NOT retrying automatically \
             to avoid duplicates. Sync manually or contact your admin.",
            failure.inserted
        ),
        ConfirmError::Sync(failure) => sync_failure_text(failure),
        ConfirmError::Other(_) => "Oh no! Unexpected error, nothing was added 😮".to_string(),
    }
}

fn sync_failure_text(failure: &SyncFailure) -> String {
    match &failure.source {
        WortbotError::Authentication(_) => {
            "Could not log in to your sync server 😮 Check the username/password \
             in your config. No cards were added."
                .to_string()
        }
        WortbotError::UnreachableServer(_) => {
            "Could not reach your sync server 😮 Check that it is running. \
             No cards were added."
                .to_string()
        }
        // Operator-facing detail goes to the log, the user gets a generic
        // sync failure.
        _ => "Sync with your collection failed, no cards were added 😮 \
              The details are in the bot log."
            .to_string(),
    }
}

/// Shared by the local request gate and the `InvalidInput` error arm so the
/// rejection reads the same wherever it is raised.
pub fn rejected_request_text() -> &'static str {
    "Are you kidding me? 🫠 Go to Google Translate or smth."
}

pub fn provider_error_text(error: &WortbotError) -> String {
    match error {
        WortbotError::InvalidInput(_) => rejected_request_text().to_string(),
        WortbotError::RateLimited | WortbotError::ProviderUnavailable(_) => {
            "The translator is having a moment, try again in a bit 😮".to_string()
        }
        WortbotError::MalformedResponse(_) => {
            "Could not make sense of that one, try a different word 🫠".to_string()
        }
        other => format!("Oh no! Error happened! 😮\n```\n{other}\n```"),
    }
}
