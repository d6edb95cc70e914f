//! Rendering of events into notification texts.

mod html;
mod template;

pub use html::{is_url, strip_tags};
pub use template::{parse, Segment};

use crate::calendar::Event;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Locale};
use chrono_tz::Tz;
use std::fmt::Write;
use thiserror::Error;

/// Format of `{date}` without a format spec.
pub const DEFAULT_DATE_FORMAT: &str = "%x";
/// Format of `{time}` without a format spec.
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M";

/// Language names and bare language codes that don't map to a `xx_XX` locale.
const LOCALE_ALIASES: &[(&str, &str)] = &[
    ("en", "en_US"),
    ("english", "en_US"),
    ("russian", "ru_RU"),
    ("german", "de_DE"),
    ("french", "fr_FR"),
    ("italian", "it_IT"),
    ("spanish", "es_ES"),
    ("uk", "uk_UA"),
    ("ukrainian", "uk_UA"),
    ("be", "be_BY"),
    ("cs", "cs_CZ"),
    ("da", "da_DK"),
    ("el", "el_GR"),
    ("ja", "ja_JP"),
    ("ko", "ko_KR"),
    ("sv", "sv_SE"),
    ("zh", "zh_CN"),
];

/// Errors in a notification template.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("single '{{' at position {position} is not closed")]
    UnclosedField { position: usize },
    #[error("single '}}' at position {position} has no opening brace")]
    UnmatchedClosingBrace { position: usize },
    #[error("unexpected '{{' inside the field at position {position}")]
    NestedField { position: usize },
    #[error("field at position {position} has no name")]
    EmptyField { position: usize },
    #[error("invalid date format {spec:?}")]
    InvalidDateFormat { spec: String },
}

/// Renders `event` using `template`.
///
/// Available fields are `{title}`, `{location}` and `{description}`, which are converted from
/// HTML to plain text, and `{date}` and `{time}`, which accept a strftime format spec like
/// `{date:%A, %d %B}` and are localized for `language`. Unknown fields render as empty text.
/// The result is trimmed.
pub fn render(template: &str, language: &str, event: &Event) -> Result<String, FormatError> {
    let segments = template::parse(template)?;
    let locale = locale(language);
    let mut out = String::new();

    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Field { name, spec } => out.push_str(&field(event, name, spec, locale)?),
        }
    }

    Ok(out.trim().to_owned())
}

fn field(
    event: &Event,
    name: &str,
    spec: Option<&str>,
    locale: Locale,
) -> Result<String, FormatError> {
    let value = match name {
        "title" => strip_tags(&event.title),
        "location" => strip_tags(&event.location),
        "description" => strip_tags(&event.description),
        "date" => localized(&event.start, spec.unwrap_or(DEFAULT_DATE_FORMAT), locale)?,
        "time" if event.all_day => String::new(),
        "time" => localized(&event.start, spec.unwrap_or(DEFAULT_TIME_FORMAT), locale)?,
        _ => {
            log::debug!("unknown template field {name:?}");
            String::new()
        }
    };

    Ok(value)
}

fn localized(at: &DateTime<Tz>, spec: &str, locale: Locale) -> Result<String, FormatError> {
    let invalid = || FormatError::InvalidDateFormat {
        spec: spec.to_owned(),
    };

    if StrftimeItems::new(spec).any(|item| item == Item::Error) {
        return Err(invalid());
    }

    let mut out = String::new();
    write!(out, "{}", at.format_localized(spec, locale)).map_err(|_| invalid())?;

    Ok(out)
}

/// Resolves a user's language setting like `de`, `de_DE`, `de-DE` or `de_DE.UTF-8` to a locale.
/// Falls back to POSIX.
pub fn locale(language: &str) -> Locale {
    let name = language
        .split('.')
        .next()
        .unwrap_or_default()
        .trim()
        .replace('-', "_");

    let candidate = match name.split_once('_') {
        Some((lang, region)) => format!("{}_{}", lang.to_lowercase(), region.to_uppercase()),
        None => {
            let lang = name.to_lowercase();
            match LOCALE_ALIASES.iter().find(|(alias, _)| *alias == lang) {
                Some((_, locale)) => (*locale).to_owned(),
                // Most languages are spoken in a country of the same code, e.g. `de_DE`.
                None => format!("{}_{}", lang, lang.to_uppercase()),
            }
        }
    };

    match Locale::try_from(candidate.as_str()) {
        Ok(locale) => locale,
        Err(_) => {
            log::debug!("unknown language {language:?}, using POSIX locale");
            Locale::POSIX
        }
    }
}
