//! Label translation, decimal separator and month names for one language.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use chrono::{Locale, NaiveDate};
use tracing::{debug, warn};

use crate::PosterError;

/// Language prefixes whose locales write decimals with a comma.
const COMMA_DECIMAL: &[&str] = &[
    "bg", "cs", "da", "de", "el", "es", "fi", "fr", "hr", "hu", "id", "it", "lt", "lv", "nb",
    "nl", "pl", "pt", "ro", "ru", "sk", "sl", "sr", "sv", "tr", "uk", "vi",
];

#[derive(Clone, Debug)]
pub struct Translator {
    catalog: HashMap<String, String>,
    locale: Locale,
    decimal_comma: bool,
}

impl Default for Translator {
    fn default() -> Self {
        Self::identity()
    }
}

impl Translator {
    /// No catalog, POSIX month names, dot decimals.
    pub fn identity() -> Self {
        Self {
            catalog: HashMap::new(),
            locale: Locale::POSIX,
            decimal_comma: false,
        }
    }

    /// Set up for `language` (e.g. `de_DE`). Missing catalogs fall back to
    /// identity translation; an unknown locale keeps POSIX formatting.
    pub fn for_language(language: &str, locale_dir: &Path) -> Result<Self, PosterError> {
        let code = language.split('.').next().unwrap_or(language);
        let locale = Locale::try_from(code).unwrap_or_else(|_| {
            warn!("Cannot set locale to {language}, using default");
            Locale::POSIX
        });
        let prefix = code.split(['_', '-']).next().unwrap_or(code).to_ascii_lowercase();
        let path = locale_dir.join(format!("{code}.json"));
        let catalog = if path.is_file() {
            let text = fs::read_to_string(&path)?;
            serde_json::from_str(&text).map_err(|e| {
                PosterError::Parameter(format!("Bad translation catalog {}: {e}", path.display()))
            })?
        } else {
            debug!("No translation catalog at {}", path.display());
            HashMap::new()
        };
        Ok(Self {
            catalog,
            locale,
            decimal_comma: COMMA_DECIMAL.contains(&prefix.as_str()),
        })
    }

    pub fn with_catalog(mut self, catalog: HashMap<String, String>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn translate(&self, text: &str) -> String {
        self.catalog
            .get(text)
            .cloned()
            .unwrap_or_else(|| text.to_string())
    }

    /// `value` with one fractional digit in this locale's notation.
    pub fn format_float(&self, value: f64) -> String {
        let s = format!("{value:.1}");
        if self.decimal_comma {
            s.replace('.', ",")
        } else {
            s
        }
    }

    /// Abbreviated month name (three characters at most), `month` is 1-based.
    pub fn month_abbr(&self, month: u32) -> String {
        self.month_name(month, "%b")
            .trim_end_matches('.')
            .chars()
            .take(3)
            .collect()
    }

    pub fn month_full(&self, month: u32) -> String {
        self.month_name(month, "%B")
    }

    fn month_name(&self, month: u32, pattern: &str) -> String {
        match NaiveDate::from_ymd_opt(2000, month, 1) {
            Some(date) => date.format_localized(pattern, self.locale).to_string(),
            None => String::new(),
        }
    }
}
