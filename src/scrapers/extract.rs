//! Field extraction and coercion helpers.
//!
//! Marketplace markup is not stable, so every field is looked up through an
//! ordered list of selectors and the first non-empty match wins. Coercion
//! never fails: anything unusable becomes `None`.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

static LEADING_FLOAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?").expect("valid regex")
});

/// Datetime layouts seen on marketplace pages, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y, %I:%M:%S %p",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y, %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y",
    "%Y-%m-%d",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

/// Collapse runs of whitespace and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::debug!("Skipping invalid selector {:?}: {}", selector, e);
            None
        }
    }
}

/// Text of the first element matched by the first selector that yields
/// non-empty text.
pub fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        let selector = parse_selector(selector)?;
        doc.select(&selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// Non-empty texts of every element matching `selector`, or `None` if there
/// are none.
pub fn all_texts(doc: &Html, selector: &str) -> Option<Vec<String>> {
    let selector = parse_selector(selector)?;
    let texts: Vec<String> = doc
        .select(&selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect();
    (!texts.is_empty()).then_some(texts)
}

/// Digits of a count such as `"1,234,567 installs"`. Zero and digit-free text
/// yield `None`.
pub fn parse_count(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().ok().filter(|n| *n > 0)
}

/// Leading decimal number of `text`, like `"4.5 out of 5"`. Zero and
/// non-numeric text yield `None`.
pub fn parse_rating(text: &str) -> Option<f64> {
    LEADING_FLOAT
        .find(text.trim_start())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite() && *n != 0.0)
}

/// Parse a displayed date. Anything unrecognized yields `None`.
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = clean_text(text);
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(&text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(&text) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&text, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
        }
    }

    None
}

/// The `itemName` query value of a marketplace item URL.
pub fn identifier_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == "itemName")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
