//! Component sanitizers.

use unicode_normalization::UnicodeNormalization;

use crate::error::{ComposeError, Component};

/// Collector component: upper-cased with all whitespace removed.
pub fn collector_component(key: &str) -> Result<String, ComposeError> {
    let component: String = key
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    non_empty(component, Component::Collector, key)
}

/// Invoice number component.
///
/// Only ASCII letters and digits survive. Accented letters are dropped with
/// their accent rather than transliterated, so "333é" gives "333"; input is
/// composed first so a decomposed "e\u{301}" is dropped the same way.
pub fn invoice_number_component(number: &str) -> Result<String, ComposeError> {
    let component: String = number
        .nfc()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    non_empty(component, Component::InvoiceNumber, number)
}

/// Site id printed on the invoice: digits only, leading zeros removed.
pub fn site_hint_component(hint: &str) -> Result<String, ComposeError> {
    let digits: String = hint.chars().filter(char::is_ascii_digit).collect();
    let trimmed = digits.trim_start_matches('0').to_string();
    non_empty(trimmed, Component::SiteHint, hint)
}

/// Site id as stored in the catalog, with whitespace removed.
pub fn site_component(site_id: &str) -> Result<String, ComposeError> {
    let component: String = site_id.chars().filter(|c| !c.is_whitespace()).collect();
    non_empty(component, Component::Site, site_id)
}

fn non_empty(component: String, kind: Component, raw: &str) -> Result<String, ComposeError> {
    if component.is_empty() {
        return Err(ComposeError::EmptyComponent {
            component: kind,
            value: raw.to_string(),
        });
    }
    Ok(component)
}
