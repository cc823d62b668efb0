//! Raw fields the oracle extracts from one invoice.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::DocumentError;

/// Untrusted oracle output. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionResult {
    /// Restaurant / company the invoice is addressed to.
    #[serde(deserialize_with = "lenient_string")]
    pub entreprise: Option<String>,

    /// Invoicing collector as printed.
    #[serde(alias = "invoice_provider", deserialize_with = "lenient_string")]
    pub provider: Option<String>,

    /// Delivery or billing address of the site.
    #[serde(alias = "adresse", deserialize_with = "lenient_string")]
    pub address: Option<String>,

    /// Invoice date.
    #[serde(alias = "invoice_date", deserialize_with = "lenient_string")]
    pub date: Option<String>,

    /// Billing period, e.g. "01/05/2025 - 31/05/2025".
    #[serde(alias = "invoice_period", deserialize_with = "lenient_string")]
    pub period: Option<String>,

    #[serde(deserialize_with = "lenient_string")]
    pub invoice_number: Option<String>,

    /// Site id printed on the document by some collectors.
    #[serde(alias = "site", deserialize_with = "lenient_string")]
    pub site_hint: Option<String>,

    /// Waste stream labels (DIB, BIO, CS, ...).
    #[serde(deserialize_with = "lenient_list")]
    pub waste_types: Vec<String>,
}

impl ExtractionResult {
    /// A present, non-blank field or `MissingField`.
    pub fn required<'a>(
        value: &'a Option<String>,
        field: &'static str,
    ) -> Result<&'a str, DocumentError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(DocumentError::MissingField(field))
    }
}

/// String, number, or null; blank strings become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_string))
}

/// Array of scalars, a comma-separated string, or null.
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items.into_iter().filter_map(value_to_string).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    })
}

fn value_to_string(value: Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_original_key_names() {
        let result: ExtractionResult = serde_json::from_str(
            r#"{
                "entreprise": "MAC DO CHALON",
                "invoice_provider": "SUEZ RV",
                "invoice_date": "03/06/2025",
                "invoice_number": 118204,
                "waste_types": ["DIB", "BIO"]
            }"#,
        )
        .unwrap();

        assert_eq!(result.provider.as_deref(), Some("SUEZ RV"));
        assert_eq!(result.date.as_deref(), Some("03/06/2025"));
        assert_eq!(result.invoice_number.as_deref(), Some("118204"));
        assert_eq!(result.waste_types, vec!["DIB", "BIO"]);
        assert_eq!(result.address, None);
    }

    #[test]
    fn test_blank_and_null_fields() {
        let result: ExtractionResult = serde_json::from_str(
            r#"{"entreprise": "  ", "provider": null, "waste_types": "DIB, CS"}"#,
        )
        .unwrap();
        assert_eq!(result.entreprise, None);
        assert_eq!(result.provider, None);
        assert_eq!(result.waste_types, vec!["DIB", "CS"]);
    }

    #[test]
    fn test_required() {
        let value = Some(" SUEZ ".to_string());
        assert_eq!(ExtractionResult::required(&value, "provider").unwrap(), "SUEZ");
        assert!(matches!(
            ExtractionResult::required(&None, "provider"),
            Err(DocumentError::MissingField("provider"))
        ));
    }
}
