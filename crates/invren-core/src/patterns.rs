//! Common regex patterns for French invoice fields.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // French postal code: first standalone run of exactly five digits
    pub static ref POSTAL_CODE: Regex = Regex::new(
        r"\b(\d{5})\b"
    ).unwrap();

    // DD/MM/YYYY, DD.MM.YYYY, DD-MM-YYYY (two-digit years allowed)
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})\b"
    ).unwrap();

    // YYYY-MM-DD or YYYY/MM/DD
    pub static ref DATE_YMD: Regex = Regex::new(
        r"\b(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})\b"
    ).unwrap();

    // French long format: "1er mai 2025", "15 juin 2024"
    pub static ref DATE_FRENCH_LONG: Regex = Regex::new(
        r"(?i)\b(\d{1,2})(?:er)?\s+(janvier|f[ée]vrier|mars|avril|mai|juin|juillet|ao[uû]t|septembre|octobre|novembre|d[ée]cembre)\s+(\d{4})\b"
    ).unwrap();

    // Month and year only: "mai 2025"
    pub static ref DATE_FRENCH_MONTH_YEAR: Regex = Regex::new(
        r"(?i)\b(janvier|f[ée]vrier|mars|avril|mai|juin|juillet|ao[uû]t|septembre|octobre|novembre|d[ée]cembre)\s+(\d{4})\b"
    ).unwrap();

    // Billing period: "01/05/2025 - 31/05/2025", "du 01/05/2025 au 31/05/2025"
    pub static ref PERIOD_RANGE: Regex = Regex::new(
        r"(?i)(\d{1,2}[./\-]\d{1,2}[./\-](?:\d{4}|\d{2}))\s*(?:-|–|—|au|à|a|jusqu'au)\s*(\d{1,2}[./\-]\d{1,2}[./\-](?:\d{4}|\d{2}))"
    ).unwrap();

    // Oracle replies sometimes arrive wrapped in a markdown fence
    pub static ref CODE_FENCE: Regex = Regex::new(
        r"(?s)^\s*```(?:json|JSON)?\s*(.*?)\s*```\s*$"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postal_code_skips_longer_runs() {
        let caps = POSTAL_CODE.captures("SIRET 123456789 - 71100 Chalon").unwrap();
        assert_eq!(&caps[1], "71100");
    }

    #[test]
    fn test_dmy_does_not_match_iso() {
        assert!(!DATE_DMY.is_match("2025-05-01"));
        assert!(DATE_YMD.is_match("2025-05-01"));
    }

    #[test]
    fn test_period_range_variants() {
        for text in [
            "01/05/2025 - 31/05/2025",
            "du 01/05/2025 au 31/05/2025",
            "Période : 01.05.2025–31.05.2025",
        ] {
            let caps = PERIOD_RANGE.captures(text).unwrap();
            assert!(caps[1].starts_with("01"), "{text}");
        }
    }
}
