//! Waste-stream suffix for the collector component.

use std::collections::BTreeSet;
use std::fmt;

use crate::normalize::strip_diacritics;

/// Waste streams a collector bills separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WasteStream {
    /// Biodegradable waste.
    Bio,
    /// Recyclables ("collecte sélective").
    Cs,
    /// Ordinary industrial waste.
    Dib,
}

impl WasteStream {
    pub fn code(self) -> &'static str {
        match self {
            WasteStream::Bio => "BIO",
            WasteStream::Cs => "CS",
            WasteStream::Dib => "DIB",
        }
    }
}

impl fmt::Display for WasteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Streams mentioned in oracle waste-type labels.
pub fn detect_streams<S: AsRef<str>>(labels: &[S]) -> BTreeSet<WasteStream> {
    let mut streams = BTreeSet::new();
    for label in labels {
        let upper = strip_diacritics(label.as_ref()).to_uppercase();
        if upper.contains("BIO") {
            streams.insert(WasteStream::Bio);
        }
        if upper.contains("DIB") {
            streams.insert(WasteStream::Dib);
        }
        let cs_word = upper
            .split(|c: char| !c.is_alphanumeric())
            .any(|w| w == "CS");
        if cs_word || upper.contains("RECYCLABLE") {
            streams.insert(WasteStream::Cs);
        }
    }
    streams
}

/// Streams a combination code such as `SUEZDIBBIO` covers.
fn combination_streams(key: &str, combination: &str) -> BTreeSet<WasteStream> {
    let suffix = combination.strip_prefix(key).unwrap_or(combination);
    [WasteStream::Bio, WasteStream::Cs, WasteStream::Dib]
        .into_iter()
        .filter(|s| suffix.contains(s.code()))
        .collect()
}

/// Collector label with its waste-stream suffix.
///
/// An exact stream match among `combinations` wins, then the combination
/// sharing the most streams (first listed on ties), then the key followed
/// by the detected codes in alphabetical order. No detected stream gives
/// the bare key.
pub fn collector_label<S: AsRef<str>>(key: &str, combinations: &[String], waste_types: &[S]) -> String {
    let key = key.to_uppercase();
    let detected = detect_streams(waste_types);
    if detected.is_empty() {
        return key;
    }

    let mut best: Option<(&String, usize)> = None;
    for combination in combinations {
        let streams = combination_streams(&key, combination);
        if streams == detected {
            return combination.clone();
        }
        let overlap = streams.intersection(&detected).count();
        if overlap > 0 && best.is_none_or(|(_, b)| overlap > b) {
            best = Some((combination, overlap));
        }
    }

    if let Some((combination, _)) = best {
        return combination.clone();
    }

    let codes: String = detected.iter().map(|s| s.code()).collect();
    format!("{key}{codes}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combos(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_streams() {
        let streams = detect_streams(&["DIB", "Déchets recyclables", "biodéchets"]);
        assert_eq!(
            streams.into_iter().collect::<Vec<_>>(),
            vec![WasteStream::Bio, WasteStream::Cs, WasteStream::Dib]
        );
        assert!(detect_streams(&["ordures"]).is_empty());
        // "CS" only as a word
        assert!(detect_streams(&["DECS"]).is_empty());
    }

    #[test]
    fn test_exact_combination() {
        let c = combos(&["SUEZDIB", "SUEZDIBBIO", "SUEZBIO"]);
        assert_eq!(collector_label("SUEZ", &c, &["BIO", "DIB"]), "SUEZDIBBIO");
        assert_eq!(collector_label("SUEZ", &c, &["bio"]), "SUEZBIO");
    }

    #[test]
    fn test_best_overlap() {
        let c = combos(&["VEOLIADIB", "VEOLIABIO"]);
        assert_eq!(collector_label("VEOLIA", &c, &["DIB", "CS"]), "VEOLIADIB");
    }

    #[test]
    fn test_key_prefix_is_not_scanned() {
        // "BIO" inside the key must not count as a stream
        let c = combos(&["BIOCYCLEDIB", "BIOCYCLEDIBBIO"]);
        assert_eq!(collector_label("BIOCYCLE", &c, &["DIB", "BIO"]), "BIOCYCLEDIBBIO");
        assert_eq!(collector_label("BIOCYCLE", &c, &["DIB"]), "BIOCYCLEDIB");
    }

    #[test]
    fn test_fallback_and_bare_key() {
        assert_eq!(collector_label("refood", &[], &["DIB", "BIO"]), "REFOODBIODIB");
        assert_eq!(collector_label("REFOOD", &combos(&["REFOODBIO"]), &[] as &[&str]), "REFOOD");
    }
}
