//! Subdivision classification.
//!
//! Each subdivision segment of a label runs through an ordered chain of
//! independent rules; the first rule that fires decides the subfield code,
//! and a segment no rule claims is a general subdivision. Rules can be
//! reordered or replaced without touching field assembly.
use once_cell::sync::Lazy;
use regex::Regex;

use headings_core::{Role, SubfieldCode};

static CHRONOLOGICAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b\d{3,4}\b|\bto \d{1,4}\b|\bcentur(?:y|ies)\b|\bdynast(?:y|ies)\b|\bperiods?\b|\beras?\b|\breign\b|\b(?:bronze|iron|stone|middle|golden|viking) ages?\b",
    )
    .expect("chronological pattern")
});

static PLACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:united states|america|china|japan|korea|taiwan|india|europe|asia|africa|oceania|middle east|england|great britain|france|germany|italy|spain|russia|mexico|canada|australia|beijing|shanghai|hong kong|tokyo|london|paris|new york|city|cities|provinces?|regions?|county|counties|kingdoms?|republics?)\b",
    )
    .expect("place pattern")
});

/// Place qualifier closing a segment, e.g. `Beijing (China)`.
static PLACE_QUALIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([A-Z][^()]*\)\s*$").expect("qualifier pattern"));

static FORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:congresses|conferences|conference proceedings|periodicals|handbooks|manuals|guidebooks|dictionaries|encyclopedias|directories|bibliograph(?:y|ies)|catalogs|indexes|abstracts|reviews|case studies|textbooks|problems|exercises|examinations|outlines|study guides|fiction|juvenile literature|pictorial works|maps|atlases|biography|drama|poetry|sources|translations|early works)\b",
    )
    .expect("form pattern")
});

/// Date, year range, century, or era keyword.
pub fn is_chronological(text: &str) -> bool {
    CHRONOLOGICAL.is_match(text)
}

pub fn is_place_name(text: &str) -> bool {
    PLACE.is_match(text) || PLACE_QUALIFIER.is_match(text.trim())
}

/// Topical subdivisions commonly found under place names. Never places.
static GENERAL_UNDER_PLACE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:history|politics and government|description and travel|social life and customs|economic conditions|social conditions|foreign relations|civilization|antiquities|religion|population|geography|boundaries|relations|intellectual life|military history|commerce|emigration and immigration)\b",
    )
    .expect("general subdivision pattern")
});

/// Standard topical subdivisions (`History`, `Politics and government`, ...)
/// that stay `$x` even under a geographic heading.
pub fn is_general_subdivision(text: &str) -> bool {
    GENERAL_UNDER_PLACE.is_match(text.trim())
}

/// Genre/form terms such as handbooks, periodicals, fiction.
pub fn is_form(text: &str) -> bool {
    FORM.is_match(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdivisionKind {
    General,
    Chronological,
    Geographic,
    Form,
}

impl SubdivisionKind {
    pub fn subfield_code(self) -> SubfieldCode {
        match self {
            SubdivisionKind::General => SubfieldCode::General,
            SubdivisionKind::Chronological => SubfieldCode::Chronological,
            SubdivisionKind::Geographic => SubfieldCode::Geographic,
            SubdivisionKind::Form => SubfieldCode::Form,
        }
    }
}

/// What a rule may look at: the segment text and the role recorded on the
/// vocabulary entry the label came from.
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub text: &'a str,
    pub entry_role: Option<Role>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    Chronological,
    /// Place-name patterns in the segment text.
    Geographic,
    Form,
    /// Fallback for segments no text rule claimed: a geographic entry's
    /// remaining subdivisions are places unless they are standard topical
    /// subdivisions.
    GeographicEntry,
}

impl Rule {
    pub fn kind(self) -> SubdivisionKind {
        match self {
            Rule::Chronological => SubdivisionKind::Chronological,
            Rule::Geographic | Rule::GeographicEntry => SubdivisionKind::Geographic,
            Rule::Form => SubdivisionKind::Form,
        }
    }

    pub fn matches(self, segment: &Segment<'_>) -> bool {
        match self {
            Rule::Chronological => is_chronological(segment.text),
            Rule::Geographic => is_place_name(segment.text),
            Rule::Form => is_form(segment.text),
            Rule::GeographicEntry => {
                segment.entry_role == Some(Role::Geographic) && !is_general_subdivision(segment.text)
            }
        }
    }
}

pub const DEFAULT_RULES: [Rule; 4] = [Rule::Chronological, Rule::Geographic, Rule::Form, Rule::GeographicEntry];

#[derive(Debug, Clone)]
pub struct SubdivisionClassifier {
    rules: Vec<Rule>,
}

impl Default for SubdivisionClassifier {
    fn default() -> Self {
        Self { rules: DEFAULT_RULES.to_vec() }
    }
}

impl SubdivisionClassifier {
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn classify(&self, segment: &Segment<'_>) -> SubdivisionKind {
        self.rules
            .iter()
            .find(|rule| rule.matches(segment))
            .map_or(SubdivisionKind::General, |rule| rule.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> SubdivisionKind {
        SubdivisionClassifier::default().classify(&Segment { text, entry_role: None })
    }

    #[test]
    fn dates_and_eras_are_chronological() {
        assert_eq!(classify("Ming dynasty, 1368-1644"), SubdivisionKind::Chronological);
        assert_eq!(classify("20th century"), SubdivisionKind::Chronological);
        assert_eq!(classify("To 221 B.C."), SubdivisionKind::Chronological);
        assert_eq!(classify("Middle Ages"), SubdivisionKind::Chronological);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        assert_eq!(classify("Language"), SubdivisionKind::General, "'age' inside a word is not an era");
        assert_eq!(classify("Literature"), SubdivisionKind::General);
        assert_eq!(classify("History"), SubdivisionKind::General);
    }

    #[test]
    fn places_and_forms() {
        assert_eq!(classify("China"), SubdivisionKind::Geographic);
        assert_eq!(classify("Beijing (China)"), SubdivisionKind::Geographic);
        assert_eq!(classify("Handbooks, manuals, etc."), SubdivisionKind::Form);
        assert_eq!(classify("Periodicals"), SubdivisionKind::Form);
        assert_eq!(classify("Conference proceedings"), SubdivisionKind::Form);
    }

    #[test]
    fn earlier_rules_win() {
        // Both a date and a place: the chronological rule comes first.
        assert_eq!(classify("China, 1900"), SubdivisionKind::Chronological);
        let reordered = SubdivisionClassifier::with_rules(vec![Rule::Geographic, Rule::Chronological]);
        assert_eq!(
            reordered.classify(&Segment { text: "China, 1900", entry_role: None }),
            SubdivisionKind::Geographic
        );
    }

    #[test]
    fn geographic_entries_mark_their_subdivisions_as_places() {
        let c = SubdivisionClassifier::default();
        assert_eq!(
            c.classify(&Segment { text: "Xicheng Qu", entry_role: Some(Role::Geographic) }),
            SubdivisionKind::Geographic
        );
        assert_eq!(
            c.classify(&Segment { text: "Xicheng Qu", entry_role: Some(Role::Topical) }),
            SubdivisionKind::General
        );
    }

    #[test]
    fn geographic_entries_keep_topical_and_form_subdivisions() {
        let c = SubdivisionClassifier::default();
        let under_place = |text: &str| c.classify(&Segment { text, entry_role: Some(Role::Geographic) });
        assert_eq!(under_place("History"), SubdivisionKind::General);
        assert_eq!(under_place("Politics and government"), SubdivisionKind::General);
        assert_eq!(under_place("Description and travel"), SubdivisionKind::General);
        assert_eq!(under_place("Maps"), SubdivisionKind::Form);
        assert_eq!(under_place("Ming dynasty, 1368-1644"), SubdivisionKind::Chronological);
    }

    #[test]
    fn empty_rule_chain_yields_general() {
        let c = SubdivisionClassifier::with_rules(vec![]);
        assert_eq!(c.classify(&Segment { text: "1900", entry_role: None }), SubdivisionKind::General);
    }
}
