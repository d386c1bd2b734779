//! Vocabulary Registry: per-vocabulary encoding conventions.
//!
//! Every vocabulary-specific rule used by the matcher and the field builder
//! lives in one keyed table. Adding a vocabulary is a new row here (or in
//! `config.toml`) plus indexed entries in the store.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::types::VocabularyCode;

/// Second indicator reserved for the primary national authority.
pub const PRIMARY_AUTHORITY_INDICATOR: char = '0';
/// Second indicator for "source specified in subfield $2".
pub const OTHER_SOURCE_INDICATOR: char = '7';

/// Encoding conventions for one vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularySpec {
    pub code: VocabularyCode,
    pub indicator_2: char,
    /// Literal for subfield $2. Present exactly when the vocabulary is not
    /// the primary authority.
    pub source_code: Option<String>,
    pub identifier_is_uri: bool,
    /// Prepended to non-URI identifiers in subfield $0, e.g. `(OCoLC)`.
    pub identifier_prefix: Option<String>,
}

impl VocabularySpec {
    pub fn requires_source_code(&self) -> bool {
        self.source_code.is_some()
    }

    /// Value written to the identifier subfield for `identifier`.
    pub fn identifier_value(&self, identifier: &str) -> String {
        let identifier = identifier.trim();
        match &self.identifier_prefix {
            Some(prefix) if !self.identifier_is_uri && !identifier.starts_with(prefix.as_str()) => {
                format!("{prefix}{identifier}")
            }
            _ => identifier.to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.indicator_2.is_ascii_digit() {
            return Err(Error::InvalidConfig(format!(
                "vocabulary '{}': indicator_2 must be a digit, got '{}'",
                self.code, self.indicator_2
            )));
        }
        let has_source = self.source_code.as_deref().is_some_and(|s| !s.trim().is_empty());
        if self.source_code.is_some() && !has_source {
            return Err(Error::InvalidConfig(format!("vocabulary '{}': empty source code", self.code)));
        }
        if self.indicator_2 == PRIMARY_AUTHORITY_INDICATOR && has_source {
            return Err(Error::InvalidConfig(format!(
                "vocabulary '{}': the primary authority indicator cannot carry a source code",
                self.code
            )));
        }
        if self.indicator_2 != PRIMARY_AUTHORITY_INDICATOR && !has_source {
            return Err(Error::InvalidConfig(format!(
                "vocabulary '{}': indicator '{}' requires a source code",
                self.code, self.indicator_2
            )));
        }
        Ok(())
    }
}

/// Registry row as written in configuration files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularyRow {
    pub code: String,
    pub indicator_2: String,
    #[serde(default)]
    pub source_code: Option<String>,
    #[serde(default)]
    pub identifier_is_uri: bool,
    #[serde(default)]
    pub identifier_prefix: Option<String>,
}

impl TryFrom<VocabularyRow> for VocabularySpec {
    type Error = Error;

    fn try_from(row: VocabularyRow) -> Result<Self> {
        let code = VocabularyCode::new(&row.code)
            .map_err(|e| Error::InvalidConfig(format!("registry row: {e}")))?;
        let mut chars = row.indicator_2.chars();
        let indicator_2 = match (chars.next(), chars.next()) {
            (Some(c), None) => c,
            _ => {
                return Err(Error::InvalidConfig(format!(
                    "vocabulary '{code}': indicator_2 must be one character, got '{}'",
                    row.indicator_2
                )))
            }
        };
        Ok(VocabularySpec {
            code,
            indicator_2,
            source_code: row.source_code,
            identifier_is_uri: row.identifier_is_uri,
            identifier_prefix: row.identifier_prefix.filter(|p| !p.is_empty()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct VocabularyRegistry {
    specs: BTreeMap<VocabularyCode, VocabularySpec>,
}

impl VocabularyRegistry {
    pub fn from_specs(specs: impl IntoIterator<Item = VocabularySpec>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for spec in specs {
            spec.validate()?;
            if map.contains_key(&spec.code) {
                return Err(Error::InvalidConfig(format!("duplicate vocabulary '{}'", spec.code)));
            }
            map.insert(spec.code.clone(), spec);
        }
        if map.is_empty() {
            return Err(Error::InvalidConfig("vocabulary registry is empty".into()));
        }
        Ok(Self { specs: map })
    }

    pub fn from_rows(rows: Vec<VocabularyRow>) -> Result<Self> {
        let specs = rows.into_iter().map(VocabularySpec::try_from).collect::<Result<Vec<_>>>()?;
        Self::from_specs(specs)
    }

    /// LCSH as primary authority, FAST as the faceted secondary vocabulary,
    /// and the extension vocabularies recognised for display and encoding.
    pub fn builtin() -> Self {
        let mut specs = BTreeMap::new();
        let mut add = |code: &str, indicator_2: char, source: Option<&str>, uri: bool| {
            let code = VocabularyCode(code.to_string());
            specs.insert(
                code.clone(),
                VocabularySpec {
                    code,
                    indicator_2,
                    source_code: source.map(str::to_string),
                    identifier_is_uri: uri,
                    identifier_prefix: None,
                },
            );
        };
        add("lcsh", PRIMARY_AUTHORITY_INDICATOR, None, true);
        add("fast", OTHER_SOURCE_INDICATOR, Some("fast"), true);
        for code in ["gtt", "rero", "swd", "idszbz", "ram"] {
            add(code, OTHER_SOURCE_INDICATOR, Some(code), false);
        }
        Self { specs }
    }

    pub fn lookup(&self, code: &VocabularyCode) -> Result<&VocabularySpec> {
        self.specs.get(code).ok_or_else(|| Error::UnknownVocabulary(code.to_string()))
    }

    /// Fail fast when any of `codes` has no registry row.
    pub fn ensure_covers<'a>(&self, codes: impl IntoIterator<Item = &'a VocabularyCode>) -> Result<()> {
        for code in codes {
            self.lookup(code)?;
        }
        Ok(())
    }

    pub fn codes(&self) -> impl Iterator<Item = &VocabularyCode> {
        self.specs.keys()
    }
}

impl Default for VocabularyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Short authority id for an identifier: last URI path segment, or the
/// identifier without a leading `(ORG)` prefix.
pub fn authority_id(identifier: &str) -> Option<String> {
    let trimmed = identifier.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let tail = if trimmed.contains("://") {
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    } else {
        trimmed
    };
    let tail = match (tail.starts_with('('), tail.find(')')) {
        (true, Some(end)) => &tail[end + 1..],
        _ => tail,
    };
    let tail = tail.trim();
    (!tail.is_empty()).then(|| tail.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> VocabularyCode {
        VocabularyCode::new(s).unwrap()
    }

    #[test]
    fn builtin_primary_and_secondary_conventions() {
        let registry = VocabularyRegistry::builtin();
        let lcsh = registry.lookup(&code("lcsh")).unwrap();
        assert_eq!(lcsh.indicator_2, '0');
        assert!(!lcsh.requires_source_code());
        let fast = registry.lookup(&code("fast")).unwrap();
        assert_eq!(fast.indicator_2, '7');
        assert_eq!(fast.source_code.as_deref(), Some("fast"));
    }

    #[test]
    fn missing_vocabulary_is_reported() {
        let registry = VocabularyRegistry::builtin();
        let err = registry.ensure_covers([&code("lcsh"), &code("mesh")]).unwrap_err();
        assert!(matches!(err, Error::UnknownVocabulary(c) if c == "mesh"));
    }

    #[test]
    fn rows_violating_indicator_rules_are_rejected() {
        let row = |ind: &str, src: Option<&str>| VocabularyRow {
            code: "mesh".into(),
            indicator_2: ind.into(),
            source_code: src.map(str::to_string),
            identifier_is_uri: true,
            identifier_prefix: None,
        };
        assert!(VocabularyRegistry::from_rows(vec![row("7", None)]).is_err());
        assert!(VocabularyRegistry::from_rows(vec![row("0", Some("mesh"))]).is_err());
        assert!(VocabularyRegistry::from_rows(vec![row("77", Some("mesh"))]).is_err());
        assert!(VocabularyRegistry::from_rows(vec![row("7", Some("mesh")), row("7", Some("mesh"))]).is_err());
        assert!(VocabularyRegistry::from_rows(vec![row("7", Some("mesh"))]).is_ok());
    }

    #[test]
    fn identifier_prefix_applies_to_bare_ids_once() {
        let spec = VocabularySpec {
            code: code("fast"),
            indicator_2: '7',
            source_code: Some("fast".into()),
            identifier_is_uri: false,
            identifier_prefix: Some("(OCoLC)".into()),
        };
        assert_eq!(spec.identifier_value("fst00844437"), "(OCoLC)fst00844437");
        assert_eq!(spec.identifier_value("(OCoLC)fst00844437"), "(OCoLC)fst00844437");
    }

    #[test]
    fn authority_ids_from_uris_and_prefixed_ids() {
        assert_eq!(
            authority_id("http://id.loc.gov/authorities/subjects/sh85024024").as_deref(),
            Some("sh85024024")
        );
        assert_eq!(authority_id("(OCoLC)fst00844437").as_deref(), Some("fst00844437"));
        assert_eq!(authority_id("  "), None);
    }
}
