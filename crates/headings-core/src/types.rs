//! Domain types shared by the matcher, the field builder and the stores.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Number of alternate labels folded into an entry's embedding text.
pub const MAX_EMBEDDED_ALTERNATES: usize = 3;
/// Scope notes are cut to this many characters before embedding.
pub const MAX_EMBEDDED_SCOPE_CHARS: usize = 200;

/// Code of a controlled vocabulary, normalized to lower case (`lcsh`, `fast`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VocabularyCode(pub(crate) String);

impl VocabularyCode {
    pub fn new(code: impl AsRef<str>) -> Result<Self> {
        let code = code.as_ref().trim().to_ascii_lowercase();
        let valid = !code.is_empty()
            && code.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(Error::InvalidInput(format!("invalid vocabulary code '{code}'")));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VocabularyCode {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<VocabularyCode> for String {
    fn from(code: VocabularyCode) -> Self {
        code.0
    }
}

impl FromStr for VocabularyCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for VocabularyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Semantic category of a heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Topical,
    Geographic,
    #[serde(alias = "genre", alias = "genre-form")]
    GenreForm,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Topical => "topical",
            Role::Geographic => "geographic",
            Role::GenreForm => "genre_form",
        }
    }

    pub fn field_tag(self) -> FieldTag {
        match self {
            Role::Topical => FieldTag::TopicalSubject,
            Role::Geographic => FieldTag::GeographicName,
            Role::GenreForm => FieldTag::GenreForm,
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "topical" => Ok(Role::Topical),
            "geographic" => Ok(Role::Geographic),
            "genre_form" | "genre-form" | "genre" => Ok(Role::GenreForm),
            other => Err(Error::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subject field type in the bibliographic record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldTag {
    #[serde(rename = "650")]
    TopicalSubject,
    #[serde(rename = "651")]
    GeographicName,
    #[serde(rename = "655")]
    GenreForm,
}

impl FieldTag {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldTag::TopicalSubject => "650",
            FieldTag::GeographicName => "651",
            FieldTag::GenreForm => "655",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "650" => Some(FieldTag::TopicalSubject),
            "651" => Some(FieldTag::GeographicName),
            "655" => Some(FieldTag::GenreForm),
            _ => None,
        }
    }
}

impl fmt::Display for FieldTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subfield codes emitted in subject fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubfieldCode {
    #[serde(rename = "a")]
    MainHeading,
    #[serde(rename = "x")]
    General,
    #[serde(rename = "y")]
    Chronological,
    #[serde(rename = "z")]
    Geographic,
    #[serde(rename = "v")]
    Form,
    #[serde(rename = "0")]
    Identifier,
    #[serde(rename = "2")]
    Source,
}

impl SubfieldCode {
    pub fn as_char(self) -> char {
        match self {
            SubfieldCode::MainHeading => 'a',
            SubfieldCode::General => 'x',
            SubfieldCode::Chronological => 'y',
            SubfieldCode::Geographic => 'z',
            SubfieldCode::Form => 'v',
            SubfieldCode::Identifier => '0',
            SubfieldCode::Source => '2',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'a' => Some(SubfieldCode::MainHeading),
            'x' => Some(SubfieldCode::General),
            'y' => Some(SubfieldCode::Chronological),
            'z' => Some(SubfieldCode::Geographic),
            'v' => Some(SubfieldCode::Form),
            '0' => Some(SubfieldCode::Identifier),
            '2' => Some(SubfieldCode::Source),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subfield {
    pub code: SubfieldCode,
    pub value: String,
}

impl Subfield {
    pub fn new(code: SubfieldCode, value: impl Into<String>) -> Self {
        Self { code, value: value.into() }
    }
}

/// One controlled-vocabulary record as held by a vocabulary store.
///
/// `identifier` + `vocabulary_code` identify the entry. `embedding` is empty
/// until the entry has been indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub label: String,
    #[serde(default)]
    pub alternate_labels: Vec<String>,
    pub identifier: String,
    pub vocabulary_code: VocabularyCode,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_note: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl VocabularyEntry {
    /// Text handed to the embedding provider when the entry is indexed:
    /// label, a few alternate labels, then a trimmed scope note.
    pub fn embedding_text(&self) -> String {
        let mut parts: Vec<String> = vec![self.label.trim().to_string()];
        parts.extend(
            self.alternate_labels
                .iter()
                .map(|alt| alt.trim())
                .filter(|alt| !alt.is_empty())
                .take(MAX_EMBEDDED_ALTERNATES)
                .map(str::to_string),
        );
        if let Some(note) = self.scope_note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            parts.push(note.chars().take(MAX_EMBEDDED_SCOPE_CHARS).collect());
        }
        parts.join(" | ")
    }
}

/// Caller-supplied topic to match against the vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCandidate {
    #[serde(alias = "topic")]
    pub text: String,
    #[serde(alias = "type", default = "default_role")]
    pub role_hint: Role,
}

fn default_role() -> Role {
    Role::Topical
}

impl TopicCandidate {
    pub fn new(text: impl Into<String>, role_hint: Role) -> Self {
        Self { text: text.into(), role_hint }
    }
}

/// One nearest-neighbor row returned by a vocabulary store.
///
/// `similarity` is higher-is-better and comparable only within one
/// vocabulary's index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub identifier: String,
    pub label: String,
    pub alternate_labels: Vec<String>,
    pub role: Option<Role>,
    pub similarity: f32,
}

impl Neighbor {
    pub fn into_candidate(self, vocabulary_code: &VocabularyCode) -> AuthorityCandidate {
        AuthorityCandidate {
            label: self.label,
            identifier: self.identifier,
            vocabulary_code: vocabulary_code.clone(),
            role: self.role,
            score: self.similarity.clamp(0.0, 1.0),
        }
    }
}

/// A scored, unconfirmed match between a topic and a vocabulary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorityCandidate {
    pub label: String,
    pub identifier: String,
    pub vocabulary_code: VocabularyCode,
    #[serde(default)]
    pub role: Option<Role>,
    pub score: f32,
}

/// A structured subject field ready for the bibliographic record.
///
/// The first subfield is always the main heading; identifier and source
/// code subfields, when present, come last and in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectField {
    pub field_tag: FieldTag,
    pub indicator_1: char,
    pub indicator_2: char,
    pub subfields: Vec<Subfield>,
    pub heading: String,
    pub source_vocabulary: VocabularyCode,
    pub authority_id: Option<String>,
    pub confidence_score: f32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub explanation: String,
}

impl SubjectField {
    pub fn main_heading(&self) -> Option<&str> {
        self.subfields
            .first()
            .filter(|sf| sf.code == SubfieldCode::MainHeading)
            .map(|sf| sf.value.as_str())
    }

    pub fn values(&self, code: SubfieldCode) -> impl Iterator<Item = &str> {
        self.subfields.iter().filter(move |sf| sf.code == code).map(|sf| sf.value.as_str())
    }

    /// Copy with the advisory explanation stripped, for comparing the
    /// deterministic part of two fields.
    pub fn without_explanation(&self) -> SubjectField {
        SubjectField { explanation: String::new(), ..self.clone() }
    }
}

fn display_indicator(c: char) -> char {
    if c == ' ' { '_' } else { c }
}

/// Mnemonic form, e.g. `650 _0 $a China $x History $0 http://...`.
impl fmt::Display for SubjectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}{}",
            self.field_tag,
            display_indicator(self.indicator_1),
            display_indicator(self.indicator_2)
        )?;
        for sf in &self.subfields {
            write!(f, " ${} {}", sf.code.as_char(), sf.value)?;
        }
        Ok(())
    }
}
