//! Subject-Field Builder: one accepted candidate plus a role in, one
//! structurally valid subject field out.
//!
//! Everything vocabulary-specific (second indicator, `$2` literal, identifier
//! form) comes from the registry. The builder keeps no state between calls.
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use headings_core::{
    authority_id, AuthorityCandidate, Error, Result, Role, Subfield, SubfieldCode, SubjectField, TopicCandidate,
    VocabularyRegistry,
};
use headings_match::TopicMatches;

use crate::classify::{Segment, SubdivisionClassifier};

/// Separates the main heading from its subdivisions in vocabulary labels.
pub const SUBDIVISION_DELIMITER: &str = "--";
/// First indicator of every subject field this builder emits (undefined).
pub const BLANK_INDICATOR: char = ' ';

/// Split a label into trimmed segments. Empty subdivisions are dropped;
/// an empty main heading is `MalformedLabel`.
pub fn decompose(label: &str) -> Result<(String, Vec<String>)> {
    let mut parts = label.split(SUBDIVISION_DELIMITER).map(str::trim);
    let main = parts.next().unwrap_or_default();
    if main.is_empty() {
        return Err(Error::MalformedLabel(format!("no main heading in label '{label}'")));
    }
    let subdivisions = parts.filter(|s| !s.is_empty()).map(str::to_string).collect();
    Ok((main.to_string(), subdivisions))
}

#[derive(Debug, Clone)]
pub struct SubjectFieldBuilder {
    registry: Arc<VocabularyRegistry>,
    classifier: SubdivisionClassifier,
}

impl SubjectFieldBuilder {
    pub fn new(registry: Arc<VocabularyRegistry>) -> Self {
        Self { registry, classifier: SubdivisionClassifier::default() }
    }

    pub fn with_classifier(mut self, classifier: SubdivisionClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn registry(&self) -> &VocabularyRegistry {
        &self.registry
    }

    pub fn build(&self, candidate: &AuthorityCandidate, role: Role) -> Result<SubjectField> {
        let spec = self.registry.lookup(&candidate.vocabulary_code)?;
        let (main, subdivisions) = decompose(&candidate.label)?;

        let mut subfields = Vec::with_capacity(subdivisions.len() + 3);
        subfields.push(Subfield::new(SubfieldCode::MainHeading, main.as_str()));
        for text in &subdivisions {
            let kind = self.classifier.classify(&Segment { text, entry_role: candidate.role });
            subfields.push(Subfield::new(kind.subfield_code(), text.as_str()));
        }
        let identifier = spec.identifier_value(&candidate.identifier);
        if !identifier.is_empty() {
            subfields.push(Subfield::new(SubfieldCode::Identifier, identifier));
        }
        if let Some(source) = &spec.source_code {
            subfields.push(Subfield::new(SubfieldCode::Source, source.as_str()));
        }

        let mut heading = main;
        for text in &subdivisions {
            heading.push_str(" -- ");
            heading.push_str(text);
        }

        Ok(SubjectField {
            field_tag: role.field_tag(),
            indicator_1: BLANK_INDICATOR,
            indicator_2: spec.indicator_2,
            subfields,
            heading,
            source_vocabulary: candidate.vocabulary_code.clone(),
            authority_id: authority_id(&candidate.identifier),
            confidence_score: candidate.score,
            explanation: String::new(),
        })
    }

    /// Build fields for every topic from the matcher's output, taking at most
    /// `max_per_topic` candidates per topic in matcher order. The topic's role
    /// hint picks the field tag. Candidates the builder refuses are reported,
    /// not fatal.
    pub fn build_from_matches(&self, matches: &[TopicMatches], max_per_topic: usize) -> BuildReport {
        let mut report = BuildReport::default();
        for topic_matches in matches {
            let mut built = 0;
            for candidate in topic_matches.candidates() {
                if built >= max_per_topic {
                    break;
                }
                match self.build(candidate, topic_matches.topic.role_hint) {
                    Ok(field) => {
                        built += 1;
                        report.fields.push(BuiltField {
                            topic: topic_matches.topic.clone(),
                            candidate: candidate.clone(),
                            field,
                        });
                    }
                    Err(e) => {
                        warn!(topic = %topic_matches.topic.text, label = %candidate.label, error = %e, "candidate rejected");
                        report.rejected.push(RejectedCandidate {
                            topic: topic_matches.topic.clone(),
                            candidate: candidate.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
        debug!(fields = report.fields.len(), rejected = report.rejected.len(), "built subject fields");
        report
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuiltField {
    pub topic: TopicCandidate,
    pub candidate: AuthorityCandidate,
    pub field: SubjectField,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedCandidate {
    pub topic: TopicCandidate,
    pub candidate: AuthorityCandidate,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub fields: Vec<BuiltField>,
    pub rejected: Vec<RejectedCandidate>,
}
