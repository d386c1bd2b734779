pub mod builder;
pub mod classify;
pub mod encode;
pub mod explain;

pub use builder::{decompose, BuildReport, BuiltField, RejectedCandidate, SubjectFieldBuilder};
pub use classify::{Rule, SubdivisionClassifier, SubdivisionKind};
pub use encode::{from_marc_json, mnemonic, to_marc_json, EncodedField};
pub use explain::{attach_explanation, ChatExplainer, ScoreExplainer};
