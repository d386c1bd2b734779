pub mod config;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;
pub mod vocab_loader;

pub use error::{Error, Result};
pub use registry::{authority_id, VocabularyRegistry, VocabularySpec};
pub use traits::{Embedder, Explainer, VocabularyStore};
pub use types::{
    AuthorityCandidate, FieldTag, Neighbor, Role, Subfield, SubfieldCode, SubjectField, TopicCandidate,
    VocabularyCode, VocabularyEntry,
};
