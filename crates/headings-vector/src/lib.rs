pub mod index_build;
pub mod memory;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

pub use index_build::{build_vocabulary_index, IndexOutcome};
pub use memory::MemoryVocabularyStore;
pub use search::LanceVocabularyStore;
pub use writer::{IndexReport, VocabularyIndexer};
