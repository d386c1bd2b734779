use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

use headings_core::VocabularyCode;

pub const TABLE_PREFIX: &str = "vocab_";

/// One table per vocabulary partition.
pub fn table_name(vocabulary: &VocabularyCode) -> String {
	format!("{TABLE_PREFIX}{}", vocabulary.as_str())
}

pub fn vector_field(dim: i32) -> Field {
	Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true)
}

pub fn build_vocabulary_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("identifier", DataType::Utf8, false),
		Field::new("label", DataType::Utf8, false),
		Field::new("alternate_labels", DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))), true),
		Field::new("role", DataType::Utf8, true),
		Field::new("scope_note", DataType::Utf8, true),
		vector_field(dim),
	]))
}

pub fn build_meta_schema() -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("key", DataType::Utf8, false),
		Field::new("value", DataType::Utf8, false),
		Field::new("updated_at", DataType::Timestamp(arrow_schema::TimeUnit::Millisecond, None), false),
	]))
}
