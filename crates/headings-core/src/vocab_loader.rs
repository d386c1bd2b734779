use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{VocabularyCode, VocabularyEntry};

/// Reads vocabulary exports in JSON Lines form, one entry per line.
#[derive(Debug, Default)]
pub struct VocabularyLoader {
    /// Keep only entries of this vocabulary.
    only: Option<VocabularyCode>,
}

impl VocabularyLoader {
    pub fn new() -> Self { Self::default() }

    pub fn only(mut self, vocabulary: VocabularyCode) -> Self {
        self.only = Some(vocabulary);
        self
    }

    /// Load a single `.jsonl` file or every `.jsonl` file below a directory.
    pub fn load_path(&self, path: &Path) -> Result<Vec<VocabularyEntry>> {
        let files = if path.is_dir() { self.list_jsonl_files(path) } else { vec![path.to_path_buf()] };
        if files.is_empty() {
            warn!("No .jsonl files found under {}", path.display());
            return Ok(vec![]);
        }

        // (vocabulary, identifier) -> position in `entries`; a later duplicate replaces the earlier one in place.
        let mut seen: HashMap<(VocabularyCode, String), usize> = HashMap::new();
        let mut entries: Vec<VocabularyEntry> = Vec::new();
        for (file_index, file) in files.iter().enumerate() {
            debug!("Reading file {}/{}: {}", file_index + 1, files.len(), file.display());
            for entry in self.read_file(file)? {
                let key = (entry.vocabulary_code.clone(), entry.identifier.clone());
                match seen.get(&key) {
                    Some(&pos) => entries[pos] = entry,
                    None => {
                        seen.insert(key, entries.len());
                        entries.push(entry);
                    }
                }
            }
        }
        info!("Loaded {} vocabulary entries from {} files", entries.len(), files.len());
        Ok(entries)
    }

    fn read_file(&self, file: &Path) -> Result<Vec<VocabularyEntry>> {
        let content = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
        let mut out = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() { continue; }
            let mut entry: VocabularyEntry = serde_json::from_str(line)
                .with_context(|| format!("{}:{}: malformed vocabulary entry", file.display(), idx + 1))?;
            if entry.label.trim().is_empty() || entry.identifier.trim().is_empty() {
                anyhow::bail!("{}:{}: entry needs a label and an identifier", file.display(), idx + 1);
            }
            if let Some(only) = &self.only {
                if &entry.vocabulary_code != only { continue; }
            }
            // Vectors are computed by the indexer, never taken from the export.
            entry.embedding.clear();
            out.push(entry);
        }
        Ok(out)
    }

    fn list_jsonl_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("jsonl") { files.push(path.to_path_buf()); }
        }
        files.sort();
        files
    }
}

/// Group entries by vocabulary, keeping load order inside each group.
pub fn group_by_vocabulary(entries: Vec<VocabularyEntry>) -> Vec<(VocabularyCode, Vec<VocabularyEntry>)> {
    let mut groups: Vec<(VocabularyCode, Vec<VocabularyEntry>)> = Vec::new();
    for entry in entries {
        match groups.iter_mut().find(|(code, _)| *code == entry.vocabulary_code) {
            Some((_, list)) => list.push(entry),
            None => groups.push((entry.vocabulary_code.clone(), vec![entry])),
        }
    }
    groups
}
