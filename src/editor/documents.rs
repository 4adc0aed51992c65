//! Open document tracking for the stdio bridge
//!
//! The bridge host sends full document text on every change, so the store can
//! answer "which buffers are dirty and what do they contain" without asking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::rc::UnsavedFile;

#[derive(Debug, Clone)]
struct Document {
    text: String,
    dirty: bool,
}

/// Text and dirty state of every open document
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<PathBuf, Document>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document opened with its on-disk contents
    pub fn open(&mut self, path: PathBuf, text: String) {
        self.documents.insert(path, Document { text, dirty: false });
    }

    /// Full-text change; opens the document if the open event was missed
    pub fn change(&mut self, path: PathBuf, text: String) {
        self.documents.insert(path, Document { text, dirty: true });
    }

    /// Document written to disk
    pub fn save(&mut self, path: &Path) {
        if let Some(document) = self.documents.get_mut(path) {
            document.dirty = false;
        }
    }

    pub fn close(&mut self, path: &Path) {
        self.documents.remove(path);
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.documents.contains_key(path)
    }

    pub fn is_dirty(&self, path: &Path) -> bool {
        self.documents.get(path).is_some_and(|document| document.dirty)
    }

    /// Dirty documents, sorted by path so rc sees a stable argument order
    pub fn unsaved_files(&self) -> Vec<UnsavedFile> {
        let mut files: Vec<UnsavedFile> = self
            .documents
            .iter()
            .filter(|(_, document)| document.dirty)
            .map(|(path, document)| UnsavedFile::new(path.clone(), document.text.as_bytes()))
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_tracking() {
        let mut store = DocumentStore::new();
        let path = PathBuf::from("/ws/a.cpp");

        store.open(path.clone(), "int a;".to_string());
        assert!(store.is_open(&path));
        assert!(!store.is_dirty(&path));
        assert!(store.unsaved_files().is_empty());

        store.change(path.clone(), "int a = 1;".to_string());
        assert!(store.is_dirty(&path));
        assert_eq!(
            store.unsaved_files(),
            vec![UnsavedFile::new("/ws/a.cpp", "int a = 1;")]
        );

        store.save(&path);
        assert!(!store.is_dirty(&path));

        store.close(&path);
        assert!(!store.is_open(&path));
    }

    #[test]
    fn test_unsaved_files_sorted() {
        let mut store = DocumentStore::new();
        store.change(PathBuf::from("/ws/b.cpp"), "b".to_string());
        store.change(PathBuf::from("/ws/a.cpp"), "a".to_string());

        let paths: Vec<PathBuf> = store.unsaved_files().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec![PathBuf::from("/ws/a.cpp"), PathBuf::from("/ws/b.cpp")]);
    }
}
