//! Recording editor for unit tests

use lsp_types::Diagnostic;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::editor::Editor;
use crate::rc::UnsavedFile;

#[derive(Debug, Default)]
struct State {
    open: HashSet<PathBuf>,
    dirty: BTreeMap<PathBuf, String>,
    diagnostics: HashMap<PathBuf, Vec<Diagnostic>>,
    publish_count: usize,
    clear_count: usize,
    errors: Vec<String>,
    infos: Vec<String>,
    reload_prompts: Vec<String>,
    contexts: Vec<(String, bool)>,
}

/// Editor double that keeps document state and records every side effect
#[derive(Debug, Default)]
pub struct RecordingEditor {
    state: Mutex<State>,
}

impl RecordingEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().open.insert(path.into());
    }

    /// Open (if needed) and modify a document
    pub fn edit(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        let path = path.into();
        let mut state = self.state.lock().unwrap();
        state.open.insert(path.clone());
        state.dirty.insert(path, text.into());
    }

    pub fn save(&self, path: &Path) {
        self.state.lock().unwrap().dirty.remove(path);
    }

    pub fn close(&self, path: &Path) {
        let mut state = self.state.lock().unwrap();
        state.open.remove(path);
        state.dirty.remove(path);
    }

    pub fn diagnostics_for(&self, path: &Path) -> Option<Vec<Diagnostic>> {
        self.state.lock().unwrap().diagnostics.get(path).cloned()
    }

    pub fn publish_count(&self) -> usize {
        self.state.lock().unwrap().publish_count
    }

    pub fn clear_count(&self) -> usize {
        self.state.lock().unwrap().clear_count
    }

    pub fn errors(&self) -> Vec<String> {
        self.state.lock().unwrap().errors.clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.state.lock().unwrap().infos.clone()
    }

    pub fn reload_prompts(&self) -> Vec<String> {
        self.state.lock().unwrap().reload_prompts.clone()
    }

    /// Last value set for a context key
    pub fn context(&self, key: &str) -> Option<bool> {
        self.state
            .lock()
            .unwrap()
            .contexts
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, value)| *value)
    }
}

impl Editor for RecordingEditor {
    fn unsaved_files(&self) -> Vec<UnsavedFile> {
        self.state
            .lock()
            .unwrap()
            .dirty
            .iter()
            .map(|(path, text)| UnsavedFile::new(path.clone(), text.as_bytes()))
            .collect()
    }

    fn is_open(&self, path: &Path) -> bool {
        self.state.lock().unwrap().open.contains(path)
    }

    fn is_dirty(&self, path: &Path) -> bool {
        self.state.lock().unwrap().dirty.contains_key(path)
    }

    fn set_diagnostics(&self, path: &Path, diagnostics: Vec<Diagnostic>) {
        let mut state = self.state.lock().unwrap();
        state.publish_count += 1;
        state.diagnostics.insert(path.to_path_buf(), diagnostics);
    }

    fn clear_diagnostics(&self) {
        let mut state = self.state.lock().unwrap();
        state.clear_count += 1;
        state.diagnostics.clear();
    }

    fn show_error(&self, message: &str) {
        self.state.lock().unwrap().errors.push(message.to_string());
    }

    fn show_info(&self, message: &str) {
        self.state.lock().unwrap().infos.push(message.to_string());
    }

    fn prompt_reload(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .reload_prompts
            .push(message.to_string());
    }

    fn set_context(&self, key: &str, value: bool) {
        self.state
            .lock()
            .unwrap()
            .contexts
            .push((key.to_string(), value));
    }
}
