use std::collections::HashMap;

use dashmap::DashMap;

/// Form-side state the coordinator writes into.
///
/// The form owns the selected file name(s) per field, the mapping of uploaded
/// file names to destination paths, and a per-file error slot. Presence of a
/// file in the path mapping is the "file is uploaded" signal, so implementors
/// must apply writes synchronously; the coordinator completes an upload only
/// after `set_path_map` returned.
///
/// Embedders bridge this to their real form state; [`InMemoryFormState`] backs
/// the CLI and the test suites.
pub trait FormStateStore: Send + Sync {
    /// Currently selected file names for a field.
    fn selection(&self, field: &str) -> Vec<String>;

    /// Replaces the selection for a field.
    fn set_selection(&self, field: &str, files: Vec<String>);

    /// Snapshot of the `file name -> destination path` mapping.
    fn path_map(&self, path_field: &str) -> HashMap<String, String>;

    /// Replaces the path mapping. The coordinator merges into the snapshot it
    /// read, so existing entries survive a completion.
    fn set_path_map(&self, path_field: &str, paths: HashMap<String, String>);

    /// Records a terminal error for one file of a field.
    fn set_error(&self, field: &str, file_name: &str, message: &str);

    /// Clears a file's error slot, if set.
    fn clear_error(&self, field: &str, file_name: &str);

    /// Reads a file's error slot.
    fn error(&self, field: &str, file_name: &str) -> Option<String>;
}

#[derive(Debug, Default)]
struct FieldState {
    selection: Vec<String>,
    paths: HashMap<String, String>,
    errors: HashMap<String, String>,
}

/// Standalone form state keyed by field name.
#[derive(Debug, Default)]
pub struct InMemoryFormState {
    fields: DashMap<String, FieldState>,
}

impl InMemoryFormState {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FormStateStore for InMemoryFormState {
    fn selection(&self, field: &str) -> Vec<String> {
        self.fields
            .get(field)
            .map(|state| state.selection.clone())
            .unwrap_or_default()
    }

    fn set_selection(&self, field: &str, files: Vec<String>) {
        self.fields.entry(field.to_string()).or_default().selection = files;
    }

    fn path_map(&self, path_field: &str) -> HashMap<String, String> {
        self.fields
            .get(path_field)
            .map(|state| state.paths.clone())
            .unwrap_or_default()
    }

    fn set_path_map(&self, path_field: &str, paths: HashMap<String, String>) {
        self.fields.entry(path_field.to_string()).or_default().paths = paths;
    }

    fn set_error(&self, field: &str, file_name: &str, message: &str) {
        self.fields
            .entry(field.to_string())
            .or_default()
            .errors
            .insert(file_name.to_string(), message.to_string());
    }

    fn clear_error(&self, field: &str, file_name: &str) {
        if let Some(mut state) = self.fields.get_mut(field) {
            state.errors.remove(file_name);
        }
    }

    fn error(&self, field: &str, file_name: &str) -> Option<String> {
        self.fields
            .get(field)
            .and_then(|state| state.errors.get(file_name).cloned())
    }
}
