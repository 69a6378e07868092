use std::collections::BTreeSet;

use crate::models::RagDocument;

/// Reference documents offered for retrieval and which of them are ticked.
#[derive(Debug, Clone, Default)]
pub struct DocumentSelection {
    documents: Vec<RagDocument>,
    selected: BTreeSet<i64>,
}

impl DocumentSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the document list; every document starts selected.
    pub fn replace(&mut self, documents: Vec<RagDocument>) {
        self.selected = documents.iter().map(|d| d.id).collect();
        self.documents = documents;
    }

    pub fn documents(&self) -> &[RagDocument] {
        &self.documents
    }

    pub fn is_selected(&self, id: i64) -> bool {
        self.selected.contains(&id)
    }

    /// Returns `false` when `id` is not a known document.
    pub fn set_selected(&mut self, id: i64, selected: bool) -> bool {
        if !self.documents.iter().any(|d| d.id == id) {
            return false;
        }
        if selected {
            self.selected.insert(id);
        } else {
            self.selected.remove(&id);
        }
        true
    }

    pub fn select_all(&mut self, selected: bool) {
        self.selected = if selected {
            self.documents.iter().map(|d| d.id).collect()
        } else {
            BTreeSet::new()
        };
    }

    /// Ids to restrict retrieval to, or `None` to search everything. An empty
    /// or complete selection both mean "everything".
    pub fn selected_ids(&self) -> Option<Vec<i64>> {
        if self.selected.is_empty() || self.selected.len() == self.documents.len() {
            return None;
        }
        Some(
            self.documents
                .iter()
                .filter(|d| self.selected.contains(&d.id))
                .map(|d| d.id)
                .collect(),
        )
    }
}
