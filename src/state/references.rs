use crate::models::Reference;

/// What the evidence side panel shows after a `show` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferencePanel {
    /// Explicit "no references" state.
    Empty,
    Listed(usize),
}

/// The latest batch of evidence snippets. Indices handed out by `open` are
/// positions in the current batch and are invalidated by the next `show`.
#[derive(Debug, Clone, Default)]
pub struct ReferenceViewer {
    last_shown: Vec<Reference>,
}

impl ReferenceViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, references: Vec<Reference>) -> ReferencePanel {
        self.last_shown = references;
        self.panel()
    }

    pub fn panel(&self) -> ReferencePanel {
        if self.last_shown.is_empty() {
            ReferencePanel::Empty
        } else {
            ReferencePanel::Listed(self.last_shown.len())
        }
    }

    pub fn open(&self, index: usize) -> Option<&Reference> {
        self.last_shown.get(index)
    }

    pub fn last_shown(&self) -> &[Reference] {
        &self.last_shown
    }
}
