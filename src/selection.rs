// src/selection.rs

//! Multi-select state of a list screen

/// Identifiers the user toggled on, in the order they were toggled
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    available: Vec<String>,
    selected: Vec<String>,
}

impl SelectionSet {
    /// Create an empty selection over the given listing identifiers
    pub fn new<I, S>(available: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: available.into_iter().map(Into::into).collect(),
            selected: Vec::new(),
        }
    }

    /// Flip one identifier; returns whether it is now selected
    ///
    /// Unknown identifiers are ignored and reported as unselected.
    pub fn toggle(&mut self, id: &str) -> bool {
        if let Some(pos) = self.selected.iter().position(|s| s == id) {
            self.selected.remove(pos);
            return false;
        }
        if !self.available.iter().any(|s| s == id) {
            return false;
        }
        self.selected.push(id.to_string());
        true
    }

    /// Select everything, or nothing when everything is already selected
    pub fn toggle_all(&mut self) {
        if self.selected.len() == self.available.len() {
            self.selected.clear();
        } else {
            self.selected = self.available.clone();
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.iter().any(|s| s == id)
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Commit the selection, consuming the screen state
    pub fn into_selected(self) -> Vec<String> {
        self.selected
    }
}
