use serde::{Deserialize, Serialize};

use crate::model::ActivityId;

/// Which activity is active and whether the create/edit form is showing.
/// Edit vs. create is not stored: the form is editing when something is selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    selected: Option<ActivityId>,
    form_open: bool,
}

impl Selection {
    pub fn selected(&self) -> Option<&ActivityId> {
        self.selected.as_ref()
    }

    pub fn is_form_open(&self) -> bool {
        self.form_open
    }

    pub fn is_editing(&self) -> bool {
        self.form_open && self.selected.is_some()
    }

    pub fn is_creating(&self) -> bool {
        self.form_open && self.selected.is_none()
    }

    pub fn is_selected(&self, id: &ActivityId) -> bool {
        self.selected.as_ref() == Some(id)
    }

    pub fn select(&mut self, id: ActivityId) {
        self.selected = Some(id);
    }

    pub fn clear(&mut self) {
        self.selected = None;
    }

    /// Clears the selection only if it points at `id`.
    pub fn clear_if(&mut self, id: &ActivityId) -> bool {
        if self.is_selected(id) {
            self.selected = None;
            return true;
        }
        false
    }

    pub fn open_form(&mut self) {
        self.form_open = true;
    }

    pub fn close_form(&mut self) {
        self.form_open = false;
    }
}
