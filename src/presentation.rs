//! Presentation state the screens are driven by: which career path is
//! expanded, and the colour theme.

use serde::{Deserialize, Serialize};

/// Expansion state of a career-path list. At most one entry is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accordion {
    expanded: Option<usize>,
}

impl Accordion {
    /// State for a freshly shown result list: first entry open when there is one.
    pub fn for_results(len: usize) -> Self {
        Self {
            expanded: if len > 0 { Some(0) } else { None },
        }
    }

    pub fn expanded(&self) -> Option<usize> {
        self.expanded
    }

    pub fn is_expanded(&self, index: usize) -> bool {
        self.expanded == Some(index)
    }

    /// Open `index`, or close it if it is already open.
    pub fn toggle(&mut self, index: usize) {
        self.expanded = if self.expanded == Some(index) {
            None
        } else {
            Some(index)
        };
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Theme {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}
