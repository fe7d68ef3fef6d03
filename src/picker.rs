use std::path::PathBuf;

/// Chooses the base directory an operation writes into.
///
/// Returning `None` means the user cancelled; the operation then writes
/// nothing.
pub trait FolderPicker {
    fn pick_folder(&mut self, title: &str) -> Option<PathBuf>;
}

/// Always answers with the same directory.
#[derive(Clone, Debug)]
pub struct FixedFolder(pub PathBuf);

impl FolderPicker for FixedFolder {
    fn pick_folder(&mut self, _title: &str) -> Option<PathBuf> {
        Some(self.0.clone())
    }
}

/// Native folder dialog.
#[cfg(feature = "dialog")]
#[derive(Clone, Copy, Debug, Default)]
pub struct DialogPicker;

#[cfg(feature = "dialog")]
impl FolderPicker for DialogPicker {
    fn pick_folder(&mut self, title: &str) -> Option<PathBuf> {
        rfd::FileDialog::new().set_title(title).pick_folder()
    }
}

/// Answers from a queue, then cancels.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ScriptedPicker {
    pub answers: std::collections::VecDeque<Option<PathBuf>>,
    pub titles: Vec<String>,
}

#[cfg(test)]
impl FolderPicker for ScriptedPicker {
    fn pick_folder(&mut self, title: &str) -> Option<PathBuf> {
        self.titles.push(title.to_string());
        self.answers.pop_front().flatten()
    }
}
