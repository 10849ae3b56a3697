use std::path::PathBuf;

use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};

// ---------------------------------------------------------------------------
// Pickers
// ---------------------------------------------------------------------------

/// Ask for a directory. `None` when the dialog was cancelled.
pub fn pick_folder(title: &str) -> Option<PathBuf> {
    let dir = FileDialog::new().set_title(title).pick_folder();
    if dir.is_none() {
        log::warn!("{title}: cancelled");
    }
    dir
}

/// Ask for the background image.
pub fn pick_background() -> Option<PathBuf> {
    let file = FileDialog::new()
        .set_title("Select background image")
        .add_filter("Images", &["tif", "tiff", "png"])
        .add_filter("TIFF", &["tif", "tiff"])
        .pick_file();
    if file.is_none() {
        log::warn!("Background selection cancelled");
    }
    file
}

// ---------------------------------------------------------------------------
// Confirmation
// ---------------------------------------------------------------------------

/// Yes/no question asked after a batch.
pub fn confirm(title: &str, question: &str) -> bool {
    let answer = MessageDialog::new()
        .set_level(MessageLevel::Info)
        .set_title(title)
        .set_description(question)
        .set_buttons(MessageButtons::YesNo)
        .show();
    matches!(answer, MessageDialogResult::Yes)
}
