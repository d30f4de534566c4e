//! # Progress Bar Module
//!
//! Progress bar presets for the applications. [`progress_bar`] gives the
//! interactive bar with a descriptive text, a timer and an ETA;
//! [`null_bar`] gives a muted bar with the same interface, designed for
//! runs whose output goes to a log file.

use indicatif::{ProgressBar, ProgressStyle};

/// Width allotted to the descriptive text of the bar.
const TEXT_WIDTH: usize = 30;

/// Give the default progress bar of the project.
///
/// It prints an optional shrinkable text, a timer, a progress bar and an
/// ETA.
pub fn progress_bar(len: u64, text: Option<&str>) -> ProgressBar {
    let bar = ProgressBar::new(len);

    let template = match text {
        Some(_) => "{prefix} {elapsed_precise} [{bar:40}] {eta}",
        None => "{elapsed_precise} [{bar:40}] {eta}",
    };
    bar.set_style(
        ProgressStyle::with_template(template)
            .expect("progress bar template must be valid")
            .progress_chars("=> "),
    );

    if let Some(text) = text {
        bar.set_prefix(shrink_text(text, TEXT_WIDTH));
    }

    bar
}

/// Give the default muted progress bar of the project.
///
/// It only logs the optional text, the bar itself displays nothing.
pub fn null_bar(len: u64, text: Option<&str>) -> ProgressBar {
    if let Some(text) = text {
        log::info!("{}", text);
    }

    let bar = ProgressBar::hidden();
    bar.set_length(len);
    bar
}

/// Truncate a text by the middle so it fits the given width.
pub fn shrink_text(text: &str, width: usize) -> String {
    let characters: Vec<char> = text.chars().collect();
    if characters.len() <= width {
        return text.to_string();
    }

    let half = width / 2;
    let head: String = characters[..half.saturating_sub(2)].iter().collect();
    let tail: String = characters[characters.len() - (half.saturating_sub(1))..]
        .iter()
        .collect();

    format!("{}...{}", head.trim_end(), tail.trim_start())
}
