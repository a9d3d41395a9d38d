use indicatif::{ProgressBar, ProgressStyle};

/// Byte counter for memory reads and writes.
pub(crate) fn create_progress_bar(total_bytes: u64, msg: &str) -> ProgressBar {
    let style = ProgressStyle::with_template(
        "{msg:16} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} bytes ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");

    let pb = ProgressBar::new(total_bytes).with_style(style);
    pb.set_message(msg.to_owned());
    pb
}
