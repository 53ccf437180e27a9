//! CLI-specific progress handling for butterfly-cells
//!
//! Tracks how much of an input file the stream simplifier has consumed.

use std::io::Read;

use indicatif::{ProgressBar, ProgressBarIter, ProgressStyle};

/// Template for a bar tracking bytes of an input file
const INPUT_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} read ({percent}%) {msg}";

/// Creates a progress bar over `input_size` bytes of input
pub fn create_progress_bar(input_size: u64) -> ProgressBar {
    let style = ProgressStyle::with_template(INPUT_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    ProgressBar::new(input_size).with_style(style)
}

/// Progress manager for reading one input file
pub struct ProgressManager {
    pub pb: ProgressBar,
}

impl ProgressManager {
    /// Announce `message` on stderr and start a bar over `input_size` bytes
    pub fn new(input_size: u64, message: &str) -> Self {
        eprintln!("{message}");
        Self {
            pb: create_progress_bar(input_size),
        }
    }

    /// Advance the bar as `reader` is consumed
    pub fn wrap_read<R: Read>(&self, reader: R) -> ProgressBarIter<R> {
        self.pb.wrap_read(reader)
    }

    pub fn finish(&self, message: &'static str) {
        self.pb.finish_with_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_counts_input_bytes() {
        let pb = create_progress_bar(4096);
        assert_eq!(pb.length(), Some(4096));
        pb.inc(1024);
        assert_eq!(pb.position(), 1024);
        pb.finish();
    }

    #[test]
    fn test_progress_manager_tracks_reads() {
        let manager = ProgressManager::new(11, "Test input");
        let mut reader = manager.wrap_read(&b"1 a\n2 b\n3 c"[..]);
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!(manager.pb.position(), 11);
        manager.finish("done");
    }
}
