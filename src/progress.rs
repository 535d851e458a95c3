//! Progress bars and a log writer that prints above them.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

static MULTI_PROGRESS: OnceLock<MultiProgress> = OnceLock::new();

const BAR_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}";

fn multi_progress() -> &'static MultiProgress {
    MULTI_PROGRESS.get_or_init(|| {
        let mp = MultiProgress::new();
        mp.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        mp
    })
}

pub fn add_progress_bar(len: u64) -> ProgressBar {
    multi_progress().add(ProgressBar::new(len))
}

/// Bar for `len` work items; `None` when there is nothing to do
pub fn start_progress_bar(len: usize, message: &str) -> Option<ProgressBar> {
    if len == 0 {
        return None;
    }

    let pb = add_progress_bar(len as u64);
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

pub fn advance_progress(pb: &Option<ProgressBar>) {
    if let Some(pb) = pb {
        pb.inc(1);
    }
}

pub fn finish_progress(pb: Option<ProgressBar>, message: &str) {
    if let Some(pb) = pb {
        pb.finish_with_message(message.to_string());
    }
}

/// `MakeWriter` for tracing that routes each log line through the shared
/// progress display so bars stay pinned below the logs
#[derive(Default, Clone)]
pub struct LogWriterFactory;

pub struct LogWriter {
    buffer: String,
}

impl LogWriter {
    fn new() -> Self {
        Self {
            buffer: String::new(),
        }
    }

    fn emit(line: &str) {
        let _ = multi_progress().println(line.trim_end_matches('\r'));
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.push_str(&String::from_utf8_lossy(buf));

        while let Some(idx) = self.buffer.find('\n') {
            Self::emit(&self.buffer[..idx]);
            self.buffer.drain(..idx + 1);
        }

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buffer.is_empty() {
            Self::emit(&self.buffer);
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

impl<'a> MakeWriter<'a> for LogWriterFactory {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_bar_for_empty_work() {
        assert!(start_progress_bar(0, "nothing").is_none());
        finish_progress(None, "done");
    }

    #[test]
    fn test_bar_advances() {
        let pb = start_progress_bar(3, "Embedding");
        advance_progress(&pb);
        advance_progress(&pb);
        assert_eq!(pb.as_ref().map(|p| p.position()), Some(2));
        finish_progress(pb, "done");
    }

    #[test]
    fn test_log_writer_buffers_partial_lines() {
        let mut writer = LogWriterFactory.make_writer();
        writer.write_all(b"partial").unwrap();
        assert_eq!(writer.buffer, "partial");
        writer.write_all(b" line\nnext").unwrap();
        assert_eq!(writer.buffer, "next");
        writer.flush().unwrap();
        assert!(writer.buffer.is_empty());
    }
}
