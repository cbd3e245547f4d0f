//! Append-only `run.log` kept next to the frames.
//!
//! Journal writes are best effort: an I/O error is logged once and the
//! journal goes quiet instead of failing the run.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub struct RunJournal {
    path: PathBuf,
    file: Option<File>,
}

impl RunJournal {
    /// Open (or create) the journal at `path` for appending.
    pub fn open(path: &Path) -> Self {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| log::warn!("Cannot open run journal {}: {}", path.display(), e))
            .ok();
        Self {
            path: path.to_path_buf(),
            file,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn started(&mut self, total: u32) {
        self.line(&format!("Start acquisition of {} photos", total));
    }

    pub fn captured(&mut self, file_name: &str, elapsed: Duration) {
        self.line(&format!("OK  {}  {:.2}s", file_name, elapsed.as_secs_f64()));
    }

    pub fn capture_error(&mut self, file_name: &str, attempt: u32, message: &str) {
        self.line(&format!("ERROR  {}  attempt {}  {}", file_name, attempt, message));
    }

    pub fn finished(&mut self, summary: &str) {
        self.line(&format!("End of acquisition: {}", summary));
    }

    fn line(&mut self, message: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        if let Err(e) = writeln!(file, "{}  {}", stamp, message) {
            log::warn!("Run journal {} disabled: {}", self.path.display(), e);
            self.file = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_journal_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.log");
        {
            let mut journal = RunJournal::open(&path);
            journal.started(3);
            journal.captured("frame_00001.png", Duration::from_millis(1500));
            journal.capture_error("frame_00002.png", 1, "timed out");
        }
        {
            let mut journal = RunJournal::open(&path);
            journal.finished("completed");
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("Start acquisition of 3 photos"));
        assert!(lines[1].ends_with("OK  frame_00001.png  1.50s"));
        assert!(lines[2].contains("ERROR  frame_00002.png  attempt 1  timed out"));
        assert!(lines[3].ends_with("End of acquisition: completed"));
    }

    #[test]
    fn test_unwritable_journal_is_silent() {
        let dir = TempDir::new().unwrap();
        let mut journal = RunJournal::open(&dir.path().join("missing").join("run.log"));
        journal.started(1);
        journal.finished("completed");
    }
}
