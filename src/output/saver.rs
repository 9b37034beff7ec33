//! Append-only persistence of collector records.
//!
//! In JSON mode the file always holds exactly one valid array. The first
//! record writes `[obj]`; every later record drops the trailing `]` and
//! appends `,obj]`. Earlier entries are never read back or rewritten.

use crate::config::OutputMode;
use crate::error::{Result, SystemError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Something a [`Saver`] knows how to persist.
///
/// Collectors implement this on their derived view and hand it to their
/// saver on every tick.
pub trait Encode {
    /// One CSV row, without the trailing newline.
    fn encode_csv(&self) -> String;

    /// One compact JSON object.
    fn encode_json(&self) -> Result<String>;
}

/// Mode-aware writer owning one output file for the whole run.
#[derive(Debug)]
pub struct Saver {
    file: Option<File>,
    path: PathBuf,
    mode: OutputMode,
    is_first_write: bool,
}

impl Saver {
    /// Create (or truncate) the output file at `path`.
    pub fn create(path: impl Into<PathBuf>, mode: OutputMode) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        info!("Writing {} output to {}", mode, path.display());

        Ok(Self {
            file: Some(file),
            path,
            mode,
            is_first_write: true,
        })
    }

    /// Append one record in the configured mode.
    pub fn save(&mut self, item: &dyn Encode) -> Result<()> {
        let file = self.file.as_mut().ok_or_else(|| {
            SystemError::output_error(format!("{} is already closed", self.path.display()))
        })?;

        match self.mode {
            OutputMode::Csv => {
                let mut line = item.encode_csv();
                line.push('\n');
                file.write_all(line.as_bytes())?;
            }
            OutputMode::Json => {
                let object = item.encode_json()?;
                append_json(file, &self.path, &object, self.is_first_write)?;
            }
        }
        file.flush()?;

        self.is_first_write = false;
        debug!("Saved record to {}", self.path.display());

        Ok(())
    }

    /// Flush and release the file. Later calls are no-ops.
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            debug!("Closed {}", self.path.display());
        }
        Ok(())
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured serialization mode.
    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Whether [`Saver::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }
}

fn append_json(file: &mut File, path: &Path, object: &str, is_first_write: bool) -> Result<()> {
    let len = file.metadata()?.len();

    if len == 0 {
        if !is_first_write {
            return Err(SystemError::output_error(format!(
                "{} was emptied behind the saver's back",
                path.display()
            )));
        }

        let mut buf = String::with_capacity(object.len() + 2);
        buf.push('[');
        buf.push_str(object);
        buf.push(']');

        file.seek(SeekFrom::Start(0))?;
        file.write_all(buf.as_bytes())?;
        return Ok(());
    }

    if is_first_write {
        return Err(SystemError::output_error(format!(
            "{} is not empty before the first record",
            path.display()
        )));
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    if last[0] != b']' {
        return Err(SystemError::output_error(format!(
            "{} does not end with ']', the JSON array is corrupt",
            path.display()
        )));
    }

    file.set_len(len - 1)?;

    let mut buf = String::with_capacity(object.len() + 2);
    buf.push(',');
    buf.push_str(object);
    buf.push(']');

    file.seek(SeekFrom::End(0))?;
    file.write_all(buf.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    struct Record(u32);

    impl Encode for Record {
        fn encode_csv(&self) -> String {
            format!("{},{:.2}", self.0, self.0 as f64 / 3.0)
        }

        fn encode_json(&self) -> Result<String> {
            Ok(serde_json::to_string(&serde_json::json!({ "a": self.0 }))?)
        }
    }

    #[test]
    fn test_json_two_saves_exact_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.json");
        let mut saver = Saver::create(&path, OutputMode::Json).unwrap();

        saver.save(&Record(1)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"[{"a":1}]"#);

        saver.save(&Record(2)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"[{"a":1},{"a":2}]"#);
        saver.close().unwrap();
    }

    #[test]
    fn test_json_stays_valid_after_every_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("many.json");
        let mut saver = Saver::create(&path, OutputMode::Json).unwrap();

        for i in 0..25 {
            saver.save(&Record(i)).unwrap();
            let content = fs::read_to_string(&path).unwrap();
            let value: serde_json::Value = serde_json::from_str(&content).unwrap();
            let items = value.as_array().unwrap();
            assert_eq!(items.len(), i as usize + 1);
            assert_eq!(items[i as usize]["a"], i);
        }
    }

    #[test]
    fn test_csv_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        let mut saver = Saver::create(&path, OutputMode::Csv).unwrap();

        for i in 0..3 {
            saver.save(&Record(i)).unwrap();
        }
        saver.close().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "0,0.00\n1,0.33\n2,0.67\n");
    }

    #[test]
    fn test_create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.json");
        fs::write(&path, "[1,2,3]").unwrap();

        let mut saver = Saver::create(&path, OutputMode::Json).unwrap();
        saver.save(&Record(7)).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), r#"[{"a":7}]"#);
    }

    #[test]
    fn test_corrupt_tail_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let mut saver = Saver::create(&path, OutputMode::Json).unwrap();
        saver.save(&Record(1)).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\n").unwrap();

        let err = saver.save(&Record(2)).unwrap_err();
        assert!(matches!(err, SystemError::Output(_)));
        // Nothing is repaired.
        assert_eq!(fs::read_to_string(&path).unwrap(), "[{\"a\":1}]\n");
    }

    #[test]
    fn test_save_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut saver = Saver::create(dir.path().join("c.csv"), OutputMode::Csv).unwrap();
        saver.close().unwrap();
        assert!(saver.is_closed());
        assert!(saver.save(&Record(1)).is_err());
        assert!(saver.close().is_ok());
    }
}
