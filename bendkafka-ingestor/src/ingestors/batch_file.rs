use std::{
    io::{BufWriter, Write},
    path::Path,
};

use tempfile::NamedTempFile;

use crate::Result;

/// NDJSON file holding one batch. Removed from disk when dropped or closed,
/// so it never outlives the ingest call that created it.
#[derive(Debug)]
pub struct BatchFile {
    file: NamedTempFile,
    bytes: u64,
    rows: u64,
}

impl BatchFile {
    /// Writes one line per record and syncs the file before returning
    pub fn write_lines<P: AsRef<Path>>(dir: P, lines: &[String]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("databend-ingest-")
            .suffix(".ndjson")
            .tempfile_in(dir)?;

        let mut bytes = 0;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            for line in lines {
                writer.write_all(line.as_bytes())?;
                writer.write_all(b"\n")?;
                bytes += line.len() as u64 + 1;
            }
            writer.flush()?;
        }
        file.as_file().sync_all()?;

        Ok(Self {
            file,
            bytes,
            rows: lines.len() as u64,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Delete now, surfacing the error that drop would swallow
    pub fn close(self) -> Result<()> {
        self.file.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn it_writes_one_line_per_record() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let lines = vec![r#"{"a":1}"#.to_owned(), r#"{"b":"two"}"#.to_owned()];

        let file = BatchFile::write_lines(dir.path(), &lines)?;
        let written = std::fs::read_to_string(file.path())?;

        assert_eq!("{\"a\":1}\n{\"b\":\"two\"}\n", written);
        assert_eq!(written.len() as u64, file.bytes());
        assert_eq!(2, file.rows());

        let name = file.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("databend-ingest-"));
        assert!(name.ends_with(".ndjson"));
        Ok(())
    }

    #[test]
    fn it_is_removed_on_close_and_on_drop() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let lines = vec!["{}".to_owned()];

        let closed = BatchFile::write_lines(dir.path(), &lines)?;
        let closed_path = closed.path().to_owned();
        closed.close()?;
        assert!(!closed_path.exists());

        let dropped = BatchFile::write_lines(dir.path(), &lines)?;
        let dropped_path = dropped.path().to_owned();
        drop(dropped);
        assert!(!dropped_path.exists());

        assert_eq!(0, std::fs::read_dir(dir.path())?.count());
        Ok(())
    }

    #[test]
    fn concurrent_batches_get_distinct_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let lines = vec!["{}".to_owned()];
        let a = BatchFile::write_lines(dir.path(), &lines)?;
        let b = BatchFile::write_lines(dir.path(), &lines)?;
        assert_ne!(a.path(), b.path());
        Ok(())
    }
}
