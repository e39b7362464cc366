//! Plain or gzip-compressed file handles, chosen by the `.gz` extension.

use crate::error::Result;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const GZ_BUF_SIZE: usize = 1 << 20;

fn is_gzipped(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("gz")
}

/// Open a (possibly gzipped) file into a BufRead.
pub fn open_reader<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    if is_gzipped(path) {
        Ok(Box::new(BufReader::with_capacity(
            GZ_BUF_SIZE,
            MultiGzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Output file handle; gzip streams need [`OutputFile::finish`] to write their trailer.
pub enum OutputFile {
    Plain(BufWriter<File>),
    Gzip(BufWriter<GzEncoder<File>>),
}

impl OutputFile {
    /// Flush buffered data and, for gzip, write the trailer. Errors surface
    /// here instead of being lost on drop.
    pub fn finish(self) -> Result<()> {
        match self {
            OutputFile::Plain(mut writer) => writer.flush()?,
            OutputFile::Gzip(writer) => {
                let encoder = writer.into_inner().map_err(|e| e.into_error())?;
                encoder.finish()?.sync_all()?;
            }
        }
        Ok(())
    }
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            OutputFile::Plain(writer) => writer.write(buf),
            OutputFile::Gzip(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            OutputFile::Plain(writer) => writer.flush(),
            OutputFile::Gzip(writer) => writer.flush(),
        }
    }
}

/// Create a writer, gzip-compressing when the path ends in `.gz`.
pub fn create_writer<P: AsRef<Path>>(path: P) -> Result<OutputFile> {
    let path = path.as_ref();
    let file = File::create(path)?;
    if is_gzipped(path) {
        Ok(OutputFile::Gzip(BufWriter::new(GzEncoder::new(
            file,
            Compression::default(),
        ))))
    } else {
        Ok(OutputFile::Plain(BufWriter::new(file)))
    }
}

/// Finish a csv writer built on [`create_writer`].
pub fn finish_csv(writer: csv::Writer<OutputFile>) -> Result<()> {
    writer
        .into_inner()
        .map_err(|e| e.into_error())?
        .finish()
}

/// Field delimiter for a table path: comma for `.csv`/`.csv.gz`, tab otherwise.
pub fn delimiter_for<P: AsRef<Path>>(path: P) -> u8 {
    let name = path
        .as_ref()
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if name.ends_with(".csv") || name.ends_with(".csv.gz") {
        b','
    } else {
        b'\t'
    }
}

/// Resolve `dir/name`, falling back to `dir/name.gz` when only the compressed file exists.
pub fn find_in_dir(dir: &Path, name: &str) -> PathBuf {
    let plain = dir.join(name);
    if plain.exists() {
        return plain;
    }
    let gz = dir.join(format!("{}.gz", name));
    if gz.exists() {
        gz
    } else {
        plain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn test_gzip_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.tsv.gz");
        {
            let mut writer = create_writer(&path).unwrap();
            writeln!(writer, "cell\tHTO_1").unwrap();
            writer.finish().unwrap();
        }

        let mut content = String::new();
        open_reader(&path).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "cell\tHTO_1\n");
    }

    #[test]
    fn test_delimiter_for() {
        assert_eq!(delimiter_for("genes.csv"), b',');
        assert_eq!(delimiter_for("genes.CSV.gz"), b',');
        assert_eq!(delimiter_for("hto.tsv.gz"), b'\t');
    }

    #[test]
    fn test_find_in_dir_prefers_existing_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("barcodes.tsv.gz"), b"").unwrap();
        assert_eq!(
            find_in_dir(dir.path(), "barcodes.tsv"),
            dir.path().join("barcodes.tsv.gz")
        );
        assert_eq!(
            find_in_dir(dir.path(), "features.tsv"),
            dir.path().join("features.tsv")
        );
    }

    #[test]
    fn test_gzip_finish_writes_complete_stream() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.yml.gz");
        let mut writer = create_writer(&path).unwrap();
        writer.write_all(b"Total: 3\n").unwrap();
        writer.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        // gzip trailer: CRC32 then ISIZE, little-endian
        let stored_len = u32::from_le_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        assert_eq!(stored_len, 9);

        let mut content = String::new();
        open_reader(&path).unwrap().read_to_string(&mut content).unwrap();
        assert_eq!(content, "Total: 3\n");
    }

    #[test]
    fn test_finish_csv_plain_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("calls.csv");
        let mut writer = csv::Writer::from_writer(create_writer(&path).unwrap());
        writer.write_record(["c1", "HTO_1"]).unwrap();
        finish_csv(writer).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "c1,HTO_1\n");
    }
}
