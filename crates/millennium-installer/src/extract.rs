//! Streaming archive extraction with two-level progress.
//!
//! Extraction makes two passes over the archive. The first pass sums the
//! uncompressed size of every entry, the second writes entries under the
//! output directory in 8 KiB chunks. Overall progress is updated once per entry
//! from the bytes processed so far; entry progress is updated after every chunk.
//!
//! A single entry that cannot be read or written is logged, recorded in the
//! [`ExtractReport`] and skipped. Only an archive that cannot be opened aborts
//! the whole extraction. Both progress cells end at `1.0` either way.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::{debug, info, warn};

use crate::error::{InstallError, Result};
use crate::progress::ProgressCell;

/// Copy buffer size for entry data.
const WRITE_BUFFER_SIZE: usize = 8192;

/// Archive formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveType {
    /// ZIP archive (Windows releases).
    Zip,
    /// gzip-compressed tar archive (Linux releases).
    TarGz,
}

impl ArchiveType {
    /// Get a human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Zip => "ZIP",
            Self::TarGz => "tar.gz",
        }
    }
}

impl std::fmt::Display for ArchiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Detects the archive type from a file name.
#[must_use]
pub fn detect_archive_type(name: &str) -> Option<ArchiveType> {
    let name = name.to_lowercase();
    if name.ends_with(".zip") {
        Some(ArchiveType::Zip)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveType::TarGz)
    } else {
        None
    }
}

/// One file or directory record read from an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Archive-relative path as stored in the archive.
    pub path: String,
    /// Size of the entry's data once decompressed.
    pub uncompressed_size: u64,
    /// Whether the path names a directory.
    pub is_directory: bool,
    /// Unix permission bits stored in the archive, if any.
    pub unix_mode: Option<u32>,
}

impl ArchiveEntry {
    fn new(path: String, uncompressed_size: u64, unix_mode: Option<u32>) -> Self {
        let is_directory = is_directory_path(&path);
        Self {
            path,
            uncompressed_size,
            is_directory,
            unix_mode,
        }
    }
}

/// Returns true when an archive path names a directory.
///
/// This looks only at the string: a trailing `/` or `\`, or a path with no
/// file name component, is a directory.
#[must_use]
pub fn is_directory_path(path: &str) -> bool {
    path.is_empty()
        || path.ends_with('/')
        || path.ends_with('\\')
        || Path::new(path).file_name().is_none()
}

/// An entry that was skipped during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedEntry {
    /// Archive-relative path of the entry.
    pub path: String,
    /// Why the entry was skipped.
    pub reason: String,
}

/// Summary of an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// Number of entries found in the archive.
    pub entries: usize,
    /// Sum of uncompressed entry sizes.
    pub total_bytes: u64,
    /// Files written to disk.
    pub files_written: usize,
    /// Directory entries created.
    pub directories_created: usize,
    /// Entries that were skipped.
    pub failed: Vec<FailedEntry>,
}

impl ExtractReport {
    /// Returns true when every entry was extracted.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Extracts `archive_path` into `output_dir`.
///
/// `overall` tracks bytes processed across the whole archive and `entry`
/// tracks the entry currently being written.
pub fn extract(
    archive_path: &Path,
    output_dir: &Path,
    overall: &ProgressCell,
    entry: &ProgressCell,
) -> Result<ExtractReport> {
    extract_with_observer(archive_path, output_dir, overall, entry, |_, _| {})
}

/// Like [`extract`], calling `observe(overall, entry)` after every progress write.
pub fn extract_with_observer<F>(
    archive_path: &Path,
    output_dir: &Path,
    overall: &ProgressCell,
    entry: &ProgressCell,
    observe: F,
) -> Result<ExtractReport>
where
    F: FnMut(f64, f64),
{
    info!(
        "Extracting {} to {}",
        archive_path.display(),
        output_dir.display()
    );

    let archive_name = archive_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut sink = EntrySink {
        output_dir,
        overall,
        entry,
        processed: 0,
        report: ExtractReport::default(),
        observe,
    };
    overall.reset();
    entry.reset();

    let result = match detect_archive_type(&archive_name) {
        Some(ArchiveType::TarGz) => extract_tar_gz(archive_path, &mut sink),
        Some(ArchiveType::Zip) | None => extract_zip(archive_path, &mut sink),
    };

    overall.complete();
    entry.complete();
    (sink.observe)(overall.get(), entry.get());

    let report = result.map(|()| sink.report)?;
    info!(
        "Extracted {} files and {} directories ({} entries skipped)",
        report.files_written,
        report.directories_created,
        report.failed.len()
    );
    Ok(report)
}

/// Per-run extraction state shared by both archive formats.
struct EntrySink<'a, F> {
    output_dir: &'a Path,
    overall: &'a ProgressCell,
    entry: &'a ProgressCell,
    processed: u64,
    report: ExtractReport,
    observe: F,
}

impl<F: FnMut(f64, f64)> EntrySink<'_, F> {
    fn begin(&mut self, entries: usize, total_bytes: u64) {
        debug!("Archive holds {} entries, {} bytes", entries, total_bytes);
        self.report.entries = entries;
        self.report.total_bytes = total_bytes;
    }

    fn notify(&mut self) {
        (self.observe)(self.overall.get(), self.entry.get());
    }

    fn fail(&mut self, path: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!("Skipping archive entry {}: {}", path, reason);
        self.report.failed.push(FailedEntry {
            path: path.to_string(),
            reason,
        });
    }

    /// Processes one entry. `data` is `None` when the entry could not be opened.
    fn process(&mut self, entry: &ArchiveEntry, data: std::result::Result<&mut dyn Read, String>) {
        if self.report.total_bytes > 0 {
            self.overall
                .set(self.processed as f64 / self.report.total_bytes as f64);
        }
        self.entry.reset();
        self.notify();

        self.write_entry(entry, data);
        self.processed += entry.uncompressed_size;
    }

    fn write_entry(&mut self, entry: &ArchiveEntry, data: std::result::Result<&mut dyn Read, String>) {
        let Some(dest) = entry_destination(self.output_dir, &entry.path) else {
            self.fail(&entry.path, "path escapes the output directory");
            return;
        };

        if entry.is_directory || dest == self.output_dir {
            match fs::create_dir_all(&dest) {
                Ok(()) => {
                    debug!("Created directory {}", dest.display());
                    self.report.directories_created += 1;
                }
                Err(e) => self.fail(&entry.path, format!("cannot create directory: {e}")),
            }
            return;
        }

        let reader = match data {
            Ok(reader) => reader,
            Err(reason) => {
                self.fail(&entry.path, reason);
                return;
            }
        };

        if let Some(parent) = dest.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            self.fail(&entry.path, format!("cannot create parent directory: {e}"));
            return;
        }

        let mut output = match File::create(&dest) {
            Ok(file) => file,
            Err(e) => {
                self.fail(&entry.path, format!("cannot open for writing: {e}"));
                return;
            }
        };

        if let Err(e) = self.copy_entry(reader, &mut output, entry.uncompressed_size) {
            self.fail(&entry.path, e.to_string());
            return;
        }

        apply_permissions(&dest, entry.unix_mode);
        self.report.files_written += 1;
    }

    fn copy_entry(&mut self, reader: &mut dyn Read, output: &mut File, size: u64) -> io::Result<()> {
        let mut buffer = [0u8; WRITE_BUFFER_SIZE];
        let mut written = 0u64;

        if size == 0 {
            self.entry.complete();
            self.notify();
        }

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            output.write_all(&buffer[..bytes_read])?;
            written += bytes_read as u64;
            self.entry.set_ratio(written.min(size), size);
            self.notify();
        }

        output.flush()?;
        self.entry.complete();
        Ok(())
    }
}

fn extract_zip<F: FnMut(f64, f64)>(archive_path: &Path, sink: &mut EntrySink<'_, F>) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| {
        InstallError::ArchiveExtraction(format!("cannot open {}: {e}", archive_path.display()))
    })?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))?;

    let mut entries = Vec::with_capacity(archive.len());
    let mut total_bytes = 0u64;
    for index in 0..archive.len() {
        match archive.by_index_raw(index) {
            Ok(file) => {
                let entry = ArchiveEntry::new(file.name().to_string(), file.size(), file.unix_mode());
                total_bytes += entry.uncompressed_size;
                entries.push(Ok(entry));
            }
            Err(e) => entries.push(Err(format!("entry #{index}: {e}"))),
        }
    }
    sink.begin(entries.len(), total_bytes);

    for (index, entry) in entries.into_iter().enumerate() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(reason) => {
                sink.fail(&format!("#{index}"), reason);
                continue;
            }
        };

        if entry.is_directory {
            sink.process(&entry, Err(String::new()));
            continue;
        }

        match archive.by_index(index) {
            Ok(mut file) => sink.process(&entry, Ok(&mut file)),
            Err(e) => sink.process(&entry, Err(format!("cannot open entry: {e}"))),
        }
    }

    Ok(())
}

fn extract_tar_gz<F: FnMut(f64, f64)>(
    archive_path: &Path,
    sink: &mut EntrySink<'_, F>,
) -> Result<()> {
    let open = || -> Result<tar::Archive<GzDecoder<BufReader<File>>>> {
        let file = File::open(archive_path).map_err(|e| {
            InstallError::ArchiveExtraction(format!("cannot open {}: {e}", archive_path.display()))
        })?;
        Ok(tar::Archive::new(GzDecoder::new(BufReader::new(file))))
    };

    let mut archive = open()?;
    let mut count = 0usize;
    let mut total_bytes = 0u64;
    let entries = archive
        .entries()
        .map_err(|e| InstallError::ArchiveExtraction(format!("cannot read tar entries: {e}")))?;
    for entry in entries {
        match entry {
            Ok(entry) => {
                count += 1;
                total_bytes += entry.size();
            }
            Err(e) => {
                return Err(InstallError::ArchiveExtraction(format!(
                    "cannot read tar entry: {e}"
                )));
            }
        }
    }
    sink.begin(count, total_bytes);

    let mut archive = open()?;
    let entries = archive
        .entries()
        .map_err(|e| InstallError::ArchiveExtraction(format!("cannot read tar entries: {e}")))?;
    for entry in entries {
        let mut entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                sink.fail("<tar stream>", e.to_string());
                break;
            }
        };
        let path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        let mode = entry.header().mode().ok();
        let record = ArchiveEntry::new(path, entry.size(), mode);
        sink.process(&record, Ok(&mut entry));
    }

    Ok(())
}

/// Joins an archive path onto the output directory.
///
/// Returns `None` for absolute paths and paths that climb out with `..`.
fn entry_destination(output_dir: &Path, entry_path: &str) -> Option<PathBuf> {
    let normalized = entry_path.replace('\\', "/");
    let mut dest = output_dir.to_path_buf();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => dest.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(dest)
}

#[cfg(unix)]
fn apply_permissions(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;

    let Some(mode) = mode.map(|m| m & 0o7777).filter(|m| *m != 0) else {
        return;
    };
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        debug!("Could not set permissions on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn apply_permissions(_path: &Path, _mode: Option<u32>) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, entries: &[(&str, Option<&[u8]>)]) {
        let mut buffer = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buffer));
            for (name, data) in entries {
                match data {
                    Some(data) => {
                        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                        zip.write_all(data).unwrap();
                    }
                    None => zip.add_directory(*name, SimpleFileOptions::default()).unwrap(),
                }
            }
            zip.finish().unwrap();
        }
        fs::write(path, buffer).unwrap();
    }

    fn build_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect_archive_type() {
        assert_eq!(
            detect_archive_type("millennium-v2.0.0-windows-x86_64.zip"),
            Some(ArchiveType::Zip)
        );
        assert_eq!(
            detect_archive_type("millennium-v2.0.0-linux-x86_64.tar.gz"),
            Some(ArchiveType::TarGz)
        );
        assert_eq!(detect_archive_type("notes.txt"), None);
    }

    #[test]
    fn test_is_directory_path() {
        assert!(is_directory_path("dir/"));
        assert!(is_directory_path("dir\\"));
        assert!(is_directory_path(""));
        assert!(is_directory_path(".."));
        assert!(!is_directory_path("dir/file.txt"));
        assert!(!is_directory_path("file"));
    }

    #[test]
    fn test_entry_destination_rejects_escape() {
        let out = Path::new("/out");
        assert_eq!(
            entry_destination(out, "dir/file.txt"),
            Some(PathBuf::from("/out/dir/file.txt"))
        );
        assert_eq!(
            entry_destination(out, "dir\\sub\\a.dll"),
            Some(PathBuf::from("/out/dir/sub/a.dll"))
        );
        assert_eq!(entry_destination(out, "../evil"), None);
        assert_eq!(entry_destination(out, "/etc/passwd"), None);
    }

    #[test]
    fn test_extract_dir_and_file() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("release.zip");
        build_zip(&archive, &[("dir/", None), ("dir/file.txt", Some(b"hello world!"))]);

        let out = tmp.path().join("out");
        let overall = ProgressCell::new();
        let entry = ProgressCell::new();
        let mut samples = Vec::new();
        let report = extract_with_observer(&archive, &out, &overall, &entry, |o, e| {
            samples.push((o, e));
        })
        .unwrap();

        assert!(out.join("dir").is_dir());
        assert_eq!(fs::read(out.join("dir/file.txt")).unwrap(), b"hello world!");
        assert_eq!(report.entries, 2);
        assert_eq!(report.total_bytes, 12);
        assert_eq!(report.files_written, 1);
        assert_eq!(report.directories_created, 1);
        assert!(report.is_complete());

        // Overall never decreases and only reaches 1.0 at the very end.
        for pair in samples.windows(2) {
            assert!(pair[1].0 >= pair[0].0);
        }
        let (last, rest) = samples.split_last().unwrap();
        assert_eq!(*last, (1.0, 1.0));
        assert!(rest.iter().all(|(o, _)| *o < 1.0));

        // Entry progress restarts at 0 and climbs to 1 while the file is copied.
        let entry_values: Vec<f64> = rest.iter().map(|(_, e)| *e).collect();
        assert!(entry_values.contains(&0.0));
        assert!(entry_values.contains(&1.0));
        assert_eq!(overall.get(), 1.0);
        assert_eq!(entry.get(), 1.0);
    }

    #[test]
    fn test_extract_overwrites_existing_files() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("release.zip");
        build_zip(&archive, &[("plugin.dll", Some(b"new"))]);

        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("plugin.dll"), b"old contents that are longer").unwrap();

        let report = extract(&archive, &out, &ProgressCell::new(), &ProgressCell::new()).unwrap();
        assert_eq!(report.files_written, 1);
        assert_eq!(fs::read(out.join("plugin.dll")).unwrap(), b"new");
    }

    #[test]
    fn test_extract_creates_missing_parents() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("release.zip");
        build_zip(&archive, &[("ext/data/shims/a.js", Some(b"1"))]);

        let out = tmp.path().join("out");
        extract(&archive, &out, &ProgressCell::new(), &ProgressCell::new()).unwrap();
        assert!(out.join("ext/data/shims/a.js").is_file());
    }

    #[test]
    fn test_extract_skips_entry_that_cannot_be_written() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("release.zip");
        build_zip(
            &archive,
            &[("blocked/file.txt", Some(b"nope")), ("ok.txt", Some(b"fine"))],
        );

        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        // A plain file where a directory is needed makes the first entry fail.
        fs::write(out.join("blocked"), b"").unwrap();

        let overall = ProgressCell::new();
        let report = extract(&archive, &out, &overall, &ProgressCell::new()).unwrap();

        assert_eq!(report.files_written, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].path, "blocked/file.txt");
        assert_eq!(fs::read(out.join("ok.txt")).unwrap(), b"fine");
        assert_eq!(overall.get(), 1.0);
    }

    #[test]
    fn test_extract_unreadable_archive_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("broken.zip");
        fs::write(&archive, b"this is not a zip file").unwrap();

        let overall = ProgressCell::new();
        let entry = ProgressCell::new();
        let result = extract(&archive, &tmp.path().join("out"), &overall, &entry);

        assert!(matches!(result, Err(InstallError::ArchiveExtraction(_))));
        assert_eq!(overall.get(), 1.0);
        assert_eq!(entry.get(), 1.0);
    }

    #[test]
    fn test_extract_missing_archive_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let result = extract(
            &tmp.path().join("missing.zip"),
            tmp.path(),
            &ProgressCell::new(),
            &ProgressCell::new(),
        );
        assert!(matches!(result, Err(InstallError::ArchiveExtraction(_))));
    }

    #[test]
    fn test_extract_tar_gz() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("millennium-v2.0.0-linux-x86_64.tar.gz");
        build_tar_gz(
            &archive,
            &[("lib/libmillennium.so", b"elf-bytes"), ("README.md", b"# hi")],
        );

        let out = tmp.path().join("out");
        let report = extract(&archive, &out, &ProgressCell::new(), &ProgressCell::new()).unwrap();

        assert_eq!(report.entries, 2);
        assert_eq!(report.total_bytes, 13);
        assert_eq!(fs::read(out.join("lib/libmillennium.so")).unwrap(), b"elf-bytes");
        assert_eq!(fs::read(out.join("README.md")).unwrap(), b"# hi");
    }

    #[test]
    fn test_extract_large_entry_reports_intermediate_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("release.zip");
        let data = vec![7u8; WRITE_BUFFER_SIZE * 4];
        build_zip(&archive, &[("big.bin", Some(&data))]);

        let mut entry_values = Vec::new();
        extract_with_observer(
            &archive,
            &tmp.path().join("out"),
            &ProgressCell::new(),
            &ProgressCell::new(),
            |_, e| entry_values.push(e),
        )
        .unwrap();

        assert!(entry_values.iter().any(|e| *e > 0.0 && *e < 1.0));
        for pair in entry_values.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }
}
