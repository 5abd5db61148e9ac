//! Archive builder - streams walked files into a ZIP spool
//!
//! Entries are written as they are downloaded into a temp-file backed
//! `ZipWriter`, so a backup never sits in memory as a whole. The finished
//! archive is shared by reference and read through independent views, one
//! per upload destination.

use std::collections::{BTreeMap, HashSet};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::result::{Error, Result};
use crate::ports::ByteSink;
use crate::services::walker::{Walk, WalkEntry};

/// Typed record of an archive entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Folder,
    File { bytes: u64 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    pub files: usize,
    pub folders: usize,
    /// Uncompressed bytes written
    pub bytes_in: u64,
    pub skipped: usize,
}

/// Incremental ZIP writer over a temp-file spool
pub struct ArchiveBuilder {
    writer: ZipWriter<NamedTempFile>,
    entries: BTreeMap<String, EntryKind>,
    roots: HashSet<String>,
    open_entry: Option<(String, u64)>,
    stats: ArchiveStats,
    warnings: Vec<String>,
}

impl ArchiveBuilder {
    /// Open a new spool in `spool_dir` (the system temp dir when `None`)
    pub fn begin(spool_dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("drivemirror-").suffix(".zip");
        let spool = match spool_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        debug!(path = %spool.path().display(), "Opened archive spool");

        Ok(Self {
            writer: ZipWriter::new(spool),
            entries: BTreeMap::new(),
            roots: HashSet::new(),
            open_entry: None,
            stats: ArchiveStats::default(),
            warnings: Vec::new(),
        })
    }

    fn options(size_hint: u64) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(9))
            .large_file(size_hint >= u64::from(u32::MAX))
    }

    pub fn stats(&self) -> ArchiveStats {
        self.stats
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn entries(&self) -> &BTreeMap<String, EntryKind> {
        &self.entries
    }

    /// Claim a top-level name, suffixing " (2)", " (3)"... on collision
    pub fn claim_root(&mut self, name: &str) -> String {
        let mut candidate = name.to_string();
        let mut n = 2;
        while self.roots.contains(&candidate) {
            candidate = format!("{} ({})", name, n);
            n += 1;
        }
        self.roots.insert(candidate.clone());
        candidate
    }

    /// Add an explicit folder entry. Empty folders survive this way.
    pub fn add_folder(&mut self, relative_path: &str) -> Result<()> {
        let path = relative_path.trim_matches('/');
        if self.entries.contains_key(path) {
            return Ok(());
        }
        self.writer
            .add_directory(format!("{}/", path), Self::options(0))?;
        self.entries.insert(path.to_string(), EntryKind::Folder);
        self.stats.folders += 1;
        Ok(())
    }

    /// Begin a file entry; bytes then arrive through `ByteSink`
    pub fn start_file(&mut self, relative_path: &str, size_hint: u64) -> Result<()> {
        let path = relative_path.trim_matches('/').to_string();
        if self.entries.contains_key(&path) {
            return Err(Error::Archive(format!("duplicate entry {}", path)));
        }
        self.writer
            .start_file(path.as_str(), Self::options(size_hint))?;
        self.open_entry = Some((path, 0));
        Ok(())
    }

    pub fn finish_file(&mut self) -> Result<u64> {
        let (path, written) = self
            .open_entry
            .take()
            .ok_or_else(|| Error::Archive("no open entry".to_string()))?;
        self.entries
            .insert(path, EntryKind::File { bytes: written });
        self.stats.files += 1;
        self.stats.bytes_in += written;
        Ok(written)
    }

    /// Drop the open entry after a failed download
    pub fn abort_file(&mut self, reason: &str) -> Result<()> {
        if let Some((path, _)) = self.open_entry.take() {
            self.writer.abort_file()?;
            warn!(path = %path, reason = %reason, "Skipped file");
            self.warnings.push(format!("{}: {}", path, reason));
            self.stats.skipped += 1;
        }
        Ok(())
    }

    /// Drain a walk into the archive
    ///
    /// The walk's root is renamed when another source already claimed the
    /// same basename. A file whose download fails is skipped with a warning.
    pub async fn add_walk(&mut self, walk: &mut Walk) -> Result<()> {
        let root = walk.root_name().to_string();
        let claimed = self.claim_root(&root);

        while let Some(entry) = walk.next().await {
            let path = rebase(entry.relative_path(), &root, &claimed);
            match entry {
                WalkEntry::Folder { .. } => self.add_folder(&path)?,
                WalkEntry::File { size, handle, .. } => {
                    if let Err(e) = self.start_file(&path, size) {
                        self.warnings.push(e.to_string());
                        self.stats.skipped += 1;
                        continue;
                    }
                    match walk.download(&handle, self).await {
                        Ok(_) => {
                            self.finish_file()?;
                        }
                        Err(e) => self.abort_file(&e.to_string())?,
                    }
                }
            }
        }

        self.warnings
            .extend(walk.warnings().iter().map(|w| w.to_string()));
        Ok(())
    }

    /// Write the central directory and hand back the spooled archive
    pub fn finish(mut self) -> Result<FinishedArchive> {
        if self.open_entry.is_some() {
            self.abort_file("archive finished with an open entry")?;
        }
        let mut spool = self.writer.finish()?;
        spool.flush()?;
        let size = spool.seek(SeekFrom::End(0))?;
        debug!(size, files = self.stats.files, folders = self.stats.folders, "Archive finished");

        Ok(FinishedArchive {
            source: ArchiveSource::Spooled {
                file: Arc::new(spool),
                size,
            },
            stats: self.stats,
            warnings: self.warnings,
        })
    }
}

impl ByteSink for ArchiveBuilder {
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let Some((_, written)) = self.open_entry.as_mut() else {
            return Err(Error::Archive("write with no open entry".to_string()));
        };
        self.writer.write_all(chunk)?;
        *written += chunk.len() as u64;
        Ok(())
    }
}

fn rebase(path: &str, root: &str, claimed: &str) -> String {
    if root == claimed {
        return path.to_string();
    }
    match path.strip_prefix(root) {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => format!("{}{}", claimed, rest),
        _ => path.to_string(),
    }
}

#[derive(Debug)]
pub struct FinishedArchive {
    pub source: ArchiveSource,
    pub stats: ArchiveStats,
    pub warnings: Vec<String>,
}

/// A finished archive that can be read any number of times
#[derive(Debug, Clone)]
pub enum ArchiveSource {
    Spooled { file: Arc<NamedTempFile>, size: u64 },
    Memory(Arc<Vec<u8>>),
}

impl ArchiveSource {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ArchiveSource::Memory(Arc::new(bytes))
    }

    pub fn size(&self) -> u64 {
        match self {
            ArchiveSource::Spooled { size, .. } => *size,
            ArchiveSource::Memory(bytes) => bytes.len() as u64,
        }
    }

    /// An independent reader starting at offset 0
    pub fn view(&self) -> Result<ArchiveView> {
        let inner = match self {
            ArchiveSource::Spooled { file, .. } => {
                ViewInner::File(tokio::fs::File::from_std(file.reopen()?))
            }
            ArchiveSource::Memory(bytes) => ViewInner::Memory(Arc::clone(bytes)),
        };
        Ok(ArchiveView {
            inner,
            position: 0,
            size: self.size(),
        })
    }
}

enum ViewInner {
    File(tokio::fs::File),
    Memory(Arc<Vec<u8>>),
}

/// One consumer's cursor over an `ArchiveSource`
pub struct ArchiveView {
    inner: ViewInner,
    position: u64,
    size: u64,
}

impl ArchiveView {
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Up to `max` bytes, or `None` at the end
    pub async fn next_chunk(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        let remaining = self.size - self.position;
        if remaining == 0 {
            return Ok(None);
        }
        let len = remaining.min(max as u64) as usize;
        let chunk = match &mut self.inner {
            ViewInner::File(file) => {
                let mut buf = vec![0u8; len];
                file.read_exact(&mut buf).await?;
                buf
            }
            ViewInner::Memory(bytes) => {
                let start = self.position as usize;
                bytes[start..start + len].to_vec()
            }
        };
        self.position += len as u64;
        Ok(Some(chunk))
    }

    /// The rest of the archive in one buffer
    pub async fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity((self.size - self.position) as usize);
        while let Some(chunk) = self.next_chunk(1024 * 1024).await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    use crate::adapters::memory::MemoryPathDrive;
    use crate::domain::{AccessToken, PrincipalId};
    use crate::services::walker::RemoteTreeWalker;

    async fn read_back(source: &ArchiveSource) -> zip::ZipArchive<Cursor<Vec<u8>>> {
        let bytes = source.view().unwrap().read_all().await.unwrap();
        zip::ZipArchive::new(Cursor::new(bytes)).unwrap()
    }

    fn names(archive: &mut zip::ZipArchive<Cursor<Vec<u8>>>) -> Vec<String> {
        let mut names: Vec<String> = archive.file_names().map(|n| n.to_string()).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_builds_files_and_empty_folders() {
        let drive = Arc::new(
            MemoryPathDrive::new()
                .with_file("/Docs/a.txt", vec![b'a'; 10 * 1024])
                .with_file("/Docs/b.txt", vec![b'b'; 20 * 1024])
                .with_file("/Docs/c.txt", vec![b'c'; 5 * 1024])
                .with_folder("/Empty"),
        );
        let walker = RemoteTreeWalker::new(drive);
        let token = AccessToken::new("t");
        let principal = PrincipalId::new("p");
        let dir = tempfile::tempdir().unwrap();

        let mut builder = ArchiveBuilder::begin(Some(dir.path())).unwrap();
        for source in ["/Docs", "/Empty"] {
            let mut walk = walker.walk(&token, &principal, source);
            builder.add_walk(&mut walk).await.unwrap();
        }
        let finished = builder.finish().unwrap();

        assert_eq!(finished.stats.files, 3);
        assert_eq!(finished.stats.folders, 2);
        assert_eq!(finished.stats.bytes_in, 35 * 1024);
        assert!(finished.source.size() > 0);

        let mut archive = read_back(&finished.source).await;
        assert_eq!(
            names(&mut archive),
            vec!["Docs/", "Docs/a.txt", "Docs/b.txt", "Docs/c.txt", "Empty/"]
        );
        let mut content = Vec::new();
        archive
            .by_name("Docs/b.txt")
            .unwrap()
            .read_to_end(&mut content)
            .unwrap();
        assert_eq!(content.len(), 20 * 1024);
    }

    #[tokio::test]
    async fn test_failed_download_is_skipped() {
        let drive = Arc::new(
            MemoryPathDrive::new()
                .with_file("/Docs/good.txt", b"good".to_vec())
                .with_file("/Docs/bad.txt", b"bad".to_vec())
                .fail_download("/Docs/bad.txt"),
        );
        let walker = RemoteTreeWalker::new(drive);
        let mut builder = ArchiveBuilder::begin(None).unwrap();
        let mut walk = walker.walk(&AccessToken::new("t"), &PrincipalId::new("p"), "/Docs");
        builder.add_walk(&mut walk).await.unwrap();
        let finished = builder.finish().unwrap();

        assert_eq!(finished.stats.files, 1);
        assert_eq!(finished.stats.skipped, 1);
        assert!(finished.warnings[0].contains("Docs/bad.txt"));

        let mut archive = read_back(&finished.source).await;
        assert_eq!(names(&mut archive), vec!["Docs/", "Docs/good.txt"]);
    }

    #[tokio::test]
    async fn test_colliding_roots_are_renamed() {
        let drive = Arc::new(
            MemoryPathDrive::new()
                .with_file("/A/Reports/x.txt", b"x".to_vec())
                .with_file("/B/Reports/y.txt", b"y".to_vec()),
        );
        let walker = RemoteTreeWalker::new(drive);
        let token = AccessToken::new("t");
        let principal = PrincipalId::new("p");
        let mut builder = ArchiveBuilder::begin(None).unwrap();
        for source in ["/A/Reports", "/B/Reports"] {
            let mut walk = walker.walk(&token, &principal, source);
            builder.add_walk(&mut walk).await.unwrap();
        }
        let finished = builder.finish().unwrap();

        let mut archive = read_back(&finished.source).await;
        assert_eq!(
            names(&mut archive),
            vec!["Reports (2)/", "Reports (2)/y.txt", "Reports/", "Reports/x.txt"]
        );
    }

    #[tokio::test]
    async fn test_views_are_independent() {
        let source = ArchiveSource::from_bytes((0u8..=255).collect());
        let mut first = source.view().unwrap();
        let mut second = source.view().unwrap();

        let a = first.next_chunk(100).await.unwrap().unwrap();
        assert_eq!(a.len(), 100);
        let all = second.read_all().await.unwrap();
        assert_eq!(all.len(), 256);
        let rest = first.read_all().await.unwrap();
        assert_eq!(rest.len(), 156);
        assert_eq!(rest[0], 100);
        assert!(first.next_chunk(10).await.unwrap().is_none());
    }

    #[test]
    fn test_rebase() {
        assert_eq!(rebase("Docs/a.txt", "Docs", "Docs (2)"), "Docs (2)/a.txt");
        assert_eq!(rebase("Docs", "Docs", "Docs (2)"), "Docs (2)");
        assert_eq!(rebase("Docsx/a", "Docs", "Docs (2)"), "Docsx/a");
    }
}
