//! Remote tree walker
//!
//! Lazily walks a OneDrive folder tree depth-first. Listing happens on
//! demand as entries are pulled, so a walk never holds more than one
//! listing per open folder. A folder that cannot be listed is recorded as a
//! warning and skipped; its siblings are still walked.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::config::basename;
use crate::domain::remote::join_remote_path;
use crate::domain::result::Result;
use crate::domain::{AccessToken, DownloadHandle, PrincipalId, RemoteItem};
use crate::ports::{ByteSink, PathDrive};

/// One item yielded by a walk. Paths are archive-relative and start with
/// the source folder's basename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEntry {
    Folder {
        relative_path: String,
    },
    File {
        relative_path: String,
        size: u64,
        handle: DownloadHandle,
    },
}

impl WalkEntry {
    pub fn relative_path(&self) -> &str {
        match self {
            WalkEntry::Folder { relative_path } | WalkEntry::File { relative_path, .. } => {
                relative_path
            }
        }
    }
}

/// A subtree the walk had to skip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkWarning {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for WalkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Creates walks over one principal's drive
pub struct RemoteTreeWalker {
    drive: Arc<dyn PathDrive>,
    max_depth: usize,
}

impl RemoteTreeWalker {
    pub const DEFAULT_MAX_DEPTH: usize = 32;

    pub fn new(drive: Arc<dyn PathDrive>) -> Self {
        Self {
            drive,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    /// Folders nested deeper than this below the source root are skipped
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Start a walk of `root_path`. Nothing is listed until the first `next()`.
    pub fn walk(&self, token: &AccessToken, principal: &PrincipalId, root_path: &str) -> Walk {
        Walk {
            drive: Arc::clone(&self.drive),
            token: token.clone(),
            principal: principal.clone(),
            root_path: root_path.to_string(),
            root_name: basename(root_path).to_string(),
            max_depth: self.max_depth,
            started: false,
            stack: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

struct Frame {
    remote_path: String,
    relative_path: String,
    depth: usize,
    children: VecDeque<RemoteItem>,
}

/// A single in-progress walk. Not resumable: restart by creating a new one.
pub struct Walk {
    drive: Arc<dyn PathDrive>,
    token: AccessToken,
    principal: PrincipalId,
    root_path: String,
    root_name: String,
    max_depth: usize,
    started: bool,
    stack: Vec<Frame>,
    warnings: Vec<WalkWarning>,
}

impl Walk {
    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    pub fn warnings(&self) -> &[WalkWarning] {
        &self.warnings
    }

    /// Pull the next entry. The source root itself is yielded first.
    pub async fn next(&mut self) -> Option<WalkEntry> {
        if !self.started {
            self.started = true;
            let root_path = self.root_path.clone();
            let root_name = self.root_name.clone();
            self.open_folder(root_path, root_name.clone(), 0).await;
            return Some(WalkEntry::Folder {
                relative_path: root_name,
            });
        }

        loop {
            let frame = self.stack.last_mut()?;
            let Some(item) = frame.children.pop_front() else {
                self.stack.pop();
                continue;
            };

            let relative_path = format!("{}/{}", frame.relative_path, item.name());
            match item {
                RemoteItem::File { size, download, .. } => {
                    return Some(WalkEntry::File {
                        relative_path,
                        size,
                        handle: download,
                    });
                }
                RemoteItem::Folder { name, .. } => {
                    let remote_path = join_remote_path(&frame.remote_path, &name);
                    let depth = frame.depth + 1;
                    if depth > self.max_depth {
                        warn!(path = %remote_path, max_depth = self.max_depth, "Folder too deep, skipping contents");
                        self.warnings.push(WalkWarning {
                            path: remote_path,
                            message: format!("deeper than {} levels, contents skipped", self.max_depth),
                        });
                    } else {
                        self.open_folder(remote_path, relative_path.clone(), depth)
                            .await;
                    }
                    return Some(WalkEntry::Folder { relative_path });
                }
            }
        }
    }

    /// Stream one file's content through this walk's credentials
    pub async fn download(&self, handle: &DownloadHandle, sink: &mut dyn ByteSink) -> Result<u64> {
        self.drive.download(&self.token, handle, sink).await
    }

    /// Drain the walk into a list
    pub async fn collect(mut self) -> (Vec<WalkEntry>, Vec<WalkWarning>) {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await {
            entries.push(entry);
        }
        (entries, self.warnings)
    }

    async fn open_folder(&mut self, remote_path: String, relative_path: String, depth: usize) {
        let children = match self
            .drive
            .list_children(&self.token, &self.principal, &remote_path)
            .await
        {
            Ok(items) => {
                debug!(path = %remote_path, count = items.len(), "Listed folder");
                items.into()
            }
            Err(e) => {
                warn!(path = %remote_path, error = %e, "Failed to list folder, skipping subtree");
                self.warnings.push(WalkWarning {
                    path: remote_path.clone(),
                    message: e.to_string(),
                });
                VecDeque::new()
            }
        };

        self.stack.push(Frame {
            remote_path,
            relative_path,
            depth,
            children,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryPathDrive;

    fn paths(entries: &[WalkEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.relative_path()).collect()
    }

    fn token() -> AccessToken {
        AccessToken::new("test-token")
    }

    #[tokio::test]
    async fn test_walk_yields_depth_first_document_order() {
        let drive = MemoryPathDrive::new()
            .with_file("/Docs/a.txt", b"aaa".to_vec())
            .with_file("/Docs/Reports/q1.pdf", vec![1; 10])
            .with_file("/Docs/Reports/q2.pdf", vec![2; 20])
            .with_file("/Docs/z.txt", b"z".to_vec());
        let walker = RemoteTreeWalker::new(Arc::new(drive));

        let walk = walker.walk(&token(), &PrincipalId::new("user-1"), "/Docs");
        let (entries, warnings) = walk.collect().await;

        assert!(warnings.is_empty());
        assert_eq!(
            paths(&entries),
            vec![
                "Docs",
                "Docs/Reports",
                "Docs/Reports/q1.pdf",
                "Docs/Reports/q2.pdf",
                "Docs/a.txt",
                "Docs/z.txt",
            ]
        );
        match &entries[2] {
            WalkEntry::File { size, .. } => assert_eq!(*size, 10),
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_listing_failure_skips_subtree_only() {
        let drive = MemoryPathDrive::new()
            .with_file("/Root/Good/one.txt", b"1".to_vec())
            .with_file("/Root/Bad/secret.txt", b"2".to_vec())
            .with_file("/Root/Other/two.txt", b"3".to_vec())
            .fail_listing("/Root/Bad");
        let walker = RemoteTreeWalker::new(Arc::new(drive));

        let (entries, warnings) = walker
            .walk(&token(), &PrincipalId::new("user-1"), "/Root")
            .collect()
            .await;

        let found = paths(&entries);
        assert!(found.contains(&"Root/Good/one.txt"));
        assert!(found.contains(&"Root/Other/two.txt"));
        assert!(found.contains(&"Root/Bad"));
        assert!(!found.contains(&"Root/Bad/secret.txt"));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "/Root/Bad");
    }

    #[tokio::test]
    async fn test_empty_root_still_yields_folder() {
        let drive = MemoryPathDrive::new().with_folder("/Empty");
        let walker = RemoteTreeWalker::new(Arc::new(drive));

        let (entries, warnings) = walker
            .walk(&token(), &PrincipalId::new("user-1"), "/Empty")
            .collect()
            .await;

        assert_eq!(paths(&entries), vec!["Empty"]);
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn test_max_depth_bounds_recursion() {
        let drive = MemoryPathDrive::new().with_file("/A/B/C/D/deep.txt", b"x".to_vec());
        let walker = RemoteTreeWalker::new(Arc::new(drive)).with_max_depth(2);

        let (entries, warnings) = walker
            .walk(&token(), &PrincipalId::new("user-1"), "/A")
            .collect()
            .await;

        assert_eq!(paths(&entries), vec!["A", "A/B", "A/B/C", "A/B/C/D"]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "/A/B/C/D");
    }

    #[tokio::test]
    async fn test_walk_is_lazy() {
        let drive = Arc::new(MemoryPathDrive::new().with_file("/Docs/a.txt", b"a".to_vec()));
        let walker = RemoteTreeWalker::new(drive.clone());

        let mut walk = walker.walk(&token(), &PrincipalId::new("user-1"), "/Docs");
        assert_eq!(drive.calls(), 0);
        walk.next().await;
        assert_eq!(drive.calls(), 1);
    }
}
