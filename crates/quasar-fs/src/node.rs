//! The in-memory index tree.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Bytes read when a file's name says nothing about its type
const SNIFF_BYTES: u64 = 512;

const IMAGE_MAGIC: &[&[u8]] = &[
    b"\x89PNG\r\n\x1a\n",
    b"\xff\xd8\xff",
    b"GIF87a",
    b"GIF89a",
];

/// Coarse content class of an indexed entry, used to pick a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Unknown,
    Text,
    Image,
}

impl NodeKind {
    /// Classify a path by its content type.
    ///
    /// The type is guessed from the extension; files whose name gives no
    /// guess have their first bytes inspected instead.
    pub fn from_path(path: &Path) -> Self {
        match mime_guess::from_path(path).first() {
            Some(mime) if mime.type_() == mime_guess::mime::IMAGE => NodeKind::Image,
            Some(mime) if mime.type_() == mime_guess::mime::TEXT => NodeKind::Text,
            Some(_) => NodeKind::Unknown,
            None => Self::sniff(path),
        }
    }

    /// Classify by leading bytes: known image signatures, otherwise UTF-8
    /// without NUL bytes counts as text.
    fn sniff(path: &Path) -> Self {
        let mut head = Vec::new();
        let read = File::open(path).and_then(|f| f.take(SNIFF_BYTES).read_to_end(&mut head));
        if read.is_err() || head.is_empty() {
            return NodeKind::Unknown;
        }

        if IMAGE_MAGIC.iter().any(|magic| head.starts_with(magic)) {
            return NodeKind::Image;
        }

        // The cut may split a multi-byte character
        let valid = match std::str::from_utf8(&head) {
            Ok(_) => true,
            Err(e) => e.error_len().is_none(),
        };
        if valid && !head.contains(&0) {
            NodeKind::Text
        } else {
            NodeKind::Unknown
        }
    }
}

/// A matching file, as carried in a result item's payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHit {
    pub path: PathBuf,
    pub kind: NodeKind,
}

impl FileHit {
    /// Base name of the file.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// One entry in the tree. Directories have `children`, files do not.
#[derive(Debug, Clone)]
pub struct IndexNode {
    pub name: String,
    name_lower: String,
    pub kind: NodeKind,
    pub children: Option<Vec<IndexNode>>,
}

impl IndexNode {
    pub fn file(name: impl Into<String>, kind: NodeKind) -> Self {
        let name = name.into();
        IndexNode {
            name_lower: name.to_lowercase(),
            name,
            kind,
            children: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        let name = name.into();
        IndexNode {
            name_lower: name.to_lowercase(),
            name,
            kind: NodeKind::Unknown,
            children: Some(Vec::new()),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.children.is_some()
    }

    /// Case-insensitive base-name match. `needle` must already be lowercase.
    /// Directories never match.
    pub fn matches(&self, needle: &str) -> bool {
        !self.is_dir() && self.name_lower.contains(needle)
    }

    /// Follow a path of child positions down from this node.
    pub fn descend_mut(&mut self, positions: &[usize]) -> Option<&mut IndexNode> {
        let mut node = self;
        for &position in positions {
            node = node.children.as_mut()?.get_mut(position)?;
        }
        Some(node)
    }

    /// Collect every matching file below this node, depth-first in tree order.
    ///
    /// `base` is the path of this node itself.
    pub fn collect_matches(&self, base: &Path, needle: &str, out: &mut Vec<FileHit>) {
        let Some(children) = &self.children else {
            return;
        };
        for child in children {
            let path = base.join(&child.name);
            if child.is_dir() {
                child.collect_matches(&path, needle, out);
            } else if child.matches(needle) {
                out.push(FileHit {
                    path,
                    kind: child.kind,
                });
            }
        }
    }

    /// Number of files (not directories) below this node.
    pub fn file_count(&self) -> usize {
        self.children.as_ref().map_or(0, |children| {
            children
                .iter()
                .map(|c| if c.is_dir() { c.file_count() } else { 1 })
                .sum()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexNode {
        let mut root = IndexNode::directory("home");
        let docs = {
            let mut docs = IndexNode::directory("Notes");
            docs.children
                .as_mut()
                .unwrap()
                .push(IndexNode::file("Todo.TXT", NodeKind::Text));
            docs
        };
        let children = root.children.as_mut().unwrap();
        children.push(docs);
        children.push(IndexNode::file("photo.png", NodeKind::Image));
        children.push(IndexNode::directory("todo-archive"));
        root
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(NodeKind::from_path(Path::new("a/b.png")), NodeKind::Image);
        assert_eq!(NodeKind::from_path(Path::new("README.md")), NodeKind::Text);
        assert_eq!(NodeKind::from_path(Path::new("notes.txt")), NodeKind::Text);
        assert_eq!(NodeKind::from_path(Path::new("tool.exe")), NodeKind::Unknown);
        assert_eq!(NodeKind::from_path(Path::new("Makefile")), NodeKind::Unknown);
    }

    #[test]
    fn test_kind_from_content_without_extension() {
        fn write(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, bytes).unwrap();
            path
        }

        let dir = tempfile::TempDir::new().unwrap();
        let makefile = write(dir.path(), "Makefile", b"all:\n\tcargo build\n");
        let snapshot = write(dir.path(), "screen", b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR");
        let blob = write(dir.path(), "blob", b"ELF\0\x01\x02");
        let empty = write(dir.path(), "empty", b"");

        assert_eq!(NodeKind::from_path(&makefile), NodeKind::Text);
        assert_eq!(NodeKind::from_path(&snapshot), NodeKind::Image);
        assert_eq!(NodeKind::from_path(&blob), NodeKind::Unknown);
        assert_eq!(NodeKind::from_path(&empty), NodeKind::Unknown);
        // Extension wins over content
        assert_eq!(NodeKind::from_path(&write(dir.path(), "data.bin", b"plain")), NodeKind::Unknown);
    }

    #[test]
    fn test_matches_files_only() {
        let root = sample();
        let mut hits = Vec::new();
        root.collect_matches(Path::new("/home"), "todo", &mut hits);

        assert_eq!(
            hits,
            vec![FileHit {
                path: PathBuf::from("/home/Notes/Todo.TXT"),
                kind: NodeKind::Text,
            }]
        );
        assert_eq!(hits[0].name(), "Todo.TXT");
    }

    #[test]
    fn test_descend_and_count() {
        let mut root = sample();
        assert_eq!(root.file_count(), 2);

        let notes = root.descend_mut(&[0]).unwrap();
        assert_eq!(notes.name, "Notes");
        assert!(root.descend_mut(&[1, 0]).is_none());
        assert!(root.descend_mut(&[9]).is_none());
    }
}
