use indexmap::IndexMap;
use log::debug;
use std::collections::HashMap;

use super::constants::*;
use super::error::{FsError, FsResult};
use super::escape;

/// One path segment position in the virtual hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
    /// Inode number, never reused
    pub ino: u64,
    /// Segment exactly as the client spelled it (`None` for the root)
    pub raw_name: Option<Vec<u8>>,
    /// Escape-decoded form of `raw_name` (`None` for the root)
    pub decoded_name: Option<Vec<u8>>,
    /// Inode of the containing node; the root points at itself
    pub parent: u64,
    /// Whether this is the reserved entry that runs the command
    pub is_terminal: bool,
    children: IndexMap<Vec<u8>, u64>,
}

impl Node {
    fn root() -> Self {
        Self {
            ino: ROOT_INODE,
            raw_name: None,
            decoded_name: None,
            parent: ROOT_INODE,
            is_terminal: false,
            children: IndexMap::new(),
        }
    }

    /// Returns true only for the sentinel root node.
    pub fn is_root(&self) -> bool {
        self.ino == ROOT_INODE
    }

    /// Inode of the child named `raw_name`, if it was ever looked up.
    pub fn child(&self, raw_name: &[u8]) -> Option<u64> {
        self.children.get(raw_name).copied()
    }
}

/// Lazily built tree of command segments.
///
/// Nodes live in an arena keyed by inode and are created on first lookup.
/// A node is identified by `(parent, raw_name)`, so repeated lookups of the
/// same name always return the same inode. Nodes are never removed.
#[derive(Debug)]
pub struct Namespace {
    nodes: HashMap<u64, Node>,
    next_inode: u64,
    terminal_name: Vec<u8>,
    separator: Vec<u8>,
}

impl Namespace {
    /// Creates a namespace holding only the root.
    ///
    /// # Arguments
    ///
    /// * `terminal_name` - Raw name of the entry that runs the command
    /// * `separator` - Text inserted between decoded segments
    pub fn new(terminal_name: impl Into<Vec<u8>>, separator: impl Into<Vec<u8>>) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_INODE, Node::root());
        Self {
            nodes,
            next_inode: INITIAL_INODE,
            terminal_name: terminal_name.into(),
            separator: separator.into(),
        }
    }

    /// Raw name of the terminal entry.
    pub fn terminal_name(&self) -> &[u8] {
        &self.terminal_name
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A namespace always contains its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node by inode.
    pub fn resolve(&self, ino: u64) -> FsResult<&Node> {
        self.nodes.get(&ino).ok_or(FsError::UnknownNode(ino))
    }

    /// Returns the child of `parent` named `raw_name`, creating it first if
    /// needed.
    ///
    /// The name is validated and decoded before anything is inserted, so a
    /// failed call leaves the tree untouched.
    pub fn get_or_create_child(&mut self, parent: u64, raw_name: &[u8]) -> FsResult<&Node> {
        if let Some(ino) = self.resolve(parent)?.child(raw_name) {
            return self.resolve(ino);
        }

        if raw_name.is_empty() || raw_name.contains(&b'/') {
            return Err(FsError::InvalidSegment(
                String::from_utf8_lossy(raw_name).into_owned(),
            ));
        }
        let decoded = escape::decode(raw_name)?;

        let ino = self.next_inode;
        self.next_inode += 1;
        let node = Node {
            ino,
            raw_name: Some(raw_name.to_vec()),
            decoded_name: Some(decoded),
            parent,
            is_terminal: raw_name == self.terminal_name.as_slice(),
            children: IndexMap::new(),
        };
        debug!(
            "new node {} under {}: {:?}",
            ino,
            parent,
            String::from_utf8_lossy(raw_name)
        );

        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.insert(raw_name.to_vec(), ino);
        }
        self.nodes.insert(ino, node);
        self.resolve(ino)
    }

    /// Resolves a directory entry name, treating `.` and `..` as references
    /// to existing nodes rather than new segments.
    pub fn lookup(&mut self, parent: u64, raw_name: &[u8]) -> FsResult<&Node> {
        match raw_name {
            b"." => self.resolve(parent),
            b".." => {
                let up = self.resolve(parent)?.parent;
                self.resolve(up)
            }
            _ => self.get_or_create_child(parent, raw_name),
        }
    }

    /// Builds the command text for a node.
    ///
    /// Decoded names of every non-root, non-terminal node from the root down
    /// to `ino` are joined with the separator. A terminal entry directly
    /// below the root yields an empty command.
    pub fn reconstruct_command(&self, ino: u64) -> FsResult<Vec<u8>> {
        let mut segments = Vec::new();
        let mut node = self.resolve(ino)?;
        while !node.is_root() {
            if !node.is_terminal {
                if let Some(decoded) = &node.decoded_name {
                    segments.push(decoded.as_slice());
                }
            }
            node = self.resolve(node.parent)?;
        }
        segments.reverse();
        Ok(segments.join(self.separator.as_slice()))
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new(DEFAULT_TERMINAL_NAME, DEFAULT_SEPARATOR)
    }
}
