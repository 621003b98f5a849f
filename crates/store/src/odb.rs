/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The object database: immutable, content-addressed blobs, trees and
//! commits. Objects are hashed over a `<kind> <len>\0<payload>` frame with
//! SHA-256 and stored either in memory or as loose files fanned out under
//! `objects/ab/cdef...`.

use std::collections::HashMap;
use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::RwLock;

use sha2::{Digest, Sha256};

use crate::{Result, StoreError};

pub const ID_LEN: usize = 32;

/// SHA-256 identity of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; ID_LEN]);

impl ObjectId {
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        use std::fmt::Write as _;
        let mut hex = String::with_capacity(ID_LEN * 2);
        for byte in self.0 {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != ID_LEN * 2 {
            return None;
        }
        let mut id = [0u8; ID_LEN];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            id[i] = ((hi << 4) | lo) as u8;
        }
        Some(ObjectId(id))
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ObjectId::from_hex(s).ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Blob,
    Tree,
    Commit,
}

impl Kind {
    fn as_str(&self) -> &'static str {
        match self {
            Kind::Blob => "blob",
            Kind::Tree => "tree",
            Kind::Commit => "commit",
        }
    }

    fn parse(name: &[u8]) -> Option<Kind> {
        match name {
            b"blob" => Some(Kind::Blob),
            b"tree" => Some(Kind::Tree),
            b"commit" => Some(Kind::Commit),
            _ => None,
        }
    }
}

/// One entry of a tree: a member name bound to a blob id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub id: ObjectId,
}

/// The member set of a collection at one point in time. Entries are kept
/// sorted by name so equal member sets hash identically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new() -> Self {
        Tree::default()
    }

    pub fn get(&self, name: &str) -> Option<&ObjectId> {
        self.entries
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.entries[i].id)
    }

    pub fn insert(&mut self, name: String, id: ObjectId) {
        match self
            .entries
            .binary_search_by(|entry| entry.name.cmp(&name))
        {
            Ok(i) => self.entries[i].id = id,
            Err(i) => self.entries.insert(i, TreeEntry { name, id }),
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match self
            .entries
            .binary_search_by(|entry| entry.name.as_str().cmp(name))
        {
            Ok(i) => {
                self.entries.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TreeEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 80);
        for entry in &self.entries {
            out.extend_from_slice(entry.id.to_hex().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(b'\n');
        }
        out
    }

    fn decode(payload: &[u8]) -> Result<Tree> {
        let mut tree = Tree::new();
        for line in payload.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let text = std::str::from_utf8(line)
                .map_err(|_| StoreError::Corrupt("tree entry not utf-8".to_string()))?;
            let (hex, name) = text
                .split_once(' ')
                .ok_or_else(|| StoreError::Corrupt("malformed tree entry".to_string()))?;
            let id = ObjectId::from_hex(hex)
                .ok_or_else(|| StoreError::Corrupt("malformed tree id".to_string()))?;
            tree.entries.push(TreeEntry {
                name: name.to_string(),
                id,
            });
        }
        tree.entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tree)
    }
}

/// One step of a collection's linear history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parent: Option<ObjectId>,
    pub author: String,
    pub message: String,
    pub timestamp: i64,
}

impl Commit {
    fn encode(&self) -> Vec<u8> {
        let mut out = String::with_capacity(128);
        out.push_str("tree ");
        out.push_str(&self.tree.to_hex());
        out.push('\n');
        if let Some(parent) = &self.parent {
            out.push_str("parent ");
            out.push_str(&parent.to_hex());
            out.push('\n');
        }
        out.push_str("author ");
        out.push_str(&self.author);
        out.push('\n');
        out.push_str("time ");
        out.push_str(&self.timestamp.to_string());
        out.push_str("\n\n");
        out.push_str(&self.message);
        out.into_bytes()
    }

    fn decode(payload: &[u8]) -> Result<Commit> {
        let text = std::str::from_utf8(payload)
            .map_err(|_| StoreError::Corrupt("commit not utf-8".to_string()))?;
        let (header, message) = text
            .split_once("\n\n")
            .ok_or_else(|| StoreError::Corrupt("commit missing body".to_string()))?;
        let mut tree = None;
        let mut parent = None;
        let mut author = String::new();
        let mut timestamp = 0;
        for line in header.lines() {
            if let Some(hex) = line.strip_prefix("tree ") {
                tree = ObjectId::from_hex(hex);
            } else if let Some(hex) = line.strip_prefix("parent ") {
                parent = ObjectId::from_hex(hex);
            } else if let Some(value) = line.strip_prefix("author ") {
                author = value.to_string();
            } else if let Some(value) = line.strip_prefix("time ") {
                timestamp = value.parse().unwrap_or_default();
            }
        }
        Ok(Commit {
            tree: tree.ok_or_else(|| StoreError::Corrupt("commit missing tree".to_string()))?,
            parent,
            author,
            message: message.to_string(),
            timestamp,
        })
    }
}

enum Backing {
    Memory(RwLock<HashMap<ObjectId, Vec<u8>>>),
    Disk { root: PathBuf },
}

/// Write-and-intern object storage. Writing the same content twice yields
/// the same id and a single stored object.
pub struct ObjectDb {
    backing: Backing,
}

impl ObjectDb {
    pub fn memory() -> Self {
        ObjectDb {
            backing: Backing::Memory(RwLock::new(HashMap::new())),
        }
    }

    /// Opens (or initialises) a loose-object database under `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(ObjectDb {
            backing: Backing::Disk { root },
        })
    }

    fn hash(kind: Kind, payload: &[u8]) -> ObjectId {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        hasher.update(b" ");
        hasher.update(payload.len().to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(payload);
        ObjectId(hasher.finalize().into())
    }

    fn object_path(root: &Path, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        root.join(&hex[..2]).join(&hex[2..])
    }

    fn put(&self, kind: Kind, payload: &[u8]) -> Result<ObjectId> {
        let id = Self::hash(kind, payload);
        match &self.backing {
            Backing::Memory(objects) => {
                objects
                    .write()
                    .expect("object map poisoned")
                    .entry(id)
                    .or_insert_with(|| {
                        let mut framed =
                            Vec::with_capacity(kind.as_str().len() + payload.len() + 12);
                        frame_into(&mut framed, kind, payload);
                        framed
                    });
            }
            Backing::Disk { root } => {
                let path = Self::object_path(root, &id);
                if !path.exists() {
                    std::fs::create_dir_all(path.parent().expect("object path has parent"))?;
                    // Tempfile plus rename keeps concurrent writers safe:
                    // both produce identical content for the same id.
                    let tmp = path.with_extension(format!("tmp{}", std::process::id()));
                    let mut file = std::fs::File::create(&tmp)?;
                    let mut framed = Vec::with_capacity(payload.len() + 16);
                    frame_into(&mut framed, kind, payload);
                    file.write_all(&framed)?;
                    file.sync_all()?;
                    std::fs::rename(&tmp, &path)?;
                }
            }
        }
        Ok(id)
    }

    fn get(&self, kind: Kind, id: &ObjectId) -> Result<Vec<u8>> {
        let framed = match &self.backing {
            Backing::Memory(objects) => objects
                .read()
                .expect("object map poisoned")
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::Corrupt(format!("missing object {id}")))?,
            Backing::Disk { root } => {
                let path = Self::object_path(root, id);
                match std::fs::read(&path) {
                    Ok(data) => data,
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        return Err(StoreError::Corrupt(format!("missing object {id}")));
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let header_end = framed
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| StoreError::Corrupt(format!("unframed object {id}")))?;
        let header = &framed[..header_end];
        let space = header
            .iter()
            .position(|b| *b == b' ')
            .ok_or_else(|| StoreError::Corrupt(format!("unframed object {id}")))?;
        let found = Kind::parse(&header[..space])
            .ok_or_else(|| StoreError::Corrupt(format!("unknown object kind for {id}")))?;
        if found != kind {
            return Err(StoreError::Corrupt(format!(
                "object {id} is a {}, expected {}",
                found.as_str(),
                kind.as_str()
            )));
        }
        Ok(framed[header_end + 1..].to_vec())
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        match &self.backing {
            Backing::Memory(objects) => {
                objects.read().expect("object map poisoned").contains_key(id)
            }
            Backing::Disk { root } => Self::object_path(root, id).exists(),
        }
    }

    pub fn put_blob(&self, bytes: &[u8]) -> Result<ObjectId> {
        self.put(Kind::Blob, bytes)
    }

    pub fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>> {
        self.get(Kind::Blob, id)
    }

    pub fn put_tree(&self, tree: &Tree) -> Result<ObjectId> {
        self.put(Kind::Tree, &tree.encode())
    }

    pub fn read_tree(&self, id: &ObjectId) -> Result<Tree> {
        Tree::decode(&self.get(Kind::Tree, id)?)
    }

    pub fn put_commit(&self, commit: &Commit) -> Result<ObjectId> {
        self.put(Kind::Commit, &commit.encode())
    }

    pub fn read_commit(&self, id: &ObjectId) -> Result<Commit> {
        Commit::decode(&self.get(Kind::Commit, id)?)
    }

    /// Walks the commit chain from `head` back to the root.
    pub fn log(&self, head: &ObjectId) -> Result<Vec<(ObjectId, Commit)>> {
        let mut out = Vec::new();
        let mut cursor = Some(*head);
        while let Some(id) = cursor {
            let commit = self.read_commit(&id)?;
            cursor = commit.parent;
            out.push((id, commit));
        }
        Ok(out)
    }
}

fn frame_into(out: &mut Vec<u8>, kind: Kind, payload: &[u8]) {
    out.extend_from_slice(kind.as_str().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b'\0');
    out.extend_from_slice(payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_ids_are_stable_and_deduplicated() {
        let db = ObjectDb::memory();
        let a = db.put_blob(b"BEGIN:VCALENDAR").unwrap();
        let b = db.put_blob(b"BEGIN:VCALENDAR").unwrap();
        assert_eq!(a, b);
        assert_eq!(db.read_blob(&a).unwrap(), b"BEGIN:VCALENDAR");

        let other = db.put_blob(b"BEGIN:VCARD").unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn tree_round_trip_is_order_independent() {
        let db = ObjectDb::memory();
        let blob = db.put_blob(b"x").unwrap();

        let mut one = Tree::new();
        one.insert("b.ics".to_string(), blob);
        one.insert("a.ics".to_string(), blob);

        let mut two = Tree::new();
        two.insert("a.ics".to_string(), blob);
        two.insert("b.ics".to_string(), blob);

        let one_id = db.put_tree(&one).unwrap();
        let two_id = db.put_tree(&two).unwrap();
        assert_eq!(one_id, two_id);

        let read = db.read_tree(&one_id).unwrap();
        assert_eq!(
            read.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(),
            vec!["a.ics", "b.ics"]
        );
    }

    #[test]
    fn commit_log_walks_parents() {
        let db = ObjectDb::memory();
        let tree = db.put_tree(&Tree::new()).unwrap();
        let first = db
            .put_commit(&Commit {
                tree,
                parent: None,
                author: "vestry".to_string(),
                message: "Add a.ics".to_string(),
                timestamp: 1,
            })
            .unwrap();
        let second = db
            .put_commit(&Commit {
                tree,
                parent: Some(first),
                author: "vestry".to_string(),
                message: "Delete a.ics".to_string(),
                timestamp: 2,
            })
            .unwrap();

        let log = db.log(&second).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, second);
        assert_eq!(log[1].0, first);
        assert_eq!(log[1].1.message, "Add a.ics");
    }

    #[test]
    fn disk_backing_persists_objects() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let db = ObjectDb::open(dir.path().join("objects")).unwrap();
            db.put_blob(b"persisted").unwrap()
        };
        let db = ObjectDb::open(dir.path().join("objects")).unwrap();
        assert!(db.contains(&id));
        assert_eq!(db.read_blob(&id).unwrap(), b"persisted");
    }

    #[test]
    fn kind_confusion_is_detected() {
        let db = ObjectDb::memory();
        let id = db.put_blob(b"data").unwrap();
        assert!(matches!(db.read_tree(&id), Err(StoreError::Corrupt(_))));
    }
}
