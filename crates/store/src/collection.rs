/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! A collection presented over the object database: named resources with
//! strong ETags, a ctag that is the current tree id, sync tokens naming
//! commits, and the UID-uniqueness invariant enforced on every write.
//!
//! On disk a collection is a directory whose control data lives under
//! `.vestry/` (objects, HEAD, config). Subdirectories of the collection
//! directory are unrelated child collections and never appear as members.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::AHashMap;

use crate::{
    Result, StoreError,
    config::CollectionConfig,
    media::{self, MediaKind},
    odb::{Commit, ObjectDb, ObjectId, Tree},
};

const CONTROL_DIR: &str = ".vestry";

/// Conditions a mutating operation must see before committing. They are
/// re-checked under the collection write lock, so a passing write is
/// atomic with respect to its precondition.
#[derive(Debug, Default, Clone)]
pub struct Preconditions {
    /// `If-Match: "<etag>"`: the member must exist with exactly this tag.
    pub if_match: Option<String>,
    /// `If-Match: *`: the member must exist.
    pub must_exist: bool,
    /// `If-None-Match: *`: the member must not exist.
    pub must_not_exist: bool,
}

impl Preconditions {
    pub fn none() -> Self {
        Preconditions::default()
    }

    pub fn if_match(etag: impl Into<String>) -> Self {
        Preconditions {
            if_match: Some(etag.into()),
            ..Preconditions::default()
        }
    }

    pub fn create_only() -> Self {
        Preconditions {
            must_not_exist: true,
            ..Preconditions::default()
        }
    }

    fn check(&self, name: &str, current: Option<&ObjectId>) -> Result<()> {
        let failed = match (&self.if_match, current) {
            (Some(expected), Some(current)) => current.to_hex() != *expected,
            (Some(_), None) => true,
            (None, _) => false,
        } || (self.must_exist && current.is_none())
            || (self.must_not_exist && current.is_some());
        if failed {
            Err(StoreError::PreconditionFailed {
                name: name.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// A stored member with its identity.
#[derive(Debug, Clone)]
pub struct Item {
    pub name: String,
    pub bytes: Vec<u8>,
    pub etag: String,
    pub content_type: &'static str,
    /// Commit timestamps derived from history, when known.
    pub created: Option<i64>,
    pub modified: Option<i64>,
}

/// One difference between two historical states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub name: String,
    pub old_etag: Option<String>,
    pub new_etag: Option<String>,
}

impl Change {
    pub fn is_deletion(&self) -> bool {
        self.new_etag.is_none()
    }
}

enum Persistence {
    Memory {
        head: RwLock<Option<ObjectId>>,
        config: RwLock<CollectionConfig>,
    },
    Disk {
        control: PathBuf,
        dir: PathBuf,
    },
}

pub struct CollectionStore {
    odb: ObjectDb,
    persistence: Persistence,
    write_lock: Mutex<()>,
    /// name -> (etag, uid) for members already scanned; entries whose etag
    /// still matches are not re-parsed.
    uid_cache: Mutex<AHashMap<String, (String, Option<String>)>>,
    read_only: bool,
}

impl CollectionStore {
    pub fn memory() -> Self {
        CollectionStore {
            odb: ObjectDb::memory(),
            persistence: Persistence::Memory {
                head: RwLock::new(None),
                config: RwLock::new(CollectionConfig::default()),
            },
            write_lock: Mutex::new(()),
            uid_cache: Mutex::new(AHashMap::new()),
            read_only: false,
        }
    }

    /// Initialises a new collection at `dir`, which may already exist as a
    /// plain directory but must not already be a collection.
    pub fn create(dir: impl AsRef<Path>, config: CollectionConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let control = dir.join(CONTROL_DIR);
        if control.exists() {
            return Err(StoreError::AlreadyExists(dir.to_path_buf()));
        }
        std::fs::create_dir_all(&control)?;
        let store = CollectionStore {
            odb: ObjectDb::open(control.join("objects"))?,
            persistence: Persistence::Disk {
                control,
                dir: dir.to_path_buf(),
            },
            write_lock: Mutex::new(()),
            uid_cache: Mutex::new(AHashMap::new()),
            read_only: false,
        };
        store.set_config(config)?;
        Ok(store)
    }

    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let control = dir.join(CONTROL_DIR);
        if !control.is_dir() {
            return Err(StoreError::NotStore(dir.to_path_buf()));
        }
        Ok(CollectionStore {
            odb: ObjectDb::open(control.join("objects"))?,
            persistence: Persistence::Disk {
                control,
                dir: dir.to_path_buf(),
            },
            write_lock: Mutex::new(()),
            uid_cache: Mutex::new(AHashMap::new()),
            read_only: false,
        })
    }

    pub fn is_store(dir: impl AsRef<Path>) -> bool {
        dir.as_ref().join(CONTROL_DIR).is_dir()
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Removes the collection and everything beneath it.
    pub fn destroy(self) -> Result<()> {
        if let Persistence::Disk { dir, .. } = &self.persistence {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn config(&self) -> Result<CollectionConfig> {
        match &self.persistence {
            Persistence::Memory { config, .. } => {
                Ok(config.read().expect("config poisoned").clone())
            }
            Persistence::Disk { control, .. } => {
                match std::fs::read_to_string(control.join("config")) {
                    Ok(text) => Ok(CollectionConfig::parse(&text)),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        Ok(CollectionConfig::default())
                    }
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    pub fn set_config(&self, new: CollectionConfig) -> Result<()> {
        match &self.persistence {
            Persistence::Memory { config, .. } => {
                *config.write().expect("config poisoned") = new;
                Ok(())
            }
            Persistence::Disk { control, .. } => {
                write_atomically(&control.join("config"), new.serialize().as_bytes())
            }
        }
    }

    fn head(&self) -> Result<Option<ObjectId>> {
        match &self.persistence {
            Persistence::Memory { head, .. } => Ok(*head.read().expect("head poisoned")),
            Persistence::Disk { control, .. } => {
                match std::fs::read_to_string(control.join("HEAD")) {
                    Ok(text) => Ok(ObjectId::from_hex(text.trim())),
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(err) => Err(err.into()),
                }
            }
        }
    }

    fn set_head(&self, id: ObjectId) -> Result<()> {
        match &self.persistence {
            Persistence::Memory { head, .. } => {
                *head.write().expect("head poisoned") = Some(id);
                Ok(())
            }
            Persistence::Disk { control, .. } => {
                write_atomically(&control.join("HEAD"), id.to_hex().as_bytes())
            }
        }
    }

    /// Snapshot of the current member tree. Readers work off this without
    /// taking the write lock.
    fn current_tree(&self) -> Result<Tree> {
        match self.head()? {
            Some(head) => {
                let commit = self.odb.read_commit(&head)?;
                self.odb.read_tree(&commit.tree)
            }
            None => Ok(Tree::new()),
        }
    }

    /// The collection tag: identity of the current content tree.
    pub fn ctag(&self) -> Result<String> {
        let tree = self.current_tree()?;
        Ok(self.odb.put_tree(&tree)?.to_hex())
    }

    /// Identity of the most recent commit, if any write ever happened.
    pub fn sync_commit(&self) -> Result<Option<ObjectId>> {
        self.head()
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.current_tree()?.iter().filter(|e| is_member(&e.name)).count())
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|len| len == 0)
    }

    /// Member names and ETags. Control entries (dotfiles) stay hidden.
    pub fn list(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .current_tree()?
            .iter()
            .filter(|entry| is_member(&entry.name))
            .map(|entry| (entry.name.clone(), entry.id.to_hex()))
            .collect())
    }

    pub fn etag(&self, name: &str) -> Result<Option<String>> {
        if !is_member(name) {
            return Ok(None);
        }
        Ok(self.current_tree()?.get(name).map(ObjectId::to_hex))
    }

    pub fn get(&self, name: &str) -> Result<Item> {
        if !is_member(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let head = self.head()?;
        let tree = self.current_tree()?;
        let id = *tree
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let bytes = self.odb.read_blob(&id)?;
        let (created, modified) = match head {
            Some(head) => self.member_times(&head, name, &id)?,
            None => (None, None),
        };
        Ok(Item {
            name: name.to_string(),
            bytes,
            etag: id.to_hex(),
            content_type: MediaKind::from_name(name).content_type(),
            created,
            modified,
        })
    }

    /// Creation and last-modification times for a member, read off the
    /// commit history: the member was last modified by the oldest commit of
    /// the newest streak carrying its current content, and created by the
    /// oldest commit in which it exists contiguously.
    fn member_times(
        &self,
        head: &ObjectId,
        name: &str,
        current: &ObjectId,
    ) -> Result<(Option<i64>, Option<i64>)> {
        let mut created = None;
        let mut modified = None;
        let mut content_unchanged = true;
        for (_, commit) in self.odb.log(head)? {
            let tree = self.odb.read_tree(&commit.tree)?;
            match tree.get(name) {
                Some(id) => {
                    if content_unchanged {
                        if id == current {
                            modified = Some(commit.timestamp);
                        } else {
                            content_unchanged = false;
                        }
                    }
                    created = Some(commit.timestamp);
                }
                None => break,
            }
        }
        Ok((created, modified))
    }

    /// Atomically writes a member: validates, checks preconditions and the
    /// UID invariant, then commits. Exactly one commit per call, and no
    /// commit at all when the resulting tree is unchanged.
    pub fn put(
        &self,
        name: &str,
        bytes: &[u8],
        preconditions: &Preconditions,
        author: &str,
    ) -> Result<(String, String)> {
        if self.read_only {
            return Err(StoreError::Forbidden);
        }
        if !is_member(name) {
            return Err(StoreError::Invalid(format!("invalid member name {name}")));
        }
        let uid = media::validate(name, bytes)?;

        let _guard = self.write_lock.lock().expect("write lock poisoned");
        let head = self.head()?;
        let mut tree = self.current_tree()?;
        let current = tree.get(name).copied();
        preconditions.check(name, current.as_ref())?;

        if let Some(uid) = &uid {
            self.assert_unique_uid(&tree, name, uid)?;
        }

        let blob = self.odb.put_blob(bytes)?;
        if current == Some(blob) {
            // Same content under the same name; the tree is already what
            // it would become.
            return Ok((blob.to_hex(), self.odb.put_tree(&tree)?.to_hex()));
        }

        let message = if current.is_some() {
            format!("Update {name}")
        } else {
            format!("Add {name}")
        };
        tree.insert(name.to_string(), blob);
        let ctag = self.commit_tree(head, tree, &message, author)?;

        self.uid_cache
            .lock()
            .expect("uid cache poisoned")
            .insert(name.to_string(), (blob.to_hex(), uid));
        Ok((blob.to_hex(), ctag))
    }

    pub fn delete(
        &self,
        name: &str,
        preconditions: &Preconditions,
        author: &str,
    ) -> Result<String> {
        if self.read_only {
            return Err(StoreError::Forbidden);
        }
        let _guard = self.write_lock.lock().expect("write lock poisoned");
        let head = self.head()?;
        let mut tree = self.current_tree()?;
        let current = tree.get(name).copied();
        if current.is_none() || !is_member(name) {
            return Err(StoreError::NotFound(name.to_string()));
        }
        preconditions.check(name, current.as_ref())?;

        tree.remove(name);
        let ctag = self.commit_tree(head, tree, &format!("Delete {name}"), author)?;
        self.uid_cache
            .lock()
            .expect("uid cache poisoned")
            .remove(name);
        Ok(ctag)
    }

    fn commit_tree(
        &self,
        parent: Option<ObjectId>,
        tree: Tree,
        message: &str,
        author: &str,
    ) -> Result<String> {
        let tree_id = self.odb.put_tree(&tree)?;
        let commit = self.odb.put_commit(&Commit {
            tree: tree_id,
            parent,
            author: author.to_string(),
            message: message.to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default(),
        })?;
        self.set_head(commit)?;
        Ok(tree_id.to_hex())
    }

    /// Refreshes the UID map for the given tree and rejects a UID that is
    /// already bound to a different member name.
    fn assert_unique_uid(&self, tree: &Tree, name: &str, uid: &str) -> Result<()> {
        let mut cache = self.uid_cache.lock().expect("uid cache poisoned");
        let mut seen = ahash::AHashSet::with_capacity(tree.len());
        for entry in tree.iter() {
            if !is_member(&entry.name) || MediaKind::from_name(&entry.name) == MediaKind::Other {
                continue;
            }
            let etag = entry.id.to_hex();
            let known = cache
                .get(&entry.name)
                .filter(|(cached_etag, _)| *cached_etag == etag)
                .map(|(_, uid)| uid.clone());
            let member_uid = match known {
                Some(uid) => uid,
                None => {
                    let uid = self
                        .odb
                        .read_blob(&entry.id)
                        .ok()
                        .and_then(|bytes| match media::validate(&entry.name, &bytes) {
                            Ok(uid) => uid,
                            Err(err) => {
                                tracing::warn!(name = %entry.name, %err, "unparseable member during uid scan");
                                None
                            }
                        });
                    cache.insert(entry.name.clone(), (etag, uid.clone()));
                    uid
                }
            };
            seen.insert(entry.name.clone());
            if member_uid.as_deref() == Some(uid) && entry.name != name {
                return Err(StoreError::DuplicateUid {
                    uid: uid.to_string(),
                    existing: entry.name.clone(),
                });
            }
        }
        cache.retain(|name, _| seen.contains(name));
        Ok(())
    }

    /// Differences between two commits, oldest state first. `old` of
    /// `None` reports every current member as added. A commit that cannot
    /// be resolved any more yields [`StoreError::TokenStale`].
    pub fn changes_between(
        &self,
        old: Option<&ObjectId>,
        new: &ObjectId,
    ) -> Result<Vec<Change>> {
        let new_tree = self
            .read_commit_tree(new)
            .map_err(|_| StoreError::TokenStale)?;
        let old_tree = match old {
            Some(old) => self
                .read_commit_tree(old)
                .map_err(|_| StoreError::TokenStale)?,
            None => Tree::new(),
        };

        let mut changes = Vec::new();
        let mut removed: AHashMap<&str, &ObjectId> = old_tree
            .iter()
            .filter(|entry| is_member(&entry.name))
            .map(|entry| (entry.name.as_str(), &entry.id))
            .collect();
        for entry in new_tree.iter().filter(|entry| is_member(&entry.name)) {
            match removed.remove(entry.name.as_str()) {
                Some(old_id) if *old_id == entry.id => {}
                old_id => changes.push(Change {
                    name: entry.name.clone(),
                    old_etag: old_id.map(ObjectId::to_hex),
                    new_etag: Some(entry.id.to_hex()),
                }),
            }
        }
        for (name, old_id) in removed {
            changes.push(Change {
                name: name.to_string(),
                old_etag: Some(old_id.to_hex()),
                new_etag: None,
            });
        }
        changes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(changes)
    }

    fn read_commit_tree(&self, commit: &ObjectId) -> Result<Tree> {
        let commit = self.odb.read_commit(commit)?;
        self.odb.read_tree(&commit.tree)
    }

    /// Reads a member as it was in a historical commit.
    pub fn get_at(&self, commit: &ObjectId, name: &str) -> Result<Item> {
        let tree = self.read_commit_tree(commit)?;
        let id = *tree
            .get(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(Item {
            name: name.to_string(),
            bytes: self.odb.read_blob(&id)?,
            etag: id.to_hex(),
            content_type: MediaKind::from_name(name).content_type(),
            created: None,
            modified: None,
        })
    }
}

fn is_member(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains('/')
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension(format!("tmp{}", std::process::id()));
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(uid: &str, dtstart: &str) -> String {
        format!(
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n\
             BEGIN:VEVENT\r\nUID:{uid}\r\nDTSTAMP:20240101T000000Z\r\n\
             DTSTART:{dtstart}\r\nSUMMARY:Event {uid}\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n"
        )
    }

    #[test]
    fn put_get_round_trip_preserves_bytes_and_etag() {
        let store = CollectionStore::memory();
        let body = event("evt-1", "20240115T120000Z");
        let (etag, _) = store
            .put("evt-1.ics", body.as_bytes(), &Preconditions::none(), "test")
            .unwrap();

        let item = store.get("evt-1.ics").unwrap();
        assert_eq!(item.bytes, body.as_bytes());
        assert_eq!(item.etag, etag);
        assert_eq!(item.content_type, "text/calendar; charset=utf-8");
        assert_eq!(store.etag("evt-1.ics").unwrap(), Some(etag));
    }

    #[test]
    fn precondition_failures_leave_state_unchanged() {
        let store = CollectionStore::memory();
        let body = event("evt-1", "20240115T120000Z");
        store
            .put("evt-1.ics", body.as_bytes(), &Preconditions::none(), "test")
            .unwrap();
        let ctag_before = store.ctag().unwrap();

        let err = store
            .put(
                "evt-1.ics",
                event("evt-1", "20240116T120000Z").as_bytes(),
                &Preconditions::if_match("not-the-etag"),
                "test",
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));
        assert_eq!(store.ctag().unwrap(), ctag_before);

        let err = store
            .put(
                "evt-1.ics",
                body.as_bytes(),
                &Preconditions::create_only(),
                "test",
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed { .. }));
    }

    #[test]
    fn duplicate_uid_under_other_name_is_rejected() {
        let store = CollectionStore::memory();
        store
            .put(
                "evt-1.ics",
                event("evt-1", "20240115T120000Z").as_bytes(),
                &Preconditions::none(),
                "test",
            )
            .unwrap();
        let ctag_before = store.ctag().unwrap();

        let err = store
            .put(
                "copy.ics",
                event("evt-1", "20240117T120000Z").as_bytes(),
                &Preconditions::none(),
                "test",
            )
            .unwrap_err();
        assert!(
            matches!(err, StoreError::DuplicateUid { ref existing, .. } if existing == "evt-1.ics")
        );
        assert_eq!(store.ctag().unwrap(), ctag_before);
        assert_eq!(store.list().unwrap().len(), 1);

        // Replacing the same name with the same UID stays allowed.
        store
            .put(
                "evt-1.ics",
                event("evt-1", "20240118T120000Z").as_bytes(),
                &Preconditions::none(),
                "test",
            )
            .unwrap();
    }

    #[test]
    fn ctag_changes_iff_content_changes() {
        let store = CollectionStore::memory();
        let empty = store.ctag().unwrap();
        let (_, after_put) = store
            .put(
                "evt-1.ics",
                event("evt-1", "20240115T120000Z").as_bytes(),
                &Preconditions::none(),
                "test",
            )
            .unwrap();
        assert_ne!(empty, after_put);

        // Identical bytes: no state change, identical ctag.
        let (_, after_noop) = store
            .put(
                "evt-1.ics",
                event("evt-1", "20240115T120000Z").as_bytes(),
                &Preconditions::none(),
                "test",
            )
            .unwrap();
        assert_eq!(after_put, after_noop);

        store
            .delete("evt-1.ics", &Preconditions::none(), "test")
            .unwrap();
        assert_eq!(store.ctag().unwrap(), empty);
    }

    #[test]
    fn changes_between_tokens_reproduce_the_delta() {
        let store = CollectionStore::memory();
        for (name, uid) in [("a.ics", "a"), ("b.ics", "b"), ("c.ics", "c")] {
            store
                .put(
                    name,
                    event(uid, "20240115T120000Z").as_bytes(),
                    &Preconditions::none(),
                    "test",
                )
                .unwrap();
        }
        let old = store.sync_commit().unwrap().unwrap();

        store
            .put(
                "d.ics",
                event("d", "20240116T120000Z").as_bytes(),
                &Preconditions::none(),
                "test",
            )
            .unwrap();
        store.delete("b.ics", &Preconditions::none(), "test").unwrap();
        let new = store.sync_commit().unwrap().unwrap();

        let initial = store.changes_between(None, &old).unwrap();
        assert_eq!(initial.len(), 3);
        assert!(initial.iter().all(|c| c.old_etag.is_none()));

        let delta = store.changes_between(Some(&old), &new).unwrap();
        assert_eq!(delta.len(), 2);
        assert_eq!(delta[0].name, "b.ics");
        assert!(delta[0].is_deletion());
        assert_eq!(delta[1].name, "d.ics");
        assert!(delta[1].new_etag.is_some());

        // Historical reads still see the deleted member at the old commit.
        let old_item = store.get_at(&old, "b.ics").unwrap();
        assert_eq!(old_item.etag, delta[0].old_etag.clone().unwrap());
        assert!(store.get_at(&new, "b.ics").is_err());
    }

    #[test]
    fn stale_token_is_signalled() {
        let store = CollectionStore::memory();
        store
            .put(
                "a.ics",
                event("a", "20240115T120000Z").as_bytes(),
                &Preconditions::none(),
                "test",
            )
            .unwrap();
        let head = store.sync_commit().unwrap().unwrap();
        let bogus = ObjectId::from_hex(&"ab".repeat(32)).unwrap();
        assert!(matches!(
            store.changes_between(Some(&bogus), &head),
            Err(StoreError::TokenStale)
        ));
    }

    #[test]
    fn read_only_collections_refuse_writes() {
        let mut store = CollectionStore::memory();
        store.set_read_only(true);
        assert!(matches!(
            store.put(
                "evt-1.ics",
                event("evt-1", "20240115T120000Z").as_bytes(),
                &Preconditions::none(),
                "test",
            ),
            Err(StoreError::Forbidden)
        ));
        assert!(matches!(
            store.delete("evt-1.ics", &Preconditions::none(), "test"),
            Err(StoreError::Forbidden)
        ));
    }

    #[test]
    fn control_entries_stay_hidden() {
        let store = CollectionStore::memory();
        assert!(matches!(
            store.get(".vestry"),
            Err(StoreError::NotFound(_))
        ));
        assert!(store
            .put(".hidden.ics", b"x", &Preconditions::none(), "test")
            .is_err());
    }

    #[test]
    fn disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calendar");
        let mut config = CollectionConfig::default();
        config.set_collection_type(crate::config::CollectionType::Calendar);

        let etag = {
            let store = CollectionStore::create(&path, config).unwrap();
            store
                .put(
                    "evt-1.ics",
                    event("evt-1", "20240115T120000Z").as_bytes(),
                    &Preconditions::none(),
                    "test",
                )
                .unwrap()
                .0
        };

        let store = CollectionStore::open(&path).unwrap();
        assert_eq!(store.get("evt-1.ics").unwrap().etag, etag);
        assert_eq!(
            store.config().unwrap().collection_type(),
            crate::config::CollectionType::Calendar
        );
        assert!(CollectionStore::is_store(&path));
        assert!(CollectionStore::open(dir.path()).is_err());
    }
}
