/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! The resource graph: mapping normalised paths onto principals,
//! collection sets, collections and items backed by the store layer.
//! Collections are discovered by walking the data root; a directory is a
//! collection when it carries the store control directory, otherwise it
//! groups further collections.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use store::{CollectionConfig, CollectionStore, CollectionType, StoreError};

use crate::{Result, common::uri::DavPath};

/// A resolved collection with its open store and sidecar configuration.
#[derive(Clone)]
pub struct CollectionRef {
    pub path: DavPath,
    pub href: String,
    pub dir: PathBuf,
    pub store: Arc<CollectionStore>,
    pub config: CollectionConfig,
}

impl CollectionRef {
    pub fn collection_type(&self) -> CollectionType {
        self.config.collection_type()
    }

    pub fn is_calendar(&self) -> bool {
        self.collection_type() == CollectionType::Calendar
    }

    pub fn is_addressbook(&self) -> bool {
        self.collection_type() == CollectionType::Addressbook
    }

    /// The display name clients see: the configured one, else the
    /// directory name.
    pub fn displayname(&self) -> String {
        self.config
            .displayname()
            .map(str::to_string)
            .or_else(|| self.path.last().map(str::to_string))
            .unwrap_or_default()
    }
}

/// A resolved request target.
pub enum Resolved {
    Root,
    Principal {
        name: String,
        href: String,
    },
    CollectionSet {
        path: DavPath,
        href: String,
        dir: PathBuf,
    },
    Collection(CollectionRef),
    Item {
        collection: CollectionRef,
        name: String,
        etag: String,
    },
}

impl Resolved {
    pub fn href(&self) -> String {
        match self {
            Resolved::Root => "/".to_string(),
            Resolved::Principal { href, .. } => href.clone(),
            Resolved::CollectionSet { href, .. } => href.clone(),
            Resolved::Collection(collection) => collection.href.clone(),
            Resolved::Item {
                collection, name, ..
            } => super::common::uri::member_href(&collection.href, name),
        }
    }

    pub fn is_collection_kind(&self) -> bool {
        !matches!(self, Resolved::Item { .. })
    }
}

pub struct Backend {
    root: PathBuf,
    stores: Mutex<AHashMap<PathBuf, Arc<CollectionStore>>>,
}

impl Backend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Backend {
            root: root.into(),
            stores: Mutex::new(AHashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Opens a collection store, sharing one instance per directory so
    /// its write lock serialises writers across requests.
    pub fn open_collection(&self, dir: &Path) -> Result<Arc<CollectionStore>> {
        let mut stores = self.stores.lock().expect("store cache poisoned");
        if let Some(store) = stores.get(dir) {
            return Ok(store.clone());
        }
        let mut store = CollectionStore::open(dir)?;
        // Subscriptions mirror an external source; clients cannot write
        // into them.
        if store.config()?.collection_type() == CollectionType::Subscription {
            store.set_read_only(true);
        }
        let store = Arc::new(store);
        stores.insert(dir.to_path_buf(), store.clone());
        Ok(store)
    }

    pub fn create_collection(
        &self,
        dir: &Path,
        config: CollectionConfig,
    ) -> Result<Arc<CollectionStore>> {
        let store = Arc::new(CollectionStore::create(dir, config)?);
        self.stores
            .lock()
            .expect("store cache poisoned")
            .insert(dir.to_path_buf(), store.clone());
        Ok(store)
    }

    /// Deletes a directory subtree (collection, collection set or
    /// principal) and evicts any cached stores beneath it.
    pub fn remove_tree(&self, dir: &Path) -> Result<()> {
        self.stores
            .lock()
            .expect("store cache poisoned")
            .retain(|path, _| !path.starts_with(dir));
        std::fs::remove_dir_all(dir).map_err(StoreError::from)?;
        Ok(())
    }

    /// Principal names: the first-level directories of the data root.
    pub fn principals(&self) -> Result<Vec<String>> {
        self.list_dirs(&self.root.clone())
            .map(|children| children.into_iter().map(|(name, _, _)| name).collect())
    }

    /// Visible subdirectories of `dir` with their store-ness.
    pub fn list_dirs(&self, dir: &Path) -> Result<Vec<(String, PathBuf, bool)>> {
        let mut out = Vec::new();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(err) => return Err(StoreError::from(err).into()),
        };
        for entry in entries {
            let entry = entry.map_err(StoreError::from)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            if path.is_dir() {
                let is_store = CollectionStore::is_store(&path);
                out.push((name, path, is_store));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    fn collection_ref(&self, path: &DavPath, dir: PathBuf, route_prefix: &str) -> Result<CollectionRef> {
        let store = self.open_collection(&dir)?;
        let config = store.config()?;
        Ok(CollectionRef {
            href: path.href(route_prefix, true),
            path: path.clone(),
            dir,
            store,
            config,
        })
    }

    /// Maps a path to a resource, or `None` when nothing lives there.
    pub fn resolve(&self, path: &DavPath, route_prefix: &str) -> Result<Option<Resolved>> {
        if path.is_root() {
            return Ok(Some(Resolved::Root));
        }

        let mut dir = self.root.clone();
        for (index, segment) in path.segments.iter().enumerate() {
            if segment.starts_with('.') {
                return Ok(None);
            }
            let candidate = dir.join(segment);
            let is_last = index + 1 == path.segments.len();

            if CollectionStore::is_store(&candidate) {
                let collection_path = DavPath {
                    segments: path.segments[..=index].to_vec(),
                    collection_form: true,
                };
                let collection =
                    self.collection_ref(&collection_path, candidate, route_prefix)?;
                if is_last {
                    return Ok(Some(Resolved::Collection(collection)));
                }
                // Items live directly inside a collection; deeper paths
                // do not exist (calendars hold only items).
                if index + 2 == path.segments.len() {
                    let name = &path.segments[index + 1];
                    return match collection.store.etag(name)? {
                        Some(etag) => Ok(Some(Resolved::Item {
                            collection,
                            name: name.clone(),
                            etag,
                        })),
                        None => Ok(None),
                    };
                }
                return Ok(None);
            }

            if !candidate.is_dir() {
                return Ok(None);
            }
            if is_last {
                return Ok(Some(if index == 0 {
                    Resolved::Principal {
                        name: segment.clone(),
                        href: path.href(route_prefix, true),
                    }
                } else {
                    Resolved::CollectionSet {
                        path: path.clone(),
                        href: path.href(route_prefix, true),
                        dir: candidate,
                    }
                }));
            }
            dir = candidate;
        }
        Ok(None)
    }

    /// Creates a principal directory and, when asked, its default
    /// collections. Re-running is a no-op.
    pub fn ensure_principal(&self, name: &str, with_defaults: bool) -> Result<()> {
        let principal = self.root.join(name);
        std::fs::create_dir_all(&principal).map_err(StoreError::from)?;
        if !with_defaults {
            return Ok(());
        }
        for (relative, typ, displayname) in [
            ("calendars/calendar", CollectionType::Calendar, "calendar"),
            ("calendars/inbox", CollectionType::ScheduleInbox, "inbox"),
            ("calendars/outbox", CollectionType::ScheduleOutbox, "outbox"),
            (
                "contacts/addressbook",
                CollectionType::Addressbook,
                "addressbook",
            ),
        ] {
            let dir = principal.join(relative);
            if CollectionStore::is_store(&dir) {
                continue;
            }
            let mut config = CollectionConfig::default();
            config.set_collection_type(typ);
            config.set("displayname", displayname);
            match self.create_collection(&dir, config) {
                Ok(_) => {}
                Err(crate::DavError::Store(StoreError::AlreadyExists(_))) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_the_autocreated_graph() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = Backend::new(tmp.path());
        backend.ensure_principal("alice", true).unwrap();
        // Idempotent.
        backend.ensure_principal("alice", true).unwrap();

        let principal = DavPath::parse("/alice/", "").unwrap();
        assert!(matches!(
            backend.resolve(&principal, "").unwrap(),
            Some(Resolved::Principal { ref name, .. }) if name == "alice"
        ));

        let home = DavPath::parse("/alice/calendars/", "").unwrap();
        assert!(matches!(
            backend.resolve(&home, "").unwrap(),
            Some(Resolved::CollectionSet { .. })
        ));

        let calendar = DavPath::parse("/alice/calendars/calendar/", "").unwrap();
        let Some(Resolved::Collection(collection)) = backend.resolve(&calendar, "").unwrap()
        else {
            panic!("expected collection");
        };
        assert!(collection.is_calendar());
        assert_eq!(collection.href, "/alice/calendars/calendar/");

        assert!(backend.resolve(&DavPath::parse("/bob/", "").unwrap(), "").unwrap().is_none());
        assert!(
            backend
                .resolve(
                    &DavPath::parse("/alice/calendars/calendar/absent.ics", "").unwrap(),
                    ""
                )
                .unwrap()
                .is_none()
        );
        assert_eq!(backend.principals().unwrap(), vec!["alice"]);
    }
}
