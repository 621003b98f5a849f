/*
 * Copyright (C) 2026 the vestry authors
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Per-collection versioned storage. Every collection is a content-addressed
//! object database holding blobs (resource octets), trees (the member set)
//! and commits (a linear history). Identity falls out of hashing: a
//! resource's ETag is its blob id, a collection's ctag is its tree id, and a
//! sync token names a commit.

pub mod collection;
pub mod config;
pub mod index;
pub mod media;
pub mod odb;

pub use collection::{Change, CollectionStore, Item, Preconditions};
pub use config::{CollectionConfig, CollectionType};
pub use odb::{Commit, ObjectDb, ObjectId, Tree, TreeEntry};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no such item: {0}")]
    NotFound(String),

    #[error("etag precondition failed for {name}")]
    PreconditionFailed { name: String },

    #[error("uid {uid} already present in {existing}")]
    DuplicateUid { uid: String, existing: String },

    #[error("invalid resource content: {0}")]
    Invalid(String),

    #[error("unsupported media type for {0}")]
    UnsupportedMedia(String),

    #[error("collection is read-only")]
    Forbidden,

    #[error("sync token is no longer reachable")]
    TokenStale,

    #[error("not a collection store: {0}")]
    NotStore(std::path::PathBuf),

    #[error("collection already exists: {0}")]
    AlreadyExists(std::path::PathBuf),

    #[error("corrupt object {0}")]
    Corrupt(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
