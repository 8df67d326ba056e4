// Copyright 2024 The Strata Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Single-file reads and per-path history along the parent chain.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::file_path::FilePath;
use crate::store::{CommitId, Store, StoreResult};

/// One recorded version of a path somewhere in a commit's ancestry.
/// Tombstones and symlink entries are reported verbatim.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FileHistoryRow {
    pub commit_id: CommitId,
    pub path: FilePath,
    pub content: Option<String>,
    pub is_deleted: bool,
    pub is_symlink: bool,
    pub created_at: DateTime<Utc>,
}

/// One commit in the parent-only ancestry of a commit, nearest first.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommitLogRow {
    pub commit_id: CommitId,
    pub parent_commit_id: Option<CommitId>,
    pub merged_from_commit_id: Option<CommitId>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Reads the effective content of `path` at `commit_id`.
///
/// The nearest entry along the parent chain decides: a tombstone (or no
/// entry at all) reads as `None`; a symlink reads as its stored, normalised
/// target path. Symlinks are not followed here.
pub fn read_file(
    store: &Store,
    commit_id: &CommitId,
    path: &str,
) -> StoreResult<Option<String>> {
    let tables = store.read();
    tables.commit(commit_id)?;
    let path = FilePath::parse(path)?;
    let mut visited = HashSet::new();
    let mut next = Some(commit_id.clone());
    while let Some(id) = next {
        if !visited.insert(id.clone()) {
            break;
        }
        let commit = tables.commit(&id)?;
        if let Some(entry) = tables.entry(&id, &path) {
            if entry.is_deleted {
                return Ok(None);
            }
            return Ok(Some(entry.content.clone().unwrap_or_default()));
        }
        next = commit.parent_commit_id.clone();
    }
    Ok(None)
}

/// Returns every entry recorded for `path` in the parent-only ancestry of
/// `commit_id`, nearest first. The path argument is normalised exactly like
/// [`read_file`]'s.
pub fn get_file_history(
    store: &Store,
    commit_id: &CommitId,
    path: &str,
) -> StoreResult<Vec<FileHistoryRow>> {
    let tables = store.read();
    let repository_id = tables.commit(commit_id)?.repository_id.clone();
    let path = FilePath::parse(path)?;
    let Some(touching) = tables.commits_touching(&repository_id, &path) else {
        return Ok(vec![]);
    };
    let mut rows = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(commit_id.clone());
    while let Some(id) = next {
        if !visited.insert(id.clone()) {
            break;
        }
        let commit = tables.commit(&id)?;
        if touching.contains(&id) {
            if let Some(entry) = tables.entry(&id, &path) {
                rows.push(FileHistoryRow {
                    commit_id: entry.commit_id.clone(),
                    path: entry.path.clone(),
                    content: entry.content.clone(),
                    is_deleted: entry.is_deleted,
                    is_symlink: entry.is_symlink,
                    created_at: entry.created_at,
                });
            }
        }
        next = commit.parent_commit_id.clone();
    }
    Ok(rows)
}

/// Returns the parent-only ancestry of `commit_id` as log rows, nearest
/// first.
pub fn get_commit_log(store: &Store, commit_id: &CommitId) -> StoreResult<Vec<CommitLogRow>> {
    let tables = store.read();
    tables.commit(commit_id)?;
    let mut rows = Vec::new();
    let mut visited = HashSet::new();
    let mut next = Some(commit_id.clone());
    while let Some(id) = next {
        if !visited.insert(id.clone()) {
            break;
        }
        let commit = tables.commit(&id)?;
        rows.push(CommitLogRow {
            commit_id: commit.id.clone(),
            parent_commit_id: commit.parent_commit_id.clone(),
            merged_from_commit_id: commit.merged_from_commit_id.clone(),
            message: commit.message.clone(),
            created_at: commit.created_at,
        });
        next = commit.parent_commit_id.clone();
    }
    Ok(rows)
}
