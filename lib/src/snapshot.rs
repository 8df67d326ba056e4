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

//! Snapshot resolution: what a commit changed, and what the filesystem
//! effectively looks like at a commit.
//!
//! Effective state walks ancestry through `parent_commit_id` only. File
//! entries recorded on the incoming side of a merge are not inherited
//! through `merged_from_commit_id`; the merge finaliser copies them into the
//! merge commit instead.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::file_path::FilePath;
use crate::store::{
    CommitId, FileEntry, FileState, RepositoryId, Store, StoreResult, Tables,
};

/// One file entry recorded at a commit, joined with its commit's metadata.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeltaRow {
    pub repository_id: RepositoryId,
    pub repository_name: String,
    pub commit_id: CommitId,
    pub path: FilePath,
    pub content: Option<String>,
    pub is_deleted: bool,
    pub is_symlink: bool,
    pub commit_created_at: DateTime<Utc>,
    pub commit_message: String,
}

/// One live path in a commit's effective file set. `commit_id` names the
/// commit whose entry won the ancestry walk, not necessarily the queried
/// commit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SnapshotRow {
    pub repository_id: RepositoryId,
    pub repository_name: String,
    pub commit_id: CommitId,
    pub path: FilePath,
    pub content: String,
    pub is_symlink: bool,
    pub commit_created_at: DateTime<Utc>,
    pub commit_message: String,
}

/// Returns exactly the file entries recorded at `commit_id`, without
/// ancestry: the "what changed in this commit" view. Tombstones are
/// included.
pub fn get_commit_delta(store: &Store, commit_id: &CommitId) -> StoreResult<Vec<DeltaRow>> {
    let tables = store.read();
    let commit = tables.commit(commit_id)?;
    let repository = tables.repository(&commit.repository_id)?;
    Ok(tables
        .entries(commit_id)
        .map(|entry| DeltaRow {
            repository_id: repository.id.clone(),
            repository_name: repository.name.clone(),
            commit_id: commit.id.clone(),
            path: entry.path.clone(),
            content: entry.content.clone(),
            is_deleted: entry.is_deleted,
            is_symlink: entry.is_symlink,
            commit_created_at: commit.created_at,
            commit_message: commit.message.clone(),
        })
        .collect())
}

/// Returns the effective file set visible at `commit_id`: for every path,
/// the nearest entry along the parent chain wins, and paths whose winning
/// entry is a tombstone are excluded. Rows are ordered by path.
pub fn get_commit_snapshot(
    store: &Store,
    commit_id: &CommitId,
) -> StoreResult<Vec<SnapshotRow>> {
    let tables = store.read();
    let commit = tables.commit(commit_id)?;
    let repository = tables.repository(&commit.repository_id)?;
    let mut rows = Vec::new();
    for (path, entry) in effective_entries(&tables, commit_id)? {
        let Some(state) = entry.state() else {
            continue;
        };
        let origin = tables.commit(&entry.commit_id)?;
        rows.push(SnapshotRow {
            repository_id: repository.id.clone(),
            repository_name: repository.name.clone(),
            commit_id: origin.id.clone(),
            path,
            content: state.content,
            is_symlink: state.is_symlink,
            commit_created_at: origin.created_at,
            commit_message: origin.message.clone(),
        });
    }
    Ok(rows)
}

/// Walks the parent chain from `commit_id` and collects, per path, the
/// nearest file entry. Tombstones are kept so that callers can tell "deleted
/// here" apart from "never existed".
pub(crate) fn effective_entries<'a>(
    tables: &'a Tables,
    commit_id: &CommitId,
) -> StoreResult<BTreeMap<FilePath, &'a FileEntry>> {
    let mut effective: BTreeMap<FilePath, &FileEntry> = BTreeMap::new();
    let mut visited = HashSet::new();
    let mut next = Some(commit_id.clone());
    while let Some(id) = next {
        // The parent chain cannot cycle under the append-only rule; the
        // visited set bounds the walk against corrupt data anyway.
        if !visited.insert(id.clone()) {
            break;
        }
        let commit = tables.commit(&id)?;
        for entry in tables.entries(&id) {
            effective.entry(entry.path.clone()).or_insert(entry);
        }
        next = commit.parent_commit_id.clone();
    }
    Ok(effective)
}

/// The live `(path, state)` map at a commit; `None` stands for the empty
/// history (a null branch head or an absent merge base).
pub(crate) fn effective_states(
    tables: &Tables,
    commit_id: Option<&CommitId>,
) -> StoreResult<BTreeMap<FilePath, FileState>> {
    let Some(commit_id) = commit_id else {
        return Ok(BTreeMap::new());
    };
    Ok(effective_entries(tables, commit_id)?
        .into_iter()
        .filter_map(|(path, entry)| entry.state().map(|state| (path, state)))
        .collect())
}
