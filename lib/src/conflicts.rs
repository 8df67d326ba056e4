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

//! Three-way conflict detection between two commits and their merge base.
//!
//! A path is trivially resolvable, and therefore not reported, when the two
//! sides agree or when only one side changed relative to the base.
//! States compare as `(is_symlink, content)` pairs, so a symlink/file
//! divergence on the same path conflicts like any other double edit.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::file_path::FilePath;
use crate::merge_base::merge_base_in;
use crate::object_id::ObjectId as _;
use crate::snapshot::effective_states;
use crate::store::{Commit, CommitId, FileState, Store, StoreError, Tables};

/// Which argument of a two-commit operation a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeSide {
    Left,
    Right,
}

impl fmt::Display for MergeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeSide::Left => f.write_str("left"),
            MergeSide::Right => f.write_str("right"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConflictError {
    #[error("{side} commit {id} doesn't exist")]
    InvalidCommit { side: MergeSide, id: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How the two sides of a three-way diff collide on one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub enum ConflictKind {
    #[serde(rename = "add/add")]
    AddAdd,
    #[serde(rename = "modify/modify")]
    ModifyModify,
    #[serde(rename = "delete/modify")]
    DeleteModify,
    #[serde(rename = "modify/delete")]
    ModifyDelete,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConflictKind::AddAdd => "add/add",
            ConflictKind::ModifyModify => "modify/modify",
            ConflictKind::DeleteModify => "delete/modify",
            ConflictKind::ModifyDelete => "modify/delete",
        };
        f.write_str(name)
    }
}

/// One conflicting path, with the three-way states spelled out for the
/// caller to author a resolution from.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConflictRow {
    pub merge_base_commit_id: Option<CommitId>,
    pub path: FilePath,
    pub base_exists: bool,
    pub left_exists: bool,
    pub right_exists: bool,
    pub base_content: Option<String>,
    pub left_content: Option<String>,
    pub right_content: Option<String>,
    pub base_is_symlink: bool,
    pub left_is_symlink: bool,
    pub right_is_symlink: bool,
    pub conflict_kind: ConflictKind,
}

/// Computes the three-way diff of `left` and `right` against their merge
/// base and returns the paths that are not trivially resolvable, ordered by
/// path.
pub fn get_conflicts(
    store: &Store,
    left: &CommitId,
    right: &CommitId,
) -> Result<Vec<ConflictRow>, ConflictError> {
    let tables = store.read();
    conflicts_in(&tables, left, right)
}

pub(crate) fn conflicts_in(
    tables: &Tables,
    left: &CommitId,
    right: &CommitId,
) -> Result<Vec<ConflictRow>, ConflictError> {
    let left_commit = resolve_side(tables, left, MergeSide::Left)?;
    let right_commit = resolve_side(tables, right, MergeSide::Right)?;
    if left_commit.repository_id != right_commit.repository_id {
        return Err(StoreError::CrossRepository.into());
    }

    let base = merge_base_in(tables, left, right)?;
    let base_states = effective_states(tables, base.as_ref())?;
    let left_states = effective_states(tables, Some(left))?;
    let right_states = effective_states(tables, Some(right))?;

    let paths: BTreeSet<&FilePath> = base_states
        .keys()
        .chain(left_states.keys())
        .chain(right_states.keys())
        .collect();
    let mut rows = Vec::new();
    for path in paths {
        let base_state = base_states.get(path);
        let left_state = left_states.get(path);
        let right_state = right_states.get(path);
        let Some(kind) = classify(base_state, left_state, right_state) else {
            continue;
        };
        rows.push(ConflictRow {
            merge_base_commit_id: base.clone(),
            path: path.clone(),
            base_exists: base_state.is_some(),
            left_exists: left_state.is_some(),
            right_exists: right_state.is_some(),
            base_content: base_state.map(|state| state.content.clone()),
            left_content: left_state.map(|state| state.content.clone()),
            right_content: right_state.map(|state| state.content.clone()),
            base_is_symlink: base_state.is_some_and(|state| state.is_symlink),
            left_is_symlink: left_state.is_some_and(|state| state.is_symlink),
            right_is_symlink: right_state.is_some_and(|state| state.is_symlink),
            conflict_kind: kind,
        });
    }
    Ok(rows)
}

fn resolve_side<'a>(
    tables: &'a Tables,
    id: &CommitId,
    side: MergeSide,
) -> Result<&'a Commit, ConflictError> {
    match tables.commit(id) {
        Ok(commit) => Ok(commit),
        Err(StoreError::CommitNotFound { .. }) => Err(ConflictError::InvalidCommit {
            side,
            id: id.hex(),
        }),
        Err(err) => Err(err.into()),
    }
}

/// Classifies one path of the three-way diff, or returns `None` when the
/// path is trivially resolvable.
fn classify(
    base: Option<&FileState>,
    left: Option<&FileState>,
    right: Option<&FileState>,
) -> Option<ConflictKind> {
    if left == right {
        // Unchanged on both sides, or both sides made the identical change.
        return None;
    }
    if left == base || right == base {
        // Only one side changed.
        return None;
    }
    match (base.is_some(), left.is_some(), right.is_some()) {
        (false, true, true) => Some(ConflictKind::AddAdd),
        (true, false, true) => Some(ConflictKind::DeleteModify),
        (true, true, false) => Some(ConflictKind::ModifyDelete),
        (true, true, true) => Some(ConflictKind::ModifyModify),
        // A side that is absent next to an absent base is unchanged, and was
        // caught above.
        _ => None,
    }
}
