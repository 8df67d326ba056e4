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

//! Finalising a commit onto a branch: plain head advancement for ordinary
//! commits, and the merge protocol (resolution validation plus one-sided
//! copy-down) for merge commits.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools as _;
use thiserror::Error;
use tracing::instrument;

use crate::conflicts::{conflicts_in, ConflictError};
use crate::file_path::FilePath;
use crate::merge_base::merge_base_in;
use crate::snapshot::effective_states;
use crate::store::{BranchId, CommitId, FileChange, Store, StoreError};

/// What `finalize_commit` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeOperation {
    Committed,
    Merged,
    MergedWithConflictsResolved,
    AlreadyUpToDate,
}

impl fmt::Display for FinalizeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FinalizeOperation::Committed => "committed",
            FinalizeOperation::Merged => "merged",
            FinalizeOperation::MergedWithConflictsResolved => "merged_with_conflicts_resolved",
            FinalizeOperation::AlreadyUpToDate => "already_up_to_date",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FinalizeOutcome {
    pub operation: FinalizeOperation,
    pub merge_commit_id: Option<CommitId>,
    pub new_target_head_commit_id: CommitId,
    pub applied_file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    /// The merge commit is missing a resolution entry for one or more
    /// conflicting paths. The branch head is left unchanged.
    #[error("merge requires resolutions for conflicting paths: {}", paths.iter().join(", "))]
    RequiresResolutions { paths: Vec<FilePath> },
    /// The commit is not based on the target branch's current head; the
    /// caller must rebase or build a merge commit against the moved head.
    #[error("commit is not based on the target branch's current head")]
    FastForwardRequired,
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Finalises `commit_id` onto `target_branch_id`.
///
/// The commit must sit on the branch's current head (`parent_commit_id ==
/// head`). An ordinary commit simply advances the head. A merge commit is
/// checked against the incoming side: if the source is already an ancestor
/// of the head the head still moves to the merge commit (recording the
/// intent) and nothing is applied; otherwise every conflicting path must
/// already carry a caller-authored resolution entry on the merge commit, and
/// every one-sided incoming change is copied down into it before the head
/// advances.
#[instrument(skip(store))]
pub fn finalize_commit(
    store: &Store,
    commit_id: &CommitId,
    target_branch_id: &BranchId,
) -> Result<FinalizeOutcome, MergeError> {
    let mut tables = store.write();
    let commit = tables.commit(commit_id)?.clone();
    let branch = tables.branch(target_branch_id)?.clone();
    if commit.repository_id != branch.repository_id {
        return Err(StoreError::CrossRepository.into());
    }
    if branch.head_commit_id != commit.parent_commit_id {
        return Err(MergeError::FastForwardRequired);
    }

    let Some(source) = commit.merged_from_commit_id.clone() else {
        let applied_file_count = tables.entries(commit_id).count();
        tables.set_head(target_branch_id, Some(commit.id.clone()));
        return Ok(FinalizeOutcome {
            operation: FinalizeOperation::Committed,
            merge_commit_id: None,
            new_target_head_commit_id: commit.id,
            applied_file_count,
        });
    };

    if let Some(head) = &branch.head_commit_id {
        if tables.is_ancestor(&source, head) {
            // The incoming side is already part of the branch history. The
            // merge commit still becomes the head so that the merge intent
            // is recorded.
            tables.set_head(target_branch_id, Some(commit.id.clone()));
            return Ok(FinalizeOutcome {
                operation: FinalizeOperation::AlreadyUpToDate,
                merge_commit_id: Some(commit.id.clone()),
                new_target_head_commit_id: commit.id,
                applied_file_count: 0,
            });
        }
    }

    // The target side of the three-way diff is the merge commit's parent,
    // which the precondition pinned to the branch head. A null parent means
    // an empty target side: nothing can collide.
    let target = commit.parent_commit_id.clone();
    let conflict_paths: BTreeSet<FilePath> = match &target {
        Some(target) => conflicts_in(&tables, target, &source)?
            .into_iter()
            .map(|row| row.path)
            .collect(),
        None => BTreeSet::new(),
    };
    let unresolved: Vec<FilePath> = conflict_paths
        .iter()
        .filter(|path| tables.entry(commit_id, path).is_none())
        .cloned()
        .collect();
    if !unresolved.is_empty() {
        return Err(MergeError::RequiresResolutions { paths: unresolved });
    }

    // Copy the one-sided incoming changes down into the merge commit: paths
    // the source changed relative to the base and the target left alone,
    // unless the caller already overrode them on the merge commit.
    let base = match &target {
        Some(target) => merge_base_in(&tables, target, &source)?,
        None => None,
    };
    let base_states = effective_states(&tables, base.as_ref())?;
    let target_states = effective_states(&tables, target.as_ref())?;
    let source_states = effective_states(&tables, Some(&source))?;
    let mut incoming: Vec<(FilePath, FileChange)> = Vec::new();
    let paths: BTreeSet<&FilePath> = base_states.keys().chain(source_states.keys()).collect();
    for path in paths {
        let base_state = base_states.get(path);
        let source_state = source_states.get(path);
        let target_state = target_states.get(path);
        if source_state == base_state {
            continue;
        }
        if target_state != base_state {
            continue;
        }
        if tables.entry(commit_id, path).is_some() {
            continue;
        }
        let change = match source_state {
            Some(state) => state.to_change(),
            None => FileChange::Delete,
        };
        incoming.push((path.clone(), change));
    }
    let applied_file_count = incoming.len();
    for (path, change) in incoming {
        tables.put_entry(&commit, path, change);
    }
    tables.set_head(target_branch_id, Some(commit.id.clone()));

    let operation = if conflict_paths.is_empty() {
        FinalizeOperation::Merged
    } else {
        FinalizeOperation::MergedWithConflictsResolved
    };
    tracing::debug!(applied_file_count, %operation, "finalized merge commit");
    Ok(FinalizeOutcome {
        operation,
        merge_commit_id: Some(commit.id.clone()),
        new_target_head_commit_id: commit.id,
        applied_file_count,
    })
}
