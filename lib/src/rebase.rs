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

//! Rebasing a branch onto another branch's tip.
//!
//! A diverged branch is collapsed into a single new commit carrying its
//! effective changes; per-commit replay is deliberately not performed.
//! Callers who want the branch's history preserved should use a merge
//! commit instead.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools as _;
use thiserror::Error;
use tracing::instrument;

use crate::conflicts::{conflicts_in, ConflictError};
use crate::file_path::FilePath;
use crate::merge_base::merge_base_in;
use crate::object_id::ObjectId as _;
use crate::snapshot::effective_states;
use crate::store::{BranchId, CommitId, FileChange, Store, StoreError};

/// What `rebase_branch` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RebaseOperation {
    AlreadyUpToDate,
    FastForward,
    Rebased,
}

impl fmt::Display for RebaseOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RebaseOperation::AlreadyUpToDate => "already_up_to_date",
            RebaseOperation::FastForward => "fast_forward",
            RebaseOperation::Rebased => "rebased",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RebaseOutcome {
    pub operation: RebaseOperation,
    pub rebased_commit_id: Option<CommitId>,
    pub new_branch_head_commit_id: Option<CommitId>,
    pub applied_file_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RebaseError {
    /// The branch and the onto tip both changed one or more paths relative
    /// to their merge base. The branch head is left unchanged.
    #[error("rebase is blocked by conflicting paths: {}", paths.iter().join(", "))]
    Blocked { paths: Vec<FilePath> },
    #[error(transparent)]
    Conflict(#[from] ConflictError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reparents `branch_id`'s tip linearly onto `onto_branch_id`'s tip.
///
/// If the onto tip is already in the branch's history this is a no-op; if
/// the branch's history is a prefix of the onto history the branch
/// fast-forwards. Otherwise the branch's effective changes relative to the
/// merge base are collapsed into one new commit (tombstones included) on top
/// of the onto tip, provided no path conflicts with it.
#[instrument(skip(store))]
pub fn rebase_branch(
    store: &Store,
    branch_id: &BranchId,
    onto_branch_id: &BranchId,
    message: &str,
) -> Result<RebaseOutcome, RebaseError> {
    let mut tables = store.write();
    let branch = tables.branch(branch_id)?.clone();
    let onto = tables.branch(onto_branch_id)?.clone();
    if branch.repository_id != onto.repository_id {
        return Err(StoreError::CrossRepository.into());
    }

    let Some(onto_head) = onto.head_commit_id.clone() else {
        // Nothing to move onto.
        return Ok(RebaseOutcome {
            operation: RebaseOperation::AlreadyUpToDate,
            rebased_commit_id: None,
            new_branch_head_commit_id: branch.head_commit_id,
            applied_file_count: 0,
        });
    };
    let Some(branch_head) = branch.head_commit_id.clone() else {
        // An empty branch trivially fast-forwards.
        tables.set_head(branch_id, Some(onto_head.clone()));
        return Ok(RebaseOutcome {
            operation: RebaseOperation::FastForward,
            rebased_commit_id: None,
            new_branch_head_commit_id: Some(onto_head),
            applied_file_count: 0,
        });
    };
    if tables.is_ancestor(&onto_head, &branch_head) {
        return Ok(RebaseOutcome {
            operation: RebaseOperation::AlreadyUpToDate,
            rebased_commit_id: None,
            new_branch_head_commit_id: Some(branch_head),
            applied_file_count: 0,
        });
    }
    if tables.is_ancestor(&branch_head, &onto_head) {
        tables.set_head(branch_id, Some(onto_head.clone()));
        return Ok(RebaseOutcome {
            operation: RebaseOperation::FastForward,
            rebased_commit_id: None,
            new_branch_head_commit_id: Some(onto_head),
            applied_file_count: 0,
        });
    }

    // Diverged. The branch's changes only land if none of them collide with
    // the onto history.
    let conflicts = conflicts_in(&tables, &onto_head, &branch_head)?;
    if !conflicts.is_empty() {
        return Err(RebaseError::Blocked {
            paths: conflicts.into_iter().map(|row| row.path).collect(),
        });
    }

    let base = merge_base_in(&tables, &branch_head, &onto_head)?;
    let base_states = effective_states(&tables, base.as_ref())?;
    let branch_states = effective_states(&tables, Some(&branch_head))?;
    let mut changes: Vec<(FilePath, FileChange)> = Vec::new();
    let paths: BTreeSet<&FilePath> = base_states.keys().chain(branch_states.keys()).collect();
    for path in paths {
        let base_state = base_states.get(path);
        let branch_state = branch_states.get(path);
        if branch_state == base_state {
            continue;
        }
        let change = match branch_state {
            Some(state) => state.to_change(),
            None => FileChange::Delete,
        };
        changes.push((path.clone(), change));
    }

    let rebased = tables.new_commit(&branch.repository_id, Some(&onto_head), None, message);
    let applied_file_count = changes.len();
    for (path, change) in changes {
        tables.put_entry(&rebased, path, change);
    }
    tables.set_head(branch_id, Some(rebased.id.clone()));
    tracing::debug!(
        applied_file_count,
        rebased_commit = %rebased.id.hex(),
        "rebased branch"
    );
    Ok(RebaseOutcome {
        operation: RebaseOperation::Rebased,
        rebased_commit_id: Some(rebased.id.clone()),
        new_branch_head_commit_id: Some(rebased.id),
        applied_file_count,
    })
}
