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

//! Lowest common ancestor over the commit DAG.

use crate::dag_walk;
use crate::store::{CommitId, Store, StoreError, StoreResult, Tables};

/// Finds the merge base of `a` and `b`: the common ancestor minimising the
/// combined distance to the two commits, with ties broken towards the
/// commit closer to `a` and then towards the smallest commit id.
///
/// Ancestry follows both `parent_commit_id` and `merged_from_commit_id`
/// edges, and every commit is an ancestor of itself, so
/// `get_merge_base(x, x) == x` and an ancestor of the other side is its own
/// base. Returns `None` for commits with disjoint histories inside the same
/// repository.
pub fn get_merge_base(
    store: &Store,
    a: &CommitId,
    b: &CommitId,
) -> StoreResult<Option<CommitId>> {
    let tables = store.read();
    merge_base_in(&tables, a, b)
}

pub(crate) fn merge_base_in(
    tables: &Tables,
    a: &CommitId,
    b: &CommitId,
) -> StoreResult<Option<CommitId>> {
    let commit_a = tables.commit(a)?;
    let commit_b = tables.commit(b)?;
    if commit_a.repository_id != commit_b.repository_id {
        return Err(StoreError::CrossRepository);
    }
    Ok(dag_walk::closest_common_node(
        a.clone(),
        b.clone(),
        |id| tables.parent_edges(id),
    ))
}
