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

use assert_matches::assert_matches;
use strata_lib::history::read_file;
use strata_lib::merge::finalize_commit;
use strata_lib::rebase::{rebase_branch, RebaseError, RebaseOperation};
use strata_lib::snapshot::get_commit_snapshot;
use strata_lib::store::StoreError;
use testutils::{delete_file, write_file, CommitGraphBuilder, TestRepo};

#[test]
fn test_rebase_fast_forward() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let base = graph_builder.initial_commit();
    finalize_commit(store, &base.id, &test_repo.main.id).unwrap();
    let feature = store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
    assert_eq!(feature.head_commit_id, Some(base.id.clone()));

    // Main moves ahead while the feature branch stays put.
    let m1 = graph_builder.commit_with_parent(&base);
    finalize_commit(store, &m1.id, &test_repo.main.id).unwrap();

    let outcome = rebase_branch(store, &feature.id, &test_repo.main.id, "catch up").unwrap();
    assert_eq!(outcome.operation, RebaseOperation::FastForward);
    assert_eq!(outcome.rebased_commit_id, None);
    assert_eq!(outcome.new_branch_head_commit_id, Some(m1.id.clone()));
    assert_eq!(outcome.applied_file_count, 0);
    assert_eq!(
        store.branch(&feature.id).unwrap().head_commit_id,
        Some(m1.id)
    );
}

#[test]
fn test_rebase_already_up_to_date() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let base = graph_builder.initial_commit();
    finalize_commit(store, &base.id, &test_repo.main.id).unwrap();
    let feature = store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
    let f1 = graph_builder.commit_with_parent(&base);
    finalize_commit(store, &f1.id, &feature.id).unwrap();

    // The onto head is already part of the branch history.
    let outcome = rebase_branch(store, &feature.id, &test_repo.main.id, "noop").unwrap();
    assert_eq!(outcome.operation, RebaseOperation::AlreadyUpToDate);
    assert_eq!(outcome.rebased_commit_id, None);
    assert_eq!(outcome.new_branch_head_commit_id, Some(f1.id.clone()));
    assert_eq!(
        store.branch(&feature.id).unwrap().head_commit_id,
        Some(f1.id.clone())
    );

    // Same heads are a no-op too.
    let outcome = rebase_branch(store, &feature.id, &feature.id, "self").unwrap();
    assert_eq!(outcome.operation, RebaseOperation::AlreadyUpToDate);
    assert_eq!(outcome.new_branch_head_commit_id, Some(f1.id));
}

#[test]
fn test_rebase_diverged_creates_single_commit() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let base = graph_builder.initial_commit();
    finalize_commit(store, &base.id, &test_repo.main.id).unwrap();
    let feature = store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
    let f1 = graph_builder.commit_with_parent(&base);
    write_file(store, &f1, "/feature.txt", "feature");
    finalize_commit(store, &f1.id, &feature.id).unwrap();
    let m1 = graph_builder.commit_with_parent(&base);
    write_file(store, &m1, "/main.txt", "main");
    finalize_commit(store, &m1.id, &test_repo.main.id).unwrap();

    let outcome =
        rebase_branch(store, &feature.id, &test_repo.main.id, "rebase feature").unwrap();
    assert_eq!(outcome.operation, RebaseOperation::Rebased);
    assert_eq!(outcome.applied_file_count, 1);
    let rebased_id = outcome.rebased_commit_id.clone().unwrap();
    assert_eq!(outcome.new_branch_head_commit_id, Some(rebased_id.clone()));
    assert_eq!(
        store.branch(&feature.id).unwrap().head_commit_id,
        Some(rebased_id.clone())
    );

    // The new commit sits on the onto head and carries the branch's change.
    let rebased = store.commit(&rebased_id).unwrap();
    assert_eq!(rebased.parent_commit_id, Some(m1.id));
    assert_eq!(rebased.merged_from_commit_id, None);
    assert_eq!(rebased.message, "rebase feature");
    let snapshot = get_commit_snapshot(store, &rebased_id).unwrap();
    let mut paths: Vec<&str> = snapshot.iter().map(|row| row.path.as_str()).collect();
    paths.sort_unstable();
    assert_eq!(paths, vec!["/feature.txt", "/main.txt"]);
}

#[test]
fn test_rebase_collapses_branch_history() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let base = graph_builder.initial_commit();
    write_file(store, &base, "/doomed", "present");
    finalize_commit(store, &base.id, &test_repo.main.id).unwrap();
    let feature = store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
    // Two feature commits: one rewrites a path twice, one deletes.
    let f1 = graph_builder.commit_with_parent(&base);
    write_file(store, &f1, "/new", "v1");
    finalize_commit(store, &f1.id, &feature.id).unwrap();
    let f2 = graph_builder.commit_with_parent(&f1);
    write_file(store, &f2, "/new", "v2");
    delete_file(store, &f2, "/doomed");
    finalize_commit(store, &f2.id, &feature.id).unwrap();
    let m1 = graph_builder.commit_with_parent(&base);
    write_file(store, &m1, "/main.txt", "main");
    finalize_commit(store, &m1.id, &test_repo.main.id).unwrap();

    let outcome = rebase_branch(store, &feature.id, &test_repo.main.id, "collapse").unwrap();
    assert_eq!(outcome.operation, RebaseOperation::Rebased);
    // One entry for the final version of /new, one tombstone for /doomed.
    assert_eq!(outcome.applied_file_count, 2);
    let rebased_id = outcome.rebased_commit_id.unwrap();
    assert_eq!(
        read_file(store, &rebased_id, "/new").unwrap(),
        Some("v2".to_owned())
    );
    assert_eq!(read_file(store, &rebased_id, "/doomed").unwrap(), None);
    assert_eq!(
        read_file(store, &rebased_id, "/main.txt").unwrap(),
        Some("main".to_owned())
    );
}

#[test]
fn test_rebase_blocked_by_conflict() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let base = graph_builder.initial_commit();
    write_file(store, &base, "/same.txt", "base");
    finalize_commit(store, &base.id, &test_repo.main.id).unwrap();
    let feature = store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
    let f1 = graph_builder.commit_with_parent(&base);
    write_file(store, &f1, "/same.txt", "feature");
    finalize_commit(store, &f1.id, &feature.id).unwrap();
    let m1 = graph_builder.commit_with_parent(&base);
    write_file(store, &m1, "/same.txt", "main");
    finalize_commit(store, &m1.id, &test_repo.main.id).unwrap();

    let err = rebase_branch(store, &feature.id, &test_repo.main.id, "blocked").unwrap_err();
    match err {
        RebaseError::Blocked { paths } => {
            assert_eq!(paths.len(), 1);
            assert_eq!(paths[0].as_str(), "/same.txt");
        }
        err => panic!("unexpected error: {err:?}"),
    }
    // The branch head is untouched.
    assert_eq!(
        store.branch(&feature.id).unwrap().head_commit_id,
        Some(f1.id)
    );
}

#[test]
fn test_rebase_with_null_heads() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let feature = store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();

    // Nothing to move onto: noop.
    let outcome = rebase_branch(store, &feature.id, &test_repo.main.id, "noop").unwrap();
    assert_eq!(outcome.operation, RebaseOperation::AlreadyUpToDate);
    assert_eq!(outcome.new_branch_head_commit_id, None);

    // An empty branch fast-forwards onto a populated one.
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let commit = graph_builder.initial_commit();
    finalize_commit(store, &commit.id, &test_repo.main.id).unwrap();
    let outcome = rebase_branch(store, &feature.id, &test_repo.main.id, "catch up").unwrap();
    assert_eq!(outcome.operation, RebaseOperation::FastForward);
    assert_eq!(
        store.branch(&feature.id).unwrap().head_commit_id,
        Some(commit.id)
    );
}

#[test]
fn test_rebase_cross_repository() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let other = store.create_repository("other").unwrap();
    let other_main = store.branch(&other.default_branch_id).unwrap();

    assert_matches!(
        rebase_branch(store, &test_repo.main.id, &other_main.id, "nope"),
        Err(RebaseError::Store(StoreError::CrossRepository))
    );
}
