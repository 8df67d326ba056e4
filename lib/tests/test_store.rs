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
use strata_lib::file_path::FilePathError;
use strata_lib::merge::finalize_commit;
use strata_lib::store::{FileChange, Store, StoreError};
use testutils::{write_file, write_symlink, CommitGraphBuilder, TestRepo};

#[test]
fn test_create_repository_wires_default_branch() {
    let store = Store::new();
    let repo = store.create_repository("demo").unwrap();
    let main = store.branch(&repo.default_branch_id).unwrap();
    assert_eq!(main.name, "main");
    assert_eq!(main.repository_id, repo.id);
    assert_eq!(main.head_commit_id, None);
    assert_eq!(store.branches(&repo.id).unwrap().len(), 1);
}

#[test]
fn test_create_repository_duplicate_name() {
    let store = Store::new();
    store.create_repository("demo").unwrap();
    assert_matches!(
        store.create_repository("demo"),
        Err(StoreError::RepositoryNameTaken { .. })
    );
    assert_eq!(store.repositories().len(), 1);
}

#[test]
fn test_repository_by_name() {
    let store = Store::new();
    let repo = store.create_repository("demo").unwrap();
    assert_eq!(store.repository_by_name("demo").unwrap().id, repo.id);
    assert_matches!(
        store.repository_by_name("nope"),
        Err(StoreError::RepositoryNameNotFound { .. })
    );
}

#[test]
fn test_create_branch_defaults_to_default_branch_head() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let commit = graph_builder.initial_commit();
    store
        .set_branch_head(&test_repo.main.id, Some(&commit.id))
        .unwrap();

    let feature = store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
    assert_eq!(feature.head_commit_id, Some(commit.id));

    // No commit was created along the way.
    let orphan = store
        .create_branch(&test_repo.repo.id, "orphan", None)
        .unwrap();
    assert_eq!(
        store.branch(&orphan.id).unwrap().head_commit_id,
        feature.head_commit_id
    );
}

#[test]
fn test_create_branch_with_null_head_in_fresh_repo() {
    let test_repo = TestRepo::init();
    let branch = test_repo
        .store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
    assert_eq!(branch.head_commit_id, None);
}

#[test]
fn test_create_branch_duplicate_name() {
    let test_repo = TestRepo::init();
    assert_matches!(
        test_repo.store.create_branch(&test_repo.repo.id, "main", None),
        Err(StoreError::BranchNameTaken { .. })
    );
    // The same name is fine in another repository.
    let other = test_repo.store.create_repository("other").unwrap();
    test_repo
        .store
        .create_branch(&other.id, "feature", None)
        .unwrap();
    test_repo
        .store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
}

#[test]
fn test_branch_head_must_stay_in_repository() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let other = store.create_repository("other").unwrap();
    let mut graph_builder = CommitGraphBuilder::new(store, &other.id);
    let foreign_commit = graph_builder.initial_commit();

    assert_matches!(
        store.create_branch(&test_repo.repo.id, "feature", Some(foreign_commit.id.clone())),
        Err(StoreError::CrossRepository)
    );
    assert_matches!(
        store.set_branch_head(&test_repo.main.id, Some(&foreign_commit.id)),
        Err(StoreError::CrossRepository)
    );
}

#[test]
fn test_create_commit_cross_repository_parent() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let other = store.create_repository("other").unwrap();
    let mut graph_builder = CommitGraphBuilder::new(store, &other.id);
    let foreign_commit = graph_builder.initial_commit();

    assert_matches!(
        store.create_commit(&test_repo.repo.id, Some(&foreign_commit.id), None, "bad"),
        Err(StoreError::CrossRepository)
    );
    assert_matches!(
        store.create_commit(&test_repo.repo.id, None, Some(&foreign_commit.id), "bad"),
        Err(StoreError::CrossRepository)
    );
}

#[test]
fn test_file_entry_path_is_normalised() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let commit = graph_builder.initial_commit();

    let entry = write_file(store, &commit, "//src//main.ts/", "content");
    assert_eq!(entry.path.as_str(), "/src/main.ts");
    // The normalised path and the raw one address the same row.
    let looked_up = store.file_entry(&commit.id, "src/main.ts").unwrap();
    assert_eq!(looked_up, Some(entry));
}

#[test]
fn test_file_entry_rejects_invalid_paths() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let commit = graph_builder.initial_commit();

    let write = |path: &str| {
        store.write_file_entry(
            &commit.id,
            path,
            FileChange::Write {
                content: String::new(),
            },
        )
    };
    assert_matches!(write(""), Err(StoreError::Path(FilePathError::Empty)));
    assert_matches!(
        write("/a\0b"),
        Err(StoreError::Path(FilePathError::NullByte))
    );
    assert_matches!(
        write("/a\x1fb"),
        Err(StoreError::Path(FilePathError::ControlChar { .. }))
    );
    assert_matches!(
        write("/a?.txt"),
        Err(StoreError::Path(FilePathError::WindowsUnsafe { chr: '?' }))
    );
    assert_matches!(
        write(&"x".repeat(5000)),
        Err(StoreError::Path(FilePathError::TooLong { len: 5000 }))
    );
}

#[test]
fn test_symlink_target_is_normalised() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let commit = graph_builder.initial_commit();

    let entry = write_symlink(store, &commit, "/link.txt", "target.txt");
    assert!(entry.is_symlink);
    assert_eq!(entry.content.as_deref(), Some("/target.txt"));
}

#[test]
fn test_tombstone_has_no_content() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let commit = graph_builder.initial_commit();

    let entry = store
        .write_file_entry(&commit.id, "/x", FileChange::Delete)
        .unwrap();
    assert!(entry.is_deleted);
    assert!(!entry.is_symlink);
    assert_eq!(entry.content, None);
}

#[test]
fn test_file_entry_upsert_keeps_identity() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let commit = graph_builder.initial_commit();

    let first = write_file(store, &commit, "/x", "v1");
    let second = write_file(store, &commit, "/x", "v2");
    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.content.as_deref(), Some("v2"));
    // Still a single row for the (commit, path) pair.
    let entries = strata_lib::snapshot::get_commit_delta(store, &commit.id).unwrap();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_finalized_commit_is_immutable() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let commit1 = graph_builder.initial_commit();
    write_file(store, &commit1, "/x", "v1");
    finalize_commit(store, &commit1.id, &test_repo.main.id).unwrap();

    assert_matches!(
        store.write_file_entry(
            &commit1.id,
            "/y",
            FileChange::Write {
                content: String::new()
            }
        ),
        Err(StoreError::CommitFinalized { .. })
    );

    // Ancestors of a head are immutable too.
    let commit2 = graph_builder.commit_with_parent(&commit1);
    finalize_commit(store, &commit2.id, &test_repo.main.id).unwrap();
    assert_matches!(
        store.write_file_entry(
            &commit1.id,
            "/y",
            FileChange::Write {
                content: String::new()
            }
        ),
        Err(StoreError::CommitFinalized { .. })
    );
}

#[test]
fn test_delete_branch() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let feature = store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
    store.delete_branch(&feature.id).unwrap();
    assert_matches!(
        store.branch(&feature.id),
        Err(StoreError::BranchNotFound { .. })
    );
    // The default branch is protected.
    assert_matches!(
        store.delete_branch(&test_repo.main.id),
        Err(StoreError::DefaultBranchProtected { .. })
    );
}

#[test]
fn test_set_default_branch() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let feature = store
        .create_branch(&test_repo.repo.id, "feature", None)
        .unwrap();
    let repo = store
        .set_default_branch(&test_repo.repo.id, &feature.id)
        .unwrap();
    assert_eq!(repo.default_branch_id, feature.id);
    // The old default branch can be deleted now.
    store.delete_branch(&test_repo.main.id).unwrap();
}

#[test]
fn test_delete_repository_cascades() {
    let test_repo = TestRepo::init();
    let store = &test_repo.store;
    let mut graph_builder = CommitGraphBuilder::new(store, &test_repo.repo.id);
    let commit = graph_builder.initial_commit();
    write_file(store, &commit, "/x", "v1");

    store.delete_repository(&test_repo.repo.id).unwrap();
    assert_matches!(
        store.repository(&test_repo.repo.id),
        Err(StoreError::RepositoryNotFound { .. })
    );
    assert_matches!(
        store.branch(&test_repo.main.id),
        Err(StoreError::BranchNotFound { .. })
    );
    assert_matches!(
        store.commit(&commit.id),
        Err(StoreError::CommitNotFound { .. })
    );
    // The name is free again.
    store.create_repository("test-repo").unwrap();
}
