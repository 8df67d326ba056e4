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

#![allow(missing_docs)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use strata_lib::store::{
    Branch, Commit, FileChange, FileEntry, Repository, RepositoryId, Store,
};

pub fn new_store() -> Arc<Store> {
    Arc::new(Store::new())
}

/// A freshly created repository together with its auto-created default
/// branch.
pub struct TestRepo {
    pub store: Arc<Store>,
    pub repo: Repository,
    pub main: Branch,
}

impl TestRepo {
    pub fn init() -> Self {
        let store = new_store();
        let repo = store.create_repository("test-repo").unwrap();
        let main = store.branch(&repo.default_branch_id).unwrap();
        TestRepo { store, repo, main }
    }
}

pub struct CommitGraphBuilder<'store> {
    store: &'store Store,
    repository_id: RepositoryId,
    commit_count: usize,
}

impl<'store> CommitGraphBuilder<'store> {
    pub fn new(store: &'store Store, repository_id: &RepositoryId) -> Self {
        CommitGraphBuilder {
            store,
            repository_id: repository_id.clone(),
            commit_count: 0,
        }
    }

    fn next_message(&mut self) -> String {
        self.commit_count += 1;
        format!("commit {}", self.commit_count)
    }

    pub fn initial_commit(&mut self) -> Commit {
        let message = self.next_message();
        self.store
            .create_commit(&self.repository_id, None, None, &message)
            .unwrap()
    }

    pub fn commit_with_parent(&mut self, parent: &Commit) -> Commit {
        let message = self.next_message();
        self.store
            .create_commit(&self.repository_id, Some(&parent.id), None, &message)
            .unwrap()
    }

    pub fn merge_commit(&mut self, parent: &Commit, source: &Commit) -> Commit {
        let message = self.next_message();
        self.store
            .create_commit(
                &self.repository_id,
                Some(&parent.id),
                Some(&source.id),
                &message,
            )
            .unwrap()
    }
}

pub fn write_file(store: &Store, commit: &Commit, path: &str, content: &str) -> FileEntry {
    store
        .write_file_entry(
            &commit.id,
            path,
            FileChange::Write {
                content: content.to_owned(),
            },
        )
        .unwrap()
}

pub fn write_symlink(store: &Store, commit: &Commit, path: &str, target: &str) -> FileEntry {
    store
        .write_file_entry(
            &commit.id,
            path,
            FileChange::Symlink {
                target: target.to_owned(),
            },
        )
        .unwrap()
}

pub fn delete_file(store: &Store, commit: &Commit, path: &str) -> FileEntry {
    store
        .write_file_entry(&commit.id, path, FileChange::Delete)
        .unwrap()
}

pub fn assert_no_forgotten_test_files(test_dir: &Path) {
    let runner_path = test_dir.join("runner.rs");
    let runner = fs::read_to_string(&runner_path).unwrap();
    let entries = fs::read_dir(test_dir).unwrap();
    for entry in entries {
        let path = entry.unwrap().path();
        if let Some(ext) = path.extension() {
            let name = path.file_stem().unwrap();
            if ext == "rs" && name != "runner" {
                let search = format!("mod {};", name.to_str().unwrap());
                assert!(
                    runner.contains(&search),
                    "missing `{search}` declaration in {}",
                    runner_path.display()
                );
            }
        }
    }
}
