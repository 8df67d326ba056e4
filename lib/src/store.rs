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

//! The entity store: repositories, branches, commits and file entries, held
//! in indexed in-memory tables with the relational constraints enforced as an
//! explicit trigger layer.
//!
//! Every public operation takes the table lock exactly once for its whole
//! duration, so each call is one serialisable transaction, and the write lock
//! serialises head movements on a branch. Mutating operations validate fully
//! before touching the tables; a returned error therefore implies no state
//! change.

#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use rand::Rng as _;
use smallvec::SmallVec;
use thiserror::Error;

use crate::dag_walk;
use crate::file_path::{FilePath, FilePathError};
use crate::object_id::{id_type, ObjectId};

id_type!(pub RepositoryId);
id_type!(pub BranchId);
id_type!(pub CommitId);
id_type!(pub FileEntryId);

fn random_id<T: ObjectId>() -> T {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes[..]);
    T::new(bytes.to_vec())
}

/// A named collection of branches and commits. Immutable after creation
/// except for the `default_branch_id` pointer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    pub default_branch_id: BranchId,
    pub created_at: DateTime<Utc>,
}

/// A mutable pointer to a commit in the owning repository. A branch never
/// owns commits; a null head means the branch has no history yet.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Branch {
    pub id: BranchId,
    pub repository_id: RepositoryId,
    pub name: String,
    pub head_commit_id: Option<CommitId>,
    pub created_at: DateTime<Utc>,
}

/// A node in the commit DAG. `parent_commit_id` is the primary (overlay)
/// edge; a non-null `merged_from_commit_id` marks a merge commit and names
/// the incoming side.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Commit {
    pub id: CommitId,
    pub repository_id: RepositoryId,
    pub parent_commit_id: Option<CommitId>,
    pub merged_from_commit_id: Option<CommitId>,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Commit {
    pub fn is_merge(&self) -> bool {
        self.merged_from_commit_id.is_some()
    }
}

/// A file-level change recorded at one commit. A tombstone (`is_deleted`)
/// has null content; a symlink stores its normalised absolute target as the
/// content.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FileEntry {
    pub id: FileEntryId,
    pub commit_id: CommitId,
    pub path: FilePath,
    pub content: Option<String>,
    pub is_deleted: bool,
    pub is_symlink: bool,
    pub created_at: DateTime<Utc>,
}

impl FileEntry {
    /// The effective state this entry puts the path into, or `None` for a
    /// tombstone.
    pub fn state(&self) -> Option<FileState> {
        if self.is_deleted {
            None
        } else {
            Some(FileState {
                content: self.content.clone().unwrap_or_default(),
                is_symlink: self.is_symlink,
            })
        }
    }
}

/// A write against a path at some commit. The three shapes make the
/// tombstone/symlink column invariants unrepresentable-if-wrong.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub enum FileChange {
    Write { content: String },
    Symlink { target: String },
    Delete,
}

/// The effective `(is_symlink, content)` pair of a live path. Two states are
/// the same change iff they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct FileState {
    pub content: String,
    pub is_symlink: bool,
}

impl FileState {
    /// Re-expresses this state as the change that would produce it.
    pub fn to_change(&self) -> FileChange {
        if self.is_symlink {
            FileChange::Symlink {
                target: self.content.clone(),
            }
        } else {
            FileChange::Write {
                content: self.content.clone(),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("repository {id} doesn't exist")]
    RepositoryNotFound { id: String },
    #[error("no repository is named {name:?}")]
    RepositoryNameNotFound { name: String },
    #[error("repository name {name:?} is already taken")]
    RepositoryNameTaken { name: String },
    #[error("branch {id} doesn't exist")]
    BranchNotFound { id: String },
    #[error("branch {name:?} already exists in repository {repository_id}")]
    BranchNameTaken {
        repository_id: String,
        name: String,
    },
    #[error("commit {id} doesn't exist")]
    CommitNotFound { id: String },
    #[error("the referenced commits belong to different repositories")]
    CrossRepository,
    #[error("commit {id} is finalized and can no longer be modified")]
    CommitFinalized { id: String },
    #[error("branch {id} is the repository's default branch and cannot be deleted")]
    DefaultBranchProtected { id: String },
    #[error(transparent)]
    Path(#[from] FilePathError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The indexed tables behind [`Store`]. Crate-internal so that the DAG
/// operations can run multi-step reads and writes under a single lock
/// acquisition.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    repositories: BTreeMap<RepositoryId, Repository>,
    repository_names: BTreeMap<String, RepositoryId>,
    branches: BTreeMap<BranchId, Branch>,
    branch_names: BTreeMap<(RepositoryId, String), BranchId>,
    commits: BTreeMap<CommitId, Commit>,
    // (commit_id, path) uniqueness is structural: one inner map per commit.
    file_entries: BTreeMap<CommitId, BTreeMap<FilePath, FileEntry>>,
    // Secondary index for per-path history queries.
    path_index: BTreeMap<(RepositoryId, FilePath), BTreeSet<CommitId>>,
}

impl Tables {
    pub(crate) fn repository(&self, id: &RepositoryId) -> StoreResult<&Repository> {
        self.repositories
            .get(id)
            .ok_or_else(|| StoreError::RepositoryNotFound { id: id.hex() })
    }

    pub(crate) fn branch(&self, id: &BranchId) -> StoreResult<&Branch> {
        self.branches
            .get(id)
            .ok_or_else(|| StoreError::BranchNotFound { id: id.hex() })
    }

    pub(crate) fn commit(&self, id: &CommitId) -> StoreResult<&Commit> {
        self.commits
            .get(id)
            .ok_or_else(|| StoreError::CommitNotFound { id: id.hex() })
    }

    pub(crate) fn entries<'a>(
        &'a self,
        commit_id: &CommitId,
    ) -> impl Iterator<Item = &'a FileEntry> + 'a {
        self.file_entries
            .get(commit_id)
            .into_iter()
            .flat_map(|entries| entries.values())
    }

    pub(crate) fn entry(&self, commit_id: &CommitId, path: &FilePath) -> Option<&FileEntry> {
        self.file_entries.get(commit_id)?.get(path)
    }

    pub(crate) fn commits_touching(
        &self,
        repository_id: &RepositoryId,
        path: &FilePath,
    ) -> Option<&BTreeSet<CommitId>> {
        self.path_index
            .get(&(repository_id.clone(), path.clone()))
    }

    /// Both ancestry edges of a commit: the parent edge, then the merge-from
    /// edge. Empty for roots (and, defensively, for unknown ids).
    pub(crate) fn parent_edges(&self, id: &CommitId) -> SmallVec<[CommitId; 2]> {
        let mut edges = SmallVec::new();
        if let Some(commit) = self.commits.get(id) {
            edges.extend(commit.parent_commit_id.iter().cloned());
            edges.extend(commit.merged_from_commit_id.iter().cloned());
        }
        edges
    }

    /// Whether `ancestor` is reachable from `descendant` over both parent and
    /// merge-from edges. Every commit is an ancestor of itself.
    pub(crate) fn is_ancestor(&self, ancestor: &CommitId, descendant: &CommitId) -> bool {
        dag_walk::dfs(
            [descendant.clone()],
            |id: &CommitId| id.clone(),
            |id| self.parent_edges(id),
        )
        .any(|id| &id == ancestor)
    }

    /// A commit is finalized once it is reachable from any branch head of its
    /// repository; its file entries are immutable from then on.
    pub(crate) fn is_finalized(&self, commit: &Commit) -> bool {
        let heads = self
            .branches
            .values()
            .filter(|branch| branch.repository_id == commit.repository_id)
            .filter_map(|branch| branch.head_commit_id.clone());
        dag_walk::dfs(heads, |id: &CommitId| id.clone(), |id| {
            self.parent_edges(id)
        })
        .any(|id| id == commit.id)
    }

    pub(crate) fn set_head(&mut self, branch_id: &BranchId, head: Option<CommitId>) {
        if let Some(branch) = self.branches.get_mut(branch_id) {
            tracing::debug!(
                branch = %branch.name,
                old_head = ?branch.head_commit_id,
                new_head = ?head,
                "moving branch head"
            );
            branch.head_commit_id = head;
        }
    }

    /// Appends a commit. Referential checks (parents exist and share the
    /// repository) have already passed.
    pub(crate) fn new_commit(
        &mut self,
        repository_id: &RepositoryId,
        parent_commit_id: Option<&CommitId>,
        merged_from_commit_id: Option<&CommitId>,
        message: &str,
    ) -> Commit {
        let commit = Commit {
            id: random_id(),
            repository_id: repository_id.clone(),
            parent_commit_id: parent_commit_id.cloned(),
            merged_from_commit_id: merged_from_commit_id.cloned(),
            message: message.to_owned(),
            created_at: Utc::now(),
        };
        self.commits.insert(commit.id.clone(), commit.clone());
        commit
    }

    /// Inserts or updates the `(commit, path)` row. `path` and any symlink
    /// target are already normalised. Updates keep the row's id and
    /// `created_at`.
    pub(crate) fn put_entry(
        &mut self,
        commit: &Commit,
        path: FilePath,
        change: FileChange,
    ) -> FileEntry {
        let (content, is_deleted, is_symlink) = match change {
            FileChange::Write { content } => (Some(content), false, false),
            FileChange::Symlink { target } => (Some(target), false, true),
            FileChange::Delete => (None, true, false),
        };
        self.path_index
            .entry((commit.repository_id.clone(), path.clone()))
            .or_default()
            .insert(commit.id.clone());
        let entries = self.file_entries.entry(commit.id.clone()).or_default();
        match entries.get_mut(&path) {
            Some(existing) => {
                existing.content = content;
                existing.is_deleted = is_deleted;
                existing.is_symlink = is_symlink;
                existing.clone()
            }
            None => {
                let entry = FileEntry {
                    id: random_id(),
                    commit_id: commit.id.clone(),
                    path: path.clone(),
                    content,
                    is_deleted,
                    is_symlink,
                    created_at: Utc::now(),
                };
                entries.insert(path, entry.clone());
                entry
            }
        }
    }

    fn check_same_repository(
        &self,
        repository_id: &RepositoryId,
        commit_id: &CommitId,
    ) -> StoreResult<()> {
        if &self.commit(commit_id)?.repository_id == repository_id {
            Ok(())
        } else {
            Err(StoreError::CrossRepository)
        }
    }
}

/// The entity store. Cheap to share behind an `Arc`; all methods take
/// `&self`.
#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<Tables>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap()
    }

    /// Creates a repository. A `main` branch with a null head is created
    /// alongside it and becomes the default branch.
    pub fn create_repository(&self, name: &str) -> StoreResult<Repository> {
        let mut tables = self.write();
        if tables.repository_names.contains_key(name) {
            return Err(StoreError::RepositoryNameTaken {
                name: name.to_owned(),
            });
        }
        let now = Utc::now();
        let repository_id: RepositoryId = random_id();
        let branch = Branch {
            id: random_id(),
            repository_id: repository_id.clone(),
            name: String::from("main"),
            head_commit_id: None,
            created_at: now,
        };
        let repository = Repository {
            id: repository_id.clone(),
            name: name.to_owned(),
            default_branch_id: branch.id.clone(),
            created_at: now,
        };
        tables
            .repository_names
            .insert(name.to_owned(), repository_id.clone());
        tables
            .branch_names
            .insert((repository_id.clone(), branch.name.clone()), branch.id.clone());
        tables.branches.insert(branch.id.clone(), branch);
        tables
            .repositories
            .insert(repository_id, repository.clone());
        Ok(repository)
    }

    pub fn repository(&self, id: &RepositoryId) -> StoreResult<Repository> {
        self.read().repository(id).cloned()
    }

    pub fn repository_by_name(&self, name: &str) -> StoreResult<Repository> {
        let tables = self.read();
        let id = tables
            .repository_names
            .get(name)
            .ok_or_else(|| StoreError::RepositoryNameNotFound {
                name: name.to_owned(),
            })?;
        tables.repository(id).cloned()
    }

    pub fn repositories(&self) -> Vec<Repository> {
        self.read().repositories.values().cloned().collect()
    }

    /// Removes a repository and everything it owns: branches, commits and
    /// file entries.
    pub fn delete_repository(&self, id: &RepositoryId) -> StoreResult<()> {
        let mut tables = self.write();
        let repository = tables.repository(id)?.clone();
        tables.repository_names.remove(&repository.name);
        tables.repositories.remove(id);
        tables.branches.retain(|_, branch| &branch.repository_id != id);
        tables.branch_names.retain(|(repo, _), _| repo != id);
        let commit_ids: Vec<CommitId> = tables
            .commits
            .values()
            .filter(|commit| &commit.repository_id == id)
            .map(|commit| commit.id.clone())
            .collect();
        for commit_id in &commit_ids {
            tables.commits.remove(commit_id);
            tables.file_entries.remove(commit_id);
        }
        tables.path_index.retain(|(repo, _), _| repo != id);
        Ok(())
    }

    /// Points `default_branch_id` at another branch of the same repository.
    pub fn set_default_branch(
        &self,
        repository_id: &RepositoryId,
        branch_id: &BranchId,
    ) -> StoreResult<Repository> {
        let mut tables = self.write();
        let branch = tables.branch(branch_id)?;
        if &branch.repository_id != repository_id {
            return Err(StoreError::CrossRepository);
        }
        let Some(repository) = tables.repositories.get_mut(repository_id) else {
            return Err(StoreError::RepositoryNotFound {
                id: repository_id.hex(),
            });
        };
        repository.default_branch_id = branch_id.clone();
        Ok(repository.clone())
    }

    /// Creates a branch. With a null `head_commit_id` the head defaults to
    /// the repository's current default-branch head (which may itself be
    /// null). Creating a branch never creates a commit.
    pub fn create_branch(
        &self,
        repository_id: &RepositoryId,
        name: &str,
        head_commit_id: Option<CommitId>,
    ) -> StoreResult<Branch> {
        let mut tables = self.write();
        let repository = tables.repository(repository_id)?.clone();
        let name_key = (repository_id.clone(), name.to_owned());
        if tables.branch_names.contains_key(&name_key) {
            return Err(StoreError::BranchNameTaken {
                repository_id: repository_id.hex(),
                name: name.to_owned(),
            });
        }
        let head_commit_id = match head_commit_id {
            Some(id) => {
                tables.check_same_repository(repository_id, &id)?;
                Some(id)
            }
            None => tables
                .branch(&repository.default_branch_id)?
                .head_commit_id
                .clone(),
        };
        let branch = Branch {
            id: random_id(),
            repository_id: repository_id.clone(),
            name: name.to_owned(),
            head_commit_id,
            created_at: Utc::now(),
        };
        tables.branch_names.insert(name_key, branch.id.clone());
        tables.branches.insert(branch.id.clone(), branch.clone());
        Ok(branch)
    }

    pub fn branch(&self, id: &BranchId) -> StoreResult<Branch> {
        self.read().branch(id).cloned()
    }

    pub fn branches(&self, repository_id: &RepositoryId) -> StoreResult<Vec<Branch>> {
        let tables = self.read();
        tables.repository(repository_id)?;
        Ok(tables
            .branches
            .values()
            .filter(|branch| &branch.repository_id == repository_id)
            .cloned()
            .collect())
    }

    /// Repoints a branch head. The commit must belong to the branch's
    /// repository; a null head empties the branch.
    pub fn set_branch_head(
        &self,
        branch_id: &BranchId,
        head_commit_id: Option<&CommitId>,
    ) -> StoreResult<Branch> {
        let mut tables = self.write();
        let branch = tables.branch(branch_id)?.clone();
        if let Some(commit_id) = head_commit_id {
            tables.check_same_repository(&branch.repository_id, commit_id)?;
        }
        tables.set_head(branch_id, head_commit_id.cloned());
        tables.branch(branch_id).cloned()
    }

    /// Deletes a branch. The repository's default branch is protected; the
    /// commits the branch pointed to are kept.
    pub fn delete_branch(&self, id: &BranchId) -> StoreResult<()> {
        let mut tables = self.write();
        let branch = tables.branch(id)?.clone();
        let repository = tables.repository(&branch.repository_id)?;
        if repository.default_branch_id == branch.id {
            return Err(StoreError::DefaultBranchProtected { id: id.hex() });
        }
        tables
            .branch_names
            .remove(&(branch.repository_id, branch.name));
        tables.branches.remove(id);
        Ok(())
    }

    /// Appends a commit to the DAG. Parents must already exist in the same
    /// repository, which keeps the graph acyclic.
    pub fn create_commit(
        &self,
        repository_id: &RepositoryId,
        parent_commit_id: Option<&CommitId>,
        merged_from_commit_id: Option<&CommitId>,
        message: &str,
    ) -> StoreResult<Commit> {
        let mut tables = self.write();
        tables.repository(repository_id)?;
        for commit_id in parent_commit_id.iter().chain(merged_from_commit_id.iter()) {
            tables.check_same_repository(repository_id, commit_id)?;
        }
        Ok(tables.new_commit(
            repository_id,
            parent_commit_id,
            merged_from_commit_id,
            message,
        ))
    }

    pub fn commit(&self, id: &CommitId) -> StoreResult<Commit> {
        self.read().commit(id).cloned()
    }

    /// Records a file-level change on a commit, normalising the path (and a
    /// symlink's target) first. Re-writing a path on the same commit updates
    /// the row in place. Commits already reachable from a branch head are
    /// immutable.
    pub fn write_file_entry(
        &self,
        commit_id: &CommitId,
        path: &str,
        change: FileChange,
    ) -> StoreResult<FileEntry> {
        let mut tables = self.write();
        let commit = tables.commit(commit_id)?.clone();
        let path = FilePath::parse(path)?;
        let change = match change {
            FileChange::Symlink { target } => FileChange::Symlink {
                target: FilePath::parse(&target)?.into_string(),
            },
            change => change,
        };
        if tables.is_finalized(&commit) {
            return Err(StoreError::CommitFinalized {
                id: commit_id.hex(),
            });
        }
        Ok(tables.put_entry(&commit, path, change))
    }

    /// Looks up the entry recorded for `path` at exactly `commit_id` (no
    /// ancestry).
    pub fn file_entry(
        &self,
        commit_id: &CommitId,
        path: &str,
    ) -> StoreResult<Option<FileEntry>> {
        let tables = self.read();
        tables.commit(commit_id)?;
        let path = FilePath::parse(path)?;
        Ok(tables.entry(commit_id, &path).cloned())
    }
}
