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

//! Strata is an embedded, versioned virtual filesystem. State is organised as
//! a content-overlay DAG of commits: every commit records file-level changes
//! (writes, symlinks, tombstone deletions), and a file's effective state at a
//! commit is resolved by walking ancestry. Branches are mutable pointers into
//! the DAG; history is composed with three-way merges and linear rebases.

#![deny(unused_must_use)]

pub mod conflicts;
pub mod dag_walk;
pub mod file_path;
pub mod history;
pub mod merge;
pub mod merge_base;
pub mod object_id;
pub mod rebase;
pub mod snapshot;
pub mod store;
