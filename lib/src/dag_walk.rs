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

//! General-purpose DAG algorithms.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::iter;

/// Traverses nodes from `start` in depth-first order.
///
/// Each node is visited at most once; the visited set also bounds the walk
/// on graphs that (illegally) contain cycles.
pub fn dfs<T, ID, II, NI>(
    start: II,
    id_fn: impl Fn(&T) -> ID,
    mut neighbors_fn: impl FnMut(&T) -> NI,
) -> impl Iterator<Item = T>
where
    ID: Hash + Eq,
    II: IntoIterator<Item = T>,
    NI: IntoIterator<Item = T>,
{
    let mut work: Vec<T> = start.into_iter().collect();
    let mut visited: HashSet<ID> = HashSet::new();
    iter::from_fn(move || loop {
        let c = work.pop()?;
        let id = id_fn(&c);
        if visited.contains(&id) {
            continue;
        }
        for p in neighbors_fn(&c) {
            work.push(p);
        }
        visited.insert(id);
        return Some(c);
    })
}

/// Computes the minimum edge distance from `start` to every reachable node,
/// including `start` itself at distance zero.
pub fn bfs_distances<ID, NI>(
    start: ID,
    mut neighbors_fn: impl FnMut(&ID) -> NI,
) -> HashMap<ID, usize>
where
    ID: Hash + Eq + Clone,
    NI: IntoIterator<Item = ID>,
{
    let mut distances = HashMap::new();
    let mut queue = VecDeque::new();
    distances.insert(start.clone(), 0);
    queue.push_back(start);
    while let Some(node) = queue.pop_front() {
        let distance = distances[&node];
        for neighbor in neighbors_fn(&node) {
            if !distances.contains_key(&neighbor) {
                distances.insert(neighbor.clone(), distance + 1);
                queue.push_back(neighbor);
            }
        }
    }
    distances
}

/// Finds the node reachable from both `a` and `b` with the smallest combined
/// distance to the two. Ties are broken towards the candidate closer to `a`,
/// then towards the smallest id, so the result is deterministic on any DAG.
/// Returns `None` when `a` and `b` share no reachable node.
pub fn closest_common_node<ID, NI>(
    a: ID,
    b: ID,
    mut neighbors_fn: impl FnMut(&ID) -> NI,
) -> Option<ID>
where
    ID: Hash + Eq + Ord + Clone,
    NI: IntoIterator<Item = ID>,
{
    let distances_a = bfs_distances(a, &mut neighbors_fn);
    let distances_b = bfs_distances(b, &mut neighbors_fn);
    distances_a
        .iter()
        .filter_map(|(id, dist_a)| {
            distances_b
                .get(id)
                .map(|dist_b| (dist_a + dist_b, *dist_a, id))
        })
        .min()
        .map(|(_, _, id)| id.clone())
}
