// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Lineage Traversal
//!
//! The catalog induces a DAG: tasks point upstream at their argument
//! entries and downstream at their outputs; deferred plans weave unrun
//! tasks and virtual resources into the same graph. Traversal is a
//! depth-first walk with a distance bound, per-node include and
//! continue-search predicates, and an optional target whitelist. Every
//! entry is visited at most once.
//!
//! Neighbor relations:
//!
//! - Resource / FileResource -> producing task (upstream); consuming
//!   tasks and unrun tasks (downstream)
//! - Task -> argument resources, files, pipes, and the pipe it ran
//!   (upstream); outputs (downstream)
//! - UnrunTask -> argument entries including virtual resources, and the
//!   planned pipe (upstream); output placeholders (downstream)
//! - VirtualResource -> producing unrun tasks (upstream); consuming
//!   unrun tasks (downstream)
//! - Pipe -> tasks and unrun tasks that run it or take it as an
//!   argument (downstream only)

use std::collections::{HashMap, HashSet};

use petgraph::graph::DiGraph;

use rms_domain::value_objects::TaskId;
use rms_domain::{ArgValue, Entry, FullId, PlanArg, RmsEntry, RmsError};

use super::search::IoKind;
use super::Registry;

/// Options for a lineage walk.
///
/// The default visits the entire reachable set: unlimited distance, no
/// predicates, no target whitelist.
pub struct Traversal {
    /// Maximum number of edges to follow; negative means unlimited.
    pub distance: i64,
    /// Entries failing this predicate are skipped (and not traversed
    /// through).
    pub include: Option<Box<dyn Fn(&Entry) -> bool + Send + Sync>>,
    /// Entries failing this predicate are collected but not traversed
    /// through.
    pub continue_search: Option<Box<dyn Fn(&Entry) -> bool + Send + Sync>>,
    /// When set, only these entries are eligible neighbors.
    pub targets: Option<Vec<FullId>>,
}

impl Default for Traversal {
    fn default() -> Self {
        Self {
            distance: -1,
            include: None,
            continue_search: None,
            targets: None,
        }
    }
}

impl Traversal {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_distance(distance: i64) -> Self {
        Self {
            distance,
            ..Self::default()
        }
    }

    pub fn include(mut self, predicate: impl Fn(&Entry) -> bool + Send + Sync + 'static) -> Self {
        self.include = Some(Box::new(predicate));
        self
    }

    pub fn continue_search(
        mut self,
        predicate: impl Fn(&Entry) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.continue_search = Some(Box::new(predicate));
        self
    }

    pub fn targets(mut self, targets: Vec<FullId>) -> Self {
        self.targets = Some(targets);
        self
    }

    fn includes(&self, entry: &Entry) -> bool {
        self.include.as_ref().map_or(true, |p| p(entry))
    }

    fn continues(&self, entry: &Entry) -> bool {
        self.continue_search.as_ref().map_or(true, |p| p(entry))
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Upstream,
    Downstream,
    Connected,
}

impl Registry {
    /// Entries reachable by following producer edges from the seeds.
    pub async fn find_upstream(
        &self,
        seeds: &[FullId],
        options: &Traversal,
    ) -> Result<HashSet<FullId>, RmsError> {
        self.traverse(Direction::Upstream, seeds, options).await
    }

    /// Entries reachable by following consumer edges from the seeds.
    pub async fn find_downstream(
        &self,
        seeds: &[FullId],
        options: &Traversal,
    ) -> Result<HashSet<FullId>, RmsError> {
        self.traverse(Direction::Downstream, seeds, options).await
    }

    /// Entries reachable in either direction from the seeds.
    pub async fn find_connected(
        &self,
        seeds: &[FullId],
        options: &Traversal,
    ) -> Result<HashSet<FullId>, RmsError> {
        self.traverse(Direction::Connected, seeds, options).await
    }

    async fn traverse(
        &self,
        direction: Direction,
        seeds: &[FullId],
        options: &Traversal,
    ) -> Result<HashSet<FullId>, RmsError> {
        let mut visited: HashSet<FullId> = HashSet::new();
        let mut pool: Vec<(FullId, i64)> =
            seeds.iter().map(|s| (s.clone(), options.distance)).collect();

        while let Some((full_id, distance)) = pool.pop() {
            if distance == 0 {
                continue;
            }
            let next_distance = if distance > 0 { distance - 1 } else { distance };
            for neighbor in self.neighbors(direction, &full_id, options.targets.as_deref()).await? {
                if visited.contains(&neighbor) {
                    continue;
                }
                let entry = self.get(&neighbor, false).await?;
                if options.includes(&entry) {
                    visited.insert(neighbor.clone());
                    if options.continues(&entry) {
                        pool.push((neighbor, next_distance));
                    }
                }
            }
        }
        Ok(visited)
    }

    async fn neighbors(
        &self,
        direction: Direction,
        full_id: &FullId,
        targets: Option<&[FullId]>,
    ) -> Result<Vec<FullId>, RmsError> {
        let mut neighbors = match direction {
            Direction::Upstream => self.upstream_neighbors(full_id).await?,
            Direction::Downstream => self.downstream_neighbors(full_id, targets).await?,
            Direction::Connected => {
                let mut all = self.upstream_neighbors(full_id).await?;
                all.extend(self.downstream_neighbors(full_id, targets).await?);
                all
            }
        };
        if let Some(targets) = targets {
            neighbors.retain(|n| targets.contains(n));
        }
        // De-duplicate while preserving discovery order.
        let mut seen = HashSet::new();
        neighbors.retain(|n| seen.insert(n.clone()));
        Ok(neighbors)
    }

    async fn upstream_neighbors(&self, full_id: &FullId) -> Result<Vec<FullId>, RmsError> {
        match full_id {
            FullId::Resource(rid) => {
                let resource = self.get_resource(rid, false).await?;
                Ok(resource
                    .task_id
                    .map(|tid| vec![FullId::Task(tid)])
                    .unwrap_or_default())
            }
            FullId::FileResource(fid) => {
                let file = self.get_file_resource(fid, false).await?;
                Ok(file
                    .task_id
                    .map(|tid| vec![FullId::Task(tid)])
                    .unwrap_or_default())
            }
            FullId::Task(tid) => {
                let task = self.get_task(tid, false).await?;
                let mut inputs = task.input_entries();
                inputs.push(FullId::Pipe(task.pipe_id));
                Ok(inputs)
            }
            FullId::UnrunTask(uid) => {
                let unrun = self.get_unrun_task(uid)?;
                let mut inputs = unrun.input_entries();
                inputs.push(FullId::Pipe(unrun.pipe_id));
                Ok(inputs)
            }
            FullId::VirtualResource(vid) => {
                let caches = self.caches.read();
                Ok(caches
                    .unrun_tasks
                    .values()
                    .filter(|u| u.produces(vid))
                    .map(|u| FullId::UnrunTask(u.id.clone()))
                    .collect())
            }
            FullId::Pipe(_) => Ok(Vec::new()),
        }
    }

    async fn downstream_neighbors(
        &self,
        full_id: &FullId,
        targets: Option<&[FullId]>,
    ) -> Result<Vec<FullId>, RmsError> {
        let target_tids: Option<Vec<TaskId>> = targets.map(|ts| {
            ts.iter()
                .filter_map(|t| match t {
                    FullId::Task(tid) => Some(tid.clone()),
                    _ => None,
                })
                .collect()
        });
        match full_id {
            FullId::FileResource(fid) => Ok(self
                .find_tasks_by_io(
                    IoKind::Input,
                    std::slice::from_ref(fid),
                    &[],
                    &[],
                    target_tids.as_deref(),
                )
                .await?
                .into_iter()
                .map(|t| t.full_id())
                .collect()),
            FullId::Resource(rid) => {
                let mut found: Vec<FullId> = self
                    .find_tasks_by_io(
                        IoKind::Input,
                        &[],
                        std::slice::from_ref(rid),
                        &[],
                        target_tids.as_deref(),
                    )
                    .await?
                    .into_iter()
                    .map(|t| t.full_id())
                    .collect();
                let caches = self.caches.read();
                found.extend(
                    caches
                        .unrun_tasks
                        .values()
                        .filter(|u| {
                            u.binding.values().any(|a| {
                                matches!(a, PlanArg::Concrete(ArgValue::ResourceRef(r)) if r == rid)
                            })
                        })
                        .map(|u| FullId::UnrunTask(u.id.clone())),
                );
                Ok(found)
            }
            FullId::Task(tid) => {
                let task = self.get_task(tid, false).await?;
                Ok(task.output_entries())
            }
            FullId::UnrunTask(uid) => {
                let unrun = self.get_unrun_task(uid)?;
                Ok(unrun.output_entries())
            }
            FullId::VirtualResource(vid) => {
                let caches = self.caches.read();
                Ok(caches
                    .unrun_tasks
                    .values()
                    .filter(|u| u.consumes(vid))
                    .map(|u| FullId::UnrunTask(u.id.clone()))
                    .collect())
            }
            FullId::Pipe(pid) => {
                let mut found: Vec<FullId> = self
                    .find_tasks_by_io(
                        IoKind::Input,
                        &[],
                        &[],
                        std::slice::from_ref(pid),
                        target_tids.as_deref(),
                    )
                    .await?
                    .into_iter()
                    .map(|t| t.full_id())
                    .collect();
                found.extend(
                    self.find_tasks_by_pipe(std::slice::from_ref(pid))
                        .await?
                        .into_iter()
                        .map(|t| t.full_id()),
                );
                let caches = self.caches.read();
                found.extend(
                    caches
                        .unrun_tasks
                        .values()
                        .filter(|u| {
                            u.pipe_id == *pid
                                || u.binding.values().any(|a| {
                                    matches!(a, PlanArg::Concrete(ArgValue::PipeRef(p)) if p == pid)
                                })
                        })
                        .map(|u| FullId::UnrunTask(u.id.clone())),
                );
                Ok(found)
            }
        }
    }

    /// Builds the directed lineage graph induced by the given entries:
    /// an edge per 1-step upstream relation whose both ends are in the
    /// set.
    pub async fn lineage_graph(
        &self,
        members: &[FullId],
    ) -> Result<DiGraph<FullId, ()>, RmsError> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        for member in members {
            let index = graph.add_node(member.clone());
            indices.insert(member.clone(), index);
        }
        for member in members {
            // Finding upstream is much cheaper than downstream here.
            let upstream = self
                .find_upstream(std::slice::from_ref(member), &Traversal::with_distance(1))
                .await?;
            for up in upstream {
                if let Some(&from) = indices.get(&up) {
                    graph.add_edge(from, indices[member], ());
                }
            }
        }
        Ok(graph)
    }
}
