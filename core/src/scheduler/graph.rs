//! Dependency graph over the submission list.
//!
//! Tasks are addressed by their submission index; the graph keeps an
//! in-degree counter and a dependents list per task so readiness is
//! maintained incrementally, never recomputed.

use std::collections::HashMap;

use crate::batch::TaskSpec;
use crate::error::ConfigError;

#[derive(Debug)]
pub struct TaskGraph {
    /// task id -> submission index
    pub index_of: HashMap<String, usize>,
    /// per task: number of unfinished dependencies
    pub in_degree: Vec<usize>,
    /// per task: indices of tasks that depend on it
    pub dependents: Vec<Vec<usize>>,
    /// per task: indices of its dependencies
    pub deps: Vec<Vec<usize>>,
}

impl TaskGraph {
    /// Build and validate the graph. Rejects duplicate ids, unknown
    /// dependencies, and cycles before any task starts.
    pub fn build(tasks: &[TaskSpec]) -> Result<Self, ConfigError> {
        let mut index_of = HashMap::with_capacity(tasks.len());
        for (i, t) in tasks.iter().enumerate() {
            if index_of.insert(t.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicateId(t.id.clone()));
            }
        }

        let mut in_degree = vec![0usize; tasks.len()];
        let mut dependents = vec![Vec::new(); tasks.len()];
        let mut deps = vec![Vec::new(); tasks.len()];

        for (i, t) in tasks.iter().enumerate() {
            for dep in &t.dependencies {
                let Some(&d) = index_of.get(dep.as_str()) else {
                    return Err(ConfigError::UnknownDependency {
                        task: t.id.clone(),
                        dep: dep.clone(),
                    });
                };
                in_degree[i] += 1;
                dependents[d].push(i);
                deps[i].push(d);
            }
        }

        let graph = Self {
            index_of,
            in_degree,
            dependents,
            deps,
        };
        graph.reject_cycles(tasks)?;
        Ok(graph)
    }

    /// DFS cycle check; the error carries the offending path, e.g.
    /// `cycle detected: A -> B -> A`.
    fn reject_cycles(&self, tasks: &[TaskSpec]) -> Result<(), ConfigError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Grey,
            Black,
        }

        fn dfs(
            node: usize,
            deps: &[Vec<usize>],
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            marks[node] = Mark::Grey;
            stack.push(node);

            for &dep in &deps[node] {
                match marks[dep] {
                    Mark::Grey => {
                        let pos = stack.iter().position(|&n| n == dep).unwrap_or(0);
                        let mut cycle = stack[pos..].to_vec();
                        cycle.push(dep);
                        return Some(cycle);
                    }
                    Mark::White => {
                        if let Some(cycle) = dfs(dep, deps, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Black => {}
                }
            }

            stack.pop();
            marks[node] = Mark::Black;
            None
        }

        let mut marks = vec![Mark::White; tasks.len()];
        for start in 0..tasks.len() {
            if marks[start] != Mark::White {
                continue;
            }
            let mut stack = Vec::new();
            if let Some(cycle) = dfs(start, &self.deps, &mut marks, &mut stack) {
                let path = cycle
                    .iter()
                    .map(|&i| tasks[i].id.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(ConfigError::CircularDependency(path));
            }
        }
        Ok(())
    }

    /// Submission indices with no dependencies, in submission order.
    pub fn initially_ready(&self) -> Vec<usize> {
        self.in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect()
    }
}
