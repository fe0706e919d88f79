//! Dependency graph over the active task set.
//!
//! Built on demand from a store snapshot; nothing here is cached between
//! operations, so correctness depends only on the tasks passed in.

use std::collections::{HashMap, HashSet};

use mission_core::{Task, TaskId, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Ready/blocked split of the `todo` tasks.
#[derive(Debug, Clone, Default)]
pub struct ReadyPartition {
    /// Ready tasks, priority descending then creation time ascending,
    /// with `blocked_by` cleared.
    pub ready: Vec<Task>,
    /// Remaining `todo` tasks in file order with `blocked_by` populated.
    pub blocked: Vec<Task>,
}

/// Point-in-time view of the active set.
#[derive(Debug, Clone)]
pub struct GraphView {
    tasks: Vec<Task>,
    by_id: HashMap<TaskId, usize>,
}

impl GraphView {
    pub fn build(tasks: Vec<Task>) -> Self {
        let by_id = tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| (task.id.clone(), idx))
            .collect();
        Self { tasks, by_id }
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.by_id.get(id).map(|idx| &self.tasks[*idx])
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Unresolved dependencies of `task`: ids that are missing from the
    /// active set or whose referent is not `done`. First-occurrence order,
    /// duplicates collapsed.
    pub fn blockers_of(&self, task: &Task) -> Vec<TaskId> {
        let mut seen = HashSet::new();
        task.depends_on
            .iter()
            .filter(|dep| seen.insert((*dep).clone()))
            .filter(|dep| {
                self.get(dep)
                    .map(|referent| !referent.status.is_done())
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    /// A task is ready iff it is `todo` and every dependency exists and is
    /// `done`. A missing referent blocks, it never readies.
    pub fn partition_ready(&self) -> ReadyPartition {
        let mut partition = ReadyPartition::default();
        for task in &self.tasks {
            if task.status != TaskStatus::Todo {
                continue;
            }
            let blockers = self.blockers_of(task);
            let mut task = task.clone();
            if blockers.is_empty() {
                task.blocked_by = Vec::new();
                partition.ready.push(task);
            } else {
                task.blocked_by = blockers;
                partition.blocked.push(task);
            }
        }
        partition.ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.metadata.created_at.cmp(&b.metadata.created_at))
        });
        partition
    }

    pub fn ready_tasks(&self) -> Vec<Task> {
        self.partition_ready().ready
    }

    /// Every `todo` task with at least one unresolved dependency, paired
    /// with the unresolved ids in `depends_on` order.
    pub fn blocked_tasks(&self) -> Vec<(Task, Vec<TaskId>)> {
        self.partition_ready()
            .blocked
            .into_iter()
            .map(|task| {
                let blockers = task.blocked_by.clone();
                (task, blockers)
            })
            .collect()
    }

    /// Three-color DFS cycle detection, then a dangling-reference walk.
    /// Returns `(ok, errors)` where `ok` is true iff `errors` is empty.
    pub fn check_consistency(&self) -> (bool, Vec<String>) {
        let mut errors = Vec::new();
        let mut color: HashMap<&TaskId, Color> =
            self.tasks.iter().map(|t| (&t.id, Color::White)).collect();
        let mut path: Vec<TaskId> = Vec::new();

        for task in &self.tasks {
            if color[&task.id] == Color::White {
                self.visit_cycles(&task.id, &mut color, &mut path, &mut errors);
            }
        }

        for task in &self.tasks {
            let mut seen = HashSet::new();
            for dep in &task.depends_on {
                if seen.insert(dep.clone()) && !self.contains(dep) {
                    errors.push(format!(
                        "Task '{}' depends on non-existent task '{}'",
                        task.id, dep
                    ));
                }
            }
        }

        (errors.is_empty(), errors)
    }

    fn visit_cycles<'a>(
        &'a self,
        id: &'a TaskId,
        color: &mut HashMap<&'a TaskId, Color>,
        path: &mut Vec<TaskId>,
        errors: &mut Vec<String>,
    ) {
        let Some(task) = self.get(id) else {
            return;
        };
        color.insert(id, Color::Gray);
        path.push(id.clone());

        let mut seen = HashSet::new();
        for dep in &task.depends_on {
            if !seen.insert(dep) {
                continue;
            }
            let Some(dep_key) = self.by_id.get_key_value(dep).map(|(key, _)| key) else {
                continue; // missing referents are reported by the dangling walk
            };
            match color[dep_key] {
                Color::White => self.visit_cycles(dep_key, color, path, errors),
                Color::Gray => {
                    // Back-edge: the cycle is the path slice from the first
                    // occurrence of the target, closed back on itself.
                    if let Some(start) = path.iter().position(|node| node == dep) {
                        let mut cycle: Vec<&str> =
                            path[start..].iter().map(|node| node.as_ref()).collect();
                        cycle.push(dep.as_ref());
                        errors.push(format!(
                            "Circular dependency detected: {}",
                            cycle.join(" -> ")
                        ));
                    }
                }
                Color::Black => {}
            }
        }

        path.pop();
        color.insert(id, Color::Black);
    }

    /// Topological chain for `id`: dependencies before dependents, the
    /// requested task last. Post-order DFS, each node emitted once;
    /// missing referents are skipped.
    pub fn chain(&self, id: &TaskId) -> Option<Vec<Task>> {
        if !self.contains(id) {
            return None;
        }
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        self.visit_post(id, &mut visited, &mut out);
        Some(out)
    }

    fn visit_post(&self, id: &TaskId, visited: &mut HashSet<TaskId>, out: &mut Vec<Task>) {
        if !visited.insert(id.clone()) {
            return;
        }
        let Some(task) = self.get(id) else {
            return;
        };
        for dep in &task.depends_on {
            self.visit_post(dep, visited, out);
        }
        out.push(task.clone());
    }

    /// Direct successors of `id`: active tasks listing it in `depends_on`.
    /// Not the transitive closure.
    pub fn dependents(&self, id: &TaskId) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|task| task.depends_on.contains(id))
            .cloned()
            .collect()
    }
}
