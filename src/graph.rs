use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use crate::{CompletionSet, DagError, TaskId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("task '{0}' is defined more than once")]
    DuplicateTask(TaskId),
    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskId, dependency: TaskId },
    #[error("circular dependency among tasks {tasks:?}")]
    Cycle { tasks: Vec<TaskId> },
}

/// Validated, immutable dependency structure over task identifiers.
///
/// Construction rejects dangling references and cycles, so every query on a
/// built graph can assume a well-formed DAG.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    dependencies: BTreeMap<TaskId, Vec<TaskId>>,
    dependents: BTreeMap<TaskId, Vec<TaskId>>,
    in_degrees: BTreeMap<TaskId, usize>,
}

impl TaskGraph {
    /// Build a graph from `(task, dependencies)` pairs.
    ///
    /// Repeated dependencies within one list are collapsed. Fails with
    /// [`DagError::InvalidGraph`] on duplicate task keys, unknown
    /// dependencies or cycles.
    pub fn build<I, K, D, S>(map: I) -> Result<Self, DagError>
    where
        I: IntoIterator<Item = (K, D)>,
        K: Into<TaskId>,
        D: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        let mut dependencies: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
        for (task, deps) in map {
            let task = task.into();
            let deps: BTreeSet<TaskId> = deps.into_iter().map(Into::into).collect();
            if dependencies.contains_key(&task) {
                return Err(GraphError::DuplicateTask(task).into());
            }
            dependencies.insert(task, deps.into_iter().collect());
        }

        let mut in_degrees = BTreeMap::new();
        let mut dependents: BTreeMap<TaskId, Vec<TaskId>> = dependencies
            .keys()
            .map(|name| (name.clone(), Vec::new()))
            .collect();

        for (name, deps) in &dependencies {
            in_degrees.insert(name.clone(), deps.len());

            for dep in deps {
                match dependents.get_mut(dep) {
                    Some(children) => children.push(name.clone()),
                    None => {
                        return Err(GraphError::UnknownDependency {
                            task: name.clone(),
                            dependency: dep.clone(),
                        }
                        .into());
                    }
                }
            }
        }

        let graph = Self { dependencies, dependents, in_degrees };
        graph.check_acyclic()?;
        Ok(graph)
    }

    /// Parse a JSON dependency document such as `{"B": ["A"], "A": []}`.
    pub fn from_json(document: &str) -> Result<Self, DagError> {
        let map: BTreeMap<TaskId, Vec<TaskId>> = serde_json::from_str(document)?;
        Self::build(map)
    }

    // Any task that Kahn's algorithm never releases sits on (or behind) a cycle.
    fn check_acyclic(&self) -> Result<(), GraphError> {
        let mut order = self.topological_order();
        let visited = order.by_ref().count();
        if visited == self.len() {
            return Ok(());
        }

        let tasks = order
            .remaining
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(name, _)| name.to_string())
            .collect();
        Err(GraphError::Cycle { tasks })
    }

    /// Kahn ordering, ties broken by ascending task id.
    ///
    /// Each call starts a fresh traversal, so the order can be consumed
    /// any number of times.
    pub fn topological_order(&self) -> TopologicalOrder<'_> {
        let remaining: BTreeMap<&str, usize> = self
            .in_degrees
            .iter()
            .map(|(name, degree)| (name.as_str(), *degree))
            .collect();
        let ready = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        TopologicalOrder { graph: self, remaining, ready }
    }

    pub fn dependencies_of(&self, task: &str) -> &[TaskId] {
        self.dependencies
            .get(task)
            .map(|deps| deps.as_slice())
            .unwrap_or(&[])
    }

    pub fn dependents_of(&self, task: &str) -> &[TaskId] {
        self.dependents
            .get(task)
            .map(|children| children.as_slice())
            .unwrap_or(&[])
    }

    /// True when `task` exists and all of its dependencies are in `completed`.
    pub fn is_satisfied(&self, task: &str, completed: &CompletionSet) -> bool {
        self.dependencies
            .get(task)
            .is_some_and(|deps| deps.iter().all(|dep| completed.contains(dep)))
    }

    /// All task ids in ascending order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(|name| name.as_str())
    }

    /// Tasks without dependencies.
    pub fn roots(&self) -> impl Iterator<Item = &str> {
        self.in_degrees
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Lazy topological traversal returned by [`TaskGraph::topological_order`].
pub struct TopologicalOrder<'a> {
    graph: &'a TaskGraph,
    remaining: BTreeMap<&'a str, usize>,
    ready: BTreeSet<&'a str>,
}

impl<'a> Iterator for TopologicalOrder<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.ready.pop_first()?;
        self.remaining.remove(next);

        for child in self.graph.dependents_of(next) {
            if let Some(degree) = self.remaining.get_mut(child.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    self.ready.insert(child.as_str());
                }
            }
        }

        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> TaskGraph {
        TaskGraph::build([
            ("A", vec![]),
            ("B", vec!["A"]),
            ("C", vec!["A"]),
            ("D", vec!["B", "C"]),
        ])
        .unwrap()
    }

    #[test]
    fn orders_diamond_with_ascending_ties() {
        let graph = diamond();
        let order: Vec<&str> = graph.topological_order().collect();
        assert_eq!(order, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn order_is_restartable() {
        let graph = diamond();
        let first: Vec<&str> = graph.topological_order().collect();
        let second: Vec<&str> = graph.topological_order().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn tie_break_uses_task_id_not_insertion_order() {
        let graph = TaskGraph::build([("z", vec![]), ("m", vec![]), ("a", vec!["z"])]).unwrap();
        let order: Vec<&str> = graph.topological_order().collect();
        assert_eq!(order, vec!["m", "z", "a"]);
    }

    #[test]
    fn rejects_unknown_dependency() {
        let err = TaskGraph::build([("A", vec!["ghost"])]).unwrap_err();
        match err {
            DagError::InvalidGraph(GraphError::UnknownDependency { task, dependency }) => {
                assert_eq!(task, "A");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_cycle_and_names_members() {
        let err = TaskGraph::build([
            ("A", vec!["C"]),
            ("B", vec!["A"]),
            ("C", vec!["B"]),
            ("D", vec![]),
        ])
        .unwrap_err();
        match err {
            DagError::InvalidGraph(GraphError::Cycle { tasks }) => {
                assert_eq!(tasks, vec!["A", "B", "C"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_self_dependency() {
        let err = TaskGraph::build([("A", vec!["A"])]).unwrap_err();
        assert!(matches!(err, DagError::InvalidGraph(GraphError::Cycle { .. })));
    }

    #[test]
    fn rejects_duplicate_keys() {
        let err = TaskGraph::build(vec![("A", Vec::<&str>::new()), ("A", Vec::new())]).unwrap_err();
        assert!(matches!(err, DagError::InvalidGraph(GraphError::DuplicateTask(_))));
    }

    #[test]
    fn collapses_repeated_dependencies() {
        let graph = TaskGraph::build([("A", vec![]), ("B", vec!["A", "A"])]).unwrap();
        assert_eq!(graph.dependencies_of("B"), ["A".to_string()]);
        assert_eq!(graph.dependents_of("A"), ["B".to_string()]);
    }

    #[test]
    fn satisfaction_tracks_completed_set() {
        let graph = diamond();
        let mut completed = CompletionSet::new();
        assert!(graph.is_satisfied("A", &completed));
        assert!(!graph.is_satisfied("D", &completed));

        completed.extend(["A".to_string(), "B".to_string()]);
        assert!(!graph.is_satisfied("D", &completed));
        completed.insert("C".to_string());
        assert!(graph.is_satisfied("D", &completed));
        assert!(!graph.is_satisfied("missing", &completed));
    }

    #[test]
    fn parses_json_document() {
        let graph = TaskGraph::from_json(r#"{"A": [], "B": ["A"]}"#).unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.roots().collect::<Vec<_>>(), vec!["A"]);
        assert!(matches!(
            TaskGraph::from_json("[1, 2]"),
            Err(DagError::Parse(_))
        ));
    }
}
