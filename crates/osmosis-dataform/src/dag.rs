//! Dependency graph over definition files
//!
//! Nodes live in an arena addressed by [`NodeId`]; edges are lists of ids into
//! the same arena. Requested files come first, in discovery order, followed by
//! any out-of-set dependencies that had to be loaded for inheritance.

use crate::project::{CompiledProject, TableDescriptor, Target, TargetKey};
use std::collections::{HashMap, HashSet, VecDeque};

/// Index into the graph arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// One definition file in the graph
#[derive(Debug, Clone)]
pub struct DefinitionNode<T> {
    pub descriptor: TableDescriptor,

    /// Loaded payload, usually the parsed config fragment
    pub payload: T,

    /// Resolved dependencies in `dependencyTargets` order
    pub dependencies: Vec<NodeId>,

    /// False for dependencies outside the requested set; those are never
    /// rewritten and their own dependencies are not resolved
    pub requested: bool,
}

impl<T> DefinitionNode<T> {
    pub fn file_name(&self) -> &str {
        &self.descriptor.file_name
    }

    pub fn target(&self) -> &Target {
        &self.descriptor.target
    }
}

/// `{schema, name}` lookup over tables and declarations
///
/// Table targets are indexed first, then declaration targets, then canonical
/// targets that do not collide with an existing entry.
#[derive(Debug, Clone, Default)]
pub struct TargetIndex<'a> {
    by_key: HashMap<TargetKey, &'a TableDescriptor>,
}

impl<'a> TargetIndex<'a> {
    pub fn new(project: &'a CompiledProject) -> Self {
        let mut by_key = HashMap::new();
        let candidates = project.tables.iter().chain(&project.declarations);

        for descriptor in candidates.clone() {
            by_key.entry(descriptor.target.key()).or_insert(descriptor);
        }
        for descriptor in candidates {
            if let Some(canonical) = &descriptor.canonical_target {
                by_key.entry(canonical.key()).or_insert(descriptor);
            }
        }

        Self { by_key }
    }

    pub fn resolve(&self, target: &Target) -> Option<&'a TableDescriptor> {
        self.by_key.get(&target.key()).copied()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Something that went wrong for one file or edge while building the graph
#[derive(Debug)]
pub enum GraphIssue<E> {
    /// A requested file has no compiled descriptor
    DescriptorMissing { file: String },

    /// A dependency target matches no table or declaration
    DependencyUnresolved { file: String, target: Target },

    /// Loading a file failed; requested files are left out of the graph and
    /// edges to an out-of-set file are dropped
    LoadFailed {
        file: String,
        requested: bool,
        error: E,
    },
}

/// Graph construction errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("Circular dependency between definition files: {}", .files.join(", "))]
    Cycle { files: Vec<String> },
}

/// Result of [`ProjectGraph::build`]
#[derive(Debug)]
pub struct GraphBuild<T, E> {
    pub graph: ProjectGraph<T>,
    pub issues: Vec<GraphIssue<E>>,
}

/// Arena of definition nodes
#[derive(Debug, Clone)]
pub struct ProjectGraph<T> {
    nodes: Vec<DefinitionNode<T>>,
}

impl<T> Default for ProjectGraph<T> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<T> ProjectGraph<T> {
    /// Build the graph for `files` (project-relative paths)
    ///
    /// `load` is called once per node, requested files first. Duplicate
    /// requested paths are ignored.
    pub fn build<E, F>(project: &CompiledProject, files: &[String], mut load: F) -> GraphBuild<T, E>
    where
        F: FnMut(&TableDescriptor) -> Result<T, E>,
    {
        let index = TargetIndex::new(project);
        let mut graph = Self::default();
        let mut issues = Vec::new();
        let mut by_key: HashMap<TargetKey, NodeId> = HashMap::new();
        let mut failed: HashSet<TargetKey> = HashSet::new();
        let mut seen_files: HashSet<&str> = HashSet::new();

        for file in files {
            if !seen_files.insert(file.as_str()) {
                continue;
            }

            let Some(descriptor) = project.descriptor_for_file(file) else {
                tracing::warn!(file = %file, "No compiled descriptor for file");
                issues.push(GraphIssue::DescriptorMissing { file: file.clone() });
                continue;
            };

            match load(descriptor) {
                Ok(payload) => {
                    let id = graph.push(descriptor.clone(), payload, true);
                    by_key.entry(descriptor.target.key()).or_insert(id);
                }
                Err(error) => {
                    failed.insert(descriptor.target.key());
                    issues.push(GraphIssue::LoadFailed {
                        file: file.clone(),
                        requested: true,
                        error,
                    });
                }
            }
        }

        let requested_count = graph.nodes.len();
        for position in 0..requested_count {
            let id = NodeId(position);
            let targets = graph.nodes[position].descriptor.dependency_targets.clone();
            let mut dependencies = Vec::new();

            for target in &targets {
                let Some(dependency) = index.resolve(target) else {
                    let file = graph.nodes[position].descriptor.file_name.clone();
                    tracing::warn!(file = %file, target = %target, "Unresolved dependency target");
                    issues.push(GraphIssue::DependencyUnresolved {
                        file,
                        target: target.clone(),
                    });
                    continue;
                };

                let key = dependency.target.key();
                let dep_id = match by_key.get(&key) {
                    Some(existing) => *existing,
                    None if failed.contains(&key) => continue,
                    None => match load(dependency) {
                        Ok(payload) => {
                            tracing::debug!(file = %dependency.file_name, "Loaded out-of-set dependency");
                            let dep_id = graph.push(dependency.clone(), payload, false);
                            by_key.insert(key, dep_id);
                            dep_id
                        }
                        Err(error) => {
                            failed.insert(key);
                            issues.push(GraphIssue::LoadFailed {
                                file: dependency.file_name.clone(),
                                requested: false,
                                error,
                            });
                            continue;
                        }
                    },
                };

                if !dependencies.contains(&dep_id) {
                    dependencies.push(dep_id);
                }
            }

            tracing::debug!(
                file = %graph.nodes[position].descriptor.file_name,
                dependencies = dependencies.len(),
                "Resolved dependencies"
            );
            graph.nodes[id.0].dependencies = dependencies;
        }

        GraphBuild { graph, issues }
    }

    fn push(&mut self, descriptor: TableDescriptor, payload: T, requested: bool) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(DefinitionNode {
            descriptor,
            payload,
            dependencies: Vec::new(),
            requested,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &DefinitionNode<T> {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut DefinitionNode<T> {
        &mut self.nodes[id.0]
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &DefinitionNode<T>)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }

    /// Ids of requested nodes, in discovery order
    pub fn requested(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|(_, node)| node.requested)
            .map(|(id, _)| id)
            .collect()
    }

    /// Find a node by its project-relative file path
    pub fn find_file(&self, file_name: &str) -> Option<NodeId> {
        self.nodes()
            .find(|(_, node)| node.descriptor.file_name == file_name)
            .map(|(id, _)| id)
    }

    /// Order requested nodes so every dependency precedes its dependents
    ///
    /// Kahn's algorithm restricted to requested nodes; ties are broken by
    /// discovery order.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, GraphError> {
        let requested = self.requested();
        let mut in_degree: HashMap<NodeId, usize> = requested.iter().map(|id| (*id, 0)).collect();
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();

        for id in &requested {
            for dep in &self.node(*id).dependencies {
                if self.node(*dep).requested {
                    children.entry(*dep).or_default().push(*id);
                    if let Some(degree) = in_degree.get_mut(id) {
                        *degree += 1;
                    }
                }
            }
        }

        let mut queue: VecDeque<NodeId> = requested
            .iter()
            .copied()
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();
        let mut sorted = Vec::with_capacity(requested.len());

        while let Some(id) = queue.pop_front() {
            sorted.push(id);
            for child in children.get(&id).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(*child);
                    }
                }
            }
        }

        if sorted.len() != requested.len() {
            let files = requested
                .iter()
                .filter(|id| !sorted.contains(id))
                .map(|id| self.node(*id).descriptor.file_name.clone())
                .collect();
            return Err(GraphError::Cycle { files });
        }

        Ok(sorted)
    }

    /// Distinct datasets of `order` and their dependencies, first-seen order
    pub fn datasets(&self, order: &[NodeId]) -> Vec<String> {
        let mut datasets: Vec<String> = Vec::new();
        let mut push = |schema: &str| {
            if !datasets.iter().any(|d| d == schema) {
                datasets.push(schema.to_string());
            }
        };

        for id in order {
            push(&self.node(*id).descriptor.target.schema);
        }
        for id in order {
            for dep in &self.node(*id).dependencies {
                push(&self.node(*dep).descriptor.target.schema);
            }
        }
        datasets
    }
}
