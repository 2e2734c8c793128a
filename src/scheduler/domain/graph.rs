//! Dependency graph over registered agents.
//!
//! Nodes are keyed by [`AgentType`] in ordered maps so every computed order
//! is deterministic for a given agent set.

use super::AgentType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::hash::BuildHasher;

/// One agent's position in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    agent_type: AgentType,
    dependencies: BTreeSet<AgentType>,
    dependents: BTreeSet<AgentType>,
    execution_order: Option<usize>,
    can_parallel: bool,
}

impl DependencyNode {
    fn new(agent_type: AgentType, dependencies: BTreeSet<AgentType>) -> Self {
        Self {
            agent_type,
            dependencies,
            dependents: BTreeSet::new(),
            execution_order: None,
            can_parallel: false,
        }
    }

    /// Returns the agent this node describes.
    #[must_use]
    pub const fn agent_type(&self) -> &AgentType {
        &self.agent_type
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub const fn dependencies(&self) -> &BTreeSet<AgentType> {
        &self.dependencies
    }

    /// Returns the registered agents that depend on this one.
    #[must_use]
    pub const fn dependents(&self) -> &BTreeSet<AgentType> {
        &self.dependents
    }

    /// Returns the topological level, or `None` when unscheduled.
    #[must_use]
    pub const fn execution_order(&self) -> Option<usize> {
        self.execution_order
    }

    /// Returns whether every dependency sits at a strictly lower level.
    #[must_use]
    pub const fn can_parallel(&self) -> bool {
        self.can_parallel
    }
}

/// A problem found while validating the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyIssue {
    /// An agent depends on an agent that is not registered.
    MissingDependency {
        /// Agent declaring the dependency.
        agent: AgentType,
        /// Unregistered dependency.
        dependency: AgentType,
    },
    /// A dependency cycle, listed in traversal order and closed on its
    /// first member.
    CircularDependency {
        /// Agents forming the cycle.
        cycle: Vec<AgentType>,
    },
    /// An agent that could not be placed on any level.
    Unscheduled {
        /// Agent left out of the execution order.
        agent: AgentType,
    },
}

impl DependencyIssue {
    /// Returns whether the issue describes a cycle.
    #[must_use]
    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }
}

impl fmt::Display for DependencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDependency { agent, dependency } => {
                write!(f, "{agent} depends on unregistered agent {dependency}")
            }
            Self::CircularDependency { cycle } => {
                let path: Vec<&str> = cycle.iter().map(AgentType::as_str).collect();
                write!(f, "circular dependency involving {}", path.join(" -> "))
            }
            Self::Unscheduled { agent } => {
                write!(f, "{agent} cannot be scheduled")
            }
        }
    }
}

/// Outcome of dependency validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyValidation {
    issues: Vec<DependencyIssue>,
}

impl DependencyValidation {
    /// Returns whether the graph has no missing dependencies and no cycles.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns the detected issues.
    #[must_use]
    pub fn issues(&self) -> &[DependencyIssue] {
        &self.issues
    }

    /// Returns the issues rendered as human-readable strings.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

/// A set of agents scheduled at one topological level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionGroup {
    level: usize,
    agents: Vec<AgentType>,
    parallel: bool,
}

impl ExecutionGroup {
    /// Returns the topological level of the group.
    #[must_use]
    pub const fn level(&self) -> usize {
        self.level
    }

    /// Returns the agents in the group.
    #[must_use]
    pub fn agents(&self) -> &[AgentType] {
        &self.agents
    }

    /// Returns whether the agents may run concurrently.
    #[must_use]
    pub const fn is_parallel(&self) -> bool {
        self.parallel
    }
}

/// Levelled execution order plus anything that could not be ordered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    levels: Vec<Vec<AgentType>>,
    unscheduled: Vec<AgentType>,
    issues: Vec<DependencyIssue>,
}

impl ExecutionPlan {
    /// Returns agents grouped by level, lowest first.
    #[must_use]
    pub fn levels(&self) -> &[Vec<AgentType>] {
        &self.levels
    }

    /// Returns the flattened execution order.
    #[must_use]
    pub fn order(&self) -> Vec<AgentType> {
        self.levels.iter().flatten().cloned().collect()
    }

    /// Returns agents excluded from the order.
    #[must_use]
    pub fn unscheduled(&self) -> &[AgentType] {
        &self.unscheduled
    }

    /// Returns validation issues plus one entry per unscheduled agent.
    #[must_use]
    pub fn issues(&self) -> &[DependencyIssue] {
        &self.issues
    }

    /// Returns whether every agent was scheduled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unscheduled.is_empty()
    }

    /// Returns the level assigned to `agent`.
    #[must_use]
    pub fn level_of(&self, agent: &AgentType) -> Option<usize> {
        self.levels.iter().position(|level| level.contains(agent))
    }

    /// Returns the number of scheduled agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Returns whether nothing was scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Graph of agent dependencies with precomputed levels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    nodes: BTreeMap<AgentType, DependencyNode>,
    levels: Vec<Vec<AgentType>>,
    unscheduled: Vec<AgentType>,
    validation_issues: Vec<DependencyIssue>,
}

impl DependencyGraph {
    /// Builds the graph from `(agent, dependencies)` declarations.
    ///
    /// A later declaration for the same agent replaces an earlier one.
    #[must_use]
    pub fn build<I, D>(declarations: I) -> Self
    where
        I: IntoIterator<Item = (AgentType, D)>,
        D: IntoIterator<Item = AgentType>,
    {
        let mut nodes: BTreeMap<AgentType, DependencyNode> = BTreeMap::new();
        for (agent, dependencies) in declarations {
            let node = DependencyNode::new(agent.clone(), dependencies.into_iter().collect());
            nodes.insert(agent, node);
        }

        let edges: Vec<(AgentType, AgentType)> = nodes
            .values()
            .flat_map(|node| {
                node.dependencies
                    .iter()
                    .map(|dependency| (dependency.clone(), node.agent_type.clone()))
            })
            .collect();
        for (dependency, dependent) in edges {
            if let Some(node) = nodes.get_mut(&dependency) {
                node.dependents.insert(dependent);
            }
        }

        let mut graph = Self {
            nodes,
            ..Self::default()
        };
        graph.validation_issues = graph.missing_dependencies();
        graph.validation_issues.extend(graph.detect_cycles());
        graph.assign_levels();
        graph
    }

    /// Returns the node for `agent`.
    #[must_use]
    pub fn node(&self, agent: &AgentType) -> Option<&DependencyNode> {
        self.nodes.get(agent)
    }

    /// Returns every node in agent-type order.
    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.values()
    }

    /// Returns the number of agents in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns whether the graph is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reports missing dependencies and cycles.
    #[must_use]
    pub fn validate(&self) -> DependencyValidation {
        DependencyValidation {
            issues: self.validation_issues.clone(),
        }
    }

    /// Returns the levelled execution order.
    #[must_use]
    pub fn execution_plan(&self) -> ExecutionPlan {
        let mut issues = self.validation_issues.clone();
        issues.extend(
            self.unscheduled
                .iter()
                .map(|agent| DependencyIssue::Unscheduled {
                    agent: agent.clone(),
                }),
        );
        ExecutionPlan {
            levels: self.levels.clone(),
            unscheduled: self.unscheduled.clone(),
            issues,
        }
    }

    /// Returns the groups to run level by level.
    ///
    /// Agents whose dependencies all sit at lower levels share one parallel
    /// group per level; any other agent gets its own sequential group.
    #[must_use]
    pub fn parallel_groups(&self) -> Vec<ExecutionGroup> {
        let mut groups = Vec::new();
        for (level, agents) in self.levels.iter().enumerate() {
            let (parallel, sequential): (Vec<AgentType>, Vec<AgentType>) = agents
                .iter()
                .cloned()
                .partition(|agent| self.nodes.get(agent).is_some_and(|node| node.can_parallel));

            if !parallel.is_empty() {
                groups.push(ExecutionGroup {
                    level,
                    agents: parallel,
                    parallel: true,
                });
            }
            groups.extend(sequential.into_iter().map(|agent| ExecutionGroup {
                level,
                agents: vec![agent],
                parallel: false,
            }));
        }
        groups
    }

    /// Returns whether `agent` is known and every dependency is in
    /// `completed`.
    #[must_use]
    pub fn can_execute<S: BuildHasher>(
        &self,
        agent: &AgentType,
        completed: &HashSet<AgentType, S>,
    ) -> bool {
        self.nodes.get(agent).is_some_and(|node| {
            node.dependencies
                .iter()
                .all(|dependency| completed.contains(dependency))
        })
    }

    /// Returns the sub-graph containing `roots` and their transitive
    /// dependencies.
    ///
    /// Unknown roots are ignored. Dependencies that are not registered stay
    /// declared so the sub-graph reports them as missing.
    #[must_use]
    pub fn restricted_to<'a>(&self, roots: impl IntoIterator<Item = &'a AgentType>) -> Self {
        let mut selected: BTreeSet<AgentType> = BTreeSet::new();
        let mut stack: Vec<AgentType> = roots
            .into_iter()
            .filter(|agent| self.nodes.contains_key(*agent))
            .cloned()
            .collect();

        while let Some(agent) = stack.pop() {
            if !selected.insert(agent.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&agent) {
                stack.extend(
                    node.dependencies
                        .iter()
                        .filter(|dependency| self.nodes.contains_key(*dependency))
                        .cloned(),
                );
            }
        }

        Self::build(selected.into_iter().filter_map(|agent| {
            self.nodes
                .get(&agent)
                .map(|node| (agent.clone(), node.dependencies.clone()))
        }))
    }

    fn missing_dependencies(&self) -> Vec<DependencyIssue> {
        self.nodes
            .values()
            .flat_map(|node| {
                node.dependencies
                    .iter()
                    .filter(|dependency| !self.nodes.contains_key(*dependency))
                    .map(|dependency| DependencyIssue::MissingDependency {
                        agent: node.agent_type.clone(),
                        dependency: dependency.clone(),
                    })
            })
            .collect()
    }

    /// Depth-first search keeping the current path as the recursion stack.
    fn detect_cycles(&self) -> Vec<DependencyIssue> {
        let mut visited: BTreeSet<&AgentType> = BTreeSet::new();
        let mut cycles = Vec::new();

        for start in self.nodes.keys() {
            if visited.contains(start) {
                continue;
            }
            let mut path: Vec<&AgentType> = Vec::new();
            self.visit(start, &mut visited, &mut path, &mut cycles);
        }

        cycles
    }

    fn visit<'a>(
        &'a self,
        agent: &'a AgentType,
        visited: &mut BTreeSet<&'a AgentType>,
        path: &mut Vec<&'a AgentType>,
        cycles: &mut Vec<DependencyIssue>,
    ) {
        visited.insert(agent);
        path.push(agent);

        if let Some(node) = self.nodes.get(agent) {
            for dependency in &node.dependencies {
                if let Some(position) = path.iter().position(|entry| *entry == dependency) {
                    let mut cycle: Vec<AgentType> = path
                        .iter()
                        .skip(position)
                        .map(|entry| (*entry).clone())
                        .collect();
                    cycle.push(dependency.clone());
                    cycles.push(DependencyIssue::CircularDependency { cycle });
                } else if self.nodes.contains_key(dependency) && !visited.contains(dependency) {
                    self.visit(dependency, visited, path, cycles);
                }
            }
        }

        path.pop();
    }

    /// Kahn's algorithm, one level per wave of zero in-degree agents.
    ///
    /// Missing dependencies count toward in-degree and are never released,
    /// so affected agents and their dependents stay unscheduled.
    fn assign_levels(&mut self) {
        let mut in_degree: BTreeMap<AgentType, usize> = self
            .nodes
            .iter()
            .map(|(agent, node)| (agent.clone(), node.dependencies.len()))
            .collect();

        let mut ready: Vec<AgentType> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(agent, _)| agent.clone())
            .collect();

        let mut levels: Vec<Vec<AgentType>> = Vec::new();
        while !ready.is_empty() {
            let mut next: BTreeSet<AgentType> = BTreeSet::new();
            for agent in &ready {
                let Some(node) = self.nodes.get(agent) else {
                    continue;
                };
                for dependent in &node.dependents {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next.insert(dependent.clone());
                        }
                    }
                }
            }
            levels.push(std::mem::take(&mut ready));
            ready = next.into_iter().collect();
        }

        for (level, agents) in levels.iter().enumerate() {
            for agent in agents {
                if let Some(node) = self.nodes.get_mut(agent) {
                    node.execution_order = Some(level);
                }
            }
        }

        let orders: BTreeMap<AgentType, Option<usize>> = self
            .nodes
            .iter()
            .map(|(agent, node)| (agent.clone(), node.execution_order))
            .collect();
        for node in self.nodes.values_mut() {
            node.can_parallel = node.execution_order.is_some_and(|level| {
                node.dependencies.iter().all(|dependency| {
                    orders
                        .get(dependency)
                        .copied()
                        .flatten()
                        .is_some_and(|dependency_level| dependency_level < level)
                })
            });
        }

        self.unscheduled = self
            .nodes
            .values()
            .filter(|node| node.execution_order.is_none())
            .map(|node| node.agent_type.clone())
            .collect();
        self.levels = levels;
    }
}
