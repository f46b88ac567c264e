use flowcore::{NodeId, NodeSpec, Workflow, WorkflowError, WorkflowSpec, MAX_NODES};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Selects which additional compliance predicates run during validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceLevel {
    #[default]
    Basic,
    Soc2,
    Hipaa,
    Gdpr,
    Custom(String),
}

impl fmt::Display for ComplianceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceLevel::Basic => f.write_str("basic"),
            ComplianceLevel::Soc2 => f.write_str("soc2"),
            ComplianceLevel::Hipaa => f.write_str("hipaa"),
            ComplianceLevel::Gdpr => f.write_str("gdpr"),
            ComplianceLevel::Custom(name) => f.write_str(name),
        }
    }
}

/// Compliance predicates for one level. Both checks default to passing.
pub trait CompliancePolicy: Send + Sync {
    fn check_node(&self, _node: &NodeSpec) -> Result<(), String> {
        Ok(())
    }

    fn check_workflow(&self, _workflow: &WorkflowSpec) -> Result<(), String> {
        Ok(())
    }
}

/// Accepts everything. Installed for the named regulatory levels until real
/// rules exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermissivePolicy;

impl CompliancePolicy for PermissivePolicy {}

/// Structural and compliance validation for nodes and workflows.
///
/// Holds no mutable state; one instance can serve any number of concurrent
/// validations.
#[derive(Clone)]
pub struct Validator {
    policies: HashMap<ComplianceLevel, Arc<dyn CompliancePolicy>>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        let mut policies: HashMap<ComplianceLevel, Arc<dyn CompliancePolicy>> = HashMap::new();
        for level in [ComplianceLevel::Soc2, ComplianceLevel::Hipaa, ComplianceLevel::Gdpr] {
            policies.insert(level, Arc::new(PermissivePolicy));
        }
        Self { policies }
    }

    /// Install or replace the policy for `level`.
    pub fn with_policy(mut self, level: ComplianceLevel, policy: Arc<dyn CompliancePolicy>) -> Self {
        self.policies.insert(level, policy);
        self
    }

    fn policy(&self, level: &ComplianceLevel) -> Option<Arc<dyn CompliancePolicy>> {
        self.policies.get(level).cloned()
    }

    /// Check every node invariant, then the compliance predicate for `level`.
    pub fn validate_node(&self, node: &NodeSpec, level: &ComplianceLevel) -> Result<(), WorkflowError> {
        check_node(node, self.policy(level).as_deref(), level)
    }

    /// Validate a workflow snapshot.
    ///
    /// Nodes are checked concurrently, one task each. Every failure is
    /// reported: a cycle first, then node failures in node order, then
    /// broken edges. The compliance workflow predicate runs only on a
    /// structurally valid workflow.
    pub async fn validate_workflow(
        &self,
        workflow: &Workflow,
        level: &ComplianceLevel,
    ) -> Result<(), WorkflowError> {
        let spec = workflow.spec();
        if spec.nodes.len() > MAX_NODES {
            return Err(WorkflowError::NodeLimitExceeded { limit: MAX_NODES });
        }

        let policy = self.policy(level);
        let mut tasks = JoinSet::new();
        for (index, node) in spec.nodes.iter().cloned().enumerate() {
            let policy = policy.clone();
            let level = level.clone();
            tasks.spawn(async move { (index, check_node(&node, policy.as_deref(), &level)) });
        }

        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((index, Err(e))) => failures.push((index, e)),
                Err(e) => {
                    return Err(WorkflowError::InvalidArgument(format!(
                        "node validation task failed: {}",
                        e
                    )))
                }
            }
        }
        failures.sort_by_key(|(index, _)| *index);

        let mut errors: Vec<WorkflowError> = detect_cycle(&spec.nodes).err().into_iter().collect();
        errors.extend(failures.into_iter().map(|(_, e)| e));
        errors.extend(edge_errors(&spec.nodes));
        WorkflowError::aggregate(errors)?;

        if let Some(policy) = policy {
            policy
                .check_workflow(&spec)
                .map_err(|message| WorkflowError::ComplianceViolation {
                    level: level.to_string(),
                    message,
                })?;
        }
        Ok(())
    }
}

fn check_node(
    node: &NodeSpec,
    policy: Option<&dyn CompliancePolicy>,
    level: &ComplianceLevel,
) -> Result<(), WorkflowError> {
    node.validate().map_err(|source| WorkflowError::InvalidNode {
        node_id: node.id,
        source,
    })?;

    if let Some(policy) = policy {
        policy
            .check_node(node)
            .map_err(|message| WorkflowError::ComplianceViolation {
                level: level.to_string(),
                message: format!("node {}: {}", node.id, message),
            })?;
    }
    Ok(())
}

/// Check that the graph is acyclic, and that every edge points at a node in
/// the set and is recorded on both endpoints. A cycle is reported ahead of
/// any broken edge.
pub fn validate_connections(nodes: &[NodeSpec]) -> Result<(), WorkflowError> {
    let mut errors: Vec<WorkflowError> = detect_cycle(nodes).err().into_iter().collect();
    errors.extend(edge_errors(nodes));
    WorkflowError::aggregate(errors)
}

fn edge_errors(nodes: &[NodeSpec]) -> Vec<WorkflowError> {
    let by_id: HashMap<NodeId, &NodeSpec> = nodes.iter().map(|n| (n.id, n)).collect();
    let mut errors = Vec::new();

    for node in nodes {
        for target in &node.output_connections {
            match by_id.get(target) {
                None => errors.push(WorkflowError::InvalidConnection(format!(
                    "node {} connects to unknown node {}",
                    node.id, target
                ))),
                Some(peer) if !peer.input_connections.contains(&node.id) => {
                    errors.push(WorkflowError::InvalidConnection(format!(
                        "edge {} -> {} is missing on its target",
                        node.id, target
                    )))
                }
                Some(_) => {}
            }
        }
        for source in &node.input_connections {
            match by_id.get(source) {
                None => errors.push(WorkflowError::InvalidConnection(format!(
                    "node {} has input from unknown node {}",
                    node.id, source
                ))),
                Some(peer) if !peer.output_connections.contains(&node.id) => {
                    errors.push(WorkflowError::InvalidConnection(format!(
                        "edge {} -> {} is missing on its source",
                        source, node.id
                    )))
                }
                Some(_) => {}
            }
        }
    }
    errors
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    OnStack,
    Done,
}

/// Iterative depth-first search over output connections. Reaching a node
/// that is still on the stack is a cycle.
pub fn detect_cycle(nodes: &[NodeSpec]) -> Result<(), WorkflowError> {
    let known: HashSet<NodeId> = nodes.iter().map(|n| n.id).collect();
    let adjacency: HashMap<NodeId, Vec<NodeId>> = nodes
        .iter()
        .map(|n| {
            let targets = n
                .output_connections
                .iter()
                .copied()
                .filter(|id| known.contains(id))
                .collect();
            (n.id, targets)
        })
        .collect();

    let mut marks: HashMap<NodeId, Mark> = HashMap::with_capacity(nodes.len());
    let mut stack: Vec<(NodeId, usize)> = Vec::new();

    for root in nodes {
        if marks.contains_key(&root.id) {
            continue;
        }
        marks.insert(root.id, Mark::OnStack);
        stack.push((root.id, 0));

        while let Some(top) = stack.last_mut() {
            let (node, next) = *top;
            top.1 += 1;

            let child = adjacency.get(&node).and_then(|targets| targets.get(next)).copied();
            match child {
                Some(child) => match marks.get(&child) {
                    Some(Mark::OnStack) => return Err(WorkflowError::CircularDependency(child)),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child, Mark::OnStack);
                        stack.push((child, 0));
                    }
                },
                None => {
                    marks.insert(node, Mark::Done);
                    stack.pop();
                }
            }
        }
    }
    Ok(())
}
