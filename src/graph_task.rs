use crate::tensor::Tensor;
use std::collections::HashSet;

/// The non-leaf tensors reachable from one backward root, in topological
/// order: every tensor comes after everything it depends on, and the root
/// (if it has a producer) comes last.
///
/// Leaves are visited but not recorded since they have no backward work.
pub struct GraphTask {
    nodes: Vec<Tensor>,
}

impl GraphTask {
    /// Depth-first postorder walk from `root` over producer inputs.
    ///
    /// Nodes are keyed by identity. An explicit stack replaces recursion so
    /// long chains do not exhaust the call stack.
    pub fn discover(root: &Tensor) -> Self {
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(root.clone(), false)];

        while let Some((tensor, expanded)) = stack.pop() {
            if expanded {
                nodes.push(tensor);
                continue;
            }
            if !seen.insert(tensor.node_id()) {
                continue;
            }
            let Some(producer) = tensor.producer() else {
                continue;
            };
            stack.push((tensor, true));
            for input in producer.inputs().iter().rev() {
                if !seen.contains(&input.node_id()) {
                    stack.push((input.clone(), false));
                }
            }
        }

        GraphTask { nodes }
    }

    pub fn nodes(&self) -> &[Tensor] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn into_nodes(self) -> Vec<Tensor> {
        self.nodes
    }
}

impl Tensor {
    /// Non-leaf tensors this one depends on, itself last.
    pub fn deepwalk(&self) -> Vec<Tensor> {
        GraphTask::discover(self).into_nodes()
    }
}
