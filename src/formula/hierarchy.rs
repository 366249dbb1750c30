//! Hierarchy operators over closure tables.
//!
//! A parent-child dimension stores its transitive ancestry in a closure
//! table of `(ancestor, descendant, distance)` rows. A hierarchy operator
//! contributes a distance predicate; the anchoring condition on the ancestor
//! column itself is built by the engine with the regular `=` / `in` formulas.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{QueryError, Result};

/// One hierarchy operator.
pub trait HierarchyOperator: Send + Sync {
    fn name(&self) -> &'static str;

    /// The distance predicate, or `None` when every distance qualifies.
    fn distance_condition(&self, distance_sql: &str, max_depth: Option<u64>) -> Option<String>;
}

/// `childrenOf`: direct children only, or the first `maxDepth` levels.
struct ChildrenOf;

impl HierarchyOperator for ChildrenOf {
    fn name(&self) -> &'static str {
        "childrenOf"
    }

    fn distance_condition(&self, distance_sql: &str, max_depth: Option<u64>) -> Option<String> {
        Some(match max_depth {
            Some(depth) => format!("{distance_sql} BETWEEN 1 AND {depth}"),
            None => format!("{distance_sql} = 1"),
        })
    }
}

/// `descendantsOf`: everything below the node, excluding the node itself.
struct DescendantsOf;

impl HierarchyOperator for DescendantsOf {
    fn name(&self) -> &'static str {
        "descendantsOf"
    }

    fn distance_condition(&self, distance_sql: &str, max_depth: Option<u64>) -> Option<String> {
        Some(match max_depth {
            Some(depth) => format!("{distance_sql} BETWEEN 1 AND {depth}"),
            None => format!("{distance_sql} > 0"),
        })
    }
}

/// `selfAndDescendantsOf`: the node plus everything below it.
struct SelfAndDescendantsOf;

impl HierarchyOperator for SelfAndDescendantsOf {
    fn name(&self) -> &'static str {
        "selfAndDescendantsOf"
    }

    fn distance_condition(&self, distance_sql: &str, max_depth: Option<u64>) -> Option<String> {
        // Distance zero is the node itself, so no lower bound.
        max_depth.map(|depth| format!("{distance_sql} <= {depth}"))
    }
}

/// Named registry of hierarchy operators.
pub struct HierarchyOperatorService {
    operators: HashMap<&'static str, Arc<dyn HierarchyOperator>>,
}

impl HierarchyOperatorService {
    pub fn new() -> HierarchyOperatorService {
        let mut operators: HashMap<&'static str, Arc<dyn HierarchyOperator>> = HashMap::new();
        for operator in [
            Arc::new(ChildrenOf) as Arc<dyn HierarchyOperator>,
            Arc::new(DescendantsOf),
            Arc::new(SelfAndDescendantsOf),
        ] {
            operators.insert(operator.name(), operator);
        }
        HierarchyOperatorService { operators }
    }

    pub fn contains(&self, op: &str) -> bool {
        self.operators.contains_key(op)
    }

    pub fn get(&self, op: &str) -> Result<&dyn HierarchyOperator> {
        self.operators
            .get(op)
            .map(|o| o.as_ref())
            .ok_or_else(|| QueryError::OperatorNotFound(op.to_string()))
    }
}

impl Default for HierarchyOperatorService {
    fn default() -> Self {
        HierarchyOperatorService::new()
    }
}
