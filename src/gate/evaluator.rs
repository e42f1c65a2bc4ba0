//! Boolean fold of per-condition outcomes through the group tree.
//!
//! The fold runs only after every leaf has been read, so it is pure and
//! synchronous. It short-circuits within a group, but the skipped children
//! are still listed in the trail so diagnostics cover the whole tree.

use crate::gate::types::{ConditionGroup, ConditionNode, Operator, Outcome};
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of folding one group, with a breakdown of its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupTrace {
    pub operator: Operator,
    pub result: bool,
    pub children: Vec<TraceNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TraceNode {
    Condition { ordinal: usize, outcome: Outcome },
    Group(GroupTrace),
    /// Not needed to decide the parent; lists the conditions underneath.
    Skipped { ordinals: Vec<usize> },
}

pub struct GroupEvaluator;

impl GroupEvaluator {
    /// Fold `outcomes` through `group`. A condition missing from the map is
    /// treated as unknown.
    pub fn evaluate(group: &ConditionGroup, outcomes: &BTreeMap<usize, Outcome>) -> GroupTrace {
        let mut result = group.operator.identity();
        let mut decided = false;
        let mut children = Vec::with_capacity(group.children.len());

        for child in &group.children {
            if decided {
                children.push(TraceNode::Skipped {
                    ordinals: ordinals_under(child),
                });
                continue;
            }

            let (value, node) = match child {
                ConditionNode::Condition { ordinal, .. } => {
                    let outcome = outcomes.get(ordinal).copied().unwrap_or(Outcome::Unknown);
                    (
                        outcome.is_met(),
                        TraceNode::Condition {
                            ordinal: *ordinal,
                            outcome,
                        },
                    )
                }
                ConditionNode::Group(nested) => {
                    let trace = Self::evaluate(nested, outcomes);
                    (trace.result, TraceNode::Group(trace))
                }
            };
            children.push(node);

            match group.operator {
                Operator::And if !value => {
                    result = false;
                    decided = true;
                }
                Operator::Or if value => {
                    result = true;
                    decided = true;
                }
                _ => {}
            }
        }

        GroupTrace {
            operator: group.operator,
            result,
            children,
        }
    }
}

fn ordinals_under(node: &ConditionNode) -> Vec<usize> {
    match node {
        ConditionNode::Condition { ordinal, .. } => vec![*ordinal],
        ConditionNode::Group(group) => group.leaves().into_iter().map(|(o, _)| o).collect(),
    }
}
