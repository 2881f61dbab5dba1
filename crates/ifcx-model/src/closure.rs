//! Relation closure
//!
//! Flattens a parent → children containment map into
//! `(ancestor, descendant, depth)` entries so that "everything under X" is a
//! single indexed lookup instead of a recursive join.
//!
//! The expansion is over paths, not over reachable pairs: a node reachable
//! from an ancestor along two different paths is emitted once per path, at
//! that path's length. For a tree of depth D and fan-out B that is O(B^D)
//! entries per start node, which is fine for spatial containment trees but
//! grows quickly for deep, wide or diamond-shaped graphs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::tabular::EntityId;

/// Parent → children, iterated in ascending parent id order.
pub type Adjacency = BTreeMap<EntityId, Vec<EntityId>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClosureEntry {
    pub ancestor: EntityId,
    pub descendant: EntityId,
    pub depth: u32,
}

/// Append children to `parent`'s edge list, creating it if needed.
pub fn push_edges(
    adjacency: &mut Adjacency,
    parent: EntityId,
    children: impl IntoIterator<Item = EntityId>,
) {
    adjacency.entry(parent).or_default().extend(children);
}

/// Every node mentioned by the map, as a parent or as a child.
pub fn nodes(adjacency: &Adjacency) -> BTreeSet<EntityId> {
    adjacency
        .iter()
        .flat_map(|(parent, children)| std::iter::once(*parent).chain(children.iter().copied()))
        .collect()
}

/// Depth-first walk from `root`, calling `visit(node, depth)` in pre-order.
///
/// A child already on the current path is skipped, so self-references and
/// cycles terminate.
fn walk(adjacency: &Adjacency, root: EntityId, mut visit: impl FnMut(EntityId, u32)) {
    // (node, index of the next child to visit)
    let mut path: Vec<(EntityId, usize)> = vec![(root, 0)];
    visit(root, 0);

    while let Some(&(node, next)) = path.last() {
        let children = adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[]);
        let Some(&child) = children.get(next) else {
            path.pop();
            continue;
        };
        if let Some(top) = path.last_mut() {
            top.1 += 1;
        }

        if path.iter().any(|&(n, _)| n == child) {
            tracing::warn!(
                ancestor = root,
                node,
                child,
                "containment cycle; skipping back edge"
            );
            continue;
        }

        visit(child, path.len() as u32);
        path.push((child, 0));
    }
}

/// Expand the adjacency map into its path closure.
///
/// Start nodes are visited in ascending id order; every node gets its
/// depth-0 self entry, leaves included.
pub fn build_closure(adjacency: &Adjacency) -> Vec<ClosureEntry> {
    let mut closure = Vec::new();
    for root in nodes(adjacency) {
        walk(adjacency, root, |descendant, depth| {
            closure.push(ClosureEntry {
                ancestor: root,
                descendant,
                depth,
            });
        });
    }
    closure
}

/// Number of entries [`build_closure`] would produce, without allocating them.
pub fn closure_size(adjacency: &Adjacency) -> usize {
    let mut count = 0;
    for root in nodes(adjacency) {
        walk(adjacency, root, |_, _| count += 1);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ancestor: EntityId, descendant: EntityId, depth: u32) -> ClosureEntry {
        ClosureEntry {
            ancestor,
            descendant,
            depth,
        }
    }

    #[test]
    fn test_closure_completeness() {
        let mut adjacency = Adjacency::new();
        push_edges(&mut adjacency, 1, [2, 3]);
        push_edges(&mut adjacency, 2, [4]);

        let closure = build_closure(&adjacency);
        let got: BTreeSet<ClosureEntry> = closure.iter().copied().collect();
        let expected: BTreeSet<ClosureEntry> = [
            entry(1, 1, 0),
            entry(1, 2, 1),
            entry(1, 3, 1),
            entry(1, 4, 2),
            entry(2, 2, 0),
            entry(2, 4, 1),
            entry(3, 3, 0),
            entry(4, 4, 0),
        ]
        .into_iter()
        .collect();

        assert_eq!(closure.len(), 8);
        assert_eq!(got, expected);
        assert_eq!(closure_size(&adjacency), 8);
    }

    #[test]
    fn test_pre_order_per_root() {
        let mut adjacency = Adjacency::new();
        push_edges(&mut adjacency, 1, [2, 3]);
        push_edges(&mut adjacency, 2, [4]);

        let from_one: Vec<(EntityId, u32)> = build_closure(&adjacency)
            .into_iter()
            .filter(|e| e.ancestor == 1)
            .map(|e| (e.descendant, e.depth))
            .collect();
        assert_eq!(from_one, vec![(1, 0), (2, 1), (4, 2), (3, 1)]);
    }

    #[test]
    fn test_diamond_emits_one_entry_per_path() {
        // 1 → 4 directly and via 2.
        let mut adjacency = Adjacency::new();
        push_edges(&mut adjacency, 1, [2, 4]);
        push_edges(&mut adjacency, 2, [4]);

        let closure = build_closure(&adjacency);
        let one_to_four: Vec<u32> = closure
            .iter()
            .filter(|e| e.ancestor == 1 && e.descendant == 4)
            .map(|e| e.depth)
            .collect();
        assert_eq!(one_to_four, vec![2, 1]);
    }

    #[test]
    fn test_cycles_terminate() {
        let mut adjacency = Adjacency::new();
        push_edges(&mut adjacency, 1, [1, 2]);
        push_edges(&mut adjacency, 2, [1]);

        let closure = build_closure(&adjacency);
        assert_eq!(
            closure,
            vec![entry(1, 1, 0), entry(1, 2, 1), entry(2, 2, 0), entry(2, 1, 1)]
        );
    }

    #[test]
    fn test_empty_child_list_still_yields_self_entry() {
        let mut adjacency = Adjacency::new();
        push_edges(&mut adjacency, 9, []);
        assert_eq!(build_closure(&adjacency), vec![entry(9, 9, 0)]);
    }
}
