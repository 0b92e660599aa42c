//! Persistent schedule trees.
//!
//! Nodes are immutable and shared through `Rc`; every edit rebuilds the
//! spine from the edited node up to the root and leaves the original
//! version intact, so independent derivations from one base schedule need
//! no defensive copying.

use crate::aff::{Aff, Constraint};
use crate::set::{Set, TriState};
use crate::union::{UnionMap, UnionSet};
use mosaic_utils::Id;
use std::rc::Rc;

/// A band's partial schedule: for each statement tuple, one affine
/// expression per band member, over that statement's domain dimensions.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MultiUnionAff {
    pub n_member: usize,
    pub per_stmt: Vec<(Id, Vec<Aff>)>,
}

impl MultiUnionAff {
    pub fn new(n_member: usize) -> Self {
        MultiUnionAff {
            n_member,
            per_stmt: Vec::new(),
        }
    }

    pub fn add_stmt(mut self, stmt: Id, affs: Vec<Aff>) -> Self {
        debug_assert_eq!(affs.len(), self.n_member);
        self.per_stmt.push((stmt, affs));
        self
    }

    pub fn get(&self, stmt: Id) -> Option<&[Aff]> {
        self.per_stmt
            .iter()
            .find(|(s, _)| *s == stmt)
            .map(|(_, a)| a.as_slice())
    }

    /// Split into members `[0, pos)` and `[pos, n_member)`.
    pub fn split(&self, pos: usize) -> (MultiUnionAff, MultiUnionAff) {
        debug_assert!(pos <= self.n_member);
        let mut head = MultiUnionAff::new(pos);
        let mut tail = MultiUnionAff::new(self.n_member - pos);
        for (stmt, affs) in &self.per_stmt {
            head.per_stmt.push((*stmt, affs[..pos].to_vec()));
            tail.per_stmt.push((*stmt, affs[pos..].to_vec()));
        }
        (head, tail)
    }
}

/// One node of a schedule tree.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TreeNode {
    /// Root node carrying the iteration domain.
    Domain { domain: UnionSet, child: Rc<TreeNode> },
    /// A partial schedule over the statements below.
    Band {
        partial: MultiUnionAff,
        child: Rc<TreeNode>,
    },
    /// Restricts the statement instances below.
    Filter { filter: UnionSet, child: Rc<TreeNode> },
    /// Ordered children, each normally a filter branch.
    Sequence { children: Vec<Rc<TreeNode>> },
    /// A named annotation consumed by downstream passes.
    Mark { mark: Id, child: Rc<TreeNode> },
    /// Parameter constraints in scope below this node.
    Context {
        context: Vec<Constraint>,
        child: Rc<TreeNode>,
    },
    /// Adds statement instances not present in the root domain. The
    /// relation maps the outer schedule prefix to the new instances.
    Extension {
        extension: UnionMap,
        child: Rc<TreeNode>,
    },
    Leaf,
}

impl TreeNode {
    pub fn n_children(&self) -> usize {
        match self {
            TreeNode::Leaf => 0,
            TreeNode::Sequence { children } => children.len(),
            _ => 1,
        }
    }

    pub fn child(&self, i: usize) -> Option<&Rc<TreeNode>> {
        match self {
            TreeNode::Domain { child, .. }
            | TreeNode::Band { child, .. }
            | TreeNode::Filter { child, .. }
            | TreeNode::Mark { child, .. }
            | TreeNode::Context { child, .. }
            | TreeNode::Extension { child, .. } => {
                (i == 0).then_some(child)
            }
            TreeNode::Sequence { children } => children.get(i),
            TreeNode::Leaf => None,
        }
    }

    /// Rebuild this node with child `i` replaced.
    pub fn with_child(&self, i: usize, new: Rc<TreeNode>) -> TreeNode {
        debug_assert!(i < self.n_children());
        match self {
            TreeNode::Domain { domain, .. } => TreeNode::Domain {
                domain: domain.clone(),
                child: new,
            },
            TreeNode::Band { partial, .. } => TreeNode::Band {
                partial: partial.clone(),
                child: new,
            },
            TreeNode::Filter { filter, .. } => TreeNode::Filter {
                filter: filter.clone(),
                child: new,
            },
            TreeNode::Mark { mark, .. } => TreeNode::Mark {
                mark: *mark,
                child: new,
            },
            TreeNode::Context { context, .. } => TreeNode::Context {
                context: context.clone(),
                child: new,
            },
            TreeNode::Extension { extension, .. } => TreeNode::Extension {
                extension: extension.clone(),
                child: new,
            },
            TreeNode::Sequence { children } => {
                let mut children = children.clone();
                children[i] = new;
                TreeNode::Sequence { children }
            }
            TreeNode::Leaf => unreachable!("leaf has no children"),
        }
    }

    pub fn is_band(&self) -> bool {
        matches!(self, TreeNode::Band { .. })
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf)
    }

    pub fn is_mark(&self, name: &str) -> bool {
        matches!(self, TreeNode::Mark { mark, .. } if *mark == *name)
    }

    pub fn band_n_member(&self) -> usize {
        match self {
            TreeNode::Band { partial, .. } => partial.n_member,
            _ => 0,
        }
    }
}

/// A complete schedule: a `Domain` node and its descendants.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Schedule {
    pub root: Rc<TreeNode>,
}

impl Schedule {
    /// A schedule executing `domain` with no ordering constraints yet.
    pub fn from_domain(domain: UnionSet) -> Self {
        Schedule {
            root: Rc::new(TreeNode::Domain {
                domain,
                child: Rc::new(TreeNode::Leaf),
            }),
        }
    }

    pub fn new(root: Rc<TreeNode>) -> Self {
        debug_assert!(matches!(&*root, TreeNode::Domain { .. }));
        Schedule { root }
    }

    pub fn domain(&self) -> &UnionSet {
        match &*self.root {
            TreeNode::Domain { domain, .. } => domain,
            _ => unreachable!("schedule root is always a domain node"),
        }
    }

    /// Collect every statement tuple mentioned in the domain.
    pub fn stmts(&self) -> Vec<Id> {
        self.domain().sets.iter().filter_map(|s| s.tuple).collect()
    }
}

/// Bounds of an affine expression over a set: introduce a fresh dimension
/// pinned to the expression and read its constant bounds.
pub fn aff_bounds(set: &Set, aff: &Aff) -> Option<(i64, i64)> {
    debug_assert_eq!(set.dim, aff.dim());
    let mut bounds: Option<(i64, i64)> = None;
    for bs in &set.basics {
        // dims: [x.., t] with t - aff(x) = 0
        let mut pinned = crate::set::BasicSet {
            tuple: None,
            dim: bs.dim + 1,
            cons: bs.cons.iter().map(|c| c.insert_dims(bs.dim, 1)).collect(),
        };
        let mut body = aff.insert_dims(bs.dim, 1).scale(-1);
        body.coeffs[bs.dim] += 1;
        pinned.add_constraint(Constraint::Eq(body));
        let (lb, ub) = pinned.dim_bounds(bs.dim)?;
        bounds = Some(match bounds {
            None => (lb, ub),
            Some((l, u)) => (l.min(lb), u.max(ub)),
        });
    }
    bounds
}

/// Whether `aff` takes a single constant value over `set`.
pub fn aff_is_constant_on(set: &Set, aff: &Aff) -> TriState {
    match aff_bounds(set, aff) {
        Some((l, u)) => TriState::from_bool(l == u),
        None => TriState::Maybe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::BasicSet;

    #[test]
    fn aff_bounds_over_a_box() {
        // x + 2y over 0<=x<=3, 0<=y<=4 ranges over [0, 11]
        let set = Set::from_basic(
            BasicSet::universe(None, 2).bound_dim(0, 0, 3).bound_dim(1, 0, 4),
        );
        let aff = Aff::var(2, 0).add(&Aff::var(2, 1).scale(2));
        assert_eq!(aff_bounds(&set, &aff), Some((0, 11)));
    }

    #[test]
    fn with_child_is_non_destructive() {
        let domain = UnionSet::from_set(Set::from_basic(
            BasicSet::universe(Some(Id::new("S0")), 1).bound_dim(0, 0, 7),
        ));
        let sched = Schedule::from_domain(domain);
        let edited = sched.root.with_child(
            0,
            Rc::new(TreeNode::Mark {
                mark: Id::new("kernel"),
                child: Rc::new(TreeNode::Leaf),
            }),
        );
        // original still has a leaf child
        assert!(sched.root.child(0).unwrap().is_leaf());
        assert!(edited.child(0).unwrap().is_mark("kernel"));
    }
}
