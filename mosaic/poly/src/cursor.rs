//! A path-copying cursor over persistent schedule trees.
//!
//! The cursor records a position as a child-index path from the root.
//! Reads walk the shared tree; edits rebuild the nodes along the path and
//! return a cursor into the new version, so the pre-edit tree stays valid.

use crate::aff::Aff;
use crate::map::{BasicMap, Map};
use crate::tree::{MultiUnionAff, Schedule, TreeNode};
use crate::union::{UnionMap, UnionSet};
use mosaic_utils::{Error, Id, MosaicResult};
use std::rc::Rc;

#[derive(Clone, Debug)]
pub struct Cursor {
    root: Rc<TreeNode>,
    path: Vec<usize>,
}

impl Cursor {
    /// A cursor at the root (domain node) of `schedule`.
    pub fn at_root(schedule: &Schedule) -> Self {
        Cursor {
            root: Rc::clone(&schedule.root),
            path: Vec::new(),
        }
    }

    /// The finished schedule containing this cursor's edits.
    pub fn schedule(&self) -> Schedule {
        Schedule::new(Rc::clone(&self.root))
    }

    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// The node the cursor points at.
    pub fn node(&self) -> &TreeNode {
        let mut cur: &TreeNode = &self.root;
        for &i in &self.path {
            cur = cur
                .child(i)
                .expect("cursor path is kept consistent with the tree");
        }
        cur
    }

    fn node_rc(&self) -> Rc<TreeNode> {
        let mut cur: Rc<TreeNode> = Rc::clone(&self.root);
        for &i in &self.path {
            let next = Rc::clone(
                cur.child(i)
                    .expect("cursor path is kept consistent with the tree"),
            );
            cur = next;
        }
        cur
    }

    /// Replace the pointed-at subtree, rebuilding the spine to the root.
    pub fn replace(&self, new: Rc<TreeNode>) -> Cursor {
        // collect the nodes along the path
        let mut spine: Vec<Rc<TreeNode>> = Vec::with_capacity(self.path.len());
        let mut cur: Rc<TreeNode> = Rc::clone(&self.root);
        for &i in &self.path {
            spine.push(Rc::clone(&cur));
            let next = Rc::clone(cur.child(i).expect("consistent path"));
            cur = next;
        }
        // rebuild bottom-up
        let mut rebuilt = new;
        for (node, &i) in spine.iter().zip(self.path.iter()).rev() {
            rebuilt = Rc::new(node.with_child(i, rebuilt));
        }
        Cursor {
            root: rebuilt,
            path: self.path.clone(),
        }
    }

    // ---- navigation ----

    pub fn child(&self, i: usize) -> MosaicResult<Cursor> {
        if i >= self.node().n_children() {
            return Err(Error::invalid_navigation(format!(
                "node has {} children, wanted child {}",
                self.node().n_children(),
                i
            )));
        }
        let mut out = self.clone();
        out.path.push(i);
        Ok(out)
    }

    pub fn parent(&self) -> MosaicResult<Cursor> {
        if self.path.is_empty() {
            return Err(Error::invalid_navigation("root has no parent"));
        }
        let mut out = self.clone();
        out.path.pop();
        Ok(out)
    }

    /// Position of this node within its parent.
    pub fn child_position(&self) -> usize {
        *self.path.last().unwrap_or(&0)
    }

    /// Depth-first search for a mark named `name` at or below the cursor.
    pub fn find_mark(&self, name: &str) -> Option<Cursor> {
        fn dfs(
            node: &TreeNode,
            name: &str,
            path: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            if node.is_mark(name) {
                return Some(path.clone());
            }
            for i in 0..node.n_children() {
                path.push(i);
                if let Some(found) = dfs(node.child(i)?, name, path) {
                    return Some(found);
                }
                path.pop();
            }
            None
        }
        let mut rel = Vec::new();
        let found = dfs(self.node(), name, &mut rel)?;
        let mut path = self.path.clone();
        path.extend(found);
        Some(Cursor {
            root: Rc::clone(&self.root),
            path,
        })
    }

    /// Like [`Cursor::find_mark`] but an error when absent.
    pub fn move_down_to_mark(&self, name: &str) -> MosaicResult<Cursor> {
        self.find_mark(name).ok_or_else(|| {
            Error::invalid_navigation(format!("no mark `{name}' below cursor"))
        })
    }

    /// Walk up to the nearest enclosing mark named `name`.
    pub fn move_up_to_mark(&self, name: &str) -> MosaicResult<Cursor> {
        let mut cur = self.clone();
        loop {
            if cur.node().is_mark(name) {
                return Ok(cur);
            }
            if cur.is_root() {
                return Err(Error::invalid_navigation(format!(
                    "no mark `{name}' above cursor"
                )));
            }
            cur = cur.parent()?;
        }
    }

    // ---- edits; each returns a cursor into the new tree ----

    /// Insert a filter at the current position; the old subtree becomes its
    /// child and the cursor points at the inserted filter.
    pub fn insert_filter(&self, filter: UnionSet) -> Cursor {
        let old = self.node_rc();
        self.replace(Rc::new(TreeNode::Filter { filter, child: old }))
    }

    pub fn insert_mark(&self, mark: Id) -> Cursor {
        let old = self.node_rc();
        self.replace(Rc::new(TreeNode::Mark { mark, child: old }))
    }

    pub fn insert_context(
        &self,
        context: Vec<crate::aff::Constraint>,
    ) -> Cursor {
        let old = self.node_rc();
        self.replace(Rc::new(TreeNode::Context {
            context,
            child: old,
        }))
    }

    /// Insert a partial schedule (band) at the current position.
    pub fn insert_partial_schedule(&self, partial: MultiUnionAff) -> Cursor {
        let old = self.node_rc();
        self.replace(Rc::new(TreeNode::Band {
            partial,
            child: old,
        }))
    }

    /// Insert a sequence of filter branches at the current position; each
    /// branch gets its own copy of the old subtree. The cursor points at
    /// the sequence.
    pub fn insert_sequence(&self, filters: Vec<UnionSet>) -> Cursor {
        let old = self.node_rc();
        let children = filters
            .into_iter()
            .map(|filter| {
                Rc::new(TreeNode::Filter {
                    filter,
                    child: Rc::clone(&old),
                })
            })
            .collect();
        self.replace(Rc::new(TreeNode::Sequence { children }))
    }

    /// Split the band at the cursor into members `[0, pos)` over
    /// `[pos, n)`; the cursor stays at the outer band.
    pub fn band_split(&self, pos: usize) -> MosaicResult<Cursor> {
        let TreeNode::Band { partial, child } = self.node() else {
            return Err(Error::invalid_navigation("band_split on a non-band"));
        };
        let (head, tail) = partial.split(pos);
        let inner = Rc::new(TreeNode::Band {
            partial: tail,
            child: Rc::clone(child),
        });
        Ok(self.replace(Rc::new(TreeNode::Band {
            partial: head,
            child: inner,
        })))
    }

    /// Remove the subtree at the current position, leaving a leaf.
    pub fn cut(&self) -> Cursor {
        self.replace(Rc::new(TreeNode::Leaf))
    }

    /// Delete the pointed-at node, splicing its only child into its place.
    /// The cursor moves to the spliced child.
    pub fn delete(&self) -> MosaicResult<Cursor> {
        let node = self.node();
        if node.n_children() != 1 {
            return Err(Error::invalid_navigation(
                "delete requires a single-child node",
            ));
        }
        let child = Rc::clone(node.child(0).expect("single child"));
        Ok(self.replace(child))
    }

    /// Graft `subtree` (normally rooted at an extension node) to execute
    /// before the current position. The cursor follows the original
    /// subtree.
    pub fn graft_before(&self, subtree: Rc<TreeNode>) -> Cursor {
        self.graft(subtree, true)
    }

    /// Graft `subtree` to execute after the current position.
    pub fn graft_after(&self, subtree: Rc<TreeNode>) -> Cursor {
        self.graft(subtree, false)
    }

    fn graft(&self, subtree: Rc<TreeNode>, before: bool) -> Cursor {
        let old = self.node_rc();
        let (children, old_pos) = if before {
            (vec![subtree, old], 1)
        } else {
            (vec![old, subtree], 0)
        };
        let seq = Rc::new(TreeNode::Sequence { children });
        let mut out = self.replace(seq);
        out.path.push(old_pos);
        out
    }

    // ---- derived information ----

    /// Number of band members strictly above the cursor.
    pub fn schedule_depth(&self) -> usize {
        let mut depth = 0;
        let mut cur: &TreeNode = &self.root;
        for &i in &self.path {
            if let TreeNode::Band { partial, .. } = cur {
                depth += partial.n_member;
            }
            cur = cur.child(i).expect("consistent path");
        }
        depth
    }

    /// The statement instances that reach this node: the root domain plus
    /// any extension ranges above, narrowed by the filters along the path.
    pub fn reaching_domain(&self) -> UnionSet {
        let mut acc = UnionSet::empty();
        let mut cur: &TreeNode = &self.root;
        let mut filters: Vec<&UnionSet> = Vec::new();
        for &i in &self.path {
            match cur {
                TreeNode::Domain { domain, .. } => {
                    acc = acc.union(domain);
                }
                TreeNode::Extension { extension, .. } => {
                    let (rng, _) = extension.range();
                    acc = acc.union(&rng);
                }
                TreeNode::Filter { filter, .. } => filters.push(filter),
                TreeNode::Sequence { .. } => {}
                _ => {}
            }
            cur = cur.child(i).expect("consistent path");
        }
        if let TreeNode::Domain { domain, .. } = cur {
            acc = acc.union(domain);
        }
        for f in filters {
            acc = acc.intersect(f);
        }
        acc
    }

    /// Like [`Cursor::reaching_domain`] but ignoring filters that mention
    /// symbolic parameters. Instance-selection filters are parametric while
    /// the transferred regions they guard must stay constant, so region
    /// computations skip them.
    pub fn reaching_domain_ground(&self) -> UnionSet {
        let mut acc = UnionSet::empty();
        let mut cur: &TreeNode = &self.root;
        let mut filters: Vec<&UnionSet> = Vec::new();
        for &i in &self.path {
            match cur {
                TreeNode::Domain { domain, .. } => {
                    acc = acc.union(domain);
                }
                TreeNode::Extension { extension, .. } => {
                    let (rng, _) = extension.range();
                    acc = acc.union(&rng);
                }
                TreeNode::Filter { filter, .. } => {
                    let parametric = filter.sets.iter().any(|s| {
                        s.basics.iter().any(|bs| {
                            bs.cons.iter().any(|c| c.aff().has_params())
                        })
                    });
                    if !parametric {
                        filters.push(filter);
                    }
                }
                _ => {}
            }
            cur = cur.child(i).expect("consistent path");
        }
        if let TreeNode::Domain { domain, .. } = cur {
            acc = acc.union(domain);
        }
        for f in filters {
            acc = acc.intersect(f);
        }
        acc
    }

    /// Like [`Cursor::reaching_domain`] but ignoring the filters along the
    /// path. Extension ranges are not narrowed by outer filters, so bound
    /// computations below an extension node must use this variant.
    pub fn reaching_domain_unfiltered(&self) -> UnionSet {
        let mut acc = UnionSet::empty();
        let mut cur: &TreeNode = &self.root;
        for &i in &self.path {
            match cur {
                TreeNode::Domain { domain, .. } => acc = acc.union(domain),
                TreeNode::Extension { extension, .. } => {
                    let (rng, _) = extension.range();
                    acc = acc.union(&rng);
                }
                _ => {}
            }
            cur = cur.child(i).expect("consistent path");
        }
        if let TreeNode::Domain { domain, .. } = cur {
            acc = acc.union(domain);
        }
        acc
    }

    /// Whether the nearest statement-introducing ancestor is an extension
    /// node rather than the root domain.
    pub fn under_extension(&self) -> bool {
        let mut cur: &TreeNode = &self.root;
        let mut under = false;
        for &i in &self.path {
            if matches!(cur, TreeNode::Extension { .. }) {
                under = true;
            }
            cur = cur.child(i).expect("consistent path");
        }
        under
    }

    /// The partial-schedule prefix reaching this node, as one relation per
    /// statement: statement instances to their schedule vector.
    pub fn prefix_schedule(&self) -> UnionMap {
        let domain = self.reaching_domain();
        // gather band expressions along the path, per statement
        let mut per_stmt: Vec<(Id, Vec<Aff>)> = Vec::new();
        let mut cur: &TreeNode = &self.root;
        for &i in &self.path {
            if let TreeNode::Band { partial, .. } = cur {
                for (stmt, affs) in &partial.per_stmt {
                    match per_stmt.iter_mut().find(|(s, _)| s == stmt) {
                        Some((_, acc)) => acc.extend(affs.iter().cloned()),
                        None => per_stmt.push((*stmt, affs.clone())),
                    }
                }
            }
            cur = cur.child(i).expect("consistent path");
        }
        let mut out = UnionMap::empty();
        for set in &domain.sets {
            let Some(stmt) = set.tuple else { continue };
            let affs: Vec<Aff> = per_stmt
                .iter()
                .find(|(s, _)| *s == stmt)
                .map(|(_, a)| a.clone())
                .unwrap_or_default();
            if affs.iter().any(|a| a.dim() != set.dim) {
                continue;
            }
            let bm = BasicMap::from_affs(Some(stmt), set.dim, None, &affs);
            out.add_map(Map::from_basic(bm).intersect_domain(set));
        }
        out
    }

    /// The values a band member takes over the instances reaching the
    /// band, as constant bounds. `None` when unbounded or parametric.
    pub fn band_member_bounds(&self, member: usize) -> Option<(i64, i64)> {
        let TreeNode::Band { partial, .. } = self.node() else {
            return None;
        };
        let domain = self.reaching_domain();
        let mut bounds: Option<(i64, i64)> = None;
        for (stmt, affs) in &partial.per_stmt {
            let Some(set) = domain.get(*stmt) else { continue };
            if set.basics.is_empty() {
                continue;
            }
            let (lb, ub) = crate::tree::aff_bounds(set, &affs[member])?;
            bounds = Some(match bounds {
                None => (lb, ub),
                Some((l, u)) => (l.min(lb), u.max(ub)),
            });
        }
        bounds
    }
}

/// Build a subtree that introduces `stmt` as a zero-dimensional statement
/// under an extension node, scheduled by a single zero-valued band member.
/// `prefix` is the relation from existing schedule prefixes to the new
/// statement instance.
pub fn extension_leaf(prefix: UnionMap, stmt: Id) -> Rc<TreeNode> {
    let zero_band = MultiUnionAff::new(1).add_stmt(stmt, vec![Aff::zero(0)]);
    Rc::new(TreeNode::Extension {
        extension: prefix,
        child: Rc::new(TreeNode::Band {
            partial: zero_band,
            child: Rc::new(TreeNode::Leaf),
        }),
    })
}

/// The `{ prefix -> stmt[] }` relation used by [`extension_leaf`]: every
/// prefix vector of length `depth` maps to the unique instance of `stmt`.
pub fn universal_extension(depth: usize, stmt: Id) -> UnionMap {
    UnionMap::from_map(Map::from_basic(BasicMap::universe(
        None,
        depth,
        Some(stmt),
        0,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set::{BasicSet, Set};

    fn base() -> Schedule {
        // S0 over 0..=7 under a kernel mark and a one-member band
        let stmt = Id::new("S0");
        let domain = UnionSet::from_set(Set::from_basic(
            BasicSet::universe(Some(stmt), 1).bound_dim(0, 0, 7),
        ));
        let sched = Schedule::from_domain(domain);
        let cursor = Cursor::at_root(&sched).child(0).unwrap();
        let banded = cursor.insert_partial_schedule(
            MultiUnionAff::new(1).add_stmt(stmt, vec![Aff::var(1, 0)]),
        );
        let marked = banded.insert_mark(Id::new("kernel"));
        marked.schedule()
    }

    #[test]
    fn edits_do_not_disturb_the_source_tree() {
        let sched = base();
        let cursor = Cursor::at_root(&sched)
            .move_down_to_mark("kernel")
            .unwrap()
            .child(0)
            .unwrap();
        let _edited = cursor.insert_mark(Id::new("pe"));
        // the original tree still has a band directly under the kernel mark
        let orig = Cursor::at_root(&sched)
            .move_down_to_mark("kernel")
            .unwrap()
            .child(0)
            .unwrap();
        assert!(orig.node().is_band());
    }

    #[test]
    fn schedule_depth_counts_band_members() {
        let sched = base();
        let under_band = Cursor::at_root(&sched)
            .move_down_to_mark("kernel")
            .unwrap()
            .child(0)
            .unwrap()
            .child(0)
            .unwrap();
        assert_eq!(under_band.schedule_depth(), 1);
    }

    #[test]
    fn band_member_bounds_reflect_the_domain() {
        let sched = base();
        let band = Cursor::at_root(&sched)
            .move_down_to_mark("kernel")
            .unwrap()
            .child(0)
            .unwrap();
        assert_eq!(band.band_member_bounds(0), Some((0, 7)));
    }

    #[test]
    fn graft_before_sequences_the_new_branch_first() {
        let sched = base();
        let band = Cursor::at_root(&sched)
            .move_down_to_mark("kernel")
            .unwrap()
            .child(0)
            .unwrap();
        let stmt = Id::new("in.fifo_A.1.1");
        let graft = extension_leaf(universal_extension(0, stmt), stmt);
        let after = band.graft_before(graft);
        // parent is now a sequence with the graft first
        let seq = after.parent().unwrap();
        assert_eq!(seq.node().n_children(), 2);
        assert!(matches!(
            &**seq.node().child(0).unwrap(),
            TreeNode::Extension { .. }
        ));
        assert!(after.node().is_band());
    }

    #[test]
    fn filters_narrow_the_reaching_domain() {
        let sched = base();
        let stmt = Id::new("S0");
        let band = Cursor::at_root(&sched)
            .move_down_to_mark("kernel")
            .unwrap()
            .child(0)
            .unwrap();
        let filter = UnionSet::from_set(Set::from_basic(
            BasicSet::universe(Some(stmt), 1).bound_dim(0, 0, 3),
        ));
        let filtered = band.insert_filter(filter).child(0).unwrap();
        let dom = filtered.reaching_domain();
        assert_eq!(dom.get(stmt).unwrap().dim_bounds(0), Some((0, 3)));
    }
}
