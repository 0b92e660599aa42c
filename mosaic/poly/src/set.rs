//! Basic sets (conjunctions of affine constraints) and their finite unions.

use crate::aff::{Aff, Constraint};
use crate::fm;
use mosaic_utils::Id;

/// Three-valued answer for questions the integer machinery cannot always
/// decide exactly. `Maybe` signals that the caller must not assume either
/// answer.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TriState {
    Yes,
    No,
    Maybe,
}

impl TriState {
    pub fn not(self) -> TriState {
        match self {
            TriState::Yes => TriState::No,
            TriState::No => TriState::Yes,
            TriState::Maybe => TriState::Maybe,
        }
    }

    pub fn is_yes(self) -> bool {
        self == TriState::Yes
    }

    pub fn is_maybe(self) -> bool {
        self == TriState::Maybe
    }

    pub fn from_bool(b: bool) -> TriState {
        if b { TriState::Yes } else { TriState::No }
    }
}

/// A conjunction of affine constraints over `dim` set dimensions, optionally
/// named by the statement tuple it ranges over.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BasicSet {
    pub tuple: Option<Id>,
    pub dim: usize,
    pub cons: Vec<Constraint>,
}

impl BasicSet {
    pub fn universe(tuple: Option<Id>, dim: usize) -> Self {
        BasicSet {
            tuple,
            dim,
            cons: Vec::new(),
        }
    }

    pub fn with_constraint(mut self, c: Constraint) -> Self {
        debug_assert_eq!(c.dim(), self.dim);
        self.cons.push(c);
        self
    }

    pub fn add_constraint(&mut self, c: Constraint) {
        debug_assert_eq!(c.dim(), self.dim);
        self.cons.push(c);
    }

    pub fn intersect(&self, other: &BasicSet) -> BasicSet {
        debug_assert_eq!(self.dim, other.dim);
        let mut out = self.clone();
        out.cons.extend(other.cons.iter().cloned());
        out
    }

    /// Bound dimension `idx` to `lb <= x_idx <= ub`.
    pub fn bound_dim(mut self, idx: usize, lb: i64, ub: i64) -> Self {
        let x = Aff::var(self.dim, idx);
        self.cons.push(Constraint::Ge(x.add_constant(-lb)));
        self.cons
            .push(Constraint::Ge(x.scale(-1).add_constant(ub)));
        self
    }

    pub fn is_empty(&self) -> TriState {
        fm::basic_set_is_empty(self)
    }

    pub fn contains(&self, point: &[i64]) -> Option<bool> {
        debug_assert_eq!(point.len(), self.dim);
        let mut res = true;
        for c in &self.cons {
            res &= c.holds_at(point)?;
        }
        Some(res)
    }

    /// Eliminate `count` dimensions starting at `pos`. The second result is
    /// false when the projection had to over-approximate.
    pub fn project_out(&self, pos: usize, count: usize) -> (BasicSet, bool) {
        fm::project_out(self, pos, count)
    }

    /// Constant lower/upper bounds of a dimension, when they exist.
    pub fn dim_bounds(&self, idx: usize) -> Option<(i64, i64)> {
        fm::dim_bounds(self, idx)
    }

    /// The negation of every constraint, as a union of basic sets. `None`
    /// when a congruence constraint blocks exact complementation.
    pub fn complement(&self) -> Option<Set> {
        let mut out = Set::empty(self.tuple, self.dim);
        for c in &self.cons {
            match c {
                Constraint::Ge(a) => {
                    // not (a >= 0)  <=>  -a - 1 >= 0
                    out.basics.push(
                        BasicSet::universe(self.tuple, self.dim)
                            .with_constraint(Constraint::Ge(
                                a.scale(-1).add_constant(-1),
                            )),
                    );
                }
                Constraint::Eq(a) => {
                    out.basics.push(
                        BasicSet::universe(self.tuple, self.dim)
                            .with_constraint(Constraint::Ge(
                                a.add_constant(-1),
                            )),
                    );
                    out.basics.push(
                        BasicSet::universe(self.tuple, self.dim)
                            .with_constraint(Constraint::Ge(
                                a.scale(-1).add_constant(-1),
                            )),
                    );
                }
                Constraint::Mod(..) => return None,
            }
        }
        Some(out)
    }

    /// Shift dimension `idx` by a constant: x_idx := x_idx + delta.
    pub fn shift_dim(&self, idx: usize, delta: i64) -> BasicSet {
        let mut out = self.clone();
        for c in out.cons.iter_mut() {
            let a = match c {
                Constraint::Eq(a) | Constraint::Ge(a) | Constraint::Mod(a, _) => a,
            };
            // substituting x := x - delta in the constraint body
            a.cst -= a.coeffs[idx] * delta;
        }
        out
    }
}

/// A finite union of basic sets over the same space. The empty union is the
/// empty set; a single unconstrained basic set is the universe.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Set {
    pub tuple: Option<Id>,
    pub dim: usize,
    pub basics: Vec<BasicSet>,
}

impl Set {
    pub fn empty(tuple: Option<Id>, dim: usize) -> Self {
        Set {
            tuple,
            dim,
            basics: Vec::new(),
        }
    }

    pub fn universe(tuple: Option<Id>, dim: usize) -> Self {
        Set {
            tuple,
            dim,
            basics: vec![BasicSet::universe(tuple, dim)],
        }
    }

    pub fn from_basic(bs: BasicSet) -> Self {
        Set {
            tuple: bs.tuple,
            dim: bs.dim,
            basics: vec![bs],
        }
    }

    pub fn union(&self, other: &Set) -> Set {
        debug_assert_eq!(self.dim, other.dim);
        let mut out = self.clone();
        out.basics.extend(other.basics.iter().cloned());
        out
    }

    pub fn intersect(&self, other: &Set) -> Set {
        debug_assert_eq!(self.dim, other.dim);
        let mut out = Set::empty(self.tuple, self.dim);
        for a in &self.basics {
            for b in &other.basics {
                out.basics.push(a.intersect(b));
            }
        }
        out
    }

    /// `self \ other`. `None` when the subtrahend cannot be complemented
    /// exactly.
    pub fn subtract(&self, other: &Set) -> Option<Set> {
        debug_assert_eq!(self.dim, other.dim);
        let mut acc = self.clone();
        for b in &other.basics {
            let neg = b.complement()?;
            acc = acc.intersect(&neg);
        }
        Some(acc)
    }

    pub fn is_empty(&self) -> TriState {
        let mut saw_maybe = false;
        for b in &self.basics {
            match b.is_empty() {
                TriState::No => return TriState::No,
                TriState::Maybe => saw_maybe = true,
                TriState::Yes => {}
            }
        }
        if saw_maybe {
            TriState::Maybe
        } else {
            TriState::Yes
        }
    }

    pub fn project_out(&self, pos: usize, count: usize) -> (Set, bool) {
        let mut exact = true;
        let mut out = Set::empty(self.tuple, self.dim.saturating_sub(count));
        for b in &self.basics {
            let (p, e) = b.project_out(pos, count);
            exact &= e;
            out.basics.push(p);
        }
        out.dim = self.dim - count;
        (out, exact)
    }

    /// Constant bounds of a dimension across the whole union.
    pub fn dim_bounds(&self, idx: usize) -> Option<(i64, i64)> {
        let mut bounds: Option<(i64, i64)> = None;
        for b in &self.basics {
            let (lb, ub) = b.dim_bounds(idx)?;
            bounds = Some(match bounds {
                None => (lb, ub),
                Some((l, u)) => (l.min(lb), u.max(ub)),
            });
        }
        bounds
    }

    pub fn shift_dim(&self, idx: usize, delta: i64) -> Set {
        Set {
            tuple: self.tuple,
            dim: self.dim,
            basics: self
                .basics
                .iter()
                .map(|b| b.shift_dim(idx, delta))
                .collect(),
        }
    }

    pub fn contains(&self, point: &[i64]) -> Option<bool> {
        let mut res = false;
        for b in &self.basics {
            res |= b.contains(point)?;
        }
        Some(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interval(lb: i64, ub: i64) -> BasicSet {
        BasicSet::universe(None, 1).bound_dim(0, lb, ub)
    }

    #[test]
    fn emptiness_of_intervals() {
        assert_eq!(interval(0, 7).is_empty(), TriState::No);
        assert_eq!(interval(4, 3).is_empty(), TriState::Yes);
    }

    #[test]
    fn subtract_removes_the_overlap() {
        let a = Set::from_basic(interval(0, 10));
        let b = Set::from_basic(interval(0, 10));
        let diff = a.subtract(&b).unwrap();
        assert_eq!(diff.is_empty(), TriState::Yes);

        let c = Set::from_basic(interval(5, 20));
        let diff = a.subtract(&c).unwrap();
        // 0..=4 remains
        assert_eq!(diff.is_empty(), TriState::No);
        assert_eq!(diff.contains(&[4]), Some(true));
        assert_eq!(diff.contains(&[5]), Some(false));
    }

    #[test]
    fn shift_preserves_membership_relative_to_shift() {
        let s = Set::from_basic(interval(0, 3)).shift_dim(0, 100);
        assert_eq!(s.contains(&[100]), Some(true));
        assert_eq!(s.contains(&[103]), Some(true));
        assert_eq!(s.contains(&[99]), Some(false));
    }

    #[test]
    fn dim_bounds_across_union() {
        let s =
            Set::from_basic(interval(0, 3)).union(&Set::from_basic(interval(10, 12)));
        assert_eq!(s.dim_bounds(0), Some((0, 12)));
    }
}
