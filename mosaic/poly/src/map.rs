//! Binary affine relations. Dimensions are ordered input-then-output, so a
//! `BasicMap` is a `BasicSet` over `n_in + n_out` dimensions with tuple
//! names on both sides.

use crate::aff::{Aff, Constraint};
use crate::set::{BasicSet, Set, TriState};
use mosaic_utils::Id;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct BasicMap {
    pub in_tuple: Option<Id>,
    pub out_tuple: Option<Id>,
    pub n_in: usize,
    pub n_out: usize,
    pub cons: Vec<Constraint>,
}

impl BasicMap {
    pub fn universe(
        in_tuple: Option<Id>,
        n_in: usize,
        out_tuple: Option<Id>,
        n_out: usize,
    ) -> Self {
        BasicMap {
            in_tuple,
            out_tuple,
            n_in,
            n_out,
            cons: Vec::new(),
        }
    }

    pub fn dim(&self) -> usize {
        self.n_in + self.n_out
    }

    pub fn with_constraint(mut self, c: Constraint) -> Self {
        debug_assert_eq!(c.dim(), self.dim());
        self.cons.push(c);
        self
    }

    /// The relation `out_j = affs[j](in)` where each expression ranges over
    /// the input dimensions only.
    pub fn from_affs(
        in_tuple: Option<Id>,
        n_in: usize,
        out_tuple: Option<Id>,
        affs: &[Aff],
    ) -> Self {
        let n_out = affs.len();
        let dim = n_in + n_out;
        let mut bm = BasicMap::universe(in_tuple, n_in, out_tuple, n_out);
        for (j, aff) in affs.iter().enumerate() {
            debug_assert_eq!(aff.dim(), n_in);
            // out_j - aff(in) = 0
            let mut body = aff.insert_dims(n_in, n_out).scale(-1);
            body.coeffs[n_in + j] += 1;
            bm.cons.push(Constraint::Eq(body));
        }
        debug_assert_eq!(bm.dim(), dim);
        bm
    }

    fn as_basic_set(&self) -> BasicSet {
        BasicSet {
            tuple: None,
            dim: self.dim(),
            cons: self.cons.clone(),
        }
    }

    pub fn reverse(&self) -> BasicMap {
        let mut cons = Vec::with_capacity(self.cons.len());
        for c in &self.cons {
            let a = c.aff();
            let mut b = a.clone();
            // rotate dims: [in, out] -> [out, in]
            for i in 0..self.n_in {
                b.coeffs[self.n_out + i] = a.coeffs[i];
            }
            for j in 0..self.n_out {
                b.coeffs[j] = a.coeffs[self.n_in + j];
            }
            cons.push(match c {
                Constraint::Eq(_) => Constraint::Eq(b),
                Constraint::Ge(_) => Constraint::Ge(b),
                Constraint::Mod(_, m) => Constraint::Mod(b, *m),
            });
        }
        BasicMap {
            in_tuple: self.out_tuple,
            out_tuple: self.in_tuple,
            n_in: self.n_out,
            n_out: self.n_in,
            cons,
        }
    }

    pub fn intersect(&self, other: &BasicMap) -> BasicMap {
        debug_assert_eq!(self.n_in, other.n_in);
        debug_assert_eq!(self.n_out, other.n_out);
        let mut out = self.clone();
        out.cons.extend(other.cons.iter().cloned());
        out
    }

    pub fn intersect_domain(&self, dom: &BasicSet) -> BasicMap {
        debug_assert_eq!(dom.dim, self.n_in);
        let mut out = self.clone();
        for c in &dom.cons {
            out.cons.push(c.insert_dims(self.n_in, self.n_out));
        }
        out
    }

    pub fn intersect_range(&self, rng: &BasicSet) -> BasicMap {
        debug_assert_eq!(rng.dim, self.n_out);
        let mut out = self.clone();
        for c in &rng.cons {
            out.cons.push(c.insert_dims(0, self.n_in));
        }
        out
    }

    /// Project away the output dimensions.
    pub fn domain(&self) -> (BasicSet, bool) {
        let (bs, exact) = self.as_basic_set().project_out(self.n_in, self.n_out);
        (
            BasicSet {
                tuple: self.in_tuple,
                ..bs
            },
            exact,
        )
    }

    /// Project away the input dimensions.
    pub fn range(&self) -> (BasicSet, bool) {
        let (bs, exact) = self.as_basic_set().project_out(0, self.n_in);
        (
            BasicSet {
                tuple: self.out_tuple,
                ..bs
            },
            exact,
        )
    }

    /// Composition `other ∘ self`: `self: A -> B`, `other: B -> C` gives
    /// `A -> C`. The mid dimensions are eliminated.
    pub fn apply_range(&self, other: &BasicMap) -> (BasicMap, bool) {
        debug_assert_eq!(self.n_out, other.n_in);
        let n_a = self.n_in;
        let n_b = self.n_out;
        let n_c = other.n_out;
        // dims: [A, B, C]
        let mut cons: Vec<Constraint> = self
            .cons
            .iter()
            .map(|c| c.insert_dims(n_a + n_b, n_c))
            .collect();
        cons.extend(other.cons.iter().map(|c| c.insert_dims(0, n_a)));
        let joint = BasicSet {
            tuple: None,
            dim: n_a + n_b + n_c,
            cons,
        };
        let (proj, exact) = joint.project_out(n_a, n_b);
        (
            BasicMap {
                in_tuple: self.in_tuple,
                out_tuple: other.out_tuple,
                n_in: n_a,
                n_out: n_c,
                cons: proj.cons,
            },
            exact,
        )
    }

    pub fn is_empty(&self) -> TriState {
        self.as_basic_set().is_empty()
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Map {
    pub in_tuple: Option<Id>,
    pub out_tuple: Option<Id>,
    pub n_in: usize,
    pub n_out: usize,
    pub basics: Vec<BasicMap>,
}

impl Map {
    pub fn empty(
        in_tuple: Option<Id>,
        n_in: usize,
        out_tuple: Option<Id>,
        n_out: usize,
    ) -> Self {
        Map {
            in_tuple,
            out_tuple,
            n_in,
            n_out,
            basics: Vec::new(),
        }
    }

    pub fn from_basic(bm: BasicMap) -> Self {
        Map {
            in_tuple: bm.in_tuple,
            out_tuple: bm.out_tuple,
            n_in: bm.n_in,
            n_out: bm.n_out,
            basics: vec![bm],
        }
    }

    pub fn union(&self, other: &Map) -> Map {
        let mut out = self.clone();
        out.basics.extend(other.basics.iter().cloned());
        out
    }

    pub fn intersect(&self, other: &Map) -> Map {
        let mut out = Map::empty(self.in_tuple, self.n_in, self.out_tuple, self.n_out);
        for a in &self.basics {
            for b in &other.basics {
                out.basics.push(a.intersect(b));
            }
        }
        out
    }

    pub fn intersect_domain(&self, dom: &Set) -> Map {
        let mut out = Map::empty(self.in_tuple, self.n_in, self.out_tuple, self.n_out);
        for a in &self.basics {
            for d in &dom.basics {
                out.basics.push(a.intersect_domain(d));
            }
        }
        out
    }

    pub fn intersect_range(&self, rng: &Set) -> Map {
        let mut out = Map::empty(self.in_tuple, self.n_in, self.out_tuple, self.n_out);
        for a in &self.basics {
            for r in &rng.basics {
                out.basics.push(a.intersect_range(r));
            }
        }
        out
    }

    pub fn reverse(&self) -> Map {
        Map {
            in_tuple: self.out_tuple,
            out_tuple: self.in_tuple,
            n_in: self.n_out,
            n_out: self.n_in,
            basics: self.basics.iter().map(|b| b.reverse()).collect(),
        }
    }

    pub fn domain(&self) -> (Set, bool) {
        let mut exact = true;
        let mut out = Set::empty(self.in_tuple, self.n_in);
        for b in &self.basics {
            let (bs, e) = b.domain();
            exact &= e;
            out.basics.push(bs);
        }
        (out, exact)
    }

    pub fn range(&self) -> (Set, bool) {
        let mut exact = true;
        let mut out = Set::empty(self.out_tuple, self.n_out);
        for b in &self.basics {
            let (bs, e) = b.range();
            exact &= e;
            out.basics.push(bs);
        }
        (out, exact)
    }

    pub fn apply_range(&self, other: &Map) -> (Map, bool) {
        let mut exact = true;
        let mut out =
            Map::empty(self.in_tuple, self.n_in, other.out_tuple, other.n_out);
        for a in &self.basics {
            for b in &other.basics {
                let (bm, e) = a.apply_range(b);
                exact &= e;
                out.basics.push(bm);
            }
        }
        (out, exact)
    }

    /// `self \ other`; `None` when complementation is blocked.
    pub fn subtract(&self, other: &Map) -> Option<Map> {
        let as_set = |m: &Map| Set {
            tuple: None,
            dim: m.n_in + m.n_out,
            basics: m
                .basics
                .iter()
                .map(|b| BasicSet {
                    tuple: None,
                    dim: b.dim(),
                    cons: b.cons.clone(),
                })
                .collect(),
        };
        let diff = as_set(self).subtract(&as_set(other))?;
        Some(Map {
            in_tuple: self.in_tuple,
            out_tuple: self.out_tuple,
            n_in: self.n_in,
            n_out: self.n_out,
            basics: diff
                .basics
                .into_iter()
                .map(|bs| BasicMap {
                    in_tuple: self.in_tuple,
                    out_tuple: self.out_tuple,
                    n_in: self.n_in,
                    n_out: self.n_out,
                    cons: bs.cons,
                })
                .collect(),
        })
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
}

#[cfg(test)]
mod tests {
    use super::*;

    /// `{ [i] -> [i + 1] }` restricted to `0 <= i <= 9`.
    fn successor() -> Map {
        let bm = BasicMap::from_affs(
            None,
            1,
            None,
            &[Aff::var(1, 0).add_constant(1)],
        )
        .intersect_domain(&BasicSet::universe(None, 1).bound_dim(0, 0, 9));
        Map::from_basic(bm)
    }

    #[test]
    fn range_of_successor() {
        let (rng, exact) = successor().range();
        assert!(exact);
        assert_eq!(rng.dim_bounds(0), Some((1, 10)));
    }

    #[test]
    fn composition_shifts_twice() {
        let (twice, exact) = successor().apply_range(&successor());
        assert!(exact);
        // [0] -> [2] must be in the relation, [0] -> [1] must not
        let member = |m: &Map, p: &[i64]| {
            m.basics
                .iter()
                .any(|b| b.as_basic_set().contains(p) == Some(true))
        };
        assert!(member(&twice, &[0, 2]));
        assert!(!member(&twice, &[0, 1]));
    }

    #[test]
    fn reverse_swaps_sides() {
        let rev = successor().reverse();
        let (dom, _) = rev.domain();
        assert_eq!(dom.dim_bounds(0), Some((1, 10)));
    }
}
