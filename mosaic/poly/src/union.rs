//! Unions of sets and relations across differently-named statement tuples.

use crate::map::Map;
use crate::set::{Set, TriState};
use mosaic_utils::Id;

/// A union of sets, at most one per statement tuple.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct UnionSet {
    pub sets: Vec<Set>,
}

impl UnionSet {
    pub fn empty() -> Self {
        UnionSet::default()
    }

    pub fn from_set(set: Set) -> Self {
        UnionSet { sets: vec![set] }
    }

    pub fn get(&self, tuple: Id) -> Option<&Set> {
        self.sets.iter().find(|s| s.tuple == Some(tuple))
    }

    pub fn add_set(&mut self, set: Set) {
        match self
            .sets
            .iter_mut()
            .find(|s| s.tuple == set.tuple && s.dim == set.dim)
        {
            Some(cur) => *cur = cur.union(&set),
            None => self.sets.push(set),
        }
    }

    pub fn union(&self, other: &UnionSet) -> UnionSet {
        let mut out = self.clone();
        for s in &other.sets {
            out.add_set(s.clone());
        }
        out
    }

    /// Pointwise intersection; tuples present on only one side drop out.
    pub fn intersect(&self, other: &UnionSet) -> UnionSet {
        let mut out = UnionSet::empty();
        for a in &self.sets {
            for b in &other.sets {
                if a.tuple == b.tuple && a.dim == b.dim {
                    out.add_set(a.intersect(b));
                }
            }
        }
        out
    }

    pub fn subtract(&self, other: &UnionSet) -> Option<UnionSet> {
        let mut out = UnionSet::empty();
        for a in &self.sets {
            match other
                .sets
                .iter()
                .find(|b| b.tuple == a.tuple && b.dim == a.dim)
            {
                Some(b) => out.add_set(a.subtract(b)?),
                None => out.add_set(a.clone()),
            }
        }
        Some(out)
    }

    pub fn is_empty(&self) -> TriState {
        let mut saw_maybe = false;
        for s in &self.sets {
            match s.is_empty() {
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

    pub fn tuples(&self) -> impl Iterator<Item = Option<Id>> + '_ {
        self.sets.iter().map(|s| s.tuple)
    }
}

/// A union of relations keyed by the (input, output) tuple pair.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct UnionMap {
    pub maps: Vec<Map>,
}

impl UnionMap {
    pub fn empty() -> Self {
        UnionMap::default()
    }

    pub fn from_map(map: Map) -> Self {
        UnionMap { maps: vec![map] }
    }

    pub fn add_map(&mut self, map: Map) {
        match self.maps.iter_mut().find(|m| {
            m.in_tuple == map.in_tuple
                && m.out_tuple == map.out_tuple
                && m.n_in == map.n_in
                && m.n_out == map.n_out
        }) {
            Some(cur) => *cur = cur.union(&map),
            None => self.maps.push(map),
        }
    }

    pub fn union(&self, other: &UnionMap) -> UnionMap {
        let mut out = self.clone();
        for m in &other.maps {
            out.add_map(m.clone());
        }
        out
    }

    pub fn intersect(&self, other: &UnionMap) -> UnionMap {
        let mut out = UnionMap::empty();
        for a in &self.maps {
            for b in &other.maps {
                if a.in_tuple == b.in_tuple
                    && a.out_tuple == b.out_tuple
                    && a.n_in == b.n_in
                    && a.n_out == b.n_out
                {
                    out.add_map(a.intersect(b));
                }
            }
        }
        out
    }

    pub fn intersect_domain(&self, dom: &UnionSet) -> UnionMap {
        let mut out = UnionMap::empty();
        for m in &self.maps {
            for d in &dom.sets {
                if m.in_tuple == d.tuple && m.n_in == d.dim {
                    out.add_map(m.intersect_domain(d));
                }
            }
        }
        out
    }

    pub fn intersect_range(&self, rng: &UnionSet) -> UnionMap {
        let mut out = UnionMap::empty();
        for m in &self.maps {
            for r in &rng.sets {
                if m.out_tuple == r.tuple && m.n_out == r.dim {
                    out.add_map(m.intersect_range(r));
                }
            }
        }
        out
    }

    pub fn reverse(&self) -> UnionMap {
        UnionMap {
            maps: self.maps.iter().map(|m| m.reverse()).collect(),
        }
    }

    pub fn domain(&self) -> (UnionSet, bool) {
        let mut exact = true;
        let mut out = UnionSet::empty();
        for m in &self.maps {
            let (s, e) = m.domain();
            exact &= e;
            out.add_set(s);
        }
        (out, exact)
    }

    pub fn range(&self) -> (UnionSet, bool) {
        let mut exact = true;
        let mut out = UnionSet::empty();
        for m in &self.maps {
            let (s, e) = m.range();
            exact &= e;
            out.add_set(s);
        }
        (out, exact)
    }

    /// Compose with every compatible relation in `other`.
    pub fn apply_range(&self, other: &UnionMap) -> (UnionMap, bool) {
        let mut exact = true;
        let mut out = UnionMap::empty();
        for a in &self.maps {
            for b in &other.maps {
                if a.out_tuple == b.in_tuple && a.n_out == b.n_in {
                    let (m, e) = a.apply_range(b);
                    exact &= e;
                    out.add_map(m);
                }
            }
        }
        (out, exact)
    }

    pub fn subtract(&self, other: &UnionMap) -> Option<UnionMap> {
        let mut out = UnionMap::empty();
        for a in &self.maps {
            match other.maps.iter().find(|b| {
                b.in_tuple == a.in_tuple
                    && b.out_tuple == a.out_tuple
                    && b.n_in == a.n_in
                    && b.n_out == a.n_out
            }) {
                Some(b) => out.add_map(a.subtract(b)?),
                None => out.add_map(a.clone()),
            }
        }
        Some(out)
    }

    pub fn is_empty(&self) -> TriState {
        let mut saw_maybe = false;
        for m in &self.maps {
            match m.is_empty() {
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
    use crate::aff::Aff;
    use crate::map::BasicMap;
    use crate::set::BasicSet;

    #[test]
    fn union_merges_same_tuple() {
        let s = Id::new("S0");
        let a = UnionSet::from_set(Set::from_basic(
            BasicSet::universe(Some(s), 1).bound_dim(0, 0, 3),
        ));
        let b = UnionSet::from_set(Set::from_basic(
            BasicSet::universe(Some(s), 1).bound_dim(0, 7, 9),
        ));
        let u = a.union(&b);
        assert_eq!(u.sets.len(), 1);
        assert_eq!(u.get(s).unwrap().basics.len(), 2);
    }

    #[test]
    fn apply_range_matches_tuples() {
        let s = Id::new("S0");
        let t = Id::new("S1");
        let ab = UnionMap::from_map(Map::from_basic(BasicMap::from_affs(
            Some(s),
            1,
            Some(t),
            &[Aff::var(1, 0)],
        )));
        let bc = UnionMap::from_map(Map::from_basic(BasicMap::from_affs(
            Some(t),
            1,
            Some(s),
            &[Aff::var(1, 0).add_constant(1)],
        )));
        let (ac, exact) = ab.apply_range(&bc);
        assert!(exact);
        assert_eq!(ac.maps.len(), 1);
        assert_eq!(ac.maps[0].in_tuple, Some(s));
        assert_eq!(ac.maps[0].out_tuple, Some(s));
    }
}
