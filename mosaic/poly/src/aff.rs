//! Integer affine expressions over a fixed number of set dimensions and a
//! collection of named symbolic parameters.

use mosaic_utils::Id;
use smallvec::{smallvec, SmallVec};

/// An integer affine expression: `cst + Σ coeffs[i]·x_i + Σ params[p]·p`.
///
/// Set-dimension coefficients are positional; parameter coefficients are
/// keyed by name so that expressions built in different contexts combine
/// without explicit space alignment.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Aff {
    pub cst: i64,
    pub coeffs: SmallVec<[i64; 8]>,
    /// Sorted by parameter name; coefficients are never zero.
    pub params: Vec<(Id, i64)>,
}

impl Aff {
    /// The zero expression over `dim` dimensions.
    pub fn zero(dim: usize) -> Self {
        Aff {
            cst: 0,
            coeffs: smallvec![0; dim],
            params: Vec::new(),
        }
    }

    /// A constant expression over `dim` dimensions.
    pub fn constant(dim: usize, cst: i64) -> Self {
        Aff {
            cst,
            ..Aff::zero(dim)
        }
    }

    /// The expression selecting dimension `idx`.
    pub fn var(dim: usize, idx: usize) -> Self {
        let mut a = Aff::zero(dim);
        a.coeffs[idx] = 1;
        a
    }

    /// The expression selecting the named parameter.
    pub fn param(dim: usize, name: Id) -> Self {
        let mut a = Aff::zero(dim);
        a.params.push((name, 1));
        a
    }

    pub fn dim(&self) -> usize {
        self.coeffs.len()
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.iter().all(|&c| c == 0) && self.params.is_empty()
    }

    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn param_coeff(&self, name: Id) -> i64 {
        self.params
            .iter()
            .find(|(p, _)| *p == name)
            .map(|(_, c)| *c)
            .unwrap_or(0)
    }

    fn set_param_coeff(&mut self, name: Id, coeff: i64) {
        match self.params.binary_search_by_key(&name, |(p, _)| *p) {
            Ok(i) => {
                if coeff == 0 {
                    self.params.remove(i);
                } else {
                    self.params[i].1 = coeff;
                }
            }
            Err(i) => {
                if coeff != 0 {
                    self.params.insert(i, (name, coeff));
                }
            }
        }
    }

    pub fn add(&self, other: &Aff) -> Aff {
        debug_assert_eq!(self.dim(), other.dim());
        let mut out = self.clone();
        out.cst += other.cst;
        for (c, oc) in out.coeffs.iter_mut().zip(other.coeffs.iter()) {
            *c += oc;
        }
        for &(p, c) in &other.params {
            let cur = out.param_coeff(p);
            out.set_param_coeff(p, cur + c);
        }
        out.normalize();
        out
    }

    pub fn sub(&self, other: &Aff) -> Aff {
        self.add(&other.scale(-1))
    }

    pub fn scale(&self, s: i64) -> Aff {
        let mut out = self.clone();
        out.cst *= s;
        for c in out.coeffs.iter_mut() {
            *c *= s;
        }
        for pc in out.params.iter_mut() {
            pc.1 *= s;
        }
        out.normalize();
        out
    }

    pub fn add_constant(&self, cst: i64) -> Aff {
        let mut out = self.clone();
        out.cst += cst;
        out
    }

    /// Keep the params list sorted and free of zero entries.
    fn normalize(&mut self) {
        self.params.retain(|(_, c)| *c != 0);
        self.params.sort_by_key(|(p, _)| *p);
    }

    /// Evaluate at an integer point; parameters must be absent.
    pub fn eval(&self, point: &[i64]) -> Option<i64> {
        if self.has_params() {
            return None;
        }
        debug_assert_eq!(point.len(), self.dim());
        Some(
            self.cst
                + self
                    .coeffs
                    .iter()
                    .zip(point.iter())
                    .map(|(c, x)| c * x)
                    .sum::<i64>(),
        )
    }

    /// Grow the expression to `dim` dimensions by inserting `count` zero
    /// coefficients at position `pos`.
    pub fn insert_dims(&self, pos: usize, count: usize) -> Aff {
        let mut out = self.clone();
        for _ in 0..count {
            out.coeffs.insert(pos, 0);
        }
        out
    }

    /// Substitute dimension `idx` with the given expression (over the same
    /// dimension count as `self`); the coefficient of `idx` in `repl` must
    /// be zero.
    pub fn substitute(&self, idx: usize, repl: &Aff) -> Aff {
        debug_assert_eq!(self.dim(), repl.dim());
        debug_assert_eq!(repl.coeffs[idx], 0);
        let c = self.coeffs[idx];
        let mut out = self.clone();
        out.coeffs[idx] = 0;
        out.add(&repl.scale(c))
    }
}

impl std::fmt::Debug for Aff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        if self.cst != 0 {
            write!(f, "{}", self.cst)?;
            first = false;
        }
        for (i, &c) in self.coeffs.iter().enumerate() {
            if c == 0 {
                continue;
            }
            if !first {
                f.write_str(" + ")?;
            }
            write!(f, "{}·x{}", c, i)?;
            first = false;
        }
        for (p, c) in &self.params {
            if !first {
                f.write_str(" + ")?;
            }
            write!(f, "{}·{}", c, p)?;
            first = false;
        }
        if first {
            f.write_str("0")?;
        }
        Ok(())
    }
}

/// A single affine constraint.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Constraint {
    /// `aff = 0`
    Eq(Aff),
    /// `aff >= 0`
    Ge(Aff),
    /// `aff ≡ 0 (mod m)`
    Mod(Aff, u64),
}

impl Constraint {
    pub fn aff(&self) -> &Aff {
        match self {
            Constraint::Eq(a) | Constraint::Ge(a) | Constraint::Mod(a, _) => a,
        }
    }

    pub fn dim(&self) -> usize {
        self.aff().dim()
    }

    pub fn involves_dim(&self, idx: usize) -> bool {
        self.aff().coeffs[idx] != 0
    }

    /// Whether an integer point satisfies the constraint. `None` when the
    /// expression still mentions parameters.
    pub fn holds_at(&self, point: &[i64]) -> Option<bool> {
        let v = self.aff().eval(point)?;
        Some(match self {
            Constraint::Eq(_) => v == 0,
            Constraint::Ge(_) => v >= 0,
            Constraint::Mod(_, m) => v.rem_euclid(*m as i64) == 0,
        })
    }

    pub fn insert_dims(&self, pos: usize, count: usize) -> Constraint {
        match self {
            Constraint::Eq(a) => Constraint::Eq(a.insert_dims(pos, count)),
            Constraint::Ge(a) => Constraint::Ge(a.insert_dims(pos, count)),
            Constraint::Mod(a, m) => {
                Constraint::Mod(a.insert_dims(pos, count), *m)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_combines_params_by_name() {
        let p = Id::new("p0");
        let a = Aff::var(2, 0).add(&Aff::param(2, p));
        let b = Aff::param(2, p).scale(-1).add(&Aff::constant(2, 3));
        let sum = a.add(&b);
        assert_eq!(sum.param_coeff(p), 0);
        assert!(sum.params.is_empty());
        assert_eq!(sum.cst, 3);
        assert_eq!(sum.coeffs[0], 1);
    }

    #[test]
    fn substitution_replaces_a_dimension() {
        // x0 + 2*x1, substitute x1 := x0 + 1 => 3*x0 + 2
        let e = Aff::var(2, 0).add(&Aff::var(2, 1).scale(2));
        let repl = Aff::var(2, 0).add_constant(1);
        let out = e.substitute(1, &repl);
        assert_eq!(out.eval(&[5, 99]), Some(17));
    }

    #[test]
    fn modulo_constraint_evaluates() {
        let c = Constraint::Mod(Aff::var(1, 0).add_constant(-1), 3);
        assert_eq!(c.holds_at(&[4]), Some(true));
        assert_eq!(c.holds_at(&[5]), Some(false));
    }
}
