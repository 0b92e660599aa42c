//! Fourier–Motzkin elimination over integer affine constraint systems.
//!
//! Projection is exact over the rationals and may over-approximate the
//! integer points; every entry point reports whether the result is known to
//! be exact so callers can degrade to a three-valued answer instead of
//! assuming one.

use crate::aff::{Aff, Constraint};
use crate::set::{BasicSet, TriState};

/// Remove dimension `idx` from an expression, assuming its coefficient has
/// already been cancelled.
fn drop_dim(a: &Aff, idx: usize) -> Aff {
    debug_assert_eq!(a.coeffs[idx], 0);
    let mut out = a.clone();
    out.coeffs.remove(idx);
    out
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Eliminate a single dimension. Returns the reduced constraint list and
/// whether the elimination is exact for integer points.
fn eliminate_dim(
    cons: &[Constraint],
    idx: usize,
) -> (Vec<Constraint>, bool) {
    let mut exact = true;

    // Prefer substitution through an equality involving the dimension.
    if let Some(eq_pos) = cons.iter().position(|c| {
        matches!(c, Constraint::Eq(a) if a.coeffs[idx] != 0)
    }) {
        let eq = cons[eq_pos].aff().clone();
        let e = eq.coeffs[idx];
        let mut out = Vec::with_capacity(cons.len());
        for (i, c) in cons.iter().enumerate() {
            if i == eq_pos {
                continue;
            }
            let a = c.aff();
            let k = a.coeffs[idx];
            if k == 0 {
                out.push(strip(c, idx));
                continue;
            }
            // cancel: |e|*a - sign-adjusted k*eq; on the solution set of
            // the equality this is |e| times the substituted expression
            let scaled = a.scale(e.abs()).sub(&eq.scale(k * e.signum()));
            debug_assert_eq!(scaled.coeffs[idx], 0);
            let scaled = drop_dim(&scaled, idx);
            out.push(match c {
                Constraint::Eq(_) => Constraint::Eq(scaled),
                Constraint::Ge(_) => Constraint::Ge(scaled),
                // a ≡ 0 (mod m)  <=>  |e|*a ≡ 0 (mod |e|*m)
                Constraint::Mod(_, m) => {
                    Constraint::Mod(scaled, m * e.unsigned_abs())
                }
            });
        }
        if e.abs() != 1 {
            // e*x + r = 0 has an integer solution in x iff |e| divides r
            let mut r = eq;
            r.coeffs[idx] = 0;
            out.push(Constraint::Mod(drop_dim(&r, idx), e.unsigned_abs()));
        }
        return (out, true);
    }

    let mut lowers: Vec<&Aff> = Vec::new();
    let mut uppers: Vec<&Aff> = Vec::new();
    let mut rest: Vec<Constraint> = Vec::new();

    for c in cons {
        match c {
            Constraint::Ge(a) if a.coeffs[idx] > 0 => lowers.push(a),
            Constraint::Ge(a) if a.coeffs[idx] < 0 => uppers.push(a),
            Constraint::Mod(a, _) if a.coeffs[idx] != 0 => {
                // congruences on an eliminated dimension are dropped
                exact = false;
            }
            other => rest.push(strip(other, idx)),
        }
    }

    for l in &lowers {
        for u in &uppers {
            let a = l.coeffs[idx];
            let b = -u.coeffs[idx];
            debug_assert!(a > 0 && b > 0);
            let g = gcd(a, b);
            let combined = l.scale(b / g).add(&u.scale(a / g));
            debug_assert_eq!(combined.coeffs[idx], 0);
            let combined = drop_dim(&combined, idx);
            if a != 1 && b != 1 {
                // the rational interval always holds an integer when its
                // width reaches the dark-shadow slack (a-1)(b-1); for a
                // constant combination we can check that directly,
                // otherwise the integer shadow may be strictly smaller
                let constant = !combined.has_params()
                    && combined.coeffs.iter().all(|&c| c == 0);
                if !(constant && g * combined.cst >= (a - 1) * (b - 1)) {
                    exact = false;
                }
            }
            rest.push(Constraint::Ge(combined));
        }
    }

    (rest, exact)
}

/// Clone a constraint while removing the (zero-coefficient) dimension.
fn strip(c: &Constraint, idx: usize) -> Constraint {
    match c {
        Constraint::Eq(a) => Constraint::Eq(drop_dim(a, idx)),
        Constraint::Ge(a) => Constraint::Ge(drop_dim(a, idx)),
        Constraint::Mod(a, m) => Constraint::Mod(drop_dim(a, idx), *m),
    }
}

/// Pick the next dimension of `pos..pos + len` to eliminate. Dimensions
/// substitutable through a unit-coefficient equality go first so the
/// substitutions stay congruence-free; other equality-bound dimensions come
/// next, and pure inequality dimensions are left for last.
fn pick_dim(cons: &[Constraint], pos: usize, len: usize) -> usize {
    let mut eq_bound: Option<usize> = None;
    for idx in pos..pos + len {
        let mut in_eq = false;
        for c in cons {
            if let Constraint::Eq(a) = c {
                let k = a.coeffs[idx];
                if k.abs() == 1 {
                    return idx;
                }
                in_eq |= k != 0;
            }
        }
        if in_eq && eq_bound.is_none() {
            eq_bound = Some(idx);
        }
    }
    eq_bound.unwrap_or(pos)
}

/// Project out `count` dimensions starting at `pos`.
pub fn project_out(bs: &BasicSet, pos: usize, count: usize) -> (BasicSet, bool) {
    let mut cons = bs.cons.clone();
    let mut exact = true;
    // surviving eliminations shift the remaining window left by one
    for len in (1..=count).rev() {
        let idx = pick_dim(&cons, pos, len);
        let (next, e) = eliminate_dim(&cons, idx);
        cons = next;
        exact &= e;
    }
    (
        BasicSet {
            tuple: bs.tuple,
            dim: bs.dim - count,
            cons,
        },
        exact,
    )
}

/// Whether a dimension-free constraint system is satisfiable. Constraints
/// that still mention parameters cannot refute satisfiability here.
fn ground_consistent(cons: &[Constraint]) -> TriState {
    let mut maybe = false;
    for c in cons {
        let a = c.aff();
        if a.has_params() {
            maybe = true;
            continue;
        }
        let ok = match c {
            Constraint::Eq(_) => a.cst == 0,
            Constraint::Ge(_) => a.cst >= 0,
            Constraint::Mod(_, m) => a.cst.rem_euclid(*m as i64) == 0,
        };
        if !ok {
            return TriState::No;
        }
    }
    if maybe { TriState::Maybe } else { TriState::Yes }
}

/// Search for an integer point by back-substitution through successive
/// eliminations. Returns `None` when the rounding heuristic misses or
/// parameters are present.
pub fn sample(bs: &BasicSet) -> Option<Vec<i64>> {
    if bs.cons.iter().any(|c| c.aff().has_params()) {
        return None;
    }
    // systems[k] is the constraint set with dims k.. still present,
    // dims 0..k eliminated? We eliminate from the last dim backwards so
    // that back-substitution assigns dims in increasing order.
    let mut systems: Vec<Vec<Constraint>> = vec![bs.cons.clone()];
    for d in (1..=bs.dim).rev() {
        let (next, _) = eliminate_dim(systems.last()?, d - 1);
        systems.push(next);
    }
    // systems[bs.dim] is ground; walk back assigning dim d-1 using
    // systems[bs.dim - d].
    let mut point: Vec<i64> = Vec::with_capacity(bs.dim);
    for d in 0..bs.dim {
        let cons = &systems[bs.dim - d - 1];
        // constraints over dims 0..=d with dims 0..d already fixed
        let mut lb: Option<i64> = None;
        let mut ub: Option<i64> = None;
        for c in cons {
            let a = c.aff();
            let k = a.coeffs[d];
            if k == 0 {
                continue;
            }
            // value of the rest of the expression at the fixed prefix
            let rest: i64 = a.cst
                + a.coeffs[..d]
                    .iter()
                    .zip(point.iter())
                    .map(|(c, x)| c * x)
                    .sum::<i64>();
            match c {
                Constraint::Eq(_) => {
                    if rest % k != 0 {
                        return None;
                    }
                    let v = -rest / k;
                    lb = Some(lb.map_or(v, |l| l.max(v)));
                    ub = Some(ub.map_or(v, |u| u.min(v)));
                }
                Constraint::Ge(_) => {
                    if k > 0 {
                        // k*x + rest >= 0  =>  x >= ceil(-rest / k)
                        let v = (-rest).div_euclid(k)
                            + if (-rest).rem_euclid(k) != 0 { 1 } else { 0 };
                        lb = Some(lb.map_or(v, |l| l.max(v)));
                    } else {
                        let v = rest.div_euclid(-k);
                        ub = Some(ub.map_or(v, |u| u.min(v)));
                    }
                }
                Constraint::Mod(..) => {
                    // handled by the final membership check
                }
            }
        }
        let v = match (lb, ub) {
            (Some(l), Some(u)) if l > u => return None,
            (Some(l), _) => l,
            (None, Some(u)) => u,
            (None, None) => 0,
        };
        point.push(v);
    }
    if bs.contains(&point) == Some(true) {
        Some(point)
    } else {
        None
    }
}

/// Tri-state emptiness of a basic set.
pub fn basic_set_is_empty(bs: &BasicSet) -> TriState {
    let (ground, _) = project_out(bs, 0, bs.dim);
    match ground_consistent(&ground.cons) {
        // the rational relaxation is empty, so the integer set is too
        TriState::No => TriState::Yes,
        TriState::Maybe => TriState::Maybe,
        TriState::Yes => match sample(bs) {
            Some(_) => TriState::No,
            None => TriState::Maybe,
        },
    }
}

/// Constant bounds `(lb, ub)` of dimension `idx`, when both exist and do
/// not depend on parameters.
pub fn dim_bounds(bs: &BasicSet, idx: usize) -> Option<(i64, i64)> {
    // move the dimension of interest to position 0, then drop the rest
    let mut cons = bs.cons.clone();
    if idx != 0 {
        cons = cons
            .iter()
            .map(|c| {
                let a = c.aff();
                let mut b = a.clone();
                b.coeffs.swap(0, idx);
                match c {
                    Constraint::Eq(_) => Constraint::Eq(b),
                    Constraint::Ge(_) => Constraint::Ge(b),
                    Constraint::Mod(_, m) => Constraint::Mod(b, *m),
                }
            })
            .collect();
    }
    let shuffled = BasicSet {
        tuple: bs.tuple,
        dim: bs.dim,
        cons,
    };
    let (proj, _) = project_out(&shuffled, 1, bs.dim - 1);

    let mut lb: Option<i64> = None;
    let mut ub: Option<i64> = None;
    for c in &proj.cons {
        let a = c.aff();
        if a.has_params() {
            return None;
        }
        let k = a.coeffs[0];
        if k == 0 {
            continue;
        }
        match c {
            Constraint::Eq(_) => {
                if a.cst % k != 0 {
                    return None;
                }
                let v = -a.cst / k;
                lb = Some(lb.map_or(v, |l| l.max(v)));
                ub = Some(ub.map_or(v, |u| u.min(v)));
            }
            Constraint::Ge(_) => {
                if k > 0 {
                    let v = (-a.cst).div_euclid(k)
                        + if (-a.cst).rem_euclid(k) != 0 { 1 } else { 0 };
                    lb = Some(lb.map_or(v, |l| l.max(v)));
                } else {
                    let v = a.cst.div_euclid(-k);
                    ub = Some(ub.map_or(v, |u| u.min(v)));
                }
            }
            Constraint::Mod(..) => {}
        }
    }
    match (lb, ub) {
        (Some(l), Some(u)) => Some((l, u)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aff::Aff;

    fn ge(a: Aff) -> Constraint {
        Constraint::Ge(a)
    }

    #[test]
    fn projection_of_a_triangle() {
        // { [x, y] : 0 <= x, 0 <= y, x + y <= 5 } projected on x
        let bs = BasicSet::universe(None, 2)
            .with_constraint(ge(Aff::var(2, 0)))
            .with_constraint(ge(Aff::var(2, 1)))
            .with_constraint(ge(
                Aff::var(2, 0).add(&Aff::var(2, 1)).scale(-1).add_constant(5),
            ));
        let (proj, exact) = project_out(&bs, 1, 1);
        assert!(exact);
        assert_eq!(proj.dim, 1);
        assert_eq!(dim_bounds(&proj, 0), Some((0, 5)));
    }

    #[test]
    fn empty_system_detected() {
        // x >= 3 and x <= 2
        let bs = BasicSet::universe(None, 1)
            .with_constraint(ge(Aff::var(1, 0).add_constant(-3)))
            .with_constraint(ge(Aff::var(1, 0).scale(-1).add_constant(2)));
        assert_eq!(basic_set_is_empty(&bs), TriState::Yes);
    }

    #[test]
    fn sampling_respects_congruences() {
        // { x : 0 <= x <= 8, x ≡ 0 mod 4 } is nonempty
        let bs = BasicSet::universe(None, 1)
            .bound_dim(0, 0, 8)
            .with_constraint(Constraint::Mod(Aff::var(1, 0), 4));
        assert_eq!(basic_set_is_empty(&bs), TriState::No);

        // { x : 1 <= x <= 3, x ≡ 0 mod 4 } cannot be confirmed nonempty
        let bs = BasicSet::universe(None, 1)
            .bound_dim(0, 1, 3)
            .with_constraint(Constraint::Mod(Aff::var(1, 0), 4));
        assert_ne!(basic_set_is_empty(&bs), TriState::No);
    }

    #[test]
    fn strided_equality_projects_exactly() {
        // { [i, o] : o = 2i, 0 <= i <= 7 } projected on o keeps the
        // stride as a congruence instead of over-approximating
        let bs = BasicSet::universe(None, 2)
            .with_constraint(Constraint::Eq(
                Aff::var(2, 1).sub(&Aff::var(2, 0).scale(2)),
            ))
            .bound_dim(0, 0, 7);
        let (proj, exact) = project_out(&bs, 0, 1);
        assert!(exact);
        assert_eq!(dim_bounds(&proj, 0), Some((0, 14)));
        assert_eq!(proj.contains(&[6]), Some(true));
        assert_eq!(proj.contains(&[7]), Some(false));
    }

    #[test]
    fn mixed_stride_footprint_projects_exactly() {
        // { [i, j, o] : o = 2i + j, 0 <= i <= 1, 0 <= j <= 1 }: j fills
        // the gaps between the strides, so o covers 0..=3 with no
        // congruence left over
        let bs = BasicSet::universe(None, 3)
            .with_constraint(Constraint::Eq(
                Aff::var(3, 2)
                    .sub(&Aff::var(3, 0).scale(2))
                    .sub(&Aff::var(3, 1)),
            ))
            .bound_dim(0, 0, 1)
            .bound_dim(1, 0, 1);
        let (proj, exact) = project_out(&bs, 0, 2);
        assert!(exact);
        assert_eq!(dim_bounds(&proj, 0), Some((0, 3)));
        assert_eq!(proj.contains(&[1]), Some(true));
    }

    #[test]
    fn bounds_through_equalities() {
        // { [x, y] : y = 2x, 1 <= x <= 4 } bounds of y
        let bs = BasicSet::universe(None, 2)
            .with_constraint(Constraint::Eq(
                Aff::var(2, 1).sub(&Aff::var(2, 0).scale(2)),
            ))
            .bound_dim(0, 1, 4);
        assert_eq!(dim_bounds(&bs, 1), Some((2, 8)));
    }
}
