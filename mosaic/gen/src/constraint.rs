//! Subsets of an iteration space selected by comparing a band's partial
//! schedule against named symbolic parameters, plus the parameter-free
//! lower/upper-bound selectors.
//!
//! All builders take a cursor positioned at a band node and return a set
//! usable as a filter; they never modify the tree.

use mosaic_poly::{Aff, BasicSet, Constraint, Cursor, Set, TreeNode, UnionSet};
use mosaic_utils::{Error, Id, MosaicResult};

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Cmp {
    Eq,
    Ge,
}

fn band_partial(cursor: &Cursor) -> MosaicResult<&mosaic_poly::MultiUnionAff> {
    match cursor.node() {
        TreeNode::Band { partial, .. } => Ok(partial),
        _ => Err(Error::invalid_navigation(
            "schedule comparison requires a band node",
        )),
    }
}

/// Pair band members with the trailing parameters; the leading parameters
/// left over when the band is narrower are implicitly equated to zero.
fn leading(n_member: usize, n_param: usize) -> MosaicResult<usize> {
    n_param.checked_sub(n_member).ok_or_else(|| {
        Error::invalid_input(format!(
            "band with {n_member} members compared against {n_param} parameters"
        ))
    })
}

fn set_schedule_cmp(
    cursor: &Cursor,
    params: &[Id],
    cmp: Cmp,
) -> MosaicResult<UnionSet> {
    let partial = band_partial(cursor)?;
    let lead = leading(partial.n_member, params.len())?;
    let mut out = UnionSet::empty();
    for (stmt, affs) in &partial.per_stmt {
        let dim = affs.first().map(Aff::dim).unwrap_or(0);
        let mut bs = BasicSet::universe(Some(*stmt), dim);
        for p in &params[..lead] {
            bs.add_constraint(Constraint::Eq(Aff::param(dim, *p)));
        }
        for (aff, p) in affs.iter().zip(&params[lead..]) {
            let diff = aff.sub(&Aff::param(dim, *p));
            bs.add_constraint(match cmp {
                Cmp::Eq => Constraint::Eq(diff),
                Cmp::Ge => Constraint::Ge(diff),
            });
        }
        out.add_set(Set::from_basic(bs));
    }
    Ok(out)
}

/// Instances whose schedule value equals the named parameters.
pub fn set_schedule_eq(
    cursor: &Cursor,
    params: &[Id],
) -> MosaicResult<UnionSet> {
    set_schedule_cmp(cursor, params, Cmp::Eq)
}

/// Instances whose schedule value is at least the named parameters.
pub fn set_schedule_ge(
    cursor: &Cursor,
    params: &[Id],
) -> MosaicResult<UnionSet> {
    set_schedule_cmp(cursor, params, Cmp::Ge)
}

/// Instances whose schedule value is congruent to the named parameters
/// modulo the per-member sizes.
pub fn set_schedule_modulo(
    cursor: &Cursor,
    params: &[Id],
    sizes: &[u64],
) -> MosaicResult<UnionSet> {
    let partial = band_partial(cursor)?;
    let lead = leading(partial.n_member, params.len())?;
    if sizes.len() != params.len() {
        return Err(Error::invalid_input(
            "one modulo size required per parameter",
        ));
    }
    let mut out = UnionSet::empty();
    for (stmt, affs) in &partial.per_stmt {
        let dim = affs.first().map(Aff::dim).unwrap_or(0);
        let mut bs = BasicSet::universe(Some(*stmt), dim);
        for p in &params[..lead] {
            bs.add_constraint(Constraint::Eq(Aff::param(dim, *p)));
        }
        for ((aff, p), size) in
            affs.iter().zip(&params[lead..]).zip(&sizes[lead..])
        {
            let diff = aff.sub(&Aff::param(dim, *p));
            bs.add_constraint(Constraint::Mod(diff, *size));
        }
        out.add_set(Set::from_basic(bs));
    }
    Ok(out)
}

/// Constant bounds of every band member over the instances reaching the
/// band. Below an extension node the outer filters do not constrain the
/// extension's range, so they are ignored there.
fn member_bounds(cursor: &Cursor) -> MosaicResult<Vec<(i64, i64)>> {
    let partial = band_partial(cursor)?;
    let domain = if cursor.under_extension() {
        cursor.reaching_domain_unfiltered()
    } else {
        cursor.reaching_domain_ground()
    };
    let mut out = Vec::with_capacity(partial.n_member);
    for member in 0..partial.n_member {
        let mut bounds: Option<(i64, i64)> = None;
        for (stmt, affs) in &partial.per_stmt {
            let Some(set) = domain.get(*stmt) else { continue };
            if set.basics.is_empty() {
                continue;
            }
            let (lb, ub) = mosaic_poly::aff_bounds(set, &affs[member])
                .ok_or_else(|| {
                    Error::indeterminate(format!(
                        "unbounded band member {member} for `{stmt}'"
                    ))
                })?;
            bounds = Some(match bounds {
                None => (lb, ub),
                Some((l, u)) => (l.min(lb), u.max(ub)),
            });
        }
        out.push(bounds.ok_or_else(|| {
            Error::indeterminate("band reached by no instances")
        })?);
    }
    Ok(out)
}

fn schedule_bound(
    cursor: &Cursor,
    upper: bool,
    complement: bool,
) -> MosaicResult<UnionSet> {
    let bounds = member_bounds(cursor)?;
    let partial = band_partial(cursor)?;
    let mut out = UnionSet::empty();
    for (stmt, affs) in &partial.per_stmt {
        let dim = affs.first().map(Aff::dim).unwrap_or(0);
        let pick = |i: usize| if upper { bounds[i].1 } else { bounds[i].0 };
        let set = if !complement {
            // all members pinned to the bound
            let mut bs = BasicSet::universe(Some(*stmt), dim);
            for (i, aff) in affs.iter().enumerate() {
                bs.add_constraint(Constraint::Eq(aff.add_constant(-pick(i))));
            }
            Set::from_basic(bs)
        } else {
            // at least one member strictly inside the bound
            let mut set = Set::empty(Some(*stmt), dim);
            for (i, aff) in affs.iter().enumerate() {
                let body = if upper {
                    // aff <= ub - 1
                    aff.scale(-1).add_constant(pick(i) - 1)
                } else {
                    // aff >= lb + 1
                    aff.add_constant(-pick(i) - 1)
                };
                set.basics.push(
                    BasicSet::universe(Some(*stmt), dim)
                        .with_constraint(Constraint::Ge(body)),
                );
            }
            set
        };
        out.add_set(set);
    }
    Ok(out)
}

/// Instances where the band takes its pointwise minimum value.
pub fn schedule_eq_lb(cursor: &Cursor) -> MosaicResult<UnionSet> {
    schedule_bound(cursor, false, false)
}

/// Instances where the band takes its pointwise maximum value.
pub fn schedule_eq_ub(cursor: &Cursor) -> MosaicResult<UnionSet> {
    schedule_bound(cursor, true, false)
}

/// Complement of [`schedule_eq_ub`].
pub fn schedule_neq_ub(cursor: &Cursor) -> MosaicResult<UnionSet> {
    schedule_bound(cursor, true, true)
}

/// Bounds for the fresh parameters of a band, one parameter per member,
/// each confined to the member's schedule range. The result goes into a
/// context node above the filters referencing the parameters.
pub fn add_bounded_parameters_dynamic(
    cursor: &Cursor,
    params: &[Id],
) -> MosaicResult<Vec<Constraint>> {
    let bounds = member_bounds(cursor)?;
    if params.len() != bounds.len() {
        return Err(Error::invalid_input(
            "one parameter required per band member",
        ));
    }
    let mut out = Vec::with_capacity(2 * params.len());
    for (p, (lb, ub)) in params.iter().zip(bounds) {
        // lb <= p <= ub
        out.push(Constraint::Ge(Aff::param(0, *p).add_constant(-lb)));
        out.push(Constraint::Ge(Aff::param(0, *p).scale(-1).add_constant(ub)));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_poly::{MultiUnionAff, Schedule};

    fn banded(n_dim: usize, members: &[usize]) -> (Schedule, Cursor) {
        let stmt = Id::new("S0");
        let mut bs = BasicSet::universe(Some(stmt), n_dim);
        for d in 0..n_dim {
            bs = bs.bound_dim(d, 0, 3);
        }
        let sched =
            Schedule::from_domain(UnionSet::from_set(Set::from_basic(bs)));
        let mut mua = MultiUnionAff::new(members.len());
        mua = mua.add_stmt(
            stmt,
            members.iter().map(|&d| Aff::var(n_dim, d)).collect(),
        );
        let cursor = Cursor::at_root(&sched)
            .child(0)
            .unwrap()
            .insert_partial_schedule(mua);
        (cursor.schedule(), cursor)
    }

    #[test]
    fn narrow_band_zero_equates_leading_parameters() {
        let (_, cursor) = banded(2, &[1]);
        let p = [Id::new("p0"), Id::new("p1")];
        let eq = set_schedule_eq(&cursor, &p).unwrap();
        let set = eq.get(Id::new("S0")).unwrap();
        let bs = &set.basics[0];
        // first constraint pins p0 to zero
        let Constraint::Eq(a) = &bs.cons[0] else { panic!() };
        assert_eq!(a.param_coeff(Id::new("p0")), 1);
        assert!(a.coeffs.iter().all(|&c| c == 0));
        // second equates dim 1 with p1
        let Constraint::Eq(a) = &bs.cons[1] else { panic!() };
        assert_eq!(a.coeffs[1], 1);
        assert_eq!(a.param_coeff(Id::new("p1")), -1);
    }

    #[test]
    fn bound_selectors_partition_the_band_range() {
        let (_, cursor) = banded(1, &[0]);
        let stmt = Id::new("S0");
        let lb = schedule_eq_lb(&cursor).unwrap();
        let nub = schedule_neq_ub(&cursor).unwrap();
        let ub = schedule_eq_ub(&cursor).unwrap();
        assert_eq!(lb.get(stmt).unwrap().contains(&[0]), Some(true));
        assert_eq!(lb.get(stmt).unwrap().contains(&[1]), Some(false));
        assert_eq!(nub.get(stmt).unwrap().contains(&[2]), Some(true));
        assert_eq!(nub.get(stmt).unwrap().contains(&[3]), Some(false));
        assert_eq!(ub.get(stmt).unwrap().contains(&[3]), Some(true));
        assert_eq!(ub.get(stmt).unwrap().contains(&[2]), Some(false));
    }

    #[test]
    fn dynamic_parameter_bounds_cover_the_schedule_range() {
        let (_, cursor) = banded(2, &[0, 1]);
        let p = [Id::new("p0"), Id::new("p1")];
        let cons = add_bounded_parameters_dynamic(&cursor, &p).unwrap();
        assert_eq!(cons.len(), 4);
        // p0 >= 0 holds at p0 = 0 but 3 - p0 >= 0 fails at p0 = 4
        let Constraint::Ge(lo) = &cons[0] else { panic!() };
        assert_eq!(lo.param_coeff(Id::new("p0")), 1);
        let Constraint::Ge(hi) = &cons[1] else { panic!() };
        assert_eq!(hi.cst, 3);
        assert_eq!(hi.param_coeff(Id::new("p0")), -1);
    }

    #[test]
    fn modulo_selector_records_the_grid_size() {
        let (_, cursor) = banded(1, &[0]);
        let p = [Id::new("p0")];
        let m = set_schedule_modulo(&cursor, &p, &[2]).unwrap();
        let bs = &m.get(Id::new("S0")).unwrap().basics[0];
        assert!(matches!(bs.cons[0], Constraint::Mod(_, 2)));
    }
}
