//! Dependence-driven pruning: decides whether a communication stage is
//! structurally required for a group and direction.

use mosaic_ir::{ArrayReferenceGroup, DepKind, Design, GroupKind};
use mosaic_poly::{Aff, BasicMap, Map, TriState, UnionMap};
use mosaic_utils::{Error, MosaicResult};

/// The relation from statement instances to their array-partition and
/// space schedule prefix.
fn prefix_map(design: &Design) -> UnionMap {
    let k = design.array_part_dims + design.n_sa_dim;
    let mut out = UnionMap::empty();
    for set in &design.schedule.domain().sets {
        let Some(stmt) = set.tuple else { continue };
        let affs: Vec<Aff> = (0..k).map(|d| Aff::var(set.dim, d)).collect();
        let m = Map::from_basic(BasicMap::from_affs(
            Some(stmt),
            set.dim,
            None,
            &affs,
        ))
        .intersect_domain(set);
        out.add_map(m);
    }
    out
}

/// Pairs every schedule prefix with the next iteration of the innermost
/// array-partition dimension at the same space coordinates.
fn partition_successor(design: &Design) -> UnionMap {
    let k = design.array_part_dims + design.n_sa_dim;
    let step = design.array_part_dims - 1;
    let affs: Vec<Aff> = (0..k)
        .map(|d| {
            let a = Aff::var(k, d);
            if d == step {
                a.add_constant(1)
            } else {
                a
            }
        })
        .collect();
    UnionMap::from_map(Map::from_basic(BasicMap::from_affs(
        None, k, None, &affs,
    )))
}

/// Union of the flow-dependence relations, optionally restricted to those
/// whose direction-side reference belongs to `group`.
fn flow_deps(
    design: &Design,
    group: Option<(&ArrayReferenceGroup, bool)>,
) -> UnionMap {
    let mut out = UnionMap::empty();
    for dep in &design.deps {
        if dep.kind != DepKind::Flow {
            continue;
        }
        if let Some((group, in_dir)) = group {
            let tagged = if in_dir { dep.dst_ref } else { dep.src_ref };
            let matches = group.refs.iter().any(|r| {
                r.name == tagged && if in_dir { r.read } else { r.write }
            });
            if !matches {
                continue;
            }
        }
        out.add_map(dep.rel.clone());
    }
    out
}

/// Whether every element the group accesses is supplied by the previous
/// array-partition iteration at the same space coordinates, so the data can
/// persist locally instead of making an outer-memory round trip.
///
/// `Yes` means fully overlapped (no module needed); `Maybe` when a
/// projection or subtraction was inexact.
pub fn internal_group_in_out_overlap(
    design: &Design,
    group: &ArrayReferenceGroup,
    in_dir: bool,
) -> TriState {
    if design.array_part_dims == 0 {
        // no outer loop to carry the data across
        return TriState::No;
    }
    let prefix = prefix_map(design);
    let lt = partition_successor(design);

    // overlap over iteration-domain pairs
    let (fwd, exact_fwd) = prefix.apply_range(&lt);
    let (overlap, exact_bwd) = fwd.apply_range(&prefix.reverse());
    if !(exact_fwd && exact_bwd) {
        return TriState::Maybe;
    }

    let deps = flow_deps(design, None);
    let overlap_deps = overlap.intersect(&deps);
    match overlap_deps.is_empty() {
        // no dependence follows the overlap pattern: nothing persists
        TriState::Yes => return TriState::No,
        TriState::Maybe => return TriState::Maybe,
        TriState::No => {}
    }

    let external = flow_deps(design, Some((group, in_dir)));
    let Some(remaining) = external.subtract(&overlap_deps) else {
        return TriState::Maybe;
    };

    // instances on the group's side of the surviving dependences
    let (side, exact) = if in_dir {
        remaining.range()
    } else {
        remaining.domain()
    };
    if !exact {
        return TriState::Maybe;
    }

    let mut access = UnionMap::empty();
    for r in &group.refs {
        if if in_dir { r.read } else { r.write } {
            access.add_map(r.access.clone());
        }
    }
    access.intersect_domain(&side).is_empty()
}

/// Whether a module chain must exist for this group and direction.
///
/// PE-local groups never need one. A group whose matching dependences are
/// all read-after-read only loads (no result flows out), so the copy-out
/// chain is dropped. Otherwise the overlap test decides; an indeterminate
/// overlap aborts generation rather than guessing.
pub fn is_module_valid(
    design: &Design,
    group: &ArrayReferenceGroup,
    in_dir: bool,
) -> MosaicResult<bool> {
    if group.kind == GroupKind::PeLocal {
        return Ok(true);
    }
    let matching: Vec<_> = design
        .deps
        .iter()
        .filter(|d| {
            group.refs.iter().any(|r| {
                if in_dir {
                    r.name == d.dst_ref && r.read
                } else {
                    r.name == d.src_ref && r.write
                }
            })
        })
        .collect();
    let external =
        matching.is_empty() || matching.iter().all(|d| d.kind == DepKind::Rar);
    if external {
        return Ok(in_dir);
    }
    match internal_group_in_out_overlap(design, group, in_dir) {
        TriState::Yes => Ok(false),
        TriState::No => Ok(true),
        TriState::Maybe => Err(Error::indeterminate(format!(
            "overlap analysis for group `{}' did not converge",
            group.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_ir::DesignDesc;

    fn design(json: &str) -> Design {
        let desc: DesignDesc = serde_json::from_str(json).unwrap();
        desc.build().unwrap()
    }

    fn base_json(dep_kind: &str, distance: &str) -> String {
        format!(
            r#"{{
            "arch": {{ "grid": [2, 2] }},
            "statements": [
                {{ "name": "S0", "bounds": [[0,3],[0,1],[0,1],[0,7]] }}
            ],
            "array_part_dims": 1,
            "arrays": [
                {{ "name": "A", "kind": "external", "size": 4,
                   "extents": [16, 16] }}
            ],
            "groups": [
                {{ "name": "A_0", "array": "A", "nr": 0, "kind": "io",
                   "io_kind": "exterior", "pack": 1, "io_level": 3,
                   "buffers": [{{}}, {{}}, {{}}],
                   "refs": [
                       {{ "name": "A_r", "stmt": "S0", "read": true,
                          "write": true,
                          "access": [[0,2,0,0,0],[0,0,2,1,0]],
                          "stride_one": true }}
                   ] }}
            ],
            "deps": [
                {{ "kind": "{dep_kind}", "src_stmt": "S0", "dst_stmt": "S0",
                   "src_ref": "A_r", "dst_ref": "A_r",
                   "distance": {distance} }}
            ]
        }}"#
        )
    }

    #[test]
    fn rar_only_groups_load_but_never_store() {
        let d = design(&base_json("rar", "[1, 0, 0, 0]"));
        let g = &d.groups[0];
        assert!(is_module_valid(&d, g, true).unwrap());
        assert!(!is_module_valid(&d, g, false).unwrap());
    }

    #[test]
    fn partition_carried_flow_dependence_is_fully_overlapped() {
        // the access pattern is partition-invariant and the producer of
        // each element is exactly one partition iteration back
        let d = design(&base_json("flow", "[1, 0, 0, 0]"));
        let g = &d.groups[0];
        assert_eq!(
            internal_group_in_out_overlap(&d, g, true),
            TriState::Yes
        );
        assert!(!is_module_valid(&d, g, true).unwrap());
    }

    #[test]
    fn space_carried_dependence_defeats_the_overlap() {
        // data moves between PEs, not across partition iterations
        let d = design(&base_json("flow", "[0, 1, 0, 0]"));
        let g = &d.groups[0];
        assert_eq!(internal_group_in_out_overlap(&d, g, true), TriState::No);
        assert!(is_module_valid(&d, g, true).unwrap());
    }

    #[test]
    fn overlap_is_invariant_under_partition_shift() {
        // shifting the partition coordinate of every statement instance
        // leaves the verdict unchanged
        let shifted = format!(
            r#"{{
            "arch": {{ "grid": [2, 2] }},
            "statements": [
                {{ "name": "S0", "bounds": [[5,8],[0,1],[0,1],[0,7]] }}
            ],
            "array_part_dims": 1,
            "arrays": [
                {{ "name": "A", "kind": "external", "size": 4,
                   "extents": [16, 16] }}
            ],
            "groups": [
                {{ "name": "A_0", "array": "A", "nr": 0, "kind": "io",
                   "io_kind": "exterior", "pack": 1, "io_level": 3,
                   "buffers": [{{}}, {{}}, {{}}],
                   "refs": [
                       {{ "name": "A_r", "stmt": "S0", "read": true,
                          "write": true,
                          "access": [[0,2,0,0,0],[0,0,2,1,0]],
                          "stride_one": true }}
                   ] }}
            ],
            "deps": [
                {{ "kind": "flow", "src_stmt": "S0", "dst_stmt": "S0",
                   "src_ref": "A_r", "dst_ref": "A_r",
                   "distance": [1, 0, 0, 0] }}
            ]
        }}"#
        );
        let a = design(&base_json("flow", "[1, 0, 0, 0]"));
        let b = design(&shifted);
        assert_eq!(
            internal_group_in_out_overlap(&a, &a.groups[0], true),
            internal_group_in_out_overlap(&b, &b.groups[0], true),
        );
    }
}
