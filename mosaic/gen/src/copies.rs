//! Grafting of synthetic transfer leaves into a schedule subtree, at
//! single-reference or whole-tile granularity.
//!
//! Every entry point computes the communicated data for the cursor
//! position first and grafts nothing when it is empty; that is a normal
//! skip, not an error.

use mosaic_ir::marks;
use mosaic_ir::{
    ArrayReference, ArrayReferenceGroup, DirectName, IoTransName, StmtName,
    Tile,
};
use mosaic_poly::{
    Aff, BasicMap, Constraint, Cursor, Map, MultiUnionAff, Set, TreeNode,
    TriState, UnionMap, UnionSet,
};
use mosaic_utils::{Error, Id, MosaicResult};
use std::rc::Rc;

/// Relation from schedule prefixes of length `depth` to the instances of
/// `stmt` inside the given box.
fn box_extension(depth: usize, stmt: Id, bounds: &[(i64, i64)]) -> UnionMap {
    let n = bounds.len();
    let mut bm = BasicMap::universe(None, depth, Some(stmt), n);
    for (j, &(lb, ub)) in bounds.iter().enumerate() {
        let x = Aff::var(depth + n, depth + j);
        bm.cons.push(Constraint::Ge(x.add_constant(-lb)));
        bm.cons.push(Constraint::Ge(x.scale(-1).add_constant(ub)));
    }
    UnionMap::from_map(Map::from_basic(bm))
}

/// Like [`box_extension`] but copying the exact footprint `data`.
fn set_extension(depth: usize, stmt: Id, data: &Set) -> UnionMap {
    let mut out = UnionMap::empty();
    for bs in &data.basics {
        let mut bm = BasicMap::universe(None, depth, Some(stmt), data.dim);
        bm.cons
            .extend(bs.cons.iter().map(|c| c.insert_dims(0, depth)));
        out.add_map(Map::from_basic(bm));
    }
    out
}

/// The band enumerating the copied elements, one member per data
/// dimension.
fn data_band(stmt: Id, n: usize, members: std::ops::Range<usize>) -> MultiUnionAff {
    let mut mua = MultiUnionAff::new(members.len());
    mua = mua.add_stmt(
        stmt,
        members.map(|j| Aff::var(n, j)).collect(),
    );
    mua
}

/// One-transfer-per-pack filter on the innermost data dimension, anchored
/// at the region's lower bound so the first element is always kept.
fn pack_filter(stmt: Id, n: usize, pack: u32, inner_lb: i64) -> UnionSet {
    UnionSet::from_set(Set::from_basic(
        mosaic_poly::BasicSet::universe(Some(stmt), n).with_constraint(
            Constraint::Mod(
                Aff::var(n, n - 1).add_constant(-inner_lb),
                u64::from(pack),
            ),
        ),
    ))
}

/// Assemble the copy subtree below an extension node: bands over the data
/// dimensions, the packing filter, and the annotation marks.
fn copy_subtree(
    extension: UnionMap,
    stmt: Id,
    n: usize,
    pack: u32,
    inner_lb: i64,
    coalesce_band: bool,
    relax_group: Option<Id>,
) -> Rc<TreeNode> {
    let mut node: Rc<TreeNode> = Rc::new(TreeNode::Leaf);
    if let Some(group) = relax_group {
        node = Rc::new(TreeNode::Mark {
            mark: marks::hls_dependence(group),
            child: node,
        });
    }
    node = Rc::new(TreeNode::Mark {
        mark: Id::new(marks::HLS_PIPELINE),
        child: node,
    });
    if pack > 1 {
        node = Rc::new(TreeNode::Filter {
            filter: pack_filter(stmt, n, pack, inner_lb),
            child: node,
        });
    }
    if n > 0 {
        if coalesce_band && n > 1 {
            node = Rc::new(TreeNode::Band {
                partial: data_band(stmt, n, n - 1..n),
                child: node,
            });
            node = Rc::new(TreeNode::Mark {
                mark: Id::new(marks::ACCESS_COALESCE),
                child: node,
            });
            node = Rc::new(TreeNode::Band {
                partial: data_band(stmt, n, 0..n - 1),
                child: node,
            });
        } else {
            node = Rc::new(TreeNode::Band {
                partial: data_band(stmt, n, 0..n),
                child: node,
            });
        }
    }
    Rc::new(TreeNode::Extension {
        extension,
        child: node,
    })
}

/// Rectangular hull of a data set, as per-dimension bounds.
fn hull(data: &Set) -> MosaicResult<Vec<(i64, i64)>> {
    (0..data.dim)
        .map(|d| {
            data.dim_bounds(d).ok_or_else(|| {
                Error::indeterminate("unbounded transferred region")
            })
        })
        .collect()
}

/// The elements one reference touches from the instances reaching the
/// cursor. `Ok(None)` when nothing is transferred.
fn ref_data(
    cursor: &Cursor,
    aref: &ArrayReference,
) -> MosaicResult<Option<Set>> {
    // parametric instance filters along the path select which module
    // instance transfers; the staged region itself spans all of them
    let reaching = cursor.reaching_domain_ground();
    let Some(dom) = reaching.get(aref.stmt) else {
        return Ok(None);
    };
    let access = aref.access.intersect_domain(dom);
    match access.is_empty() {
        TriState::Yes => return Ok(None),
        TriState::Maybe => {
            return Err(Error::indeterminate(format!(
                "access emptiness of `{}' undecided",
                aref.name
            )))
        }
        TriState::No => {}
    }
    let (data, exact) = access.range();
    if !exact {
        return Err(Error::indeterminate(format!(
            "access footprint of `{}' is inexact",
            aref.name
        )));
    }
    Ok(Some(data))
}

/// Insert a single-reference (register-tiled) transfer at the cursor.
///
/// When the transfer touches off-chip memory, a stride-one access whose
/// innermost extent exceeds the packing width is flagged as
/// coalescing-friendly: the statement name gains the coalesce fields and a
/// dependence-relaxation mark is placed on the leaf.
pub fn add_io_copies_stmt_acc(
    group: &ArrayReferenceGroup,
    aref: &ArrayReference,
    cursor: &Cursor,
    mut name: IoTransName,
    read: bool,
) -> MosaicResult<Option<Cursor>> {
    let Some(data) = ref_data(cursor, aref)? else {
        return Ok(None);
    };
    let bounds = hull(&data)?;
    let n = bounds.len();
    let pack = name.pack.max(1);

    let mut relax = None;
    if name.dram && aref.stride_one {
        let extent = bounds[n - 1].1 - bounds[n - 1].0 + 1;
        let bound = extent / pack;
        if bound > 1 {
            // depth of the innermost copy band, counting the new members
            let depth = (cursor.schedule_depth() + n) as i64 - 1;
            name.coalesce = Some((depth, bound));
            relax = Some(group.name);
        } else {
            name.coalesce = Some((-1, bound.max(1)));
        }
    }

    let stmt = StmtName::IoTrans(name).encode();
    let ext = box_extension(cursor.schedule_depth(), stmt, &bounds);
    let inner_lb = bounds.last().map_or(0, |b| b.0);
    let subtree =
        copy_subtree(ext, stmt, n, pack as u32, inner_lb, false, relax);
    Ok(Some(if read {
        cursor.graft_before(subtree)
    } else {
        cursor.graft_after(subtree)
    }))
}

/// Insert a whole-tile transfer at the cursor.
///
/// Reads copy the tile's full rectangular box, anchored at the footprint's
/// origin, to keep bursts contiguous; writes copy the exact footprint.
/// Buffered writes get a dependence-relaxation mark so the elaborator may
/// pipeline across the buffer. Tile transfers always carry the coalesce
/// fields: the innermost tile dimension is the burst dimension.
pub fn add_io_copies_stmt_tile(
    group: &ArrayReferenceGroup,
    tile: &Tile,
    cursor: &Cursor,
    mut name: IoTransName,
    read: bool,
) -> MosaicResult<Option<Cursor>> {
    let mut data: Option<Set> = None;
    for aref in &group.refs {
        if if read { !aref.read } else { !aref.write } {
            continue;
        }
        if let Some(d) = ref_data(cursor, aref)? {
            data = Some(match data {
                None => d,
                Some(acc) => acc.union(&d),
            });
        }
    }
    let Some(data) = data else { return Ok(None) };
    let n = data.dim;
    debug_assert_eq!(n, tile.n_dim());
    let pack = name.pack.max(1);

    let depth = cursor.schedule_depth();
    let bound = tile.last_extent() / pack;
    name.coalesce = if bound > 1 {
        Some(((depth + n) as i64 - 1, bound))
    } else {
        Some((-1, bound.max(1)))
    };

    let stmt = StmtName::IoTrans(name).encode();
    let (ext, inner_lb) = if read {
        // widen the accessed footprint to the tile box
        let mut bounds = hull(&data)?;
        for (b, &e) in bounds.iter_mut().zip(tile.extents.iter()) {
            b.1 = b.1.max(b.0 + e - 1);
        }
        let lb = bounds.last().map_or(0, |b| b.0);
        (box_extension(depth, stmt, &bounds), lb)
    } else {
        let lb = if n > 0 {
            data.dim_bounds(n - 1)
                .ok_or_else(|| {
                    Error::indeterminate("unbounded transferred region")
                })?
                .0
        } else {
            0
        };
        (set_extension(depth, stmt, &data), lb)
    };
    let relax = (!read).then_some(group.name);
    let subtree =
        copy_subtree(ext, stmt, n, pack as u32, inner_lb, pack > 1, relax);
    Ok(Some(if read {
        cursor.graft_before(subtree)
    } else {
        cursor.graft_after(subtree)
    }))
}

/// Insert a placeholder transfer for a boundary PE: the statement is
/// grafted with its domain recorded but an empty filter keeps it from
/// executing.
pub fn add_io_copies_dummy(
    group: &ArrayReferenceGroup,
    cursor: &Cursor,
    name: DirectName,
    read: bool,
) -> MosaicResult<Option<Cursor>> {
    debug_assert!(name.dummy);
    let mut data: Option<Set> = None;
    for aref in &group.refs {
        if if read { !aref.read } else { !aref.write } {
            continue;
        }
        if let Some(d) = ref_data(cursor, aref)? {
            data = Some(match data {
                None => d,
                Some(acc) => acc.union(&d),
            });
        }
    }
    let Some(data) = data else { return Ok(None) };
    let n = data.dim;
    let stmt = StmtName::Direct(name).encode();
    let ext = box_extension(cursor.schedule_depth(), stmt, &hull(&data)?);
    let empty = UnionSet::from_set(Set::empty(Some(stmt), n));
    let subtree = Rc::new(TreeNode::Extension {
        extension: ext,
        child: Rc::new(TreeNode::Band {
            partial: data_band(stmt, n, 0..n),
            child: Rc::new(TreeNode::Filter {
                filter: empty,
                child: Rc::new(TreeNode::Leaf),
            }),
        }),
    });
    Ok(Some(if read {
        cursor.graft_before(subtree)
    } else {
        cursor.graft_after(subtree)
    }))
}

/// Insert a direct (fifo-to-register) transfer around a compute statement,
/// used at the PE level where no staging happens.
pub fn add_pe_copies_stmt(
    cursor: &Cursor,
    aref: &ArrayReference,
    name: DirectName,
    read: bool,
) -> MosaicResult<Option<Cursor>> {
    let Some(data) = ref_data(cursor, aref)? else {
        return Ok(None);
    };
    let bounds = hull(&data)?;
    let n = bounds.len();
    let stmt = StmtName::Direct(name.clone()).encode();
    let ext = box_extension(cursor.schedule_depth(), stmt, &bounds);
    let inner_lb = bounds.last().map_or(0, |b| b.0);
    let subtree = copy_subtree(
        ext,
        stmt,
        n,
        name.pack.max(1) as u32,
        inner_lb,
        false,
        None,
    );
    Ok(Some(if read {
        cursor.graft_before(subtree)
    } else {
        cursor.graft_after(subtree)
    }))
}
