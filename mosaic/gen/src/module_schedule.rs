//! Per-module behavioral schedules: the filter×buffer state machine.
//!
//! Every variant starts from the shared base schedule, introduces fresh
//! instance parameters for the bands between the array mark and the
//! module's hierarchy mark, pins them with a context node, filters the
//! path, and grafts the actual transfer through the copy inserters.

use crate::constraint::{
    add_bounded_parameters_dynamic, schedule_eq_lb, schedule_eq_ub,
    set_schedule_eq, set_schedule_ge,
};
use crate::copies::{add_io_copies_stmt_acc, add_io_copies_stmt_tile};
use mosaic_ir::marks;
use mosaic_ir::{
    ArrayKind, ArrayReferenceGroup, Design, GroupBuffer, HardwareModule,
    IoTransName, LocalVar, ModuleType,
};
use mosaic_poly::{
    extension_leaf, universal_extension, Constraint, Cursor, Schedule,
    TreeNode,
};
use mosaic_utils::{Error, Id, MosaicResult};
use std::rc::Rc;

/// Position of one module within its group's chain, as classified by the
/// orchestrator.
#[derive(Copy, Clone, Debug)]
pub struct LevelSpec {
    pub level: usize,
    pub in_dir: bool,
    pub is_filter: bool,
    pub is_buffer: bool,
    pub outermost: usize,
    pub innermost: usize,
}

/// Nearest buffer with a live tile at or below `level`.
pub fn lookup_buffer(
    group: &ArrayReferenceGroup,
    level: usize,
) -> Option<(usize, &GroupBuffer)> {
    (1..=level).rev().find_map(|l| {
        group
            .buffer_at(l)
            .filter(|b| b.tile.is_some())
            .map(|b| (l, b))
    })
}

/// Packing width used on the wire at `level` of the chain.
fn level_pack(group: &ArrayReferenceGroup, level: usize) -> u32 {
    if level == 0 {
        return group.n_lane;
    }
    group
        .buffer_at(level)
        .map(|b| b.n_lane)
        .filter(|&l| l > 0)
        .unwrap_or(group.n_lane)
}

/// The filtered skeleton shared by all schedule variants of one module:
/// context, per-band instance parameters, and the equality/absorbing
/// filters along the path from the array mark down to the module's mark.
fn filtered_path(
    design: &Design,
    spec: &LevelSpec,
) -> MosaicResult<(Cursor, Vec<Id>)> {
    let sa = design.n_sa_dim;
    let root = Cursor::at_root(&design.schedule);
    let array = root.move_down_to_mark(marks::ARRAY)?;

    // bounds are read off the unfiltered tree first; the filters inserted
    // below would make them parametric
    let mut params: Vec<Id> = Vec::new();
    let mut context: Vec<Constraint> = Vec::new();
    let traversed: Vec<usize> = (spec.level..=sa).rev().collect();
    for (i, &k) in traversed.iter().enumerate() {
        let band = array
            .move_down_to_mark(&marks::io_level(k).to_string())?
            .parent()?;
        if !band.node().is_band() {
            return Err(Error::malformed_structure(format!(
                "no coordinate band above level {k}"
            )));
        }
        let p = Id::new(format!("p{i}"));
        context.extend(add_bounded_parameters_dynamic(&band, &[p])?);
        params.push(p);
    }

    let mut cursor = if context.is_empty() {
        array
    } else {
        array.child(0)?.insert_context(context).parent()?
    };

    for (i, &k) in traversed.iter().enumerate() {
        let band = cursor
            .move_down_to_mark(&marks::io_level(k).to_string())?
            .parent()?;
        let absorbing = k == spec.level && spec.is_filter;
        let filter = if absorbing {
            set_schedule_ge(&band, &params[i..=i])?
        } else {
            set_schedule_eq(&band, &params[i..=i])?
        };
        cursor = band.child(0)?.insert_filter(filter);
    }

    let cursor =
        cursor.move_down_to_mark(&marks::io_level(spec.level).to_string())?;
    Ok((cursor, params))
}

/// Statement-name record for a transfer of this module.
fn trans_name(
    group: &ArrayReferenceGroup,
    spec: &LevelSpec,
    design: &Design,
    n_params: usize,
    buffered: Option<&GroupBuffer>,
    fifo_level: usize,
    boundary: bool,
) -> IoTransName {
    let to_mem = spec.level == spec.outermost && is_external(design, group);
    let tile_depth = buffered
        .and_then(|b| b.tile.as_ref())
        .map(|t| t.depth as i64)
        .unwrap_or(0);
    IoTransName {
        in_dir: spec.in_dir,
        dram: to_mem,
        boundary,
        fifo: group.fifo_name(fifo_level),
        local: buffered.is_some(),
        is_filter: spec.is_filter,
        is_buffer: buffered.is_some(),
        sched_depth: tile_depth - 1,
        param_id: n_params as i64 - 1,
        pack: i64::from(level_pack(group, spec.level)),
        next_pack: Some(i64::from(level_pack(group, spec.level - 1))),
        coalesce: None,
    }
}

fn is_external(design: &Design, group: &ArrayReferenceGroup) -> bool {
    design
        .array_info(group.array)
        .map(|a| a.kind == ArrayKind::External)
        .unwrap_or(false)
}

/// Graft the module's transfer below `mark_cursor` (positioned at its
/// hierarchy mark) and return the finished schedule.
fn graft_transfer(
    group: &ArrayReferenceGroup,
    spec: &LevelSpec,
    mark_cursor: &Cursor,
    name: IoTransName,
    buffered: Option<&GroupBuffer>,
) -> MosaicResult<Option<Schedule>> {
    let at = mark_cursor.child(0)?;
    let read = spec.in_dir;
    let grafted = match buffered.and_then(|b| b.tile.as_ref()) {
        Some(tile) => {
            add_io_copies_stmt_tile(group, tile, &at, name, read)?
        }
        None => {
            let mut cur: Option<Cursor> = None;
            for aref in &group.refs {
                if if read { !aref.read } else { !aref.write } {
                    continue;
                }
                let pos = cur.as_ref().unwrap_or(&at);
                if let Some(next) = add_io_copies_stmt_acc(
                    group,
                    aref,
                    pos,
                    name.clone(),
                    read,
                )? {
                    cur = Some(next);
                }
            }
            cur
        }
    };
    Ok(grafted.map(|c| {
        c.schedule()
    }))
}

/// Replace the subtree below the mark with the outer control loop's call
/// leaves. The boundary flavor calls the chain-end transfer variants.
fn outer_calls(
    mark_cursor: &Cursor,
    in_dir: bool,
    double_buffer: bool,
    boundary: bool,
) -> MosaicResult<Schedule> {
    let at = mark_cursor.child(0)?;
    let depth = at.schedule_depth();
    let inter = Id::new(if boundary {
        marks::IO_INTER_TRANS_BOUNDARY
    } else {
        marks::IO_INTER_TRANS
    });
    let stmts: Vec<Id> = if double_buffer {
        let mut s = vec![
            inter,
            Id::new(marks::IO_INTRA_TRANS),
            Id::new(marks::IO_STATE_HANDLE),
        ];
        // drain the second half once the loop is exhausted
        s.push(if in_dir { Id::new(marks::IO_INTRA_TRANS) } else { inter });
        s
    } else if in_dir {
        vec![Id::new(if boundary {
            marks::IO_INTER_INTRA_BOUNDARY
        } else {
            marks::IO_INTER_INTRA
        })]
    } else {
        vec![Id::new(if boundary {
            marks::IO_INTRA_INTER_BOUNDARY
        } else {
            marks::IO_INTRA_INTER
        })]
    };
    let children = stmts
        .into_iter()
        .map(|s| extension_leaf(universal_extension(depth, s), s))
        .collect();
    let seq = Rc::new(TreeNode::Sequence { children });
    Ok(at.replace(seq).schedule())
}

/// Build one I/O or drain module with all its schedule variants.
pub fn build_io_module(
    design: &Design,
    group: &ArrayReferenceGroup,
    module_type: ModuleType,
    spec: LevelSpec,
) -> MosaicResult<HardwareModule> {
    let mut spec = spec;
    let (located, buffer_level) = if spec.is_buffer {
        match lookup_buffer(group, spec.level) {
            Some((l, b)) => {
                if l != spec.level {
                    // tile optimized away upstream; the module stages
                    // through the surviving lower-level tile instead
                    spec.is_buffer = false;
                }
                (Some(b), l)
            }
            None => {
                log::warn!(
                    "group `{}': buffered level {} has no tile anywhere below",
                    group.name,
                    spec.level
                );
                return Err(Error::malformed_structure(format!(
                    "no staging tile for group `{}' at level {}",
                    group.name, spec.level
                )));
            }
        }
    } else {
        (None, spec.level)
    };

    let mut module = HardwareModule::new(
        group.module_name(spec.level, spec.in_dir),
        module_type,
    );
    module.level = spec.level;
    module.is_filter = spec.is_filter;
    module.is_buffer = spec.is_buffer;
    module.in_dir = spec.in_dir;
    module.to_mem =
        spec.level == spec.outermost && is_external(design, group);
    module.to_pe = spec.level == spec.innermost;
    module.boundary = spec.is_filter;
    module.n_lane = level_pack(group, spec.level);
    module.next_n_lane = level_pack(group, spec.level - 1);
    module.double_buffer = design.arch.double_buffer
        && spec.is_buffer
        && spec.is_filter
        && is_external(design, group);

    // only a module that owns the buffer at its own level declares it;
    // a degraded module merely streams through the lower-level tile
    if let Some(tile) =
        located.filter(|_| spec.is_buffer).and_then(|b| b.tile.as_ref())
    {
        let mut extents = tile.extents.clone();
        if let Some(last) = extents.last_mut() {
            *last /= i64::from(module.next_n_lane.max(1));
        }
        module.local_vars.push(LocalVar {
            name: Id::new(format!("local_{}", group.array)),
            array: group.array,
            extents,
            n_lane: module.next_n_lane,
        });
        if !spec.in_dir && !group.any_write() {
            // the drain side would read staging memory nothing ever wrote
            log::warn!(
                "group `{}': local buffer at level {} may be read before \
                 it is written",
                group.name,
                spec.level
            );
        }
    }

    let (mark, params) = filtered_path(design, &spec)?;
    module.inst_ids = params.clone();

    if spec.is_filter && spec.is_buffer {
        // five-way decomposition
        module.scheds.outer = Some(outer_calls(
            &mark,
            spec.in_dir,
            module.double_buffer,
            false,
        )?);
        let inter = trans_name(
            group,
            &spec,
            design,
            params.len(),
            located,
            spec.level,
            false,
        );
        module.scheds.inter_trans = graft_transfer(
            group,
            &spec,
            &mark.child(0)?.cut().parent()?,
            inter.clone(),
            located,
        )?;
        let mut intra = trans_name(
            group,
            &spec,
            design,
            params.len(),
            located,
            spec.level - 1,
            false,
        );
        intra.dram = false;
        // the inward transfer of a PE-facing module only serves the
        // boundary PEs of its chain
        let intra_base = if module.to_pe {
            filter_boundary_pes(&mark, spec.level, spec.in_dir)?
        } else {
            mark.clone()
        };
        let intra_mark = descend_to_inner_mark(&intra_base, spec.level)?;
        module.scheds.intra_trans = graft_transfer(
            group,
            &spec,
            &intra_mark.child(0)?.cut().parent()?,
            intra,
            located,
        )?;
        module.scheds.boundary_outer = Some(outer_calls(
            &mark,
            spec.in_dir,
            module.double_buffer,
            true,
        )?);
        let mut b_inter = inter;
        b_inter.boundary = true;
        module.scheds.boundary_inter_trans = graft_transfer(
            group,
            &spec,
            &mark.child(0)?.cut().parent()?,
            b_inter,
            located,
        )?;
    } else {
        let name = trans_name(
            group,
            &spec,
            design,
            params.len(),
            located,
            spec.level,
            false,
        );
        let mark = if module.to_pe {
            filter_boundary_pes(&mark, spec.level, spec.in_dir)?
        } else {
            mark
        };
        let mark = if buffer_level != spec.level {
            // a degraded module grafts at the level that owns the tile
            mark.move_down_to_mark(
                &marks::io_level(buffer_level).to_string(),
            )?
        } else {
            mark
        };
        module.scheds.default =
            graft_transfer(group, &spec, &mark, name.clone(), located)?;
        if spec.is_filter {
            let mut b = name;
            b.boundary = true;
            module.scheds.boundary =
                graft_transfer(group, &spec, &mark, b, located)?;
        }
    }

    Ok(module)
}

/// Narrow every space band between a PE-facing module and the PE mark to
/// the boundary PEs terminating its chain: incoming data enters at the
/// chain head, outgoing data leaves at the tail. Returns the cursor back
/// at the module's own mark inside the edited tree.
fn filter_boundary_pes(
    mark: &Cursor,
    level: usize,
    in_dir: bool,
) -> MosaicResult<Cursor> {
    let mut cur = mark.clone();
    for k in (1..level).rev() {
        let band = cur
            .move_down_to_mark(&marks::io_level(k).to_string())?
            .parent()?;
        if !band.node().is_band() {
            return Err(Error::malformed_structure(format!(
                "no coordinate band above level {k}"
            )));
        }
        let filter = if in_dir {
            schedule_eq_lb(&band)?
        } else {
            schedule_eq_ub(&band)?
        };
        cur = band.child(0)?.insert_filter(filter);
    }
    cur.move_up_to_mark(&marks::io_level(level).to_string())
}

/// From a module's mark, descend to the next hierarchy mark toward the
/// PEs: `io_L<level-1>` or, at level 1, the PE mark.
fn descend_to_inner_mark(
    mark: &Cursor,
    level: usize,
) -> MosaicResult<Cursor> {
    if level > 1 {
        mark.move_down_to_mark(&marks::io_level(level - 1).to_string())
    } else {
        mark.move_down_to_mark(marks::PE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_ir::{DesignDesc, StmtName};
    use mosaic_poly::UnionSet;

    fn introduces(node: &TreeNode, stmt: Id) -> bool {
        if let TreeNode::Extension { extension, .. } = node {
            if extension.maps.iter().any(|m| m.out_tuple == Some(stmt)) {
                return true;
            }
        }
        (0..node.n_children())
            .any(|i| introduces(node.child(i).unwrap(), stmt))
    }

    fn design() -> Design {
        let desc: DesignDesc = serde_json::from_str(
            r#"{
            "arch": { "grid": [2, 2], "double_buffer": true },
            "statements": [
                { "name": "S0", "bounds": [[0,3],[0,1],[0,1],[0,7]] }
            ],
            "array_part_dims": 1,
            "arrays": [
                { "name": "A", "kind": "external", "size": 4,
                  "extents": [4, 16] }
            ],
            "groups": [
                { "name": "A_0", "array": "A", "nr": 0, "kind": "io",
                  "io_kind": "exterior", "pack": 2, "io_level": 3,
                  "buffers": [
                      { "tile": { "extents": [2, 8], "depth": 3 },
                        "pack": 2 },
                      {},
                      { "tile": { "extents": [4, 16], "depth": 1 },
                        "pack": 2 }
                  ],
                  "refs": [
                      { "name": "A_r", "stmt": "S0", "read": true,
                        "access": [[0,2,1,0,0],[0,0,0,2,0]],
                        "stride_one": true }
                  ] }
            ]
        }"#,
        )
        .unwrap();
        desc.build().unwrap()
    }

    fn spec(level: usize, is_filter: bool, is_buffer: bool) -> LevelSpec {
        LevelSpec {
            level,
            in_dir: true,
            is_filter,
            is_buffer,
            outermost: 3,
            innermost: 2,
        }
    }

    #[test]
    fn buffer_lookup_degrades_and_errors() {
        let d = design();
        let g = &d.groups[0];
        // level 2 has no tile; the nearest live tile is level 1
        assert_eq!(lookup_buffer(g, 2).unwrap().0, 1);
        let m =
            build_io_module(&d, g, ModuleType::Io, spec(2, true, true))
                .unwrap();
        assert!(!m.is_buffer, "missing tile must degrade the buffer flag");

        // a group with no tiles at all fails loudly
        let mut bare = g.clone();
        for b in &mut bare.buffers {
            b.tile = None;
        }
        let err =
            build_io_module(&d, &bare, ModuleType::Io, spec(2, true, true));
        assert!(err.is_err());
    }

    #[test]
    fn filter_buffer_module_gets_the_five_way_decomposition() {
        let d = design();
        let g = &d.groups[0];
        let m =
            build_io_module(&d, g, ModuleType::Io, spec(1, true, true))
                .unwrap();
        assert!(m.scheds.outer.is_some());
        assert!(m.scheds.inter_trans.is_some());
        assert!(m.scheds.intra_trans.is_some());
        assert!(m.scheds.boundary_outer.is_some());
        assert!(m.scheds.boundary_inter_trans.is_some());
        assert!(m.scheds.default.is_none());
        assert!(m.double_buffer);

        // double buffering emits the state-handling call in the outer loop
        let outer = m.scheds.outer.as_ref().unwrap();
        assert!(Cursor::at_root(outer).find_mark(marks::ARRAY).is_some());
        assert!(introduces(&outer.root, Id::new(marks::IO_STATE_HANDLE)));
    }

    #[test]
    fn boundary_outer_calls_the_boundary_transfers() {
        let d = design();
        let g = &d.groups[0];
        let m =
            build_io_module(&d, g, ModuleType::Io, spec(1, true, true))
                .unwrap();
        let outer = m.scheds.outer.as_ref().unwrap();
        let b_outer = m.scheds.boundary_outer.as_ref().unwrap();
        assert!(introduces(&outer.root, Id::new(marks::IO_INTER_TRANS)));
        assert!(!introduces(
            &outer.root,
            Id::new(marks::IO_INTER_TRANS_BOUNDARY)
        ));
        assert!(introduces(
            &b_outer.root,
            Id::new(marks::IO_INTER_TRANS_BOUNDARY)
        ));
        assert!(!introduces(
            &b_outer.root,
            Id::new(marks::IO_INTER_TRANS)
        ));
    }

    #[test]
    fn pe_facing_module_feeds_only_the_chain_head() {
        let d = design();
        let g = &d.groups[0];
        let m =
            build_io_module(&d, g, ModuleType::Io, spec(2, true, false))
                .unwrap();
        let sched = m.scheds.default.as_ref().unwrap();
        // a parameter-free filter pins the level-1 space coordinate to
        // the head of the chain
        fn pins(node: &TreeNode) -> bool {
            if let TreeNode::Filter { filter, .. } = node {
                if let Some(s) = filter.get(Id::new("S0")) {
                    let ground = s.basics.iter().all(|bs| {
                        bs.cons.iter().all(|c| !c.aff().has_params())
                    });
                    if ground
                        && s.contains(&[0, 0, 0, 0]) == Some(true)
                        && s.contains(&[0, 0, 1, 0]) == Some(false)
                    {
                        return true;
                    }
                }
            }
            (0..node.n_children())
                .any(|i| pins(node.child(i).unwrap()))
        }
        assert!(pins(&sched.root));
    }

    #[test]
    fn degraded_buffer_stages_through_the_lower_tile() {
        let d = design();
        let g = &d.groups[0];
        let m =
            build_io_module(&d, g, ModuleType::Io, spec(2, true, true))
                .unwrap();
        assert!(!m.is_buffer);
        assert!(m.local_vars.is_empty());
        // the transfer lands below the level that still owns the tile
        let sched = m.scheds.default.as_ref().unwrap();
        let io1 = Cursor::at_root(sched).move_down_to_mark("io_L1").unwrap();
        fn first_extension(node: &TreeNode) -> Option<String> {
            if let TreeNode::Extension { extension, .. } = node {
                return extension.maps[0].out_tuple.map(|t| t.to_string());
            }
            (0..node.n_children())
                .find_map(|i| first_extension(node.child(i).unwrap()))
        }
        let stmt = first_extension(io1.node()).expect("transfer below io_L1");
        let StmtName::IoTrans(n) = StmtName::decode(&stmt).unwrap() else {
            panic!();
        };
        assert!(n.local);
        // the level-1 tile is [2, 8] with pack 2
        let (_, bound) = n.coalesce.unwrap();
        assert_eq!(bound, 4);
    }

    #[test]
    fn outermost_module_is_unfiltered_and_faces_memory() {
        let d = design();
        let g = &d.groups[0];
        let m =
            build_io_module(&d, g, ModuleType::Io, spec(3, false, true))
                .unwrap();
        assert!(m.to_mem);
        assert!(!m.is_filter);
        assert!(m.inst_ids.is_empty());
        assert!(m.scheds.default.is_some());
        assert!(m.scheds.boundary.is_none());
    }

    #[test]
    fn filters_reference_the_fresh_parameters() {
        let d = design();
        let g = &d.groups[0];
        let m =
            build_io_module(&d, g, ModuleType::Io, spec(2, true, false))
                .unwrap();
        assert_eq!(m.inst_ids, vec![Id::new("p0")]);
        let sched = m.scheds.default.as_ref().unwrap();
        // one filter along the path mentions p0
        fn mentions(node: &TreeNode, p: Id) -> bool {
            if let TreeNode::Filter { filter, .. } = node {
                let touches = |us: &UnionSet| {
                    us.sets.iter().any(|s| {
                        s.basics.iter().any(|bs| {
                            bs.cons
                                .iter()
                                .any(|c| c.aff().param_coeff(p) != 0)
                        })
                    })
                };
                if touches(filter) {
                    return true;
                }
            }
            (0..node.n_children())
                .any(|i| mentions(node.child(i).unwrap(), p))
        }
        assert!(mentions(&sched.root, Id::new("p0")));
    }
}
