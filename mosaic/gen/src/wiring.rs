//! Top-level wiring: the final module order, one call schedule per module
//! instance flavor, and the fifo declarations connecting the network.
//!
//! Call schedules reuse the base schedule's bands so the elaborator
//! instantiates modules with the same loop structure the modules
//! themselves were generated under. The compute statements are silenced
//! with an empty filter; only the wiring statements survive.

use crate::constraint::{schedule_eq_lb, schedule_eq_ub, schedule_neq_ub};
use crate::orchestrate::Generator;
use itertools::Itertools;
use linked_hash_map::LinkedHashMap;
use mosaic_ir::marks;
use mosaic_ir::{
    ArrayReferenceGroup, Design, Direction, HardwareModule, ModuleType,
    PeDummyModule, StmtName, TopModule, WiringName,
};
use mosaic_poly::{
    extension_leaf, universal_extension, Cursor, Schedule, UnionSet,
};
use mosaic_utils::{Error, Id, MosaicResult};

/// Copy-in I/O modules, the PE module, copy-out I/O modules, then drain
/// modules; relative order within each class is preserved.
fn module_rank(m: &HardwareModule) -> usize {
    match m.module_type {
        ModuleType::Io if m.in_dir => 0,
        ModuleType::Pe => 1,
        ModuleType::Io => 2,
        ModuleType::Drain => 3,
    }
}

pub fn hw_module_reorder(
    modules: Vec<HardwareModule>,
) -> Vec<HardwareModule> {
    modules.into_iter().sorted_by_key(module_rank).collect()
}

/// Replace the subtree at the cursor with a single wiring statement; the
/// statements that used to execute here are kept from running by an empty
/// filter.
fn call_at(cursor: &Cursor, name: WiringName) -> Cursor {
    let stmt = StmtName::Wiring(name).encode();
    let leaf = cursor.cut();
    let depth = leaf.schedule_depth();
    leaf.insert_filter(UnionSet::empty())
        .graft_before(extension_leaf(universal_extension(depth, stmt), stmt))
}

fn with_ownership_mark(
    sched: &Schedule,
    mark: &str,
) -> MosaicResult<Schedule> {
    let kernel = Cursor::at_root(sched).move_down_to_mark(marks::KERNEL)?;
    Ok(kernel.child(0)?.insert_mark(Id::new(mark)).schedule())
}

/// The PE module is called once per grid position.
fn pe_module_call(
    design: &Design,
    pe: &HardwareModule,
) -> MosaicResult<Schedule> {
    let at = Cursor::at_root(&design.schedule)
        .move_down_to_mark(marks::PE)?
        .child(0)?;
    let done = call_at(&at, WiringName::ModuleCall { module: pe.name });
    with_ownership_mark(&done.schedule(), marks::MODULE)
}

/// A dummy companion is called once per boundary position of the chain.
fn dummy_module_call(
    design: &Design,
    dummy: &PeDummyModule,
) -> MosaicResult<Schedule> {
    let band = Cursor::at_root(&design.schedule)
        .move_down_to_mark(&marks::io_level(1).to_string())?
        .parent()?;
    let filter = schedule_eq_ub(&band)?;
    let at = band
        .child(0)?
        .insert_filter(filter)
        .move_down_to_mark(marks::PE)?
        .child(0)?;
    let done = call_at(&at, WiringName::ModuleCall { module: dummy.name });
    with_ownership_mark(&done.schedule(), marks::PE_DUMMY_MODULE)
}

/// One call schedule for an I/O or drain module flavor: the upper hookup
/// runs once per module instance, the lower hookup below the next
/// hierarchy mark. Filtering modules exist in two flavors, split by
/// whether the instance sits at the end of its chain.
fn io_module_call(
    design: &Design,
    module: &HardwareModule,
    boundary: bool,
) -> MosaicResult<Schedule> {
    let own_level = marks::io_level(module.level).to_string();
    let mark = Cursor::at_root(&design.schedule)
        .move_down_to_mark(&own_level)?;

    let mark = if module.is_filter {
        let band = mark.parent()?;
        let filter = if boundary {
            schedule_eq_ub(&band)?
        } else {
            schedule_neq_ub(&band)?
        };
        band.child(0)?.insert_filter(filter).child(0)?
    } else {
        mark
    };

    let upper = StmtName::Wiring(WiringName::ModuleCallUpper {
        module: module.name,
        boundary,
    })
    .encode();
    let cur = mark.graft_before(extension_leaf(
        universal_extension(mark.schedule_depth(), upper),
        upper,
    ));

    let inner = if module.level > 1 {
        cur.move_down_to_mark(&marks::io_level(module.level - 1).to_string())?
    } else {
        cur.move_down_to_mark(marks::PE)?
    };
    // a module feeding another I/O module hooks up to the head of the
    // lower chain only; a module feeding PEs hooks up to each of them
    let inner = if module.level > 1 && !module.to_pe {
        let band = inner.parent()?;
        let head = schedule_eq_lb(&band)?;
        band.child(0)?.insert_filter(head).child(0)?
    } else {
        inner
    };

    let lower = StmtName::Wiring(WiringName::ModuleCallLower {
        module: module.name,
        boundary,
    })
    .encode();
    let leaf = inner.child(0)?.cut();
    let depth = leaf.schedule_depth();
    let done = leaf.insert_filter(UnionSet::empty()).graft_after(
        extension_leaf(universal_extension(depth, lower), lower),
    );
    with_ownership_mark(&done.schedule(), marks::MODULE)
}

/// Declarations keyed `<fifo>_<module>.<byte-width>`; the map keeps the
/// first schedule per key so shared fifos are declared once.
type FifoDecls = LinkedHashMap<String, Schedule>;

fn element_size(
    design: &Design,
    group: &ArrayReferenceGroup,
) -> MosaicResult<u32> {
    design
        .array_info(group.array)
        .map(|a| a.size)
        .ok_or_else(|| {
            Error::malformed_structure(format!(
                "group `{}' names unknown array `{}'",
                group.name, group.array
            ))
        })
}

/// Fifos on the upper side of one I/O module, one per module instance.
fn io_fifo_decls(
    design: &Design,
    module: &HardwareModule,
    group: &ArrayReferenceGroup,
    out: &mut FifoDecls,
) -> MosaicResult<()> {
    let fifo = group.fifo_name(module.level);
    let width = element_size(design, group)? * module.n_lane;
    let mark = Cursor::at_root(&design.schedule)
        .move_down_to_mark(&marks::io_level(module.level).to_string())?;

    let key = format!("{fifo}_{}.{width}", module.name);
    if !out.contains_key(&key) {
        let done =
            call_at(&mark.child(0)?, WiringName::FifoDecl { fifo });
        out.insert(key, done.schedule());
    }

    if module.is_filter {
        // the chain-end instance keeps a separately named fifo so the
        // elaborator can terminate it
        let key = format!("{fifo}_{}_boundary.{width}", module.name);
        if !out.contains_key(&key) {
            let band = mark.parent()?;
            let filter = schedule_eq_ub(&band)?;
            let at = band.child(0)?.insert_filter(filter).child(0)?.child(0)?;
            let done = call_at(&at, WiringName::FifoDeclBoundary { fifo });
            out.insert(key, done.schedule());
        }
    }
    Ok(())
}

/// PE-facing fifos of one group, one per grid position, plus the dangling
/// boundary fifo when the group's PE direction saturated.
fn pe_fifo_decls(
    design: &Design,
    pe: &HardwareModule,
    group: &ArrayReferenceGroup,
    out: &mut FifoDecls,
) -> MosaicResult<()> {
    let fifo = group.fifo_name(0);
    let width = element_size(design, group)? * group.n_lane;
    let root = Cursor::at_root(&design.schedule);

    let key = format!("{fifo}_{}.{width}", pe.name);
    if !out.contains_key(&key) {
        let at = root.move_down_to_mark(marks::PE)?.child(0)?;
        let done = call_at(&at, WiringName::FifoDecl { fifo });
        out.insert(key, done.schedule());
    }

    if group.pe_io_dir == Direction::InOut {
        let key = format!("{fifo}_{}_boundary.{width}", pe.name);
        if !out.contains_key(&key) {
            let band = root
                .move_down_to_mark(&marks::io_level(1).to_string())?
                .parent()?;
            let filter = schedule_eq_ub(&band)?;
            let at = band
                .child(0)?
                .insert_filter(filter)
                .move_down_to_mark(marks::PE)?
                .child(0)?;
            let done = call_at(&at, WiringName::FifoDeclBoundary { fifo });
            out.insert(key, done.schedule());
        }
    }
    Ok(())
}

/// Assemble the wired top module from the finished generation state.
pub fn build_top(mut gen: Generator<'_>) -> MosaicResult<TopModule> {
    let design = gen.design();
    let modules = hw_module_reorder(std::mem::take(&mut gen.modules));

    let mut call_scheds = Vec::new();
    let mut fifos = FifoDecls::new();
    for m in &modules {
        match m.module_type {
            ModuleType::Pe => {
                call_scheds.push(pe_module_call(design, m)?);
                for dummy in &m.pe_dummy_modules {
                    call_scheds.push(dummy_module_call(design, dummy)?);
                }
                for &gi in m.io_groups.iter().unique() {
                    pe_fifo_decls(design, m, &gen.groups[gi], &mut fifos)?;
                }
            }
            ModuleType::Io | ModuleType::Drain => {
                call_scheds.push(io_module_call(design, m, false)?);
                if m.is_filter {
                    call_scheds.push(io_module_call(design, m, true)?);
                }
                if !m.to_mem {
                    let gi = *m.io_groups.first().ok_or_else(|| {
                        Error::malformed_structure(format!(
                            "module `{}' belongs to no group",
                            m.name
                        ))
                    })?;
                    io_fifo_decls(design, m, &gen.groups[gi], &mut fifos)?;
                }
            }
        }
    }

    let (fifo_decl_names, fifo_decl_scheds) = fifos.into_iter().unzip();
    Ok(TopModule {
        modules,
        module_call_scheds: call_scheds,
        fifo_decl_scheds,
        fifo_decl_names,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_ir::DesignDesc;
    use mosaic_poly::TreeNode;

    fn scenario() -> Design {
        let desc: DesignDesc = serde_json::from_str(
            r#"{
            "arch": { "grid": [2, 2] },
            "statements": [
                { "name": "S0", "bounds": [[0,3],[0,1],[0,1],[0,7]] }
            ],
            "array_part_dims": 1,
            "arrays": [
                { "name": "A", "kind": "external", "size": 4,
                  "extents": [4, 16] },
                { "name": "C", "kind": "internal", "size": 4,
                  "extents": [2, 2] }
            ],
            "groups": [
                { "name": "A_0", "array": "A", "nr": 0, "kind": "io",
                  "io_kind": "exterior", "pack": 1, "io_level": 3,
                  "buffers": [
                      {},
                      {},
                      { "tile": { "extents": [4, 16], "depth": 1 } }
                  ],
                  "refs": [
                      { "name": "A_r", "stmt": "S0", "read": true,
                        "access": [[0,2,1,0,0],[0,0,0,2,0]],
                        "stride_one": true }
                  ] },
                { "name": "C_drain", "array": "C", "kind": "drain",
                  "io_kind": "exterior", "pack": 1, "io_level": 3,
                  "buffers": [
                      {},
                      {},
                      { "tile": { "extents": [2, 2], "depth": 1 } }
                  ],
                  "refs": [
                      { "name": "C_w", "stmt": "S0", "write": true,
                        "access": [[0,1,0,0,0],[0,0,1,0,0]],
                        "stride_one": false }
                  ] }
            ]
        }"#,
        )
        .unwrap();
        desc.build().unwrap()
    }

    fn generated(design: &Design) -> Generator<'_> {
        let mut gen = Generator::new(design);
        gen.generate_group_io(0).unwrap();
        gen.generate_group_io(1).unwrap();
        gen.generate_pe_module().unwrap();
        gen
    }

    fn introduces(node: &TreeNode, stmt: Id) -> bool {
        if let TreeNode::Extension { extension, .. } = node {
            if extension.maps.iter().any(|m| m.out_tuple == Some(stmt)) {
                return true;
            }
        }
        (0..node.n_children())
            .any(|i| introduces(node.child(i).unwrap(), stmt))
    }

    #[test]
    fn modules_settle_into_chain_order() {
        let design = scenario();
        let top = build_top(generated(&design)).unwrap();
        let names: Vec<_> =
            top.modules.iter().map(|m| m.name.to_string()).collect();
        assert_eq!(
            names,
            vec![
                "A_0_IO_L3_in",
                "A_0_IO_L2_in",
                "PE",
                "C_drain_IO_L2_out",
                "C_drain_IO_L3_out",
            ]
        );
    }

    #[test]
    fn filter_modules_get_a_boundary_call_flavor() {
        let design = scenario();
        let top = build_top(generated(&design)).unwrap();
        // L3 in: 1, L2 in: 2, PE: 1, L2 out: 2, L3 out: 1
        assert_eq!(top.module_call_scheds.len(), 7);

        let has = |stmt: &str| {
            top.module_call_scheds
                .iter()
                .any(|s| introduces(&s.root, Id::new(stmt)))
        };
        assert!(has("module_call.PE"));
        assert!(has("module_call_upper.A_0_IO_L2_in"));
        assert!(has("module_call_lower.A_0_IO_L2_in.boundary"));
        assert!(has("module_call_upper.C_drain_IO_L3_out"));
        assert!(!has("module_call_upper.A_0_IO_L3_in.boundary"));
    }

    #[test]
    fn fifo_declarations_cover_every_on_chip_link() {
        let design = scenario();
        let top = build_top(generated(&design)).unwrap();
        assert_eq!(top.fifo_decl_names.len(), top.fifo_decl_scheds.len());
        // element size 4, pack 1 everywhere
        assert!(top
            .fifo_decl_names
            .contains(&"fifo_A_0_PE_PE.4".to_string()));
        assert!(top
            .fifo_decl_names
            .contains(&"fifo_A_0_IO_L2_A_0_IO_L2_in.4".to_string()));
        assert!(top
            .fifo_decl_names
            .contains(&"fifo_A_0_IO_L2_A_0_IO_L2_in_boundary.4".to_string()));
        // the off-chip side of the outermost external module has no fifo
        assert!(!top
            .fifo_decl_names
            .iter()
            .any(|n| n.starts_with("fifo_A_0_IO_L3_A_0_IO_L3_in")));
    }

    #[test]
    fn lower_hookup_targets_the_chain_head() {
        let design = {
            let mut d = scenario();
            d.groups[0].io_kind = mosaic_ir::IoKind::Interior;
            d
        };
        let top = build_top(generated(&design)).unwrap();
        // the interior L2 module feeds the L1 module at the head of its
        // row, so its lower call is pinned by an extra filter
        let sched = top
            .module_call_scheds
            .iter()
            .find(|s| {
                introduces(&s.root, Id::new("module_call_lower.A_0_IO_L2_in"))
            })
            .unwrap();
        fn filter_count(node: &TreeNode) -> usize {
            let own = usize::from(matches!(node, TreeNode::Filter { .. }));
            own + (0..node.n_children())
                .map(|i| filter_count(node.child(i).unwrap()))
                .sum::<usize>()
        }
        // chain split, head pinning, and the silenced compute leaf
        assert_eq!(filter_count(&sched.root), 3);
    }
}
