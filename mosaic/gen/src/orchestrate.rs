//! Drives generation: per-group I/O chains, the drain chain, the PE
//! module, and the boundary dummy modules.
//!
//! Direction flags and per-array counters are accumulated here and
//! nowhere else; the modules themselves are immutable once built.

use crate::constraint::{schedule_eq_ub, set_schedule_modulo};
use crate::copies::{add_io_copies_dummy, add_pe_copies_stmt};
use crate::module_schedule::{build_io_module, LevelSpec};
use crate::overlap::is_module_valid;
use mosaic_ir::marks;
use mosaic_ir::{
    ArrayReferenceGroup, DepKind, Design, DirectName, Direction, GroupKind,
    HardwareModule, IoKind, LocalArrayInfo, ModuleType, PeDummyModule,
};
use mosaic_poly::{Aff, BasicMap, Constraint, Cursor, Map, TriState};
use mosaic_utils::{Error, Id, MosaicResult};

/// Generation state threaded through the whole pass.
pub struct Generator<'a> {
    design: &'a Design,
    /// Working copies carrying the monotone direction flags.
    pub groups: Vec<ArrayReferenceGroup>,
    pub arrays: Vec<LocalArrayInfo>,
    pub modules: Vec<HardwareModule>,
    /// Grid extents actually exercised, from outermost chain level to
    /// innermost.
    pub sa_extents: Vec<i64>,
}

impl<'a> Generator<'a> {
    pub fn new(design: &'a Design) -> Self {
        Generator {
            design,
            groups: design.groups.clone(),
            arrays: design.arrays.clone(),
            modules: Vec::new(),
            sa_extents: Vec::new(),
        }
    }

    /// The borrow is tied to the design, not to the generator, so callers
    /// can keep it across mutations of the generator itself.
    pub fn design(&self) -> &'a Design {
        self.design
    }

    /// Dependences carried by the array-partition loops need credit-based
    /// synchronization between producer and consumer chains. Detected and
    /// flagged only; no synchronization is inserted.
    pub fn detect_credit(&mut self) {
        if !self.design.arch.credit_control {
            return;
        }
        let ap = self.design.array_part_dims;
        for group in &mut self.groups {
            if group.kind == GroupKind::PeLocal {
                continue;
            }
            let carried = self.design.deps.iter().any(|dep| {
                if dep.kind != DepKind::Flow {
                    return false;
                }
                let touches = group.refs.iter().any(|r| {
                    r.name == dep.src_ref || r.name == dep.dst_ref
                });
                if !touches {
                    return false;
                }
                let n = dep.rel.n_in;
                let mut eq = BasicMap::universe(
                    dep.rel.in_tuple,
                    n,
                    dep.rel.out_tuple,
                    dep.rel.n_out,
                );
                for d in 0..ap {
                    let diff = Aff::var(n + dep.rel.n_out, n + d)
                        .sub(&Aff::var(n + dep.rel.n_out, d));
                    eq.cons.push(Constraint::Eq(diff));
                }
                let within = Map::from_basic(eq);
                match dep.rel.subtract(&within) {
                    Some(rest) => rest.is_empty() != TriState::Yes,
                    // inexact subtraction: assume carried
                    None => true,
                }
            });
            if carried {
                group.credit = true;
                log::warn!(
                    "group `{}': dependence carried by the array-partition \
                     loop; credit synchronization is not implemented",
                    group.name
                );
            }
        }
    }

    fn classify(
        &self,
        group: &ArrayReferenceGroup,
        level: usize,
        in_dir: bool,
        outermost: usize,
        innermost: usize,
    ) -> LevelSpec {
        let mut is_buffer = group
            .buffer_at(level)
            .map(|b| b.tile.is_some())
            .unwrap_or(false);
        if self.design.arch.two_level_buffer && level == outermost {
            is_buffer = true;
        }
        LevelSpec {
            level,
            in_dir,
            is_filter: level != outermost,
            is_buffer,
            outermost,
            innermost,
        }
    }

    fn account(&mut self, gi: usize, module: &HardwareModule) {
        let group = &mut self.groups[gi];
        let dir = if module.in_dir {
            Direction::In
        } else {
            Direction::Out
        };
        if module.level == group.io_level {
            group.array_io_dir = group.array_io_dir.join(dir);
        }
        if module.to_pe {
            group.pe_io_dir = group.pe_io_dir.join(dir);
        }
        if module.to_mem {
            let array = group.array;
            let n = group
                .refs
                .iter()
                .filter(|r| if module.in_dir { r.read } else { r.write })
                .count();
            if let Some(info) =
                self.arrays.iter_mut().find(|a| a.name == array)
            {
                info.n_io_group_refs += n;
            }
        }
    }

    /// Generate the full chain of one group: copy-in levels from the
    /// outermost down, then copy-out levels from the innermost up.
    pub fn generate_group_io(&mut self, gi: usize) -> MosaicResult<()> {
        let group = self.groups[gi].clone();
        if group.kind == GroupKind::PeLocal {
            return Ok(());
        }
        let outermost = group.io_level;
        let innermost = match group.io_kind {
            IoKind::Interior => 1,
            IoKind::Exterior => 2,
        };
        let module_type = match group.kind {
            GroupKind::Drain => ModuleType::Drain,
            _ => ModuleType::Io,
        };

        if group.kind == GroupKind::Io
            && is_module_valid(self.design, &group, true)?
        {
            for level in (innermost..=outermost).rev() {
                let spec =
                    self.classify(&group, level, true, outermost, innermost);
                if let Some(mut m) =
                    self.build_level(&group, module_type, spec)?
                {
                    m.io_groups.push(gi);
                    m.credit = group.credit;
                    self.account(gi, &m);
                    self.modules.push(m);
                }
            }
        }

        let out_needed = match group.kind {
            // results always leave through the drain chain
            GroupKind::Drain => true,
            GroupKind::Io => is_module_valid(self.design, &group, false)?,
            GroupKind::PeLocal => false,
        };
        if out_needed {
            for level in innermost..=outermost {
                let spec =
                    self.classify(&group, level, false, outermost, innermost);
                if let Some(mut m) =
                    self.build_level(&group, module_type, spec)?
                {
                    m.io_groups.push(gi);
                    m.credit = group.credit;
                    self.account(gi, &m);
                    self.modules.push(m);
                }
            }
        }
        Ok(())
    }

    fn build_level(
        &self,
        group: &ArrayReferenceGroup,
        module_type: ModuleType,
        spec: LevelSpec,
    ) -> MosaicResult<Option<HardwareModule>> {
        let m = build_io_module(self.design, group, module_type, spec)?;
        let has_sched = m.scheds.default.is_some()
            || m.scheds.outer.is_some()
            || m.scheds.inter_trans.is_some();
        // an empty transfer at this level is a normal skip
        Ok(has_sched.then_some(m))
    }

    /// The space-time mapped PE module, with copy leaves grafted for every
    /// connected group and the dummy companions for boundary PEs.
    pub fn generate_pe_module(&mut self) -> MosaicResult<()> {
        let design = self.design;
        let sa = design.n_sa_dim;
        let root = Cursor::at_root(&design.schedule);
        let array = root.move_down_to_mark(marks::ARRAY)?;

        // exercised grid extents, validated constant
        let mut extents: Vec<i64> = Vec::with_capacity(sa);
        for (i, k) in (1..=sa).rev().enumerate() {
            let band = array
                .move_down_to_mark(&marks::io_level(k).to_string())?
                .parent()?;
            let (lb, ub) = band.band_member_bounds(0).ok_or_else(|| {
                Error::malformed_structure(
                    "space band with a non-constant extent",
                )
            })?;
            extents.push((ub - lb + 1).min(design.arch.grid[i]));
        }
        self.sa_extents = extents.clone();

        // modulo mapping onto the grid
        let mut params: Vec<Id> = Vec::new();
        let mut context: Vec<Constraint> = Vec::new();
        for (i, &extent) in extents.iter().enumerate() {
            let p = Id::new(format!("p{i}"));
            context.push(Constraint::Ge(Aff::param(0, p)));
            context.push(Constraint::Ge(
                Aff::param(0, p).scale(-1).add_constant(extent - 1),
            ));
            params.push(p);
        }
        let mut cursor = array.child(0)?.insert_context(context).parent()?;
        for (i, k) in (1..=sa).rev().enumerate() {
            let band = cursor
                .move_down_to_mark(&marks::io_level(k).to_string())?
                .parent()?;
            let filter = set_schedule_modulo(
                &band,
                &params[i..=i],
                &[extents[i] as u64],
            )?;
            cursor = band.child(0)?.insert_filter(filter);
        }

        let mut module =
            HardwareModule::new(Id::new("PE"), ModuleType::Pe);
        module.inst_ids = params;

        // exterior groups graft around the compute statement itself
        let pe_mark = cursor.move_down_to_mark(marks::PE)?;
        let mut at = descend_to_leaf(&pe_mark)?;
        for gi in 0..self.groups.len() {
            if self.groups[gi].io_kind != IoKind::Exterior {
                continue;
            }
            at = self.graft_pe_copies(gi, at, &mut module)?;
        }

        // interior groups graft once around the whole PE-level subtree
        let sched = at.schedule();
        let mut at = Cursor::at_root(&sched)
            .move_down_to_mark(marks::PE)?
            .child(0)?;
        for gi in 0..self.groups.len() {
            if self.groups[gi].io_kind != IoKind::Interior {
                continue;
            }
            at = self.graft_pe_copies(gi, at, &mut module)?;
        }

        module.io_groups.dedup();
        module.scheds.default = Some(at.schedule());

        // boundary PEs of INOUT groups need a companion sinking the
        // dangling half of the chain
        for gi in 0..self.groups.len() {
            let group = self.groups[gi].clone();
            if group.io_kind != IoKind::Exterior
                || group.pe_io_dir != Direction::InOut
            {
                continue;
            }
            if let Some(dummy) = self.build_pe_dummy(gi, &group, true)? {
                module.pe_dummy_modules.push(dummy);
            }
        }

        self.modules.push(module);
        Ok(())
    }

    /// Graft the direct transfer leaves of one group at the cursor, joining
    /// the group's PE-side direction for every non-empty graft.
    fn graft_pe_copies(
        &mut self,
        gi: usize,
        mut at: Cursor,
        module: &mut HardwareModule,
    ) -> MosaicResult<Cursor> {
        let group = self.groups[gi].clone();
        if group.kind == GroupKind::PeLocal {
            return Ok(at);
        }
        let reads = group.kind == GroupKind::Io && group.any_read();
        let writes = group.any_write();
        for (in_dir, wanted) in [(true, reads), (false, writes)] {
            if !wanted {
                continue;
            }
            let name = DirectName {
                in_dir,
                dummy: false,
                fifo: group.fifo_name(0),
                pack: i64::from(group.n_lane),
                next_pack: i64::from(group.n_lane),
            };
            for aref in &group.refs {
                if if in_dir { !aref.read } else { !aref.write } {
                    continue;
                }
                let Some(c) =
                    add_pe_copies_stmt(&at, aref, name.clone(), in_dir)?
                else {
                    continue;
                };
                at = c;
                let dir = if in_dir { Direction::In } else { Direction::Out };
                self.groups[gi].pe_io_dir =
                    self.groups[gi].pe_io_dir.join(dir);
                module.io_groups.push(gi);
            }
        }
        Ok(at)
    }

    /// The chain's terminal spatial coordinate gets a transfer statement
    /// that records its domain but never runs.
    fn build_pe_dummy(
        &self,
        gi: usize,
        group: &ArrayReferenceGroup,
        in_dir: bool,
    ) -> MosaicResult<Option<PeDummyModule>> {
        let design = self.design;

        // drop the partition bands first so transfer depths are computed
        // against the trimmed tree
        let kernel = Cursor::at_root(&design.schedule)
            .move_down_to_mark(marks::KERNEL)?;
        let below = kernel.child(0)?;
        let array = if below.node().is_band() {
            below.delete()?
        } else {
            below
        }
        .move_down_to_mark(marks::ARRAY)?;

        // boundary filter: the terminal coordinate of the innermost space
        // band
        let band = array
            .move_down_to_mark(&marks::io_level(1).to_string())?
            .parent()?;
        let filter = schedule_eq_ub(&band)?;
        let cursor = band.child(0)?.insert_filter(filter);

        let pe_mark = cursor.move_down_to_mark(marks::PE)?;
        let at = pe_mark.child(0)?.cut();
        let name = DirectName {
            in_dir,
            dummy: true,
            fifo: group.fifo_name(0),
            pack: i64::from(group.n_lane),
            next_pack: i64::from(group.n_lane),
        };
        let Some(grafted) = add_io_copies_dummy(group, &at, name, in_dir)?
        else {
            return Ok(None);
        };
        let sched = grafted.schedule();

        Ok(Some(PeDummyModule {
            name: Id::new(format!("{}_PE_dummy", group.prefix())),
            group: gi,
            dir: if in_dir { Direction::In } else { Direction::Out },
            sched,
        }))
    }
}

/// Follow first children down to the leaf under `cursor`.
fn descend_to_leaf(cursor: &Cursor) -> MosaicResult<Cursor> {
    let mut c = cursor.clone();
    while !c.node().is_leaf() {
        c = c.child(0)?;
    }
    Ok(c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_ir::DesignDesc;

    fn scenario_design() -> Design {
        // 3 I/O levels, two-level buffering, tiles only at levels 1 and 3
        let desc: DesignDesc = serde_json::from_str(
            r#"{
            "arch": { "grid": [2, 2], "two_level_buffer": true },
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
                      { "tile": { "extents": [2, 8], "depth": 3 } },
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
                      { "tile": { "extents": [1, 1], "depth": 3 } },
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

    #[test]
    fn copy_in_chain_matches_the_buffer_layout() {
        let design = scenario_design();
        let mut gen = Generator::new(&design);
        gen.generate_group_io(0).unwrap();
        let chain: Vec<_> = gen
            .modules
            .iter()
            .filter(|m| m.in_dir && m.is_io())
            .collect();
        assert_eq!(chain.len(), 2, "exterior chain spans levels 3 down to 2");
        let by_level = |l: usize| {
            chain.iter().find(|m| m.level == l).copied().unwrap()
        };
        assert!(by_level(3).is_buffer);
        assert!(!by_level(3).is_filter);
        assert!(!by_level(2).is_buffer, "level 2 has no tile");
        assert!(by_level(2).is_filter);
    }

    #[test]
    fn interior_chains_reach_level_one() {
        let design = {
            let mut d = scenario_design();
            d.groups[0].io_kind = IoKind::Interior;
            d
        };
        let mut gen = Generator::new(&design);
        gen.generate_group_io(0).unwrap();
        let levels: Vec<_> = gen
            .modules
            .iter()
            .filter(|m| m.in_dir)
            .map(|m| m.level)
            .collect();
        assert_eq!(levels, vec![3, 2, 1]);
        assert!(by_name(&gen, "A_0_IO_L1_in").is_buffer);
    }

    fn by_name<'a>(
        gen: &'a Generator<'_>,
        name: &str,
    ) -> &'a HardwareModule {
        gen.modules.iter().find(|m| m.name == *name).unwrap()
    }

    #[test]
    fn drain_groups_generate_only_the_outgoing_chain() {
        let design = scenario_design();
        let mut gen = Generator::new(&design);
        gen.generate_group_io(1).unwrap();
        assert!(gen.modules.iter().all(|m| !m.in_dir && m.is_drain()));
        let levels: Vec<_> = gen.modules.iter().map(|m| m.level).collect();
        assert_eq!(levels, vec![2, 3], "copy-out runs innermost upward");
    }

    #[test]
    fn pe_module_joins_directions_and_spawns_dummies() {
        let design = {
            let mut d = scenario_design();
            // make the I/O group read-write so its PE direction saturates
            d.groups[0].refs[0].write = true;
            d
        };
        let mut gen = Generator::new(&design);
        gen.generate_group_io(0).unwrap();
        gen.generate_group_io(1).unwrap();
        gen.generate_pe_module().unwrap();
        assert_eq!(gen.groups[0].pe_io_dir, Direction::InOut);
        let pe = gen.modules.iter().find(|m| m.is_pe()).unwrap();
        assert_eq!(pe.pe_dummy_modules.len(), 1);
        assert_eq!(
            pe.pe_dummy_modules[0].name,
            Id::new("A_0_PE_dummy")
        );
        assert_eq!(gen.sa_extents, vec![2, 2]);
    }
}
