//! Generated hardware artifacts: modules, their schedules, and the wired
//! top level. All three are built once and immutable afterwards.

use crate::group::Direction;
use mosaic_poly::Schedule;
use mosaic_utils::{GetName, Id};
use smallvec::SmallVec;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ModuleType {
    Pe,
    Io,
    Drain,
}

/// A local staging variable declared inside a module.
#[derive(Clone, Debug)]
pub struct LocalVar {
    pub name: Id,
    pub array: Id,
    /// Extents with the innermost dimension divided by the packing width.
    pub extents: SmallVec<[i64; 4]>,
    pub n_lane: u32,
}

/// The behavioral schedules of one module. Filter+buffer modules carry the
/// five-way double-buffering decomposition; everything else carries the
/// default schedule plus an optional boundary variant.
#[derive(Clone, Debug, Default)]
pub struct ModuleScheds {
    pub default: Option<Schedule>,
    pub boundary: Option<Schedule>,
    pub outer: Option<Schedule>,
    pub inter_trans: Option<Schedule>,
    pub intra_trans: Option<Schedule>,
    pub boundary_outer: Option<Schedule>,
    pub boundary_inter_trans: Option<Schedule>,
}

/// One generated hardware module.
#[derive(Clone, Debug)]
pub struct HardwareModule {
    pub name: Id,
    pub module_type: ModuleType,
    /// I/O hierarchy level; 0 for the PE module.
    pub level: usize,
    pub is_filter: bool,
    pub is_buffer: bool,
    /// Copy-in (toward PEs) rather than copy-out.
    pub in_dir: bool,
    pub double_buffer: bool,
    /// Last filtering module of its chain; also receives the unfiltered
    /// remainder.
    pub boundary: bool,
    /// Connects directly to PEs.
    pub to_pe: bool,
    /// Connects directly to off-chip memory.
    pub to_mem: bool,
    /// Carries credit-based synchronization (detected, never acted upon).
    pub credit: bool,
    pub scheds: ModuleScheds,
    /// Fresh instance-identifying parameters introduced along the chain.
    pub inst_ids: Vec<Id>,
    /// Indices into the design's group table.
    pub io_groups: Vec<usize>,
    pub local_vars: Vec<LocalVar>,
    /// Packing width on the upper (toward-memory) side.
    pub n_lane: u32,
    /// Packing width on the lower (toward-PE) side.
    pub next_n_lane: u32,
    /// Boundary-PE companions; only populated on the PE module.
    pub pe_dummy_modules: Vec<PeDummyModule>,
}

impl GetName for HardwareModule {
    fn name(&self) -> Id {
        self.name
    }
}

impl HardwareModule {
    pub fn new(name: Id, module_type: ModuleType) -> Self {
        HardwareModule {
            name,
            module_type,
            level: 0,
            is_filter: false,
            is_buffer: false,
            in_dir: false,
            double_buffer: false,
            boundary: false,
            to_pe: false,
            to_mem: false,
            credit: false,
            scheds: ModuleScheds::default(),
            inst_ids: Vec::new(),
            io_groups: Vec::new(),
            local_vars: Vec::new(),
            n_lane: 1,
            next_n_lane: 1,
            pe_dummy_modules: Vec::new(),
        }
    }

    pub fn is_pe(&self) -> bool {
        self.module_type == ModuleType::Pe
    }

    pub fn is_io(&self) -> bool {
        self.module_type == ModuleType::Io
    }

    pub fn is_drain(&self) -> bool {
        self.module_type == ModuleType::Drain
    }
}

/// Placeholder producer/consumer for the dangling half of a boundary PE's
/// transfer chain.
#[derive(Clone, Debug)]
pub struct PeDummyModule {
    pub name: Id,
    /// Index of the group whose chain this module terminates.
    pub group: usize,
    /// Direction the dummy absorbs.
    pub dir: Direction,
    pub sched: Schedule,
}

impl GetName for PeDummyModule {
    fn name(&self) -> Id {
        self.name
    }
}

/// The wired design: final module order plus the derived top-level
/// schedules.
#[derive(Clone, Debug, Default)]
pub struct TopModule {
    /// Copy-in I/O modules, the PE module, copy-out I/O modules, then
    /// drain modules.
    pub modules: Vec<HardwareModule>,
    pub module_call_scheds: Vec<Schedule>,
    pub fifo_decl_scheds: Vec<Schedule>,
    /// `<fifo>_<module>.<byte-width>` per fifo declaration.
    pub fifo_decl_names: Vec<String>,
}
