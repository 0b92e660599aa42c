//! Array-reference groups and their per-level buffer geometry.
//!
//! Groups arrive fully classified from upstream analysis; generation only
//! reads them, aside from the monotone direction flags and per-array
//! counters accumulated while modules are produced.

use mosaic_poly::Map;
use mosaic_utils::{GetName, Id};
use smallvec::SmallVec;

/// Data-transfer direction at some point of the network. Forms a small
/// lattice: joining `In` and `Out` gives `InOut`, which is absorbing; a
/// direction is never reset once raised.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum Direction {
    #[default]
    None,
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn join(self, other: Direction) -> Direction {
        use Direction::*;
        match (self, other) {
            (None, d) | (d, None) => d,
            (In, In) => In,
            (Out, Out) => Out,
            _ => InOut,
        }
    }

    pub fn is_none(self) -> bool {
        self == Direction::None
    }
}

/// What kind of communication strategy a group implements.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum GroupKind {
    /// Accesses staying inside one PE; no transfer network needed.
    PeLocal,
    /// Accesses served through the I/O network.
    Io,
    /// Write-out of final results through the drain network.
    Drain,
}

/// Whether transfers of this group enter PEs around individual statements
/// (exterior) or once per PE iteration, shared across statements (interior).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum IoKind {
    Exterior,
    Interior,
}

/// Whether the underlying array lives off-chip or is produced on-chip.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArrayKind {
    External,
    Internal,
}

/// Staging-memory descriptor for one buffer level.
#[derive(Clone, Debug)]
pub struct Tile {
    /// Per-dimension extents of the staged region.
    pub extents: SmallVec<[i64; 4]>,
    /// Number of schedule dimensions outside the tile.
    pub depth: usize,
}

impl Tile {
    pub fn n_dim(&self) -> usize {
        self.extents.len()
    }

    /// Extent of the innermost staged dimension.
    pub fn last_extent(&self) -> i64 {
        *self.extents.last().unwrap_or(&1)
    }
}

/// Buffer decision for one I/O hierarchy level. A level with no tile is
/// unbuffered even if policy asked for a buffer there.
#[derive(Clone, Debug, Default)]
pub struct GroupBuffer {
    pub tile: Option<Tile>,
    pub n_lane: u32,
}

/// One member access of a group.
#[derive(Clone, Debug)]
pub struct ArrayReference {
    pub name: Id,
    /// Statement performing the access.
    pub stmt: Id,
    pub read: bool,
    pub write: bool,
    /// Relation from statement instances to accessed array elements.
    pub access: Map,
    /// Innermost array dimension moves with stride one along the
    /// innermost schedule dimension.
    pub stride_one: bool,
}

/// Accesses to one array sharing a communication strategy.
#[derive(Clone, Debug)]
pub struct ArrayReferenceGroup {
    pub name: Id,
    /// Owning array.
    pub array: Id,
    /// Position among the array's I/O groups, when it has siblings.
    pub nr: Option<usize>,
    pub kind: GroupKind,
    pub io_kind: IoKind,
    /// Data-packing width (elements per transfer) at the chain bottom.
    pub n_lane: u32,
    /// Buffer decisions, index 0 = level 1.
    pub buffers: Vec<GroupBuffer>,
    pub refs: Vec<ArrayReference>,
    /// Outermost level of this group's transfer chain.
    pub io_level: usize,
    /// Direction observed at the top of the chain (toward memory).
    pub array_io_dir: Direction,
    /// Direction observed at PE boundaries.
    pub pe_io_dir: Direction,
    /// Dependence carried by the array-partition loop was detected but no
    /// synchronization is inserted for it.
    pub credit: bool,
}

impl GetName for ArrayReferenceGroup {
    fn name(&self) -> Id {
        self.name
    }
}

impl ArrayReferenceGroup {
    /// Buffer descriptor at a 1-based hierarchy level.
    pub fn buffer_at(&self, level: usize) -> Option<&GroupBuffer> {
        self.buffers.get(level.checked_sub(1)?)
    }

    /// `<array>[_<nr>]` or `<array>_drain`; the shared prefix of module
    /// and fifo names derived from this group.
    pub fn prefix(&self) -> String {
        match self.kind {
            GroupKind::Drain => format!("{}_drain", self.array),
            _ => match self.nr {
                Some(nr) => format!("{}_{}", self.array, nr),
                None => self.array.to_string(),
            },
        }
    }

    /// Name of the I/O module at `level` for the given direction.
    pub fn module_name(&self, level: usize, in_dir: bool) -> Id {
        Id::new(format!(
            "{}_IO_L{}_{}",
            self.prefix(),
            level,
            if in_dir { "in" } else { "out" }
        ))
    }

    /// Fifo name used at `level` of the chain (level 0 names the PE-facing
    /// fifo).
    pub fn fifo_name(&self, level: usize) -> Id {
        if level == 0 {
            Id::new(format!("fifo_{}_PE", self.prefix()))
        } else {
            Id::new(format!("fifo_{}_IO_L{}", self.prefix(), level))
        }
    }

    pub fn any_read(&self) -> bool {
        self.refs.iter().any(|r| r.read)
    }

    pub fn any_write(&self) -> bool {
        self.refs.iter().any(|r| r.write)
    }
}

/// Per-array metadata plus the counters threaded through generation.
#[derive(Clone, Debug)]
pub struct LocalArrayInfo {
    pub name: Id,
    pub kind: ArrayKind,
    /// Element size in bytes.
    pub size: u32,
    pub extents: SmallVec<[i64; 4]>,
    /// Indices into the design's group table.
    pub io_groups: Vec<usize>,
    pub drain_group: Option<usize>,
    /// Number of references connected to off-chip memory, accumulated
    /// while generating modules.
    pub n_io_group_refs: usize,
}

/// Classification of a dependence edge.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum DepKind {
    Flow,
    /// Read-after-read; no data actually moves between the endpoints.
    Rar,
}

/// One dependence between two (possibly equal) statements, tagged with the
/// references at both endpoints.
#[derive(Clone, Debug)]
pub struct Dependence {
    pub kind: DepKind,
    pub src_stmt: Id,
    pub dst_stmt: Id,
    pub src_ref: Id,
    pub dst_ref: Id,
    /// Relation from source instances to sink instances.
    pub rel: Map,
}
