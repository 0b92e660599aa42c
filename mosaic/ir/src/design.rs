//! The design description handed over by upstream analysis, and the typed
//! in-memory form generation works on.
//!
//! Upstream delivers a JSON document naming the statements (box domains),
//! the partition/space split of the schedule, the arrays, the reference
//! groups with their per-level buffer geometry, and the classified
//! dependences. `DesignDesc::build` turns that into a marked base schedule
//! plus the group tables.

use crate::group::{
    ArrayKind, ArrayReference, ArrayReferenceGroup, DepKind, Dependence,
    Direction, GroupBuffer, GroupKind, IoKind, LocalArrayInfo, Tile,
};
use crate::marks;
use mosaic_poly::{
    Aff, BasicMap, BasicSet, Cursor, Map, MultiUnionAff, Schedule, Set,
    UnionSet,
};
use mosaic_utils::{Error, Id, MosaicResult};
use serde::Deserialize;
use smallvec::SmallVec;

/// Architecture parameters fixed before generation.
#[derive(Clone, Debug, Deserialize)]
pub struct ArchParams {
    /// PE grid extents; the length is the number of space dimensions.
    pub grid: Vec<i64>,
    #[serde(default)]
    pub double_buffer: bool,
    #[serde(default)]
    pub two_level_buffer: bool,
    #[serde(default)]
    pub credit_control: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StmtDesc {
    pub name: Id,
    /// Inclusive `[lo, hi]` per loop dimension.
    pub bounds: Vec<(i64, i64)>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ArrayDesc {
    pub name: Id,
    pub kind: ArrayKindDesc,
    /// Element size in bytes.
    pub size: u32,
    pub extents: Vec<i64>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrayKindDesc {
    External,
    Internal,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKindDesc {
    PeLocal,
    Io,
    Drain,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IoKindDesc {
    Exterior,
    Interior,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TileDesc {
    pub extents: Vec<i64>,
    pub depth: usize,
}

#[derive(Clone, Debug, Deserialize)]
pub struct BufferDesc {
    #[serde(default)]
    pub tile: Option<TileDesc>,
    #[serde(default = "one")]
    pub pack: u32,
}

fn one() -> u32 {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub struct RefDesc {
    pub name: Id,
    pub stmt: Id,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    /// One row per array dimension: statement-dimension coefficients
    /// followed by a constant.
    pub access: Vec<Vec<i64>>,
    #[serde(default)]
    pub stride_one: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GroupDesc {
    pub name: Id,
    pub array: Id,
    #[serde(default)]
    pub nr: Option<usize>,
    pub kind: GroupKindDesc,
    pub io_kind: IoKindDesc,
    #[serde(default = "one")]
    pub pack: u32,
    pub io_level: usize,
    #[serde(default)]
    pub buffers: Vec<BufferDesc>,
    pub refs: Vec<RefDesc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DepDesc {
    pub kind: DepKindDesc,
    pub src_stmt: Id,
    pub dst_stmt: Id,
    pub src_ref: Id,
    pub dst_ref: Id,
    /// Constant dependence distance per shared loop dimension.
    pub distance: Vec<i64>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepKindDesc {
    Flow,
    Rar,
}

/// Top-level JSON document.
#[derive(Clone, Debug, Deserialize)]
pub struct DesignDesc {
    pub arch: ArchParams,
    pub statements: Vec<StmtDesc>,
    /// Leading schedule dimensions assigned to array partitioning.
    pub array_part_dims: usize,
    pub arrays: Vec<ArrayDesc>,
    pub groups: Vec<GroupDesc>,
    #[serde(default)]
    pub deps: Vec<DepDesc>,
}

/// The typed design generation operates on.
#[derive(Clone, Debug)]
pub struct Design {
    /// Base schedule with `kernel`, `array`, `io_L<k>`, `pe` and `latency`
    /// marks in place.
    pub schedule: Schedule,
    pub arrays: Vec<LocalArrayInfo>,
    pub groups: Vec<ArrayReferenceGroup>,
    pub deps: Vec<Dependence>,
    pub arch: ArchParams,
    /// Number of space (grid) dimensions.
    pub n_sa_dim: usize,
    pub array_part_dims: usize,
    /// Total loop dimensions shared by every statement.
    pub n_dim: usize,
}

impl Design {
    pub fn array_info(&self, name: Id) -> Option<&LocalArrayInfo> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn group(&self, idx: usize) -> &ArrayReferenceGroup {
        &self.groups[idx]
    }

    /// Outermost I/O level of any chain: one past the space dimensions.
    pub fn outermost_io_level(&self) -> usize {
        self.n_sa_dim + 1
    }
}

impl DesignDesc {
    pub fn build(self) -> MosaicResult<Design> {
        let n_sa_dim = self.arch.grid.len();
        if n_sa_dim == 0 {
            return Err(Error::invalid_input("empty PE grid"));
        }
        let Some(first) = self.statements.first() else {
            return Err(Error::invalid_input("no statements"));
        };
        let n_dim = first.bounds.len();
        if self.statements.iter().any(|s| s.bounds.len() != n_dim) {
            return Err(Error::invalid_input(
                "statements must share one loop nest depth",
            ));
        }
        if self.array_part_dims + n_sa_dim > n_dim {
            return Err(Error::invalid_input(
                "partition and space dimensions exceed the loop nest",
            ));
        }

        let schedule = self.build_schedule(n_dim, n_sa_dim)?;
        let groups = self
            .groups
            .iter()
            .map(|g| self.build_group(g, n_dim, n_sa_dim))
            .collect::<MosaicResult<Vec<_>>>()?;
        let arrays = self.build_arrays(&groups)?;
        let deps = self
            .deps
            .iter()
            .map(|d| self.build_dep(d, n_dim))
            .collect::<MosaicResult<Vec<_>>>()?;

        Ok(Design {
            schedule,
            arrays,
            groups,
            deps,
            array_part_dims: self.array_part_dims,
            n_sa_dim,
            n_dim,
            arch: self.arch,
        })
    }

    /// Band layout: partition bands, `array` mark, one single-member band
    /// per grid dimension with `io_L<k>` marks in between, `pe` mark, the
    /// remaining dimensions under a `latency` mark.
    fn build_schedule(
        &self,
        n_dim: usize,
        n_sa_dim: usize,
    ) -> MosaicResult<Schedule> {
        let mut domain = UnionSet::empty();
        for s in &self.statements {
            let mut bs = BasicSet::universe(Some(s.name), n_dim);
            for (i, (lo, hi)) in s.bounds.iter().enumerate() {
                bs = bs.bound_dim(i, *lo, *hi);
            }
            domain.add_set(Set::from_basic(bs));
        }

        let band = |range: std::ops::Range<usize>| {
            let mut mua = MultiUnionAff::new(range.len());
            for s in &self.statements {
                let affs =
                    range.clone().map(|d| Aff::var(n_dim, d)).collect();
                mua = mua.add_stmt(s.name, affs);
            }
            mua
        };

        let ap = self.array_part_dims;
        let sched = Schedule::from_domain(domain);
        // build bottom-up: innermost structure first, wrapping outwards
        let mut cursor = Cursor::at_root(&sched).child(0)?;
        if ap + n_sa_dim < n_dim {
            cursor = cursor
                .insert_partial_schedule(band(ap + n_sa_dim..n_dim))
                .insert_mark(Id::new(marks::LATENCY));
        }
        cursor = cursor.insert_mark(Id::new(marks::PE));
        for k in 1..=n_sa_dim {
            // space dim for level k sits at ap + (n_sa_dim - k)
            let d = ap + n_sa_dim - k;
            cursor = cursor
                .insert_mark(marks::io_level(k))
                .insert_partial_schedule(band(d..d + 1));
        }
        cursor = cursor
            .insert_mark(marks::io_level(n_sa_dim + 1))
            .insert_mark(Id::new(marks::ARRAY));
        if ap > 0 {
            cursor = cursor.insert_partial_schedule(band(0..ap));
        }
        let cursor = cursor.insert_mark(Id::new(marks::KERNEL));
        Ok(cursor.schedule())
    }

    fn build_group(
        &self,
        g: &GroupDesc,
        n_dim: usize,
        n_sa_dim: usize,
    ) -> MosaicResult<ArrayReferenceGroup> {
        if g.io_level > n_sa_dim + 1 {
            return Err(Error::invalid_input(format!(
                "group `{}': io_level {} exceeds the hierarchy",
                g.name, g.io_level
            )));
        }
        let array = self
            .arrays
            .iter()
            .find(|a| a.name == g.array)
            .ok_or_else(|| {
                Error::invalid_input(format!(
                    "group `{}' names unknown array `{}'",
                    g.name, g.array
                ))
            })?;
        let refs = g
            .refs
            .iter()
            .map(|r| {
                if self.statements.iter().all(|s| s.name != r.stmt) {
                    return Err(Error::invalid_input(format!(
                        "reference `{}' names unknown statement `{}'",
                        r.name, r.stmt
                    )));
                }
                if r.access.len() != array.extents.len() {
                    return Err(Error::invalid_input(format!(
                        "reference `{}' access rank mismatch",
                        r.name
                    )));
                }
                let affs: Vec<Aff> = r
                    .access
                    .iter()
                    .map(|row| {
                        let mut a = Aff::zero(n_dim);
                        for (i, &c) in row.iter().take(n_dim).enumerate() {
                            a.coeffs[i] = c;
                        }
                        a.cst = *row.get(n_dim).unwrap_or(&0);
                        a
                    })
                    .collect();
                let access = Map::from_basic(BasicMap::from_affs(
                    Some(r.stmt),
                    n_dim,
                    Some(g.array),
                    &affs,
                ));
                Ok(ArrayReference {
                    name: r.name,
                    stmt: r.stmt,
                    read: r.read,
                    write: r.write,
                    access,
                    stride_one: r.stride_one,
                })
            })
            .collect::<MosaicResult<Vec<_>>>()?;

        Ok(ArrayReferenceGroup {
            name: g.name,
            array: g.array,
            nr: g.nr,
            kind: match g.kind {
                GroupKindDesc::PeLocal => GroupKind::PeLocal,
                GroupKindDesc::Io => GroupKind::Io,
                GroupKindDesc::Drain => GroupKind::Drain,
            },
            io_kind: match g.io_kind {
                IoKindDesc::Exterior => IoKind::Exterior,
                IoKindDesc::Interior => IoKind::Interior,
            },
            n_lane: g.pack,
            buffers: g
                .buffers
                .iter()
                .map(|b| GroupBuffer {
                    tile: b.tile.as_ref().map(|t| Tile {
                        extents: SmallVec::from_slice(&t.extents),
                        depth: t.depth,
                    }),
                    n_lane: b.pack,
                })
                .collect(),
            refs,
            io_level: g.io_level,
            array_io_dir: Direction::None,
            pe_io_dir: Direction::None,
            credit: false,
        })
    }

    fn build_arrays(
        &self,
        groups: &[ArrayReferenceGroup],
    ) -> MosaicResult<Vec<LocalArrayInfo>> {
        self.arrays
            .iter()
            .map(|a| {
                let io_groups = groups
                    .iter()
                    .enumerate()
                    .filter(|(_, g)| {
                        g.array == a.name && g.kind == GroupKind::Io
                    })
                    .map(|(i, _)| i)
                    .collect();
                let drain_group = groups
                    .iter()
                    .position(|g| g.array == a.name && g.kind == GroupKind::Drain);
                Ok(LocalArrayInfo {
                    name: a.name,
                    kind: match a.kind {
                        ArrayKindDesc::External => ArrayKind::External,
                        ArrayKindDesc::Internal => ArrayKind::Internal,
                    },
                    size: a.size,
                    extents: SmallVec::from_slice(&a.extents),
                    io_groups,
                    drain_group,
                    n_io_group_refs: 0,
                })
            })
            .collect()
    }

    fn build_dep(&self, d: &DepDesc, n_dim: usize) -> MosaicResult<Dependence> {
        if d.distance.len() != n_dim {
            return Err(Error::invalid_input(format!(
                "dependence {} -> {}: distance rank mismatch",
                d.src_stmt, d.dst_stmt
            )));
        }
        let affs: Vec<Aff> = d
            .distance
            .iter()
            .enumerate()
            .map(|(i, &dist)| Aff::var(n_dim, i).add_constant(dist))
            .collect();
        let rel = Map::from_basic(BasicMap::from_affs(
            Some(d.src_stmt),
            n_dim,
            Some(d.dst_stmt),
            &affs,
        ));
        Ok(Dependence {
            kind: match d.kind {
                DepKindDesc::Flow => DepKind::Flow,
                DepKindDesc::Rar => DepKind::Rar,
            },
            src_stmt: d.src_stmt,
            dst_stmt: d.dst_stmt,
            src_ref: d.src_ref,
            dst_ref: d.dst_ref,
            rel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn sample_json() -> &'static str {
        r#"{
            "arch": { "grid": [2, 2], "double_buffer": true },
            "statements": [
                { "name": "S0", "bounds": [[0,3],[0,1],[0,1],[0,7]] }
            ],
            "array_part_dims": 1,
            "arrays": [
                { "name": "A", "kind": "external", "size": 4,
                  "extents": [16, 16] }
            ],
            "groups": [
                { "name": "A_0", "array": "A", "nr": 0, "kind": "io",
                  "io_kind": "exterior", "pack": 2, "io_level": 3,
                  "buffers": [
                      { "pack": 2 },
                      { "tile": { "extents": [4, 8], "depth": 3 }, "pack": 2 },
                      { "tile": { "extents": [8, 16], "depth": 1 }, "pack": 2 }
                  ],
                  "refs": [
                      { "name": "A_ref0", "stmt": "S0", "read": true,
                        "access": [[4,2,0,0,0],[0,0,2,1,0]],
                        "stride_one": true }
                  ] }
            ],
            "deps": [
                { "kind": "flow", "src_stmt": "S0", "dst_stmt": "S0",
                  "src_ref": "A_ref0", "dst_ref": "A_ref0",
                  "distance": [1, 0, 0, 0] }
            ]
        }"#
    }

    #[test]
    fn builds_a_marked_base_schedule() {
        let desc: DesignDesc = serde_json::from_str(sample_json()).unwrap();
        let design = desc.build().unwrap();
        let root = Cursor::at_root(&design.schedule);
        for mark in ["kernel", "array", "io_L3", "io_L2", "io_L1", "pe"] {
            assert!(root.find_mark(mark).is_some(), "missing mark {mark}");
        }
        // the pe mark sits below both io marks
        let pe = root.find_mark("pe").unwrap();
        assert!(pe.move_up_to_mark("io_L1").is_ok());
        assert_eq!(design.outermost_io_level(), 3);
    }

    #[test]
    fn rejects_inconsistent_descriptions() {
        let mut desc: DesignDesc = serde_json::from_str(sample_json()).unwrap();
        desc.groups[0].io_level = 9;
        assert!(desc.build().is_err());
    }
}
