//! Intermediate representation of a mapped systolic design: the marked
//! base schedule, array-reference groups, statement-name records, and the
//! hardware modules generation produces.

mod design;
mod group;
pub mod marks;
mod module;
mod printer;
mod stmt_name;

pub use design::{ArchParams, Design, DesignDesc};
pub use group::{
    ArrayKind, ArrayReference, ArrayReferenceGroup, DepKind, Dependence,
    Direction, GroupBuffer, GroupKind, IoKind, LocalArrayInfo, Tile,
};
pub use module::{
    HardwareModule, LocalVar, ModuleScheds, ModuleType, PeDummyModule,
    TopModule,
};
pub use printer::Printer;
pub use stmt_name::{DirectName, IoTransName, StmtName, WiringName};
