//! Hardware-module generation: turns a mapped design description into the
//! set of PE, I/O and drain modules, their behavioral schedules, and the
//! wired top module.
//!
//! Generation runs in a fixed order: credit detection, the I/O chains of
//! every array (in array order), the drain chains, the PE module with its
//! boundary companions, and finally the top-level wiring.

mod constraint;
mod copies;
mod module_schedule;
mod orchestrate;
mod overlap;
mod wiring;

pub use orchestrate::Generator;
pub use wiring::hw_module_reorder;

use mosaic_ir::{Design, TopModule};
use mosaic_utils::MosaicResult;

/// Generate every hardware module of the design and wire them up.
pub fn generate_hw_modules(design: &Design) -> MosaicResult<TopModule> {
    let mut gen = Generator::new(design);
    gen.detect_credit();

    for ai in 0..gen.arrays.len() {
        for gi in gen.arrays[ai].io_groups.clone() {
            gen.generate_group_io(gi)?;
        }
    }
    for ai in 0..gen.arrays.len() {
        if let Some(gi) = gen.arrays[ai].drain_group {
            gen.generate_group_io(gi)?;
        }
    }
    gen.generate_pe_module()?;

    wiring::build_top(gen)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_ir::DesignDesc;

    #[test]
    fn end_to_end_generation_of_a_two_array_design() {
        let desc: DesignDesc = serde_json::from_str(
            r#"{
            "arch": { "grid": [2, 2], "double_buffer": true },
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
                  "io_kind": "exterior", "pack": 2, "io_level": 3,
                  "buffers": [
                      {},
                      { "tile": { "extents": [2, 8], "depth": 3 },
                        "pack": 2 },
                      { "tile": { "extents": [4, 16], "depth": 1 },
                        "pack": 2 }
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
                      { "tile": { "extents": [1, 1], "depth": 3 } },
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
        let design = desc.build().unwrap();
        let top = generate_hw_modules(&design).unwrap();

        // two copy-in modules, the PE, two drain modules
        assert_eq!(top.modules.len(), 5);
        assert!(top.modules[2].is_pe());
        // the filtering buffered copy-in module double-buffers
        let l2 = top
            .modules
            .iter()
            .find(|m| m.name == "A_0_IO_L2_in")
            .unwrap();
        assert!(l2.double_buffer);
        assert!(l2.scheds.outer.is_some());
        // every call schedule came with a name table entry for its fifos
        assert_eq!(top.fifo_decl_names.len(), top.fifo_decl_scheds.len());
        assert!(!top.module_call_scheds.is_empty());
    }
}
