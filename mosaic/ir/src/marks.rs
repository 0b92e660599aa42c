//! Mark identifiers recognized by this stage and by the downstream
//! elaborator.
//!
//! Structural marks (`kernel`, `array`, `pe`, `io_L<k>`, `latency`, `simd`)
//! are present in the incoming base schedule and are used for navigation;
//! the remaining marks are emitted here and consumed by the printer.

use mosaic_utils::Id;

/// Root of the mapped computation.
pub const KERNEL: &str = "kernel";
/// Below the array-partition bands.
pub const ARRAY: &str = "array";
/// Below the space (PE grid) bands.
pub const PE: &str = "pe";
/// Innermost latency-hiding band.
pub const LATENCY: &str = "latency";
/// Vectorized band.
pub const SIMD: &str = "simd";

/// Module ownership mark inserted right under the kernel mark.
pub const MODULE: &str = "module";
/// Companion mark for boundary-PE placeholder modules.
pub const PE_DUMMY_MODULE: &str = "pe_dummy_module";

/// Double-buffering call sites in an outer module schedule. The
/// `.boundary` flavors dispatch the chain-end variant of the transfer,
/// which has no downstream module to forward to.
pub const IO_INTER_TRANS: &str = "io_module.inter_trans";
pub const IO_INTER_TRANS_BOUNDARY: &str = "io_module.inter_trans.boundary";
pub const IO_INTRA_TRANS: &str = "io_module.intra_trans";
pub const IO_INTER_INTRA: &str = "io_module.inter_intra";
pub const IO_INTER_INTRA_BOUNDARY: &str = "io_module.inter_intra.boundary";
pub const IO_INTRA_INTER: &str = "io_module.intra_inter";
pub const IO_INTRA_INTER_BOUNDARY: &str = "io_module.intra_inter.boundary";
pub const IO_STATE_HANDLE: &str = "io_module.state_handle";

/// HLS pragma hints; consumed by the printer only.
pub const HLS_PIPELINE: &str = "hls_pipeline";
pub const HLS_UNROLL: &str = "hls_unroll";
/// Band whose iterations may be merged into one coalesced burst.
pub const ACCESS_COALESCE: &str = "access_coalesce";

/// `io_L<level>` navigation mark.
pub fn io_level(level: usize) -> Id {
    Id::new(format!("io_L{level}"))
}

/// `hls_dependence.<group>` relaxation hint.
pub fn hls_dependence(group: Id) -> Id {
    Id::new(format!("hls_dependence.{group}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_marks_format() {
        assert_eq!(io_level(2).as_str(), "io_L2");
        assert_eq!(
            hls_dependence(Id::new("A_0")).as_str(),
            "hls_dependence.A_0"
        );
    }
}
