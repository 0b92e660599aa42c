//! Typed statement-name records.
//!
//! Synthetic leaves carry structured metadata that the downstream
//! elaborator decodes by counting `.`-separated fields at fixed positions.
//! Inside the compiler the metadata stays typed; it is serialized to the
//! wire text only when a leaf statement is created, and the decoder
//! tolerates both the long (transfer) and short (direct) field counts.

use mosaic_utils::{Error, Id, MosaicResult};
use std::fmt;

/// Inter/intra-level transfer statement:
/// `in/out_trans[_dram][_boundary].<fifo>[_local].<is_filter>.<is_buffer>`
/// `.<depth-1>.<param-count>.<pack>[.<next-pack>[.<coalesce-depth>.<coalesce-bound>]]`
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct IoTransName {
    pub in_dir: bool,
    /// Transfer touches off-chip memory rather than another module.
    pub dram: bool,
    pub boundary: bool,
    pub fifo: Id,
    /// Transfer against the module's own local buffer.
    pub local: bool,
    pub is_filter: bool,
    pub is_buffer: bool,
    /// Schedule depth of the buffer tile minus one; -1 when no buffer.
    pub sched_depth: i64,
    /// Index of the last instance parameter; -1 when none apply.
    pub param_id: i64,
    pub pack: i64,
    pub next_pack: Option<i64>,
    /// `(coalesce_depth, coalesce_bound)`, present only when the access
    /// pattern was proven coalescing-friendly.
    pub coalesce: Option<(i64, i64)>,
}

impl fmt::Display for IoTransName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_trans", if self.in_dir { "in" } else { "out" })?;
        if self.dram {
            f.write_str("_dram")?;
        }
        if self.boundary {
            f.write_str("_boundary")?;
        }
        write!(f, ".{}", self.fifo)?;
        if self.local {
            f.write_str("_local")?;
        }
        write!(
            f,
            ".{}.{}.{}.{}.{}",
            self.is_filter as u8,
            self.is_buffer as u8,
            self.sched_depth,
            self.param_id,
            self.pack
        )?;
        if let Some(next) = self.next_pack {
            write!(f, ".{next}")?;
            if let Some((depth, bound)) = self.coalesce {
                write!(f, ".{depth}.{bound}")?;
            }
        }
        Ok(())
    }
}

/// Direct transfer statement: `in/out[_dummy].<fifo>.<pack>.<next-pack>`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DirectName {
    pub in_dir: bool,
    /// Placeholder traffic for a boundary PE; no data actually moves.
    pub dummy: bool,
    pub fifo: Id,
    pub pack: i64,
    pub next_pack: i64,
}

impl fmt::Display for DirectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.in_dir { "in" } else { "out" })?;
        if self.dummy {
            f.write_str("_dummy")?;
        }
        write!(f, ".{}.{}.{}", self.fifo, self.pack, self.next_pack)
    }
}

/// Top-level wiring statements.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum WiringName {
    /// `module_call.<module>`
    ModuleCall { module: Id },
    /// `module_call_upper.<module>[.boundary]`
    ModuleCallUpper { module: Id, boundary: bool },
    /// `module_call_lower.<module>[.boundary]`
    ModuleCallLower { module: Id, boundary: bool },
    /// `fifo_decl.<fifo>`
    FifoDecl { fifo: Id },
    /// `fifo_decl_boundary.<fifo>`
    FifoDeclBoundary { fifo: Id },
}

impl fmt::Display for WiringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WiringName::ModuleCall { module } => {
                write!(f, "module_call.{module}")
            }
            WiringName::ModuleCallUpper { module, boundary } => {
                write!(f, "module_call_upper.{module}")?;
                if *boundary {
                    f.write_str(".boundary")?;
                }
                Ok(())
            }
            WiringName::ModuleCallLower { module, boundary } => {
                write!(f, "module_call_lower.{module}")?;
                if *boundary {
                    f.write_str(".boundary")?;
                }
                Ok(())
            }
            WiringName::FifoDecl { fifo } => write!(f, "fifo_decl.{fifo}"),
            WiringName::FifoDeclBoundary { fifo } => {
                write!(f, "fifo_decl_boundary.{fifo}")
            }
        }
    }
}

/// Any statement name this stage emits.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum StmtName {
    IoTrans(IoTransName),
    Direct(DirectName),
    Wiring(WiringName),
}

impl fmt::Display for StmtName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StmtName::IoTrans(n) => n.fmt(f),
            StmtName::Direct(n) => n.fmt(f),
            StmtName::Wiring(n) => n.fmt(f),
        }
    }
}

impl StmtName {
    pub fn encode(&self) -> Id {
        Id::new(self.to_string())
    }

    /// Decode a statement name back into its record. Field positions are
    /// fixed; the two transfer forms are told apart by the verb segment.
    pub fn decode(text: &str) -> MosaicResult<StmtName> {
        let fields: Vec<&str> = text.split('.').collect();
        let bad =
            || Error::invalid_input(format!("unrecognized statement `{text}'"));
        let verb = *fields.first().ok_or_else(bad)?;

        if let Some(module) = verb_arg(verb, "module_call_upper", &fields) {
            return Ok(StmtName::Wiring(WiringName::ModuleCallUpper {
                module,
                boundary: fields.get(2) == Some(&"boundary"),
            }));
        }
        if let Some(module) = verb_arg(verb, "module_call_lower", &fields) {
            return Ok(StmtName::Wiring(WiringName::ModuleCallLower {
                module,
                boundary: fields.get(2) == Some(&"boundary"),
            }));
        }
        if let Some(module) = verb_arg(verb, "module_call", &fields) {
            return Ok(StmtName::Wiring(WiringName::ModuleCall { module }));
        }
        if let Some(fifo) = verb_arg(verb, "fifo_decl_boundary", &fields) {
            return Ok(StmtName::Wiring(WiringName::FifoDeclBoundary { fifo }));
        }
        if let Some(fifo) = verb_arg(verb, "fifo_decl", &fields) {
            return Ok(StmtName::Wiring(WiringName::FifoDecl { fifo }));
        }

        let int = |i: usize| -> MosaicResult<i64> {
            fields
                .get(i)
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(bad)
        };

        if verb.contains("_trans") {
            let in_dir = verb.starts_with("in_trans");
            if !in_dir && !verb.starts_with("out_trans") {
                return Err(bad());
            }
            let dram = verb.contains("_dram");
            let boundary = verb.contains("_boundary");
            if fields.len() < 7 {
                return Err(bad());
            }
            let (fifo, local) = match fields[1].strip_suffix("_local") {
                Some(base) => (Id::new(base), true),
                None => (Id::new(fields[1]), false),
            };
            let next_pack = if fields.len() > 7 { Some(int(7)?) } else { None };
            let coalesce = if fields.len() > 9 {
                Some((int(8)?, int(9)?))
            } else {
                None
            };
            return Ok(StmtName::IoTrans(IoTransName {
                in_dir,
                dram,
                boundary,
                fifo,
                local,
                is_filter: int(2)? != 0,
                is_buffer: int(3)? != 0,
                sched_depth: int(4)?,
                param_id: int(5)?,
                pack: int(6)?,
                next_pack,
                coalesce,
            }));
        }

        // short direct form
        let (in_dir, dummy) = match verb {
            "in" => (true, false),
            "out" => (false, false),
            "in_dummy" => (true, true),
            "out_dummy" => (false, true),
            _ => return Err(bad()),
        };
        if fields.len() != 4 {
            return Err(bad());
        }
        Ok(StmtName::Direct(DirectName {
            in_dir,
            dummy,
            fifo: Id::new(fields[1]),
            pack: int(2)?,
            next_pack: int(3)?,
        }))
    }
}

/// If `verb` matches `expect`, return the second field as an `Id`.
fn verb_arg(verb: &str, expect: &str, fields: &[&str]) -> Option<Id> {
    if verb == expect {
        fields.get(1).map(|s| Id::new(*s))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) {
        let decoded = StmtName::decode(text).unwrap();
        assert_eq!(decoded.encode().as_str(), text);
    }

    #[test]
    fn long_form_round_trips() {
        round_trip("in_trans_dram.fifo_A_0_IO_L3_in.0.1.2.0.4.2.2.4");
        round_trip("in_trans.fifo_A_0_IO_L2_in.1.1.1.1.2.2");
        round_trip("out_trans_boundary.fifo_B_1_IO_L2_out.1.0.-1.-1.2.2");
        round_trip("out_trans.fifo_C_drain_IO_L1_out_local.0.1.-1.-1.1.1");
    }

    #[test]
    fn short_form_round_trips() {
        round_trip("in.fifo_A_0_PE.2.1");
        round_trip("out_dummy.fifo_B_1_PE.1.1");
    }

    #[test]
    fn wiring_forms_round_trip() {
        round_trip("module_call.A_0_IO_L2_in");
        round_trip("module_call_upper.B_1_IO_L3_out.boundary");
        round_trip("module_call_lower.B_1_IO_L2_out");
        round_trip("fifo_decl.fifo_A_0_IO_L2_in");
        round_trip("fifo_decl_boundary.fifo_A_0_PE");
    }

    #[test]
    fn local_suffix_is_part_of_the_fifo_field() {
        let StmtName::IoTrans(n) =
            StmtName::decode("in_trans.fifo_A_0_IO_L1_in_local.0.1.0.-1.2.2")
                .unwrap()
        else {
            panic!("expected transfer name");
        };
        assert!(n.local);
        assert_eq!(n.fifo.as_str(), "fifo_A_0_IO_L1_in");
    }

    #[test]
    fn field_counts_distinguish_the_forms() {
        assert!(matches!(
            StmtName::decode("in.fifo_A_PE.4.1").unwrap(),
            StmtName::Direct(_)
        ));
        assert!(matches!(
            StmtName::decode("in_trans.fifo.0.0.-1.-1.1").unwrap(),
            StmtName::IoTrans(IoTransName {
                next_pack: None,
                coalesce: None,
                ..
            })
        ));
        assert!(StmtName::decode("bogus.name").is_err());
    }
}
