//! Plain-text emission of schedules and the generated module inventory.
//!
//! The output is a readable rendition for debugging and golden tests, not
//! a machine format; the downstream elaborator consumes the trees
//! directly.

use crate::module::{HardwareModule, ModuleType, TopModule};
use mosaic_poly::{
    Aff, Constraint, Map, MultiUnionAff, Schedule, Set, TreeNode, UnionMap,
    UnionSet,
};
use std::io;

/// Printer for schedule trees and modules.
pub struct Printer;

impl Printer {
    fn indent<F: io::Write>(f: &mut F, level: usize) -> io::Result<()> {
        write!(f, "{}", " ".repeat(level * 2))
    }

    fn format_aff(aff: &Aff) -> String {
        let mut terms: Vec<String> = Vec::new();
        for (i, &c) in aff.coeffs.iter().enumerate() {
            match c {
                0 => {}
                1 => terms.push(format!("i{i}")),
                -1 => terms.push(format!("-i{i}")),
                _ => terms.push(format!("{c}i{i}")),
            }
        }
        for (name, c) in &aff.params {
            match c {
                1 => terms.push(name.to_string()),
                -1 => terms.push(format!("-{name}")),
                _ => terms.push(format!("{c}{name}")),
            }
        }
        if aff.cst != 0 || terms.is_empty() {
            terms.push(aff.cst.to_string());
        }
        let mut out = String::new();
        for (i, t) in terms.iter().enumerate() {
            if i > 0 && !t.starts_with('-') {
                out.push('+');
            }
            out.push_str(t);
        }
        out
    }

    fn format_constraint(c: &Constraint) -> String {
        match c {
            Constraint::Eq(a) => format!("{} = 0", Self::format_aff(a)),
            Constraint::Ge(a) => format!("{} >= 0", Self::format_aff(a)),
            Constraint::Mod(a, m) => {
                format!("{} mod {} = 0", Self::format_aff(a), m)
            }
        }
    }

    fn format_set(set: &Set) -> String {
        let tuple = set.tuple.map(|t| t.to_string()).unwrap_or_default();
        let bodies: Vec<String> = set
            .basics
            .iter()
            .map(|bs| {
                bs.cons
                    .iter()
                    .map(Self::format_constraint)
                    .collect::<Vec<_>>()
                    .join(" and ")
            })
            .collect();
        format!("{tuple}[{}] : {}", set.dim, bodies.join(" or "))
    }

    fn format_union_set(us: &UnionSet) -> String {
        us.sets
            .iter()
            .map(Self::format_set)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn format_map(map: &Map) -> String {
        let name = |t: Option<mosaic_utils::Id>| {
            t.map(|t| t.to_string()).unwrap_or_default()
        };
        let bodies: Vec<String> = map
            .basics
            .iter()
            .map(|bm| {
                bm.cons
                    .iter()
                    .map(Self::format_constraint)
                    .collect::<Vec<_>>()
                    .join(" and ")
            })
            .collect();
        format!(
            "{}[{}] -> {}[{}] : {}",
            name(map.in_tuple),
            map.n_in,
            name(map.out_tuple),
            map.n_out,
            bodies.join(" or ")
        )
    }

    fn format_union_map(um: &UnionMap) -> String {
        um.maps
            .iter()
            .map(Self::format_map)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn format_band(partial: &MultiUnionAff) -> String {
        partial
            .per_stmt
            .iter()
            .map(|(stmt, affs)| {
                let exprs: Vec<String> =
                    affs.iter().map(Self::format_aff).collect();
                format!("{stmt} -> [{}]", exprs.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Write one schedule-tree node and its descendants.
    fn write_node<F: io::Write>(
        node: &TreeNode,
        level: usize,
        f: &mut F,
    ) -> io::Result<()> {
        Self::indent(f, level)?;
        match node {
            TreeNode::Domain { domain, child } => {
                writeln!(f, "domain: {}", Self::format_union_set(domain))?;
                Self::write_node(child, level + 1, f)
            }
            TreeNode::Band { partial, child } => {
                writeln!(f, "band: {}", Self::format_band(partial))?;
                Self::write_node(child, level + 1, f)
            }
            TreeNode::Filter { filter, child } => {
                writeln!(f, "filter: {}", Self::format_union_set(filter))?;
                Self::write_node(child, level + 1, f)
            }
            TreeNode::Sequence { children } => {
                writeln!(f, "sequence:")?;
                for c in children {
                    Self::write_node(c, level + 1, f)?;
                }
                Ok(())
            }
            TreeNode::Mark { mark, child } => {
                writeln!(f, "mark: \"{mark}\"")?;
                Self::write_node(child, level + 1, f)
            }
            TreeNode::Context { context, child } => {
                let cons: Vec<String> =
                    context.iter().map(Self::format_constraint).collect();
                writeln!(f, "context: {}", cons.join(" and "))?;
                Self::write_node(child, level + 1, f)
            }
            TreeNode::Extension { extension, child } => {
                writeln!(
                    f,
                    "extension: {}",
                    Self::format_union_map(extension)
                )?;
                Self::write_node(child, level + 1, f)
            }
            TreeNode::Leaf => writeln!(f, "leaf"),
        }
    }

    pub fn write_schedule<F: io::Write>(
        sched: &Schedule,
        level: usize,
        f: &mut F,
    ) -> io::Result<()> {
        Self::write_node(&sched.root, level, f)
    }

    pub fn write_module<F: io::Write>(
        module: &HardwareModule,
        f: &mut F,
    ) -> io::Result<()> {
        let kind = match module.module_type {
            ModuleType::Pe => "pe",
            ModuleType::Io => "io",
            ModuleType::Drain => "drain",
        };
        writeln!(
            f,
            "module {} ({kind}, L{}{}{}{}{}{})",
            module.name,
            module.level,
            if module.is_filter { ", filter" } else { "" },
            if module.is_buffer { ", buffer" } else { "" },
            if module.double_buffer { ", double-buffer" } else { "" },
            if module.boundary { ", boundary" } else { "" },
            if module.credit { ", credit" } else { "" },
        )?;
        for var in &module.local_vars {
            writeln!(
                f,
                "  local {}: {}{:?} x{}",
                var.name, var.array, var.extents, var.n_lane
            )?;
        }
        let scheds = [
            ("schedule", &module.scheds.default),
            ("boundary schedule", &module.scheds.boundary),
            ("outer schedule", &module.scheds.outer),
            ("inter-transfer schedule", &module.scheds.inter_trans),
            ("intra-transfer schedule", &module.scheds.intra_trans),
            ("boundary outer schedule", &module.scheds.boundary_outer),
            (
                "boundary inter-transfer schedule",
                &module.scheds.boundary_inter_trans,
            ),
        ];
        for (label, sched) in scheds {
            if let Some(sched) = sched {
                writeln!(f, "  {label}:")?;
                Self::write_schedule(sched, 2, f)?;
            }
        }
        for dummy in &module.pe_dummy_modules {
            writeln!(f, "  dummy {}:", dummy.name)?;
            Self::write_schedule(&dummy.sched, 2, f)?;
        }
        Ok(())
    }

    pub fn write_top<F: io::Write>(
        top: &TopModule,
        f: &mut F,
    ) -> io::Result<()> {
        for module in &top.modules {
            Self::write_module(module, f)?;
        }
        writeln!(f, "top module:")?;
        for name in &top.fifo_decl_names {
            writeln!(f, "  fifo {name}")?;
        }
        for sched in &top.fifo_decl_scheds {
            Self::write_schedule(sched, 1, f)?;
        }
        for sched in &top.module_call_scheds {
            Self::write_schedule(sched, 1, f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_poly::{BasicSet, Cursor};
    use mosaic_utils::Id;

    #[test]
    fn renders_marks_and_bands() {
        let domain = UnionSet::from_set(Set::from_basic(
            BasicSet::universe(Some(Id::new("S0")), 2)
                .bound_dim(0, 0, 3)
                .bound_dim(1, 0, 3),
        ));
        let sched = Schedule::from_domain(domain);
        let band = MultiUnionAff::new(1)
            .add_stmt(Id::new("S0"), vec![Aff::var(2, 0)]);
        let sched = Cursor::at_root(&sched)
            .child(0)
            .unwrap()
            .insert_partial_schedule(band)
            .insert_mark(Id::new("kernel"))
            .schedule();

        let mut out = Vec::new();
        Printer::write_schedule(&sched, 0, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("mark: \"kernel\""));
        assert!(text.contains("band: S0 -> [i0]"));
        assert!(text.contains("domain: S0[2]"));
    }
}
