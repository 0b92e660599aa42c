use serde::{Deserialize, Serialize};
use std::fmt;
use symbol_table::GlobalSymbol;

/// Interned identifier. Used for statement names, mark names, parameter
/// names, array names, and module names. Cheap to copy and compare;
/// the backing string lives in a process-global table.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id {
    sym: GlobalSymbol,
}

impl Id {
    pub fn new<S: AsRef<str>>(name: S) -> Self {
        Id {
            sym: GlobalSymbol::from(name.as_ref()),
        }
    }

    /// The interned string, valid for the life of the process.
    pub fn as_str(&self) -> &'static str {
        self.sym.as_str()
    }
}

/// Things that have a name.
pub trait GetName {
    /// Return the name of the thing.
    fn name(&self) -> Id;
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::new(s)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::new(s)
    }
}

impl From<&String> for Id {
    fn from(s: &String) -> Self {
        Id::new(s)
    }
}

impl PartialEq<str> for Id {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Id {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl PartialEq<String> for Id {
    fn eq(&self, other: &String) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Serialize for Id {
    fn serialize<S: serde::Serializer>(
        &self,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        ser.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: serde::Deserializer<'de>>(
        de: D,
    ) -> Result<Self, D::Error> {
        let s = String::deserialize(de)?;
        Ok(Id::new(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_stable() {
        let a = Id::new("fifo_A_IO_L2_in");
        let b = Id::from("fifo_A_IO_L2_in");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "fifo_A_IO_L2_in");
    }

    #[test]
    fn compares_against_strings() {
        let a = Id::new("module");
        assert_eq!(a, "module");
        assert!(a != "pe_dummy_module");
    }
}
