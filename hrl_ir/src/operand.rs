//! Operand model for three-address code

use serde::{Deserialize, Serialize};
use std::fmt;

/// One operand slot of an instruction.
///
/// Register ids are signed: `id >= 0` is a local virtual register,
/// `id < 0` is a global slot encoded as `-id - 1`. Operands are plain
/// values; mutation is always by replacement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    /// Absent operand slot
    Null,
    /// Local (non-negative) or global (negative) virtual register
    Variable(i32),
    /// Immediate integer value
    Immediate(i32),
    /// Branch or call target
    Label(String),
}

impl Operand {
    /// Encode a global slot id into the negative register space.
    pub fn global(slot: i32) -> Operand {
        Operand::Variable(-slot - 1)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Operand::Null)
    }

    pub fn is_present(&self) -> bool {
        !self.is_null()
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Operand::Variable(_))
    }

    pub fn is_local_register(&self) -> bool {
        matches!(self, Operand::Variable(id) if *id >= 0)
    }

    pub fn is_global_register(&self) -> bool {
        matches!(self, Operand::Variable(id) if *id < 0)
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self, Operand::Immediate(_))
    }

    pub fn is_label(&self) -> bool {
        matches!(self, Operand::Label(_))
    }

    pub fn register_id(&self) -> Option<i32> {
        match self {
            Operand::Variable(id) => Some(*id),
            _ => None,
        }
    }

    /// Register id when this is a local register.
    pub fn local_id(&self) -> Option<i32> {
        match self {
            Operand::Variable(id) if *id >= 0 => Some(*id),
            _ => None,
        }
    }

    pub fn immediate(&self) -> Option<i32> {
        match self {
            Operand::Immediate(v) => Some(*v),
            _ => None,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Operand::Label(l) => Some(l),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Null => write!(f, "<null>"),
            Operand::Variable(id) if *id >= 0 => write!(f, "v{}", id),
            Operand::Variable(id) => write!(f, "gv{}", -id - 1),
            Operand::Immediate(v) => write!(f, "#{}", v),
            Operand::Label(l) => write!(f, "{}", l),
        }
    }
}
