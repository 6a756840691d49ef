use std::fmt;

/// Byte address in the modelled data memory.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct Addr(pub u32);

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
