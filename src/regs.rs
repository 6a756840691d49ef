use hashbrown::HashMap;
use strum::IntoEnumIterator;

use crate::inst::{ArchReg, MemRef};
use crate::util::Addr;

/// Committed architectural register file. Register zero is hardwired: it
/// always reads as zero and writes to it are dropped.
#[derive(Debug, Clone, Default)]
pub struct RegSet {
    regs: HashMap<ArchReg, u32>,
}

impl RegSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reg: ArchReg) -> u32 {
        if reg == ArchReg::Zero {
            0
        } else {
            *self.regs.get(&reg).unwrap_or(&0)
        }
    }

    pub fn set(&mut self, reg: ArchReg, value: u32) {
        if reg != ArchReg::Zero {
            self.regs.insert(reg, value);
        }
    }

    pub fn ref_to_addr(&self, mr: MemRef) -> Addr {
        Addr(self.get(mr.base).wrapping_add(mr.offset.0))
    }
}

impl<const N: usize> From<[(ArchReg, u32); N]> for RegSet {
    fn from(pairs: [(ArchReg, u32); N]) -> Self {
        Self {
            regs: pairs.into_iter().collect(),
        }
    }
}

impl PartialEq for RegSet {
    fn eq(&self, other: &Self) -> bool {
        // Unwritten registers read as zero, so compare values, not maps.
        ArchReg::iter().all(|r| self.get(r) == other.get(r))
    }
}

impl Eq for RegSet {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inst::Imm;

    #[test]
    fn test_zero_register() {
        let mut regs = RegSet::new();
        regs.set(ArchReg::Zero, 99);
        assert_eq!(regs.get(ArchReg::Zero), 0);
    }

    #[test]
    fn test_missing_reads_zero() {
        let regs = RegSet::from([(ArchReg::A0, 5)]);
        assert_eq!(regs.get(ArchReg::A0), 5);
        assert_eq!(regs.get(ArchReg::A1), 0);
        assert_eq!(regs, RegSet::from([(ArchReg::A0, 5), (ArchReg::T3, 0)]));
    }

    #[test]
    fn test_ref_to_addr_wraps() {
        let regs = RegSet::from([(ArchReg::Sp, 4)]);
        let mr = MemRef {
            base: ArchReg::Sp,
            offset: Imm(8u32.wrapping_neg()),
        };
        assert_eq!(regs.ref_to_addr(mr), Addr(4u32.wrapping_sub(8)));
    }
}
