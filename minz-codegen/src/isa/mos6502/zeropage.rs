//! The 6502 zero-page allocator (component G, spec.md §4.4/§3): assigns
//! virtual registers, SMC parameter slots, and TSMC anchor slots to three
//! disjoint byte regions ahead of emission.

use std::collections::HashMap;

/// Start (inclusive) and end (exclusive) of the virtual-register region.
pub const VREG_REGION: (u8, u8) = (0x00, 0x80);
/// Start/end of the SMC parameter-slot region.
pub const PARAM_REGION: (u8, u8) = (0x80, 0xA0);
/// Start/end of the TSMC indirect-anchor region.
pub const ANCHOR_REGION: (u8, u8) = (0xA0, 0xC0);
/// First conventional-memory address used once a region overflows.
const CONVENTIONAL_BASE: u16 = 0x0300;

/// Where one allocated entity lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    /// A single zero-page byte address.
    ZeroPage(u8),
    /// A fallback conventional-memory label, used once a region is full.
    Conventional(u16),
}

/// A non-fatal allocator condition (spec.md §4.4: "over-capacity
/// allocations silently fall back to conventional memory, but a warning
/// is emitted").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverflowWarning {
    /// Which region overflowed.
    pub region: &'static str,
    /// The identifier that had to fall back.
    pub identifier: String,
}

/// Allocator state for one module's 6502 emission: three maps from
/// identifier to allocated address, three "next free" cursors, one
/// overflow cursor shared by all three regions once they're full.
#[derive(Default)]
pub struct ZeroPageAllocator {
    vregs: HashMap<u32, Location>,
    vreg_next: u8,
    params: HashMap<String, Location>,
    param_next: u8,
    anchors: HashMap<String, Location>,
    anchor_next: u8,
    conventional_next: u16,
    /// Warnings accumulated across every `alloc_*` call on this allocator.
    pub warnings: Vec<OverflowWarning>,
}

impl ZeroPageAllocator {
    /// A fresh allocator with every cursor at its region's start.
    pub fn new() -> ZeroPageAllocator {
        ZeroPageAllocator {
            vreg_next: VREG_REGION.0,
            param_next: PARAM_REGION.0,
            anchor_next: ANCHOR_REGION.0,
            conventional_next: CONVENTIONAL_BASE,
            ..Default::default()
        }
    }

    fn fall_back(&mut self, region: &'static str, identifier: String) -> Location {
        let addr = self.conventional_next;
        self.conventional_next += 1;
        self.warnings.push(OverflowWarning { region, identifier });
        Location::Conventional(addr)
    }

    /// Allocate (or return the existing allocation for) virtual register
    /// `id` in 0x00..0x80.
    pub fn alloc_vreg(&mut self, id: u32) -> Location {
        if let Some(loc) = self.vregs.get(&id) {
            return loc.clone();
        }
        let loc = if self.vreg_next < VREG_REGION.1 {
            let addr = self.vreg_next;
            self.vreg_next += 1;
            Location::ZeroPage(addr)
        } else {
            self.fall_back("vreg", id.to_string())
        };
        self.vregs.insert(id, loc.clone());
        loc
    }

    /// Allocate (or return the existing allocation for) SMC parameter
    /// `name` in 0x80..0xA0.
    pub fn alloc_param(&mut self, name: &str) -> Location {
        if let Some(loc) = self.params.get(name) {
            return loc.clone();
        }
        let loc = if self.param_next < PARAM_REGION.1 {
            let addr = self.param_next;
            self.param_next += 1;
            Location::ZeroPage(addr)
        } else {
            self.fall_back("param", name.to_string())
        };
        self.params.insert(name.to_string(), loc.clone());
        loc
    }

    /// Allocate (or return the existing allocation for) TSMC anchor
    /// `name` in 0xA0..0xC0.
    pub fn alloc_anchor(&mut self, name: &str) -> Location {
        if let Some(loc) = self.anchors.get(name) {
            return loc.clone();
        }
        let loc = if self.anchor_next < ANCHOR_REGION.1 {
            let addr = self.anchor_next;
            self.anchor_next += 1;
            Location::ZeroPage(addr)
        } else {
            self.fall_back("anchor", name.to_string())
        };
        self.anchors.insert(name.to_string(), loc.clone());
        loc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_do_not_overlap() {
        let mut alloc = ZeroPageAllocator::new();
        let v = alloc.alloc_vreg(1);
        let p = alloc.alloc_param("x");
        let a = alloc.alloc_anchor("y");
        match (v, p, a) {
            (Location::ZeroPage(v), Location::ZeroPage(p), Location::ZeroPage(a)) => {
                assert!(v < 0x80);
                assert!((0x80..0xA0).contains(&p));
                assert!((0xA0..0xC0).contains(&a));
            }
            other => panic!("expected all zero-page allocations, got {:?}", other),
        }
    }

    #[test]
    fn same_identifier_returns_the_same_address() {
        let mut alloc = ZeroPageAllocator::new();
        let first = alloc.alloc_vreg(3);
        let second = alloc.alloc_vreg(3);
        assert_eq!(first, second);
    }

    #[test]
    fn overflowing_a_region_falls_back_with_a_warning() {
        let mut alloc = ZeroPageAllocator::new();
        for i in 0..128 {
            alloc.alloc_vreg(i);
        }
        assert!(alloc.warnings.is_empty());
        let overflow = alloc.alloc_vreg(999);
        assert!(matches!(overflow, Location::Conventional(_)));
        assert_eq!(alloc.warnings.len(), 1);
        assert_eq!(alloc.warnings[0].region, "vreg");
    }
}
