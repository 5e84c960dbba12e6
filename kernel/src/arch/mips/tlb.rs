//! Software-managed TLB
//!
//! The translation cache of the modeled MIPS-like processor: 64 slots of
//! `(entryhi, entrylo)` pairs, loaded entirely by kernel software. Entryhi
//! holds the virtual page number, entrylo the physical page number plus
//! the DIRTY and VALID control bits.
//!
//! All operations take the internal lock for the whole probe/write pair,
//! which models the interrupts-disabled window the real hardware requires
//! around the two-register commit.

use bitflags::bitflags;
use spin::Mutex;

/// Number of TLB slots.
pub const NUM_TLB: usize = 64;

/// Mask selecting the page number in either TLB word.
pub const PAGE_FRAME_MASK: u32 = 0xFFFF_F000;

bitflags! {
    /// Control bits carried in the low half of a TLB word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EntryLo: u32 {
        /// Entry may be written through.
        const DIRTY = 0x0000_0400;
        /// Entry participates in translation.
        const VALID = 0x0000_0200;
    }
}

#[derive(Debug, Clone, Copy)]
struct TlbSlot {
    hi: u32,
    lo: u32,
}

struct TlbInner {
    slots: [TlbSlot; NUM_TLB],
    /// Stand-in for the hardware random register: a wrapping counter that
    /// picks the victim slot for [`Tlb::random`].
    next_victim: usize,
}

/// The processor's translation cache.
pub struct Tlb {
    inner: Mutex<TlbInner>,
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

impl Tlb {
    /// Per-slot invalid entryhi pattern. Lives in a kernel segment so it
    /// can never alias a user virtual page, and differs per slot so the
    /// hardware never sees duplicate entryhi values.
    const fn invalid_hi(slot: usize) -> u32 {
        (0x8_0000 + slot as u32) << 12
    }

    /// Create a TLB with every slot invalidated.
    pub fn new() -> Self {
        let mut slots = [TlbSlot { hi: 0, lo: 0 }; NUM_TLB];
        let mut i = 0;
        while i < NUM_TLB {
            slots[i].hi = Self::invalid_hi(i);
            i += 1;
        }
        Self {
            inner: Mutex::new(TlbInner {
                slots,
                next_victim: 0,
            }),
        }
    }

    /// Index of the slot matching `entryhi`'s page, if any.
    pub fn probe(&self, entryhi: u32) -> Option<usize> {
        let inner = self.inner.lock();
        Self::probe_locked(&inner, entryhi)
    }

    fn probe_locked(inner: &TlbInner, entryhi: u32) -> Option<usize> {
        let page = entryhi & PAGE_FRAME_MASK;
        inner
            .slots
            .iter()
            .position(|slot| slot.hi & PAGE_FRAME_MASK == page)
    }

    /// Write `(hi, lo)` into a specific slot.
    pub fn write(&self, index: usize, hi: u32, lo: u32) {
        let mut inner = self.inner.lock();
        inner.slots[index] = TlbSlot { hi, lo };
    }

    /// Write `(hi, lo)` into a slot of the hardware's choosing.
    /// Returns the victim index.
    pub fn random(&self, hi: u32, lo: u32) -> usize {
        let mut inner = self.inner.lock();
        Self::random_locked(&mut inner, hi, lo)
    }

    fn random_locked(inner: &mut TlbInner, hi: u32, lo: u32) -> usize {
        let victim = inner.next_victim % NUM_TLB;
        inner.next_victim = inner.next_victim.wrapping_add(1);
        inner.slots[victim] = TlbSlot { hi, lo };
        victim
    }

    /// Probe for `hi`'s page and, only when absent, random-insert the
    /// pair. One lock hold covers both halves, so a concurrent fault on
    /// the same page cannot double-insert.
    pub fn insert_if_absent(&self, hi: u32, lo: u32) {
        let mut inner = self.inner.lock();
        if Self::probe_locked(&inner, hi).is_none() {
            Self::random_locked(&mut inner, hi, lo);
        }
    }

    /// Drop the slot translating `entryhi`'s page, if present.
    pub fn invalidate(&self, entryhi: u32) {
        let mut inner = self.inner.lock();
        if let Some(index) = Self::probe_locked(&inner, entryhi) {
            inner.slots[index] = TlbSlot {
                hi: Self::invalid_hi(index),
                lo: 0,
            };
        }
    }

    /// Invalidate every slot. Done on each address-space switch.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        for (i, slot) in inner.slots.iter_mut().enumerate() {
            *slot = TlbSlot {
                hi: Self::invalid_hi(i),
                lo: 0,
            };
        }
    }

    /// Entrylo of the slot translating `entryhi`'s page, if present.
    pub fn lookup(&self, entryhi: u32) -> Option<u32> {
        let inner = self.inner.lock();
        Self::probe_locked(&inner, entryhi).map(|i| inner.slots[i].lo)
    }
}
