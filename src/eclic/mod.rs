//! ECLIC - Enhanced Core-Local Interrupt Controller
//!
//! Models the CLIC-family interrupt controller of a single-core RISC-V
//! SoC: per-source enable/pending/trigger/level-priority registers, a
//! byte-addressable MMIO window, and the arbitration that offers the
//! one best eligible interrupt to the CPU.
//!
//! Register map (relative to controller base):
//!
//! | offset           | register             | width |
//! |------------------|----------------------|-------|
//! | 0x0000           | cliccfg (nlbits)     | 1     |
//! | 0x0004           | clicinfo (read-only) | 4     |
//! | 0x000B           | mth (threshold)      | 1     |
//! | 0x1000 + 4*id    | clicintip (pending)  | 1     |
//! | 0x1000 + 4*id +1 | clicintie (enable)   | 1     |
//! | 0x1000 + 4*id +2 | clicintattr          | 1     |
//! | 0x1000 + 4*id +3 | clicintctl           | 1     |
//!
//! Accesses anywhere else read 0 and ignore writes; a misbehaving guest
//! must not crash the simulator.

mod decode;
mod pending;

pub use decode::{Decoded, TriggerMode};

use crate::cpu::{CpuDispatch, Delivery};
use crate::snapshot::EclicSnapshot;
use decode::decode_source;
use log::{debug, trace, warn};
use pending::PendingSet;

// Register map (offsets relative to controller base)
const REG_CLICCFG: u32 = 0x0000;
const REG_CLICINFO: u32 = 0x0004;
const REG_MTH: u32 = 0x000B;
const REG_SOURCE_BASE: u32 = 0x1000;

// Byte lanes of each source's 4-byte register group
const LANE_IP: u32 = 0;
const LANE_IE: u32 = 1;
const LANE_ATTR: u32 = 2;

// clicinfo layout: CLICINTCTLBITS above the source count
const INFO_CTLBITS_SHIFT: u32 = 21;

/// Architectural ceiling on the number of sources.
const MAX_SOURCES: u32 = 4096;

/// Reserved line: software-triggered timer interrupt.
pub const IRQ_TIMER_SW: u32 = 3;
/// Reserved line: timer-compare interrupt.
pub const IRQ_TIMER: u32 = 7;
/// First line that maps to an external peripheral.
pub const IRQ_EXTERNAL_BASE: u32 = 19;

/// ECLIC device
///
/// Owns the raw register file plus the derived state (decoded
/// attributes, ordered pending set, last raw line levels) and a handle
/// to the one CPU it dispatches to. Every mutating entry point leaves
/// the derived state consistent and ends with one dispatcher pass.
pub struct Eclic<C: CpuDispatch> {
    /// Base address on the embedding bus; opaque to the model itself
    base_addr: u32,
    aperture_size: u32,
    num_sources: u32,
    /// Implemented bits of each ctl register (CLICINTCTLBITS)
    ctl_bits: u8,

    // Raw register file
    cliccfg: u8,
    mth: u8,
    clicintip: Vec<u8>,
    clicintie: Vec<u8>,
    clicintattr: Vec<u8>,
    clicintctl: Vec<u8>,

    // Derived, kept consistent with the register file
    decoded: Vec<Decoded>,
    pending_set: PendingSet,
    /// Last raw value seen on each input line, for edge detection
    line_level: Vec<bool>,
    /// Last value pushed to the CPU, to suppress redundant dispatches
    last_delivery: Option<Delivery>,

    cpu: C,
}

impl<C: CpuDispatch> Eclic<C> {
    /// Create a controller with zeroed registers.
    ///
    /// `ctl_bits` is the number of implemented level/priority bits per
    /// source (6 on the reference SoC). The aperture must cover the
    /// whole register file for the configured source count.
    pub fn new(
        base_addr: u32,
        aperture_size: u32,
        num_sources: u32,
        ctl_bits: u8,
        cpu: C,
    ) -> Result<Self, String> {
        if num_sources == 0 {
            return Err("ECLIC needs at least one interrupt source".to_string());
        }
        if num_sources > MAX_SOURCES {
            return Err(format!(
                "ECLIC supports at most {} sources, got {}",
                MAX_SOURCES, num_sources
            ));
        }
        if ctl_bits == 0 || ctl_bits > 8 {
            return Err(format!("Invalid ctl bit width: {}", ctl_bits));
        }
        let regfile_end = REG_SOURCE_BASE + 4 * num_sources;
        if aperture_size < regfile_end {
            return Err(format!(
                "Aperture {:#x} too small for {} sources (register file ends at {:#x})",
                aperture_size, num_sources, regfile_end
            ));
        }

        let n = num_sources as usize;
        let eclic = Eclic {
            base_addr,
            aperture_size,
            num_sources,
            ctl_bits,
            cliccfg: 0,
            mth: 0,
            clicintip: vec![0; n],
            clicintie: vec![0; n],
            clicintattr: vec![0; n],
            clicintctl: vec![0; n],
            decoded: vec![decode_source(0, 0, 0, 0, ctl_bits); n],
            pending_set: PendingSet::new(n),
            line_level: vec![false; n],
            last_delivery: None,
            cpu,
        };
        Ok(eclic)
    }

    pub fn base_addr(&self) -> u32 {
        self.base_addr
    }

    pub fn aperture_size(&self) -> u32 {
        self.aperture_size
    }

    pub fn num_sources(&self) -> u32 {
        self.num_sources
    }

    /// Effective nlbits: cliccfg field clamped to the implemented width.
    pub fn nlbits(&self) -> u8 {
        decode::nlbits(self.cliccfg, self.ctl_bits)
    }

    /// Read-only identification word at 0x0004.
    fn clicinfo(&self) -> u32 {
        ((self.ctl_bits as u32) << INFO_CTLBITS_SHIFT) | self.num_sources
    }

    // --- Register state operations ------------------------------------

    /// Write the global config byte. Re-decodes every source: the
    /// level/priority split changes for all of them at once.
    pub fn set_global_config(&mut self, value: u8) {
        self.cliccfg = value;
        debug!("eclic: cliccfg <- {:#04x} (nlbits={})", value, self.nlbits());
        for id in 0..self.num_sources {
            self.redecode(id);
            self.refresh_membership(id);
        }
        self.dispatch();
    }

    pub fn global_config(&self) -> u8 {
        self.cliccfg
    }

    pub fn set_threshold(&mut self, value: u8) {
        self.mth = value;
        debug!("eclic: mth <- {:#04x}", value);
        self.dispatch();
    }

    pub fn threshold(&self) -> u8 {
        self.mth
    }

    /// Software write of a source's pending bit. Overrides whatever the
    /// trigger state machine last did, regardless of trigger mode.
    pub fn set_pending(&mut self, id: u32, pending: bool) {
        if id >= self.num_sources {
            return;
        }
        self.clicintip[id as usize] = pending as u8;
        self.refresh_membership(id);
        self.dispatch();
    }

    pub fn pending(&self, id: u32) -> bool {
        id < self.num_sources && self.clicintip[id as usize] != 0
    }

    pub fn set_enable(&mut self, id: u32, enable: bool) {
        if id >= self.num_sources {
            return;
        }
        self.clicintie[id as usize] = enable as u8;
        self.redecode(id);
        self.refresh_membership(id);
        self.dispatch();
    }

    pub fn enabled(&self, id: u32) -> bool {
        id < self.num_sources && self.clicintie[id as usize] != 0
    }

    pub fn set_attr(&mut self, id: u32, value: u8) {
        if id >= self.num_sources {
            return;
        }
        self.clicintattr[id as usize] = value;
        self.redecode(id);
        self.refresh_membership(id);
        self.dispatch();
    }

    pub fn attr(&self, id: u32) -> u8 {
        if id < self.num_sources {
            self.clicintattr[id as usize]
        } else {
            0
        }
    }

    pub fn set_ctl(&mut self, id: u32, value: u8) {
        if id >= self.num_sources {
            return;
        }
        self.clicintctl[id as usize] = value;
        self.redecode(id);
        self.refresh_membership(id);
        self.dispatch();
    }

    pub fn ctl(&self, id: u32) -> u8 {
        if id < self.num_sources {
            self.clicintctl[id as usize]
        } else {
            0
        }
    }

    /// Effective attributes a source currently arbitrates with.
    pub fn decoded(&self, id: u32) -> Option<Decoded> {
        if id < self.num_sources {
            Some(self.decoded[id as usize])
        } else {
            None
        }
    }

    // --- IRQ fan-in ----------------------------------------------------

    /// Drive input line `id` to the given raw value.
    ///
    /// Level-triggered sources track the line directly; edge-triggered
    /// sources latch their pending bit on the matching transition and
    /// hold it until software clears it or the CPU acks.
    pub fn set_irq(&mut self, id: u32, level: bool) {
        if id >= self.num_sources {
            return;
        }
        let i = id as usize;
        let old = self.line_level[i];
        self.line_level[i] = level;
        match self.decoded[i].trigger {
            TriggerMode::Level => self.clicintip[i] = level as u8,
            TriggerMode::RisingEdge => {
                if !old && level {
                    self.clicintip[i] = 1;
                }
            }
            TriggerMode::FallingEdge => {
                if old && !level {
                    self.clicintip[i] = 1;
                }
            }
            TriggerMode::Reserved => {
                // Unspecified encoding: record the line, change nothing
                warn!("eclic: line {} driven with reserved trigger mode", id);
                return;
            }
        }
        self.refresh_membership(id);
        self.dispatch();
    }

    /// Assert input line `id`.
    pub fn raise_irq(&mut self, id: u32) {
        self.set_irq(id, true);
    }

    /// Deassert input line `id`.
    pub fn lower_irq(&mut self, id: u32) {
        self.set_irq(id, false);
    }

    /// CPU-side hook: the core has started servicing interrupt `id`.
    ///
    /// Clears the latched pending bit of edge-triggered sources;
    /// level-triggered sources clear themselves when the line drops.
    pub fn ack(&mut self, id: u32) {
        if id >= self.num_sources {
            return;
        }
        if self.decoded[id as usize].trigger.is_edge() {
            self.clicintip[id as usize] = 0;
            self.refresh_membership(id);
        }
        self.dispatch();
    }

    // --- MMIO adapter --------------------------------------------------

    pub fn read8(&self, offset: u32) -> u8 {
        match offset {
            REG_CLICCFG => self.cliccfg,
            REG_CLICINFO..=0x0007 => {
                (self.clicinfo() >> ((offset - REG_CLICINFO) * 8)) as u8
            }
            REG_MTH => self.mth,
            o if o >= REG_SOURCE_BASE => {
                let rel = o - REG_SOURCE_BASE;
                let id = rel / 4;
                if id >= self.num_sources {
                    return 0;
                }
                let i = id as usize;
                match rel % 4 {
                    LANE_IP => self.clicintip[i],
                    LANE_IE => self.clicintie[i],
                    LANE_ATTR => self.clicintattr[i],
                    _ => self.clicintctl[i],
                }
            }
            _ => 0,
        }
    }

    pub fn write8(&mut self, offset: u32, value: u8) {
        match offset {
            REG_CLICCFG => self.set_global_config(value),
            // clicinfo is read-only
            REG_CLICINFO..=0x0007 => {}
            REG_MTH => self.set_threshold(value),
            o if o >= REG_SOURCE_BASE => {
                let rel = o - REG_SOURCE_BASE;
                let id = rel / 4;
                if id >= self.num_sources {
                    return;
                }
                match rel % 4 {
                    LANE_IP => self.set_pending(id, value & 1 != 0),
                    LANE_IE => self.set_enable(id, value & 1 != 0),
                    LANE_ATTR => self.set_attr(id, value),
                    _ => self.set_ctl(id, value),
                }
            }
            _ => {}
        }
    }

    /// Word read, composed from byte lanes little-endian.
    pub fn read32(&self, offset: u32) -> u32 {
        u32::from_le_bytes([
            self.read8(offset),
            self.read8(offset.wrapping_add(1)),
            self.read8(offset.wrapping_add(2)),
            self.read8(offset.wrapping_add(3)),
        ])
    }

    /// Word write, decomposed into byte lanes little-endian. A word
    /// write at a source's base programs all four of its registers,
    /// the way CLIC setup code initializes sources in one store.
    pub fn write32(&mut self, offset: u32, value: u32) {
        for (lane, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.write8(offset.wrapping_add(lane as u32), byte);
        }
    }

    // --- Snapshot / restore / reset ------------------------------------

    /// Capture the register file. Derived state is not included; it is
    /// rebuilt deterministically by `restore`.
    pub fn snapshot(&self) -> EclicSnapshot {
        EclicSnapshot {
            version: EclicSnapshot::VERSION,
            cliccfg: self.cliccfg,
            mth: self.mth,
            clicintip: self.clicintip.clone(),
            clicintie: self.clicintie.clone(),
            clicintattr: self.clicintattr.clone(),
            clicintctl: self.clicintctl.clone(),
        }
    }

    /// Overwrite the register file from a snapshot and rebuild all
    /// derived state in ascending source-id order, then dispatch once.
    pub fn restore(&mut self, snap: &EclicSnapshot) -> Result<(), String> {
        if snap.version != EclicSnapshot::VERSION {
            return Err(format!(
                "Unsupported snapshot version {} (expected {})",
                snap.version,
                EclicSnapshot::VERSION
            ));
        }
        let n = self.num_sources as usize;
        if snap.clicintip.len() != n
            || snap.clicintie.len() != n
            || snap.clicintattr.len() != n
            || snap.clicintctl.len() != n
        {
            return Err(format!(
                "Snapshot is for {} sources, controller has {}",
                snap.clicintip.len(),
                n
            ));
        }

        self.cliccfg = snap.cliccfg;
        self.mth = snap.mth;
        self.clicintip.copy_from_slice(&snap.clicintip);
        self.clicintie.copy_from_slice(&snap.clicintie);
        self.clicintattr.copy_from_slice(&snap.clicintattr);
        self.clicintctl.copy_from_slice(&snap.clicintctl);

        self.pending_set.clear();
        for id in 0..self.num_sources {
            self.redecode(id);
            let i = id as usize;
            // Level-triggered pending tracks the raw line, so the line
            // is recoverable; edge lines restart low, their latched
            // state lives in clicintip.
            self.line_level[i] = self.decoded[i].trigger == TriggerMode::Level
                && self.clicintip[i] != 0;
            self.refresh_membership(id);
        }
        self.last_delivery = None;
        self.dispatch();
        Ok(())
    }

    /// Return every register to its power-on state and retract any
    /// offered interrupt.
    pub fn reset(&mut self) {
        self.cliccfg = 0;
        self.mth = 0;
        self.clicintip.fill(0);
        self.clicintie.fill(0);
        self.clicintattr.fill(0);
        self.clicintctl.fill(0);
        self.line_level.fill(false);
        self.pending_set.clear();
        for id in 0..self.num_sources {
            self.redecode(id);
        }
        self.dispatch();
    }

    // --- Introspection -------------------------------------------------

    /// The interrupt currently offered to the CPU, if any.
    pub fn current_delivery(&self) -> Option<Delivery> {
        self.last_delivery
    }

    /// The CPU handle this controller dispatches to.
    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    /// Eligible source ids in arbitration order, best first.
    pub fn pending_order(&self) -> Vec<u32> {
        self.pending_set.iter().map(|r| r.id).collect()
    }

    // --- Internals -----------------------------------------------------

    fn redecode(&mut self, id: u32) {
        let i = id as usize;
        self.decoded[i] = decode_source(
            self.clicintctl[i],
            self.clicintattr[i],
            self.clicintie[i],
            self.nlbits(),
            self.ctl_bits,
        );
    }

    /// Re-derive one source's pending-set membership from its pending
    /// bit and decoded attributes. Also refreshes its rank in place.
    fn refresh_membership(&mut self, id: u32) {
        let i = id as usize;
        let d = self.decoded[i];
        if d.enabled && self.clicintip[i] != 0 {
            self.pending_set.insert(id, d.level, d.priority);
        } else {
            self.pending_set.remove(id);
        }
    }

    /// Pick the winner and notify the CPU if it changed. The head of
    /// the ordered set has the maximum level, so if it misses the
    /// threshold nothing else can pass it.
    fn dispatch(&mut self) {
        let winner = self
            .pending_set
            .head()
            .filter(|rank| rank.level >= self.mth)
            .map(|rank| Delivery {
                id: rank.id,
                level: rank.level,
                shv: self.decoded[rank.id as usize].shv,
            });
        if winner != self.last_delivery {
            trace!("eclic: dispatch {:?} -> {:?}", self.last_delivery, winner);
            self.last_delivery = winner;
            self.cpu.dispatch(winner);
        }
    }
}
