//! ECLIC interrupt-controller model for RISC-V SoC emulation
//!
//! Models the Enhanced Core-Local Interrupt Controller (CLIC family):
//! per-source enable/pending/trigger/level-priority configuration, a
//! byte-addressable register window, edge/level trigger state machines,
//! and the arbitration that offers the single best eligible interrupt
//! to one CPU core. Peripherals drive input lines with
//! [`Eclic::raise_irq`]/[`Eclic::lower_irq`]; the bus forwards register
//! accesses to [`Eclic::read8`]/[`Eclic::write8`]; the CPU receives
//! offers through the [`CpuDispatch`] handle it registered at
//! construction and calls [`Eclic::ack`] when it takes one.
//!
//! The controller is single-threaded and synchronous: every entry point
//! runs decode, pending-set maintenance, and dispatch to completion
//! before returning. The embedding event loop serializes all calls.

mod cpu;
mod eclic;
pub mod snapshot;

pub use cpu::{CpuDispatch, Delivery, RecordingCpu};
pub use eclic::{Decoded, Eclic, TriggerMode, IRQ_EXTERNAL_BASE, IRQ_TIMER, IRQ_TIMER_SW};
pub use snapshot::EclicSnapshot;
