//! System bus and memory for the Xenon CPU emulator
//!
//! The CPU core consumes the [`Bus`] trait; [`SystemBus`] backs it with RAM,
//! boot ROM/SRAM storage and range-mapped devices. The shared
//! [`ReservationTable`] lives here because every store on the bus must be
//! able to break another thread's reservation.

pub mod bus;
pub mod constants;
pub mod pages;
pub mod reservation;

pub use bus::{route_real_address, Bus, Device, SystemBus};
pub use pages::RegionFlags;
pub use reservation::ReservationTable;
