//! C4 (vendor adapter), C5 (continuous allocation) and C8 (vendor discovery)
//! for EV chargers.

pub mod adapter;
pub mod allocator;
pub mod discovery;

pub use adapter::ChargerAdapter;
pub use allocator::{calc_optimal, ChargerAllocator};
pub use discovery::VendorDiscovery;
