pub mod bus;
pub mod entry;

pub use bus::{BusEvent, StreamBus};
pub use entry::StreamEntry;
