pub mod availability;
pub mod booking;
pub mod catalog;

pub use availability::{CalendarDay, DayAvailability, DayState, SlotState, SlotVerdict};
pub use booking::{Booking, BookingInput, BookingStatus, SlotRecord};
pub use catalog::{Catalog, OptionChoice, OptionSpec, ServiceEntry};
