//! Slot & booking engine: the capacity-bounded scheduler.

mod recurring;
mod store;

pub use recurring::RecurringPattern;
pub use store::{NewSlot, SlotSearch, SlotStore};
