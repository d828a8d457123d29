//! Timetable domain models.
//!
//! Everything here is a plain value type: values are built from upstream
//! payloads (see `payload`) or decoded from the cache, and never mutated after.

pub mod category;
pub mod event;
pub mod location;
pub mod parsed_name;
pub mod payload;

pub use self::category::*;
pub use self::event::*;
pub use self::location::*;
pub use self::parsed_name::*;
