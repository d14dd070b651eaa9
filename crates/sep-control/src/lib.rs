//! sep-control - Time-driven DER control activation
//!
//! A [`TimeSource`] broadcasts the current epoch second once per period.
//! The [`DerControlScheduler`] consumes those ticks and moves every control
//! of every DER program through Scheduled, Active and Complete, keeping each
//! program's active control list (`derca`) in step.

pub mod clock;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock, TimeSource, TICK_PERIOD};
pub use scheduler::{advance, ControlTransition, DerControlScheduler, TickReport};
