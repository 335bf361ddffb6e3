//! Admission policies and their state management.

mod backend;
mod clock;
mod maintenance;
mod sliding_window;
mod throttle;

pub use backend::{AdmissionDecision, AdmissionPolicy, Maintain};
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use maintenance::spawn_sweeper;
pub use sliding_window::SlidingWindowLimiter;
pub use throttle::IntervalThrottle;
