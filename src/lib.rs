//! Hierarchical timing wheel with intrusive bucket lists.
//!
//! Based on Varghese and Lauck's paper
//! "Hashed and Hierarchical Timing Wheels: Efficient Data Structures for
//! Implementing a Timer Facility".
//!
//! Timer nodes live in a slab arena and bucket membership is an index
//! splice, so scheduling, rescheduling and cancellation are O(1) and the
//! wheel allocates nothing while running. Each tick expires the current
//! bucket of every level whose boundary it crosses; see [`TimingWheel`].

mod list;
pub mod wheel;

pub use wheel::{ConfigError, TimerId, TimingWheel, WheelConfig};
