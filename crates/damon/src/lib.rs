#![forbid(unsafe_code)]

//! Control plane for DAMON, the kernel's data access monitor.
//!
//! Kdamonds, their monitoring contexts and schemes are plain values in
//! [`model`]. [`DamonControl`] writes them to the kernel through one of its
//! two interfaces, turns kdamonds on and off, and reads back live scheme
//! statistics.

pub mod backend;
pub mod clock;
pub mod control;
mod error;
pub mod features;
pub mod fmt;
pub mod kvpairs;
pub mod model;

pub use backend::{Backend, DebugfsBackend, SysfsBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use control::{DamonControl, WaitOptions, ensure_initialized, ensure_root_permission};
pub use error::{DecodeError, Error, ParseError};
pub use features::{Feature, FeatureSet};
pub use kvpairs::{KvMap, KvValue};
pub use model::{
    Age, AgeUnit, DamonCtx, DamonIntervals, DamonNrRegionsRange, DamonOps, DamonRecord,
    DamonRegion, DamonTarget, Damos, DamosAccessPattern, DamosAction, DamosFilter, DamosQuotas,
    DamosStats, DamosTriedRegion, DamosWatermarks, FilterType, Kdamond, KdamondState, NrAccesses,
    NrAccessesUnit, WatermarkMetric,
};
