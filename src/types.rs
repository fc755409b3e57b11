//! Primitive types shared across the engine.

/// Represents the unique inner identifier for a node.
pub type NodeID = u64;

/// Represents a point in time: seconds since a process-chosen reference epoch, monotone
/// non-decreasing across calls.
///
/// Contact boundaries in real contact plans are not always whole seconds (propagation
/// delay corrections, sub-second scheduling slack), so this is a float rather than an
/// integer duration.
pub type Date = f64;

/// Represents a duration in seconds.
pub type Duration = f64;

/// Represents a volume of data, in bytes.
pub type Volume = f64;

/// Represents a data transfer rate, in bytes per second.
pub type DataRate = f64;

/// Represents a one-way light-time delay, in whole seconds.
pub type Owlt = u32;

/// Represents the count of hops in a routing path.
pub type HopCount = u16;

/// Represents a confidence value in `[0, 1]`.
pub type Confidence = f64;

/// Represents the ordinal used to distinguish same-priority Expedited bundles.
pub type Ordinal = u32;

/// Sentinel used for the infinite window of a Registration contact, and for "no known bound".
pub const MAX_TIME: Date = Date::MAX;

/// The number of per-priority residual-volume cells carried by a contact (Bulk, Normal,
/// Expedited).
pub const PRIORITY_LEVELS: usize = 3;

/// The priority class of a bundle; also indexes a contact's `mtv` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub enum Priority {
    /// Best-effort traffic; drained only after Normal and Expedited demand is satisfied.
    Bulk = 0,
    /// The common case.
    Normal = 1,
    /// Latency-sensitive traffic; `ordinal` breaks ties within the class.
    Expedited = 2,
}

impl Priority {
    /// Returns the index of this priority's cell in a contact's `mtv` array.
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Monotone contact-plan edit timestamp: a `(seconds, microseconds)` pair that every
/// mutating store operation strictly increases (§3 "Lifecycles", §8 invariant 10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct EditTime {
    /// Seconds component.
    pub seconds: u64,
    /// Microseconds component, always `< 1_000_000`.
    pub micros: u32,
}

impl EditTime {
    /// The zero edit time, used as the initial `lastSeenEditTime` of a freshly initialized engine.
    pub const ZERO: EditTime = EditTime { seconds: 0, micros: 0 };

    /// Returns the next edit time strictly greater than `self`.
    pub fn tick(self) -> EditTime {
        if self.micros + 1 >= 1_000_000 {
            EditTime { seconds: self.seconds + 1, micros: 0 }
        } else {
            EditTime { seconds: self.seconds, micros: self.micros + 1 }
        }
    }
}
