//! Typed engine configuration and the three named, mutually-exclusive presets.
//!
//! The reference implementation selects these three behaviors with preprocessor macros
//! (`CGR_UNIBO_SUGGESTED_SETTINGS`, `CCSDS_SABR_DEFAULTS`, `CGR_ION_3_7_0`) that must not be
//! enabled simultaneously. Per the design note in SPEC_FULL.md §9 we replace that with a
//! typed value built once at `initialize` time: since an [`EngineConfig`] is an ordinary
//! struct and an engine holds exactly one, "selecting more than one preset" cannot arise.

use crate::types::{Duration, Volume};

/// Loop-avoidance policy (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AvoidLoop {
    /// No anti-loop mechanism; matches plain CCSDS/ION SABR behavior.
    Off,
    /// Demote routes whose neighbor already failed to forward this bundle.
    Reactive,
    /// Demote/avoid routes that would close or risk a loop through the bundle's geo-route.
    Proactive,
    /// Apply both the reactive and proactive mechanisms.
    Both,
}

impl AvoidLoop {
    /// Whether reactive loop avoidance (checking `bundle.failed_neighbors`) is active.
    pub fn is_reactive(self) -> bool {
        matches!(self, AvoidLoop::Reactive | AvoidLoop::Both)
    }

    /// Whether proactive loop avoidance (walking `bundle.geo_route`) is active.
    pub fn is_proactive(self) -> bool {
        matches!(self, AvoidLoop::Proactive | AvoidLoop::Both)
    }
}

/// Queue-delay computation policy (§4.5 step 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QueueDelay {
    /// Only the first hop's backlog contributes to the queue delay.
    FirstHopOnly,
    /// Conservative per-hop delays are accumulated along every hop of the route.
    AllHops,
}

/// The full set of engine policies, created once at [`crate::engine::CgrEngine::initialize`]
/// and threaded by reference through the orchestrator and all three phases (§4.9, §6).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Loop-avoidance policy. Default: `Both`.
    pub avoid_loop: AvoidLoop,
    /// Caps the number of Dijkstra routes computed per phase-1 call for a destination.
    /// `0` = unlimited (classic one-route-per-neighbor), `1` = single route, `>1` = bounded
    /// fan-out. Critical bundles always behave as unlimited regardless of this setting.
    pub max_dijkstra_routes: u32,
    /// Queue-delay computation policy. Default: `AllHops`.
    pub queue_delay: QueueDelay,
    /// When true, the confidence floor check (§4.5 step 7) and the confidence tiebreak
    /// (§4.4 step 6b, §4.6 step 2) are both skipped.
    pub neglect_confidence: bool,
    /// When true, a computed route to a destination is also filed as a best route to each
    /// intermediate node on its chain (§4.4 "Optional optimization").
    pub add_computed_route_to_intermediates: bool,
    /// Minimum confidence improvement a candidate route must offer over
    /// `bundle.dlv_confidence` to survive phase 2 (§4.5 step 7).
    pub min_confidence_improvement: Confidence,
    /// Convergence-layer overhead, as a percentage of bundle size, subtracted from route
    /// volume limits (§4.5 step 6).
    pub perc_convergence_layer_overhead: f64,
    /// Floor (in bytes) under which `perc_convergence_layer_overhead` is not allowed to push
    /// the effective per-hop overhead.
    pub min_convergence_layer_overhead: Volume,
    /// Enables the MSR fast path (§4.7).
    pub msr_enabled: bool,
    /// Tolerance, in seconds, when matching an MSR hop's `from_time` against a contact's
    /// actual start time.
    pub msr_time_tolerance: Duration,
    /// Wise-node MSR matching mode: every hop must resolve locally and the last hop must
    /// terminate at the destination. When false, a prefix match of at least
    /// `msr_hops_lower_bound` hops is accepted.
    pub wise_node: bool,
    /// Minimum number of matching prefix hops accepted in non-wise-node MSR mode.
    pub msr_hops_lower_bound: u32,
    /// Maximum rate of change in distance between any two nodes, in miles per hour, used to
    /// compute the range-rate safety margin added to OWLT (CCSDS SABR §2.4.2).
    pub max_speed_mph: f64,
}

/// The speed of light, in miles per hour, used to derive the range-rate safety margin
/// (`max_speed_mph / LIGHT_SPEED_MPH`) added to every OWLT lookup in phase 1 (§4.4 step 2).
pub const LIGHT_SPEED_MPH: f64 = 670_616_629.0;

use crate::types::Confidence;

impl Default for EngineConfig {
    /// The Unibo-suggested preset (all enhancements enabled) is the library-wide default, per
    /// the field defaults enumerated in SPEC_FULL.md §6; hosts wanting strict standard
    /// compliance opt into [`EngineConfig::ccsds_sabr`] explicitly.
    fn default() -> Self {
        EngineConfig::unibo_suggested()
    }
}

impl EngineConfig {
    /// Strict CCSDS SABR behavior: single route per destination, no loop avoidance, first-hop
    /// only queue delay, confidence neglected.
    pub fn ccsds_sabr() -> Self {
        EngineConfig {
            avoid_loop: AvoidLoop::Off,
            max_dijkstra_routes: 1,
            queue_delay: QueueDelay::FirstHopOnly,
            neglect_confidence: true,
            add_computed_route_to_intermediates: false,
            min_confidence_improvement: 0.0,
            perc_convergence_layer_overhead: 3.0,
            min_convergence_layer_overhead: 100.0,
            msr_enabled: false,
            msr_time_tolerance: 2.0,
            wise_node: true,
            msr_hops_lower_bound: 1,
            max_speed_mph: 450_000.0,
        }
    }

    /// Behavior matching ION 3.7.0's CGR implementation (Unibo enhancements disabled, but
    /// confidence-aware tiebreaking retained, unlike the CCSDS baseline).
    pub fn ion_3_7_0() -> Self {
        EngineConfig {
            avoid_loop: AvoidLoop::Off,
            max_dijkstra_routes: 1,
            queue_delay: QueueDelay::FirstHopOnly,
            neglect_confidence: false,
            add_computed_route_to_intermediates: false,
            min_confidence_improvement: 0.05,
            perc_convergence_layer_overhead: 6.25,
            min_convergence_layer_overhead: 36.0,
            msr_enabled: false,
            msr_time_tolerance: 2.0,
            wise_node: true,
            msr_hops_lower_bound: 1,
            max_speed_mph: 450_000.0,
        }
    }

    /// The Unibo-suggested preset: all enhancements enabled (both loop-avoidance mechanisms,
    /// unlimited one-route-per-neighbor fan-out, all-hops queue delay).
    pub fn unibo_suggested() -> Self {
        EngineConfig {
            avoid_loop: AvoidLoop::Both,
            max_dijkstra_routes: 0,
            queue_delay: QueueDelay::AllHops,
            neglect_confidence: false,
            add_computed_route_to_intermediates: false,
            min_confidence_improvement: 0.05,
            perc_convergence_layer_overhead: 6.25,
            min_convergence_layer_overhead: 100.0,
            msr_enabled: false,
            msr_time_tolerance: 2.0,
            wise_node: true,
            msr_hops_lower_bound: 1,
            max_speed_mph: 450_000.0,
        }
    }

    /// The range-rate safety margin factor (§4.4 step 2): `max_speed_mph / LIGHT_SPEED_MPH`.
    pub fn range_rate_margin_factor(&self) -> f64 {
        self.max_speed_mph / LIGHT_SPEED_MPH
    }
}
