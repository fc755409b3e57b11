//! A Contact Graph Routing (CGR) engine for delay/disruption-tolerant networking.
//!
//! Given a scheduled contact plan and a bundle to forward, [`engine::CgrEngine`]
//! selects the next-hop neighbors and underlying contact sequences that best
//! deliver the bundle toward its destination under deadline, volume,
//! confidence, and loop-avoidance constraints.
//!
//! The engine is single-threaded and cooperative: one call to
//! [`engine::CgrEngine::get_best_routes`] runs to completion before another may
//! begin. Hosts needing concurrency should shard engines by destination or
//! serialize calls through a queue of their own.

/// Module containing the library's primitive types (node ids, dates, volumes, ...).
pub mod types;

/// Module containing the tagged error taxonomy threaded through every fallible operation.
pub mod error;

/// Module containing the typed engine configuration and the three named presets.
pub mod config;

/// Module containing the generic ordered index used to key contacts and ranges.
pub mod index;

/// Module containing the arena allocator and the stable index newtypes it hands out.
pub mod arena;

/// Module containing the contact definition, its volume-tracking cells, and citation set.
pub mod contact;

/// Module containing the range (propagation delay) definition.
pub mod range;

/// Module containing the contact-plan store: ownership of contacts/ranges, edits, expiry.
pub mod contact_plan;

/// Module containing the bundle definition.
pub mod bundle;

/// Module containing the route and per-search Dijkstra scratch (`RoutingWork`) definitions.
pub mod route;

/// Module containing the per-destination node registry and local-neighbor derivation.
pub mod node;

/// Module containing the host-supplied backlog query callback trait.
pub mod backlog;

/// Module containing phase 1: the time-expanded Dijkstra route builder and Yen's k-shortest spurs.
pub mod phase1;

/// Module containing phase 2: candidate feasibility, loop avoidance, ETO/PBAT, and RVL accounting.
pub mod phase2;

/// Module containing phase 3: the comparator-driven best-route chooser.
pub mod phase3;

/// Module containing the Moderate Source Routing (MSR) short-circuit path.
pub mod msr;

/// Module containing the orchestrator that ties phases 1 through 3 together per call.
pub mod engine;
