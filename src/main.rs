//! A reference host binary: loads a static JSON contact plan, computes the best forwarding
//! decision for one bundle, and prints it. Exists to exercise [`cgr::engine::CgrEngine`] the
//! way a real DTN node's forwarding agent would, and to give SPEC_FULL.md §4.10's log-sink
//! wiring something concrete to point at.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use cgr::backlog::NoBacklog;
use cgr::bundle::{Bundle, BundleFlags};
use cgr::config::EngineConfig;
use cgr::contact::{ContactInfo, ContactType};
use cgr::engine::CgrEngine;
use cgr::types::{DataRate, Date, NodeID, Owlt, Priority, MAX_TIME};

/// Computes the CGR best-route decision for one bundle against a static contact plan.
#[derive(Parser)]
#[command(name = "cgrd", about = "Computes CGR best routes for a bundle against a static contact plan")]
struct Args {
    /// This node's id (must be non-zero).
    #[arg(long)]
    node: NodeID,
    /// Path to a JSON contact plan (see [`ContactPlanFile`]).
    #[arg(long)]
    contact_plan: PathBuf,
    /// The bundle's destination node.
    #[arg(long)]
    destination: NodeID,
    /// The bundle's size in bytes.
    #[arg(long, default_value_t = 1024.0)]
    bundle_size: f64,
    /// Call time, in seconds since the contact plan's epoch.
    #[arg(long, default_value_t = 0.0)]
    now: f64,
    /// Which configuration preset to route under.
    #[arg(long, value_enum, default_value_t = ConfigPreset::UniboSuggested)]
    preset: ConfigPreset,
}

#[derive(Clone, Copy, ValueEnum)]
enum ConfigPreset {
    CcsdsSabr,
    Ion370,
    UniboSuggested,
}

impl ConfigPreset {
    fn build(self) -> EngineConfig {
        match self {
            ConfigPreset::CcsdsSabr => EngineConfig::ccsds_sabr(),
            ConfigPreset::Ion370 => EngineConfig::ion_3_7_0(),
            ConfigPreset::UniboSuggested => EngineConfig::unibo_suggested(),
        }
    }
}

/// The on-disk shape of a static contact plan.
#[derive(Deserialize)]
struct ContactPlanFile {
    contacts: Vec<ContactRecord>,
    #[serde(default)]
    ranges: Vec<RangeRecord>,
}

#[derive(Deserialize)]
struct ContactRecord {
    from: NodeID,
    to: NodeID,
    from_time: Date,
    to_time: Date,
    xmit_rate: DataRate,
    #[serde(default = "full_confidence")]
    confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

#[derive(Deserialize)]
struct RangeRecord {
    from: NodeID,
    to: NodeID,
    from_time: Date,
    to_time: Date,
    owlt: Owlt,
}

fn main() {
    pretty_env_logger::init();
    let args = Args::parse();

    let plan_text = fs::read_to_string(&args.contact_plan).unwrap_or_else(|err| {
        eprintln!("failed to read {}: {}", args.contact_plan.display(), err);
        std::process::exit(1);
    });
    let plan: ContactPlanFile = serde_json::from_str(&plan_text).unwrap_or_else(|err| {
        eprintln!("failed to parse {}: {}", args.contact_plan.display(), err);
        std::process::exit(1);
    });

    let mut engine = match CgrEngine::initialize(args.node, args.now, args.preset.build(), Box::new(NoBacklog)) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("failed to initialize engine: {}", err);
            std::process::exit(1);
        }
    };

    for contact in plan.contacts {
        let info = ContactInfo {
            from_node: contact.from,
            to_node: contact.to,
            from_time: contact.from_time,
            to_time: contact.to_time,
            xmit_rate: contact.xmit_rate,
            confidence: contact.confidence,
            contact_type: ContactType::Scheduled,
        };
        if let Err(err) = engine.add_contact(info) {
            eprintln!("rejected contact {} -> {}: {}", contact.from, contact.to, err);
        }
    }
    for range in plan.ranges {
        if let Err(err) = engine.add_range(range.from, range.to, range.from_time, range.to_time, range.owlt) {
            eprintln!("rejected range {} -> {}: {}", range.from, range.to, err);
        }
    }

    let bundle = Bundle {
        terminus: args.destination,
        sender: args.node,
        size: args.bundle_size,
        evc: 0.0,
        expiration_time: MAX_TIME,
        priority: Priority::Normal,
        ordinal: 0,
        flags: BundleFlags::default(),
        dlv_confidence: 0.0,
        msr_route: None,
        failed_neighbors: Vec::new(),
        geo_route: Vec::new(),
    };

    match engine.get_best_routes(args.now, bundle, &HashSet::new()) {
        Ok(routes) if routes.is_empty() => {
            println!("no forwarding decision needed (bundle already past deadline, or destination unreachable for now)");
        }
        Ok(routes) => {
            for route in routes {
                println!("via {} ({} hop(s), arrival {:.3}, confidence {:.3})", route.next_hop, route.hop_count, route.arrival_time, route.confidence);
            }
        }
        Err(err) => {
            eprintln!("no route: {}", err);
            std::process::exit(err.to_legacy_code());
        }
    }
}
