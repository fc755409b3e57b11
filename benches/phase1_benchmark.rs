use std::time::Duration;

use cgr::config::EngineConfig;
use cgr::contact::{ContactInfo, ContactType};
use cgr::contact_plan::ContactPlanStore;
use cgr::node::NodeRegistry;
use cgr::route::RoutingWork;
use cgr::types::NodeID;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Builds a contact plan chaining `hop_count` relay nodes in series, each contact overlapping
/// the next by a wide margin so phase 1 has real candidates to relax at every hop.
fn chain_plan(hop_count: NodeID) -> (ContactPlanStore, NodeID) {
    let mut contacts = ContactPlanStore::new();
    let local_node = 1;
    contacts
        .add_contact(ContactInfo {
            from_node: local_node,
            to_node: local_node,
            from_time: 0.0,
            to_time: cgr::types::MAX_TIME,
            xmit_rate: 0.0,
            confidence: 1.0,
            contact_type: ContactType::Registration,
        })
        .unwrap();

    let destination = local_node + hop_count;
    for node in local_node..destination {
        contacts
            .add_contact(ContactInfo {
                from_node: node,
                to_node: node + 1,
                from_time: 0.0,
                to_time: 100_000.0,
                xmit_rate: 1_000_000.0,
                confidence: 0.99,
                contact_type: ContactType::Scheduled,
            })
            .unwrap();
        contacts.add_range(node, node + 1, 0.0, 100_000.0, 1).unwrap();
    }
    (contacts, destination)
}

fn phase1_benchmark(c: &mut Criterion) {
    let (mut contacts, destination) = chain_plan(30);
    let config = EngineConfig::ccsds_sabr();

    c.bench_function("phase1 chain search", |b| {
        b.iter(|| {
            let mut registry = NodeRegistry::new();
            let mut work = RoutingWork::new();
            cgr::phase1::compute_routes(black_box(1), black_box(destination), black_box(0.0), &mut contacts, &mut registry, &mut work, &config, None).unwrap()
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(10));
    targets = phase1_benchmark
}
criterion_main!(benches);
