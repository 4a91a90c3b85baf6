use eframe::egui::{Pos2, pos2};
use graphlens::sim::{
    ConfigPatch, Inbound, LinkInput, NodeInput, Outbound, Simulation, SimulationStatus,
    TickOutcome,
};

const MAX_TICKS: usize = 10_000;

fn patch() -> ConfigPatch {
    ConfigPatch {
        broadcast_every: Some(1),
        seed: Some(2024),
        ..ConfigPatch::default()
    }
}

fn chain() -> (Vec<NodeInput>, Vec<LinkInput>) {
    (
        vec![NodeInput::new("a"), NodeInput::new("b"), NodeInput::new("c")],
        vec![LinkInput::new("a", "b"), LinkInput::new("b", "c")],
    )
}

fn star(leaves: usize) -> (Vec<NodeInput>, Vec<LinkInput>) {
    let mut nodes = vec![NodeInput::new("hub")];
    let mut links = Vec::new();
    for leaf in 0..leaves {
        let id = format!("leaf{leaf}");
        links.push(LinkInput::new("hub", id.as_str()));
        nodes.push(NodeInput::new(id));
    }
    (nodes, links)
}

fn started(nodes: Vec<NodeInput>, links: Vec<LinkInput>, patch: &ConfigPatch) -> Simulation {
    let mut simulation = Simulation::new();
    simulation
        .initialize(nodes, links, patch)
        .expect("valid initialization");
    simulation
}

fn run_to_end(simulation: &mut Simulation) -> usize {
    for ticks in 1..=MAX_TICKS {
        if simulation.tick().expect("running simulation ticks") == TickOutcome::Ended {
            return ticks;
        }
    }
    panic!("simulation did not settle within {MAX_TICKS} ticks");
}

fn position(simulation: &Simulation, id: &str) -> Pos2 {
    simulation.position(id).expect("known node")
}

#[test]
fn alpha_decays_geometrically() {
    let decay = 0.05;
    let (nodes, links) = star(4);
    let mut simulation = started(
        nodes,
        links,
        &ConfigPatch {
            alpha_decay: Some(decay),
            ..patch()
        },
    );

    for ticks in 1..=40 {
        simulation.tick().expect("running simulation ticks");
        let expected = (1.0 - decay).powi(ticks);
        assert!(
            (simulation.alpha() - expected).abs() < 1e-5,
            "tick {ticks}: alpha {} vs {expected}",
            simulation.alpha()
        );
    }
}

#[test]
fn end_is_reported_once_until_reheated() {
    let (nodes, links) = star(6);
    let mut simulation = started(
        nodes,
        links,
        &ConfigPatch {
            alpha_decay: Some(0.1),
            ..patch()
        },
    );

    let ticks = run_to_end(&mut simulation);
    // 0.9^66 is the first power below the default alpha_min of 0.001.
    assert_eq!(ticks, 66);
    assert_eq!(simulation.status(), SimulationStatus::Settled);
    assert!(simulation.tick().is_err());
    assert!(simulation.tick().is_err());

    simulation.reheat(None).expect("settled runs can be reheated");
    assert_eq!(simulation.alpha(), 1.0);
    assert_eq!(simulation.status(), SimulationStatus::Running);
    assert_eq!(run_to_end(&mut simulation), 66);
}

#[test]
fn pinned_node_holds_exactly_while_neighbours_move() {
    let (nodes, links) = star(5);
    let mut simulation = started(nodes, links, &patch());
    for _ in 0..5 {
        simulation.tick().expect("running simulation ticks");
    }

    let pin = pos2(100.0, 100.0);
    simulation
        .update(&[NodeInput::new("hub").pinned(pin.x, pin.y)])
        .expect("live simulation accepts updates");
    simulation.reheat(None).expect("live simulation reheats");
    let before = position(&simulation, "leaf0");

    for _ in 0..100 {
        simulation.tick().expect("running simulation ticks");
        assert_eq!(position(&simulation, "hub"), pin);
    }
    assert!(position(&simulation, "leaf0").distance(before) > 1.0);

    simulation
        .update(&[NodeInput::new("hub").unpinned()])
        .expect("live simulation accepts updates");
    for _ in 0..20 {
        simulation.tick().expect("running simulation ticks");
    }
    assert_ne!(position(&simulation, "hub"), pin);
}

#[test]
fn chain_settles_at_the_link_distance() {
    let (nodes, links) = chain();
    let mut simulation = started(
        nodes,
        links,
        &ConfigPatch {
            link_distance: Some(100.0),
            ..patch()
        },
    );
    run_to_end(&mut simulation);

    let a = position(&simulation, "a");
    let b = position(&simulation, "b");
    let c = position(&simulation, "c");
    for length in [a.distance(b), b.distance(c)] {
        assert!(
            (90.0..=110.0).contains(&length),
            "link length {length} is not within 10% of 100"
        );
    }
}

#[test]
fn identical_inputs_produce_identical_layouts() {
    let run = || {
        let (nodes, links) = star(30);
        let mut simulation = started(nodes, links, &patch());
        for _ in 0..50 {
            simulation.tick().expect("running simulation ticks");
        }
        simulation.positions()
    };
    assert_eq!(run(), run());
}

#[test]
fn pause_and_resume_preserve_motion_state() {
    let (nodes, links) = star(8);
    let mut simulation = started(nodes, links, &patch());
    for _ in 0..10 {
        simulation.tick().expect("running simulation ticks");
    }

    simulation.pause().expect("running simulation pauses");
    let alpha = simulation.alpha();
    let positions = simulation.positions();
    assert!(simulation.tick().is_err());
    assert_eq!(simulation.state().iterations, 10);

    simulation.resume().expect("paused simulation resumes");
    assert_eq!(simulation.status(), SimulationStatus::Running);
    assert_eq!(simulation.alpha(), alpha);
    assert_eq!(simulation.positions(), positions);
    assert!(simulation.tick().is_ok());
}

#[test]
fn configure_keeps_positions() {
    let (nodes, links) = star(3);
    let mut simulation = started(nodes, links, &patch());
    simulation.tick().expect("running simulation ticks");
    let positions = simulation.positions();

    let replies = simulation.handle(Inbound::Configure {
        config: Some(ConfigPatch {
            charge: Some(-120.0),
            ..ConfigPatch::default()
        }),
    });
    assert!(matches!(replies.as_slice(), [Outbound::State { .. }]));
    assert_eq!(simulation.positions(), positions);
    assert_eq!(simulation.config().map(|config| config.charge), Some(-120.0));

    let replies = simulation.handle(Inbound::Configure {
        config: Some(ConfigPatch {
            velocity_decay: Some(4.0),
            ..ConfigPatch::default()
        }),
    });
    assert!(matches!(replies.as_slice(), [Outbound::Error { .. }]));
    assert_eq!(simulation.status(), SimulationStatus::Running);
}

#[test]
fn init_requires_nodes_edges_and_broadcast_interval() {
    let mut simulation = Simulation::new();

    let replies = simulation.handle(Inbound::Init {
        nodes: None,
        edges: Some(Vec::new()),
        config: Some(patch()),
    });
    let [Outbound::Error { error, .. }] = replies.as_slice() else {
        panic!("expected a single error, got {replies:?}");
    };
    assert!(error.contains("nodes"), "{error}");

    let replies = simulation.handle(Inbound::Init {
        nodes: Some(Vec::new()),
        edges: None,
        config: Some(patch()),
    });
    assert!(matches!(replies.as_slice(), [Outbound::Error { error, .. }] if error.contains("edges")));

    let (nodes, links) = chain();
    let replies = simulation.handle(Inbound::Init {
        nodes: Some(nodes),
        edges: Some(links),
        config: None,
    });
    assert!(
        matches!(replies.as_slice(), [Outbound::Error { error, .. }] if error.contains("broadcastEvery"))
    );
    assert_eq!(simulation.status(), SimulationStatus::Uninitialized);
}
