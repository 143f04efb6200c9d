//! End-to-end sessions between clients sharing one in-process store.

use scenecast_scene::{EcsScene, SceneGraph};
use scenecast_sync::{
    BroadcastConfig, EngineOptions, MemoryServer, MemoryStore, SyncEngine, SyncSystem,
};
use serde_json::json;

struct Client {
    engine: SyncEngine<MemoryStore, EcsScene>,
    scene: EcsScene,
}

impl Client {
    fn join(server: &MemoryServer, location: &str) -> Self {
        let mut connector = server.clone();
        let engine = <SyncEngine<MemoryStore, EcsScene> as SyncSystem<EcsScene>>::init(
            EngineOptions::new()
                .with_config("databaseURL: mem://arena; interval: 5")
                .with_location(location),
            &mut connector,
        );
        Self {
            engine,
            scene: EcsScene::new(),
        }
    }

    /// One host frame: deliver store events, then broadcast.
    fn frame(&mut self, time: f64) {
        self.engine.poll(&mut self.scene);
        self.engine.tick(&self.scene, time);
    }

    fn leave(&self, server: &MemoryServer) {
        if let Some(store) = self.engine.store() {
            server.disconnect(store.connection_id());
        }
    }
}

fn run_frames(clients: &mut [&mut Client], from: f64, to: f64) {
    let mut time = from;
    while time <= to {
        for client in clients.iter_mut() {
            client.frame(time);
        }
        time += 1.0;
    }
}

#[test]
fn movement_propagates_between_clients() {
    let server = MemoryServer::new();
    let mut alice = Client::join(&server, "https://arena/?aframe-firebase-channel=match7");
    let mut bob = Client::join(&server, "https://arena/?aframe-firebase-channel=match7");
    assert_eq!(alice.engine.channel(), Some("match7"));

    let root = alice.scene.root();
    let avatar = alice.scene.spawn_with_id("alice-avatar", root);
    let hand = alice.scene.spawn_with_id("alice-hand", avatar);
    alice.scene.set_component(avatar, "position", json!({"x": 0, "y": 1.6, "z": 0}));
    alice.scene.set_component(hand, "position", json!({"x": 0.3, "y": -0.4, "z": 0}));
    alice.scene.set_component(hand, "geometry", json!({"primitive": "sphere"}));

    alice
        .engine
        .register_broadcast(&alice.scene, avatar, BroadcastConfig::default())
        .unwrap();
    alice
        .engine
        .register_broadcast(&alice.scene, hand, BroadcastConfig::parse("componentsOnce: geometry"))
        .unwrap();

    run_frames(&mut [&mut alice, &mut bob], 1.0, 12.0);

    assert_eq!(bob.engine.replicas().len(), 2);
    let avatar_key = alice.engine.broadcasts().remote_id(avatar).unwrap();
    let hand_key = alice.engine.broadcasts().remote_id(hand).unwrap();
    let remote_avatar = bob.engine.replicas().handle(avatar_key).unwrap();
    let remote_hand = bob.engine.replicas().handle(hand_key).unwrap();

    assert_eq!(bob.scene.parent(remote_avatar), Some(bob.scene.root()));
    assert_eq!(bob.scene.parent(remote_hand), Some(remote_avatar));
    assert_eq!(
        bob.scene.component(remote_hand, "geometry"),
        Some(json!({"primitive": "sphere"}))
    );

    alice.scene.set_component(avatar, "position", json!({"x": 2, "y": 1.6, "z": -1}));
    run_frames(&mut [&mut alice, &mut bob], 13.0, 20.0);
    assert_eq!(
        bob.scene.component(remote_avatar, "position"),
        Some(json!({"x": 2, "y": 1.6, "z": -1}))
    );

    // Nothing flows back into Alice's scene.
    assert!(alice.engine.replicas().is_empty());
    assert_eq!(alice.scene.children(root), vec![avatar]);
}

#[test]
fn channels_are_isolated() {
    let server = MemoryServer::new();
    let mut red = Client::join(&server, "https://arena/?aframe-firebase-channel=red");
    let mut blue = Client::join(&server, "https://arena/?aframe-firebase-channel=blue");

    let root = red.scene.root();
    let flag = red.scene.spawn_with_id("flag", root);
    red.scene.set_component(flag, "position", json!([1, 0, 1]));
    red.engine
        .register_broadcast(&red.scene, flag, BroadcastConfig::default())
        .unwrap();

    run_frames(&mut [&mut red, &mut blue], 1.0, 10.0);
    assert!(blue.engine.replicas().is_empty());
    assert_eq!(server.records("red", "entities").len(), 1);
    assert!(server.records("blue", "entities").is_empty());
}

#[test]
fn shared_entity_changes_hands_when_owner_leaves() {
    let server = MemoryServer::new();
    let mut alice = Client::join(&server, "https://arena/");
    let mut bob = Client::join(&server, "https://arena/");
    let shared = BroadcastConfig::parse("components: position; shared: true");

    let alice_root = alice.scene.root();
    let ball_a = alice.scene.spawn_with_id("ball", alice_root);
    alice.scene.set_component(ball_a, "position", json!(0));
    alice
        .engine
        .register_broadcast(&alice.scene, ball_a, shared.clone())
        .unwrap();
    run_frames(&mut [&mut alice], 1.0, 5.0);

    let bob_root = bob.scene.root();
    let ball_b = bob.scene.spawn_with_id("ball", bob_root);
    bob.engine
        .register_broadcast(&bob.scene, ball_b, shared)
        .unwrap();

    alice.scene.set_component(ball_a, "position", json!(7));
    run_frames(&mut [&mut alice, &mut bob], 6.0, 15.0);

    // Alice drives the ball and Bob follows it.
    let alice_id = alice.engine.client_id().as_str().to_string();
    assert_eq!(
        bob.engine.broadcasts().get(ball_b).unwrap().config.owner(),
        Some(alice_id.as_str())
    );
    assert_eq!(bob.scene.component(ball_b, "position"), Some(json!(7)));
    assert_eq!(server.records("default", "entities").len(), 1);

    alice.leave(&server);
    bob.scene.set_component(ball_b, "position", json!(9));
    run_frames(&mut [&mut bob], 16.0, 25.0);

    let records = server.records("default", "entities");
    assert_eq!(records.len(), 1);
    let (_, record) = records.iter().next().unwrap();
    assert_eq!(
        record.broadcast_meta().owner(),
        Some(bob.engine.client_id().as_str())
    );
    assert_eq!(record.get("position"), Some(&json!(9)));
    assert_eq!(bob.scene.parent(ball_b), Some(bob_root));
}

#[test]
fn late_joiner_receives_existing_entities() {
    let server = MemoryServer::new();
    let mut host = Client::join(&server, "https://arena/");
    let root = host.scene.root();
    let table = host.scene.spawn_with_id("table", root);
    let cup = host.scene.spawn_with_id("cup", table);
    for entity in [table, cup] {
        host.scene.set_component(entity, "position", json!(0));
        host.engine
            .register_broadcast(&host.scene, entity, BroadcastConfig::default())
            .unwrap();
    }
    run_frames(&mut [&mut host], 1.0, 10.0);

    let mut guest = Client::join(&server, "https://arena/");
    run_frames(&mut [&mut guest], 11.0, 11.0);

    assert_eq!(guest.engine.replicas().len(), 2);
    let guest_table = guest
        .engine
        .replicas()
        .handle(host.engine.broadcasts().remote_id(table).unwrap())
        .unwrap();
    let guest_cup = guest
        .engine
        .replicas()
        .handle(host.engine.broadcasts().remote_id(cup).unwrap())
        .unwrap();
    assert_eq!(guest.scene.parent(guest_cup), Some(guest_table));
}
