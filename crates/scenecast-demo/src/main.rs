//! Demo binary that runs a simulated two-client session on an in-process
//! store.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p scenecast-demo -- --interval 2 --log-level debug`.

use std::path::PathBuf;

use clap::Parser;
use scenecast_config::{CliArgs, Config, ConfigSource, default_config_dir};
use scenecast_scene::{EcsScene, SceneGraph};
use scenecast_sync::{
    BroadcastComponent, EngineOptions, MemoryServer, MemoryStore, SyncEngine, SyncSystem,
};
use serde_json::json;
use tracing::{info, warn};

type Engine = SyncEngine<MemoryStore, EcsScene>;

struct Client {
    name: &'static str,
    engine: Engine,
    scene: EcsScene,
}

impl Client {
    fn join(
        name: &'static str,
        server: &MemoryServer,
        config: &Config,
        location: Option<&str>,
    ) -> Self {
        let mut connector = server.clone();
        let mut options = EngineOptions::new().with_config(ConfigSource::Structured(config.clone()));
        if let Some(location) = location {
            options = options.with_location(location);
        }
        let engine = Engine::init(options, &mut connector);
        info!(
            client = name,
            id = %engine.client_id(),
            channel = engine.channel().unwrap_or("-"),
            "Client joined"
        );
        Self {
            name,
            engine,
            scene: EcsScene::new(),
        }
    }

    fn broadcast(&mut self, id: &str, declarations: &str) -> Option<<EcsScene as SceneGraph>::Handle> {
        let root = self.scene.root();
        let entity = self.scene.spawn_with_id(id, root);
        let component = BroadcastComponent::from_declarations(declarations);
        if let Err(error) = component.init(&mut self.engine, &self.scene, entity) {
            warn!(client = self.name, %error, "Could not broadcast entity");
            return None;
        }
        Some(entity)
    }

    fn frame(&mut self, time: f64) {
        self.engine.poll(&mut self.scene);
        SyncSystem::tick(&mut self.engine, &self.scene, time);
    }

    fn report(&self) {
        for child in self.scene.children(self.scene.root()) {
            info!(
                client = self.name,
                id = %self.scene.element_id(child).unwrap_or_default(),
                position = %self.scene.component(child, "position").unwrap_or_default(),
                "Scene entity"
            );
        }
    }
}

fn run_session(config: &Config, location: Option<&str>) {
    let server = MemoryServer::new();
    let mut alice = Client::join("alice", &server, config, location);
    let mut bob = Client::join("bob", &server, config, location);
    if alice.engine.is_inert() || bob.engine.is_inert() {
        warn!("Sync is disabled, nothing to demonstrate");
        return;
    }

    let avatar = alice.broadcast("alice-avatar", "components: position, rotation");
    let ball_a = alice.broadcast("ball", "components: position; shared: true");
    let ball_b = bob.broadcast("ball", "components: position; shared: true");

    let interval = alice.engine.interval().max(1.0);
    let frames = 40;
    for frame in 1..=frames {
        let time = f64::from(frame) * interval / 4.0;
        let angle = time / 10.0;
        if let Some(avatar) = avatar {
            alice.scene.set_component(
                avatar,
                "position",
                json!({"x": angle.cos() * 2.0, "y": 1.6, "z": angle.sin() * 2.0}),
            );
        }
        if let Some(ball) = ball_a {
            alice
                .scene
                .set_component(ball, "position", json!({"x": 0.0, "y": time, "z": 0.0}));
        }
        alice.frame(time);
        bob.frame(time);
    }
    bob.report();

    info!("Alice leaves");
    if let Some(store) = alice.engine.store() {
        server.disconnect(store.connection_id());
    }
    for frame in frames + 1..=frames * 2 {
        let time = f64::from(frame) * interval / 4.0;
        if let Some(ball) = ball_b {
            bob.scene
                .set_component(ball, "position", json!({"x": 1.0, "y": time, "z": 0.0}));
        }
        bob.frame(time);
    }

    if let Some(ball) = ball_b {
        let owner = bob
            .engine
            .broadcasts()
            .get(ball)
            .and_then(|entry| entry.config.owner().map(str::to_string));
        info!(owner = owner.as_deref().unwrap_or("-"), "Shared ball owner after handover");
    }
    bob.report();
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from(".scenecast"));

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    // Initialize logging with config and debug settings
    let log_dir = config_dir.join("logs");
    scenecast_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    run_session(&config, args.location.as_deref());
}
