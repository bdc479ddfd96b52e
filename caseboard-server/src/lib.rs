// Copyright 2025 Caseboard (https://github.com/caseboard)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Caseboard Server - blackboard orchestration engine for anonymous
//! campus-safety tips.
//!
//! Reports enter through the HTTP boundary, land in the graph store, and
//! every mutation fans out to live subscribers and into the blackboard
//! controller, which schedules the knowledge sources that grow the case
//! graph until it quiesces.

pub mod api;
pub mod config;
pub mod controller;
pub mod event_bus;
pub mod services;
pub mod sources;
pub mod state;

use anyhow::Result;
use axum::http::HeaderValue;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use config::ServerConfig;
use controller::BlackboardController;
use event_bus::EventBus;
use services::ServiceHub;
use sources::{register_knowledge_sources, SourceContext};
use state::{GraphStore, StreamFanout};

/// The assembled engine: graph store wired to the controller, sources
/// registered, event bus carrying the non-graph domain events.
pub struct Engine {
    pub graph: Arc<GraphStore>,
    pub controller: Arc<BlackboardController>,
    pub bus: Arc<EventBus>,
    pub fanout: Arc<StreamFanout>,
    pub services: ServiceHub,
    pub config: Arc<ServerConfig>,
}

/// Wire the engine together. The store and controller reference each other
/// through the store's late binding; sources close over the shared context.
pub fn build_engine(config: Arc<ServerConfig>, services: ServiceHub) -> Engine {
    let fanout = Arc::new(StreamFanout::new(config.engine.subscriber_buffer));
    let graph = Arc::new(GraphStore::new(Arc::clone(&fanout)));
    let controller = Arc::new(BlackboardController::new(&config.engine));

    let ctx = Arc::new(SourceContext {
        graph: Arc::clone(&graph),
        services: services.clone(),
    });
    register_knowledge_sources(&controller, &ctx);
    graph.set_controller(Arc::clone(&controller));

    let bus = Arc::new(EventBus::new());
    bus.subscribe("ReportReceived", "audit", |payload| {
        Box::pin(async move {
            info!("audit: report received {payload}");
            Ok(())
        })
    });
    bus.subscribe("edge:created", "audit", |payload| {
        Box::pin(async move {
            info!("audit: manual edge created {payload}");
            Ok(())
        })
    });

    Engine {
        graph,
        controller,
        bus,
        fanout,
        services,
        config,
    }
}

/// Start the engine and launch the engine's workers.
pub fn start_engine(engine: &Engine) {
    engine.bus.start();
    engine.controller.start();
}

/// Stop accepting new work and drain what is in flight.
pub async fn stop_engine(engine: &Engine) {
    engine.controller.stop().await;
    engine.bus.stop().await;
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.server.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "caseboard_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Caseboard Server");
    config.validate()?;

    let config = Arc::new(config);
    let services = ServiceHub::from_config(&config.services);
    let engine = build_engine(Arc::clone(&config), services);
    start_engine(&engine);

    let state = AppState {
        graph: Arc::clone(&engine.graph),
        controller: Arc::clone(&engine.controller),
        bus: Arc::clone(&engine.bus),
        fanout: Arc::clone(&engine.fanout),
        services: engine.services.clone(),
        config: Arc::clone(&config),
        alerts: Arc::new(parking_lot::RwLock::new(Vec::new())),
        alert_audio: Arc::new(dashmap::DashMap::new()),
    };

    let mut app = api::router(state).layer(TraceLayer::new_for_http());
    if config.server.enable_cors {
        app = app.layer(cors_layer(&config));
    }

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Caseboard Server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    stop_engine(&engine).await;
    info!("Caseboard Server stopped");
    Ok(())
}
