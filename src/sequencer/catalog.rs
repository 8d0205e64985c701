//! Standard services derived from the effective configuration

use super::services::{APP_SERVER, INFERENCE_DAEMON, OVERLAY_NETWORK};
use super::{CommandProbe, CommandStart, HttpProbe, RetryPolicy, ServiceSpec};
use crate::config::EffectiveConfig;
use std::sync::Arc;

/// Overlay network, inference daemon and app server, in start order
///
/// A service is only declared as a predecessor when it is required;
/// optional ones may fail without blocking what comes after them.
pub fn standard_services(config: &EffectiveConfig, runtime: &str) -> Vec<ServiceSpec> {
    let mut specs = Vec::new();
    let logs = &config.paths.logs_dir;
    let table = &config.services;

    let overlay_required = config.features.overlay_network && !table.overlay.optional;
    if config.features.overlay_network {
        let mut start = CommandStart::new("tailscale", ["up"]);
        if let Some(key) = &table.overlay_auth_key {
            start = start.secret_arg("--authkey", key);
        }
        specs.push(
            ServiceSpec::new(
                OVERLAY_NETWORK,
                Arc::new(start.log_to(logs.join("overlay-network.log"))),
                Arc::new(CommandProbe::new("tailscale", ["status"])),
                RetryPolicy::from(table.overlay),
            )
            .optional(table.overlay.optional),
        );
    }

    let inference_required = config.inference.enabled && !table.inference.optional;
    if config.inference.enabled {
        let mut spec = ServiceSpec::new(
            INFERENCE_DAEMON,
            Arc::new(CommandStart::new("ollama", ["serve"]).log_to(logs.join("inference-daemon.log"))),
            Arc::new(HttpProbe::new(format!(
                "{}/api/tags",
                config.inference.base_url.trim_end_matches('/')
            ))),
            RetryPolicy::from(table.inference),
        )
        .optional(table.inference.optional);
        if overlay_required {
            spec = spec.after(OVERLAY_NETWORK);
        }
        specs.push(spec);
    }

    let server = &config.server;
    let mut args = vec![
        "-m".to_string(),
        "uvicorn".to_string(),
        "main:app".to_string(),
        "--host".to_string(),
        server.host.clone(),
        "--port".to_string(),
        server.port.to_string(),
    ];
    if server.reload {
        args.push("--reload".to_string());
    }
    let mut app = ServiceSpec::new(
        APP_SERVER,
        Arc::new(
            CommandStart::new(runtime, args)
                .current_dir(&config.paths.base)
                .env("ENVIRONMENT", &config.environment)
                .log_to(logs.join("app-server.log")),
        ),
        Arc::new(HttpProbe::new(server.health_url())),
        RetryPolicy::from(table.app),
    )
    .optional(table.app.optional);
    if inference_required {
        app = app.after(INFERENCE_DAEMON);
    }
    specs.push(app);

    specs
}
