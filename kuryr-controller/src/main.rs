//! `kuryr-k8s-controller`: watches Kubernetes Services and Endpoints and
//! reconciles Neutron/Octavia LBaaS state to match them.
//!
//! Wires together the client (C1), the two watchers (C2, with C3/C4
//! composed in via [`kuryr_runtime::Watcher`]), the two resource handlers
//! (C5, C6), and the driver registry (C7) built from [`config::Settings`].

use std::sync::Arc;

use anyhow::Context;
use kuryr_controller::config::Settings;
use kuryr_controller::lb_handler::LoadBalancerHandler;
use kuryr_controller::spec_handler::LBaaSSpecHandler;
use kuryr_drivers::{InMemoryLBaaSDriver, Registry};
use kuryr_k8s_client::Client;
use kuryr_runtime::Watcher;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::load().context("loading configuration")?;

    let client = Arc::new(Client::new(settings.client).context("building Kubernetes client")?);

    let registry = Registry::build(
        &settings.driver_names,
        &settings.configured_values,
        Arc::new(InMemoryLBaaSDriver::new()),
    )
    .context("building driver registry")?;

    let spec_handler = Arc::new(LBaaSSpecHandler::new(
        Arc::clone(&client),
        Arc::clone(&registry.service_project),
        Arc::clone(&registry.service_subnets),
        Arc::clone(&registry.security_groups),
    ));
    let lb_handler = Arc::new(LoadBalancerHandler::new(
        Arc::clone(&client),
        Arc::clone(&registry.pod_subnets),
        Arc::clone(&registry.lbaas),
    ));

    let service_watcher = Arc::new(Watcher::new(
        Arc::clone(&client),
        spec_handler,
        settings.retry_policy,
    ));
    let endpoints_watcher = Arc::new(Watcher::new(
        Arc::clone(&client),
        lb_handler,
        settings.retry_policy,
    ));

    service_watcher.add(services_path(&settings.namespace)).await;
    endpoints_watcher.add(endpoints_path(&settings.namespace)).await;

    service_watcher.start().await;
    endpoints_watcher.start().await;
    info!(namespace = ?settings.namespace, "kuryr-k8s-controller started");

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutting down");

    service_watcher.stop().await;
    endpoints_watcher.stop().await;

    Ok(())
}

fn services_path(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) => format!("/api/v1/namespaces/{ns}/services"),
        None => "/api/v1/services".to_string(),
    }
}

fn endpoints_path(namespace: &Option<String>) -> String {
    match namespace {
        Some(ns) => format!("/api/v1/namespaces/{ns}/endpoints"),
        None => "/api/v1/endpoints".to_string(),
    }
}
