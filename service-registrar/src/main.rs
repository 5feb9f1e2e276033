use anyhow::Context;
use clap::Parser;
use log::info;
use service_registrar::args::Args;
use service_registrar::config::{format_duration, RegistratorKind};
use service_registrar::{Agent, AgentConfig, ConsulRegistry, ServiceRegistry};
use std::sync::Arc;
use supervisor_events::EventListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, env_logger writes to stderr.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = AgentConfig::from_args(&args).context("invalid configuration")?;
    let policy = config.policy();
    info!(
        "=== Service Registrar Starting ({} target(s), ttl {}, renew every {}) ===",
        config.targets().len(),
        format_duration(policy.ttl()),
        format_duration(policy.renew_interval())
    );
    for target in config.targets().targets() {
        info!("Target: '{}' as {}", target.name(), target.id());
    }

    let registry: Arc<dyn ServiceRegistry> = match config.registrator().kind() {
        RegistratorKind::Consul => {
            let endpoint = config.registrator().endpoint();
            info!("Registrator: consul at {}", endpoint);
            Arc::new(ConsulRegistry::new(&endpoint).context("cannot build consul client")?)
        }
    };

    let agent = Agent::new(config.targets().clone(), registry, policy);
    let mut listener = EventListener::stdio();
    agent
        .run(&mut listener)
        .await
        .context("event listener terminated")?;
    Ok(())
}
