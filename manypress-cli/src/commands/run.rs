//! `manypress run` — load every backend and serve DNS until ctrl-c.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hickory_proto::rr::Name;
use tokio::sync::broadcast;

use manypress_dns::{DnsResponder, DnsServer};

use crate::app::{build_store, StoreLookup};
use crate::config::Config;

pub async fn run(config: Config) -> Result<()> {
    let store = Arc::new(build_store(&config)?);
    store
        .manager()
        .load()
        .await
        .context("loading protocol backends")?;

    let host = Name::from_str(&format!("{}.", config.dns.host.trim_end_matches('.')))
        .with_context(|| format!("invalid dns.host '{}'", config.dns.host))?;
    let responder =
        DnsResponder::new(StoreLookup(store.clone()), host).with_ttl(config.dns.ttl);
    let server = DnsServer::new(responder);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let server_handle = {
        let shutdown = shutdown_tx.clone();
        let listen = config.dns.listen;
        tokio::spawn(async move { server.run(listen, shutdown).await })
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    let _ = shutdown_tx.send(());

    match server_handle.await {
        Ok(result) => result.context("DNS server failed")?,
        Err(join_err) => tracing::error!(error = %join_err, "DNS server task panicked"),
    }

    store.manager().unload().await;
    tracing::info!("all backends unloaded");
    Ok(())
}
