//! `manypress site …` — manage site records from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use manypress_core::types::{NewSite, ProtocolFlags, SiteId};

use crate::app::{build_store, AppStore};
use crate::config::Config;

#[derive(Subcommand, Debug)]
pub enum SiteCommand {
    /// Create a site record.
    Create(CreateArgs),

    /// List site ids.
    List {
        /// Only list sites marked public.
        #[arg(long)]
        public_only: bool,
    },

    /// Print one site record as JSON.
    Show { domain: String },

    /// Publish a content folder over the site's enabled protocols.
    Sync { domain: String, folder: PathBuf },

    /// Retract the site from every published protocol and remove it.
    Delete { domain: String },

    /// Peer counts for the site's peer-based protocols.
    Stats { domain: String },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Site domain; also its id. Bare hostname: no scheme, no port.
    pub domain: String,

    /// Publish over plain HTTPS.
    #[arg(long)]
    pub http: bool,

    /// Publish over IPFS.
    #[arg(long)]
    pub ipfs: bool,

    /// Publish over Hyper.
    #[arg(long)]
    pub hyper: bool,

    /// Publish over BitTorrent.
    #[arg(long)]
    pub bittorrent: bool,

    /// List the site in public queries.
    #[arg(long)]
    pub public: bool,
}

impl SiteCommand {
    pub async fn run(self, config: Config) -> Result<()> {
        let store = build_store(&config)?;
        match self {
            SiteCommand::Create(args) => create(&store, args),
            SiteCommand::List { public_only } => list(&store, public_only),
            SiteCommand::Show { domain } => show(&store, &domain),
            SiteCommand::Sync { domain, folder } => sync(&store, &domain, &folder).await,
            SiteCommand::Delete { domain } => delete(&store, &domain).await,
            SiteCommand::Stats { domain } => stats(&store, &domain).await,
        }
    }
}

fn create(store: &AppStore, args: CreateArgs) -> Result<()> {
    let site = store
        .create(NewSite {
            domain: args.domain,
            protocols: ProtocolFlags {
                http: args.http,
                ipfs: args.ipfs,
                hyper: args.hyper,
                bittorrent: args.bittorrent,
            },
            public: Some(args.public),
        })
        .context("creating site")?;
    println!("created {}", site.id);
    Ok(())
}

fn list(store: &AppStore, public_only: bool) -> Result<()> {
    let ids = store.list_all(public_only).context("listing sites")?;
    if ids.is_empty() {
        println!("no sites");
        return Ok(());
    }
    for id in ids {
        println!("{id}");
    }
    Ok(())
}

fn show(store: &AppStore, domain: &str) -> Result<()> {
    let site = store
        .get(&SiteId::from(domain))
        .with_context(|| format!("loading '{domain}'"))?;
    println!("{}", serde_json::to_string_pretty(&site)?);
    Ok(())
}

async fn sync(store: &AppStore, domain: &str, folder: &std::path::Path) -> Result<()> {
    store
        .manager()
        .load()
        .await
        .context("loading protocol backends")?;
    let result = store.sync(&SiteId::from(domain), folder).await;
    store.manager().unload().await;
    result.with_context(|| format!("syncing '{domain}'"))?;
    println!("synced {domain}");
    Ok(())
}

async fn delete(store: &AppStore, domain: &str) -> Result<()> {
    store
        .manager()
        .load()
        .await
        .context("loading protocol backends")?;
    let result = store.delete(&SiteId::from(domain)).await;
    store.manager().unload().await;
    result.with_context(|| format!("deleting '{domain}'"))?;
    println!("deleted {domain}");
    Ok(())
}

async fn stats(store: &AppStore, domain: &str) -> Result<()> {
    store
        .manager()
        .load()
        .await
        .context("loading protocol backends")?;
    let result = store.stats(&SiteId::from(domain)).await;
    store.manager().unload().await;
    let stats = result.with_context(|| format!("probing '{domain}'"))?;
    println!("ipfs peers:  {}", stats.ipfs.peer_count);
    println!("hyper peers: {}", stats.hyper.peer_count);
    Ok(())
}
