use super::read_project;
use crate::config::Config;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use trellis_resources::{
    collect_page_requests, get_resource_key, DirectFetchLoader, HttpResourceLoader,
    ResourceEngine, ResourceLoader, ResourceRequest,
};

#[derive(Args, Debug)]
pub struct ResourcesArgs {
    /// Project snapshot (defaults to the configured one)
    pub snapshot: Option<PathBuf>,

    /// Page path
    #[arg(short, long, default_value = "/")]
    pub page: String,

    /// Load the requests and print the results
    #[arg(long)]
    pub fetch: bool,
}

pub fn resources(args: ResourcesArgs, cwd: &str) -> Result<()> {
    let config = Config::load(cwd)?;
    let data = read_project(&config.resolve_snapshot(cwd, args.snapshot.as_ref()))?;
    let Some(page) = data.find_page_by_path(&args.page) else {
        anyhow::bail!("No page at {}", args.page);
    };

    let requests = collect_page_requests(&data, &page.root_instance_id, &HashMap::new());
    println!(
        "📦 {} resource(s) on {}",
        requests.len(),
        page.path.bright_white()
    );
    for request in &requests {
        println!(
            "  {} {} {} {}",
            request.method.as_str().cyan(),
            request.full_url().unwrap_or_else(|_| request.url.clone()),
            format!("({})", request.name).dimmed(),
            get_resource_key(request).dimmed()
        );
    }

    if args.fetch && !requests.is_empty() {
        let loader: Arc<dyn ResourceLoader> = match &config.loader_url {
            Some(url) => Arc::new(HttpResourceLoader::new(url.clone())),
            None => Arc::new(DirectFetchLoader::default()),
        };
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(fetch(&config, loader, requests))?;
    }
    Ok(())
}

async fn fetch(
    config: &Config,
    loader: Arc<dyn ResourceLoader>,
    requests: Vec<ResourceRequest>,
) -> Result<()> {
    let engine = ResourceEngine::with_config(loader, config.resource_engine_config());
    let keys: Vec<(String, String)> = requests
        .into_iter()
        .map(|request| {
            let name = request.name.clone();
            (name, engine.preload_resource(request))
        })
        .collect();

    while !engine.is_idle() {
        engine.flush_now().await;
    }

    println!();
    for (name, key) in keys {
        match engine.get_cached(&key) {
            Some(value) => println!(
                "  {} {} {}",
                "✓".green(),
                name.bright_white(),
                serde_json::to_string(&value.to_json())?
            ),
            None => println!("  {} {} failed", "✗".red(), name.bright_white()),
        }
    }
    Ok(())
}
