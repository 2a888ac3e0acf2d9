//! Render path specs of an inventory and print the resulting paths.
//!
//! Usage:
//!   sfcrender_main --topology ring ring
//!   sfcrender_main --topology inventory.json --config renderer.json --json web web-symmetric

use clap::Parser;
use log::*;
use sfcrender::example_topologies;
use sfcrender::inventory::InMemoryInventory;
use sfcrender::store::MemoryStore;
use sfcrender::{CreateRequest, RenderService, RendererConfig, RspRenderer};
use std::error::Error;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "sfcrender_main")]
#[command(about = "Render service function chains into rendered service paths")]
#[command(version)]
struct Args {
    /// Name of an example topology (two-forwarders, ring), or path to an inventory JSON document
    #[arg(short, long, default_value = "two-forwarders")]
    topology: String,

    /// Renderer configuration file (JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Scheduler type, overriding the configuration
    #[arg(short, long)]
    scheduler: Option<String>,

    /// Number of paths rendered per path spec
    #[arg(short = 'n', long, default_value_t = 1)]
    count: usize,

    /// Delete the rendered paths again before exiting
    #[arg(long)]
    delete: bool,

    /// Print the rendered paths as JSON
    #[arg(long)]
    json: bool,

    /// Seconds to wait for each request
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Path specs to render
    #[arg(required = true)]
    path_specs: Vec<String>,
}

fn load_inventory(topology: &str) -> Result<InMemoryInventory, Box<dyn Error>> {
    if let Some(inventory) = example_topologies::by_name(topology) {
        info!("Using example topology {}", topology);
        return Ok(inventory);
    }
    let content = fs::read_to_string(topology)?;
    Ok(InMemoryInventory::from_json(&content)?)
}

fn main() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RendererConfig::from_json_file(path)?,
        None => RendererConfig::default(),
    };
    if let Some(scheduler) = &args.scheduler {
        config.scheduler = Some(scheduler.clone());
    }
    info!("Scheduler: {}", config.scheduler_kind());

    let inventory = Arc::new(load_inventory(&args.topology)?);
    let renderer = Arc::new(RspRenderer::new(inventory, Arc::new(MemoryStore::new()), config)?);
    let service = RenderService::start(renderer);
    let timeout = Duration::from_secs(args.timeout);

    let pending = args
        .path_specs
        .iter()
        .flat_map(|spec| (0..args.count).map(move |_| spec))
        .map(|spec| service.submit(CreateRequest::new(spec.as_str())).map(|p| (spec, p)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rendered = Vec::new();
    let mut failed = 0;
    for (spec, p) in pending {
        match p.wait(timeout) {
            Ok(paths) => {
                if let Some(e) = &paths.reverse_error {
                    warn!("Reverse path of {} failed: {}", paths.forward, e);
                }
                rendered.push(paths.forward.clone());
                rendered.extend(paths.reverse.clone());
            }
            Err(e) => {
                error!("Cannot render {}: {}", spec, e);
                failed += 1;
            }
        }
    }

    for name in &rendered {
        if let Some(rsp) = service.renderer().rendered_path(name)? {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&rsp)?);
            } else {
                println!("{}", rsp);
            }
        }
    }

    if args.delete {
        for name in &rendered {
            // deleting a forward path removes its reverse too, the second delete is a no-op
            service.submit_delete(name.as_str())?.wait(timeout)?;
        }
        info!("Deleted {} rendered paths", rendered.len());
    }
    service.shutdown();

    if failed > 0 {
        return Err(format!("{} of {} requests failed", failed, args.path_specs.len() * args.count).into());
    }
    Ok(())
}
