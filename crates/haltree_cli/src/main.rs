/* 📖 # What does the haltree binary serve?

`haltree` compiles the deployment API in `deploy.rs` (pools, apps, versions) into a
resource tree and serves it as HAL over HTTP. It is both a usable in-memory service and
the reference for wiring a tree of your own:

1. Describe the entity types and their lifecycle methods
2. `Schema::compile::<Root>()` once at startup
3. Hand the schema to a `HalService` and start the server

Configuration comes from `haltree.toml` in the current directory unless `--config`
points elsewhere; a missing file means defaults. `--port` and `--host` override the
file. `--outline` prints the compiled tree and exits without binding a socket.

Exit codes:
- 0: Outline printed
- 1: Error (bad configuration, schema compile failure, or the port could not be bound)
*/

mod deploy;

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use haltree_base::start_server;
use haltree_base::tracing::init_tracing;
use haltree_engine::{HalService, Schema, load_config_or_default};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "haltree", version, about = "Serve the deployment API as HAL")]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "haltree.toml")]
    config: PathBuf,

    /// Port to listen on, overriding the configuration file
    #[arg(long)]
    port: Option<u16>,

    /// Interface to listen on, overriding the configuration file
    #[arg(long)]
    host: Option<String>,

    /// Start with a sample pool, app and version
    #[arg(long)]
    seed: bool,

    /// Print the compiled resource tree and exit
    #[arg(long)]
    outline: bool,
}

fn main() {
    let args = Args::parse();
    if let Err(e) = init_tracing() {
        eprintln!("Error: Failed to initialize tracing: {}", e);
        process::exit(1);
    }

    let schema = match Schema::compile::<deploy::Root>() {
        Ok(schema) => schema,
        Err(e) => {
            eprintln!("Error: Failed to compile resource tree: {}", e);
            process::exit(1);
        }
    };

    if args.outline {
        print!("{}", schema.outline());
        return;
    }

    let mut config = match load_config_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(host) = args.host {
        config.host = host;
    }

    if args.seed {
        deploy::seed();
        info!("Loaded sample deployment");
    }

    let service = Arc::new(HalService::new(Arc::new(schema)));
    let handle = match start_server(service, config.http_server_config()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: Failed to start server: {}", e);
            process::exit(1);
        }
    };

    println!("Serving on http://{}", handle.address(&config.host));

    // The server runs on its own thread until the handle is dropped
    while !handle.is_shutdown() {
        thread::park();
    }
}
