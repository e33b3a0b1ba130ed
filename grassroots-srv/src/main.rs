//  MAIN.rs
//    by Lut99
//
//  Created:
//    27 Mar 2024, 10:14:55
//  Last edited:
//    04 Jul 2024, 13:20:31
//  Auto updated?
//    Yes
//
//  Description:
//!   Entrypoint to the `grassroots-srv` service.
//

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use error_trace::trace;
use grassroots_cfg::info::Info as _;
use grassroots_cfg::server::GrassrootsConfig;
use grassroots_srv::bundled::BundledPlugin;
use grassroots_srv::handler;
use grassroots_srv::jobsman::{FileBackend, JobsBackend, JobsManager, MemoryBackend};
use grassroots_srv::registry::{PluginRegistry, ServiceRegistry};
use grassroots_srv::servers::ServersManager;
use grassroots_srv::spec::Context;
use log::{debug, error, info, warn, LevelFilter};
use serde_json::Value;
use tokio::signal::unix::{signal, Signal, SignalKind};
use warp::Filter;


/***** ARGUMENTS *****/
#[derive(Parser)]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Opts {
    /// Print debug info
    #[clap(long, action, help = "If given, shows additional logging information.", env = "DEBUG")]
    debug: bool,

    /// The server configuration file.
    #[clap(
        short,
        long,
        default_value = "./grassroots.config",
        help = "The path to the server configuration. This defines the server's identity, schema version, enabled services and external peers.",
        env = "GRASSROOTS_CONFIG_PATH"
    )]
    config_path: PathBuf,
    /// The per-service configuration directory.
    #[clap(long, help = "The path to the directory with per-service configuration files, if any.", env = "GRASSROOTS_SERVICE_CONFIG_DIR")]
    service_config_dir: Option<PathBuf>,
    /// The reference-services directory.
    #[clap(long, help = "The path to the directory with reference service stubs, if any.", env = "GRASSROOTS_REFERENCES_DIR")]
    references_dir: Option<PathBuf>,

    /// The address to serve on.
    #[clap(short, long, default_value = "127.0.0.1:8080", help = "The address and port to accept requests on.", env = "GRASSROOTS_ADDRESS")]
    address: SocketAddr,
}





/***** HANDLER GLUE *****/
/// Bridges one warp request into the dispatcher.
///
/// The body is parsed here rather than by warp, so that even non-JSON bodies yield the
/// protocol-level error envelope instead of a bare 400.
async fn dispatch(ctx: Context, body: warp::hyper::body::Bytes) -> Result<impl warp::Reply, Infallible> {
    let request: Value = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!("Received a non-JSON request: {err}");
            let response: Value = specifications::envelope::build_error_response(&ctx.schema, format!("Request is not JSON: {err}"));
            return Ok(warp::reply::json(&response));
        },
    };
    let response: Value = handler::handle(&ctx, request).await;
    Ok(warp::reply::json(&response))
}





/***** ENTRYPOINT *****/
#[tokio::main]
async fn main() {
    dotenv().ok();
    let opts = Opts::parse();

    // Configure logger.
    let mut logger = env_logger::builder();
    logger.format_module_path(false);

    if opts.debug {
        logger.filter_level(LevelFilter::Debug).init();
    } else {
        logger.filter_level(LevelFilter::Info).init();
    }
    info!("Initializing grassroots-srv v{}...", env!("CARGO_PKG_VERSION"));

    // Load the config; a server without one has nothing to say for itself
    debug!("Loading config file '{}'...", opts.config_path.display());
    let config: GrassrootsConfig = match GrassrootsConfig::from_path(&opts.config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("{}", trace!(("Failed to load config file '{}'", opts.config_path.display()), err));
            std::process::exit(1);
        },
    };

    // The external peers come straight out of the config
    if let Some(backend) = &config.servers_manager {
        debug!("Ignoring servers_manager backend '{backend}': only the in-memory manager ships");
    }
    let servers: Arc<ServersManager> = Arc::new(ServersManager::new(config.servers.clone()));

    // Register the plugins. Native service crates hook themselves in here.
    let mut plugins: PluginRegistry = PluginRegistry::new();
    plugins.register(Arc::new(BundledPlugin));

    // Then resolve them (plus the reference stubs) into the service registry
    debug!("Loading service registry...");
    let registry: ServiceRegistry =
        match ServiceRegistry::load(&plugins, opts.references_dir.as_deref(), opts.service_config_dir.as_deref(), &config, &servers) {
            Ok(registry) => registry,
            Err(err) => {
                error!("{}", trace!(("Failed to load the service registry"), err));
                std::process::exit(1);
            },
        };

    // The jobs manager backend is chosen by the config
    let backend: Box<dyn JobsBackend> = match config.jobs_manager.as_deref() {
        None | Some("memory") => Box::new(MemoryBackend::new()),
        Some(path) => match FileBackend::open(path) {
            Ok(backend) => Box::new(backend),
            Err(err) => {
                error!("{}", trace!(("Failed to open jobs store '{path}'"), err));
                std::process::exit(1);
            },
        },
    };

    // Tie it all together
    let mut ctx: Context =
        Context::new(config.schema, config.provider.clone(), Arc::new(registry), Arc::new(JobsManager::new(backend)), servers);
    ctx.resource_root = config.resources.as_ref().map(|resources| resources.root.clone());
    info!("This server is '{}' ({})", ctx.provider.name, ctx.uuid);

    // Configure Warp: a single POST endpoint speaking the envelope contract
    let context = warp::any().map(move || ctx.clone());
    let routes = warp::post().and(warp::path::end()).and(context).and(warp::body::bytes()).and_then(dispatch).with(warp::log("grassroots-srv"));

    // Run the server
    let handle = warp::serve(routes).try_bind_with_graceful_shutdown(opts.address, async {
        // Register a SIGTERM handler to be Docker-friendly
        let mut handler: Signal = match signal(SignalKind::terminate()) {
            Ok(handler) => handler,
            Err(err) => {
                error!("{}", trace!(("Failed to register SIGTERM signal handler"), err));
                warn!("Service will NOT shutdown gracefully on SIGTERM");
                loop {
                    tokio::time::sleep(std::time::Duration::from_secs(24 * 3600)).await;
                }
            },
        };

        // Wait until we receive such a signal after which we terminate the server
        handler.recv().await;
        info!("Received SIGTERM, shutting down gracefully...");
    });

    match handle {
        Ok((addr, srv)) => {
            info!("Now serving @ '{addr}'");
            srv.await
        },
        Err(err) => {
            error!("{}", trace!(("Failed to serve at '{}'", opts.address), err));
            std::process::exit(1);
        },
    }
}
