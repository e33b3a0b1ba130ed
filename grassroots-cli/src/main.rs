//  MAIN.rs
//    by Lut99
//
//  Created:
//    08 Jul 2024, 11:58:13
//  Last edited:
//    09 Jul 2024, 15:26:02
//  Auto updated?
//    Yes
//
//  Description:
//!   Entrypoint to the `grassroots` executable.
//

use std::str::FromStr as _;

use dotenvy::dotenv;
use error_trace::ErrorTrace as _;
use grassroots_cli::requests::{render, Client};
use log::{error, LevelFilter};
use serde_json::Value;
use specifications::resource::DataResource;
use specifications::version::CURRENT_SCHEMA_VERSION;

pub mod cli;
use cli::*;


/***** ENTRYPOINT *****/
#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Load the .env file
    dotenv().ok();

    // Parse the arguments
    let args = cli::parse();

    // Initialize the logger
    let mut logger = env_logger::builder();
    logger.format_module_path(false);
    if args.debug {
        logger.filter_level(LevelFilter::Debug).init();
    } else {
        logger.filter_level(LevelFilter::Warn).init();
    }

    // Build the client
    let mut client: Client = Client::new(args.server, CURRENT_SCHEMA_VERSION);
    if let Some(path) = &args.credentials {
        if let Err(err) = client.load_credentials(path) {
            error!("{}", err.trace());
            std::process::exit(1);
        }
    }

    // Now match on the command
    let response: Result<Value, _> = match args.subcommand {
        CliSubcommand::Services {} => client.list_services().await,

        CliSubcommand::Schema {} => client.schema_version().await,

        CliSubcommand::Interested { resource } => match DataResource::from_str(&resource) {
            Ok(resource) => client.interested_services(&resource.protocol, &resource.value).await,
            Err(err) => {
                error!("{}", err.trace());
                std::process::exit(1);
            },
        },

        CliSubcommand::Named { names, indexing } => client.named_services(&names, indexing).await,

        CliSubcommand::Run { name, params, pinned, wait } => match client.run_service(&name, &params, &pinned).await {
            Ok(response) if wait => {
                // Collect the returned job uuids and wait them out
                let uuids: Vec<String> = response
                    .get("service_results")
                    .and_then(Value::as_array)
                    .map(|entries| entries.iter().filter_map(|entry| entry.get("uuid").and_then(Value::as_str)).map(String::from).collect())
                    .unwrap_or_default();
                if uuids.is_empty() { Ok(response) } else { client.poll_until_done(&uuids).await }
            },
            other => other,
        },

        CliSubcommand::Keyword { keyword } => client.run_keyword(&keyword).await,

        CliSubcommand::Results { uuids, wait } => {
            if wait { client.poll_until_done(&uuids).await } else { client.poll(&uuids).await }
        },

        CliSubcommand::Resource { name } => client.resource(&name).await,

        CliSubcommand::Status {} => client.server_status().await,
    };

    // Render whatever came back
    match response {
        Ok(response) => println!("{}", render(&response)),
        Err(err) => {
            error!("{}", err.trace());
            std::process::exit(1);
        },
    }
}
