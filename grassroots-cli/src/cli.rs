//  CLI.rs
//    by Lut99
//
//  Created:
//    08 Jul 2024, 11:40:02
//  Last edited:
//    09 Jul 2024, 15:20:44
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the command-line arguments of the `grassroots` executable.
//

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use grassroots_cli::spec::ParamPair;

pub(crate) fn parse() -> Arguments { Arguments::parse() }


/***** ARGUMENTS *****/
/// Defines the toplevel arguments for the `grassroots` tool.
#[derive(Debug, Parser)]
#[clap(name = "grassroots", about = "The Grassroots command-line client.")]
pub(crate) struct Arguments {
    /// If given, prints `info` and `debug` prints.
    #[clap(long, global = true, help = "If given, prints additional information during execution.", env = "DEBUG")]
    pub(crate) debug: bool,

    /// The server to talk to.
    #[clap(
        short,
        long,
        global = true,
        default_value = "http://127.0.0.1:8080/",
        help = "The uri at which the Grassroots server accepts requests.",
        env = "GRASSROOTS_SERVER"
    )]
    pub(crate) server: String,
    /// The credentials to attach to every request.
    #[clap(short, long, global = true, help = "The path to a JSON file with credentials to attach to every request.", env = "GRASSROOTS_CREDENTIALS")]
    pub(crate) credentials: Option<PathBuf>,

    /// The subcommand that can be run.
    #[clap(subcommand)]
    pub(crate) subcommand: CliSubcommand,
}

/// Defines subcommands for the `grassroots` tool.
#[derive(Debug, Subcommand)]
pub(crate) enum CliSubcommand {
    #[clap(name = "services", about = "Lists every service the server (and its peers) can dispatch to.")]
    Services {},

    #[clap(name = "schema", about = "Shows the schema version the server speaks.")]
    Schema {},

    #[clap(name = "interested", about = "Lists the services that can consume a given data resource.")]
    Interested {
        /// The resource to offer around, as 'protocol:value'.
        #[clap(help = "The data resource to offer around, written as 'protocol:value' (e.g. 'irods:/tempZone/sample.fastq').")]
        resource: String,
    },

    #[clap(name = "named", about = "Shows the descriptors of one or more named services.")]
    Named {
        /// The names of the services to describe.
        #[clap(required = true, help = "The names of the services to describe.")]
        names: Vec<String>,
        /// Ask for the indexing-data shape instead.
        #[clap(long, help = "If given, asks for the indexing-data shape (GET_SERVICE_INFO) instead of the full descriptors.")]
        indexing: bool,
    },

    #[clap(name = "run", about = "Runs one service and (optionally) waits for its jobs to settle.")]
    Run {
        /// The service to run.
        #[clap(help = "The name of the service to run.")]
        name: String,
        /// The parameters to run it with.
        #[clap(short, long = "param", help = "A parameter to set, written as 'name=value'. Repeat for more parameters.")]
        params: Vec<ParamPair>,
        /// Servers to exclude from the fan-out.
        #[clap(long = "pin", help = "A server uri to mark as already-visited, suppressing the federated fan-out to it. Repeat for more servers.")]
        pinned: Vec<String>,
        /// Whether to poll until the jobs settle.
        #[clap(short, long, help = "If given, polls the returned jobs until they have all left the live statuses.")]
        wait: bool,
    },

    #[clap(name = "keyword", about = "Runs every keyword-aware service against a keyword.")]
    Keyword {
        /// The keyword to search for.
        #[clap(help = "The keyword to hand to every keyword-aware service.")]
        keyword: String,
    },

    #[clap(name = "results", about = "Polls one or more jobs for their status and results.")]
    Results {
        /// The uuids of the jobs to poll.
        #[clap(required = true, help = "The uuids of the jobs to poll.")]
        uuids: Vec<String>,
        /// Whether to poll until the jobs settle.
        #[clap(short, long, help = "If given, keeps polling until the jobs have all left the live statuses.")]
        wait: bool,
    },

    #[clap(name = "resource", about = "Fetches a named server-side resource.")]
    Resource {
        /// The name of the resource to fetch.
        #[clap(help = "The name (path below the server's resource root) of the resource to fetch.")]
        name: String,
    },

    #[clap(name = "status", about = "Shows a snapshot of every job the server knows about.")]
    Status {},
}
