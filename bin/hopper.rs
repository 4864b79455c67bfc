//! Relay launcher
//!
//! Single executable with a `start` subcommand. All configuration comes from
//! flags or from a JSON file whose fields override them; startup validation
//! failures exit non-zero.

use std::{process::ExitCode, sync::Arc, time::Duration};

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{error, info};
use tokio::{runtime::Builder, time};

use hopper::{config::DEFAULT_PASSPHRASE, crypto, Config, Listener};

mod common;

use self::common::{config, logging, monitor};

fn main() -> ExitCode {
    let app = Command::new("hopper")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A secure UDP relayer")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Raise the log level, once for debug, twice for trace"),
        )
        .subcommand(define_start_command());

    match app.get_matches().subcommand() {
        Some(("start", matches)) => start(matches),
        _ => ExitCode::FAILURE,
    }
}

fn define_start_command() -> Command {
    Command::new("start")
        .about("Start a listener for UDP packet forwarding")
        .arg(
            Arg::new("listen")
                .long("listen")
                .short('l')
                .value_name("ADDR")
                .default_value(":1234")
                .help("Listener address, eg: \"IP:1234\""),
        )
        .arg(
            Arg::new("nexthops")
                .long("nexthops")
                .short('n')
                .value_name("ADDRS")
                .value_delimiter(',')
                .default_value("127.0.0.1:3000")
                .help("Comma separated servers to forward to"),
        )
        .arg(
            Arg::new("sockbuf")
                .long("sockbuf")
                .value_name("BYTES")
                .value_parser(clap::value_parser!(usize))
                .default_value("1048576")
                .help("Socket buffer for the listener"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("DURATION")
                .default_value("60s")
                .help("How long an idle session lives"),
        )
        .arg(
            Arg::new("ki")
                .long("ki")
                .value_name("SECRET")
                .default_value(DEFAULT_PASSPHRASE)
                .help("The secret to encrypt and decrypt for the last hop (incoming)"),
        )
        .arg(
            Arg::new("ko")
                .long("ko")
                .value_name("SECRET")
                .default_value(DEFAULT_PASSPHRASE)
                .help("The secret to encrypt and decrypt for the next hop (outgoing)"),
        )
        .arg(
            Arg::new("ci")
                .long("ci")
                .value_name("METHOD")
                .default_value("aes")
                .value_parser(clap::builder::PossibleValuesParser::new(
                    crypto::available_methods().iter().copied(),
                ))
                .help("The cryptography method for incoming data"),
        )
        .arg(
            Arg::new("co")
                .long("co")
                .value_name("METHOD")
                .default_value("aes")
                .value_parser(clap::builder::PossibleValuesParser::new(
                    crypto::available_methods().iter().copied(),
                ))
                .help("The cryptography method for outgoing data"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("JSON config file; fields set there override the flags"),
        )
}

fn start(matches: &ArgMatches) -> ExitCode {
    logging::init("hopper", matches.get_count("verbose"));

    let config = match config::build(matches) {
        Ok(config) => config,
        Err(err) => {
            error!("invalid configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };

    info!("version: {}", env!("CARGO_PKG_VERSION"));
    info!("listening on: {}", config.listen);
    info!("next hops: {:?}", config.next_hops);
    info!("socket buffer: {}", config.sockbuf);
    info!("session timeout: {:?}", config.timeout);
    info!("incoming crypto: {}", config.cipher_in);
    info!("outgoing crypto: {}", config.cipher_out);

    let runtime = match Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!("failed to build runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> ExitCode {
    let listener = match Listener::bind(&config) {
        Ok(listener) => Arc::new(listener),
        Err(err) => {
            error!("startup failed: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut server = {
        let listener = listener.clone();
        tokio::spawn(async move { listener.run().await })
    };

    tokio::select! {
        joined = &mut server => match joined {
            Ok(Ok(())) => ExitCode::SUCCESS,
            Ok(Err(err)) => {
                error!("relay terminated: {}", err);
                ExitCode::FAILURE
            }
            Err(err) => {
                error!("relay task failed: {}", err);
                ExitCode::FAILURE
            }
        },
        monitored = monitor::create_signal_monitor() => {
            if let Err(err) = monitored {
                error!("signal monitor failed: {}", err);
            }
            listener.close();
            // Give in-flight teardown a moment before the runtime drops.
            let _ = time::timeout(Duration::from_secs(5), &mut server).await;
            ExitCode::SUCCESS
        }
    }
}
