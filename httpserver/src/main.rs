// Copyright 2024 tison <wander4096@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::thread;

use clap::error::ErrorKind;
use clap::Parser;
use signal_hook::consts::SIGINT;
use signal_hook::consts::SIGTERM;
use signal_hook::iterator::Signals;

use httpserver::audit::AuditLog;
use httpserver::server::Server;
use httpserver::server::ServerConfig;

/// A small concurrent HTTP/1.1 file server.
#[derive(Debug, Parser)]
#[command(name = "httpserver")]
struct Args {
    /// Number of worker threads.
    #[arg(short = 't', long = "threads", value_name = "THREADS", default_value_t = 4)]
    threads: usize,

    /// TCP port to listen on (1-65535).
    #[arg(value_name = "PORT")]
    port: String,
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };
    let Some(port) = parse_port(&args.port) else {
        eprintln!("Invalid port: {}", args.port);
        return ExitCode::FAILURE;
    };
    if args.threads == 0 {
        eprintln!("usage: httpserver [-t THREADS] PORT");
        return ExitCode::FAILURE;
    }

    let mut config = ServerConfig::new(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)));
    config.threads = args.threads;

    let server = match Server::bind(config, AuditLog::stderr()) {
        Ok(server) => server,
        Err(err) => {
            eprintln!("httpserver: cannot listen on port {port}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let handle = match server.shutdown_handle() {
        Ok(handle) => handle,
        Err(err) => {
            eprintln!("httpserver: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(signals) => signals,
        Err(err) => {
            eprintln!("httpserver: cannot install signal handlers: {err}");
            return ExitCode::FAILURE;
        }
    };
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            log::info!("received signal {signal}, shutting down");
            handle.shutdown();
        }
    });

    log::info!("listening on port {port} with {} workers", args.threads);
    server.run();
    ExitCode::SUCCESS
}

fn parse_port(value: &str) -> Option<u16> {
    let port = value.parse::<u16>().ok()?;
    (port > 0).then_some(port)
}
