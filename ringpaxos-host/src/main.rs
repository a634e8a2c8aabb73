//! Thin process entry point: parse flags, load the bootstrap configuration, bring up a
//! [ringpaxos::Host] and run it. Everything that matters lives in the `ringpaxos` library; this
//! binary is glue.

use std::sync::Arc;

use arrrg::CommandLine;
use indicio::{clue, stdio::StdioEmitter, ALWAYS, INFO};
use ringpaxos::config::Config;
use ringpaxos::telemetry::COLLECTOR;
use ringpaxos::Host;
use ringpaxos_pb::{Value, ValueId};

#[derive(Debug, Default, Eq, PartialEq, arrrg_derive::CommandLine)]
struct Options {
    #[arrrg(required, "Path to the bootstrap configuration JSON file.", "PATH")]
    config: String,
    #[arrrg(required, "This process's host_id within the configuration.", "ID")]
    host_id: u32,
    #[arrrg(
        optional,
        "One of: serve (default), submit-random, dump-snapshot.",
        "MODE"
    )]
    mode: Option<String>,
    #[arrrg(optional, "Verbosity passed to the structured logging collector.", "N")]
    verbosity: Option<u64>,
}

fn main() {
    let (options, free) =
        Options::from_command_line("Usage: ringpaxos-host --config PATH --host-id ID [--mode MODE]");
    if !free.is_empty() {
        eprintln!("command takes no free arguments");
        std::process::exit(1);
    }

    let emitter = Arc::new(StdioEmitter);
    COLLECTOR.register(emitter);
    COLLECTOR.set_verbosity(options.verbosity.unwrap_or(INFO));
    clue!(COLLECTOR, ALWAYS, {
        starting: options.config.clone(),
        host_id: options.host_id,
    });

    let config = match Config::load(&options.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("could not load {}: {}", options.config, err);
            std::process::exit(1);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to start tokio runtime");

    match options.mode.as_deref().unwrap_or("serve") {
        "serve" => runtime.block_on(serve(config, options.host_id)),
        "submit-random" => runtime.block_on(submit_random(config, options.host_id)),
        "dump-snapshot" => runtime.block_on(dump_snapshot(config, options.host_id)),
        other => {
            eprintln!("unknown mode: {other}");
            std::process::exit(1);
        }
    }

    clue!(COLLECTOR, ALWAYS, { goodbye: options.host_id });
}

async fn serve(config: Config, host_id: u32) {
    let host = match Host::bootstrap(config, host_id).await {
        Ok(host) => host,
        Err(err) => {
            eprintln!("bootstrap failed: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = host.run().await {
        eprintln!("host exited: {err}");
        std::process::exit(1);
    }
}

/// Load-test harness: bootstrap a host, submit a handful of randomly-valued proposals against
/// it, and print what it observes delivered before exiting. Grounded in the original's
/// `submit_random_values` harness; useful for exercising a cluster already running under
/// `serve` on the other hosts without wiring up a separate client binary.
async fn submit_random(config: Config, host_id: u32) {
    let host = match Host::bootstrap(config, host_id).await {
        Ok(host) => host,
        Err(err) => {
            eprintln!("bootstrap failed: {err}");
            std::process::exit(1);
        }
    };
    let runner = {
        let host = Arc::clone(&host);
        tokio::spawn(async move { host.run().await })
    };
    for _ in 0..10 {
        let id = ValueId::generate().expect("/dev/urandom unavailable");
        let data = id.human_readable().into_bytes();
        if let Err(err) = host.submit_value(Value::new(id, data)) {
            eprintln!("submit failed: {err}");
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    for (instance_id, value) in host.delivered_values() {
        println!("{instance_id} -> {}", value.id.human_readable());
    }
    runner.abort();
}

/// Print whatever this host has delivered so far and exit; does not join the ring or accept
/// proposals. Useful for inspecting a crashed host's last-known state offline.
async fn dump_snapshot(config: Config, host_id: u32) {
    let host = match Host::bootstrap(config, host_id).await {
        Ok(host) => host,
        Err(err) => {
            eprintln!("bootstrap failed: {err}");
            std::process::exit(1);
        }
    };
    for (instance_id, value) in host.delivered_values() {
        println!("{instance_id} -> {}", value.id.human_readable());
    }
}
