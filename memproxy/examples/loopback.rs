/*!
Drives a proxy against a slow in-memory remote peer.

The example plays a host that redraws a memory view at roughly 60 frames per second
and prints how much of the view is already served from the cache.
*/
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::{crate_authors, crate_version, Arg, ArgAction, ArgMatches, Command};
use log::{info, Level};

use memproxy::config::{ProxyArgs, ProxyConfig};
use memproxy::dummy::DummyChannel;
use memproxy::error::Result;
use memproxy::proxy::Proxy;
use memproxy::types::{size, Address, ProcessAccess};

const FRAME_TIME: Duration = Duration::from_millis(16);

fn main() -> Result<()> {
    let matches = parse_args();
    let log_level = extract_log_level(&matches);

    simplelog::TermLogger::init(
        log_level.to_level_filter(),
        simplelog::Config::default(),
        simplelog::TerminalMode::Stdout,
        simplelog::ColorChoice::Auto,
    )
    .unwrap();

    let latency = Duration::from_millis(*matches.get_one::<u64>("latency").unwrap());
    let frames = *matches.get_one::<usize>("frames").unwrap();
    let view_size = *matches.get_one::<usize>("size").unwrap();
    let address = Address::from(*matches.get_one::<u64>("address").unwrap());

    let args = match matches.get_one::<String>("args") {
        Some(args) => ProxyArgs::parse(args)?,
        None => ProxyArgs::new(),
    };
    let config = ProxyConfig::from_args(&args)?;

    let channel = Arc::new(
        DummyChannel::with_seed(size::mb(2) as usize, 0x1337).with_latency(latency),
    );
    let proxy = Proxy::with_config(channel.clone(), config)?;
    proxy.enable();

    let intercept = proxy.intercept();
    intercept.open_process(ProcessAccess::ALL_ACCESS.bits(), 1234)?;

    let mut expected = vec![0_u8; view_size];
    channel.read_memory(address, &mut expected);

    let mut view = vec![0_u8; view_size];
    for frame in 0..frames {
        let start = Instant::now();
        intercept.read(address, &mut view)?;
        let elapsed = start.elapsed();

        let matching = view
            .iter()
            .zip(expected.iter())
            .filter(|(a, b)| a == b)
            .count();

        println!(
            "frame {:3}: read took {:>8.3?}, {:5}/{} bytes up to date, {} job(s) queued",
            frame,
            elapsed,
            matching,
            view_size,
            proxy.queue().len()
        );

        thread::sleep(FRAME_TIME.saturating_sub(start.elapsed()));
    }

    proxy.disable();
    info!("{} command(s) sent to the remote peer", channel.log().len());

    Ok(())
}

fn parse_args() -> ArgMatches {
    Command::new("loopback example")
        .version(crate_version!())
        .author(crate_authors!())
        .arg(Arg::new("verbose").short('v').action(ArgAction::Count))
        .arg(
            Arg::new("latency")
                .long("latency")
                .short('l')
                .help("round trip latency of the remote peer in milliseconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("50"),
        )
        .arg(
            Arg::new("frames")
                .long("frames")
                .short('f')
                .value_parser(clap::value_parser!(usize))
                .default_value("30"),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .short('a')
                .value_parser(clap::value_parser!(u64))
                .default_value("8176"),
        )
        .arg(
            Arg::new("size")
                .long("size")
                .short('s')
                .value_parser(clap::value_parser!(usize))
                .default_value("256"),
        )
        .arg(
            Arg::new("args")
                .long("args")
                .help("proxy arguments, e.g. freshness_ms=100,write_policy=invalidate")
                .required(false),
        )
        .get_matches()
}

fn extract_log_level(matches: &ArgMatches) -> Level {
    match matches.get_count("verbose") {
        0 => Level::Error,
        1 => Level::Warn,
        2 => Level::Info,
        3 => Level::Debug,
        4 => Level::Trace,
        _ => Level::Trace,
    }
}
