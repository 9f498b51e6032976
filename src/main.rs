// Copyright (c) 2022 Papoo Software & Media GmbH <info@papoo.de>
// SPDX-License-Identifier: LGPL-3.0-or-later

#[macro_use]
extern crate tracing;

use clap::Parser;
use cpurged::{
	Args, Config, EmptyActiveRegistry, FixedWidthCinfoReader, LocalOss, PurgeDriver, ResourceMonitor,
};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signal: libc::c_int) {
	SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
	let handler = SigAction::new(SigHandler::Handler(request_shutdown), SaFlags::empty(), SigSet::empty());
	// Safety: `request_shutdown` only touches an `AtomicBool`, which is async-signal-safe.
	unsafe {
		signal::sigaction(Signal::SIGTERM, &handler).expect("failed to install SIGTERM handler");
		signal::sigaction(Signal::SIGINT, &handler).expect("failed to install SIGINT handler");
	}
}

fn init_logging(verbose: u8) {
	let default_level = match verbose {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	};
	let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

	#[cfg(feature = "systemd")]
	{
		if tracing_journald::layer().is_ok() {
			use tracing_subscriber::layer::SubscriberExt;
			let subscriber = tracing_subscriber::registry()
				.with(filter)
				.with(tracing_journald::layer().expect("journald connection already probed"));
			tracing::subscriber::set_global_default(subscriber).expect("failed to install tracing subscriber");
			return;
		}
	}

	tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() {
	let args = Args::parse();
	init_logging(args.verbose);
	install_signal_handlers();

	let config = match &args.config_file {
		Some(path) => Config::load(path, &args).unwrap_or_else(|error| {
			error!(%error, "failed to load config file, falling back to CLI-derived defaults");
			Config::from_args(&args)
		}),
		None => Config::from_args(&args),
	};

	let oss = LocalOss::new(&config.data_path);

	crossbeam::thread::scope(|scope| {
		scope.spawn(|_| run_daemon(&config, &oss));
	})
	.expect("monitor thread panicked");
}

fn run_daemon(config: &Config, oss: &LocalOss) {
	let mut monitor = ResourceMonitor::new(config, oss);
	if let Err(error) = monitor.initial_scan() {
		error!(%error, "initial namespace scan failed, starting with an empty tree");
	}

	let mut purge_driver = match PurgeDriver::new(config.clone(), oss, FixedWidthCinfoReader, EmptyActiveRegistry) {
		Ok(driver) => driver,
		Err(error) => {
			error!(%error, "failed to initialize purge driver");
			return;
		}
	};

	// Spread this instance's first purge pass across the configured interval,
	// so a fleet of daemons restarted together doesn't all purge in lockstep.
	let startup_jitter = rand::thread_rng().gen_range(0..config.purge_interval_seconds.max(1));
	std::thread::sleep(Duration::from_secs(startup_jitter));

	let mut last_purge = now_unix() - config.purge_interval_seconds as i64;
	while !SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
		let now = now_unix();
		if monitor.due_for_heartbeat(now) {
			monitor.heartbeat(now);
		}
		if now - last_purge >= config.purge_interval_seconds as i64 {
			match purge_driver.run_cycle(&monitor.tree, &monitor.queues, 0, now) {
				Ok(stats) => debug!(?stats, "purge cycle finished"),
				Err(error) => warn!(%error, "purge cycle aborted"),
			}
			last_purge = now;
		}
		std::thread::sleep(Duration::from_millis(500));
	}
	info!("shutdown requested, exiting main loop");
}

fn now_unix() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::SystemTime::UNIX_EPOCH)
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}
