//! framegate - wait for a camera, configure it and save every streamed frame as PNG.
//!
//! Device settings are snapshotted before configuration and restored when streaming ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use framegate::virtual_camera::VirtualSystem;
use framegate::{
    acquire_device, run_stream, Device, DeviceProvider, NodeSnapshot, PngSink, SplitChannelSink,
    StreamSummary,
};

use crate::cli::Args;
use crate::config::RunConfig;

mod cli;
mod config;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = RunConfig::load(&args)?;

    log::warn!("this program changes settings on the device, they are restored when streaming ends");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            log::info!("Ctrl-C received, stopping after the current frame");
            stop.store(true, Ordering::Relaxed);
        })
        .context("error setting Ctrl-C handler")?;
    }

    let mut system = VirtualSystem::new(config.virtual_camera.clone());
    let result = run(&mut system, &config, &stop);
    system
        .destroy_all_devices()
        .context("failed to destroy devices")?;

    let summary = result?;
    log::info!(
        "saved {} frame(s) to {} ({} skipped, {:.2} fps)",
        summary.delivered,
        config.output.dir.display(),
        summary.skipped,
        summary.mean_fps()
    );
    Ok(())
}

fn run<P: DeviceProvider>(
    provider: &mut P,
    config: &RunConfig,
    stop: &AtomicBool,
) -> Result<StreamSummary> {
    let mut device =
        acquire_device(provider, config.acquire, |_| {}).context("no device to stream from")?;
    let info = device.info();
    log::info!(
        "using {} {} (serial {})",
        info.vendor_name,
        info.model_name,
        info.serial_number
    );
    run_on(&mut device, config, stop)
}

/// Snapshots the device, configures it, streams, then puts the snapshot back.
fn run_on<D: Device>(
    device: &mut D,
    config: &RunConfig,
    stop: &AtomicBool,
) -> Result<StreamSummary> {
    let device_nodes = NodeSnapshot::capture(device.node_map(), &NodeSnapshot::DEVICE_NODES)
        .context("failed to read the current device settings")?;
    let stream_nodes = NodeSnapshot::capture(device.stream_node_map(), &NodeSnapshot::STREAM_NODES)
        .context("failed to read the current stream settings")?;

    let streamed = configure_and_stream(device, config, stop);

    let restored = match (
        device_nodes.restore(device.node_map()),
        stream_nodes.restore(device.stream_node_map()),
    ) {
        (Ok(device), Ok(stream)) => Ok(device + stream),
        (Err(err), _) | (_, Err(err)) => Err(err),
    };
    finish(streamed, restored)
}

/// A streaming error is reported ahead of a failed restore, which is only logged then.
fn finish(
    streamed: Result<StreamSummary>,
    restored: framegate::Result<usize>,
) -> Result<StreamSummary> {
    match restored {
        Ok(restored) => log::info!("restored {restored} device setting(s)"),
        Err(err) if streamed.is_err() => log::error!("failed to restore device settings: {err}"),
        Err(err) => return Err(err).context("failed to restore device settings"),
    }
    streamed
}

fn configure_and_stream<D: Device>(
    device: &mut D,
    config: &RunConfig,
    stop: &AtomicBool,
) -> Result<StreamSummary> {
    let applied = config
        .capture
        .apply(device)
        .context("failed to configure the device")?;
    let order = applied.pixel_format.channel_order();

    let output = &config.output;
    let frames = PngSink::new(&output.dir, &output.prefix)?.with_channel_order(order);
    let channels = if output.split_channels {
        let dir = output.dir.join("channels");
        Some(SplitChannelSink::new(dir, &output.prefix)?.with_channel_order(order))
    } else {
        None
    };
    log::info!(
        "streaming {}x{} {} into {}",
        applied.width,
        applied.height,
        applied.pixel_format,
        output.dir.display()
    );

    let mut sink = (frames, channels);
    let summary = run_stream(device, &config.stream, &mut sink, stop)?;
    Ok(summary)
}
