use std::path::Path;

use colored::Colorize;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use thinkgear_bridge::protocol::POOR_SIGNAL_THRESHOLD;
use thinkgear_bridge::{
    BridgeConfig, BridgeError, BridgeResult, Packet, PacketStreamReader, RecordingConfig,
    RecordingOrchestrator, StopReason,
};

use crate::terminal::TerminalNotifier;

// ─── Record ─────────────────────────────────────────────────────────────

pub async fn record(
    config: BridgeConfig,
    output_dir: &Path,
    recording_config: &Path,
    cancel: &CancellationToken,
) -> BridgeResult<()> {
    let recording = RecordingConfig::load_or_default(recording_config);
    tracing::debug!(?recording, path = %recording_config.display(), "Recording settings");
    println!(
        "Modes: {} × {} iteration(s), {} baseline + {} samples per step",
        recording.modes.join(", ").cyan(),
        recording.iterations,
        recording.samples_before,
        recording.samples_after,
    );

    let reader = start_reader(config, cancel).await?;
    let mut orchestrator = RecordingOrchestrator::new(&reader, recording, TerminalNotifier);
    let result = orchestrator.run_to_csv(output_dir, cancel).await;
    reader.shutdown().await;

    match result {
        Ok(summary) => {
            println!(
                "{} {} samples in {} steps",
                "Saved".green(),
                summary.samples_written,
                summary.steps_completed,
            );
            if let Some(path) = summary.path {
                println!("  {}", path.display().to_string().cyan());
            }
            if summary.connection_drops > 0 {
                println!(
                    "{} headset dropped {} time(s) during recording",
                    "Warning:".yellow(),
                    summary.connection_drops
                );
            }
            Ok(())
        }
        Err(BridgeError::Cancelled) => {
            println!("{}", "Recording cancelled, partial file kept.".yellow());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

// ─── Monitor ────────────────────────────────────────────────────────────

pub async fn monitor(
    config: BridgeConfig,
    show_raw: bool,
    cancel: &CancellationToken,
) -> BridgeResult<()> {
    let reader = start_reader(config, cancel).await?;
    let mut packets = reader.packets();
    println!("{}", "Streaming packets... (Ctrl+C to stop)".green());

    let mut raw_count = 0_u64;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            item = packets.next() => {
                let Some(packet) = item else { break };
                if let Packet::Raw(_) = packet {
                    raw_count += 1;
                    if !show_raw {
                        continue;
                    }
                }
                print_packet(&packet, raw_count);
            }
        }
    }
    drop(packets);

    let stats = reader.stats();
    let reason = reader.shutdown().await;
    tracing::debug!(?reason, ?stats, raw_count, "Monitor finished");
    match reason {
        StopReason::Requested => println!("{}", "Monitor stopped.".yellow()),
        StopReason::ConnectionClosed { reason } | StopReason::StartFailed { reason } => {
            println!("{} {reason}", "Connector went away:".red());
        }
    }
    println!(
        "{} packets decoded, {} undecodable lines skipped",
        stats.packets_decoded, stats.decode_errors
    );
    Ok(())
}

fn print_packet(packet: &Packet, raw_count: u64) {
    match packet {
        Packet::Status(status) => {
            println!(
                "{} {} (signal {})",
                "[status]".dimmed(),
                status.status,
                status.poor_signal_level
            );
        }
        Packet::Processed(data) => {
            let signal = if data.poor_signal_level > POOR_SIGNAL_THRESHOLD {
                format!("poor signal {}, check fitting", data.poor_signal_level)
                    .red()
                    .to_string()
            } else {
                format!("signal {}", data.poor_signal_level).green().to_string()
            };
            let power = data.eeg_power;
            println!(
                "{} attention {:>3}  meditation {:>3}  {}",
                "[esense]".cyan(),
                data.attention(),
                data.meditation(),
                signal
            );
            println!(
                "          δ {} θ {} α {}/{} β {}/{} γ {}/{}",
                power.delta,
                power.theta,
                power.low_alpha,
                power.high_alpha,
                power.low_beta,
                power.high_beta,
                power.low_gamma,
                power.high_gamma
            );
        }
        Packet::Blink(blink) => {
            println!("{} strength {}", "[blink]".magenta(), blink.blink_strength);
        }
        Packet::MentalEffort(effort) => {
            println!("{} {:.3}", "[mental effort]".blue(), effort.mental_effort);
        }
        Packet::Familiarity(familiarity) => {
            println!("{} {:.3}", "[familiarity]".blue(), familiarity.familiarity);
        }
        Packet::Raw(raw) => println!("{} #{raw_count} {}", "[raw]".dimmed(), raw.raw_eeg),
    }
}

async fn start_reader(
    config: BridgeConfig,
    cancel: &CancellationToken,
) -> BridgeResult<PacketStreamReader> {
    let reader = PacketStreamReader::new(config);
    let started = tokio::select! {
        () = cancel.cancelled() => {
            reader.close();
            return Err(BridgeError::Cancelled);
        }
        started = reader.start() => started,
    };
    if let Err(e) = started {
        tracing::error!(error = %e, "Could not start packet reader");
        eprintln!("{} {e}", "Connection failed:".red());
        eprintln!("Make sure the ThinkGear Connector is running and the headset is paired.");
        return Err(e);
    }
    println!("{}", "Connected!".green());
    Ok(reader)
}
