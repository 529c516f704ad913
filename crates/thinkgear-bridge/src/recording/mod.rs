//! # Labelled Recording
//!
//! Drives a stepped recording session on top of a running
//! [`PacketStreamReader`]: wait for the headset, then for every iteration
//! and mode write raw samples labelled with what the subject was cued to
//! do.
//!
//! The host supplies the output ([`SampleSink`]) and the UI
//! ([`RecordingNotifier`]); cancellation goes through a
//! [`CancellationToken`].

pub mod config;
pub mod notifier;
pub mod sink;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Packet, PacketKind};
use crate::reader::{PacketStream, PacketStreamReader};

pub use config::{DEFAULT_RECORDING_CONFIG_FILE, RecordingConfig};
pub use notifier::{Cue, LogNotifier, RecordingNotifier};
pub use sink::{CSV_HEADER, CsvSampleWriter, LabelledSample, SampleSink};

/// Status shown while waiting for the headset.
pub const STATUS_WAITING: &str = "Waiting for connection";
/// Status shown when a status report arrives mid-step.
pub const STATUS_CONNECTION_LOST: &str = "Connection lost";
/// Status shown after the last step.
pub const STATUS_DONE: &str = "Recording done";
/// Status shown when the caller cancels.
pub const STATUS_CANCELLED: &str = "Recording cancelled";

/// Outcome of a completed recording.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingSummary {
    /// CSV file, when written through [`RecordingOrchestrator::run_to_csv`].
    pub path: Option<PathBuf>,
    pub samples_written: u64,
    pub steps_completed: usize,
    /// Status reports seen while recording, each one a "Connection lost".
    pub connection_drops: u64,
}

/// Runs one recording against a started reader.
pub struct RecordingOrchestrator<'r, N> {
    reader: &'r PacketStreamReader,
    config: RecordingConfig,
    notifier: N,
}

impl<'r, N: RecordingNotifier> RecordingOrchestrator<'r, N> {
    pub fn new(reader: &'r PacketStreamReader, config: RecordingConfig, notifier: N) -> Self {
        Self {
            reader,
            config,
            notifier,
        }
    }

    #[must_use]
    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Give back the notifier, e.g. to inspect what it collected.
    pub fn into_notifier(self) -> N {
        self.notifier
    }

    /// Wait until the headset sends anything other than a status report.
    ///
    /// Returns immediately if such a packet already arrived and no status
    /// report came after it.
    ///
    /// # Errors
    /// - [`BridgeError::Cancelled`] if `cancel` fires first.
    /// - [`BridgeError::ConnectionClosed`] if the reader stops first.
    pub async fn wait_for_headset(&mut self, cancel: &CancellationToken) -> BridgeResult<()> {
        self.notifier.status(STATUS_WAITING);
        let mut stream = self.reader.packets();

        let latest_data = PacketKind::ALL
            .into_iter()
            .filter(|kind| *kind != PacketKind::Status)
            .filter_map(|kind| self.reader.get_latest(kind))
            .map(|latest| latest.sequence)
            .max();
        let latest_status = self
            .reader
            .get_latest(PacketKind::Status)
            .map(|latest| latest.sequence);
        if latest_data.is_some_and(|data| latest_status.is_none_or(|status| data > status)) {
            return Ok(());
        }

        loop {
            let packet = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(BridgeError::Cancelled),
                packet = stream.recv() => packet,
            };
            match packet {
                Some(packet) if packet.is_headset_data() => {
                    tracing::info!(kind = %packet.kind(), "Headset connected");
                    return Ok(());
                }
                Some(_) => {}
                None => return Err(BridgeError::closed("reader stopped before the headset connected")),
            }
        }
    }

    /// Record every step into `sink`.
    ///
    /// # Errors
    /// - [`BridgeError::ConfigError`] if the settings are invalid or the
    ///   reader does not request raw output.
    /// - [`BridgeError::Cancelled`] if `cancel` fires.
    /// - [`BridgeError::ConnectionClosed`] if the reader stops mid-recording.
    /// - Any error from `sink`.
    pub async fn run<S: SampleSink>(
        &mut self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> BridgeResult<RecordingSummary> {
        self.config.validate()?;
        if !self.reader.config().enable_raw_output {
            return Err(BridgeError::ConfigError {
                reason: "recording needs raw output enabled".into(),
            });
        }

        let result = match self.wait_for_headset(cancel).await {
            Ok(()) => self.record_steps(sink, cancel).await,
            Err(e) => Err(e),
        };
        let flushed = sink.flush();
        self.notifier.cue(&Cue::None);

        match result {
            Ok(summary) => {
                flushed?;
                self.notifier.status(STATUS_DONE);
                tracing::info!(
                    samples = summary.samples_written,
                    steps = summary.steps_completed,
                    "Recording finished"
                );
                Ok(summary)
            }
            Err(e) => {
                if matches!(e, BridgeError::Cancelled) {
                    self.notifier.status(STATUS_CANCELLED);
                }
                tracing::warn!(error = %e, "Recording aborted");
                Err(e)
            }
        }
    }

    /// Record into a new `raw-<timestamp>.csv` under `output_dir`.
    ///
    /// # Errors
    /// Same as [`run`](Self::run), plus file creation errors.
    pub async fn run_to_csv(
        &mut self,
        output_dir: &Path,
        cancel: &CancellationToken,
    ) -> BridgeResult<RecordingSummary> {
        let (mut writer, path) = CsvSampleWriter::create_in(output_dir)?;
        let mut summary = self.run(&mut writer, cancel).await?;
        summary.path = Some(path);
        Ok(summary)
    }

    async fn record_steps<S: SampleSink>(
        &mut self,
        sink: &mut S,
        cancel: &CancellationToken,
    ) -> BridgeResult<RecordingSummary> {
        let mut summary = RecordingSummary::default();
        let started = Instant::now();
        let total = self.config.total_steps();
        let modes = self.config.modes.clone();
        let mut step = 0;

        for iteration in 0..self.config.iterations {
            for mode in &modes {
                step += 1;
                tracing::debug!(iteration, step, %mode, "Recording step");
                self.notifier
                    .status(&format!("Recording data: {mode} ({step} / {total})"));

                // New subscription per step: nothing queued during the pause is recorded.
                let mut stream = self.reader.packets();
                let baseline = self.config.baseline_label.clone();
                self.collect(
                    &mut stream,
                    self.config.samples_before,
                    &baseline,
                    started,
                    sink,
                    cancel,
                    &mut summary,
                )
                .await?;

                self.notifier.cue(&Cue::Mode(mode.clone()));
                self.collect(
                    &mut stream,
                    self.config.samples_after,
                    mode,
                    started,
                    sink,
                    cancel,
                    &mut summary,
                )
                .await?;
                drop(stream);

                summary.steps_completed += 1;
                sink.flush()?;
                self.pause(cancel).await?;
            }
        }

        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    async fn collect<S: SampleSink>(
        &mut self,
        stream: &mut PacketStream,
        count: u32,
        label: &str,
        started: Instant,
        sink: &mut S,
        cancel: &CancellationToken,
        summary: &mut RecordingSummary,
    ) -> BridgeResult<()> {
        let mut written = 0;
        while written < count {
            let packet = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(BridgeError::Cancelled),
                packet = stream.recv() => packet,
            };
            match packet {
                Some(Packet::Raw(raw)) => {
                    let time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    sink.write_sample(&LabelledSample {
                        time_ms,
                        raw_eeg: raw.raw_eeg,
                        label: label.to_string(),
                    })?;
                    written += 1;
                    summary.samples_written += 1;
                }
                Some(Packet::Status(status)) => {
                    tracing::warn!(status = %status.status, "Headset connection lost during recording");
                    summary.connection_drops += 1;
                    self.notifier.status(STATUS_CONNECTION_LOST);
                }
                Some(_) => {}
                None => return Err(BridgeError::closed("reader stopped during recording")),
            }
        }
        Ok(())
    }

    async fn pause(&mut self, cancel: &CancellationToken) -> BridgeResult<()> {
        if self.config.pause_ms == 0 {
            return Ok(());
        }
        self.notifier.cue(&Cue::None);
        tokio::select! {
            () = cancel.cancelled() => Err(BridgeError::Cancelled),
            () = tokio::time::sleep(Duration::from_millis(self.config.pause_ms)) => Ok(()),
        }
    }
}
