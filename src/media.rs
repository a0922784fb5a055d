//! Media Toolkit Facade (C1): wraps an external `ffmpeg`-compatible binary
//! for duration probing, audio extraction/splitting, and keyframe/dense
//! frame sampling.
//!
//! Every operation is wall-clock-seek driven (`-ss <seconds>`) so that an
//! emitted frame's timestamp is reconstructable from its filename/index
//! without re-probing the source, per spec's rationale for C1. Commands and
//! timeouts are ported from
//! `original_source/Backend/utils/ffmpeg_utils.py:FFmpegUtils`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use regex::Regex;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::warn;

use crate::error::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const AUDIO_OP_TIMEOUT: Duration = Duration::from_secs(300);
const PER_FRAME_TIMEOUT: Duration = Duration::from_secs(60);
const DENSE_WINDOW_TIMEOUT: Duration = Duration::from_secs(120);

/// A thin async facade over an `ffmpeg` binary on `$PATH` (or an explicit
/// path), offloading every call to `tokio::process::Command` under a
/// per-call timeout.
#[derive(Debug, Clone)]
pub struct MediaToolkit {
    ffmpeg_bin: PathBuf,
}

impl Default for MediaToolkit {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
        }
    }
}

impl MediaToolkit {
    pub fn new(ffmpeg_bin: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
        }
    }

    async fn run(&self, args: &[&str], call_timeout: Duration) -> Result<std::process::Output> {
        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = timeout(call_timeout, cmd.output())
            .await
            .map_err(|_| Error::msg(format!("ffmpeg call timed out after {call_timeout:?}")))?
            .map_err(|err| Error::msg(format!("failed to spawn ffmpeg: {err}")))?;
        Ok(output)
    }

    /// Probe a video/audio file's duration by parsing ffmpeg's stderr
    /// `Duration: HH:MM:SS.ms` line. Non-fatal: returns `0.0` on any
    /// parse/spawn failure so callers don't fail a job over a probe.
    pub async fn probe_duration(&self, path: impl AsRef<Path>) -> f64 {
        let path_str = path.as_ref().to_string_lossy().into_owned();
        let output = match self.run(&["-i", &path_str], PROBE_TIMEOUT).await {
            Ok(output) => output,
            Err(err) => {
                warn!(%err, path = %path_str, "probe_duration failed to run ffmpeg");
                return 0.0;
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_duration(&stderr).unwrap_or_else(|| {
            warn!(path = %path_str, "could not parse duration from ffmpeg output");
            0.0
        })
    }

    /// Extract mono 16-bit PCM audio at the configured sample rate. Fatal
    /// only if ffmpeg itself returns non-zero.
    pub async fn extract_audio(
        &self,
        video: impl AsRef<Path>,
        out: impl AsRef<Path>,
        sample_rate_hz: u32,
    ) -> Result<PathBuf> {
        let video_str = video.as_ref().to_string_lossy().into_owned();
        let out_str = out.as_ref().to_string_lossy().into_owned();
        let sample_rate_str = sample_rate_hz.to_string();

        let output = self
            .run(
                &[
                    "-i",
                    &video_str,
                    "-vn",
                    "-acodec",
                    "pcm_s16le",
                    "-ar",
                    &sample_rate_str,
                    "-ac",
                    "1",
                    "-y",
                    &out_str,
                ],
                AUDIO_OP_TIMEOUT,
            )
            .await?;

        if !output.status.success() {
            return Err(Error::msg(format!(
                "ffmpeg extract_audio failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(out.as_ref().to_path_buf())
    }

    /// Split an audio file into overlapping chunks via stream copy (no
    /// re-encode). Stride is `chunk_s - overlap_s`; the last chunk may be
    /// shorter than `chunk_s`.
    pub async fn split_audio(
        &self,
        path: impl AsRef<Path>,
        chunk_s: f64,
        overlap_s: f64,
    ) -> Result<Vec<(PathBuf, f64, f64)>> {
        let path = path.as_ref();
        let duration = self.probe_duration(path).await;
        let base = path.with_extension("");
        let base_str = base.to_string_lossy().into_owned();
        let path_str = path.to_string_lossy().into_owned();

        let mut chunks = Vec::new();
        let mut current = 0.0f64;
        let mut idx = 0usize;
        while current < duration {
            let end = (current + chunk_s).min(duration);
            let chunk_path = PathBuf::from(format!("{base_str}_chunk_{idx}.wav"));
            let chunk_path_str = chunk_path.to_string_lossy().into_owned();
            let dur_arg = (end - current).to_string();
            let start_arg = current.to_string();

            let output = self
                .run(
                    &[
                        "-i",
                        &path_str,
                        "-ss",
                        &start_arg,
                        "-t",
                        &dur_arg,
                        "-acodec",
                        "copy",
                        "-y",
                        &chunk_path_str,
                    ],
                    AUDIO_OP_TIMEOUT,
                )
                .await?;

            if !output.status.success() {
                return Err(Error::msg(format!(
                    "ffmpeg split_audio chunk {idx} failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                )));
            }

            chunks.push((chunk_path, current, end));
            current += chunk_s - overlap_s;
            idx += 1;
        }
        Ok(chunks)
    }

    /// One JPEG at every `interval_s` boundary starting at `0`, up to and
    /// including the source duration. Per-frame failures are tolerated
    /// (skipped), matching the facade's "coarse sample" tolerance.
    pub async fn extract_keyframes(
        &self,
        video: impl AsRef<Path>,
        dir: impl AsRef<Path>,
        interval_s: f64,
    ) -> Result<Vec<(PathBuf, f64)>> {
        let video = video.as_ref();
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| Error::msg(format!("failed to create frames dir: {err}")))?;

        let duration = self.probe_duration(video).await;
        let video_str = video.to_string_lossy().into_owned();

        let mut frames = Vec::new();
        let mut current = 0.0f64;
        let mut idx = 0usize;
        while current <= duration {
            let frame_path = dir.join(format!("frame_{idx:04}.jpg"));
            let frame_path_str = frame_path.to_string_lossy().into_owned();
            let ss_arg = current.to_string();

            let result = self
                .run(
                    &[
                        "-ss",
                        &ss_arg,
                        "-i",
                        &video_str,
                        "-frames:v",
                        "1",
                        "-q:v",
                        "2",
                        "-y",
                        &frame_path_str,
                    ],
                    PER_FRAME_TIMEOUT,
                )
                .await;

            match result {
                Ok(output) if output.status.success() => {
                    frames.push((frame_path, current));
                    idx += 1;
                }
                Ok(output) => {
                    warn!(
                        timestamp_s = current,
                        stderr = %String::from_utf8_lossy(&output.stderr),
                        "keyframe extraction failed, skipping"
                    );
                }
                Err(err) => {
                    warn!(timestamp_s = current, %err, "keyframe extraction errored, skipping");
                }
            }
            current += interval_s;
        }
        Ok(frames)
    }

    /// Sample at `fps` inside each `(start, end)` window, one `ffmpeg`
    /// invocation per window so timestamps never collide across windows.
    /// Each emitted file's timestamp is `start + (frame_index - 1) / fps`.
    pub async fn extract_dense_frames(
        &self,
        video: impl AsRef<Path>,
        dir: impl AsRef<Path>,
        windows: &[(f64, f64)],
        fps: f64,
    ) -> Result<Vec<(PathBuf, f64)>> {
        let video = video.as_ref();
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|err| Error::msg(format!("failed to create frames dir: {err}")))?;

        let video_str = video.to_string_lossy().into_owned();
        let mut all_frames = Vec::new();

        for (window_idx, &(start, end)) in windows.iter().enumerate() {
            let span = end - start;
            if span <= 0.0 {
                continue;
            }

            let pattern = dir.join(format!("win_{window_idx}_%04d.jpg"));
            let pattern_str = pattern.to_string_lossy().into_owned();
            let start_arg = start.to_string();
            let dur_arg = span.to_string();
            let fps_filter = format!("fps={fps}");

            let output = self
                .run(
                    &[
                        "-ss",
                        &start_arg,
                        "-t",
                        &dur_arg,
                        "-i",
                        &video_str,
                        "-vf",
                        &fps_filter,
                        "-q:v",
                        "2",
                        "-y",
                        &pattern_str,
                    ],
                    DENSE_WINDOW_TIMEOUT,
                )
                .await;

            let output = match output {
                Ok(output) if output.status.success() => output,
                Ok(output) => {
                    warn!(
                        start, end,
                        stderr = %String::from_utf8_lossy(&output.stderr),
                        "dense frame extraction failed for window"
                    );
                    continue;
                }
                Err(err) => {
                    warn!(start, end, %err, "dense frame extraction errored for window");
                    continue;
                }
            };
            drop(output);

            let prefix = format!("win_{window_idx}_");
            let mut read_dir = tokio::fs::read_dir(dir)
                .await
                .map_err(|err| Error::msg(format!("failed to list frames dir: {err}")))?;
            let mut window_files = Vec::new();
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|err| Error::msg(format!("failed to read frames dir entry: {err}")))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with(&prefix) && name.ends_with(".jpg") {
                    window_files.push(entry.path());
                }
            }
            window_files.sort();

            for path in window_files {
                let Some(frame_num) = parse_frame_number(&path) else {
                    continue;
                };
                let timestamp = start + (frame_num as f64 - 1.0) / fps;
                all_frames.push((path, timestamp));
            }
        }

        all_frames.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        Ok(all_frames)
    }
}

fn parse_duration(ffmpeg_stderr: &str) -> Option<f64> {
    let re = Regex::new(r"Duration: (\d+):(\d+):(\d+\.\d+)").ok()?;
    let caps = re.captures(ffmpeg_stderr)?;
    let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: f64 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: f64 = caps.get(3)?.as_str().parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn parse_frame_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_string_lossy().into_owned();
    let last = stem.rsplit('_').next()?;
    last.parse().ok()
}

/// Render seconds as `HH:MM:SS`, matching `ffmpeg_utils.py:format_timestamp`.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0) as u64;
    let minutes = ((seconds % 3600.0) / 60.0) as u64;
    let secs = (seconds % 60.0) as u64;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_reads_ffmpeg_stderr_format() {
        let stderr = "Input #0, mov,mp4,m4a,3gp,3g2,mj2\n  Duration: 00:12:34.56, start: 0.0";
        assert_eq!(parse_duration(stderr), Some(12.0 * 60.0 + 34.56));
    }

    #[test]
    fn parse_duration_returns_none_when_absent() {
        assert_eq!(parse_duration("no duration line here"), None);
    }

    #[test]
    fn parse_frame_number_reads_trailing_underscore_segment() {
        assert_eq!(
            parse_frame_number(Path::new("/tmp/win_0_0007.jpg")),
            Some(7)
        );
    }

    #[test]
    fn format_timestamp_matches_reference() {
        assert_eq!(format_timestamp(0.0), "00:00:00");
        assert_eq!(format_timestamp(3661.0), "01:01:01");
        assert_eq!(format_timestamp(59.9), "00:00:59");
    }
}
