//! Shared FFmpeg/FFprobe process runner.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::{MediaInfo, ProcessorError};

/// Configuration for processors that shell out to ffmpeg.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Timeout for a single ffmpeg invocation in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Additional arguments inserted before the output path.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_timeout() -> u64 {
    600 // 10 minutes
}

fn default_log_level() -> String {
    "error".to_string()
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_timeout(),
            log_level: default_log_level(),
            extra_args: Vec::new(),
        }
    }
}

/// Spawns ffmpeg/ffprobe with captured stderr and a hard timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    config: FfmpegConfig,
}

impl FfmpegRunner {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(FfmpegConfig::default())
    }

    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }

    /// Leading arguments shared by every invocation: overwrite, log level.
    pub fn global_args(&self) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            self.config.log_level.clone(),
        ]
    }

    /// Appends configured extra arguments and the output path.
    pub fn finish_args(&self, mut args: Vec<String>, output: &Path) -> Vec<String> {
        args.extend(self.config.extra_args.iter().cloned());
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Run ffmpeg to completion. Non-zero exit and timeouts are errors; on
    /// timeout the child is killed.
    pub async fn run(&self, args: &[String]) -> Result<(), ProcessorError> {
        debug!(ffmpeg = %self.config.ffmpeg_path.display(), ?args, "Running ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ProcessorError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    ProcessorError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProcessorError::failed("ffmpeg stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut error_output = String::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if !line.trim().is_empty() {
                    error_output.push_str(&line);
                    error_output.push('\n');
                }
            }

            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, error_output))
        })
        .await;

        match result {
            Ok(Ok((status, error_output))) => {
                if !status.success() {
                    return Err(ProcessorError::failed(
                        format!("FFmpeg exited with code: {:?}", status.code()),
                        if error_output.is_empty() {
                            None
                        } else {
                            Some(error_output)
                        },
                    ));
                }
                Ok(())
            }
            Ok(Err(e)) => Err(ProcessorError::Io(e)),
            Err(_) => {
                // Kill the process on timeout
                let _ = child.kill().await;
                Err(ProcessorError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                })
            }
        }
    }

    /// Inspect a media file with ffprobe.
    pub async fn probe(&self, path: &Path) -> Result<MediaInfo, ProcessorError> {
        if !path.exists() {
            return Err(ProcessorError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = timeout(
            Duration::from_secs(self.config.timeout_secs),
            Command::new(&self.config.ffprobe_path)
                .args([
                    "-v",
                    "quiet",
                    "-print_format",
                    "json",
                    "-show_format",
                    "-show_streams",
                ])
                .arg(path)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| ProcessorError::Timeout {
            timeout_secs: self.config.timeout_secs,
        })?
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessorError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                }
            } else {
                ProcessorError::Io(e)
            }
        })?;

        if !output.status.success() {
            return Err(ProcessorError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(&stdout)
    }

    /// Check that both binaries can be executed.
    pub async fn validate(&self) -> Result<(), ProcessorError> {
        for (path, is_ffmpeg) in [
            (&self.config.ffmpeg_path, true),
            (&self.config.ffprobe_path, false),
        ] {
            if let Err(e) = Command::new(path).arg("-version").output().await {
                if e.kind() == std::io::ErrorKind::NotFound {
                    return Err(if is_ffmpeg {
                        ProcessorError::FfmpegNotFound { path: path.clone() }
                    } else {
                        ProcessorError::FfprobeNotFound { path: path.clone() }
                    });
                }
                return Err(ProcessorError::Io(e));
            }
        }
        Ok(())
    }

    /// Parses ffprobe JSON output into MediaInfo.
    pub fn parse_probe_output(output: &str) -> Result<MediaInfo, ProcessorError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            #[serde(default)]
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
            size: Option<String>,
            bit_rate: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
            r_frame_rate: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| ProcessorError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        Ok(MediaInfo {
            format: format_name.to_string(),
            duration_secs: probe
                .format
                .duration
                .as_ref()
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(0.0),
            size_bytes: probe
                .format
                .size
                .as_ref()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0),
            bit_rate: probe
                .format
                .bit_rate
                .as_ref()
                .and_then(|b| b.parse::<u64>().ok()),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            width: video_stream.and_then(|s| s.width),
            height: video_stream.and_then(|s| s.height),
            fps: video_stream
                .and_then(|s| s.r_frame_rate.as_deref())
                .and_then(parse_frame_rate),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
        })
    }
}

/// Parse a frame rate like "24000/1001" or "30".
fn parse_frame_rate(rate: &str) -> Option<f32> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f32>().ok()?;
            let den = den.parse::<f32>().ok()?;
            if den > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
        None => rate.parse::<f32>().ok(),
    }
}
