//! AdbDevice: Android capture and input through the `adb` command-line tool.
//!
//! | Operation        | Command                                                    |
//! |------------------|------------------------------------------------------------|
//! | connect          | `adb connect <addr>`                                       |
//! | video stream     | `adb -s <addr> exec-out screenrecord --output-format=h264 -` piped into `ffmpeg ... -f image2pipe -vcodec mjpeg pipe:1` |
//! | still            | `adb -s <addr> exec-out screencap -p`                      |
//! | tap              | `adb -s <addr> shell input tap <x> <y>`                    |
//! | key              | `adb -s <addr> shell input keyevent <code>`                |
//! | install          | `adb -s <addr> install -r <path>`                          |

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use mirror_core::DevicePoint;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};
use tracing::{debug, info};

use crate::application::device::{AndroidCapture, AndroidInput, ChunkStream, DeviceError};
use crate::domain::config::{AndroidDeviceConfig, CaptureSettings};
use crate::infrastructure::process::{command, run_text, run_with_timeout, spawn};

/// Transcoder arguments: H.264 elementary stream on stdin, MJPEG on stdout.
const TRANSCODE_ARGS: [&str; 14] = [
    "-loglevel", "error", "-f", "h264", "-i", "pipe:0", "-f", "image2pipe", "-vcodec", "mjpeg",
    "-q:v", "5", "-an", "pipe:1",
];

/// One Android device addressed through `adb -s <address>`.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb: String,
    ffmpeg: String,
    address: String,
    settings: CaptureSettings,
}

/// Both halves of a running video pipeline.  Dropping it kills both children.
struct VideoPipe {
    _record: Child,
    _transcoder: Child,
    output: ChildStdout,
    program: String,
    chunk: usize,
}

impl AdbDevice {
    pub fn new(config: &AndroidDeviceConfig, settings: CaptureSettings) -> Self {
        Self {
            adb: config.adb.clone(),
            ffmpeg: config.ffmpeg.clone(),
            address: config.address.clone(),
            settings,
        }
    }

    fn device_args<'a>(&'a self, rest: &[&'a str]) -> Vec<&'a str> {
        let mut args = vec!["-s", self.address.as_str()];
        args.extend_from_slice(rest);
        args
    }

    async fn shell_input(&self, input: &[&str]) -> Result<(), DeviceError> {
        let mut rest = vec!["shell", "input"];
        rest.extend_from_slice(input);
        run_with_timeout(&self.adb, self.device_args(&rest), self.settings.command_timeout()).await?;
        Ok(())
    }
}

#[async_trait]
impl AndroidCapture for AdbDevice {
    async fn connect(&self) -> Result<(), DeviceError> {
        let output = run_text(
            &self.adb,
            ["connect", self.address.as_str()],
            self.settings.command_timeout(),
        )
        .await?;
        // adb reports connection failures on stdout with a zero exit status.
        if output.contains("connected to") {
            debug!("adb: {}", output.trim());
            Ok(())
        } else {
            Err(DeviceError::Exit {
                program: self.adb.clone(),
                status: "connect refused".to_string(),
                stderr: output.trim().to_string(),
            })
        }
    }

    async fn open_video_stream(&self) -> Result<ChunkStream<DeviceError>, DeviceError> {
        let mut record_cmd = command(
            &self.adb,
            self.device_args(&["exec-out", "screenrecord", "--output-format=h264", "-"]),
        );
        record_cmd.stderr(Stdio::null());
        let mut record = spawn(&self.adb, &mut record_cmd)?;

        let record_out = record.stdout.take().ok_or_else(|| DeviceError::EmptyOutput {
            program: self.adb.clone(),
        })?;
        let record_out = TryInto::<Stdio>::try_into(record_out).map_err(|source| DeviceError::Io {
            program: self.adb.clone(),
            source,
        })?;

        let mut transcode_cmd = command(&self.ffmpeg, TRANSCODE_ARGS);
        transcode_cmd.stdin(record_out).stderr(Stdio::null());
        let mut transcoder = spawn(&self.ffmpeg, &mut transcode_cmd)?;

        let output = transcoder.stdout.take().ok_or_else(|| DeviceError::EmptyOutput {
            program: self.ffmpeg.clone(),
        })?;
        info!("adb: video pipeline started for {}", self.address);

        let pipe = VideoPipe {
            _record: record,
            _transcoder: transcoder,
            output,
            program: self.ffmpeg.clone(),
            chunk: self.settings.turbo_read_chunk.max(1),
        };

        let stream = futures_util::stream::unfold(Some(pipe), |state| async move {
            let mut pipe = state?;
            let mut buf = BytesMut::zeroed(pipe.chunk);
            match pipe.output.read(&mut buf).await {
                // EOF: the transcoder exited.
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(buf.freeze()), Some(pipe)))
                }
                Err(source) => {
                    let program = pipe.program.clone();
                    Some((Err(DeviceError::Io { program, source }), None))
                }
            }
        });
        Ok(Box::pin(stream))
    }

    async fn capture_still(&self) -> Result<Bytes, DeviceError> {
        let png = run_with_timeout(
            &self.adb,
            self.device_args(&["exec-out", "screencap", "-p"]),
            self.settings.compat_timeout(),
        )
        .await?;
        if png.is_empty() {
            return Err(DeviceError::EmptyOutput {
                program: self.adb.clone(),
            });
        }
        Ok(Bytes::from(png))
    }
}

#[async_trait]
impl AndroidInput for AdbDevice {
    async fn tap(&self, point: DevicePoint) -> Result<(), DeviceError> {
        let (x, y) = (point.x.to_string(), point.y.to_string());
        self.shell_input(&["tap", &x, &y]).await
    }

    async fn key_event(&self, code: u32) -> Result<(), DeviceError> {
        let code = code.to_string();
        self.shell_input(&["keyevent", &code]).await
    }

    async fn install(&self, package: &Path) -> Result<String, DeviceError> {
        let args: [&OsStr; 5] = [
            "-s".as_ref(),
            self.address.as_ref(),
            "install".as_ref(),
            "-r".as_ref(),
            package.as_os_str(),
        ];
        run_text(&self.adb, args, self.settings.install_timeout()).await
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
