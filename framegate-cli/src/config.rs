use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use framegate::virtual_camera::VirtualCameraConfig;
use framegate::{CaptureSettings, RetryBudget, SensorMode, StreamOptions};
use serde::Deserialize;

use crate::cli::{Args, ModeArg};

const DEFAULT_BINNING: u32 = 2;
const DEFAULT_CROP: (u32, u32) = (400, 400);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub prefix: String,
    pub split_channels: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("captured_images"),
            prefix: "original".to_string(),
            split_channels: false,
        }
    }
}

/// Contents of the `--config` file, every table is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub capture: CaptureSettings,
    pub stream: StreamOptions,
    pub acquire: RetryBudget,
    pub output: OutputConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

/// Settings of one run: defaults, overridden by the config file, overridden by flags.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub capture: CaptureSettings,
    pub stream: StreamOptions,
    pub acquire: RetryBudget,
    pub output: OutputConfig,
    pub virtual_camera: VirtualCameraConfig,
}

impl RunConfig {
    pub fn load(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(file, args)
    }

    pub fn merge(file: FileConfig, args: &Args) -> Result<Self> {
        let FileConfig {
            mut capture,
            mut stream,
            mut acquire,
            mut output,
        } = file;

        capture.mode = sensor_mode(capture.mode, args)?;
        if let Some(format) = args.pixel_format {
            capture.pixel_format = format;
        }
        if let Some(fps) = args.fps {
            capture.frame_rate = Some(fps);
        }
        if let Some(exposure) = args.exposure {
            capture.exposure = exposure;
        }

        if let Some(frames) = args.frames {
            stream.max_frames = Some(frames);
        }
        // 0 frames streams until stopped
        stream.max_frames = stream.max_frames.filter(|frames| *frames > 0);
        if let Some(buffers) = args.buffers {
            stream.buffer_pool = buffers;
        }
        if let Some(timeout_ms) = args.timeout_ms {
            stream.timeout_ms = Some(timeout_ms);
        }
        if let Some(failures) = args.max_consecutive_failures {
            stream.max_consecutive_failures = Some(failures);
        }
        stream.expected_format = Some(capture.pixel_format);

        if let Some(tries) = args.tries {
            acquire.max_attempts = tries;
        }
        if let Some(wait_secs) = args.wait_secs {
            acquire.wait_secs = wait_secs;
        }
        if acquire.max_attempts == 0 {
            bail!("at least one discovery attempt is needed");
        }

        if let Some(dir) = &args.output {
            output.dir = dir.clone();
        }
        if let Some(prefix) = &args.prefix {
            output.prefix = prefix.clone();
        }
        output.split_channels |= args.split_channels;

        let virtual_camera = VirtualCameraConfig {
            appear_after: args.virtual_appear_after,
            corrupt_every: args.virtual_corrupt_every,
            realtime: args.virtual_realtime,
            ..VirtualCameraConfig::default()
        };

        Ok(Self {
            capture,
            stream,
            acquire,
            output,
            virtual_camera,
        })
    }
}

fn sensor_mode(current: SensorMode, args: &Args) -> Result<SensorMode> {
    let mode = args.mode.unwrap_or(match current {
        SensorMode::Crop { .. } => ModeArg::Crop,
        SensorMode::Binning { .. } => ModeArg::Binning,
        SensorMode::Original => ModeArg::Original,
    });
    if mode != ModeArg::Crop && (args.width.is_some() || args.height.is_some()) {
        bail!("--width and --height only apply to crop mode");
    }
    if mode != ModeArg::Binning && args.binning.is_some() {
        bail!("--binning only applies to binning mode");
    }

    Ok(match mode {
        ModeArg::Crop => {
            let (width, height) = match current {
                SensorMode::Crop { width, height } => (width, height),
                _ => DEFAULT_CROP,
            };
            SensorMode::Crop {
                width: args.width.unwrap_or(width),
                height: args.height.unwrap_or(height),
            }
        }
        ModeArg::Binning => {
            let factor = match current {
                SensorMode::Binning { factor } => factor,
                _ => DEFAULT_BINNING,
            };
            SensorMode::Binning {
                factor: args.binning.unwrap_or(factor),
            }
        }
        ModeArg::Original => SensorMode::Original,
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use framegate::{Exposure, PixelFormat};

    use super::*;

    fn args(flags: &[&str]) -> Args {
        Args::parse_from(std::iter::once("framegate").chain(flags.iter().copied()))
    }

    fn file(text: &str) -> FileConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let config = RunConfig::merge(FileConfig::default(), &args(&[])).unwrap();

        assert_eq!(config.capture, CaptureSettings::default());
        assert_eq!(config.stream.max_frames, Some(2000));
        assert_eq!(config.stream.buffer_pool, 100);
        assert_eq!(config.stream.expected_format, Some(PixelFormat::Rgb8));
        assert_eq!(config.acquire, RetryBudget::default());
        assert_eq!(config.output.dir, PathBuf::from("captured_images"));
        assert_eq!(config.output.prefix, "original");
    }

    #[test]
    fn flags_override_the_file() {
        let file = file(
            r#"
            [capture]
            pixel_format = "mono8"
            mode = { kind = "crop", width = 640, height = 480 }

            [stream]
            max_frames = 10
            buffer_pool = 8

            [acquire]
            max_attempts = 3
            wait_secs = 1

            [output]
            dir = "frames"
            "#,
        );
        let config = RunConfig::merge(
            file,
            &args(&["--width", "320", "--frames", "5", "--tries", "2", "--exposure", "auto"]),
        )
        .unwrap();

        assert_eq!(config.capture.pixel_format, PixelFormat::Mono8);
        assert_eq!(config.capture.mode, SensorMode::Crop { width: 320, height: 480 });
        assert_eq!(config.capture.exposure, Exposure::Auto);
        assert_eq!(config.stream.max_frames, Some(5));
        assert_eq!(config.stream.buffer_pool, 8);
        assert_eq!(config.stream.expected_format, Some(PixelFormat::Mono8));
        assert_eq!(config.acquire, RetryBudget { max_attempts: 2, wait_secs: 1 });
        assert_eq!(config.output.dir, PathBuf::from("frames"));
    }

    #[test]
    fn zero_frames_streams_until_stopped() {
        let config = RunConfig::merge(FileConfig::default(), &args(&["--frames", "0"])).unwrap();
        assert_eq!(config.stream.max_frames, None);
    }

    #[test]
    fn mode_flags_must_agree() {
        let config =
            RunConfig::merge(FileConfig::default(), &args(&["--mode", "binning"])).unwrap();
        assert_eq!(config.capture.mode, SensorMode::Binning { factor: 2 });

        let config = RunConfig::merge(
            FileConfig::default(),
            &args(&["--mode", "binning", "--binning", "4"]),
        )
        .unwrap();
        assert_eq!(config.capture.mode, SensorMode::Binning { factor: 4 });

        assert!(RunConfig::merge(FileConfig::default(), &args(&["--binning", "4"])).is_err());
        assert!(
            RunConfig::merge(FileConfig::default(), &args(&["--mode", "original", "--width", "5"]))
                .is_err()
        );
    }

    #[test]
    fn zero_tries_is_rejected() {
        assert!(RunConfig::merge(FileConfig::default(), &args(&["--tries", "0"])).is_err());
    }

    #[test]
    fn virtual_camera_flags() {
        let config = RunConfig::merge(
            FileConfig::default(),
            &args(&["--virtual-appear-after", "3", "--virtual-corrupt-every", "5"]),
        )
        .unwrap();
        assert_eq!(config.virtual_camera.appear_after, 3);
        assert_eq!(config.virtual_camera.corrupt_every, Some(5));
        assert!(!config.virtual_camera.realtime);
    }

    #[test]
    fn loads_a_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framegate.toml");
        fs::write(&path, "[output]\nprefix = \"night\"\nsplit_channels = true\n").unwrap();

        let config = RunConfig::load(&args(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.output.prefix, "night");
        assert!(config.output.split_channels);
    }

    #[test]
    fn unknown_keys_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("framegate.toml");
        fs::write(&path, "[output]\nfolder = \"x\"\n").unwrap();

        let err = FileConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config file"), "{err:#}");
    }
}
