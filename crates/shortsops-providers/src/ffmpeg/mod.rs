//! FFmpeg-backed rendering.

pub mod command;
pub mod renderer;

pub use command::{check_ffmpeg, FfmpegCommand, FfmpegRunner};
pub use renderer::{
    compose_command, FfmpegRenderer, FfmpegRendererConfig, OverlayLayer, RENDER_DURATION_SECS,
};
