//! FFmpeg command builder and tool checks.

use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// Output target that writes to the child's stdout.
pub const STDOUT_PIPE: &str = "pipe:1";

/// Decoder verbosity; stderr is only kept for failure messages.
const LOG_LEVEL: &str = "error";

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path or pipe
    output: String,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl Into<String>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.into(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Create a command that streams its output to stdout.
    pub fn to_stdout(input: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new(input, STDOUT_PIPE);
        cmd.overwrite = false;
        cmd
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set output pixel format.
    pub fn pixel_format(self, fmt: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(fmt)
    }

    /// Set output container/muxer.
    pub fn format(self, fmt: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(fmt)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string()];

        // Overwrite flag
        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(LOG_LEVEL.to_string());

        // Input args
        args.extend(self.input_args.clone());

        // Input file
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        // Output args
        args.extend(self.output_args.clone());

        args.push(self.output.clone());

        args
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_frame_command() {
        let cmd = FfmpegCommand::to_stdout("input.mp4")
            .input_arg("-nostdin")
            .video_filter("fps=1,scale=640:360")
            .pixel_format("rgb24")
            .format("rawvideo");

        let args = cmd.build_args();
        assert!(!args.contains(&"-y".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("pipe:1"));

        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let nostdin_pos = args.iter().position(|a| a == "-nostdin").unwrap();
        let vf_pos = args.iter().position(|a| a == "-vf").unwrap();
        assert!(nostdin_pos < input_pos);
        assert!(vf_pos > input_pos);
        assert_eq!(args[vf_pos + 1], "fps=1,scale=640:360");
    }

    #[test]
    fn test_file_output_overwrites() {
        let args = FfmpegCommand::new("in.mp4", "out.png")
            .output_args(["-vframes", "1"])
            .build_args();
        assert_eq!(args[1], "-y");
        assert_eq!(args[2..4], ["-v", "error"]);
        assert!(args.contains(&"-vframes".to_string()));
    }
}
