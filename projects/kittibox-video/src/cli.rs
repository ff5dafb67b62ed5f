use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Detects cars in a sequence of frames using KittiBox and writes an annotated video",
    long_about = None
)]
pub struct Args {
    /// Directory holding the input frames
    pub image_dir: PathBuf,

    /// Log directory of a trained KittiBox model
    pub logdir: PathBuf,

    /// Output video file
    #[arg(short, long, default_value = "video.mp4", env = "KITTIBOX_SAVE")]
    pub save: PathBuf,

    /// Use at most this many frames (negative means all)
    #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
    pub limit: i64,

    /// Frame rate of the output video
    #[arg(short, long, default_value_t = 10, env = "KITTIBOX_FRAMERATE")]
    pub framerate: u32,

    /// Minimum confidence for a box to be drawn
    #[arg(long, default_value_t = 0.5, env = "KITTIBOX_MIN_CONF")]
    pub min_conf: f32,

    /// Keep every box above the threshold instead of stitching overlapping ones
    #[arg(long)]
    pub no_stitching: bool,

    /// Also draw the boxes removed by stitching (in red)
    #[arg(long)]
    pub show_removed: bool,

    /// Exported model, relative to the log directory
    #[arg(long, default_value = "model_files/model.onnx", env = "KITTIBOX_MODEL")]
    pub model: PathBuf,

    /// Write per-frame detections as JSON to this file
    #[arg(long)]
    pub detections: Option<PathBuf>,

    /// CUDA device to run the model on
    #[arg(long, env = "TV_USE_GPUS")]
    pub gpus: Option<String>,

    /// Frames decoded ahead of inference
    #[arg(long, default_value_t = 4)]
    pub prefetch: usize,
}

impl Args {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Frame limit as an optional count; negative values mean "no limit".
    pub fn frame_limit(&self) -> Option<usize> {
        usize::try_from(self.limit).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["kittibox-video", "frames", "logs"]).unwrap();
        assert_eq!(args.image_dir, PathBuf::from("frames"));
        assert_eq!(args.logdir, PathBuf::from("logs"));
        assert_eq!(args.limit, -1);
        assert_eq!(args.frame_limit(), None);
        assert!(!args.no_stitching);
    }

    #[test]
    fn test_short_flags() {
        let args = Args::try_parse_from([
            "kittibox-video",
            "frames",
            "logs",
            "-s",
            "out.avi",
            "-l",
            "12",
            "-f",
            "25",
        ])
        .unwrap();
        assert_eq!(args.save, PathBuf::from("out.avi"));
        assert_eq!(args.frame_limit(), Some(12));
        assert_eq!(args.framerate, 25);
    }

    #[test]
    fn test_negative_limit_means_all() {
        let args = Args::try_parse_from(["kittibox-video", "frames", "logs", "--limit", "-3"])
            .unwrap();
        assert_eq!(args.frame_limit(), None);
    }

    #[test]
    fn test_missing_logdir_is_rejected() {
        assert!(Args::try_parse_from(["kittibox-video", "frames"]).is_err());
    }
}
