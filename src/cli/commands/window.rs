use crate::downsample::Method;
use crate::window::WindowRequest;
use clap::Args;
use uuid::Uuid;

#[derive(Args)]
pub struct WindowCommand {
    /// Channel to read
    #[arg(value_name = "CHANNEL_ID")]
    pub channel_id: Uuid,

    /// Window start: ISO-8601 time, or sample index for index channels
    #[arg(long)]
    pub start: Option<String>,

    /// Window end: ISO-8601 time, or sample index for index channels
    #[arg(long)]
    pub end: Option<String>,

    /// Start in seconds after the channel's first sample
    #[arg(long, allow_negative_numbers = true)]
    pub start_sec: Option<f64>,

    /// End in seconds after the channel's first sample
    #[arg(long, allow_negative_numbers = true)]
    pub end_sec: Option<f64>,

    /// Report times relative to the first returned sample
    #[arg(long)]
    pub relative: bool,

    /// Target point count after downsampling
    #[arg(long)]
    pub points: Option<usize>,

    /// Downsampling method (lttb, uniform, native)
    #[arg(long, default_value = "lttb")]
    pub method: Method,

    /// Continue after this position (next_cursor of the previous page)
    #[arg(long)]
    pub cursor: Option<f64>,

    /// Maximum rows fetched before downsampling
    #[arg(long)]
    pub limit: Option<usize>,

    /// Caller identity used for the ownership check
    #[arg(long, env = "TDMS_OWNER")]
    pub owner: Option<String>,

    /// Write an Arrow IPC stream to this file instead of printing JSON
    #[arg(long, value_name = "FILE")]
    pub arrow_out: Option<std::path::PathBuf>,
}

impl WindowCommand {
    pub fn request(&self) -> WindowRequest {
        WindowRequest {
            channel_id: self.channel_id,
            start: self.start.clone(),
            end: self.end.clone(),
            start_sec: self.start_sec,
            end_sec: self.end_sec,
            relative: self.relative,
            points: self.points,
            method: self.method,
            cursor: self.cursor,
            limit: self.limit,
        }
    }
}
