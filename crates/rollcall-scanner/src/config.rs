use std::path::PathBuf;

/// Scanner configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture width; the driver may pick the nearest supported size.
    pub camera_width: u32,
    /// Requested capture height.
    pub camera_height: u32,
    /// Path to the SQLite database file shared with the dashboard.
    pub db_path: PathBuf,
    /// Frames discarded after opening the camera while exposure settles.
    pub warmup_frames: usize,
    /// Where annotated frames are written. No snapshots when unset.
    pub snapshot_dir: Option<PathBuf>,
    /// TTF font for status labels on snapshots. Outlines only when unset.
    pub font_path: Option<PathBuf>,
    /// Fit the anomaly model over history at startup and log its summary.
    pub train_on_start: bool,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            camera_device: std::env::var("ROLLCALL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            camera_width: env_u32("ROLLCALL_CAMERA_WIDTH", 640),
            camera_height: env_u32("ROLLCALL_CAMERA_HEIGHT", 480),
            db_path: rollcall_store::default_db_path(),
            warmup_frames: env_usize("ROLLCALL_WARMUP_FRAMES", 4),
            snapshot_dir: env_path("ROLLCALL_SNAPSHOT_DIR"),
            font_path: env_path("ROLLCALL_FONT_PATH"),
            train_on_start: std::env::var("ROLLCALL_TRAIN_ON_START")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    !(value == "0" || value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no"))
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
