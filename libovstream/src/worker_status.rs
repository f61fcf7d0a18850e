/// Color of the progress bar a status is shown with: one per conversion stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BarColor {
    #[default]
    CYAN,
    MAGENTA,
    GREEN,
}

/// Progress report sent by a conversion to whoever displays it
#[derive(Debug, Clone, Default)]
pub struct WorkerStatus {
    pub progress: f32,
    pub chunk_count: u64,
    pub color: BarColor,
}

impl WorkerStatus {
    pub fn new(progress: f32, chunk_count: u64, color: BarColor) -> Self {
        Self {
            progress,
            chunk_count,
            color,
        }
    }
}
