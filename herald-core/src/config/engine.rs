//! Timing and limits for the engine's external calls and timer loops.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Time box for each channel call (create, update, delete, attendance).
    pub channel_call_timeout: Duration,
    /// Time box for the image upload step of event creation.
    pub image_upload_timeout: Duration,
    /// Time box for creating the event record itself.
    pub record_create_timeout: Duration,
    /// Time box for delivering one reminder notice.
    pub reminder_delivery_timeout: Duration,
    pub queue: QueueIntervals,
    pub attendance_refresh_interval: Duration,
    pub reminder_check_interval: Duration,
    /// Additional images accepted besides the header image.
    pub max_additional_images: usize,
}

/// Poll cadence of the scheduled publication queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueIntervals {
    pub slow: Duration,
    pub fast: Duration,
    /// The fast interval is used while something is due within this window.
    pub fast_window: Duration,
}

impl Default for QueueIntervals {
    fn default() -> Self {
        Self {
            slow: Duration::from_secs(60),
            fast: Duration::from_secs(15),
            fast_window: Duration::from_secs(5 * 60),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_call_timeout: Duration::from_secs(30),
            image_upload_timeout: Duration::from_secs(20),
            record_create_timeout: Duration::from_secs(15),
            reminder_delivery_timeout: Duration::from_secs(30),
            queue: QueueIntervals::default(),
            attendance_refresh_interval: Duration::from_secs(5),
            reminder_check_interval: Duration::from_secs(30),
            max_additional_images: 10,
        }
    }
}
