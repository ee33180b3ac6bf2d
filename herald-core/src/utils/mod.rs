pub mod poll_interval;
pub mod timebox;
