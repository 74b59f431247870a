//! Shared test constants

#![allow(dead_code)]

/// Knobs published by the fake gallery, as (id, file name).
pub const GALLERY_KNOBS: &[(i64, &str)] = &[
    (101, "Chrome Dial.knob"),
    (102, "Red Slider.knob"),
    (103, "Blue Switch.knob"),
];

/// Listed by the fake gallery, but its file download answers 404.
pub const MISSING_FILE_KNOB_ID: i64 = 104;
pub const MISSING_FILE_KNOB_NAME: &str = "Gone.knob";

pub const UNKNOWN_KNOB_ID: i64 = 9999;

/// Total knobs listed by the fake gallery.
pub const GALLERY_KNOB_COUNT: usize = 4;

pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 20;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long tests wait for background work (crawls, downloads) to settle.
pub const SETTLE_TIMEOUT_MS: u64 = 5000;
pub const SETTLE_POLL_INTERVAL_MS: u64 = 20;
