//! Integration test crate for Trackdeck.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on every trackdeck library crate to verify they work together
//! without audio hardware or ffmpeg: playback goes through the null output
//! device and exports land in memory.

#[cfg(test)]
mod timeline;

#[cfg(test)]
mod audio;
