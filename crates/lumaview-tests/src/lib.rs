//! Integration test crate for Lumaview.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! Everything runs on the headless backend, so no GPU is required.

#[cfg(test)]
mod pipeline;

#[cfg(test)]
mod playback;

#[cfg(test)]
mod shaders;
