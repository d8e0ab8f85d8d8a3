//! Playback of a single track
//!
//! A track's byte source is wrapped in a [`Pacer`] so the broadcast never
//! runs ahead of real audio time.

pub mod pacer;

pub use pacer::Pacer;
