//! GPS feed simulation for raceline.
//!
//! Tools for exercising a live session end to end: synthetic courses (ovals
//! and GPX files), rider identities, and noisy timed fix streams that can be
//! replayed against a running server as JSON messages or NMEA sentences.

pub mod course;
pub mod feed;
pub mod riders;
