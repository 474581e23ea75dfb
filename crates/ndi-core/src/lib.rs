//! Media plane for a live NDI ingest node: discovery, receive,
//! frame routing, uncompressed render, hardware decode and MP4 recording.
//!
//! This crate is the core library; `ndi-cli` is a thin windowed client that
//! wires a real `Surface` and event loop around it.

pub mod assets;
pub mod config;
pub mod decoder;
#[cfg(feature = "openh264")]
pub mod decoder_openh264;
pub mod error;
pub mod events;
pub mod finder;
pub mod frame;
pub mod health;
pub mod native;
pub mod receiver;
pub mod recorder;
pub mod renderer;
pub mod router;
pub mod source;
