//! Collaborators the core talks to through narrow traits: GPU buffers, audio,
//! keyboard input, windows, and the wgpu renderer.

pub mod audio;
pub mod gpu;
pub mod input;
pub mod surface;
pub mod window;
