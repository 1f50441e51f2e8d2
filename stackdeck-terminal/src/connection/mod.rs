//! Connection to a remote pty host

mod client;

pub use client::{RemotePtyHost, StreamTrait};
