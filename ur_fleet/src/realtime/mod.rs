//! UR realtime interface (port 30003) telemetry.
//!
//! The controller interleaves fixed-layout binary frames with plain text on the
//! same socket. [`classify`] separates the two, [`RealtimeRecord`] decodes and
//! encodes the binary layout, and [`RealtimeSampler`] turns the freshest frame
//! into events on a fixed cadence.

#[macro_use]
mod codec;
mod demux;
mod modes;
mod record;
mod sampler;

pub use codec::{FrameReader, FrameWriter};
pub use demux::{classify, Chunk};
pub use modes::*;
pub use record::*;
pub use sampler::RealtimeSampler;
