//! Audio buffers, codecs and the little in-memory dynamics we need
//!
//! Everything that touches sample data lives here. The rest of the crate
//! treats `AudioBuffer` as an opaque value that gets encoded at process
//! boundaries and decoded on the way back.

pub mod buffer;
pub mod codec;
pub mod dynamics;

pub use buffer::AudioBuffer;
pub use codec::{AudioFormat, Codec, WavEncoding};
pub use dynamics::{compress, peak_normalize, sound_rescue, CompressorParams};
