//! A streaming GIF89a encoder.
//!
//! Consumes RGB24 raster frames one at a time and writes a valid
//! animated GIF to any [`Sink`] — `Vec<u8>`, a file, a socket. The hard
//! engineering lives in two algorithms, each its own module:
//!
//! - [`neuquant`] — NeuQuant, a Kohonen self-organizing map that learns
//!   a 256-color palette from a 24-bit image.
//! - [`lzw_encoder`] — the variable-width LZW dictionary coder GIF uses
//!   for its image data.
//!
//! [`gif_encoder::GifEncoder`] is the thin container writer that drives
//! both once per frame and emits the surrounding GIF89a byte layout
//! (header, Netscape loop extension, per-frame Graphic Control
//! Extension and Image Descriptor, trailer).
//!
//! Decoding, dithering, transparency, disposal/compositing, interlacing
//! and pixel-format conversion are all out of scope — this crate only
//! writes GIFs from RGB24 input.

pub mod error;
pub mod frame;
pub mod gif_encoder;
pub mod lzw_encoder;
pub mod neuquant;
pub mod sink;

pub use error::GifEncodeError;
pub use frame::{Frame, Repeat};
pub use gif_encoder::GifEncoder;
pub use lzw_encoder::LzwCoder;
pub use neuquant::Quantizer;
pub use sink::Sink;
