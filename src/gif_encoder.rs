use bitvec::vec::BitVec;

use crate::error::GifEncodeError;
use crate::frame::{Frame, Repeat};
use crate::lzw_encoder::LzwCoder;
use crate::neuquant::Quantizer;
use crate::sink::Sink;

const NETSCAPE_HEADER: &[u8; 11] = b"NETSCAPE2.0";

// Color table size field: (bits - 1) for a 256-entry table.
const PALETTE_SIZE_FIELD: u8 = 0x07;

/// The GIF89a container writer: orchestrates the per-frame
/// quantize → index → compress pipeline and emits the header, per-frame
/// extensions, and trailer around it.
///
/// `Quantizer` and `LzwCoder` are owned exclusively and reused across
/// frames — neither collaborator knows about the other, and ownership
/// forms a strict tree rooted at the encoder.
pub struct GifEncoder {
    width: u16,
    height: u16,
    framerate: f64,
    repeat: Repeat,
    sample_factor: u8,

    started: bool,
    first_frame: bool,

    quantizer: Quantizer,
    lzw: LzwCoder,

    scratch: Vec<u8>,
    indexed: Vec<u8>,
    used_entry: BitVec,
}

impl GifEncoder {
    /// Creates an encoder for `width` × `height` frames. Both dimensions
    /// must be in `1..=65535`.
    pub fn new(width: u16, height: u16) -> Result<Self, GifEncodeError> {
        if width == 0 || height == 0 {
            return Err(GifEncodeError::InvalidFrame {
                reason: format!("width and height must be positive, got {}x{}", width, height),
            });
        }

        let pixel_count = width as usize * height as usize;
        Ok(GifEncoder {
            width,
            height,
            framerate: 10.0,
            repeat: Repeat::Infinite,
            sample_factor: 10,
            started: false,
            first_frame: true,
            quantizer: Quantizer::new(),
            lzw: LzwCoder::new(),
            scratch: vec![0u8; pixel_count * 3],
            indexed: vec![0u8; pixel_count],
            used_entry: BitVec::repeat(false, 256),
        })
    }

    /// Default frame rate used when a frame's `delay` is negative.
    pub fn with_framerate(mut self, fps: f64) -> Self {
        self.framerate = fps;
        self
    }

    /// Loop mode written as the Netscape 2.0 extension on the first
    /// frame.
    pub fn with_repeat(mut self, repeat: Repeat) -> Self {
        self.repeat = repeat;
        self
    }

    /// NeuQuant's `samplefac`: 1 learns from every pixel (slowest,
    /// highest fidelity), larger values subsample more aggressively.
    pub fn with_sample_factor(mut self, factor: u8) -> Self {
        self.sample_factor = factor.max(1);
        self
    }

    /// Writes the GIF89a header and Logical Screen Descriptor. Must be
    /// called exactly once before any `add_frame`/`commit`.
    pub fn start(&mut self, sink: &mut dyn Sink) -> Result<(), GifEncodeError> {
        if self.started {
            return Err(GifEncodeError::AlreadyStarted);
        }

        sink.write_ascii("GIF89a")?;
        sink.write_u16_le(self.width)?;
        sink.write_u16_le(self.height)?;
        // GCT present | color resolution 7 | not sorted | GCT size 7 (256 entries)
        sink.write_u8(0x80 | 0x70 | 0x00 | PALETTE_SIZE_FIELD)?;
        sink.write_u8(0)?; // background color index
        sink.write_u8(0)?; // pixel aspect ratio

        self.started = true;
        self.first_frame = true;
        Ok(())
    }

    /// Quantizes `frame`, writes its Graphic Control Extension, Image
    /// Descriptor and (on the first call) the Global Color Table and
    /// looping extension, then compresses the indexed pixels.
    pub fn add_frame(&mut self, sink: &mut dyn Sink, frame: &Frame) -> Result<(), GifEncodeError> {
        if !self.started {
            return Err(GifEncodeError::NotStarted);
        }
        if frame.width != self.width || frame.height != self.height {
            return Err(GifEncodeError::InvalidFrame {
                reason: format!(
                    "frame is {}x{}, encoder was started at {}x{}",
                    frame.width, frame.height, self.width, self.height
                ),
            });
        }
        let expected_len = self.width as usize * self.height as usize * 3;
        if frame.rgb.len() != expected_len {
            return Err(GifEncodeError::InvalidFrame {
                reason: format!(
                    "frame rgb buffer is {} bytes, expected {}",
                    frame.rgb.len(),
                    expected_len
                ),
            });
        }

        log::debug!(
            "encoding {}x{} frame, sample_factor={}, first_frame={}",
            self.width,
            self.height,
            self.sample_factor,
            self.first_frame
        );

        let rgb: &[u8] = if frame.flipped_y {
            self.flip_into_scratch(frame.rgb);
            &self.scratch
        } else {
            frame.rgb
        };

        self.quantizer.reset();
        let palette = self.quantizer.process(rgb, self.sample_factor)?;

        for bit in self.used_entry.iter_mut() {
            *bit = false;
        }
        for (pixel, slot) in rgb.chunks_exact(3).zip(self.indexed.iter_mut()) {
            let idx = self.quantizer.map(pixel[0], pixel[1], pixel[2]);
            *slot = idx;
            self.used_entry.set(idx as usize, true);
        }

        match self.write_frame_bytes(sink, &palette, frame.delay) {
            Ok(()) => {
                self.first_frame = false;
                Ok(())
            }
            Err(e) => {
                // §7 SinkError policy: a failed write leaves the encoder in a
                // failed state, rejected by a fresh `start` rather than
                // silently resumed.
                self.started = false;
                Err(e)
            }
        }
    }

    /// Writes everything after the palette/indexed-pixel computation: GCE,
    /// Image Descriptor (+ LCT on non-first frames), and the LZW image data.
    /// Isolated so `add_frame` can mark the encoder failed on any error from
    /// here without touching the validation errors above, which never write
    /// to the sink.
    fn write_frame_bytes(
        &mut self,
        sink: &mut dyn Sink,
        palette: &[u8; 768],
        delay: f64,
    ) -> Result<(), GifEncodeError> {
        if self.first_frame {
            sink.write_bytes(palette)?;
            if self.repeat != Repeat::NoRepeat {
                self.write_netscape_extension(sink)?;
            }
        }

        let delay_cs = self.delay_hundredths(delay);
        self.write_graphic_control_extension(sink, delay_cs)?;

        sink.write_u8(0x2C)?; // image separator
        sink.write_u16_le(0)?; // left
        sink.write_u16_le(0)?; // top
        sink.write_u16_le(self.width)?;
        sink.write_u16_le(self.height)?;
        if self.first_frame {
            sink.write_u8(0x00)?; // use the GCT
        } else {
            sink.write_u8(0x80 | PALETTE_SIZE_FIELD)?; // LCT present, size 7
            sink.write_bytes(palette)?;
        }

        self.lzw.reset(8);
        self.lzw.encode(&self.indexed, sink)?;
        Ok(())
    }

    /// Writes the GIF trailer and returns the encoder to its
    /// pre-`start` state so it can be reused on a new sink.
    pub fn commit(&mut self, sink: &mut dyn Sink) -> Result<(), GifEncodeError> {
        if !self.started {
            return Err(GifEncodeError::NotStarted);
        }
        if let Err(e) = sink.write_u8(0x3B).and_then(|_| sink.flush()) {
            self.started = false;
            return Err(e);
        }
        self.started = false;
        self.first_frame = true;
        Ok(())
    }

    fn flip_into_scratch(&mut self, rgb: &[u8]) {
        let row_len = self.width as usize * 3;
        let height = self.height as usize;
        for y in 0..height {
            let dst_row = height - 1 - y;
            self.scratch[dst_row * row_len..(dst_row + 1) * row_len]
                .copy_from_slice(&rgb[y * row_len..(y + 1) * row_len]);
        }
    }

    fn delay_hundredths(&self, delay: f64) -> u16 {
        let seconds = if delay < 0.0 { 1.0 / self.framerate } else { delay };
        (seconds * 100.0).floor().clamp(0.0, u16::MAX as f64) as u16
    }

    fn write_netscape_extension(&self, sink: &mut dyn Sink) -> Result<(), GifEncodeError> {
        sink.write_u8(0x21)?; // extension introducer
        sink.write_u8(0xFF)?; // application extension label
        sink.write_u8(11)?; // block size
        sink.write_bytes(NETSCAPE_HEADER)?;
        sink.write_u8(3)?; // sub-block size
        sink.write_u8(1)?; // loop sub-id
        let loop_count = match self.repeat {
            Repeat::Infinite => 0,
            Repeat::Finite(n) => n,
            Repeat::NoRepeat => unreachable!("caller already skips the extension for NoRepeat"),
        };
        sink.write_u16_le(loop_count)?;
        sink.write_u8(0)?; // terminator
        Ok(())
    }

    fn write_graphic_control_extension(
        &self,
        sink: &mut dyn Sink,
        delay_cs: u16,
    ) -> Result<(), GifEncodeError> {
        sink.write_u8(0x21)?;
        sink.write_u8(0xF9)?;
        sink.write_u8(4)?;
        sink.write_u8(0x00)?; // packed flags: no transparency, no disposal
        sink.write_u16_le(delay_cs)?;
        sink.write_u8(0)?; // transparent color index
        sink.write_u8(0)?; // terminator
        Ok(())
    }
}
