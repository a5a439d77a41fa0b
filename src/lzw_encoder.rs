//! Authors
//! - Kevin Weiner (original Java version - kweiner@fmsware.com)
//! - Thibault Imbert (AS3 version - bytearray.org)
//! - Johan Nordberg (JS version - code@johan-nordberg.com)
//! - Antonio Román (TS version - kyradiscord@gmail.com)
//! - Tyler J. Russell (Rust version - t@k-cs.co)
//!
//! Acknowledgements
//! - GIFCOMPR.C - GIF Image compression routines
//! - Lempel-Ziv compression based on 'compress'. GIF modifications by
//! - David Rowley (mgardi@watdcsu.waterloo.edu)
//!   GIF Image compression - modified 'compress'
//!   Based on: compress.c - File compression ala IEEE Computer, June 1984.
//!   By Authors:
//!   - Spencer W. Thomas (decvax!harpo!utah-cs!utah-gr!thomas)
//!   - Jim McKie (decvax!mcvax!jim)
//!   - Steve Davies (decvax!vax135!petsd!peora!srd)
//!   - Ken Turkowski (decvax!decwrl!turtlevax!ken)
//!   - James A. Woods (decvax!ihnp4!ames!jaw)
//!   - Joe Orost (decvax!vax135!petsd!joe)

use derivative::Derivative;

use crate::error::GifEncodeError;
use crate::sink::Sink;

const EOF: i32 = -1;
const MAXBITS: usize = 12;
const MAXMAXCODE: i32 = 1 << MAXBITS;
const HASH_SIZE: usize = 5003; // 80% occupancy
const MASKS: [u32; 17] = [
    0x0000, 0x0001, 0x0003, 0x0007, 0x000f, 0x001f, 0x003f, 0x007f, 0x00ff, 0x01ff, 0x03ff, 0x07ff,
    0x0fff, 0x1fff, 0x3fff, 0x7fff, 0xffff,
];

/// @summary
/// Algorithm: use open addressing double hashing (no chaining) on the prefix code / next character
/// combination.
///
/// We do a variant of Knuth's algorithm D (vol. 3, sec. 6.4) along with G. Knott's relatively-prime
/// secondary probe. Here, the modular division first probe gives way to a faster exclusive-or
/// manipulation. Also do block compression with an adaptive reset, whereby the code table is cleared
/// when the compression ratio decreases, but after the table fills. The variable-length output codes
/// are re-sized at this point, and a special CLEAR code is generated for the decompressor.
///
/// **Late addition**: construct the table according to file size for noticeable speed improvement on
/// small files. Please direct questions about this implementation to ames!jaw.
#[derive(Derivative)]
#[derivative(Default)]
pub struct LzwCoder {
    init_code_size: u8,
    n_bits: usize,
    max_code: i32,
    free_ent: i32,
    clear_flg: bool,
    g_init_bits: usize,
    clear_code: i32,
    eof_code: i32,
    cur_accum: u32,
    cur_bits: usize,
    a_count: usize,

    #[derivative(Default(value = "[-1; HASH_SIZE]"))]
    htab: [i32; HASH_SIZE],
    #[derivative(Default(value = "[0; HASH_SIZE]"))]
    codetab: [i32; HASH_SIZE],
    #[derivative(Default(value = "[0; 254]"))]
    accum: [u8; 254],
}

impl LzwCoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets per-frame scalar state. `color_depth` is the bit depth of
    /// the indexed pixels (8 for a 256-entry palette); the literal data
    /// size written at the head of `encode`'s output is
    /// `max(2, color_depth)`. The hash/code tables are reset lazily at
    /// the start of `compress`, so the backing arrays are never
    /// reallocated here.
    pub fn reset(&mut self, color_depth: u8) {
        self.init_code_size = color_depth.max(2);
        self.n_bits = 0;
        self.max_code = 0;
        self.free_ent = 0;
        self.clear_flg = false;
        self.g_init_bits = 0;
        self.clear_code = 0;
        self.eof_code = 0;
        self.cur_accum = 0;
        self.cur_bits = 0;
        self.a_count = 0;
    }

    /// Encodes `pixels` (one palette index per pixel, 0..=255) as a GIF
    /// image data stream: literal size byte, compressed sub-blocks, and
    /// the zero-length block terminator.
    pub fn encode(&mut self, pixels: &[u8], sink: &mut dyn Sink) -> Result<(), GifEncodeError> {
        sink.write_u8(self.init_code_size)?;
        self.compress(self.init_code_size as usize + 1, pixels, sink)?;
        sink.write_u8(0)?;
        Ok(())
    }

    fn compress(
        &mut self,
        init_bits: usize,
        pixels: &[u8],
        sink: &mut dyn Sink,
    ) -> Result<(), GifEncodeError> {
        self.g_init_bits = init_bits;
        self.n_bits = init_bits;
        self.max_code = Self::max_code_for(self.n_bits);
        self.clear_code = 1 << (init_bits - 1);
        self.eof_code = self.clear_code + 1;
        self.free_ent = self.clear_code + 2;
        self.a_count = 0;
        self.clear_flg = false;
        self.htab.fill(-1);

        let hash_shift = Self::hash_shift();

        self.output(self.clear_code, sink)?;

        let mut pos = 0usize;
        let mut ent = Self::next_pixel(pixels, &mut pos);
        debug_assert_ne!(ent, EOF, "encode() requires at least one pixel");

        loop {
            let c = Self::next_pixel(pixels, &mut pos);
            if c == EOF {
                break;
            }

            let fcode = (c << MAXBITS) + ent;
            let mut i = ((c << hash_shift) ^ ent) as usize;

            if self.htab[i] == fcode {
                ent = self.codetab[i];
                continue;
            }

            if self.htab[i] >= 0 {
                let disp = if i == 0 { 1 } else { HASH_SIZE - i };
                loop {
                    i = if i >= disp { i - disp } else { i + HASH_SIZE - disp };
                    if self.htab[i] == fcode || self.htab[i] < 0 {
                        break;
                    }
                }
                if self.htab[i] == fcode {
                    ent = self.codetab[i];
                    continue;
                }
            }

            self.output(ent, sink)?;
            ent = c;

            if self.free_ent < MAXMAXCODE {
                self.codetab[i] = self.free_ent;
                self.free_ent += 1;
                self.htab[i] = fcode;
            } else {
                self.clear_table(sink)?;
            }
        }

        self.output(ent, sink)?;
        self.output(self.eof_code, sink)?;
        Ok(())
    }

    fn clear_table(&mut self, sink: &mut dyn Sink) -> Result<(), GifEncodeError> {
        log::warn!("lzw dictionary full, emitting adaptive clear code");
        self.htab.fill(-1);
        self.free_ent = self.clear_code + 2;
        self.clear_flg = true;
        self.output(self.clear_code, sink)
    }

    fn output(&mut self, code: i32, sink: &mut dyn Sink) -> Result<(), GifEncodeError> {
        self.cur_accum &= MASKS[self.cur_bits];
        if self.cur_bits == 0 {
            self.cur_accum = code as u32;
        } else {
            self.cur_accum |= (code as u32) << self.cur_bits;
        }
        self.cur_bits += self.n_bits;

        while self.cur_bits >= 8 {
            self.add((self.cur_accum & 0xff) as u8, sink)?;
            self.cur_accum >>= 8;
            self.cur_bits -= 8;
        }

        if self.free_ent > self.max_code || self.clear_flg {
            if self.clear_flg {
                self.n_bits = self.g_init_bits;
                self.max_code = Self::max_code_for(self.n_bits);
                self.clear_flg = false;
            } else {
                self.n_bits += 1;
                self.max_code = if self.n_bits == MAXBITS {
                    MAXMAXCODE
                } else {
                    Self::max_code_for(self.n_bits)
                };
            }
        }

        if code == self.eof_code {
            if self.cur_bits > 0 {
                self.add((self.cur_accum & 0xff) as u8, sink)?;
            }
            self.cur_bits = 0;
            self.cur_accum = 0;
            self.flush(sink)?;
        }

        Ok(())
    }

    fn add(&mut self, byte: u8, sink: &mut dyn Sink) -> Result<(), GifEncodeError> {
        self.accum[self.a_count] = byte;
        self.a_count += 1;
        if self.a_count >= 254 {
            self.flush(sink)?;
        }
        Ok(())
    }

    fn flush(&mut self, sink: &mut dyn Sink) -> Result<(), GifEncodeError> {
        if self.a_count > 0 {
            sink.write_u8(self.a_count as u8)?;
            sink.write_bytes(&self.accum[..self.a_count])?;
            self.a_count = 0;
        }
        Ok(())
    }

    #[inline]
    fn max_code_for(n_bits: usize) -> i32 {
        (1 << n_bits) - 1
    }

    fn next_pixel(pixels: &[u8], pos: &mut usize) -> i32 {
        if *pos >= pixels.len() {
            EOF
        } else {
            let v = pixels[*pos] as i32;
            *pos += 1;
            v
        }
    }

    /// `hshift` such that `(c << hshift) ^ prefix_code` always lands
    /// inside `[0, HASH_SIZE)` for a 12-bit prefix code and an 8-bit
    /// pixel — derived from `HASH_SIZE` rather than hardcoded.
    fn hash_shift() -> u32 {
        let mut hshift = 0u32;
        let mut fcode = HASH_SIZE;
        while fcode < 65536 {
            hshift += 1;
            fcode *= 2;
        }
        8 - hshift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSink(Vec<u8>);

    impl Sink for VecSink {
        fn write_u8(&mut self, v: u8) -> Result<(), GifEncodeError> {
            self.0.push(v);
            Ok(())
        }
        fn write_u16_le(&mut self, v: u16) -> Result<(), GifEncodeError> {
            self.0.extend_from_slice(&v.to_le_bytes());
            Ok(())
        }
        fn write_bytes(&mut self, buf: &[u8]) -> Result<(), GifEncodeError> {
            self.0.extend_from_slice(buf);
            Ok(())
        }
        fn write_ascii(&mut self, s: &str) -> Result<(), GifEncodeError> {
            self.0.extend_from_slice(s.as_bytes());
            Ok(())
        }
        fn flush(&mut self) -> Result<(), GifEncodeError> {
            Ok(())
        }
    }

    fn encode(pixels: &[u8], color_depth: u8) -> Vec<u8> {
        let mut coder = LzwCoder::new();
        coder.reset(color_depth);
        let mut sink = VecSink(Vec::new());
        coder.encode(pixels, &mut sink).unwrap();
        sink.0
    }

    /// Minimal LZW sub-block reader, standards-compliant enough to
    /// round-trip what `LzwCoder::encode` produces.
    fn decode(stream: &[u8]) -> Vec<u8> {
        let lit_size = stream[0] as usize;
        let mut sub_blocks = Vec::new();
        let mut pos = 1usize;
        loop {
            let len = stream[pos] as usize;
            pos += 1;
            if len == 0 {
                break;
            }
            sub_blocks.extend_from_slice(&stream[pos..pos + len]);
            pos += len;
        }

        let clear_code = 1usize << lit_size;
        let eof_code = clear_code + 1;
        let mut n_bits = lit_size + 1;
        let mut next_code = eof_code + 1;
        let mut table: Vec<Vec<u8>> = (0..clear_code).map(|i| vec![i as u8]).collect();
        table.push(vec![]); // clear
        table.push(vec![]); // eof

        let mut bit_pos = 0usize;
        let read_code = |bit_pos: &mut usize, n_bits: usize| -> usize {
            let mut value = 0usize;
            for b in 0..n_bits {
                let byte = sub_blocks[(*bit_pos + b) / 8];
                let bit = (byte >> ((*bit_pos + b) % 8)) & 1;
                value |= (bit as usize) << b;
            }
            *bit_pos += n_bits;
            value
        };

        let mut out = Vec::new();
        let mut prev: Option<Vec<u8>> = None;

        loop {
            let code = read_code(&mut bit_pos, n_bits);
            if code == eof_code {
                break;
            }
            if code == clear_code {
                table.truncate(clear_code + 2);
                n_bits = lit_size + 1;
                next_code = eof_code + 1;
                prev = None;
                continue;
            }

            let entry = if code < table.len() {
                table[code].clone()
            } else {
                let mut e = prev.clone().unwrap();
                e.push(prev.as_ref().unwrap()[0]);
                e
            };

            out.extend_from_slice(&entry);

            if let Some(p) = prev {
                let mut new_entry = p;
                new_entry.push(entry[0]);
                table.push(new_entry);
                next_code += 1;
                if next_code == (1 << n_bits) && n_bits < 12 {
                    n_bits += 1;
                }
            }

            prev = Some(entry);
        }

        out
    }

    #[test]
    fn round_trips_mixed_pixels() {
        let pixels: Vec<u8> = (0..2000).map(|i| ((i * 37) % 17) as u8).collect();
        let stream = encode(&pixels, 8);
        assert_eq!(decode(&stream), pixels);
    }

    #[test]
    fn round_trips_single_color() {
        let pixels = vec![3u8; 4096];
        let stream = encode(&pixels, 8);
        assert_eq!(decode(&stream), pixels);
    }

    #[test]
    fn image_data_starts_and_ends_correctly() {
        let pixels = vec![0u8; 16];
        let stream = encode(&pixels, 8);
        assert_eq!(stream[0], 8);
        assert_eq!(*stream.last().unwrap(), 0);
    }

    #[test]
    fn no_sub_block_length_exceeds_254() {
        let pixels: Vec<u8> = (0..20000).map(|i| (i % 250) as u8).collect();
        let stream = encode(&pixels, 8);
        let mut pos = 1usize;
        loop {
            let len = stream[pos] as usize;
            if len == 0 {
                break;
            }
            assert!(len <= 254);
            pos += 1 + len;
        }
    }
}
