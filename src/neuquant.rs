//! NeuQuant Neural-Net Quantization Algorithm
//! Copyright (c) 1994 Anthony Dekker
//!
//! "Kohonen neural networks for optimal colour quantization" in "Network:
//! Computation in Neural Systems" Vol. 5 (1994) 351-367,
//! DOI:10.1088/0954-898X/5/3/003
//!
//! JavaScript port 2012 by Johan Nordberg.
//! TypeScript port 2021 by Antonio Román.
//! Rust port 2022 by Tyler J. Russell.

use crate::error::GifEncodeError;

const NETSIZE: usize = 256;
const NETBIASSHIFT: i32 = 4;
const NCYCLES: u32 = 100;

// Frequency and bias
const INTBIASSHIFT: i32 = 16;
const INTBIAS: i32 = 1 << INTBIASSHIFT;
const GAMMASHIFT: i32 = 10;
const BETASHIFT: i32 = 10;
const BETA: i32 = INTBIAS >> BETASHIFT;
const BETAGAMMA: i32 = INTBIAS << (GAMMASHIFT - BETASHIFT);

// Defaults for decreasing radius: starts at netsize>>3 biased by 6 bits,
// decreases by a factor of 1/30 per cycle.
const INITRAD: usize = NETSIZE >> 3;
const RADIUSBIASSHIFT: i32 = 6;
const RADIUSBIAS: i32 = 1 << RADIUSBIASSHIFT;
const INITRADIUS: i32 = (INITRAD as i32) * RADIUSBIAS;
const RADIUSDEC: i32 = 30;

// Defaults for decreasing alpha: starts at 1.0 (biased).
const ALPHABIASSHIFT: i32 = 10;
const INITALPHA: i32 = 1 << ALPHABIASSHIFT;

// Radius-power constants.
const RADBIASSHIFT: i32 = 8;
const RADBIAS: i32 = 1 << RADBIASSHIFT;
const ALPHARADBSHIFT: i32 = ALPHABIASSHIFT + RADBIASSHIFT;
const ALPHARADBIAS: i32 = 1 << ALPHARADBSHIFT;

// Four primes near 500 - assume no image's byte length is divisible by
// all four.
const PRIME1: usize = 499;
const PRIME2: usize = 491;
const PRIME3: usize = 487;
const PRIME4: usize = 503;
const MINPICTUREBYTES: usize = 3 * PRIME4;

const INT_MAX: i32 = 0x7FFF_FFFF;

/// One neuron: biased (c0, c1, c2) plus its pre-sort network position.
///
/// The b/g/r labels used throughout this module name byte positions,
/// not literal color channels. `learn` reads picture bytes positionally
/// as three channels and `contest`/`alter_*` operate on them under the
/// labels b, g, r; `map` is called with the same positional order the
/// picture bytes arrive in. The labels never need to correspond to true
/// red/green/blue for palette and index output to be correct, as long
/// as both sides agree on the order.
type Neuron = [i32; 4];

/// Kohonen self-organizing map that learns a 256-color palette from a
/// 24-bit image and then serves as a nearest-color lookup structure.
///
/// Every array here is a fixed-size field, not a `Vec` — `reset` zeroes
/// values in place and never reallocates, so a `Quantizer` can be
/// reused across frames without touching the allocator.
pub struct Quantizer {
    network: [Neuron; NETSIZE],
    netindex: [usize; NETSIZE],
    bias: [i32; NETSIZE],
    freq: [i32; NETSIZE],
    radpower: [i32; INITRAD],
    sample_factor: u8,
}

impl Default for Quantizer {
    fn default() -> Self {
        let mut q = Quantizer {
            network: [[0; 4]; NETSIZE],
            netindex: [0; NETSIZE],
            bias: [0; NETSIZE],
            freq: [0; NETSIZE],
            radpower: [0; INITRAD],
            sample_factor: 1,
        };
        q.reset();
        q
    }
}

impl Quantizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets the lattice to its initial state: neuron `i`'s b, g and r
    /// all start at `(i << 12) / netsize`, frequencies start uniform,
    /// biases start at zero. Called once per frame before `process`.
    pub fn reset(&mut self) {
        for (i, neuron) in self.network.iter_mut().enumerate() {
            let v = ((i as i32) << 12) / NETSIZE as i32;
            *neuron = [v, v, v, 0];
        }
        self.netindex = [0; NETSIZE];
        self.bias = [0; NETSIZE];
        let base_freq = INTBIAS / NETSIZE as i32;
        for f in self.freq.iter_mut() {
            *f = base_freq;
        }
        self.radpower = [0; INITRAD];
    }

    /// Runs learn → unbias → sort → colormap over `picture` and returns
    /// the 768-byte (256 × RGB) palette. `picture` must be a non-empty
    /// multiple of 3 bytes (one triple per pixel).
    pub fn process(
        &mut self,
        picture: &[u8],
        sample_factor: u8,
    ) -> Result<[u8; 768], GifEncodeError> {
        if picture.is_empty() || picture.len() % 3 != 0 {
            return Err(GifEncodeError::InvalidFrame {
                reason: format!(
                    "picture byte length {} is not a positive multiple of 3",
                    picture.len()
                ),
            });
        }
        self.sample_factor = sample_factor.max(1);
        self.learn(picture);
        self.unbias_net();
        self.build_indexes();
        Ok(self.color_map())
    }

    fn learn(&mut self, picture: &[u8]) {
        let len = picture.len();
        if len < MINPICTUREBYTES {
            self.sample_factor = 1;
        }

        let alphadec = 30 + (self.sample_factor as i32 - 1) / 3;
        let sample_pixels = (len / (3 * self.sample_factor as usize)) as u32;
        let mut delta = sample_pixels / NCYCLES;
        if delta == 0 {
            delta = 1;
        }

        let mut alpha = INITALPHA;
        let mut radius = INITRADIUS;
        let mut rad = radius >> RADIUSBIASSHIFT;
        if rad <= 1 {
            rad = 0;
        }
        self.recalc_radpower(rad, alpha);

        let step = if len < MINPICTUREBYTES {
            3
        } else if len % PRIME1 != 0 {
            3 * PRIME1
        } else if len % PRIME2 != 0 {
            3 * PRIME2
        } else if len % PRIME3 != 0 {
            3 * PRIME3
        } else {
            3 * PRIME4
        };

        let mut pix = 0usize;
        let mut i = 0u32;
        while i < sample_pixels {
            let b = (picture[pix] as i32) << NETBIASSHIFT;
            let g = (picture[pix + 1] as i32) << NETBIASSHIFT;
            let r = (picture[pix + 2] as i32) << NETBIASSHIFT;

            let j = self.contest(b, g, r);
            self.alter_single(alpha, INITALPHA, j, b, g, r);
            if rad != 0 {
                self.alter_neighbors(rad, j, b, g, r);
            }

            pix += step;
            if pix >= len {
                pix -= len;
            }

            i += 1;
            if i % delta == 0 {
                alpha -= alpha / alphadec;
                radius -= radius / RADIUSDEC;
                rad = radius >> RADIUSBIASSHIFT;
                if rad <= 1 {
                    rad = 0;
                }
                self.recalc_radpower(rad, alpha);
            }
        }
    }

    /// For each neuron, tracks the plain-nearest and bias-adjusted
    /// nearest match while ageing every neuron's frequency/bias pair;
    /// returns the bias-adjusted winner.
    fn contest(&mut self, b: i32, g: i32, r: i32) -> usize {
        let mut best_d = INT_MAX;
        let mut best_bias_d = INT_MAX;
        let mut best_pos = 0usize;
        let mut best_bias_pos = 0usize;

        for i in 0..NETSIZE {
            let n = self.network[i];
            let dist = (n[0] - b).abs() + (n[1] - g).abs() + (n[2] - r).abs();
            if dist < best_d {
                best_d = dist;
                best_pos = i;
            }

            let bias_dist = dist - (self.bias[i] >> (INTBIASSHIFT - NETBIASSHIFT));
            if bias_dist < best_bias_d {
                best_bias_d = bias_dist;
                best_bias_pos = i;
            }

            let betafreq = self.freq[i] >> BETASHIFT;
            self.freq[i] -= betafreq;
            self.bias[i] += betafreq << GAMMASHIFT;
        }

        self.freq[best_pos] += BETA;
        self.bias[best_pos] -= BETAGAMMA;

        best_bias_pos
    }

    /// Moves neuron `i` toward (b, g, r) by `alpha / bias`.
    fn alter_single(&mut self, alpha: i32, bias: i32, i: usize, b: i32, g: i32, r: i32) {
        let n = &mut self.network[i];
        n[0] -= alpha * (n[0] - b) / bias;
        n[1] -= alpha * (n[1] - g) / bias;
        n[2] -= alpha * (n[2] - r) / bias;
    }

    /// Moves the neurons within `rad` of `i` toward (b, g, r), weighted
    /// by the precomputed `radpower` table.
    fn alter_neighbors(&mut self, rad: i32, i: usize, b: i32, g: i32, r: i32) {
        let rad = rad as isize;
        let lo = (i as isize - rad).max(-1);
        let hi = (i as isize + rad).min(NETSIZE as isize);

        let mut j = i as isize + 1;
        let mut k = i as isize - 1;
        let mut m = 1usize;

        while j < hi || k > lo {
            let a = self.radpower[m];
            m += 1;

            if j < hi {
                self.alter_single(a, ALPHARADBIAS, j as usize, b, g, r);
                j += 1;
            }
            if k > lo {
                self.alter_single(a, ALPHARADBIAS, k as usize, b, g, r);
                k -= 1;
            }
        }
    }

    fn recalc_radpower(&mut self, rad: i32, alpha: i32) {
        if rad <= 0 {
            return;
        }
        let rad_sq = rad * rad;
        for i in 0..rad as usize {
            let i_sq = (i as i32) * (i as i32);
            self.radpower[i] = alpha * (((rad_sq - i_sq) * RADBIAS) / rad_sq);
        }
    }

    /// Shifts every neuron's color back out of biased space and stamps
    /// its pre-sort network index into the fourth slot.
    fn unbias_net(&mut self) {
        for (i, neuron) in self.network.iter_mut().enumerate() {
            neuron[0] >>= NETBIASSHIFT;
            neuron[1] >>= NETBIASSHIFT;
            neuron[2] >>= NETBIASSHIFT;
            neuron[3] = i as i32;
        }
    }

    /// Selection-sorts the network ascending by its second channel (the
    /// pruning axis for `map`) and builds `netindex`, the per-value
    /// jump table into the sorted network.
    fn build_indexes(&mut self) {
        let mut prev_color = 0usize;
        let mut start_pos = 0usize;

        for i in 0..NETSIZE {
            let (min_pos, min_val) = {
                let (off, n) = self.network[i..]
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, n)| n[1])
                    .expect("network is non-empty");
                (i + off, n[1])
            };

            if min_pos != i {
                self.network.swap(min_pos, i);
            }

            let min_val = min_val as usize;
            if min_val != prev_color {
                self.netindex[prev_color] = (start_pos + i) >> 1;
                for idx in (prev_color + 1)..min_val {
                    self.netindex[idx] = i;
                }
            }

            prev_color = min_val;
            start_pos = i;
        }

        self.netindex[prev_color] = (start_pos + NETSIZE - 1) >> 1;
        for idx in (prev_color + 1)..NETSIZE {
            self.netindex[idx] = NETSIZE - 1;
        }
    }

    /// Writes the network back to a 768-byte palette ordered by each
    /// neuron's pre-sort index, so palette[3*i..3*i+3] is the color
    /// learned for original slot `i` regardless of where `build_indexes`
    /// moved it.
    fn color_map(&self) -> [u8; 768] {
        let mut sorted_pos_of = [0usize; NETSIZE];
        for (pos, neuron) in self.network.iter().enumerate() {
            sorted_pos_of[neuron[3] as usize] = pos;
        }

        let mut out = [0u8; 768];
        for (original_index, &pos) in sorted_pos_of.iter().enumerate() {
            let n = self.network[pos];
            out[original_index * 3] = n[0].clamp(0, 255) as u8;
            out[original_index * 3 + 1] = n[1].clamp(0, 255) as u8;
            out[original_index * 3 + 2] = n[2].clamp(0, 255) as u8;
        }
        out
    }

    /// Nearest-neuron lookup. `(c0, c1, c2)` must be passed in the same
    /// positional order `learn` read picture bytes in; see the module
    /// doc comment. Walks outward from `netindex[c1]` in both directions
    /// through the g-sorted network, pruning on the g distance first.
    pub fn map(&self, c0: u8, c1: u8, c2: u8) -> u8 {
        let (b, g, r) = (c0 as i32, c1 as i32, c2 as i32);
        let mut best_d = 1000i32;
        let mut best = 0i32;

        let netsize = NETSIZE as isize;
        let mut i = self.netindex[c1 as usize] as isize;
        let mut j = i - 1;

        while i < netsize || j >= 0 {
            if i < netsize {
                let n = self.network[i as usize];
                let dist = (n[1] - g).abs();
                if dist >= best_d {
                    i = netsize;
                } else {
                    i += 1;
                    let mut dist = dist + (n[0] - b).abs();
                    if dist < best_d {
                        dist += (n[2] - r).abs();
                        if dist < best_d {
                            best_d = dist;
                            best = n[3];
                        }
                    }
                }
            }

            if j >= 0 {
                let n = self.network[j as usize];
                let dist = (g - n[1]).abs();
                if dist >= best_d {
                    j = -1;
                } else {
                    j -= 1;
                    let mut dist = dist + (n[0] - b).abs();
                    if dist < best_d {
                        dist += (n[2] - r).abs();
                        if dist < best_d {
                            best_d = dist;
                            best = n[3];
                        }
                    }
                }
            }
        }

        best as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_picture(r: u8, g: u8, b: u8, pixels: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            out.push(r);
            out.push(g);
            out.push(b);
        }
        out
    }

    #[test]
    fn rejects_non_triple_length() {
        let mut q = Quantizer::new();
        assert!(q.process(&[1, 2], 10).is_err());
    }

    #[test]
    fn rejects_empty_picture() {
        let mut q = Quantizer::new();
        assert!(q.process(&[], 10).is_err());
    }

    #[test]
    fn solid_color_converges_to_single_palette_entry() {
        let mut q = Quantizer::new();
        let picture = solid_picture(0xff, 0x00, 0x00, 600);
        let palette = q.process(&picture, 10).unwrap();

        let idx = q.map(0xff, 0x00, 0x00);
        assert_eq!(palette[idx as usize * 3], 0xff);
        assert_eq!(palette[idx as usize * 3 + 1], 0x00);
        assert_eq!(palette[idx as usize * 3 + 2], 0x00);
    }

    #[test]
    fn reset_then_process_is_idempotent_for_same_input() {
        let mut q = Quantizer::new();
        let picture = solid_picture(0x10, 0x80, 0xc0, 2048);

        let palette_a = q.process(&picture, 5).unwrap();
        q.reset();
        let palette_b = q.process(&picture, 5).unwrap();

        assert_eq!(palette_a, palette_b);
    }

    #[test]
    fn map_stays_within_palette_bounds() {
        let mut q = Quantizer::new();
        let picture = solid_picture(0x22, 0x44, 0x66, 1509);
        q.process(&picture, 10).unwrap();

        for c1 in 0..=255u8 {
            let idx = q.map(0x22, c1, 0x66);
            assert!((idx as usize) < 256);
        }
    }
}
