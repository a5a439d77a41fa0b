/// One RGB24 input frame.
///
/// `rgb` is row-major, top-to-bottom, R/G/B byte order, length exactly
/// `width * height * 3`. The encoder borrows it for the duration of
/// `add_frame` and never retains it past that call.
#[derive(Debug, Clone)]
pub struct Frame<'a> {
    pub width: u16,
    pub height: u16,
    pub rgb: &'a [u8],
    /// If set, row `y` of the quantizer's input is row `height - 1 - y`
    /// of `rgb` — rows are reversed before quantization, not after.
    pub flipped_y: bool,
    /// Delay in seconds. A negative value means "derive it from the
    /// encoder's configured frame rate" rather than 0 meaning "no
    /// delay" — 0.0 is a legitimate (if unusual) requested delay.
    pub delay: f64,
}

impl<'a> Frame<'a> {
    /// A frame with no explicit delay (falls back to the encoder's
    /// frame rate) and rows in on-disk order.
    pub fn new(width: u16, height: u16, rgb: &'a [u8]) -> Self {
        Frame { width, height, rgb, flipped_y: false, delay: -1.0 }
    }
}

/// GIF Netscape 2.0 loop-count encoding.
///
/// `Infinite` writes a loop count of 0; `NoRepeat` skips the extension
/// entirely; `Finite(n)` writes `n` as the number of additional loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Infinite,
    NoRepeat,
    Finite(u16),
}
