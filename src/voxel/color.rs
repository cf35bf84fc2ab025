//! Quantized voxel colors.
//!
//! Colors cross the engine boundary packed into a single integer, with each
//! channel stored in its own contiguous bit range. A channel of `n` bits holds
//! `2^n` levels which are mapped onto 0..=255 by multiplying with
//! `255 / (2^n - 1)` (integer division). Encoding divides by the same factor,
//! so the round trip truncates to the nearest level below.
//!
//! The wire format is [`ColorLayout::RGBA4444`]:
//!
//! ```text
//! bit  15..12  11..8   7..4    3..0
//!      red     green   blue    alpha
//! ```

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::core::Vec4;

/// Color channel selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Red,
    Green,
    Blue,
    Alpha,
}

impl Channel {
    /// All channels in RGBA order.
    pub const ALL: [Channel; 4] = [Channel::Red, Channel::Green, Channel::Blue, Channel::Alpha];
}

/// Inclusive `[msb, lsb]` bit range of one channel inside the packed integer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelBits {
    pub msb: u32,
    pub lsb: u32,
}

impl ChannelBits {
    /// Create a bit range. Channels are 1 to 8 bits wide and fit in 32 bits.
    pub const fn new(msb: u32, lsb: u32) -> Self {
        assert!(msb >= lsb, "msb below lsb");
        assert!(msb < 32, "channel exceeds 32 bits");
        assert!(msb - lsb < 8, "channel wider than 8 bits");
        Self { msb, lsb }
    }

    /// Number of bits in the field.
    #[inline]
    pub const fn width(self) -> u32 {
        self.msb - self.lsb + 1
    }

    /// Largest raw field value.
    #[inline]
    pub const fn max_level(self) -> u32 {
        (1 << self.width()) - 1
    }

    /// Mask selecting the field in place.
    #[inline]
    pub const fn mask(self) -> u32 {
        self.max_level() << self.lsb
    }

    /// Multiplier from field levels to 0..=255.
    #[inline]
    pub const fn scale(self) -> u32 {
        u8::MAX as u32 / self.max_level()
    }

    /// Raw field value.
    #[inline]
    pub const fn extract(self, packed: u32) -> u32 {
        (packed >> self.lsb) & self.max_level()
    }

    /// Decode the field to 0..=255.
    #[inline]
    pub const fn decode(self, packed: u32) -> u8 {
        (self.extract(packed) * self.scale()) as u8
    }

    /// Overwrite the field with `value`, leaving every other bit untouched.
    #[inline]
    pub const fn encode(self, packed: u32, value: u8) -> u32 {
        let level = (value as u32 / self.scale()) & self.max_level();
        (packed & !self.mask()) | (level << self.lsb)
    }
}

/// Bit partition of a packed RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorLayout {
    pub red: ChannelBits,
    pub green: ChannelBits,
    pub blue: ChannelBits,
    pub alpha: ChannelBits,
}

impl ColorLayout {
    /// 4 bits per channel in a `u16`, red in the high nibble.
    pub const RGBA4444: Self = Self {
        red: ChannelBits::new(15, 12),
        green: ChannelBits::new(11, 8),
        blue: ChannelBits::new(7, 4),
        alpha: ChannelBits::new(3, 0),
    };

    /// Bit range of a channel.
    #[inline]
    pub const fn channel(&self, channel: Channel) -> ChannelBits {
        match channel {
            Channel::Red => self.red,
            Channel::Green => self.green,
            Channel::Blue => self.blue,
            Channel::Alpha => self.alpha,
        }
    }

    /// Total bits used by all channels.
    pub const fn total_bits(&self) -> u32 {
        self.red.width() + self.green.width() + self.blue.width() + self.alpha.width()
    }

    /// True if no two channels share a bit.
    pub const fn is_disjoint(&self) -> bool {
        let (r, g, b, a) = (
            self.red.mask(),
            self.green.mask(),
            self.blue.mask(),
            self.alpha.mask(),
        );
        r & g == 0 && r & b == 0 && r & a == 0 && g & b == 0 && g & a == 0 && b & a == 0
    }

    /// Decode one channel.
    #[inline]
    pub const fn get(&self, packed: u32, channel: Channel) -> u8 {
        self.channel(channel).decode(packed)
    }

    /// Read-modify-write one channel.
    #[inline]
    pub const fn set(&self, packed: u32, channel: Channel, value: u8) -> u32 {
        self.channel(channel).encode(packed, value)
    }

    /// Pack all four channels.
    pub const fn pack(&self, rgba: [u8; 4]) -> u32 {
        let packed = self.red.encode(0, rgba[0]);
        let packed = self.green.encode(packed, rgba[1]);
        let packed = self.blue.encode(packed, rgba[2]);
        self.alpha.encode(packed, rgba[3])
    }

    /// Unpack all four channels.
    pub const fn unpack(&self, packed: u32) -> [u8; 4] {
        [
            self.red.decode(packed),
            self.green.decode(packed),
            self.blue.decode(packed),
            self.alpha.decode(packed),
        ]
    }
}

/// Encode RGBA8888 to the RGBA4444 wire format
pub fn encode(r: u8, g: u8, b: u8, a: u8) -> u16 {
    ColorLayout::RGBA4444.pack([r, g, b, a]) as u16
}

/// Decode one channel of an RGBA4444 value
pub fn decode(packed: u16, channel: Channel) -> u8 {
    ColorLayout::RGBA4444.get(packed as u32, channel)
}

/// Replace one channel of an RGBA4444 value
pub fn set_channel(packed: u16, channel: Channel, value: u8) -> u16 {
    ColorLayout::RGBA4444.set(packed as u32, channel, value) as u16
}

/// Voxel color as stored and transmitted by the engine - exactly 2 bytes
#[repr(transparent)]
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize,
)]
pub struct QuantizedColor(u16);

impl QuantizedColor {
    pub const LAYOUT: ColorLayout = ColorLayout::RGBA4444;

    /// Fully transparent black (empty voxel)
    pub const TRANSPARENT: QuantizedColor = QuantizedColor(0);

    /// Opaque white
    pub const WHITE: QuantizedColor = QuantizedColor(u16::MAX);

    /// Create from 8-bit channels (lossy)
    pub fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Self {
        Self(encode(red, green, blue, alpha))
    }

    /// Wrap a raw wire value
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw wire value
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Create from normalized floats. Each channel is scaled by 255 and
    /// truncated; values outside 0..=1 saturate.
    pub fn from_rgba_f32(rgba: [f32; 4]) -> Self {
        Self::new(
            (rgba[0] * 255.0) as u8,
            (rgba[1] * 255.0) as u8,
            (rgba[2] * 255.0) as u8,
            (rgba[3] * 255.0) as u8,
        )
    }

    /// Decode one channel
    pub fn get(self, channel: Channel) -> u8 {
        decode(self.0, channel)
    }

    /// Replace one channel in place
    pub fn set(&mut self, channel: Channel, value: u8) {
        self.0 = set_channel(self.0, channel, value);
    }

    /// Copy with one channel replaced
    pub fn with(mut self, channel: Channel, value: u8) -> Self {
        self.set(channel, value);
        self
    }

    pub fn red(self) -> u8 {
        self.get(Channel::Red)
    }

    pub fn green(self) -> u8 {
        self.get(Channel::Green)
    }

    pub fn blue(self) -> u8 {
        self.get(Channel::Blue)
    }

    pub fn alpha(self) -> u8 {
        self.get(Channel::Alpha)
    }

    pub fn set_red(&mut self, value: u8) {
        self.set(Channel::Red, value);
    }

    pub fn set_green(&mut self, value: u8) {
        self.set(Channel::Green, value);
    }

    pub fn set_blue(&mut self, value: u8) {
        self.set(Channel::Blue, value);
    }

    pub fn set_alpha(&mut self, value: u8) {
        self.set(Channel::Alpha, value);
    }

    /// Decode all channels as RGBA8888
    pub fn to_rgba(self) -> [u8; 4] {
        Self::LAYOUT.unpack(self.0 as u32)
    }

    /// Check if the voxel is fully transparent
    pub fn is_transparent(self) -> bool {
        self.alpha() == 0
    }
}

impl From<[u8; 4]> for QuantizedColor {
    fn from(rgba: [u8; 4]) -> Self {
        Self::new(rgba[0], rgba[1], rgba[2], rgba[3])
    }
}

impl From<QuantizedColor> for [u8; 4] {
    fn from(color: QuantizedColor) -> Self {
        color.to_rgba()
    }
}

impl From<Vec4> for QuantizedColor {
    fn from(color: Vec4) -> Self {
        Self::from_rgba_f32(color.to_array())
    }
}
