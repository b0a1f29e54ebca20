//! Packed pointer/length channel values.
//!
//! Every cross-boundary call returns a single `u64` that carries a buffer
//! location inside the callee's linear memory: the 32-bit offset in the high
//! half and the 32-bit byte count in the low half.

/// A (pointer, length) pair addressing a buffer in a linear memory.
///
/// A zero pointer means "no buffer"; such a channel must not be read from or
/// freed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Channel {
    ptr: u32,
    len: u32,
}

impl Channel {
    /// The empty channel, returned when a callee produced no buffer.
    pub const NULL: Self = Self { ptr: 0, len: 0 };

    /// Create a channel from a pointer and a length.
    pub const fn new(ptr: u32, len: u32) -> Self {
        Self { ptr, len }
    }

    /// Pack into the wire representation.
    pub const fn pack(self) -> u64 {
        ((self.ptr as u64) << 32) | self.len as u64
    }

    /// Unpack from the wire representation.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn unpack(value: u64) -> Self {
        Self {
            ptr: (value >> 32) as u32,
            len: value as u32,
        }
    }

    /// Offset of the buffer in the target's memory.
    pub const fn ptr(self) -> u32 {
        self.ptr
    }

    /// Length of the buffer in bytes.
    pub const fn len(self) -> u32 {
        self.len
    }

    /// Returns `true` if the buffer has zero length.
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Returns `true` if the channel carries no buffer.
    pub const fn is_null(self) -> bool {
        self.ptr == 0
    }
}

impl From<u64> for Channel {
    fn from(value: u64) -> Self {
        Self::unpack(value)
    }
}

impl From<Channel> for u64 {
    fn from(channel: Channel) -> Self {
        channel.pack()
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}+{}", self.ptr, self.len)
    }
}
