use crate::DecodeError;

/// Sequential big-endian reader over a realtime frame.
///
/// Bounds are checked once up front by the caller, so the accessors index
/// without further checks.
pub struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        if self.remaining() < N {
            return Err(DecodeError::Truncated {
                needed: self.pos + N,
                available: self.buf.len(),
            });
        }
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(bytes)
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        self.take::<4>().map(u32::from_be_bytes)
    }

    pub fn f64(&mut self) -> Result<f64, DecodeError> {
        self.take::<8>().map(f64::from_be_bytes)
    }

    pub fn array<const N: usize>(&mut self) -> Result<[f64; N], DecodeError> {
        let mut values = [0.0; N];
        for value in values.iter_mut() {
            *value = self.f64()?;
        }
        Ok(values)
    }
}

#[derive(Default)]
pub struct FrameWriter {
    buf: Vec<u8>,
}

impl FrameWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    pub fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn array<const N: usize>(&mut self, values: &[f64; N]) {
        for value in values {
            self.f64(*value);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Declares the realtime frame layout once and derives the record struct, its
/// decoder and its encoder from the same field list, in wire order.
///
/// Each field is either `f64` (one double) or `[N]` (N consecutive doubles).
macro_rules! realtime_layout {
    (@ty f64) => { f64 };
    (@ty [$n:literal]) => { [f64; $n] };
    (@width f64) => { 1 };
    (@width [$n:literal]) => { $n };
    (@read $reader:ident, f64) => { $reader.f64()? };
    (@read $reader:ident, [$n:literal]) => { $reader.array::<$n>()? };
    (@write $writer:ident, $value:expr, f64) => { $writer.f64($value) };
    (@write $writer:ident, $value:expr, [$n:literal]) => { $writer.array::<$n>(&$value) };
    ($( $(#[$meta:meta])* $field:ident : $kind:tt ),* $(,)?) => {
        /// One decoded UR realtime frame (controller software 5.10 layout).
        ///
        /// Mode and bitmask fields keep the controller's raw doubles so a
        /// record re-encodes to the exact bytes it came from; use the typed
        /// accessors to interpret them.
        #[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
        pub struct RealtimeRecord {
            pub message_size: u32,
            $( $(#[$meta])* pub $field: realtime_layout!(@ty $kind), )*
        }

        impl Default for RealtimeRecord {
            fn default() -> Self {
                Self {
                    message_size: FRAME_SIZE as u32,
                    $( $field: Default::default(), )*
                }
            }
        }

        impl RealtimeRecord {
            /// Number of doubles following the size prefix.
            pub const FIELD_COUNT: usize = 0 $( + realtime_layout!(@width $kind) )*;

            fn read_fields(
                message_size: u32,
                reader: &mut $crate::realtime::FrameReader<'_>,
            ) -> Result<Self, $crate::DecodeError> {
                Ok(Self {
                    message_size,
                    $( $field: realtime_layout!(@read reader, $kind), )*
                })
            }

            fn write_fields(&self, writer: &mut $crate::realtime::FrameWriter) {
                $( realtime_layout!(@write writer, self.$field, $kind); )*
            }
        }
    };
}
