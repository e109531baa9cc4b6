//! The shared state value and its pixel payload.
//!
//! `SharedState` is the single entity replicated between nodes. It is a plain
//! value: followers hold their own copy, never a reference into the
//! authority's memory. The pixel buffer sits behind an `Arc<[u8]>` and is
//! never mutated in place, so cloning a snapshot is cheap and a published
//! snapshot cannot change underneath the transport.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Bytes per pixel (RGB8).
pub const CHANNELS: usize = 3;

/// Side length of the square texture every participant is built with.
///
/// Taken from the `TEXSYNC_RESOLUTION` environment variable at compile time,
/// 1080 otherwise. There is no runtime negotiation: nodes built with
/// different values silently disagree on the wire layout.
pub const BUILD_RESOLUTION: usize = parse_side(option_env!("TEXSYNC_RESOLUTION"), 1080);

const fn parse_side(value: Option<&str>, default: usize) -> usize {
    let bytes = match value {
        Some(v) => v.as_bytes(),
        None => return default,
    };
    if bytes.is_empty() {
        return default;
    }

    let mut side = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        assert!(bytes[i].is_ascii_digit(), "TEXSYNC_RESOLUTION must be a decimal integer");
        side = side * 10 + (bytes[i] - b'0') as usize;
        i += 1;
    }
    assert!(side > 0, "TEXSYNC_RESOLUTION must be positive");
    side
}

/// Errors raised when building state values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    /// Width or height was zero
    #[error("Invalid dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// Pixel bytes do not match `width * height * 3`
    #[error("Payload size mismatch: expected {expected} bytes, got {actual}")]
    PayloadSize { expected: usize, actual: usize },
}

/// Texture dimensions in pixels. Both sides are always non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDimensions")]
pub struct Dimensions {
    width: usize,
    height: usize,
}

/// Unchecked serde form of [`Dimensions`].
#[derive(Deserialize)]
struct RawDimensions {
    width: usize,
    height: usize,
}

impl TryFrom<RawDimensions> for Dimensions {
    type Error = StateError;

    fn try_from(raw: RawDimensions) -> Result<Self, Self::Error> {
        Dimensions::new(raw.width, raw.height)
    }
}

impl Dimensions {
    /// The build-time dimensions shared by all participating processes.
    pub const BUILD: Dimensions = Dimensions {
        width: BUILD_RESOLUTION,
        height: BUILD_RESOLUTION,
    };

    /// Creates dimensions, rejecting a zero side.
    pub const fn new(width: usize, height: usize) -> Result<Self, StateError> {
        if width == 0 || height == 0 {
            return Err(StateError::InvalidDimensions { width, height });
        }
        Ok(Self { width, height })
    }

    /// Creates square dimensions.
    pub const fn square(side: usize) -> Result<Self, StateError> {
        Self::new(side, side)
    }
    
    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }
    
    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Payload length in bytes (`width * height * 3`).
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * CHANNELS
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Immutable RGB8 pixel buffer with declared dimensions.
#[derive(Clone, PartialEq, Eq)]
pub struct Payload {
    dims: Dimensions,
    data: Arc<[u8]>,
}

impl Payload {
    /// An all-black payload.
    pub fn zeroed(dims: Dimensions) -> Self {
        Self {
            dims,
            data: vec![0u8; dims.byte_len()].into(),
        }
    }

    /// Wraps existing pixel bytes, checking the length against `dims`.
    pub fn from_bytes(dims: Dimensions, bytes: impl Into<Arc<[u8]>>) -> Result<Self, StateError> {
        let data = bytes.into();
        if data.len() != dims.byte_len() {
            return Err(StateError::PayloadSize {
                expected: dims.byte_len(),
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    /// Wraps a buffer the caller sized from `dims`.
    pub(crate) fn from_sized(dims: Dimensions, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), dims.byte_len());
        Self {
            dims,
            data: data.into(),
        }
    }

    /// Returns the declared dimensions.
    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    /// Returns the raw RGB bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for a buffer with no pixels (never for valid dimensions).
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the pixel at `(x, y)`, or `None` when out of bounds.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.dims.width() || y >= self.dims.height() {
            return None;
        }
        let i = (y * self.dims.width() + x) * CHANNELS;
        Some([self.data[i], self.data[i + 1], self.data[i + 2]])
    }

    /// Returns true if both payloads share one allocation.
    pub fn shares_buffer(&self, other: &Payload) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("dims", &self.dims)
            .field("len", &self.data.len())
            .finish()
    }
}

/// One complete, self-consistent copy of the replicated state.
///
/// Only the authority driver advances these fields; everyone else treats a
/// `SharedState` as a read-only value replaced wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedState {
    /// Simulated seconds since start (or since the last reset)
    pub time: f32,

    /// Orientation in degrees
    pub angle: f32,

    /// Latest generated texture
    pub payload: Payload,

    /// Hint that the payload was refreshed during the tick that produced
    /// this snapshot. Not used for change detection.
    pub update_flag: bool,

    /// Tick counter, the only trusted change-detection signal
    pub version: u64,
}

impl SharedState {
    /// Zero/default state with a black payload.
    pub fn initial(dims: Dimensions) -> Self {
        Self {
            time: 0.0,
            angle: 0.0,
            payload: Payload::zeroed(dims),
            update_flag: false,
            version: 0,
        }
    }

    /// Returns the payload dimensions.
    pub fn dimensions(&self) -> Dimensions {
        self.payload.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_side() {
        assert_eq!(parse_side(None, 1080), 1080);
        assert_eq!(parse_side(Some(""), 1080), 1080);
        assert_eq!(parse_side(Some("256"), 1080), 256);
    }

    #[test]
    fn test_dimensions_reject_zero() {
        assert_eq!(
            Dimensions::new(0, 4),
            Err(StateError::InvalidDimensions { width: 0, height: 4 })
        );
        let dims = Dimensions::new(4, 3).unwrap();
        assert_eq!(dims.pixel_count(), 12);
        assert_eq!(dims.byte_len(), 36);
        assert_eq!(dims.to_string(), "4x3");
    }

    #[test]
    fn test_build_dimensions_are_square() {
        assert_eq!(Dimensions::BUILD.width(), BUILD_RESOLUTION);
        assert_eq!(Dimensions::BUILD.height(), BUILD_RESOLUTION);
    }

    #[test]
    fn test_deserialize_rejects_zero_side() {
        let err = serde_json::from_str::<Dimensions>(r#"{"width":0,"height":4}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid dimensions 0x4"), "{}", err);

        let dims: Dimensions = serde_json::from_str(r#"{"width":3,"height":2}"#).unwrap();
        assert_eq!(dims, Dimensions::new(3, 2).unwrap());
        assert_eq!(serde_json::to_string(&dims).unwrap(), r#"{"width":3,"height":2}"#);
    }

    #[test]
    fn test_payload_length_checked() {
        let dims = Dimensions::new(2, 2).unwrap();
        assert!(Payload::from_bytes(dims, vec![0u8; 12]).is_ok());
        assert_eq!(
            Payload::from_bytes(dims, vec![0u8; 11]),
            Err(StateError::PayloadSize { expected: 12, actual: 11 })
        );
    }

    #[test]
    fn test_payload_pixel_bounds() {
        let dims = Dimensions::new(2, 1).unwrap();
        let payload = Payload::from_bytes(dims, vec![1, 2, 3, 4, 5, 6]).unwrap();

        assert_eq!(payload.pixel(0, 0), Some([1, 2, 3]));
        assert_eq!(payload.pixel(1, 0), Some([4, 5, 6]));
        assert_eq!(payload.pixel(2, 0), None);
        assert_eq!(payload.pixel(0, 1), None);
    }

    #[test]
    fn test_snapshot_clone_shares_pixels() {
        let state = SharedState::initial(Dimensions::square(8).unwrap());
        let snapshot = state.clone();

        assert!(snapshot.payload.shares_buffer(&state.payload));
        assert_eq!(snapshot, state);
    }

    #[test]
    fn test_initial_state_is_zeroed() {
        let state = SharedState::initial(Dimensions::square(3).unwrap());
        assert_eq!(state.time, 0.0);
        assert_eq!(state.angle, 0.0);
        assert_eq!(state.version, 0);
        assert!(!state.update_flag);
        assert!(state.payload.as_bytes().iter().all(|b| *b == 0));
    }
}
