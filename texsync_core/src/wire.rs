//! Raw fixed-length wire layout of `SharedState`.
//!
//! ```text
//! offset 0        4        8                 8+N     9+N        17+N
//!        | time   | angle  | payload (N=w*h*3) | flag | version  |
//!        | f32 ne | f32 ne | RGB8 row-major    | u8   | u64 ne   |
//! ```
//!
//! No framing, no length prefix, no endianness normalization. Every node must
//! be built with the same dimensions; the only mismatch the decoder can see
//! is a total length that differs.

use crate::state::{Dimensions, Payload, SharedState};
use texsync_env::{EnvError, WireSnapshot};

/// Bytes preceding the payload (`time` + `angle`).
const HEAD_LEN: usize = 8;

/// Bytes following the payload (`update_flag` + `version`).
const TAIL_LEN: usize = 9;

/// Total encoded length of a snapshot with the given dimensions.
pub fn wire_len(dims: Dimensions) -> usize {
    HEAD_LEN + dims.byte_len() + TAIL_LEN
}

impl WireSnapshot for SharedState {
    fn encoded_len(&self) -> usize {
        wire_len(self.dimensions())
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        out.extend_from_slice(&self.time.to_ne_bytes());
        out.extend_from_slice(&self.angle.to_ne_bytes());
        out.extend_from_slice(self.payload.as_bytes());
        out.push(self.update_flag as u8);
        out.extend_from_slice(&self.version.to_ne_bytes());
    }

    fn decode_like(&self, bytes: &[u8]) -> Result<Self, EnvError> {
        let dims = self.dimensions();
        let expected = wire_len(dims);
        if bytes.len() != expected {
            return Err(EnvError::WireSize {
                expected,
                actual: bytes.len(),
            });
        }

        let (head, rest) = bytes.split_at(HEAD_LEN);
        let (pixels, tail) = rest.split_at(dims.byte_len());

        let payload = Payload::from_bytes(dims, pixels)
            .map_err(|e| EnvError::Decode(e.to_string()))?;

        Ok(SharedState {
            time: f32::from_ne_bytes(field(&head[0..4])?),
            angle: f32::from_ne_bytes(field(&head[4..8])?),
            payload,
            update_flag: tail[0] != 0,
            version: u64::from_ne_bytes(field(&tail[1..9])?),
        })
    }
}

fn field<const N: usize>(bytes: &[u8]) -> Result<[u8; N], EnvError> {
    bytes
        .try_into()
        .map_err(|_| EnvError::Decode(format!("expected {} byte field", N)))
}
