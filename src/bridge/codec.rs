//! Frame decoding and status encoding.
//!
//! Decoding is pure: the only session input is the last accepted sequence
//! number, passed in by the caller.

use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::domain::ControlCommand;
use crate::error::DecodeError;
use crate::ws::messages::StatusFrame;

/// Converts inbound frames into [`ControlCommand`]s and statuses into
/// outbound frames.
#[derive(Debug, Clone, Copy)]
pub struct CommandCodec {
    tolerance: f64,
}

impl CommandCodec {
    /// Creates a codec that rejects components with `|v| > tolerance`.
    ///
    /// Magnitudes in `(1.0, tolerance]` are accepted and clamped.
    #[must_use]
    pub const fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Decodes one frame `{ "forward_back": f, "left_right": f, "seq": u }`.
    ///
    /// # Errors
    ///
    /// - [`DecodeError::InvalidEncoding`] if the frame is not a JSON object
    ///   or a field has the wrong type.
    /// - [`DecodeError::MissingField`] if a field is absent or `null`.
    /// - [`DecodeError::OutOfRange`] if a component exceeds the tolerance.
    /// - [`DecodeError::StaleSequence`] if `seq <= last_seq`.
    pub fn decode(
        &self,
        frame: &[u8],
        last_seq: Option<u64>,
        received_at: Instant,
    ) -> Result<ControlCommand, DecodeError> {
        let value: Value = serde_json::from_slice(frame)
            .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;
        let Value::Object(fields) = value else {
            return Err(DecodeError::InvalidEncoding(
                "frame is not a JSON object".to_string(),
            ));
        };

        let forward_back = self.component(&fields, "forward_back")?;
        let left_right = self.component(&fields, "left_right")?;
        let seq = required(&fields, "seq")?.as_u64().ok_or_else(|| {
            DecodeError::InvalidEncoding("`seq` must be a non-negative integer".to_string())
        })?;

        if let Some(last) = last_seq
            && seq <= last
        {
            return Err(DecodeError::StaleSequence { seq, last });
        }

        Ok(ControlCommand::new(forward_back, left_right, seq, received_at))
    }

    fn component(&self, fields: &Map<String, Value>, field: &'static str) -> Result<f64, DecodeError> {
        let value = required(fields, field)?.as_f64().ok_or_else(|| {
            DecodeError::InvalidEncoding(format!("`{field}` must be a number"))
        })?;
        if value.abs() > self.tolerance {
            return Err(DecodeError::OutOfRange { field, value });
        }
        Ok(value)
    }

    /// Encodes an outbound status frame.
    #[must_use]
    pub fn encode(status: &StatusFrame) -> String {
        serde_json::to_string(status).unwrap_or_default()
    }
}

fn required<'a>(fields: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, DecodeError> {
    match fields.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(value) => Ok(value),
    }
}
