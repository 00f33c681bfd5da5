//! Error types for H.264/AVC decoding.

use thiserror::Error;

/// AVC decoding error types.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of NAL unit while reading bits.
    #[error("bitstream underflow: needed {needed} more bits at bit {at}")]
    BitstreamUnderflow { needed: usize, at: usize },

    /// Referenced SPS/PPS/subset-SPS is absent or invalid.
    #[error("invalid parameter set: {0}")]
    InvalidParameterSet(String),

    /// Profile/chroma combination outside the supported set.
    #[error("unsupported profile: {0}")]
    UnsupportedProfile(String),

    /// Out-of-range syntax element.
    #[error("syntax violation: {0}")]
    SyntaxViolation(String),

    /// A slice was detected missing or aborted mid-parse.
    #[error("slice loss: {0}")]
    SliceLoss(String),

    /// The decoded picture buffer ran out of room.
    #[error("DPB overflow: {0}")]
    DpbOverflow(String),

    /// Error annotated with where in the stream it was raised.
    #[error("{source} (nal_unit_type {nal_unit_type}, byte offset {byte_offset}, in {component})")]
    Annotated {
        #[source]
        source: Box<DecodeError>,
        nal_unit_type: u8,
        byte_offset: usize,
        component: &'static str,
    },
}

impl DecodeError {
    /// Wrap an error with the NAL/offset/component context required by the
    /// decoder surface.
    pub fn annotate(self, nal_unit_type: u8, byte_offset: usize, component: &'static str) -> Self {
        match self {
            DecodeError::Annotated { .. } => self,
            other => DecodeError::Annotated {
                source: Box::new(other),
                nal_unit_type,
                byte_offset,
                component,
            },
        }
    }

    /// The error kind with any annotation stripped.
    pub fn kind(&self) -> &DecodeError {
        match self {
            DecodeError::Annotated { source, .. } => source.kind(),
            other => other,
        }
    }

    /// True for errors that abort the whole decoding session rather than a
    /// single slice.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            DecodeError::InvalidParameterSet(_) | DecodeError::UnsupportedProfile(_)
        )
    }
}

/// Result type alias for AVC operations.
pub type Result<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotate_keeps_kind() {
        let err = DecodeError::SyntaxViolation("mb_type 49 out of range".into());
        let err = err.annotate(5, 1234, "macroblock");
        assert!(matches!(err.kind(), DecodeError::SyntaxViolation(_)));
        assert!(!err.is_fatal());
        let msg = err.to_string();
        assert!(msg.contains("nal_unit_type 5"));
        assert!(msg.contains("1234"));
    }

    #[test]
    fn test_fatal_kinds() {
        assert!(DecodeError::InvalidParameterSet("PPS 3 not found".into()).is_fatal());
        assert!(DecodeError::UnsupportedProfile("profile 83".into()).is_fatal());
        assert!(!DecodeError::BitstreamUnderflow { needed: 8, at: 0 }.is_fatal());
        assert!(!DecodeError::DpbOverflow("used 17 of 16".into()).is_fatal());
    }
}
