//! Viseme shape channels.
//!
//! Each viseme frame carries one weight per facial channel, in the fixed
//! order the server emits them. The avatar's GLTF meshes expose morph
//! targets under these same names; the renderer only deals in indices and
//! leaves the name → morph-target mapping to the sink.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of weight channels per viseme frame.
pub const SHAPE_CHANNELS: usize = 55;

/// Viseme frames are authored at a fixed 60 Hz cadence.
pub const SHAPE_FRAME_RATE: f64 = 60.0;

/// Channel names in wire order. The blink channels (0 and 7) are also
/// driven by the idle animation when no viseme sequence is active.
pub const SHAPE_CHANNEL_NAMES: [&str; SHAPE_CHANNELS] = [
    "eyeBlinkLeft",
    "eyeLookDownLeft",
    "eyeLookInLeft",
    "eyeLookOutLeft",
    "eyeLookUpLeft",
    "eyeSquintLeft",
    "eyeWideLeft",
    "eyeBlinkRight",
    "eyeLookDownRight",
    "eyeLookInRight",
    "eyeLookOutRight",
    "eyeLookUpRight",
    "eyeSquintRight",
    "eyeWideRight",
    "jawForward",
    "jawLeft",
    "jawRight",
    "jawOpen",
    "mouthClose",
    "mouthFunnel",
    "mouthPucker",
    "mouthLeft",
    "mouthRight",
    "mouthSmileLeft",
    "mouthSmileRight",
    "mouthFrownLeft",
    "mouthFrownRight",
    "mouthDimpleLeft",
    "mouthDimpleRight",
    "mouthStretchLeft",
    "mouthStretchRight",
    "mouthRollLower",
    "mouthRollUpper",
    "mouthShrugLower",
    "mouthShrugUpper",
    "mouthPressLeft",
    "mouthPressRight",
    "mouthLowerDownLeft",
    "mouthLowerDownRight",
    "mouthUpperUpLeft",
    "mouthUpperUpRight",
    "browDownLeft",
    "browDownRight",
    "browInnerUp",
    "browOuterUpLeft",
    "browOuterUpRight",
    "cheekPuff",
    "cheekSquintLeft",
    "cheekSquintRight",
    "noseSneerLeft",
    "noseSneerRight",
    "tongueOut",
    "headRoll",
    "leftEyeRoll",
    "rightEyeRoll",
];

/// One frame of viseme channel weights.
#[derive(Debug, Clone, PartialEq)]
pub struct VisemeFrame(pub [f32; SHAPE_CHANNELS]);

// serde only derives array impls up to length 32, so serialize the 55-wide
// frame by hand with the same wire shape the derive would have produced
// (a tuple of SHAPE_CHANNELS floats).
impl Serialize for VisemeFrame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(SHAPE_CHANNELS)?;
        for weight in &self.0 {
            tup.serialize_element(weight)?;
        }
        tup.end()
    }
}

impl<'de> Deserialize<'de> for VisemeFrame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FrameVisitor;

        impl<'de> Visitor<'de> for FrameVisitor {
            type Value = VisemeFrame;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "an array of {SHAPE_CHANNELS} f32 weights")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut frame = [0.0f32; SHAPE_CHANNELS];
                for (i, slot) in frame.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(VisemeFrame(frame))
            }
        }

        deserializer.deserialize_tuple(SHAPE_CHANNELS, FrameVisitor)
    }
}

impl VisemeFrame {
    /// Build a frame from a wire-format weight list, padding missing
    /// channels with 0 and ignoring extras.
    pub fn from_wire(weights: &[f32]) -> Self {
        let mut frame = [0.0f32; SHAPE_CHANNELS];
        for (slot, w) in frame.iter_mut().zip(weights.iter()) {
            *slot = *w;
        }
        Self(frame)
    }

    pub fn weights(&self) -> &[f32; SHAPE_CHANNELS] {
        &self.0
    }
}

/// Where applied shape weights go. The actual mesh lives in the UI shell;
/// this is the seam between the timing logic and the rendering mechanics.
pub trait MorphTargetSink {
    /// Apply all channel weights of one viseme frame.
    fn apply_frame(&mut self, weights: &[f32; SHAPE_CHANNELS]);

    /// Drive only the two eye-blink channels (idle animation).
    fn set_blink(&mut self, weight: f32);

    /// Zero every morph target influence (close the mouth, open the eyes).
    fn neutral_pose(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_count() {
        assert_eq!(SHAPE_CHANNEL_NAMES.len(), SHAPE_CHANNELS);
    }

    #[test]
    fn test_from_wire_pads_short_input() {
        let frame = VisemeFrame::from_wire(&[0.5, 0.25]);
        assert_eq!(frame.0[0], 0.5);
        assert_eq!(frame.0[1], 0.25);
        assert_eq!(frame.0[SHAPE_CHANNELS - 1], 0.0);
    }

    #[test]
    fn test_from_wire_truncates_long_input() {
        let long = vec![1.0f32; SHAPE_CHANNELS + 10];
        let frame = VisemeFrame::from_wire(&long);
        assert!(frame.0.iter().all(|&w| w == 1.0));
    }
}
