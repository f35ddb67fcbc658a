use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const DESCRIPTOR_LEN: usize = 128;

/// A validated 128-component face descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, ValidationError> {
        validate_components(&values)?;
        Ok(Self(values))
    }

    /// Accepts an array, or an index-keyed object (`{"0": .., "1": ..}`) as stored by older clients.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ValidationError> {
        let items: Vec<&serde_json::Value> = match value {
            serde_json::Value::Array(items) => items.iter().collect(),
            serde_json::Value::Object(map) => {
                let mut indexed = map
                    .iter()
                    .map(|(k, v)| {
                        k.parse::<usize>()
                            .map(|i| (i, v))
                            .map_err(|_| ValidationError::DescriptorShape)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                indexed.sort_by_key(|(i, _)| *i);
                indexed.into_iter().map(|(_, v)| v).collect()
            }
            _ => return Err(ValidationError::DescriptorShape),
        };

        let values = items
            .into_iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or(ValidationError::DescriptorShape)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = ValidationError;

    fn try_from(value: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(value: Descriptor) -> Self {
        value.0
    }
}

pub(crate) fn validate_components(values: &[f32]) -> Result<(), ValidationError> {
    if values.len() != DESCRIPTOR_LEN {
        return Err(ValidationError::DescriptorLength {
            expected: DESCRIPTOR_LEN,
            actual: values.len(),
        });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(ValidationError::DescriptorComponent { index });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One face found by the feature extractor. The descriptor is untrusted until validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bounding_box: BoundingBox,
    pub descriptor: Vec<f32>,
}

/// Latest frame of the live video.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// JPEG-encoded image, sent along with a first enrollment.
    pub jpeg: Vec<u8>,
}

/// Enrolled face of an employee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceReference {
    pub descriptor: Descriptor,
    #[serde(default)]
    pub image_base64: Option<String>,
}
