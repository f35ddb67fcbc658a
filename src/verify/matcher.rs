use crate::error::ValidationError;
use crate::model::face::validate_components;

pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.5;

/// Euclidean distance between two descriptors. Both must be well-formed.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> Result<f32, ValidationError> {
    validate_components(a)?;
    validate_components(b)?;
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt())
}

/// `true` when the descriptors are strictly closer than `threshold`.
pub fn is_match(live: &[f32], reference: &[f32], threshold: f32) -> Result<bool, ValidationError> {
    Ok(euclidean_distance(live, reference)? < threshold)
}

#[derive(Debug, Clone, Copy)]
pub struct FaceMatcher {
    pub threshold: f32,
}

impl Default for FaceMatcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

impl FaceMatcher {
    pub fn is_match(&self, live: &[f32], reference: &[f32]) -> Result<bool, ValidationError> {
        is_match(live, reference, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::face::DESCRIPTOR_LEN;

    fn descriptor(fill: f32) -> Vec<f32> {
        vec![fill; DESCRIPTOR_LEN]
    }

    #[test]
    fn identical_descriptors_match() {
        let d: Vec<f32> = (0..DESCRIPTOR_LEN).map(|i| i as f32 / 300.0).collect();
        assert_eq!(euclidean_distance(&d, &d).unwrap(), 0.0);
        assert!(is_match(&d, &d, 0.01).unwrap());
    }

    #[test]
    fn threshold_is_strict() {
        let reference = descriptor(0.0);
        let mut live = descriptor(0.0);
        live[0] = 0.5;
        assert!(!is_match(&live, &reference, 0.5).unwrap());
        live[0] = 0.2;
        assert!(FaceMatcher::default().is_match(&live, &reference).unwrap());
    }

    #[test]
    fn length_mismatch_is_a_validation_error() {
        let err = is_match(&descriptor(0.1), &[0.1; 64], 0.5).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DescriptorLength {
                expected: DESCRIPTOR_LEN,
                actual: 64
            }
        );
    }

    #[test]
    fn nan_is_a_validation_error() {
        let mut live = descriptor(0.1);
        live[5] = f32::NAN;
        assert_eq!(
            is_match(&live, &descriptor(0.1), 0.5).unwrap_err(),
            ValidationError::DescriptorComponent { index: 5 }
        );
    }
}
