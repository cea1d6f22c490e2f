/// Convert a raw scan interval into the step between planes after deskewing.
///
/// `angle_deg` is the objective angle; only its magnitude matters.
pub fn physical_step(raw: f64, angle_deg: f64) -> f64 {
    raw * angle_deg.abs().to_radians().sin()
}

/// Angle that skews an orthogonal PSF into the frame of a raw acquisition
/// taken at `angle_deg`.
pub fn preskew_angle(angle_deg: f64) -> f64 {
    180.0 - angle_deg
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn instrument_default_angle() {
        assert_relative_eq!(physical_step(0.4, 147.55), 0.2146, epsilon = 1e-4);
    }

    #[test]
    fn sign_of_angle_is_ignored() {
        assert_relative_eq!(physical_step(0.45, -31.8), physical_step(0.45, 31.8));
        assert_relative_eq!(physical_step(0.45, 31.8), 0.45 * 0.52696, epsilon = 1e-4);
    }

    #[test]
    fn preskew_is_supplementary() {
        assert_relative_eq!(preskew_angle(147.55), 32.45, epsilon = 1e-9);
    }
}
