//! Display photometry and geometry.
//!
//! The metric works in absolute luminance, so it needs to know how the
//! display maps a linear signal to cd/m² and how large a pixel appears to
//! the viewer. Everything beyond that (EOTF details, color primaries) is
//! the caller's concern.

/// Photometric and geometric description of the viewing setup.
pub trait DisplayModel {
    /// Peak (white) luminance in cd/m².
    fn peak_luminance(&self) -> f32;

    /// Black level in cd/m² (reflections plus panel leakage).
    fn black_level(&self) -> f32;

    /// Angular resolution in pixels per visual degree.
    fn pixels_per_degree(&self) -> f32;

    fn name(&self) -> &str {
        "custom display"
    }

    /// Maps a display-linear signal in [0, 1] to absolute luminance.
    fn to_luminance(&self, v: f32) -> f32 {
        let black = self.black_level();
        black + (self.peak_luminance() - black) * v.clamp(0.0, 1.0)
    }
}

/// A concrete display described by photometry plus viewing geometry.
#[derive(Debug, Clone)]
pub struct StandardDisplay {
    name: String,
    peak_luminance: f32,
    black_level: f32,
    pixels_per_degree: f32,
}

impl StandardDisplay {
    /// Builds a display from an explicit angular resolution.
    #[must_use]
    pub fn new(name: &str, peak_luminance: f32, black_level: f32, pixels_per_degree: f32) -> Self {
        Self {
            name: name.to_string(),
            peak_luminance,
            black_level,
            pixels_per_degree,
        }
    }

    /// Builds a display from physical geometry: horizontal resolution,
    /// aspect ratio, diagonal size in inches and viewing distance in
    /// meters. The angular resolution is taken at the screen center.
    #[must_use]
    pub fn from_geometry(
        name: &str,
        peak_luminance: f32,
        black_level: f32,
        resolution: (usize, usize),
        diagonal_inches: f32,
        distance_m: f32,
    ) -> Self {
        let (width_px, height_px) = resolution;
        let ar = width_px as f32 / height_px as f32;
        let diagonal_m = diagonal_inches * 0.0254;
        let width_m = diagonal_m * ar / (1.0 + ar * ar).sqrt();
        let pixel_m = width_m / width_px as f32;
        let deg_per_pixel = 2.0 * (0.5 * pixel_m / distance_m).atan().to_degrees();
        Self {
            name: name.to_string(),
            peak_luminance,
            black_level,
            pixels_per_degree: 1.0 / deg_per_pixel,
        }
    }

    /// A 4K SDR monitor at a viewing distance giving roughly 60 ppd.
    #[must_use]
    pub fn standard_4k() -> Self {
        Self::from_geometry("standard_4k", 200.0, 0.2, (3840, 2160), 31.5, 0.75)
    }

    /// A full-HD SDR monitor, same angular setup as the 4K preset.
    #[must_use]
    pub fn standard_fhd() -> Self {
        Self::from_geometry("standard_fhd", 200.0, 0.2, (1920, 1080), 31.5, 1.5)
    }

    /// An HDR reference display with a deep black level.
    #[must_use]
    pub fn standard_hdr() -> Self {
        Self::from_geometry("standard_hdr", 1000.0, 0.005, (3840, 2160), 31.5, 0.75)
    }

    /// Looks up a preset by name.
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "standard_4k" => Some(Self::standard_4k()),
            "standard_fhd" => Some(Self::standard_fhd()),
            "standard_hdr" => Some(Self::standard_hdr()),
            _ => None,
        }
    }
}

impl DisplayModel for StandardDisplay {
    fn peak_luminance(&self) -> f32 {
        self.peak_luminance
    }

    fn black_level(&self) -> f32 {
        self.black_level
    }

    fn pixels_per_degree(&self) -> f32 {
        self.pixels_per_degree
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_luminance_spans_black_to_peak() {
        let d = StandardDisplay::new("test", 100.0, 0.5, 60.0);
        assert!((d.to_luminance(0.0) - 0.5).abs() < 1e-6);
        assert!((d.to_luminance(1.0) - 100.0).abs() < 1e-4);
        assert!(d.to_luminance(0.5) > d.to_luminance(0.25));
    }

    #[test]
    fn test_to_luminance_clamps_input() {
        let d = StandardDisplay::new("test", 100.0, 0.5, 60.0);
        assert!((d.to_luminance(-1.0) - 0.5).abs() < 1e-6);
        assert!((d.to_luminance(2.0) - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_geometry_ppd_plausible() {
        let d = StandardDisplay::standard_4k();
        let ppd = d.pixels_per_degree();
        assert!(ppd > 40.0 && ppd < 90.0, "unexpected ppd {ppd}");
    }

    #[test]
    fn test_distance_increases_ppd() {
        let near = StandardDisplay::from_geometry("n", 100.0, 0.1, (1920, 1080), 24.0, 0.5);
        let far = StandardDisplay::from_geometry("f", 100.0, 0.1, (1920, 1080), 24.0, 1.0);
        assert!(far.pixels_per_degree() > near.pixels_per_degree());
    }

    #[test]
    fn test_preset_lookup() {
        assert!(StandardDisplay::preset("standard_hdr").is_some());
        assert!(StandardDisplay::preset("imaginary").is_none());
    }
}
