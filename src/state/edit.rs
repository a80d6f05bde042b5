/// Slider adjustments and presets
///
/// A shot's look is described by three values mirroring the CSS filter
/// functions the viewer applies: brightness, saturation and a vignette
/// overlay. They are stored as JSON alongside the shot (when not baked
/// into an inline payload) and as named presets.

use serde::{Deserialize, Serialize};

/// Brightness slider bounds, in percent
pub const BRIGHTNESS_RANGE: (f32, f32) = (50.0, 200.0);
/// Saturation slider bounds, in percent
pub const SATURATION_RANGE: (f32, f32) = (0.0, 300.0);
/// Vignette slider bounds, in percent
pub const VIGNETTE_RANGE: (f32, f32) = (0.0, 100.0);

/// Maximum overlay alpha reached at the vignette's outer radius
const MAX_VIGNETTE_ALPHA: f32 = 0.9;

/// All adjustment values for a shot
///
/// Neutral values (100% brightness, 100% saturation, 0% vignette)
/// leave the image untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct FilterValues {
    /// Brightness in percent (50 to 200)
    /// - 100 = no adjustment
    /// - Values are multiplied into every channel
    pub brightness: f32,

    /// Saturation in percent (0 to 300)
    /// - 0 = grayscale, 100 = original, 300 = triple saturation
    pub saturation: f32,

    /// Vignette strength in percent (0 to 100)
    /// - 0 = no overlay
    /// - Mapped to the alpha of a black radial gradient, capped at 0.9
    pub vignette: f32,
}

impl Default for FilterValues {
    /// Neutral adjustments
    fn default() -> Self {
        Self {
            brightness: 100.0,
            saturation: 100.0,
            vignette: 0.0,
        }
    }
}

impl FilterValues {
    pub fn new(brightness: f32, saturation: f32, vignette: f32) -> Self {
        Self {
            brightness,
            saturation,
            vignette,
        }
    }

    /// Check if these values leave the image untouched
    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// Clamp every value into its slider range
    pub fn clamped(&self) -> Self {
        Self {
            brightness: self.brightness.clamp(BRIGHTNESS_RANGE.0, BRIGHTNESS_RANGE.1),
            saturation: self.saturation.clamp(SATURATION_RANGE.0, SATURATION_RANGE.1),
            vignette: self.vignette.clamp(VIGNETTE_RANGE.0, VIGNETTE_RANGE.1),
        }
    }

    /// CSS filter expression for the brightness and saturation part.
    ///
    /// The vignette has no CSS filter equivalent and is not included.
    pub fn css_filter(&self) -> String {
        format!(
            "brightness({}%) saturate({}%)",
            trim_float(self.brightness),
            trim_float(self.saturation)
        )
    }

    /// Overlay alpha at the vignette's outer radius
    pub fn vignette_alpha(&self) -> f32 {
        (self.vignette / 100.0).clamp(0.0, MAX_VIGNETTE_ALPHA)
    }
}

/// Format without a trailing `.0` so `100.0` renders as `100`
fn trim_float(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// A named set of adjustments
///
/// Built-in presets ship with the app; user-created ones carry
/// `custom: true` and are the only ones that can be deleted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Preset {
    pub id: String,
    pub name: String,
    pub brightness: f32,
    pub saturation: f32,
    pub vignette: f32,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub custom: bool,
}

impl Preset {
    /// Create a user preset from the current slider values
    pub fn custom(name: &str, filters: FilterValues) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            brightness: filters.brightness,
            saturation: filters.saturation,
            vignette: filters.vignette,
            custom: true,
        }
    }

    pub fn is_deletable(&self) -> bool {
        self.custom
    }
}

/// Presets available before the user saves any of their own
pub fn builtin_presets() -> Vec<Preset> {
    let builtin = |id: &str, name: &str, b: f32, s: f32, v: f32| Preset {
        id: id.to_string(),
        name: name.to_string(),
        brightness: b,
        saturation: s,
        vignette: v,
        custom: false,
    };

    vec![
        builtin("natural", "Natural", 50.0, 50.0, 0.0),
        builtin("bw", "Black-White", 100.0, 0.0, 10.0),
        builtin("custom1", "Custom1", 110.0, 140.0, 8.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_neutral() {
        let filters = FilterValues::default();
        assert!(filters.is_neutral());
        assert_eq!(filters.vignette_alpha(), 0.0);
    }

    #[test]
    fn test_css_filter() {
        let filters = FilterValues::new(110.0, 142.5, 30.0);
        assert_eq!(filters.css_filter(), "brightness(110%) saturate(142.5%)");
    }

    #[test]
    fn test_clamped_to_slider_ranges() {
        let filters = FilterValues::new(10.0, 500.0, -3.0).clamped();
        assert_eq!(filters, FilterValues::new(50.0, 300.0, 0.0));
    }

    #[test]
    fn test_vignette_alpha_is_capped() {
        assert_eq!(FilterValues::new(100.0, 100.0, 100.0).vignette_alpha(), 0.9);
        assert!((FilterValues::new(100.0, 100.0, 25.0).vignette_alpha() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_only_custom_presets_are_deletable() {
        assert!(builtin_presets().iter().all(|p| !p.is_deletable()));

        let preset = Preset::custom("Warm", FilterValues::new(105.0, 120.0, 5.0));
        assert!(preset.is_deletable());
        assert_eq!(
            (preset.brightness, preset.saturation, preset.vignette),
            (105.0, 120.0, 5.0)
        );
    }

    #[test]
    fn test_builtin_preset_json_omits_custom_flag() {
        let json = serde_json::to_value(&builtin_presets()[1]).unwrap();
        assert_eq!(json["name"], "Black-White");
        assert!(json.get("custom").is_none());
    }
}
