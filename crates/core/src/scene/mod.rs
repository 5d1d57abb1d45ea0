use serde::{Deserialize, Serialize};

use crate::{snap_even, ParameterStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    Continuous,
    /// Rounded to the nearest even integer on every write.
    EvenInteger,
}

/// A named, range-limited render parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneParameter {
    pub name: String,
    pub kind: ParameterKind,
    pub min: f32,
    pub max: f32,
    pub value: f32,
}

impl SceneParameter {
    pub fn continuous(name: impl Into<String>, min: f32, max: f32, value: f32) -> Self {
        Self::new(name, ParameterKind::Continuous, min, max, value)
    }

    pub fn even(name: impl Into<String>, min: f32, max: f32, value: f32) -> Self {
        Self::new(name, ParameterKind::EvenInteger, min, max, value)
    }

    fn new(name: impl Into<String>, kind: ParameterKind, min: f32, max: f32, value: f32) -> Self {
        let mut parameter = Self {
            name: name.into(),
            kind,
            min: min.min(max),
            max: max.max(min),
            value: 0.0,
        };
        parameter.value = parameter.constrain(value);
        parameter
    }

    fn constrain(&self, value: f32) -> f32 {
        match self.kind {
            ParameterKind::Continuous if value.is_finite() => value.clamp(self.min, self.max),
            ParameterKind::Continuous => self.value.clamp(self.min, self.max),
            ParameterKind::EvenInteger => snap_even(value, self.min, self.max),
        }
    }
}

/// Parameter store for one scene. Writes are clamped by the store itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneParameters {
    parameters: Vec<SceneParameter>,
}

impl SceneParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default parameter set of the kaleidoscope scene.
    pub fn kaleidoscope() -> Self {
        let mut scene = Self::new();
        scene.register(SceneParameter::even("segments", 4.0, 80.0, 12.0));
        scene.register(SceneParameter::continuous("rotation", -10.0, 10.0, 0.0));
        scene.register(SceneParameter::continuous("zoom", 0.25, 4.0, 1.0));
        scene.register(SceneParameter::continuous("pulse", 0.0, 2.0, 0.0));
        scene.register(SceneParameter::continuous("color_shift", 0.0, 1.0, 0.0));
        scene.register(SceneParameter::continuous("flash", 0.0, 1.0, 0.0));
        scene
    }

    /// Adds a parameter, replacing any previous one with the same name.
    pub fn register(&mut self, parameter: SceneParameter) {
        match self.parameters.iter_mut().find(|p| p.name == parameter.name) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&SceneParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SceneParameter> {
        self.parameters.iter()
    }
}

impl ParameterStore for SceneParameters {
    fn get(&self, name: &str) -> Option<f32> {
        self.parameter(name).map(|p| p.value)
    }

    fn set(&mut self, name: &str, value: f32) {
        if let Some(parameter) = self.parameters.iter_mut().find(|p| p.name == name) {
            parameter.value = parameter.constrain(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kaleidoscope_defaults() {
        let scene = SceneParameters::kaleidoscope();
        assert_eq!(scene.get("segments"), Some(12.0));
        assert_eq!(scene.get("zoom"), Some(1.0));
        assert_eq!(scene.get("missing"), None);
        assert_eq!(scene.iter().count(), 6);
    }

    #[test]
    fn writes_are_clamped_by_the_store() {
        let mut scene = SceneParameters::kaleidoscope();
        scene.set("zoom", 40.0);
        scene.set("rotation", f32::NAN);
        scene.set("segments", 81.0);

        assert_eq!(scene.get("zoom"), Some(4.0));
        assert_eq!(scene.get("rotation"), Some(0.0));
        assert_eq!(scene.get("segments"), Some(80.0));

        scene.set("segments", 9.0);
        assert_eq!(scene.get("segments"), Some(10.0));
    }

    #[test]
    fn unknown_parameters_are_ignored() {
        let mut scene = SceneParameters::kaleidoscope();
        scene.set("warp", 1.0);
        assert_eq!(scene, SceneParameters::kaleidoscope());
    }

    #[test]
    fn register_replaces_by_name() {
        let mut scene = SceneParameters::kaleidoscope();
        scene.register(SceneParameter::continuous("zoom", 0.0, 10.0, 8.0));

        assert_eq!(scene.get("zoom"), Some(8.0));
        assert_eq!(scene.iter().count(), 6);
    }
}
