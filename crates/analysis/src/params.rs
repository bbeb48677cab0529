use foundation::LatLng;
use jobs::{AnalysisKind, JobParameters, LayerChoice};
use layers::clamp_opacity;
use settings::{SettingsStore, read_f64, write_f64};
use tracing::warn;

use crate::error::InputError;
use crate::kind::{DEFAULT_OPACITY, KindConfig, OPACITY_KEY, ParamField};

/// Current values of a panel's editable numbers.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamValues {
    values: Vec<(ParamField, f64)>,
    opacity: f64,
}

impl ParamValues {
    pub fn defaults(config: &KindConfig) -> Self {
        Self {
            values: config
                .fields
                .iter()
                .map(|f| (*f, f.default_value()))
                .collect(),
            opacity: DEFAULT_OPACITY,
        }
    }

    /// Seeds from last-used settings. Stored values that are out of range
    /// fall back to the default.
    pub fn load(config: &KindConfig, store: &dyn SettingsStore) -> Self {
        let mut params = Self::defaults(config);
        for (field, value) in params.values.iter_mut() {
            let key = config.settings_key(field.key());
            let stored = read_f64(store, &key, *value);
            if field.accepts(stored) {
                *value = stored;
            } else {
                warn!(key = %key, stored, "ignoring out-of-range setting");
            }
        }
        let key = config.settings_key(OPACITY_KEY);
        let stored = read_f64(store, &key, DEFAULT_OPACITY);
        if (0.0..=1.0).contains(&stored) {
            params.opacity = stored;
        } else {
            warn!(key = %key, stored, "ignoring out-of-range setting");
        }
        params
    }

    pub fn get(&self, field: ParamField) -> Option<f64> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| *v)
    }

    pub fn set(&mut self, field: ParamField, value: f64) -> Result<(), InputError> {
        let slot = self
            .values
            .iter_mut()
            .find(|(f, _)| *f == field)
            .ok_or(InputError::UnsupportedField(field))?;
        if !field.accepts(value) {
            return Err(InputError::InvalidValue {
                field: field.key(),
                value,
            });
        }
        slot.1 = value;
        Ok(())
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f64) -> Result<(), InputError> {
        if !(0.0..=1.0).contains(&opacity) {
            return Err(InputError::InvalidValue {
                field: OPACITY_KEY,
                value: opacity,
            });
        }
        self.opacity = clamp_opacity(opacity);
        Ok(())
    }

    fn check(&self) -> Result<(), InputError> {
        match self.values.iter().find(|(f, v)| !f.accepts(*v)) {
            Some((field, value)) => Err(InputError::InvalidValue {
                field: field.key(),
                value: *value,
            }),
            None => Ok(()),
        }
    }

    fn value(&self, field: ParamField) -> Result<f64, InputError> {
        self.get(field).ok_or(InputError::UnsupportedField(field))
    }

    /// Builds the request body for `config`'s kind.
    pub fn job_parameters(
        &self,
        config: &KindConfig,
        layer: LayerChoice,
        point: Option<LatLng>,
    ) -> Result<JobParameters, InputError> {
        self.check()?;
        Ok(match config.kind {
            AnalysisKind::Hillshade => JobParameters::Hillshade {
                layer,
                azimuth: self.value(ParamField::Azimuth)?,
                altitude: self.value(ParamField::Altitude)?,
            },
            AnalysisKind::Viewshed => {
                let at = point.ok_or(InputError::MissingPoint)?;
                JobParameters::Viewshed {
                    layer,
                    lat: at.lat,
                    lng: at.lng,
                    height: self.value(ParamField::Height)?,
                }
            }
            AnalysisKind::Watershed => {
                let at = point.ok_or(InputError::MissingPoint)?;
                JobParameters::Watershed {
                    layer,
                    lat: at.lat,
                    lng: at.lng,
                    snap_distance: self.value(ParamField::SnapDistance)?,
                }
            }
        })
    }

    /// Remembers every value as last used.
    pub fn persist(&self, config: &KindConfig, store: &dyn SettingsStore) {
        for (field, value) in &self.values {
            write_f64(store, &config.settings_key(field.key()), *value);
        }
        self.persist_opacity(config, store);
    }

    pub fn persist_opacity(&self, config: &KindConfig, store: &dyn SettingsStore) {
        write_f64(store, &config.settings_key(OPACITY_KEY), self.opacity);
    }
}
