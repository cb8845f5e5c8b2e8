//! Energy focus store.
//!
//! Process-local; nothing here touches the backend.

use tokio::sync::watch;

use shifter_core::config::EnergySettings;
use shifter_core::energy::{clamp_intensity, EnergyState, EnergyType};
use shifter_core::Result;

use crate::analytics::ANALYTICS_TARGET;

/// Holds the active energy focus and publishes changes.
pub struct EnergyStore {
    state: watch::Sender<EnergyState>,
}

impl EnergyStore {
    pub fn new(initial: EnergyState) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state }
    }

    pub fn from_settings(settings: &EnergySettings) -> Self {
        Self::new(EnergyState::new(
            settings.default_type,
            settings.initial_intensity(),
        ))
    }

    pub fn read(&self) -> EnergyState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<EnergyState> {
        self.state.subscribe()
    }

    /// Makes `energy_type` the active focus.
    ///
    /// Color and frequency always come from the canonical table. Subscribers
    /// are only notified when the type actually changes, but every call is
    /// reported as an `energy_activated` analytics event.
    ///
    /// # Arguments
    ///
    /// * `energy_type` - Focus to activate
    /// * `context` - Where the activation came from (e.g. "breath_session")
    pub fn activate(&self, energy_type: EnergyType, context: Option<&str>) -> EnergyState {
        let changed = self
            .state
            .send_if_modified(|state| state.set_type(energy_type));

        tracing::info!(
            target: ANALYTICS_TARGET,
            event = "energy_activated",
            energy_type = %energy_type,
            frequency = energy_type.frequency(),
            context = context.unwrap_or_default(),
            changed,
            "Energy focus activated"
        );

        self.read()
    }

    /// Like [`activate`](Self::activate), parsing the type from user input.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEnergyType` for unknown names; state is untouched.
    pub fn activate_named(&self, name: &str, context: Option<&str>) -> Result<EnergyState> {
        let energy_type: EnergyType = name.parse()?;
        Ok(self.activate(energy_type, context))
    }

    /// Sets intensity, clamped to `[0, 1]`. Returns the stored value.
    pub fn set_intensity(&self, intensity: f64) -> f64 {
        let intensity = clamp_intensity(intensity);
        self.state.send_if_modified(|state| {
            if state.intensity == intensity {
                return false;
            }
            state.intensity = intensity;
            true
        });
        intensity
    }
}

impl Default for EnergyStore {
    fn default() -> Self {
        Self::new(EnergyState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::AnalyticsLayer;
    use shifter_core::ShifterError;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_starts_from_settings() {
        let settings = EnergySettings {
            default_type: EnergyType::Crown,
            default_intensity: 3.0,
        };
        let state = EnergyStore::from_settings(&settings).read();

        assert_eq!(state.energy_type, EnergyType::Crown);
        assert_eq!(state.intensity, 1.0);
        assert_eq!(state.color, EnergyType::Crown.color());
    }

    #[test]
    fn test_activate_uses_canonical_attributes() {
        let store = EnergyStore::default();

        let state = store.activate(EnergyType::Throat, None);

        assert_eq!(state.energy_type, EnergyType::Throat);
        assert_eq!(state.frequency, 741);
        assert_eq!(state.color, "#2563EB");
    }

    #[test]
    fn test_reactivating_same_type_does_not_notify() {
        let store = EnergyStore::default();
        let mut updates = store.subscribe();

        store.activate(EnergyType::Heart, None);
        assert!(!updates.has_changed().unwrap());

        store.activate(EnergyType::Root, Some("grounding"));
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().energy_type, EnergyType::Root);
    }

    #[test]
    fn test_activate_named_rejects_unknown_names() {
        let store = EnergyStore::default();

        let err = store.activate_named("spleen", None).unwrap_err();

        assert_eq!(err, ShifterError::InvalidEnergyType("spleen".into()));
        assert_eq!(store.read(), EnergyState::default());
        assert_eq!(
            store.activate_named("Third Eye", None).unwrap().energy_type,
            EnergyType::ThirdEye
        );
    }

    #[test]
    fn test_intensity_is_clamped() {
        let store = EnergyStore::default();
        assert_eq!(store.set_intensity(1.7), 1.0);
        assert_eq!(store.set_intensity(-0.2), 0.0);
        assert_eq!(store.set_intensity(f64::NAN), 0.0);
        assert_eq!(store.set_intensity(0.25), 0.25);
        assert_eq!(store.read().intensity, 0.25);
    }

    #[test]
    fn test_every_activation_emits_one_analytics_event() {
        let (layer, mut events) = AnalyticsLayer::channel();
        let subscriber = tracing_subscriber::registry().with(layer);
        let store = EnergyStore::default();

        tracing::subscriber::with_default(subscriber, || {
            store.activate(EnergyType::SolarPlexus, Some("morning_ritual"));
            store.activate(EnergyType::SolarPlexus, None);
        });

        let first = events.try_recv().unwrap();
        assert_eq!(first.name, "energy_activated");
        assert_eq!(first.field_str("energy_type"), Some("SolarPlexus"));
        assert_eq!(first.field_str("context"), Some("morning_ritual"));
        assert_eq!(first.fields["changed"], true);

        let second = events.try_recv().unwrap();
        assert_eq!(second.fields["changed"], false);
        assert!(events.try_recv().is_err());
    }
}
