use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The registered county indicators. Order here is the order of the
/// selection control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKey {
    Poverty,
    MedianHouseholdIncome,
    EducationLessThanHighSchoolPercent,
    AirQuality,
    ParkAccess,
    PercentInactive,
    PercentSmoking,
    ElderlyPercentage,
    NumberOfHospitals,
    NumberOfPrimaryCarePhysicians,
    PercentNoHeathInsurance,
    PercentHighBloodPressure,
    PercentCoronaryHeartDisease,
    PercentStroke,
    PercentHighCholesterol,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown measure {0:?}")]
pub struct UnknownMeasure(pub String);

impl MeasureKey {
    pub const COUNT: usize = 15;

    pub const ALL: [MeasureKey; MeasureKey::COUNT] = [
        MeasureKey::Poverty,
        MeasureKey::MedianHouseholdIncome,
        MeasureKey::EducationLessThanHighSchoolPercent,
        MeasureKey::AirQuality,
        MeasureKey::ParkAccess,
        MeasureKey::PercentInactive,
        MeasureKey::PercentSmoking,
        MeasureKey::ElderlyPercentage,
        MeasureKey::NumberOfHospitals,
        MeasureKey::NumberOfPrimaryCarePhysicians,
        MeasureKey::PercentNoHeathInsurance,
        MeasureKey::PercentHighBloodPressure,
        MeasureKey::PercentCoronaryHeartDisease,
        MeasureKey::PercentStroke,
        MeasureKey::PercentHighCholesterol,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MeasureKey::Poverty => "poverty",
            MeasureKey::MedianHouseholdIncome => "median_household_income",
            MeasureKey::EducationLessThanHighSchoolPercent => "education_less_than_high_school_percent",
            MeasureKey::AirQuality => "air_quality",
            MeasureKey::ParkAccess => "park_access",
            MeasureKey::PercentInactive => "percent_inactive",
            MeasureKey::PercentSmoking => "percent_smoking",
            MeasureKey::ElderlyPercentage => "elderly_percentage",
            MeasureKey::NumberOfHospitals => "number_of_hospitals",
            MeasureKey::NumberOfPrimaryCarePhysicians => "number_of_primary_care_physicians",
            MeasureKey::PercentNoHeathInsurance => "percent_no_heath_insurance",
            MeasureKey::PercentHighBloodPressure => "percent_high_blood_pressure",
            MeasureKey::PercentCoronaryHeartDisease => "percent_coronary_heart_disease",
            MeasureKey::PercentStroke => "percent_stroke",
            MeasureKey::PercentHighCholesterol => "percent_high_cholesterol",
        }
    }

    // Column holding this indicator in the health CSV.
    pub fn csv_column(self) -> &'static str {
        match self {
            MeasureKey::Poverty => "poverty_perc",
            other => other.as_str(),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MeasureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MeasureKey {
    type Err = UnknownMeasure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeasureKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| UnknownMeasure(s.to_string()))
    }
}

// One value slot per registered measure. `None` is the missing marker;
// a stored value is always finite.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Indicators([Option<f64>; MeasureKey::COUNT]);

impl Indicators {
    pub fn get(&self, key: MeasureKey) -> Option<f64> {
        self.0[key.index()]
    }

    pub fn set(&mut self, key: MeasureKey, value: Option<f64>) {
        self.0[key.index()] = value.filter(|v| v.is_finite());
    }

    pub fn iter(&self) -> impl Iterator<Item = (MeasureKey, Option<f64>)> + '_ {
        MeasureKey::ALL.iter().map(move |&key| (key, self.get(key)))
    }
}

// The measure a component is currently bound to. Selections that are
// not in the registry are kept verbatim and read as missing everywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveMeasure {
    Registered(MeasureKey),
    Unregistered(String),
}

impl ActiveMeasure {
    pub fn resolve(name: &str) -> Self {
        match name.parse() {
            Ok(key) => ActiveMeasure::Registered(key),
            Err(UnknownMeasure(name)) => ActiveMeasure::Unregistered(name),
        }
    }

    pub fn key(&self) -> Option<MeasureKey> {
        match self {
            ActiveMeasure::Registered(key) => Some(*key),
            ActiveMeasure::Unregistered(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ActiveMeasure::Registered(key) => key.as_str(),
            ActiveMeasure::Unregistered(name) => name,
        }
    }

    pub fn value_of(&self, indicators: &Indicators) -> Option<f64> {
        self.key().and_then(|key| indicators.get(key))
    }
}

impl From<MeasureKey> for ActiveMeasure {
    fn from(key: MeasureKey) -> Self {
        ActiveMeasure::Registered(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasureChanged(pub String);

pub trait MeasureSubscriber {
    fn measure_changed(&mut self, event: &MeasureChanged);
}

// The measure drop-down: options come from the registry, `change`
// records the new value and hands back the event for subscribers.
#[derive(Debug, Clone)]
pub struct MeasureSelect {
    options: Vec<SelectOption>,
    value: String,
}

impl MeasureSelect {
    pub fn new(initial: MeasureKey) -> Self {
        let options = MeasureKey::ALL
            .iter()
            .map(|key| SelectOption {
                value: key.as_str().to_string(),
                label: key.as_str().to_string(),
            })
            .collect();
        Self { options, value: initial.as_str().to_string() }
    }

    pub fn options(&self) -> &[SelectOption] {
        &self.options
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn change(&mut self, value: &str) -> MeasureChanged {
        self.value = value.to_string();
        MeasureChanged(self.value.clone())
    }

    pub fn change_and_notify(&mut self, value: &str, subscribers: &mut [&mut dyn MeasureSubscriber]) {
        let event = self.change(value);
        for subscriber in subscribers.iter_mut() {
            subscriber.measure_changed(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips_every_key_name() {
        for key in MeasureKey::ALL {
            assert_eq!(key.as_str().parse::<MeasureKey>(), Ok(key));
        }
        assert_eq!(MeasureKey::ALL.len(), MeasureKey::COUNT);
    }

    #[test]
    fn poverty_reads_from_poverty_perc_column() {
        assert_eq!(MeasureKey::Poverty.csv_column(), "poverty_perc");
        assert_eq!(MeasureKey::AirQuality.csv_column(), "air_quality");
    }

    #[test]
    fn unknown_names_are_rejected_by_the_registry() {
        let err = "poverty_perc".parse::<MeasureKey>().unwrap_err();
        assert_eq!(err, UnknownMeasure("poverty_perc".to_string()));
        assert_eq!(ActiveMeasure::resolve("bogus"), ActiveMeasure::Unregistered("bogus".into()));
    }

    #[test]
    fn indicators_never_store_non_finite_values() {
        let mut values = Indicators::default();
        values.set(MeasureKey::Poverty, Some(f64::NAN));
        values.set(MeasureKey::AirQuality, Some(f64::INFINITY));
        values.set(MeasureKey::ParkAccess, Some(3.5));
        assert_eq!(values.get(MeasureKey::Poverty), None);
        assert_eq!(values.get(MeasureKey::AirQuality), None);
        assert_eq!(values.get(MeasureKey::ParkAccess), Some(3.5));
    }

    #[test]
    fn select_options_mirror_the_registry() {
        let select = MeasureSelect::new(MeasureKey::Poverty);
        assert_eq!(select.options().len(), MeasureKey::COUNT);
        assert!(select.options().iter().all(|o| o.value == o.label));
        assert_eq!(select.options()[3].value, "air_quality");
        assert_eq!(select.value(), "poverty");
    }

    struct Recorder(Vec<String>);

    impl MeasureSubscriber for Recorder {
        fn measure_changed(&mut self, event: &MeasureChanged) {
            self.0.push(event.0.clone());
        }
    }

    #[test]
    fn change_notifies_subscribers() {
        let mut select = MeasureSelect::new(MeasureKey::Poverty);
        let mut recorder = Recorder(Vec::new());
        select.change_and_notify("air_quality", &mut [&mut recorder]);
        assert_eq!(recorder.0, vec!["air_quality".to_string()]);
        assert_eq!(select.value(), "air_quality");
    }
}
