//! Accumulators for the two job configurations.
//!
//! Builders store raw strings and never check them against the held file or
//! parse numbers; `preflight_*` only reports what the service is likely to
//! reject.

use dp_shared::{
    domain::{column_tokens, MlField, MlJobConfig, NoiseField, NoiseJobConfig},
    error::FieldError,
};

#[derive(Debug, Clone, Default)]
pub struct NoiseConfigBuilder {
    config: NoiseJobConfig,
}

impl NoiseConfigBuilder {
    pub fn set_field(&mut self, field: NoiseField, raw: impl Into<String>) {
        let raw = raw.into();
        let slot = match field {
            NoiseField::Private => &mut self.config.private_columns,
            NoiseField::Binary => &mut self.config.binary_columns,
            NoiseField::Categorical => &mut self.config.categorical_columns,
            NoiseField::Numerical => &mut self.config.numerical_columns,
            NoiseField::Epsilon => &mut self.config.privacy_params,
        };
        *slot = raw;
    }

    pub fn set_named(&mut self, name: &str, raw: impl Into<String>) -> Result<(), FieldError> {
        let field = name.parse::<NoiseField>()?;
        self.set_field(field, raw);
        Ok(())
    }

    pub fn snapshot(&self) -> NoiseJobConfig {
        self.config.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MlConfigBuilder {
    config: MlJobConfig,
}

impl MlConfigBuilder {
    /// `Algorithm` is the only field parsed on entry; an unrecognised value
    /// leaves the previous algorithm in place.
    pub fn set_field(&mut self, field: MlField, raw: impl Into<String>) -> Result<(), FieldError> {
        let raw = raw.into();
        match field {
            MlField::InputColumns => self.config.input_columns = raw,
            MlField::OutputColumn => self.config.output_column = raw,
            MlField::Algorithm => self.config.algorithm = raw.parse()?,
            MlField::TrainTest => self.config.train_test_split = raw,
            MlField::MlParams => self.config.ml_params = raw,
        }
        Ok(())
    }

    pub fn set_named(&mut self, name: &str, raw: impl Into<String>) -> Result<(), FieldError> {
        let field = name.parse::<MlField>()?;
        self.set_field(field, raw)
    }

    pub fn snapshot(&self) -> MlJobConfig {
        self.config.clone()
    }
}

fn all_floats(raw: &str) -> bool {
    let tokens = column_tokens(raw);
    !tokens.is_empty() && tokens.iter().all(|t| t.parse::<f64>().is_ok())
}

pub fn preflight_noise(config: &NoiseJobConfig) -> Vec<String> {
    let mut findings = Vec::new();
    let params = column_tokens(&config.privacy_params);
    if params.len() < 3 || !all_floats(&config.privacy_params) {
        findings.push(format!(
            "privacy parameters '{}' are not three numbers (epsilon, delta, sensitivity)",
            config.privacy_params
        ));
    }
    if column_tokens(&config.numerical_columns).is_empty()
        && column_tokens(&config.binary_columns).is_empty()
    {
        findings.push("no numerical or binary columns given; no noise will be added".to_string());
    }
    findings
}

pub fn preflight_ml(config: &MlJobConfig) -> Vec<String> {
    let mut findings = Vec::new();
    if config.output_column.trim().is_empty() {
        findings.push("output column is empty".to_string());
    }
    if column_tokens(&config.input_columns).is_empty() {
        findings.push("no input columns given".to_string());
    }
    let split = column_tokens(&config.train_test_split);
    if split.get(1).and_then(|t| t.parse::<f64>().ok()).is_none() {
        findings.push(format!(
            "train/test split '{}' has no numeric test percentage",
            config.train_test_split
        ));
    }
    if column_tokens(&config.ml_params)
        .first()
        .and_then(|t| t.parse::<f64>().ok())
        .is_none()
    {
        findings.push(format!(
            "ml parameters '{}' do not start with a numeric epsilon",
            config.ml_params
        ));
    }
    findings
}

#[cfg(test)]
#[path = "tests/builder_tests.rs"]
mod tests;
