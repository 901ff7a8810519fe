use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// Which of the two workflows a submission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Noise,
    Ml,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Noise => "noise",
            Mode::Ml => "ml",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = FieldError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "noise" => Ok(Mode::Noise),
            "ml" => Ok(Mode::Ml),
            other => Err(FieldError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MlAlgorithm {
    #[default]
    Classification,
    Regression,
    Clustering,
}

impl MlAlgorithm {
    pub fn code(&self) -> u8 {
        match self {
            MlAlgorithm::Classification => 1,
            MlAlgorithm::Regression => 2,
            MlAlgorithm::Clustering => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MlAlgorithm::Classification),
            2 => Some(MlAlgorithm::Regression),
            3 => Some(MlAlgorithm::Clustering),
            _ => None,
        }
    }
}

impl FromStr for MlAlgorithm {
    type Err = FieldError;

    /// Accepts the numeric wire code or the algorithm name.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Self::from_code(code)
                .ok_or_else(|| FieldError::UnknownAlgorithm(trimmed.to_string()));
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "classification" => Ok(MlAlgorithm::Classification),
            "regression" => Ok(MlAlgorithm::Regression),
            "clustering" => Ok(MlAlgorithm::Clustering),
            _ => Err(FieldError::UnknownAlgorithm(trimmed.to_string())),
        }
    }
}

macro_rules! form_field_enum {
    ($name:ident, $mode:expr, { $($variant:ident => $key:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Multipart key the service reads this field from.
            pub fn key(&self) -> &'static str {
                match self {
                    $($name::$variant => $key),+
                }
            }
        }

        impl FromStr for $name {
            type Err = FieldError;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                match raw.trim() {
                    $($key => Ok($name::$variant),)+
                    other => Err(FieldError::UnknownField {
                        mode: $mode,
                        name: other.to_string(),
                    }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.key())
            }
        }
    };
}

form_field_enum!(NoiseField, Mode::Noise, {
    Private => "private",
    Binary => "binary",
    Categorical => "categorical",
    Numerical => "numerical",
    Epsilon => "epsilon",
});

form_field_enum!(MlField, Mode::Ml, {
    InputColumns => "colinp",
    OutputColumn => "colop",
    Algorithm => "mlalgo",
    TrainTest => "traintest",
    MlParams => "mlpara",
});

/// Noise-addition job parameters, kept exactly as the user typed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoiseJobConfig {
    pub private_columns: String,
    pub binary_columns: String,
    pub categorical_columns: String,
    pub numerical_columns: String,
    /// Comma-joined epsilon, delta, sensitivity.
    pub privacy_params: String,
}

impl NoiseJobConfig {
    pub fn get(&self, field: NoiseField) -> &str {
        match field {
            NoiseField::Private => &self.private_columns,
            NoiseField::Binary => &self.binary_columns,
            NoiseField::Categorical => &self.categorical_columns,
            NoiseField::Numerical => &self.numerical_columns,
            NoiseField::Epsilon => &self.privacy_params,
        }
    }

    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        NoiseField::ALL
            .iter()
            .map(|field| (field.key(), self.get(*field).to_string()))
            .collect()
    }
}

/// Accuracy-comparison job parameters.
///
/// `ml_params` is positionally overloaded (epsilon, L2-norm bound, cluster
/// count) and its meaning depends on `algorithm`; it is passed through as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MlJobConfig {
    pub input_columns: String,
    pub output_column: String,
    pub algorithm: MlAlgorithm,
    pub train_test_split: String,
    pub ml_params: String,
}

impl MlJobConfig {
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (MlField::InputColumns.key(), self.input_columns.clone()),
            (MlField::OutputColumn.key(), self.output_column.clone()),
            (MlField::Algorithm.key(), self.algorithm.code().to_string()),
            (MlField::TrainTest.key(), self.train_test_split.clone()),
            (MlField::MlParams.key(), self.ml_params.clone()),
        ]
    }
}

/// Splits a comma-separated list, trimming each token and dropping empty ones.
/// Order and duplicates are kept.
pub fn column_tokens(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
