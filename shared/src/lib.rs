use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Classifier output vocabulary. Variant order is the model's output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum Label {
    #[serde(rename = "COVID-19")]
    #[strum(serialize = "COVID-19")]
    Covid19,
    #[serde(rename = "NORMAL")]
    #[strum(serialize = "NORMAL")]
    Normal,
    #[serde(rename = "PNEUMONIA")]
    #[strum(serialize = "PNEUMONIA")]
    Pneumonia,
    #[serde(rename = "TUBERCULOSIS")]
    #[strum(serialize = "TUBERCULOSIS")]
    Tuberculosis,
}

impl Label {
    pub const ALL: [Label; 4] = [
        Label::Covid19,
        Label::Normal,
        Label::Pneumonia,
        Label::Tuberculosis,
    ];

    pub fn from_index(index: usize) -> Option<Label> {
        Self::ALL.get(index).copied()
    }
}

/// Per-image outcome of a predict call.
///
/// `prediction` is set only when `ok` is true and `error` only when it is
/// false; use the constructors to keep that pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub filename: Option<String>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    pub fn predicted(filename: impl Into<String>, label: Label) -> Self {
        Self {
            filename: Some(filename.into()),
            ok: true,
            prediction: Some(label),
            error: None,
        }
    }

    pub fn failed(filename: Option<String>, error: impl Into<String>) -> Self {
        Self {
            filename,
            ok: false,
            prediction: None,
            error: Some(error.into()),
        }
    }
}
