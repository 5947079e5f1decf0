//! The four stages of an application, of which document intake is one.

use serde::Deserialize;
use serde::Serialize;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ApplicationStep {
    #[default]
    PersonalInfo,
    DocumentUpload,
    Payment,
    Status,
}

impl ApplicationStep {
    pub const ALL: [ApplicationStep; 4] = [
        ApplicationStep::PersonalInfo,
        ApplicationStep::DocumentUpload,
        ApplicationStep::Payment,
        ApplicationStep::Status,
    ];

    pub const fn index(self) -> usize {
        match self {
            ApplicationStep::PersonalInfo => 0,
            ApplicationStep::DocumentUpload => 1,
            ApplicationStep::Payment => 2,
            ApplicationStep::Status => 3,
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            ApplicationStep::PersonalInfo => "Personal Information",
            ApplicationStep::DocumentUpload => "Document Upload",
            ApplicationStep::Payment => "Payment",
            ApplicationStep::Status => "Application Status",
        }
    }

    /// Saturates at [`ApplicationStep::Status`].
    pub const fn next(self) -> Self {
        match self {
            ApplicationStep::PersonalInfo => ApplicationStep::DocumentUpload,
            ApplicationStep::DocumentUpload => ApplicationStep::Payment,
            ApplicationStep::Payment | ApplicationStep::Status => ApplicationStep::Status,
        }
    }

    /// Saturates at [`ApplicationStep::PersonalInfo`].
    pub const fn previous(self) -> Self {
        match self {
            ApplicationStep::PersonalInfo | ApplicationStep::DocumentUpload => {
                ApplicationStep::PersonalInfo
            }
            ApplicationStep::Payment => ApplicationStep::DocumentUpload,
            ApplicationStep::Status => ApplicationStep::Payment,
        }
    }

    pub const fn is_first(self) -> bool {
        matches!(self, ApplicationStep::PersonalInfo)
    }

    pub const fn is_last(self) -> bool {
        matches!(self, ApplicationStep::Status)
    }

    /// Stepper progress bar value: the current step counts as reached.
    pub fn progress_percent(self) -> u8 {
        let reached = self.index() + 1;
        ((reached * 100) / Self::ALL.len()) as u8
    }
}
