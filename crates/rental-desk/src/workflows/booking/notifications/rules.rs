use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::workflows::booking::status::{BookingStatus, UnknownStatus};

/// Who on a booking receives a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecipientRole {
    Customer,
    ResourceManager,
}

impl RecipientRole {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::ResourceManager => "resourceManager",
        }
    }
}

impl fmt::Display for RecipientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for RecipientRole {
    type Err = NotificationRuleError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "customer" => Ok(Self::Customer),
            "resourcemanager" | "manager" => Ok(Self::ResourceManager),
            _ => Err(NotificationRuleError::UnknownRole(raw.to_string())),
        }
    }
}

/// Message template identifier understood by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(pub String);

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type RoleTemplates = BTreeMap<RecipientRole, TemplateId>;

static NO_RULES: RoleTemplates = BTreeMap::new();

/// Immutable `status -> {role -> template}` table consulted after every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationRules {
    rules: BTreeMap<BookingStatus, RoleTemplates>,
}

impl NotificationRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in table used when no rule file is configured.
    pub fn standard() -> Self {
        use BookingStatus::*;
        use RecipientRole::*;

        let entries = [
            (Pending, Customer, "booking_received"),
            (Pending, ResourceManager, "booking_awaiting_verification"),
            (Verified, Customer, "booking_verified"),
            (Rejected, Customer, "booking_rejected"),
            (Confirmed, Customer, "booking_confirmed"),
            (Confirmed, ResourceManager, "vehicle_reserved"),
            (Active, Customer, "rental_started"),
            (Completed, Customer, "rental_completed"),
            (Completed, ResourceManager, "vehicle_returned"),
            (Overdue, Customer, "rental_overdue"),
            (Overdue, ResourceManager, "rental_overdue_manager"),
            (Cancelled, Customer, "booking_cancelled"),
            (Cancelled, ResourceManager, "vehicle_released"),
        ];

        let mut rules = Self::empty();
        for (status, role, template) in entries {
            rules.insert(status, role, TemplateId(template.to_string()));
        }
        rules
    }

    pub fn from_entries<I>(entries: I) -> Result<Self, NotificationRuleError>
    where
        I: IntoIterator<Item = (BookingStatus, RecipientRole, TemplateId)>,
    {
        let mut rules = Self::empty();
        for (status, role, template) in entries {
            if template.0.trim().is_empty() {
                return Err(NotificationRuleError::EmptyTemplate { status, role });
            }
            if rules.insert(status, role, template).is_some() {
                return Err(NotificationRuleError::Duplicate { status, role });
            }
        }
        Ok(rules)
    }

    /// Parse `{"<status>": {"customer": "<template>", "resourceManager": "<template>"}}`.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, NotificationRuleError> {
        let raw: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_reader(reader)?;
        let mut entries = Vec::new();
        for (status, roles) in raw {
            let status = status.parse::<BookingStatus>()?;
            for (role, template) in roles {
                entries.push((status, role.parse::<RecipientRole>()?, TemplateId(template)));
            }
        }
        Self::from_entries(entries)
    }

    /// Parse rows with headers `status,role,template`.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, NotificationRuleError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut entries = Vec::new();
        for row in csv_reader.deserialize::<RuleRow>() {
            let row = row?;
            entries.push((
                row.status.parse::<BookingStatus>()?,
                row.role.parse::<RecipientRole>()?,
                TemplateId(row.template),
            ));
        }
        Self::from_entries(entries)
    }

    /// Load a rule file, picking the format from its extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, NotificationRuleError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("json") => Self::from_json_reader(std::fs::File::open(path)?),
            Some("csv") => Self::from_csv_reader(std::fs::File::open(path)?),
            _ => Err(NotificationRuleError::UnsupportedFormat(
                path.display().to_string(),
            )),
        }
    }

    /// Role/template pairs for `status`; empty when nothing is configured.
    pub fn rules_for(&self, status: BookingStatus) -> &RoleTemplates {
        self.rules.get(&status).unwrap_or(&NO_RULES)
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(
        &mut self,
        status: BookingStatus,
        role: RecipientRole,
        template: TemplateId,
    ) -> Option<TemplateId> {
        self.rules.entry(status).or_default().insert(role, template)
    }
}

#[derive(Debug, Deserialize)]
struct RuleRow {
    status: String,
    role: String,
    template: String,
}

/// Errors raised while loading a notification rule table.
#[derive(Debug, thiserror::Error)]
pub enum NotificationRuleError {
    #[error("failed to read notification rules: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON notification rules: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid CSV notification rules: {0}")]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    UnknownStatus(#[from] UnknownStatus),
    #[error("unknown recipient role '{0}'")]
    UnknownRole(String),
    #[error("empty template for {role} on {status}")]
    EmptyTemplate {
        status: BookingStatus,
        role: RecipientRole,
    },
    #[error("duplicate rule for {role} on {status}")]
    Duplicate {
        status: BookingStatus,
        role: RecipientRole,
    },
    #[error("unsupported notification rule format: {0} (expected .json or .csv)")]
    UnsupportedFormat(String),
}
