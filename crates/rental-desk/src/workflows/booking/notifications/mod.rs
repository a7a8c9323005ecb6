//! Notification rule table and the background outbox that delivers matching messages.

mod outbox;
mod rules;

pub use outbox::NotificationOutbox;
pub use rules::{NotificationRuleError, NotificationRules, RecipientRole, RoleTemplates, TemplateId};
