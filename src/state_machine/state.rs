//! Wizard session state types

use crate::chat::{ChatId, MessageId, UserId};
use crate::reference::{Region, SubRegion};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Which answer the wizard is waiting for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WizardStep {
    #[default]
    AwaitingName,
    AwaitingRegion,
    AwaitingSubRegion,
}

impl WizardStep {
    pub const COUNT: u8 = 3;

    /// The field a candidate pick is valid for at this step
    pub fn pickable_field(self) -> Option<WizardField> {
        match self {
            WizardStep::AwaitingName => None,
            WizardStep::AwaitingRegion => Some(WizardField::Region),
            WizardStep::AwaitingSubRegion => Some(WizardField::SubRegion),
        }
    }
}

/// Fields that are resolved against reference data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WizardField {
    Region,
    SubRegion,
}

impl WizardField {
    pub fn as_str(self) -> &'static str {
        match self {
            WizardField::Region => "region",
            WizardField::SubRegion => "sub_region",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WizardField::Region => "province",
            WizardField::SubRegion => "city",
        }
    }
}

impl fmt::Display for WizardField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WizardField {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "region" => Ok(WizardField::Region),
            "sub_region" => Ok(WizardField::SubRegion),
            _ => Err(()),
        }
    }
}

/// Partial shelter record built up by the wizard
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CollectedFields {
    pub name: Option<String>,
    pub region: Option<Region>,
    pub sub_region: Option<SubRegion>,
}

/// Changes applied to a session when a new prompt is issued
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionUpdate {
    pub step: Option<WizardStep>,
    pub name: Option<String>,
    pub region: Option<Region>,
    pub sub_region: Option<SubRegion>,
}

#[cfg(test)]
impl SessionUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl CollectedFields {
    /// Merge set fields from `update`; unset fields keep their value
    pub fn merge(&mut self, update: SessionUpdate) {
        if let Some(name) = update.name {
            self.name = Some(name);
        }
        if let Some(region) = update.region {
            self.region = Some(region);
        }
        if let Some(sub_region) = update.sub_region {
            self.sub_region = Some(sub_region);
        }
    }
}

/// In-flight wizard for one conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub conversation_id: ChatId,
    pub step: WizardStep,
    pub initiator: UserId,
    /// Last prompt awaiting a reply; `None` until the first prompt is sent
    pub pending_prompt_id: Option<MessageId>,
    pub fields: CollectedFields,
    pub opened_at: Instant,
}

impl Session {
    pub fn new(conversation_id: ChatId, initiator: UserId) -> Self {
        Self {
            conversation_id,
            step: WizardStep::AwaitingName,
            initiator,
            pending_prompt_id: None,
            fields: CollectedFields::default(),
            opened_at: Instant::now(),
        }
    }

    pub fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.opened_at.elapsed() >= ttl)
    }

    /// Apply an update: rotate the prompt id, move the step, merge fields
    pub fn apply(&mut self, prompt_id: MessageId, update: SessionUpdate) {
        self.pending_prompt_id = Some(prompt_id);
        if let Some(step) = update.step {
            self.step = step;
        }
        self.fields.merge(update);
    }
}

/// A completed shelter registration, ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelterDraft {
    pub conversation_id: ChatId,
    pub initiator: UserId,
    pub name: String,
    pub region: Region,
    pub sub_region: SubRegion,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(id: i64, name: &str) -> Region {
        Region {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut fields = CollectedFields {
            name: Some("Bunker".to_string()),
            ..CollectedFields::default()
        };
        fields.merge(SessionUpdate {
            region: Some(region(1, "Fars")),
            ..SessionUpdate::default()
        });
        assert_eq!(fields.name.as_deref(), Some("Bunker"));
        assert_eq!(fields.region, Some(region(1, "Fars")));
    }

    #[test]
    fn test_apply_rotates_prompt_and_step() {
        let mut session = Session::new(-100, 7);
        session.apply(
            42,
            SessionUpdate {
                step: Some(WizardStep::AwaitingRegion),
                name: Some("Bunker".to_string()),
                ..SessionUpdate::default()
            },
        );
        assert_eq!(session.pending_prompt_id, Some(42));
        assert_eq!(session.step, WizardStep::AwaitingRegion);

        session.apply(43, SessionUpdate::default());
        assert_eq!(session.pending_prompt_id, Some(43));
        assert_eq!(session.step, WizardStep::AwaitingRegion);
    }

    #[test]
    fn test_field_round_trips_through_payload_text() {
        for field in [WizardField::Region, WizardField::SubRegion] {
            assert_eq!(field.as_str().parse::<WizardField>(), Ok(field));
        }
        assert!("province".parse::<WizardField>().is_err());
    }

    #[test]
    fn test_expiry_disabled_without_ttl() {
        let session = Session::new(1, 1);
        assert!(!session.is_expired(None));
        assert!(session.is_expired(Some(Duration::ZERO)));
    }
}
