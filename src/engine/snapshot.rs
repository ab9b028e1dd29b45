use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::types::{Operation, Session, Settings, SkillRecord, UserProfile};
use crate::error::{EngineError, EngineResult};

pub const DOCUMENT_VERSION: u32 = 1;

/// The single persisted document: everything the engine needs to come
/// back after a restart. Unknown fields are ignored and missing ones
/// default, so documents from older builds keep loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileDocument {
    pub version: u32,
    pub profile: UserProfile,
    pub settings: Settings,
    pub skill_records: BTreeMap<Operation, SkillRecord>,
    pub sessions: Vec<Session>,
}

impl Default for ProfileDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            profile: UserProfile::default(),
            settings: Settings::default(),
            skill_records: BTreeMap::new(),
            sessions: Vec::new(),
        }
    }
}

impl ProfileDocument {
    /// Checks the version and pulls out-of-range values back into their
    /// documented domains. Invalid settings are repaired, not rejected.
    pub fn validated(mut self) -> EngineResult<Self> {
        if self.version > DOCUMENT_VERSION {
            return Err(EngineError::Validation(format!(
                "document version {} is newer than supported version {}",
                self.version, DOCUMENT_VERSION
            )));
        }
        self.version = DOCUMENT_VERSION;
        self.settings = self.settings.clamped();

        self.profile.level = self.profile.level.max(1);
        self.profile.xp = self.profile.xp.max(0);
        self.profile.xp_to_next = self.profile.xp_to_next.max(1);
        if self.profile.xp >= self.profile.xp_to_next {
            self.profile.xp = self.profile.xp_to_next - 1;
        }

        for record in self.skill_records.values_mut() {
            record.ema_accuracy = record.ema_accuracy.clamp(0.0, 1.0);
            record.ema_response_time_ms = record.ema_response_time_ms.max(1.0);
        }
        Ok(self)
    }
}
