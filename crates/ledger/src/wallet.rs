//! Wallet and category attributes consumed by the engine.
//!
//! Both are owned by collaborators (membership, wallet CRUD); the engine only
//! reads them.

use serde::{Deserialize, Serialize};

use splitledger_core::{
    CategoryId, CurrencyCode, DomainError, DomainResult, Entity, ParticipantId, WalletId,
};

/// A shared wallet as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,
    pub name: String,
    pub icon: String,
    /// Current members in display order. Order never affects settlement.
    pub participants: Vec<ParticipantId>,
    pub base_currency: CurrencyCode,
    pub archived: bool,
}

impl Wallet {
    /// A personal wallet: one owner, default icon.
    pub fn personal(
        id: WalletId,
        name: impl Into<String>,
        owner: ParticipantId,
        base_currency: CurrencyCode,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            icon: "wallet".to_string(),
            participants: vec![owner],
            base_currency,
            archived: false,
        }
    }

    /// Add a participant, keeping insertion order and ignoring duplicates.
    pub fn add_participant(&mut self, participant: ParticipantId) {
        if !self.is_member(participant) {
            self.participants.push(participant);
        }
    }

    pub fn remove_participant(&mut self, participant: ParticipantId) {
        self.participants.retain(|p| *p != participant);
    }

    pub fn is_member(&self, participant: ParticipantId) -> bool {
        self.participants.contains(&participant)
    }

    pub fn is_shared(&self) -> bool {
        self.participants.len() > 1
    }

    pub fn ensure_member(&self, participant: ParticipantId) -> DomainResult<()> {
        if self.is_member(participant) {
            Ok(())
        } else {
            Err(DomainError::invalid_participant(self.id, participant))
        }
    }

    /// New movements can only be recorded against a live wallet.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.archived {
            Err(DomainError::validation(format!(
                "wallet {} is archived",
                self.id
            )))
        } else {
            Ok(())
        }
    }
}

impl Entity for Wallet {
    type Id = WalletId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Static spending category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    /// Stable key used by clients to pick an icon or translation.
    pub key: Option<String>,
}

impl Entity for Category {
    type Id = CategoryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Keys and display names of the categories every installation starts with.
pub const DEFAULT_CATEGORIES: [(&str, &str); 10] = [
    ("accommodation", "Accommodation"),
    ("transport", "Transport"),
    ("food", "Food"),
    ("entertainment", "Entertainment"),
    ("shopping", "Shopping"),
    ("health", "Health"),
    ("communication", "Communication"),
    ("services", "Services"),
    ("subscriptions", "Subscriptions"),
    ("other", "Other"),
];

/// Build the default category set with fresh identifiers.
pub fn default_categories() -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .map(|(key, name)| Category {
            id: CategoryId::new(),
            name: (*name).to_string(),
            key: Some((*key).to_string()),
        })
        .collect()
}
