use serde::{Deserialize, Serialize};

use voipbill_core::{CustomerCode, DomainError};

/// Postal address as carried on accounting documents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub zip_code: String,
}

impl Address {
    pub fn is_empty(&self) -> bool {
        self.street.trim().is_empty() && self.city.trim().is_empty() && self.zip_code.trim().is_empty()
    }
}

/// Customer loaded from the accounting address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub code: CustomerCode,
    pub name: String,
    pub email: Option<String>,
    #[serde(default)]
    pub address: Address,
}

impl Party {
    pub fn new(code: CustomerCode, name: impl Into<String>) -> Self {
        Self {
            code,
            name: name.into(),
            email: None,
            address: Address::default(),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Address call listings are mailed to.
    ///
    /// Blank values count as missing.
    pub fn notification_email(&self) -> Option<&str> {
        self.email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
    }

    /// Name shown in logs and mail subjects; falls back to the code.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.code.as_str()
        } else {
            &self.name
        }
    }
}

/// Minimal customer data written inline into a document when the address
/// book has no record for the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyDraft {
    pub name: String,
    pub address: Address,
    /// Free-text note carrying the provider's customer id.
    pub note: String,
}

impl PartyDraft {
    pub fn new(name: impl Into<String>, address: Address, note: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::incomplete("party name must not be empty"));
        }
        Ok(Self {
            name,
            address,
            note: note.into(),
        })
    }
}

/// Customer an order is issued to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum CustomerRef {
    /// Known to the address book; attached by code.
    Existing { code: CustomerCode },
    /// Unknown; name and address are copied onto the document.
    Inline { draft: PartyDraft },
}

impl CustomerRef {
    pub fn existing(code: CustomerCode) -> Self {
        Self::Existing { code }
    }

    pub fn inline(draft: PartyDraft) -> Self {
        Self::Inline { draft }
    }

    pub fn code(&self) -> Option<&CustomerCode> {
        match self {
            Self::Existing { code } => Some(code),
            Self::Inline { .. } => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Existing { .. } => None,
            Self::Inline { draft } => Some(&draft.name),
        }
    }
}
