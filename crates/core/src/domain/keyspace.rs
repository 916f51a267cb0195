// Keyspace - store key derivation for one logical queue

use super::error::{DomainError, Result};

/// Maximum queue name length
pub const MAX_QUEUE_NAME_LEN: usize = 128;

/// A string prefixed onto a name to build a store key.
///
/// ```
/// use leaseq_core::domain::KeyPrefix;
///
/// let cv = KeyPrefix::new("cv:");
/// assert_eq!(cv.of("abcdef-123456"), "cv:abcdef-123456");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPrefix(String);

impl KeyPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self(prefix.into())
    }

    /// Prefix `self` onto `name`
    pub fn of(&self, name: &str) -> String {
        let mut key = String::with_capacity(self.0.len() + name.len());
        key.push_str(&self.0);
        key.push_str(name);
        key
    }

    /// Prefix `self` onto `name`, returning the result as a new prefix
    pub fn concat(&self, name: &str) -> KeyPrefix {
        KeyPrefix(self.of(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// All keys belonging to one queue.
///
/// For queue `N`: `N:queue`, `N:processing` and `N:cleaning` are lists,
/// `N:leased_by_session:<id>` is the expiring lease record and
/// `N:item:<id>` holds the item payload.
#[derive(Debug, Clone)]
pub struct KeySpace {
    name: KeyPrefix,
    main_list: String,
    processing_list: String,
    cleaning_list: String,
    lease: KeyPrefix,
    item_data: KeyPrefix,
}

impl KeySpace {
    pub fn new(queue_name: impl Into<String>) -> Result<Self> {
        let queue_name = queue_name.into();
        validate_queue_name(&queue_name)?;

        let name = KeyPrefix::new(queue_name);
        Ok(Self {
            main_list: name.of(":queue"),
            processing_list: name.of(":processing"),
            cleaning_list: name.of(":cleaning"),
            lease: name.concat(":leased_by_session:"),
            item_data: name.concat(":item:"),
            name,
        })
    }

    pub fn queue_name(&self) -> &str {
        self.name.as_str()
    }

    pub fn main_list(&self) -> &str {
        &self.main_list
    }

    pub fn processing_list(&self) -> &str {
        &self.processing_list
    }

    pub fn cleaning_list(&self) -> &str {
        &self.cleaning_list
    }

    pub fn lease_key(&self, item_id: &str) -> String {
        self.lease.of(item_id)
    }

    pub fn item_key(&self, item_id: &str) -> String {
        self.item_data.of(item_id)
    }
}

/// Validate a queue name before deriving keys from it
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DomainError::InvalidQueueName(
            "queue name cannot be empty".to_string(),
        ));
    }

    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(DomainError::InvalidQueueName(format!(
            "queue name too long (max {} chars)",
            MAX_QUEUE_NAME_LEN
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    {
        return Err(DomainError::InvalidQueueName(format!(
            "'{}' must be alphanumeric (plus _ - . :)",
            name
        )));
    }

    Ok(())
}
