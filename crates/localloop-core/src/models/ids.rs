//! Backend-assigned identifiers

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! backend_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

backend_id!(
    /// A user account id (the `sub` claim of the access token)
    UserId
);
backend_id!(
    /// An item owned by a user
    ItemId
);
backend_id!(ListingId);
backend_id!(WindowId);
backend_id!(RequestId);
backend_id!(TransactionId);
backend_id!(
    /// Backend conversation id (one per transaction)
    ConversationId
);
backend_id!(
    /// Message id; locally created messages carry a `local-` prefix until
    /// the backend assigns the canonical id
    MessageId
);

const LOCAL_MESSAGE_PREFIX: &str = "local-";

impl MessageId {
    /// Temporary id for an optimistic message, time-sortable.
    pub fn temporary() -> Self {
        Self(format!("{LOCAL_MESSAGE_PREFIX}{}", uuid::Uuid::now_v7()))
    }

    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(LOCAL_MESSAGE_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_message_ids_are_unique_and_marked() {
        let first = MessageId::temporary();
        let second = MessageId::temporary();
        assert_ne!(first, second);
        assert!(first.is_temporary());
        assert!(!MessageId::new("65f0c0ffee").is_temporary());
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = RequestId::new("req-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""req-1""#);
        let parsed: RequestId = serde_json::from_str(r#""req-1""#).unwrap();
        assert_eq!(parsed, id);
    }
}
