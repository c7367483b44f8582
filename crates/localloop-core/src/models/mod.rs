//! Data models for LocalLoop

mod ids;
mod item;
mod listing;
mod message;
mod notification;
mod profile;
mod request;
mod transaction;

pub use ids::{
    ConversationId, ItemId, ListingId, MessageId, RequestId, TransactionId, UserId, WindowId,
};
pub use item::{Item, ItemDetails};
pub use listing::{
    AvailabilityWindow, ItemPhoto, Listing, ListingFilter, ListingStatus, ListingType,
    WindowStatus,
};
pub use message::{BackendConversation, BackendMessage, Conversation, ConversationKey, Message};
pub use notification::{BackendNotification, Notification, NotificationKind};
pub use profile::{Actor, ProfileUpdate, UserProfile};
pub use request::{ItemRequest, NewRequest, RequestStatus, RequestType, RequestWithItem};
pub use transaction::{
    Transaction, TransactionStatus, TransactionType, TransactionWithItem,
};
