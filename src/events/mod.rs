pub mod event;
pub mod hub;

pub use event::ProgressEvent;
pub use hub::{ObserverHub, SubscriberHandle};
