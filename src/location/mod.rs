// 位置发布与订阅

pub mod publisher;
pub mod subscriber;

pub use publisher::LocationPublisher;
pub use subscriber::{LocationSubscriber, SubscriptionId};
