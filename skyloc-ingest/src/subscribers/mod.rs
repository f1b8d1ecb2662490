//! Live result subscribers

pub mod registry;

pub use registry::{
    BroadcastReport, ChannelSubscriber, DeliveryError, Subscriber, SubscriberId,
    SubscriberRegistry, SubscriptionGuard,
};
