//! Message bus dispatcher.

mod bus;

pub use bus::{
    HandlerFailure, HistoryFilter, MessageBus, PublishReport, Subscription, SubscriptionId,
};
