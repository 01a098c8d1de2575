use async_channel::{Receiver, Sender, TrySendError};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Error;

const CHANNEL_CAPACITY: usize = 1024;

/// Something the messaging side may want to tell users about.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoadEvent {
    #[serde(rename_all = "camelCase")]
    Posted {
        load_id: Uuid,
        client_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    BidSubmitted {
        load_id: Uuid,
        bid_id: Uuid,
        driver_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    BidAccepted {
        load_id: Uuid,
        bid_id: Uuid,
        driver_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    Canceled {
        load_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    Delivered {
        load_id: Uuid,
        driver_id: Uuid,
        driver_amount: Decimal,
        platform_fee: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    Reactivated {
        load_id: Uuid,
    },
    #[serde(rename_all = "camelCase")]
    Deleted {
        load_id: Uuid,
    },
}

/// Fire-and-forget handle onto the notification queue. Sending never blocks
/// and never fails the caller.
#[derive(Clone, Debug)]
pub struct Notifier {
    sender: Option<Sender<LoadEvent>>,
}

impl Notifier {
    pub fn channel() -> (Self, Receiver<LoadEvent>) {
        let (sender, receiver) = async_channel::bounded(CHANNEL_CAPACITY);

        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn notify(&self, event: LoadEvent) {
        let sender = match &self.sender {
            Some(sender) => sender,
            None => return,
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(?event, "notification queue full, dropping event")
            }
            Err(TrySendError::Closed(event)) => {
                tracing::warn!(?event, "notification queue closed, dropping event")
            }
        }
    }
}

/// Drains the queue until every notifier is dropped, forwarding each event to
/// `webhook` when one is configured.
pub async fn dispatch(receiver: Receiver<LoadEvent>, webhook: Option<String>) {
    let client = reqwest::Client::new();

    while let Ok(event) = receiver.recv().await {
        tracing::info!(?event, "load event");

        let url = match &webhook {
            Some(url) => url,
            None => continue,
        };

        let result = client
            .post(url)
            .json(&event)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(Error::from);

        if let Err(err) = result {
            tracing::warn!(code = err.code, "notification dropped");
        }
    }

    tracing::info!("notification queue closed");
}

#[test]
fn notify_enqueues_event_test() {
    let (notifier, receiver) = Notifier::channel();
    let load_id = Uuid::new_v4();

    notifier.notify(LoadEvent::Canceled { load_id });

    let event = tokio_test::block_on(receiver.recv()).unwrap();
    assert_eq!(event, LoadEvent::Canceled { load_id });
}

#[test]
fn closed_queue_is_ignored_test() {
    let (notifier, receiver) = Notifier::channel();
    drop(receiver);

    notifier.notify(LoadEvent::Deleted {
        load_id: Uuid::new_v4(),
    });
    Notifier::disabled().notify(LoadEvent::Deleted {
        load_id: Uuid::new_v4(),
    });
}

#[test]
fn event_json_shape_test() {
    let load_id = Uuid::new_v4();
    let value = serde_json::to_value(LoadEvent::Reactivated { load_id }).unwrap();

    assert_eq!(value["event"], "reactivated");
    assert_eq!(value["loadId"], load_id.to_string());

    let driver_id = Uuid::new_v4();
    let value = serde_json::to_value(LoadEvent::Delivered {
        load_id,
        driver_id,
        driver_amount: Decimal::new(9800, 2),
        platform_fee: Decimal::new(200, 2),
    })
    .unwrap();

    assert_eq!(value["event"], "delivered");
    assert_eq!(value["driverId"], driver_id.to_string());
    assert_eq!(value["driverAmount"], "98.00");
    assert_eq!(value["platformFee"], "2.00");
    assert!(value.get("load_id").is_none());
}
