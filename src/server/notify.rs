//! Change-subscription fan-out: tracks open WebSocket
//! subscriptions per user and pushes `file-updated`/`file-deleted` events to
//! every device but the one that caused the change.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::client::subscription::ChangeEvent;

struct Subscriber {
	device_id: Option<String>,
	sender: mpsc::UnboundedSender<ChangeEvent>,
}

/// In-memory registry of open change subscriptions, keyed by user id. One
/// process, one registry; a multi-node deployment would need this fanned
/// out through a shared bus instead, which this implementation does not
/// attempt.
#[derive(Default)]
pub struct NotifyRegistry {
	subscribers: Mutex<HashMap<String, Vec<(Uuid, Subscriber)>>>,
}

impl NotifyRegistry {
	pub fn new() -> Self {
		NotifyRegistry { subscribers: Mutex::new(HashMap::new()) }
	}

	/// Register a new subscriber for `user_id`, returning a receiver of
	/// events and an opaque handle to use with `unregister`.
	pub fn register(
		&self,
		user_id: &str,
		device_id: Option<String>,
	) -> (Uuid, mpsc::UnboundedReceiver<ChangeEvent>) {
		let (tx, rx) = mpsc::unbounded_channel();
		let id = Uuid::new_v4();
		let mut subscribers = self.subscribers.lock().expect("notify registry mutex poisoned");
		subscribers.entry(user_id.to_string()).or_default().push((id, Subscriber { device_id, sender: tx }));
		(id, rx)
	}

	/// Update the device id a subscriber self-identifies with, so later
	/// `publish` calls know to skip it as the originator.
	pub fn set_device_id(&self, user_id: &str, handle: Uuid, device_id: String) {
		let mut subscribers = self.subscribers.lock().expect("notify registry mutex poisoned");
		if let Some(list) = subscribers.get_mut(user_id) {
			if let Some((_, subscriber)) = list.iter_mut().find(|(id, _)| *id == handle) {
				subscriber.device_id = Some(device_id);
			}
		}
	}

	pub fn unregister(&self, user_id: &str, handle: Uuid) {
		let mut subscribers = self.subscribers.lock().expect("notify registry mutex poisoned");
		if let Some(list) = subscribers.get_mut(user_id) {
			list.retain(|(id, _)| *id != handle);
			if list.is_empty() {
				subscribers.remove(user_id);
			}
		}
	}

	/// Push `event` to every subscriber of `user_id` except `origin_device`,
	/// so the device that made the change doesn't receive its own echo.
	pub fn publish(&self, user_id: &str, event: ChangeEvent, origin_device: Option<&str>) {
		let subscribers = self.subscribers.lock().expect("notify registry mutex poisoned");
		let Some(list) = subscribers.get(user_id) else { return };
		for (_, subscriber) in list {
			if let (Some(origin), Some(mine)) = (origin_device, subscriber.device_id.as_deref()) {
				if origin == mine {
					continue;
				}
			}
			let _ = subscriber.sender.send(event.clone());
		}
	}

	pub fn subscriber_count(&self, user_id: &str) -> usize {
		self.subscribers.lock().expect("notify registry mutex poisoned").get(user_id).map(|l| l.len()).unwrap_or(0)
	}
}


// vim: ts=4
