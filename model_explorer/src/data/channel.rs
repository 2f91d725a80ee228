use bevy::prelude::Resource;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::walkthrough::Phase;

/// What external chrome needs to mirror the walkthrough.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct WalkthroughSnapshot {
    pub phase: Phase,
    pub time: f32,
    pub phase_length: f32,
    pub running: bool,
    pub speed: f32,
    /// Whole-walkthrough progress in [0, 1].
    pub progress: f32,
}

/// Bevy resource fanning walkthrough changes out to subscribed channels.
/// Slow subscribers miss updates instead of blocking the frame loop.
#[derive(Resource, Default)]
pub struct ChromeFeed {
    subscribers: Vec<Sender<WalkthroughSnapshot>>,
}

impl ChromeFeed {
    pub fn subscribe(&mut self) -> Receiver<WalkthroughSnapshot> {
        let (tx, rx) = crossbeam_channel::bounded(64);
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, snapshot: WalkthroughSnapshot) {
        self.subscribers
            .retain(|tx| !matches!(tx.try_send(snapshot), Err(TrySendError::Disconnected(_))));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(time: f32) -> WalkthroughSnapshot {
        WalkthroughSnapshot {
            phase: Phase::Embedding,
            time,
            phase_length: 10.0,
            running: true,
            speed: 1.0,
            progress: 0.3,
        }
    }

    #[test]
    fn subscribers_receive_published_snapshots() {
        let mut feed = ChromeFeed::default();
        let rx = feed.subscribe();
        feed.publish(snapshot(1.0));
        feed.publish(snapshot(2.0));
        assert_eq!(rx.try_recv().unwrap().time, 1.0);
        assert_eq!(rx.try_recv().unwrap().time, 2.0);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let mut feed = ChromeFeed::default();
        let kept = feed.subscribe();
        drop(feed.subscribe());
        feed.publish(snapshot(0.5));
        assert_eq!(feed.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn full_channel_does_not_block() {
        let mut feed = ChromeFeed::default();
        let rx = feed.subscribe();
        for i in 0..100 {
            feed.publish(snapshot(i as f32));
        }
        assert_eq!(rx.len(), 64);
        assert_eq!(feed.subscriber_count(), 1);
    }
}
