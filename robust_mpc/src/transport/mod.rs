mod framed;

pub use framed::*;

use std::{collections::VecDeque, time::Duration};

use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    StreamExt,
};
use thiserror::Error;
use tokio::time::{sleep_until, Instant};

/// Error type for channels.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Error while sending message to {0}")]
    Send(usize),
    #[error("Error while receiving message from {0}")]
    Recv(usize),
    #[error("Inbox closed")]
    Closed,
}

/// Receiving half of party's channels. Yields `(sender, message)` pairs.
pub type Inbox<M> = UnboundedReceiver<(usize, M)>;

/// Sending half of party's channels.
/// Sends never block; messages between each ordered pair of parties are delivered in order.
pub struct Outbox<M> {
    party_id: usize,
    links: Vec<UnboundedSender<(usize, M)>>,
}

impl<M> Clone for Outbox<M> {
    fn clone(&self) -> Self {
        Self {
            party_id: self.party_id,
            links: self.links.clone(),
        }
    }
}

impl<M> Outbox<M> {
    /// ID of party owning this outbox.
    pub fn party_id(&self) -> usize {
        self.party_id
    }

    /// Number of reachable parties, including owner.
    pub fn num_parties(&self) -> usize {
        self.links.len()
    }

    /// Send message to party with given ID. Sending to self is allowed.
    pub fn send(&self, to: usize, msg: M) -> Result<(), TransportError> {
        self.links
            .get(to)
            .ok_or(TransportError::Send(to))?
            .unbounded_send((self.party_id, msg))
            .map_err(|_| TransportError::Send(to))
    }
}

impl<M: Clone> Outbox<M> {
    /// Send message to all parties including self.
    /// Returns first failure; remaining parties still receive message.
    pub fn send_to_all(&self, msg: M) -> Result<(), TransportError> {
        (0..self.links.len())
            .map(|to| self.send(to, msg.clone()))
            .fold(Ok(()), Result::and)
    }
}

/// Channels of a single party in multi-party protocol.
pub struct PartyChannels<M> {
    pub outbox: Outbox<M>,
    pub inbox: Inbox<M>,
}

/// Create unbounded inboxes of all parties.
fn inboxes<M>(num_parties: usize) -> (Vec<UnboundedSender<(usize, M)>>, Vec<Inbox<M>>) {
    (0..num_parties).map(|_| mpsc::unbounded()).unzip()
}

/// Create in-process channels with direct delivery.
pub fn local_router<M>(num_parties: usize) -> Vec<PartyChannels<M>> {
    let (senders, receivers) = inboxes(num_parties);
    receivers
        .into_iter()
        .enumerate()
        .map(|(party_id, inbox)| PartyChannels {
            outbox: Outbox {
                party_id,
                links: senders.clone(),
            },
            inbox,
        })
        .collect()
}

/// Create in-process channels delivering every message after constant latency.
/// Spawns one forwarding task per ordered pair of parties, so must run inside tokio runtime.
pub fn delayed_router<M>(num_parties: usize, latency: Duration) -> Vec<PartyChannels<M>>
where
    M: Send + 'static,
{
    let (senders, receivers) = inboxes(num_parties);
    receivers
        .into_iter()
        .enumerate()
        .map(|(party_id, inbox)| {
            let links = senders
                .iter()
                .map(|target| {
                    let (tx, rx) = mpsc::unbounded();
                    tokio::spawn(delay_link(rx, target.clone(), latency));
                    tx
                })
                .collect();
            PartyChannels {
                outbox: Outbox { party_id, links },
                inbox,
            }
        })
        .collect()
}

/// Forward messages of one link, holding each back until `latency` passed since it was sent.
async fn delay_link<T>(
    mut incoming: UnboundedReceiver<T>,
    target: UnboundedSender<T>,
    latency: Duration,
) {
    let mut queue: VecDeque<(Instant, T)> = VecDeque::new();
    let mut closed = false;

    loop {
        let deadline = queue.front().map(|(at, _)| *at);
        tokio::select! {
            msg = incoming.next(), if !closed => match msg {
                Some(msg) => queue.push_back((Instant::now() + latency, msg)),
                None => closed = true,
            },
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some((_, msg)) = queue.pop_front() {
                    if target.unbounded_send(msg).is_err() {
                        break;
                    }
                }
            },
            else => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_router_delivery() {
        let mut parties = local_router::<u32>(3);
        parties[0].outbox.send(2, 10).unwrap();
        parties[1].outbox.send(2, 11).unwrap();
        parties[2].outbox.send(2, 12).unwrap();

        let inbox = &mut parties[2].inbox;
        let received: Vec<_> = inbox.take(3).collect().await;
        assert_eq!(received, vec![(0, 10), (1, 11), (2, 12)]);
    }

    #[tokio::test]
    async fn test_send_to_unknown_party() {
        let parties = local_router::<u32>(2);
        assert_eq!(parties[0].outbox.send(5, 1), Err(TransportError::Send(5)));
    }

    #[tokio::test]
    async fn test_send_to_dropped_party() {
        let mut parties = local_router::<u32>(2);
        drop(parties.pop());
        assert_eq!(parties[0].outbox.send(1, 1), Err(TransportError::Send(1)));
        assert_eq!(parties[0].outbox.send_to_all(1), Err(TransportError::Send(1)));
    }

    #[tokio::test]
    async fn test_delayed_router_keeps_order() {
        let latency = Duration::from_millis(50);
        let mut parties = delayed_router::<u32>(2, latency);
        let start = Instant::now();
        for i in 0..5 {
            parties[0].outbox.send(1, i).unwrap();
        }

        let received: Vec<_> = (&mut parties[1].inbox).take(5).collect().await;
        assert_eq!(received, (0..5).map(|i| (0, i)).collect::<Vec<_>>());
        assert!(start.elapsed() >= latency);
    }
}
