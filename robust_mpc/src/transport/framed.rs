use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    SinkExt, StreamExt,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio_serde::formats::Bincode;
use tokio_util::codec::LengthDelimitedCodec;
use tracing::warn;

use super::{inboxes, Outbox, PartyChannels, TransportError};

/// Length-framed Bincode-encoded messages channel.
pub type BincodeStreamSink<T, C> =
    tokio_serde::Framed<tokio_util::codec::Framed<C, LengthDelimitedCodec>, T, T, Bincode<T, T>>;

/// Length-framed Bincode-encoded tokio's Duplex stream.
pub type BincodeDuplex<T> = BincodeStreamSink<T, DuplexStream>;

/// Create length-framed Bincode-encoded message channel from AsyncRead/Write.
pub fn wrap_channel_with_bincode<T, C>(channel: C) -> BincodeStreamSink<T, C>
where
    C: AsyncRead + AsyncWrite,
{
    let length_delimited = tokio_util::codec::Framed::new(channel, LengthDelimitedCodec::new());
    tokio_serde::Framed::new(length_delimited, Bincode::default())
}

/// Create bidirectional Bincode-encoded channel.
pub fn bincode_duplex<T>(max_buf_size: usize) -> (BincodeDuplex<T>, BincodeDuplex<T>) {
    let (a, b) = tokio::io::duplex(max_buf_size);
    (wrap_channel_with_bincode(a), wrap_channel_with_bincode(b))
}

/// Create in-process channels where every message is serialized and carried over
/// a length-framed byte stream, one stream per ordered pair of parties.
/// Spawns forwarding tasks, so must run inside tokio runtime.
pub fn bincode_router<M>(num_parties: usize, max_buf_size: usize) -> Vec<PartyChannels<M>>
where
    M: Serialize + DeserializeOwned + Send + Unpin + 'static,
{
    let (senders, receivers) = inboxes(num_parties);
    receivers
        .into_iter()
        .enumerate()
        .map(|(party_id, inbox)| {
            let links = senders
                .iter()
                .enumerate()
                .map(|(to, target)| {
                    let (tx, rx) = mpsc::unbounded();
                    let (writer, reader) = bincode_duplex::<M>(max_buf_size);
                    tokio::spawn(write_link(rx, writer, to));
                    tokio::spawn(read_link(reader, target.clone(), party_id));
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

/// Encode outgoing messages of one link into the byte stream.
async fn write_link<M>(
    mut outgoing: UnboundedReceiver<(usize, M)>,
    mut writer: BincodeDuplex<M>,
    to: usize,
) where
    M: Serialize + Unpin,
{
    while let Some((_, msg)) = outgoing.next().await {
        if let Err(err) = writer.send(msg).await {
            warn!(%err, error = %TransportError::Send(to), "Link closed");
            return;
        }
    }
}

/// Decode messages of one link and deliver them to the receiving party's inbox.
async fn read_link<M>(mut reader: BincodeDuplex<M>, target: UnboundedSender<(usize, M)>, from: usize)
where
    M: DeserializeOwned + Unpin,
{
    while let Some(raw) = reader.next().await {
        match raw {
            Ok(msg) => {
                if target.unbounded_send((from, msg)).is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!(%err, error = %TransportError::Recv(from), "Dropping link");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bincode_duplex() {
        let (mut a, mut b) = bincode_duplex::<(u64, String)>(1024);
        a.send((7, "seven".to_string())).await.unwrap();
        assert_eq!(b.next().await.unwrap().unwrap(), (7, "seven".to_string()));
    }

    #[tokio::test]
    async fn test_bincode_router() {
        let mut parties = bincode_router::<Vec<u64>>(3, 64);
        parties[1].outbox.send(0, vec![1, 2, 3]).unwrap();
        parties[1].outbox.send(0, vec![4]).unwrap();
        parties[0].outbox.send(0, vec![]).unwrap();

        let mut received: Vec<_> = (&mut parties[0].inbox).take(3).collect().await;
        received.sort();
        assert_eq!(received, vec![(0, vec![]), (1, vec![1, 2, 3]), (1, vec![4])]);
    }
}
