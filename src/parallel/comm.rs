//! Non-blocking message passing between memory domains.
//!
//! Messages are contiguous byte buffers. Every send and receive returns a handle, and a
//! receive buffer is only available once its handle has been waited on.
use crate::error::{AssemblyError, Result};
use bytemuck::Pod;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::trace;
use std::mem::size_of;

/// Identifies the purpose of a message. Verified on receipt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CommTag(pub u16);

impl CommTag {
    pub const COMM_PKG_SETUP: CommTag = CommTag(1);
    pub const ELIMINATION: CommTag = CommTag(2);
    pub const MATVEC: CommTag = CommTag(3);
    pub const GALERKIN: CommTag = CommTag(4);
}

/// Anything that can be waited on.
pub trait Wait {
    /// Block until the operation has completed, returning the received data for receives.
    fn wait(self) -> Result<Option<Vec<u8>>>;
}

/// A communicator connecting `size()` domains, numbered by rank.
///
/// Messages between an ordered pair of ranks are delivered in the order they were sent. The
/// receive handles for one peer must be waited on in the order they were posted.
pub trait Communicator: Send + Sync {
    type SendHandle: Wait;
    type RecvHandle: Wait;

    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: CommTag, data: &[u8]) -> Result<Self::SendHandle>;

    fn irecv(&self, peer: usize, tag: CommTag) -> Result<Self::RecvHandle>;
}

/// A handle for an operation that completed when it was posted.
#[derive(Debug, Clone, Default)]
pub struct Completed;

impl Wait for Completed {
    fn wait(self) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// The communicator of a single domain, without any peers.
#[derive(Debug, Copy, Clone, Default)]
pub struct SerialComm;

impl Communicator for SerialComm {
    type SendHandle = Completed;
    type RecvHandle = Completed;

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, peer: usize, _tag: CommTag, _data: &[u8]) -> Result<Completed> {
        Err(AssemblyError::Communication(format!(
            "serial communicator has no peer {}",
            peer
        )))
    }

    fn irecv(&self, peer: usize, _tag: CommTag) -> Result<Completed> {
        Err(AssemblyError::Communication(format!(
            "serial communicator has no peer {}",
            peer
        )))
    }
}

#[derive(Debug)]
struct Envelope {
    tag: CommTag,
    payload: Vec<u8>,
}

/// Domains living in the same process, typically one per thread, connected by channels.
///
/// Each ordered pair of ranks has its own unbounded channel, so sends never block.
#[derive(Debug, Clone)]
pub struct ChannelComm {
    rank: usize,
    senders: Vec<Sender<Envelope>>,
    receivers: Vec<Receiver<Envelope>>,
}

impl ChannelComm {
    /// Create the communicators of all `size` ranks. Entry `r` belongs to rank `r`.
    pub fn world(size: usize) -> Vec<ChannelComm> {
        let mut senders: Vec<Vec<Sender<Envelope>>> = vec![Vec::with_capacity(size); size];
        let mut receivers: Vec<Vec<Receiver<Envelope>>> = vec![Vec::with_capacity(size); size];
        for from in 0..size {
            for to in 0..size {
                let (sender, receiver) = unbounded();
                senders[from].push(sender);
                receivers[to].push(receiver);
            }
        }
        // receivers[to] was filled in order of `from`
        senders
            .into_iter()
            .zip(receivers)
            .enumerate()
            .map(|(rank, (senders, receivers))| ChannelComm {
                rank,
                senders,
                receivers,
            })
            .collect()
    }

    fn check_peer(&self, peer: usize) -> Result<()> {
        if peer >= self.senders.len() {
            return Err(AssemblyError::Communication(format!(
                "peer {} does not exist in a communicator of size {}",
                peer,
                self.senders.len()
            )));
        }
        Ok(())
    }
}

/// A pending receive on a [`ChannelComm`].
#[derive(Debug)]
pub struct ChannelRecv {
    rank: usize,
    peer: usize,
    tag: CommTag,
    receiver: Receiver<Envelope>,
}

impl Wait for ChannelRecv {
    fn wait(self) -> Result<Option<Vec<u8>>> {
        let envelope = self.receiver.recv().map_err(|_| {
            AssemblyError::Communication(format!(
                "rank {} lost its connection to rank {}",
                self.rank, self.peer
            ))
        })?;
        if envelope.tag != self.tag {
            return Err(AssemblyError::Communication(format!(
                "rank {} expected a message with tag {:?} from rank {}, got {:?}",
                self.rank, self.tag, self.peer, envelope.tag
            )));
        }
        trace!(
            "Rank {} received {} bytes from rank {} (tag {:?})",
            self.rank,
            envelope.payload.len(),
            self.peer,
            self.tag
        );
        Ok(Some(envelope.payload))
    }
}

impl Communicator for ChannelComm {
    type SendHandle = Completed;
    type RecvHandle = ChannelRecv;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn isend(&self, peer: usize, tag: CommTag, data: &[u8]) -> Result<Completed> {
        self.check_peer(peer)?;
        trace!("Rank {} sends {} bytes to rank {} (tag {:?})", self.rank, data.len(), peer, tag);
        self.senders[peer]
            .send(Envelope {
                tag,
                payload: data.to_vec(),
            })
            .map_err(|_| {
                AssemblyError::Communication(format!("rank {} lost its connection to rank {}", self.rank, peer))
            })?;
        Ok(Completed)
    }

    fn irecv(&self, peer: usize, tag: CommTag) -> Result<ChannelRecv> {
        self.check_peer(peer)?;
        Ok(ChannelRecv {
            rank: self.rank,
            peer,
            tag,
            receiver: self.receivers[peer].clone(),
        })
    }
}

/// Encode a slice of plain values as message bytes.
pub fn encode<P: Pod>(values: &[P]) -> Vec<u8> {
    bytemuck::cast_slice(values).to_vec()
}

/// Decode message bytes into plain values.
pub fn decode<P: Pod>(bytes: &[u8]) -> Result<Vec<P>> {
    let width = size_of::<P>();
    if width == 0 || bytes.len() % width != 0 {
        return Err(AssemblyError::Communication(format!(
            "message of {} bytes is not a whole number of {}-byte values",
            bytes.len(),
            width
        )));
    }
    Ok(bytes.chunks_exact(width).map(bytemuck::pod_read_unaligned).collect())
}

/// Wait for a receive and decode its payload.
pub fn wait_values<P: Pod, H: Wait>(handle: H) -> Result<Vec<P>> {
    match handle.wait()? {
        Some(bytes) => decode(&bytes),
        None => Err(AssemblyError::Communication(
            "receive handle completed without data".to_string(),
        )),
    }
}

/// Send `outgoing[peer]` to every peer and return what every peer sent back.
///
/// Entry `rank` of both vectors is ignored and left empty. Collective: every rank must call it
/// with the same tag.
pub fn all_to_all<C: Communicator, P: Pod>(comm: &C, tag: CommTag, outgoing: &[Vec<P>]) -> Result<Vec<Vec<P>>> {
    let rank = comm.rank();
    let size = comm.size();
    let mut sends = Vec::with_capacity(size);
    let mut recvs = Vec::with_capacity(size);
    for peer in (0..size).filter(|&peer| peer != rank) {
        recvs.push((peer, comm.irecv(peer, tag)?));
        sends.push(comm.isend(peer, tag, &encode(&outgoing[peer]))?);
    }
    let mut incoming = vec![Vec::new(); size];
    for (peer, handle) in recvs {
        incoming[peer] = wait_values(handle)?;
    }
    for handle in sends {
        handle.wait()?;
    }
    Ok(incoming)
}
