//! Inter-rank communication
//!
//! The reader only needs two collective patterns: a paired send/receive of
//! `f32` halo regions and an integer sum. [`Communicator`] captures both so
//! the same code runs on one process, on threads inside one process
//! ([`LocalCommunicator`]) or across MPI processes (`MpiCommunicator`, behind
//! the `mpi` feature).

use std::time::Duration;

use flume::{Receiver, Sender};

use crate::{Error, Result};

/// How long a thread-local rank waits for a peer before giving up
const LOCAL_RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);

/// Rank identity handed to every component that needs it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankContext {
    pub rank: usize,
    pub total_rank: usize,
}

impl RankContext {
    pub fn serial() -> Self {
        Self { rank: 0, total_rank: 1 }
    }

    pub fn is_parallel(&self) -> bool {
        self.total_rank > 1
    }
}

/// Message passing between the reader's ranks
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn context(&self) -> RankContext {
        RankContext {
            rank: self.rank(),
            total_rank: self.size(),
        }
    }

    /// Send `send.1` to rank `send.0` while receiving from rank `recv.0`
    /// into `recv.1`. Either side may be absent.
    fn send_receive(&self, tag: i32, send: Option<(usize, &[f32])>, recv: Option<(usize, &mut [f32])>) -> Result<()>;

    /// Sum of `value` over all ranks, returned on every rank
    fn all_reduce_sum(&self, value: i64) -> Result<i64>;
}

/// Single process: reductions are the identity, nothing to exchange
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send_receive(&self, _tag: i32, send: Option<(usize, &[f32])>, recv: Option<(usize, &mut [f32])>) -> Result<()> {
        if send.is_some() || recv.is_some() {
            return Err(Error::Communication(
                "a single rank has no peers to exchange with".to_string(),
            ));
        }
        Ok(())
    }

    fn all_reduce_sum(&self, value: i64) -> Result<i64> {
        Ok(value)
    }
}

#[derive(Debug)]
enum Message {
    Grid { tag: i32, data: Vec<f32> },
    Reduce(i64),
}

/// One rank of a group of ranks living on threads of the same process
///
/// Every ordered pair of ranks has its own unbounded channel, so sends never
/// block and messages between two ranks arrive in order.
pub struct LocalCommunicator {
    rank: usize,
    size: usize,
    /// Indexed by destination rank
    senders: Vec<Sender<Message>>,
    /// Indexed by source rank
    receivers: Vec<Receiver<Message>>,
}

impl LocalCommunicator {
    /// Create `size` connected ranks; move each into its own thread.
    pub fn group(size: usize) -> Vec<LocalCommunicator> {
        let size = size.max(1);
        // channels[from][to]
        let channels: Vec<Vec<(Sender<Message>, Receiver<Message>)>> = (0..size)
            .map(|_| (0..size).map(|_| flume::unbounded()).collect())
            .collect();

        (0..size)
            .map(|rank| LocalCommunicator {
                rank,
                size,
                senders: (0..size).map(|to| channels[rank][to].0.clone()).collect(),
                receivers: (0..size).map(|from| channels[from][rank].1.clone()).collect(),
            })
            .collect()
    }

    fn peer_sender(&self, to: usize) -> Result<&Sender<Message>> {
        self.senders
            .get(to)
            .ok_or_else(|| Error::Communication(format!("rank {to} is outside a group of {}", self.size)))
    }

    fn receive(&self, from: usize) -> Result<Message> {
        let receiver = self
            .receivers
            .get(from)
            .ok_or_else(|| Error::Communication(format!("rank {from} is outside a group of {}", self.size)))?;
        receiver.recv_timeout(LOCAL_RECEIVE_TIMEOUT).map_err(|e| {
            Error::Communication(format!("rank {} receiving from {from}: {e}", self.rank))
        })
    }

    fn post(&self, to: usize, message: Message) -> Result<()> {
        self.peer_sender(to)?
            .send(message)
            .map_err(|_| Error::Communication(format!("rank {to} has left the group")))
    }
}

impl Communicator for LocalCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn send_receive(&self, tag: i32, send: Option<(usize, &[f32])>, recv: Option<(usize, &mut [f32])>) -> Result<()> {
        if let Some((to, data)) = send {
            self.post(to, Message::Grid { tag, data: data.to_vec() })?;
        }
        if let Some((from, buffer)) = recv {
            match self.receive(from)? {
                Message::Grid { tag: got, data } if got == tag && data.len() == buffer.len() => {
                    buffer.copy_from_slice(&data);
                }
                Message::Grid { tag: got, data } => {
                    return Err(Error::Communication(format!(
                        "rank {} expected {} values with tag {tag} from {from}, got {} with tag {got}",
                        self.rank,
                        buffer.len(),
                        data.len()
                    )));
                }
                Message::Reduce(_) => {
                    return Err(Error::Communication(format!(
                        "rank {} expected grid data from {from}, got a reduction",
                        self.rank
                    )));
                }
            }
        }
        Ok(())
    }

    fn all_reduce_sum(&self, value: i64) -> Result<i64> {
        for peer in (0..self.size).filter(|&p| p != self.rank) {
            self.post(peer, Message::Reduce(value))?;
        }
        let mut sum = value;
        for peer in (0..self.size).filter(|&p| p != self.rank) {
            match self.receive(peer)? {
                Message::Reduce(v) => sum += v,
                Message::Grid { tag, .. } => {
                    return Err(Error::Communication(format!(
                        "rank {} expected a reduction from {peer}, got grid data with tag {tag}",
                        self.rank
                    )));
                }
            }
        }
        Ok(sum)
    }
}

#[cfg(feature = "mpi")]
pub use self::world::MpiCommunicator;

#[cfg(feature = "mpi")]
mod world {
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, CommunicatorCollectives, Destination, Source};

    use super::Communicator;
    use crate::{Error, Result};

    /// MPI world communicator; finalizes MPI when dropped
    pub struct MpiCommunicator {
        world: SimpleCommunicator,
        _universe: Universe,
    }

    impl MpiCommunicator {
        pub fn initialize() -> Result<Self> {
            let universe = mpi::initialize()
                .ok_or_else(|| Error::Communication("MPI is already initialized".to_string()))?;
            let world = universe.world();
            tracing::info!("MPI rank {} of {}", world.rank(), world.size());
            Ok(Self {
                world,
                _universe: universe,
            })
        }
    }

    impl Communicator for MpiCommunicator {
        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn send_receive(
            &self,
            tag: i32,
            send: Option<(usize, &[f32])>,
            recv: Option<(usize, &mut [f32])>,
        ) -> Result<()> {
            match (send, recv) {
                (Some((to, data)), Some((from, buffer))) => {
                    let destination = self.world.process_at_rank(to as i32);
                    let source = self.world.process_at_rank(from as i32);
                    mpi::point_to_point::send_receive_into_with_tags(
                        data,
                        &destination,
                        tag,
                        buffer,
                        &source,
                        tag,
                    );
                }
                (Some((to, data)), None) => {
                    self.world.process_at_rank(to as i32).send_with_tag(data, tag);
                }
                (None, Some((from, buffer))) => {
                    self.world.process_at_rank(from as i32).receive_into_with_tag(buffer, tag);
                }
                (None, None) => {}
            }
            Ok(())
        }

        fn all_reduce_sum(&self, value: i64) -> Result<i64> {
            let mut sum = 0i64;
            self.world.all_reduce_into(&value, &mut sum, SystemOperation::sum());
            Ok(sum)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_serial_reduction_is_identity() {
        let comm = SerialCommunicator;
        assert_eq!(comm.context(), RankContext::serial());
        assert_eq!(comm.all_reduce_sum(7).unwrap(), 7);
        assert!(comm.send_receive(0, None, None).is_ok());
        assert!(comm.send_receive(0, Some((0, &[1.0f32][..])), None).is_err());
    }

    #[test]
    fn test_local_all_reduce() {
        let handles: Vec<_> = LocalCommunicator::group(4)
            .into_iter()
            .map(|comm| thread::spawn(move || comm.all_reduce_sum(comm.rank() as i64 + 1).unwrap()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), 10);
        }
    }

    #[test]
    fn test_local_ring_send_receive() {
        let handles: Vec<_> = LocalCommunicator::group(3)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    let rank = comm.rank();
                    let next = (rank + 1) % 3;
                    let prev = (rank + 2) % 3;
                    let data = vec![rank as f32; 4];
                    let mut buffer = vec![0.0; 4];
                    comm.send_receive(5, Some((next, data.as_slice())), Some((prev, buffer.as_mut_slice())))
                        .unwrap();
                    (rank, buffer)
                })
            })
            .collect();
        for handle in handles {
            let (rank, buffer) = handle.join().unwrap();
            assert_eq!(buffer, vec![((rank + 2) % 3) as f32; 4]);
        }
    }

    #[test]
    fn test_local_tag_mismatch_is_error() {
        let mut group = LocalCommunicator::group(2);
        let second = group.pop().unwrap();
        let first = group.pop().unwrap();
        first.send_receive(1, Some((1, &[1.0f32, 2.0][..])), None).unwrap();
        let mut buffer = [0.0; 2];
        assert!(second.send_receive(2, None, Some((0, &mut buffer[..]))).is_err());
    }
}
