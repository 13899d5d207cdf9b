//! A thin UDP receive loop (supplement — spec.md's external-collaborator
//! non-goal, carried so the crate is runnable end-to-end).
//!
//! Deliberately minimal: bind, recv, hand the payload to
//! [`Aggregator::handle`], repeat. No backoff, no batching, no protocol
//! awareness beyond "this is one complete datagram" — spec §1 explicitly
//! assumes this loop delivers complete payloads and specifies nothing
//! about it.

use std::net::UdpSocket;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::aggregator::Aggregator;

/// Maximum UDP payload this listener will accept. StatsD datagrams are
/// small; 64KiB comfortably covers even a heavily batched multi-sample
/// payload while bounding the per-recv stack buffer.
const MAX_DATAGRAM_SIZE: usize = 65_536;

pub struct UdpListener {
    thread: JoinHandle<()>,
}

impl UdpListener {
    /// Binds `addr` and spawns a dedicated receive thread that forwards
    /// every datagram to `aggregator.handle`. Runs until the process
    /// exits or the socket errors out (logged, then the loop ends).
    pub fn bind(addr: &str, aggregator: Arc<Aggregator>) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        tracing::info!("StatsD: listening on {addr}");
        let thread = std::thread::spawn(move || {
            let mut buf = [0u8; MAX_DATAGRAM_SIZE];
            loop {
                match socket.recv_from(&mut buf) {
                    Ok((len, _peer)) => aggregator.handle(&buf[..len]),
                    Err(err) => {
                        tracing::error!("StatsD: UDP recv error, stopping listener: {err}");
                        break;
                    }
                }
            }
        });
        Ok(Self { thread })
    }

    pub fn join(self) {
        let _ = self.thread.join();
    }
}
