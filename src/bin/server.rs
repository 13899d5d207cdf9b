//! Wires `Config + UdpListener + Aggregator + FlushEngine + GaugePersister`
//! together into a runnable server, for manual smoke-testing (SPEC_FULL
//! §2's `bin/server` row). The downstream consumer that drains the queue
//! and forwards points onward is out of scope; this binary just logs
//! whatever it receives.

use std::sync::Arc;

use statsd_aggregate::{ChannelSink, Engine, EgressPoint, EgressSink, StatsdConfig, UdpListener};

struct LoggingSink {
    channel: ChannelSink,
}

impl EgressSink for LoggingSink {
    fn send(&self, point: EgressPoint) {
        tracing::debug!(
            name = %point.name,
            value = point.value,
            timestamp = point.timestamp,
            metadata = ?point.metadata,
            "emitted metric"
        );
        self.channel.send(point);
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let config = StatsdConfig::from_env();
    let bind_addr = std::env::var("STATSD_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8125".to_string());

    let (channel, receiver) = ChannelSink::unbounded();
    let sink: Arc<dyn EgressSink> = Arc::new(LoggingSink { channel });

    let engine = Engine::start(config, sink);
    let listener = match UdpListener::bind(&bind_addr, Arc::clone(engine.aggregator())) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("failed to bind {bind_addr}: {err}");
            std::process::exit(1);
        }
    };

    std::thread::spawn(move || {
        for point in receiver.iter() {
            tracing::trace!(name = %point.name, "drained from channel sink");
        }
    });

    // Spec §5: the flush thread is a background daemon that terminates
    // when the host process exits; there's no graceful cancellation of an
    // in-flight tick. This binary mirrors that directly and just blocks
    // until the UDP listener thread ends (socket error) or the process is
    // killed — a real deployment would add a signal handler here to call
    // `engine.shutdown()` before exit so gauges get saved.
    listener.join();
    engine.shutdown();
}
