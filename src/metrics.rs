// src/metrics.rs
use once_cell::sync::Lazy;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::net::ToSocketAddrs;
use std::thread;

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static TX_PACKETS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(Opts::new("tx_packets", "Frames sent per output port"), &["port"])
        .expect("tx_packets");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static TX_BYTES: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(Opts::new("tx_bytes", "Captured bytes sent per output port"), &["port"])
        .expect("tx_bytes");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static TX_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("tx_retries", "Sends retried after the output queue filled up").expect("tx_retries");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static FRAMES_REPAIRED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(Opts::new("frames_repaired", "Truncated frames rebuilt before sending"), &["mode"])
        .expect("frames_repaired");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static CHECKSUM_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("checksum_failures", "Repaired frames sent with stale checksums")
        .expect("checksum_failures");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static INPUTS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::new("inputs_skipped", "Capture files skipped as unopenable or unrecognised")
        .expect("inputs_skipped");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

static PACING_LAG: Lazy<Histogram> = Lazy::new(|| {
    // Seconds behind schedule when a frame was released: 10us .. 1s
    let buckets = vec![1e-5, 1e-4, 1e-3, 1e-2, 1e-1, 1.0];
    let h = Histogram::with_opts(HistogramOpts::new("pacing_lag_seconds", "How far replay ran behind capture timing")
        .buckets(buckets)).expect("pacing_lag");
    REGISTRY.register(Box::new(h.clone())).ok();
    h
});

pub fn inc_tx(port: &str, bytes: usize) {
    TX_PACKETS.with_label_values(&[port]).inc();
    TX_BYTES.with_label_values(&[port]).inc_by(bytes as u64);
}

pub fn inc_tx_retry() { TX_RETRIES.inc(); }

pub fn inc_repaired(mode: &str) { FRAMES_REPAIRED.with_label_values(&[mode]).inc(); }
pub fn inc_checksum_failure() { CHECKSUM_FAILURES.inc(); }

pub fn inc_input_skipped() { INPUTS_SKIPPED.inc(); }

pub fn observe_lag(secs: f64) { PACING_LAG.observe(secs); }

pub fn spawn_http<A: ToSocketAddrs + Send + 'static>(addr: A) -> thread::JoinHandle<()> {
    let addr_string = addr.to_socket_addrs().ok()
        .and_then(|mut it| it.next())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "0.0.0.0:9090".to_string());

    thread::spawn(move || {
        let server = match tiny_http::Server::http(&addr_string) {
            Ok(s) => s,
            Err(e) => {
                log::error!("metrics http on {addr_string} failed to start: {e}");
                return;
            }
        };
        log::info!("prometheus metrics listening on http://{addr_string}/metrics");
        let encoder = TextEncoder::new();
        loop {
            if let Ok(req) = server.recv() {
                if req.url() == "/metrics" {
                    let mut buf = Vec::with_capacity(8 * 1024);
                    encoder.encode(&REGISTRY.gather(), &mut buf).ok();
                    let mut resp = tiny_http::Response::from_data(buf).with_status_code(200);
                    if let Ok(h) = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/plain; version=0.0.4"[..]) {
                        resp = resp.with_header(h);
                    }
                    let _ = req.respond(resp);
                } else {
                    let _ = req.respond(tiny_http::Response::empty(404));
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_registry() {
        inc_tx("primary", 60);
        inc_tx_retry();
        inc_repaired("pad");
        let names: Vec<String> = REGISTRY.gather().iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.iter().any(|n| n == "tx_packets"));
        assert!(names.iter().any(|n| n == "tx_bytes"));
        assert!(names.iter().any(|n| n == "tx_retries"));
        assert!(names.iter().any(|n| n == "frames_repaired"));
        assert!(TX_BYTES.with_label_values(&["primary"]).get() >= 60);
    }
}
