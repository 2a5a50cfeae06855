// src/util.rs
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide cancellation flag. The interrupt path only ever calls `raise`;
/// the replay loop polls `is_raised` once per frame.
pub struct BarrierFlag(AtomicBool);

impl Default for BarrierFlag {
    fn default() -> Self { Self(AtomicBool::new(false)) }
}

impl BarrierFlag {
    #[inline]
    pub fn raise(&self) { self.0.store(true, Ordering::SeqCst); }
    #[inline]
    pub fn is_raised(&self) -> bool { self.0.load(Ordering::Relaxed) }
}

#[inline]
pub fn pin_to_core_if_set(core_index: Option<usize>) {
    if let Some(idx) = core_index {
        if let Some(cores) = core_affinity::get_core_ids() {
            if let Some(core_id) = cores.into_iter().find(|c| c.id == idx) {
                if !core_affinity::set_for_current(core_id) {
                    log::warn!("could not pin replay thread to core {idx}");
                }
            } else {
                log::warn!("cpu core {idx} not present, not pinning");
            }
        }
    }
}

/// Best-effort SCHED_FIFO for the replay thread; sleeping under a realtime
/// class keeps wakeup latency down when pacing by timestamp.
#[inline]
pub fn set_realtime_priority_if(_priority: Option<i32>) {
    #[cfg(target_os = "linux")]
    if let Some(pri) = _priority {
        let param = libc::sched_param { sched_priority: pri };
        let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
        if rc != 0 {
            log::warn!("SCHED_FIFO priority {pri} refused: {}", std::io::Error::last_os_error());
        }
    }
}

/// Formats a MAC address the way `ip link` prints it.
pub fn fmt_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
