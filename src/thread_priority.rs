// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the simulation loop when KEYHAMMER_THREAD_PRIORITY is unset.
const DEFAULT_LOOP_THREAD_PRIORITY: u8 = 70;

/// Reads KEYHAMMER_THREAD_PRIORITY (0-99), falling back to the default when unset or invalid.
pub fn loop_thread_priority() -> ThreadPriority {
    parse_priority(std::env::var("KEYHAMMER_THREAD_PRIORITY").ok().as_deref())
}

fn parse_priority(value: Option<&str>) -> ThreadPriority {
    let n = value
        .and_then(|v| v.parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_LOOP_THREAD_PRIORITY);
    match ThreadPriorityValue::try_from(n) {
        Ok(value) => ThreadPriority::Crossplatform(value),
        Err(_) => ThreadPriority::Max,
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| flag_value(&v))
        .unwrap_or(false)
}

fn flag_value(v: &str) -> bool {
    v == "1"
        || v.eq_ignore_ascii_case("true")
        || v.eq_ignore_ascii_case("yes")
        || v.eq_ignore_ascii_case("on")
}

/// Returns whether we should attempt RT (SCHED_FIFO) scheduling for the simulation loop.
/// Default: enabled. Opt out with KEYHAMMER_DISABLE_RT=1.
pub fn rt_enabled() -> bool {
    !env_flag("KEYHAMMER_DISABLE_RT")
}

/// Raises the priority of the calling thread. Failures are logged and otherwise ignored: the
/// loop still runs, only with more jitter.
pub fn configure_loop_thread_priority(tp: ThreadPriority, rt: bool) {
    if let Err(e) = set_current_thread_priority(tp) {
        warn!(error = %e, "Failed to raise simulation loop thread priority");
    }

    #[cfg(unix)]
    if rt {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        let tid = thread_native_id();
        match set_thread_priority_and_policy(
            tid,
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => {
                info!("Enabled RT SCHED_FIFO for simulation loop thread");
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Failed to set RT SCHED_FIFO for simulation loop thread"
                );
            }
        }
    }

    #[cfg(not(unix))]
    let _ = rt;
}
