//! Chrome Trace (“flame style”) profiling of scheduler ticks.
//!
//! Feature-gated with `--features profiling`.
//!
//! Usage:
//!   tick_scheduler::profiler::init("profile/trace.json");
//!   scheduler.execute(dt);   // emits `tick`, `stage N` and per-system spans
//!   tick_scheduler::profiler::shutdown();
//!
//! `init` must run before the scheduler's worker pool is built for worker
//! threads to be named in the trace.

use std::borrow::Cow;
use std::path::Path;

#[cfg(feature = "profiling")]
mod enabled {
    use std::fs::File;
    use std::io::{BufWriter, Write};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::{Mutex, OnceLock, PoisonError};
    use std::time::Instant;

    use serde::Serialize;
    use serde_json::{Map, Value};

    use super::*;


    /// One Chrome trace event: complete events (`ph:"X"`) and thread-name
    /// metadata events (`ph:"M"`).
    #[derive(Debug, Serialize)]
    struct TraceEvent {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cat: Option<&'static str>,
        ph: &'static str,
        ts: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        dur: Option<u64>,
        pid: u32,
        tid: u64,
        #[serde(skip_serializing_if = "Map::is_empty")]
        args: Map<String, Value>,
    }

    #[derive(Serialize)]
    struct TraceFile<'a> {
        #[serde(rename = "traceEvents")]
        trace_events: &'a [TraceEvent],
    }

    impl super::Arg {
        fn into_value(self) -> Value {
            match self {
                super::Arg::Str(s) => Value::String(s),
                super::Arg::U64(v) => Value::from(v),
                super::Arg::I64(v) => Value::from(v),
                // non-finite floats are not valid JSON numbers
                super::Arg::F64(v) => serde_json::Number::from_f64(v)
                    .map(Value::Number)
                    .unwrap_or_else(|| Value::String(v.to_string())),
                super::Arg::Bool(v) => Value::Bool(v),
            }
        }
    }

    struct ProfilerState {
        start: Instant,
        out_path: PathBuf,
        pid: u32,
        is_on: AtomicBool,
        events: Mutex<Vec<TraceEvent>>,
    }

    static STATE: OnceLock<ProfilerState> = OnceLock::new();
    static NEXT_TID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
    }

    fn now_us(st: &ProfilerState) -> u64 {
        st.start.elapsed().as_micros() as u64
    }

    fn tid() -> u64 {
        TID.with(|t| *t)
    }

    fn active_state() -> Option<&'static ProfilerState> {
        STATE.get().filter(|st| st.is_on.load(Ordering::Acquire))
    }

    /// Initialize the profiler and set the output path.
    pub fn init<P: AsRef<Path>>(path: P) {
        let _ = STATE.set(ProfilerState {
            start: Instant::now(),
            out_path: path.as_ref().to_path_buf(),
            pid: std::process::id(),
            is_on: AtomicBool::new(true),
            events: Mutex::new(Vec::new()),
        });
    }

    /// Shut down the profiler and write the Chrome Trace JSON.
    pub fn shutdown() {
        if let Some(st) = STATE.get() {
            // Spans already in flight may still push after this point; they
            // are dropped with the state.
            st.is_on.store(false, Ordering::Release);

            if let Err(e) = write_trace_file(st) {
                log::warn!("profiler: failed to write trace to {}: {e}", st.out_path.display());
            }
        }
    }

    fn write_trace_file(st: &ProfilerState) -> std::io::Result<()> {
        let events = {
            let mut guard = st.events.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };

        if let Some(parent) = st.out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut w = BufWriter::new(File::create(&st.out_path)?);
        serde_json::to_writer(&mut w, &TraceFile { trace_events: &events })?;
        w.flush()
    }

    fn push_event(st: &ProfilerState, ev: TraceEvent) {
        st.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ev);
    }

    /// Assign a human-friendly name to the calling thread.
    pub fn thread_name(name: impl Into<String>) {
        let Some(st) = active_state() else { return };
        let mut args = Map::new();
        args.insert("name".into(), Value::String(name.into()));
        push_event(st, TraceEvent {
            name: "thread_name".into(),
            cat: None,
            ph: "M",
            ts: now_us(st),
            dur: None,
            pid: st.pid,
            tid: tid(),
            args,
        });
    }

    /// Create a profiling span.
    pub fn span(name: impl Into<super::SpanName>) -> SpanGuard {
        match active_state() {
            Some(st) => SpanGuard {
                name: name.into().0.into_owned(),
                ts0: now_us(st),
                tid: tid(),
                args: Map::new(),
                active: true,
            },
            None => SpanGuard::disabled(),
        }
    }

    /// A RAII guard that records a Chrome Trace complete event on drop.
    pub struct SpanGuard {
        name: String,
        ts0: u64,
        tid: u64,
        args: Map<String, Value>,
        active: bool,
    }

    impl SpanGuard {
        fn disabled() -> Self {
            Self { name: String::new(), ts0: 0, tid: 0, args: Map::new(), active: false }
        }

        /// Attach an argument to this span (builder-style).
        #[inline]
        pub fn arg(mut self, key: impl Into<String>, value: super::Arg) -> Self {
            if self.active {
                self.args.insert(key.into(), value.into_value());
            }
            self
        }
    }

    impl Drop for SpanGuard {
        fn drop(&mut self) {
            if !self.active {
                return;
            }
            let Some(st) = active_state() else { return };
            let ts1 = now_us(st);
            push_event(st, TraceEvent {
                name: std::mem::take(&mut self.name),
                cat: Some("scheduler"),
                ph: "X",
                ts: self.ts0,
                dur: Some(ts1.saturating_sub(self.ts0)),
                pid: st.pid,
                tid: self.tid,
                args: std::mem::take(&mut self.args),
            });
        }
    }
}

#[cfg(not(feature = "profiling"))]
mod disabled {
    use super::*;

    /// Initialize profiler (no-op when profiling is disabled).
    #[inline]
    pub fn init<P: AsRef<Path>>(_path: P) {}

    /// Shut down profiler (no-op).
    #[inline]
    pub fn shutdown() {}

    /// Set thread name (no-op).
    #[inline]
    pub fn thread_name(_name: impl Into<String>) {}

    /// Create profiling span (no-op).
    #[inline]
    pub fn span(_name: impl Into<super::SpanName>) -> SpanGuard {
        SpanGuard
    }

    /// No-op span guard.
    pub struct SpanGuard;

    impl SpanGuard {
        /// Attach an argument to this span (builder-style; no-op).
        #[inline]
        pub fn arg(self, _key: impl Into<String>, _value: super::Arg) -> Self {
            self
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API surface (stable regardless of feature flag)
// ─────────────────────────────────────────────────────────────────────────────

/// A span name; accepts `&'static str`, `String`, or `Cow<'static, str>`.
pub struct SpanName(pub Cow<'static, str>);

impl From<&'static str> for SpanName {
    fn from(s: &'static str) -> Self {
        SpanName(Cow::Borrowed(s))
    }
}
impl From<String> for SpanName {
    fn from(s: String) -> Self {
        SpanName(Cow::Owned(s))
    }
}
impl From<Cow<'static, str>> for SpanName {
    fn from(s: Cow<'static, str>) -> Self {
        SpanName(s)
    }
}

/// Argument value for profiling spans.
///
/// Serialized into the `args` field of Chrome Trace events.
pub enum Arg {
    /// UTF-8 string value.
    Str(String),

    /// Unsigned 64-bit integer value.
    U64(u64),

    /// Signed 64-bit integer value.
    I64(i64),

    /// 64-bit floating-point value.
    F64(f64),

    /// Boolean value.
    Bool(bool),
}

#[cfg(feature = "profiling")]
pub use enabled::SpanGuard;

#[cfg(not(feature = "profiling"))]
pub use disabled::SpanGuard;

#[cfg(feature = "profiling")]
pub use enabled::{init, shutdown, span, thread_name};

#[cfg(not(feature = "profiling"))]
pub use disabled::{init, shutdown, span, thread_name};
