//! Fail-fast sequential execution of resolved scripts.
//!
//! [`execute`] returns a lazy [`ScriptStream`]. The first poll spawns a tokio
//! task that owns the units and runs them strictly one at a time. Each
//! successful [`Outcome`] is delivered as soon as its unit settles. The first
//! failure ends the stream with a single `Err(RunError::Execution { .. })`
//! and no later unit starts.
//!
//! The stream only ends cleanly once the task reports that every unit
//! succeeded. If the task stops without saying so, the stream ends with an
//! execution error instead.
//!
//! Cancellation is cooperative: [`ScriptStream::cancel`] (or dropping the
//! stream) stops scheduling further units, but a unit already in flight runs
//! to completion. Nothing already executed is undone.

use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::stream::{FusedStream, Stream};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::error::RunError;
use crate::script::{BoxedScript, Outcome, Script};

type StreamItem = Result<Outcome, RunError>;

/// Name reported when the sequencing task stops outside of any unit.
const SEQUENCE_NAME: &str = "<sequence>";

/// Callbacks invoked before the stream observes the end.
///
/// Each hook fires at most once.
#[derive(Default)]
pub struct SequenceHooks {
    on_complete: Option<Box<dyn FnOnce() + Send>>,
    on_failure: Option<Box<dyn FnOnce(&RunError) + Send>>,
}

impl SequenceHooks {
    /// Run after the last unit succeeds, before the stream ends.
    pub fn on_complete(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// Run on the terminal failure, before it is delivered to the stream.
    pub fn on_failure(mut self, hook: impl FnOnce(&RunError) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(hook));
        self
    }
}

/// Hooks shared by the sequencing task and the stream, which fires
/// `on_failure` itself if the task dies.
#[derive(Clone)]
struct SharedHooks(Arc<Mutex<SequenceHooks>>);

impl SharedHooks {
    fn new(hooks: SequenceHooks) -> Self {
        Self(Arc::new(Mutex::new(hooks)))
    }

    fn complete(&self) {
        let hook = self.take(|hooks| hooks.on_complete.take());
        if let Some(hook) = hook {
            hook();
        }
    }

    fn fail(&self, err: &RunError) {
        let hook = self.take(|hooks| hooks.on_failure.take());
        if let Some(hook) = hook {
            hook(err);
        }
    }

    // Hooks run outside the lock.
    fn take<T>(&self, pick: impl FnOnce(&mut SequenceHooks) -> Option<T>) -> Option<T> {
        let mut hooks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        pick(&mut hooks)
    }
}

/// Messages from the sequencing task to its stream.
enum Event {
    Started(String),
    Settled(StreamItem),
    /// Every unit succeeded and `on_complete` has run.
    Done,
}

/// Run `units` in order, stopping at the first failure.
pub fn execute(units: Vec<BoxedScript>) -> ScriptStream {
    execute_with_hooks(units, SequenceHooks::default())
}

pub fn execute_with_hooks(units: Vec<BoxedScript>, hooks: SequenceHooks) -> ScriptStream {
    ScriptStream {
        state: StreamState::Pending { units, hooks },
    }
}

/// Incremental outcomes of one run.
///
/// Yields `Ok(outcome)` per successful unit in input order, then either ends
/// or yields exactly one `Err` and ends. Must be polled from within a tokio
/// runtime.
pub struct ScriptStream {
    state: StreamState,
}

enum StreamState {
    Pending {
        units: Vec<BoxedScript>,
        hooks: SequenceHooks,
    },
    Running(Running),
    Failed(RunError),
    Finished,
}

struct Running {
    events: mpsc::UnboundedReceiver<Event>,
    hooks: SharedHooks,
    /// Unit in flight, if any.
    current: Option<String>,
}

impl Running {
    /// The task went away without `Done` or a terminal error.
    fn aborted(mut self) -> RunError {
        let script_name = self
            .current
            .take()
            .unwrap_or_else(|| SEQUENCE_NAME.to_string());
        error!(script = %script_name, "sequencing task stopped without a result");
        let err = RunError::Execution {
            script_name,
            error: Value::String("sequencing task stopped without a result".to_string()),
        };
        self.hooks.fail(&err);
        err
    }
}

impl ScriptStream {
    /// A stream that yields `err` once and ends. No unit ever runs.
    pub fn failed(err: RunError) -> Self {
        Self {
            state: StreamState::Failed(err),
        }
    }

    /// Stop scheduling further units and end the stream.
    ///
    /// A unit already in flight still runs to completion. Calling this after
    /// the stream has ended is a no-op.
    pub fn cancel(&mut self) {
        if !matches!(self.state, StreamState::Finished) {
            debug!("script stream cancelled");
        }
        // Dropping the receiver closes the channel, which the task checks
        // before starting each unit.
        self.state = StreamState::Finished;
    }

    /// Drain the stream, calling `on_outcome` for every successful outcome.
    ///
    /// Returns the number of outcomes delivered, or the terminal error.
    pub async fn for_each_outcome<F: FnMut(&Outcome)>(
        mut self,
        mut on_outcome: F,
    ) -> Result<usize, RunError> {
        use futures::StreamExt;

        let mut delivered = 0;
        while let Some(item) = self.next().await {
            let outcome = item?;
            delivered += 1;
            on_outcome(&outcome);
        }
        Ok(delivered)
    }
}

impl Stream for ScriptStream {
    type Item = StreamItem;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match std::mem::replace(&mut this.state, StreamState::Finished) {
                StreamState::Pending { units, hooks } => {
                    let hooks = SharedHooks::new(hooks);
                    this.state = StreamState::Running(Running {
                        events: spawn_sequence(units, hooks.clone()),
                        hooks,
                        current: None,
                    });
                }
                StreamState::Running(mut running) => match running.events.poll_recv(cx) {
                    Poll::Ready(Some(Event::Started(name))) => {
                        running.current = Some(name);
                        this.state = StreamState::Running(running);
                    }
                    Poll::Ready(Some(Event::Settled(Ok(outcome)))) => {
                        running.current = None;
                        this.state = StreamState::Running(running);
                        return Poll::Ready(Some(Ok(outcome)));
                    }
                    Poll::Ready(Some(Event::Settled(Err(err)))) => {
                        return Poll::Ready(Some(Err(err)));
                    }
                    Poll::Ready(Some(Event::Done)) => return Poll::Ready(None),
                    Poll::Ready(None) => return Poll::Ready(Some(Err(running.aborted()))),
                    Poll::Pending => {
                        this.state = StreamState::Running(running);
                        return Poll::Pending;
                    }
                },
                StreamState::Failed(err) => return Poll::Ready(Some(Err(err))),
                StreamState::Finished => return Poll::Ready(None),
            }
        }
    }
}

impl FusedStream for ScriptStream {
    fn is_terminated(&self) -> bool {
        matches!(self.state, StreamState::Finished)
    }
}

fn spawn_sequence(units: Vec<BoxedScript>, hooks: SharedHooks) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_sequence(units, hooks, tx));
    rx
}

#[instrument(skip_all, fields(total = units.len()))]
async fn run_sequence(
    units: Vec<BoxedScript>,
    hooks: SharedHooks,
    tx: mpsc::UnboundedSender<Event>,
) {
    let total = units.len();
    for (index, unit) in units.iter().enumerate() {
        if tx.send(Event::Started(unit.name().to_string())).is_err() {
            info!(remaining = total - index, "stream cancelled; remaining scripts not started");
            return;
        }
        match run_unit(unit.as_ref(), index, total).await {
            Ok(outcome) => {
                if tx.send(Event::Settled(Ok(outcome))).is_err() {
                    info!(
                        remaining = total - index - 1,
                        "stream cancelled; remaining scripts not started"
                    );
                    return;
                }
            }
            Err(err) => {
                hooks.fail(&err);
                // The receiver may already be gone; the failure is still recorded by the hook.
                let _ = tx.send(Event::Settled(Err(err)));
                return;
            }
        }
    }
    debug!("all scripts completed");
    hooks.complete();
    let _ = tx.send(Event::Done);
}

#[instrument(skip_all, fields(script = unit.name(), position = index + 1, total = total))]
async fn run_unit(unit: &dyn Script, index: usize, total: usize) -> Result<Outcome, RunError> {
    debug!("starting script");
    // `run` itself is called inside the guarded future so a panic before it
    // returns is caught too.
    let settled = AssertUnwindSafe(async { unit.run().await })
        .catch_unwind()
        .await;
    let failure = match settled {
        Ok(Ok(outcome)) if outcome.success => {
            info!("script succeeded");
            return Ok(outcome);
        }
        Ok(Ok(outcome)) => {
            warn!(error = ?outcome.error, "script reported failure");
            outcome.error.unwrap_or(Value::Null)
        }
        Ok(Err(err)) => {
            warn!(error = %format!("{err:#}"), "script returned an error");
            Value::String(format!("{err:#}"))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(error = %message, "script panicked");
            Value::String(format!("panicked: {message}"))
        }
    };
    Err(RunError::Execution {
        script_name: unit.name().to_string(),
        error: failure,
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return (*text).to_string();
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return text.clone();
    }
    "unknown panic".to_string()
}
