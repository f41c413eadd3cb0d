//! Browser live feed client
//!
//! Drives the connection state machine from `EventSource` callbacks and
//! `setTimeout` retries on the browser event loop.

use crate::core::{Backoff, Command, ConnectionState, LiveConnection, SubscriptionId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, error};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Event, EventSource, MessageEvent};

/// One `EventSource` together with the callbacks attached to it
struct Subscription {
    id: SubscriptionId,
    source: EventSource,
    _on_open: Closure<dyn FnMut(Event)>,
    _on_message: Closure<dyn FnMut(MessageEvent)>,
    _on_error: Closure<dyn FnMut(Event)>,
}

impl Subscription {
    fn close(&self) {
        self.source.set_onopen(None);
        self.source.set_onmessage(None);
        self.source.set_onerror(None);
        self.source.close();
    }
}

struct Inner {
    machine: LiveConnection,
    current: Option<Subscription>,
    /// Closed subscriptions whose callbacks may still be on the stack
    retired: Vec<Subscription>,
    timer: Option<i32>,
    state: Rc<RefCell<ConnectionState>>,
}

/// Browser live feed client; dropping it tears the connection down
pub struct WasmLiveClient {
    inner: Rc<RefCell<Inner>>,
    state: Rc<RefCell<ConnectionState>>,
}

impl WasmLiveClient {
    pub fn connect(url: &str, backoff: Backoff) -> Self {
        let machine = LiveConnection::with_backoff(url, backoff);
        let state = Rc::new(RefCell::new(machine.state().clone()));
        let inner = Rc::new(RefCell::new(Inner {
            machine,
            current: None,
            retired: Vec::new(),
            timer: None,
            state: state.clone(),
        }));

        let commands = inner.borrow_mut().machine.connect();
        run_commands(&inner, commands);

        Self { inner, state }
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn close(&self) {
        let commands = {
            let mut inner = self.inner.borrow_mut();
            if let Some(handle) = inner.timer.take() {
                if let Some(window) = web_sys::window() {
                    window.clear_timeout_with_handle(handle);
                }
            }
            inner.machine.teardown()
        };
        run_commands(&self.inner, commands);
    }
}

impl Drop for WasmLiveClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_commands(inner: &Rc<RefCell<Inner>>, commands: Vec<Command>) {
    let mut queue: VecDeque<Command> = commands.into();
    while let Some(command) = queue.pop_front() {
        match command {
            Command::Close { id } => {
                let mut guard = inner.borrow_mut();
                if guard.current.as_ref().is_some_and(|s| s.id == id) {
                    if let Some(subscription) = guard.current.take() {
                        debug!(id, "Closing EventSource");
                        subscription.close();
                        guard.retired.push(subscription);
                    }
                }
            }
            Command::Open { id, url } => match open(inner, id, &url) {
                Ok(subscription) => inner.borrow_mut().current = Some(subscription),
                Err(e) => {
                    error!(?e, url = %url, "Failed to create EventSource");
                    let more = inner.borrow_mut().machine.on_error(id);
                    queue.extend(more);
                }
            },
            Command::ScheduleRetry { after, delay } => schedule_retry(inner, after, delay),
        }
    }
    publish(inner);
}

fn open(inner: &Rc<RefCell<Inner>>, id: SubscriptionId, url: &str) -> Result<Subscription, JsValue> {
    let source = EventSource::new(url)?;

    let weak = Rc::downgrade(inner);
    let on_open = Closure::wrap(Box::new(move |_: Event| {
        let Some(inner) = weak.upgrade() else { return };
        inner.borrow_mut().machine.on_open(id);
        publish(&inner);
    }) as Box<dyn FnMut(Event)>);
    source.set_onopen(Some(on_open.as_ref().unchecked_ref()));

    let weak = Rc::downgrade(inner);
    let on_message = Closure::wrap(Box::new(move |e: MessageEvent| {
        let Some(inner) = weak.upgrade() else { return };
        let Some(data) = e.data().as_string() else { return };
        let delivered = inner.borrow_mut().machine.on_message(id, &data).is_some();
        if delivered {
            publish(&inner);
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    source.set_onmessage(Some(on_message.as_ref().unchecked_ref()));

    let weak = Rc::downgrade(inner);
    let on_error = Closure::wrap(Box::new(move |_: Event| {
        let Some(inner) = weak.upgrade() else { return };
        let commands = inner.borrow_mut().machine.on_error(id);
        run_commands(&inner, commands);
    }) as Box<dyn FnMut(Event)>);
    source.set_onerror(Some(on_error.as_ref().unchecked_ref()));

    Ok(Subscription {
        id,
        source,
        _on_open: on_open,
        _on_message: on_message,
        _on_error: on_error,
    })
}

fn schedule_retry(inner: &Rc<RefCell<Inner>>, after: SubscriptionId, delay: Duration) {
    let Some(window) = web_sys::window() else {
        error!("No window, cannot schedule reconnect");
        return;
    };

    let weak: Weak<RefCell<Inner>> = Rc::downgrade(inner);
    let callback = Closure::once_into_js(move || {
        let Some(inner) = weak.upgrade() else { return };
        let commands = {
            let mut guard = inner.borrow_mut();
            guard.timer = None;
            // Timer callbacks never run inside a subscription callback.
            guard.retired.clear();
            guard.machine.on_retry_timer(after)
        };
        run_commands(&inner, commands);
    });

    let millis = i32::try_from(delay.as_millis()).unwrap_or(i32::MAX);
    match window.set_timeout_with_callback_and_timeout_and_arguments_0(
        callback.unchecked_ref(),
        millis,
    ) {
        Ok(handle) => inner.borrow_mut().timer = Some(handle),
        Err(e) => error!(?e, "Failed to schedule reconnect"),
    }
}

fn publish(inner: &Rc<RefCell<Inner>>) {
    let guard = inner.borrow();
    *guard.state.borrow_mut() = guard.machine.state().clone();
}

/// JavaScript handle to the live feed
#[wasm_bindgen]
pub struct LiveFeed {
    client: WasmLiveClient,
}

#[wasm_bindgen]
impl LiveFeed {
    #[wasm_bindgen(constructor)]
    pub fn new(url: &str) -> LiveFeed {
        LiveFeed {
            client: WasmLiveClient::connect(url, Backoff::default()),
        }
    }

    pub fn connected(&self) -> bool {
        self.client.state.borrow().connected
    }

    #[wasm_bindgen(js_name = retryCount)]
    pub fn retry_count(&self) -> u32 {
        self.client.state.borrow().retry_count
    }

    /// Latest event as JSON text, including its `event` field
    #[wasm_bindgen(js_name = lastEvent)]
    pub fn last_event(&self) -> Option<String> {
        let state = self.client.state.borrow();
        state.last_event.as_ref().map(|e| e.to_json().to_string())
    }

    /// Arrival number of the latest event (0 before the first one)
    #[wasm_bindgen(js_name = lastSequence)]
    pub fn last_sequence(&self) -> u64 {
        let state = self.client.state.borrow();
        state.last_event.as_ref().map_or(0, |e| e.sequence)
    }

    pub fn close(&self) {
        self.client.close();
    }
}
