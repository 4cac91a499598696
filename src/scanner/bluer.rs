//! BlueZ D-Bus backend for the advertisement watcher.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ
//! daemon via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! Each subscription runs on a dedicated worker thread that owns a
//! current-thread tokio runtime; setup failures are reported back to
//! `subscribe` synchronously over a ready channel.

use super::{
    APPLE_COMPANY_ID_BYTES, Advertisement, AdvertisementHandler, AdvertisementWatcher, Handlers,
    MANUFACTURER_DATA_TYPE, ScanError, StoppedHandler,
};
use bluer::monitor::{Monitor, MonitorEvent, Pattern};
use bluer::{Adapter, Session};
use futures::StreamExt;
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// How long `subscribe` waits for the worker to finish BlueZ setup.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Advertisement watcher backed by a BlueZ advertisement monitor.
pub struct BluerWatcher {
    handlers: Arc<Handlers>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    shutdown: oneshot::Sender<()>,
    /// When set, the worker exits without firing the stopped handler;
    /// used when a re-subscribe replaces it.
    silenced: Arc<AtomicBool>,
    thread: std::thread::JoinHandle<()>,
}

impl BluerWatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Handlers::default()),
            worker: Mutex::new(None),
        }
    }
}

impl Default for BluerWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BluerWatcher {
    fn drop(&mut self) {
        // Wind the worker down without a stopped notification; nothing
        // holds a handler into a dropped watcher anyway.
        if let Ok(mut worker) = self.worker.lock()
            && let Some(active) = worker.take()
        {
            active.silenced.store(true, Ordering::SeqCst);
            let _ = active.shutdown.send(());
        }
    }
}

impl AdvertisementWatcher for BluerWatcher {
    fn subscribe(&self) -> Result<(), ScanError> {
        let mut worker = self.worker.lock().expect("worker lock poisoned");

        // Re-subscribing replaces any previous subscription; the old
        // worker winds down silently so the swap does not look like an
        // unsolicited halt.
        if let Some(previous) = worker.take() {
            previous.silenced.store(true, Ordering::SeqCst);
            let _ = previous.shutdown.send(());
            // A restart attempt may run on the old worker's own thread
            // (the stopped handler delivers there); never self-join.
            if previous.thread.thread().id() != std::thread::current().id() {
                let _ = previous.thread.join();
            }
        }

        let handlers = Arc::clone(&self.handlers);
        let silenced = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let thread = std::thread::Builder::new()
            .name("bluer-watcher".into())
            .spawn({
                let silenced = Arc::clone(&silenced);
                move || run_worker(handlers, silenced, ready_tx, shutdown_rx)
            })
            .map_err(|err| ScanError::Bluetooth(format!("failed to spawn watcher thread: {err}")))?;

        match ready_rx.recv_timeout(SUBSCRIBE_TIMEOUT) {
            Ok(Ok(())) => {
                *worker = Some(Worker {
                    shutdown: shutdown_tx,
                    silenced,
                    thread,
                });
                Ok(())
            }
            Ok(Err(err)) => {
                // Setup failed before the event loop began; the worker
                // has already returned.
                let _ = thread.join();
                Err(err)
            }
            Err(_) => Err(ScanError::Bluetooth(
                "timed out waiting for BlueZ scan setup".into(),
            )),
        }
    }

    fn unsubscribe(&self) -> Result<(), ScanError> {
        let mut worker = self.worker.lock().expect("worker lock poisoned");
        if let Some(active) = worker.take() {
            // The stopped notification fires from the worker thread as
            // it winds down, exactly as for an unsolicited halt.
            let _ = active.shutdown.send(());
        }
        Ok(())
    }

    fn on_received(&self, handler: AdvertisementHandler) {
        self.handlers.set_received(handler);
    }

    fn on_stopped(&self, handler: StoppedHandler) {
        self.handlers.set_stopped(handler);
    }
}

fn run_worker(
    handlers: Arc<Handlers>,
    silenced: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(), ScanError>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = ready.send(Err(ScanError::Bluetooth(format!(
                "failed to build watcher runtime: {err}"
            ))));
            return;
        }
    };

    runtime.block_on(async move {
        let setup = async {
            let session = Session::new().await?;
            let adapter = session.default_adapter().await?;
            adapter.set_powered(true).await?;

            // Filter for Apple manufacturer data at the daemon level
            let pattern = Pattern {
                data_type: MANUFACTURER_DATA_TYPE,
                start_position: 0,
                content: APPLE_COMPANY_ID_BYTES.to_vec(),
            };

            let monitor_manager = adapter.monitor().await?;
            let monitor_handle = monitor_manager
                .register(Monitor {
                    patterns: Some(vec![pattern]),
                    ..Default::default()
                })
                .await?;

            Ok::<_, bluer::Error>((session, adapter, monitor_manager, monitor_handle))
        };

        let (session, adapter, monitor_manager, mut monitor_handle) = match setup.await {
            Ok(parts) => {
                let _ = ready.send(Ok(()));
                parts
            }
            Err(err) => {
                let _ = ready.send(Err(err.into()));
                return;
            }
        };

        // Keep all Bluetooth state alive for the duration of the loop
        let _session = session;
        let _monitor_manager = monitor_manager;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = monitor_handle.next() => match event {
                    Some(MonitorEvent::DeviceFound(device_id)) => {
                        match build_advertisement(&adapter, device_id.device).await {
                            Ok(advertisement) => handlers.notify_received(&advertisement),
                            Err(err) => debug!("failed to read advertisement data: {err}"),
                        }
                    }
                    Some(_) => {}
                    None => {
                        warn!("BlueZ monitor event stream ended");
                        break;
                    }
                },
            }
        }

        if !silenced.load(Ordering::SeqCst) {
            handlers.notify_stopped();
        }
    });
}

/// Read the discovered device's properties into an advertisement event.
async fn build_advertisement(
    adapter: &Adapter,
    address: bluer::Address,
) -> bluer::Result<Advertisement> {
    let device = adapter.device(address)?;
    let rssi = device.rssi().await?.unwrap_or_default();
    let manufacturer_data = device.manufacturer_data().await?.unwrap_or_default();

    Ok(Advertisement {
        address: address.into(),
        rssi,
        timestamp: SystemTime::now(),
        manufacturer_data,
    })
}
