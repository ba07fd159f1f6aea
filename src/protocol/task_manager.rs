use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

use super::messages::Inbound;
use crate::router::Router;

/// Background tasks of one router plus the signal that stops them.
#[derive(Debug)]
pub struct TaskSet {
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    is_running: AtomicBool,
}

impl TaskSet {
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
            is_running: AtomicBool::new(true),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    fn push(&self, handle: JoinHandle<()>) {
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Returns `true` on the call that actually stopped the tasks.
    pub fn stop(&self) -> bool {
        if !self.is_running.swap(false, Ordering::AcqRel) {
            return false;
        }
        let _ = self.shutdown_tx.send(());
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        // tasks that missed the signal (not yet polled) are cut off here
        for handle in handles.drain(..) {
            handle.abort();
        }
        true
    }
}

impl Default for TaskSet {
    fn default() -> Self {
        Self::new()
    }
}

pub fn start_tasks(router: &Router, inbox: mpsc::UnboundedReceiver<Inbound>) {
    let tasks = router.tasks();

    let advertise_handle = start_advertise_task(router, tasks.subscribe());
    let invalidation_handle = start_invalidation_task(router, tasks.subscribe());
    let inbox_handle = start_inbox_task(router, inbox, tasks.subscribe());

    tasks.push(advertise_handle);
    tasks.push(invalidation_handle);
    tasks.push(inbox_handle);

    debug!("R{}: all protocol tasks started", router.id());
}

fn start_advertise_task(router: &Router, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    let router = router.clone();
    let period = router.config().advertise_interval();

    tokio::spawn(async move {
        advertise_task(router, period, &mut shutdown_rx).await;
    })
}

fn start_invalidation_task(router: &Router, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
    let router = router.clone();
    let period = router.config().check_interval();

    tokio::spawn(async move {
        invalidation_task(router, period, &mut shutdown_rx).await;
    })
}

fn start_inbox_task(
    router: &Router,
    mut inbox: mpsc::UnboundedReceiver<Inbound>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    let router = router.clone();

    tokio::spawn(async move {
        inbox_task(router, &mut inbox, &mut shutdown_rx).await;
    })
}

async fn advertise_task(router: Router, period: Duration, shutdown_rx: &mut broadcast::Receiver<()>) {
    let mut interval = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("R{}: advertise task shutting down", router.id());
                break;
            }
            _ = interval.tick() => {
                if !router.is_running() {
                    break;
                }
                router.advertise().await;
            }
        }
    }
}

async fn invalidation_task(router: Router, period: Duration, shutdown_rx: &mut broadcast::Receiver<()>) {
    let mut interval = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("R{}: invalidation task shutting down", router.id());
                break;
            }
            _ = interval.tick() => {
                if !router.is_running() {
                    break;
                }
                router.invalidation_check().await;
            }
        }
    }
}

async fn inbox_task(
    router: Router,
    inbox: &mut mpsc::UnboundedReceiver<Inbound>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("R{}: inbox task shutting down", router.id());
                break;
            }
            message = inbox.recv() => {
                match message {
                    Some(message) => router.handle(message).await,
                    None => break,
                }
            }
        }
    }
}
