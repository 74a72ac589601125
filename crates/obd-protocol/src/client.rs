//! OBD-II Client for ELM327 Adapters
//!
//! An [`ObdClient`] is one connected session. The link is owned by a single
//! I/O task; commands reach it through a FIFO queue and are written one at a
//! time, so the next command only hits the wire after the previous response
//! terminator (or its timeout).

use crate::error::{ObdError, Result};
use crate::framing::ResponseFramer;
use crate::link::{Device, Link, LinkKind, Radio};
use crate::protocol::InitSequence;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default time allowed for the link to come up
const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;

/// Commands that may wait behind the one in flight
const DEFAULT_QUEUE_DEPTH: usize = 32;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Time allowed to open the link
    pub handshake_timeout: Duration,
    /// Per-command window; `None` uses the link kind's default
    pub command_timeout: Option<Duration>,
    /// AT commands sent after connecting
    pub init: InitSequence,
    /// Maximum queued commands
    pub queue_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(DEFAULT_HANDSHAKE_TIMEOUT_MS),
            command_timeout: None,
            init: InitSequence::default(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

struct Request {
    command: String,
    reply: oneshot::Sender<Result<String>>,
}

struct Inner {
    device: Device,
    kind: LinkKind,
    queue: mpsc::Sender<Request>,
    connected: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// A connected ELM327 session
///
/// Cheap to clone; all clones share the same queue and link.
#[derive(Clone)]
pub struct ObdClient {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ObdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObdClient")
            .field("device", &self.inner.device.id)
            .field("kind", &self.inner.kind)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl ObdClient {
    /// Open a link to `device` and run the initialization sequence
    pub async fn connect(radio: &dyn Radio, device: &Device, config: ClientConfig) -> Result<Self> {
        info!("Connecting to {} ({}) via {}", device.name, device.target, radio.kind().label());

        radio.request_permissions().await?;
        radio.enable().await?;

        let link = tokio::time::timeout(config.handshake_timeout, radio.open(&device.target))
            .await
            .map_err(|_| ObdError::ConnectionTimeout(config.handshake_timeout.as_millis() as u64))??;

        let command_timeout = config
            .command_timeout
            .unwrap_or_else(|| radio.kind().default_command_timeout());
        let client = Self::spawn(link, device, radio.kind(), command_timeout, config.queue_depth);

        client.initialize(&config.init).await?;
        info!("OBD adapter initialized on {}", device.target);
        Ok(client)
    }

    /// Wrap an already open link, skipping initialization
    pub fn from_link(
        link: Box<dyn Link>,
        device: &Device,
        command_timeout: Duration,
    ) -> Self {
        Self::spawn(link, device, device.kind, command_timeout, DEFAULT_QUEUE_DEPTH)
    }

    fn spawn(
        link: Box<dyn Link>,
        device: &Device,
        kind: LinkKind,
        command_timeout: Duration,
        queue_depth: usize,
    ) -> Self {
        let (queue, rx) = mpsc::channel(queue_depth.max(1));
        let connected = Arc::new(AtomicBool::new(true));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_link(
            link,
            rx,
            cancel.clone(),
            connected.clone(),
            command_timeout,
        ));

        let mut device = device.clone();
        device.connected = true;
        device.last_connected = Some(Utc::now());

        Self {
            inner: Arc::new(Inner {
                device,
                kind,
                queue,
                connected,
                cancel,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// Send the AT initialization commands, logging and ignoring failures
    async fn initialize(&self, init: &InitSequence) -> Result<()> {
        for command in init.commands() {
            match self.send_command(command).await {
                Ok(response) => debug!("{} -> {:?}", command, response),
                Err(ObdError::Disconnected) | Err(ObdError::NotConnected) => {
                    return Err(ObdError::TransportClosed);
                }
                Err(e) => warn!("Init command {} failed: {}", command, e),
            }
            if let Some(settle) = init.settle_after(command) {
                tokio::time::sleep(settle).await;
            }
        }

        if !self.is_connected() {
            return Err(ObdError::TransportClosed);
        }
        Ok(())
    }

    /// Send one command and wait for its complete response
    pub async fn send_command(&self, command: &str) -> Result<String> {
        if !self.is_connected() {
            return Err(ObdError::NotConnected);
        }

        let (reply, response) = oneshot::channel();
        let request = Request {
            command: command.to_string(),
            reply,
        };
        self.inner
            .queue
            .send(request)
            .await
            .map_err(|_| ObdError::Disconnected)?;

        response.await.map_err(|_| ObdError::Disconnected)?
    }

    /// Check if client is connected
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Adapter this session talks to
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    pub fn link_kind(&self) -> LinkKind {
        self.inner.kind
    }

    /// Whether both handles refer to the same session
    pub fn same_session(&self, other: &ObdClient) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Resolves once the session has ended for any reason
    pub async fn closed(&self) {
        self.inner.cancel.cancelled().await
    }

    /// Tear down the session.
    ///
    /// Every queued or in-flight command resolves with
    /// [`ObdError::Disconnected`].
    pub async fn disconnect(&self) {
        if self.inner.connected.swap(false, Ordering::AcqRel) {
            info!("Disconnecting from {}", self.inner.device.target);
        }
        self.inner.cancel.cancel();

        let task = match self.inner.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Link task ended abnormally: {}", e);
            }
        }
    }
}

/// Owns the link; serves queued commands one at a time
async fn run_link(
    mut link: Box<dyn Link>,
    mut queue: mpsc::Receiver<Request>,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    command_timeout: Duration,
) {
    let mut framer = ResponseFramer::new(link.framing());
    // responses still owed by the adapter for commands that timed out
    let mut late = 0usize;

    loop {
        let request = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            request = queue.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Cancelling in-flight {}", request.command);
                let _ = request.reply.send(Err(ObdError::Disconnected));
                break;
            }
            result = exchange(
                link.as_mut(),
                &mut framer,
                &mut late,
                &request.command,
                command_timeout,
            ) => result,
        };

        let link_lost = matches!(result, Err(ObdError::TransportClosed));
        if let Err(e) = &result {
            if e.is_timeout() {
                late += 1;
                metrics::counter!("obd_command_timeouts_total").increment(1);
            }
        }
        // the caller may have given up; nothing to do then
        let _ = request.reply.send(result);

        if link_lost {
            error!("Adapter link closed by remote");
            break;
        }
    }

    connected.store(false, Ordering::Release);
    cancel.cancel();

    queue.close();
    while let Ok(request) = queue.try_recv() {
        let _ = request.reply.send(Err(ObdError::Disconnected));
    }

    if let Err(e) = link.close().await {
        warn!("Error closing link: {}", e);
    }
    debug!("Link task finished");
}

/// Read and drop responses to timed-out commands.
///
/// Stops once every owed response has been seen or `window` passes without
/// them; whatever arrived is discarded either way.
async fn discard_late(
    link: &mut dyn Link,
    framer: &mut ResponseFramer,
    late: &mut usize,
    window: Duration,
) -> Result<()> {
    framer.reset();
    let drain = async {
        while *late > 0 {
            let fragment = link.read().await?;
            if let Some(stale) = framer.push(&fragment) {
                debug!("Discarding late response {:?}", stale);
                *late -= 1;
            }
        }
        Ok::<_, ObdError>(())
    };
    let outcome = tokio::time::timeout(window, drain).await;
    let result = match outcome {
        Ok(result) => result,
        Err(_) => {
            debug!("{} late response(s) never arrived", late);
            Ok(())
        }
    };
    *late = 0;
    result
}

/// Write one command and read until its response is complete
async fn exchange(
    link: &mut dyn Link,
    framer: &mut ResponseFramer,
    late: &mut usize,
    command: &str,
    command_timeout: Duration,
) -> Result<String> {
    let mut line = command.to_string();
    if !line.ends_with('\r') {
        line.push('\r');
    }

    if *late > 0 {
        discard_late(link, framer, late, command_timeout).await?;
    }
    framer.reset();
    debug!("TX {:?}", line);
    link.write(line.as_bytes()).await?;
    metrics::counter!("obd_commands_total").increment(1);

    let read = async {
        loop {
            let fragment = link.read().await?;
            if let Some(response) = framer.push(&fragment) {
                debug!("RX {:?}", response);
                return Ok(response);
            }
        }
    };

    tokio::time::timeout(command_timeout, read)
        .await
        .map_err(|_| ObdError::CommandTimeout {
            command: command.trim_end_matches('\r').to_string(),
            ms: command_timeout.as_millis() as u64,
        })?
}
