use std::io::{self, Write};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing_subscriber::EnvFilter;

type SharedLog = Arc<Mutex<Vec<u8>>>;

struct LogSink(SharedLog);

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

static SHARED_LOG: OnceLock<SharedLog> = OnceLock::new();
static CAPTURE_LOCK: OnceLock<Arc<AsyncMutex<()>>> = OnceLock::new();

/// Access to the output of the process-wide subscriber installed on first use.
/// Only one capture is live at a time; the filter of the first capture wins.
pub struct LogCapture {
    log: SharedLog,
    _turn: OwnedMutexGuard<()>,
}

impl LogCapture {
    pub async fn new(filter: &str) -> Self {
        let turn = CAPTURE_LOCK
            .get_or_init(|| Arc::new(AsyncMutex::new(())))
            .clone()
            .lock_owned()
            .await;
        let log = SHARED_LOG
            .get_or_init(|| {
                let log: SharedLog = Arc::default();
                let sink = log.clone();
                let subscriber = tracing_subscriber::fmt()
                    .with_env_filter(EnvFilter::new(filter))
                    .with_ansi(false)
                    .compact()
                    .with_writer(move || LogSink(sink.clone()))
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
                log
            })
            .clone();
        log.lock().unwrap_or_else(|err| err.into_inner()).clear();
        Self { log, _turn: turn }
    }

    pub fn text(&self) -> String {
        let bytes = self.log.lock().unwrap_or_else(|err| err.into_inner());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
